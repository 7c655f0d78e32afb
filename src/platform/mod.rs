//! Minimal OS-permission and path helpers, trimmed from the teacher's
//! broader platform-abstraction layer to the two operations this crate
//! still needs: protecting the per-agent memory file and finding a
//! sensible default data directory.

#[cfg(unix)]
pub fn restrict_file_permissions(path: &std::path::Path) {
    use std::os::unix::fs::PermissionsExt;
    if let Ok(meta) = std::fs::metadata(path) {
        let mut perms = meta.permissions();
        perms.set_mode(0o600);
        let _ = std::fs::set_permissions(path, perms);
    }
}

#[cfg(not(unix))]
pub fn restrict_file_permissions(_path: &std::path::Path) {}

#[cfg(unix)]
pub fn restrict_dir_permissions(path: &std::path::Path) {
    use std::os::unix::fs::PermissionsExt;
    if let Ok(meta) = std::fs::metadata(path) {
        let mut perms = meta.permissions();
        perms.set_mode(0o700);
        let _ = std::fs::set_permissions(path, perms);
    }
}

#[cfg(not(unix))]
pub fn restrict_dir_permissions(_path: &std::path::Path) {}

/// Base directory for per-agent state, defaulting to the OS data-local
/// directory and falling back to `./data` when unavailable (headless
/// containers without a resolvable home directory).
pub fn data_dir() -> std::path::PathBuf {
    dirs::data_local_dir()
        .map(|d| d.join("voxbrain"))
        .unwrap_or_else(|| std::path::PathBuf::from("./data"))
}
