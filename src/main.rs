mod core;
mod interfaces;
mod logging;
mod platform;

use std::net::SocketAddr;
use std::sync::Arc;

use tokio::sync::Mutex;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use crate::core::bulletin::TeamBulletin;
use crate::core::combat::CombatClient;
use crate::core::failure_memory::FailureMemory;
use crate::core::game::mock::MockGameClient;
use crate::core::game::GameClient;
use crate::core::lifecycle::{LifecycleComponent, LifecycleManager};
use crate::core::llm::generic_provider::GenericProvider;
use crate::core::llm::registry::ProviderRegistry;
use crate::core::llm::LlmManager;
use crate::core::memory::MemorySystem;
use crate::core::role::RoleConfig;
use crate::core::skills::executor::SkillExecutor;
use crate::core::skills::SkillRegistry;
use crate::interfaces::discord::DiscordChannel;
use crate::interfaces::overlay::OverlayHub;
use crate::interfaces::telegram::TelegramInterface;
use crate::interfaces::tts::TtsClient;

fn init_logging(log_tx: tokio::sync::broadcast::Sender<String>) {
    let filter = EnvFilter::try_from_env("VOXBRAIN_LOG").unwrap_or_else(|_| EnvFilter::new("info"));
    let make_writer = logging::SseMakeWriter { sender: log_tx, suppress_stdout: false };
    tracing_subscriber::fmt().with_env_filter(filter).with_writer(make_writer).init();
}

fn role_config_path() -> std::path::PathBuf {
    std::env::var("VOXBRAIN_ROLE_CONFIG")
        .map(std::path::PathBuf::from)
        .unwrap_or_else(|_| std::path::PathBuf::from("role.toml"))
}

fn build_llm_manager() -> LlmManager {
    let registry = match std::env::var("VOXBRAIN_PROVIDERS_CONFIG") {
        Ok(path) => ProviderRegistry::load_from_file(std::path::Path::new(&path)).unwrap_or_else(|e| {
            warn!("failed to load providers config at {path}: {e}, using embedded default");
            ProviderRegistry::load_default()
        }),
        Err(_) => ProviderRegistry::load_default(),
    };

    let mut manager = LlmManager::new(
        (registry.strong.provider.clone(), registry.strong.model.clone()),
        (registry.fast.provider.clone(), registry.fast.model.clone()),
    );
    for provider in registry.providers {
        manager.register_provider(Box::new(GenericProvider::new(provider)));
    }
    manager
}

#[tokio::main]
async fn main() {
    let (log_tx, _log_rx) = tokio::sync::broadcast::channel::<String>(500);
    init_logging(log_tx.clone());

    let role = match RoleConfig::load(&role_config_path()) {
        Ok(role) => Arc::new(role),
        Err(e) => {
            error!("failed to load role config: {e}");
            std::process::exit(1);
        }
    };
    info!("starting voxbrain agent: {}", role.display_name);

    let workspace_dir = platform::data_dir().join(&role.display_name);
    let mut memory = match MemorySystem::load(&workspace_dir).await {
        Ok(memory) => memory,
        Err(e) => {
            error!("failed to load memory file: {e}");
            std::process::exit(1);
        }
    };
    if let Err(e) = memory.heal_static_skills(&role.static_skill_names).await {
        warn!("failed to heal statically-defined skills: {e}");
    }

    let skills = Arc::new(SkillRegistry::with_builtins());
    let mut failure_memory = FailureMemory::new();
    let skill_names: Vec<String> = skills.catalog().into_iter().map(|(name, _)| name.to_string()).collect();
    failure_memory.seed_from_memory(&memory, &skill_names);

    let memory = Arc::new(Mutex::new(memory));

    let llm = Arc::new(build_llm_manager());
    let bulletin = TeamBulletin::new();

    // TODO: swap in a real game-protocol client once one exists; the mock
    // is the sanctioned way to exercise the brain without a live server.
    let game: Arc<dyn GameClient> = Arc::new(MockGameClient::new());

    let combat = role.combat_addr.clone().map(|addr| Arc::new(CombatClient::new(addr)));

    let (progress_tx, progress_rx) = tokio::sync::mpsc::unbounded_channel();
    let executor = Arc::new(SkillExecutor::new(progress_tx));

    let (telemetry_tx, mut telemetry_rx) = tokio::sync::mpsc::unbounded_channel();

    let brain = core::brain::Brain::new(
        role.clone(),
        game.clone(),
        llm.clone(),
        memory.clone(),
        skills.clone(),
        executor.clone(),
        bulletin.clone(),
        combat,
    )
    .with_telemetry(telemetry_tx)
    .with_failure_memory(failure_memory);
    let handle = brain.spawn();

    let overlay = role.overlay_bind.as_ref().map(|_| OverlayHub::new().with_logs(log_tx.clone()));
    let tts = TtsClient::new(role.tts_endpoint.clone());

    if let Some(hub) = &overlay {
        hub.forward_progress(progress_rx);
        hub.poll_bulletin(bulletin.clone(), std::time::Duration::from_secs(5));

        if let Some(bind) = &role.overlay_bind {
            match bind.parse::<SocketAddr>() {
                Ok(addr) => {
                    let hub = hub.clone();
                    tokio::spawn(async move {
                        if let Err(e) = hub.serve(addr).await {
                            error!("overlay server exited: {e}");
                        }
                    });
                }
                Err(e) => warn!("invalid overlay_bind '{bind}': {e}"),
            }
        }

        // Tap telemetry for the TTS side-effect, then hand the rest off to
        // the hub's own forwarding task.
        let (relay_tx, relay_rx) = tokio::sync::mpsc::unbounded_channel();
        tokio::spawn(async move {
            while let Some(event) = telemetry_rx.recv().await {
                if matches!(event.action.as_str(), "chat" | "respond_to_chat") {
                    tts.speak(&event.thought);
                }
                let _ = relay_tx.send(event);
            }
        });
        hub.forward_telemetry(relay_rx);
    } else {
        tokio::spawn(async move {
            // Drain progress/telemetry so senders never block even without an overlay attached.
            let mut progress_rx = progress_rx;
            loop {
                tokio::select! {
                    maybe = progress_rx.recv() => if maybe.is_none() { break },
                    maybe = telemetry_rx.recv() => {
                        match maybe {
                            Some(event) if matches!(event.action.as_str(), "chat" | "respond_to_chat") => tts.speak(&event.thought),
                            Some(_) => {}
                            None => break,
                        }
                    }
                }
            }
        });
    }

    let mut lifecycle = LifecycleManager::new();
    lifecycle.attach(Arc::new(Mutex::new(DiscordChannel::new(role.display_name.clone(), handle.clone()))));
    lifecycle.attach(Arc::new(Mutex::new(TelegramInterface::new(role.display_name.clone(), handle.clone()))));

    if let Err(e) = lifecycle.start().await {
        error!("failed to start chat interfaces: {e}");
    }

    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("failed to listen for ctrl-c: {e}");
    }

    info!("shutting down");
    handle.stop();
    let _ = lifecycle.shutdown().await;
}
