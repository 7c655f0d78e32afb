//! Text-to-speech adapter (§4.10): fires filtered chat utterances at a
//! configured HTTP TTS endpoint and swallows failures — speech is
//! best-effort and must never block or fail the turn it's attached to.

use tracing::warn;

#[derive(Clone)]
pub struct TtsClient {
    endpoint: Option<String>,
    http: reqwest::Client,
}

impl TtsClient {
    pub fn new(endpoint: Option<String>) -> Self {
        Self { endpoint, http: reqwest::Client::new() }
    }

    /// Posts `text` to the configured endpoint and returns immediately
    /// without awaiting the response body; errors are logged, never
    /// propagated.
    pub fn speak(&self, text: &str) {
        let Some(endpoint) = self.endpoint.clone() else { return };
        let http = self.http.clone();
        let body = serde_json::json!({ "text": text });
        tokio::spawn(async move {
            if let Err(e) = http.post(&endpoint).json(&body).send().await {
                warn!("tts request to {endpoint} failed: {e}");
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn disabled_client_does_not_panic() {
        let client = TtsClient::new(None);
        client.speak("hello");
    }
}
