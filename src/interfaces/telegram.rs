//! Telegram chat adapter (§4.10). Grounded on the teacher's
//! `TelegramInterface` (`interfaces/telegram.rs`): the same teloxide `repl`
//! shape and `LifecycleComponent` attachment, with the command surface and
//! ReAct-loop dispatch replaced by the brain's chat queue and a plain
//! pairing-free forward (no vault, no STT, no per-chat pairing codes — none
//! of that has a counterpart in this system).

use anyhow::Result;
use async_trait::async_trait;
use teloxide::prelude::*;
use tracing::{error, info};

use crate::core::brain::BrainHandle;
use crate::core::lifecycle::LifecycleComponent;

pub struct TelegramInterface {
    agent_name: String,
    token_env: String,
    brain: BrainHandle,
}

impl TelegramInterface {
    pub fn new(agent_name: String, brain: BrainHandle) -> Self {
        Self { agent_name, token_env: "TELEGRAM_TOKEN".to_string(), brain }
    }

    async fn start_bot(&self, token: String) -> Result<()> {
        let bot = Bot::new(token);
        let agent_name = self.agent_name.clone();
        let brain = self.brain.clone();

        tokio::spawn(async move {
            teloxide::repl(bot, move |bot: Bot, msg: Message| {
                let agent_name = agent_name.clone();
                let brain = brain.clone();
                async move {
                    if let Some(text) = msg.text() {
                        let author = msg.from().map(|u| u.first_name.clone()).unwrap_or_else(|| "viewer".to_string());
                        info!("[{agent_name}] telegram message from {author}: {text}");
                        brain.queue_chat(&author, text, false);
                        let _ = bot.send_message(msg.chat.id, "Got it.").await;
                    }
                    Ok(())
                }
            })
            .await;
        });
        Ok(())
    }
}

#[async_trait]
impl LifecycleComponent for TelegramInterface {
    async fn on_init(&mut self) -> Result<()> {
        info!("[{}] telegram interface initializing", self.agent_name);
        Ok(())
    }

    async fn on_start(&mut self) -> Result<()> {
        let token = match std::env::var(&self.token_env) {
            Ok(t) if !t.trim().is_empty() => t,
            _ => {
                info!("[{}] {} not set, telegram channel disabled", self.agent_name, self.token_env);
                return Ok(());
            }
        };
        if let Err(e) = self.start_bot(token).await {
            error!("[{}] telegram bot failed to start: {e}", self.agent_name);
        }
        Ok(())
    }

    async fn on_shutdown(&mut self) -> Result<()> {
        info!("[{}] telegram interface shutting down", self.agent_name);
        Ok(())
    }
}
