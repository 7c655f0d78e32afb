//! Discord chat adapter (§4.10). Grounded on the teacher's `DiscordChannel`/
//! `Handler` pair (`interfaces/discord.rs`): the same serenity `EventHandler`
//! shape and `LifecycleComponent` attachment, with the ReAct-loop dispatch
//! replaced by a queue push onto the brain's chat event and the token read
//! from the environment instead of a secrets vault.

use anyhow::{Context, Result};
use async_trait::async_trait;
use serenity::Client;
use serenity::all::{Context as SerenityContext, EventHandler, GatewayIntents, Message, Ready};
use tracing::{error, info};

use crate::core::brain::BrainHandle;
use crate::core::lifecycle::LifecycleComponent;

struct Handler {
    agent_name: String,
    brain: BrainHandle,
}

#[async_trait]
impl EventHandler for Handler {
    async fn message(&self, _ctx: SerenityContext, msg: Message) {
        if msg.author.bot {
            return;
        }
        let text = msg.content.trim();
        if text.is_empty() {
            return;
        }
        info!("[{}] discord message from {}: {text}", self.agent_name, msg.author.name);
        self.brain.queue_chat(&msg.author.name, text, false);
    }

    async fn ready(&self, _: SerenityContext, ready: Ready) {
        info!("[{}] discord bot connected as {}", self.agent_name, ready.user.name);
    }
}

pub struct DiscordChannel {
    agent_name: String,
    brain: BrainHandle,
    token_env: String,
}

impl DiscordChannel {
    pub fn new(agent_name: String, brain: BrainHandle) -> Self {
        Self { agent_name, brain, token_env: "DISCORD_TOKEN".to_string() }
    }
}

#[async_trait]
impl LifecycleComponent for DiscordChannel {
    async fn on_init(&mut self) -> Result<()> {
        info!("[{}] discord interface initializing", self.agent_name);
        Ok(())
    }

    async fn on_start(&mut self) -> Result<()> {
        let token = match std::env::var(&self.token_env) {
            Ok(t) if !t.trim().is_empty() => t,
            _ => {
                info!("[{}] {} not set, discord channel disabled", self.agent_name, self.token_env);
                return Ok(());
            }
        };

        let handler = Handler { agent_name: self.agent_name.clone(), brain: self.brain.clone() };
        let intents = GatewayIntents::GUILD_MESSAGES | GatewayIntents::DIRECT_MESSAGES | GatewayIntents::MESSAGE_CONTENT;

        let mut client = Client::builder(&token, intents)
            .event_handler(handler)
            .await
            .context("building discord client")?;

        tokio::spawn(async move {
            if let Err(e) = client.start().await {
                error!("discord client error: {e}");
            }
        });
        Ok(())
    }

    async fn on_shutdown(&mut self) -> Result<()> {
        info!("[{}] discord interface shutting down", self.agent_name);
        Ok(())
    }
}
