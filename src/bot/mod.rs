//! # Bot Module
//!
//! Discord front end for Melody.
//!
//! [`MelodyBot`] implements Serenity's [`EventHandler`]. It registers the slash
//! commands, routes interactions to [`handlers`], owns voice connections
//! through songbird and keeps the [`SessionRegistry`] in step with them: a
//! session exists exactly while the bot sits in a guild's voice channel.

use anyhow::Result;
use serenity::{
    all::{ChannelId, Context, CreateMessage, EventHandler, GuildId, Http, Interaction, Ready, UserId, VoiceState},
    async_trait,
};
use std::sync::Arc;
use tokio::sync::broadcast::{self, error::RecvError};
use tracing::{debug, error, info, warn};

pub mod commands;
pub mod handlers;

use crate::{
    audio::{AudioSink, PlaybackSession, SessionEvent, SessionRegistry, SongbirdSink},
    config::Config,
    ui::embeds,
};

pub struct MelodyBot {
    config: Arc<Config>,
    pub registry: Arc<SessionRegistry>,
}

impl MelodyBot {
    pub fn new(config: Config, registry: Arc<SessionRegistry>) -> Self {
        Self {
            config: Arc::new(config),
            registry,
        }
    }

    /// Registers slash commands per guild when `GUILD_ID` is set, globally otherwise.
    ///
    /// Guild commands propagate within seconds; global ones can take up to an hour.
    async fn register_commands(&self, ctx: &Context) -> Result<()> {
        info!("📝 Registering slash commands (application {})", self.config.application_id);

        match self.config.guild_id {
            Some(guild_id) => {
                let guild_id = GuildId::new(guild_id);
                if !ctx.cache.guilds().contains(&guild_id) {
                    warn!("⚠️ Bot is not a member of guild {}, skipping registration", guild_id);
                    return Ok(());
                }

                commands::register_guild_commands(ctx, guild_id).await.map_err(|e| {
                    error!("❌ Guild command registration failed: {:?}", e);
                    anyhow::anyhow!("could not register guild commands, check the 'applications.commands' scope")
                })?;
                info!("✅ Guild commands registered for {}", guild_id);
            }
            None => {
                commands::register_global_commands(ctx).await.map_err(|e| {
                    error!("❌ Global command registration failed: {:?}", e);
                    anyhow::anyhow!("could not register global commands, check the 'applications.commands' scope")
                })?;
                info!("✅ Global commands registered");
            }
        }

        Ok(())
    }

    /// Joins `channel_id` and returns the guild's session, creating it on first join.
    ///
    /// A new session reports its notifications to `text_channel`.
    pub async fn join_voice_channel(
        &self,
        ctx: &Context,
        guild_id: GuildId,
        channel_id: ChannelId,
        text_channel: ChannelId,
    ) -> Result<Arc<PlaybackSession>> {
        let manager = songbird::get(ctx)
            .await
            .ok_or_else(|| anyhow::anyhow!("Songbird is not initialised"))?;

        let call = manager.join(guild_id, channel_id).await.map_err(|e| {
            error!("Voice connection failed: {:?}", e);
            anyhow::anyhow!("could not connect to the voice channel")
        })?;

        let mut created = false;
        let session = self.registry.get_or_create(guild_id, |events| {
            created = true;
            Arc::new(SongbirdSink::new(call, events)) as Arc<dyn AudioSink>
        });

        if created {
            forward_session_events(ctx.http.clone(), text_channel, session.subscribe());
        }

        info!("🔊 Connected to voice in guild {}", guild_id);
        Ok(session)
    }

    /// Tears down the session and leaves the voice channel.
    pub async fn leave_voice_channel(&self, ctx: &Context, guild_id: GuildId) -> Result<()> {
        self.registry.remove(guild_id).await;

        let manager = songbird::get(ctx)
            .await
            .ok_or_else(|| anyhow::anyhow!("Songbird is not initialised"))?;
        if manager.get(guild_id).is_some() {
            manager.remove(guild_id).await?;
        }

        info!("👋 Left voice in guild {}", guild_id);
        Ok(())
    }
}

/// The guild the bot itself was just disconnected from, if this update says so.
fn disconnected_guild(
    bot_id: UserId,
    user_id: UserId,
    was_connected: bool,
    channel_id: Option<ChannelId>,
    guild_id: Option<GuildId>,
) -> Option<GuildId> {
    if user_id != bot_id || !was_connected || channel_id.is_some() {
        return None;
    }
    guild_id
}

/// Posts session notifications to the channel the session was started from.
fn forward_session_events(
    http: Arc<Http>,
    channel_id: ChannelId,
    mut events: broadcast::Receiver<SessionEvent>,
) {
    tokio::spawn(async move {
        loop {
            match events.recv().await {
                Ok(event) => {
                    let message = CreateMessage::new().embed(embeds::create_event_embed(&event));
                    if let Err(e) = channel_id.send_message(&http, message).await {
                        warn!("Could not post session event to {}: {:?}", channel_id, e);
                    }
                }
                Err(RecvError::Lagged(missed)) => {
                    warn!("Session notifications lagging, {} dropped", missed);
                }
                Err(RecvError::Closed) => break,
            }
        }
        debug!("📪 Notification forwarding for {} finished", channel_id);
    });
}

#[async_trait]
impl EventHandler for MelodyBot {
    async fn ready(&self, ctx: Context, ready: Ready) {
        info!("🤖 {} is online!", ready.user.name);
        info!("📊 Connected to {} guilds", ready.guilds.len());

        if let Err(e) = self.register_commands(&ctx).await {
            error!("Command registration failed: {:?}", e);
        }
    }

    async fn interaction_create(&self, ctx: Context, interaction: Interaction) {
        if let Interaction::Command(command) = interaction {
            if let Err(e) = handlers::handle_command(&ctx, command, self).await {
                error!("Command handling failed: {:?}", e);
            }
        }
    }

    /// Drops the session and the songbird call when someone disconnects the bot.
    async fn voice_state_update(&self, ctx: Context, old: Option<VoiceState>, new: VoiceState) {
        let current_user_id = ctx.cache.current_user().id;
        let Some(guild_id) =
            disconnected_guild(current_user_id, new.user_id, old.is_some(), new.channel_id, new.guild_id)
        else {
            return;
        };

        info!("🔌 Bot was disconnected in guild {}", guild_id);
        if let Err(e) = self.leave_voice_channel(&ctx, guild_id).await {
            warn!("Could not release the voice call in guild {}: {:?}", guild_id, e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn only_the_bot_leaving_voice_counts_as_disconnect() {
        let (bot, guild) = (UserId::new(1), GuildId::new(10));

        assert_eq!(disconnected_guild(bot, bot, true, None, Some(guild)), Some(guild));

        // Someone else left
        assert_eq!(disconnected_guild(bot, UserId::new(2), true, None, Some(guild)), None);
        // Moved to another channel
        assert_eq!(
            disconnected_guild(bot, bot, true, Some(ChannelId::new(5)), Some(guild)),
            None
        );
        // First voice state, nothing to tear down
        assert_eq!(disconnected_guild(bot, bot, false, None, Some(guild)), None);
    }
}
