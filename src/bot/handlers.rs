use anyhow::Result;
use serenity::{
    builder::{CreateEmbed, CreateInteractionResponse, CreateInteractionResponseMessage, EditInteractionResponse},
    model::{
        application::CommandInteraction,
        id::{ChannelId, GuildId, UserId},
    },
    prelude::Context,
};
use std::sync::Arc;
use tracing::{info, warn};

use crate::{
    audio::{CommandOutcome, PlaybackError, PlaybackSession},
    bot::MelodyBot,
    ui::embeds,
};

/// Routes a slash command to its session operation and answers it
pub async fn handle_command(ctx: &Context, command: CommandInteraction, bot: &MelodyBot) -> Result<()> {
    let guild_id = command
        .guild_id
        .ok_or_else(|| anyhow::anyhow!("Command used outside a server"))?;

    info!(
        "📝 /{} used by {} in guild {}",
        command.data.name, command.user.name, guild_id
    );

    match command.data.name.as_str() {
        "play" => handle_play(ctx, &command, bot, guild_id).await,
        "join" => handle_join(ctx, &command, bot, guild_id).await,
        "leave" => handle_leave(ctx, &command, bot, guild_id).await,
        "nowplaying" => handle_nowplaying(ctx, &command, bot, guild_id).await,
        _ => handle_session_command(ctx, &command, bot, guild_id).await,
    }
}

async fn handle_play(
    ctx: &Context,
    command: &CommandInteraction,
    bot: &MelodyBot,
    guild_id: GuildId,
) -> Result<()> {
    let query = option_str(command, "query")
        .ok_or_else(|| anyhow::anyhow!("Missing query"))?
        .to_string();

    // Resolution can easily take longer than the 3 second interaction window
    command
        .create_response(
            &ctx.http,
            CreateInteractionResponse::Defer(CreateInteractionResponseMessage::new()),
        )
        .await?;

    let session = match bot.registry.get(guild_id) {
        Some(session) => session,
        None => {
            let Some(voice_channel) = get_user_voice_channel(ctx, guild_id, command.user.id) else {
                let embed = embeds::create_error_embed("Not in Voice", "Join a voice channel first");
                command
                    .edit_response(&ctx.http, EditInteractionResponse::new().embed(embed))
                    .await?;
                return Ok(());
            };
            match bot.join_voice_channel(ctx, guild_id, voice_channel, command.channel_id).await {
                Ok(session) => session,
                Err(e) => {
                    warn!("🔇 /play could not join voice in guild {}: {:?}", guild_id, e);
                    command
                        .edit_response(&ctx.http, EditInteractionResponse::new().embed(voice_failure(&e)))
                        .await?;
                    return Ok(());
                }
            }
        }
    };

    let outcome = CommandOutcome::from(session.play(&query).await);
    command
        .edit_response(
            &ctx.http,
            EditInteractionResponse::new().embed(embeds::create_outcome_embed(&outcome)),
        )
        .await?;

    Ok(())
}

async fn handle_join(
    ctx: &Context,
    command: &CommandInteraction,
    bot: &MelodyBot,
    guild_id: GuildId,
) -> Result<()> {
    let Some(voice_channel) = get_user_voice_channel(ctx, guild_id, command.user.id) else {
        let embed = embeds::create_error_embed("Not in Voice", "Join a voice channel first");
        return respond(ctx, command, embed, true).await;
    };

    if let Err(e) = bot.join_voice_channel(ctx, guild_id, voice_channel, command.channel_id).await {
        warn!("🔇 /join could not join voice in guild {}: {:?}", guild_id, e);
        return respond(ctx, command, voice_failure(&e), true).await;
    }

    let embed = embeds::create_info_embed("Connected", &format!("Joined <#{}>", voice_channel));
    respond(ctx, command, embed, false).await
}

async fn handle_leave(
    ctx: &Context,
    command: &CommandInteraction,
    bot: &MelodyBot,
    guild_id: GuildId,
) -> Result<()> {
    if !bot.registry.contains(guild_id) {
        return respond(ctx, command, not_connected(), true).await;
    }

    bot.leave_voice_channel(ctx, guild_id).await?;
    let embed = embeds::create_info_embed("Disconnected", "👋 See you next time");
    respond(ctx, command, embed, false).await
}

async fn handle_nowplaying(
    ctx: &Context,
    command: &CommandInteraction,
    bot: &MelodyBot,
    guild_id: GuildId,
) -> Result<()> {
    let Some(session) = bot.registry.get(guild_id) else {
        return respond(ctx, command, not_connected(), true).await;
    };

    match session.now_playing().await {
        Ok(_) => {
            let embed = embeds::create_now_playing_embed(&session.snapshot().await);
            respond(ctx, command, embed, false).await
        }
        Err(error) => {
            let outcome = CommandOutcome::Error(error);
            respond(ctx, command, embeds::create_outcome_embed(&outcome), true).await
        }
    }
}

/// Commands that map one-to-one onto a session operation
async fn handle_session_command(
    ctx: &Context,
    command: &CommandInteraction,
    bot: &MelodyBot,
    guild_id: GuildId,
) -> Result<()> {
    let Some(session) = bot.registry.get(guild_id) else {
        return respond(ctx, command, not_connected(), true).await;
    };

    let Some(result) = dispatch(&session, command).await else {
        let embed = embeds::create_error_embed("Unknown Command", &format!("/{}", command.data.name));
        return respond(ctx, command, embed, true).await;
    };

    let outcome = CommandOutcome::from(result);
    let ephemeral = is_ephemeral(&outcome);
    respond(ctx, command, embeds::create_outcome_embed(&outcome), ephemeral).await
}

async fn dispatch(
    session: &Arc<PlaybackSession>,
    command: &CommandInteraction,
) -> Option<Result<CommandOutcome, PlaybackError>> {
    let result = match command.data.name.as_str() {
        "pause" => session.pause().await,
        "resume" => session.resume().await,
        "skip" => session.skip().await,
        "stop" => session.stop().await,
        "queue" => session.queue().await,
        "loop" => session.toggle_loop().await,
        "volume" => {
            let level = option_i64(command, "level")?;
            session.set_volume(level).await
        }
        _ => return None,
    };

    Some(result)
}

/// Failures are only shown to whoever issued the command
fn is_ephemeral(outcome: &CommandOutcome) -> bool {
    matches!(outcome, CommandOutcome::Error(_))
}

fn voice_failure(error: &anyhow::Error) -> CreateEmbed {
    embeds::create_error_embed("Voice Connection Failed", &error.to_string())
}

fn not_connected() -> CreateEmbed {
    embeds::create_error_embed("Not Connected", "Use `/join` or `/play` first")
}

async fn respond(ctx: &Context, command: &CommandInteraction, embed: CreateEmbed, ephemeral: bool) -> Result<()> {
    command
        .create_response(
            &ctx.http,
            CreateInteractionResponse::Message(
                CreateInteractionResponseMessage::new()
                    .embed(embed)
                    .ephemeral(ephemeral),
            ),
        )
        .await?;

    Ok(())
}

fn option_str<'a>(command: &'a CommandInteraction, name: &str) -> Option<&'a str> {
    command
        .data
        .options
        .iter()
        .find(|opt| opt.name == name)
        .and_then(|opt| opt.value.as_str())
}

fn option_i64(command: &CommandInteraction, name: &str) -> Option<i64> {
    command
        .data
        .options
        .iter()
        .find(|opt| opt.name == name)
        .and_then(|opt| opt.value.as_i64())
}

fn get_user_voice_channel(ctx: &Context, guild_id: GuildId, user_id: UserId) -> Option<ChannelId> {
    let guild = guild_id.to_guild_cached(&ctx.cache)?;
    guild
        .voice_states
        .get(&user_id)
        .and_then(|voice_state| voice_state.channel_id)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_errors_are_ephemeral() {
        assert!(is_ephemeral(&CommandOutcome::Error(PlaybackError::EmptyQueue)));
        assert!(!is_ephemeral(&CommandOutcome::Paused));
        assert!(!is_ephemeral(&CommandOutcome::QueueSnapshot(vec![])));
    }

    #[test]
    fn join_failures_are_reported() {
        let embed = voice_failure(&anyhow::anyhow!("could not connect to the voice channel"));
        let json = serde_json::to_value(&embed).unwrap();

        assert_eq!(json["title"], "❌ Voice Connection Failed");
        assert_eq!(json["description"], "could not connect to the voice channel");
    }
}
