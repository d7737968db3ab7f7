use anyhow::Result;
use serenity::{
    builder::{CreateCommand, CreateCommandOption},
    model::{application::CommandOptionType, id::GuildId},
    prelude::Context,
};

/// Every slash command the bot answers to
pub fn all_commands() -> Vec<CreateCommand> {
    vec![
        play_command(),
        pause_command(),
        resume_command(),
        skip_command(),
        stop_command(),
        queue_command(),
        nowplaying_command(),
        volume_command(),
        loop_command(),
        join_command(),
        leave_command(),
    ]
}

pub async fn register_global_commands(ctx: &Context) -> Result<()> {
    for command in all_commands() {
        ctx.http.create_global_command(&command).await?;
    }

    Ok(())
}

/// Guild commands show up immediately, handy during development
pub async fn register_guild_commands(ctx: &Context, guild_id: GuildId) -> Result<()> {
    guild_id.set_commands(&ctx.http, all_commands()).await?;

    Ok(())
}

// Playback

fn play_command() -> CreateCommand {
    CreateCommand::new("play")
        .description("Play a track from YouTube, Spotify or SoundCloud")
        .add_option(
            CreateCommandOption::new(CommandOptionType::String, "query", "URL or search terms")
                .required(true),
        )
}

fn pause_command() -> CreateCommand {
    CreateCommand::new("pause").description("Pause the current track")
}

fn resume_command() -> CreateCommand {
    CreateCommand::new("resume").description("Resume the paused track")
}

fn skip_command() -> CreateCommand {
    CreateCommand::new("skip").description("Skip to the next track")
}

fn stop_command() -> CreateCommand {
    CreateCommand::new("stop").description("Stop playback and clear the queue")
}

// Queue

fn queue_command() -> CreateCommand {
    CreateCommand::new("queue").description("Show the upcoming tracks")
}

fn nowplaying_command() -> CreateCommand {
    CreateCommand::new("nowplaying").description("Show the current track")
}

fn loop_command() -> CreateCommand {
    CreateCommand::new("loop").description("Toggle repeating the current track")
}

// Audio

fn volume_command() -> CreateCommand {
    CreateCommand::new("volume")
        .description("Set the playback volume")
        .add_option(
            CreateCommandOption::new(CommandOptionType::Integer, "level", "Volume (0-100)")
                .min_int_value(0)
                .max_int_value(100)
                .required(true),
        )
}

// Connection

fn join_command() -> CreateCommand {
    CreateCommand::new("join").description("Join your voice channel")
}

fn leave_command() -> CreateCommand {
    CreateCommand::new("leave").description("Leave the voice channel")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn registers_one_command_per_operation() {
        let names: Vec<String> = all_commands()
            .iter()
            .filter_map(|c| serde_json::to_value(c).ok())
            .filter_map(|v| v.get("name").and_then(|n| n.as_str()).map(str::to_string))
            .collect();

        assert_eq!(
            names,
            vec![
                "play", "pause", "resume", "skip", "stop", "queue", "nowplaying", "volume", "loop",
                "join", "leave"
            ]
        );
    }
}
