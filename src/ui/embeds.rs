use serenity::{
    all::Timestamp,
    builder::{CreateEmbed, CreateEmbedFooter},
};
use std::time::Duration;

use crate::audio::{CommandOutcome, LoopMode, PlaybackError, PlaybackStatus, SessionEvent, SessionSnapshot};

/// Standard colour palette
pub mod colors {
    use serenity::all::Colour;

    pub const SUCCESS_GREEN: Colour = Colour::from_rgb(67, 181, 129);
    pub const ERROR_RED: Colour = Colour::from_rgb(220, 53, 69);
    pub const WARNING_ORANGE: Colour = Colour::from_rgb(255, 193, 7);
    pub const INFO_BLUE: Colour = Colour::from_rgb(52, 144, 220);
    pub const MUSIC_PURPLE: Colour = Colour::from_rgb(138, 43, 226);
    pub const NEUTRAL_GRAY: Colour = Colour::from_rgb(108, 117, 125);
}

const STANDARD_FOOTER: &str = "🎵 Melody";
const QUEUE_PREVIEW: usize = 10;

/// Renders the response to a single command
pub fn create_outcome_embed(outcome: &CommandOutcome) -> CreateEmbed {
    match outcome {
        CommandOutcome::Queued { title, position } => base("✅ Added to Queue", colors::SUCCESS_GREEN)
            .description(format!("**{}**", title))
            .field("📍 Position", position.to_string(), true),
        CommandOutcome::NowPlaying(title) => base("🎵 Now Playing", colors::MUSIC_PURPLE)
            .description(format!("**{}**", title)),
        CommandOutcome::Paused => base("⏸️ Paused", colors::INFO_BLUE),
        CommandOutcome::Resumed => base("▶️ Resumed", colors::INFO_BLUE),
        CommandOutcome::Skipped { next } => {
            let description = match next {
                Some(title) => format!("Up next: **{}**", title),
                None => "The queue is empty now".to_string(),
            };
            base("⏭️ Skipped", colors::INFO_BLUE).description(description)
        }
        CommandOutcome::Stopped => {
            base("⏹️ Stopped", colors::NEUTRAL_GRAY).description("Playback stopped and queue cleared")
        }
        CommandOutcome::QueueSnapshot(titles) => create_queue_embed(titles),
        CommandOutcome::VolumeSet(volume) => create_volume_embed(*volume),
        CommandOutcome::LoopToggled(enabled) => {
            if *enabled {
                base("🔂 Repeat Enabled", colors::INFO_BLUE).description("The current track will repeat")
            } else {
                base("➡️ Repeat Disabled", colors::INFO_BLUE)
            }
        }
        CommandOutcome::Error(error) => create_error_embed(error_title(error), &error.to_string()),
    }
}

/// Short heading for each failure kind
pub fn error_title(error: &PlaybackError) -> &'static str {
    match error {
        PlaybackError::UnrecognizedSource(_) => "Unsupported Source",
        PlaybackError::ProviderUnavailable(_) => "Provider Unavailable",
        PlaybackError::NoPlayableStream(_) => "Nothing Playable",
        PlaybackError::InvalidSinkState(_) => "Not Possible Right Now",
        PlaybackError::EmptyQueue => "Nothing Playing",
        PlaybackError::QueueFull(_) => "Queue Full",
        PlaybackError::Superseded => "Request Cancelled",
    }
}

pub fn create_now_playing_embed(snapshot: &SessionSnapshot) -> CreateEmbed {
    let Some(track) = &snapshot.current else {
        return create_error_embed(error_title(&PlaybackError::EmptyQueue), "Use `/play` to start some music");
    };

    let status = match (snapshot.status, snapshot.loop_mode) {
        (PlaybackStatus::Paused, _) => "⏸️ Paused",
        (_, LoopMode::Track) => "🔂 Repeating",
        _ => "▶️ Playing",
    };

    let mut embed = base("🎵 Now Playing", colors::MUSIC_PURPLE)
        .description(format!("**{}**", track.title()))
        .field("🎤 Artist", track.artist().unwrap_or("Unknown"), true);

    embed = match track.duration() {
        Some(duration) => embed.field("⏱️ Duration", format_duration(duration), true),
        None => embed.field("⏱️ Duration", "🔴 Live", true),
    };

    embed = embed
        .field("🔗 Source", track.source_kind().as_str(), true)
        .field("📊 Status", status, true)
        .field("🔊 Volume", format!("{}%", snapshot.volume), true)
        .field("📋 Up Next", snapshot.upcoming.len().to_string(), true);

    if let Some(url) = track.page_url() {
        embed = embed.url(url);
    }

    embed
}

pub fn create_queue_embed(titles: &[String]) -> CreateEmbed {
    if titles.is_empty() {
        return base("📋 Queue", colors::NEUTRAL_GRAY)
            .description("😴 **The queue is empty**\n\n💡 Use `/play <song>` to add music");
    }

    let mut description = String::new();
    for (i, title) in titles.iter().take(QUEUE_PREVIEW).enumerate() {
        description.push_str(&format!("**{}**. {}\n", i + 1, title));
    }
    if titles.len() > QUEUE_PREVIEW {
        description.push_str(&format!("…and {} more", titles.len() - QUEUE_PREVIEW));
    }

    base("📋 Queue", colors::INFO_BLUE)
        .description(description)
        .field("Total", format!("{} tracks", titles.len()), true)
}

/// Renders a notification the session raised on its own
pub fn create_event_embed(event: &SessionEvent) -> CreateEmbed {
    match event {
        SessionEvent::NowPlaying(title) => {
            base("🎵 Now Playing", colors::MUSIC_PURPLE).description(format!("**{}**", title))
        }
        SessionEvent::TrackFailed { title, error } => base("⚠️ Skipped Unplayable Track", colors::WARNING_ORANGE)
            .description(format!("**{}**\n{}", title, error)),
        SessionEvent::TrackErrored { title, reason } => base("⚠️ Playback Error", colors::WARNING_ORANGE)
            .description(format!("**{}** stopped unexpectedly\n`{}`", title, reason)),
        SessionEvent::QueueFinished => base("📭 Queue Finished", colors::NEUTRAL_GRAY)
            .description("💡 Use `/play <song>` to keep the music going"),
    }
}

pub fn create_error_embed(title: &str, description: &str) -> CreateEmbed {
    base(&format!("❌ {}", title), colors::ERROR_RED).description(description)
}

pub fn create_info_embed(title: &str, description: &str) -> CreateEmbed {
    base(&format!("ℹ️ {}", title), colors::INFO_BLUE).description(description)
}

pub fn create_volume_embed(volume: u8) -> CreateEmbed {
    let status_emoji = match volume {
        0 => "🔇",
        1..=50 => "🔉",
        _ => "🔊",
    };

    base(&format!("{} Volume", status_emoji), colors::INFO_BLUE)
        .description(format!("**{}%**", volume))
        .field("📊 Level", create_volume_bar(volume), false)
}

fn base(title: &str, colour: serenity::all::Colour) -> CreateEmbed {
    CreateEmbed::default()
        .title(title)
        .color(colour)
        .timestamp(Timestamp::now())
        .footer(CreateEmbedFooter::new(STANDARD_FOOTER))
}

fn create_volume_bar(volume: u8) -> String {
    let segments = 20;
    let filled = usize::from(volume.min(100)) * segments / 100;
    let bar = "█".repeat(filled) + &"▒".repeat(segments - filled);
    format!("`[{}]`", bar)
}

fn format_duration(duration: Duration) -> String {
    let total_seconds = duration.as_secs();
    let hours = total_seconds / 3600;
    let minutes = (total_seconds % 3600) / 60;
    let seconds = total_seconds % 60;

    if hours > 0 {
        format!("{}:{:02}:{:02}", hours, minutes, seconds)
    } else {
        format!("{}:{:02}", minutes, seconds)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn title_of(embed: CreateEmbed) -> String {
        serde_json::to_value(embed).unwrap()["title"]
            .as_str()
            .unwrap_or_default()
            .to_string()
    }

    #[test]
    fn formats_durations() {
        assert_eq!(format_duration(Duration::from_secs(59)), "0:59");
        assert_eq!(format_duration(Duration::from_secs(213)), "3:33");
        assert_eq!(format_duration(Duration::from_secs(3725)), "1:02:05");
    }

    #[test]
    fn volume_bar_scales_with_percent() {
        assert_eq!(create_volume_bar(0), format!("`[{}]`", "▒".repeat(20)));
        assert_eq!(create_volume_bar(50), format!("`[{}{}]`", "█".repeat(10), "▒".repeat(10)));
        assert_eq!(create_volume_bar(100), format!("`[{}]`", "█".repeat(20)));
    }

    #[test]
    fn every_outcome_has_a_title() {
        assert_eq!(title_of(create_outcome_embed(&CommandOutcome::Paused)), "⏸️ Paused");
        assert_eq!(
            title_of(create_outcome_embed(&CommandOutcome::Error(PlaybackError::QueueFull(5)))),
            "❌ Queue Full"
        );
        assert_eq!(
            title_of(create_outcome_embed(&CommandOutcome::QueueSnapshot(vec![]))),
            "📋 Queue"
        );
    }

    #[test]
    fn long_queues_are_truncated() {
        let titles: Vec<String> = (1..=12).map(|i| format!("Track {}", i)).collect();
        let json = serde_json::to_value(create_queue_embed(&titles)).unwrap();
        let description = json["description"].as_str().unwrap();

        assert!(description.contains("**10**. Track 10"));
        assert!(!description.contains("Track 11"));
        assert!(description.ends_with("…and 2 more"));
    }
}
