use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::sources::SourceKind;

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    // Discord
    pub discord_token: String,
    pub application_id: u64,
    pub guild_id: Option<u64>, // Register commands in a single guild (development)

    // Audio
    pub default_volume: u8,
    pub max_queue_size: usize, // 0 = unlimited

    // Track resolution
    pub search_fallback: Option<SourceKind>,
    pub resolve_timeout_secs: u64, // 0 = no timeout
    pub ytdlp_path: String,

    // Provider credentials (optional)
    pub spotify_client_id: Option<String>,
    pub spotify_client_secret: Option<String>,
    pub soundcloud_client_id: Option<String>,
}

impl Config {
    pub fn load() -> Result<Self> {
        dotenvy::dotenv().ok();

        let config = Self {
            // Discord
            discord_token: std::env::var("DISCORD_TOKEN").context("DISCORD_TOKEN is not set")?,
            application_id: std::env::var("APPLICATION_ID")
                .context("APPLICATION_ID is not set")?
                .parse()
                .context("APPLICATION_ID must be a number")?,
            guild_id: std::env::var("GUILD_ID").ok().and_then(|s| s.parse().ok()),

            // Audio
            default_volume: std::env::var("DEFAULT_VOLUME")
                .unwrap_or_else(|_| "50".to_string())
                .parse()
                .context("DEFAULT_VOLUME must be a percentage")?,
            max_queue_size: std::env::var("MAX_QUEUE_SIZE")
                .unwrap_or_else(|_| "0".to_string())
                .parse()?,

            // Resolver
            search_fallback: parse_fallback(
                &std::env::var("SEARCH_FALLBACK").unwrap_or_else(|_| "youtube".to_string()),
            )?,
            resolve_timeout_secs: std::env::var("RESOLVE_TIMEOUT_SECS")
                .unwrap_or_else(|_| "30".to_string())
                .parse()?,
            ytdlp_path: std::env::var("YTDLP_PATH").unwrap_or_else(|_| "yt-dlp".to_string()),

            // Providers
            spotify_client_id: non_empty_var("SPOTIFY_CLIENT_ID"),
            spotify_client_secret: non_empty_var("SPOTIFY_CLIENT_SECRET"),
            soundcloud_client_id: non_empty_var("SOUNDCLOUD_CLIENT_ID"),
        };

        config.validate()?;

        Ok(config)
    }

    /// Validates configuration values for correctness.
    ///
    /// # Validation Rules
    ///
    /// - Default volume must be a percentage (0-100)
    /// - Spotify credentials must be given as a pair
    pub fn validate(&self) -> Result<()> {
        if self.default_volume > 100 {
            anyhow::bail!(
                "Default volume must be between 0 and 100, got: {}",
                self.default_volume
            );
        }

        if self.spotify_client_id.is_some() != self.spotify_client_secret.is_some() {
            anyhow::bail!("SPOTIFY_CLIENT_ID and SPOTIFY_CLIENT_SECRET must be set together");
        }

        if self.ytdlp_path.trim().is_empty() {
            anyhow::bail!("YTDLP_PATH cannot be empty");
        }

        Ok(())
    }

    /// Queue cap applied to every session, `None` when unlimited.
    pub fn queue_limit(&self) -> Option<usize> {
        (self.max_queue_size > 0).then_some(self.max_queue_size)
    }

    pub fn resolve_timeout(&self) -> Option<Duration> {
        (self.resolve_timeout_secs > 0).then(|| Duration::from_secs(self.resolve_timeout_secs))
    }

    /// Returns a summary of the current configuration for logging.
    ///
    /// Tokens and client secrets are never included.
    pub fn summary(&self) -> String {
        format!(
            "Config Summary:\n  \
            Discord: App ID {} (Guild: {})\n  \
            Audio: {}% vol, queue limit {}\n  \
            Resolver: fallback {}, timeout {}\n  \
            Providers: spotify={}, soundcloud={}",
            self.application_id,
            self.guild_id.map_or("global".to_string(), |id| id.to_string()),
            self.default_volume,
            self.queue_limit()
                .map_or("none".to_string(), |limit| limit.to_string()),
            self.search_fallback.map_or("none", |kind| kind.as_str()),
            self.resolve_timeout()
                .map_or("none".to_string(), |t| humantime::format_duration(t).to_string()),
            self.spotify_client_id.is_some(),
            self.soundcloud_client_id.is_some(),
        )
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            // Discord (no defaults - must be provided)
            discord_token: String::new(),
            application_id: 0,
            guild_id: None,

            default_volume: 50,
            max_queue_size: 0,

            search_fallback: Some(SourceKind::Video),
            resolve_timeout_secs: 30,
            ytdlp_path: "yt-dlp".to_string(),

            spotify_client_id: None,
            spotify_client_secret: None,
            soundcloud_client_id: None,
        }
    }
}

fn non_empty_var(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}

fn parse_fallback(value: &str) -> Result<Option<SourceKind>> {
    match value.trim().to_lowercase().as_str() {
        "none" | "" => Ok(None),
        other => other
            .parse()
            .map(Some)
            .map_err(|_| anyhow::anyhow!("Unknown SEARCH_FALLBACK value: {}", other)),
    }
}
