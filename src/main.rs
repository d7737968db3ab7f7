use anyhow::Result;
use serenity::{model::gateway::GatewayIntents, Client};
use songbird::SerenityInit;
use std::sync::Arc;
use tracing::{error, info, warn};

use melody::{
    audio::SessionRegistry,
    bot::MelodyBot,
    config::Config,
    sources::{SoundCloudClient, SpotifyClient, TrackResolver, YouTubeClient},
};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("melody=debug".parse()?)
                .add_directive("serenity=info".parse()?)
                .add_directive("songbird=info".parse()?),
        )
        .init();

    info!("🎵 Starting Melody v{}", env!("CARGO_PKG_VERSION"));

    let config = Config::load()?;

    if std::env::args().any(|arg| arg == "--health-check") {
        return health_check(&config).await;
    }

    info!("⚙️ {}", config.summary());

    let resolver = Arc::new(build_resolver(&config));
    let registry = Arc::new(SessionRegistry::new(
        resolver,
        config.default_volume,
        config.queue_limit(),
    ));

    let intents = GatewayIntents::GUILDS | GatewayIntents::GUILD_VOICE_STATES;
    let handler = MelodyBot::new(config.clone(), registry.clone());

    let mut client = Client::builder(&config.discord_token, intents)
        .event_handler(handler)
        .register_songbird()
        .await?;

    let shard_manager = client.shard_manager.clone();
    tokio::spawn(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Could not listen for Ctrl+C: {:?}", e);
            return;
        }
        info!("⚠️ Shutdown signal received, stopping all sessions...");
        registry.shutdown_all().await;
        shard_manager.shutdown_all().await;
    });

    info!("🚀 Bot started");
    if let Err(why) = client.start().await {
        error!("Client error: {:?}", why);
    }

    Ok(())
}

/// YouTube needs no credentials; the other providers are optional
fn build_resolver(config: &Config) -> TrackResolver {
    let mut resolver = TrackResolver::new(config.search_fallback)
        .with_timeout(config.resolve_timeout())
        .with_source(Arc::new(YouTubeClient::new(config.ytdlp_path.clone())));

    match (&config.spotify_client_id, &config.spotify_client_secret) {
        (Some(id), Some(secret)) => {
            resolver = resolver.with_source(Arc::new(SpotifyClient::new(id.clone(), secret.clone())));
        }
        _ => warn!("🎧 Spotify credentials not set, Spotify links are disabled"),
    }

    match &config.soundcloud_client_id {
        Some(client_id) => {
            resolver = resolver.with_source(Arc::new(SoundCloudClient::new(client_id.clone())));
        }
        None => warn!("☁️ SoundCloud client id not set, SoundCloud links are disabled"),
    }

    resolver
}

async fn health_check(config: &Config) -> Result<()> {
    let yt_dlp = async_process::Command::new(&config.ytdlp_path)
        .arg("--version")
        .output()
        .await?;

    if yt_dlp.status.success() {
        println!("OK");
        Ok(())
    } else {
        anyhow::bail!("yt-dlp is missing or broken at {}", config.ytdlp_path);
    }
}
