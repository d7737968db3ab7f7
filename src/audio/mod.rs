//! # Audio Module
//!
//! Per-guild playback for Melody.
//!
//! ### [`queue`] - Queue bookkeeping
//! - FIFO of pending tracks plus the current slot
//! - Single-track repeat applied on natural completion only
//!
//! ### [`sink`] - Audio output
//! - [`AudioSink`] trait over one voice connection
//! - Terminal events tagged with a [`PlaybackId`]
//! - [`SongbirdSink`] for Discord voice
//!
//! ### [`session`] - Playback state machine
//! - `Idle`, `Playing` and `Paused` with every command serialized per guild
//! - Epoch counter so a `stop` discards in-flight resolutions
//!
//! ### [`registry`] - Session lookup
//! - One session per guild, created on connect and removed on disconnect
//!
//! ## Example Usage
//!
//! ```rust,no_run
//! use melody::audio::{AudioSink, SessionRegistry, SongbirdSink};
//! use melody::sources::{SourceKind, TrackResolver, YouTubeClient};
//! use serenity::all::GuildId;
//! use std::sync::Arc;
//!
//! # async fn example(call: Arc<tokio::sync::Mutex<songbird::Call>>) -> anyhow::Result<()> {
//! let resolver = TrackResolver::new(Some(SourceKind::Video))
//!     .with_source(Arc::new(YouTubeClient::new("yt-dlp".to_string())));
//! let registry = SessionRegistry::new(Arc::new(resolver), 50, None);
//!
//! let session = registry.get_or_create(GuildId::new(123456789), |events| {
//!     Arc::new(SongbirdSink::new(call, events)) as Arc<dyn AudioSink>
//! });
//! session.play("lofi hip hop").await?;
//! session.pause().await?;
//! # Ok(())
//! # }
//! ```

pub mod error;
pub mod queue;
pub mod registry;
pub mod session;
pub mod sink;

pub use error::{PlaybackError, SinkError};
pub use queue::{LoopMode, MusicQueue, QueueEntry};
pub use registry::SessionRegistry;
pub use session::{CommandOutcome, PlaybackSession, PlaybackStatus, SessionEvent, SessionSnapshot};
pub use sink::{AudioSink, PlaybackId, SinkEvent, SongbirdSink, TerminalKind};
