use serenity::model::id::GuildId;
use std::{sync::Arc, time::Duration};
use tokio::sync::{broadcast, Mutex};
use tracing::{debug, info, warn};

use super::{
    error::PlaybackError,
    queue::{LoopMode, MusicQueue},
    sink::{AudioSink, PlaybackId, SinkEvent, TerminalKind},
};
use crate::sources::{PlayableTrack, TrackResolver};

const EVENT_BUFFER: usize = 32;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaybackStatus {
    Idle,
    Playing,
    Paused,
}

impl PlaybackStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PlaybackStatus::Idle => "idle",
            PlaybackStatus::Playing => "playing",
            PlaybackStatus::Paused => "paused",
        }
    }
}

/// The single response every user command produces.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommandOutcome {
    Queued { title: String, position: usize },
    NowPlaying(String),
    Paused,
    Resumed,
    Skipped { next: Option<String> },
    Stopped,
    QueueSnapshot(Vec<String>),
    VolumeSet(u8),
    LoopToggled(bool),
    Error(PlaybackError),
}

impl From<Result<CommandOutcome, PlaybackError>> for CommandOutcome {
    fn from(result: Result<CommandOutcome, PlaybackError>) -> Self {
        result.unwrap_or_else(CommandOutcome::Error)
    }
}

/// Things that happen without a command asking for them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    NowPlaying(String),
    /// A queued track could not be started and was dropped
    TrackFailed { title: String, error: PlaybackError },
    /// The sink gave up on a track mid-playback
    TrackErrored { title: String, reason: String },
    QueueFinished,
}

/// Read-only view used for rendering.
#[derive(Debug, Clone)]
pub struct SessionSnapshot {
    pub status: PlaybackStatus,
    pub current: Option<PlayableTrack>,
    pub upcoming: Vec<String>,
    pub volume: u8,
    pub loop_mode: LoopMode,
    pub total_duration: Duration,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum AdvanceCause {
    Enqueued,
    Finished,
    Errored,
    Skipped,
}

struct SessionState {
    queue: MusicQueue,
    volume: u8,
    status: PlaybackStatus,
    /// Bumped by stop; resolutions started under an older epoch are dropped
    epoch: u64,
    /// The playback whose terminal event may still advance the queue
    playback: Option<PlaybackId>,
    next_playback: u64,
}

/// Playback state for one voice connection.
///
/// Every mutation runs under one async lock. Resolution runs outside of it.
pub struct PlaybackSession {
    guild_id: GuildId,
    resolver: Arc<TrackResolver>,
    sink: Arc<dyn AudioSink>,
    state: Mutex<SessionState>,
    events: broadcast::Sender<SessionEvent>,
    queue_limit: Option<usize>,
}

impl PlaybackSession {
    pub fn new(
        guild_id: GuildId,
        resolver: Arc<TrackResolver>,
        sink: Arc<dyn AudioSink>,
        volume: u8,
        queue_limit: Option<usize>,
    ) -> Self {
        let (events, _) = broadcast::channel(EVENT_BUFFER);
        Self {
            guild_id,
            resolver,
            sink,
            state: Mutex::new(SessionState {
                queue: MusicQueue::new(),
                volume: volume.min(100),
                status: PlaybackStatus::Idle,
                epoch: 0,
                playback: None,
                next_playback: 0,
            }),
            events,
            queue_limit,
        }
    }

    pub fn guild_id(&self) -> GuildId {
        self.guild_id
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.events.subscribe()
    }

    /// Resolves `query` and enqueues the result.
    ///
    /// Fails with [`PlaybackError::Superseded`] when a `stop` landed while
    /// the query was still resolving.
    pub async fn play(&self, query: &str) -> Result<CommandOutcome, PlaybackError> {
        let epoch = self.state.lock().await.epoch;
        info!("🎵 [{}] Play requested: {}", self.guild_id, query);

        let track = self.resolver.resolve(query).await?;

        let mut state = self.state.lock().await;
        if state.epoch != epoch {
            warn!(
                "🚫 [{}] Discarding '{}', playback was stopped while resolving",
                self.guild_id,
                track.title()
            );
            return Err(PlaybackError::Superseded);
        }

        self.enqueue_locked(&mut state, track).await
    }

    pub async fn enqueue(&self, track: PlayableTrack) -> Result<CommandOutcome, PlaybackError> {
        let mut state = self.state.lock().await;
        self.enqueue_locked(&mut state, track).await
    }

    async fn enqueue_locked(
        &self,
        state: &mut SessionState,
        track: PlayableTrack,
    ) -> Result<CommandOutcome, PlaybackError> {
        if let Some(cap) = self.queue_limit {
            if state.queue.len() >= cap {
                warn!("📦 [{}] Queue full ({} tracks)", self.guild_id, cap);
                return Err(PlaybackError::QueueFull(cap));
            }
        }

        let title = track.title().to_string();
        let position = state.queue.push(track);

        if state.status != PlaybackStatus::Idle {
            return Ok(CommandOutcome::Queued { title, position });
        }

        match self.advance(state, AdvanceCause::Enqueued).await? {
            Some(started) => Ok(CommandOutcome::NowPlaying(started)),
            None => Err(PlaybackError::EmptyQueue),
        }
    }

    /// Retires the current entry and starts the next playable one.
    ///
    /// Entries the sink refuses are reported and dropped. Returns the title
    /// that started, or the last start failure once the queue ran dry.
    async fn advance(
        &self,
        state: &mut SessionState,
        cause: AdvanceCause,
    ) -> Result<Option<String>, PlaybackError> {
        state.queue.retire_current(cause == AdvanceCause::Finished);
        state.playback = None;

        let mut last_failure = None;
        while let Some(entry) = state.queue.promote_next() {
            let title = entry.title().to_string();
            let stream = entry.track.stream_ref().clone();

            state.next_playback += 1;
            let playback = PlaybackId(state.next_playback);

            match self.sink.play(playback, &stream, state.volume).await {
                Ok(()) => {
                    info!("🎶 [{}] Now playing: {}", self.guild_id, title);
                    state.status = PlaybackStatus::Playing;
                    state.playback = Some(playback);
                    let _ = self.events.send(SessionEvent::NowPlaying(title.clone()));
                    return Ok(Some(title));
                }
                Err(e) => {
                    let error = PlaybackError::start_failure(e);
                    warn!("❌ [{}] Could not start '{}': {}", self.guild_id, title, error);
                    state.queue.discard_current();
                    let _ = self.events.send(SessionEvent::TrackFailed {
                        title,
                        error: error.clone(),
                    });
                    last_failure = Some(error);
                }
            }
        }

        state.status = PlaybackStatus::Idle;
        if cause != AdvanceCause::Enqueued {
            info!("📭 [{}] Queue finished", self.guild_id);
            let _ = self.events.send(SessionEvent::QueueFinished);
        }

        match last_failure {
            Some(error) => Err(error),
            None => Ok(None),
        }
    }

    /// Applies a terminal event coming from the sink.
    ///
    /// Events for any playback other than the bound one are stale and ignored,
    /// so each playback advances the queue at most once.
    pub async fn handle_sink_event(&self, event: SinkEvent) {
        let mut state = self.state.lock().await;
        if state.playback != Some(event.playback) {
            debug!(
                "🕳️ [{}] Ignoring stale terminal event for {}",
                self.guild_id, event.playback
            );
            return;
        }
        state.playback = None;

        let cause = match event.kind {
            TerminalKind::Finished => AdvanceCause::Finished,
            TerminalKind::Errored(reason) => {
                let title = state
                    .queue
                    .current()
                    .map(|e| e.title().to_string())
                    .unwrap_or_default();
                warn!("⚠️ [{}] Playback of '{}' errored: {}", self.guild_id, title, reason);
                let _ = self.events.send(SessionEvent::TrackErrored { title, reason });
                AdvanceCause::Errored
            }
        };

        // Start failures were already broadcast
        let _ = self.advance(&mut state, cause).await;
    }

    pub async fn pause(&self) -> Result<CommandOutcome, PlaybackError> {
        let mut state = self.state.lock().await;
        if state.status != PlaybackStatus::Playing {
            return Err(PlaybackError::InvalidSinkState(state.status.as_str()));
        }

        self.sink.pause()?;
        state.status = PlaybackStatus::Paused;
        info!("⏸️ [{}] Paused", self.guild_id);
        Ok(CommandOutcome::Paused)
    }

    pub async fn resume(&self) -> Result<CommandOutcome, PlaybackError> {
        let mut state = self.state.lock().await;
        if state.status != PlaybackStatus::Paused {
            return Err(PlaybackError::InvalidSinkState(state.status.as_str()));
        }

        self.sink.resume()?;
        state.status = PlaybackStatus::Playing;
        info!("▶️ [{}] Resumed", self.guild_id);
        Ok(CommandOutcome::Resumed)
    }

    /// Ends the current track and moves on. Loop mode does not apply.
    pub async fn skip(&self) -> Result<CommandOutcome, PlaybackError> {
        let mut state = self.state.lock().await;
        if state.status == PlaybackStatus::Idle {
            return Err(PlaybackError::EmptyQueue);
        }

        info!("⏭️ [{}] Skipping", self.guild_id);
        self.sink.stop();
        let next = self
            .advance(&mut state, AdvanceCause::Skipped)
            .await
            .ok()
            .flatten();

        Ok(CommandOutcome::Skipped { next })
    }

    pub async fn stop(&self) -> Result<CommandOutcome, PlaybackError> {
        let mut state = self.state.lock().await;

        self.sink.stop();
        state.queue.clear();
        state.status = PlaybackStatus::Idle;
        state.playback = None;
        state.epoch += 1;

        info!("⏹️ [{}] Stopped (epoch {})", self.guild_id, state.epoch);
        Ok(CommandOutcome::Stopped)
    }

    /// Stores the volume clamped to 0..=100 and applies it to a bound track.
    ///
    /// The stored level always wins; a track that cannot take it only logs.
    pub async fn set_volume(&self, percent: i64) -> Result<CommandOutcome, PlaybackError> {
        let volume = percent.clamp(0, 100) as u8;
        let mut state = self.state.lock().await;
        state.volume = volume;

        if state.status != PlaybackStatus::Idle {
            if let Err(e) = self.sink.set_volume(volume) {
                warn!("⚠️ [{}] Volume not applied to the current track: {}", self.guild_id, e);
            }
        }

        info!("🔊 [{}] Volume set to {}%", self.guild_id, volume);
        Ok(CommandOutcome::VolumeSet(volume))
    }

    pub async fn toggle_loop(&self) -> Result<CommandOutcome, PlaybackError> {
        let enabled = self.state.lock().await.queue.toggle_loop();
        Ok(CommandOutcome::LoopToggled(enabled))
    }

    pub async fn queue(&self) -> Result<CommandOutcome, PlaybackError> {
        let titles = self.state.lock().await.queue.titles();
        Ok(CommandOutcome::QueueSnapshot(titles))
    }

    pub async fn now_playing(&self) -> Result<CommandOutcome, PlaybackError> {
        let state = self.state.lock().await;
        state
            .queue
            .current()
            .map(|e| CommandOutcome::NowPlaying(e.title().to_string()))
            .ok_or(PlaybackError::EmptyQueue)
    }

    pub async fn status(&self) -> PlaybackStatus {
        self.state.lock().await.status
    }

    pub async fn snapshot(&self) -> SessionSnapshot {
        let state = self.state.lock().await;
        SessionSnapshot {
            status: state.status,
            current: state.queue.current().map(|e| e.track.clone()),
            upcoming: state.queue.titles(),
            volume: state.volume,
            loop_mode: state.queue.loop_mode(),
            total_duration: state.queue.total_duration(),
        }
    }

    /// Halts playback and drops everything queued before disconnecting.
    pub async fn shutdown(&self) {
        let _ = self.stop().await;
        debug!("👋 [{}] Session shut down", self.guild_id);
    }
}
