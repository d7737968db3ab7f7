use async_trait::async_trait;
use parking_lot::Mutex as SyncMutex;
use songbird::{
    input::{File, HttpRequest, Input},
    tracks::{PlayMode, TrackHandle},
    Call, Event, EventContext, EventHandler as VoiceEventHandler, TrackEvent,
};
use std::{
    fmt,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
};
use tokio::sync::{mpsc, Mutex};
use tracing::{debug, error, info, warn};

use super::error::SinkError;
use crate::sources::StreamRef;

/// Identifies one `play` call on a sink.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PlaybackId(pub u64);

impl fmt::Display for PlaybackId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TerminalKind {
    Finished,
    Errored(String),
}

/// The single end-of-playback notification for one [`PlaybackId`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SinkEvent {
    pub playback: PlaybackId,
    pub kind: TerminalKind,
}

pub type SinkEventSender = mpsc::UnboundedSender<SinkEvent>;
pub type SinkEventReceiver = mpsc::UnboundedReceiver<SinkEvent>;

/// One continuous playback channel.
///
/// Implementations emit exactly one [`SinkEvent`] per successful `play`,
/// including when the playback is cut short by `stop`.
#[async_trait]
pub trait AudioSink: Send + Sync {
    async fn play(
        &self,
        playback: PlaybackId,
        stream: &StreamRef,
        volume_percent: u8,
    ) -> Result<(), SinkError>;

    fn pause(&self) -> Result<(), SinkError>;

    fn resume(&self) -> Result<(), SinkError>;

    fn stop(&self);

    fn set_volume(&self, percent: u8) -> Result<(), SinkError>;
}

struct ActiveTrack {
    playback: PlaybackId,
    handle: TrackHandle,
    paused: bool,
}

/// [`AudioSink`] backed by a songbird voice call.
pub struct SongbirdSink {
    call: Arc<Mutex<Call>>,
    http: reqwest::Client,
    events: SinkEventSender,
    current: SyncMutex<Option<ActiveTrack>>,
}

impl SongbirdSink {
    pub fn new(call: Arc<Mutex<Call>>, events: SinkEventSender) -> Self {
        Self {
            call,
            http: reqwest::Client::new(),
            events,
            current: SyncMutex::new(None),
        }
    }

    fn input_for(&self, stream: &StreamRef) -> Input {
        match stream {
            StreamRef::Url(url) => HttpRequest::new(self.http.clone(), url.clone()).into(),
            StreamRef::File(path) => File::new(path.clone()).into(),
        }
    }
}

fn backend<E: fmt::Debug>(err: E) -> SinkError {
    SinkError::Backend(format!("{:?}", err))
}

#[async_trait]
impl AudioSink for SongbirdSink {
    async fn play(
        &self,
        playback: PlaybackId,
        stream: &StreamRef,
        volume_percent: u8,
    ) -> Result<(), SinkError> {
        let previous = self.current.lock().as_ref().map(|t| t.handle.clone());
        if let Some(handle) = previous {
            // A finished track answers get_info with an error
            if let Ok(state) = handle.get_info().await {
                if matches!(state.playing, PlayMode::Play | PlayMode::Pause) {
                    warn!("⚠️ play {} requested while a track is still active", playback);
                    return Err(SinkError::InvalidState("play"));
                }
            }
        }

        let input = self.input_for(stream);
        let handle = {
            let mut call = self.call.lock().await;
            call.play_input(input)
        };

        handle
            .set_volume(f32::from(volume_percent) / 100.0)
            .map_err(backend)?;

        let notifier = TerminalNotifier {
            playback,
            events: self.events.clone(),
            fired: Arc::new(AtomicBool::new(false)),
        };
        handle
            .add_event(Event::Track(TrackEvent::End), notifier.clone())
            .map_err(backend)?;
        handle
            .add_event(Event::Track(TrackEvent::Error), notifier)
            .map_err(backend)?;

        info!("▶️ Sink playing {}: {}", playback, stream);
        *self.current.lock() = Some(ActiveTrack {
            playback,
            handle,
            paused: false,
        });

        Ok(())
    }

    fn pause(&self) -> Result<(), SinkError> {
        let mut current = self.current.lock();
        match current.as_mut() {
            Some(track) if !track.paused => {
                track.handle.pause().map_err(backend)?;
                track.paused = true;
                Ok(())
            }
            _ => Err(SinkError::InvalidState("pause")),
        }
    }

    fn resume(&self) -> Result<(), SinkError> {
        let mut current = self.current.lock();
        match current.as_mut() {
            Some(track) if track.paused => {
                track.handle.play().map_err(backend)?;
                track.paused = false;
                Ok(())
            }
            _ => Err(SinkError::InvalidState("resume")),
        }
    }

    fn stop(&self) {
        if let Some(track) = self.current.lock().take() {
            debug!("⏹️ Sink stopping {}", track.playback);
            // Already-finished tracks refuse control messages
            let _ = track.handle.stop();
        }
    }

    fn set_volume(&self, percent: u8) -> Result<(), SinkError> {
        match self.current.lock().as_ref() {
            Some(track) => track
                .handle
                .set_volume(f32::from(percent) / 100.0)
                .map_err(backend),
            None => Ok(()),
        }
    }
}

/// Forwards the first End/Error event of one track to the session.
#[derive(Clone)]
struct TerminalNotifier {
    playback: PlaybackId,
    events: SinkEventSender,
    fired: Arc<AtomicBool>,
}

#[async_trait]
impl VoiceEventHandler for TerminalNotifier {
    async fn act(&self, ctx: &EventContext<'_>) -> Option<Event> {
        if self.fired.swap(true, Ordering::SeqCst) {
            return Some(Event::Cancel);
        }

        let kind = match ctx {
            EventContext::Track(tracks) => match tracks.first().map(|(state, _)| &state.playing) {
                Some(PlayMode::Errored(e)) => TerminalKind::Errored(format!("{:?}", e)),
                _ => TerminalKind::Finished,
            },
            _ => TerminalKind::Finished,
        };

        debug!("🏁 Terminal event for {}: {:?}", self.playback, kind);
        if self
            .events
            .send(SinkEvent {
                playback: self.playback,
                kind,
            })
            .is_err()
        {
            error!("Session for playback {} is gone, terminal event dropped", self.playback);
        }

        Some(Event::Cancel)
    }
}
