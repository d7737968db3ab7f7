use thiserror::Error;

use crate::sources::ResolutionError;

/// Failures reported by an [`AudioSink`](super::sink::AudioSink).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SinkError {
    #[error("sink cannot {0} in its current state")]
    InvalidState(&'static str),
    #[error("audio backend error: {0}")]
    Backend(String),
}

/// Every way a session command can fail. None of them end the session.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PlaybackError {
    #[error("unrecognized source: {0}")]
    UnrecognizedSource(String),
    #[error("provider unavailable: {0}")]
    ProviderUnavailable(String),
    #[error("no playable stream: {0}")]
    NoPlayableStream(String),
    #[error("command not valid while {0}")]
    InvalidSinkState(&'static str),
    #[error("nothing is playing")]
    EmptyQueue,
    #[error("queue is full (max {0} tracks)")]
    QueueFull(usize),
    #[error("request discarded, playback was stopped while it resolved")]
    Superseded,
}

impl From<ResolutionError> for PlaybackError {
    fn from(err: ResolutionError) -> Self {
        match err {
            ResolutionError::UnrecognizedSource(query) => PlaybackError::UnrecognizedSource(query),
            ResolutionError::ProviderUnavailable { provider, reason } => {
                PlaybackError::ProviderUnavailable(format!("{}: {}", provider, reason))
            }
            ResolutionError::NoPlayableStream(what) => PlaybackError::NoPlayableStream(what),
        }
    }
}

/// Control-path failures (pause, resume, volume). A backend error here means
/// the bound track already ended.
impl From<SinkError> for PlaybackError {
    fn from(err: SinkError) -> Self {
        match err {
            SinkError::InvalidState(op) => PlaybackError::InvalidSinkState(op),
            SinkError::Backend(_) => PlaybackError::InvalidSinkState("ending"),
        }
    }
}

impl PlaybackError {
    /// Maps a sink failure to start a stream.
    pub fn start_failure(err: SinkError) -> Self {
        match err {
            SinkError::InvalidState(op) => PlaybackError::InvalidSinkState(op),
            SinkError::Backend(reason) => PlaybackError::NoPlayableStream(reason),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn backend_failures_depend_on_the_path() {
        let backend = || SinkError::Backend("Finished".to_string());

        assert_eq!(PlaybackError::from(backend()), PlaybackError::InvalidSinkState("ending"));
        assert_eq!(
            PlaybackError::start_failure(backend()),
            PlaybackError::NoPlayableStream("Finished".to_string())
        );
        assert_eq!(
            PlaybackError::start_failure(SinkError::InvalidState("play")),
            PlaybackError::InvalidSinkState("play")
        );
    }
}
