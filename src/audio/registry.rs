use dashmap::{mapref::entry::Entry, DashMap};
use serenity::model::id::GuildId;
use std::sync::{Arc, Weak};
use tokio::sync::mpsc;
use tracing::{debug, info};

use super::{
    session::PlaybackSession,
    sink::{AudioSink, SinkEventReceiver, SinkEventSender},
};
use crate::sources::TrackResolver;

/// Maps each guild to its live playback session.
///
/// A session is created when the bot connects to a voice channel and removed
/// when it leaves, so an entry exists exactly while the connection does.
pub struct SessionRegistry {
    sessions: DashMap<GuildId, Arc<PlaybackSession>>,
    resolver: Arc<TrackResolver>,
    default_volume: u8,
    queue_limit: Option<usize>,
}

impl SessionRegistry {
    pub fn new(resolver: Arc<TrackResolver>, default_volume: u8, queue_limit: Option<usize>) -> Self {
        Self {
            sessions: DashMap::new(),
            resolver,
            default_volume,
            queue_limit,
        }
    }

    pub fn get(&self, guild_id: GuildId) -> Option<Arc<PlaybackSession>> {
        self.sessions.get(&guild_id).map(|s| s.value().clone())
    }

    /// Returns the guild's session, creating it when absent.
    ///
    /// `make_sink` only runs on creation. It receives the sender the sink
    /// must use for terminal events.
    pub fn get_or_create<F>(&self, guild_id: GuildId, make_sink: F) -> Arc<PlaybackSession>
    where
        F: FnOnce(SinkEventSender) -> Arc<dyn AudioSink>,
    {
        match self.sessions.entry(guild_id) {
            Entry::Occupied(existing) => existing.get().clone(),
            Entry::Vacant(slot) => {
                let (tx, rx) = mpsc::unbounded_channel();
                let session = Arc::new(PlaybackSession::new(
                    guild_id,
                    self.resolver.clone(),
                    make_sink(tx),
                    self.default_volume,
                    self.queue_limit,
                ));

                spawn_event_pump(Arc::downgrade(&session), rx);
                info!("🆕 Session created for guild {}", guild_id);
                slot.insert(session.clone());
                session
            }
        }
    }

    /// Stops and forgets the guild's session. Returns false if there was none.
    pub async fn remove(&self, guild_id: GuildId) -> bool {
        let Some((_, session)) = self.sessions.remove(&guild_id) else {
            return false;
        };

        session.shutdown().await;
        info!("🗑️ Session removed for guild {}", guild_id);
        true
    }

    pub async fn shutdown_all(&self) {
        let guilds: Vec<GuildId> = self.sessions.iter().map(|s| *s.key()).collect();
        for guild_id in guilds {
            self.remove(guild_id).await;
        }
    }

    pub fn contains(&self, guild_id: GuildId) -> bool {
        self.sessions.contains_key(&guild_id)
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}

/// Feeds sink terminal events into the session until either side goes away.
fn spawn_event_pump(session: Weak<PlaybackSession>, mut events: SinkEventReceiver) {
    tokio::spawn(async move {
        while let Some(event) = events.recv().await {
            let Some(session) = session.upgrade() else {
                break;
            };
            session.handle_sink_event(event).await;
        }
        debug!("🔌 Sink event pump finished");
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::{
        session::{CommandOutcome, SessionEvent},
        sink::{testing::RecordingSink, SinkEvent, TerminalKind},
    };
    use crate::sources::testing::echo_resolver;
    use pretty_assertions::assert_eq;
    use std::time::Duration;

    fn registry() -> SessionRegistry {
        SessionRegistry::new(echo_resolver(), 40, None)
    }

    #[tokio::test]
    async fn creates_once_per_guild() {
        let registry = registry();
        let guild = GuildId::new(10);
        let mut sinks_built = 0;

        let first = registry.get_or_create(guild, |_| {
            sinks_built += 1;
            RecordingSink::new()
        });
        let second = registry.get_or_create(guild, |_| {
            sinks_built += 1;
            RecordingSink::new()
        });

        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(sinks_built, 1);
        assert_eq!(registry.len(), 1);
        assert!(registry.get(GuildId::new(11)).is_none());
    }

    #[tokio::test]
    async fn guilds_are_isolated() {
        let registry = registry();
        let sink_a = RecordingSink::new();
        let sink_b = RecordingSink::new();

        let a = registry.get_or_create(GuildId::new(1), |_| sink_a.clone());
        let b = registry.get_or_create(GuildId::new(2), |_| sink_b.clone());

        a.play("only here").await.unwrap();
        assert_eq!(sink_a.played().len(), 1);
        assert!(sink_b.played().is_empty());
        assert_eq!(b.now_playing().await, Err(crate::audio::PlaybackError::EmptyQueue));
    }

    #[tokio::test]
    async fn remove_stops_the_session() {
        let registry = registry();
        let guild = GuildId::new(3);
        let sink = RecordingSink::new();

        let session = registry.get_or_create(guild, |_| sink.clone());
        session.play("A").await.unwrap();
        session.play("B").await.unwrap();

        assert!(registry.remove(guild).await);
        assert!(!registry.contains(guild));
        assert_eq!(session.queue().await, Ok(CommandOutcome::QueueSnapshot(vec![])));
        assert!(!registry.remove(guild).await);
    }

    #[tokio::test]
    async fn terminal_events_reach_the_session() {
        let registry = registry();
        let guild = GuildId::new(4);
        let sink = RecordingSink::new();
        let mut sender = None;

        let session = registry.get_or_create(guild, |tx| {
            sender = Some(tx);
            sink.clone()
        });
        session.play("A").await.unwrap();
        session.play("B").await.unwrap();
        let mut events = session.subscribe();

        let finished: SinkEvent = sink.finish(TerminalKind::Finished).unwrap();
        sender.unwrap().send(finished).unwrap();

        let next = tokio::time::timeout(Duration::from_secs(1), events.recv())
            .await
            .expect("advance should happen")
            .unwrap();
        assert_eq!(next, SessionEvent::NowPlaying("B".to_string()));
    }

    #[tokio::test]
    async fn shutdown_all_empties_registry() {
        let registry = registry();
        for id in 1..=3 {
            registry.get_or_create(GuildId::new(id), |_| RecordingSink::new());
        }

        registry.shutdown_all().await;
        assert!(registry.is_empty());
    }
}
