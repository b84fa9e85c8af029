//! A deterministic, synthetic [`Ingest`] used by the `run`/`ingest`
//! subcommands. The real upstream live-platform client is out of scope
//! for this system (spec §1); this stands in so the pipeline can be
//! exercised end to end without a live connection.
//!
//! Deliberately round-robin rather than random: reproducible demo runs
//! are more useful for an operator checking their registry configuration
//! than a different event mix on every invocation.

use async_trait::async_trait;
use chrono::Utc;
use liveops_contracts::{
    CommenterBadges, EventKind, EventPayload, EventUser, Ingest, IngestError, RawEvent,
};
use tokio::time::{sleep, Duration};

/// Cycles through every [`EventKind`], emitting one synthetic event per
/// kind per cycle, pausing `interval` between events. Stops after
/// `max_events` (if set), otherwise runs until the caller stops polling it.
pub struct DemoIngest {
    session_name: String,
    interval: Duration,
    max_events: Option<u64>,
    emitted: u64,
    cursor: usize,
}

impl DemoIngest {
    pub fn new(session_name: impl Into<String>, interval: Duration, max_events: Option<u64>) -> Self {
        Self {
            session_name: session_name.into(),
            interval,
            max_events,
            emitted: 0,
            cursor: 0,
        }
    }

    fn next_payload(&self, kind: EventKind) -> (EventPayload, bool, u32) {
        match kind {
            EventKind::Comment => (
                EventPayload::Comment {
                    text: format!("synthetic comment #{}", self.emitted),
                    badges: CommenterBadges::default(),
                },
                false,
                1,
            ),
            EventKind::Gift => (
                EventPayload::Gift {
                    gift_id: "rose".into(),
                    gift_name: "Rose".into(),
                    diamond_value: 1,
                    repeat_count: 1,
                    running_total: None,
                },
                false,
                1,
            ),
            EventKind::Like => (EventPayload::Like { count: 1 }, true, 1),
            EventKind::Share => (EventPayload::Share { platform: None }, false, 1),
            EventKind::Follow => (EventPayload::Follow, false, 1),
            EventKind::Join => (EventPayload::Join, false, 1),
            EventKind::Subscribe => (
                EventPayload::Subscribe {
                    tier: None,
                    months: Some(1),
                },
                false,
                1,
            ),
        }
    }
}

#[async_trait]
impl Ingest for DemoIngest {
    async fn next_event(&mut self) -> Result<Option<RawEvent>, IngestError> {
        if let Some(max) = self.max_events {
            if self.emitted >= max {
                return Ok(None);
            }
        }

        sleep(self.interval).await;

        let kind = EventKind::ALL[self.cursor % EventKind::ALL.len()];
        self.cursor += 1;

        let (payload, is_streak, repeat_count) = self.next_payload(kind);

        let event = RawEvent {
            kind,
            timestamp: Utc::now(),
            room_id: self.session_name.clone(),
            streamer_unique_id: self.session_name.clone(),
            user: EventUser {
                user_id: format!("demo-user-{}", self.emitted % 5),
                handle: format!("demo_user_{}", self.emitted % 5),
                display_name: format!("Demo User {}", self.emitted % 5),
                is_moderator: false,
                is_subscriber: false,
                gifter_level: None,
                member_level: None,
            },
            payload,
            is_streak,
            repeat_count,
        };

        self.emitted += 1;
        Ok(Some(event))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn stops_after_max_events() {
        let mut ingest = DemoIngest::new("test-session", Duration::from_millis(1), Some(3));
        let mut seen = 0;
        while ingest.next_event().await.unwrap().is_some() {
            seen += 1;
        }
        assert_eq!(seen, 3);
    }

    #[tokio::test]
    async fn cycles_through_every_kind() {
        let mut ingest = DemoIngest::new("test-session", Duration::from_millis(1), Some(7));
        let mut kinds = Vec::new();
        while let Some(event) = ingest.next_event().await.unwrap() {
            kinds.push(event.kind);
        }
        assert_eq!(kinds, EventKind::ALL.to_vec());
    }
}
