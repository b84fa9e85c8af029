//! The platform event model: the immutable record that flows from ingest,
//! through streak enrichment, into the dispatcher and onward to services.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// The discriminator among the platform's interaction event kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EventKind {
    Comment,
    Gift,
    Like,
    Share,
    Follow,
    Join,
    Subscribe,
}

impl EventKind {
    /// All kinds, in declaration order. Used by the registry when building
    /// its per-kind subscription index.
    pub const ALL: [EventKind; 7] = [
        EventKind::Comment,
        EventKind::Gift,
        EventKind::Like,
        EventKind::Share,
        EventKind::Follow,
        EventKind::Join,
        EventKind::Subscribe,
    ];
}

impl std::fmt::Display for EventKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            EventKind::Comment => "Comment",
            EventKind::Gift => "Gift",
            EventKind::Like => "Like",
            EventKind::Share => "Share",
            EventKind::Follow => "Follow",
            EventKind::Join => "Join",
            EventKind::Subscribe => "Subscribe",
        };
        f.write_str(s)
    }
}

/// Phase of a streak (burst of repeated gift/like events from one user).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum StreakPhase {
    Start,
    Continue,
    End,
}

/// The acting user, as supplied by the upstream client. Badge fields are
/// populated only where the upstream client reports them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventUser {
    pub user_id: String,
    pub handle: String,
    pub display_name: String,
    pub is_moderator: bool,
    pub is_subscriber: bool,
    pub gifter_level: Option<u32>,
    pub member_level: Option<u32>,
}

/// Badges as they applied at the moment a particular comment was posted.
/// Kept distinct from [`EventUser`]'s standing badges since a commenter's
/// level can change mid-session and the original per-event capture reflects
/// the value observed at comment time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct CommenterBadges {
    pub is_moderator: bool,
    pub is_subscriber: bool,
    pub gifter_level: Option<u32>,
    pub member_level: Option<u32>,
}

/// The kind-specific body of an event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum EventPayload {
    Comment {
        text: String,
        badges: CommenterBadges,
    },
    Gift {
        gift_id: String,
        gift_name: String,
        diamond_value: u32,
        repeat_count: u32,
        /// Sum of `repeat_count` across the burst so far. `None` until the
        /// streak tracker has enriched the event (or for a standalone,
        /// non-streaking gift, which carries no running total).
        running_total: Option<u32>,
    },
    Like {
        count: u32,
    },
    Share {
        platform: Option<String>,
    },
    Follow,
    Join,
    Subscribe {
        tier: Option<String>,
        months: Option<u32>,
    },
}

/// An event exactly as produced by the ingest adapter, before streak
/// enrichment. The streak tracker consumes one of these and produces an
/// [`Event`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawEvent {
    pub kind: EventKind,
    pub timestamp: DateTime<Utc>,
    pub room_id: String,
    pub streamer_unique_id: String,
    pub user: EventUser,
    pub payload: EventPayload,
    /// Whether the upstream client marked this event as part of a streak.
    pub is_streak: bool,
    /// Units contributed by this event to the streak's running total
    /// (1 for a single gift/like, N for a batched repeat).
    pub repeat_count: u32,
}

/// A fully enriched, immutable platform event. Constructed only by the
/// streak tracker; referenced by queue items; never mutated afterward.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    pub kind: EventKind,
    pub timestamp: DateTime<Utc>,
    pub room_id: String,
    pub streamer_unique_id: String,
    pub user: EventUser,
    pub payload: EventPayload,
    pub streaking: Option<bool>,
    pub streak_id: Option<Uuid>,
    pub streak_phase: Option<StreakPhase>,
}

impl Event {
    /// Whether this event's phase gate passes for an unstackable Gift
    /// subscription: only streak-phase-`end` gifts, or standalone
    /// (non-streaking) gifts, are dispatched.
    pub fn passes_unstackable_gate(&self) -> bool {
        !matches!(self.kind, EventKind::Gift)
            || matches!(self.streak_phase, Some(StreakPhase::End) | None)
    }
}
