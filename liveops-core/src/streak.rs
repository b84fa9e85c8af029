//! Aggregates repeated gift/like bursts from the same user into
//! start/continue/end transitions.
//!
//! Lives at the ingest boundary, not inside the dispatcher: the dispatcher
//! receives already-enriched events and stays agnostic to streak logic.

use std::collections::HashMap;
use std::sync::Mutex;

use liveops_contracts::{Event, EventKind, EventPayload, RawEvent, StreakPhase};
use uuid::Uuid;

/// Key identifying one streak: the acting user, and for gifts the specific
/// gift id (likes key on the user alone).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct StreakKey {
    user_id: String,
    gift_id: Option<String>,
}

struct StreakState {
    streak_id: Uuid,
    running_total: u32,
}

/// Serializes streak bookkeeping per `(user, gift?)` key. A `Mutex` is
/// sufficient rather than a lock-free map: the tracker's own contract
/// already requires per-key serialization, so there is nothing to gain
/// from finer-grained concurrency here.
#[derive(Default)]
pub struct StreakTracker {
    state: Mutex<HashMap<StreakKey, StreakState>>,
}

impl StreakTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Enriches a raw event with streak metadata, mutating internal state
    /// as a side effect. Pure with respect to non-streaking events.
    pub fn enrich(&self, raw: RawEvent) -> Event {
        let key = streak_key(&raw);

        let (streaking, streak_id, streak_phase, running_total) = match key {
            Some(key) if raw.is_streak => {
                let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
                match state.get_mut(&key) {
                    Some(existing) => {
                        existing.running_total += raw.repeat_count;
                        (
                            Some(true),
                            Some(existing.streak_id),
                            Some(StreakPhase::Continue),
                            Some(existing.running_total),
                        )
                    }
                    None => {
                        let streak_id = Uuid::new_v4();
                        let running_total = raw.repeat_count;
                        state.insert(
                            key,
                            StreakState {
                                streak_id,
                                running_total,
                            },
                        );
                        (
                            Some(true),
                            Some(streak_id),
                            Some(StreakPhase::Start),
                            Some(running_total),
                        )
                    }
                }
            }
            Some(key) => {
                // streaking == false: terminate the burst if one is open.
                let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
                match state.remove(&key) {
                    Some(mut existing) => {
                        existing.running_total += raw.repeat_count;
                        (
                            Some(false),
                            Some(existing.streak_id),
                            Some(StreakPhase::End),
                            Some(existing.running_total),
                        )
                    }
                    None => (None, None, None, None),
                }
            }
            None => (None, None, None, None),
        };

        let payload = match raw.payload {
            EventPayload::Gift {
                gift_id,
                gift_name,
                diamond_value,
                repeat_count,
                running_total: _,
            } => EventPayload::Gift {
                gift_id,
                gift_name,
                diamond_value,
                repeat_count,
                running_total,
            },
            other => other,
        };

        Event {
            kind: raw.kind,
            timestamp: raw.timestamp,
            room_id: raw.room_id,
            streamer_unique_id: raw.streamer_unique_id,
            user: raw.user,
            payload,
            streaking,
            streak_id,
            streak_phase,
        }
    }
}

/// Streaks are only meaningful for Gift and Like events; everything else
/// passes through untouched.
fn streak_key(raw: &RawEvent) -> Option<StreakKey> {
    match raw.kind {
        EventKind::Gift => {
            let gift_id = match &raw.payload {
                EventPayload::Gift { gift_id, .. } => gift_id.clone(),
                _ => return None,
            };
            Some(StreakKey {
                user_id: raw.user.user_id.clone(),
                gift_id: Some(gift_id),
            })
        }
        EventKind::Like => Some(StreakKey {
            user_id: raw.user.user_id.clone(),
            gift_id: None,
        }),
        _ => None,
    }
}
