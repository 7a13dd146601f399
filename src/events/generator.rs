//! Per-user event stream production
//!
//! [`EventGenerator::produce_events`] yields a finite, time-ordered event
//! sequence for one user in one window. Real-time windows stamp events
//! starting at the current instant; historical windows partition a past day
//! into one slot per session and backdate timestamps into the slots, so a
//! user's whole stream stays non-decreasing.
//!
//! The generator is restartable per user (call again with a new window) but
//! not resumable mid-sequence.

use super::{AppProfile, Event, Session};
use crate::config::Profile;
use crate::error::GenerationError;
use crate::population::User;
use crate::range::ClosedOpenRange;
use chrono::Utc;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde_json::Map;

/// Milliseconds in one simulated day
pub const DAY_MS: i64 = 86_400_000;

/// Which window a user's events are generated for
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GenerationWindow {
    /// Events stamped from the current instant, for immediate dispatch
    RealTime,
    /// Events backdated into the day starting at `day_start_ms`
    Historical {
        /// Start of the simulated day, epoch milliseconds
        day_start_ms: i64,
    },
}

impl GenerationWindow {
    /// The window for day `day` (0-based, oldest first) of a backfill run
    /// covering `days_total` days ending now
    pub fn backfill_day(days_total: u32, day: u32) -> Self {
        let now_ms = Utc::now().timestamp_millis();
        let days_back = i64::from(days_total) - i64::from(day);
        GenerationWindow::Historical {
            day_start_ms: now_ms - days_back * DAY_MS,
        }
    }
}

/// Produces ordered event streams for one worker's users
pub struct EventGenerator {
    app: AppProfile,
    app_id: String,
    actions_per_session: ClosedOpenRange,
    gap_secs: ClosedOpenRange,
    gap_realtime_secs: ClosedOpenRange,
    rng: StdRng,
}

impl EventGenerator {
    /// Build a generator for the profile's application variant
    ///
    /// Each worker gets its own generator with an independently derived
    /// seed; workers never share RNG state.
    pub fn new(profile: &Profile, seed: u64) -> Result<Self, GenerationError> {
        Ok(Self {
            app: AppProfile::from_profile(profile)?,
            app_id: profile.app_id.clone(),
            actions_per_session: profile.actions_per_session,
            gap_secs: profile.per_action_gap_secs,
            gap_realtime_secs: profile.per_action_gap_realtime_secs,
            rng: StdRng::seed_from_u64(seed),
        })
    }

    /// All sessions for `user` in `window`, in start-time order
    pub fn produce_sessions(&mut self, user: &User, window: &GenerationWindow) -> Vec<Session> {
        let session_count = user.session_count as usize;
        if session_count == 0 {
            return Vec::new();
        }

        let mut sessions = Vec::with_capacity(session_count);
        match window {
            GenerationWindow::RealTime => {
                let mut cursor = Utc::now().timestamp_millis();
                for _ in 0..session_count {
                    let session = self.build_session(user, cursor, None, true);
                    cursor = session.end_ms
                        + i64::from(self.gap_realtime_secs.sample(&mut self.rng)) * 1000;
                    sessions.push(session);
                }
            }
            GenerationWindow::Historical { day_start_ms } => {
                // Each session gets a disjoint slot of the day; actions are
                // clamped to the slot so the user's stream stays ordered.
                let slot = DAY_MS / session_count as i64;
                for idx in 0..session_count {
                    let slot_start = day_start_ms + idx as i64 * slot;
                    let offset = self.rng.gen_range(0..(slot / 2).max(1));
                    let session =
                        self.build_session(user, slot_start + offset, Some(slot_start + slot - 1), false);
                    sessions.push(session);
                }
            }
        }
        sessions
    }

    /// All events for `user` in `window`, flattened in session order
    pub fn produce_events(&mut self, user: &User, window: &GenerationWindow) -> Vec<Event> {
        self.produce_sessions(user, window)
            .into_iter()
            .flat_map(|session| session.events)
            .collect()
    }

    fn build_session(
        &mut self,
        user: &User,
        start_ms: i64,
        clamp_ms: Option<i64>,
        realtime: bool,
    ) -> Session {
        let session_id = self.next_id();
        let action_count = self.actions_per_session.sample(&mut self.rng) as usize;
        self.app.begin_session();

        let mut events = Vec::with_capacity(action_count + 1);
        let mut ts = start_ms;
        events.push(self.envelope(user, &session_id, "_session_start", Map::new(), ts));

        for _ in 0..action_count {
            let gap_range = if realtime {
                self.gap_realtime_secs
            } else {
                self.gap_secs
            };
            ts += i64::from(gap_range.sample(&mut self.rng)) * 1000;
            if let Some(clamp) = clamp_ms {
                ts = ts.min(clamp);
            }
            let action = self.app.next_action(&mut self.rng);
            events.push(self.envelope(user, &session_id, action.name, action.attributes, ts));
        }

        let end_ms = events.last().map(|e| e.timestamp).unwrap_or(start_ms);
        Session {
            session_id,
            start_ms,
            end_ms,
            events,
        }
    }

    fn envelope(
        &mut self,
        user: &User,
        session_id: &str,
        event_type: &str,
        attributes: Map<String, serde_json::Value>,
        timestamp: i64,
    ) -> Event {
        Event {
            event_id: self.next_id(),
            event_type: event_type.to_string(),
            timestamp,
            app_id: self.app_id.clone(),
            unique_id: user.user_id.clone(),
            session_id: session_id.to_string(),
            platform: user.platform,
            attributes,
        }
    }

    fn next_id(&mut self) -> String {
        format!("{:016x}", self.rng.gen::<u64>())
    }
}
