//! Event model and per-application generators
//!
//! [`Event`] is the wire-ready envelope the uploader serializes.
//! [`AppProfile`] is the closed set of application variants: adding a new
//! synthetic application means adding one variant here, nothing else.

mod generator;
mod notepad;
mod shopping;

pub use generator::{EventGenerator, GenerationWindow, DAY_MS};
pub use notepad::NotepadActions;
pub use shopping::ShoppingActions;

use crate::config::{AppKind, Platform, Profile};
use crate::error::GenerationError;
use rand::rngs::StdRng;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// One typed action inside a session, before envelope fields are attached
#[derive(Debug, Clone)]
pub struct Action {
    /// Event type name on the wire
    pub name: &'static str,
    /// Application-specific payload fields
    pub attributes: Map<String, Value>,
}

impl Action {
    /// Action with an empty payload
    pub fn named(name: &'static str) -> Self {
        Self {
            name,
            attributes: Map::new(),
        }
    }
}

/// Wire-ready event: an action plus its user/session envelope
///
/// Immutable once produced; belongs to exactly one user and one session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    /// Unique event identity
    pub event_id: String,
    /// Event type name
    pub event_type: String,
    /// Event time as epoch milliseconds
    pub timestamp: i64,
    /// Application id from the resolved configuration
    pub app_id: String,
    /// Owning user's identity
    pub unique_id: String,
    /// Owning session's identity
    pub session_id: String,
    /// Owning user's platform tag
    pub platform: Platform,
    /// Application-specific payload fields
    pub attributes: Map<String, Value>,
}

/// One user-session and its ordered events
///
/// A flow object: created per user per simulated day, discarded once its
/// events are handed on.
#[derive(Debug, Clone)]
pub struct Session {
    /// Session identity stamped on every contained event
    pub session_id: String,
    /// Start time, epoch milliseconds
    pub start_ms: i64,
    /// End time: the last event's timestamp
    pub end_ms: i64,
    /// Ordered events, timestamps non-decreasing
    pub events: Vec<Event>,
}

/// Application variant driving which actions a session emits
///
/// The shopping variant is stateful: it tracks the user's position in the
/// browse -> product view -> cart -> checkout funnel across one session.
#[derive(Debug)]
pub enum AppProfile {
    /// Note-taking app actions
    Notepad(NotepadActions),
    /// Shopping funnel actions
    Shopping(ShoppingActions),
}

impl AppProfile {
    /// Build the variant a profile selects
    ///
    /// # Errors
    /// The shopping variant rejects product page sizes below the minimum;
    /// an undersized page is a configuration error, never clamped.
    pub fn from_profile(profile: &Profile) -> Result<Self, GenerationError> {
        match profile.app_kind {
            AppKind::Notepad => Ok(AppProfile::Notepad(NotepadActions::new())),
            AppKind::Shopping => Ok(AppProfile::Shopping(ShoppingActions::new(
                profile.main_page_product_count,
                profile.default_product_count,
            )?)),
        }
    }

    /// Which application this profile emits for
    pub fn kind(&self) -> AppKind {
        match self {
            AppProfile::Notepad(_) => AppKind::Notepad,
            AppProfile::Shopping(_) => AppKind::Shopping,
        }
    }

    /// Reset per-session state; the shopping funnel restarts at browsing
    pub fn begin_session(&mut self) {
        match self {
            AppProfile::Notepad(inner) => inner.begin_session(),
            AppProfile::Shopping(inner) => inner.begin_session(),
        }
    }

    /// Emit the next action for the current session
    pub fn next_action(&mut self, rng: &mut StdRng) -> Action {
        match self {
            AppProfile::Notepad(inner) => inner.next_action(rng),
            AppProfile::Shopping(inner) => inner.next_action(rng),
        }
    }
}
