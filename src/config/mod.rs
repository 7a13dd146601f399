//! Run configuration
//!
//! A [`Profile`] carries every tunable for a run as data, never as a
//! compiled-in constant. Two preset constructors replace the historical
//! near-duplicate parameter tables: [`Profile::standalone`] for the
//! standalone generator numbers and [`Profile::benchmark`] for the
//! performance-tool numbers. The deployment descriptor overlay lives in
//! [`resolver`].

mod resolver;

pub use resolver::{resolve, DESCRIPTOR_DEFAULT_PATH};

use crate::error::{ConfigError, GenerationError};
use crate::range::ClosedOpenRange;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

/// Which synthetic application the generated traffic imitates
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AppKind {
    /// Generic note-taking app: screen views, edits, shares
    Notepad,
    /// Shopping app with a browse -> view -> cart -> checkout funnel
    Shopping,
}

impl AppKind {
    /// Canonical lowercase name
    pub fn as_str(&self) -> &'static str {
        match self {
            AppKind::Notepad => "notepad",
            AppKind::Shopping => "shopping",
        }
    }
}

impl FromStr for AppKind {
    type Err = GenerationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "notepad" => Ok(AppKind::Notepad),
            "shopping" => Ok(AppKind::Shopping),
            other => Err(GenerationError::UnsupportedAppKind(other.to_string())),
        }
    }
}

impl fmt::Display for AppKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Platform tag stamped on generated users and events
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Platform {
    /// Android devices
    Android,
    /// iOS devices
    Ios,
    /// Web clients
    Web,
    /// No filter: users are spread across all concrete platforms
    All,
}

impl Platform {
    /// Canonical lowercase name
    pub fn as_str(&self) -> &'static str {
        match self {
            Platform::Android => "android",
            Platform::Ios => "ios",
            Platform::Web => "web",
            Platform::All => "all",
        }
    }

    /// Resolve the filter to a concrete platform for one user
    ///
    /// `All` picks uniformly among the concrete platforms; anything else
    /// returns itself.
    pub fn assign<R: Rng + ?Sized>(&self, rng: &mut R) -> Platform {
        match self {
            Platform::All => match rng.gen_range(0..3) {
                0 => Platform::Android,
                1 => Platform::Ios,
                _ => Platform::Web,
            },
            concrete => *concrete,
        }
    }
}

impl FromStr for Platform {
    type Err = GenerationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "android" => Ok(Platform::Android),
            "ios" => Ok(Platform::Ios),
            "web" => Ok(Platform::Web),
            "all" => Ok(Platform::All),
            other => Err(GenerationError::UnsupportedPlatform(other.to_string())),
        }
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Smallest product page the shopping generator accepts
pub const MIN_PRODUCT_PAGE: u32 = 2;

/// Full parameter set for one run
///
/// Resolved once at startup and treated as immutable for the run; components
/// receive it explicitly rather than reading shared mutable state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Profile {
    /// Application variant driving event taxonomy
    pub app_kind: AppKind,
    /// Platform filter for the simulated population
    pub platform: Platform,
    /// Application id sent with every upload
    pub app_id: String,
    /// Ingestion endpoint URL
    pub endpoint: String,

    /// Total synthetic users in the population
    pub all_users: u32,
    /// Per-day daily-active-user draw
    pub dau_range: ClosedOpenRange,
    /// Sessions per user per simulated day
    pub session_count_range: ClosedOpenRange,
    /// Actions per session
    pub actions_per_session: ClosedOpenRange,

    /// Inter-action gap in seconds for historical backfill
    pub per_action_gap_secs: ClosedOpenRange,
    /// Inter-action gap in seconds for real-time sessions
    pub per_action_gap_realtime_secs: ClosedOpenRange,
    /// Length of the historical window in days
    pub duration_of_days: u32,
    /// How many compress-and-upload passes each simulated day is split into
    pub gzip_passes_per_day: u32,

    /// Maximum events per uploaded batch
    pub events_per_request: usize,
    /// Real-time flush bound: a partial batch older than this is emitted
    pub flush_duration: Duration,
    /// Upper bound on the event-time span a real-time batch may cover
    pub batch_event_duration: Duration,

    /// Real-time generator worker count
    pub generator_workers: usize,
    /// Upload worker count
    pub max_upload_workers: usize,
    /// Parallel backfill lanes (compression is CPU-bound)
    pub process_workers: usize,
    /// Cap on concurrently in-flight upload requests
    pub max_batch_requests_in_flight: usize,

    /// Whether pacing is applied at all
    pub need_sleep: bool,
    /// Fixed delay between dispatches when pacing is on
    pub request_sleep_time: Duration,

    /// Gzip upload bodies
    pub is_gzip: bool,
    /// Log each serialized request body at debug level
    pub log_full_request: bool,

    /// Products shown on a listing page
    pub main_page_product_count: u32,
    /// Products shown on non-listing pages
    pub default_product_count: u32,

    /// Master seed; `None` seeds from entropy
    pub seed: Option<u64>,
}

impl Profile {
    /// Preset matching the standalone generator parameter table
    pub fn standalone(app_kind: AppKind) -> Self {
        let (all_users, dau_range) = match app_kind {
            AppKind::Notepad => (10_000, ClosedOpenRange::new(1_000, 2_000).expect("preset")),
            AppKind::Shopping => (30_000, ClosedOpenRange::new(3_000, 6_000).expect("preset")),
        };
        Self {
            app_kind,
            platform: Platform::All,
            app_id: String::new(),
            endpoint: String::new(),
            all_users,
            dau_range,
            session_count_range: ClosedOpenRange::new(4, 5).expect("preset"),
            actions_per_session: ClosedOpenRange::new(0, 30).expect("preset"),
            per_action_gap_secs: ClosedOpenRange::new(3, 60).expect("preset"),
            per_action_gap_realtime_secs: ClosedOpenRange::new(0, 5).expect("preset"),
            duration_of_days: 30,
            gzip_passes_per_day: 1,
            events_per_request: 10_000,
            flush_duration: Duration::from_secs(3),
            batch_event_duration: Duration::from_secs(2 * 60),
            generator_workers: 20,
            max_upload_workers: 1,
            process_workers: 50,
            max_batch_requests_in_flight: 20,
            need_sleep: true,
            request_sleep_time: Duration::from_millis(200),
            is_gzip: true,
            log_full_request: false,
            main_page_product_count: 4,
            default_product_count: 2,
            seed: None,
        }
    }

    /// Preset matching the benchmark / performance-tool parameter table
    ///
    /// Pacing defaults to the 1000 RPS figure; tune `request_sleep_time`
    /// for other targets.
    pub fn benchmark(app_kind: AppKind) -> Self {
        let (all_users, dau_range) = match app_kind {
            AppKind::Notepad => (10_000, ClosedOpenRange::new(1_000, 2_000).expect("preset")),
            AppKind::Shopping => (5_000, ClosedOpenRange::new(300, 400).expect("preset")),
        };
        Self {
            session_count_range: ClosedOpenRange::new(1, 4).expect("preset"),
            generator_workers: 1,
            request_sleep_time: Duration::from_millis(3),
            all_users,
            dau_range,
            ..Self::standalone(app_kind)
        }
    }

    /// Fatal startup checks; an error here aborts the run
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.all_users == 0 {
            return Err(ConfigError::Invalid {
                field: "all_users",
                reason: "population must not be empty".into(),
            });
        }
        if self.dau_range.max_value() > self.all_users {
            return Err(ConfigError::Invalid {
                field: "dau_range",
                reason: format!(
                    "daily active draw {} can exceed the population of {}",
                    self.dau_range, self.all_users
                ),
            });
        }
        if self.events_per_request == 0 {
            return Err(ConfigError::Invalid {
                field: "events_per_request",
                reason: "batch capacity must be at least 1".into(),
            });
        }
        if self.generator_workers == 0 || self.max_upload_workers == 0 || self.process_workers == 0
        {
            return Err(ConfigError::Invalid {
                field: "workers",
                reason: "every worker pool must have at least 1 worker".into(),
            });
        }
        if self.max_batch_requests_in_flight == 0 {
            return Err(ConfigError::Invalid {
                field: "max_batch_requests_in_flight",
                reason: "in-flight request cap must be at least 1".into(),
            });
        }
        if self.duration_of_days == 0 {
            return Err(ConfigError::Invalid {
                field: "duration_of_days",
                reason: "historical window must cover at least 1 day".into(),
            });
        }
        if self.gzip_passes_per_day == 0 {
            return Err(ConfigError::Invalid {
                field: "gzip_passes_per_day",
                reason: "each day needs at least 1 upload pass".into(),
            });
        }
        if self.main_page_product_count < MIN_PRODUCT_PAGE {
            return Err(GenerationError::ProductPageTooSmall {
                got: self.main_page_product_count,
                min: MIN_PRODUCT_PAGE,
            }
            .into());
        }
        if self.default_product_count < MIN_PRODUCT_PAGE {
            return Err(GenerationError::ProductPageTooSmall {
                got: self.default_product_count,
                min: MIN_PRODUCT_PAGE,
            }
            .into());
        }
        Ok(())
    }
}
