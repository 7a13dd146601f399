//! Synthetic user population
//!
//! [`UserPopulation::generate`] deterministically builds the full user pool
//! for a run: stable identities, a per-simulated-day active flag whose
//! daily count falls within the configured DAU range, and a session count
//! per user. All sizing arrives as parameters; the same code serves every
//! profile.

use crate::config::{Platform, Profile};
use crate::error::ConfigError;
use crate::range::ClosedOpenRange;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// Derive an independent RNG seed for a worker lane from the master seed
///
/// Keeps per-worker random streams decorrelated while the whole run stays
/// reproducible from one master seed.
pub fn derive_seed(master: u64, lane: u64) -> u64 {
    master.wrapping_add(lane.wrapping_mul(0x9E37_79B9_7F4A_7C15))
}

/// One synthetic user; immutable after generation
#[derive(Debug, Clone)]
pub struct User {
    /// Stable synthetic identity
    pub user_id: String,
    /// Stable synthetic device identity
    pub device_id: String,
    /// Concrete platform tag
    pub platform: Platform,
    /// Sessions this user contributes per active day
    pub session_count: u32,
    active_days: Vec<bool>,
}

impl User {
    /// Whether the user is marked active on the given simulated day
    pub fn is_active_on(&self, day: usize) -> bool {
        self.active_days.get(day).copied().unwrap_or(false)
    }

    /// Number of simulated days the user is active
    pub fn active_day_count(&self) -> usize {
        self.active_days.iter().filter(|a| **a).count()
    }
}

/// The full user pool for one run
#[derive(Debug, Clone)]
pub struct UserPopulation {
    users: Vec<User>,
    days: u32,
}

impl UserPopulation {
    /// Deterministically generate a population
    ///
    /// For each of `days` simulated days a DAU target is drawn from
    /// `dau_range` and that many distinct users are marked active, chosen
    /// uniformly without replacement.
    ///
    /// # Errors
    /// Fails when the DAU draw could exceed `total_users`.
    pub fn generate(
        total_users: u32,
        dau_range: ClosedOpenRange,
        session_count_range: ClosedOpenRange,
        platform: Platform,
        days: u32,
        seed: u64,
    ) -> Result<Self, ConfigError> {
        if dau_range.max_value() > total_users {
            return Err(ConfigError::Invalid {
                field: "dau_range",
                reason: format!(
                    "daily active draw {} can exceed the population of {}",
                    dau_range, total_users
                ),
            });
        }

        let mut rng = StdRng::seed_from_u64(seed);
        let mut users: Vec<User> = (0..total_users)
            .map(|idx| User {
                user_id: format!("user_{idx:08}"),
                device_id: format!("{:016x}", rng.gen::<u64>()),
                platform: platform.assign(&mut rng),
                session_count: session_count_range.sample(&mut rng),
                active_days: vec![false; days as usize],
            })
            .collect();

        for day in 0..days as usize {
            let target = dau_range.sample(&mut rng) as usize;
            for idx in rand::seq::index::sample(&mut rng, users.len(), target) {
                users[idx].active_days[day] = true;
            }
        }

        Ok(Self { users, days })
    }

    /// Population sized and shaped by a profile
    pub fn from_profile(profile: &Profile, days: u32, seed: u64) -> Result<Self, ConfigError> {
        Self::generate(
            profile.all_users,
            profile.dau_range,
            profile.session_count_range,
            profile.platform,
            days,
            seed,
        )
    }

    /// Total users in the pool
    pub fn len(&self) -> usize {
        self.users.len()
    }

    /// Whether the pool is empty
    pub fn is_empty(&self) -> bool {
        self.users.is_empty()
    }

    /// Simulated days covered by the activity flags
    pub fn days(&self) -> u32 {
        self.days
    }

    /// All users
    pub fn users(&self) -> &[User] {
        &self.users
    }

    /// Daily-active-user count for one simulated day
    pub fn dau(&self, day: usize) -> usize {
        self.users.iter().filter(|u| u.is_active_on(day)).count()
    }

    /// Split the pool into `n` disjoint shards, one per worker
    ///
    /// Every user lands in exactly one shard, so no user's events are ever
    /// produced by two workers concurrently. Shards may be empty when `n`
    /// exceeds the population.
    pub fn shards(&self, n: usize) -> Vec<Vec<User>> {
        let n = n.max(1);
        let mut shards: Vec<Vec<User>> = vec![Vec::new(); n];
        for (idx, user) in self.users.iter().enumerate() {
            shards[idx % n].push(user.clone());
        }
        shards
    }
}
