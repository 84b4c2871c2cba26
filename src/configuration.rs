//! Config for the arena behaviors
//!
//! Configuration can be created programmatically using [`Configuration::new()`] and the
//! `with_*` builders, or by reading environment variables using
//! [`Configuration::from_env()`].
//!
//! # Environment Variables
//!
//! All values are optional. Flags are enabled by the (case-insensitive) value `"true"`.
//! Unparsable values fall back to the default.
//!
//! - `ARENA_LOG` — Log to a timestamped file instead of stdout (default: `false`)
//! - `ARENA_LOBBY_SECS` — Lobby countdown in seconds (default: `30`)
//! - `ARENA_ACTIVE_SECS` — Active phase length in seconds (default: `300`)
//! - `ARENA_RESULTS_SECS` — Results phase length in seconds (default: `30`)
//! - `ARENA_AUTO_RESTART` — Start a new run when results are over (default: `false`)
//! - `ARENA_TICK_MS` — Clock tick interval in milliseconds (default: `1000`)
//! - `ARENA_SCHEDULE_MS` — Interval between scheduling rounds in milliseconds (default: `3000`)
//! - `ARENA_MAX_CONCURRENT` — Interactions generated at the same time (default: `4`)
//! - `ARENA_GENERATOR_TIMEOUT_MS` — Generator call timeout in milliseconds (default: `20000`)
//! - `ARENA_HISTORY` — Store versions kept for deltas (default: `1024`)
//! - `ARENA_VIEWER_QUEUE` — Pending frames per viewer before a resync (default: `64`)
//! - `ARENA_FULL_LOG_UPDATES` — Send the whole interaction log in every UPDATE (default: `false`)
//! - `ARENA_HOST` / `ARENA_PORT` — Listening address (default: `0.0.0.0:8080`)

use std::env;
use std::time::Duration;

use anyhow::bail;

use crate::phase_clock::PhaseDurations;

/// Configuration for arena behaviors.
#[derive(Debug, Clone)]
pub struct Configuration {
    pub(crate) log: bool,
    pub(crate) phase_durations: PhaseDurations,
    pub(crate) auto_restart: bool,
    pub(crate) tick_interval: Duration,
    pub(crate) scheduler_cadence: Duration,
    pub(crate) max_concurrent_interactions: usize,
    pub(crate) generator_timeout: Duration,
    pub(crate) history_capacity: usize,
    pub(crate) viewer_queue_bound: usize,
    pub(crate) full_log_updates: bool,
    pub(crate) host: String,
    pub(crate) port: u16,
}

impl Configuration {
    /// Create a new configuration with default parameters.
    ///
    /// By default:
    /// - Logs go to stdout.
    /// - Lobby lasts 30s, the active phase 5 minutes, results 30s, and results hold
    ///   until an explicit restart.
    /// - The clock ticks every second, the scheduler runs every 3 seconds with up to 4
    ///   concurrent generations, each bounded by a 20s timeout.
    /// - The last 1024 versions stay diffable and each viewer may lag 64 frames behind
    ///   before being resynchronised.
    /// - UPDATE frames only carry new interactions.
    pub fn new() -> Self {
        Self {
            log: false,
            phase_durations: PhaseDurations {
                lobby: Duration::from_secs(30),
                active: Duration::from_secs(300),
                results: Duration::from_secs(30),
            },
            auto_restart: false,
            tick_interval: Duration::from_secs(1),
            scheduler_cadence: Duration::from_secs(3),
            max_concurrent_interactions: 4,
            generator_timeout: Duration::from_secs(20),
            history_capacity: 1024,
            viewer_queue_bound: 64,
            full_log_updates: false,
            host: "0.0.0.0".to_owned(),
            port: 8080,
        }
    }

    /// Create configuration from environment variables (see module documentation).
    pub fn from_env() -> Self {
        fn get_env_flag(var: &str, default: bool) -> bool {
            match env::var(var) {
                Ok(val) => val.eq_ignore_ascii_case("true"),
                Err(_) => default,
            }
        }

        fn get_env_parsed<T: std::str::FromStr>(var: &str, default: T) -> T {
            env::var(var)
                .ok()
                .and_then(|val| val.parse().ok())
                .unwrap_or(default)
        }

        let default = Self::new();
        Self {
            log: get_env_flag("ARENA_LOG", default.log),
            phase_durations: PhaseDurations {
                lobby: Duration::from_secs(get_env_parsed("ARENA_LOBBY_SECS", 30)),
                active: Duration::from_secs(get_env_parsed("ARENA_ACTIVE_SECS", 300)),
                results: Duration::from_secs(get_env_parsed("ARENA_RESULTS_SECS", 30)),
            },
            auto_restart: get_env_flag("ARENA_AUTO_RESTART", default.auto_restart),
            tick_interval: Duration::from_millis(get_env_parsed("ARENA_TICK_MS", 1000)),
            scheduler_cadence: Duration::from_millis(get_env_parsed("ARENA_SCHEDULE_MS", 3000)),
            max_concurrent_interactions: get_env_parsed(
                "ARENA_MAX_CONCURRENT",
                default.max_concurrent_interactions,
            ),
            generator_timeout: Duration::from_millis(get_env_parsed(
                "ARENA_GENERATOR_TIMEOUT_MS",
                20_000,
            )),
            history_capacity: get_env_parsed("ARENA_HISTORY", default.history_capacity),
            viewer_queue_bound: get_env_parsed("ARENA_VIEWER_QUEUE", default.viewer_queue_bound),
            full_log_updates: get_env_flag("ARENA_FULL_LOG_UPDATES", default.full_log_updates),
            host: env::var("ARENA_HOST").unwrap_or(default.host),
            port: get_env_parsed("ARENA_PORT", default.port),
        }
    }

    /// Check the configuration can drive a tournament.
    pub fn validate(&self) -> anyhow::Result<()> {
        let PhaseDurations {
            lobby,
            active,
            results,
        } = self.phase_durations;
        if lobby.is_zero() || active.is_zero() || results.is_zero() {
            bail!("phase durations must be positive");
        }
        if self.tick_interval.is_zero() {
            bail!("clock tick interval must be positive");
        }
        if self.scheduler_cadence.is_zero() {
            bail!("scheduler cadence must be positive");
        }
        if self.generator_timeout.is_zero() {
            bail!("generator timeout must be positive");
        }
        if self.max_concurrent_interactions == 0 {
            bail!("at least one interaction must be allowed at a time");
        }
        if self.history_capacity == 0 {
            bail!("history capacity must be positive");
        }
        if self.viewer_queue_bound == 0 {
            bail!("viewer queue bound must be positive");
        }
        Ok(())
    }

    /// Enable or disable logging to file.
    pub fn with_log(mut self, value: bool) -> Self {
        self.log = value;
        self
    }

    /// Set the length of the lobby, active and results phases.
    pub fn with_phase_durations(mut self, lobby: Duration, active: Duration, results: Duration) -> Self {
        self.phase_durations = PhaseDurations {
            lobby,
            active,
            results,
        };
        self
    }

    /// Enable or disable starting a new run once results are over.
    pub fn with_auto_restart(mut self, value: bool) -> Self {
        self.auto_restart = value;
        self
    }

    /// Set the clock tick interval.
    pub fn with_tick_interval(mut self, interval: Duration) -> Self {
        self.tick_interval = interval;
        self
    }

    /// Set the interval between scheduling rounds.
    pub fn with_scheduler_cadence(mut self, cadence: Duration) -> Self {
        self.scheduler_cadence = cadence;
        self
    }

    /// Set how many interactions may be generated at the same time.
    pub fn with_max_concurrent_interactions(mut self, max: usize) -> Self {
        self.max_concurrent_interactions = max;
        self
    }

    /// Set the timeout after which a generation is abandoned.
    pub fn with_generator_timeout(mut self, timeout: Duration) -> Self {
        self.generator_timeout = timeout;
        self
    }

    /// Set how many past versions the store keeps diffable.
    pub fn with_history_capacity(mut self, capacity: usize) -> Self {
        self.history_capacity = capacity;
        self
    }

    /// Set how many frames may wait for a viewer before it is resynchronised.
    pub fn with_viewer_queue_bound(mut self, bound: usize) -> Self {
        self.viewer_queue_bound = bound;
        self
    }

    /// Send the whole interaction log in every UPDATE instead of only new interactions.
    pub fn with_full_log_updates(mut self, value: bool) -> Self {
        self.full_log_updates = value;
        self
    }

    /// Set the listening address.
    pub fn with_address(mut self, host: impl Into<String>, port: u16) -> Self {
        self.host = host.into();
        self.port = port;
        self
    }

    /// Whether logs go to a timestamped file rather than stdout.
    pub fn logs_to_file(&self) -> bool {
        self.log
    }

    /// `host:port` to bind.
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

impl Default for Configuration {
    fn default() -> Self {
        Self::new()
    }
}
