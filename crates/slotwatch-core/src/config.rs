use crate::throttle::ThrottleConfig;
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;

/// How the engine is being run.
///
/// Interactive runs assume an operator is watching: challenge waits are
/// enabled, operator alerts are printed, and the tick interval is short.
/// Headless runs skip both and poll less aggressively.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunProfile {
    Interactive,
    #[default]
    Headless,
}

/// Whether sites within one tick are processed one after another or in
/// parallel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SiteConcurrency {
    #[default]
    Sequential,
    Concurrent,
}

/// What `stop()` does with an in-flight check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StopBehavior {
    /// Let the current tick finish (bounded by per-step timeouts), then
    /// close leases.
    #[default]
    WaitForInFlight,
    /// Abort the tick task immediately.
    Interrupt,
}

/// Per-step driver timeouts.
#[derive(Debug, Clone, Copy)]
pub struct StepTimeouts {
    pub navigation: Duration,
    pub booking_confirmation: Duration,
    pub challenge_wait: Duration,
}

impl Default for StepTimeouts {
    fn default() -> Self {
        Self {
            navigation: Duration::from_secs(30),
            booking_confirmation: Duration::from_secs(15),
            challenge_wait: Duration::from_secs(60),
        }
    }
}

/// Humanized typing pace bounds, in milliseconds per character.
#[derive(Debug, Clone, Copy)]
pub struct TypingPace {
    pub min_ms: u64,
    pub max_ms: u64,
}

impl Default for TypingPace {
    fn default() -> Self {
        Self {
            min_ms: 50,
            max_ms: 150,
        }
    }
}

/// Full engine configuration. Every tuning constant is an input here, never
/// a literal at its use site.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub profile: RunProfile,
    pub tick_interval: Duration,
    /// Browser leases per monitored site.
    pub pool_size: usize,
    pub inter_application_delay: Duration,
    pub inter_site_delay: Duration,
    pub site_concurrency: SiteConcurrency,
    pub stop_behavior: StopBehavior,
    pub timeouts: StepTimeouts,
    pub typing: TypingPace,
    /// Block images/fonts/media during checks for speed.
    pub block_heavy_resources: bool,
    pub throttle: ThrottleConfig,
}

impl EngineConfig {
    /// Profile-aware defaults: 15s tick for interactive, 45s for headless.
    pub fn for_profile(profile: RunProfile) -> Self {
        let tick_interval = match profile {
            RunProfile::Interactive => Duration::from_secs(15),
            RunProfile::Headless => Duration::from_secs(45),
        };

        Self {
            profile,
            tick_interval,
            pool_size: 2,
            inter_application_delay: Duration::from_secs(3),
            inter_site_delay: Duration::from_secs(5),
            site_concurrency: SiteConcurrency::default(),
            stop_behavior: StopBehavior::default(),
            timeouts: StepTimeouts::default(),
            typing: TypingPace::default(),
            block_heavy_resources: true,
            throttle: ThrottleConfig {
                throttle_markers: None,
                challenge_markers: None,
                cooldown_secs: None,
            },
        }
    }

    /// Load overrides from a JSON config file on top of profile defaults.
    pub fn from_json_file(path: &Path, profile: RunProfile) -> crate::Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        let overrides: ConfigOverrides = serde_json::from_str(&contents)?;
        Ok(overrides.apply(Self::for_profile(profile)))
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self::for_profile(RunProfile::default())
    }
}

/// Optional overrides as they appear in a config file.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ConfigOverrides {
    pub tick_interval_secs: Option<u64>,
    pub pool_size: Option<usize>,
    pub inter_application_delay_secs: Option<u64>,
    pub inter_site_delay_secs: Option<u64>,
    pub site_concurrency: Option<SiteConcurrency>,
    pub stop_behavior: Option<StopBehavior>,
    pub navigation_timeout_secs: Option<u64>,
    pub booking_confirmation_timeout_secs: Option<u64>,
    pub challenge_wait_secs: Option<u64>,
    pub block_heavy_resources: Option<bool>,
    #[serde(default)]
    pub throttle: Option<ThrottleConfig>,
}

impl ConfigOverrides {
    pub fn apply(self, mut config: EngineConfig) -> EngineConfig {
        if let Some(secs) = self.tick_interval_secs {
            config.tick_interval = Duration::from_secs(secs);
        }
        if let Some(size) = self.pool_size {
            config.pool_size = size;
        }
        if let Some(secs) = self.inter_application_delay_secs {
            config.inter_application_delay = Duration::from_secs(secs);
        }
        if let Some(secs) = self.inter_site_delay_secs {
            config.inter_site_delay = Duration::from_secs(secs);
        }
        if let Some(concurrency) = self.site_concurrency {
            config.site_concurrency = concurrency;
        }
        if let Some(behavior) = self.stop_behavior {
            config.stop_behavior = behavior;
        }
        if let Some(secs) = self.navigation_timeout_secs {
            config.timeouts.navigation = Duration::from_secs(secs);
        }
        if let Some(secs) = self.booking_confirmation_timeout_secs {
            config.timeouts.booking_confirmation = Duration::from_secs(secs);
        }
        if let Some(secs) = self.challenge_wait_secs {
            config.timeouts.challenge_wait = Duration::from_secs(secs);
        }
        if let Some(block) = self.block_heavy_resources {
            config.block_heavy_resources = block;
        }
        if let Some(throttle) = self.throttle {
            config.throttle = throttle;
        }
        config
    }
}
