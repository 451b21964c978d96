use crate::{Error, Result};
use lazy_static::lazy_static;
use regex::{Regex, RegexSet};
use serde::Deserialize;
use std::time::Duration;

/// Default cooldown applied to a rate-limited browser lease.
pub const DEFAULT_COOLDOWN: Duration = Duration::from_secs(600);

lazy_static! {
    static ref DEFAULT_THROTTLE_MARKERS: Vec<&'static str> = vec![
        "too many requests",
        "rate limit",
        "rate-limited",
        "429",
        "try again later",
        "access temporarily blocked",
    ];
    static ref DEFAULT_CHALLENGE_MARKERS: Vec<&'static str> =
        vec!["captcha", "verify you are human", "security check"];
}

/// Throttling and challenge detection over navigated page content.
///
/// Marker lists are deployment configuration, not inline literals, so the
/// policy can be swapped per portal environment.
#[derive(Debug, Clone)]
pub struct ThrottlePolicy {
    throttle_markers: RegexSet,
    challenge_markers: RegexSet,
    cooldown: Duration,
}

/// Serde-facing shape for [`ThrottlePolicy`]; compiled via
/// [`ThrottlePolicy::from_config`].
#[derive(Debug, Clone, Deserialize)]
pub struct ThrottleConfig {
    #[serde(default)]
    pub throttle_markers: Option<Vec<String>>,
    #[serde(default)]
    pub challenge_markers: Option<Vec<String>>,
    /// Lease cooldown in seconds.
    #[serde(default)]
    pub cooldown_secs: Option<u64>,
}

impl ThrottleConfig {
    /// Effective lease cooldown, falling back to [`DEFAULT_COOLDOWN`].
    pub fn cooldown(&self) -> Duration {
        self.cooldown_secs
            .map(Duration::from_secs)
            .unwrap_or(DEFAULT_COOLDOWN)
    }
}

fn compile_markers(markers: &[String]) -> Result<RegexSet> {
    // Markers are matched case-insensitively; plain words are valid regexes.
    for marker in markers {
        Regex::new(&format!("(?i){}", marker)).map_err(|e| Error::Pattern {
            pattern: marker.clone(),
            reason: e.to_string(),
        })?;
    }
    let patterns: Vec<String> = markers.iter().map(|m| format!("(?i){}", m)).collect();
    RegexSet::new(&patterns).map_err(|e| Error::Pattern {
        pattern: patterns.join(", "),
        reason: e.to_string(),
    })
}

impl ThrottlePolicy {
    pub fn new(
        throttle_markers: &[String],
        challenge_markers: &[String],
        cooldown: Duration,
    ) -> Result<Self> {
        Ok(Self {
            throttle_markers: compile_markers(throttle_markers)?,
            challenge_markers: compile_markers(challenge_markers)?,
            cooldown,
        })
    }

    pub fn from_config(config: &ThrottleConfig) -> Result<Self> {
        let throttle: Vec<String> = config
            .throttle_markers
            .clone()
            .unwrap_or_else(|| DEFAULT_THROTTLE_MARKERS.iter().map(|s| s.to_string()).collect());
        let challenge: Vec<String> = config
            .challenge_markers
            .clone()
            .unwrap_or_else(|| DEFAULT_CHALLENGE_MARKERS.iter().map(|s| s.to_string()).collect());
        let cooldown = config
            .cooldown_secs
            .map(Duration::from_secs)
            .unwrap_or(DEFAULT_COOLDOWN);

        Self::new(&throttle, &challenge, cooldown)
    }

    /// Does the page content indicate the portal is rate limiting us?
    pub fn is_throttled(&self, page_text: &str) -> bool {
        self.throttle_markers.is_match(page_text)
    }

    /// Does the page content indicate a human-verification challenge?
    pub fn has_challenge(&self, page_text: &str) -> bool {
        self.challenge_markers.is_match(page_text)
    }

    pub fn cooldown(&self) -> Duration {
        self.cooldown
    }
}

impl Default for ThrottlePolicy {
    fn default() -> Self {
        Self::from_config(&ThrottleConfig {
            throttle_markers: None,
            challenge_markers: None,
            cooldown_secs: None,
        })
        .expect("default markers compile")
    }
}
