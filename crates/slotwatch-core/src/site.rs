use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use url::Url;

/// DOM selectors for one appointment portal.
///
/// Required selectors cover the login form and the slot listing; the optional
/// ones are tolerated as absent on portals that do not have the corresponding
/// control.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SelectorSet {
    pub email_field: String,
    pub password_field: String,
    pub login_submit: String,
    /// Matches every slot element on the appointment page.
    pub slot_indicator: String,
    /// Submits the booking form once a slot has been clicked.
    pub booking_control: String,
    #[serde(default)]
    pub visa_type_dropdown: Option<String>,
    #[serde(default)]
    pub center_dropdown: Option<String>,
    /// Present while a CAPTCHA or similar challenge is being shown.
    #[serde(default)]
    pub challenge_indicator: Option<String>,
    /// Appears after a booking has been accepted by the portal.
    #[serde(default)]
    pub confirmation_indicator: Option<String>,
}

/// Configuration for one monitored appointment portal.
///
/// Immutable once loaded; adding a new portal is a configuration entry,
/// never a code change.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SiteConfig {
    pub key: String,
    pub name: String,
    pub base_url: String,
    pub login_url: String,
    pub appointment_url: String,
    pub selectors: SelectorSet,
}

impl SiteConfig {
    fn validate(&self) -> Result<()> {
        if self.key.trim().is_empty() {
            return Err(Error::InvalidSite {
                key: self.key.clone(),
                reason: "site key must not be empty".to_string(),
            });
        }

        for (label, value) in [
            ("base_url", &self.base_url),
            ("login_url", &self.login_url),
            ("appointment_url", &self.appointment_url),
        ] {
            Url::parse(value).map_err(|e| Error::InvalidSite {
                key: self.key.clone(),
                reason: format!("invalid {}: {}", label, e),
            })?;
        }

        for (label, value) in [
            ("email_field", &self.selectors.email_field),
            ("password_field", &self.selectors.password_field),
            ("login_submit", &self.selectors.login_submit),
            ("slot_indicator", &self.selectors.slot_indicator),
            ("booking_control", &self.selectors.booking_control),
        ] {
            if value.trim().is_empty() {
                return Err(Error::InvalidSite {
                    key: self.key.clone(),
                    reason: format!("selector '{}' must not be empty", label),
                });
            }
        }

        Ok(())
    }
}

/// Validated registry of monitored sites, keyed by site key.
#[derive(Debug, Clone, Default)]
pub struct SiteRegistry {
    sites: HashMap<String, SiteConfig>,
}

impl SiteRegistry {
    /// Build a registry from already-parsed configs, validating each entry.
    ///
    /// Duplicate keys and malformed entries are hard errors.
    pub fn from_configs(configs: Vec<SiteConfig>) -> Result<Self> {
        let mut sites = HashMap::new();

        for config in configs {
            config.validate()?;
            if sites.contains_key(&config.key) {
                return Err(Error::InvalidSite {
                    key: config.key.clone(),
                    reason: "duplicate site key".to_string(),
                });
            }
            tracing::debug!(site = %config.key, "registered site '{}'", config.name);
            sites.insert(config.key.clone(), config);
        }

        Ok(Self { sites })
    }

    /// Parse a registry from a JSON array of site configs.
    pub fn from_json_str(json: &str) -> Result<Self> {
        let configs: Vec<SiteConfig> = serde_json::from_str(json)?;
        Self::from_configs(configs)
    }

    /// Load a registry from a JSON file.
    pub fn from_json_file(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        Self::from_json_str(&contents)
    }

    /// Look up a site by key. Unknown keys are an explicit error, never a
    /// silent fallback.
    pub fn get(&self, key: &str) -> Result<&SiteConfig> {
        self.sites
            .get(key)
            .ok_or_else(|| Error::UnknownSite(key.to_string()))
    }

    pub fn contains(&self, key: &str) -> bool {
        self.sites.contains_key(key)
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.sites.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = &SiteConfig> {
        self.sites.values()
    }

    pub fn len(&self) -> usize {
        self.sites.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sites.is_empty()
    }
}
