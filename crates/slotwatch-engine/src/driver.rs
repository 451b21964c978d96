//! The per-site automation state machine.
//!
//! One [`SiteDriver::check`] call walks LoggedOut → LoggingIn → LoggedIn →
//! CheckingSlots and, when auto-booking is on, through Booking. Every check
//! runs in a fresh page that is closed unconditionally afterward; the page is
//! never reused across checks.

use crate::checker::{ApplicationChecker, CheckError, CheckOutcome, LeaseFactory};
use crate::slots::{self, SlotFacts};
use async_trait::async_trait;
use chromiumoxide::element::Element;
use chromiumoxide::page::Page;
use rand::Rng;
use slotwatch_browser::{BrowserHandle, CheckSession};
use slotwatch_core::application::ApplicationRecord;
use slotwatch_core::config::{EngineConfig, RunProfile, StepTimeouts, TypingPace};
use slotwatch_core::site::SiteConfig;
use slotwatch_core::throttle::ThrottlePolicy;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

const CHALLENGE_POLL: Duration = Duration::from_secs(1);
const CONFIRMATION_POLL: Duration = Duration::from_millis(500);

/// Drives the login → slot-check → optional booking flow against a leased
/// browser.
pub struct SiteDriver {
    policy: ThrottlePolicy,
    timeouts: StepTimeouts,
    typing: TypingPace,
    profile: RunProfile,
    block_heavy_resources: bool,
}

impl SiteDriver {
    pub fn from_config(config: &EngineConfig) -> slotwatch_core::Result<Self> {
        Ok(Self {
            policy: ThrottlePolicy::from_config(&config.throttle)?,
            timeouts: config.timeouts,
            typing: config.typing,
            profile: config.profile,
            block_heavy_resources: config.block_heavy_resources,
        })
    }

    async fn run_check(
        &self,
        session: &CheckSession,
        site: &SiteConfig,
        application: &ApplicationRecord,
    ) -> Result<CheckOutcome, CheckError> {
        self.login(session, site, application).await?;

        let Some(slot_index) = self.check_slots(session, site, application).await? else {
            return Ok(CheckOutcome::NoSlots);
        };

        tracing::info!(
            site = %site.key,
            application = %application.id,
            slot = slot_index,
            "open slot detected"
        );

        if !application.auto_book {
            return Ok(CheckOutcome::SlotsFound { booked: None });
        }

        let confirmed = self
            .attempt_booking(session, site, application, slot_index)
            .await?;
        Ok(CheckOutcome::SlotsFound {
            booked: Some(confirmed),
        })
    }

    /// Log in to the portal. Throttling aborts before any credentials are
    /// typed; a challenge pauses for the operator only in interactive runs.
    async fn login(
        &self,
        session: &CheckSession,
        site: &SiteConfig,
        application: &ApplicationRecord,
    ) -> Result<(), CheckError> {
        let page = session.page();

        self.navigate(page, &site.login_url).await?;
        self.bail_if_throttled(page).await?;

        self.type_paced(
            page,
            &site.selectors.email_field,
            &application.credentials.email,
        )
        .await?;
        self.type_paced(
            page,
            &site.selectors.password_field,
            &application.credentials.password,
        )
        .await?;

        // Headless runs skip the challenge wait entirely; nobody is there
        // to solve it.
        if self.profile == RunProfile::Interactive {
            self.wait_for_challenge_clear(page, site).await;
        }

        let submit = self.find(page, &site.selectors.login_submit).await?;
        submit
            .click()
            .await
            .map_err(|e| CheckError::Browser(format!("login submit click: {}", e)))?;

        tokio::time::timeout(self.timeouts.navigation, page.wait_for_navigation())
            .await
            .map_err(|_| CheckError::Navigation("login submit did not navigate".to_string()))?
            .map_err(|e| CheckError::Navigation(e.to_string()))?;

        Ok(())
    }

    /// Navigate to the appointment page and classify the slot listing.
    /// Returns the index of the first open slot, if any.
    async fn check_slots(
        &self,
        session: &CheckSession,
        site: &SiteConfig,
        application: &ApplicationRecord,
    ) -> Result<Option<usize>, CheckError> {
        let page = session.page();

        self.navigate(page, &site.appointment_url).await?;
        self.bail_if_throttled(page).await?;

        // Dropdowns are optional portal furniture; absence is tolerated.
        if let (Some(selector), Some(value)) =
            (&site.selectors.visa_type_dropdown, &application.visa_type)
        {
            self.select_dropdown(page, selector, value).await;
        }
        if let (Some(selector), Some(value)) = (&site.selectors.center_dropdown, &application.center)
        {
            self.select_dropdown(page, selector, value).await;
        }

        let facts = self
            .collect_slot_facts(page, &site.selectors.slot_indicator)
            .await?;
        tracing::debug!(site = %site.key, elements = facts.len(), "evaluated slot listing");

        Ok(slots::first_available(&facts))
    }

    /// Click the slot, fill the booking form, submit, and wait for the
    /// confirmation indicator. Absence of confirmation is `Ok(false)`.
    async fn attempt_booking(
        &self,
        session: &CheckSession,
        site: &SiteConfig,
        application: &ApplicationRecord,
        slot_index: usize,
    ) -> Result<bool, CheckError> {
        let page = session.page();

        let elements = page
            .find_elements(&site.selectors.slot_indicator)
            .await
            .map_err(|_| CheckError::Selector(site.selectors.slot_indicator.clone()))?;
        let Some(slot) = elements.get(slot_index) else {
            // Listing changed between classification and click.
            return Ok(false);
        };
        slot.click()
            .await
            .map_err(|e| CheckError::Browser(format!("slot click: {}", e)))?;

        for (field, value) in &application.booking_fields {
            let selector = format!("[name=\"{}\"]", field);
            match page.find_element(&selector).await {
                Ok(element) => {
                    if let Err(e) = element.type_str(value).await {
                        tracing::debug!(field, "could not fill booking field: {}", e);
                    }
                }
                Err(_) => {
                    tracing::debug!(field, "booking field not present, skipping");
                }
            }
        }

        let submit = self.find(page, &site.selectors.booking_control).await?;
        submit
            .click()
            .await
            .map_err(|e| CheckError::Browser(format!("booking submit click: {}", e)))?;

        let Some(confirmation) = &site.selectors.confirmation_indicator else {
            tracing::warn!(site = %site.key, "no confirmation indicator configured");
            return Ok(false);
        };

        let deadline = Instant::now() + self.timeouts.booking_confirmation;
        while Instant::now() < deadline {
            if page.find_element(confirmation.as_str()).await.is_ok() {
                return Ok(true);
            }
            tokio::time::sleep(CONFIRMATION_POLL).await;
        }

        Ok(false)
    }

    async fn navigate(&self, page: &Page, url: &str) -> Result<(), CheckError> {
        let load = async {
            page.goto(url).await?;
            page.wait_for_navigation().await?;
            Ok::<(), chromiumoxide::error::CdpError>(())
        };

        tokio::time::timeout(self.timeouts.navigation, load)
            .await
            .map_err(|_| CheckError::Navigation(format!("timed out loading {}", url)))?
            .map_err(|e| CheckError::Navigation(format!("{}: {}", url, e)))
    }

    async fn bail_if_throttled(&self, page: &Page) -> Result<(), CheckError> {
        let content = page
            .content()
            .await
            .map_err(|e| CheckError::Browser(format!("reading page content: {}", e)))?;
        if self.policy.is_throttled(&content) {
            return Err(CheckError::Throttled);
        }
        Ok(())
    }

    async fn find(&self, page: &Page, selector: &str) -> Result<Element, CheckError> {
        page.find_element(selector)
            .await
            .map_err(|_| CheckError::Selector(selector.to_string()))
    }

    /// Type a value character by character with randomized pacing to emulate
    /// human input.
    async fn type_paced(&self, page: &Page, selector: &str, text: &str) -> Result<(), CheckError> {
        let element = self.find(page, selector).await?;
        element
            .click()
            .await
            .map_err(|e| CheckError::Browser(format!("focus {}: {}", selector, e)))?;

        for ch in text.chars() {
            element
                .type_str(ch.to_string())
                .await
                .map_err(|e| CheckError::Browser(format!("typing into {}: {}", selector, e)))?;
            let pause = rand::rng().random_range(self.typing.min_ms..=self.typing.max_ms);
            tokio::time::sleep(Duration::from_millis(pause)).await;
        }

        Ok(())
    }

    /// Select a dropdown value if the dropdown exists; failures are logged
    /// and never fail the check.
    async fn select_dropdown(&self, page: &Page, selector: &str, value: &str) {
        let expression = format!(
            r#"(() => {{
                const el = document.querySelector({sel});
                if (!el) return false;
                el.value = {val};
                el.dispatchEvent(new Event('change', {{ bubbles: true }}));
                return true;
            }})()"#,
            sel = js_string(selector),
            val = js_string(value),
        );

        match page.evaluate(expression).await {
            Ok(result) => {
                let selected: bool = result.into_value().unwrap_or(false);
                if !selected {
                    tracing::debug!(selector, "dropdown not present, skipping");
                }
            }
            Err(e) => tracing::debug!(selector, "dropdown selection failed: {}", e),
        }
    }

    /// Extract per-element facts for every slot indicator in one round trip.
    async fn collect_slot_facts(
        &self,
        page: &Page,
        selector: &str,
    ) -> Result<Vec<SlotFacts>, CheckError> {
        let expression = format!(
            r#"Array.from(document.querySelectorAll({sel})).map(el => ({{
                text: el.innerText || el.textContent || '',
                class_name: el.className || '',
                disabled: !!(el.disabled
                    || el.hasAttribute('disabled')
                    || el.getAttribute('aria-disabled') === 'true')
            }}))"#,
            sel = js_string(selector),
        );

        let result = page
            .evaluate(expression)
            .await
            .map_err(|e| CheckError::Browser(format!("slot extraction: {}", e)))?;

        result
            .into_value()
            .map_err(|e| CheckError::Browser(format!("slot extraction decode: {}", e)))
    }

    /// Wait up to the configured window for a challenge to be solved by the
    /// operator. Times out with a warning; the submit proceeds regardless.
    async fn wait_for_challenge_clear(&self, page: &Page, site: &SiteConfig) {
        if !self.challenge_present(page, site).await {
            return;
        }

        tracing::info!(site = %site.key, "challenge detected, waiting for operator");
        let deadline = Instant::now() + self.timeouts.challenge_wait;
        while Instant::now() < deadline {
            tokio::time::sleep(CHALLENGE_POLL).await;
            if !self.challenge_present(page, site).await {
                tracing::info!(site = %site.key, "challenge cleared");
                return;
            }
        }
        tracing::warn!(site = %site.key, "challenge still present after wait window");
    }

    async fn challenge_present(&self, page: &Page, site: &SiteConfig) -> bool {
        if let Some(selector) = &site.selectors.challenge_indicator {
            if page.find_element(selector.as_str()).await.is_ok() {
                return true;
            }
        }
        match page.content().await {
            Ok(content) => self.policy.has_challenge(&content),
            Err(_) => false,
        }
    }
}

/// Quote a string for safe embedding in a JS expression.
fn js_string(value: &str) -> String {
    serde_json::to_string(value).expect("strings always serialize")
}

#[async_trait]
impl ApplicationChecker<Arc<BrowserHandle>> for SiteDriver {
    async fn check(
        &self,
        site: &SiteConfig,
        application: &ApplicationRecord,
        handle: &Arc<BrowserHandle>,
    ) -> Result<CheckOutcome, CheckError> {
        let session = CheckSession::open(handle, self.block_heavy_resources).await?;

        // The session is closed on every path, including throttling and
        // errors; the outcome is decided before the page goes away.
        let result = self.run_check(&session, site, application).await;
        session.close().await;
        result
    }
}

/// Launches one browser process per lease.
pub struct BrowserLeaseFactory {
    headless: bool,
}

impl BrowserLeaseFactory {
    pub fn new(profile: RunProfile) -> Self {
        Self {
            headless: profile == RunProfile::Headless,
        }
    }
}

#[async_trait]
impl LeaseFactory<Arc<BrowserHandle>> for BrowserLeaseFactory {
    async fn create(&self, site: &SiteConfig) -> slotwatch_browser::Result<Arc<BrowserHandle>> {
        tracing::debug!(site = %site.key, "launching browser lease");
        Ok(Arc::new(BrowserHandle::launch(self.headless).await?))
    }

    async fn close(&self, handle: Arc<BrowserHandle>) {
        handle.close().await;
    }
}
