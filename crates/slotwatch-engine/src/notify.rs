use slotwatch_core::application::ApplicationRecord;
use slotwatch_core::site::SiteConfig;
use slotwatch_core::store::ApplicationStore;
use std::sync::Arc;

/// The two operator-visible event kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotifyEvent {
    SlotsFound,
    BookingSuccess,
}

impl NotifyEvent {
    pub fn action(&self) -> &'static str {
        match self {
            NotifyEvent::SlotsFound => "slots_found",
            NotifyEvent::BookingSuccess => "booking_success",
        }
    }

    pub fn message(&self, site_name: &str, applicant: &str) -> String {
        match self {
            NotifyEvent::SlotsFound => {
                format!("Appointment slots open at {} for {}", site_name, applicant)
            }
            NotifyEvent::BookingSuccess => {
                format!("Appointment booked at {} for {}", site_name, applicant)
            }
        }
    }
}

/// Emits operator alerts and structured activity-log entries.
///
/// The activity log is always written; the console alert only when an
/// operator is assumed present. Delivery is best effort, there is no
/// exactly-once guarantee.
pub struct Notifier {
    store: Arc<dyn ApplicationStore>,
    operator_alerts: bool,
}

impl Notifier {
    pub fn new(store: Arc<dyn ApplicationStore>, operator_alerts: bool) -> Self {
        Self {
            store,
            operator_alerts,
        }
    }

    pub async fn notify(
        &self,
        event: NotifyEvent,
        site: &SiteConfig,
        application: &ApplicationRecord,
    ) {
        let message = event.message(&site.name, &application.applicant_name);

        if self.operator_alerts {
            let styled = match event {
                NotifyEvent::SlotsFound => console::style(&message).green().bold(),
                NotifyEvent::BookingSuccess => console::style(&message).cyan().bold(),
            };
            println!("🔔 {}", styled);
        }

        tracing::info!(site = %site.key, application = %application.id, "{}", message);

        if let Err(e) = self
            .store
            .log_activity(Some(&application.id), &site.key, event.action(), &message)
            .await
        {
            tracing::warn!("failed to record {} activity: {}", event.action(), e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_actions_are_stable() {
        assert_eq!(NotifyEvent::SlotsFound.action(), "slots_found");
        assert_eq!(NotifyEvent::BookingSuccess.action(), "booking_success");
    }

    #[test]
    fn test_messages_carry_site_and_applicant() {
        let msg = NotifyEvent::SlotsFound.message("Portal A", "Jordan Doe");
        assert!(msg.contains("Portal A"));
        assert!(msg.contains("Jordan Doe"));

        let msg = NotifyEvent::BookingSuccess.message("Portal A", "Jordan Doe");
        assert!(msg.starts_with("Appointment booked"));
    }
}
