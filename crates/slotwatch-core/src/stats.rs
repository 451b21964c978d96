use serde::Serialize;
use std::collections::HashMap;

/// Counters for one monitored site.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SiteStats {
    pub checks: u64,
    pub slots_found: u64,
    pub bookings: u64,
}

impl SiteStats {
    pub fn add(&mut self, other: &SiteStats) {
        self.checks += other.checks;
        self.slots_found += other.slots_found;
        self.bookings += other.bookings;
    }
}

/// Per-site and aggregate counters for one engine run.
#[derive(Debug, Clone, Default, Serialize)]
pub struct EngineStats {
    pub per_site: HashMap<String, SiteStats>,
    pub total: SiteStats,
}

impl EngineStats {
    pub fn from_sites(per_site: HashMap<String, SiteStats>) -> Self {
        let mut total = SiteStats::default();
        for stats in per_site.values() {
            total.add(stats);
        }
        Self { per_site, total }
    }
}
