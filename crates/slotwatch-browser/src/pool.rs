use std::time::{Duration, Instant};

/// Availability state of one browser lease.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LeaseState {
    Idle,
    InUse,
    RateLimited,
}

/// One exclusively-owned slot in the pool, holding a browser handle.
#[derive(Debug)]
pub struct Lease<B> {
    index: usize,
    handle: B,
    state: LeaseState,
    last_used_at: Instant,
    rate_limited_until: Option<Instant>,
}

impl<B> Lease<B> {
    pub fn index(&self) -> usize {
        self.index
    }

    pub fn state(&self) -> LeaseState {
        self.state
    }
}

/// Fixed-size pool of browser leases for one site.
///
/// Exclusivity is enforced purely through the acquire/release protocol: an
/// acquired lease is `InUse` and will not be handed out again until released.
/// The pool is generic over the held handle so its semantics can be exercised
/// without a live browser.
#[derive(Debug)]
pub struct LeasePool<B> {
    leases: Vec<Lease<B>>,
}

impl<B: Clone> LeasePool<B> {
    pub fn new(handles: Vec<B>) -> Self {
        let now = Instant::now();
        let leases = handles
            .into_iter()
            .enumerate()
            .map(|(index, handle)| Lease {
                index,
                handle,
                state: LeaseState::Idle,
                last_used_at: now,
                rate_limited_until: None,
            })
            .collect();
        Self { leases }
    }

    pub fn len(&self) -> usize {
        self.leases.len()
    }

    pub fn is_empty(&self) -> bool {
        self.leases.is_empty()
    }

    /// Drain every lease out of the pool, leaving it empty. Used at engine
    /// shutdown to close the underlying browsers.
    pub fn take_handles(&mut self) -> Vec<B> {
        self.leases.drain(..).map(|l| l.handle).collect()
    }

    /// Acquire a lease, preferring the least-recently-used Idle lease.
    ///
    /// If none are Idle, the RateLimited lease closest to cooldown expiry is
    /// handed out anyway (best-effort degrade) rather than blocking or
    /// failing. Returns `None` only when the pool is empty or every lease is
    /// already `InUse`. Never blocks.
    pub fn acquire(&mut self) -> Option<(usize, B)> {
        self.acquire_at(Instant::now())
    }

    pub fn acquire_at(&mut self, now: Instant) -> Option<(usize, B)> {
        // Cooldown expiry is lazy: rate-limited leases return to Idle the
        // next time they are considered here.
        for lease in &mut self.leases {
            if lease.state == LeaseState::RateLimited
                && lease.rate_limited_until.is_none_or(|until| now >= until)
            {
                lease.state = LeaseState::Idle;
                lease.rate_limited_until = None;
            }
        }

        if let Some(lease) = self
            .leases
            .iter_mut()
            .filter(|l| l.state == LeaseState::Idle)
            .min_by_key(|l| l.last_used_at)
        {
            lease.state = LeaseState::InUse;
            return Some((lease.index, lease.handle.clone()));
        }

        if let Some(lease) = self
            .leases
            .iter_mut()
            .filter(|l| l.state == LeaseState::RateLimited)
            .min_by_key(|l| l.rate_limited_until)
        {
            tracing::debug!(
                lease = lease.index,
                "no idle lease, degrading to a rate-limited one"
            );
            lease.state = LeaseState::InUse;
            return Some((lease.index, lease.handle.clone()));
        }

        None
    }

    /// Return a lease to the pool.
    ///
    /// A lease whose cooldown window is still open goes back to RateLimited,
    /// not Idle, so a degraded acquisition does not erase the cooldown.
    pub fn release(&mut self, index: usize) {
        self.release_at(index, Instant::now());
    }

    pub fn release_at(&mut self, index: usize, now: Instant) {
        let Some(lease) = self.leases.get_mut(index) else {
            return;
        };
        lease.last_used_at = now;
        lease.state = match lease.rate_limited_until {
            Some(until) if until > now => LeaseState::RateLimited,
            _ => {
                lease.rate_limited_until = None;
                LeaseState::Idle
            }
        };
    }

    /// Put a lease into cooldown after the site signalled throttling.
    pub fn mark_rate_limited(&mut self, index: usize, cooldown: Duration) {
        self.mark_rate_limited_at(index, cooldown, Instant::now());
    }

    pub fn mark_rate_limited_at(&mut self, index: usize, cooldown: Duration, now: Instant) {
        if let Some(lease) = self.leases.get_mut(index) {
            lease.rate_limited_until = Some(now + cooldown);
            if lease.state != LeaseState::InUse {
                lease.state = LeaseState::RateLimited;
            }
            tracing::info!(lease = index, ?cooldown, "lease rate-limited");
        }
    }

    pub fn lease(&self, index: usize) -> Option<&Lease<B>> {
        self.leases.get(index)
    }
}
