//! Per-requester rate limiting for the on-demand search command.
//!
//! Each identity owns a small ring of request instants. A check prunes
//! entries older than the trailing hour; the identity is blocked once the
//! hourly cap is reached and the cooldown window has not yet elapsed since
//! its most recent request.

use std::collections::{HashMap, VecDeque};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

pub const DEFAULT_COOLDOWN: Duration = Duration::from_secs(30);
pub const DEFAULT_MAX_REQUESTS_PER_HOUR: usize = 20;

const HOURLY_WINDOW: Duration = Duration::from_secs(60 * 60);

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CooldownPolicy {
    pub cooldown: Duration,
    pub max_requests_per_hour: usize,
}

impl Default for CooldownPolicy {
    fn default() -> Self {
        Self { cooldown: DEFAULT_COOLDOWN, max_requests_per_hour: DEFAULT_MAX_REQUESTS_PER_HOUR }
    }
}

#[derive(Debug, Default)]
pub struct CooldownTracker {
    policy: CooldownPolicy,
    ledgers: Mutex<HashMap<String, VecDeque<Instant>>>,
}

impl CooldownTracker {
    pub fn new(policy: CooldownPolicy) -> Self {
        Self { policy, ledgers: Mutex::new(HashMap::new()) }
    }

    pub fn policy(&self) -> CooldownPolicy {
        self.policy
    }

    pub fn is_on_cooldown(&self, identity: &str) -> bool {
        self.is_on_cooldown_at(identity, Instant::now())
    }

    pub fn is_on_cooldown_at(&self, identity: &str, now: Instant) -> bool {
        self.retry_after_at(identity, now).is_some()
    }

    /// Time left before `identity` may issue another request, if blocked.
    pub fn retry_after(&self, identity: &str) -> Option<Duration> {
        self.retry_after_at(identity, Instant::now())
    }

    pub fn retry_after_at(&self, identity: &str, now: Instant) -> Option<Duration> {
        let mut ledgers = self.lock();
        let ledger = ledgers.get_mut(identity)?;
        prune_expired(ledger, now);

        let Some(&last) = ledger.back() else {
            ledgers.remove(identity);
            return None;
        };

        if ledger.len() < self.policy.max_requests_per_hour {
            return None;
        }

        let elapsed = now.saturating_duration_since(last);
        (elapsed < self.policy.cooldown).then(|| self.policy.cooldown - elapsed)
    }

    pub fn record_request(&self, identity: &str) {
        self.record_request_at(identity, Instant::now());
    }

    pub fn record_request_at(&self, identity: &str, now: Instant) {
        let mut ledgers = self.lock();
        ledgers.retain(|_, ledger| {
            ledger
                .back()
                .is_some_and(|last| now.saturating_duration_since(*last) < HOURLY_WINDOW)
        });

        let capacity = self.policy.max_requests_per_hour.max(1);
        let ledger = ledgers.entry(identity.to_owned()).or_default();
        while ledger.len() >= capacity {
            ledger.pop_front();
        }
        ledger.push_back(now);
    }

    pub fn tracked_identities(&self) -> usize {
        self.lock().len()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, VecDeque<Instant>>> {
        self.ledgers.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

fn prune_expired(ledger: &mut VecDeque<Instant>, now: Instant) {
    while ledger.front().is_some_and(|first| now.saturating_duration_since(*first) >= HOURLY_WINDOW)
    {
        ledger.pop_front();
    }
}
