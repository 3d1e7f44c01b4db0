use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use chrono::{Duration, TimeZone, Utc};
use nastro::resubscribe::{AutoResubscribePolicy, ResubscribeOutcome};
use nastro_core::{ManualClock, NastroError, SubscriptionManager};
use nastro_types::{IntegritySeverity, ResubscribeConfig, SymbolSpec};

struct CountingManager {
    calls: AtomicU64,
    fail: bool,
}

impl CountingManager {
    fn succeeding() -> Arc<Self> {
        Arc::new(Self {
            calls: AtomicU64::new(0),
            fail: false,
        })
    }

    fn failing() -> Arc<Self> {
        Arc::new(Self {
            calls: AtomicU64::new(0),
            fail: true,
        })
    }

    fn calls(&self) -> u64 {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SubscriptionManager for CountingManager {
    async fn apply(&self, _spec: &SymbolSpec) -> Result<(), NastroError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fail {
            Err(NastroError::transient("alpaca", "apply failed"))
        } else {
            Ok(())
        }
    }
}

fn clock() -> Arc<ManualClock> {
    Arc::new(ManualClock::new(
        Utc.with_ymd_and_hms(2024, 3, 4, 14, 30, 0).unwrap(),
    ))
}

// Two error findings two seconds apart with a succeeding apply: the first
// triggers, the second is rate-limit skipped, one attempt total.
#[tokio::test]
async fn success_cooldown_skips_rapid_follow_up() {
    let manager = CountingManager::succeeding();
    let clock = clock();
    let policy =
        AutoResubscribePolicy::new(ResubscribeConfig::default(), manager.clone(), clock.clone());
    let spec = SymbolSpec::trades("AAPL");

    let first = policy
        .on_integrity_event("AAPL", IntegritySeverity::Error, &spec)
        .await;
    assert_eq!(first, ResubscribeOutcome::Triggered { success: true });

    clock.advance(Duration::seconds(2));
    let second = policy
        .on_integrity_event("AAPL", IntegritySeverity::Error, &spec)
        .await;
    assert_eq!(second, ResubscribeOutcome::SkippedCooldown);

    let snap = policy.snapshot();
    assert_eq!(snap.attempts, 1);
    assert_eq!(snap.rate_limited_skips, 1);
    assert_eq!(snap.symbols_in_cooldown, 1);
    assert_eq!(manager.calls(), 1);
}

// After a failed attempt (no cooldown), the spacing window still throttles:
// a second finding within five seconds is skipped.
#[tokio::test]
async fn attempt_spacing_throttles_after_failure() {
    let manager = CountingManager::failing();
    let clock = clock();
    let policy =
        AutoResubscribePolicy::new(ResubscribeConfig::default(), manager.clone(), clock.clone());
    let spec = SymbolSpec::trades("AAPL");

    let first = policy
        .on_integrity_event("AAPL", IntegritySeverity::Error, &spec)
        .await;
    assert_eq!(first, ResubscribeOutcome::Triggered { success: false });

    clock.advance(Duration::seconds(2));
    let second = policy
        .on_integrity_event("AAPL", IntegritySeverity::Error, &spec)
        .await;
    assert_eq!(second, ResubscribeOutcome::SkippedRateLimited);
    assert_eq!(manager.calls(), 1);

    // Past the spacing window the next finding attempts again.
    clock.advance(Duration::seconds(4));
    let third = policy
        .on_integrity_event("AAPL", IntegritySeverity::Error, &spec)
        .await;
    assert_eq!(third, ResubscribeOutcome::Triggered { success: false });
    assert_eq!(manager.calls(), 2);
}

// In any cooldown window following a success there is at most one attempt.
#[tokio::test]
async fn at_most_one_attempt_per_cooldown_window() {
    let manager = CountingManager::succeeding();
    let clock = clock();
    let policy =
        AutoResubscribePolicy::new(ResubscribeConfig::default(), manager.clone(), clock.clone());
    let spec = SymbolSpec::trades("AAPL");

    let first = policy
        .on_integrity_event("AAPL", IntegritySeverity::Error, &spec)
        .await;
    assert_eq!(first, ResubscribeOutcome::Triggered { success: true });

    // Hammer the policy across the 30-second cooldown; nothing gets through.
    for _ in 0..14 {
        clock.advance(Duration::seconds(2));
        let outcome = policy
            .on_integrity_event("AAPL", IntegritySeverity::Error, &spec)
            .await;
        assert_eq!(outcome, ResubscribeOutcome::SkippedCooldown);
    }
    assert_eq!(manager.calls(), 1);

    // Once the cooldown has fully elapsed, recovery may run again.
    clock.advance(Duration::seconds(5));
    let outcome = policy
        .on_integrity_event("AAPL", IntegritySeverity::Error, &spec)
        .await;
    assert_eq!(outcome, ResubscribeOutcome::Triggered { success: true });
    assert_eq!(manager.calls(), 2);
}
