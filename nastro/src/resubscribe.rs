//! Integrity-driven resubscription with per-symbol and global circuit
//! breakers.
//!
//! Two lock domains: the global circuit lives under its own mutex, and each
//! symbol's state sits behind its own lock inside the expiring store. No
//! operation ever holds both a symbol lock and the global lock across an
//! await.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use nastro_core::{Clock, ExpiringStateStore, SubscriptionManager};
use nastro_types::{IntegritySeverity, ResubscribeConfig, SymbolSpec};
use tokio::task::JoinHandle;

/// Breaker position.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CircuitState {
    /// Operating normally.
    #[default]
    Closed,
    /// Rejecting attempts until the open window elapses.
    Open,
    /// Probing with throttled test attempts.
    HalfOpen,
}

#[derive(Debug, Clone)]
struct SymbolState {
    last_attempt: Option<DateTime<Utc>>,
    last_success: Option<DateTime<Utc>>,
    consecutive_failures: u32,
    circuit: CircuitState,
    circuit_opened_at: Option<DateTime<Utc>>,
    last_activity: DateTime<Utc>,
}

impl SymbolState {
    fn new(now: DateTime<Utc>) -> Self {
        Self {
            last_attempt: None,
            last_success: None,
            consecutive_failures: 0,
            circuit: CircuitState::Closed,
            circuit_opened_at: None,
            last_activity: now,
        }
    }
}

#[derive(Debug, Default)]
struct GlobalState {
    state: CircuitState,
    opened_at: Option<DateTime<Utc>>,
    consecutive_failures: u32,
    last_half_open_test: Option<DateTime<Utc>>,
}

/// Why an integrity event did or did not produce a resubscribe attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResubscribeOutcome {
    /// An attempt ran; `success` is the apply result.
    Triggered {
        /// Whether the apply succeeded.
        success: bool,
    },
    /// Finding severity below the configured minimum.
    SkippedSeverity,
    /// Global circuit is open.
    SkippedGlobalCircuit,
    /// A half-open test ran too recently.
    SkippedHalfOpenThrottle,
    /// The symbol recovered within its cooldown window.
    SkippedCooldown,
    /// An attempt for the symbol ran too recently.
    SkippedRateLimited,
    /// The symbol's circuit is open.
    SkippedSymbolCircuit,
}

/// Counter snapshot plus breaker positions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PolicySnapshot {
    /// Attempts started.
    pub attempts: u64,
    /// Attempts that succeeded.
    pub successes: u64,
    /// Attempts that failed.
    pub failures: u64,
    /// Events skipped by cooldown or attempt spacing.
    pub rate_limited_skips: u64,
    /// Events skipped by an open circuit (either domain).
    pub circuit_skips: u64,
    /// Symbols currently within their post-success cooldown.
    pub symbols_in_cooldown: usize,
    /// Symbols whose circuit is currently open.
    pub symbols_with_open_circuit: usize,
    /// Global breaker position.
    pub global_state: CircuitState,
}

/// Rate-limited, circuit-broken recovery driver fed by integrity events.
pub struct AutoResubscribePolicy {
    config: ResubscribeConfig,
    manager: Arc<dyn SubscriptionManager>,
    clock: Arc<dyn Clock>,
    global: Mutex<GlobalState>,
    symbols: Arc<ExpiringStateStore<Arc<Mutex<SymbolState>>>>,
    attempts: AtomicU64,
    successes: AtomicU64,
    failures: AtomicU64,
    rate_limited_skips: AtomicU64,
    circuit_skips: AtomicU64,
    sweeper: Mutex<Option<JoinHandle<()>>>,
}

impl AutoResubscribePolicy {
    /// Policy applying recovery through `manager`, reading time from `clock`.
    #[must_use]
    pub fn new(
        config: ResubscribeConfig,
        manager: Arc<dyn SubscriptionManager>,
        clock: Arc<dyn Clock>,
    ) -> Arc<Self> {
        Arc::new(Self {
            config,
            manager,
            clock,
            global: Mutex::new(GlobalState::default()),
            symbols: Arc::new(ExpiringStateStore::new()),
            attempts: AtomicU64::new(0),
            successes: AtomicU64::new(0),
            failures: AtomicU64::new(0),
            rate_limited_skips: AtomicU64::new(0),
            circuit_skips: AtomicU64::new(0),
            sweeper: Mutex::new(None),
        })
    }

    /// Start the periodic sweep evicting symbol states idle past the
    /// configured expiry. Idempotent.
    ///
    /// # Panics
    /// Panics if the internal mutex is poisoned.
    pub fn spawn_sweeper(policy: &Arc<Self>) {
        let mut slot = policy.sweeper.lock().expect("mutex poisoned");
        if slot.is_some() {
            return;
        }
        let interval = policy.config.sweep_interval;
        let policy = Arc::downgrade(policy);
        *slot = Some(tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            ticker.tick().await;
            loop {
                ticker.tick().await;
                let Some(policy) = policy.upgrade() else { break };
                policy.sweep();
            }
        }));
    }

    /// Evict symbol states whose last activity is older than the configured
    /// expiry. Called by the sweeper; callable directly from tests.
    pub fn sweep(&self) {
        let now = self.clock.now();
        let expiry = chrono_duration(self.config.state_expiry);
        let evicted = self.symbols.remove_stale(|_, entry| {
            let state = entry.lock().expect("mutex poisoned");
            now - state.last_activity > expiry
        });
        if evicted > 0 {
            tracing::debug!(evicted, "swept idle resubscribe state");
        }
    }

    /// Handle one integrity finding for `symbol`, possibly re-applying its
    /// streaming configuration.
    pub async fn on_integrity_event(
        &self,
        symbol: &str,
        severity: IntegritySeverity,
        spec: &SymbolSpec,
    ) -> ResubscribeOutcome {
        if severity < self.config.min_severity {
            return ResubscribeOutcome::SkippedSeverity;
        }

        let now = self.clock.now();

        // Global gate. Tracks whether this attempt doubles as the half-open
        // probe, since its failure snaps the circuit back to open.
        let half_open_test = {
            let mut global = self.global.lock().expect("mutex poisoned");
            match global.state {
                CircuitState::Closed => false,
                CircuitState::Open => {
                    let elapsed_open = global
                        .opened_at
                        .map(|at| now - at)
                        .unwrap_or_else(ChronoDuration::zero);
                    if elapsed_open >= chrono_duration(self.config.circuit_breaker_duration) {
                        global.state = CircuitState::HalfOpen;
                        global.last_half_open_test = Some(now);
                        tracing::info!("global resubscribe circuit half-open");
                        true
                    } else {
                        self.circuit_skips.fetch_add(1, Ordering::Relaxed);
                        return ResubscribeOutcome::SkippedGlobalCircuit;
                    }
                }
                CircuitState::HalfOpen => {
                    let throttled = global.last_half_open_test.is_some_and(|at| {
                        now - at < chrono_duration(self.config.half_open_test_interval)
                    });
                    if throttled {
                        return ResubscribeOutcome::SkippedHalfOpenThrottle;
                    }
                    global.last_half_open_test = Some(now);
                    true
                }
            }
        };

        // Per-symbol gate, lazily creating the state.
        let entry = self
            .symbols
            .get_or_add(symbol, || Arc::new(Mutex::new(SymbolState::new(now))));
        {
            let mut state = entry.lock().expect("mutex poisoned");
            state.last_activity = now;

            let in_cooldown = state.last_success.is_some_and(|at| {
                now - at < chrono_duration(self.config.symbol_cooldown)
            });
            if in_cooldown {
                self.rate_limited_skips.fetch_add(1, Ordering::Relaxed);
                return ResubscribeOutcome::SkippedCooldown;
            }

            let too_soon = state.last_attempt.is_some_and(|at| {
                now - at < chrono_duration(self.config.min_resubscribe_interval)
            });
            if too_soon {
                self.rate_limited_skips.fetch_add(1, Ordering::Relaxed);
                return ResubscribeOutcome::SkippedRateLimited;
            }

            if state.circuit == CircuitState::Open {
                let elapsed = state
                    .circuit_opened_at
                    .map(|at| now - at)
                    .unwrap_or_else(ChronoDuration::zero);
                if elapsed < chrono_duration(self.config.symbol_circuit_breaker_duration) {
                    self.circuit_skips.fetch_add(1, Ordering::Relaxed);
                    return ResubscribeOutcome::SkippedSymbolCircuit;
                }
                state.circuit = CircuitState::HalfOpen;
            }

            state.last_attempt = Some(now);
        }

        self.attempts.fetch_add(1, Ordering::Relaxed);
        let started = tokio::time::Instant::now();
        let result = self.manager.apply(spec).await;
        let elapsed = started.elapsed();
        let now = self.clock.now();

        match result {
            Ok(()) => {
                self.successes.fetch_add(1, Ordering::Relaxed);
                tracing::info!(symbol, elapsed_ms = elapsed.as_millis() as u64, "resubscribed");
                {
                    let mut state = entry.lock().expect("mutex poisoned");
                    state.last_success = Some(now);
                    state.consecutive_failures = 0;
                    state.circuit = CircuitState::Closed;
                    state.circuit_opened_at = None;
                    state.last_activity = now;
                }
                {
                    let mut global = self.global.lock().expect("mutex poisoned");
                    if global.state == CircuitState::HalfOpen {
                        tracing::info!("global resubscribe circuit closed");
                    }
                    global.state = CircuitState::Closed;
                    global.opened_at = None;
                    global.consecutive_failures = 0;
                }
                ResubscribeOutcome::Triggered { success: true }
            }
            Err(e) => {
                self.failures.fetch_add(1, Ordering::Relaxed);
                tracing::warn!(symbol, error = %e, "resubscribe attempt failed");
                {
                    let mut state = entry.lock().expect("mutex poisoned");
                    state.consecutive_failures += 1;
                    state.last_activity = now;
                    if state.consecutive_failures >= self.config.symbol_circuit_breaker_threshold {
                        state.circuit = CircuitState::Open;
                        state.circuit_opened_at = Some(now);
                        tracing::warn!(symbol, "symbol resubscribe circuit opened");
                    }
                }
                {
                    let mut global = self.global.lock().expect("mutex poisoned");
                    global.consecutive_failures += 1;
                    if half_open_test {
                        global.state = CircuitState::Open;
                        global.opened_at = Some(now);
                        tracing::warn!("half-open test failed, global circuit re-opened");
                    } else if global.consecutive_failures >= self.config.circuit_breaker_threshold {
                        global.state = CircuitState::Open;
                        global.opened_at = Some(now);
                        tracing::warn!(
                            failures = global.consecutive_failures,
                            "global resubscribe circuit opened"
                        );
                    }
                }
                ResubscribeOutcome::Triggered { success: false }
            }
        }
    }

    /// Current counters and breaker positions.
    ///
    /// # Panics
    /// Panics if an internal mutex is poisoned.
    #[must_use]
    pub fn snapshot(&self) -> PolicySnapshot {
        let now = self.clock.now();
        let cooldown = chrono_duration(self.config.symbol_cooldown);
        let mut symbols_in_cooldown = 0;
        let mut symbols_with_open_circuit = 0;
        self.symbols.for_each(|_, entry| {
            let state = entry.lock().expect("mutex poisoned");
            if state.last_success.is_some_and(|at| now - at < cooldown) {
                symbols_in_cooldown += 1;
            }
            if state.circuit == CircuitState::Open {
                symbols_with_open_circuit += 1;
            }
        });

        PolicySnapshot {
            attempts: self.attempts.load(Ordering::Relaxed),
            successes: self.successes.load(Ordering::Relaxed),
            failures: self.failures.load(Ordering::Relaxed),
            rate_limited_skips: self.rate_limited_skips.load(Ordering::Relaxed),
            circuit_skips: self.circuit_skips.load(Ordering::Relaxed),
            symbols_in_cooldown,
            symbols_with_open_circuit,
            global_state: self.global.lock().expect("mutex poisoned").state,
        }
    }

    /// Stop the sweeper task.
    ///
    /// # Panics
    /// Panics if the internal mutex is poisoned.
    pub fn shutdown(&self) {
        if let Some(handle) = self.sweeper.lock().expect("mutex poisoned").take() {
            handle.abort();
        }
    }
}

impl Drop for AutoResubscribePolicy {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn chrono_duration(d: std::time::Duration) -> ChronoDuration {
    ChronoDuration::from_std(d).unwrap_or_else(|_| ChronoDuration::seconds(i64::MAX / 1_000))
}
