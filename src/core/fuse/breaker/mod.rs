//!  Circuit Breaker State Machine:
//!
//!                                switch to open based on rule
//!
//!             +-----------------------------------------------------------------------+
//!             |                                                                       |
//!             |                                                                       v
//!     +----------------+                   +----------------+      Probe      +----------------+
//!     |                |                   |                |<----------------|                |
//!     |                |   Probe succeed   |                |                 |                |
//!     |     Closed     |<------------------|    HalfOpen    |                 |      Open      |
//!     |                |                   |                |   Probe failed  |                |
//!     |                |                   |                +---------------->|                |
//!     +----------------+                   +----------------+                 +----------------+
//!
//! The closed breaker evaluates its window on every entry once the window holds more
//! passes than the rule's warning line. The open breaker admits a single probe once the
//! restore time has elapsed, the probe's completion decides between closed and open.

#![allow(clippy::wrong_self_convention)]

/// Average response time
pub mod avg_rt;
/// Error count
pub mod error_count;
/// Error ratio
pub mod error_ratio;
pub mod window;

pub use avg_rt::*;
pub use error_count::*;
pub use error_ratio::*;
pub use window::*;

use super::*;
use crate::{
    base::{MetricEvent, Snapshot},
    logging,
    stat::BucketLeapArray,
    utils,
};
use std::fmt;
use std::sync::{
    atomic::{AtomicU64, Ordering},
    Arc, Mutex, RwLock,
};

/// States of Circuit Breaker State Machine
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum State {
    Closed,
    HalfOpen,
    Open,
}

impl Default for State {
    fn default() -> State {
        State::Closed
    }
}

/// Decision of `try_pass`.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Permit {
    /// the breaker is closed
    Granted,
    /// the breaker just went half-open and lets this request through as its probe
    Probe,
    Denied,
}

/// `StateChangeListener` listens on the circuit breaker state change event
pub trait StateChangeListener: Sync + Send {
    /// on_transform_to_closed is triggered when circuit breaker state transformed to Closed.
    fn on_transform_to_closed(&self, prev: State, rule: Arc<Rule>);

    /// `on_transform_to_open` is triggered when circuit breaker state transformed to Open.
    /// The "snapshot" indicates the triggered value when the transformation occurs.
    fn on_transform_to_open(&self, prev: State, rule: Arc<Rule>, snapshot: Option<Arc<Snapshot>>);

    /// `on_transform_to_half_open` is triggered when circuit breaker state transformed to HalfOpen.
    fn on_transform_to_half_open(&self, prev: State, rule: Arc<Rule>);
}

/// Listener list shared by the rule manager and all of its breakers.
pub type StateChangeListeners = Arc<RwLock<Vec<Arc<dyn StateChangeListener>>>>;

/// `CircuitBreakerTrait` is the basic trait of circuit breaker.
/// The grades only differ in how the window is judged, the state machine lives in `BreakerBase`.
pub trait CircuitBreakerTrait: Send + Sync + fmt::Debug {
    /// `breaker` returns the associated inner breaker.
    fn breaker(&self) -> &BreakerBase;

    /// Returns the triggered value when the window exceeds the threshold of the rule.
    fn triggered_value(&self, window: &WindowStat) -> Option<f64>;

    /// Returns the snapshot to report when the completion of a probe re-opens the breaker,
    /// `None` when the probe succeeded.
    fn probe_failure(&self, rt: u64, err_count: u64) -> Option<Arc<Snapshot>> {
        let _ = rt;
        if err_count > 0 {
            Some(Arc::new(err_count))
        } else {
            None
        }
    }

    /// `try_pass` acquires permission of an invocation only if it is available at the time of invocation.
    /// it checks circuit breaker based on state machine of circuit breaker.
    fn try_pass(&self) -> Permit {
        let breaker = self.breaker();
        match breaker.current_state() {
            State::Closed => {
                let window = breaker.window_stat(utils::curr_time_millis());
                if window.pass <= breaker.rule.warning_line {
                    return Permit::Granted;
                }
                match self.triggered_value(&window) {
                    Some(value) => {
                        breaker.from_closed_to_open(Arc::new(value));
                        Permit::Denied
                    }
                    None => Permit::Granted,
                }
            }
            State::Open => {
                if breaker.retry_timeout_arrived() && breaker.from_open_to_half_open() {
                    Permit::Probe
                } else {
                    Permit::Denied
                }
            }
            State::HalfOpen => Permit::Denied,
        }
    }

    /// `bound_rule` returns the associated circuit breaking rule.
    #[inline]
    fn bound_rule(&self) -> &Arc<Rule> {
        self.breaker().bound_rule()
    }

    /// `current_state` returns current state of the circuit breaker.
    #[inline]
    fn current_state(&self) -> State {
        self.breaker().current_state()
    }

    /// Records a request admitted by the whole slot chain.
    fn on_request_pass(&self, batch_count: u32) {
        self.breaker().record(MetricEvent::Pass, batch_count as u64);
    }

    /// The probe admitted by `try_pass` was blocked by a later check, so the
    /// breaker goes back to open without waiting for a completion.
    fn on_probe_blocked(&self) {
        self.breaker().from_half_open_to_open(Arc::new(State::HalfOpen));
    }

    /// `on_request_complete` record a completed request with the given response time as well as error count,
    /// and handle state transformation of the circuit breaker.
    /// `on_request_complete` is called only when a passed invocation finished.
    fn on_request_complete(&self, rt: u64, err_count: u64) {
        let breaker = self.breaker();
        breaker.record(MetricEvent::Complete, 1);
        breaker.record(MetricEvent::Rt, rt);
        if err_count > 0 {
            breaker.record(MetricEvent::Error, err_count);
        }
        if breaker.current_state() == State::HalfOpen {
            match self.probe_failure(rt, err_count) {
                Some(snapshot) => {
                    breaker.from_half_open_to_open(snapshot);
                }
                None => {
                    if breaker.from_half_open_to_closed() {
                        breaker.reset_metric();
                    }
                }
            }
        }
    }
}

/// BreakerBase encompasses the common fields of circuit breaker.
pub struct BreakerBase {
    rule: Arc<Rule>,
    /// restore_time_ms represents recovery timeout (in milliseconds) before the circuit breaker opens.
    restore_time_ms: u32,
    /// next_retry_timestamp_ms is the time circuit breaker could probe
    next_retry_timestamp_ms: AtomicU64,
    /// state is the state machine of circuit breaker
    state: Mutex<State>,
    stat: Arc<BucketLeapArray>,
    listeners: StateChangeListeners,
}

impl fmt::Debug for BreakerBase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BreakerBase")
            .field("rule", &self.rule)
            .field("state", &self.current_state())
            .field("next_retry_timestamp_ms", &self.next_retry_timestamp_ms)
            .finish()
    }
}

impl BreakerBase {
    pub fn new(rule: Arc<Rule>, stat: Arc<BucketLeapArray>, listeners: StateChangeListeners) -> Self {
        let restore_time_ms = rule.restore_time_ms;
        BreakerBase {
            rule,
            restore_time_ms,
            next_retry_timestamp_ms: AtomicU64::new(0),
            state: Mutex::new(State::default()),
            stat,
            listeners,
        }
    }

    pub fn bound_rule(&self) -> &Arc<Rule> {
        &self.rule
    }

    pub fn stat(&self) -> &Arc<BucketLeapArray> {
        &self.stat
    }

    pub fn current_state(&self) -> State {
        *self.state.lock().unwrap()
    }

    pub fn next_retry_timestamp_ms(&self) -> u64 {
        self.next_retry_timestamp_ms.load(Ordering::SeqCst)
    }

    pub fn retry_timeout_arrived(&self) -> bool {
        utils::curr_time_millis() >= self.next_retry_timestamp_ms.load(Ordering::SeqCst)
    }

    fn update_next_retry_timestamp(&self) {
        self.next_retry_timestamp_ms.store(
            utils::curr_time_millis() + self.restore_time_ms as u64,
            Ordering::SeqCst,
        );
    }

    /// Sums up the window of the breaker at `now`.
    pub fn window_stat(&self, now: u64) -> WindowStat {
        WindowStat::of(&self.stat, now)
    }

    pub fn record(&self, event: MetricEvent, count: u64) {
        if let Err(err) = self
            .stat
            .add_count_with_time(utils::curr_time_millis(), event, count)
        {
            logging::FREQUENT_ERROR_ONCE.call_once(|| {
                logging::error!(
                    "[CircuitBreaker] Fail to record {:?} for rule {:?}, error: {:?}",
                    event,
                    self.rule,
                    err
                );
            });
        }
    }

    pub fn reset_metric(&self) {
        self.stat.reset();
    }

    /// Runs `f` on a copy of the listeners, so listeners may register others.
    fn notify<F: Fn(&dyn StateChangeListener)>(&self, f: F) {
        let listeners = self.listeners.read().unwrap().clone();
        for listener in listeners.iter() {
            f(listener.as_ref());
        }
    }

    fn transform(&self, from: State, to: State) -> bool {
        let mut state = self.state.lock().unwrap();
        if *state != from {
            return false;
        }
        *state = to;
        if to == State::Open {
            self.update_next_retry_timestamp();
        }
        true
    }

    /// from_closed_to_open updates circuit breaker state machine from closed to open.
    /// Return true only if current thread successfully accomplished the transformation.
    pub fn from_closed_to_open(&self, snapshot: Arc<Snapshot>) -> bool {
        if !self.transform(State::Closed, State::Open) {
            return false;
        }
        logging::info!(
            "[CircuitBreaker] Closed -> Open, resource {}, triggered value {:?}",
            self.rule.resource,
            snapshot
        );
        self.notify(|listener| {
            listener.on_transform_to_open(
                State::Closed,
                Arc::clone(&self.rule),
                Some(Arc::clone(&snapshot)),
            )
        });
        true
    }

    /// from_open_to_half_open updates circuit breaker state machine from open to half-open.
    /// Return true only if current thread successfully accomplished the transformation.
    pub fn from_open_to_half_open(&self) -> bool {
        if !self.transform(State::Open, State::HalfOpen) {
            return false;
        }
        logging::debug!(
            "[CircuitBreaker] Open -> HalfOpen, resource {}",
            self.rule.resource
        );
        self.notify(|listener| {
            listener.on_transform_to_half_open(State::Open, Arc::clone(&self.rule))
        });
        true
    }

    /// from_half_open_to_open updates circuit breaker state machine from half-open to open.
    /// Return true only if current thread successfully accomplished the transformation.
    pub fn from_half_open_to_open(&self, snapshot: Arc<Snapshot>) -> bool {
        if !self.transform(State::HalfOpen, State::Open) {
            return false;
        }
        logging::info!(
            "[CircuitBreaker] HalfOpen -> Open, resource {}",
            self.rule.resource
        );
        self.notify(|listener| {
            listener.on_transform_to_open(
                State::HalfOpen,
                Arc::clone(&self.rule),
                Some(Arc::clone(&snapshot)),
            )
        });
        true
    }

    /// from_half_open_to_closed updates circuit breaker state machine from half-open to closed
    /// Return true only if current thread successfully accomplished the transformation.
    pub fn from_half_open_to_closed(&self) -> bool {
        if !self.transform(State::HalfOpen, State::Closed) {
            return false;
        }
        logging::info!(
            "[CircuitBreaker] HalfOpen -> Closed, resource {}",
            self.rule.resource
        );
        self.notify(|listener| {
            listener.on_transform_to_closed(State::HalfOpen, Arc::clone(&self.rule))
        });
        true
    }
}

#[cfg(test)]
pub(crate) use test::MockStateListener;
