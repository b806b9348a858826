//! Engine lifecycle as an explicit state machine
//!
//! The machine owns every counter that decides whether the model backend is
//! used. It never touches a backend itself; the engine performs the actions
//! the transitions ask for.

use super::types::{BackendError, BackendErrorKind};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineState {
    Uninitialized,
    Loading,
    Ready,
    Degraded,
    /// The heuristic path itself broke; unrecoverable
    Failed,
}

/// Which backend variant a call should use
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Route {
    Model,
    Heuristic,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Thresholds {
    /// Init retries after the first failed attempt
    pub max_init_retries: u32,
    /// Consecutive generic failures that demote the engine
    pub max_errors_before_fallback: u32,
    /// Timestamp anomalies that force a backend reset
    pub max_timestamp_anomalies: u32,
}

impl Default for Thresholds {
    fn default() -> Self {
        Self {
            max_init_retries: 3,
            max_errors_before_fallback: 3,
            max_timestamp_anomalies: 2,
        }
    }
}

/// How a backend failure is handled
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    Generic,
    TimestampAnomaly,
    ResourceExhausted,
}

const TIMESTAMP_KEYWORDS: &[&str] = &["timestamp", "monoton", "out of order"];
const MEMORY_KEYWORDS: &[&str] = &["memory", "alloc", "buffer", "heap"];

impl FailureKind {
    /// Map a backend error onto a failure category
    ///
    /// Structured kinds win. Unclassified errors fall back to keyword matching
    /// on the message.
    pub fn classify(error: &BackendError) -> Self {
        match error.kind {
            BackendErrorKind::StaleTimestamp => FailureKind::TimestampAnomaly,
            BackendErrorKind::ResourceExhausted => FailureKind::ResourceExhausted,
            BackendErrorKind::Init | BackendErrorKind::InvalidOutput => FailureKind::Generic,
            BackendErrorKind::Unclassified => Self::from_message(&error.message),
        }
    }

    fn from_message(message: &str) -> Self {
        let message = message.to_lowercase();
        if TIMESTAMP_KEYWORDS.iter().any(|k| message.contains(k)) {
            FailureKind::TimestampAnomaly
        } else if MEMORY_KEYWORDS.iter().any(|k| message.contains(k)) {
            FailureKind::ResourceExhausted
        } else {
            FailureKind::Generic
        }
    }
}

/// Next step after a failed init attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InitStep {
    Retry { attempt: u32 },
    Abandon,
}

/// Effect of a failed inference on the machine
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    /// Keep using the model
    Continue,
    /// Model abandoned for the session
    Demoted,
    /// Backend must be torn down and reinitialized before the next inference
    ResetScheduled,
}

#[derive(Debug, Clone)]
pub struct StateMachine {
    state: EngineState,
    thresholds: Thresholds,
    init_failures: u32,
    consecutive_errors: u32,
    timestamp_anomalies: u32,
    reset_pending: bool,
}

impl StateMachine {
    pub fn new(thresholds: Thresholds) -> Self {
        Self {
            state: EngineState::Uninitialized,
            thresholds,
            init_failures: 0,
            consecutive_errors: 0,
            timestamp_anomalies: 0,
            reset_pending: false,
        }
    }

    /// A machine with no model at all; every call takes the heuristic path
    pub fn heuristic_only(thresholds: Thresholds) -> Self {
        Self {
            state: EngineState::Degraded,
            ..Self::new(thresholds)
        }
    }

    pub fn state(&self) -> EngineState {
        self.state
    }

    pub fn thresholds(&self) -> &Thresholds {
        &self.thresholds
    }

    pub fn consecutive_errors(&self) -> u32 {
        self.consecutive_errors
    }

    pub fn timestamp_anomalies(&self) -> u32 {
        self.timestamp_anomalies
    }

    pub fn reset_pending(&self) -> bool {
        self.reset_pending
    }

    pub fn route(&self) -> Route {
        match self.state {
            EngineState::Ready => Route::Model,
            _ => Route::Heuristic,
        }
    }

    /// Uninitialized -> Loading; returns false if already past that point
    pub fn begin_loading(&mut self) -> bool {
        if self.state != EngineState::Uninitialized {
            return false;
        }
        self.state = EngineState::Loading;
        true
    }

    /// True until the init handshake has settled on Ready or Degraded
    ///
    /// Stays true in Loading, so an init that was cancelled part way is
    /// picked up again by the next call.
    pub fn needs_init(&self) -> bool {
        matches!(
            self.state,
            EngineState::Uninitialized | EngineState::Loading
        )
    }

    pub fn init_succeeded(&mut self) {
        if self.state == EngineState::Loading {
            self.state = EngineState::Ready;
            self.init_failures = 0;
        }
    }

    pub fn init_failed(&mut self) -> InitStep {
        if self.state != EngineState::Loading {
            return InitStep::Abandon;
        }
        self.init_failures += 1;
        if self.init_failures > self.thresholds.max_init_retries {
            self.state = EngineState::Degraded;
            InitStep::Abandon
        } else {
            InitStep::Retry {
                attempt: self.init_failures,
            }
        }
    }

    pub fn inference_succeeded(&mut self) {
        self.consecutive_errors = 0;
        self.timestamp_anomalies = 0;
    }

    pub fn inference_failed(&mut self, kind: FailureKind) -> Verdict {
        if self.state != EngineState::Ready {
            return Verdict::Continue;
        }

        match kind {
            FailureKind::TimestampAnomaly => {
                self.timestamp_anomalies += 1;
                if self.timestamp_anomalies >= self.thresholds.max_timestamp_anomalies {
                    self.reset_pending = true;
                    return Verdict::ResetScheduled;
                }
                Verdict::Continue
            }
            FailureKind::Generic | FailureKind::ResourceExhausted => {
                self.consecutive_errors += 1;
                if self.consecutive_errors >= self.thresholds.max_errors_before_fallback {
                    self.state = EngineState::Degraded;
                    self.reset_pending = false;
                    return Verdict::Demoted;
                }
                Verdict::Continue
            }
        }
    }

    /// Consume a pending reset: counters cleared, state back to Loading
    ///
    /// Returns false when no reset was pending.
    pub fn take_reset(&mut self) -> bool {
        if !self.reset_pending {
            return false;
        }
        self.reset_pending = false;
        self.consecutive_errors = 0;
        self.timestamp_anomalies = 0;
        self.init_failures = 0;
        self.state = EngineState::Loading;
        true
    }

    pub fn fail(&mut self) {
        self.state = EngineState::Failed;
    }
}
