use thiserror::Error;

/// The error taxonomy from spec.md §7, grounded in the teacher's
/// `validate::ValidationError` (one `#[error]`-annotated variant per
/// failure mode, `#[from]` for wrapped I/O/JSON errors).
///
/// Propagation policy is not encoded in the type itself — it's enforced at
/// call sites (Execution Manager, Engine) via explicit `match` on
/// `EngineError::severity()`, matching the teacher's preference for
/// explicit branching over a generic retry-everything combinator.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("data missing for key `{key}` at tick {timestamp}")]
    DataMissing { timestamp: u64, key: String },

    #[error("oracle invalid for `{pair}`: {reason}")]
    OracleInvalid { pair: String, reason: String },

    #[error("index invalid for `{protocol}:{token}`: {reason}")]
    IndexInvalid {
        protocol: String,
        token: String,
        reason: String,
    },

    #[error("invariant violated: {0}")]
    InvariantViolation(String),

    #[error("venue failure routing order `{order_id}`: {reason}")]
    VenueFailure { order_id: String, reason: String },

    #[error("reconciliation discrepancy on attempt {attempt}: {discrepancy_count} key(s) outside tolerance")]
    ReconciliationDiscrepancy {
        attempt: u32,
        discrepancy_count: usize,
    },

    #[error("reconciliation timed out after {elapsed_ms}ms ({attempts} attempts)")]
    ReconciliationTimeout { elapsed_ms: u64, attempts: u32 },

    #[error("venue failure routing order `{order_id}` persisted past retry ({attempts} attempts): {reason}")]
    VenueUnrecoverable {
        order_id: String,
        reason: String,
        attempts: u32,
    },

    #[error("strategy contract violation: {0}")]
    StrategyContract(String),

    #[error("config error: {0}")]
    ConfigError(String),

    #[error("health degraded: {0}")]
    HealthDegraded(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
}

/// How a given error should propagate per §7's policy table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    /// Retry with backoff (some `Reconciliation*`, transient `VenueFailure`).
    Recoverable,
    /// Halt this tick, emit an `error` event, continue next tick.
    TickFatal,
    /// Emit `system_failure`, flush the log, escalate to the hosting process.
    RunFatal,
}

impl EngineError {
    pub fn severity(&self) -> Severity {
        match self {
            EngineError::ReconciliationDiscrepancy { .. } => Severity::Recoverable,
            EngineError::VenueFailure { .. } => Severity::Recoverable,
            EngineError::DataMissing { .. }
            | EngineError::OracleInvalid { .. }
            | EngineError::IndexInvalid { .. }
            | EngineError::StrategyContract(_) => Severity::TickFatal,
            EngineError::ReconciliationTimeout { .. }
            | EngineError::InvariantViolation(_)
            | EngineError::VenueUnrecoverable { .. } => Severity::RunFatal,
            EngineError::ConfigError(_)
            | EngineError::HealthDegraded(_)
            | EngineError::Io(_)
            | EngineError::Json(_)
            | EngineError::Csv(_) => Severity::TickFatal,
        }
    }

    /// Small code set used as the process exit code on run-fatal
    /// escalation (§6 "Exit codes").
    pub fn exit_code(&self) -> i32 {
        match self {
            EngineError::ReconciliationTimeout { .. } => 10,
            EngineError::VenueFailure { .. } => 11,
            EngineError::DataMissing { .. } => 12,
            EngineError::InvariantViolation(_) => 13,
            EngineError::VenueUnrecoverable { .. } => 14,
            _ => 1,
        }
    }
}
