//! Error taxonomy: configuration, trace loading, and simulator invariant violations.

use thiserror::Error;

/// Errors raised while loading or validating a configuration document.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse config file {path}: {source}")]
    Yaml {
        path: String,
        #[source]
        source: serde_yaml::Error,
    },
    #[error("unknown preemption_mode {0:?}, expected \"swap\" or \"sacrifice\"")]
    InvalidPreemptionMode(String),
    #[error("unknown preemption_strategy {0:?}, expected \"aggressive\" or \"conservative\"")]
    InvalidPreemptionStrategy(String),
    #[error("truncation.batch_id is required when running in truncate mode")]
    MissingTruncationBatchId,
    #[error("generation config is required to (re)generate a trace")]
    MissingGenerationConfig,
    #[error("admission_control.threshold must be within [0, 1], got {0}")]
    InvalidAdmissionThreshold(f64),
}

/// Errors raised while loading a request trace.
#[derive(Error, Debug)]
pub enum TraceError {
    #[error("failed to read trace file {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse trace row in {path}: {source}")]
    Csv {
        path: String,
        #[source]
        source: csv::Error,
    },
}

/// Fatal violations of the scheduler's memory invariant. The only error class
/// the simulator core itself can raise; every other adverse condition (stall,
/// empty victim list, B too small) is a graceful, non-error control path.
#[derive(Error, Debug)]
pub enum SimError {
    #[error(
        "invariant violation: request {req_id} requires {required} tokens but only \
         {available} are available (policy bug: admission must not exceed M_total)"
    )]
    InvariantViolation {
        req_id: u64,
        required: u64,
        available: i64,
    },
}

/// Top-level error surfaced by the CLI binary.
#[derive(Error, Debug)]
pub enum AppError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Trace(#[from] TraceError),
    #[error(transparent)]
    Sim(#[from] SimError),
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Csv(#[from] csv::Error),
}
