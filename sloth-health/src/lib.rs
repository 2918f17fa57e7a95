//! Sloth Health Library
//!
//! Readiness gating and prerequisite validation for freshly provisioned
//! cluster nodes. The readiness gate polls every node until the required
//! services report healthy; the validation runner runs independent checks
//! in parallel and aggregates their failures.

// Core modules
pub mod config;
pub mod error;
pub mod logging;

// Remote execution
pub mod executor;
pub mod script;
pub mod transport;

// Readiness
pub mod gate;
pub mod predicate;
pub mod signal;
pub mod status;

// Prerequisite validation
pub mod validation;

pub use config::SlothConfig;
pub use error::{FailedValidation, ReadinessError, ValidationError};
pub use executor::{CheckError, CheckErrorKind, CheckPayload, RemoteCheckExecutor};
pub use gate::{NodeReadinessGate, ReadinessRequest, INGRESS_SERVICES, KUBERNETES_SERVICES};
pub use predicate::{CheckOutput, ServiceRegistry};
pub use script::{CheckScriptBuilder, ShellScriptBuilder};
pub use signal::{wait_for_signal, DoneSignal, TaskGroup};
pub use status::{NodeHealthRecord, NodePhase, ReadinessSummary, StatusStore};
pub use transport::SshExecutor;
pub use validation::{
    CheckVerdict, FnCheck, PrerequisiteCheck, PrerequisiteValidationRunner, SharedCheck,
    ValidationOutcome, ValidationSummary,
};
