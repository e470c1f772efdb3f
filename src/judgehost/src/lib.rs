//! Judgehost evaluation engine.
//!
//! Runs a compiled submission on every case of an [`EvaluationPlan`] inside
//! a sandbox, grades the output with a validator or a diff, and merges
//! results up through the test group tree. Results are streamed as they
//! become available.
//!
//! [`EvaluationPlan`]: judgehost_api::EvaluationPlan
pub mod config;
pub mod diff;
pub mod error;
mod evaluator;
pub mod file_linker;
mod judge;
pub mod log;
pub mod merge;
pub mod permissions;
pub mod sandbox;
mod validator;

pub use error::EvalError;
pub use evaluator::{result_channel, EvalEnv, Evaluator};
pub use validator::{ValidatorOutput, EXITCODE_AC, EXITCODE_WA};
