//! Problem details with provenance for the modkit framework
//!
//! A [`Problem`] is an RFC 9457 style error value that also carries the chain of causes that
//! led to it, each with the call stack captured when it was created. It includes:
//! - Typed constructors (`Typed`) with type-directed argument dispatch
//! - Cause chains (`CauseChain`) recovered from wrapped errors
//! - Merging of concurrently reported problems (`Problem::merge`)
//! - A catalog of common request problems (`Catalog`)
#![cfg_attr(coverage_nightly, feature(coverage_attribute))]

pub mod args;
pub mod catalog;
pub mod cause;
pub mod config;
pub mod context;
pub mod problem;
pub mod stack;
pub mod typed;

// Re-export commonly used types
pub use args::{Arg, Category, Detail, Field, Instance, Meta, Resource, ValidationResult};
pub use catalog::{Catalog, TypeDef};
pub use cause::{Cause, CauseChain};
pub use config::{ConfigError, ProblemConfig};
pub use context::{IdSource, IdSourceError, OsRandomIds, ProblemContext, SequentialIds};
pub use problem::{APPLICATION_PROBLEM_JSON, Problem, ServiceError, as_problem};
pub use stack::{StackFrame, StackTrace};
pub use typed::Typed;

