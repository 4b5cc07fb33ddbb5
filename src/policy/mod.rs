//! Policy evaluation contract and the bundled in-memory evaluator.

mod pattern;
mod rbac;

pub use pattern::key_match;
pub use rbac::RbacPolicy;

use crate::error::Error;

/// Decides whether `subject` may perform `action` on `object`.
///
/// For HTTP, the object is the request path and the action is the method.
/// Called synchronously on the request path and shared by every in-flight
/// request. An `Err` means no decision could be reached, and callers treat
/// it as a denial.
pub trait PolicyEvaluator: Send + Sync {
    fn evaluate(&self, subject: &str, object: &str, action: &str) -> Result<bool, Error>;
}
