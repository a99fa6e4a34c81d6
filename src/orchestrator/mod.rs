pub mod cancel;
pub mod planner;
pub mod retry;

pub use cancel::CancellationToken;
pub use planner::{plan_fetch_batches, plan_modify_batches};
pub use retry::{RetryController, RetryDecision};
