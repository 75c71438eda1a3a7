pub mod meta;
pub mod moments;
pub mod submissions;
pub mod uploads;

use domains::DomainError;

use crate::state::AppState;

/// Counts limiter refusals before the error is turned into a 429.
fn count_denial<T>(state: &AppState, namespace: &str, result: &Result<T, DomainError>) {
    if let Err(DomainError::RateLimited(_)) = result {
        state.metrics.record_denial(namespace);
    }
}
