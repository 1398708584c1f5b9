pub mod calendar;
pub mod coordinator;
pub mod derive;
pub mod drag_drop;
pub mod guard;
pub mod notifier;
pub mod session;
pub mod store;

use std::future::Future;
use std::time::Duration;

use crate::error::AppError;

/// Bounds a collaborator call so a hung request cannot pin the planning view.
pub async fn with_timeout<T, F>(limit: Duration, call: F) -> Result<T, AppError>
where
    F: Future<Output = Result<T, AppError>>,
{
    match tokio::time::timeout(limit, call).await {
        Ok(result) => result,
        Err(_) => Err(AppError::Timeout(limit.as_millis())),
    }
}
