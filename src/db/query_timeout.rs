// Database query timeout protection
use std::time::Duration;
use tokio::time::timeout;

use crate::service::error::ServiceError;

pub struct QueryTimeout;

impl QueryTimeout {
    /// Runs a store call under a deadline so a slow proximity scan cannot pin a worker
    pub async fn execute_with_timeout<F, T>(
        query_fn: F,
        timeout_duration: Duration,
    ) -> Result<T, ServiceError>
    where
        F: std::future::Future<Output = Result<T, sqlx::Error>>,
    {
        match timeout(timeout_duration, query_fn).await {
            Ok(result) => result.map_err(ServiceError::from),
            Err(_) => {
                tracing::warn!("Query timed out after {:?}", timeout_duration);
                Err(ServiceError::Timeout(timeout_duration))
            }
        }
    }

    /// Short timeout for proximity lookups (2 seconds)
    pub const LOOKUP_TIMEOUT: Duration = Duration::from_secs(2);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn slow_queries_become_timeouts() {
        let slow = async {
            tokio::time::sleep(Duration::from_millis(200)).await;
            Ok::<_, sqlx::Error>(1)
        };

        let result = QueryTimeout::execute_with_timeout(slow, Duration::from_millis(10)).await;
        assert!(matches!(result, Err(ServiceError::Timeout(_))));
    }

    #[tokio::test]
    async fn fast_queries_pass_through() {
        let fast = async { Ok::<_, sqlx::Error>(7) };
        let result = QueryTimeout::execute_with_timeout(fast, QueryTimeout::LOOKUP_TIMEOUT).await;
        assert_eq!(result.unwrap(), 7);
    }
}
