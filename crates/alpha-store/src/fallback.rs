//! Primary-then-cache composition shared by the context and conversation
//! stores.

use std::future::Future;

use serde::Serialize;
use tracing::{debug, warn};

use crate::error::StoreError;

/// Which backend ended up serving an operation.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Origin {
    Remote,
    Local,
}

/// Await a primary-store call, logging a failure before handing it back.
/// An unconfigured primary is expected and only logged at debug level.
pub(crate) async fn attempt<T, F>(op: &'static str, call: F) -> Result<T, StoreError>
where
    F: Future<Output = Result<T, StoreError>>,
{
    let result = call.await;
    if let Err(e) = &result {
        if e.is_not_configured() {
            debug!(op, "remote store not configured, using local cache");
        } else {
            warn!(error = %e, op, "remote store failed, using local cache");
        }
    }
    result
}

/// Log a cache failure and drop the error. The cache is best effort.
pub(crate) fn cached<T>(op: &'static str, result: Result<T, StoreError>) -> Option<T> {
    match result {
        Ok(v) => Some(v),
        Err(e) => {
            warn!(error = %e, op, "local cache operation failed");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn attempt_passes_results_through() {
        let ok = attempt("op", async { Ok::<_, StoreError>(3) }).await;
        assert_eq!(ok.unwrap(), 3);

        let err = attempt("op", async { Err::<u8, _>(StoreError::NotConfigured) }).await;
        assert!(err.unwrap_err().is_not_configured());
    }

    #[test]
    fn cached_drops_errors() {
        assert_eq!(cached("op", Ok::<_, StoreError>(1)), Some(1));
        assert_eq!(cached::<u8>("op", Err(StoreError::Io("disk full".into()))), None);
    }
}
