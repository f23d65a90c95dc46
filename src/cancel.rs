use log::debug;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::error::TransferError;

/// Race one copy worker against the external cancellation signal.
///
/// Whichever resolves first decides the outcome: cancellation aborts the
/// worker immediately and yields `Cancelled`, so an interrupted session is
/// never misreported as corruption. There is at most one outstanding worker
/// per session and the join handle is the only state shared with it.
pub async fn join_with_cancel<T>(
    cancel: &CancellationToken,
    mut worker: JoinHandle<Result<T, TransferError>>,
) -> Result<T, TransferError> {
    tokio::select! {
        _ = cancel.cancelled() => {
            debug!("cancellation signal fired, abandoning copy worker");
            worker.abort();
            Err(TransferError::Cancelled)
        }
        joined = &mut worker => match joined {
            Ok(result) => result,
            Err(join_err) if join_err.is_cancelled() => Err(TransferError::Cancelled),
            Err(join_err) => Err(TransferError::Io(std::io::Error::other(join_err))),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_worker_result_passes_through() {
        let cancel = CancellationToken::new();
        let worker = tokio::spawn(async { Ok::<_, TransferError>(42) });
        assert_eq!(join_with_cancel(&cancel, worker).await.unwrap(), 42);
    }

    #[tokio::test]
    async fn test_worker_error_passes_through() {
        let cancel = CancellationToken::new();
        let worker = tokio::spawn(async { Err::<(), _>(TransferError::Cancelled) });
        assert!(matches!(
            join_with_cancel(&cancel, worker).await,
            Err(TransferError::Cancelled)
        ));
    }

    #[tokio::test]
    async fn test_cancellation_wins_over_stalled_worker() {
        let cancel = CancellationToken::new();
        let worker = tokio::spawn(async {
            tokio::time::sleep(Duration::from_secs(60)).await;
            Ok::<_, TransferError>(())
        });

        cancel.cancel();
        assert!(matches!(
            join_with_cancel(&cancel, worker).await,
            Err(TransferError::Cancelled)
        ));
    }
}
