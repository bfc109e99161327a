//! Read-modify-write of request status
//!
//! Every status mutation, from either the reconcile loop or the webhook,
//! goes through [`modify_status`]: read the latest request, apply the change
//! in memory, write it conditioned on the version read, and start over on
//! conflict.

use crate::models::{BuildRequest, BuildRequestStatus};
use crate::store::{RetryPolicy, Store, StoreError, retry_on_conflict};

/// Apply `change` to the latest status of a request and persist it
///
/// `change` returns whether it modified anything; nothing is written when
/// it didn't. Returns the request as last seen, or `None` if it is gone.
pub async fn modify_status<S, F>(
    store: &S,
    retry: &RetryPolicy,
    namespace: &str,
    name: &str,
    change: F,
) -> Result<Option<BuildRequest>, StoreError>
where
    S: Store + ?Sized,
    F: Fn(&BuildRequest, &mut BuildRequestStatus) -> bool,
{
    let change = &change;
    retry_on_conflict(retry, || async move {
        let Some(mut request) = store.get_request(namespace, name).await? else {
            return Ok(None);
        };
        let mut status = request.status_or_default();
        if !change(&request, &mut status) {
            return Ok(Some(request));
        }
        request.status = Some(status);
        store.update_request_status(&request).await.map(Some)
    })
    .await
}
