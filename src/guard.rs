use uuid::Uuid;

use crate::error::{AppError, AppResult};
use crate::store::ChatStore;

/// Membership predicate backing every read and write path. One indexed
/// lookup against the participant relation; there is no finer-grained ACL.
pub async fn is_participant(
    store: &dyn ChatStore,
    conversation_id: i64,
    user_id: Uuid,
) -> AppResult<bool> {
    store.is_participant(conversation_id, user_id).await
}

/// Fails with a permission error carrying no conversation detail, so a 403
/// response cannot be used to probe which conversations exist.
pub async fn ensure_participant(
    store: &dyn ChatStore,
    conversation_id: i64,
    user_id: Uuid,
) -> AppResult<()> {
    if is_participant(store, conversation_id, user_id).await? {
        Ok(())
    } else {
        Err(AppError::permission("not a participant"))
    }
}

/// Retries an idempotent read once when the store reports a transient
/// failure. Mutations must NOT go through this: retrying a non-idempotent
/// write risks duplicate effects, so those surface the failure instead.
pub async fn retry_read<T, F, Fut>(op: F) -> AppResult<T>
where
    F: Fn() -> Fut,
    Fut: std::future::Future<Output = AppResult<T>>,
{
    match op().await {
        Err(AppError::TransientStore(reason)) => {
            tracing::warn!(reason = %reason, "Transient store failure, retrying read once");
            op().await
        }
        other => other,
    }
}
