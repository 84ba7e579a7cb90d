use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;

use crate::clock::Clock;
use crate::error::ResetError;
use crate::services::PasswordResetService;

/// 期限切れトークンを1回削除
///
/// # Returns
/// 削除された件数
pub async fn purge_expired_tokens(
    service: &PasswordResetService,
    clock: &dyn Clock,
) -> Result<u64, ResetError> {
    tracing::debug!("password_reset_cleanup: start");
    let purged = service.purge_expired(clock.now()).await?;
    if purged > 0 {
        tracing::info!(purged, "期限切れトークンを削除");
    }
    Ok(purged)
}

/// 定期削除タスクを起動
///
/// 失敗はログに記録して次の周期で再試行する
pub fn spawn_purge_task(
    service: PasswordResetService,
    clock: Arc<dyn Clock>,
    period: Duration,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(period);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            ticker.tick().await;
            if let Err(e) = purge_expired_tokens(&service, clock.as_ref()).await {
                tracing::error!(error = %e, "期限切れトークンの定期削除に失敗");
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::models::NewResetToken;
    use crate::repositories::{InMemoryResetTokenStore, InMemoryUserDirectory, ResetTokenStore};
    use crate::services::notifier::LogNotifier;
    use crate::services::password_reset::ResetPolicy;
    use time::macros::datetime;
    use uuid::Uuid;

    fn setup() -> (
        PasswordResetService,
        Arc<InMemoryResetTokenStore>,
        Arc<ManualClock>,
    ) {
        let store = Arc::new(InMemoryResetTokenStore::new());
        let clock = Arc::new(ManualClock::new(datetime!(2026-03-01 09:00 UTC)));
        let service = PasswordResetService::new(
            store.clone(),
            Arc::new(InMemoryUserDirectory::new()),
            Arc::new(LogNotifier),
            clock.clone(),
            ResetPolicy::default(),
        );
        (service, store, clock)
    }

    async fn seed(store: &InMemoryResetTokenStore, hash: &str, issued_at: time::OffsetDateTime) {
        store
            .insert(NewResetToken {
                user_id: Uuid::new_v4(),
                token_hash: hash.to_string(),
                issued_at,
                expires_at: issued_at + time::Duration::hours(1),
            })
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_purge_removes_only_expired() {
        let (service, store, clock) = setup();
        seed(&store, "old", datetime!(2026-03-01 06:00 UTC)).await;
        seed(&store, "fresh", datetime!(2026-03-01 08:30 UTC)).await;

        let purged = purge_expired_tokens(&service, clock.as_ref()).await.unwrap();

        assert_eq!(purged, 1);
        assert!(store.find_by_hash("old").await.unwrap().is_none());
        assert!(store.find_by_hash("fresh").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_purge_task_runs_periodically() {
        let (service, store, clock) = setup();
        seed(&store, "old", datetime!(2026-03-01 06:00 UTC)).await;

        let handle = spawn_purge_task(service, clock.clone(), Duration::from_millis(10));

        tokio::time::timeout(Duration::from_secs(2), async {
            while !store.snapshot().is_empty() {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("purge task did not run");

        // 時計を進めると次の周期で新しい期限切れも削除される
        seed(&store, "later", datetime!(2026-03-01 09:00 UTC)).await;
        clock.advance(time::Duration::hours(2));

        tokio::time::timeout(Duration::from_secs(2), async {
            while !store.snapshot().is_empty() {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("purge task did not run again");

        handle.abort();
    }
}
