//! Background retention sweeps.
//!
//! Requests older than the retention window are deleted first, then traps that
//! are both empty and older than the same window. Both deletes are age
//! conditions evaluated by the store, so captures arriving mid-sweep are never
//! caught up in it.

use std::{sync::Arc, time::Duration};

use tokio::{sync::broadcast, time};

use crate::{db::TrapStore, errors::AppError};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SweepReport {
    pub requests_deleted: u64,
    pub traps_deleted: u64,
}

pub struct Sweeper {
    store: Arc<dyn TrapStore>,
    retention: Duration,
    interval: Duration,
}

impl Sweeper {
    pub fn new(store: Arc<dyn TrapStore>, retention: Duration, interval: Duration) -> Self {
        Self {
            store,
            retention,
            interval,
        }
    }

    pub async fn sweep_once(&self) -> Result<SweepReport, AppError> {
        let requests_deleted = self.store.delete_requests_older_than(self.retention).await?;
        let traps_deleted = self
            .store
            .delete_orphaned_stale_traps(self.retention)
            .await?;

        Ok(SweepReport {
            requests_deleted,
            traps_deleted,
        })
    }

    /// Sweeps immediately, then once per interval until shutdown.
    ///
    /// A failed sweep is logged and the next tick is its retry.
    pub async fn run(self, mut shutdown: broadcast::Receiver<()>) {
        tracing::info!(
            retention_secs = self.retention.as_secs(),
            interval_secs = self.interval.as_secs(),
            "retention sweeper starting"
        );

        let mut ticker = time::interval(self.interval);
        ticker.set_missed_tick_behavior(time::MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    match self.sweep_once().await {
                        Ok(report) => tracing::info!(
                            requests_deleted = report.requests_deleted,
                            traps_deleted = report.traps_deleted,
                            "retention sweep finished"
                        ),
                        Err(err) => tracing::error!(error = ?err, "retention sweep failed"),
                    }
                }
                _ = shutdown.recv() => {
                    tracing::info!("retention sweeper received shutdown signal, exiting loop");
                    break;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::{
        collections::HashMap,
        sync::atomic::{AtomicUsize, Ordering},
    };

    use async_trait::async_trait;

    use super::*;
    use crate::{
        db::memory::MemoryTrapStore,
        domain::{CapturedRequest, NewCapturedRequest, Trap},
    };

    const DAY: Duration = Duration::from_secs(24 * 60 * 60);
    const WEEK: Duration = Duration::from_secs(7 * 24 * 60 * 60);

    fn request(trap_id: &str) -> NewCapturedRequest {
        NewCapturedRequest {
            trap_id: trap_id.to_owned(),
            method: "POST".to_owned(),
            path: format!("/t/{trap_id}"),
            headers: "{}".to_owned(),
            body: String::new(),
            query: "{}".to_owned(),
            ip: String::new(),
            content_type: String::new(),
        }
    }

    #[tokio::test]
    async fn sweep_applies_the_retention_window() {
        let store = MemoryTrapStore::default();
        for id in ["eight-days", "six-days", "empty-old", "empty-fresh"] {
            store.create_trap(id, id).await.unwrap();
        }
        store.insert_request(request("eight-days")).await.unwrap();
        store.insert_request(request("six-days")).await.unwrap();
        store.backdate_trap("eight-days", DAY * 8).await;
        store.backdate_trap("six-days", DAY * 6).await;
        store.backdate_trap("empty-old", DAY * 8).await;
        store.backdate_trap("empty-fresh", Duration::from_secs(3600)).await;

        let sweeper = Sweeper::new(Arc::new(store.clone()), WEEK, Duration::from_secs(3600));
        let report = sweeper.sweep_once().await.unwrap();

        assert_eq!(
            report,
            SweepReport {
                requests_deleted: 1,
                traps_deleted: 2,
            }
        );
        assert!(store.get_trap("eight-days").await.is_err());
        assert!(store.get_trap("empty-old").await.is_err());
        assert_eq!(
            store.list_requests_by_trap("six-days", 10).await.unwrap().len(),
            1
        );
        assert!(store.get_trap("empty-fresh").await.is_ok());
    }

    /// Fails every call and counts how often it was asked.
    #[derive(Default)]
    struct UnavailableStore {
        sweeps: AtomicUsize,
    }

    #[async_trait]
    impl TrapStore for UnavailableStore {
        async fn create_trap(&self, _: &str, _: &str) -> Result<(), AppError> {
            Err(AppError::Internal("unavailable".to_owned()))
        }
        async fn get_trap(&self, _: &str) -> Result<Trap, AppError> {
            Err(AppError::Internal("unavailable".to_owned()))
        }
        async fn list_recent_traps(&self, _: u32) -> Result<Vec<Trap>, AppError> {
            Err(AppError::Internal("unavailable".to_owned()))
        }
        async fn count_requests_by_trap(
            &self,
            _: &[String],
        ) -> Result<HashMap<String, i64>, AppError> {
            Err(AppError::Internal("unavailable".to_owned()))
        }
        async fn insert_request(&self, _: NewCapturedRequest) -> Result<(), AppError> {
            Err(AppError::Internal("unavailable".to_owned()))
        }
        async fn list_requests_by_trap(
            &self,
            _: &str,
            _: u32,
        ) -> Result<Vec<CapturedRequest>, AppError> {
            Err(AppError::Internal("unavailable".to_owned()))
        }
        async fn delete_trap_cascade(&self, _: &str) -> Result<(), AppError> {
            Err(AppError::Internal("unavailable".to_owned()))
        }
        async fn delete_requests_older_than(&self, _: Duration) -> Result<u64, AppError> {
            self.sweeps.fetch_add(1, Ordering::SeqCst);
            Err(AppError::Internal("unavailable".to_owned()))
        }
        async fn delete_orphaned_stale_traps(&self, _: Duration) -> Result<u64, AppError> {
            Err(AppError::Internal("unavailable".to_owned()))
        }
    }

    #[tokio::test(start_paused = true)]
    async fn failed_sweeps_do_not_stop_the_schedule() {
        let store = Arc::new(UnavailableStore::default());
        let sweeper = Sweeper::new(store.clone(), WEEK, Duration::from_secs(3600));
        let (tx, rx) = broadcast::channel(1);

        let handle = tokio::spawn(sweeper.run(rx));

        // Startup sweep plus two scheduled ones.
        time::sleep(Duration::from_secs(2 * 3600 + 1)).await;
        assert_eq!(store.sweeps.load(Ordering::SeqCst), 3);

        tx.send(()).unwrap();
        handle.await.unwrap();
    }
}
