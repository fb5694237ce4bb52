use std::{collections::HashMap, time::Duration};

use async_trait::async_trait;

use crate::{
    domain::{CapturedRequest, NewCapturedRequest, Trap},
    errors::AppError,
};

pub mod memory;
pub mod sqlite;

/// Durable store for traps and the requests captured against them.
///
/// Every write is a single atomic statement or transaction, so callers never
/// coordinate with each other; the sweeper deletes by age condition and is safe
/// to run alongside live captures.
#[async_trait]
pub trait TrapStore: Send + Sync {
    /// Fails with [`AppError::DuplicateKey`] when `id` is taken.
    async fn create_trap(&self, id: &str, name: &str) -> Result<(), AppError>;
    async fn get_trap(&self, id: &str) -> Result<Trap, AppError>;
    /// Newest-created first.
    async fn list_recent_traps(&self, limit: u32) -> Result<Vec<Trap>, AppError>;
    /// Traps with no requests are absent from the returned map.
    async fn count_requests_by_trap(
        &self,
        ids: &[String],
    ) -> Result<HashMap<String, i64>, AppError>;
    /// Fails with [`AppError::ForeignKeyViolation`] when the trap is gone.
    async fn insert_request(&self, request: NewCapturedRequest) -> Result<(), AppError>;
    /// Newest-captured first.
    async fn list_requests_by_trap(
        &self,
        id: &str,
        limit: u32,
    ) -> Result<Vec<CapturedRequest>, AppError>;
    /// Idempotent.
    async fn delete_trap_cascade(&self, id: &str) -> Result<(), AppError>;
    async fn delete_requests_older_than(&self, age: Duration) -> Result<u64, AppError>;
    /// Deletes traps with zero requests that were created more than `age` ago.
    async fn delete_orphaned_stale_traps(&self, age: Duration) -> Result<u64, AppError>;
}
