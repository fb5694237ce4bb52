use std::{collections::HashMap, sync::Arc, time::Duration};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;

use crate::{
    db::TrapStore,
    domain::{CapturedRequest, NewCapturedRequest, Trap},
    errors::AppError,
};

#[derive(Default)]
struct Inner {
    traps: Vec<Trap>,
    requests: Vec<CapturedRequest>,
    next_request_id: i64,
}

#[derive(Clone, Default)]
pub struct MemoryTrapStore {
    inner: Arc<RwLock<Inner>>,
}

fn cutoff(age: Duration) -> Result<DateTime<Utc>, AppError> {
    let age = chrono::Duration::from_std(age)
        .map_err(|_| AppError::Internal(format!("retention age out of range: {age:?}")))?;
    Ok(Utc::now() - age)
}

impl MemoryTrapStore {
    /// Shifts the creation time of a trap and all of its requests into the past.
    pub async fn backdate_trap(&self, id: &str, by: Duration) {
        let by = chrono::Duration::from_std(by).unwrap_or(chrono::Duration::zero());
        let mut inner = self.inner.write().await;
        for trap in inner.traps.iter_mut().filter(|trap| trap.id == id) {
            trap.created_at -= by;
        }
        for request in inner.requests.iter_mut().filter(|r| r.trap_id == id) {
            request.created_at -= by;
        }
    }
}

#[async_trait]
impl TrapStore for MemoryTrapStore {
    async fn create_trap(&self, id: &str, name: &str) -> Result<(), AppError> {
        let mut inner = self.inner.write().await;
        if inner.traps.iter().any(|trap| trap.id == id) {
            return Err(AppError::DuplicateKey(format!("trap id already exists: {id}")));
        }
        inner.traps.push(Trap {
            id: id.to_owned(),
            name: name.to_owned(),
            created_at: Utc::now(),
        });
        Ok(())
    }

    async fn get_trap(&self, id: &str) -> Result<Trap, AppError> {
        let maybe = self
            .inner
            .read()
            .await
            .traps
            .iter()
            .find(|trap| trap.id == id)
            .cloned();

        maybe.ok_or(AppError::NotFound)
    }

    async fn list_recent_traps(&self, limit: u32) -> Result<Vec<Trap>, AppError> {
        // Insertion order breaks ties between equal timestamps.
        let mut traps = self.inner.read().await.traps.clone();
        traps.reverse();
        traps.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        traps.truncate(limit as usize);
        Ok(traps)
    }

    async fn count_requests_by_trap(
        &self,
        ids: &[String],
    ) -> Result<HashMap<String, i64>, AppError> {
        let mut counts = HashMap::new();
        if ids.is_empty() {
            return Ok(counts);
        }
        for request in self.inner.read().await.requests.iter() {
            if ids.contains(&request.trap_id) {
                *counts.entry(request.trap_id.clone()).or_insert(0) += 1;
            }
        }
        Ok(counts)
    }

    async fn insert_request(&self, request: NewCapturedRequest) -> Result<(), AppError> {
        let mut inner = self.inner.write().await;
        if !inner.traps.iter().any(|trap| trap.id == request.trap_id) {
            return Err(AppError::ForeignKeyViolation(format!(
                "no trap with id {}",
                request.trap_id
            )));
        }
        inner.next_request_id += 1;
        let stored = CapturedRequest {
            id: inner.next_request_id,
            trap_id: request.trap_id,
            method: request.method,
            path: request.path,
            headers: request.headers,
            body: request.body,
            query: request.query,
            ip: request.ip,
            content_type: request.content_type,
            created_at: Utc::now(),
        };
        inner.requests.push(stored);
        Ok(())
    }

    async fn list_requests_by_trap(
        &self,
        id: &str,
        limit: u32,
    ) -> Result<Vec<CapturedRequest>, AppError> {
        let mut requests: Vec<_> = self
            .inner
            .read()
            .await
            .requests
            .iter()
            .filter(|request| request.trap_id == id)
            .cloned()
            .collect();
        requests.sort_by(|a, b| {
            b.created_at
                .cmp(&a.created_at)
                .then_with(|| b.id.cmp(&a.id))
        });
        requests.truncate(limit as usize);
        Ok(requests)
    }

    async fn delete_trap_cascade(&self, id: &str) -> Result<(), AppError> {
        let mut inner = self.inner.write().await;
        inner.requests.retain(|request| request.trap_id != id);
        inner.traps.retain(|trap| trap.id != id);
        Ok(())
    }

    async fn delete_requests_older_than(&self, age: Duration) -> Result<u64, AppError> {
        let cutoff = cutoff(age)?;
        let mut inner = self.inner.write().await;
        let before = inner.requests.len();
        inner.requests.retain(|request| request.created_at >= cutoff);
        Ok((before - inner.requests.len()) as u64)
    }

    async fn delete_orphaned_stale_traps(&self, age: Duration) -> Result<u64, AppError> {
        let cutoff = cutoff(age)?;
        let mut guard = self.inner.write().await;
        let inner = &mut *guard;
        let before = inner.traps.len();
        let requests = &inner.requests;
        inner.traps.retain(|trap| {
            trap.created_at >= cutoff || requests.iter().any(|r| r.trap_id == trap.id)
        });
        Ok((before - inner.traps.len()) as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(trap_id: &str, path: &str) -> NewCapturedRequest {
        NewCapturedRequest {
            trap_id: trap_id.to_owned(),
            method: "GET".to_owned(),
            path: path.to_owned(),
            headers: "{}".to_owned(),
            body: String::new(),
            query: "{}".to_owned(),
            ip: String::new(),
            content_type: String::new(),
        }
    }

    #[tokio::test]
    async fn mirrors_sqlite_constraints() {
        let store = MemoryTrapStore::default();
        store.create_trap("a", "a").await.unwrap();

        assert!(matches!(
            store.create_trap("a", "again").await,
            Err(AppError::DuplicateKey(_))
        ));
        assert!(matches!(
            store.insert_request(request("b", "/t/b")).await,
            Err(AppError::ForeignKeyViolation(_))
        ));
    }

    #[tokio::test]
    async fn newest_first_with_stable_ties() {
        let store = MemoryTrapStore::default();
        store.create_trap("a", "a").await.unwrap();
        store.create_trap("b", "b").await.unwrap();
        for n in 0..3 {
            store
                .insert_request(request("a", &format!("/t/a/{n}")))
                .await
                .unwrap();
        }

        let traps = store.list_recent_traps(10).await.unwrap();
        assert_eq!(traps[0].id, "b");

        let ids: Vec<_> = store
            .list_requests_by_trap("a", 10)
            .await
            .unwrap()
            .into_iter()
            .map(|r| r.id)
            .collect();
        assert_eq!(ids, [3, 2, 1]);
    }

    #[tokio::test]
    async fn backdated_orphans_are_swept() {
        let week = Duration::from_secs(7 * 24 * 3600);
        let store = MemoryTrapStore::default();
        store.create_trap("old", "old").await.unwrap();
        store.insert_request(request("old", "/t/old")).await.unwrap();
        store.backdate_trap("old", week * 2).await;

        assert_eq!(store.delete_orphaned_stale_traps(week).await.unwrap(), 0);
        assert_eq!(store.delete_requests_older_than(week).await.unwrap(), 1);
        assert_eq!(store.delete_orphaned_stale_traps(week).await.unwrap(), 1);
    }
}
