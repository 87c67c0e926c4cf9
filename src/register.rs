//! Shared cross-process register for rate-limit timestamps and scheduler
//! `last_run_at` entries.
//!
//! Backed by Redis when `REDIS_URL` is configured so multiple worker
//! processes cooperate; otherwise falls back to an in-process
//! `parking_lot`-guarded map, which is documented as not cross-process safe.
//! Either way the register is a single external thing the rest of the
//! pipeline depends on rather than a per-process singleton.

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;

/// A last-call-timestamp / last-run-at register, key/value over strings and
/// UTC instants. Also provides an advisory per-key lock for the coordinator.
#[derive(Clone)]
pub enum Register {
    InMemory(Arc<Mutex<InMemoryState>>),
    Redis(RedisRegister),
}

#[derive(Default)]
pub struct InMemoryState {
    timestamps: HashMap<String, DateTime<Utc>>,
    locks: HashMap<String, ()>,
}

#[derive(Clone)]
pub struct RedisRegister {
    manager: redis::aio::ConnectionManager,
}

impl Register {
    /// Build from config: `Some(url)` tries Redis; `None` uses the
    /// in-memory fallback.
    pub async fn connect(redis_url: Option<&str>) -> anyhow::Result<Self> {
        match redis_url {
            Some(url) => {
                let client = redis::Client::open(url)?;
                let manager = redis::aio::ConnectionManager::new(client).await?;
                Ok(Register::Redis(RedisRegister { manager }))
            }
            None => Ok(Register::InMemory(Arc::new(Mutex::new(
                InMemoryState::default(),
            )))),
        }
    }

    /// Read the last recorded timestamp for `key`, if any.
    pub async fn get(&self, key: &str) -> anyhow::Result<Option<DateTime<Utc>>> {
        match self {
            Register::InMemory(state) => Ok(state.lock().timestamps.get(key).copied()),
            Register::Redis(reg) => {
                use redis::AsyncCommands;
                let mut conn = reg.manager.clone();
                let raw: Option<String> = conn.get(key).await?;
                Ok(raw.and_then(|s| DateTime::parse_from_rfc3339(&s).ok().map(|d| d.with_timezone(&Utc))))
            }
        }
    }

    /// Atomically write `value` for `key`.
    pub async fn set(&self, key: &str, value: DateTime<Utc>) -> anyhow::Result<()> {
        match self {
            Register::InMemory(state) => {
                state.lock().timestamps.insert(key.to_string(), value);
                Ok(())
            }
            Register::Redis(reg) => {
                use redis::AsyncCommands;
                let mut conn = reg.manager.clone();
                let () = conn.set(key, value.to_rfc3339()).await?;
                Ok(())
            }
        }
    }

    /// Try to acquire the advisory lock for `key`. Returns `true` if
    /// acquired, `false` if already held. Best-effort under the in-memory
    /// backend (single process only needs mutual exclusion, which the
    /// `Mutex` already provides); uses `SET NX` semantics under Redis.
    pub async fn try_lock(&self, key: &str) -> anyhow::Result<bool> {
        let lock_key = format!("lock:{key}");
        match self {
            Register::InMemory(state) => {
                let mut state = state.lock();
                if state.locks.contains_key(&lock_key) {
                    Ok(false)
                } else {
                    state.locks.insert(lock_key, ());
                    Ok(true)
                }
            }
            Register::Redis(reg) => {
                use redis::AsyncCommands;
                let mut conn = reg.manager.clone();
                let acquired: bool = conn
                    .set_options(
                        &lock_key,
                        "1",
                        redis::SetOptions::default()
                            .conditional_set(redis::ExistenceCheck::NX)
                            .with_expiration(redis::SetExpiry::EX(3600)),
                    )
                    .await
                    .map(|v: Option<String>| v.is_some())?;
                Ok(acquired)
            }
        }
    }

    /// Release the advisory lock. Guaranteed to be called on every exit
    /// path by the coordinator.
    pub async fn unlock(&self, key: &str) -> anyhow::Result<()> {
        let lock_key = format!("lock:{key}");
        match self {
            Register::InMemory(state) => {
                state.lock().locks.remove(&lock_key);
                Ok(())
            }
            Register::Redis(reg) => {
                use redis::AsyncCommands;
                let mut conn = reg.manager.clone();
                let _: i64 = conn.del(&lock_key).await?;
                Ok(())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn in_memory_round_trips_timestamp() {
        let reg = Register::connect(None).await.unwrap();
        assert!(reg.get("rate:events").await.unwrap().is_none());
        let now = Utc::now();
        reg.set("rate:events", now).await.unwrap();
        let got = reg.get("rate:events").await.unwrap().unwrap();
        assert_eq!(got.timestamp_millis(), now.timestamp_millis());
    }

    #[tokio::test]
    async fn in_memory_lock_is_exclusive() {
        let reg = Register::connect(None).await.unwrap();
        assert!(reg.try_lock("event-ingest").await.unwrap());
        assert!(!reg.try_lock("event-ingest").await.unwrap());
        reg.unlock("event-ingest").await.unwrap();
        assert!(reg.try_lock("event-ingest").await.unwrap());
    }
}
