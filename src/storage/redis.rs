use std::collections::HashMap;
use std::time::Duration;

use anyhow::Context;
use deadpool_redis::{Config, Connection, Pool, Runtime};
use redis::{AsyncCommands, IntoConnectionInfo, Script};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::{field, from_fields, paste_key, to_fields, Store, StoreError};
use crate::config;
use crate::models::Paste;

/// Increment the click counter only while the paste is still there, so a
/// read racing an expiry can't leave a field-less hash behind.
const INCREMENT_IF_EXISTS: &str = r"
if redis.call('EXISTS', KEYS[1]) == 1 then
    return redis.call('HINCRBY', KEYS[1], ARGV[1], 1)
end
return nil
";

/// Write all hash fields in one step, unless the key already holds a paste.
const INSERT_IF_ABSENT: &str = r"
if redis.call('EXISTS', KEYS[1]) == 1 then
    return 0
end
redis.call('HSET', KEYS[1], unpack(ARGV))
return 1
";

#[derive(Clone)]
pub struct RedisStore {
    pool: Pool,
}

impl RedisStore {
    /// Build the connection pool and make sure the server answers.
    pub async fn connect(config: &config::RedisStore) -> anyhow::Result<Self> {
        let mut connection_info = config
            .url
            .as_str()
            .into_connection_info()
            .context("invalid redis url")?;
        if let Some(password) = &config.password {
            connection_info.redis.password = Some(password.clone());
        }

        let pool = Config::from_connection_info(connection_info)
            .builder()
            .context("invalid redis pool config")?
            .max_size(config.pool_size)
            .wait_timeout(Some(config.connection_timeout()))
            .create_timeout(Some(config.connection_timeout()))
            .runtime(Runtime::Tokio1)
            .build()
            .context("failed to build redis pool")?;

        let store = Self { pool };
        store.ping().await.context("cannot ping redis")?;
        Ok(store)
    }

    /// Periodically drop pooled connections that sat idle longer than `idle_timeout`.
    pub fn spawn_idle_reaper(&self, idle_timeout: Duration, cancel: CancellationToken) {
        let pool = self.pool.clone();
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(idle_timeout.max(Duration::from_secs(1)));
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = interval.tick() => {
                        let reaped = pool.retain(|_, metrics| metrics.last_used() < idle_timeout);
                        if !reaped.removed.is_empty() {
                            debug!("closed {} idle redis connections", reaped.removed.len());
                        }
                    }
                }
            }
        });
    }

    async fn conn(&self) -> Result<Connection, StoreError> {
        Ok(self.pool.get().await?)
    }
}

impl Store for RedisStore {
    async fn exists(&self, id: &str) -> Result<bool, StoreError> {
        let mut conn = self.conn().await?;
        let exists: bool = conn.exists(paste_key(id)).await?;
        Ok(exists)
    }

    async fn insert(&self, paste: &Paste) -> Result<bool, StoreError> {
        let mut conn = self.conn().await?;
        insert_on(&mut conn, paste).await
    }

    async fn expire(&self, id: &str, seconds: u64) -> Result<(), StoreError> {
        let mut conn = self.conn().await?;
        expire_on(&mut conn, id, seconds).await
    }

    /// Both steps share one pooled connection.
    async fn create(&self, paste: &Paste) -> Result<bool, StoreError> {
        let mut conn = self.conn().await?;
        if !insert_on(&mut conn, paste).await? {
            return Ok(false);
        }
        if paste.expiration != 0 {
            expire_on(&mut conn, &paste.id, paste.expiration).await?;
        }
        Ok(true)
    }

    async fn fetch(&self, id: &str) -> Result<Option<Paste>, StoreError> {
        let mut conn = self.conn().await?;
        let fields: HashMap<String, String> = conn.hgetall(paste_key(id)).await?;
        from_fields(id, fields)
    }

    async fn increment_clicks(&self, id: &str) -> Result<(), StoreError> {
        let mut conn = self.conn().await?;
        let script = Script::new(INCREMENT_IF_EXISTS);
        let _clicks: Option<i64> = script
            .key(paste_key(id))
            .arg(field::CLICKS)
            .invoke_async(&mut conn)
            .await?;
        Ok(())
    }

    async fn ping(&self) -> Result<(), StoreError> {
        let mut conn = self.conn().await?;
        let pong: String = redis::cmd("PING").query_async(&mut conn).await?;
        info!("redis PING: {pong}");
        Ok(())
    }

    async fn close(&self) {
        self.pool.close();
    }
}

async fn insert_on(conn: &mut Connection, paste: &Paste) -> Result<bool, StoreError> {
    let script = Script::new(INSERT_IF_ABSENT);
    let mut invocation = script.key(paste_key(&paste.id));
    for (name, value) in to_fields(paste) {
        invocation.arg(name).arg(value);
    }
    let inserted: bool = invocation.invoke_async(conn).await?;
    Ok(inserted)
}

async fn expire_on(conn: &mut Connection, id: &str, seconds: u64) -> Result<(), StoreError> {
    let key = paste_key(id);
    let seconds = i64::try_from(seconds).unwrap_or(i64::MAX);
    let applied: bool = conn.expire(&key, seconds).await?;
    if !applied {
        warn!("expiration was not applied to {key}");
    }
    Ok(())
}
