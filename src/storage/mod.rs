use std::collections::HashMap;

use thiserror::Error;

use crate::models::Paste;

pub mod memory;
#[cfg(feature = "redis-store")]
pub mod redis;

pub const KEY_PREFIX: &str = "paste:";

/// Hash field names of a stored paste.
pub mod field {
    pub const TITLE: &str = "Title";
    pub const BODY: &str = "Body";
    pub const SYNTAX: &str = "Syntax";
    pub const MIME: &str = "Mime";
    pub const SIZE: &str = "Size";
    pub const CLICKS: &str = "Clicks";
    pub const EXPIRATION: &str = "Expiration";
    pub const CREATED_ON: &str = "CreatedOn";
}

pub fn paste_key(id: &str) -> String {
    format!("{KEY_PREFIX}{id}")
}

#[derive(Error, Debug)]
#[non_exhaustive]
pub enum StoreError {
    #[cfg(feature = "redis-store")]
    #[error("redis error")]
    Redis {
        #[from]
        source: ::redis::RedisError,
    },
    #[cfg(feature = "redis-store")]
    #[error("failed to get a pooled connection")]
    Pool {
        #[from]
        source: deadpool_redis::PoolError,
    },
    #[error("stored paste {key} has a bad {field} field")]
    Corrupt { key: String, field: &'static str },
}

pub trait Store {
    /// Whether a paste with this id currently exists.
    async fn exists(&self, id: &str) -> Result<bool, StoreError>;

    /// Write every field of a paste in one step unless its key is taken.
    /// `Ok(false)` means another paste already holds the key.
    async fn insert(&self, paste: &Paste) -> Result<bool, StoreError>;

    /// Delete the paste `seconds` from now.
    async fn expire(&self, id: &str, seconds: u64) -> Result<(), StoreError>;

    /// Insert a paste, then apply its expiration if it has one.
    ///
    /// The two steps are not transactional: if setting the expiration fails
    /// the fields stay written and the error is returned.
    async fn create(&self, paste: &Paste) -> Result<bool, StoreError> {
        if !self.insert(paste).await? {
            return Ok(false);
        }
        if paste.expiration != 0 {
            self.expire(&paste.id, paste.expiration).await?;
        }
        Ok(true)
    }

    /// Read a paste back. `Ok(None)` if it doesn't exist or has expired.
    async fn fetch(&self, id: &str) -> Result<Option<Paste>, StoreError>;

    /// Bump the click counter of a paste by one.
    async fn increment_clicks(&self, id: &str) -> Result<(), StoreError>;

    /// Check that the store is reachable.
    async fn ping(&self) -> Result<(), StoreError>;

    /// Release held connections.
    async fn close(&self);
}

#[derive(Clone)]
pub enum AnyStore {
    #[cfg(feature = "redis-store")]
    Redis(redis::RedisStore),
    Memory(memory::MemoryStore),
}

impl Store for AnyStore {
    async fn exists(&self, id: &str) -> Result<bool, StoreError> {
        match self {
            #[cfg(feature = "redis-store")]
            AnyStore::Redis(redis) => redis.exists(id).await,
            AnyStore::Memory(memory) => memory.exists(id).await,
        }
    }

    async fn insert(&self, paste: &Paste) -> Result<bool, StoreError> {
        match self {
            #[cfg(feature = "redis-store")]
            AnyStore::Redis(redis) => redis.insert(paste).await,
            AnyStore::Memory(memory) => memory.insert(paste).await,
        }
    }

    async fn expire(&self, id: &str, seconds: u64) -> Result<(), StoreError> {
        match self {
            #[cfg(feature = "redis-store")]
            AnyStore::Redis(redis) => redis.expire(id, seconds).await,
            AnyStore::Memory(memory) => memory.expire(id, seconds).await,
        }
    }

    async fn create(&self, paste: &Paste) -> Result<bool, StoreError> {
        match self {
            #[cfg(feature = "redis-store")]
            AnyStore::Redis(redis) => redis.create(paste).await,
            AnyStore::Memory(memory) => memory.create(paste).await,
        }
    }

    async fn fetch(&self, id: &str) -> Result<Option<Paste>, StoreError> {
        match self {
            #[cfg(feature = "redis-store")]
            AnyStore::Redis(redis) => redis.fetch(id).await,
            AnyStore::Memory(memory) => memory.fetch(id).await,
        }
    }

    async fn increment_clicks(&self, id: &str) -> Result<(), StoreError> {
        match self {
            #[cfg(feature = "redis-store")]
            AnyStore::Redis(redis) => redis.increment_clicks(id).await,
            AnyStore::Memory(memory) => memory.increment_clicks(id).await,
        }
    }

    async fn ping(&self) -> Result<(), StoreError> {
        match self {
            #[cfg(feature = "redis-store")]
            AnyStore::Redis(redis) => redis.ping().await,
            AnyStore::Memory(memory) => memory.ping().await,
        }
    }

    async fn close(&self) {
        match self {
            #[cfg(feature = "redis-store")]
            AnyStore::Redis(redis) => redis.close().await,
            AnyStore::Memory(memory) => memory.close().await,
        }
    }
}

#[cfg(feature = "redis-store")]
impl From<redis::RedisStore> for AnyStore {
    fn from(value: redis::RedisStore) -> Self {
        AnyStore::Redis(value)
    }
}

impl From<memory::MemoryStore> for AnyStore {
    fn from(value: memory::MemoryStore) -> Self {
        AnyStore::Memory(value)
    }
}

/// Flatten a paste into its stored hash fields.
pub(crate) fn to_fields(paste: &Paste) -> Vec<(&'static str, String)> {
    vec![
        (field::TITLE, paste.title.clone()),
        (field::BODY, paste.body.clone()),
        (field::SYNTAX, paste.syntax.clone()),
        (field::MIME, paste.mime.clone()),
        (field::SIZE, paste.size.to_string()),
        (field::CLICKS, paste.clicks.to_string()),
        (field::EXPIRATION, paste.expiration.to_string()),
        (field::CREATED_ON, paste.created_on.to_string()),
    ]
}

/// Rebuild a paste from its stored hash fields. An empty hash is a missing paste.
pub(crate) fn from_fields(
    id: &str,
    mut fields: HashMap<String, String>,
) -> Result<Option<Paste>, StoreError> {
    if fields.is_empty() {
        return Ok(None);
    }

    let mut text = |name: &'static str| fields.remove(name).unwrap_or_default();
    let title = text(field::TITLE);
    let body = text(field::BODY);
    let syntax = text(field::SYNTAX);
    let mime = text(field::MIME);

    let number = |name: &'static str| -> Result<i64, StoreError> {
        match fields.get(name) {
            None => Ok(0),
            Some(value) => value.parse().map_err(|_| StoreError::Corrupt {
                key: paste_key(id),
                field: name,
            }),
        }
    };
    let size = number(field::SIZE)?;
    let clicks = number(field::CLICKS)?;
    let expiration = number(field::EXPIRATION)?;
    let created_on = number(field::CREATED_ON)?;

    Ok(Some(Paste {
        id: id.to_owned(),
        title,
        body,
        syntax,
        mime,
        size: size.max(0) as u64,
        clicks,
        expiration: expiration.max(0) as u64,
        created_on,
        created_on_formatted: None,
        expiration_formatted: None,
    }))
}
