use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use super::{field, from_fields, paste_key, to_fields, Store, StoreError};
use crate::models::Paste;

struct Entry {
    fields: HashMap<String, String>,
    expires_at: Option<Instant>,
}

impl Entry {
    fn is_live(&self, now: Instant) -> bool {
        self.expires_at.map_or(true, |deadline| deadline > now)
    }
}

/// Process-local store for development and tests. Expiry follows the tokio clock.
#[derive(Clone, Default)]
pub struct MemoryStore {
    entries: Arc<Mutex<HashMap<String, Entry>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, Entry>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Look up a live entry, dropping it first if it has expired.
    fn live_entry<'a>(
        entries: &'a mut HashMap<String, Entry>,
        key: &str,
    ) -> Option<&'a mut Entry> {
        let now = Instant::now();
        if entries.get(key).is_some_and(|entry| !entry.is_live(now)) {
            entries.remove(key);
        }
        entries.get_mut(key)
    }

    #[cfg(test)]
    /// Remaining time to live of a paste, `None` if it has none or doesn't exist.
    pub fn ttl(&self, id: &str) -> Option<Duration> {
        let mut entries = self.lock();
        let entry = Self::live_entry(&mut entries, &paste_key(id))?;
        entry
            .expires_at
            .map(|deadline| deadline.saturating_duration_since(Instant::now()))
    }

    #[cfg(test)]
    pub fn len(&self) -> usize {
        let now = Instant::now();
        self.lock().values().filter(|entry| entry.is_live(now)).count()
    }

    /// Drop every expired entry. Returns how many were removed.
    pub fn sweep(&self) -> usize {
        let now = Instant::now();
        let mut entries = self.lock();
        let before = entries.len();
        entries.retain(|_, entry| entry.is_live(now));
        before - entries.len()
    }

    /// Sweep expired entries every `period` until `cancel` fires.
    pub fn spawn_sweeper(&self, period: Duration, cancel: CancellationToken) {
        let store = self.clone();
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = interval.tick() => {
                        let removed = store.sweep();
                        if removed > 0 {
                            debug!("swept {removed} expired pastes");
                        }
                    }
                }
            }
        });
    }
}

impl Store for MemoryStore {
    async fn exists(&self, id: &str) -> Result<bool, StoreError> {
        let mut entries = self.lock();
        Ok(Self::live_entry(&mut entries, &paste_key(id)).is_some())
    }

    async fn insert(&self, paste: &Paste) -> Result<bool, StoreError> {
        let key = paste_key(&paste.id);
        let mut entries = self.lock();
        if Self::live_entry(&mut entries, &key).is_some() {
            return Ok(false);
        }

        let fields = to_fields(paste)
            .into_iter()
            .map(|(name, value)| (name.to_owned(), value))
            .collect();
        entries.insert(
            key,
            Entry {
                fields,
                expires_at: None,
            },
        );
        Ok(true)
    }

    async fn expire(&self, id: &str, seconds: u64) -> Result<(), StoreError> {
        let mut entries = self.lock();
        if let Some(entry) = Self::live_entry(&mut entries, &paste_key(id)) {
            // A deadline past the clock's range never arrives.
            entry.expires_at = Instant::now().checked_add(Duration::from_secs(seconds));
        }
        Ok(())
    }

    async fn fetch(&self, id: &str) -> Result<Option<Paste>, StoreError> {
        let fields = {
            let mut entries = self.lock();
            match Self::live_entry(&mut entries, &paste_key(id)) {
                Some(entry) => entry.fields.clone(),
                None => return Ok(None),
            }
        };
        from_fields(id, fields)
    }

    async fn increment_clicks(&self, id: &str) -> Result<(), StoreError> {
        let key = paste_key(id);
        let mut entries = self.lock();
        let Some(entry) = Self::live_entry(&mut entries, &key) else {
            return Ok(());
        };

        let clicks = entry
            .fields
            .entry(field::CLICKS.to_owned())
            .or_insert_with(|| String::from("0"));
        let current: i64 = clicks.parse().map_err(|_| StoreError::Corrupt {
            key,
            field: field::CLICKS,
        })?;
        *clicks = (current + 1).to_string();
        Ok(())
    }

    async fn ping(&self) -> Result<(), StoreError> {
        Ok(())
    }

    async fn close(&self) {
        self.lock().clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn paste(id: &str, expiration: u64) -> Paste {
        Paste {
            id: id.to_owned(),
            title: "T".to_owned(),
            body: "hello".to_owned(),
            syntax: "text".to_owned(),
            mime: "text/plain".to_owned(),
            size: 5,
            clicks: 0,
            expiration,
            created_on: 0,
            created_on_formatted: None,
            expiration_formatted: None,
        }
    }

    #[tokio::test]
    async fn create_then_fetch() {
        let store = MemoryStore::new();
        assert!(!store.exists("abcd").await.unwrap());

        store.create(&paste("abcd", 0)).await.unwrap();

        assert!(store.exists("abcd").await.unwrap());
        assert_eq!(store.fetch("abcd").await.unwrap(), Some(paste("abcd", 0)));
        assert_eq!(store.ttl("abcd"), None);
        assert_eq!(store.fetch("zzzz").await.unwrap(), None);
    }

    #[tokio::test]
    async fn increments_clicks_of_existing_pastes_only() {
        let store = MemoryStore::new();
        store.create(&paste("abcd", 0)).await.unwrap();

        store.increment_clicks("abcd").await.unwrap();
        store.increment_clicks("abcd").await.unwrap();
        store.increment_clicks("nope").await.unwrap();

        assert_eq!(store.fetch("abcd").await.unwrap().unwrap().clicks, 2);
        assert!(!store.exists("nope").await.unwrap());
    }

    #[tokio::test(start_paused = true)]
    async fn expiry_follows_the_clock() {
        let store = MemoryStore::new();
        store.create(&paste("abcd", 60)).await.unwrap();
        assert_eq!(store.ttl("abcd"), Some(Duration::from_secs(60)));

        tokio::time::advance(Duration::from_secs(59)).await;
        assert!(store.fetch("abcd").await.unwrap().is_some());

        tokio::time::advance(Duration::from_secs(1)).await;
        assert!(store.fetch("abcd").await.unwrap().is_none());
        assert!(!store.exists("abcd").await.unwrap());
    }

    #[tokio::test(start_paused = true)]
    async fn sweep_drops_expired_entries() {
        let store = MemoryStore::new();
        store.create(&paste("aaaa", 10)).await.unwrap();
        store.create(&paste("bbbb", 0)).await.unwrap();

        tokio::time::advance(Duration::from_secs(11)).await;
        assert_eq!(store.sweep(), 1);
        assert_eq!(store.len(), 1);
    }

    #[tokio::test]
    async fn taken_keys_are_not_overwritten() {
        let store = MemoryStore::new();
        assert!(store.create(&paste("abcd", 0)).await.unwrap());

        let mut other = paste("abcd", 30);
        other.body = "other".to_owned();
        assert!(!store.create(&other).await.unwrap());

        assert_eq!(store.fetch("abcd").await.unwrap(), Some(paste("abcd", 0)));
        assert_eq!(store.ttl("abcd"), None);
    }

    #[tokio::test(start_paused = true)]
    async fn expired_keys_can_be_reused() {
        let store = MemoryStore::new();
        store.create(&paste("abcd", 10)).await.unwrap();
        tokio::time::advance(Duration::from_secs(11)).await;

        assert!(store.create(&paste("abcd", 0)).await.unwrap());
        assert_eq!(store.fetch("abcd").await.unwrap(), Some(paste("abcd", 0)));
    }

    #[tokio::test]
    async fn unreachable_deadline_never_expires() {
        let store = MemoryStore::new();
        assert!(store.create(&paste("abcd", u64::MAX)).await.unwrap());

        assert_eq!(store.ttl("abcd"), None);
        assert!(store.fetch("abcd").await.unwrap().is_some());
    }
}
