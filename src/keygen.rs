use rand::distributions::Alphanumeric;
use rand::{thread_rng, Rng};
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::storage::{Store, StoreError};

pub const KEY_LENGTH: usize = 4;

#[derive(Error, Debug)]
pub enum GenerateError {
    #[error("store unavailable while checking for existing pastes")]
    Store {
        #[from]
        source: StoreError,
    },
    #[error("key generation cancelled")]
    Cancelled,
}

/// A random key of [`KEY_LENGTH`] characters from `[a-zA-Z0-9]`.
pub fn random_key() -> String {
    thread_rng()
        .sample_iter(&Alphanumeric)
        .take(KEY_LENGTH)
        .map(char::from)
        .collect()
}

/// Draw random keys until one is not taken in `store`.
///
/// There is no attempt limit; the loop ends when a free key is found, the
/// store fails, or `cancel` fires.
pub async fn generate_key<S: Store>(
    store: &S,
    cancel: &CancellationToken,
) -> Result<String, GenerateError> {
    loop {
        let key = random_key();
        let taken = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(GenerateError::Cancelled),
            taken = store.exists(&key) => taken?,
        };
        if !taken {
            return Ok(key);
        }
        debug!("key collision on '{key}', retrying");
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;
    use crate::models::Paste;
    use crate::storage::memory::MemoryStore;

    fn is_valid_key(key: &str) -> bool {
        key.len() == KEY_LENGTH && key.chars().all(|c| c.is_ascii_alphanumeric())
    }

    fn paste(id: &str) -> Paste {
        Paste {
            id: id.to_owned(),
            title: "T".to_owned(),
            body: "x".to_owned(),
            syntax: "text".to_owned(),
            mime: "text/plain".to_owned(),
            size: 1,
            clicks: 0,
            expiration: 0,
            created_on: 0,
            created_on_formatted: None,
            expiration_formatted: None,
        }
    }

    /// Reports every key as taken for the first `collisions` checks.
    struct CollidingStore {
        collisions: usize,
        checks: AtomicUsize,
    }

    impl Store for CollidingStore {
        async fn exists(&self, _id: &str) -> Result<bool, StoreError> {
            Ok(self.checks.fetch_add(1, Ordering::SeqCst) < self.collisions)
        }
        async fn insert(&self, _paste: &Paste) -> Result<bool, StoreError> {
            Ok(true)
        }
        async fn expire(&self, _id: &str, _seconds: u64) -> Result<(), StoreError> {
            Ok(())
        }
        async fn fetch(&self, _id: &str) -> Result<Option<Paste>, StoreError> {
            Ok(None)
        }
        async fn increment_clicks(&self, _id: &str) -> Result<(), StoreError> {
            Ok(())
        }
        async fn ping(&self) -> Result<(), StoreError> {
            Ok(())
        }
        async fn close(&self) {}
    }

    struct BrokenStore;

    impl Store for BrokenStore {
        async fn exists(&self, id: &str) -> Result<bool, StoreError> {
            Err(StoreError::Corrupt {
                key: crate::storage::paste_key(id),
                field: "Clicks",
            })
        }
        async fn insert(&self, _paste: &Paste) -> Result<bool, StoreError> {
            unreachable!()
        }
        async fn expire(&self, _id: &str, _seconds: u64) -> Result<(), StoreError> {
            unreachable!()
        }
        async fn fetch(&self, _id: &str) -> Result<Option<Paste>, StoreError> {
            unreachable!()
        }
        async fn increment_clicks(&self, _id: &str) -> Result<(), StoreError> {
            unreachable!()
        }
        async fn ping(&self) -> Result<(), StoreError> {
            unreachable!()
        }
        async fn close(&self) {}
    }

    #[test]
    fn random_keys_use_the_alphabet() {
        for _ in 0..1000 {
            let key = random_key();
            assert!(is_valid_key(&key), "{key}");
        }
    }

    #[tokio::test]
    async fn retries_until_free() {
        let store = CollidingStore {
            collisions: 25,
            checks: AtomicUsize::new(0),
        };
        let key = generate_key(&store, &CancellationToken::new()).await.unwrap();
        assert!(is_valid_key(&key));
        assert_eq!(store.checks.load(Ordering::SeqCst), 26);
    }

    #[tokio::test]
    async fn store_errors_are_not_treated_as_free() {
        let err = generate_key(&BrokenStore, &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, GenerateError::Store { .. }));
    }

    #[tokio::test]
    async fn cancellation_stops_an_endless_search() {
        let store = CollidingStore {
            collisions: usize::MAX,
            checks: AtomicUsize::new(0),
        };
        let cancel = CancellationToken::new();
        cancel.cancel();
        let err = generate_key(&store, &cancel).await.unwrap_err();
        assert!(matches!(err, GenerateError::Cancelled));
    }

    #[tokio::test]
    async fn distinct_keys_in_a_crowded_store() {
        let store = MemoryStore::new();
        let mut seen = HashSet::new();
        while seen.len() < 9_999 {
            let key = random_key();
            if seen.insert(key.clone()) {
                store.create(&paste(&key)).await.unwrap();
            }
        }

        let cancel = CancellationToken::new();
        let mut generated = HashSet::new();
        for _ in 0..10_000 {
            let key = generate_key(&store, &cancel).await.unwrap();
            assert!(!seen.contains(&key), "{key} was already taken");
            assert!(generated.insert(key.clone()), "{key} generated twice");
            store.create(&paste(&key)).await.unwrap();
        }
        assert_eq!(generated.len(), 10_000);
    }
}
