use std::sync::Arc;

use chrono::Utc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::error::ApiError;
use crate::keygen::generate_key;
use crate::models::{NewPaste, Paste, PasteForm};
use crate::storage::{AnyStore, Store};
use crate::syntax::SyntaxTable;

/// Creates and reads pastes against an injected store.
#[derive(Clone)]
pub struct PasteService {
    store: AnyStore,
    syntax: Arc<SyntaxTable>,
}

impl PasteService {
    pub fn new(store: AnyStore, syntax: SyntaxTable) -> Self {
        Self {
            store,
            syntax: Arc::new(syntax),
        }
    }

    pub fn store(&self) -> &AnyStore {
        &self.store
    }

    pub async fn create_paste(
        &self,
        form: &PasteForm,
        cancel: &CancellationToken,
    ) -> crate::ApiResult<Paste> {
        let new_paste = NewPaste::validate(form, &self.syntax, Utc::now())?;
        let paste = insert_unique(&self.store, &new_paste, cancel).await?;

        info!(
            "new paste: key='{key}', syntax='{syntax}', size={size}, expiration={expiration}",
            key = paste.id,
            syntax = paste.syntax,
            size = paste.size,
            expiration = paste.expiration,
        );

        Ok(paste)
    }

    /// Fetch a paste for display and count the view.
    ///
    /// The click increment runs in the background; its failure is logged and
    /// does not affect the result.
    pub async fn read_paste(
        &self,
        key: &str,
        cancel: &CancellationToken,
    ) -> crate::ApiResult<Paste> {
        if !is_valid_key(key) {
            return Err(ApiError::NotFound);
        }

        let fetched = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(ApiError::Cancelled),
            fetched = self.store.fetch(key) => fetched?,
        };
        let paste = fetched.ok_or(ApiError::NotFound)?;

        self.spawn_click(key.to_owned());

        Ok(paste.finalize_for_display(Utc::now()))
    }

    /// A read paste re-titled as a starting point for a new submission.
    pub async fn clone_paste(
        &self,
        key: &str,
        cancel: &CancellationToken,
    ) -> crate::ApiResult<Paste> {
        let mut paste = self.read_paste(key, cancel).await?;
        paste.title.push_str(" Copy");
        Ok(paste)
    }

    fn spawn_click(&self, key: String) {
        let store = self.store.clone();
        tokio::spawn(async move {
            if let Err(err) = store.increment_clicks(&key).await {
                warn!("failed to count click on '{key}': {err}");
            }
        });
    }
}

/// Give a validated paste a fresh key and write it, drawing again if the key
/// gets taken between the uniqueness check and the write.
async fn insert_unique<S: Store>(
    store: &S,
    new_paste: &NewPaste,
    cancel: &CancellationToken,
) -> crate::ApiResult<Paste> {
    loop {
        let key = generate_key(store, cancel).await?;
        let paste = new_paste.clone().with_id(key);

        let created = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(ApiError::Cancelled),
            created = store.create(&paste) => created?,
        };
        if created {
            return Ok(paste);
        }
        debug!("key '{}' was taken before it was written, retrying", paste.id);
    }
}

fn is_valid_key(key: &str) -> bool {
    !key.is_empty() && key.chars().all(|c| c.is_ascii_alphanumeric())
}
