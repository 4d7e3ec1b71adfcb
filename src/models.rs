use std::time::Duration;

use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::syntax::{SyntaxTable, GENERIC_SYNTAX, PLAIN_MIME, PLAIN_SYNTAX};

pub const DEFAULT_TITLE: &str = "Untitled paste";
pub const MAX_TITLE_CHARS: usize = 50;
pub const MAX_BODY_BYTES: usize = 100_000;
/// Longest accepted expiration, a century. Larger requests are clamped to it.
pub const MAX_EXPIRATION_SECS: u64 = 100 * 365 * 24 * 60 * 60;

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValidationError {
    #[error("Title can not be longer than 50 characters.")]
    TitleTooLong,
    #[error("Paste is empty.")]
    EmptyBody,
    #[error("Paste is too big.")]
    BodyTooLarge,
}

/// Form fields submitted when creating a paste.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct PasteForm {
    pub title: String,
    #[serde(rename = "p")]
    pub body: String,
    pub mime: String,
    pub expire: String,
    pub raw: String,
    pub nojs: String,
}

impl PasteForm {
    /// A bare document upload: default title, plain text, no expiry.
    pub fn document(body: String) -> Self {
        Self {
            body,
            expire: String::from("0"),
            ..Self::default()
        }
    }
}

/// A validated paste that has not been assigned an id yet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewPaste {
    pub title: String,
    pub body: String,
    pub syntax: String,
    pub mime: String,
    pub expiration: u64,
    pub created_on: i64,
}

impl NewPaste {
    /// Validate submitted form fields and build the record to store.
    ///
    /// An unparsable `expire` means "never expire" rather than an error.
    pub fn validate(
        form: &PasteForm,
        syntax_table: &SyntaxTable,
        now: DateTime<Utc>,
    ) -> Result<Self, ValidationError> {
        let title = match form.title.chars().count() {
            0 => DEFAULT_TITLE.to_owned(),
            n if n > MAX_TITLE_CHARS => return Err(ValidationError::TitleTooLong),
            _ => form.title.clone(),
        };

        if form.body.is_empty() {
            return Err(ValidationError::EmptyBody);
        }
        if form.body.len() > MAX_BODY_BYTES {
            return Err(ValidationError::BodyTooLarge);
        }

        let (syntax, mime) = match syntax_table.lookup(&form.mime) {
            Some(syntax) => (syntax.to_owned(), form.mime.clone()),
            None => (PLAIN_SYNTAX.to_owned(), PLAIN_MIME.to_owned()),
        };

        let expiration = form
            .expire
            .parse::<u64>()
            .unwrap_or(0)
            .min(MAX_EXPIRATION_SECS);

        Ok(Self {
            title,
            body: form.body.clone(),
            syntax,
            mime,
            expiration,
            created_on: now.timestamp(),
        })
    }

    pub fn with_id(self, id: String) -> Paste {
        Paste {
            id,
            size: self.body.len() as u64,
            title: self.title,
            body: self.body,
            syntax: self.syntax,
            mime: self.mime,
            clicks: 0,
            expiration: self.expiration,
            created_on: self.created_on,
            created_on_formatted: None,
            expiration_formatted: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Paste {
    pub id: String,
    pub title: String,
    pub body: String,
    pub syntax: String,
    pub mime: String,
    pub size: u64,
    pub clicks: i64,
    /// Seconds after `created_on` at which the store drops the paste, `0` for never.
    pub expiration: u64,
    pub created_on: i64,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub created_on_formatted: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expiration_formatted: Option<String>,
}

impl Paste {
    /// Prepare a fetched paste for display. Leaves `clicks` alone.
    pub fn finalize_for_display(mut self, now: DateTime<Utc>) -> Self {
        self.created_on_formatted = Utc.timestamp_opt(self.created_on, 0).single();

        if self.expiration != 0 {
            let deadline = self
                .created_on
                .saturating_add(i64::try_from(self.expiration).unwrap_or(i64::MAX));
            let remaining = deadline.saturating_sub(now.timestamp()).max(0) as u64;
            self.expiration_formatted = Some(format_countdown(Duration::from_secs(remaining)));
        }

        if self.syntax == GENERIC_SYNTAX {
            self.syntax.clear();
        }

        self
    }
}

fn format_countdown(remaining: Duration) -> String {
    let mut formatter = timeago::Formatter::new();
    formatter.num_items(2).ago("");
    formatter.convert(remaining).trim().to_owned()
}
