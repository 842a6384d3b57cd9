use crate::predicates;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use std::collections::HashMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// A stored email as persisted by the fetcher.
///
/// `received_date` keeps the persisted text; it is only parsed when a rule
/// asks for it, so a corrupt value surfaces as a record error instead of
/// preventing the whole store from loading.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmailRecord {
    pub id: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub thread_id: String,
    #[serde(default, alias = "from_address", deserialize_with = "null_as_default")]
    pub from: String,
    #[serde(default, alias = "to_address", deserialize_with = "null_as_default")]
    pub to: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub subject: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub message_body: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub received_date: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub is_read: bool,
    #[serde(default, deserialize_with = "null_as_default")]
    pub labels: Vec<String>,
    /// Provider payload kept for fidelity, never interpreted
    #[serde(default)]
    pub raw_data: serde_json::Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
}

/// Fetchers write `null` for attributes the provider didn't supply.
fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

impl EmailRecord {
    pub fn has_label(&self, label: &str) -> bool {
        self.labels.iter().any(|l| l == label)
    }

    /// Overwrite the mutable attributes carried by `patch`.
    pub fn apply_patch(&mut self, patch: &EmailPatch) {
        if let Some(is_read) = patch.is_read {
            self.is_read = is_read;
        }
        if let Some(ref labels) = patch.labels {
            self.labels = labels.clone();
        }
    }
}

/// Partial update of an email. `None` leaves the attribute untouched.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EmailPatch {
    pub is_read: Option<bool>,
    pub labels: Option<Vec<String>>,
}

impl EmailPatch {
    pub fn is_empty(&self) -> bool {
        self.is_read.is_none() && self.labels.is_none()
    }
}

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("email not found: {0}")]
    NotFound(String),

    #[error("I/O error on {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// The persistence collaborator the rule engine reads from and writes to.
///
/// Every call is treated as atomic on its own; the engine never batches
/// writes and assumes it is the only writer during a run.
pub trait RecordStore {
    /// All stored emails, newest first.
    fn get_all_emails(&self) -> Result<Vec<EmailRecord>, StoreError>;
    fn update_email(&mut self, id: &str, patch: &EmailPatch) -> Result<(), StoreError>;
}

#[derive(Debug, Serialize, Deserialize, Default)]
struct StoreFile {
    emails: HashMap<String, EmailRecord>,
}

/// Email store persisted as a single JSON document.
#[derive(Debug, Default)]
pub struct JsonStore {
    path: Option<PathBuf>,
    emails: HashMap<String, EmailRecord>,
}

impl JsonStore {
    /// Open the store at `path`. A missing file is an empty store.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let path = path.as_ref().to_path_buf();
        let emails = if path.exists() {
            let content = fs::read_to_string(&path).map_err(|source| StoreError::Io {
                path: path.clone(),
                source,
            })?;
            let file: StoreFile = serde_json::from_str(&content)?;
            file.emails
        } else {
            HashMap::new()
        };
        info!(path = %path.display(), emails = emails.len(), "Email store opened");
        Ok(Self {
            path: Some(path),
            emails,
        })
    }

    /// A store that never touches disk (for tests and previews).
    pub fn in_memory() -> Self {
        Self::default()
    }

    pub fn save(&self) -> Result<(), StoreError> {
        let Some(ref path) = self.path else {
            return Ok(());
        };
        if let Some(dir) = path.parent() {
            if !dir.as_os_str().is_empty() && !dir.exists() {
                fs::create_dir_all(dir).map_err(|source| StoreError::Io {
                    path: dir.to_path_buf(),
                    source,
                })?;
            }
        }
        let file = StoreFile {
            emails: self.emails.clone(),
        };
        let content = serde_json::to_string_pretty(&file)?;
        fs::write(path, content).map_err(|source| StoreError::Io {
            path: path.clone(),
            source,
        })?;
        Ok(())
    }

    /// Insert or replace an email by id. Call [`JsonStore::save`] to persist.
    pub fn insert_email(&mut self, mut email: EmailRecord) {
        email.updated_at = Some(Utc::now());
        self.emails.insert(email.id.clone(), email);
    }

    pub fn get_email(&self, id: &str) -> Option<&EmailRecord> {
        self.emails.get(id)
    }

    pub fn clear(&mut self) {
        self.emails.clear();
    }

    pub fn len(&self) -> usize {
        self.emails.len()
    }

    pub fn is_empty(&self) -> bool {
        self.emails.is_empty()
    }
}

impl RecordStore for JsonStore {
    fn get_all_emails(&self) -> Result<Vec<EmailRecord>, StoreError> {
        let mut emails: Vec<EmailRecord> = self.emails.values().cloned().collect();
        sort_newest_first(&mut emails);
        Ok(emails)
    }

    fn update_email(&mut self, id: &str, patch: &EmailPatch) -> Result<(), StoreError> {
        let email = self
            .emails
            .get_mut(id)
            .ok_or_else(|| StoreError::NotFound(id.to_string()))?;
        let previous = email.clone();
        email.apply_patch(patch);
        email.updated_at = Some(Utc::now());
        if let Err(e) = self.save() {
            self.emails.insert(id.to_string(), previous);
            return Err(e);
        }
        debug!(email_id = id, ?patch, "Email updated");
        Ok(())
    }
}

/// Read-through wrapper that accepts updates without persisting them.
pub struct DryRun<'a, S: RecordStore> {
    inner: &'a S,
}

impl<'a, S: RecordStore> DryRun<'a, S> {
    pub fn new(inner: &'a S) -> Self {
        Self { inner }
    }
}

impl<S: RecordStore> RecordStore for DryRun<'_, S> {
    fn get_all_emails(&self) -> Result<Vec<EmailRecord>, StoreError> {
        self.inner.get_all_emails()
    }

    fn update_email(&mut self, id: &str, patch: &EmailPatch) -> Result<(), StoreError> {
        debug!(email_id = id, ?patch, "[dry-run] Skipping email update");
        Ok(())
    }
}

/// Order by received date, newest first. Records whose date can't be parsed
/// go last, ties broken by id so listings are stable.
fn sort_newest_first(emails: &mut [EmailRecord]) {
    emails.sort_by(|a, b| {
        let da = predicates::parse_datetime(&a.received_date);
        let db = predicates::parse_datetime(&b.received_date);
        db.cmp(&da).then_with(|| a.id.cmp(&b.id))
    });
}

#[cfg(test)]
pub(crate) fn make_email(id: &str, received_date: &str) -> EmailRecord {
    EmailRecord {
        id: id.to_string(),
        thread_id: format!("thread-{}", id),
        from: "sender@example.com".to_string(),
        to: "recipient@example.com".to_string(),
        subject: "Test Subject".to_string(),
        message_body: "This is a test message body".to_string(),
        received_date: received_date.to_string(),
        is_read: false,
        labels: vec!["INBOX".to_string(), "UNREAD".to_string()],
        raw_data: serde_json::Value::Null,
        updated_at: None,
    }
}
