use std::fmt;
use std::path::Path;

use anyhow::{Context, Result};
use chrono::NaiveDateTime;
use rusqlite::{Connection, OptionalExtension};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

pub const RECORDS_COLLECTION: &str = "multiasistencia_pendientes";
pub const CREDENTIALS_COLLECTION: &str = "providerCredentials";
pub const FORMAT_ERROR_CLIENT: &str = "ERROR - REVISAR MANUAL";

const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.f";

/// Documents keyed by (collection, id). Bodies are JSON objects; writes merge
/// into the existing body and the store stamps `updated_at` itself.
pub struct DocumentStore {
    conn: Connection,
}

impl DocumentStore {
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
            std::fs::create_dir_all(dir)
                .with_context(|| format!("Failed to create {}", dir.display()))?;
        }
        let conn = Connection::open(path)
            .with_context(|| format!("Failed to open store at {}", path.display()))?;
        conn.execute_batch("PRAGMA journal_mode=WAL;")?;
        let store = Self { conn };
        store.init_schema()?;
        Ok(store)
    }

    #[cfg(test)]
    pub fn open_in_memory() -> Result<Self> {
        let store = Self {
            conn: Connection::open_in_memory()?,
        };
        store.init_schema()?;
        Ok(store)
    }

    fn init_schema(&self) -> Result<()> {
        self.conn.execute_batch(
            "
            CREATE TABLE IF NOT EXISTS documents (
                collection TEXT NOT NULL,
                id         TEXT NOT NULL,
                body       TEXT NOT NULL CHECK(json_valid(body)),
                updated_at TEXT NOT NULL,
                PRIMARY KEY (collection, id)
            );
            ",
        )?;
        Ok(())
    }

    /// Create the document or overlay `fields` onto it, keeping every field
    /// not named in `fields`.
    pub fn merge(&self, collection: &str, id: &str, fields: &Map<String, Value>) -> Result<()> {
        let body = serde_json::to_string(fields)?;
        self.conn
            .execute(
                "INSERT INTO documents (collection, id, body, updated_at)
                 VALUES (?1, ?2, json(?3), strftime('%Y-%m-%d %H:%M:%f', 'now'))
                 ON CONFLICT(collection, id) DO UPDATE SET
                     body = json_patch(documents.body, excluded.body),
                     updated_at = excluded.updated_at",
                rusqlite::params![collection, id, body],
            )
            .with_context(|| format!("Failed to merge {}/{}", collection, id))?;
        Ok(())
    }

    pub fn get(&self, collection: &str, id: &str) -> Result<Option<StoredDocument>> {
        let row: Option<(String, String)> = self
            .conn
            .query_row(
                "SELECT body, updated_at FROM documents WHERE collection = ?1 AND id = ?2",
                rusqlite::params![collection, id],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()?;

        row.map(|(body, updated_at)| -> Result<StoredDocument> {
            Ok(StoredDocument {
                body: serde_json::from_str(&body)?,
                updated_at: NaiveDateTime::parse_from_str(&updated_at, TIMESTAMP_FORMAT)
                    .with_context(|| format!("Bad timestamp '{}'", updated_at))?,
            })
        })
        .transpose()
    }

    pub fn count(&self, collection: &str) -> Result<usize> {
        let n = self.conn.query_row(
            "SELECT COUNT(*) FROM documents WHERE collection = ?1",
            [collection],
            |r| r.get(0),
        )?;
        Ok(n)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct StoredDocument {
    pub body: Map<String, Value>,
    #[allow(dead_code)]
    pub updated_at: NaiveDateTime,
}

// ── Credentials ──

#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credentials {
    #[serde(default)]
    pub user: String,
    #[serde(default)]
    pub pass: String,
}

impl Credentials {
    pub fn is_complete(&self) -> bool {
        !self.user.trim().is_empty() && !self.pass.is_empty()
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("user", &self.user)
            .field("pass", &"<redacted>")
            .finish()
    }
}

pub trait CredentialSource {
    /// `Ok(None)` when nothing is stored for `provider`.
    fn credentials(&self, provider: &str) -> Result<Option<Credentials>>;
}

impl CredentialSource for DocumentStore {
    fn credentials(&self, provider: &str) -> Result<Option<Credentials>> {
        self.get(CREDENTIALS_COLLECTION, provider)?
            .map(|doc| {
                serde_json::from_value(Value::Object(doc.body))
                    .with_context(|| format!("Malformed credentials for {}", provider))
            })
            .transpose()
    }
}

// ── Case records ──

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CaseRecord {
    pub client_name: String,
    pub address: String,
    pub company: String,
    pub phone: String,
    pub description: String,
    pub status_text: String,
    pub date_opened: String,
    pub service_number: String,
    pub has_content: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordStatus {
    PendingValidation,
    FormatError,
}

/// What gets written for one fetched reference.
#[derive(Debug, Clone, PartialEq)]
pub enum RecordWrite {
    Extracted(CaseRecord),
    FormatError,
}

impl RecordWrite {
    pub fn status(&self) -> RecordStatus {
        match self {
            RecordWrite::Extracted(_) => RecordStatus::PendingValidation,
            RecordWrite::FormatError => RecordStatus::FormatError,
        }
    }

    /// Fields to merge for `reference`. The format-error sentinel only names
    /// the reference, status and client so earlier extracted data survives.
    pub fn fields(&self, reference: &str) -> Result<Map<String, Value>> {
        let mut fields = match self {
            RecordWrite::Extracted(record) => match serde_json::to_value(record)? {
                Value::Object(map) => map,
                other => anyhow::bail!("record serialized to non-object {}", other),
            },
            RecordWrite::FormatError => {
                let mut map = Map::new();
                map.insert("clientName".into(), FORMAT_ERROR_CLIENT.into());
                map
            }
        };
        fields.insert("serviceNumber".into(), reference.into());
        fields.insert("status".into(), serde_json::to_value(self.status())?);
        Ok(fields)
    }
}

pub trait RecordSink {
    fn upsert(&self, reference: &str, write: &RecordWrite) -> Result<()>;
}

impl RecordSink for DocumentStore {
    fn upsert(&self, reference: &str, write: &RecordWrite) -> Result<()> {
        self.merge(RECORDS_COLLECTION, reference, &write.fields(reference)?)
    }
}
