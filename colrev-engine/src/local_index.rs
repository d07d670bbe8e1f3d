//! Shared local index
//!
//! Content-addressed record store shared across the repositories of one
//! environment. Records are keyed by the SHA-256 of each of their colrev_ids,
//! so a lookup by any colrev_id of a record finds it.
//!
//! Concurrent indexing from two repositories is serialized through the
//! `index_lock` table (one row while an indexing run is active).

use crate::dataset::{bibtex, Dataset};
use colrev_common::record::fields;
use colrev_common::{Error, Record, Result};
use sha2::{Digest, Sha256};
use sqlx::sqlite::SqlitePoolOptions;
use sqlx::{Row, SqlitePool};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Key of a colrev_id in the index
pub fn index_key(colrev_id: &str) -> String {
    let digest = Sha256::digest(colrev_id.as_bytes());
    digest.iter().map(|b| format!("{:02x}", b)).collect()
}

/// A record found in the index
#[derive(Debug, Clone)]
pub struct IndexedRecord {
    pub record: Record,
    /// Repository the record was indexed from
    pub repo_path: PathBuf,
}

impl IndexedRecord {
    /// Absolute path of the record's PDF, if it has one
    pub fn pdf_path(&self) -> Option<PathBuf> {
        let file = self.record.known(fields::FILE)?;
        let path = Path::new(file);
        Some(if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.repo_path.join(path)
        })
    }
}

pub struct LocalIndex {
    pool: SqlitePool,
}

impl LocalIndex {
    /// Open (and create if needed) the index database
    pub async fn open(db_path: &Path) -> Result<Self> {
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let db_url = format!("sqlite://{}?mode=rwc", db_path.display());
        let pool = SqlitePoolOptions::new()
            .max_connections(4)
            .connect(&db_url)
            .await?;

        sqlx::query("PRAGMA journal_mode = WAL").execute(&pool).await?;
        sqlx::query("PRAGMA busy_timeout = 5000").execute(&pool).await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS records (
                key TEXT PRIMARY KEY,
                colrev_id TEXT NOT NULL,
                colrev_pdf_id TEXT,
                repo_path TEXT NOT NULL,
                record TEXT NOT NULL,
                indexed_at TEXT NOT NULL
            )
            "#,
        )
        .execute(&pool)
        .await?;
        sqlx::query("CREATE INDEX IF NOT EXISTS idx_records_pdf_id ON records(colrev_pdf_id)")
            .execute(&pool)
            .await?;
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS index_lock (
                id INTEGER PRIMARY KEY CHECK (id = 1),
                holder TEXT NOT NULL,
                acquired_at TEXT NOT NULL
            )
            "#,
        )
        .execute(&pool)
        .await?;

        debug!(path = %db_path.display(), "Opened local index");
        Ok(Self { pool })
    }

    // ========================================================================
    // Advisory lock
    // ========================================================================

    /// Take the indexing lock; fails when another run holds it
    pub async fn acquire_lock(&self, holder: &str) -> Result<()> {
        let inserted = sqlx::query(
            "INSERT OR IGNORE INTO index_lock (id, holder, acquired_at) VALUES (1, ?, ?)",
        )
        .bind(holder)
        .bind(chrono::Utc::now().to_rfc3339())
        .execute(&self.pool)
        .await?
        .rows_affected();
        if inserted == 0 {
            let current: Option<String> =
                sqlx::query_scalar("SELECT holder FROM index_lock WHERE id = 1")
                    .fetch_optional(&self.pool)
                    .await?;
            return Err(Error::Internal(format!(
                "Local index is locked by {}",
                current.unwrap_or_else(|| "another process".to_string())
            )));
        }
        Ok(())
    }

    pub async fn release_lock(&self, holder: &str) -> Result<()> {
        sqlx::query("DELETE FROM index_lock WHERE id = 1 AND holder = ?")
            .bind(holder)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    // ========================================================================
    // Index / retrieve
    // ========================================================================

    /// Store a record under each of its colrev_ids
    pub async fn add_record(&self, record: &Record, repo_path: &Path) -> Result<usize> {
        let serialized = bibtex::write_record(record);
        let now = chrono::Utc::now().to_rfc3339();
        let mut stored = 0;
        for colrev_id in &record.colrev_id {
            sqlx::query(
                r#"
                INSERT INTO records (key, colrev_id, colrev_pdf_id, repo_path, record, indexed_at)
                VALUES (?, ?, ?, ?, ?, ?)
                ON CONFLICT(key) DO UPDATE SET
                    colrev_pdf_id = excluded.colrev_pdf_id,
                    repo_path = excluded.repo_path,
                    record = excluded.record,
                    indexed_at = excluded.indexed_at
                "#,
            )
            .bind(index_key(colrev_id))
            .bind(colrev_id)
            .bind(record.colrev_pdf_id.as_deref())
            .bind(repo_path.to_string_lossy().as_ref())
            .bind(&serialized)
            .bind(&now)
            .execute(&self.pool)
            .await?;
            stored += 1;
        }
        Ok(stored)
    }

    /// Register every record of a repository at `md_processed` or later
    pub async fn index(&self, repo_path: &Path) -> Result<usize> {
        let holder = repo_path.to_string_lossy().to_string();
        self.acquire_lock(&holder).await?;
        let result = self.index_locked(repo_path).await;
        self.release_lock(&holder).await?;
        result
    }

    async fn index_locked(&self, repo_path: &Path) -> Result<usize> {
        let dataset = Dataset::new(repo_path);
        let records = dataset.load_all()?;
        let mut indexed = 0;
        for record in records.values() {
            if record.status.ordinal() < colrev_common::RecordState::MdProcessed.ordinal() {
                continue;
            }
            if record.colrev_id.is_empty() {
                warn!(id = %record.id, "Record without colrev_id not indexed");
                continue;
            }
            indexed += self.add_record(record, repo_path).await.map(|_| 1)?;
        }
        info!(repo = %repo_path.display(), indexed, "Indexed records");
        Ok(indexed)
    }

    fn row_to_record(row: &sqlx::sqlite::SqliteRow) -> Result<IndexedRecord> {
        let text: String = row.try_get("record")?;
        let repo: String = row.try_get("repo_path")?;
        let record = bibtex::parse_records(&text)?
            .into_iter()
            .next()
            .ok_or_else(|| Error::Internal("Empty record in local index".to_string()))?;
        Ok(IndexedRecord {
            record,
            repo_path: PathBuf::from(repo),
        })
    }

    /// Look a record up by any of its colrev_ids
    pub async fn retrieve(&self, record: &Record) -> Result<Option<IndexedRecord>> {
        let mut candidates = record.colrev_id.clone();
        if candidates.is_empty() {
            if let Ok(cid) = colrev_common::record::create_colrev_id(record) {
                candidates.push(cid);
            }
        }
        for colrev_id in candidates {
            let row = sqlx::query("SELECT record, repo_path FROM records WHERE key = ?")
                .bind(index_key(&colrev_id))
                .fetch_optional(&self.pool)
                .await?;
            if let Some(row) = row {
                return Ok(Some(Self::row_to_record(&row)?));
            }
        }
        Ok(None)
    }

    /// Look a record up by the hash of its PDF's first page
    pub async fn retrieve_by_pdf_id(&self, colrev_pdf_id: &str) -> Result<Option<IndexedRecord>> {
        let row = sqlx::query("SELECT record, repo_path FROM records WHERE colrev_pdf_id = ? LIMIT 1")
            .bind(colrev_pdf_id)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(Self::row_to_record).transpose()
    }

    pub async fn len(&self) -> Result<i64> {
        Ok(sqlx::query_scalar("SELECT COUNT(*) FROM records")
            .fetch_one(&self.pool)
            .await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use colrev_common::RecordState;

    fn processed() -> Record {
        let mut record = Record::new("Smith2020", "article")
            .with_field("author", "Smith, J. and Jones, K.")
            .with_field("title", "On X")
            .with_field("year", "2020")
            .with_field("journal", "X Journal")
            .with_field("volume", "1")
            .with_field("number", "2")
            .with_origin("lr.bib/0001")
            .with_status(RecordState::MdProcessed);
        record.add_colrev_id("colrev_id1:|a|x-journal|1|2|2020|smith-j-jones-k|on-x");
        record.colrev_pdf_id = Some("cpid1:ffff".to_string());
        record
    }

    #[tokio::test]
    async fn store_and_retrieve() {
        let tmp = tempfile::tempdir().unwrap();
        let index = LocalIndex::open(&tmp.path().join("local_index.db")).await.unwrap();
        index.add_record(&processed(), tmp.path()).await.unwrap();

        let probe = Record::new("x", "article").with_field("title", "On X");
        let mut probe = probe;
        probe.add_colrev_id("colrev_id1:|a|x-journal|1|2|2020|smith-j-jones-k|on-x");
        let found = index.retrieve(&probe).await.unwrap().unwrap();
        assert_eq!(found.record.id, "Smith2020");
        assert_eq!(found.repo_path, tmp.path());

        let by_pdf = index.retrieve_by_pdf_id("cpid1:ffff").await.unwrap();
        assert!(by_pdf.is_some());
        assert_eq!(index.len().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn lock_is_exclusive() {
        let tmp = tempfile::tempdir().unwrap();
        let index = LocalIndex::open(&tmp.path().join("local_index.db")).await.unwrap();
        index.acquire_lock("repo-a").await.unwrap();
        assert!(index.acquire_lock("repo-b").await.is_err());
        index.release_lock("repo-a").await.unwrap();
        index.acquire_lock("repo-b").await.unwrap();
    }
}
