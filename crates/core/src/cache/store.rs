//! Versioned response stores.
//!
//! Each store is a set of rows in `entries` sharing a version tag. Exactly one
//! tag is active for a deployed version; superseded tags are removed with
//! [`CacheDb::delete_store`], which cascades to their entries.

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio_rusqlite::params;
use tokio_rusqlite::rusqlite;

use super::connection::CacheDb;
use crate::Error;
use crate::request::StoreKey;
use crate::response::{ResponseKind, ResponseSnapshot};

/// Key-value access to the snapshots of a single store.
///
/// Reads and writes for different keys are independent. Writing a key that
/// already holds a snapshot replaces it.
#[async_trait]
pub trait ResponseStore: Send + Sync {
    /// Version tag this store belongs to.
    fn tag(&self) -> &str;

    async fn get(&self, key: &StoreKey) -> Result<Option<ResponseSnapshot>, Error>;

    async fn put(&self, key: &StoreKey, snapshot: &ResponseSnapshot) -> Result<(), Error>;

    async fn entry_count(&self) -> Result<u64, Error>;

    /// Resolves once every operation submitted before it has completed.
    async fn barrier(&self) -> Result<(), Error>;
}

/// Enumeration and lifetime of the stores behind one database.
#[async_trait]
pub trait StoreCatalog: Send + Sync {
    /// Open the store for `tag`, creating it if needed.
    async fn open(&self, tag: &str, quota_bytes: Option<u64>) -> Result<Arc<dyn ResponseStore>, Error>;

    async fn tags(&self) -> Result<Vec<String>, Error>;

    /// Delete a store with all of its entries. Returns false if it did not exist.
    async fn delete(&self, tag: &str) -> Result<bool, Error>;

    async fn stats(&self) -> Result<Vec<StoreStats>, Error>;
}

/// Size summary of one store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, schemars::JsonSchema)]
pub struct StoreStats {
    pub tag: String,
    pub entry_count: u64,
    pub body_bytes: u64,
}

/// SQLite-backed store for one version tag.
#[derive(Debug, Clone)]
pub struct VersionedStore {
    db: CacheDb,
    tag: String,
    quota_bytes: Option<u64>,
}

impl CacheDb {
    /// Open the store for `tag`, creating it if needed.
    pub async fn open_store(&self, tag: &str, quota_bytes: Option<u64>) -> Result<VersionedStore, Error> {
        if tag.trim().is_empty() {
            return Err(Error::InvalidInput("store tag must not be empty".into()));
        }

        let owned = tag.to_string();
        self.conn
            .call(move |conn| -> Result<(), Error> {
                conn.execute(
                    "INSERT OR IGNORE INTO stores (tag, created_at) VALUES (?1, ?2)",
                    params![owned, chrono::Utc::now().to_rfc3339()],
                )?;
                Ok(())
            })
            .await
            .map_err(Error::from)?;

        Ok(VersionedStore { db: self.clone(), tag: tag.to_string(), quota_bytes })
    }

    /// All store tags, oldest first.
    pub async fn store_tags(&self) -> Result<Vec<String>, Error> {
        self.conn
            .call(|conn| -> Result<Vec<String>, Error> {
                let mut stmt = conn.prepare("SELECT tag FROM stores ORDER BY created_at ASC, tag ASC")?;
                let tags = stmt
                    .query_map([], |row| row.get(0))?
                    .collect::<Result<Vec<String>, _>>()?;
                Ok(tags)
            })
            .await
            .map_err(Error::from)
    }

    /// Structurally delete a store and all of its entries.
    ///
    /// Returns false if the tag did not exist.
    pub async fn delete_store(&self, tag: &str) -> Result<bool, Error> {
        let tag = tag.to_string();
        self.conn
            .call(move |conn| -> Result<bool, Error> {
                let deleted = conn.execute("DELETE FROM stores WHERE tag = ?1", params![tag])?;
                Ok(deleted > 0)
            })
            .await
            .map_err(Error::from)
    }

    /// Entry count and body size per store.
    pub async fn store_stats(&self) -> Result<Vec<StoreStats>, Error> {
        self.conn
            .call(|conn| -> Result<Vec<StoreStats>, Error> {
                let mut stmt = conn.prepare("SELECT tag, entry_count, body_bytes FROM store_sizes ORDER BY tag")?;
                let stats = stmt
                    .query_map([], |row| {
                        Ok(StoreStats {
                            tag: row.get(0)?,
                            entry_count: row.get::<_, i64>(1)? as u64,
                            body_bytes: row.get::<_, i64>(2)? as u64,
                        })
                    })?
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(stats)
            })
            .await
            .map_err(Error::from)
    }
}

#[async_trait]
impl StoreCatalog for CacheDb {
    async fn open(&self, tag: &str, quota_bytes: Option<u64>) -> Result<Arc<dyn ResponseStore>, Error> {
        Ok(Arc::new(self.open_store(tag, quota_bytes).await?))
    }

    async fn tags(&self) -> Result<Vec<String>, Error> {
        self.store_tags().await
    }

    async fn delete(&self, tag: &str) -> Result<bool, Error> {
        self.delete_store(tag).await
    }

    async fn stats(&self) -> Result<Vec<StoreStats>, Error> {
        self.store_stats().await
    }
}

#[async_trait]
impl ResponseStore for VersionedStore {
    fn tag(&self) -> &str {
        &self.tag
    }

    async fn get(&self, key: &StoreKey) -> Result<Option<ResponseSnapshot>, Error> {
        let tag = self.tag.clone();
        let hash = key.hash();
        self.db
            .conn
            .call(move |conn| -> Result<Option<ResponseSnapshot>, Error> {
                let mut stmt = conn.prepare(
                    "SELECT status_code, kind, headers_json, body, stored_at
                     FROM entries WHERE tag = ?1 AND key_hash = ?2",
                )?;

                let result = stmt.query_row(params![tag, hash], |row| {
                    Ok((
                        row.get::<_, i64>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, String>(2)?,
                        row.get::<_, Vec<u8>>(3)?,
                        row.get::<_, String>(4)?,
                    ))
                });

                match result {
                    Ok((status, kind, headers_json, body, stored_at)) => {
                        let headers: Vec<(String, String)> = serde_json::from_str(&headers_json)?;
                        let status = u16::try_from(status)
                            .map_err(|_| Error::Serialization(format!("status out of range: {status}")))?;
                        Ok(Some(ResponseSnapshot::new(status, headers, body, kind_from_str(&kind)?, stored_at)))
                    }
                    Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
                    Err(e) => Err(e.into()),
                }
            })
            .await
            .map_err(Error::from)
    }

    async fn put(&self, key: &StoreKey, snapshot: &ResponseSnapshot) -> Result<(), Error> {
        let tag = self.tag.clone();
        let hash = key.hash();
        let key = key.clone();
        let quota = self.quota_bytes;
        let headers_json = serde_json::to_string(snapshot.headers())?;
        let snapshot = snapshot.clone();

        self.db
            .conn
            .call(move |conn| -> Result<(), Error> {
                if let Some(limit) = quota {
                    let others: i64 = conn.query_row(
                        "SELECT COALESCE(SUM(LENGTH(body)), 0) FROM entries WHERE tag = ?1 AND key_hash != ?2",
                        params![tag, hash],
                        |row| row.get(0),
                    )?;
                    let needed = others as u64 + snapshot.body().len() as u64;
                    if needed > limit {
                        return Err(Error::QuotaExceeded { tag, needed, limit });
                    }
                }

                conn.execute(
                    "INSERT INTO entries (
                        tag, key_hash, method, url, status_code, kind, headers_json, body, stored_at
                    ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
                    ON CONFLICT(tag, key_hash) DO UPDATE SET
                        method = excluded.method,
                        url = excluded.url,
                        status_code = excluded.status_code,
                        kind = excluded.kind,
                        headers_json = excluded.headers_json,
                        body = excluded.body,
                        stored_at = excluded.stored_at",
                    params![
                        &tag,
                        &hash,
                        &key.method,
                        &key.url,
                        snapshot.status() as i64,
                        kind_to_str(snapshot.kind()),
                        &headers_json,
                        snapshot.body().as_ref(),
                        snapshot.stored_at(),
                    ],
                )?;
                Ok(())
            })
            .await
            .map_err(Error::from)
    }

    async fn entry_count(&self) -> Result<u64, Error> {
        let tag = self.tag.clone();
        self.db
            .conn
            .call(move |conn| -> Result<u64, Error> {
                let count: i64 =
                    conn.query_row("SELECT COUNT(*) FROM entries WHERE tag = ?1", params![tag], |row| row.get(0))?;
                Ok(count as u64)
            })
            .await
            .map_err(Error::from)
    }

    async fn barrier(&self) -> Result<(), Error> {
        // calls run in submission order on the connection thread
        self.db
            .conn
            .call(|_conn| -> Result<(), Error> { Ok(()) })
            .await
            .map_err(Error::from)
    }
}

fn kind_to_str(kind: ResponseKind) -> &'static str {
    match kind {
        ResponseKind::Basic => "basic",
        ResponseKind::Cors => "cors",
        ResponseKind::Synthetic => "synthetic",
    }
}

fn kind_from_str(kind: &str) -> Result<ResponseKind, Error> {
    match kind {
        "basic" => Ok(ResponseKind::Basic),
        "cors" => Ok(ResponseKind::Cors),
        "synthetic" => Ok(ResponseKind::Synthetic),
        other => Err(Error::Serialization(format!("unknown response kind: {other}"))),
    }
}
