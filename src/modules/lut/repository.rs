use std::collections::HashMap;
use std::sync::Arc;

use anyhow::{Result, anyhow};
use async_trait::async_trait;
use sqlx::types::Json;
use sqlx::{FromRow, PgPool};
use time::OffsetDateTime;
use tokio::sync::RwLock;
use uuid::Uuid;

use super::model::{ColorSpace, LutDescriptor, LutDimension};

/// Persistence for LUT catalog entries.
#[async_trait]
pub trait LutCatalog: Send + Sync {
    async fn insert(&self, lut: &LutDescriptor) -> Result<()>;
    async fn find_by_id(&self, id: Uuid) -> Result<Option<LutDescriptor>>;
    /// Live (non-deleted) entry with this content hash.
    async fn find_active_by_hash(&self, hash: &str) -> Result<Option<LutDescriptor>>;
    /// Number of entries, deleted or not, that share a content hash.
    async fn count_by_hash(&self, hash: &str) -> Result<u64>;
    async fn list(&self, include_deleted: bool) -> Result<Vec<LutDescriptor>>;
    async fn mark_deleted(&self, id: Uuid, at: OffsetDateTime) -> Result<bool>;
    async fn purge(&self, id: Uuid) -> Result<bool>;
}

pub struct PgLutCatalog {
    pool: PgPool,
}

impl PgLutCatalog {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[derive(Debug, FromRow)]
struct LutRow {
    id: Uuid,
    name: String,
    dimension: String,
    color_space: String,
    size: i32,
    hash: String,
    storage_path: String,
    byte_size: i64,
    metadata: Json<HashMap<String, String>>,
    created_at: OffsetDateTime,
    updated_at: OffsetDateTime,
    deleted_at: Option<OffsetDateTime>,
}

impl TryFrom<LutRow> for LutDescriptor {
    type Error = anyhow::Error;

    fn try_from(row: LutRow) -> Result<Self> {
        Ok(LutDescriptor {
            id: row.id,
            name: row.name,
            dimension: row.dimension.parse::<LutDimension>().map_err(|e| anyhow!(e))?,
            color_space: row
                .color_space
                .parse::<ColorSpace>()
                .unwrap_or(ColorSpace::Unknown),
            size: u32::try_from(row.size)?,
            hash: row.hash,
            storage_path: row.storage_path,
            byte_size: u64::try_from(row.byte_size)?,
            metadata: row.metadata.0,
            created_at: row.created_at,
            updated_at: row.updated_at,
            deleted_at: row.deleted_at,
        })
    }
}

const SELECT_COLUMNS: &str = "SELECT id, name, dimension, color_space, size, hash, storage_path, \
     byte_size, metadata, created_at, updated_at, deleted_at FROM luts";

#[async_trait]
impl LutCatalog for PgLutCatalog {
    async fn insert(&self, lut: &LutDescriptor) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO luts (id, name, dimension, color_space, size, hash, storage_path,
                              byte_size, metadata, created_at, updated_at, deleted_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
            "#,
        )
        .bind(lut.id)
        .bind(&lut.name)
        .bind(lut.dimension.as_str())
        .bind(lut.color_space.as_str())
        .bind(i32::try_from(lut.size)?)
        .bind(&lut.hash)
        .bind(&lut.storage_path)
        .bind(i64::try_from(lut.byte_size)?)
        .bind(Json(&lut.metadata))
        .bind(lut.created_at)
        .bind(lut.updated_at)
        .bind(lut.deleted_at)
        .execute(&self.pool)
        .await
        .map_err(|e| anyhow!("Failed to insert LUT: {}", e))?;

        Ok(())
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<LutDescriptor>> {
        let row = sqlx::query_as::<_, LutRow>(&format!("{} WHERE id = $1", SELECT_COLUMNS))
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| anyhow!("Failed to fetch LUT: {}", e))?;

        row.map(LutDescriptor::try_from).transpose()
    }

    async fn find_active_by_hash(&self, hash: &str) -> Result<Option<LutDescriptor>> {
        let row = sqlx::query_as::<_, LutRow>(&format!(
            "{} WHERE hash = $1 AND deleted_at IS NULL",
            SELECT_COLUMNS
        ))
        .bind(hash)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| anyhow!("Failed to fetch LUT by hash: {}", e))?;

        row.map(LutDescriptor::try_from).transpose()
    }

    async fn count_by_hash(&self, hash: &str) -> Result<u64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM luts WHERE hash = $1")
            .bind(hash)
            .fetch_one(&self.pool)
            .await?;

        Ok(u64::try_from(count)?)
    }

    async fn list(&self, include_deleted: bool) -> Result<Vec<LutDescriptor>> {
        let rows = sqlx::query_as::<_, LutRow>(&format!(
            "{} WHERE ($1 OR deleted_at IS NULL) ORDER BY name ASC, created_at ASC",
            SELECT_COLUMNS
        ))
        .bind(include_deleted)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| anyhow!("Failed to list LUTs: {}", e))?;

        rows.into_iter().map(LutDescriptor::try_from).collect()
    }

    async fn mark_deleted(&self, id: Uuid, at: OffsetDateTime) -> Result<bool> {
        let result = sqlx::query(
            "UPDATE luts SET deleted_at = $1, updated_at = $1 WHERE id = $2 AND deleted_at IS NULL",
        )
        .bind(at)
        .bind(id)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn purge(&self, id: Uuid) -> Result<bool> {
        let result = sqlx::query("DELETE FROM luts WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }
}

/// Process-local catalog used when no database is configured, and in tests.
#[derive(Clone, Default)]
pub struct MemoryLutCatalog {
    entries: Arc<RwLock<HashMap<Uuid, LutDescriptor>>>,
}

impl MemoryLutCatalog {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl LutCatalog for MemoryLutCatalog {
    async fn insert(&self, lut: &LutDescriptor) -> Result<()> {
        let mut entries = self.entries.write().await;
        let duplicate = entries
            .values()
            .any(|existing| existing.hash == lut.hash && !existing.is_deleted());
        if duplicate && !lut.is_deleted() {
            return Err(anyhow!("LUT with hash {} already exists", lut.hash));
        }
        entries.insert(lut.id, lut.clone());
        Ok(())
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<LutDescriptor>> {
        Ok(self.entries.read().await.get(&id).cloned())
    }

    async fn find_active_by_hash(&self, hash: &str) -> Result<Option<LutDescriptor>> {
        Ok(self
            .entries
            .read()
            .await
            .values()
            .find(|lut| lut.hash == hash && !lut.is_deleted())
            .cloned())
    }

    async fn count_by_hash(&self, hash: &str) -> Result<u64> {
        Ok(self
            .entries
            .read()
            .await
            .values()
            .filter(|lut| lut.hash == hash)
            .count() as u64)
    }

    async fn list(&self, include_deleted: bool) -> Result<Vec<LutDescriptor>> {
        let mut luts: Vec<LutDescriptor> = self
            .entries
            .read()
            .await
            .values()
            .filter(|lut| include_deleted || !lut.is_deleted())
            .cloned()
            .collect();
        luts.sort_by(|a, b| a.name.cmp(&b.name).then(a.created_at.cmp(&b.created_at)));
        Ok(luts)
    }

    async fn mark_deleted(&self, id: Uuid, at: OffsetDateTime) -> Result<bool> {
        let mut entries = self.entries.write().await;
        match entries.get_mut(&id) {
            Some(lut) if !lut.is_deleted() => {
                lut.deleted_at = Some(at);
                lut.updated_at = at;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn purge(&self, id: Uuid) -> Result<bool> {
        Ok(self.entries.write().await.remove(&id).is_some())
    }
}
