use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use sha2::{Digest, Sha256};
use time::OffsetDateTime;
use tokio::fs;
use tokio::sync::Mutex;
use tracing::{info, warn};
use uuid::Uuid;

use super::error::LutError;
use super::model::{ColorSpace, LutDescriptor};
use super::parser::{self, LutValidation, ParsedLut};
use super::repository::LutCatalog;

const DEFAULT_LUT_NAME: &str = "Untitled LUT";

/// Caller-supplied attributes for a new catalog entry.
#[derive(Debug, Clone, Default)]
pub struct CreateLut {
    pub name: Option<String>,
    pub color_space: Option<ColorSpace>,
    pub metadata: HashMap<String, String>,
}

/// Content-addressed store of validated LUT files.
#[derive(Clone)]
pub struct LutRegistry {
    catalog: Arc<dyn LutCatalog>,
    storage_dir: PathBuf,
    ingest_lock: Arc<Mutex<()>>,
}

impl LutRegistry {
    pub fn new(catalog: Arc<dyn LutCatalog>, storage_dir: impl Into<PathBuf>) -> Self {
        Self {
            catalog,
            storage_dir: storage_dir.into(),
            ingest_lock: Arc::new(Mutex::new(())),
        }
    }

    pub fn storage_dir(&self) -> &Path {
        &self.storage_dir
    }

    pub fn validate(bytes: &[u8]) -> LutValidation {
        parser::validate(bytes)
    }

    pub fn parse(text: &str) -> Result<ParsedLut, LutError> {
        parser::parse(text)
    }

    pub fn content_hash(bytes: &[u8]) -> String {
        hex::encode(Sha256::digest(bytes))
    }

    /// Validates and stores a LUT. Byte-identical content returns the existing live entry.
    pub async fn create(&self, bytes: &[u8], req: CreateLut) -> Result<LutDescriptor, LutError> {
        let parsed = parser::parse_bytes(bytes)?;
        let hash = Self::content_hash(bytes);

        let _guard = self.ingest_lock.lock().await;

        if let Some(existing) = self.catalog.find_active_by_hash(&hash).await? {
            info!(lut_id = %existing.id, hash = %hash, "LUT already registered, reusing entry");
            return Ok(existing);
        }

        let storage_path = self.storage_path(&hash);
        self.write_blob(&storage_path, bytes).await?;

        let now = OffsetDateTime::now_utc();
        let name = req
            .name
            .map(|n| n.trim().to_string())
            .filter(|n| !n.is_empty())
            .or_else(|| parsed.title.clone())
            .unwrap_or_else(|| DEFAULT_LUT_NAME.to_string());

        let descriptor = LutDescriptor {
            id: Uuid::new_v4(),
            name,
            dimension: parsed.dimension,
            color_space: req.color_space.unwrap_or(parsed.color_space),
            size: parsed.size,
            hash,
            storage_path: storage_path.to_string_lossy().into_owned(),
            byte_size: bytes.len() as u64,
            metadata: req.metadata,
            created_at: now,
            updated_at: now,
            deleted_at: None,
        };

        self.catalog.insert(&descriptor).await?;

        info!(
            lut_id = %descriptor.id,
            name = %descriptor.name,
            dimension = descriptor.dimension.as_str(),
            size = descriptor.size,
            "✅ LUT registered"
        );
        Ok(descriptor)
    }

    /// Any entry by id, including soft-deleted ones.
    pub async fn get(&self, id: Uuid) -> Result<Option<LutDescriptor>, LutError> {
        Ok(self.catalog.find_by_id(id).await?)
    }

    /// Live entry by id; soft-deleted entries count as missing.
    pub async fn resolve(&self, id: Uuid) -> Result<LutDescriptor, LutError> {
        match self.catalog.find_by_id(id).await? {
            Some(lut) if !lut.is_deleted() => Ok(lut),
            _ => Err(LutError::NotFound(id)),
        }
    }

    pub async fn list(&self, include_deleted: bool) -> Result<Vec<LutDescriptor>, LutError> {
        Ok(self.catalog.list(include_deleted).await?)
    }

    pub async fn delete(&self, id: Uuid, hard: bool) -> Result<(), LutError> {
        let _guard = self.ingest_lock.lock().await;

        let lut = self
            .catalog
            .find_by_id(id)
            .await?
            .ok_or(LutError::NotFound(id))?;

        if !hard {
            if self.catalog.mark_deleted(id, OffsetDateTime::now_utc()).await? {
                info!(lut_id = %id, "LUT soft-deleted");
            }
            return Ok(());
        }

        self.catalog.purge(id).await?;

        // Another entry (e.g. re-uploaded after a soft delete) may still own the blob.
        if self.catalog.count_by_hash(&lut.hash).await? == 0 {
            let path = PathBuf::from(&lut.storage_path);
            match fs::remove_file(&path).await {
                Ok(()) => {}
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                    warn!(lut_id = %id, path = %path.display(), "LUT file already missing");
                }
                Err(e) => return Err(LutError::storage(path, e)),
            }
        }

        info!(lut_id = %id, "LUT hard-deleted");
        Ok(())
    }

    /// Registers every `.cube` file in `dir`. Invalid files are logged and skipped.
    pub async fn import_dir(&self, dir: &Path) -> Result<Vec<LutDescriptor>, LutError> {
        let mut entries = fs::read_dir(dir)
            .await
            .map_err(|e| LutError::storage(dir, e))?;

        let mut paths = Vec::new();
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| LutError::storage(dir, e))?
        {
            let path = entry.path();
            let is_cube = path
                .extension()
                .and_then(|ext| ext.to_str())
                .map(|ext| ext.eq_ignore_ascii_case("cube"))
                .unwrap_or(false);
            if is_cube {
                paths.push(path);
            }
        }
        paths.sort();

        let mut imported = Vec::with_capacity(paths.len());
        for path in paths {
            let bytes = fs::read(&path)
                .await
                .map_err(|e| LutError::storage(&path, e))?;
            let mut metadata = HashMap::new();
            metadata.insert("source".to_string(), "import".to_string());
            if let Some(file_name) = path.file_name().and_then(|n| n.to_str()) {
                metadata.insert("fileName".to_string(), file_name.to_string());
            }

            let req = CreateLut {
                name: None,
                color_space: None,
                metadata,
            };
            match self.create(&bytes, req).await {
                Ok(lut) => imported.push(lut),
                Err(LutError::Validation { errors, .. }) => {
                    warn!(path = %path.display(), ?errors, "Skipping invalid LUT file");
                }
                Err(e) => return Err(e),
            }
        }

        Ok(imported)
    }

    fn storage_path(&self, hash: &str) -> PathBuf {
        self.storage_dir.join(format!("{}.cube", hash))
    }

    async fn write_blob(&self, path: &Path, bytes: &[u8]) -> Result<(), LutError> {
        if fs::try_exists(path).await.unwrap_or(false) {
            return Ok(());
        }
        fs::create_dir_all(&self.storage_dir)
            .await
            .map_err(|e| LutError::storage(&self.storage_dir, e))?;

        // A blob only appears under its hash name once fully written.
        let tmp = path.with_extension("cube.partial");
        fs::write(&tmp, bytes)
            .await
            .map_err(|e| LutError::storage(&tmp, e))?;
        fs::rename(&tmp, path)
            .await
            .map_err(|e| LutError::storage(path, e))?;
        Ok(())
    }
}
