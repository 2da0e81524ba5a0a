use chrono::Utc;
use log::debug;
use perfledger_core::performance::{
    BlockStoreTrait, EntityId, PerformanceDataPoint, PerformanceDataSet,
};
use perfledger_core::settings::PerformanceSettings;
use perfledger_core::{Error, Result};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};
use uuid::Uuid;

use super::model::{BlockIndex, BlockIndexEntry};
use crate::errors::StorageError;

const INDEX_FILE: &str = "index.json";
const DEFAULT_SCOPE_DIR: &str = "_default";

type BlockKey = (EntityId, Option<String>);

/// Block store persisting each entity's blocks under its own directory.
///
/// Indexes are read once per entity and scope, then served from memory.
/// Points files are read only when a block's points are first requested.
pub struct LocalBlockStore {
    root: PathBuf,
    cache: RwLock<HashMap<BlockKey, Vec<Arc<PerformanceDataSet>>>>,
}

impl LocalBlockStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        LocalBlockStore {
            root: root.into(),
            cache: RwLock::new(HashMap::new()),
        }
    }

    pub fn from_settings(settings: &PerformanceSettings) -> Self {
        Self::new(settings.local_store_path.clone())
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn entity_dir(
        &self,
        entity: &EntityId,
        performance_scope: Option<&str>,
    ) -> std::result::Result<PathBuf, StorageError> {
        let scope_dir = performance_scope.unwrap_or(DEFAULT_SCOPE_DIR);
        let mut dir = self.root.clone();
        for component in [entity.scope.as_str(), entity.code.as_str(), scope_dir] {
            dir.push(checked_component(component)?);
        }
        Ok(dir)
    }

    fn read_index(dir: &Path) -> std::result::Result<BlockIndex, StorageError> {
        let path = dir.join(INDEX_FILE);
        if !path.exists() {
            return Ok(BlockIndex::default());
        }
        let bytes = fs::read(&path)?;
        Ok(serde_json::from_slice(&bytes)?)
    }

    fn open_block(dir: &Path, entry: BlockIndexEntry) -> PerformanceDataSet {
        let points_path = dir.join(entry.points_file_name());
        PerformanceDataSet::lazy(
            entry.from_date,
            entry.to_date,
            Some(entry.asat),
            Box::new(move || read_points(&points_path).map_err(Error::from)),
        )
        .with_version(entry.version)
        .with_previous(entry.previous)
    }

    /// Loads the index for an entity into the cache if it is not there yet.
    fn load_entity(&self, entity: &EntityId, performance_scope: Option<&str>) -> Result<()> {
        let key = (entity.clone(), performance_scope.map(str::to_string));
        if self
            .cache
            .read()
            .map_err(|_| StorageError::LockPoisoned)?
            .contains_key(&key)
        {
            return Ok(());
        }

        let dir = self.entity_dir(entity, performance_scope)?;
        let index = Self::read_index(&dir)?;
        debug!(
            "Opened {} blocks for {} from {}",
            index.blocks.len(),
            entity,
            dir.display()
        );
        let blocks = index
            .blocks
            .into_iter()
            .map(|entry| Arc::new(Self::open_block(&dir, entry)))
            .collect();

        self.cache
            .write()
            .map_err(|_| StorageError::LockPoisoned)?
            .entry(key)
            .or_insert(blocks);
        Ok(())
    }
}

fn checked_component(component: &str) -> std::result::Result<&str, StorageError> {
    if component.is_empty()
        || component == "."
        || component == ".."
        || component.contains(['/', '\\'])
    {
        return Err(StorageError::InvalidPath(component.to_string()));
    }
    Ok(component)
}

fn read_points(path: &Path) -> std::result::Result<Vec<PerformanceDataPoint>, StorageError> {
    let bytes = fs::read(path)?;
    Ok(serde_json::from_slice(&bytes)?)
}

/// Writes through a temporary file so readers never see a partial file.
fn write_json<T: serde::Serialize>(path: &Path, value: &T) -> std::result::Result<(), StorageError> {
    let tmp = path.with_extension("json.tmp");
    fs::write(&tmp, serde_json::to_vec_pretty(value)?)?;
    fs::rename(&tmp, path)?;
    Ok(())
}

impl BlockStoreTrait for LocalBlockStore {
    fn add_block(
        &self,
        entity: &EntityId,
        mut block: PerformanceDataSet,
        performance_scope: Option<&str>,
    ) -> Result<Arc<PerformanceDataSet>> {
        self.load_entity(entity, performance_scope)?;
        let asat = *block.asat.get_or_insert_with(Utc::now);

        let dir = self.entity_dir(entity, performance_scope)?;
        fs::create_dir_all(&dir).map_err(StorageError::from)?;

        let entry = BlockIndexEntry {
            id: Uuid::new_v4(),
            from_date: block.from_date,
            to_date: block.to_date,
            asat,
            version: block.version.clone(),
            previous: block.previous().cloned(),
        };
        let points = block.get_data_points()?;
        write_json(&dir.join(entry.points_file_name()), &*points)?;

        let mut cache = self.cache.write().map_err(|_| StorageError::LockPoisoned)?;
        let mut index = Self::read_index(&dir)?;
        index.blocks.push(entry.clone());
        write_json(&dir.join(INDEX_FILE), &index)?;

        let block = Arc::new(block);
        cache
            .entry((entity.clone(), performance_scope.map(str::to_string)))
            .or_default()
            .push(Arc::clone(&block));

        debug!(
            "Stored block {} [{}, {}] for {} as at {} ({} points)",
            entry.id,
            entry.from_date,
            entry.to_date,
            entity,
            asat,
            points.len()
        );
        Ok(block)
    }

    fn get_blocks(
        &self,
        entity: &EntityId,
        performance_scope: Option<&str>,
    ) -> Result<Vec<Arc<PerformanceDataSet>>> {
        self.load_entity(entity, performance_scope)?;
        let cache = self.cache.read().map_err(|_| StorageError::LockPoisoned)?;
        Ok(cache
            .get(&(entity.clone(), performance_scope.map(str::to_string)))
            .cloned()
            .unwrap_or_default())
    }
}
