//! Tag Index - In-memory tag dictionary for tag filter resolution
//!
//! Assigns IDs to tag keys per (namespace, metric) and to tag values per tag
//! key, then answers leaf filters with a bitmap of matching value IDs.
//!
//! # Example
//! ```ignore
//! let index = TagIndex::new();
//! index.register("ns", "cpu", "host", "web-1")?;
//! index.register("ns", "cpu", "host", "web-2")?;
//!
//! let key_id = index.get_tag_key_id("ns", "cpu", "host")?;
//! let ids = index.find_tag_value_ids_by_expr(key_id, &TagFilter::like("host", "web-*"))?;
//! // ids = {1, 2}
//! ```
//!
//! # Design Notes
//! - IDs start at 1 and are never reused
//! - Values are kept sorted so suggestions come back in lexical order

use crate::index::{IndexError, IndexResult, Metadata, MetadataDatabase, TagMetadata};
use crate::query::TagFilter;
use roaring::RoaringBitmap;
use std::collections::{BTreeMap, HashMap};
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

/// (namespace, metric, tag key)
type TagKeyName = (String, String, String);

#[derive(Debug, Default)]
struct Dictionary {
    /// (namespace, metric, key) → tag key ID
    keys: HashMap<TagKeyName, u32>,
    /// tag key ID → value → tag value ID
    values: HashMap<u32, BTreeMap<String, u32>>,
    next_key_id: u32,
}

/// In-memory tag index shared by the write and query paths
#[derive(Debug, Default)]
pub struct TagIndex {
    dict: RwLock<Dictionary>,
}

impl TagIndex {
    /// Create an empty tag index
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> IndexResult<RwLockReadGuard<'_, Dictionary>> {
        self.dict
            .read()
            .map_err(|e| IndexError::Lock(e.to_string()))
    }

    fn write(&self) -> IndexResult<RwLockWriteGuard<'_, Dictionary>> {
        self.dict
            .write()
            .map_err(|e| IndexError::Lock(e.to_string()))
    }

    /// Register a tag key/value pair, returning (tag key ID, tag value ID)
    ///
    /// Registering an existing pair returns the IDs it already has.
    pub fn register(
        &self,
        namespace: &str,
        metric_name: &str,
        tag_key: &str,
        tag_value: &str,
    ) -> IndexResult<(u32, u32)> {
        let mut dict = self.write()?;

        let name = (
            namespace.to_string(),
            metric_name.to_string(),
            tag_key.to_string(),
        );
        let key_id = match dict.keys.get(&name) {
            Some(&id) => id,
            None => {
                dict.next_key_id += 1;
                let id = dict.next_key_id;
                dict.keys.insert(name, id);
                id
            }
        };

        let values = dict.values.entry(key_id).or_default();
        let value_id = match values.get(tag_value) {
            Some(&id) => id,
            None => {
                let id = values.len() as u32 + 1;
                values.insert(tag_value.to_string(), id);
                id
            }
        };

        Ok((key_id, value_id))
    }

    /// Register every tag of a series
    pub fn register_tags(
        &self,
        namespace: &str,
        metric_name: &str,
        tags: &[(&str, &str)],
    ) -> IndexResult<()> {
        for (key, value) in tags {
            self.register(namespace, metric_name, key, value)?;
        }
        Ok(())
    }

    /// Values of a tag key starting with `prefix`, in lexical order
    pub fn suggest_tag_values(
        &self,
        tag_key_id: u32,
        prefix: &str,
        limit: usize,
    ) -> IndexResult<Vec<String>> {
        let dict = self.read()?;
        let values = dict
            .values
            .get(&tag_key_id)
            .ok_or(IndexError::TagKeyIdNotFound(tag_key_id))?;

        Ok(values
            .keys()
            .filter(|value| value.starts_with(prefix))
            .take(limit)
            .cloned()
            .collect())
    }

    /// Get all tag key names of a metric
    pub fn get_keys(&self, namespace: &str, metric_name: &str) -> IndexResult<Vec<String>> {
        let dict = self.read()?;
        let mut keys: Vec<String> = dict
            .keys
            .keys()
            .filter(|(ns, metric, _)| ns == namespace && metric == metric_name)
            .map(|(_, _, key)| key.clone())
            .collect();
        keys.sort();
        Ok(keys)
    }

    /// Get count of tag keys across all metrics
    pub fn key_count(&self) -> usize {
        self.read().map(|dict| dict.keys.len()).unwrap_or(0)
    }

    /// Get count of distinct tag values of one key
    pub fn value_count(&self, tag_key_id: u32) -> usize {
        self.read()
            .ok()
            .and_then(|dict| dict.values.get(&tag_key_id).map(BTreeMap::len))
            .unwrap_or(0)
    }
}

impl MetadataDatabase for TagIndex {
    fn get_tag_key_id(
        &self,
        namespace: &str,
        metric_name: &str,
        tag_key: &str,
    ) -> IndexResult<u32> {
        let dict = self.read()?;
        let name = (
            namespace.to_string(),
            metric_name.to_string(),
            tag_key.to_string(),
        );
        dict.keys
            .get(&name)
            .copied()
            .ok_or_else(|| IndexError::TagKeyNotFound {
                namespace: namespace.to_string(),
                metric: metric_name.to_string(),
                tag_key: tag_key.to_string(),
            })
    }
}

impl TagMetadata for TagIndex {
    fn find_tag_value_ids_by_expr(
        &self,
        tag_key_id: u32,
        filter: &TagFilter,
    ) -> IndexResult<RoaringBitmap> {
        let matcher = filter
            .matcher()
            .map_err(|e| IndexError::InvalidPattern(e.to_string()))?;

        let dict = self.read()?;
        let Some(values) = dict.values.get(&tag_key_id) else {
            return Ok(RoaringBitmap::new());
        };

        Ok(values
            .iter()
            .filter(|(value, _)| matcher.matches(value))
            .map(|(_, &id)| id)
            .collect())
    }
}

impl Metadata for TagIndex {
    fn metadata_database(&self) -> &dyn MetadataDatabase {
        self
    }

    fn tag_metadata(&self) -> &dyn TagMetadata {
        self
    }
}
