//! String-property payloads for the metadata index.

use std::collections::BTreeMap;
use std::path::Path;

use crate::error::Result;

use super::{codec_error, BucketCodec, BucketTree};

/// Bucket payload holding named string properties per path.
///
/// The occurrence count of an entry is its number of properties, so
/// cardinality queries need no payload decoding by callers.
pub struct PropertyCodec;

impl BucketCodec for PropertyCodec {
    type Value = BTreeMap<String, String>;

    const VERSION: u8 = 1;
    const INDEX_FILE_NAME: &'static str = "properties.index";
    const VERSION_FILE_NAME: &'static str = "properties.version";

    fn encode(value: &Self::Value, out: &mut Vec<u8>) -> Result<()> {
        let bytes = postcard::to_stdvec(value).map_err(codec_error)?;
        out.extend_from_slice(&bytes);
        Ok(())
    }

    fn decode(bytes: &[u8]) -> Result<Self::Value> {
        postcard::from_bytes(bytes).map_err(codec_error)
    }

    fn occurrences(value: &Self::Value) -> usize {
        value.len()
    }
}

/// Per-path string properties over a [`BucketTree`].
///
/// Setting the last property of a path to `None` removes the whole entry.
pub struct PropertyStore {
    tree: BucketTree<PropertyCodec>,
}

impl PropertyStore {
    pub fn new(base: impl Into<std::path::PathBuf>) -> Self {
        Self {
            tree: BucketTree::new(base),
        }
    }

    pub fn tree(&mut self) -> &mut BucketTree<PropertyCodec> {
        &mut self.tree
    }

    /// Sets or removes one property of `path`.
    pub fn set(&mut self, path: &Path, key: &str, value: Option<&str>) -> Result<()> {
        self.tree.load_bucket_for(path)?;
        let mut properties = self
            .tree
            .current()
            .entry_value(path)
            .cloned()
            .unwrap_or_default();
        match value {
            Some(value) => {
                properties.insert(key.to_string(), value.to_string());
            }
            None => {
                properties.remove(key);
            }
        }
        let next = if properties.is_empty() {
            None
        } else {
            Some(properties)
        };
        self.tree.current_mut().set_entry_value(path, next);
        Ok(())
    }

    /// Reads one property of `path`.
    pub fn get(&mut self, path: &Path, key: &str) -> Result<Option<String>> {
        Ok(self
            .tree
            .value_at(path)?
            .and_then(|properties| properties.get(key).cloned()))
    }

    /// Flushes pending changes.
    pub fn save(&mut self) -> Result<()> {
        self.tree.save_all()
    }
}
