//! A single persisted key/value shard.

use std::collections::BTreeMap;
use std::fs;
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};

use crate::error::Result;
use crate::path::{path_key, segment_count};
use crate::store::{SafeFileReader, SafeFileWriter};
use crate::types::{Control, Depth};

use super::{codec_error, BucketCodec, BucketEntry, BucketVisitor};

/// Compression level for shard data files.
const SHARD_COMPRESSION_LEVEL: i32 = 6;

/// One shard of the path-metadata index.
///
/// A bucket owns the entries for the paths its shard governs, keyed by the
/// normalized path string. It is created empty, populated by `load` from its
/// persisted file pair, mutated in memory, and flushed by `save`. Loading a
/// different shard through the same bucket saves dirty state first, so at
/// most one shard is resident per bucket.
pub struct Bucket<C: BucketCodec> {
    entries: BTreeMap<String, C::Value>,
    /// Directory of the currently loaded shard, if any.
    location: Option<PathBuf>,
    dirty: bool,
}

impl<C: BucketCodec> Default for Bucket<C> {
    fn default() -> Self {
        Self::new()
    }
}

impl<C: BucketCodec> Bucket<C> {
    /// Creates an empty bucket with no shard loaded.
    pub fn new() -> Self {
        Self {
            entries: BTreeMap::new(),
            location: None,
            dirty: false,
        }
    }

    /// The shard directory currently loaded, if any.
    pub fn location(&self) -> Option<&Path> {
        self.location.as_deref()
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    pub fn entry_count(&self) -> usize {
        self.entries.len()
    }

    /// Returns the value attached to `path`, if the loaded shard has one.
    pub fn entry_value(&self, path: &Path) -> Option<&C::Value> {
        self.entries.get(&path_key(path))
    }

    /// Attaches `value` to `path`; `None` removes the entry.
    pub fn set_entry_value(&mut self, path: &Path, value: Option<C::Value>) {
        let key = path_key(path);
        match value {
            Some(value) => {
                self.entries.insert(key, value);
                self.dirty = true;
            }
            None => {
                if self.entries.remove(&key).is_some() {
                    self.dirty = true;
                }
            }
        }
    }

    /// Makes `dir` the resident shard, saving the previous shard first if it
    /// was dirty. Loading the already-resident shard is a no-op.
    ///
    /// Every recoverable persistence problem (no files yet, version mismatch,
    /// unreadable or corrupt data) yields an empty shard.
    pub fn load(&mut self, dir: PathBuf) -> Result<()> {
        if self.location.as_deref() == Some(dir.as_path()) {
            return Ok(());
        }
        self.save()?;
        self.entries.clear();
        self.dirty = false;
        self.location = Some(dir.clone());

        let version_path = dir.join(C::VERSION_FILE_NAME);
        let mut version = [0u8; 1];
        match SafeFileReader::open(&version_path) {
            Err(error) if error.kind() == io::ErrorKind::NotFound => return Ok(()),
            Err(error) => {
                log::warn!(
                    "bucket version read failed for {}: {}",
                    version_path.display(),
                    error
                );
                return Ok(());
            }
            Ok(mut reader) => {
                if reader.read_exact(&mut version).is_err() {
                    log::warn!("truncated bucket version file {}", version_path.display());
                    return Ok(());
                }
            }
        }
        if version[0] != C::VERSION {
            log::debug!(
                "bucket version mismatch in {}: {} != {}, rebuilding",
                dir.display(),
                version[0],
                C::VERSION
            );
            return Ok(());
        }

        let index_path = dir.join(C::INDEX_FILE_NAME);
        let reader = match SafeFileReader::open(&index_path) {
            Ok(reader) => reader,
            Err(_) => return Ok(()),
        };
        let mut raw = Vec::new();
        if let Err(error) = zstd::Decoder::new(reader).and_then(|mut d| d.read_to_end(&mut raw)) {
            log::warn!(
                "bucket decompress failed for {}: {}",
                index_path.display(),
                error
            );
            return Ok(());
        }
        let pairs: Vec<(String, Vec<u8>)> = match postcard::from_bytes(&raw) {
            Ok(pairs) => pairs,
            Err(error) => {
                log::warn!(
                    "bucket decode failed for {}: {}",
                    index_path.display(),
                    error
                );
                return Ok(());
            }
        };
        for (key, bytes) in pairs {
            match C::decode(&bytes) {
                Ok(value) => {
                    self.entries.insert(key, value);
                }
                Err(error) => {
                    log::warn!(
                        "bucket entry decode failed for {}: {}",
                        index_path.display(),
                        error
                    );
                    self.entries.clear();
                    return Ok(());
                }
            }
        }
        log::debug!(
            "loaded bucket {} ({} entries)",
            dir.display(),
            self.entries.len()
        );
        Ok(())
    }

    /// Persists dirty entries through the safe stream pair.
    ///
    /// A shard with no entries left has its file pair removed instead. A
    /// failed save leaves the previously persisted shard contents intact.
    pub fn save(&mut self) -> Result<()> {
        if !self.dirty {
            return Ok(());
        }
        let Some(dir) = self.location.clone() else {
            return Ok(());
        };
        if self.entries.is_empty() {
            let _ = fs::remove_file(dir.join(C::INDEX_FILE_NAME));
            let _ = fs::remove_file(dir.join(C::VERSION_FILE_NAME));
            self.dirty = false;
            return Ok(());
        }
        fs::create_dir_all(&dir)?;

        let mut pairs: Vec<(&str, Vec<u8>)> = Vec::with_capacity(self.entries.len());
        for (key, value) in &self.entries {
            let mut buf = Vec::new();
            C::encode(value, &mut buf)?;
            pairs.push((key.as_str(), buf));
        }

        let writer = SafeFileWriter::new(dir.join(C::INDEX_FILE_NAME))?;
        let mut encoder = zstd::Encoder::new(writer, SHARD_COMPRESSION_LEVEL)?;
        postcard::to_io(&pairs, &mut encoder).map_err(codec_error)?;
        let writer = encoder.finish()?;
        writer.commit()?;

        let mut version_writer = SafeFileWriter::new(dir.join(C::VERSION_FILE_NAME))?;
        version_writer.write_all(&[C::VERSION])?;
        version_writer.commit()?;

        self.dirty = false;
        log::debug!(
            "saved bucket {} ({} entries)",
            dir.display(),
            self.entries.len()
        );
        Ok(())
    }

    /// Visits every entry within `depth` of `filter`, in ascending path-key
    /// order. Entries the shard physically contains but which fall outside
    /// the window are never presented.
    pub fn accept(
        &self,
        visitor: &mut dyn BucketVisitor<C::Value>,
        filter: &Path,
        depth: Depth,
    ) -> Result<Control> {
        self.accept_filtered(visitor, filter, depth, false)
    }

    pub(crate) fn accept_filtered(
        &self,
        visitor: &mut dyn BucketVisitor<C::Value>,
        filter: &Path,
        depth: Depth,
        skip_filter_itself: bool,
    ) -> Result<Control> {
        let filter_segments = segment_count(filter);
        for (key, value) in &self.entries {
            let path = Path::new(key.as_str());
            if !path.starts_with(filter) {
                continue;
            }
            let levels = segment_count(path) - filter_segments;
            if skip_filter_itself && levels == 0 {
                continue;
            }
            if !depth.admits(levels) {
                continue;
            }
            let entry = BucketEntry::new(path, value, C::occurrences(value));
            if visitor.visit(entry) == Control::Stop {
                return Ok(Control::Stop);
            }
        }
        Ok(Control::Continue)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bucket::PropertyCodec;
    use std::collections::BTreeMap;
    use tempfile::TempDir;

    fn props(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn set_and_get_round_trip_in_memory() {
        let mut bucket: Bucket<PropertyCodec> = Bucket::new();
        let path = Path::new("/proj/file.txt");
        bucket.set_entry_value(path, Some(props(&[("key", "value")])));
        assert_eq!(bucket.entry_value(path), Some(&props(&[("key", "value")])));
        bucket.set_entry_value(path, None);
        assert_eq!(bucket.entry_value(path), None);
        assert_eq!(bucket.entry_count(), 0);
    }

    #[test]
    fn save_and_reload_round_trip() {
        let temp = TempDir::new().unwrap();
        let dir = temp.path().to_path_buf();

        let mut bucket: Bucket<PropertyCodec> = Bucket::new();
        bucket.load(dir.clone()).unwrap();
        bucket.set_entry_value(Path::new("/a"), Some(props(&[("p", "1")])));
        bucket.set_entry_value(Path::new("/b"), Some(props(&[("p", "2"), ("q", "3")])));
        bucket.save().unwrap();

        let mut fresh: Bucket<PropertyCodec> = Bucket::new();
        fresh.load(dir).unwrap();
        assert_eq!(fresh.entry_count(), 2);
        assert_eq!(fresh.entry_value(Path::new("/a")), Some(&props(&[("p", "1")])));
        assert_eq!(
            fresh.entry_value(Path::new("/b")),
            Some(&props(&[("p", "2"), ("q", "3")]))
        );
    }

    #[test]
    fn corrupt_index_file_loads_as_empty() {
        let temp = TempDir::new().unwrap();
        let dir = temp.path().to_path_buf();

        let mut bucket: Bucket<PropertyCodec> = Bucket::new();
        bucket.load(dir.clone()).unwrap();
        bucket.set_entry_value(Path::new("/a"), Some(props(&[("p", "1")])));
        bucket.save().unwrap();

        fs::write(dir.join(PropertyCodec::INDEX_FILE_NAME), b"not zstd at all").unwrap();

        let mut fresh: Bucket<PropertyCodec> = Bucket::new();
        fresh.load(dir).unwrap();
        assert_eq!(fresh.entry_count(), 0);
    }

    #[test]
    fn version_mismatch_rebuilds_as_empty() {
        let temp = TempDir::new().unwrap();
        let dir = temp.path().to_path_buf();

        let mut bucket: Bucket<PropertyCodec> = Bucket::new();
        bucket.load(dir.clone()).unwrap();
        bucket.set_entry_value(Path::new("/a"), Some(props(&[("p", "1")])));
        bucket.save().unwrap();

        fs::write(dir.join(PropertyCodec::VERSION_FILE_NAME), [0xee]).unwrap();

        let mut fresh: Bucket<PropertyCodec> = Bucket::new();
        fresh.load(dir).unwrap();
        assert_eq!(fresh.entry_count(), 0);
    }

    #[test]
    fn emptied_shard_removes_its_files() {
        let temp = TempDir::new().unwrap();
        let dir = temp.path().to_path_buf();

        let mut bucket: Bucket<PropertyCodec> = Bucket::new();
        bucket.load(dir.clone()).unwrap();
        bucket.set_entry_value(Path::new("/a"), Some(props(&[("p", "1")])));
        bucket.save().unwrap();
        assert!(dir.join(PropertyCodec::INDEX_FILE_NAME).exists());

        bucket.set_entry_value(Path::new("/a"), None);
        bucket.save().unwrap();
        assert!(!dir.join(PropertyCodec::INDEX_FILE_NAME).exists());
        assert!(!dir.join(PropertyCodec::VERSION_FILE_NAME).exists());
    }

    #[test]
    fn switching_shards_saves_dirty_state() {
        let temp = TempDir::new().unwrap();
        let first = temp.path().join("first");
        let second = temp.path().join("second");

        let mut bucket: Bucket<PropertyCodec> = Bucket::new();
        bucket.load(first.clone()).unwrap();
        bucket.set_entry_value(Path::new("/x"), Some(props(&[("p", "1")])));
        // Moving to another shard must flush the first one.
        bucket.load(second).unwrap();
        assert_eq!(bucket.entry_count(), 0);

        let mut fresh: Bucket<PropertyCodec> = Bucket::new();
        fresh.load(first).unwrap();
        assert_eq!(fresh.entry_value(Path::new("/x")), Some(&props(&[("p", "1")])));
    }

    #[test]
    fn accept_respects_window_and_stop() {
        let mut bucket: Bucket<PropertyCodec> = Bucket::new();
        for key in ["/p", "/p/a", "/p/b", "/q"] {
            bucket.set_entry_value(Path::new(key), Some(props(&[("k", "v")])));
        }

        let mut seen = Vec::new();
        bucket
            .accept(
                &mut |entry: BucketEntry<'_, BTreeMap<String, String>>| {
                    seen.push(entry.path().to_path_buf());
                    Control::Continue
                },
                Path::new("/p"),
                Depth::One,
            )
            .unwrap();
        assert_eq!(
            seen,
            vec![
                PathBuf::from("/p"),
                PathBuf::from("/p/a"),
                PathBuf::from("/p/b")
            ]
        );

        let mut count = 0;
        let control = bucket
            .accept(
                &mut |_entry: BucketEntry<'_, BTreeMap<String, String>>| {
                    count += 1;
                    Control::Stop
                },
                Path::new("/"),
                Depth::Infinite,
            )
            .unwrap();
        assert_eq!(control, Control::Stop);
        assert_eq!(count, 1);
    }
}
