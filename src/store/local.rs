//! Local-disk file store over `std::fs`.

use std::fs::{self, File, OpenOptions};
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};
use std::time::UNIX_EPOCH;

use crate::error::{LocalStoreError, Result};

use super::{FileAttributes, FileInfo, FileStore, StoreFlags};

/// A file store backed by a local filesystem path.
#[derive(Debug, Clone)]
pub struct LocalStore {
    path: PathBuf,
}

impl LocalStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn entry_name(path: &Path) -> String {
        path.file_name()
            .map(|name| name.to_string_lossy().into_owned())
            // Root paths like "/" have no file name
            .unwrap_or_else(|| path.to_string_lossy().into_owned())
    }

    fn info_for(path: &Path) -> FileInfo {
        let name = Self::entry_name(path);
        let Ok(lstat) = fs::symlink_metadata(path) else {
            return FileInfo::missing(name);
        };
        let symlink = lstat.file_type().is_symlink();
        let link_target = if symlink { fs::read_link(path).ok() } else { None };

        // Describe the link target when the link resolves; a dangling link
        // still exists but carries zeroed target fields.
        let target_meta = if symlink { fs::metadata(path).ok() } else { Some(lstat) };
        let (directory, length, last_modified, readonly) = match &target_meta {
            Some(meta) => (
                meta.is_dir(),
                if meta.is_dir() { 0 } else { meta.len() },
                meta.modified()
                    .ok()
                    .and_then(|time| time.duration_since(UNIX_EPOCH).ok())
                    .map(|age| age.as_secs())
                    .unwrap_or(0),
                meta.permissions().readonly(),
            ),
            None => (false, 0, 0, false),
        };

        let mut attributes = FileAttributes::empty();
        if readonly {
            attributes |= FileAttributes::READ_ONLY;
        }
        if name.starts_with('.') {
            attributes |= FileAttributes::HIDDEN;
        }
        #[cfg(unix)]
        if let Some(meta) = &target_meta {
            use std::os::unix::fs::PermissionsExt;
            if !meta.is_dir() && meta.permissions().mode() & 0o111 != 0 {
                attributes |= FileAttributes::EXECUTABLE;
            }
        }

        FileInfo {
            name,
            exists: true,
            directory,
            symlink,
            link_target,
            length,
            last_modified,
            attributes,
        }
    }

    fn copy_into(&self, destination: &dyn FileStore, flags: StoreFlags) -> Result<()> {
        let info = self.fetch_info();
        if !info.exists {
            return Err(LocalStoreError::PathNotFound(self.path.clone()));
        }
        let destination_info = destination.fetch_info();
        if destination_info.exists && !flags.contains(StoreFlags::OVERWRITE) {
            let at = destination
                .native_path()
                .map(Path::to_path_buf)
                .unwrap_or_else(|| PathBuf::from(destination_info.name));
            return Err(LocalStoreError::AlreadyExists(at));
        }
        if info.directory {
            destination.mkdir(StoreFlags::SHALLOW | (flags & StoreFlags::OVERWRITE))?;
            if flags.contains(StoreFlags::SHALLOW) {
                return Ok(());
            }
            for name in self.child_names()? {
                let child = LocalStore::new(self.path.join(&name));
                child.copy_into(destination.child(&name).as_ref(), flags)?;
            }
            Ok(())
        } else {
            let mut input = self.open_input()?;
            let mut output = destination.open_output(StoreFlags::empty())?;
            io::copy(&mut input, &mut output)?;
            output.flush()?;
            Ok(())
        }
    }
}

impl FileStore for LocalStore {
    fn fetch_info(&self) -> FileInfo {
        Self::info_for(&self.path)
    }

    fn child_names(&self) -> Result<Vec<String>> {
        let mut names: Vec<String> = fs::read_dir(&self.path)?
            .filter_map(|entry| entry.ok())
            .map(|entry| entry.file_name().to_string_lossy().into_owned())
            .collect();
        names.sort_unstable();
        Ok(names)
    }

    fn child_infos(&self) -> Result<Vec<FileInfo>> {
        let mut infos: Vec<FileInfo> = fs::read_dir(&self.path)?
            .filter_map(|entry| entry.ok())
            .map(|entry| Self::info_for(&entry.path()))
            // An entry that vanished between listing and stat is no longer
            // present; skip it rather than failing the walk.
            .filter(|info| info.exists)
            .collect();
        infos.sort_unstable_by(|a, b| a.name.cmp(&b.name));
        Ok(infos)
    }

    fn child(&self, name: &str) -> Box<dyn FileStore> {
        Box::new(LocalStore::new(self.path.join(name)))
    }

    fn duplicate(&self) -> Box<dyn FileStore> {
        Box::new(self.clone())
    }

    fn parent(&self) -> Option<Box<dyn FileStore>> {
        self.path
            .parent()
            .map(|parent| Box::new(LocalStore::new(parent)) as Box<dyn FileStore>)
    }

    fn mkdir(&self, flags: StoreFlags) -> Result<()> {
        let info = self.fetch_info();
        if info.exists {
            if info.directory {
                return Ok(());
            }
            return Err(LocalStoreError::WrongResourceType(self.path.clone()));
        }
        if flags.contains(StoreFlags::SHALLOW) {
            fs::create_dir(&self.path).map_err(|error| {
                if error.kind() == io::ErrorKind::NotFound {
                    LocalStoreError::PathNotFound(
                        self.path.parent().unwrap_or(&self.path).to_path_buf(),
                    )
                } else {
                    error.into()
                }
            })
        } else {
            fs::create_dir_all(&self.path).map_err(Into::into)
        }
    }

    fn delete(&self) -> Result<()> {
        let Ok(lstat) = fs::symlink_metadata(&self.path) else {
            return Err(LocalStoreError::PathNotFound(self.path.clone()));
        };
        if lstat.is_dir() {
            fs::remove_dir_all(&self.path)?;
        } else {
            // Files and symlinks, including links to directories
            fs::remove_file(&self.path)?;
        }
        Ok(())
    }

    fn copy(&self, destination: &dyn FileStore, flags: StoreFlags) -> Result<()> {
        self.copy_into(destination, flags)
    }

    fn move_to(&self, destination: &dyn FileStore, flags: StoreFlags) -> Result<()> {
        if !self.fetch_info().exists {
            return Err(LocalStoreError::PathNotFound(self.path.clone()));
        }
        let Some(destination_path) = destination.native_path() else {
            // No native rename is possible onto a foreign store
            self.copy(destination, flags)?;
            return self.delete();
        };
        if destination.fetch_info().exists {
            if !flags.contains(StoreFlags::OVERWRITE) {
                return Err(LocalStoreError::AlreadyExists(destination_path.to_path_buf()));
            }
            destination.delete()?;
        }
        fs::rename(&self.path, destination_path).map_err(|error| {
            if error.kind() == io::ErrorKind::CrossesDevices {
                LocalStoreError::CrossDevice {
                    source_path: self.path.clone(),
                    destination: destination_path.to_path_buf(),
                }
            } else {
                error.into()
            }
        })
    }

    fn open_input(&self) -> Result<Box<dyn Read>> {
        let file = File::open(&self.path).map_err(|error| {
            if error.kind() == io::ErrorKind::NotFound {
                LocalStoreError::PathNotFound(self.path.clone())
            } else {
                error.into()
            }
        })?;
        Ok(Box::new(file))
    }

    fn open_output(&self, flags: StoreFlags) -> Result<Box<dyn Write>> {
        let mut options = OpenOptions::new();
        options.write(true).create(true);
        if flags.contains(StoreFlags::APPEND) {
            options.append(true);
        } else {
            options.truncate(true);
        }
        Ok(Box::new(options.open(&self.path)?))
    }

    fn canonical_path(&self) -> Result<PathBuf> {
        Ok(fs::canonicalize(&self.path)?)
    }

    fn case_sensitive(&self) -> bool {
        !cfg!(any(windows, target_os = "macos"))
    }

    fn native_path(&self) -> Option<&Path> {
        Some(&self.path)
    }
}
