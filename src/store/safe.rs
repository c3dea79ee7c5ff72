//! Crash-safe replace-in-place file streams.
//!
//! A writer never touches its target directly: all bytes go to a sibling
//! temp file which is renamed over the target on `commit`. Abandoning the
//! writer (or crashing) before commit leaves the target's previous contents
//! fully intact and the temp file on disk for recovery. The matching reader
//! falls back to the temp file when the target is missing, so a crash
//! mid-write never loses the previous good contents.

use std::ffi::OsString;
use std::fs::{self, File};
use std::io::{self, BufReader, BufWriter, Read, Write};
use std::path::{Path, PathBuf};

/// Suffix appended to the target name for the default temp file.
const TEMP_SUFFIX: &str = ".bak";

fn default_temp_path(target: &Path) -> PathBuf {
    let mut name = OsString::from(target.as_os_str());
    name.push(TEMP_SUFFIX);
    PathBuf::from(name)
}

/// Output stream that atomically replaces its target on `commit`.
pub struct SafeFileWriter {
    target: PathBuf,
    temp: PathBuf,
    output: BufWriter<File>,
}

impl SafeFileWriter {
    /// Opens a safe writer for `target` using the default temp path
    /// (`<target>.bak` in the same directory).
    pub fn new(target: impl Into<PathBuf>) -> io::Result<Self> {
        let target = target.into();
        let temp = default_temp_path(&target);
        Self::with_temp(target, temp)
    }

    /// Opens a safe writer with a caller-supplied temp path.
    ///
    /// The temp path must be on the same filesystem as the target for the
    /// final rename to be atomic.
    pub fn with_temp(target: impl Into<PathBuf>, temp: impl Into<PathBuf>) -> io::Result<Self> {
        let target = target.into();
        let temp = temp.into();
        if !target.exists() && temp.exists() {
            // A leftover temp with no target means a previous write was
            // interrupted after the old target was replaced; the temp is the
            // only good copy, so restore it before starting over.
            rename_replacing(&temp, &target)?;
        }
        let output = BufWriter::new(File::create(&temp)?);
        Ok(Self {
            target,
            temp,
            output,
        })
    }

    /// The temp file all writes are directed to.
    pub fn temp_path(&self) -> &Path {
        &self.temp
    }

    /// The target file that will be replaced on commit.
    pub fn target_path(&self) -> &Path {
        &self.target
    }

    /// Finalizes the write, replacing the target with the temp contents.
    ///
    /// Readers observe either the complete old contents or the complete new
    /// contents, never a partial prefix. On error the target is left as it
    /// was and the temp file remains on disk.
    pub fn commit(mut self) -> io::Result<()> {
        self.output.flush()?;
        let file = self.output.into_inner().map_err(|error| error.into_error())?;
        drop(file);
        rename_replacing(&self.temp, &self.target)
    }
}

impl Write for SafeFileWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.output.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.output.flush()
    }
}

/// Renames `from` over `to`, with a delete-then-rename fallback for
/// filesystems that refuse to clobber an existing destination.
fn rename_replacing(from: &Path, to: &Path) -> io::Result<()> {
    match fs::rename(from, to) {
        Ok(()) => Ok(()),
        Err(_) => {
            if to.exists() {
                fs::remove_file(to)?;
            }
            fs::rename(from, to)
        }
    }
}

/// Input stream matching [`SafeFileWriter`]'s protocol.
///
/// Opens the target, falling back to the temp/backup file when the target is
/// missing. Fails with `NotFound` only when both are absent.
#[derive(Debug)]
pub struct SafeFileReader {
    input: BufReader<File>,
}

impl SafeFileReader {
    /// Opens `target` with the default backup path (`<target>.bak`).
    pub fn open(target: impl AsRef<Path>) -> io::Result<Self> {
        let target = target.as_ref();
        let backup = default_temp_path(target);
        Self::with_backup(target, backup)
    }

    /// Opens `target` with a caller-supplied backup path.
    pub fn with_backup(
        target: impl AsRef<Path>,
        backup: impl AsRef<Path>,
    ) -> io::Result<Self> {
        let file = match File::open(target.as_ref()) {
            Ok(file) => file,
            Err(error) if error.kind() == io::ErrorKind::NotFound => {
                File::open(backup.as_ref())?
            }
            Err(error) => return Err(error),
        };
        Ok(Self {
            input: BufReader::new(file),
        })
    }
}

impl Read for SafeFileReader {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.input.read(buf)
    }
}
