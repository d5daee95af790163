//! Sequential, collision-free file naming for archived frames.

use std::io;
use std::path::{Path, PathBuf};

use crate::config::NamingConfig;

/// Width of the zero-padded counter field.
pub const COUNTER_DIGITS: usize = 8;

/// Largest counter that fits the fixed-width field.
pub const MAX_COUNTER: u32 = 99_999_999;

/// Error type for naming and archive scanning.
#[derive(Debug, thiserror::Error)]
pub enum NamingError {
    /// Counter no longer fits the fixed-width field.
    #[error("sequence counter {0} exceeds the 8-digit file name field")]
    CounterOverflow(u32),
    /// Archive directory could not be listed.
    #[error("failed to scan archive {}: {source}", .path.display())]
    Scan {
        /// Directory being scanned.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: io::Error,
    },
}

/// Maps a sequence counter to `{archive_dir}/{prefix}{counter:08}.{extension}`.
///
/// Naming is a pure function of the counter; the counter itself lives in the
/// capture loop.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SequenceNamer {
    archive_dir: PathBuf,
    prefix: String,
    extension: String,
}

impl SequenceNamer {
    /// Create a namer for files under `archive_dir`.
    pub fn new<P: Into<PathBuf>>(archive_dir: P, naming: &NamingConfig) -> Self {
        Self {
            archive_dir: archive_dir.into(),
            prefix: naming.prefix.clone(),
            extension: naming.extension.clone(),
        }
    }

    /// Directory all names resolve into.
    pub fn archive_dir(&self) -> &Path {
        &self.archive_dir
    }

    /// Bare file name for `counter`.
    pub fn file_name(&self, counter: u32) -> Result<String, NamingError> {
        if counter > MAX_COUNTER {
            return Err(NamingError::CounterOverflow(counter));
        }
        Ok(format!(
            "{}{counter:0width$}.{}",
            self.prefix,
            self.extension,
            width = COUNTER_DIGITS
        ))
    }

    /// Full path for `counter`.
    pub fn path_for(&self, counter: u32) -> Result<PathBuf, NamingError> {
        Ok(self.archive_dir.join(self.file_name(counter)?))
    }

    /// Recover the counter from a file name produced by [`Self::file_name`].
    ///
    /// Anything else, including partial files, yields `None`.
    pub fn parse_counter(&self, file_name: &str) -> Option<u32> {
        let digits = file_name
            .strip_prefix(self.prefix.as_str())?
            .strip_suffix(self.extension.as_str())?
            .strip_suffix('.')?;

        if digits.len() != COUNTER_DIGITS || !digits.bytes().all(|b| b.is_ascii_digit()) {
            return None;
        }
        digits.parse().ok()
    }

    /// Counters whose names are already taken in the archive, ascending.
    ///
    /// Any entry with a matching name counts, whether it is a file, a
    /// directory or a symlink, because the writer refuses all of them.
    /// A missing archive directory is an empty archive.
    pub fn archived_counters(&self) -> Result<Vec<u32>, NamingError> {
        let scan_err = |source: io::Error| NamingError::Scan {
            path: self.archive_dir.clone(),
            source,
        };

        let entries = match std::fs::read_dir(&self.archive_dir) {
            Ok(entries) => entries,
            Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(err) => return Err(scan_err(err)),
        };

        let mut counters = Vec::new();
        for entry in entries {
            let name = entry.map_err(scan_err)?.file_name();
            if let Some(counter) = name.to_str().and_then(|n| self.parse_counter(n)) {
                counters.push(counter);
            }
        }
        counters.sort_unstable();
        Ok(counters)
    }

    /// First counter that cannot collide with anything already archived.
    ///
    /// Fails with [`NamingError::CounterOverflow`] once the archive holds
    /// [`MAX_COUNTER`], since no later frame could be named.
    pub fn next_free_counter(&self) -> Result<u32, NamingError> {
        let next = self.archived_counters()?.last().map_or(0, |highest| highest + 1);
        if next > MAX_COUNTER {
            return Err(NamingError::CounterOverflow(next));
        }
        Ok(next)
    }
}
