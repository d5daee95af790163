//! Removable media: mounting the archive volume and writing frames to it.

use std::ffi::OsString;
use std::fs::{self, DirBuilder, File, OpenOptions};
use std::io::{self, Write};
use std::os::unix::fs::{DirBuilderExt, MetadataExt};
use std::path::{Path, PathBuf};

use sysinfo::Disks;
use tracing::{debug, info, warn};

use crate::config::StorageConfig;

/// Suffix of a file that is still being written.
pub const PARTIAL_SUFFIX: &str = ".part";

const PROBE_FILE_NAME: &str = ".write-probe";

/// Error type for storage operations.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    /// The mount point cannot be inspected.
    #[error("mount point {} is unavailable: {source}", .path.display())]
    MountUnavailable {
        /// Configured mount point.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: io::Error,
    },
    /// The mount point exists but is not a directory.
    #[error("mount point {} is not a directory", .0.display())]
    NotADirectory(PathBuf),
    /// Nothing is mounted at the mount point.
    #[error("no volume is mounted at {}", .0.display())]
    NotMounted(PathBuf),
    /// The archive directory could not be created or listed.
    #[error("archive directory {} is unusable: {source}", .path.display())]
    ArchiveDir {
        /// Archive directory.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: io::Error,
    },
    /// The volume rejected a test write.
    #[error("volume at {} is not writable: {source}", .path.display())]
    ReadOnly {
        /// Archive directory.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: io::Error,
    },
    /// The target file already exists.
    #[error("refusing to overwrite {}", .0.display())]
    AlreadyExists(PathBuf),
    /// The file could not be opened for writing.
    #[error("failed to open {}: {source}", .path.display())]
    Open {
        /// Target path.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: io::Error,
    },
    /// The payload could not be written in full.
    #[error("failed to write {}: {source}", .path.display())]
    Write {
        /// Target path.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: io::Error,
    },
    /// The file could not be flushed or committed.
    #[error("failed to close {}: {source}", .path.display())]
    Close {
        /// Target path.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: io::Error,
    },
}

/// A mounted, writable volume with its archive directory in place.
///
/// Created once at startup and kept for the life of the process.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MountHandle {
    mount_point: PathBuf,
    archive_dir: PathBuf,
}

impl MountHandle {
    /// Describe an already mounted volume.
    pub const fn new(mount_point: PathBuf, archive_dir: PathBuf) -> Self {
        Self {
            mount_point,
            archive_dir,
        }
    }

    /// Root of the volume.
    pub fn mount_point(&self) -> &Path {
        &self.mount_point
    }

    /// Directory frames are archived into.
    pub fn archive_dir(&self) -> &Path {
        &self.archive_dir
    }
}

/// Makes removable media available as a writable file namespace.
pub trait StorageMount {
    /// Mount the volume described by `config`.
    fn mount(&mut self, config: &StorageConfig) -> Result<MountHandle, StorageError>;
}

/// Byte sink for archived frames.
///
/// Any failure means the frame is lost; none of them is fatal to the caller.
pub trait PersistWriter {
    /// An open, not yet committed file.
    type Handle;

    /// Open `path` for exclusive writing.
    fn open_for_write(&mut self, path: &Path) -> Result<Self::Handle, StorageError>;

    /// Write the whole of `bytes`.
    fn write_all(&mut self, handle: &mut Self::Handle, bytes: &[u8]) -> Result<(), StorageError>;

    /// Flush and commit the file under its final name.
    fn close(&mut self, handle: Self::Handle) -> Result<(), StorageError>;

    /// Throw away a handle whose write failed.
    fn abort(&mut self, handle: Self::Handle);
}

/// Which step of [`persist`] failed.
#[derive(Debug, thiserror::Error)]
pub enum PersistError {
    /// Nothing was created.
    #[error("open failed: {0}")]
    Open(#[source] StorageError),
    /// The file was created but the payload did not make it.
    #[error("write failed: {0}")]
    Write(#[source] StorageError),
    /// The payload was written but could not be committed.
    #[error("close failed: {0}")]
    Close(#[source] StorageError),
}

impl PersistError {
    /// Whether the failed attempt used up its file name.
    pub const fn consumed_name(&self) -> bool {
        !matches!(self, Self::Open(_))
    }
}

/// Open, write and close `path` in one go.
pub fn persist<W: PersistWriter>(
    writer: &mut W,
    path: &Path,
    bytes: &[u8],
) -> Result<(), PersistError> {
    let mut handle = writer.open_for_write(path).map_err(PersistError::Open)?;
    if let Err(err) = writer.write_all(&mut handle, bytes) {
        writer.abort(handle);
        return Err(PersistError::Write(err));
    }
    writer.close(handle).map_err(PersistError::Close)
}

/// Volume backed by a directory the OS has already mounted.
#[derive(Debug, Default)]
pub struct FsVolume;

impl StorageMount for FsVolume {
    fn mount(&mut self, config: &StorageConfig) -> Result<MountHandle, StorageError> {
        let root = &config.mount_point;
        let meta = fs::metadata(root).map_err(|source| StorageError::MountUnavailable {
            path: root.clone(),
            source,
        })?;
        if !meta.is_dir() {
            return Err(StorageError::NotADirectory(root.clone()));
        }
        if config.require_mount_point && !is_mount_point(root, &meta) {
            return Err(StorageError::NotMounted(root.clone()));
        }

        let archive_dir = root.join(&config.archive_dir_name);
        DirBuilder::new()
            .recursive(true)
            .mode(0o775)
            .create(&archive_dir)
            .map_err(|source| StorageError::ArchiveDir {
                path: archive_dir.clone(),
                source,
            })?;

        probe_writable(&archive_dir)?;

        let removed = remove_partials(&archive_dir)?;
        if removed > 0 {
            warn!(
                count = removed,
                dir = %archive_dir.display(),
                "removed partial files left by an interrupted write"
            );
        }

        match volume_space(root) {
            Some(space) => info!(
                mount_point = %root.display(),
                device = meta.dev(),
                archive = %archive_dir.display(),
                total_mib = space.total_bytes / MIB,
                free_mib = space.available_bytes / MIB,
                "storage mounted"
            ),
            None => info!(
                mount_point = %root.display(),
                device = meta.dev(),
                archive = %archive_dir.display(),
                "storage mounted"
            ),
        }
        Ok(MountHandle::new(root.clone(), archive_dir))
    }
}

/// A root directory on a different device than its parent is a mount.
fn is_mount_point(root: &Path, meta: &fs::Metadata) -> bool {
    let Some(parent) = root.parent() else {
        return true;
    };
    match fs::metadata(parent) {
        Ok(parent_meta) => parent_meta.dev() != meta.dev(),
        Err(err) => {
            debug!(path = %parent.display(), %err, "cannot inspect mount point parent");
            false
        }
    }
}

const MIB: u64 = 1024 * 1024;

/// Size of the filesystem a path lives on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VolumeSpace {
    /// Capacity in bytes.
    pub total_bytes: u64,
    /// Bytes still available for new files.
    pub available_bytes: u64,
}

/// Capacity of the mounted filesystem holding `path`, if the OS lists it.
pub fn volume_space(path: &Path) -> Option<VolumeSpace> {
    let path = fs::canonicalize(path).unwrap_or_else(|_| path.to_path_buf());
    let disks = Disks::new_with_refreshed_list();
    containing_volume(
        &path,
        disks.list().iter().map(|disk| {
            (
                disk.mount_point(),
                VolumeSpace {
                    total_bytes: disk.total_space(),
                    available_bytes: disk.available_space(),
                },
            )
        }),
    )
}

/// The volume with the deepest mount point that contains `path`.
fn containing_volume<'a>(
    path: &Path,
    volumes: impl IntoIterator<Item = (&'a Path, VolumeSpace)>,
) -> Option<VolumeSpace> {
    volumes
        .into_iter()
        .filter(|(mount_point, _)| path.starts_with(mount_point))
        .max_by_key(|(mount_point, _)| mount_point.components().count())
        .map(|(_, space)| space)
}

fn probe_writable(dir: &Path) -> Result<(), StorageError> {
    let probe = dir.join(PROBE_FILE_NAME);
    let read_only = |source: io::Error| StorageError::ReadOnly {
        path: dir.to_path_buf(),
        source,
    };

    let mut file = File::create(&probe).map_err(read_only)?;
    file.write_all(b"probe").map_err(read_only)?;
    drop(file);
    fs::remove_file(&probe).map_err(read_only)
}

fn remove_partials(dir: &Path) -> Result<usize, StorageError> {
    let archive_err = |source: io::Error| StorageError::ArchiveDir {
        path: dir.to_path_buf(),
        source,
    };

    let mut removed = 0;
    for entry in fs::read_dir(dir).map_err(archive_err)? {
        let path = entry.map_err(archive_err)?.path();
        let is_partial = path
            .file_name()
            .and_then(|name| name.to_str())
            .is_some_and(|name| name.ends_with(PARTIAL_SUFFIX));
        if !is_partial {
            continue;
        }
        match fs::remove_file(&path) {
            Ok(()) => removed += 1,
            Err(err) => warn!(path = %path.display(), %err, "failed to remove partial file"),
        }
    }
    Ok(removed)
}

/// Path a frame is written to before it is committed under `target`.
pub fn partial_path(target: &Path) -> PathBuf {
    let mut name = OsString::from(target.as_os_str());
    name.push(PARTIAL_SUFFIX);
    PathBuf::from(name)
}

/// Open file being written by [`FsWriter`].
#[derive(Debug)]
pub struct PartialFile {
    file: File,
    partial: PathBuf,
    target: PathBuf,
}

/// Writes each frame to a `.part` file and renames it into place once synced.
///
/// A crash mid-write leaves a `.part` file behind rather than a truncated
/// image under the final name.
#[derive(Debug, Default)]
pub struct FsWriter;

impl FsWriter {
    fn discard(partial: &Path) {
        if let Err(err) = fs::remove_file(partial) {
            warn!(path = %partial.display(), %err, "failed to remove partial file");
        }
    }
}

impl PersistWriter for FsWriter {
    type Handle = PartialFile;

    fn open_for_write(&mut self, path: &Path) -> Result<PartialFile, StorageError> {
        let open_err = |source: io::Error| StorageError::Open {
            path: path.to_path_buf(),
            source,
        };

        if path.try_exists().map_err(open_err)? {
            return Err(StorageError::AlreadyExists(path.to_path_buf()));
        }

        let partial = partial_path(path);
        let file = OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&partial)
            .map_err(open_err)?;

        Ok(PartialFile {
            file,
            partial,
            target: path.to_path_buf(),
        })
    }

    fn write_all(&mut self, handle: &mut PartialFile, bytes: &[u8]) -> Result<(), StorageError> {
        handle
            .file
            .write_all(bytes)
            .map_err(|source| StorageError::Write {
                path: handle.target.clone(),
                source,
            })
    }

    fn close(&mut self, handle: PartialFile) -> Result<(), StorageError> {
        let PartialFile {
            file,
            partial,
            target,
        } = handle;

        if let Err(source) = file.sync_all() {
            drop(file);
            Self::discard(&partial);
            return Err(StorageError::Close {
                path: target,
                source,
            });
        }
        drop(file);

        if let Err(source) = fs::rename(&partial, &target) {
            Self::discard(&partial);
            return Err(StorageError::Close {
                path: target,
                source,
            });
        }
        Ok(())
    }

    fn abort(&mut self, handle: PartialFile) {
        let PartialFile { file, partial, .. } = handle;
        drop(file);
        Self::discard(&partial);
    }
}
