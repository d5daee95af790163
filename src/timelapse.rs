//! The capture, persist and pace cycle.

use std::path::PathBuf;
use std::time::Duration;

use tracing::{debug, error, info, warn};

use crate::config::TimelapseConfig;
use crate::namer::{NamingError, SequenceNamer};
use crate::shutdown::ShutdownSignal;
use crate::storage::{persist, PersistError, PersistWriter, StorageError, StorageMount};
use crate::traits::{CameraError, CaptureSource};

/// Conditions that keep the loop from ever starting.
#[derive(Debug, thiserror::Error)]
pub enum StartupError {
    /// The sensor could not be brought up.
    #[error("camera initialization failed: {0}")]
    Camera(#[from] CameraError),
    /// The archive volume could not be mounted.
    #[error("storage mount failed: {0}")]
    Mount(#[from] StorageError),
    /// The archive could not be scanned to resume numbering.
    #[error("cannot resume sequence: {0}")]
    Resume(#[from] NamingError),
}

/// What a single capture cycle did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IterationOutcome {
    /// The frame was archived.
    Written {
        /// Counter embedded in the file name.
        counter: u32,
        /// Archived file.
        path: PathBuf,
        /// Payload size.
        bytes: usize,
    },
    /// No frame was acquired.
    CaptureFailed,
    /// The counter no longer maps to a file name.
    NamingFailed,
    /// The file could not be opened; the counter is reused next time.
    OpenFailed {
        /// Path that was attempted.
        path: PathBuf,
    },
    /// The frame was lost after the file was opened; the counter is spent.
    WriteFailed {
        /// Counter that was used up.
        counter: u32,
        /// Path that was attempted.
        path: PathBuf,
    },
}

/// Running totals since the loop started.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LoopStats {
    /// Capture cycles executed.
    pub iterations: u64,
    /// Frames archived.
    pub frames_written: u64,
    /// Cycles without a usable frame.
    pub capture_failures: u64,
    /// Frames captured but not archived.
    pub persist_failures: u64,
}

/// Single-threaded driver that captures, archives and waits, forever.
///
/// One frame is in flight at a time and frames are archived in capture order.
/// The counter advances on every successful open, so a failed write never
/// causes a later frame to land on the same name.
pub struct TimelapseLoop<S, W> {
    source: S,
    writer: W,
    namer: SequenceNamer,
    interval: Duration,
    counter: u32,
    stats: LoopStats,
}

impl<S: CaptureSource, W: PersistWriter> TimelapseLoop<S, W> {
    /// Assemble a loop that will number its first frame `first_counter`.
    pub const fn new(
        source: S,
        writer: W,
        namer: SequenceNamer,
        interval: Duration,
        first_counter: u32,
    ) -> Self {
        Self {
            source,
            writer,
            namer,
            interval,
            counter: first_counter,
            stats: LoopStats {
                iterations: 0,
                frames_written: 0,
                capture_failures: 0,
                persist_failures: 0,
            },
        }
    }

    /// Mount the archive volume and pick up numbering after its newest frame.
    ///
    /// Nothing is captured or written if this fails. An archive that already
    /// holds the last nameable counter is a [`StartupError::Resume`].
    pub fn start<M: StorageMount>(
        config: &TimelapseConfig,
        mount: &mut M,
        source: S,
        writer: W,
    ) -> Result<Self, StartupError> {
        info!(mount_point = %config.storage.mount_point.display(), "mounting storage");
        let handle = mount.mount(&config.storage)?;

        let namer = SequenceNamer::new(handle.archive_dir(), &config.naming);
        let first_counter = namer.next_free_counter()?;
        if first_counter > 0 {
            info!(
                mount_point = %handle.mount_point().display(),
                counter = first_counter,
                "resuming after archived frames"
            );
        }

        Ok(Self::new(
            source,
            writer,
            namer,
            config.capture_interval,
            first_counter,
        ))
    }

    /// Counter the next archived frame will carry.
    pub const fn counter(&self) -> u32 {
        self.counter
    }

    /// Totals so far.
    pub const fn stats(&self) -> LoopStats {
        self.stats
    }

    /// Naming scheme in use.
    pub const fn namer(&self) -> &SequenceNamer {
        &self.namer
    }

    /// The capture collaborator.
    pub const fn source(&self) -> &S {
        &self.source
    }

    /// The storage collaborator.
    pub const fn writer(&self) -> &W {
        &self.writer
    }

    /// Capture one frame and try to archive it. Never fails; every problem is
    /// logged and reported in the outcome.
    pub fn run_iteration(&mut self) -> IterationOutcome {
        self.stats.iterations += 1;

        debug!("capturing image");
        let frame = match self.source.acquire_frame() {
            Ok(frame) if frame.is_empty() => {
                warn!("capture returned an empty frame");
                self.stats.capture_failures += 1;
                return IterationOutcome::CaptureFailed;
            }
            Ok(frame) => frame,
            Err(err) => {
                error!(%err, "capture failed");
                self.stats.capture_failures += 1;
                return IterationOutcome::CaptureFailed;
            }
        };
        info!(
            bytes = frame.len(),
            sequence = frame.metadata.sequence,
            "image captured"
        );

        let counter = self.counter;
        let path = match self.namer.path_for(counter) {
            Ok(path) => path,
            Err(err) => {
                error!(%err, "cannot name frame, dropping it");
                self.stats.persist_failures += 1;
                return IterationOutcome::NamingFailed;
            }
        };

        match persist(&mut self.writer, &path, frame.data()) {
            Ok(()) => {
                self.counter += 1;
                self.stats.frames_written += 1;
                info!(path = %path.display(), bytes = frame.len(), "file written");
                IterationOutcome::Written {
                    counter,
                    path,
                    bytes: frame.len(),
                }
            }
            Err(err @ PersistError::Open(_)) => {
                error!(path = %path.display(), %err, "failed to open new file");
                self.stats.persist_failures += 1;
                IterationOutcome::OpenFailed { path }
            }
            Err(err) => {
                debug_assert!(err.consumed_name());
                self.counter += 1;
                self.stats.persist_failures += 1;
                error!(path = %path.display(), %err, "frame lost");
                IterationOutcome::WriteFailed { counter, path }
            }
        }
    }

    /// Capture, archive and wait `interval`, until `shutdown` is requested.
    ///
    /// The stop request is honored between iterations and during the wait,
    /// never while a frame is being written.
    pub fn run(&mut self, shutdown: &ShutdownSignal) -> LoopStats {
        info!(
            interval_secs = self.interval.as_secs_f64(),
            next_counter = self.counter,
            archive = %self.namer.archive_dir().display(),
            "timelapse started"
        );

        while !shutdown.is_requested() {
            self.run_iteration();
            if shutdown.wait(self.interval) {
                break;
            }
        }

        info!(
            iterations = self.stats.iterations,
            frames_written = self.stats.frames_written,
            capture_failures = self.stats.capture_failures,
            persist_failures = self.stats.persist_failures,
            "timelapse stopped"
        );
        self.stats
    }
}
