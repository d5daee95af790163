//! Mock collaborators for testing without hardware or media.

use crate::config::StorageConfig;
use crate::shutdown::ShutdownSignal;
use crate::storage::{MountHandle, PersistWriter, StorageError, StorageMount};
use crate::traits::{
    CameraDevice, CameraError, CaptureSource, DeviceCapabilities, Format, FourCC, Frame,
    FrameMetadata, Result,
};
use std::collections::{BTreeMap, VecDeque};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

/// Mock device for testing without hardware.
pub struct MockDevice {
    capabilities: DeviceCapabilities,
    format: Format,
    forced_fourcc: Option<FourCC>,
    frame_count: u32,
}

impl Default for MockDevice {
    fn default() -> Self {
        Self::new()
    }
}

impl MockDevice {
    /// Create a new mock device with default settings.
    #[must_use]
    pub fn new() -> Self {
        Self {
            capabilities: DeviceCapabilities {
                driver: "mock".to_owned(),
                card: "Mock Camera".to_owned(),
                bus_info: "mock:0".to_owned(),
                can_capture: true,
                can_stream: true,
            },
            format: Format {
                size: 640 * 480,
                ..Format::new(640, 480, FourCC::MJPG)
            },
            forced_fourcc: None,
            frame_count: 0,
        }
    }

    /// Make the driver ignore the requested pixel format.
    #[must_use]
    pub fn with_forced_fourcc(mut self, fourcc: FourCC) -> Self {
        self.forced_fourcc = Some(fourcc);
        self
    }

    /// Set the capabilities for this mock device.
    #[must_use]
    pub fn with_capabilities(mut self, capabilities: DeviceCapabilities) -> Self {
        self.capabilities = capabilities;
        self
    }
}

impl CameraDevice for MockDevice {
    type Stream<'a> = MockStream<'a>;

    fn capabilities(&self) -> &DeviceCapabilities {
        &self.capabilities
    }

    fn format(&self) -> Result<Format> {
        Ok(self.format.clone())
    }

    fn set_format(&mut self, format: &Format) -> Result<Format> {
        self.format = Format {
            fourcc: self.forced_fourcc.unwrap_or(format.fourcc),
            size: format.width * format.height,
            ..format.clone()
        };
        Ok(self.format.clone())
    }

    fn create_stream(&mut self, _buffer_count: u32) -> Result<Self::Stream<'_>> {
        Ok(MockStream { device: self })
    }
}

/// Mock capture stream yielding small JPEG-framed payloads.
pub struct MockStream<'a> {
    device: &'a mut MockDevice,
}

impl CaptureSource for MockStream<'_> {
    fn acquire_frame(&mut self) -> Result<Frame> {
        let seq = self.device.frame_count;
        self.device.frame_count += 1;

        Ok(jpeg_frame(64, seq))
    }
}

/// A frame of `len` bytes starting with SOI and, when long enough, ending with EOI.
pub fn jpeg_frame(len: usize, sequence: u32) -> Frame {
    let mut data = vec![0u8; len];
    if len >= 4 {
        if let Some(soi) = data.get_mut(..2) {
            soi.copy_from_slice(&[0xFF, 0xD8]);
        }
        if let Some(eoi) = data.get_mut(len - 2..) {
            eoi.copy_from_slice(&[0xFF, 0xD9]);
        }
    }
    Frame::new(
        data,
        FrameMetadata {
            sequence,
            timestamp: Duration::from_secs(u64::from(sequence) * 60),
        },
    )
}

/// Capture source replaying a fixed script.
///
/// `Some(len)` yields a frame of `len` bytes (zero means an empty buffer),
/// `None` yields a stream error. Once drained every call errors.
#[derive(Default)]
pub struct MockSource {
    script: VecDeque<Option<usize>>,
    calls: u32,
    stop_when_drained: Option<Arc<ShutdownSignal>>,
}

impl MockSource {
    /// An empty script.
    pub const fn new() -> Self {
        Self {
            script: VecDeque::new(),
            calls: 0,
            stop_when_drained: None,
        }
    }

    /// One frame per entry; zero-sized entries are empty frames.
    pub fn from_sizes(sizes: &[usize]) -> Self {
        sizes
            .iter()
            .fold(Self::new(), |source, &len| source.push_frame(len))
    }

    /// Append a frame of `len` bytes.
    #[must_use]
    pub fn push_frame(mut self, len: usize) -> Self {
        self.script.push_back(Some(len));
        self
    }

    /// Append a capture error.
    #[must_use]
    pub fn push_error(mut self) -> Self {
        self.script.push_back(None);
        self
    }

    /// Request shutdown when the last scripted entry is handed out.
    #[must_use]
    pub fn stop_when_drained(mut self, shutdown: Arc<ShutdownSignal>) -> Self {
        self.stop_when_drained = Some(shutdown);
        self
    }

    /// Number of acquisitions so far.
    pub const fn calls(&self) -> u32 {
        self.calls
    }
}

impl CaptureSource for MockSource {
    fn acquire_frame(&mut self) -> Result<Frame> {
        let seq = self.calls;
        self.calls += 1;

        let next = self.script.pop_front();
        if self.script.is_empty() {
            if let Some(shutdown) = &self.stop_when_drained {
                shutdown.request();
            }
        }

        match next {
            Some(Some(len)) => Ok(jpeg_frame(len, seq)),
            Some(None) => Err(CameraError::StreamError("scripted failure".to_owned())),
            None => Err(CameraError::StreamError("script exhausted".to_owned())),
        }
    }
}

/// Handle for [`MockWriter`].
#[derive(Debug)]
pub struct MockHandle {
    path: PathBuf,
    data: Vec<u8>,
}

fn injected(kind: &str) -> io::Error {
    io::Error::other(format!("injected {kind} failure"))
}

/// In-memory writer with injectable failures.
#[derive(Debug, Default)]
pub struct MockWriter {
    files: BTreeMap<PathBuf, Vec<u8>>,
    opened: Vec<PathBuf>,
    aborted: Vec<PathBuf>,
    open_failures: u32,
    write_failures: u32,
    close_failures: u32,
}

impl MockWriter {
    /// A writer that never fails.
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail the next `count` opens.
    #[must_use]
    pub fn fail_next_opens(mut self, count: u32) -> Self {
        self.open_failures = count;
        self
    }

    /// Fail the next `count` writes.
    #[must_use]
    pub fn fail_next_writes(mut self, count: u32) -> Self {
        self.write_failures = count;
        self
    }

    /// Fail the next `count` closes.
    #[must_use]
    pub fn fail_next_closes(mut self, count: u32) -> Self {
        self.close_failures = count;
        self
    }

    /// Committed files.
    pub const fn files(&self) -> &BTreeMap<PathBuf, Vec<u8>> {
        &self.files
    }

    /// Every path an open was attempted on.
    pub fn opened(&self) -> &[PathBuf] {
        &self.opened
    }

    /// Paths whose handle was aborted.
    pub fn aborted(&self) -> &[PathBuf] {
        &self.aborted
    }
}

impl PersistWriter for MockWriter {
    type Handle = MockHandle;

    fn open_for_write(&mut self, path: &Path) -> std::result::Result<MockHandle, StorageError> {
        self.opened.push(path.to_path_buf());
        if self.open_failures > 0 {
            self.open_failures -= 1;
            return Err(StorageError::Open {
                path: path.to_path_buf(),
                source: injected("open"),
            });
        }
        if self.files.contains_key(path) {
            return Err(StorageError::AlreadyExists(path.to_path_buf()));
        }
        Ok(MockHandle {
            path: path.to_path_buf(),
            data: Vec::new(),
        })
    }

    fn write_all(
        &mut self,
        handle: &mut MockHandle,
        bytes: &[u8],
    ) -> std::result::Result<(), StorageError> {
        if self.write_failures > 0 {
            self.write_failures -= 1;
            return Err(StorageError::Write {
                path: handle.path.clone(),
                source: injected("write"),
            });
        }
        handle.data.extend_from_slice(bytes);
        Ok(())
    }

    fn close(&mut self, handle: MockHandle) -> std::result::Result<(), StorageError> {
        if self.close_failures > 0 {
            self.close_failures -= 1;
            return Err(StorageError::Close {
                path: handle.path,
                source: injected("close"),
            });
        }
        self.files.insert(handle.path, handle.data);
        Ok(())
    }

    fn abort(&mut self, handle: MockHandle) {
        self.aborted.push(handle.path);
    }
}

/// Mount that either hands back a fixed handle or fails.
pub struct MockMount {
    handle: Option<MountHandle>,
    attempts: u32,
}

impl MockMount {
    /// Always mounts as `handle`.
    pub const fn new(handle: MountHandle) -> Self {
        Self {
            handle: Some(handle),
            attempts: 0,
        }
    }

    /// Always fails, as if no card were inserted.
    pub const fn failing() -> Self {
        Self {
            handle: None,
            attempts: 0,
        }
    }

    /// Number of mount attempts.
    pub const fn attempts(&self) -> u32 {
        self.attempts
    }
}

impl StorageMount for MockMount {
    fn mount(&mut self, config: &StorageConfig) -> std::result::Result<MountHandle, StorageError> {
        self.attempts += 1;
        self.handle
            .clone()
            .ok_or_else(|| StorageError::MountUnavailable {
                path: config.mount_point.clone(),
                source: io::Error::new(io::ErrorKind::NotFound, "no card"),
            })
    }
}

/// Fresh, empty directory private to one test.
pub fn scratch_dir(name: &str) -> PathBuf {
    let dir = std::env::temp_dir().join(format!("pi-timelapse-{}-{name}", std::process::id()));
    if dir.exists() {
        std::fs::remove_dir_all(&dir).expect("failed to clear scratch dir");
    }
    std::fs::create_dir_all(&dir).expect("failed to create scratch dir");
    dir
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mock_device_creation() {
        let device = MockDevice::new();
        assert_eq!(device.capabilities().driver, "mock");
        assert!(device.capabilities().can_capture);
        assert!(device.capabilities().can_stream);
    }

    #[test]
    fn test_mock_stream_capture() {
        let mut device = MockDevice::new();
        let mut stream = device.create_stream(1).expect("create_stream should succeed");

        let frame1 = stream.acquire_frame().expect("acquire_frame should succeed");
        assert_eq!(frame1.metadata.sequence, 0);
        assert_eq!(frame1.data().first(), Some(&0xFF));
        assert_eq!(frame1.data().last(), Some(&0xD9));

        let frame2 = stream.acquire_frame().expect("acquire_frame should succeed");
        assert_eq!(frame2.metadata.sequence, 1);
    }

    #[test]
    fn test_mock_source_script() {
        let mut source = MockSource::from_sizes(&[3, 0]).push_error();

        assert_eq!(source.acquire_frame().expect("scripted frame").len(), 3);
        assert!(source.acquire_frame().expect("scripted frame").is_empty());
        assert!(source.acquire_frame().is_err());
        assert!(source.acquire_frame().is_err());
        assert_eq!(source.calls(), 4);
    }

    #[test]
    fn test_mock_writer_refuses_overwrite() {
        let mut writer = MockWriter::new();
        let path = Path::new("/a/img_00000000.jpg");

        let handle = writer.open_for_write(path).expect("open should succeed");
        writer.close(handle).expect("close should succeed");

        assert!(matches!(
            writer.open_for_write(path),
            Err(StorageError::AlreadyExists(_))
        ));
    }
}
