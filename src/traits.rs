//! Core traits and types for the camera side of the timelapse.

use std::time::Duration;

use tracing::{info, warn};

use crate::config::CameraConfig;

/// Pixel format representation (e.g., MJPG, YUYV).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FourCC(pub [u8; 4]);

impl FourCC {
    /// Create a new `FourCC` from a 4-byte array.
    #[must_use]
    pub const fn new(code: &[u8; 4]) -> Self {
        Self(*code)
    }

    /// MJPEG pixel format (Motion JPEG), one JPEG still per buffer.
    pub const MJPG: Self = Self::new(b"MJPG");
    /// JPEG pixel format, exposed by some drivers instead of `MJPG`.
    pub const JPEG: Self = Self::new(b"JPEG");
    /// YUYV pixel format (4:2:2 packed).
    pub const YUYV: Self = Self::new(b"YUYV");

    /// Whether buffers in both formats hold the same kind of payload.
    ///
    /// `MJPG` and `JPEG` both deliver one complete JPEG per buffer.
    #[must_use]
    pub fn same_payload(self, other: Self) -> bool {
        let is_jpeg = |fourcc: Self| fourcc == Self::MJPG || fourcc == Self::JPEG;
        self == other || (is_jpeg(self) && is_jpeg(other))
    }
}

impl std::fmt::Display for FourCC {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", String::from_utf8_lossy(&self.0))
    }
}

impl From<v4l::FourCC> for FourCC {
    fn from(fourcc: v4l::FourCC) -> Self {
        Self(fourcc.repr)
    }
}

impl From<FourCC> for v4l::FourCC {
    fn from(fourcc: FourCC) -> Self {
        Self::new(&fourcc.0)
    }
}

/// Video format specification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Format {
    /// Frame width in pixels.
    pub width: u32,
    /// Frame height in pixels.
    pub height: u32,
    /// Pixel format.
    pub fourcc: FourCC,
    /// Largest buffer the driver may fill for one frame, in bytes.
    pub size: u32,
}

impl Format {
    /// Create a new format request. The driver fills in `size`.
    #[must_use]
    pub const fn new(width: u32, height: u32, fourcc: FourCC) -> Self {
        Self {
            width,
            height,
            fourcc,
            size: 0,
        }
    }
}

/// Device capability flags.
#[derive(Debug, Clone, Default)]
pub struct DeviceCapabilities {
    /// Driver name.
    pub driver: String,
    /// Card/device name.
    pub card: String,
    /// Bus information.
    pub bus_info: String,
    /// Whether the device can capture video.
    pub can_capture: bool,
    /// Whether the device supports streaming.
    pub can_stream: bool,
}

/// Metadata for a captured frame.
#[derive(Debug, Clone)]
pub struct FrameMetadata {
    /// Driver frame sequence number.
    pub sequence: u32,
    /// Capture timestamp.
    pub timestamp: Duration,
}

/// One encoded still image, exactly as produced by the sensor.
///
/// A frame is owned by the loop iteration that acquired it and is dropped as
/// soon as the write attempt finishes.
#[derive(Debug, Clone)]
pub struct Frame {
    data: Vec<u8>,
    /// Frame metadata.
    pub metadata: FrameMetadata,
}

impl Frame {
    /// Wrap an encoded payload.
    #[must_use]
    pub const fn new(data: Vec<u8>, metadata: FrameMetadata) -> Self {
        Self { data, metadata }
    }

    /// Encoded image bytes.
    #[must_use]
    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// Payload length in bytes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// True when the sensor handed back no payload.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

/// Error type for camera operations.
#[derive(Debug, thiserror::Error)]
pub enum CameraError {
    /// Failed to open device.
    #[error("failed to open device: {0}")]
    DeviceOpenFailed(String),
    /// Device cannot capture or stream.
    #[error("device {card} lacks {missing} capability")]
    MissingCapability {
        /// Card name reported by the driver.
        card: String,
        /// Name of the missing capability.
        missing: &'static str,
    },
    /// Requested format is not supported.
    #[error("format not supported: requested {requested}, driver chose {actual}")]
    FormatNotSupported {
        /// Pixel format asked for.
        requested: FourCC,
        /// Pixel format the driver settled on.
        actual: FourCC,
    },
    /// Error during streaming operation.
    #[error("stream error: {0}")]
    StreamError(String),
    /// The driver delivered a buffer with no payload.
    #[error("sensor returned an empty frame")]
    EmptyFrame,
    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for camera operations.
pub type Result<T> = std::result::Result<T, CameraError>;

/// Abstraction over camera device operations.
pub trait CameraDevice {
    /// The stream type returned by `create_stream`.
    type Stream<'a>: CaptureSource
    where
        Self: 'a;

    /// Get device capabilities.
    fn capabilities(&self) -> &DeviceCapabilities;

    /// Get current format.
    fn format(&self) -> Result<Format>;

    /// Set capture format. Returns the actual format set by the driver.
    fn set_format(&mut self, format: &Format) -> Result<Format>;

    /// Create a capture stream with the specified number of buffers.
    fn create_stream(&mut self, buffer_count: u32) -> Result<Self::Stream<'_>>;
}

/// Anything that yields one encoded frame on demand.
///
/// Implementations do not retry; a failed acquisition is reported and the
/// caller decides what to do with the cycle.
pub trait CaptureSource {
    /// Acquire one frame, blocking until it is available.
    fn acquire_frame(&mut self) -> Result<Frame>;
}

/// Bring a freshly opened sensor into the configured capture mode.
///
/// Returns the format the driver actually applied. A pixel format other
/// than the requested one is rejected, since frames are archived verbatim.
pub fn configure_sensor<D: CameraDevice>(device: &mut D, config: &CameraConfig) -> Result<Format> {
    let caps = device.capabilities();
    if !caps.can_capture {
        return Err(CameraError::MissingCapability {
            card: caps.card.clone(),
            missing: "video capture",
        });
    }
    if !caps.can_stream {
        return Err(CameraError::MissingCapability {
            card: caps.card.clone(),
            missing: "streaming",
        });
    }

    let requested = Format::new(config.width, config.height, config.fourcc);
    let actual = device.set_format(&requested)?;

    if !actual.fourcc.same_payload(requested.fourcc) {
        return Err(CameraError::FormatNotSupported {
            requested: requested.fourcc,
            actual: actual.fourcc,
        });
    }
    if actual.width != requested.width || actual.height != requested.height {
        warn!(
            requested_width = requested.width,
            requested_height = requested.height,
            width = actual.width,
            height = actual.height,
            "driver adjusted capture resolution"
        );
    }

    info!(
        width = actual.width,
        height = actual.height,
        fourcc = %actual.fourcc,
        "sensor configured"
    );
    Ok(actual)
}
