//! Build-time configuration for the timelapse camera.
//!
//! Every tunable is a constant here. [`TimelapseConfig::default`] gathers them
//! into one immutable value at startup, which is then handed by reference to
//! whatever needs it.

use std::path::PathBuf;
use std::time::Duration;

use crate::traits::FourCC;

/// Pause between the end of one capture cycle and the start of the next.
pub const CAPTURE_INTERVAL: Duration = Duration::from_secs(60);

/// V4L2 device index of the sensor (`/dev/video0`).
pub const CAMERA_INDEX: u32 = 0;
/// Capture width (UXGA).
pub const FRAME_WIDTH: u32 = 1600;
/// Capture height (UXGA).
pub const FRAME_HEIGHT: u32 = 1200;
/// Encoded pixel format requested from the driver.
pub const PIXEL_FORMAT: FourCC = FourCC::MJPG;
/// Number of driver frame buffers.
pub const FRAME_BUFFERS: u32 = 1;

/// Where the removable media is mounted.
pub const MOUNT_POINT: &str = "/mnt/sdcard";
/// Refuse to start unless `MOUNT_POINT` is a real mount.
pub const REQUIRE_MOUNT_POINT: bool = true;
/// Archive directory, relative to the mount point.
pub const ARCHIVE_DIR_NAME: &str = "timelapse";

/// File name prefix for archived frames.
pub const FILE_PREFIX: &str = "img_";
/// File extension for archived frames.
pub const FILE_EXTENSION: &str = "jpg";

/// Sensor settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CameraConfig {
    /// V4L2 device index.
    pub device_index: u32,
    /// Requested frame width in pixels.
    pub width: u32,
    /// Requested frame height in pixels.
    pub height: u32,
    /// Requested pixel format.
    pub fourcc: FourCC,
    /// Driver buffer count.
    pub buffer_count: u32,
}

impl Default for CameraConfig {
    fn default() -> Self {
        Self {
            device_index: CAMERA_INDEX,
            width: FRAME_WIDTH,
            height: FRAME_HEIGHT,
            fourcc: PIXEL_FORMAT,
            buffer_count: FRAME_BUFFERS,
        }
    }
}

/// Removable media settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StorageConfig {
    /// Mount point of the volume.
    pub mount_point: PathBuf,
    /// Whether the mount point must be on a different device than its parent.
    pub require_mount_point: bool,
    /// Archive directory name under the mount point.
    pub archive_dir_name: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            mount_point: PathBuf::from(MOUNT_POINT),
            require_mount_point: REQUIRE_MOUNT_POINT,
            archive_dir_name: ARCHIVE_DIR_NAME.to_owned(),
        }
    }
}

/// Archive file naming.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NamingConfig {
    /// Prefix before the counter.
    pub prefix: String,
    /// Extension after the counter, without the dot.
    pub extension: String,
}

impl Default for NamingConfig {
    fn default() -> Self {
        Self {
            prefix: FILE_PREFIX.to_owned(),
            extension: FILE_EXTENSION.to_owned(),
        }
    }
}

/// Complete process configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TimelapseConfig {
    /// Pause between capture cycles.
    pub capture_interval: Duration,
    /// Sensor settings.
    pub camera: CameraConfig,
    /// Media settings.
    pub storage: StorageConfig,
    /// File naming.
    pub naming: NamingConfig,
}

impl Default for TimelapseConfig {
    fn default() -> Self {
        Self {
            capture_interval: CAPTURE_INTERVAL,
            camera: CameraConfig::default(),
            storage: StorageConfig::default(),
            naming: NamingConfig::default(),
        }
    }
}
