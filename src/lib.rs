//! Pi-Timelapse: periodic still capture from a V4L2 camera into a numbered
//! archive on removable media.
//!
//! The capture loop is written against small traits for the sensor and the
//! storage, so it runs the same against real hardware and against mocks.

pub mod config;
pub mod device;
pub mod namer;
pub mod shutdown;
pub mod storage;
pub mod timelapse;
pub mod traits;

#[cfg(test)]
pub mod mock;

pub use config::TimelapseConfig;
pub use device::V4L2Device;
pub use namer::SequenceNamer;
pub use shutdown::ShutdownSignal;
pub use storage::{FsVolume, FsWriter, MountHandle, PersistWriter, StorageMount};
pub use timelapse::{IterationOutcome, LoopStats, StartupError, TimelapseLoop};
pub use traits::{
    configure_sensor, CameraDevice, CaptureSource, DeviceCapabilities, Format, FourCC, Frame,
    FrameMetadata,
};
