//! Pi-timelapse binary: capture a still every interval until stopped.

use std::process::ExitCode;
use std::sync::Arc;

use pi_timelapse::{
    configure_sensor, CameraDevice, FsVolume, FsWriter, ShutdownSignal, StartupError,
    TimelapseConfig, TimelapseLoop, V4L2Device,
};
use tracing::{error, info, warn};

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let shutdown = Arc::new(ShutdownSignal::new());
    let handler_signal = Arc::clone(&shutdown);
    if let Err(err) = ctrlc::set_handler(move || {
        info!("stop requested");
        handler_signal.request();
    }) {
        warn!(%err, "cannot install signal handler, loop will run until killed");
    }

    match run(&TimelapseConfig::default(), &shutdown) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            error!(%err, "startup failed, capture loop not started");
            ExitCode::FAILURE
        }
    }
}

fn run(config: &TimelapseConfig, shutdown: &ShutdownSignal) -> Result<(), StartupError> {
    info!(version = env!("CARGO_PKG_VERSION"), "timelapse camera");

    let mut device = V4L2Device::open(config.camera.device_index)?;
    info!(
        card = %device.capabilities().card,
        driver = %device.capabilities().driver,
        "camera opened"
    );
    configure_sensor(&mut device, &config.camera)?;
    let stream = device.create_stream(config.camera.buffer_count)?;

    let mut timelapse = TimelapseLoop::start(config, &mut FsVolume, stream, FsWriter)?;
    timelapse.run(shutdown);
    Ok(())
}
