//! picam-shutter binary: waits for button presses and saves captures.

use tracing::{error, info};

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("picam_shutter=info")),
        )
        .init();

    if let Err(err) = run() {
        error!("Error: {err}");
        std::process::exit(1);
    }
}

fn run() -> Result<(), picam_shutter::Error> {
    let config = picam_shutter::Config::from_env()?;

    info!("picam-shutter starting");
    info!("  Capture dir: {}", config.capture_dir.display());
    info!(
        "  Camera: /dev/video{} {}x{}",
        config.device_index, config.profile.format.width, config.profile.format.height
    );
    info!("  Shutter pin: {}", config.pins.shutter);
    for preset in config.presets.iter() {
        info!("  Exposure pin {}: {} sec", preset.pin, preset.label);
    }

    picam_shutter::runtime::run(&config)
}
