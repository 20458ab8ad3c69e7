// SPDX-License-Identifier: GPL-3.0-only

use clap::{Args, Parser, Subcommand};
use uvc2gl::{Config, PixelEncoding};

mod cli;

#[derive(Parser)]
#[command(name = "uvc2gl")]
#[command(about = "Live viewer for USB video capture cards")]
#[command(version = env!("GIT_VERSION"))]
#[command(subcommand_required = false)]
struct Cli {
    #[command(flatten)]
    options: CaptureOptions,

    #[command(subcommand)]
    command: Option<Commands>,
}

/// Overrides for the loaded configuration
#[derive(Args, Debug, Default)]
struct CaptureOptions {
    /// Video device path (e.g. /dev/video0)
    #[arg(short, long, global = true)]
    device: Option<String>,

    /// ALSA capture device (e.g. hw:1,0)
    #[arg(short, long, global = true)]
    audio_device: Option<String>,

    /// Capture width
    #[arg(long, global = true)]
    width: Option<u32>,

    /// Capture height
    #[arg(long, global = true)]
    height: Option<u32>,

    /// Capture frame rate
    #[arg(long, global = true)]
    fps: Option<u32>,

    /// Pixel encoding to negotiate (mjpeg or yuyv)
    #[arg(short, long, global = true)]
    encoding: Option<PixelEncoding>,

    /// Playback volume from 0.0 to 1.0
    #[arg(long, global = true)]
    volume: Option<f32>,

    /// Disable audio passthrough
    #[arg(long, global = true)]
    no_audio: bool,

    /// Save the effective configuration before running
    #[arg(long, global = true)]
    save: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Show the live capture in the terminal (default)
    View,

    /// List video and audio capture devices
    List,

    /// List the formats a video device offers
    Formats,

    /// Play captured audio through the default output
    Monitor {
        /// How long to run, in seconds; runs until Ctrl+C when omitted
        #[arg(short, long)]
        seconds: Option<u64>,
    },
}

impl CaptureOptions {
    fn apply(&self, config: &mut Config) {
        if let Some(device) = &self.device {
            config.video_device = device.clone();
        }
        if let Some(device) = &self.audio_device {
            config.audio_device = device.clone();
        }
        if let Some(width) = self.width {
            config.width = width;
        }
        if let Some(height) = self.height {
            config.height = height;
        }
        if let Some(fps) = self.fps {
            config.fps = fps;
        }
        if let Some(encoding) = self.encoding {
            config.encoding = encoding;
        }
        if let Some(volume) = self.volume {
            config.volume = volume;
        }
        if self.no_audio {
            config.audio_enabled = false;
        }
        config.sanitize();
    }
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logging
    // Set RUST_LOG environment variable to control log level
    // Examples: RUST_LOG=debug, RUST_LOG=uvc2gl=debug, RUST_LOG=info
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_target(true)
        .with_level(true)
        .init();

    let cli = Cli::parse();

    let mut config = Config::load();
    cli.options.apply(&mut config);
    if cli.options.save {
        let path = config.save()?;
        println!("Configuration saved: {}", path.display());
    }

    match cli.command {
        Some(Commands::View) | None => uvc2gl::terminal::run(&config),
        Some(Commands::List) => cli::list_devices(),
        Some(Commands::Formats) => cli::list_formats(&config),
        Some(Commands::Monitor { seconds }) => cli::monitor_audio(&config, seconds),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_options_override_config() {
        let cli = Cli::parse_from([
            "uvc2gl",
            "--device",
            "/dev/video2",
            "--encoding",
            "yuyv",
            "--volume",
            "3",
            "--no-audio",
            "formats",
        ]);
        let mut config = Config::default();
        cli.options.apply(&mut config);
        assert_eq!(config.video_device, "/dev/video2");
        assert_eq!(config.encoding, PixelEncoding::Yuyv);
        assert_eq!(config.volume, 1.0);
        assert!(!config.audio_enabled);
        assert!(matches!(cli.command, Some(Commands::Formats)));
    }

    #[test]
    fn test_default_command_is_view() {
        let cli = Cli::parse_from(["uvc2gl"]);
        assert!(cli.command.is_none());
        let mut config = Config::default();
        cli.options.apply(&mut config);
        assert_eq!(config, Config::default());
    }

    #[test]
    fn test_monitor_seconds() {
        let cli = Cli::parse_from(["uvc2gl", "monitor", "--seconds", "5"]);
        assert!(matches!(cli.command, Some(Commands::Monitor { seconds: Some(5) })));
    }

    #[test]
    fn test_cli_definition_is_valid() {
        use clap::CommandFactory;
        Cli::command().debug_assert();
    }
}
