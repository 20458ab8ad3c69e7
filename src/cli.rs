// SPDX-License-Identifier: GPL-3.0-only

//! CLI commands
//!
//! This module provides command-line functionality for:
//! - Listing video and audio capture devices
//! - Listing the formats a video device offers
//! - Monitoring captured audio without video

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use uvc2gl::Config;
use uvc2gl::backends::audio::{
    AudioCapture, AudioPassthrough, list_audio_devices, resolve_capture_device, select_audio_device,
};
use uvc2gl::backends::camera::{
    VideoFormat, list_video_devices, query_formats_for, resolve_video_device,
};
use uvc2gl::constants::SHUTDOWN_POLL;
use uvc2gl::media::PixelEncoding;

/// Formats shown per device by `list`
const LIST_FORMAT_COUNT: usize = 3;

/// List video and audio capture devices
pub fn list_devices() -> Result<(), Box<dyn std::error::Error>> {
    let cameras = list_video_devices();

    if cameras.is_empty() {
        println!("No video capture devices found.");
    } else {
        println!("Video devices:");
        println!();
        for camera in &cameras {
            println!("  {}  {} ({})", camera.path, camera.name, camera.driver);

            for encoding in PixelEncoding::ALL {
                let formats = query_formats_for(&camera.path, encoding);
                if formats.is_empty() {
                    continue;
                }
                println!("      {}: {}", encoding, summarize_formats(&formats, LIST_FORMAT_COUNT));
            }
        }
    }
    println!();

    let audio = list_audio_devices();
    let defaults = Config::default().audio_fallback_patterns;
    let card = select_audio_device(&audio, &defaults).map(|d| d.id.clone());

    println!("Audio capture devices:");
    println!();
    for device in &audio {
        let marker = if card.as_deref() == Some(device.id.as_str()) {
            " *"
        } else {
            ""
        };
        println!("  {}{}", device.id, marker);
        println!("      {}", device.description);
    }
    if card.is_some() {
        println!();
        println!("  * likely capture card audio");
    }

    Ok(())
}

/// List the formats the configured device offers in the configured encoding
pub fn list_formats(config: &Config) -> Result<(), Box<dyn std::error::Error>> {
    let device = resolve_video_device(&config.video_device, &list_video_devices());
    let formats = query_formats_for(&device, config.encoding);

    if formats.is_empty() {
        return Err(format!("No {} formats available on {}", config.encoding, device).into());
    }

    println!("{} formats on {}:", config.encoding, device);
    for format in &formats {
        println!("  {}", format);
    }
    Ok(())
}

/// Play captured audio until the deadline or Ctrl+C
pub fn monitor_audio(config: &Config, seconds: Option<u64>) -> Result<(), Box<dyn std::error::Error>> {
    let devices = list_audio_devices();
    let device = resolve_capture_device(config.audio_device(), &devices, &config.audio_fallback_patterns);
    println!("Using audio device: {}", device);

    let capture = AudioCapture::new(
        device.as_str(),
        config.sample_rate,
        config.channels,
        config.period_size,
    );
    let mut passthrough = AudioPassthrough::new(capture, config.volume);
    passthrough.start()?;

    // Set up Ctrl+C handler
    let stop_flag = Arc::new(AtomicBool::new(false));
    let stop_flag_clone = Arc::clone(&stop_flag);
    ctrlc::set_handler(move || {
        stop_flag_clone.store(true, Ordering::SeqCst);
    })?;

    println!("Monitoring... (press Ctrl+C to stop)");

    let start = Instant::now();
    let deadline = seconds.map(Duration::from_secs);

    loop {
        if stop_flag.load(Ordering::SeqCst) {
            println!();
            println!("Stopping...");
            break;
        }
        if deadline.is_some_and(|d| start.elapsed() >= d) {
            break;
        }
        if !passthrough.check_health() {
            println!();
            passthrough.stop();
            return Err("Audio capture stopped unexpectedly".into());
        }

        let elapsed = start.elapsed().as_secs();
        print!("\rMonitoring: {:02}:{:02}", elapsed / 60, elapsed % 60);
        std::io::Write::flush(&mut std::io::stdout())?;

        std::thread::sleep(SHUTDOWN_POLL);
    }
    println!();

    passthrough.stop();
    Ok(())
}

/// Top `count` resolutions, each with its best frame rate
fn summarize_formats(formats: &[VideoFormat], count: usize) -> String {
    let mut resolutions: Vec<VideoFormat> = Vec::new();
    for format in formats {
        if let Some(existing) = resolutions
            .iter_mut()
            .find(|r| r.width == format.width && r.height == format.height)
        {
            existing.fps = existing.fps.max(format.fps);
        } else {
            resolutions.push(*format);
        }
    }

    // Sort by resolution (highest first)
    resolutions.sort_by_key(|r| std::cmp::Reverse(r.width as u64 * r.height as u64));

    resolutions
        .iter()
        .take(count)
        .map(|r| format!("{}x{}@{}fps", r.width, r.height, r.fps))
        .collect::<Vec<_>>()
        .join(", ")
}
