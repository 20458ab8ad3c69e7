// SPDX-License-Identifier: GPL-3.0-only

//! Terminal-based capture viewer
//!
//! Polls the capture core for the newest frame and renders it with Unicode
//! half-block characters, two pixel rows per terminal cell. Captured audio
//! is optionally played back through the default output device.

use crate::backends::audio::{AudioCapture, AudioPassthrough, list_audio_devices, resolve_capture_device};
use crate::backends::camera::{VideoCapture, VideoDeviceInfo, VideoFrame, list_video_devices, resolve_video_device};
use crate::config::Config;
use crate::constants::audio::VOLUME_STEP;
use crate::constants::viewer::POLL_INTERVAL;
use crate::errors::CaptureError;

use crossterm::{
    event::{self, Event, KeyCode, KeyEventKind, KeyModifiers},
    execute,
    terminal::{EnterAlternateScreen, LeaveAlternateScreen, disable_raw_mode, enable_raw_mode},
};
use ratatui::{
    Terminal, backend::CrosstermBackend, buffer::Buffer, layout::Rect, style::Color,
    widgets::Widget,
};
use std::io::{self, stdout};
use std::time::{Duration, Instant};
use tracing::{error, info, warn};

/// Run the terminal viewer until the user quits
pub fn run(config: &Config) -> Result<(), Box<dyn std::error::Error>> {
    // Set up terminal
    enable_raw_mode()?;
    let mut stdout = stdout();
    execute!(stdout, EnterAlternateScreen)?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;

    // Run the app
    let result = run_app(&mut terminal, config);

    // Restore terminal
    disable_raw_mode()?;
    execute!(terminal.backend_mut(), LeaveAlternateScreen)?;
    terminal.show_cursor()?;

    result
}

fn run_app(
    terminal: &mut Terminal<CrosstermBackend<io::Stdout>>,
    config: &Config,
) -> Result<(), Box<dyn std::error::Error>> {
    let devices = list_video_devices();
    info!(count = devices.len(), "Found video devices");

    let mut device_index = initial_device_index(&config.video_device, &devices);
    let mut current_path = device_path(&devices, device_index, &config.video_device);
    let mut capture = video_capture(&current_path, config);
    let video_notice = start_video(&mut capture, VideoCapture::start);

    let mut audio = start_audio(config);
    let mut volume = Volume::new(config.volume);

    let mut frame_widget = FrameWidget::new();
    let mut rate = FrameRate::new();
    let mut show_help = false;
    let mut notice: Option<String> = video_notice.or_else(|| audio.as_ref().err().cloned());

    loop {
        if let Some(frame) = capture.get_frame() {
            rate.tick();
            frame_widget.update_frame(frame);
        }

        if let Ok(passthrough) = &mut audio
            && !passthrough.check_health()
        {
            notice = Some("Audio stopped".to_string());
        }

        if !capture.is_running() && notice.is_none() {
            notice = Some(format!("Capture stopped: {}", current_path));
        }

        let status_message = if show_help {
            build_help_message(devices.len() > 1)
        } else {
            let audio_state = audio.as_ref().ok().map(|_| &volume);
            let mut line = build_status_message(&capture, rate.fps(), audio_state, devices.len() > 1);
            if let Some(notice) = &notice {
                line = format!("{} | {}", notice, line);
            }
            line
        };

        terminal.draw(|f| {
            let area = f.area();

            // Reserve bottom line for status
            let frame_area = Rect {
                x: area.x,
                y: area.y,
                width: area.width,
                height: area.height.saturating_sub(1),
            };
            f.render_widget(&frame_widget, frame_area);

            let status_area = Rect {
                x: area.x,
                y: area.height.saturating_sub(1),
                width: area.width,
                height: 1,
            };
            f.render_widget(
                StatusBar {
                    message: &status_message,
                },
                status_area,
            );
        })?;

        // Handle input with timeout for frame updates
        if !event::poll(POLL_INTERVAL)? {
            continue;
        }
        let Event::Key(key) = event::read()? else {
            continue;
        };
        if key.kind != KeyEventKind::Press {
            continue;
        }

        match key.code {
            KeyCode::Char('c') if key.modifiers.contains(KeyModifiers::CONTROL) => break,
            KeyCode::Char('q') => break,
            KeyCode::Char('h') => show_help = !show_help,
            KeyCode::Char('+') | KeyCode::Char('=') => {
                volume.step(VOLUME_STEP);
                apply_volume(&mut audio, &volume);
            }
            KeyCode::Char('-') => {
                volume.step(-VOLUME_STEP);
                apply_volume(&mut audio, &volume);
            }
            KeyCode::Char('m') => {
                volume.toggle_mute();
                apply_volume(&mut audio, &volume);
            }
            KeyCode::Char('s') if devices.len() > 1 => {
                show_help = false;
                let next = (device_index + 1) % devices.len();
                let next_path = devices[next].path.clone();

                let next_capture = video_capture(&next_path, config);
                match switch_video(&mut capture, next_capture, VideoCapture::start) {
                    Ok(()) => {
                        device_index = next;
                        current_path = next_path;
                        frame_widget = FrameWidget::new();
                        rate = FrameRate::new();
                        notice = None;
                    }
                    Err(message) => notice = Some(message),
                }
            }
            _ => {}
        }
    }

    capture.stop();
    if let Ok(passthrough) = &mut audio {
        passthrough.stop();
    }
    Ok(())
}

fn initial_device_index(configured: &str, devices: &[VideoDeviceInfo]) -> usize {
    let chosen = resolve_video_device(configured, devices);
    devices.iter().position(|d| d.path == chosen).unwrap_or(0)
}

fn device_path(devices: &[VideoDeviceInfo], index: usize, configured: &str) -> String {
    devices
        .get(index)
        .map(|d| d.path.clone())
        .unwrap_or_else(|| resolve_video_device(configured, devices))
}

/// Stopped capture for `path` with the configured format
fn video_capture(path: &str, config: &Config) -> VideoCapture {
    let mut capture = VideoCapture::new(
        path,
        config.width,
        config.height,
        config.fps,
        config.encoding,
        config.ring_capacity,
    )
    .with_buffer_count(config.buffer_count);
    if let Some(frames) = config.warmup_frames {
        capture = capture.with_warmup_frames(frames);
    }
    capture
}

/// Start video, or describe why there is none
///
/// The viewer keeps running without video; audio and the key bindings
/// still work and the user can switch to another device.
fn start_video<F>(capture: &mut VideoCapture, mut start: F) -> Option<String>
where
    F: FnMut(&mut VideoCapture) -> Result<(), CaptureError>,
{
    info!(device = %capture.device(), "Opening video device");
    match start(capture) {
        Ok(()) => None,
        Err(e) => {
            error!(device = %capture.device(), error = %e, "Video capture unavailable");
            Some(format!("No video: {}", e))
        }
    }
}

/// Replace `current` with `next` once `next` is streaming
///
/// The old device is released before `next` opens. When `next` fails, `current` is restarted; if that fails too
/// it stays stopped. Either way the error text comes back for display.
fn switch_video<F>(
    current: &mut VideoCapture,
    mut next: VideoCapture,
    mut start: F,
) -> Result<(), String>
where
    F: FnMut(&mut VideoCapture) -> Result<(), CaptureError>,
{
    current.stop();

    let Some(failure) = start_video(&mut next, &mut start) else {
        *current = next;
        return Ok(());
    };

    match start_video(current, &mut start) {
        None => Err(failure),
        Some(restart) => {
            warn!(device = %current.device(), "Previous video device did not restart");
            Err(format!("{} | {}", failure, restart))
        }
    }
}

/// Start passthrough, or describe why audio is off
fn start_audio(config: &Config) -> Result<AudioPassthrough, String> {
    if !config.audio_enabled {
        return Err("Audio off".to_string());
    }

    let devices = list_audio_devices();
    let device = resolve_capture_device(config.audio_device(), &devices, &config.audio_fallback_patterns);
    let capture = AudioCapture::new(
        device.as_str(),
        config.sample_rate,
        config.channels,
        config.period_size,
    );

    let mut passthrough = AudioPassthrough::new(capture, config.volume);
    match passthrough.start() {
        Ok(()) => Ok(passthrough),
        Err(e) => {
            warn!(device = %device, error = %e, "Audio passthrough unavailable");
            Err(format!("No audio: {}", e))
        }
    }
}

fn apply_volume(audio: &mut Result<AudioPassthrough, String>, volume: &Volume) {
    if let Ok(passthrough) = audio {
        passthrough.set_volume(volume.effective());
    }
}

/// Playback level with a mute toggle that remembers the level
#[derive(Debug, Clone, Copy, PartialEq)]
struct Volume {
    level: f32,
    muted: bool,
}

impl Volume {
    fn new(level: f32) -> Self {
        Self {
            level: clamp_unit(level),
            muted: false,
        }
    }

    /// Adjusting the level also unmutes
    fn step(&mut self, delta: f32) {
        self.level = clamp_unit(self.level + delta);
        self.muted = false;
    }

    fn toggle_mute(&mut self) {
        self.muted = !self.muted;
    }

    fn effective(&self) -> f32 {
        if self.muted { 0.0 } else { self.level }
    }

    fn label(&self) -> String {
        if self.muted {
            "muted".to_string()
        } else {
            format!("{:.0}%", self.level * 100.0)
        }
    }
}

fn clamp_unit(value: f32) -> f32 {
    if value.is_nan() { 0.0 } else { value.clamp(0.0, 1.0) }
}

/// Frames shown per second, averaged over about one second
struct FrameRate {
    window_start: Instant,
    frames: u32,
    fps: f32,
}

impl FrameRate {
    fn new() -> Self {
        Self {
            window_start: Instant::now(),
            frames: 0,
            fps: 0.0,
        }
    }

    fn tick(&mut self) {
        self.frames += 1;
        let elapsed = self.window_start.elapsed();
        if elapsed >= Duration::from_secs(1) {
            self.fps = self.frames as f32 / elapsed.as_secs_f32();
            self.frames = 0;
            self.window_start = Instant::now();
        }
    }

    fn fps(&self) -> f32 {
        self.fps
    }
}

fn build_status_message(
    capture: &VideoCapture,
    fps: f32,
    volume: Option<&Volume>,
    multi_device: bool,
) -> String {
    let mut msg = capture.device().to_string();
    if let Some(format) = capture.format() {
        msg.push_str(&format!(" {}", format));
    }
    let stats = capture.stats();
    msg.push_str(&format!(" | {:.1} fps | dropped {}", fps, stats.dropped_malformed));
    match volume {
        Some(volume) => msg.push_str(&format!(" | vol {}", volume.label())),
        None => msg.push_str(" | no audio"),
    }
    if multi_device {
        msg.push_str(" | 's' switch");
    }
    msg.push_str(" | 'h' help | 'q' quit");
    msg
}

fn build_help_message(multi_device: bool) -> String {
    let mut msg = String::from("+/-: Volume | m: Mute | ");
    if multi_device {
        msg.push_str("s: Switch device | ");
    }
    msg.push_str("h: Toggle help | q/Ctrl+C: Quit");
    msg
}

/// Largest (width, rows) box with the frame's aspect ratio inside `area`
///
/// `rows` counts terminal cells; each cell shows two pixel rows.
fn fit_frame(frame_width: u32, frame_height: u32, area: Rect) -> (u16, u16) {
    if frame_width == 0 || frame_height == 0 || area.width == 0 || area.height == 0 {
        return (0, 0);
    }
    let frame_aspect = frame_width as f64 / frame_height as f64;
    let term_width = area.width as f64;
    let term_height = (area.height as f64) * 2.0;

    if term_width / term_height > frame_aspect {
        // Terminal is wider - fit to height
        let w = term_height * frame_aspect;
        (w as u16, area.height)
    } else {
        // Terminal is taller - fit to width
        let h = term_width / frame_aspect;
        (area.width, (h / 2.0) as u16)
    }
}

/// Widget that renders a decoded frame using half-block characters
struct FrameWidget {
    frame: Option<VideoFrame>,
}

impl FrameWidget {
    fn new() -> Self {
        Self { frame: None }
    }

    fn update_frame(&mut self, frame: VideoFrame) {
        self.frame = Some(frame);
    }
}

impl Widget for &FrameWidget {
    fn render(self, area: Rect, buf: &mut Buffer) {
        let Some(frame) = &self.frame else {
            let msg = "Waiting for video...";
            let x = area.x + (area.width.saturating_sub(msg.len() as u16)) / 2;
            let y = area.y + area.height / 2;
            if y < area.y + area.height && x < area.x + area.width {
                buf.set_string(x, y, msg, ratatui::style::Style::default());
            }
            return;
        };

        let (display_width, display_height) = fit_frame(frame.width, frame.height, area);
        if display_width == 0 || display_height == 0 {
            return;
        }

        // Center the image
        let x_offset = area.x + (area.width.saturating_sub(display_width)) / 2;
        let y_offset = area.y + (area.height.saturating_sub(display_height)) / 2;

        let x_scale = frame.width as f64 / display_width as f64;
        let y_scale = frame.height as f64 / (display_height as f64 * 2.0);

        // Upper half (▀) takes the fg color, lower half the bg color
        for ty in 0..display_height {
            for tx in 0..display_width {
                let src_x = (tx as f64 * x_scale) as u32;
                let src_y_top = (ty as f64 * 2.0 * y_scale) as u32;
                let src_y_bottom = ((ty as f64 * 2.0 + 1.0) * y_scale) as u32;

                if let Some(cell) = buf.cell_mut((x_offset + tx, y_offset + ty)) {
                    cell.set_char('▀');
                    cell.set_fg(sample_pixel(frame, src_x, src_y_top));
                    cell.set_bg(sample_pixel(frame, src_x, src_y_bottom));
                }
            }
        }
    }
}

fn sample_pixel(frame: &VideoFrame, x: u32, y: u32) -> Color {
    let x = x.min(frame.width.saturating_sub(1));
    let y = y.min(frame.height.saturating_sub(1));
    match frame.pixel(x, y) {
        Some([r, g, b]) => Color::Rgb(r, g, b),
        None => Color::Black,
    }
}

/// Status bar widget
struct StatusBar<'a> {
    message: &'a str,
}

impl Widget for StatusBar<'_> {
    fn render(self, area: Rect, buf: &mut Buffer) {
        // Fill background
        for x in area.x..area.x + area.width {
            if let Some(cell) = buf.cell_mut((x, area.y)) {
                cell.set_char(' ');
                cell.set_bg(Color::DarkGray);
            }
        }

        let text: String = self.message.chars().take(area.width as usize).collect();
        buf.set_string(
            area.x,
            area.y,
            text,
            ratatui::style::Style::default()
                .fg(Color::White)
                .bg(Color::DarkGray),
        );
    }
}
