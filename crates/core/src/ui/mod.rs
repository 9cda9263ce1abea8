//! User interface components for shotlens.
//!
//! A single native window walks through three phases: a fullscreen overlay
//! over a frozen snapshot of the primary display, a short pause with the
//! window hidden while the live display is read, and the analysis window
//! where questions about the saved image are answered by the active provider.
//!
//! # Architecture
//!
//! - [`overlay`]: selection overlay feeding the capture state machine
//! - [`chat_window`]: image, transcript and question input
//! - [`settings`]: provider and appearance settings panel
//! - [`rendering`]: drawing utilities for overlays and borders
//! - [`app`]: phase transitions and the deferred capture

mod app;
mod chat_window;
mod overlay;
mod rendering;
mod settings;

use app::ShotApp;

use crate::capture::ScreenCapturer;
use crate::config::AppConfig;
use crate::error::{AppError, Result};
use crate::providers::Provider;
use eframe::egui;
use overlay::OverlayView;
use std::sync::Arc;

/// Snapshots the primary display and runs the overlay → chat flow until the
/// window closes.
///
/// # Errors
///
/// Returns an error if the snapshot fails or the native window cannot be
/// created. Capture and provider failures inside the flow are logged only.
pub fn run(config: AppConfig, provider: Arc<Provider>) -> Result<()> {
    let capturer = ScreenCapturer::new()?;
    let monitor = capturer.primary_monitor();
    let snapshot = capturer.capture_primary()?;
    let overlay = OverlayView::new(&snapshot, monitor);

    let options = eframe::NativeOptions {
        viewport: egui::ViewportBuilder::default()
            .with_position(egui::pos2(monitor.x as f32, monitor.y as f32))
            .with_fullscreen(true)
            .with_decorations(false)
            .with_always_on_top(),
        ..Default::default()
    };

    eframe::run_native(
        "shotlens",
        options,
        Box::new(move |_cc| Ok(Box::new(ShotApp::new(overlay, provider, config)) as Box<dyn eframe::App>)),
    )
    .map_err(|e| AppError::ui(format!("Failed to run UI: {}", e)))
}
