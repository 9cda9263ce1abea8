//! The native application: overlay, deferred capture, then the chat window.

use super::chat_window::ChatWindow;
use super::overlay::OverlayView;
use super::rendering::visuals;
use crate::capture::{screenshot_dir, spawn_deferred_save, LiveDisplay, CAPTURE_SETTLE_DELAY};
use crate::config::AppConfig;
use crate::error::Result;
use crate::providers::Provider;
use crate::selection::{Effect, Region};
use eframe::egui;
use std::path::PathBuf;
use std::sync::mpsc::{channel, Receiver, TryRecvError};
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info};

const CHAT_WINDOW_SIZE: egui::Vec2 = egui::vec2(1000.0, 640.0);

/// How often the hidden window checks for the capture result.
const CAPTURE_POLL: Duration = Duration::from_millis(50);

enum Phase {
    Selecting(OverlayView),
    /// Window hidden; a worker reads the live display after the settle delay.
    Capturing(Receiver<Result<PathBuf>>),
    Chat(ChatWindow),
    Closed,
}

/// The first capture effect among `effects`, if any.
fn capture_request(effects: &[Effect]) -> Option<Region> {
    effects.iter().find_map(|effect| match effect {
        Effect::Capture(region) => Some(*region),
        _ => None,
    })
}

pub struct ShotApp {
    phase: Phase,
    provider: Arc<Provider>,
    config: AppConfig,
}

impl ShotApp {
    pub fn new(overlay: OverlayView, provider: Arc<Provider>, config: AppConfig) -> Self {
        Self {
            phase: Phase::Selecting(overlay),
            provider,
            config,
        }
    }

    /// Hides the window and schedules the grab of `region`.
    fn begin_capture(ctx: &egui::Context, region: Region) -> Phase {
        let dir = match screenshot_dir() {
            Ok(dir) => dir,
            Err(e) => {
                error!("Screen capture failed: {}", e);
                return Self::close(ctx);
            }
        };

        ctx.send_viewport_cmd(egui::ViewportCommand::Visible(false));

        let (tx, rx) = channel();
        let waker = ctx.clone();
        spawn_deferred_save(LiveDisplay, region, dir, CAPTURE_SETTLE_DELAY, move |result| {
            let _ = tx.send(result);
            waker.request_repaint();
        });

        ctx.request_repaint_after(CAPTURE_POLL);
        Phase::Capturing(rx)
    }

    fn open_chat(&self, ctx: &egui::Context, path: PathBuf) -> Phase {
        info!(path = %path.display(), "opening analysis window");
        ctx.send_viewport_cmd(egui::ViewportCommand::Fullscreen(false));
        ctx.send_viewport_cmd(egui::ViewportCommand::Decorations(true));
        ctx.send_viewport_cmd(egui::ViewportCommand::WindowLevel(egui::WindowLevel::Normal));
        ctx.send_viewport_cmd(egui::ViewportCommand::InnerSize(CHAT_WINDOW_SIZE));
        ctx.send_viewport_cmd(egui::ViewportCommand::Title("Image Analysis".to_string()));
        ctx.send_viewport_cmd(egui::ViewportCommand::Visible(true));
        ctx.send_viewport_cmd(egui::ViewportCommand::Focus);

        Phase::Chat(ChatWindow::open(
            ctx,
            path,
            self.provider.clone(),
            self.config.clone(),
        ))
    }

    fn close(ctx: &egui::Context) -> Phase {
        ctx.send_viewport_cmd(egui::ViewportCommand::Close);
        Phase::Closed
    }
}

impl eframe::App for ShotApp {
    fn update(&mut self, ctx: &egui::Context, _frame: &mut eframe::Frame) {
        let theme = match &self.phase {
            Phase::Chat(window) => window.config().theme,
            _ => self.config.theme,
        };
        ctx.set_visuals(visuals(theme));

        self.phase = match std::mem::replace(&mut self.phase, Phase::Closed) {
            Phase::Selecting(mut overlay) => {
                let effects = overlay.show(ctx);
                match capture_request(&effects) {
                    Some(region) => Self::begin_capture(ctx, region),
                    None if effects.contains(&Effect::Close) => Self::close(ctx),
                    None => Phase::Selecting(overlay),
                }
            }
            Phase::Capturing(rx) => match rx.try_recv() {
                Ok(Ok(path)) => self.open_chat(ctx, path),
                Ok(Err(e)) => {
                    error!("Screen capture failed: {}", e);
                    Self::close(ctx)
                }
                Err(TryRecvError::Empty) => {
                    ctx.request_repaint_after(CAPTURE_POLL);
                    Phase::Capturing(rx)
                }
                Err(TryRecvError::Disconnected) => {
                    error!("Screen capture worker exited without a result");
                    Self::close(ctx)
                }
            },
            Phase::Chat(mut window) => {
                if window.show(ctx) {
                    Phase::Chat(window)
                } else {
                    Self::close(ctx)
                }
            }
            Phase::Closed => Phase::Closed,
        };
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_capture_request_picks_region_before_close() {
        let region = Region {
            x: 10,
            y: 20,
            width: 30,
            height: 40,
        };
        let effects = [Effect::Capture(region), Effect::Close];
        assert_eq!(capture_request(&effects), Some(region));
        assert_eq!(capture_request(&[Effect::Close]), None);
        assert_eq!(capture_request(&[Effect::Redraw]), None);
    }
}
