//! Analysis window: the captured image next to a conversation about it.

use super::rendering::fit_size;
use super::settings::{SettingsOutcome, SettingsPanel};
use crate::chat::{ChatSession, Speaker, INITIAL_QUESTION, PENDING_NOTICE};
use crate::config::AppConfig;
use crate::image_processing::ImageProcessor;
use crate::providers::{AiProvider, Provider};
use eframe::egui;
use egui_commonmark::{CommonMarkCache, CommonMarkViewer};
use std::path::{Path, PathBuf};
use std::sync::mpsc::{channel, Receiver, Sender};
use std::sync::Arc;
use std::thread;
use tracing::{debug, error, warn};

/// Width of the image side panel, in points.
const IMAGE_PANEL_WIDTH: f32 = 360.0;

/// Events sent from background requests to the UI thread.
pub(crate) enum ChatEvent {
    Answer { id: u64, text: String },
}

/// The chat phase of the application.
pub struct ChatWindow {
    session: ChatSession,
    provider: Arc<Provider>,
    config: AppConfig,
    texture: Option<egui::TextureHandle>,
    input: String,
    markdown_cache: CommonMarkCache,
    settings: Option<SettingsPanel>,
    tx: Sender<ChatEvent>,
    rx: Receiver<ChatEvent>,
}

impl ChatWindow {
    /// Opens the window for `image_path` and asks the initial question.
    pub fn open(
        ctx: &egui::Context,
        image_path: PathBuf,
        provider: Arc<Provider>,
        config: AppConfig,
    ) -> Self {
        let (tx, rx) = channel();
        let mut window = Self {
            texture: load_texture(ctx, &image_path),
            session: ChatSession::new(image_path),
            provider,
            config,
            input: String::new(),
            markdown_cache: CommonMarkCache::default(),
            settings: None,
            tx,
            rx,
        };
        window.ask(INITIAL_QUESTION);
        window
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    fn ask(&mut self, question: &str) {
        let Some(submission) = self.session.submit(question) else {
            return;
        };
        if let Some(previous) = submission.supersedes {
            debug!(previous, id = submission.id, "superseding in-flight question");
            self.provider.cancel();
        }
        spawn_analysis(
            self.provider.clone(),
            self.session.image_path().to_path_buf(),
            submission.id,
            submission.question,
            self.tx.clone(),
        );
    }

    fn process_events(&mut self, ctx: &egui::Context) {
        while let Ok(event) = self.rx.try_recv() {
            match event {
                ChatEvent::Answer { id, text } => {
                    if !self.session.resolve(id, text) {
                        debug!(id, "dropping stale answer");
                    }
                    ctx.request_repaint();
                }
            }
        }
    }

    /// Renders one frame. Returns false once the window should close.
    pub fn show(&mut self, ctx: &egui::Context) -> bool {
        self.process_events(ctx);

        if ctx.input(|i| i.key_pressed(egui::Key::Escape)) {
            return false;
        }

        egui::SidePanel::left("captured_image")
            .resizable(true)
            .default_width(IMAGE_PANEL_WIDTH)
            .show(ctx, |ui| {
                if let Some(texture) = &self.texture {
                    let size = fit_size(texture.size(), ui.available_size());
                    ui.centered_and_justified(|ui| {
                        ui.image((texture.id(), size));
                    });
                } else {
                    ui.label("Image unavailable");
                }
            });

        egui::TopBottomPanel::bottom("chat_input")
            .show(ctx, |ui| self.render_input(ui));

        let mut outcome = SettingsOutcome::Open;
        if let Some(panel) = &mut self.settings {
            outcome = egui::TopBottomPanel::top("settings")
                .show(ctx, |ui| panel.show(ui))
                .inner;
        }
        match outcome {
            SettingsOutcome::Open => {}
            SettingsOutcome::Cancelled => self.settings = None,
            SettingsOutcome::Saved(config) => self.apply_settings(ctx, config),
        }

        egui::CentralPanel::default().show(ctx, |ui| self.render_transcript(ui));

        if self.session.is_pending() {
            // Keep the spinner moving while waiting on the worker
            ctx.request_repaint_after(std::time::Duration::from_millis(100));
        }
        true
    }

    fn render_transcript(&mut self, ui: &mut egui::Ui) {
        egui::ScrollArea::vertical()
            .auto_shrink([false, false])
            .stick_to_bottom(true)
            .show(ui, |ui| {
                for entry in self.session.transcript().entries() {
                    let label = egui::RichText::new(format!("{}:", entry.speaker)).strong();
                    ui.label(match entry.speaker {
                        Speaker::You => label,
                        Speaker::Ai => label.color(ui.visuals().hyperlink_color),
                    });
                    CommonMarkViewer::new().show(ui, &mut self.markdown_cache, &entry.text);
                    ui.add_space(8.0);
                }

                if self.session.is_pending() {
                    ui.horizontal(|ui| {
                        ui.spinner();
                        ui.label(PENDING_NOTICE);
                    });
                }
            });
    }

    fn render_input(&mut self, ui: &mut egui::Ui) {
        ui.add_space(4.0);
        ui.horizontal(|ui| {
            let response = ui.add(
                egui::TextEdit::singleline(&mut self.input)
                    .desired_width(ui.available_width() - 140.0)
                    .hint_text("Ask a follow-up question"),
            );

            let enter_pressed =
                response.lost_focus() && ui.input(|i| i.key_pressed(egui::Key::Enter));
            if ui.button("Send").clicked() || enter_pressed {
                let question = std::mem::take(&mut self.input);
                self.ask(&question);
                response.request_focus();
            }

            let last_answer = self.session.transcript().last_answer();
            if ui
                .add_enabled(last_answer.is_some(), egui::Button::new("Copy"))
                .clicked()
            {
                if let Some(text) = last_answer {
                    copy_to_clipboard(text);
                }
            }

            if ui.button("⚙").clicked() {
                self.settings = match self.settings {
                    Some(_) => None,
                    None => Some(SettingsPanel::new(self.config.clone())),
                };
            }
        });
        ui.add_space(4.0);
    }

    fn apply_settings(&mut self, ctx: &egui::Context, config: AppConfig) {
        if let Err(e) = config.save() {
            warn!("Failed to save settings: {}", e);
        }
        ctx.set_visuals(super::rendering::visuals(config.theme));

        let result = if config.provider == self.provider.info().name {
            self.provider
                .configure(&config.provider_settings(&config.provider))
        } else {
            Provider::from_config(&config).map(|provider| self.provider = Arc::new(provider))
        };

        match result {
            Ok(()) => self.settings = None,
            Err(e) => {
                error!("Failed to configure {}: {}", config.provider, e);
                if let Some(panel) = &mut self.settings {
                    panel.set_error(e.to_string());
                }
            }
        }
        self.config = config;
    }
}

fn load_texture(ctx: &egui::Context, path: &Path) -> Option<egui::TextureHandle> {
    match ImageProcessor::load(path) {
        Ok(image) => Some(ctx.load_texture(
            "captured",
            ImageProcessor::to_color_image(&image),
            egui::TextureOptions::LINEAR,
        )),
        Err(e) => {
            error!("{}", e);
            None
        }
    }
}

fn copy_to_clipboard(text: &str) {
    match arboard::Clipboard::new() {
        Ok(mut clipboard) => {
            if let Err(e) = clipboard.set_text(text) {
                warn!("Failed to copy to clipboard: {}", e);
            }
        }
        Err(e) => warn!("Clipboard unavailable: {}", e),
    }
}

/// Asks `question` about the image on a background thread.
///
/// The answer (or its error text) is sent back tagged with `id`.
fn spawn_analysis(
    provider: Arc<Provider>,
    image_path: PathBuf,
    id: u64,
    question: String,
    tx: Sender<ChatEvent>,
) {
    thread::spawn(move || {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build();

        let text = match runtime {
            Ok(rt) => rt.block_on(provider.analyze_image(&image_path, &question)),
            Err(e) => {
                error!("Failed to create async runtime: {}", e);
                format!("Error analyzing image: {}", e)
            }
        };
        let _ = tx.send(ChatEvent::Answer { id, text });
    });
}
