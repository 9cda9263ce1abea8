//! Settings panel of the analysis window.
//!
//! Edits a draft copy of the [`AppConfig`]; nothing is persisted until the
//! user presses Save.

use crate::config::{AppConfig, Theme};
use crate::providers::{Provider, ProviderInfo};
use eframe::egui;

/// Image answers arrive whole; the streaming flag only affects text questions
/// asked from the terminal.
const STREAMING_LABEL: &str = "Stream `shotlens ask` answers in the terminal";
const STREAMING_HINT: &str =
    "Image analysis in this window always waits for the full answer.";

/// What the user did with the panel this frame.
pub enum SettingsOutcome {
    Open,
    Cancelled,
    Saved(AppConfig),
}

pub struct SettingsPanel {
    draft: AppConfig,
    error: Option<String>,
}

impl SettingsPanel {
    pub fn new(config: AppConfig) -> Self {
        Self {
            draft: config,
            error: None,
        }
    }

    /// Shows an error under the form, e.g. when the new settings are rejected.
    pub fn set_error(&mut self, message: String) {
        self.error = Some(message);
    }

    fn selected_info(&self) -> Option<&'static ProviderInfo> {
        Provider::all()
            .into_iter()
            .find(|info| info.name == self.draft.provider)
    }

    /// Fills in the defaults of every setting of the selected provider so the
    /// form shows them.
    fn fill_defaults(&mut self) {
        if let Some(info) = self.selected_info() {
            let resolved = info.resolve(&self.draft.provider_settings(info.name));
            let stored = self.draft.providers.entry(info.name.to_string()).or_default();
            for (key, value) in resolved {
                stored.entry(key).or_insert(value);
            }
        }
    }

    pub fn show(&mut self, ui: &mut egui::Ui) -> SettingsOutcome {
        self.fill_defaults();
        ui.heading("Settings");

        let selected_text = self
            .selected_info()
            .map(|info| info.display_name)
            .unwrap_or("Unknown");
        egui::ComboBox::from_label("Provider")
            .selected_text(selected_text)
            .show_ui(ui, |ui| {
                for info in Provider::all() {
                    ui.selectable_value(
                        &mut self.draft.provider,
                        info.name.to_string(),
                        info.display_name,
                    );
                }
            });

        if let Some(info) = self.selected_info() {
            ui.label(egui::RichText::new(info.description).small());
            ui.hyperlink_to("Get an API key", info.key_url);

            egui::Grid::new("provider_settings")
                .num_columns(2)
                .spacing([8.0, 4.0])
                .show(ui, |ui| {
                    let stored = self.draft.providers.entry(info.name.to_string()).or_default();
                    for descriptor in info.settings {
                        ui.label(descriptor.display_name);
                        let value = stored.entry(descriptor.name.to_string()).or_default();
                        ui.add(
                            egui::TextEdit::singleline(value)
                                .password(descriptor.name == "api_key")
                                .hint_text(descriptor.description)
                                .desired_width(280.0),
                        );
                        ui.end_row();
                    }
                });
        }

        ui.checkbox(&mut self.draft.streaming, STREAMING_LABEL)
            .on_hover_text(STREAMING_HINT);
        ui.horizontal(|ui| {
            ui.label("Theme:");
            ui.radio_value(&mut self.draft.theme, Theme::Dark, "Dark");
            ui.radio_value(&mut self.draft.theme, Theme::Light, "Light");
        });

        if let Some(error) = &self.error {
            ui.colored_label(ui.visuals().error_fg_color, error);
        }

        let mut outcome = SettingsOutcome::Open;
        ui.horizontal(|ui| {
            if ui.button("Save").clicked() {
                self.error = None;
                outcome = SettingsOutcome::Saved(self.draft.clone());
            }
            if ui.button("Cancel").clicked() {
                outcome = SettingsOutcome::Cancelled;
            }
        });
        ui.add_space(4.0);
        outcome
    }
}
