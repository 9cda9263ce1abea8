//! # Providers
//!
//! Remote vision/text backends behind one capability interface.
//!
//! The set of backends is closed: [`Provider`] is an enum over the
//! [`GeminiProvider`] and [`OpenAiProvider`] variants, and callers only ever
//! talk to the [`AiProvider`] trait. Switching backends is a matter of
//! building a different variant from the configuration.
//!
//! Text requests come back as a [`ResponseStream`] of [`ProviderEvent`]s,
//! already normalized: fragments have trailing newlines stripped, transport
//! failures become one error fragment, safety rejections become
//! [`ProviderEvent::Blocked`].

pub mod gemini;
pub mod openai;
mod stream;

pub use gemini::GeminiProvider;
pub use openai::OpenAiProvider;
pub use stream::{CancelToken, ProviderEvent, ResponseStream, STREAM_ERROR_MESSAGE};

use crate::config::{AppConfig, ProviderSettings};
use crate::error::{AppError, Result};
use async_trait::async_trait;
use std::path::Path;
use tracing::{debug, error};

/// Describes one named setting of a provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SettingDescriptor {
    pub name: &'static str,
    pub display_name: &'static str,
    pub default_value: &'static str,
    pub description: &'static str,
}

/// Static description of a provider variant.
#[derive(Debug)]
pub struct ProviderInfo {
    /// Key used in the configuration file.
    pub name: &'static str,
    pub display_name: &'static str,
    pub description: &'static str,
    /// Where users obtain a credential.
    pub key_url: &'static str,
    pub settings: &'static [SettingDescriptor],
}

impl ProviderInfo {
    /// Completes `settings` with the defaults of every known setting.
    ///
    /// Unknown keys are dropped; blank values fall back to the default.
    pub fn resolve(&self, settings: &ProviderSettings) -> ProviderSettings {
        self.settings
            .iter()
            .map(|descriptor| {
                let value = settings
                    .get(descriptor.name)
                    .map(|v| v.trim())
                    .filter(|v| !v.is_empty())
                    .unwrap_or(descriptor.default_value);
                (descriptor.name.to_string(), value.to_string())
            })
            .collect()
    }

    /// Looks up a setting descriptor by name.
    pub fn setting(&self, name: &str) -> Option<&SettingDescriptor> {
        self.settings.iter().find(|s| s.name == name)
    }
}

/// Capability interface shared by every provider variant.
#[async_trait]
pub trait AiProvider: Send + Sync {
    /// Static metadata of the variant.
    fn info(&self) -> &'static ProviderInfo;

    /// Validates and stores settings, replacing any previous client.
    fn configure(&self, settings: &ProviderSettings) -> Result<()>;

    /// Sends a single-turn text request.
    ///
    /// Starting a request cancels the previous one still in flight on the
    /// same provider.
    async fn get_response(
        &self,
        system_instruction: &str,
        prompt: &str,
        streaming: bool,
    ) -> ResponseStream;

    /// Asks a question about an image file. Never fails: errors come back as
    /// displayable text.
    ///
    /// Like [`Self::get_response`], starting it supersedes the provider's
    /// previous request, and [`Self::cancel`] aborts it.
    async fn analyze_image(&self, image_path: &Path, prompt: &str) -> String;

    /// Cancels the in-flight request, if any.
    fn cancel(&self);
}

/// The provider variants.
pub enum Provider {
    Gemini(GeminiProvider),
    OpenAi(OpenAiProvider),
}

impl Provider {
    /// Metadata of every variant, in presentation order.
    pub fn all() -> [&'static ProviderInfo; 2] {
        [&gemini::INFO, &openai::INFO]
    }

    /// Creates an unconfigured provider by its configuration name.
    pub fn by_name(name: &str) -> Result<Self> {
        match name {
            n if n == gemini::INFO.name => Ok(Provider::Gemini(GeminiProvider::new())),
            n if n == openai::INFO.name => Ok(Provider::OpenAi(OpenAiProvider::new())),
            other => Err(AppError::UnknownProvider(other.to_string())),
        }
    }

    /// Creates and configures the active provider of `config`.
    pub fn from_config(config: &AppConfig) -> Result<Self> {
        let provider = Self::by_name(&config.provider)?;
        provider.configure(&config.provider_settings(&config.provider))?;
        Ok(provider)
    }

    fn inner(&self) -> &dyn AiProvider {
        match self {
            Provider::Gemini(p) => p,
            Provider::OpenAi(p) => p,
        }
    }
}

#[async_trait]
impl AiProvider for Provider {
    fn info(&self) -> &'static ProviderInfo {
        self.inner().info()
    }

    fn configure(&self, settings: &ProviderSettings) -> Result<()> {
        self.inner().configure(settings)
    }

    async fn get_response(
        &self,
        system_instruction: &str,
        prompt: &str,
        streaming: bool,
    ) -> ResponseStream {
        self.inner()
            .get_response(system_instruction, prompt, streaming)
            .await
    }

    async fn analyze_image(&self, image_path: &Path, prompt: &str) -> String {
        self.inner().analyze_image(image_path, prompt).await
    }

    fn cancel(&self) {
        self.inner().cancel()
    }
}

/// Turns the outcome of an image request into transcript text.
pub(crate) fn analysis_text(provider: &str, result: Result<String>) -> String {
    match result {
        Ok(text) => text,
        Err(AppError::Cancelled) => {
            debug!("{} image analysis superseded", provider);
            format!("Error analyzing image: {}", AppError::Cancelled)
        }
        Err(e) => {
            error!("Error in {} image analysis: {}", provider, e);
            format!("Error analyzing image: {}", e)
        }
    }
}

/// Reads a required, non-blank setting.
pub(crate) fn required(settings: &ProviderSettings, info: &ProviderInfo, name: &str) -> Result<String> {
    settings
        .get(name)
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
        .ok_or_else(|| {
            let display = info.setting(name).map(|s| s.display_name).unwrap_or(name);
            AppError::config(format!("{} requires a non-empty {}", info.display_name, display))
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_by_name() {
        assert!(matches!(Provider::by_name("gemini"), Ok(Provider::Gemini(_))));
        assert!(matches!(Provider::by_name("openai"), Ok(Provider::OpenAi(_))));
        assert!(matches!(
            Provider::by_name("claude"),
            Err(AppError::UnknownProvider(_))
        ));
    }

    #[test]
    fn test_every_variant_requires_a_key() {
        for info in Provider::all() {
            let provider = Provider::by_name(info.name).unwrap();
            assert_eq!(provider.info().name, info.name);
            assert!(matches!(
                provider.configure(&ProviderSettings::new()),
                Err(AppError::Config(_))
            ));
        }
    }

    #[test]
    fn test_resolve_fills_defaults_and_drops_unknown() {
        let mut settings = ProviderSettings::new();
        settings.insert("api_key".into(), " sk-1 ".into());
        settings.insert("api_model".into(), "".into());
        settings.insert("bogus".into(), "x".into());

        let resolved = openai::INFO.resolve(&settings);

        assert_eq!(resolved["api_key"], "sk-1");
        assert_eq!(resolved["api_model"], "gpt-4o-mini");
        assert_eq!(resolved["api_base"], "https://api.openai.com/v1");
        assert!(!resolved.contains_key("bogus"));
    }

    #[test]
    fn test_from_config_uses_active_provider() {
        let mut config = AppConfig::default();
        config.provider = "openai".to_string();
        config.set_provider_setting("openai", "api_key", "sk-test");

        let provider = Provider::from_config(&config).unwrap();
        assert_eq!(provider.info().name, "openai");
    }

    #[test]
    fn test_analysis_text_formats_errors() {
        let text = analysis_text("test", Err(AppError::provider("boom")));
        assert_eq!(text, "Error analyzing image: Provider API error: boom");
        assert_eq!(analysis_text("test", Ok("fine".into())), "fine");
    }

    #[test]
    fn test_analysis_text_reports_cancellation() {
        assert_eq!(
            analysis_text("test", Err(AppError::Cancelled)),
            "Error analyzing image: Request was cancelled"
        );
    }
}
