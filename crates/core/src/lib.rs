//! shotlens Core Library
//!
//! This library provides the core functionality of the shotlens screenshot
//! tool: region capture, provider dispatch to remote vision models, and the
//! analysis window.
//!
//! # Overview
//!
//! shotlens lets users draw a rectangle over a frozen image of the primary
//! display, saves that region from the live display as a PNG, and opens a
//! chat-style window where questions about the image are answered by Gemini
//! or any OpenAI-compatible endpoint. The library handles:
//!
//! - **Region Capture**: state machine and geometry in [`selection`], live
//!   display reads and PNG output in [`capture`]
//! - **Providers**: one capability interface over every backend via [`providers`]
//! - **Conversation**: transcript and request bookkeeping in [`chat`]
//! - **User Interface**: overlay and analysis window via [`ui`]
//!
//! # Quick Start
//!
//! ```ignore
//! use shotlens_core::ShotLens;
//!
//! let app = ShotLens::new()?;
//! app.run_interactive()?;
//! ```
//!
//! # Module Structure
//!
//! - [`capture`]: Screen capture and screenshot files
//! - [`chat`]: Conversation state of the analysis window
//! - [`config`]: Persisted settings
//! - [`error`]: Error types and result aliases
//! - [`image_processing`]: Coordinate mapping and image encoding
//! - [`providers`]: Gemini and OpenAI-compatible backends
//! - [`selection`]: Selection geometry and the capture controller
//! - [`ui`]: User interface components

pub mod capture;
pub mod chat;
pub mod config;
pub mod error;
pub mod image_processing;
pub mod providers;
pub mod selection;
pub mod ui;

// Re-export primary types for convenience
pub use capture::{MonitorDescriptor, ScreenCapturer};
pub use config::{AppConfig, Theme};
pub use error::{AppError, Result};
pub use providers::{AiProvider, Provider, ProviderEvent};
pub use selection::{CaptureController, Region};

use std::sync::Arc;

/// Main entry point for the shotlens application.
///
/// Holds the loaded settings and the configured provider, which is shared
/// with the analysis window rather than kept in a global.
pub struct ShotLens {
    config: AppConfig,
    provider: Arc<Provider>,
}

impl ShotLens {
    /// Loads the persisted settings and configures the active provider.
    ///
    /// # Errors
    ///
    /// Returns an error if the active provider is unknown or its settings are
    /// invalid (e.g., a missing API key).
    pub fn new() -> Result<Self> {
        Self::with_config(AppConfig::load())
    }

    /// Creates an instance with custom configuration.
    pub fn with_config(config: AppConfig) -> Result<Self> {
        let provider = Arc::new(Provider::from_config(&config)?);
        Ok(Self { config, provider })
    }

    /// Snapshots the primary display and runs the overlay → chat flow.
    pub fn run_interactive(&self) -> Result<()> {
        ui::run(self.config.clone(), self.provider.clone())
    }
}

/// Initializes the library by loading environment variables.
///
/// Call this once at application startup before using any other functions.
/// This loads `.env` files if present.
pub fn init() {
    let _ = dotenvy::dotenv();
}
