use anyhow::{Context, Result, bail};
use arboard::Clipboard;
use clap::{Parser, Subcommand};
use futures::StreamExt;
use indicatif::{ProgressBar, ProgressStyle};
use shotlens_core::{
    AiProvider, AppConfig, AppError, Provider, ProviderEvent, ShotLens, Theme,
    capture::{self, ScreenCapturer}, init,
};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::time::Duration;
use termimad::MadSkin;
use termimad::crossterm::style::Color;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Use this provider for one run instead of the configured one
    #[arg(long, global = true)]
    provider: Option<String>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Select a screen region and chat about it (default)
    Snap,

    /// Send a text-only question
    Ask {
        #[arg(trailing_var_arg = true, required = true)]
        prompt: Vec<String>,

        /// System instruction sent with the prompt
        #[arg(short, long, default_value = "")]
        system: String,

        /// Print fragments as they arrive
        #[arg(long, conflicts_with = "no_stream")]
        stream: bool,

        /// Wait for the full answer
        #[arg(long)]
        no_stream: bool,
    },

    /// Ask a question about an image file
    Analyze {
        image: PathBuf,

        #[arg(trailing_var_arg = true)]
        prompt: Vec<String>,

        /// Copy the result to clipboard automatically
        #[arg(short, long, default_value_t = false)]
        copy: bool,
    },

    /// List available monitors, or save a full screenshot of one
    Monitors {
        /// Save a screenshot of the monitor with this index
        #[arg(long, value_name = "INDEX")]
        capture: Option<usize>,

        /// Directory for the screenshot (default: the screenshots folder)
        #[arg(long, requires = "capture")]
        output: Option<PathBuf>,
    },

    /// Show or change persisted settings
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand, Debug)]
enum ConfigAction {
    /// Print the settings (API keys masked)
    Show,
    /// Set one provider setting, e.g. `config set openai api_model gpt-4o`
    Set {
        provider: String,
        key: String,
        value: String,
    },
    /// Switch the active provider
    Use { provider: String },
    /// Turn response streaming on or off
    Streaming {
        #[arg(value_parser = ["on", "off"])]
        state: String,
    },
    /// Pick the window theme
    Theme { theme: String },
}

#[tokio::main]
async fn main() -> Result<()> {
    init();
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(io::stderr)
        .init();

    let args = Args::parse();
    let mut config = AppConfig::load();
    if let Some(name) = &args.provider {
        config.provider = name.clone();
    }

    match args.command.unwrap_or(Command::Snap) {
        Command::Snap => {
            let app = ShotLens::with_config(config)
                .context("Failed to configure provider. See `shotlens config show`")?;
            app.run_interactive().context("Failed to run the capture window")?;
        }
        Command::Ask {
            prompt,
            system,
            stream,
            no_stream,
        } => {
            let streaming = if stream {
                true
            } else if no_stream {
                false
            } else {
                config.streaming
            };
            let provider = Provider::from_config(&config).context("Failed to configure provider")?;
            ask(&provider, &system, &prompt.join(" "), streaming).await?;
        }
        Command::Analyze {
            image,
            prompt,
            copy,
        } => {
            let provider = Provider::from_config(&config).context("Failed to configure provider")?;
            let mut prompt = prompt.join(" ");
            if prompt.trim().is_empty() {
                prompt = shotlens_core::chat::INITIAL_QUESTION.to_string();
            }

            let spinner = spinner(format!("Analyzing with {}...", provider.info().display_name))?;
            let response = provider.analyze_image(&image, &prompt).await;
            spinner.finish_and_clear();

            print_markdown(&response);
            if copy {
                copy_to_clipboard(&response);
            }
        }
        Command::Monitors {
            capture: screen,
            output,
        } => {
            let capturer = ScreenCapturer::new().context("Failed to initialize screen capturer")?;
            match screen {
                Some(index) => {
                    let dir = match output {
                        Some(dir) => dir,
                        None => capture::screenshot_dir()?,
                    };
                    let path = capturer
                        .save_screen(index, &dir)
                        .with_context(|| format!("Failed to capture monitor {}", index))?;
                    println!("Saved {}", path.display());
                }
                None => {
                    println!("Available monitors:");
                    for info in capturer.list_screen() {
                        println!("{}", info);
                    }
                }
            }
        }
        Command::Config { action } => {
            // Only what is on disk: no env fallbacks, no --provider override
            let path = AppConfig::config_path().context("Cannot locate config directory")?;
            let stored = AppConfig::load_from(&path)
                .with_context(|| format!("Failed to read {}", path.display()))?;
            configure(stored, &path, action)?;
        }
    }

    Ok(())
}

async fn ask(provider: &Provider, system: &str, prompt: &str, streaming: bool) -> Result<()> {
    let spinner = if streaming {
        None
    } else {
        Some(spinner(format!("Asking {}...", provider.info().display_name))?)
    };

    let mut events = provider.get_response(system, prompt, streaming).await;
    let mut answer = String::new();
    let mut stdout = io::stdout();

    while let Some(event) = events.next().await {
        match event {
            ProviderEvent::Fragment(text) if streaming => {
                print!("{}", text);
                stdout.flush()?;
            }
            ProviderEvent::Fragment(text) => answer.push_str(&text),
            ProviderEvent::Blocked(reason) => {
                if let Some(spinner) = &spinner {
                    spinner.finish_and_clear();
                }
                bail!(AppError::Blocked(reason));
            }
            ProviderEvent::Complete => break,
        }
    }

    match spinner {
        Some(spinner) => {
            spinner.finish_and_clear();
            print_markdown(&answer);
        }
        None => println!(),
    }
    Ok(())
}

fn configure(mut config: AppConfig, path: &Path, action: ConfigAction) -> Result<()> {
    match action {
        ConfigAction::Show => {
            println!("{}", serde_json::to_string_pretty(&config.redacted())?);
            return Ok(());
        }
        ConfigAction::Set {
            provider,
            key,
            value,
        } => {
            let info = Provider::by_name(&provider)?.info();
            if info.setting(&key).is_none() {
                let known: Vec<_> = info.settings.iter().map(|s| s.name).collect();
                bail!("{} has no setting '{}' (known: {})", info.display_name, key, known.join(", "));
            }
            config.set_provider_setting(&provider, &key, value);
        }
        ConfigAction::Use { provider } => {
            Provider::by_name(&provider)?;
            config.provider = provider;
        }
        ConfigAction::Streaming { state } => config.streaming = state == "on",
        ConfigAction::Theme { theme } => config.theme = theme.parse::<Theme>()?,
    }

    config.save_to(path).context("Failed to save settings")?;
    println!("Saved {}", path.display());
    Ok(())
}

fn spinner(message: String) -> Result<ProgressBar> {
    let spinner = ProgressBar::new_spinner();
    spinner.set_style(
        ProgressStyle::default_spinner()
            .tick_chars("⠋⠙⠹⠸⠼⠴⠦⠧⠇⠏ ")
            .template("{spinner:.green} {msg}")?,
    );
    spinner.set_message(message);
    spinner.enable_steady_tick(Duration::from_millis(100));
    Ok(spinner)
}

fn copy_to_clipboard(text: &str) {
    match Clipboard::new() {
        Ok(mut clipboard) => {
            if let Err(e) = clipboard.set_text(text) {
                eprintln!("Warning: Failed to copy to clipboard: {}", e);
            } else {
                println!("(Copied to clipboard)");
            }
        }
        Err(e) => eprintln!("Warning: Could not access clipboard: {}", e),
    }
}

/// Helper to print markdown
fn print_markdown(text: &str) {
    let mut skin = MadSkin::default();
    skin.bold.set_fg(Color::Yellow);
    skin.italic.set_fg(Color::Magenta);
    skin.code_block.set_bg(Color::Rgb { r: 40, g: 40, b: 40 });

    skin.print_text(text);
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition() {
        Args::command().debug_assert();
    }

    #[test]
    fn test_no_subcommand_means_snap() {
        let args = Args::try_parse_from(["shotlens"]).unwrap();
        assert!(args.command.is_none());
    }

    #[test]
    fn test_ask_collects_prompt_words() {
        let args =
            Args::try_parse_from(["shotlens", "--provider", "openai", "ask", "--stream", "why", "blue?"])
                .unwrap();
        assert_eq!(args.provider.as_deref(), Some("openai"));
        match args.command {
            Some(Command::Ask { prompt, stream, .. }) => {
                assert_eq!(prompt.join(" "), "why blue?");
                assert!(stream);
            }
            other => panic!("unexpected command: {:?}", other),
        }
    }

    #[test]
    fn test_monitors_capture_by_index() {
        let args =
            Args::try_parse_from(["shotlens", "monitors", "--capture", "1", "--output", "/tmp/shots"])
                .unwrap();
        match args.command {
            Some(Command::Monitors { capture, output }) => {
                assert_eq!(capture, Some(1));
                assert_eq!(output, Some(PathBuf::from("/tmp/shots")));
            }
            other => panic!("unexpected command: {:?}", other),
        }
    }

    #[test]
    fn test_monitors_output_needs_capture() {
        assert!(Args::try_parse_from(["shotlens", "monitors", "--output", "/tmp/shots"]).is_err());
        let args = Args::try_parse_from(["shotlens", "monitors"]).unwrap();
        assert!(matches!(
            args.command,
            Some(Command::Monitors { capture: None, output: None })
        ));
    }

    #[test]
    fn test_stream_flags_conflict() {
        assert!(Args::try_parse_from(["shotlens", "ask", "--stream", "--no-stream", "hi"]).is_err());
    }
}
