use anyhow::Result;
use clap::Parser;
use indicatif::{ProgressBar, ProgressStyle};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn, Level};
use tracing_appender::{non_blocking, rolling};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use boba_translate::cli::{Args, Commands, ConfigAction, LanguageAction};
use boba_translate::config::Config;
use boba_translate::engine::TranslationEngine;
use boba_translate::error::TranslateError;
use boba_translate::language::{FilePreferenceStore, LanguagePreference};
use boba_translate::translate::OracleFactory;

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    setup_logging(args.verbose)?;

    info!("Starting boba-translate");

    let config = match &args.config {
        Some(config_path) => Config::from_file(config_path)?,
        None => {
            let default_path = Path::new("boba-translate.toml");
            if default_path.exists() {
                Config::from_file(default_path)?
            } else {
                Config::default()
            }
        }
    };

    match args.command {
        Commands::Config { action } => match action {
            ConfigAction::Init { path } => {
                if path.exists() {
                    return Err(TranslateError::Config(format!(
                        "{} already exists",
                        path.display()
                    ))
                    .into());
                }
                Config::default().save_to_file(&path)?;
                println!("Wrote default configuration to {}", path.display());
            }
            ConfigAction::Show => {
                let rendered = toml::to_string_pretty(&config)?;
                println!("{}", rendered);
            }
        },
        Commands::Languages => {
            let current = saved_preference(&config).current();

            println!("{:<3} {:<8} {:<20}", "", "Code", "Language");
            println!("{}", "-".repeat(32));
            for option in &config.language.supported {
                let marker = if option.code == current { "*" } else { "" };
                println!("{:<3} {:<8} {:<20}", marker, option.code, option.label);
            }
        }
        Commands::Language { action } => {
            let preference = saved_preference(&config);
            match action {
                LanguageAction::Get => println!("{}", preference.current()),
                LanguageAction::Set { code } => {
                    let language = config.language.resolve(&code)?;
                    preference.set(language.clone());
                    println!("Display language set to {}", language);
                }
            }
        }
        Commands::Translate { texts, file, lang } => {
            let mut texts = texts;
            if let Some(file) = file {
                let content = tokio::fs::read_to_string(&file).await?;
                texts.extend(
                    content
                        .lines()
                        .map(str::trim)
                        .filter(|line| !line.is_empty())
                        .map(str::to_string),
                );
            }

            if texts.is_empty() {
                return Err(TranslateError::Config(
                    "Nothing to translate: pass --text or --file".to_string(),
                )
                .into());
            }

            // A one-off --lang does not touch the saved preference
            let engine = match lang {
                Some(code) => {
                    let language = config.language.resolve(&code)?;
                    let oracle = OracleFactory::create_oracle(&config.translate, &config.language.source)?;
                    TranslationEngine::with_oracle(config, oracle, LanguagePreference::new(language))?
                }
                None => TranslationEngine::new(config)?,
            };

            let handle = engine.translation(texts.iter().cloned());

            let spinner = ProgressBar::new_spinner();
            spinner.set_style(ProgressStyle::with_template("{spinner} {msg}")?);
            spinner.set_message(format!("Translating {} strings into {}", texts.len(), engine.language()));
            spinner.enable_steady_tick(Duration::from_millis(100));

            let state = handle.settled().await;
            spinner.finish_and_clear();

            for text in &texts {
                println!("{} => {}", text, state.display(text));
            }

            if let Some(error) = state.error {
                warn!("{}", error);
                eprintln!("{}", error);
            }

            for (language, entries) in engine.cache_stats() {
                info!("Cache holds {} {} translations", entries, language);
            }
        }
    }

    info!("boba-translate finished");
    Ok(())
}

/// Saved display language, falling back to the configured default
fn saved_preference(config: &Config) -> LanguagePreference {
    let store = Arc::new(FilePreferenceStore::new(&config.language.preference_file));
    LanguagePreference::with_store(config.language.default.clone(), store)
}

/// Setup logging to both console and file
fn setup_logging(verbose: bool) -> Result<()> {
    let log_dir = std::env::current_dir()?.join(".boba").join("log");
    std::fs::create_dir_all(&log_dir)?;

    // Set up file appender with daily rotation
    let file_appender = rolling::daily(&log_dir, "boba-translate.log");
    let (non_blocking_file, guard) = non_blocking(file_appender);
    // Keep the guard alive for the duration of the program
    std::mem::forget(guard);

    let log_level = if verbose { Level::DEBUG } else { Level::INFO };

    let console_layer = fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_file(verbose)
        .with_line_number(verbose);

    let file_layer = fmt::layer()
        .with_writer(non_blocking_file)
        .with_target(false)
        .with_thread_ids(true)
        .with_file(true)
        .with_line_number(true)
        .with_ansi(false); // No ANSI colors in file

    tracing_subscriber::registry()
        .with(EnvFilter::from_default_env().add_directive(log_level.into()))
        .with(console_layer)
        .with(file_layer)
        .try_init()
        .map_err(|e| anyhow::anyhow!("Failed to initialize logging: {}", e))?;

    info!(
        "Logging initialized - level: {}, file: {}",
        log_level,
        log_dir.join("boba-translate.log").display()
    );

    Ok(())
}
