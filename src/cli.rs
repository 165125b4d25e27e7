use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Enable verbose logging
    #[arg(short, long)]
    pub verbose: bool,

    /// Configuration file path
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Translate UI strings into a display language
    Translate {
        /// String to translate (repeatable)
        #[arg(short, long = "text")]
        texts: Vec<String>,

        /// File with one string per line
        #[arg(short, long)]
        file: Option<PathBuf>,

        /// Target language (defaults to the saved preference)
        #[arg(short, long)]
        lang: Option<String>,
    },

    /// List the languages offered to users
    Languages,

    /// Show or change the saved display language
    Language {
        #[command(subcommand)]
        action: LanguageAction,
    },

    /// Manage the configuration file
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand)]
pub enum LanguageAction {
    /// Print the saved display language
    Get,

    /// Save a new display language
    Set {
        /// Language code, e.g. es
        code: String,
    },
}

#[derive(Subcommand)]
pub enum ConfigAction {
    /// Write a default configuration file
    Init {
        /// Where to write it
        #[arg(short, long, default_value = "boba-translate.toml")]
        path: PathBuf,
    },

    /// Print the effective configuration
    Show,
}
