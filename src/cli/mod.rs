//! CLI module for Svar.

pub mod commands;
mod output;
pub mod preflight;

pub use output::Output;

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Svar - Answers from your video transcripts
///
/// Index processed transcripts and course catalogs, then ask questions and get
/// answers that cite the videos they came from.
/// The name "Svar" is the Norwegian/Scandinavian word for "answer."
#[derive(Parser, Debug)]
#[command(name = "svar")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Increase verbosity (-v for info, -vv for debug, -vvv for trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Path to configuration file
    #[arg(short, long, global = true)]
    pub config: Option<String>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Chunk, embed and index every .txt transcript in a directory
    Ingest {
        /// Directory of processed transcript files
        dir: PathBuf,
    },

    /// Load a course catalog CSV for recommendations
    Courses {
        /// CSV file with course_name/title and course_url/url columns
        csv: PathBuf,
    },

    /// Ask a question and get a cited answer
    Ask {
        /// The question to ask
        question: String,

        /// Number of transcript chunks to retrieve
        #[arg(short = 'n', long)]
        n_results: Option<usize>,

        /// Number of courses to recommend
        #[arg(long)]
        n_course_recs: Option<usize>,
    },

    /// Search for relevant transcript passages
    Search {
        /// Search query
        query: String,

        /// Maximum number of results
        #[arg(short, long, default_value = "5")]
        limit: usize,
    },

    /// List indexed videos
    List,

    /// Show index and model status
    Status,

    /// Start HTTP API server for integration with other systems
    Serve {
        /// Host to bind to
        #[arg(long, default_value = "127.0.0.1")]
        host: String,

        /// Port to bind to
        #[arg(short, long, default_value = "8000")]
        port: u16,
    },

    /// Manage configuration
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand, Debug)]
pub enum ConfigAction {
    /// Show current configuration
    Show,

    /// Show configuration file path
    Path,
}
