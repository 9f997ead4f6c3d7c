use std::path::PathBuf;

use bitscout::write_behind::DEFAULT_QUEUE_CAPACITY;
use clap::{CommandFactory, Parser, Subcommand};
use clap_complete::Shell;

#[derive(Debug, Parser)]
#[command(
    name = "bitscout",
    about = "Query a local document index with a small attribute filter language"
)]
pub struct Cli {
    /// Override the XDG data directory
    #[arg(long, global = true)]
    pub data_dir: Option<PathBuf>,

    /// Maximum number of pending durable writes before new ones are dropped
    #[arg(
        long,
        global = true,
        default_value_t = DEFAULT_QUEUE_CAPACITY,
        value_parser = parse_queue_capacity
    )]
    pub queue_capacity: usize,

    /// Increase log verbosity (can be repeated: -v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Only log warnings and errors
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    pub quiet: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Load every file under a directory into the index
    Ingest(IngestArgs),
    /// Search the index with a query or a plain substring
    Search(SearchArgs),
    /// Print a single document by ID
    Get(GetArgs),
    /// Delete documents by ID
    Delete(DeleteArgs),
    /// Inspect or change the index configuration
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
    /// Show index and storage statistics
    Status(StatusArgs),
    /// Generate shell completions
    #[command(hide = true)]
    Completions(CompletionsArgs),
}

// -- Ingest --

#[derive(Debug, Parser)]
pub struct IngestArgs {
    /// Directory to load documents from
    pub dir: PathBuf,

    /// Only load files with these extensions (comma-separated, e.g. md,txt)
    #[arg(long, value_delimiter = ',')]
    pub ext: Vec<String>,
}

// -- Search --

#[derive(Debug, Parser)]
pub struct SearchArgs {
    /// Query such as `fileExtension=md and fileSize>1000`, or plain text
    pub query: String,

    /// Output results as JSON
    #[arg(long)]
    pub json: bool,

    /// Output only document IDs (one per line)
    #[arg(long, conflicts_with = "json")]
    pub ids: bool,
}

// -- Get --

#[derive(Debug, Parser)]
pub struct GetArgs {
    /// Document ID
    pub id: String,

    /// Output as JSON
    #[arg(long)]
    pub json: bool,
}

// -- Delete --

#[derive(Debug, Parser)]
pub struct DeleteArgs {
    /// IDs of the documents to delete
    #[arg(required = true)]
    pub ids: Vec<String>,
}

// -- Config subcommands --

#[derive(Debug, Subcommand)]
pub enum ConfigAction {
    /// Print the current configuration
    Show {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Set one option; the value is parsed as JSON, else taken as a string
    Set { key: String, value: String },
    /// Replace the whole configuration with a JSON object read from a file
    Import { file: PathBuf },
}

// -- Status --

#[derive(Debug, Parser)]
pub struct StatusArgs {
    /// Output as JSON
    #[arg(long)]
    pub json: bool,
}

fn parse_queue_capacity(raw: &str) -> Result<usize, String> {
    match raw.parse::<usize>() {
        Ok(0) => Err("queue capacity must be at least 1".into()),
        Ok(n) => Ok(n),
        Err(e) => Err(e.to_string()),
    }
}

// -- Completions --

#[derive(Debug, Parser)]
pub struct CompletionsArgs {
    /// Shell to generate completions for
    #[arg(value_enum)]
    pub shell: Shell,
}

impl CompletionsArgs {
    /// Generate shell completions and print to stdout.
    pub fn generate(&self) {
        let mut cmd = Cli::command();
        clap_complete::generate(
            self.shell,
            &mut cmd,
            "bitscout",
            &mut std::io::stdout(),
        );
    }
}
