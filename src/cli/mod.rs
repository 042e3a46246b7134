//! Command-line interface for mongo-export
//!
//! This module handles:
//! - Command-line argument parsing using clap
//! - Configuration loading and CLI overrides
//! - Translating arguments into workflow options
//! - Local subcommands (version, completion, config)

use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand};

use crate::config::{Config, LogLevel};
use crate::error::Result;
use crate::export::{
    ExportAggregation, ExportQuery, FileType, Namespace, SchemaPath, parse_document,
    parse_pipeline,
};
use crate::workflow::OpenExportOptions;

pub mod completion;
pub mod fields;

/// Export a MongoDB query or aggregation to CSV or JSON
#[derive(Parser, Debug)]
#[command(
    name = "mongo-export",
    version,
    about = "Export MongoDB documents to CSV or JSON",
    long_about = "Export the result of a find query or an aggregation pipeline on one
collection to a CSV or JSON file, optionally limited to selected fields."
)]
pub struct CliArgs {
    /// MongoDB connection URI
    ///
    /// Format: mongodb://[username:password@]host[:port][/database][?options]
    #[arg(value_name = "URI")]
    pub uri: Option<String>,

    /// Namespace to export from
    #[arg(long = "ns", value_name = "DB.COLLECTION")]
    pub namespace: Option<String>,

    /// Query filter (Extended JSON)
    #[arg(long, value_name = "JSON")]
    pub filter: Option<String>,

    /// Query projection (Extended JSON)
    #[arg(long, value_name = "JSON")]
    pub projection: Option<String>,

    /// Sort specification (Extended JSON)
    #[arg(long, value_name = "JSON")]
    pub sort: Option<String>,

    /// Maximum number of documents
    #[arg(long, value_name = "N")]
    pub limit: Option<u64>,

    /// Number of documents to skip
    #[arg(long, value_name = "N")]
    pub skip: Option<u64>,

    /// Aggregation pipeline (Extended JSON array); replaces the query
    #[arg(long, value_name = "JSON", conflicts_with_all = ["filter", "projection", "sort", "limit", "skip"])]
    pub pipeline: Option<String>,

    /// Export the whole collection, ignoring the query
    #[arg(long)]
    pub full_collection: bool,

    /// Export only these fields (comma-separated dotted paths)
    #[arg(long, value_name = "PATHS", value_delimiter = ',', conflicts_with = "pipeline")]
    pub fields: Vec<String>,

    /// Output file (defaults to a timestamped name in the current directory)
    #[arg(short = 'o', long = "out", value_name = "FILE")]
    pub output: Option<PathBuf>,

    /// Output format: csv or json (defaults to the output extension, then json)
    #[arg(long = "type", value_name = "TYPE")]
    pub file_type: Option<FileType>,

    /// Configuration file path
    #[arg(short = 'c', long = "config", value_name = "FILE")]
    pub config_file: Option<PathBuf>,

    /// Disable colored output
    #[arg(long = "no-color")]
    pub no_color: bool,

    /// Quiet mode (no progress spinner)
    #[arg(short = 'q', long)]
    pub quiet: bool,

    /// Verbose mode (detailed logging)
    #[arg(short = 'v', long)]
    pub verbose: bool,

    /// Very verbose mode (debug logging)
    #[arg(long = "vv")]
    pub very_verbose: bool,

    /// Connection timeout in seconds
    #[arg(long, value_name = "SECONDS")]
    pub timeout: Option<u64>,

    /// Subcommands
    #[command(subcommand)]
    pub command: Option<Commands>,
}

/// Subcommands for mongo-export
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// List the field paths found in a sample of documents
    Fields {
        /// Namespace to sample
        #[arg(long = "ns", value_name = "DB.COLLECTION")]
        namespace: String,

        /// Query filter (Extended JSON)
        #[arg(long, value_name = "JSON")]
        filter: Option<String>,
    },

    /// Show version information
    Version,

    /// Generate shell completion script
    Completion {
        /// Shell type (bash, zsh, fish, powershell)
        #[arg(value_name = "SHELL")]
        shell: String,
    },

    /// Show configuration
    Config {
        /// Show effective configuration
        #[arg(long)]
        show: bool,

        /// Validate configuration file
        #[arg(long)]
        validate: bool,
    },
}

/// CLI interface handler
pub struct CliInterface {
    /// Parsed command-line arguments
    args: CliArgs,

    /// Loaded configuration
    config: Config,
}

impl CliInterface {
    /// Parse the process arguments and load configuration
    pub fn new() -> Result<Self> {
        Self::from_args(CliArgs::parse())
    }

    /// Build from already parsed arguments
    pub fn from_args(args: CliArgs) -> Result<Self> {
        let config = Self::load_config(&args)?;
        Ok(Self { args, config })
    }

    /// Load configuration from file and merge with arguments
    fn load_config(args: &CliArgs) -> Result<Config> {
        let mut config = Config::load_from_file(args.config_file.as_deref())?;

        if let Err(e) = config.validate() {
            eprintln!("Warning: Configuration validation failed: {}", e);
            eprintln!("Using default configuration instead.");
            config = Config::default();
        }

        Self::apply_args_to_config(&mut config, args);
        Ok(config)
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn args(&self) -> &CliArgs {
        &self.args
    }

    /// Connection URI: the positional argument, else the configured default
    pub fn connection_uri(&self) -> String {
        self.args
            .uri
            .clone()
            .unwrap_or_else(|| self.config.connection.default_uri.clone())
    }

    /// Whether colours should be used on the terminal
    pub fn color_enabled(&self) -> bool {
        !self.args.no_color
    }

    /// Translate the arguments into workflow options
    ///
    /// # Returns
    /// * `Result<OpenExportOptions>` - Options, or a parse error for a bad
    ///   namespace or JSON argument
    pub fn open_options(&self) -> Result<OpenExportOptions> {
        let namespace = self.args.namespace.as_deref().ok_or_else(|| {
            crate::error::ParseError::InvalidNamespace(
                "missing --ns <db.collection>".to_string(),
            )
        })?;
        let namespace = Namespace::parse(namespace)?.to_string();

        let aggregation = self
            .args
            .pipeline
            .as_deref()
            .map(parse_pipeline)
            .transpose()?
            .map(|stages| ExportAggregation { stages });

        let query = if aggregation.is_some() {
            None
        } else {
            Some(self.query()?)
        };

        Ok(OpenExportOptions {
            namespace,
            query,
            aggregation,
            export_full_collection: self.args.full_collection,
        })
    }

    fn query(&self) -> Result<ExportQuery> {
        let parse = |name: &str, json: &Option<String>| {
            json.as_deref().map(|j| parse_document(name, j)).transpose()
        };

        let mut query = ExportQuery::default();
        if !self.args.full_collection {
            if let Some(filter) = parse("filter", &self.args.filter)? {
                query.filter = filter;
            }
            query.projection = parse("projection", &self.args.projection)?;
            query.sort = parse("sort", &self.args.sort)?;
            query.limit = self.args.limit;
            query.skip = self.args.skip;
        }
        Ok(query)
    }

    /// Field paths given with `--fields`
    pub fn selected_fields(&self) -> Vec<SchemaPath> {
        self.args
            .fields
            .iter()
            .map(|field| field.trim())
            .filter(|field| !field.is_empty())
            .map(|field| field.split('.').map(str::to_string).collect())
            .collect()
    }

    /// Output path and format
    ///
    /// The format comes from `--type`, else from the output extension, else
    /// JSON. Without `-o` a timestamped name is generated.
    pub fn export_target(&self) -> (PathBuf, FileType) {
        let file_type = self
            .args
            .file_type
            .or_else(|| {
                self.args
                    .output
                    .as_deref()
                    .and_then(Path::extension)
                    .and_then(|ext| ext.to_str())
                    .and_then(|ext| ext.parse().ok())
            })
            .unwrap_or(FileType::Json);

        let path = self
            .args
            .output
            .clone()
            .unwrap_or_else(|| default_file_name(file_type));

        (path, file_type)
    }

    /// Apply CLI arguments to configuration
    fn apply_args_to_config(config: &mut Config, args: &CliArgs) {
        Self::apply_logging_args(config, args);
        Self::apply_connection_args(config, args);
    }

    fn apply_logging_args(config: &mut Config, args: &CliArgs) {
        config.logging.level = if args.very_verbose {
            LogLevel::Trace
        } else if args.verbose {
            LogLevel::Debug
        } else if args.quiet {
            LogLevel::Error
        } else {
            config.logging.level
        };
    }

    fn apply_connection_args(config: &mut Config, args: &CliArgs) {
        if let Some(timeout) = args.timeout {
            config.connection.timeout = timeout;
        }
    }

    /// Handle subcommands that need no connection
    ///
    /// # Returns
    /// * `Result<bool>` - True if a subcommand was handled, false to continue
    pub fn handle_subcommand(&self) -> Result<bool> {
        match &self.args.command {
            Some(Commands::Version) => {
                self.show_version();
                Ok(true)
            }
            Some(Commands::Completion { shell }) => {
                completion::generate_completion(shell)?;
                Ok(true)
            }
            Some(Commands::Config { show, validate }) => {
                self.handle_config_command(*show, *validate)?;
                Ok(true)
            }
            Some(Commands::Fields { .. }) | None => Ok(false),
        }
    }

    fn show_version(&self) {
        println!("mongo-export version {}", env!("CARGO_PKG_VERSION"));
        println!("Rust version: {}", env!("CARGO_PKG_RUST_VERSION"));
    }

    fn handle_config_command(&self, show: bool, validate: bool) -> Result<()> {
        if validate {
            self.validate_config_file();
        }

        if show {
            self.show_config()?;
        }

        Ok(())
    }

    fn validate_config_file(&self) {
        let path = self.get_config_path();
        println!("Validating configuration file: {}", path.display());

        if !path.exists() {
            println!("Configuration file does not exist");
            return;
        }

        match Config::from_file(&path) {
            Ok(config) => match config.validate() {
                Ok(()) => println!("Configuration is valid"),
                Err(e) => println!("Configuration validation failed: {}", e),
            },
            Err(e) => println!("Failed to load configuration: {}", e),
        }
    }

    fn show_config(&self) -> Result<()> {
        let path = self.get_config_path();
        println!("# Configuration file: {}", path.display());
        println!();
        println!("{}", self.config.to_toml()?);
        Ok(())
    }

    fn get_config_path(&self) -> PathBuf {
        self.args
            .config_file
            .clone()
            .unwrap_or_else(Config::default_config_path)
    }
}

/// `export-YYYY-MM-DD_HH-MM-SS.<ext>` in the current directory
pub fn default_file_name(file_type: FileType) -> PathBuf {
    let stamp = chrono::Local::now().format("%Y-%m-%d_%H-%M-%S");
    PathBuf::from(format!("export-{}.{}", stamp, file_type.extension()))
}
