use std::path::PathBuf;
use std::process::ExitCode;

use arrow::util::pretty::pretty_format_batches;
use clap::{Parser, Subcommand, ValueEnum};
use tracing_subscriber::EnvFilter;

use treeimport::importer::{ENTRIES_KEY, SOURCE_KEY, VERSION_KEY};
use treeimport::input::ParquetInput;
use treeimport::{ImportOptions, Importer, ParquetArtifact, StoreCompression, TreeDump};

#[derive(Debug, Clone, Copy, ValueEnum)]
enum CliCompression {
    /// Zstandard (default)
    Zstd,
    /// Snappy
    Snappy,
    /// No compression
    None,
}

impl From<CliCompression> for StoreCompression {
    fn from(c: CliCompression) -> Self {
        match c {
            CliCompression::Zstd => StoreCompression::Zstd,
            CliCompression::Snappy => StoreCompression::Snappy,
            CliCompression::None => StoreCompression::None,
        }
    }
}

/// Import legacy branch trees into typed Parquet stores
#[derive(Parser, Debug)]
#[command(name = "treeimport", version, about)]
struct Cli {
    /// Log debug events (overridden by RUST_LOG)
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Import a JSON tree dump into a store
    Import(ImportArgs),

    /// Print the schema, metadata and rows of a store
    Inspect(InspectArgs),
}

#[derive(Parser, Debug)]
struct ImportArgs {
    /// JSON tree dump
    input: PathBuf,

    /// Output artifact directory
    #[arg(short, long)]
    output: PathBuf,

    /// Store name (default: tree name)
    #[arg(long)]
    name: Option<String>,

    /// Suppress progress output
    #[arg(short, long)]
    quiet: bool,

    /// Entries per record batch
    #[arg(long, default_value_t = 1000)]
    batch_size: usize,

    /// Import only the first N entries
    #[arg(long)]
    max_entries: Option<u64>,

    /// Replace '.' in branch names with '_'
    #[arg(long)]
    convert_dots: bool,

    /// Column compression
    #[arg(long, value_enum, default_value = "zstd")]
    compression: CliCompression,
}

#[derive(Parser, Debug)]
struct InspectArgs {
    /// Artifact directory
    artifact: PathBuf,

    /// Store name
    store: String,

    /// Maximum number of rows to print
    #[arg(long, default_value_t = 20)]
    limit: usize,
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let default_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_target(false)
        .with_writer(std::io::stderr)
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .init();

    match cli.command {
        Commands::Import(args) => run_import(args),
        Commands::Inspect(args) => run_inspect(args),
    }
}

fn run_import(args: ImportArgs) -> ExitCode {
    let mut tree = match TreeDump::from_path(&args.input).and_then(|dump| dump.into_tree()) {
        Ok(tree) => tree,
        Err(e) => {
            eprintln!("Error reading {}: {}", args.input.display(), e);
            return ExitCode::FAILURE;
        }
    };

    let mut artifact = match ParquetArtifact::new(&args.output) {
        Ok(artifact) => artifact.with_compression(args.compression.into()),
        Err(e) => {
            eprintln!("Error opening {}: {}", args.output.display(), e);
            return ExitCode::FAILURE;
        }
    };

    let options = ImportOptions {
        store_name: args.name,
        quiet: args.quiet,
        batch_size: args.batch_size,
        max_entries: args.max_entries,
        convert_dots_in_branch_names: args.convert_dots,
    };

    let result = Importer::with_options(&mut tree, &mut artifact, options).import();
    match result {
        Ok(stats) => {
            eprintln!(
                "Imported {} entries ({} fields) into store '{}' in {}",
                stats.entries,
                stats.fields,
                stats.store_name,
                args.output.display()
            );
            ExitCode::SUCCESS
        }
        Err(e) => {
            eprintln!("Error: {}", e);
            ExitCode::FAILURE
        }
    }
}

fn run_inspect(args: InspectArgs) -> ExitCode {
    let table = match ParquetInput::new(&args.artifact).and_then(|input| input.open_store(&args.store)) {
        Ok(table) => table,
        Err(e) => {
            eprintln!("Error: {}", e);
            return ExitCode::FAILURE;
        }
    };

    println!("store: {} ({} rows)", table.name(), table.num_rows());
    for field in table.schema().fields() {
        println!("  {}: {}", field.name(), field.data_type());
    }
    for key in [SOURCE_KEY, ENTRIES_KEY, VERSION_KEY] {
        if let Some(value) = table.metadata(key) {
            println!("{} = {}", key, value);
        }
    }

    if table.schema().fields().is_empty() || args.limit == 0 {
        return ExitCode::SUCCESS;
    }
    let rows = table.batch().slice(0, args.limit.min(table.num_rows()));
    match pretty_format_batches(&[rows]) {
        Ok(formatted) => {
            println!("{}", formatted);
            ExitCode::SUCCESS
        }
        Err(e) => {
            eprintln!("Error formatting rows: {}", e);
            ExitCode::FAILURE
        }
    }
}
