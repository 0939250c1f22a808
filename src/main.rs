use anyhow::{Context, Result};
use clap::builder::RangedU64ValueParser;
use clap::{Args, Parser, Subcommand};
use gps_graft::core::cache;
use gps_graft::core::creation_key::compose_creation_key;
use gps_graft::core::exiftool::{ExifTool, MetadataTool};
use gps_graft::core::index::IndexStore;
use gps_graft::core::matcher::MatchOptions;
use gps_graft::core::record;
use gps_graft::core::run::{self, ConfigError, HISTORY_FILE, Run, RunConfig, RunSummary};
use std::fmt::Display;
use std::path::PathBuf;
use std::time::Instant;

#[derive(Parser, Debug)]
#[command(
    name = "gps-graft",
    version,
    about = "Copy GPS tags from RAW files onto their matching JPEGs"
)]
struct Cli {
    /// Increase log output (-v info, -vv debug, -vvv trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Match JPEGs to RAWs and copy GPS tags onto the unambiguous matches
    Copy(CopyArgs),

    /// Build or rebuild the RAW metadata cache without matching
    Index(IndexArgs),

    /// Show what the matcher sees for each file
    Inspect {
        /// Files to inspect
        #[arg(value_name = "FILE", required = true)]
        files: Vec<PathBuf>,

        #[command(flatten)]
        tool: ToolArgs,
    },

    /// List the graft history of a JPEG folder
    History {
        /// Folder holding the grafted JPEGs
        #[arg(long, value_name = "DIR")]
        jpeg_root: PathBuf,
    },
}

#[derive(Args, Debug)]
struct ToolArgs {
    /// exiftool executable
    #[arg(long, value_name = "PATH", default_value = "exiftool")]
    exiftool: PathBuf,

    /// Parallel exiftool invocations (default: number of CPUs)
    #[arg(long, value_name = "N", value_parser = RangedU64ValueParser::<usize>::new().range(1..))]
    workers: Option<usize>,

    /// Files per exiftool invocation
    #[arg(long, value_name = "N", default_value_t = 32, value_parser = RangedU64ValueParser::<usize>::new().range(1..))]
    batch_size: usize,
}

#[derive(Args, Debug)]
struct CopyArgs {
    /// Folder of JPEGs to receive GPS tags
    #[arg(long, value_name = "DIR")]
    jpeg_root: PathBuf,

    /// Folder of RAW originals carrying GPS tags
    #[arg(long, value_name = "DIR")]
    raw_root: PathBuf,

    /// Folder of reference JPEGs (e.g. a published edit) used when a JPEG's
    /// own metadata is not enough
    #[arg(long = "ref-jpeg-root", value_name = "DIR")]
    ref_root: Option<PathBuf>,

    /// RAW metadata cache file (default: per RAW folder and extension set, in the user cache dir)
    #[arg(long, value_name = "FILE")]
    raw_cache: Option<PathBuf>,

    /// Ignore the RAW cache and rescan
    #[arg(long)]
    reindex: bool,

    /// Only show what would be copied
    #[arg(long)]
    dry_run: bool,

    /// Only accept RAWs from the same camera body
    #[arg(long)]
    require_serial: bool,

    /// Only accept RAWs shot with the same lens
    #[arg(long = "require-lens-id")]
    require_lens: bool,

    /// RAW file extension (repeatable)
    #[arg(long = "raw-ext", value_name = "EXT", default_values = ["nef"])]
    raw_extensions: Vec<String>,

    /// JPEG file extension (repeatable)
    #[arg(long = "jpeg-ext", value_name = "EXT", default_values = ["jpg", "jpeg"])]
    jpeg_extensions: Vec<String>,

    /// Do not record this run in the JPEG folder's history
    #[arg(long)]
    no_history: bool,

    #[command(flatten)]
    tool: ToolArgs,
}

impl CopyArgs {
    fn run_config(&self) -> RunConfig {
        let mut config = RunConfig::new(&self.jpeg_root, &self.raw_root);
        config.raw_cache = self.raw_cache.clone();
        config.ref_root = self.ref_root.clone();
        config.reindex = self.reindex;
        config.dry_run = self.dry_run;
        config.match_options = MatchOptions {
            require_serial: self.require_serial,
            require_lens: self.require_lens,
        };
        config.raw_extensions = self.raw_extensions.clone();
        config.jpeg_extensions = self.jpeg_extensions.clone();
        config.write_history = !self.no_history;
        config
    }
}

#[derive(Args, Debug)]
struct IndexArgs {
    /// Folder of RAW originals
    #[arg(long, value_name = "DIR")]
    raw_root: PathBuf,

    /// RAW metadata cache file (default: per RAW folder and extension set, in the user cache dir)
    #[arg(long, value_name = "FILE")]
    raw_cache: Option<PathBuf>,

    /// RAW file extension (repeatable)
    #[arg(long = "raw-ext", value_name = "EXT", default_values = ["nef"])]
    raw_extensions: Vec<String>,

    #[command(flatten)]
    tool: ToolArgs,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    setup_logging(cli.verbose);

    match cli.command {
        Commands::Copy(args) => copy(&args),
        Commands::Index(args) => index(&args),
        Commands::Inspect { files, tool } => inspect(&files, &tool),
        Commands::History { jpeg_root } => history(&jpeg_root),
    }
}

fn setup_logging(verbosity: u8) {
    let level = match verbosity {
        0 => log::LevelFilter::Warn,
        1 => log::LevelFilter::Info,
        2 => log::LevelFilter::Debug,
        _ => log::LevelFilter::Trace,
    };

    env_logger::Builder::new()
        .filter_level(level)
        .parse_default_env()
        .init();
}

/// Configuration problems end the process before any work starts.
fn fatal(err: impl Display) -> ! {
    eprintln!("❌ {}", err);
    std::process::exit(2)
}

fn locate_tool(args: &ToolArgs) -> ExifTool {
    let tool = match ExifTool::locate(args.exiftool.clone()) {
        Ok(tool) => tool.with_batch_size(args.batch_size),
        Err(e) => fatal(e),
    };
    match args.workers {
        Some(workers) => tool.with_workers(workers),
        None => tool,
    }
}

fn copy(args: &CopyArgs) -> Result<()> {
    let config = args.run_config();
    if let Err(e) = config.validate() {
        fatal(e);
    }
    let tool = locate_tool(&args.tool);

    println!(
        "▶ Matching JPEGs in {} against RAWs in {}",
        config.jpeg_root.display(),
        config.raw_root.display()
    );
    if let Some(ref_root) = &config.ref_root {
        println!("▶ Reference JPEGs in {}", ref_root.display());
    }

    let dry_run = config.dry_run;
    let write_history = config.write_history;
    let jpeg_root = config.jpeg_root.clone();
    let report = benchmark("matching and copying", || Run::new(&tool, config).execute())?;

    print_summary(&report.summary, dry_run);
    if dry_run {
        println!("\n⚠️  Dry-run only; no files were changed.");
    } else if write_history && !report.grafted.is_empty() {
        println!(
            "\n✅ Recorded graft history in {}",
            jpeg_root.join(HISTORY_FILE).display()
        );
    }
    Ok(())
}

fn print_summary(summary: &RunSummary, dry_run: bool) {
    println!("\n📊 Summary:");
    println!("   JPEGs scanned:           {}", summary.scanned);
    println!("   Without creation key:    {}", summary.without_creation_key);
    println!("   Resolved via reference:  {}", summary.via_reference);
    println!("   Matched:                 {}", summary.matched);
    println!("   Ambiguous (skipped):     {}", summary.ambiguous);
    println!(
        "   GPS copied:              {}{}",
        summary.grafted,
        if dry_run { " (DRY-RUN)" } else { "" }
    );
}

fn index(args: &IndexArgs) -> Result<()> {
    if !args.raw_root.is_dir() {
        fatal(ConfigError::MissingRawRoot(args.raw_root.clone()));
    }
    let tool = locate_tool(&args.tool);
    let cache_path = args
        .raw_cache
        .clone()
        .unwrap_or_else(|| cache::default_cache_path(&args.raw_root, &args.raw_extensions));

    println!("▶ Indexing RAWs in {}", args.raw_root.display());
    let records = benchmark("reading RAW metadata", || {
        run::load_raw_records(&tool, &args.raw_root, &args.raw_extensions, &cache_path, true)
    })?;

    let stats = IndexStore::build(&records).stats();
    println!("   RAW files indexed:       {}", stats.files);
    println!("   Distinct creation keys:  {}", stats.creation_keys);
    println!("   Frame counters:          {}", stats.frame_counters);
    println!("   Image numbers:           {}", stats.image_numbers);
    println!("   File names:              {}", stats.file_names);
    println!("\n✅ Cache: {}", cache_path.display());
    Ok(())
}

fn inspect(files: &[PathBuf], args: &ToolArgs) -> Result<()> {
    let tool = locate_tool(args);
    let tags = record::all_tags();

    for path in files {
        let Some(record) = tool.read_tags(path, &tags) else {
            eprintln!("⚠️  No metadata for {}", path.display());
            continue;
        };
        println!("▶ {}", path.display());
        println!("   creation key:    {}", show(compose_creation_key(&record)));
        println!("   frame counter:   {}", show(record.frame_counter()));
        println!("   body serial:     {}", show(record.body_serial()));
        println!("   lens:            {}", show(record.lens()));
        println!("   preserved name:  {}", show(record.preserved_file_name()));
    }
    Ok(())
}

fn show<T: Display>(value: Option<T>) -> String {
    value.map_or_else(|| "-".to_string(), |v| v.to_string())
}

fn history(jpeg_root: &std::path::Path) -> Result<()> {
    let history_file = jpeg_root.join(HISTORY_FILE);
    let records = run::read_history(&history_file)
        .with_context(|| format!("Could not open history file {:?}", history_file))?;

    println!("🗂️  Graft History:");
    for (i, record) in records.into_iter().enumerate() {
        match record {
            Ok(rec) => {
                println!(
                    "[{}] {}\n     raw root: {}\n     scanned: {} | matched: {} | ambiguous: {} | copied: {}",
                    i,
                    rec.timestamp,
                    rec.raw_root,
                    rec.summary.scanned,
                    rec.summary.matched,
                    rec.summary.ambiguous,
                    rec.summary.grafted
                );
                for pair in &rec.grafted {
                    println!("       {} → {}", pair.raw.display(), pair.jpeg.display());
                }
            }
            Err(err) => eprintln!("⚠️  Skipping malformed entry {}: {}", i, err),
        }
    }
    Ok(())
}

/// Run `f()`, print how long it took (with `label`), and return its result.
fn benchmark<T, F: FnOnce() -> T>(label: &str, f: F) -> T {
    let start = Instant::now();
    let result = f();
    println!("⏱ {} took {:.2?}", label, start.elapsed());
    result
}
