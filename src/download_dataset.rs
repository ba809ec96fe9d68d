/*
cargo download_dataset

cargo download_dataset \
    --source local \
    --dataset ~/.cache/kagglehub/datasets/ammarmoustafa/mediterranean-plants/files \
    --out-file lib/mediterranean_plants_data.json \
    --sorted
*/

use std::fs::{create_dir_all, File};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::Local;
use clap::Parser;
use indicatif::{ProgressBar, ProgressStyle};
use log::{info, warn};
use simplelog::{
    ColorChoice, CombinedLogger, Config as LogConfig, LevelFilter, TermLogger, TerminalMode,
    WriteLogger,
};

use plant_dataset::{
    fetch_dataset, process_dataset, DatasetSource, Discovery, FetchOptions, DEFAULT_DATASET,
    DEFAULT_OUTPUT,
};

// Download a plant dataset and flatten it into one JSON file.
#[derive(Parser, Debug)]
#[command(version, about)]
struct Cli {
    // Dataset id (Kaggle "<owner>/<slug>", Hub repo id, or a local directory)
    #[arg(long, default_value = DEFAULT_DATASET)]
    dataset: String,

    // Where the dataset comes from
    #[arg(long, value_enum, default_value_t = DatasetSource::Kaggle)]
    source: DatasetSource,

    // Output file relative to the working directory, overwritten if it exists
    #[arg(long = "out-file", value_name = "PATH", default_value = DEFAULT_OUTPUT)]
    out_file: PathBuf,

    // Download cache (default: <user cache>/kagglehub)
    #[arg(long, value_name = "DIR", env = "KAGGLEHUB_CACHE")]
    cache_dir: Option<PathBuf>,

    // Ignore a cached copy and download again
    #[arg(long, default_value_t = false)]
    force_download: bool,

    // Read files in path order instead of filesystem order
    #[arg(long, default_value_t = false)]
    sorted: bool,

    // Kaggle credentials (falls back to ~/.kaggle/kaggle.json)
    #[arg(long, env = "KAGGLE_USERNAME")]
    kaggle_username: Option<String>,
    #[arg(long, env = "KAGGLE_KEY", hide_env_values = true)]
    kaggle_key: Option<String>,

    // HF access token (falls back to cached creds)
    #[arg(long, env = "HF_TOKEN", hide_env_values = true)]
    hf_token: Option<String>,

    #[arg(long, default_value = "logs")]
    log_dir: PathBuf,
}

fn main() {
    let cli = Cli::parse();
    if let Err(e) = run(cli) {
        // {:?} prints the whole cause chain
        eprintln!("\n❌ Error: {e:?}");
        std::process::exit(1);
    }
}

fn run(cli: Cli) -> Result<()> {
    // logging setup
    create_dir_all(&cli.log_dir)
        .with_context(|| format!("creating {}", cli.log_dir.display()))?;
    let ts = Local::now().format("%Y%m%d_%H%M%S");
    let log_path = cli.log_dir.join(format!("download_dataset_{ts}.log"));
    CombinedLogger::init(vec![
        WriteLogger::new(
            LevelFilter::Info,
            LogConfig::default(),
            File::create(&log_path)?,
        ),
        TermLogger::new(
            LevelFilter::Warn,
            LogConfig::default(),
            TerminalMode::Stderr,
            ColorChoice::Auto,
        ),
    ])?;
    info!("Starting dataset download: {} ({:?})", cli.dataset, cli.source);

    // fetch
    println!("Downloading {} dataset...", cli.dataset);
    let opts = FetchOptions {
        cache_dir: cli.cache_dir.clone(),
        force_download: cli.force_download,
        kaggle_username: cli.kaggle_username.clone(),
        kaggle_key: cli.kaggle_key.clone(),
        hf_token: cli.hf_token.clone(),
    };
    let dataset_path = fetch_dataset(cli.source, &cli.dataset, &opts)
        .with_context(|| format!("fetching {}", cli.dataset))?;
    println!("Path to dataset files: {}", dataset_path.display());

    let discovery = Discovery::new(cli.sorted);
    list_files(&discovery, &dataset_path)?;

    // merge + write
    let bar = ProgressBar::new(0);
    bar.set_style(
        ProgressStyle::with_template("{spinner:.green} {msg} [{bar:40.cyan/blue}] {pos}/{len}")
            .unwrap_or_else(|_| ProgressStyle::default_bar()),
    );
    let (doc, report) = process_dataset(&dataset_path, &cli.out_file, discovery, &bar)?;

    if !report.skipped.is_empty() {
        println!("Unreadable files skipped: {}", report.skipped.len());
    }
    if report.format.is_none() {
        warn!("No JSON or CSV data found under {:?}", dataset_path);
    }

    println!("\nProcessed dataset saved to: {}", cli.out_file.display());
    println!("Total plants found: {}", doc.total_plants);

    println!("\n✅ Dataset download and processing completed successfully!");
    println!("📁 Dataset location: {}", dataset_path.display());
    println!("📄 Processed JSON: {}", cli.out_file.display());
    println!("Log file           : {:?}", log_path);

    Ok(())
}

fn list_files(discovery: &Discovery, root: &Path) -> Result<()> {
    println!("\nFiles in dataset:");
    let files = discovery
        .all_files(root)
        .with_context(|| format!("listing {}", root.display()))?;
    for path in files {
        let rel = path.strip_prefix(root).unwrap_or(&path);
        println!("  - {}", rel.display());
    }
    Ok(())
}
