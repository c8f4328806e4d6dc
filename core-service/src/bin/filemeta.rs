//! filemeta - inspect document, image and video metadata from the terminal
//!
//! Prints one block per file and optionally exports the same rows as CSV or
//! the full results as JSON.

use anyhow::{Context as _, Result};
use clap::Parser;
use core_async::runtime::worker_runtime;
use core_runtime::config::{
    ExtractorConfig, DEFAULT_CACHE_CAPACITY, DEFAULT_FFPROBE_PATH,
    DEFAULT_MAX_CONCURRENT_EXTRACTIONS,
};
use core_runtime::logging::{init_logging, LogFormat, LogLevel, LoggingConfig};
use core_service::report::{to_json, MetadataReport};
use core_service::MetadataService;
use std::path::PathBuf;
use std::time::Duration;
use tracing::info;

#[derive(Parser, Debug)]
#[command(
    name = "filemeta",
    version,
    about = "Extract metadata from documents, images and videos",
    after_help = "EXAMPLES:\n  \
                  filemeta report.docx photo.jpg clip.mp4\n  \
                  filemeta *.pdf --csv metadata.csv\n  \
                  filemeta clip.mov --json --timeout-secs 30"
)]
struct Cli {
    /// Files to inspect
    #[arg(required = true)]
    paths: Vec<PathBuf>,

    /// Export the rows to this CSV file (a numeric suffix is added if it exists)
    #[arg(long, value_name = "FILE")]
    csv: Option<PathBuf>,

    /// Print results as JSON instead of a table
    #[arg(long)]
    json: bool,

    /// Seconds a result stays cached
    #[arg(long, value_name = "N", default_value_t = 60)]
    ttl_secs: u64,

    /// Maximum number of cached results
    #[arg(long, value_name = "N", default_value_t = DEFAULT_CACHE_CAPACITY)]
    cache_capacity: usize,

    /// Maximum number of files parsed at the same time
    #[arg(long, value_name = "N", default_value_t = DEFAULT_MAX_CONCURRENT_EXTRACTIONS)]
    max_concurrent: usize,

    /// Give up on a single file after this many seconds
    #[arg(long, value_name = "N")]
    timeout_secs: Option<u64>,

    /// ffprobe executable used for video files
    #[arg(long, value_name = "PATH", default_value = DEFAULT_FFPROBE_PATH)]
    ffprobe: String,

    /// Log format: pretty, json or compact
    #[arg(long, value_name = "FORMAT")]
    log_format: Option<LogFormat>,

    /// Increase log verbosity (-v info, -vv debug, -vvv trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

impl Cli {
    fn extractor_config(&self) -> Result<ExtractorConfig> {
        let mut builder = ExtractorConfig::builder()
            .cache_ttl(Duration::from_secs(self.ttl_secs))
            .cache_capacity(self.cache_capacity)
            .max_concurrent_extractions(self.max_concurrent)
            .ffprobe_path(self.ffprobe.clone());
        if let Some(secs) = self.timeout_secs {
            builder = builder.extraction_timeout(Duration::from_secs(secs));
        }
        builder.build().context("Invalid extraction settings")
    }

    fn logging_config(&self) -> LoggingConfig {
        let config = LoggingConfig::default().with_level(LogLevel::from_verbosity(self.verbose));
        match self.log_format {
            Some(format) => config.with_format(format),
            None => config,
        }
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.logging_config()).context("Failed to initialize logging")?;

    let service = MetadataService::new(cli.extractor_config()?)
        .context("Failed to start metadata service")?;

    let runtime = worker_runtime(None).context("Failed to start worker runtime")?;
    let results = runtime
        .block_on(service.inspect(cli.paths.clone()))
        .context("Error inspecting files")?;

    let report = MetadataReport::from_aggregate(&results);
    if cli.json {
        println!("{}", to_json(&results)?);
    } else {
        print!("{}", report);
    }

    if let Some(target) = &cli.csv {
        let written = report
            .export_csv(target)
            .with_context(|| format!("Failed to export CSV to {}", target.display()))?;
        info!(path = %written.display(), "Data exported to file");
        eprintln!("Exported to {}", written.display());
    }

    if results.failed() > 0 {
        info!(
            succeeded = results.succeeded(),
            failed = results.failed(),
            "some files could not be inspected"
        );
    }

    Ok(())
}
