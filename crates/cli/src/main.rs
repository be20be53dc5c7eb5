use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{anyhow, bail, Context, Result};
use clap::Parser;
use tracing::{debug, error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use transmute_core::{
    load_config, validate_config, Config, ConversionOptions, ConversionSession, Dimensions,
    DirectorySink, FormatId, FormatRegistry, Orchestrator, Packager, PackagingError,
    PackagingStrategy, SessionEvent,
};

/// Convert a batch of images or audio files to one common format.
#[derive(Debug, Parser)]
#[command(name = "transmute", version, about)]
struct Cli {
    /// Target format id or extension (e.g. `webp`, `jpg`, `mp3`).
    #[arg(long)]
    to: Option<String>,

    /// Directory results are written to.
    #[arg(long, default_value = ".")]
    out: PathBuf,

    /// Bundle several results into one zip archive (the default).
    #[arg(long, conflicts_with = "multiple")]
    zip: bool,

    /// Save several results as separate files.
    #[arg(long)]
    multiple: bool,

    /// Lossy image quality in (0, 1].
    #[arg(long)]
    quality: Option<f32>,

    /// Output width in pixels, together with --height.
    #[arg(long, requires = "height")]
    width: Option<u32>,

    /// Output height in pixels, together with --width.
    #[arg(long, requires = "width")]
    height: Option<u32>,

    /// Extra output size as WxH; repeat for several.
    #[arg(long = "size", value_parser = parse_size)]
    sizes: Vec<Dimensions>,

    /// Audio bitrate in kbps.
    #[arg(long)]
    bitrate: Option<u32>,

    /// TOML configuration file.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Print every known format and its targets, then exit.
    #[arg(long)]
    list_formats: bool,

    /// Print the targets the given files have in common, then exit.
    #[arg(long)]
    targets: bool,

    /// Input files.
    files: Vec<PathBuf>,
}

fn parse_size(s: &str) -> Result<Dimensions, String> {
    let (w, h) = s
        .split_once(['x', 'X'])
        .ok_or_else(|| format!("expected WxH, got {}", s))?;
    let width = w.trim().parse().map_err(|_| format!("bad width in {}", s))?;
    let height = h.trim().parse().map_err(|_| format!("bad height in {}", s))?;
    Ok(Dimensions::new(width, height))
}

#[tokio::main]
async fn main() -> ExitCode {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    match run(Cli::parse()).await {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::FAILURE,
        Err(e) => {
            error!("Fatal error: {:#}", e);
            ExitCode::FAILURE
        }
    }
}

/// Returns whether every file converted (cancellations aside) and was saved.
async fn run(cli: Cli) -> Result<bool> {
    let registry = FormatRegistry::standard();
    if cli.list_formats {
        list_formats(registry);
        return Ok(true);
    }

    let config = match &cli.config {
        Some(path) => load_config(path)
            .with_context(|| format!("Failed to load config from {:?}", path))?,
        None => Config::default(),
    };
    validate_config(&config).context("Configuration validation failed")?;

    if cli.files.is_empty() {
        bail!("no input files given");
    }

    let mut session = ConversionSession::new();
    for path in &cli.files {
        match session.add_path(path).await {
            Ok(id) => debug!(task_id = %id, path = %path.display(), "File ingested"),
            Err(e) => warn!(path = %path.display(), error = %e, "Skipping file"),
        }
    }
    if session.is_empty() {
        bail!("none of the input files could be read");
    }
    println!("{}", session.compatibility_message());

    if cli.targets {
        let targets: Vec<&str> = session
            .common_targets()
            .iter()
            .map(FormatId::as_str)
            .collect();
        println!("{}", targets.join(" "));
        return Ok(true);
    }

    let name = cli
        .to
        .as_deref()
        .ok_or_else(|| anyhow!("--to is required unless --list-formats or --targets is given"))?;
    let target = registry
        .lookup(name)
        .map(|d| d.id)
        .ok_or_else(|| anyhow!("unknown format: {}", name))?;
    session.select_target(target)?;
    session.set_options(options(&cli));

    let orchestrator = Orchestrator::standard(&config).await;
    let mut events = orchestrator.subscribe();
    tokio::spawn(async move {
        while let Ok(event) = events.recv().await {
            if let SessionEvent::TaskProgress { aggregate, .. } = event {
                debug!(aggregate, "Batch progress");
            }
        }
    });

    let cancel = session.cancel_token();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupted, cancelling batch");
            cancel.cancel();
        }
    });

    let report = orchestrator.run(&mut session).await?;

    for task in session.tasks() {
        for advisory in &task.advisories {
            println!("{}: {}", task.file_name, advisory.message());
        }
    }
    for (task, failure) in session.user_facing_failures() {
        eprintln!("{}: {}", task.file_name, failure);
    }

    let mut all_saved = true;
    let artifacts = session.artifacts();
    if !artifacts.is_empty() {
        let requested = if cli.multiple {
            Some(PackagingStrategy::Multiple)
        } else if cli.zip {
            Some(PackagingStrategy::Zip)
        } else {
            None
        };
        let packager = Packager::new(config.packaging.clone(), DirectorySink::new(&cli.out));
        let files = match packager.package(&artifacts, requested).await {
            Ok(summary) => summary.files,
            Err(PackagingError::Incomplete { saved, failed }) => {
                for e in &failed {
                    eprintln!("{}", e);
                }
                all_saved = false;
                saved
            }
            Err(e) => return Err(e).context("Failed to save results"),
        };
        for file in &files {
            println!("{}", cli.out.join(file).display());
        }
    }

    info!(
        completed = report.completed,
        failed = report.failed,
        cancelled = report.cancelled,
        "Done"
    );
    Ok(all_saved && !report.has_failures())
}

fn options(cli: &Cli) -> ConversionOptions {
    let mut options = ConversionOptions::default();
    if let Some(quality) = cli.quality {
        options = options.with_quality(quality);
    }
    if let (Some(width), Some(height)) = (cli.width, cli.height) {
        options = options.with_dimensions(width, height);
    }
    if !cli.sizes.is_empty() {
        options = options.with_sizes(cli.sizes.clone());
    }
    if let Some(bitrate) = cli.bitrate {
        options = options.with_bitrate(bitrate);
    }
    options
}

fn list_formats(registry: &FormatRegistry) {
    for entry in registry.entries() {
        let targets: Vec<&str> = entry.targets.iter().map(FormatId::as_str).collect();
        println!(
            "{:<6} {:<12} -> {}",
            entry.id.as_str(),
            entry.label,
            targets.join(", ")
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_size() {
        assert_eq!(parse_size("16x16").unwrap(), Dimensions::new(16, 16));
        assert_eq!(parse_size("640X480").unwrap(), Dimensions::new(640, 480));
        assert!(parse_size("16").is_err());
        assert!(parse_size("ax2").is_err());
    }

    #[test]
    fn test_cli_builds_options() {
        let cli = Cli::parse_from([
            "transmute", "--to", "ico", "--size", "16x16", "--size", "32x32", "--quality", "0.5",
            "a.png",
        ]);
        let options = options(&cli);
        assert_eq!(options.sizes.len(), 2);
        assert_eq!(options.quality, Some(0.5));
        assert_eq!(cli.files, vec![PathBuf::from("a.png")]);
    }

    #[test]
    fn test_zip_and_multiple_conflict() {
        assert!(Cli::try_parse_from(["transmute", "--zip", "--multiple", "a.png"]).is_err());
    }

    #[tokio::test]
    async fn test_targets_mode_needs_no_target() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("a.png");
        std::fs::write(&path, transmute_core::testing::fixtures::png_bytes(2, 2)).unwrap();

        let cli = Cli::parse_from([
            "transmute".into(),
            "--targets".into(),
            path.into_os_string(),
        ]);
        assert!(run(cli).await.unwrap());
    }
}
