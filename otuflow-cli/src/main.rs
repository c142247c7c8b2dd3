//! Otuflow command-line front end.
//!
//! Discovers input files, layers flags over the settings file, and runs the amplicon
//! pipeline with Ctrl-C wired to the pipeline's interrupt handle.

use anyhow::{Context, Result};
use clap::{ArgAction, Parser};
use otuflow::config::{MatePair, PipelineSettings, QualityEncoding};
use otuflow::events::LoggingEventSink;
use otuflow::pipeline::amplicon_pipeline;
use otuflow::utils::collect_inputs;
use std::fs::File;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::{Arc, Mutex};
use tracing::{info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Parser, Debug)]
#[command(name = "otuflow", version)]
#[command(about = "Build an OTU table from a folder of amplicon sequence files", long_about = None)]
struct Cli {
    /// Folder holding the input sequence files
    #[arg(long = "in", value_name = "DIR")]
    input: PathBuf,

    /// Parent folder for the otuflow_output directory
    #[arg(long = "out", value_name = "DIR")]
    output: Option<PathBuf>,

    /// Only use input files whose name contains this text
    #[arg(long)]
    filter: Option<String>,

    /// Forward and reverse mate tokens, enabling paired-end assembly
    #[arg(long, value_name = "FWD,REV", value_parser = parse_mates)]
    mate: Option<MatePair>,

    /// Worker threads for per-file stages
    #[arg(long)]
    threads: Option<usize>,

    /// Minimum abundance kept by dereplication
    #[arg(long)]
    min_size: Option<u64>,

    /// Drop pooled sequences shorter than this
    #[arg(long)]
    trunc_min: Option<usize>,

    /// Truncate pooled sequences longer than this
    #[arg(long)]
    trunc_max: Option<usize>,

    /// Quality cutoff for 3' trimming; trimming is skipped without it
    #[arg(long)]
    trim_cutoff: Option<u8>,

    /// Inputs use Phred+64 qualities
    #[arg(long)]
    phred64: bool,

    /// Folder holding the external tool .config files
    #[arg(long, value_name = "DIR")]
    config_dir: Option<PathBuf>,

    /// JSON settings file; flags override its values
    #[arg(long, value_name = "FILE")]
    settings: Option<PathBuf>,

    /// Write logs to this file instead of stderr
    #[arg(long, value_name = "FILE")]
    log: Option<PathBuf>,

    /// Hide the progress spinner
    #[arg(long)]
    no_progress: bool,

    /// More verbose logging (-v debug, -vv trace)
    #[arg(short, long, action = ArgAction::Count)]
    verbose: u8,
}

fn parse_mates(value: &str) -> Result<MatePair, String> {
    match value.split_once(',') {
        Some((forward, reverse)) if !forward.is_empty() && !reverse.is_empty() => {
            Ok(MatePair::new(forward, reverse))
        }
        _ => Err(format!("expected FWD,REV but found '{value}'")),
    }
}

fn absolute(path: &Path) -> Result<PathBuf> {
    if path.is_absolute() {
        return Ok(path.to_path_buf());
    }
    let cwd = std::env::current_dir().context("Cannot resolve the working directory")?;
    Ok(cwd.join(path))
}

impl Cli {
    fn pipeline_settings(&self) -> Result<PipelineSettings> {
        let mut settings = match &self.settings {
            Some(path) => PipelineSettings::from_file(path)
                .with_context(|| format!("Cannot load settings from {}", path.display()))?,
            None => PipelineSettings::default(),
        };

        if let Some(threads) = self.threads {
            settings = settings.with_threads(threads);
        }
        if let Some(min_size) = self.min_size {
            settings = settings.with_min_size(min_size);
        }
        if self.trunc_min.is_some() || self.trunc_max.is_some() {
            let trunc_min = self.trunc_min.or(settings.trunc_min);
            let trunc_max = self.trunc_max.or(settings.trunc_max);
            settings = settings.with_truncation(trunc_min, trunc_max);
        }
        if let Some(cutoff) = self.trim_cutoff {
            settings = settings.with_trim_cutoff(cutoff);
        }
        if let Some(mates) = &self.mate {
            settings = settings.with_mates(mates.clone());
        }
        if self.phred64 {
            settings = settings.with_encoding(QualityEncoding::Phred64);
        }
        if let Some(dir) = &self.config_dir {
            settings = settings.with_config_dir(dir);
        }
        if let Some(dir) = &self.output {
            settings = settings.with_output_parent(dir);
        }
        if self.no_progress || self.log.is_some() {
            let monitor = settings.monitor.clone().with_progress(false);
            settings = settings.with_monitor(monitor);
        }

        let config_dir = absolute(&settings.config_dir)?;
        let output_parent = absolute(&settings.output_parent)?;
        Ok(settings
            .with_config_dir(config_dir)
            .with_output_parent(output_parent))
    }
}

fn init_tracing(cli: &Cli) -> Result<()> {
    let level = match cli.verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    let registry = tracing_subscriber::registry().with(filter);

    match &cli.log {
        Some(path) => {
            let file = File::create(path)
                .with_context(|| format!("Cannot create log file {}", path.display()))?;
            registry
                .with(fmt::layer().with_ansi(false).with_writer(Mutex::new(file)))
                .init();
        }
        None => registry
            .with(fmt::layer().with_target(false).with_writer(std::io::stderr))
            .init(),
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let cli = Cli::parse();
    init_tracing(&cli)?;

    let settings = cli.pipeline_settings()?;
    let input_dir = absolute(&cli.input)?;
    let inputs = collect_inputs(&input_dir, cli.filter.as_deref())
        .with_context(|| format!("No usable input files in {}", input_dir.display()))?;
    info!(inputs = inputs.len(), dir = %input_dir.display(), "Collected input files");

    let mut pipeline = amplicon_pipeline(&settings, inputs)
        .context("Cannot prepare the pipeline")?
        .with_sink(Arc::new(LoggingEventSink::default()));

    let interrupt = pipeline.interrupt_handle();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupt received, stopping the current stage");
            interrupt.cancel("interrupted by user");
        }
    });

    let report = pipeline.run().await;
    println!("{report}");
    if report.is_completed() {
        for output in report.final_outputs() {
            println!("{}", output.display());
        }
        Ok(ExitCode::SUCCESS)
    } else {
        Ok(ExitCode::FAILURE)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_flags_override_defaults() {
        let cli = Cli::try_parse_from([
            "otuflow",
            "--in",
            "/data/reads",
            "--out",
            "/data/results",
            "--mate",
            "_R1,_R2",
            "--threads",
            "4",
            "--trunc-max",
            "250",
            "--phred64",
            "--config-dir",
            "/etc/otuflow",
        ])
        .unwrap();

        let settings = cli.pipeline_settings().unwrap();
        assert_eq!(settings.threads, 4);
        assert_eq!(settings.trunc_min, None);
        assert_eq!(settings.trunc_max, Some(250));
        assert_eq!(settings.mates, Some(MatePair::new("_R1", "_R2")));
        assert_eq!(settings.encoding, QualityEncoding::Phred64);
        assert_eq!(settings.config_dir, PathBuf::from("/etc/otuflow"));
        assert_eq!(settings.output_parent, PathBuf::from("/data/results"));
        assert!(settings.monitor.show_progress);
    }

    #[test]
    fn test_settings_file_is_layered_under_flags() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        std::fs::write(&path, r#"{ "threads": 8, "min_size": 2 }"#).unwrap();

        let cli = Cli::try_parse_from([
            "otuflow",
            "--in",
            "reads",
            "--settings",
            path.to_str().unwrap(),
            "--min-size",
            "5",
            "--no-progress",
        ])
        .unwrap();
        let settings = cli.pipeline_settings().unwrap();
        assert_eq!(settings.threads, 8);
        assert_eq!(settings.min_size, 5);
        assert!(settings.config_dir.is_absolute());
        assert!(!settings.monitor.show_progress);
    }

    #[test]
    fn test_bad_mate_flag_is_rejected() {
        assert!(parse_mates("_R1").is_err());
        assert!(parse_mates(",_R2").is_err());
        assert!(Cli::try_parse_from(["otuflow", "--in", "x", "--mate", "R1"]).is_err());
    }
}
