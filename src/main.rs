use std::fs::File;
use std::io::{self, BufReader, BufWriter, Write};

use anyhow::{Context, Result};
use clap::Parser;

use refactor_sight::cli::{Cli, Commands, TrackingArgs};
use refactor_sight::config::{Config, ConfigService};
use refactor_sight::doctor;
use refactor_sight::engine::sink::NdjsonSink;
use refactor_sight::error::SightError;
use refactor_sight::service::{ReplayOptions, ScanOptions, ScanService};

#[cfg(feature = "dhat-heap")]
#[global_allocator]
static ALLOC: dhat::Alloc = dhat::Alloc;

#[cfg(not(feature = "dhat-heap"))]
#[global_allocator]
static ALLOC: mimalloc::MiMalloc = mimalloc::MiMalloc;

// ---------------------------------------------------------------------------
// Entry point
// ---------------------------------------------------------------------------

fn main() {
    #[cfg(feature = "dhat-heap")]
    let _profiler = dhat::Profiler::new_heap();

    let cli = Cli::parse();

    if let Err(e) = run(cli) {
        println!("{}", error_line(&e));
        std::process::exit(1);
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn classify_error(e: &anyhow::Error) -> (String, String) {
    if let Some(se) = e.downcast_ref::<SightError>() {
        (se.code.to_string(), se.message.clone())
    } else {
        ("IO_ERROR".to_string(), format!("{e:#}"))
    }
}

fn error_line(e: &anyhow::Error) -> String {
    let (code, message) = classify_error(e);
    serde_json::json!({ "error": { "code": code, "message": message } }).to_string()
}

fn serialize_output(value: &impl serde::Serialize, pretty: bool) -> Result<String> {
    if pretty {
        Ok(serde_json::to_string_pretty(value)?)
    } else {
        Ok(serde_json::to_string(value)?)
    }
}

/// Apply command-line overrides on top of the loaded configuration.
fn apply_tracking_args(config: &mut Config, args: &TrackingArgs) {
    if let Some(thresholds) = &args.thresholds {
        config.tracking.stability_thresholds = thresholds.clone();
    }
    if let Some(extensions) = &args.extensions {
        config.tracking.file_extensions = extensions.clone();
    }
}

/// Sample writer: the `--output` file, else stdout.
fn sample_writer(output: Option<&str>) -> Result<Box<dyn Write>> {
    Ok(match output {
        Some(path) => Box::new(BufWriter::new(
            File::create(path).with_context(|| format!("Failed to create {path}"))?,
        )),
        None => Box::new(io::stdout().lock()),
    })
}

// ---------------------------------------------------------------------------
// Dispatcher
// ---------------------------------------------------------------------------

fn run(cli: Cli) -> Result<()> {
    let pretty = cli.pretty;
    let mut config = ConfigService::load(cli.config.as_deref())?;

    if cli.debug || config.debug {
        refactor_sight::logger::init(&config)?;
    }

    match cli.command {
        Commands::Init { path } => {
            let config_path = match path {
                Some(p) => {
                    ConfigService::generate_at(&p)?;
                    p
                }
                None => ConfigService::generate_default()?,
            };
            eprintln!("Configuration file created at: {}", config_path.display());
            Ok(())
        }
        Commands::Doctor => {
            let report = doctor::run_doctor(&config);
            println!("{}", serialize_output(&report, pretty)?);
            Ok(())
        }
        Commands::Scan {
            dir,
            branch,
            refactorings,
            store_sources,
            timeout,
            tracking,
        } => {
            apply_tracking_args(&mut config, &tracking);
            if let Some(report) = refactorings {
                config.oracle.report = Some(report.into());
                config.oracle.command = None;
            }
            if let Some(timeout) = timeout {
                config.oracle.timeout_secs = timeout;
            }
            let service = ScanService::new(config)?;
            let opts = ScanOptions {
                dir,
                branch,
                last_commit: tracking.last_commit,
                watch: tracking.watch,
            };

            let mut sink = NdjsonSink::new(sample_writer(tracking.output.as_deref())?);
            if let Some(dir) = store_sources {
                sink = sink.with_source_dir(dir);
            }
            let summary = service.scan(&opts, &mut sink)?;
            drop(sink);
            println!("{}", serialize_output(&summary, pretty)?);
            Ok(())
        }
        Commands::Replay { input, tracking } => {
            apply_tracking_args(&mut config, &tracking);
            let service = ScanService::new(config)?;
            let opts = ReplayOptions {
                last_commit: tracking.last_commit,
                watch: tracking.watch,
            };

            let mut sink = NdjsonSink::new(sample_writer(tracking.output.as_deref())?);
            let summary = match input {
                Some(path) => {
                    let file =
                        File::open(&path).with_context(|| format!("Failed to open {path}"))?;
                    service.replay(BufReader::new(file), &opts, &mut sink)?
                }
                None => service.replay(io::stdin().lock(), &opts, &mut sink)?,
            };
            drop(sink);
            println!("{}", serialize_output(&summary, pretty)?);
            Ok(())
        }
    }
}
