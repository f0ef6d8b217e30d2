use anyhow::{Context, Result};
use chunkscribe::audio::{AudioExtractor, MediaExtractor};
use chunkscribe::cli::{Cli, Commands};
use chunkscribe::config::{Config, RuntimeConfig};
use chunkscribe::defaults;
use chunkscribe::job::{CALLBACK_DRAIN, JobOptions, Orchestrator};
use chunkscribe::progress::{
    ChannelReporter, HttpReporter, JobProgress, LogReporter, MultiReporter, Stage,
};
use chunkscribe::recognition::{WhisperLoader, normalize_language};
use chunkscribe::segmenter::Segmenter;
use clap::Parser;
use owo_colors::OwoColorize;
use std::io::{IsTerminal, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.quiet, cli.verbose);

    let config = load_config(cli.config.as_deref())?;
    let diarize_override = cli.command.diarize_override();

    match cli.command {
        Commands::Transcribe {
            file,
            model,
            language,
            strategy,
            min_speakers,
            max_speakers,
            callback_url,
            job_id,
            output,
            ..
        } => {
            let mut options = JobOptions::from_config(&config);
            if let Some(model) = model {
                options.model = model;
            }
            if language.is_some() {
                options.language = normalize_language(language.as_deref());
            }
            if let Some(strategy) = strategy {
                options.strategy = strategy;
            }
            if let Some(diarize) = diarize_override {
                options.diarize = diarize;
            }
            if min_speakers.is_some() {
                options.speakers.min = min_speakers;
            }
            if max_speakers.is_some() {
                options.speakers.max = max_speakers;
            }
            if let Some(job_id) = job_id {
                options.job_id = job_id;
            }
            let callback_url = callback_url.or_else(|| config.progress.callback_url.clone());
            let show_progress = !cli.quiet && std::io::stderr().is_terminal();

            let ok = run_transcribe(
                config,
                file,
                options,
                callback_url,
                output.as_deref(),
                show_progress,
            )
            .await?;
            if !ok {
                std::process::exit(1);
            }
        }
        Commands::Plan {
            file,
            strategy,
            chunk_duration,
            overlap,
        } => {
            let mut chunking = config.chunking.clone();
            if let Some(chunk) = chunk_duration {
                chunking.chunk_duration = chunk;
            }
            if let Some(overlap) = overlap {
                chunking.overlap_duration = overlap;
            }
            let strategy = strategy.unwrap_or(chunking.strategy);
            let plan = tokio::task::spawn_blocking(move || {
                let extracted = MediaExtractor::default().extract(&file)?;
                Segmenter::new(chunking).plan(
                    extracted.audio.duration_secs(),
                    strategy,
                    Some(&extracted.audio),
                )
            })
            .await
            .context("planning task panicked")??;
            println!("{}", serde_json::to_string_pretty(&plan)?);
        }
        Commands::Models => {
            let runtime = RuntimeConfig::resolve(&config.runtime)?;
            print_models(&runtime, &config.transcription.model);
        }
    }

    Ok(())
}

/// Install the tracing subscriber. `RUST_LOG` wins over `-q`/`-v`.
fn init_tracing(quiet: bool, verbose: u8) {
    let level = match (quiet, verbose) {
        (true, _) => "warn",
        (false, 0) => "info",
        (false, 1) => "debug",
        (false, _) => "trace",
    };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("chunkscribe={level},warn")));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

/// Load configuration from file or use defaults.
///
/// Priority order:
/// 1. Custom config path from CLI (--config)
/// 2. Default config path (~/.config/chunkscribe/config.toml)
/// 3. Built-in defaults with environment variable overrides
fn load_config(custom_path: Option<&Path>) -> Result<Config> {
    let config = if let Some(path) = custom_path {
        Config::load(path).with_context(|| format!("loading {}", path.display()))?
    } else {
        Config::load_or_default(&Config::default_path())?
    };

    let config = config.with_env_overrides();
    config.validate()?;
    Ok(config)
}

/// Run one job; returns `false` when the job failed.
async fn run_transcribe(
    config: Config,
    file: PathBuf,
    options: JobOptions,
    callback_url: Option<String>,
    output: Option<&Path>,
    show_progress: bool,
) -> Result<bool> {
    let runtime = RuntimeConfig::resolve(&config.runtime)?;
    tracing::info!(
        backend = defaults::gpu_backend(),
        device = ?runtime.device,
        compute_type = ?runtime.compute_type,
        model = %options.model,
        "starting job {}",
        options.job_id
    );

    let mut reporters = MultiReporter::new().with(Arc::new(LogReporter));

    let http = match callback_url {
        Some(url) => {
            let timeout = Duration::from_millis(config.progress.timeout_ms);
            let reporter = Arc::new(HttpReporter::spawn(
                &url,
                timeout,
                &tokio::runtime::Handle::current(),
            )?);
            reporters = reporters.with(reporter.clone());
            Some(reporter)
        }
        None => None,
    };

    let printer = if show_progress {
        let (reporter, rx) = ChannelReporter::bounded(64);
        reporters = reporters.with(Arc::new(reporter));
        Some(std::thread::spawn(move || {
            for progress in rx {
                print_progress(&progress);
            }
        }))
    } else {
        None
    };

    let chunking = config.chunking.clone();
    let outcome = tokio::task::spawn_blocking(move || {
        let orchestrator = Orchestrator::new(&runtime, Arc::new(WhisperLoader))
            .with_chunking(chunking)
            .with_reporter(Arc::new(reporters));
        orchestrator.run(&file, &options)
    })
    .await
    .context("transcription task panicked")?;

    if let Some(printer) = printer
        && printer.join().is_err()
    {
        tracing::warn!("progress printer panicked");
    }
    if let Some(http) = http {
        http.finish(CALLBACK_DRAIN).await;
    }

    match outcome {
        Ok(transcript) => {
            let json = serde_json::to_string_pretty(&transcript)?;
            match output {
                Some(path) => {
                    std::fs::write(path, json)
                        .with_context(|| format!("writing {}", path.display()))?;
                    tracing::info!(path = %path.display(), "transcript written");
                }
                None => println!("{}", json),
            }
            Ok(true)
        }
        Err(error) => {
            println!("{}", serde_json::to_string_pretty(&error)?);
            Ok(false)
        }
    }
}

/// One-line progress display on stderr.
fn print_progress(progress: &JobProgress) {
    let mut stderr = std::io::stderr();
    let line = match progress.stage {
        Stage::Failed => format!("{} {}", "✗".red(), progress.message.red()),
        Stage::Done => format!("{} {}", "✓".green(), progress.message),
        _ => format!(
            "{} {:<12} {}",
            format!("{:>3}%", progress.percent).cyan(),
            progress.stage.label().dimmed(),
            progress.message
        ),
    };
    let end = if progress.stage.is_terminal() { "\n" } else { "" };
    let _ = write!(stderr, "\r\x1b[2K{}{}", line, end);
    let _ = stderr.flush();
}

fn print_models(runtime: &RuntimeConfig, current: &str) {
    println!("Models in {}:", runtime.models_dir.display());
    for name in defaults::KNOWN_MODELS {
        let installed = runtime.model_path(name).exists();
        let marker = if *name == current { "*" } else { " " };
        let status = if installed {
            "installed".green().to_string()
        } else {
            "missing".dimmed().to_string()
        };
        let recommended = if defaults::RECOMMENDED_MODELS.contains(name) {
            " (recommended)"
        } else {
            ""
        };
        println!("  {} {:<16} {}{}", marker, name, status, recommended);
    }
}
