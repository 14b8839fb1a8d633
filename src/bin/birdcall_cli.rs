use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{anyhow, Context, Result};
use birdcall_id::analysis::{FeatureExtractor, InferenceBackend, PrototypeModel};
use birdcall_id::audio::{AudioDecoder, AudioInput};
use birdcall_id::catalog::{InMemoryCatalog, SpeciesCatalog};
use birdcall_id::config::AppConfig;
use birdcall_id::pipeline::{PipelineEvent, PipelineOrchestrator};
use birdcall_id::testing::{reference, wav};
use clap::{Args, Parser, Subcommand};
use serde::Serialize;
use tracing::Level;

#[derive(Parser, Debug)]
#[command(
    name = "birdcall-cli",
    about = "Identify bird species from recorded calls"
)]
struct Cli {
    /// JSON configuration file (defaults apply when omitted)
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    /// Log pipeline internals at debug level
    #[arg(long, short, global = true)]
    verbose: bool,
    #[command(subcommand)]
    command: Commands,
}

/// Where the model and species records come from
#[derive(Args, Debug, Clone)]
struct SourceArgs {
    /// Prototype model artifact (defaults to the built-in reference model)
    #[arg(long)]
    model: Option<PathBuf>,
    /// JSON array of species records (defaults to the reference species)
    #[arg(long)]
    catalog: Option<PathBuf>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run one recording through the identification pipeline
    Identify {
        file: PathBuf,
        #[command(flatten)]
        sources: SourceArgs,
        /// Print only the JSON payload
        #[arg(long)]
        json: bool,
    },
    /// Print feature shapes and the summary vector of a recording
    Features { file: PathBuf },
    /// Print the effective configuration
    Config,
    /// Write a synthetic reference call as a WAV file
    RenderCall {
        /// Species id from the reference set
        species: String,
        #[arg(long)]
        output: PathBuf,
        #[arg(long, default_value_t = 3.0)]
        duration: f32,
        #[arg(long, default_value_t = 7)]
        seed: u64,
    },
    /// Serve the HTTP surface
    #[cfg(feature = "http")]
    Serve {
        #[command(flatten)]
        sources: SourceArgs,
        /// Listen address (defaults to BIRDCALL_HTTP_ADDR or 127.0.0.1:8787)
        #[arg(long)]
        addr: Option<std::net::SocketAddr>,
    },
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.verbose);
    match run(cli) {
        Ok(code) => code,
        Err(err) => {
            eprintln!("Error: {err:?}");
            ExitCode::from(1)
        }
    }
}

fn init_tracing(verbose: bool) {
    let level = if verbose { Level::DEBUG } else { Level::INFO };
    tracing_subscriber::fmt()
        .with_max_level(level)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn run(cli: Cli) -> Result<ExitCode> {
    let config = load_config(cli.config.as_deref())?;
    match cli.command {
        Commands::Identify {
            file,
            sources,
            json,
        } => run_identify(config, &file, &sources, json),
        Commands::Features { file } => run_features(&config, &file),
        Commands::Config => {
            println!("{}", serde_json::to_string_pretty(&config)?);
            Ok(ExitCode::from(0))
        }
        Commands::RenderCall {
            species,
            output,
            duration,
            seed,
        } => run_render(&config, &species, &output, duration, seed),
        #[cfg(feature = "http")]
        Commands::Serve { sources, addr } => run_serve(config, &sources, addr),
    }
}

fn load_config(path: Option<&Path>) -> Result<AppConfig> {
    match path {
        Some(path) => AppConfig::try_load_from_file(path)
            .with_context(|| format!("loading config {}", path.display())),
        None => Ok(AppConfig::default()),
    }
}

fn load_sources(
    config: &AppConfig,
    sources: &SourceArgs,
) -> Result<(Arc<dyn InferenceBackend>, Arc<dyn SpeciesCatalog>)> {
    let model = match &sources.model {
        Some(path) => PrototypeModel::load_from_file(path)
            .with_context(|| format!("loading model {}", path.display()))?,
        None => reference::reference_model(&config.audio).context("fitting reference model")?,
    };
    let catalog = match &sources.catalog {
        Some(path) => InMemoryCatalog::load_from_file(path)
            .with_context(|| format!("loading catalog {}", path.display()))?,
        None => reference::reference_catalog(),
    };
    let backend: Arc<dyn InferenceBackend> = Arc::new(model);
    let catalog: Arc<dyn SpeciesCatalog> = Arc::new(catalog);
    Ok((backend, catalog))
}

fn runtime() -> Result<tokio::runtime::Runtime> {
    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("building tokio runtime")
}

fn run_identify(
    config: AppConfig,
    file: &Path,
    sources: &SourceArgs,
    json: bool,
) -> Result<ExitCode> {
    let input = AudioInput::from_path(file, &config.decoder)
        .with_context(|| format!("reading {}", file.display()))?;
    let (backend, catalog) = load_sources(&config, sources)?;

    runtime()?.block_on(identify_async(config, backend, catalog, input, json))
}

async fn identify_async(
    config: AppConfig,
    backend: Arc<dyn InferenceBackend>,
    catalog: Arc<dyn SpeciesCatalog>,
    input: AudioInput,
    json: bool,
) -> Result<ExitCode> {
    let orchestrator = PipelineOrchestrator::new(config, backend, catalog)?;
    let mut events = orchestrator.subscribe();
    let generation = match orchestrator.submit(input) {
        Ok(generation) => generation,
        Err(err) => {
            eprintln!("Rejected: {}", err);
            return Ok(ExitCode::from(2));
        }
    };

    loop {
        let event = events.recv().await.context("receiving pipeline events")?;
        if event.generation != generation {
            continue;
        }
        match event.event {
            PipelineEvent::Progress(info) => {
                if !json {
                    eprintln!(
                        "[{:>3}%] {}: {}",
                        info.percent,
                        info.stage.display_name(),
                        info.message
                    );
                }
            }
            PipelineEvent::Complete(data) => {
                println!("{}", serde_json::to_string_pretty(&data)?);
                return Ok(ExitCode::from(0));
            }
            PipelineEvent::Error(failure) => {
                println!("{}", serde_json::to_string_pretty(&failure)?);
                return Ok(ExitCode::from(2));
            }
        }
    }
}

#[derive(Serialize)]
struct FeatureReport {
    file: String,
    duration_secs: f32,
    frames: usize,
    mfcc_width: usize,
    chroma_width: usize,
    summary: Vec<f32>,
}

fn run_features(config: &AppConfig, file: &Path) -> Result<ExitCode> {
    let input = AudioInput::from_path(file, &config.decoder)
        .with_context(|| format!("reading {}", file.display()))?;
    let decoder = AudioDecoder::new(config.audio.sample_rate, config.decoder.clone())
        .with_sample_limit(config.audio.max_length);
    let buffer = decoder.decode(input).context("decoding audio")?;
    let extractor = FeatureExtractor::new(config.audio.clone());
    let features = extractor.extract(&buffer).context("extracting features")?;

    let report = FeatureReport {
        file: file.display().to_string(),
        duration_secs: buffer.duration().as_secs_f32(),
        frames: features.frame_count(),
        mfcc_width: features.mfcc.first().map_or(0, Vec::len),
        chroma_width: features.chroma.first().map_or(0, Vec::len),
        summary: PrototypeModel::summarize(&features),
    };
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(ExitCode::from(0))
}

fn run_render(
    config: &AppConfig,
    species_id: &str,
    output: &Path,
    duration: f32,
    seed: u64,
) -> Result<ExitCode> {
    let species = reference::reference_species()
        .into_iter()
        .find(|species| species.record.id == species_id)
        .ok_or_else(|| anyhow!("unknown reference species {:?}", species_id))?;
    let samples = reference::render_call(&species, duration, config.audio.sample_rate, seed);
    let bytes = wav::encode_mono_i16(&samples, config.audio.sample_rate)
        .context("encoding WAV")?;
    std::fs::write(output, bytes).with_context(|| format!("writing {}", output.display()))?;
    println!("{} -> {}", species.record.common_name, output.display());
    Ok(ExitCode::from(0))
}

#[cfg(feature = "http")]
fn run_serve(
    config: AppConfig,
    sources: &SourceArgs,
    addr: Option<std::net::SocketAddr>,
) -> Result<ExitCode> {
    use birdcall_id::http::bind_addr_from_env;

    let (backend, catalog) = load_sources(&config, sources)?;
    let addr = addr.unwrap_or_else(bind_addr_from_env);
    runtime()?.block_on(serve_async(config, backend, catalog, addr))
}

#[cfg(feature = "http")]
async fn serve_async(
    config: AppConfig,
    backend: Arc<dyn InferenceBackend>,
    catalog: Arc<dyn SpeciesCatalog>,
    addr: std::net::SocketAddr,
) -> Result<ExitCode> {
    use birdcall_id::http::{run_http_server, HttpState};

    let orchestrator = PipelineOrchestrator::new(config, backend, catalog)?;
    orchestrator.warm_up();
    run_http_server(HttpState::new(Arc::new(orchestrator)), addr).await?;
    Ok(ExitCode::from(0))
}
