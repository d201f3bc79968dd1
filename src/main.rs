//! # cadence
//!
//! Command-line client for the generation worker: submit a generation task
//! and follow it to completion, or browse the artifact catalog.

#![deny(unsafe_code)]

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use cadence_channel::{ChannelManager, ChannelPhase};
use cadence_client::{CatalogClient, FileQuery, GenerationSession, SortBy, SortOrder};
use cadence_core::{
    Backend, DurationBucket, GenerationParameters, Mood, MusicKey, MusicStyle, SessionRecord,
    Stage, Tempo,
};
use cadence_settings::CadenceSettings;
use cadence_telemetry::TelemetryConfig;
use clap::{Args, Parser, Subcommand};

/// Generate music through a remote worker.
#[derive(Parser, Debug)]
#[command(name = "cadence", version, about = "Generation worker client")]
struct Cli {
    /// Settings file (defaults to ~/.cadence/settings.json).
    #[arg(long, global = true)]
    settings: Option<PathBuf>,

    /// Log as JSON lines.
    #[arg(long, global = true)]
    json_logs: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Submit a generation task and wait for the result.
    Generate(GenerateArgs),
    /// Browse and manage generated artifacts.
    #[command(subcommand)]
    Files(FilesCommand),
    /// Start and poll jobs through the REST API instead of the channel.
    #[command(subcommand)]
    Job(JobCommand),
    /// Show worker and backend health.
    Health,
}

#[derive(Subcommand, Debug)]
enum JobCommand {
    /// Start a job and print its id.
    Start(GenerateArgs),
    /// Show a job's stage and progress.
    Status { id: String },
    /// Show the artifact of a completed job.
    Result { id: String },
}

#[derive(Args, Debug)]
struct GenerateArgs {
    /// huggingface, magenta or simple.
    #[arg(long, default_value = "simple")]
    backend: Backend,
    /// Classical, Jazz, Pop or Ambient.
    #[arg(long, default_value = "Pop")]
    style: MusicStyle,
    /// "C major", "D major", "G major" or "A minor".
    #[arg(long, default_value = "C major")]
    key: MusicKey,
    /// Beats per minute, 40 to 180.
    #[arg(long, default_value_t = Tempo::DEFAULT.bpm())]
    tempo: u16,
    /// Happy, Melancholic, Dreamy or Intense.
    #[arg(long, default_value = "Happy")]
    mood: Mood,
    /// "30 sec", "1 min" or "2 min".
    #[arg(long, default_value = "30 sec")]
    duration: DurationBucket,
    /// Free-form prompt for prompt-driven backends.
    #[arg(long)]
    prompt: Option<String>,
    /// Download the finished artifact into this directory.
    #[arg(long)]
    download: Option<PathBuf>,
}

impl GenerateArgs {
    fn parameters(&self) -> Result<GenerationParameters> {
        let tempo = Tempo::new(self.tempo)?;
        Ok(GenerationParameters {
            backend: self.backend,
            style: self.style,
            key: self.key,
            tempo,
            mood: self.mood,
            duration: self.duration,
            prompt: self.prompt.clone(),
        })
    }
}

#[derive(Subcommand, Debug)]
enum FilesCommand {
    /// List artifacts, newest first.
    List(ListArgs),
    /// Show one artifact's metadata.
    Show { id: String },
    /// Delete an artifact.
    Delete { id: String },
    /// Download an artifact.
    Download {
        id: String,
        /// Target directory.
        #[arg(long, default_value = ".")]
        out: PathBuf,
    },
}

#[derive(Args, Debug)]
struct ListArgs {
    #[arg(long, default_value_t = 1)]
    page: u32,
    #[arg(long, default_value_t = FileQuery::DEFAULT_PAGE_SIZE)]
    page_size: u32,
    /// Case-insensitive filename filter.
    #[arg(long)]
    search: Option<String>,
    #[arg(long)]
    backend: Option<Backend>,
    /// created_at, filename or file_size.
    #[arg(long, default_value = "created_at")]
    sort_by: SortBy,
    /// asc or desc.
    #[arg(long, default_value = "desc")]
    order: SortOrder,
}

impl ListArgs {
    fn query(&self) -> FileQuery {
        FileQuery {
            page: self.page,
            page_size: self.page_size,
            search: self.search.clone(),
            backend: self.backend,
            sort_by: self.sort_by,
            sort_order: self.order,
            ..FileQuery::default()
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let settings = match &cli.settings {
        Some(path) => cadence_settings::load_settings_from_path(path),
        None => cadence_settings::load_settings(),
    }
    .context("Failed to load settings")?;

    let json_logs = cli.json_logs || settings.logging.json;
    let telemetry = TelemetryConfig::from_level(&settings.logging.level, json_logs)
        .context("Invalid logging.level")?;
    cadence_telemetry::init_telemetry(&telemetry).context("Failed to initialize logging")?;

    let catalog = CatalogClient::new(
        settings.api.base_url.clone(),
        Duration::from_millis(settings.api.timeout_ms),
    )
    .context("Failed to build HTTP client")?;

    match cli.command {
        Command::Generate(args) => generate(&settings, &catalog, &args).await,
        Command::Files(command) => files(&catalog, command).await,
        Command::Job(command) => job(&catalog, command).await,
        Command::Health => health(&catalog).await,
    }
}

async fn generate(
    settings: &CadenceSettings,
    catalog: &CatalogClient,
    args: &GenerateArgs,
) -> Result<()> {
    let parameters = args.parameters()?;

    let channel = Arc::new(ChannelManager::websocket(
        settings.channel.url.clone(),
        settings.channel.policy(),
    ));
    channel.connect();
    wait_until_connected(&channel, &settings.channel.url).await?;

    let mut session = GenerationSession::new(Arc::clone(&channel))
        .with_fallback_grace(Duration::from_millis(settings.session.fallback_grace_ms));

    let printer = tokio::spawn(print_progress(session.subscribe()));
    let session_id = session.submit(parameters)?;
    tracing::info!(session_id = %session_id, "submitted");

    let outcome = tokio::select! {
        outcome = session.wait_for_outcome() => outcome,
        _ = tokio::signal::ctrl_c() => bail!("Interrupted; the worker may still finish {session_id}"),
    };
    printer.abort();
    channel.disconnect().await;

    let record = outcome.context("Generation did not finish")?;
    report(&record, catalog, args.download.as_deref()).await
}

async fn wait_until_connected(channel: &ChannelManager, url: &str) -> Result<()> {
    let mut state = channel.subscribe();
    let settled = state
        .wait_for(|s| s.connected() || s.phase == ChannelPhase::GaveUp)
        .await
        .context("Channel closed while connecting")?;
    if settled.phase == ChannelPhase::GaveUp {
        bail!("Could not reach the worker at {url} after {} attempts", settled.attempts);
    }
    Ok(())
}

async fn print_progress(mut records: tokio::sync::watch::Receiver<SessionRecord>) {
    while records.changed().await.is_ok() {
        let record = records.borrow_and_update().clone();
        if record.stage.is_active() || record.stage == Stage::Error {
            println!(
                "[{:>12}] {:>3}%  {}",
                record.stage.as_str(),
                record.progress,
                record.message
            );
        }
    }
}

async fn report(
    record: &SessionRecord,
    catalog: &CatalogClient,
    download: Option<&Path>,
) -> Result<()> {
    match (record.stage, &record.result) {
        (Stage::Complete, Some(artifact)) => {
            println!("{}", record.message);
            println!("  file:  {} ({} bytes)", artifact.filename, artifact.file_size_bytes);
            println!("  id:    {}", artifact.artifact_id);
            println!("  url:   {}", catalog.resolve(artifact));
            if let Some(dir) = download {
                let path = catalog
                    .download_to(&artifact.artifact_id, dir)
                    .await
                    .context("Download failed")?;
                println!("  saved: {}", path.display());
            }
            Ok(())
        }
        _ => bail!("{}", record.message),
    }
}

async fn files(catalog: &CatalogClient, command: FilesCommand) -> Result<()> {
    match command {
        FilesCommand::List(args) => {
            let page = catalog.list(&args.query()).await?;
            for item in &page.items {
                println!(
                    "{:<40} {:>9}  {}  {}",
                    item.file_id,
                    item.file_size,
                    item.created_at.format("%Y-%m-%d %H:%M"),
                    item.filename
                );
            }
            println!(
                "page {} ({} of {} total){}",
                page.page,
                page.items.len(),
                page.total,
                if page.has_next { ", more with --page" } else { "" }
            );
        }
        FilesCommand::Show { id } => {
            let item = catalog.get(&id).await?;
            println!("id:       {}", item.file_id);
            println!("filename: {}", item.filename);
            println!("size:     {} bytes", item.file_size);
            println!("created:  {}", item.created_at.to_rfc3339());
            println!("url:      {}", catalog.download_url(&item.file_id));
            if let Some(parameters) = &item.parameters {
                println!(
                    "params:   {} / {} / {} / {} BPM / {} / {}",
                    parameters.backend,
                    parameters.style,
                    parameters.key,
                    parameters.tempo.bpm(),
                    parameters.mood,
                    parameters.duration
                );
            }
        }
        FilesCommand::Delete { id } => {
            let receipt = catalog.delete(&id).await?;
            println!("{} ({})", receipt.message, receipt.file_id);
        }
        FilesCommand::Download { id, out } => {
            let path = catalog.download_to(&id, &out).await?;
            println!("{}", path.display());
        }
    }
    Ok(())
}

async fn job(catalog: &CatalogClient, command: JobCommand) -> Result<()> {
    match command {
        JobCommand::Start(args) => {
            let job = catalog.start_generation(&args.parameters()?).await?;
            println!("{} {}", job.job_id, job.status.as_str());
        }
        JobCommand::Status { id } => {
            let job = catalog.job_status(&id).await?;
            println!(
                "[{:>12}] {:>3}%  {}  ({})",
                job.stage.as_str(),
                job.progress,
                job.message,
                job.status.as_str()
            );
            if let Some(error) = &job.error {
                println!("  error: {error}");
            }
        }
        JobCommand::Result { id } => {
            let artifact = catalog.job_result(&id).await?;
            println!("{} ({} bytes)", artifact.filename, artifact.file_size);
            println!("  id:  {}", artifact.file_id);
            println!("  url: {}", catalog.download_url(&artifact.file_id));
        }
    }
    Ok(())
}

async fn health(catalog: &CatalogClient) -> Result<()> {
    let report = catalog.health().await?;
    println!("worker: {} at {}", report.status, report.timestamp.to_rfc3339());
    for status in catalog.backends().await? {
        let mark = if status.available { "up" } else { "down" };
        match status.message {
            Some(message) => println!("  {:<12} {mark}  {message}", status.name),
            None => println!("  {:<12} {mark}", status.name),
        }
    }
    Ok(())
}
