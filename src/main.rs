use anyhow::{Context, Result};
use clap::Parser;
use owo_colors::OwoColorize;
use std::path::Path;

use outcall::audio::{CaptureSource, DiscardPlaybackSink, PlaybackSink, WavCaptureSource};
use outcall::cli::{Cli, Commands, ConfigAction, default_store_path};
use outcall::config::Config;
use outcall::leads::{DocumentTextExtractor, Lead, LeadBook, PlainTextExtractor, parse_lead_drafts};
use outcall::report::{ReportExporter, TextReportExporter};
use outcall::session::stream::parse_script;
use outcall::session::{CallController, ScriptedSpeechService};
use outcall::transcript::Role;

#[tokio::main]
async fn main() -> Result<()> {
    #[cfg(feature = "cpal-audio")]
    outcall::audio::suppress_audio_warnings();

    let cli = Cli::parse();
    let store_path = cli.store.clone().unwrap_or_else(default_store_path);

    match cli.command {
        Commands::Import { ref file } => {
            let bytes = std::fs::read(file)
                .with_context(|| format!("failed to read {}", file.display()))?;
            let text = PlainTextExtractor.extract_text(&bytes)?;
            let drafts = parse_lead_drafts(&text)?;
            let count = drafts.len();

            let mut book = load_store(&store_path)?;
            book.ingest(drafts);
            save_store(&store_path, &book)?;

            if !cli.quiet {
                println!(
                    "Imported {} lead{} into {}",
                    count,
                    if count == 1 { "" } else { "s" },
                    store_path.display()
                );
            }
        }
        Commands::Leads => {
            let book = load_store(&store_path)?;
            if book.is_empty() {
                println!("No leads in {}", store_path.display());
            }
            for lead in book.iter() {
                println!("{}", lead.listing_line());
            }
        }
        Commands::Report => {
            let book = load_store(&store_path)?;
            let leads: Vec<&Lead> = book.iter().collect();
            let mut stdout = std::io::stdout();
            TextReportExporter.export(&leads, &mut stdout)?;
        }
        Commands::Call {
            ref lead,
            ref script,
            ref wav,
            ref device,
            no_playback,
        } => {
            let config = load_config(cli.config.as_deref())?;
            run_call_command(
                config,
                &store_path,
                lead,
                script,
                wav.as_deref(),
                device.as_deref(),
                no_playback,
                cli.quiet,
            )
            .await?;
        }
        Commands::Devices => {
            list_audio_devices()?;
        }
        Commands::Config { action } => match action {
            ConfigAction::Path => println!("{}", Config::default_path().display()),
            ConfigAction::Show => {
                let config = load_config(cli.config.as_deref())?;
                print!("{}", toml::to_string_pretty(&config)?);
            }
        },
    }

    Ok(())
}

fn load_config(path: Option<&Path>) -> Result<Config> {
    let config = match path {
        Some(path) => Config::load(path)
            .with_context(|| format!("failed to load config from {}", path.display()))?,
        None => Config::load_or_default(&Config::default_path()),
    };
    Ok(config.with_env_overrides())
}

fn load_store(path: &Path) -> Result<LeadBook> {
    if !path.exists() {
        return Ok(LeadBook::new());
    }
    let json = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read lead store {}", path.display()))?;
    let leads: Vec<Lead> = serde_json::from_str(&json)
        .with_context(|| format!("lead store {} is corrupt", path.display()))?;
    Ok(LeadBook::from_leads(leads))
}

fn save_store(path: &Path, book: &LeadBook) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let json = serde_json::to_string_pretty(&book.to_vec())?;
    std::fs::write(path, json)
        .with_context(|| format!("failed to write lead store {}", path.display()))?;
    Ok(())
}

#[allow(clippy::too_many_arguments)]
async fn run_call_command(
    config: Config,
    store_path: &Path,
    lead_query: &str,
    script_path: &Path,
    wav: Option<&Path>,
    device: Option<&str>,
    no_playback: bool,
    quiet: bool,
) -> Result<()> {
    let book = load_store(store_path)?;
    let lead_id = book
        .find(lead_query)
        .map(|l| l.id)
        .with_context(|| format!("no lead matches '{}'", lead_query))?;

    let script_json = std::fs::read_to_string(script_path)
        .with_context(|| format!("failed to read script {}", script_path.display()))?;
    let script = parse_script(&script_json)?;
    let service = ScriptedSpeechService::new(script);

    let capture: Box<dyn CaptureSource> = match wav {
        Some(path) => Box::new(
            WavCaptureSource::from_path(path)
                .with_context(|| format!("failed to open {}", path.display()))?,
        ),
        None => live_capture(device.or(config.audio.device.as_deref()))?,
    };

    let playback = !no_playback && config.audio.playback.unwrap_or(true);
    let sink = playback_sink(playback)?;

    let mut controller = CallController::new(
        Box::new(service),
        sink,
        config.stream_template(),
        config.product.pitch.clone(),
    );
    *controller.leads_mut() = book;

    let lead_name = controller
        .leads()
        .get(lead_id)
        .map(|l| l.name.clone())
        .unwrap_or_default();
    if !quiet {
        eprintln!("outcall: calling {}...", lead_name.bold());
    }

    controller.start_call(lead_id, capture)?;
    controller
        .run_until_ended(|entry| {
            if quiet {
                return;
            }
            match entry.role {
                Role::Human => println!("{} {}", "human:".cyan(), entry.text),
                Role::Agent => println!("{} {}", "agent:".green(), entry.text),
            }
        })
        .await;

    save_store(store_path, controller.leads())?;

    if !quiet {
        let summary = controller
            .leads()
            .get(lead_id)
            .and_then(|l| l.summary.clone())
            .unwrap_or_default();
        eprintln!("outcall: call ended. summary: {}", summary);
    }
    Ok(())
}

#[cfg(feature = "cpal-audio")]
fn live_capture(device: Option<&str>) -> Result<Box<dyn CaptureSource>> {
    Ok(Box::new(outcall::audio::CpalCaptureSource::new(device)?))
}

#[cfg(not(feature = "cpal-audio"))]
fn live_capture(_device: Option<&str>) -> Result<Box<dyn CaptureSource>> {
    anyhow::bail!("live capture requires the cpal-audio feature; pass --wav instead")
}

#[cfg(feature = "cpal-audio")]
fn playback_sink(playback: bool) -> Result<Box<dyn PlaybackSink>> {
    if playback {
        Ok(Box::new(outcall::audio::CpalPlaybackSink::new()?))
    } else {
        Ok(Box::new(DiscardPlaybackSink::new()))
    }
}

#[cfg(not(feature = "cpal-audio"))]
fn playback_sink(_playback: bool) -> Result<Box<dyn PlaybackSink>> {
    Ok(Box::new(DiscardPlaybackSink::new()))
}

#[cfg(feature = "cpal-audio")]
fn list_audio_devices() -> Result<()> {
    let devices = outcall::audio::list_input_devices()?;
    if devices.is_empty() {
        println!("No audio input devices found");
    } else {
        println!("Available audio input devices:");
        for device in devices {
            println!("  {}", device);
        }
    }
    Ok(())
}

#[cfg(not(feature = "cpal-audio"))]
fn list_audio_devices() -> Result<()> {
    anyhow::bail!("device listing requires the cpal-audio feature")
}
