use std::path::PathBuf;
use std::sync::Arc;

use clap::{ArgGroup, Args, Parser, Subcommand};

use placement_ai::config::AppConfig;
use placement_ai::error::AppError;
use placement_ai::telemetry;
use placement_ai::workflows::consultation::crm::CrmPublisher;
use placement_ai::workflows::consultation::ConsultationInput;

use crate::infra::{build_pipeline, mime_for_audio_path, InMemoryCrmPublisher};
use crate::server;

#[derive(Parser, Debug)]
#[command(
    name = "Placement Consultation Orchestrator",
    about = "Run the senior-living placement recommendation service or a one-shot consultation",
    version
)]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Start the HTTP service (default command)
    Serve(ServeArgs),
    /// Process one consultation from an audio recording or a transcript
    Consult(ConsultArgs),
}

#[derive(Args, Debug, Default)]
pub(crate) struct ServeArgs {
    /// Override the configured host for the HTTP server
    #[arg(long)]
    pub(crate) host: Option<String>,
    /// Override the configured port for the HTTP server
    #[arg(long)]
    pub(crate) port: Option<u16>,
}

#[derive(Args, Debug)]
#[command(group(ArgGroup::new("input").required(true).args(["audio", "text"])))]
pub(crate) struct ConsultArgs {
    /// Audio recording of the consultation
    #[arg(long)]
    pub(crate) audio: Option<PathBuf>,
    /// Transcript text file
    #[arg(long)]
    pub(crate) text: Option<PathBuf>,
    /// Skip the CRM push for this consultation
    #[arg(long)]
    pub(crate) no_crm: bool,
    /// Write the result JSON here instead of stdout
    #[arg(long)]
    pub(crate) output: Option<PathBuf>,
}

pub(crate) async fn run() -> Result<(), AppError> {
    let cli = Cli::parse();
    let command = cli
        .command
        .unwrap_or_else(|| Command::Serve(ServeArgs::default()));

    match command {
        Command::Serve(args) => server::run(args).await,
        Command::Consult(args) => run_consult(args).await,
    }
}

async fn run_consult(args: ConsultArgs) -> Result<(), AppError> {
    let config = AppConfig::load()?;
    telemetry::init(&config.telemetry)?;

    let handles = build_pipeline(&config)?;

    let input = match (&args.audio, &args.text) {
        (Some(path), _) => {
            let bytes = std::fs::read(path)?;
            ConsultationInput::Audio {
                bytes,
                mime: mime_for_audio_path(path).to_string(),
            }
        }
        (None, Some(path)) => {
            let text = std::fs::read_to_string(path)?;
            if text.trim().is_empty() {
                return Err(AppError::Io(std::io::Error::new(
                    std::io::ErrorKind::InvalidData,
                    format!("transcript {} is empty", path.display()),
                )));
            }
            ConsultationInput::Text(text)
        }
        (None, None) => unreachable!("clap enforces the input group"),
    };

    let mut result = handles.service.process(input).await?;

    if !args.no_crm && !result.no_matches {
        let crm = Arc::new(InMemoryCrmPublisher::default());
        if let Ok(consultation_id) = crm.publish(&result) {
            result.crm_pushed = true;
            result.consultation_id = Some(consultation_id);
        }
    }

    let rendered = serde_json::to_string_pretty(&result)
        .map_err(|error| std::io::Error::other(error.to_string()))?;

    match &args.output {
        Some(path) => std::fs::write(path, rendered)?,
        None => println!("{rendered}"),
    }

    Ok(())
}
