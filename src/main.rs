use std::path::{Path, PathBuf};
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use swiftora::models::ImageUpload;
use swiftora::services::listing::render_summary;
use swiftora::services::task::TaskOutcome;
use swiftora::{AnalysisError, AppConfig, AppContext};

#[derive(Parser)]
#[command(name = "swiftora", version)]
#[command(about = "Generate a marketplace listing from a photo of an item", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Backend base URL (overrides SWIFTORA_BASE_URL)
    #[arg(long, global = true)]
    base_url: Option<String>,
}

#[derive(Subcommand)]
enum Commands {
    /// Upload a photo and print the generated listing
    Analyze {
        /// Path to the item photo
        image: PathBuf,

        /// Free-text notes for the backend, e.g. "128GB"
        #[arg(short, long, default_value = "")]
        notes: String,

        /// User identifier (overrides SWIFTORA_USER_ID)
        #[arg(short, long)]
        user: Option<String>,

        /// Print the raw job as JSON instead of a summary
        #[arg(long)]
        json: bool,
    },

    /// Check that the backend is up
    Health,

    /// List comparable listings known to the backend
    Comps {
        /// Title search term
        #[arg(short, long)]
        query: Option<String>,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    // Initialize structured logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .json()
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let mut config = match AppConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            tracing::error!(error = %e, "Failed to load configuration from environment");
            return ExitCode::FAILURE;
        }
    };
    if let Some(base_url) = cli.base_url {
        config.base_url = base_url;
    }

    let mut context = match AppContext::from_config(&config) {
        Ok(context) => context,
        Err(e) => {
            tracing::error!(error = %e, "Failed to initialize HTTP client");
            return ExitCode::FAILURE;
        }
    };

    tracing::info!(
        base_url = %context.client.base_url(),
        demo_mode = context.demo_mode,
        "Swiftora client ready"
    );

    let result = match cli.command {
        Commands::Analyze {
            image,
            notes,
            user,
            json,
        } => {
            if let Some(user) = user {
                context.user_id = user;
            }
            analyze(&context, &image, &notes, json).await
        }
        Commands::Health => health(&context).await,
        Commands::Comps { query } => comps(&context, query.as_deref()).await,
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(CliError::Analysis(e)) => {
            tracing::error!(kind = %e.kind(), retryable = e.is_retryable(), error = %e, "Request failed");
            ExitCode::FAILURE
        }
        Err(CliError::Other(message)) => {
            tracing::error!(error = %message, "Command failed");
            ExitCode::FAILURE
        }
    }
}

enum CliError {
    Analysis(AnalysisError),
    Other(String),
}

impl From<AnalysisError> for CliError {
    fn from(e: AnalysisError) -> Self {
        Self::Analysis(e)
    }
}

async fn analyze(context: &AppContext, path: &Path, notes: &str, json: bool) -> Result<(), CliError> {
    let bytes = tokio::fs::read(path)
        .await
        .map_err(|e| CliError::Other(format!("Failed to read {}: {}", path.display(), e)))?;

    let content_type = image::ImageFormat::from_path(path)
        .map(|format| format.to_mime_type())
        .unwrap_or("application/octet-stream");

    tracing::info!(
        image = %path.display(),
        content_type,
        bytes = bytes.len(),
        user_id = %context.user_id,
        "Submitting image for analysis"
    );

    let task = context.submit_task(ImageUpload::new(bytes, content_type), notes);
    let cancel = task.cancel_handle();

    let outcome = tokio::select! {
        outcome = task.join() => outcome,
        _ = tokio::signal::ctrl_c() => {
            cancel.cancel();
            TaskOutcome::Cancelled
        }
    };

    let job = match outcome {
        TaskOutcome::Completed(result) => result?,
        TaskOutcome::Cancelled => return Err(CliError::Other("Analysis cancelled".to_string())),
    };

    if let Err(problems) = job.check() {
        for problem in &problems {
            tracing::warn!(job_id = %job.id, problem = %problem, "Job failed sanity check");
        }
    }

    if json {
        let body = job
            .to_json_pretty()
            .map_err(|e| CliError::Other(format!("Failed to encode job: {}", e)))?;
        println!("{}", body);
    } else {
        print!("{}", render_summary(&job));
    }

    Ok(())
}

async fn health(context: &AppContext) -> Result<(), CliError> {
    let status = context.client.health().await?;
    println!("{}", status.status);
    if status.is_ok() {
        Ok(())
    } else {
        Err(CliError::Other(format!("Backend reported status {}", status.status)))
    }
}

async fn comps(context: &AppContext, query: Option<&str>) -> Result<(), CliError> {
    let comps = context.client.comps(query).await?;
    for comp in &comps {
        println!(
            "{:>10.2} {}  {}  [{}]",
            comp.price, comp.currency, comp.title, comp.source
        );
    }
    tracing::info!(count = comps.len(), "Comparables listed");
    Ok(())
}
