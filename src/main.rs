use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use dotenv::dotenv;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;

use image_describer::config::AppConfig;
use image_describer::handlers::{AnalysisOutcome, ImageDescriptionClient};
use image_describer::models::{AnalysisInput, Credential, ImageFormat, UploadedImage};
use image_describer::services::OpenAIConnector;
use image_describer::terminal::TerminalSink;

#[derive(Parser)]
#[command(name = "image-describer", version, about = "Streamed AI descriptions of JPEG/PNG images")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Describe one image in the terminal
    Describe {
        /// Image to analyze (.jpg, .jpeg or .png)
        image: Option<PathBuf>,

        /// Extra context to include in the prompt
        #[arg(long)]
        context: Option<String>,

        /// Access key for the inference API
        #[arg(long, env = "OPENAI_API_KEY", hide_env_values = true, default_value = "")]
        api_key: String,

        /// Print only the finished description
        #[arg(long)]
        no_stream: bool,
    },

    /// Serve the browser upload page
    #[cfg(feature = "web-server")]
    Serve {
        /// Address to bind, overrides BIND_ADDR
        #[arg(long)]
        addr: Option<String>,
    },
}

async fn load_image(path: &Path) -> Result<UploadedImage> {
    let filename = path
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default();

    // Reject by extension before reading anything
    ImageFormat::from_filename(&filename)?;

    let bytes = tokio::fs::read(path)
        .await
        .with_context(|| format!("Failed to read {}", path.display()))?;
    log::debug!("📊 Image file size: {} bytes", bytes.len());

    UploadedImage::from_upload(filename, bytes)
}

fn build_client(config: &AppConfig) -> Result<ImageDescriptionClient> {
    let connector = OpenAIConnector::new(config.openai())?;
    log::info!("✅ Inference client ready: {} (model {})", config.base_url, config.model);
    Ok(ImageDescriptionClient::new(Arc::new(connector), config.client_settings()))
}

async fn describe(
    config: &AppConfig,
    image: Option<PathBuf>,
    context: Option<String>,
    api_key: String,
    no_stream: bool,
) -> Result<ExitCode> {
    let image = match image {
        Some(path) => Some(load_image(&path).await?),
        None => None,
    };

    let input = AnalysisInput {
        credential: Credential::new(api_key),
        image,
        include_context: context.is_some(),
        context,
        triggered: true,
    };

    let client = build_client(config)?;
    let mut sink = TerminalSink::new(std::io::stdout(), std::io::stderr(), !no_stream);

    let outcome = client.analyze(&input, &mut sink).await;
    if let Some(e) = sink.take_error() {
        return Err(e).context("Failed to write the description");
    }

    match outcome {
        AnalysisOutcome::Described(_) => Ok(ExitCode::SUCCESS),
        AnalysisOutcome::Warned(_) | AnalysisOutcome::Failed(_) => Ok(ExitCode::FAILURE),
    }
}

#[cfg(feature = "web-server")]
async fn serve(config: &AppConfig, addr: Option<String>) -> Result<ExitCode> {
    use image_describer::web::server::create_router;

    let addr = addr.unwrap_or_else(|| config.bind_addr.clone());
    let app = create_router(Arc::new(build_client(config)?));

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;

    log::info!("🌐 Upload page available at http://{}", addr);
    println!("\n🌷 Análisis de Imagen: http://{}", addr);
    println!("🛑 Detener con Ctrl+C\n");

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            tokio::signal::ctrl_c().await.ok();
            log::info!("🛑 Shutting down...");
        })
        .await?;

    Ok(ExitCode::SUCCESS)
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    // Initialize logger
    env_logger::init();

    // Load environment variables before clap reads OPENAI_API_KEY
    dotenv().ok();

    let cli = Cli::parse();
    let config = AppConfig::from_env()?;

    match cli.command {
        Command::Describe {
            image,
            context,
            api_key,
            no_stream,
        } => describe(&config, image, context, api_key, no_stream).await,
        #[cfg(feature = "web-server")]
        Command::Serve { addr } => serve(&config, addr).await,
    }
}
