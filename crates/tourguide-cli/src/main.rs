use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use futures::StreamExt;
use std::io::Write;
use std::path::PathBuf;
use tourguide_agent::TurnRequest;
use tourguide_serve::{ServiceBuilder, serve};
use tourguide_speech::DeliveryEvent;

#[derive(Parser)]
#[command(name = "tourguide")]
#[command(about = "Museum tour guide - answer visitor questions with streamed speech", long_about = None)]
struct Cli {
    /// Log at debug level unless RUST_LOG says otherwise
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Serve the tour guide over HTTP
    Serve {
        /// Path to the tour guide YAML file
        #[arg(short, long)]
        config: PathBuf,

        /// Override the configured host
        #[arg(long)]
        host: Option<String>,

        /// Override the configured port
        #[arg(short, long)]
        port: Option<u16>,
    },
    /// Ask a single question and print the streamed answer
    Ask {
        /// Path to the tour guide YAML file
        #[arg(short, long)]
        config: PathBuf,

        /// Exhibit document id, as scanned from an exhibit code
        #[arg(short, long)]
        doc_id: Option<String>,

        /// Skip speech synthesis
        #[arg(long)]
        no_audio: bool,

        /// The visitor's question
        query: String,
    },
    /// Check a configuration file without starting anything
    Validate {
        /// Path to the tour guide YAML file
        #[arg(short, long)]
        config: PathBuf,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let level = if cli.verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level)).init();

    match cli.command {
        Commands::Serve { config, host, port } => serve_guide(config, host, port).await?,
        Commands::Ask {
            config,
            doc_id,
            no_audio,
            query,
        } => ask(config, doc_id, !no_audio, query).await?,
        Commands::Validate { config } => {
            ServiceBuilder::from_yaml_file(&config)
                .with_context(|| format!("Invalid configuration: {}", config.display()))?;
            println!("{}: ok", config.display());
        }
    }

    Ok(())
}

async fn serve_guide(config: PathBuf, host: Option<String>, port: Option<u16>) -> Result<()> {
    log::info!("Loading configuration from {:?}", config);

    let builder = ServiceBuilder::from_yaml_file(&config)
        .with_context(|| format!("Failed to load {}", config.display()))?;
    let mut server = builder.config.server.clone();
    if let Some(host) = host {
        server.host = host;
    }
    if let Some(port) = port {
        server.port = port;
    }

    let service = builder.build().context("Failed to assemble the tour guide")?;
    serve(service, &server).await?;

    Ok(())
}

async fn ask(config: PathBuf, doc_id: Option<String>, audio: bool, query: String) -> Result<()> {
    log::info!("Loading configuration from {:?}", config);

    let service = ServiceBuilder::from_yaml_file(&config)
        .with_context(|| format!("Failed to load {}", config.display()))?
        .build()
        .context("Failed to assemble the tour guide")?;

    if audio && !service.speech_enabled() {
        log::warn!("Speech is disabled in the configuration, printing text only");
    }

    let request = TurnRequest { query, doc_id };
    let mut stream = service.chat(&request, audio).await?;

    let mut clips = 0usize;
    let mut audio_bytes = 0usize;
    let mut stdout = std::io::stdout();
    while let Some(event) = stream.next().await {
        match event {
            DeliveryEvent::Text(chunk) => {
                print!("{}", chunk);
                stdout.flush()?;
            }
            DeliveryEvent::Audio(payload) => {
                clips += 1;
                audio_bytes += payload.to_base64().len();
                log::debug!("Received audio clip {}", clips);
            }
        }
    }
    println!();

    if audio && service.speech_enabled() {
        println!(
            "\n[{} audio clip(s), {} base64 bytes]",
            clips, audio_bytes
        );
    }

    Ok(())
}
