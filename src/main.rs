//! MirrorMind CLI entry point

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use mirror_mind::adapters::cli::CliChannel;
use mirror_mind::agent::{Context, ProviderRegistry, TurnProcessor};
use mirror_mind::bootstrap::{self, Bootstrap};
use mirror_mind::config::Config;
use mirror_mind::directory::HttpDirectory;
use mirror_mind::identity::{self, AgentIdentity};
use mirror_mind::protocol::{ChatMessage, Payload};
use mirror_mind::transport::{HttpTransport, Transport};
use mirror_mind::ui;

#[derive(Parser)]
#[command(name = "mirror-mind")]
#[command(about = "🪞 MirrorMind - a conversational agent backed by a hosted LLM")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Register with the directory and serve peers and REST clients
    Serve {
        /// Listen port
        #[arg(short, long)]
        port: Option<u16>,

        /// Address of a peer to greet at startup
        #[arg(long)]
        peer: Option<String>,

        /// Append a random suffix to the agent name and seed
        #[arg(long)]
        unique: bool,
    },

    /// Chat with the agent locally
    Chat {
        /// Message to send to the agent
        #[arg(short, long)]
        message: Option<String>,
    },

    /// Send a single chat message to a peer agent
    Send {
        /// Recipient address
        #[arg(long)]
        to: String,

        /// Message text
        #[arg(long)]
        text: String,
    },

    /// Print the address derived from a seed
    Identity {
        /// Seed to derive from (defaults to the configured one)
        #[arg(long)]
        seed: Option<String>,
    },

    /// Show MirrorMind status
    Status,

    /// Write a configuration file interactively
    Onboard,
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();

    if let Err(e) = run(cli).await {
        ui::print_error(&format!("{:#}", e));
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<()> {
    match cli.command {
        Commands::Onboard => {
            mirror_mind::config::onboard()?;
        }

        Commands::Serve { port, peer, unique } => {
            let mut config = mirror_mind::config::load()?;
            if let Some(port) = port {
                config.agent.port = port;
            }
            if peer.is_some() {
                config.agent.peer_address = peer;
            }
            config.agent.unique_suffix |= unique;
            run_serve(config).await?;
        }

        Commands::Chat { message } => {
            let config = mirror_mind::config::load()?;
            run_chat(&config, message).await?;
        }

        Commands::Send { to, text } => {
            let config = mirror_mind::config::load()?;
            run_send(&config, &to, &text).await?;
        }

        Commands::Identity { seed } => {
            let config = mirror_mind::config::load()?;
            let seed = seed.unwrap_or(config.agent.seed);
            println!("{}", identity::derive_address(&seed));
        }

        Commands::Status => {
            let config = mirror_mind::config::load()?;
            print_status(&config);
        }
    }

    Ok(())
}

async fn run_serve(mut config: Config) -> Result<()> {
    bootstrap::resolve_credentials(&mut config, bootstrap::is_attended())?;

    let agent = Bootstrap::prepare(&config)?;
    ui::print_header(&agent.identity().name, &agent.identity().address);
    ui::print_step(&format!("Advertising {}", agent.registration().endpoint));
    ui::print_step("Press Ctrl+C to deregister and stop");

    agent.run().await?;
    Ok(())
}

async fn run_chat(config: &Config, message: Option<String>) -> Result<()> {
    let client = ProviderRegistry::select(&config.llm)?;
    let processor = Arc::new(TurnProcessor::new(client, Context::new(config)));
    let cli = CliChannel::new(processor);

    if let Some(msg) = message {
        let reply = cli.run_once(&msg).await?;
        ui::print_reply(&config.agent.name, &reply);
    } else {
        ui::print_header("Interactive mode", "type 'exit' to quit");
        cli.run_interactive().await?;
    }

    Ok(())
}

async fn run_send(config: &Config, to: &str, text: &str) -> Result<()> {
    identity::validate_address(to)?;

    let me = AgentIdentity::from_config(&config.agent);
    let directory = Arc::new(HttpDirectory::new(&config.directory)?);
    let timeout = Duration::from_secs(config.agent.send_timeout_secs.max(1));
    let transport = HttpTransport::new(&me.address, directory, timeout)?
        .with_static_endpoints(config.agent.peer_endpoints.clone());

    let spinner = ui::spinner("delivering");
    let result = transport
        .send(to, Payload::ChatMessage(ChatMessage::text(text)))
        .await;
    spinner.finish_and_clear();
    result?;

    ui::print_success(&format!("Sent to {}", to));
    Ok(())
}

fn print_status(config: &Config) {
    let me = AgentIdentity::from_config(&config.agent);
    ui::print_header("Status", &me.address);

    println!("Name: {}", me.name);
    println!("Config: {:?}", mirror_mind::config::config_path());
    println!("Endpoint: {}", config.agent.advertised_endpoint());
    println!(
        "Directory: {} ({})",
        config.directory.url,
        if config.directory.api_key.is_empty() { "key not set" } else { "✓" }
    );
    println!(
        "Pinned provider: {}",
        config.llm.provider.as_deref().unwrap_or("none")
    );
    let providers = ProviderRegistry::describe(&config.llm);
    for (provider, ready) in &providers {
        println!("  {}: {}", provider, if *ready { "✓" } else { "not set" });
    }
    if !providers.iter().any(|(_, ready)| *ready) {
        ui::print_warning("No LLM credential set; 'serve' and 'chat' will refuse to start");
    }
    if let Some(peer) = &config.agent.peer_address {
        println!("Peer: {}", peer);
    }
}
