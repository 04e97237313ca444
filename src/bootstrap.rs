//! Process bootstrap: credentials, identity, registration and the serve loop.
//!
//! Order matters: the LLM backend is selected before anything is published,
//! so a process without a usable backend never shows up in the directory.

use std::future::Future;
use std::io::IsTerminal;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::adapters::http::{self, HttpChannel};
use crate::adapters::{Channel, Endpoint};
use crate::agent::{Context, LlmClient, ProviderRegistry, TurnProcessor};
use crate::config::{AgentConfig, Config};
use crate::directory::{Directory, HttpDirectory, Registration};
use crate::error::Error;
use crate::identity::AgentIdentity;
use crate::transport::{HttpTransport, Transport};
use crate::Result;

/// Whether a person is at the terminal to answer prompts.
pub fn is_attended() -> bool {
    std::io::stdin().is_terminal() && std::io::stdout().is_terminal()
}

/// Fill missing credentials by prompting, when someone is there to answer.
pub fn resolve_credentials(config: &mut Config, attended: bool) -> Result<()> {
    if !attended {
        return Ok(());
    }

    if !config.llm.has_credential() {
        config.llm.anthropic_api_key = prompt_secret("Anthropic API Key:")?;
    }
    if config.directory.api_key.is_empty() {
        config.directory.api_key = prompt_secret("Agent Verse API Key:")?;
    }
    Ok(())
}

fn prompt_secret(label: &str) -> Result<String> {
    use inquire::{Password, PasswordDisplayMode};

    Password::new(label)
        .with_display_mode(PasswordDisplayMode::Hidden)
        .without_confirmation()
        .prompt()
        .map(|s| s.trim().to_string())
        .map_err(|e| Error::Config(format!("Prompt failed: {}", e)))
}

/// Append the same short random suffix to name and seed so that every run
/// gets a fresh identity.
pub fn apply_unique_suffix(agent: &mut AgentConfig) -> String {
    let suffix: String = Uuid::new_v4().simple().to_string().chars().take(5).collect();
    agent.name = format!("{}_{}", agent.name, suffix);
    agent.seed = format!("{}.{}", agent.seed, suffix);
    suffix
}

/// Resolves once Ctrl+C has been pressed.
pub fn interrupt_signal() -> Result<impl Future<Output = ()> + Send + 'static> {
    let (tx, mut rx) = watch::channel(false);
    ctrlc::set_handler(move || {
        let _ = tx.send(true);
    })
    .map_err(|e| Error::Other(format!("Failed to install Ctrl+C handler: {}", e)))?;

    Ok(async move {
        while !*rx.borrow() {
            if rx.changed().await.is_err() {
                break;
            }
        }
    })
}

/// A fully wired agent, ready to register and serve.
pub struct Bootstrap {
    identity: AgentIdentity,
    registration: Registration,
    bind_addr: String,
    directory: Arc<dyn Directory>,
    endpoint: Arc<Endpoint>,
}

impl Bootstrap {
    /// Wire the agent against the real directory service.
    pub fn prepare(config: &Config) -> Result<Self> {
        let directory = Arc::new(HttpDirectory::new(&config.directory)?);
        Self::prepare_with(config, directory)
    }

    /// Wire the agent against a given directory.
    pub fn prepare_with(config: &Config, directory: Arc<dyn Directory>) -> Result<Self> {
        let client = ProviderRegistry::select(&config.llm)?;

        if config.directory.api_key.is_empty() {
            return Err(Error::Registration(
                "AGENTVERSE_API_KEY is not set".to_string(),
            ));
        }

        let mut agent = config.agent.clone();
        if agent.unique_suffix {
            apply_unique_suffix(&mut agent);
        }
        let identity = AgentIdentity::from_config(&agent);

        let send_timeout = Duration::from_secs(agent.send_timeout_secs.max(1));
        let transport: Arc<dyn Transport> = Arc::new(
            HttpTransport::new(&identity.address, directory.clone(), send_timeout)?
                .with_static_endpoints(agent.peer_endpoints.clone()),
        );

        Ok(Self::assemble(config, &agent, identity, client, directory, transport))
    }

    fn assemble(
        config: &Config,
        agent: &AgentConfig,
        identity: AgentIdentity,
        client: Arc<dyn LlmClient>,
        directory: Arc<dyn Directory>,
        transport: Arc<dyn Transport>,
    ) -> Self {
        let mut context_config = config.clone();
        context_config.agent = agent.clone();
        let processor = Arc::new(TurnProcessor::new(client, Context::new(&context_config)));

        let registration = Registration::new(&identity, agent.advertised_endpoint(), &agent.description)
            .with_publish_details(agent.publish_details);

        let endpoint = Arc::new(
            Endpoint::new(processor, identity.clone(), transport)
                .with_peer(agent.peer_address.clone(), &agent.intro_message),
        );

        Self {
            identity,
            registration,
            bind_addr: format!("{}:{}", agent.host, agent.port),
            directory,
            endpoint,
        }
    }

    pub fn identity(&self) -> &AgentIdentity {
        &self.identity
    }

    pub fn registration(&self) -> &Registration {
        &self.registration
    }

    pub fn endpoint(&self) -> Arc<Endpoint> {
        self.endpoint.clone()
    }

    /// Serve until Ctrl+C.
    pub async fn run(self) -> Result<()> {
        let signal = interrupt_signal()?;
        self.run_until(signal).await
    }

    /// Bind, register, greet the peer, serve until `shutdown` resolves, then
    /// deregister.
    pub async fn run_until<F>(self, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()> + Send,
    {
        let addr: SocketAddr = self
            .bind_addr
            .parse()
            .map_err(|e| Error::Config(format!("Invalid bind address {}: {}", self.bind_addr, e)))?;
        let listener = http::bind(addr).await?;

        self.directory.register(&self.registration).await?;
        info!("✅ Registered agent: {}", self.identity);

        let channel = HttpChannel::new(self.endpoint.clone(), addr);
        let mut server = tokio::spawn(channel.serve(listener));

        // The introduction runs beside the server so a silent peer cannot
        // hold up shutdown.
        let endpoint = self.endpoint.clone();
        let intro = tokio::spawn(async move {
            if let Err(e) = endpoint.on_startup().await {
                warn!("startup message was not delivered: {}", e);
            }
        });

        let server_result = tokio::select! {
            joined = &mut server => Some(joined),
            _ = shutdown => None,
        };

        let result = match server_result {
            Some(joined) => {
                error!("HTTP channel stopped unexpectedly");
                flatten(joined)
            }
            None => {
                info!("🛑 Shutting down agent...");
                channel.stop().await?;
                flatten(server.await)
            }
        };

        intro.abort();
        self.deregister().await;
        info!("✅ Agent stopped.");
        result
    }

    /// Withdraw from the directory; failures are only logged.
    async fn deregister(&self) {
        if let Err(e) = self.directory.deregister(&self.identity.address).await {
            warn!("{}", e);
        }
    }
}

fn flatten(joined: std::result::Result<Result<()>, tokio::task::JoinError>) -> Result<()> {
    joined.map_err(|e| Error::Other(format!("HTTP channel task failed: {}", e)))?
}
