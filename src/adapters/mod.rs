//! Adapters module - inbound channels into the conversation.
//!
//! Every inbound event, whatever transport carried it, goes through one
//! [`Endpoint`], which owns a reference to the single [`TurnProcessor`].
//!
//! # Supported Channels
//!
//! - **HTTP** - REST `/chat` and peer `/submit` routes via axum
//! - **CLI** - Interactive command line interface
//!
//! # Adding a New Channel
//!
//! 1. Create a new file (e.g., `websocket.rs`)
//! 2. Translate its events into [`Endpoint`] calls
//! 3. Implement the [`Channel`] trait if it runs as a server

pub mod cli;
pub mod http;

use std::sync::Arc;

use chrono::Utc;
use tracing::{debug, info, warn};

use crate::agent::TurnProcessor;
use crate::error::Error;
use crate::identity::AgentIdentity;
use crate::protocol::{ChatAcknowledgement, ChatMessage, Envelope, Payload, RestRequest, RestResponse};
use crate::transport::Transport;
use crate::Result;

/// Channel trait for long-running inbound adapters.
///
/// All channel implementations must be [`Send`] + [`Sync`] for async compatibility.
pub trait Channel: Send + Sync {
    /// Channel name (e.g., "http", "cli").
    fn name(&self) -> &str;

    /// Start listening; resolves once the channel has stopped.
    fn start(&self) -> impl std::future::Future<Output = crate::Result<()>> + Send;

    /// Ask a running channel to stop.
    fn stop(&self) -> impl std::future::Future<Output = crate::Result<()>> + Send;
}

/// Transport-agnostic facade over the turn processor.
pub struct Endpoint {
    processor: Arc<TurnProcessor>,
    identity: AgentIdentity,
    transport: Arc<dyn Transport>,
    peer_address: Option<String>,
    intro_message: String,
}

impl Endpoint {
    pub fn new(
        processor: Arc<TurnProcessor>,
        identity: AgentIdentity,
        transport: Arc<dyn Transport>,
    ) -> Self {
        Self {
            processor,
            identity,
            transport,
            peer_address: None,
            intro_message: String::new(),
        }
    }

    /// Peer to greet at startup, and the greeting.
    pub fn with_peer(mut self, peer_address: Option<String>, intro_message: impl Into<String>) -> Self {
        self.peer_address = peer_address;
        self.intro_message = intro_message.into();
        self
    }

    pub fn identity(&self) -> &AgentIdentity {
        &self.identity
    }

    pub fn processor(&self) -> &TurnProcessor {
        &self.processor
    }

    /// Startup hook: announce ourselves and open the conversation with the
    /// configured peer. No reply is awaited.
    pub async fn on_startup(&self) -> Result<()> {
        info!(
            "My name is {} and my address is {}",
            self.identity.name, self.identity.address
        );

        let Some(peer) = self.peer_address.as_deref() else {
            return Ok(());
        };
        if self.intro_message.trim().is_empty() {
            return Ok(());
        }

        let intro = ChatMessage::text(&self.intro_message);
        self.transport.send(peer, Payload::ChatMessage(intro)).await?;
        info!(%peer, "sent introduction");
        Ok(())
    }

    /// Peer chat message: acknowledge, run a turn, reply to the sender.
    ///
    /// Returns the reply, or `None` when the message carried no text or came
    /// from this agent's own address.
    ///
    /// Every reply is itself a chat message, so two agents pointed at each
    /// other keep the exchange going until one of them stops.
    pub async fn on_peer_message(&self, sender: &str, msg: ChatMessage) -> Result<Option<String>> {
        info!(%sender, msg_id = %msg.msg_id, "received chat message");

        if sender == self.identity.address {
            warn!(msg_id = %msg.msg_id, "ignoring chat message sent from our own address");
            return Ok(None);
        }

        if let Err(e) = self
            .transport
            .send(sender, Payload::ChatAcknowledgement(msg.acknowledge()))
            .await
        {
            warn!(%sender, "could not acknowledge message: {}", e);
        }

        let unknown = msg.unknown_items();
        if unknown > 0 {
            warn!(%sender, unknown, "ignoring unrecognized content items");
        }

        let Some(text) = msg.text_content() else {
            debug!(%sender, "message carried no text content");
            return Ok(None);
        };

        let reply = self.processor.process_turn(&text).await?;
        self.transport
            .send(sender, Payload::ChatMessage(ChatMessage::text(&reply)))
            .await?;

        Ok(Some(reply))
    }

    pub fn on_peer_acknowledgement(&self, sender: &str, ack: &ChatAcknowledgement) {
        debug!(%sender, msg_id = %ack.acknowledged_msg_id, "message acknowledged");
    }

    /// Dispatch an inbound envelope addressed to this agent.
    pub async fn on_envelope(&self, envelope: Envelope) -> Result<()> {
        if envelope.target != self.identity.address {
            return Err(Error::InvalidMessage(format!(
                "envelope addressed to {}, not {}",
                envelope.target, self.identity.address
            )));
        }

        match envelope.payload {
            Payload::ChatMessage(msg) => {
                self.on_peer_message(&envelope.sender, msg).await?;
            }
            Payload::ChatAcknowledgement(ack) => {
                self.on_peer_acknowledgement(&envelope.sender, &ack);
            }
        }
        Ok(())
    }

    /// REST request: run a turn and wrap the reply.
    pub async fn on_rest_request(&self, request: RestRequest) -> Result<RestResponse> {
        info!("Received post request {}", request.text);

        let text = self.processor.process_turn(&request.text).await?;

        Ok(RestResponse {
            timestamp: Utc::now().timestamp(),
            text,
            agent_address: self.identity.address.clone(),
        })
    }
}
