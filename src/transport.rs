//! Outbound delivery of envelopes to peer agents.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use tracing::debug;

use crate::directory::Directory;
use crate::error::Error;
use crate::protocol::{Envelope, Payload};
use crate::Result;

/// HTTP client whose requests give up after `timeout`.
pub(crate) fn http_client(timeout: Duration) -> Result<Client> {
    Client::builder()
        .timeout(timeout)
        .build()
        .map_err(|e| Error::Config(format!("Failed to create HTTP client: {}", e)))
}

/// Sends payloads to agent addresses
#[async_trait]
pub trait Transport: Send + Sync {
    async fn send(&self, target: &str, payload: Payload) -> Result<()>;
}

/// Posts envelopes to the peer's endpoint over HTTP.
///
/// Endpoints come from the static map first, then from the directory.
pub struct HttpTransport {
    sender: String,
    directory: Arc<dyn Directory>,
    static_endpoints: HashMap<String, String>,
    client: Client,
}

impl HttpTransport {
    pub fn new(sender: impl Into<String>, directory: Arc<dyn Directory>, timeout: Duration) -> Result<Self> {
        Ok(Self {
            sender: sender.into(),
            directory,
            static_endpoints: HashMap::new(),
            client: http_client(timeout)?,
        })
    }

    pub fn with_static_endpoints(mut self, endpoints: HashMap<String, String>) -> Self {
        self.static_endpoints = endpoints;
        self
    }

    async fn endpoint_for(&self, target: &str) -> Result<String> {
        if let Some(endpoint) = self.static_endpoints.get(target) {
            return Ok(endpoint.clone());
        }

        self.directory
            .resolve(target)
            .await?
            .ok_or_else(|| Error::Transport(format!("no endpoint known for {}", target)))
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn send(&self, target: &str, payload: Payload) -> Result<()> {
        let endpoint = self.endpoint_for(target).await?;
        let envelope = Envelope::new(&self.sender, target, payload);

        debug!(%target, %endpoint, session = %envelope.session, "delivering envelope");

        let response = self
            .client
            .post(&endpoint)
            .json(&envelope)
            .send()
            .await
            .map_err(|e| Error::Transport(format!("delivery to {} failed: {}", target, e.without_url())))?;

        if !response.status().is_success() {
            return Err(Error::Transport(format!(
                "{} refused envelope: {}",
                target,
                response.status()
            )));
        }

        Ok(())
    }
}

/// Records every send for testing.
#[cfg(test)]
#[derive(Default)]
pub(crate) struct RecordingTransport {
    pub sent: std::sync::Mutex<Vec<(String, Payload)>>,
    pub fail: bool,
}

#[cfg(test)]
impl RecordingTransport {
    pub fn sent(&self) -> Vec<(String, Payload)> {
        self.sent.lock().unwrap().clone()
    }
}

#[cfg(test)]
#[async_trait]
impl Transport for RecordingTransport {
    async fn send(&self, target: &str, payload: Payload) -> Result<()> {
        if self.fail {
            return Err(Error::Transport(format!("{} unreachable", target)));
        }
        self.sent.lock().unwrap().push((target.to_string(), payload));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::directory::FakeDirectory;
    use crate::protocol::ChatMessage;
    use axum::{extract::State, http::StatusCode, routing::post, Json, Router};
    use std::sync::Mutex;
    use tokio::net::TcpListener;

    type Inbox = Arc<Mutex<Vec<Envelope>>>;

    fn transport(directory: Arc<FakeDirectory>) -> HttpTransport {
        HttpTransport::new("agent1qme", directory, Duration::from_secs(5)).unwrap()
    }

    /// Peer stub: `/submit` stores envelopes, `/refuse` answers 500.
    async fn spawn_peer() -> (String, Inbox) {
        async fn submit(State(inbox): State<Inbox>, Json(envelope): Json<Envelope>) -> StatusCode {
            inbox.lock().unwrap().push(envelope);
            StatusCode::OK
        }

        let inbox = Inbox::default();
        let app = Router::new()
            .route("/submit", post(submit))
            .route("/refuse", post(|| async { StatusCode::INTERNAL_SERVER_ERROR }))
            .with_state(inbox.clone());

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let base = format!("http://{}", listener.local_addr().unwrap());
        tokio::spawn(async move { axum::serve(listener, app).await });
        (base, inbox)
    }

    #[tokio::test]
    async fn test_static_endpoint_wins() {
        let directory = Arc::new(FakeDirectory::default());
        directory
            .endpoints
            .lock()
            .unwrap()
            .insert("agent1qpeer".into(), "http://from-directory/submit".into());

        let transport = transport(directory).with_static_endpoints(
            [("agent1qpeer".to_string(), "http://static/submit".to_string())]
                .into_iter()
                .collect(),
        );

        assert_eq!(
            transport.endpoint_for("agent1qpeer").await.unwrap(),
            "http://static/submit"
        );
    }

    #[tokio::test]
    async fn test_unknown_target() {
        let transport = transport(Arc::new(FakeDirectory::default()));

        let err = transport.endpoint_for("agent1qnobody").await.unwrap_err();
        assert!(matches!(err, Error::Transport(_)));
    }

    #[tokio::test]
    async fn test_send_posts_envelope() {
        let (base, inbox) = spawn_peer().await;
        let directory = Arc::new(FakeDirectory::default());
        directory
            .endpoints
            .lock()
            .unwrap()
            .insert("agent1qpeer".into(), format!("{}/submit", base));

        let msg = ChatMessage::text("Hello");
        transport(directory)
            .send("agent1qpeer", Payload::ChatMessage(msg.clone()))
            .await
            .unwrap();

        let received = inbox.lock().unwrap().clone();
        assert_eq!(received.len(), 1);
        assert_eq!(received[0].sender, "agent1qme");
        assert_eq!(received[0].target, "agent1qpeer");
        assert_eq!(received[0].payload, Payload::ChatMessage(msg));
    }

    #[tokio::test]
    async fn test_refused_envelope_is_transport_error() {
        let (base, inbox) = spawn_peer().await;
        let transport = transport(Arc::new(FakeDirectory::default())).with_static_endpoints(
            [("agent1qpeer".to_string(), format!("{}/refuse", base))]
                .into_iter()
                .collect(),
        );

        let err = transport
            .send("agent1qpeer", Payload::ChatMessage(ChatMessage::text("Hello")))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Transport(_)));
        assert!(err.to_string().contains("500"));
        assert!(inbox.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_silent_peer_times_out() {
        // Accepts connections and never answers.
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let endpoint = format!("http://{}/submit", listener.local_addr().unwrap());
        tokio::spawn(async move {
            let mut held = Vec::new();
            while let Ok((socket, _)) = listener.accept().await {
                held.push(socket);
            }
        });

        let transport = HttpTransport::new(
            "agent1qme",
            Arc::new(FakeDirectory::default()),
            Duration::from_millis(200),
        )
        .unwrap()
        .with_static_endpoints([("agent1qpeer".to_string(), endpoint)].into_iter().collect());

        let result = tokio::time::timeout(
            Duration::from_secs(5),
            transport.send("agent1qpeer", Payload::ChatMessage(ChatMessage::text("Hello"))),
        )
        .await
        .expect("send is bounded by the client timeout");
        assert!(matches!(result, Err(Error::Transport(_))));
    }
}
