//! Directory service client.
//!
//! The directory maps agent addresses to reachable endpoints. This agent
//! registers itself at startup, deregisters on shutdown, and looks peers up
//! when it has to deliver an envelope.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};
use url::Url;

use crate::config::DirectoryConfig;
use crate::error::Error;
use crate::identity::AgentIdentity;
use crate::transport::http_client;
use crate::Result;

/// What gets published about this agent
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Registration {
    pub name: String,
    pub address: String,
    pub endpoint: String,
    pub description: String,
    pub protocols: Vec<String>,
    pub publish_details: bool,
}

impl Registration {
    pub fn new(identity: &AgentIdentity, endpoint: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            name: identity.name.clone(),
            address: identity.address.clone(),
            endpoint: endpoint.into(),
            description: description.into(),
            protocols: vec!["chat".to_string()],
            publish_details: true,
        }
    }

    pub fn with_publish_details(mut self, publish: bool) -> Self {
        self.publish_details = publish;
        self
    }
}

/// Directory record returned by a lookup
#[derive(Debug, Clone, Deserialize)]
pub struct AgentRecord {
    pub address: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub endpoint: Option<String>,
}

/// Directory service contract
#[async_trait]
pub trait Directory: Send + Sync {
    /// Publish this agent. Failure is fatal at startup.
    async fn register(&self, registration: &Registration) -> Result<()>;

    /// Withdraw this agent. Callers log failures and carry on.
    async fn deregister(&self, address: &str) -> Result<()>;

    /// Endpoint for an address, if the directory knows it.
    async fn resolve(&self, address: &str) -> Result<Option<String>>;
}

/// Directory reached over HTTP with a bearer token
pub struct HttpDirectory {
    base: String,
    api_key: String,
    client: Client,
}

impl HttpDirectory {
    pub fn new(config: &DirectoryConfig) -> Result<Self> {
        let url = Url::parse(&config.url)
            .map_err(|e| Error::Config(format!("Invalid directory URL {}: {}", config.url, e)))?;

        Ok(Self {
            base: url.as_str().trim_end_matches('/').to_string(),
            api_key: config.api_key.clone(),
            client: http_client(Duration::from_secs(config.timeout_secs.max(1)))?,
        })
    }

    fn agents_url(&self) -> String {
        format!("{}/v1/agents", self.base)
    }

    fn agent_url(&self, address: &str) -> String {
        format!("{}/v1/agents/{}", self.base, address)
    }
}

#[async_trait]
impl Directory for HttpDirectory {
    async fn register(&self, registration: &Registration) -> Result<()> {
        let response = self
            .client
            .post(self.agents_url())
            .bearer_auth(&self.api_key)
            .json(registration)
            .send()
            .await
            .map_err(|e| Error::Registration(format!("directory unreachable: {}", e.without_url())))?;

        if !response.status().is_success() {
            let status = response.status();
            let text = response.text().await.unwrap_or_default();
            return Err(Error::Registration(format!(
                "directory rejected {} ({}): {}",
                registration.name, status, text
            )));
        }

        info!(name = %registration.name, address = %registration.address, "registered with directory");
        Ok(())
    }

    async fn deregister(&self, address: &str) -> Result<()> {
        let response = self
            .client
            .delete(self.agent_url(address))
            .bearer_auth(&self.api_key)
            .send()
            .await
            .map_err(|e| Error::Deregistration(format!("directory unreachable: {}", e.without_url())))?;

        if !response.status().is_success() && response.status() != StatusCode::NOT_FOUND {
            return Err(Error::Deregistration(format!(
                "directory answered {}",
                response.status()
            )));
        }

        info!(%address, "deregistered from directory");
        Ok(())
    }

    async fn resolve(&self, address: &str) -> Result<Option<String>> {
        let response = self
            .client
            .get(self.agent_url(address))
            .bearer_auth(&self.api_key)
            .send()
            .await
            .map_err(|e| Error::Transport(format!("directory lookup failed: {}", e.without_url())))?;

        if response.status() == StatusCode::NOT_FOUND {
            debug!(%address, "address unknown to directory");
            return Ok(None);
        }
        if !response.status().is_success() {
            return Err(Error::Transport(format!(
                "directory lookup for {} answered {}",
                address,
                response.status()
            )));
        }

        let record: AgentRecord = response
            .json()
            .await
            .map_err(|e| Error::Transport(format!("unreadable directory record: {}", e)))?;
        Ok(record.endpoint)
    }
}

/// In-memory directory for testing.
#[cfg(test)]
#[derive(Default)]
pub(crate) struct FakeDirectory {
    pub registered: std::sync::Mutex<Vec<Registration>>,
    pub deregistered: std::sync::Mutex<Vec<String>>,
    pub endpoints: std::sync::Mutex<std::collections::HashMap<String, String>>,
    pub fail_register: bool,
    pub fail_deregister: bool,
}

#[cfg(test)]
#[async_trait]
impl Directory for FakeDirectory {
    async fn register(&self, registration: &Registration) -> Result<()> {
        if self.fail_register {
            return Err(Error::Registration("directory is down".to_string()));
        }
        self.registered.lock().unwrap().push(registration.clone());
        self.endpoints
            .lock()
            .unwrap()
            .insert(registration.address.clone(), registration.endpoint.clone());
        Ok(())
    }

    async fn deregister(&self, address: &str) -> Result<()> {
        if self.fail_deregister {
            return Err(Error::Deregistration("directory is down".to_string()));
        }
        self.deregistered.lock().unwrap().push(address.to_string());
        Ok(())
    }

    async fn resolve(&self, address: &str) -> Result<Option<String>> {
        Ok(self.endpoints.lock().unwrap().get(address).cloned())
    }
}
