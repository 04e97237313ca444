//! Configuration management
//!
//! The configuration is read once at process entry: the JSON file at
//! `~/.mirror-mind/config.json` (optional), then `.env`, then process
//! environment overrides. The resulting [`Config`] is passed by reference to
//! everything that needs it.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use crate::Result;
use crate::error::Error;

pub const ENV_ANTHROPIC_KEY: &str = "ANTHROPIC_API_KEY";
pub const ENV_OPENAI_KEY: &str = "OPENAI_API_KEY";
pub const ENV_GEMINI_KEY: &str = "GEMINI_API_KEY";
pub const ENV_DIRECTORY_KEY: &str = "AGENTVERSE_API_KEY";

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub llm: LlmConfig,

    #[serde(default)]
    pub agent: AgentConfig,

    #[serde(default)]
    pub directory: DirectoryConfig,
}

/// LLM backend settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    /// Pin a provider ("anthropic", "openai", "gemini"). Unset means first
    /// provider with a credential wins.
    #[serde(default)]
    pub provider: Option<String>,

    #[serde(default)]
    pub anthropic_api_key: String,

    #[serde(default)]
    pub openai_api_key: String,

    #[serde(default)]
    pub gemini_api_key: String,

    /// Model override; each provider has its own default.
    #[serde(default)]
    pub model: Option<String>,

    /// Upper bound on a single backend call
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,

    /// Maximum history messages sent to the backend
    #[serde(default = "default_history_window")]
    pub history_window: usize,

    #[serde(default)]
    pub system_prompt: Option<String>,
}

/// Agent identity and endpoint settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentConfig {
    #[serde(default = "default_name")]
    pub name: String,

    /// Seed the agent address is derived from
    #[serde(default = "default_seed")]
    pub seed: String,

    /// Interface the HTTP server binds to
    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,

    /// Public endpoint advertised to the directory. Defaults to
    /// `http://{host}:{port}/submit`.
    #[serde(default)]
    pub endpoint: Option<String>,

    #[serde(default = "default_description")]
    pub description: String,

    /// Peer greeted at startup
    #[serde(default)]
    pub peer_address: Option<String>,

    /// Static address -> endpoint map, consulted before the directory
    #[serde(default)]
    pub peer_endpoints: HashMap<String, String>,

    #[serde(default = "default_intro_message")]
    pub intro_message: String,

    /// Append a short random suffix to name and seed at startup
    #[serde(default)]
    pub unique_suffix: bool,

    #[serde(default = "default_true")]
    pub publish_details: bool,

    /// Upper bound on one envelope delivery to a peer
    #[serde(default = "default_request_timeout_secs")]
    pub send_timeout_secs: u64,
}

/// Directory/registration service settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DirectoryConfig {
    #[serde(default = "default_directory_url")]
    pub url: String,

    #[serde(default)]
    pub api_key: String,

    #[serde(default = "default_request_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_timeout_secs() -> u64 {
    60
}

fn default_request_timeout_secs() -> u64 {
    10
}

fn default_max_tokens() -> u32 {
    4096
}

fn default_history_window() -> usize {
    40
}

fn default_name() -> String {
    "mirror_mind".to_string()
}

fn default_seed() -> String {
    "mirrormind.server.demo".to_string()
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8080
}

fn default_description() -> String {
    "MirrorMind conversational agent".to_string()
}

fn default_intro_message() -> String {
    "This event is going to start a conversation".to_string()
}

fn default_directory_url() -> String {
    "https://agentverse.ai".to_string()
}

fn default_true() -> bool {
    true
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            provider: None,
            anthropic_api_key: String::new(),
            openai_api_key: String::new(),
            gemini_api_key: String::new(),
            model: None,
            timeout_secs: default_timeout_secs(),
            max_tokens: default_max_tokens(),
            history_window: default_history_window(),
            system_prompt: None,
        }
    }
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            name: default_name(),
            seed: default_seed(),
            host: default_host(),
            port: default_port(),
            endpoint: None,
            description: default_description(),
            peer_address: None,
            peer_endpoints: HashMap::new(),
            intro_message: default_intro_message(),
            unique_suffix: false,
            publish_details: true,
            send_timeout_secs: default_request_timeout_secs(),
        }
    }
}

impl Default for DirectoryConfig {
    fn default() -> Self {
        Self {
            url: default_directory_url(),
            api_key: String::new(),
            timeout_secs: default_request_timeout_secs(),
        }
    }
}

impl LlmConfig {
    /// Whether any LLM credential is present
    pub fn has_credential(&self) -> bool {
        !self.anthropic_api_key.is_empty()
            || !self.openai_api_key.is_empty()
            || !self.gemini_api_key.is_empty()
    }
}

impl AgentConfig {
    /// Endpoint advertised to the directory for inbound envelopes
    pub fn advertised_endpoint(&self) -> String {
        self.endpoint
            .clone()
            .unwrap_or_else(|| format!("http://{}:{}/submit", self.host, self.port))
    }
}

impl Config {
    /// Apply overrides from the process environment.
    pub fn apply_env(&mut self) -> Result<()> {
        self.apply_env_from(|key| std::env::var(key).ok())
    }

    /// Apply overrides from an arbitrary variable lookup. Empty values are
    /// treated as unset.
    pub fn apply_env_from<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(v) = get(ENV_ANTHROPIC_KEY) {
            self.llm.anthropic_api_key = v;
        }
        if let Some(v) = get(ENV_OPENAI_KEY) {
            self.llm.openai_api_key = v;
        }
        if let Some(v) = get(ENV_GEMINI_KEY) {
            self.llm.gemini_api_key = v;
        }
        if let Some(v) = get(ENV_DIRECTORY_KEY) {
            self.directory.api_key = v;
        }
        if let Some(v) = get("MIRROR_MIND_PROVIDER") {
            self.llm.provider = Some(v);
        }
        if let Some(v) = get("MIRROR_MIND_MODEL") {
            self.llm.model = Some(v);
        }
        if let Some(v) = get("MIRROR_MIND_PORT") {
            self.agent.port = v
                .parse()
                .map_err(|_| Error::Config(format!("MIRROR_MIND_PORT is not a port: {}", v)))?;
        }
        if let Some(v) = get("MIRROR_MIND_SEED") {
            self.agent.seed = v;
        }
        if let Some(v) = get("MIRROR_MIND_NAME") {
            self.agent.name = v;
        }
        if let Some(v) = get("MIRROR_MIND_PEER") {
            self.agent.peer_address = Some(v);
        }
        if let Some(v) = get("MIRROR_MIND_DIRECTORY_URL") {
            self.directory.url = v;
        }

        Ok(())
    }
}

/// Get the config directory path
pub fn config_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".mirror-mind")
}

/// Get the config file path
pub fn config_path() -> PathBuf {
    config_dir().join("config.json")
}

/// Load configuration: file (if present), `.env`, then environment.
pub fn load() -> Result<Config> {
    let _ = dotenvy::dotenv();

    let mut config = load_from(&config_path())?;
    config.apply_env()?;
    Ok(config)
}

/// Load configuration from a file, falling back to defaults when it is missing.
pub fn load_from(path: &Path) -> Result<Config> {
    if !path.exists() {
        return Ok(Config::default());
    }

    let content = std::fs::read_to_string(path)?;
    let config: Config = serde_json::from_str(&content)
        .map_err(|e| Error::Config(format!("Invalid config at {:?}: {}", path, e)))?;
    Ok(config)
}

/// Save configuration to file
pub fn save(config: &Config) -> Result<()> {
    save_to(config, &config_path())
}

pub fn save_to(config: &Config, path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let content = serde_json::to_string_pretty(config)?;
    std::fs::write(path, content)?;
    Ok(())
}

/// Interactive setup wizard
pub fn onboard() -> Result<()> {
    use crate::ui;
    use inquire::{Password, PasswordDisplayMode, Select, Text};

    ui::print_header("Setup Wizard", "local");

    let mut config = load_from(&config_path())?;

    let providers = vec!["Anthropic", "OpenAI", "Gemini", "Skip (use environment)"];
    let choice = Select::new("Choose your LLM provider:", providers)
        .prompt()
        .map_err(|e| Error::Config(format!("Prompt failed: {}", e)))?;

    if !choice.starts_with("Skip") {
        let key = Password::new(&format!("Enter your {} API key:", choice))
            .with_display_mode(PasswordDisplayMode::Masked)
            .without_confirmation()
            .prompt()
            .map_err(|e| Error::Config(format!("Prompt failed: {}", e)))?;

        match choice {
            "Anthropic" => config.llm.anthropic_api_key = key,
            "OpenAI" => config.llm.openai_api_key = key,
            _ => config.llm.gemini_api_key = key,
        }
        config.llm.provider = Some(choice.to_lowercase());
    }

    let name = Text::new("Agent name:")
        .with_default(&config.agent.name)
        .prompt()
        .map_err(|e| Error::Config(format!("Prompt failed: {}", e)))?;
    config.agent.name = name;

    let seed = Text::new("Identity seed:")
        .with_default(&config.agent.seed)
        .prompt()
        .map_err(|e| Error::Config(format!("Prompt failed: {}", e)))?;
    config.agent.seed = seed;

    ui::print_thinking("Saving configuration");
    save(&config)?;

    ui::print_success(&format!("Configuration written to {:?}", config_path()));
    ui::print_step("Run 'mirror-mind serve' to start the agent.");

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.agent.port, 8080);
        assert_eq!(config.agent.seed, "mirrormind.server.demo");
        assert_eq!(config.llm.timeout_secs, 60);
        assert_eq!(config.llm.history_window, 40);
        assert_eq!(config.agent.send_timeout_secs, 10);
        assert_eq!(config.directory.timeout_secs, 10);
        assert!(!config.llm.has_credential());
    }

    #[test]
    fn test_partial_file_uses_defaults() {
        let config: Config = serde_json::from_str(r#"{"agent": {"port": 9000}}"#).unwrap();
        assert_eq!(config.agent.port, 9000);
        assert_eq!(config.agent.name, "mirror_mind");
        assert!(config.agent.publish_details);
    }

    #[test]
    fn test_env_overrides() {
        let mut config = Config::default();
        let vars: HashMap<&str, &str> = [
            ("OPENAI_API_KEY", "sk-test"),
            ("AGENTVERSE_API_KEY", "av-test"),
            ("MIRROR_MIND_PORT", "8082"),
            ("MIRROR_MIND_PEER", "agent1qpeer"),
            ("ANTHROPIC_API_KEY", "  "),
        ]
        .into_iter()
        .collect();

        config
            .apply_env_from(|k| vars.get(k).map(|v| v.to_string()))
            .unwrap();

        assert_eq!(config.llm.openai_api_key, "sk-test");
        assert!(config.llm.anthropic_api_key.is_empty());
        assert_eq!(config.directory.api_key, "av-test");
        assert_eq!(config.agent.port, 8082);
        assert_eq!(config.agent.peer_address.as_deref(), Some("agent1qpeer"));
    }

    #[test]
    fn test_env_bad_port() {
        let mut config = Config::default();
        let result = config.apply_env_from(|k| {
            (k == "MIRROR_MIND_PORT").then(|| "not-a-port".to_string())
        });
        assert!(matches!(result, Err(Error::Config(_))));
    }

    #[test]
    fn test_advertised_endpoint() {
        let mut agent = AgentConfig::default();
        assert_eq!(agent.advertised_endpoint(), "http://0.0.0.0:8080/submit");

        agent.endpoint = Some("https://mind.example.com/submit".into());
        assert_eq!(agent.advertised_endpoint(), "https://mind.example.com/submit");
    }

    #[test]
    fn test_save_and_load_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.json");

        let mut config = Config::default();
        config.agent.name = "mirror_mind_beta".into();
        save_to(&config, &path).unwrap();

        let loaded = load_from(&path).unwrap();
        assert_eq!(loaded.agent.name, "mirror_mind_beta");
    }

    #[test]
    fn test_missing_file_is_default() {
        let dir = tempfile::tempdir().unwrap();
        let loaded = load_from(&dir.path().join("absent.json")).unwrap();
        assert_eq!(loaded.agent.name, "mirror_mind");
    }
}
