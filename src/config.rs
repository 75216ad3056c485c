//! Relay configuration.
//!
//! Everything is read from the process environment (optionally seeded from a
//! `.env` file by the binary). [`RelayConfig::from_lookup`] takes the lookup
//! function explicitly so configuration parsing can be exercised without
//! touching the real environment.
//!
//! | Variable | Default |
//! |---|---|
//! | `OPENAI_API_KEY` | required |
//! | `OPENAI_BASE_URL` | `https://api.openai.com/v1` |
//! | `OPENAI_ORGANIZATION` / `OPENAI_PROJECT` | unset |
//! | `OPENAI_ASSISTANT_ID` | unset (register a new assistant at startup) |
//! | `OPENAI_ASSISTANT_MODEL` | `gpt-4o` |
//! | `HOST` / `PORT` | `0.0.0.0` / `8000` |
//! | `RELAY_DONE_MARKER` | `[done]` |
//! | `RELAY_MAX_TOOL_ROUNDS` | `8` |
//! | `RELAY_FOLLOW_UP_RUN` | `true` |
//! | `RELAY_CONNECT_TIMEOUT_SECS` | `10` |

use std::net::SocketAddr;
use std::str::FromStr;
use std::time::Duration;

use secrecy::SecretString;
use serde_json::json;

use crate::assistants::types::{AssistantTool, CreateAssistantRequest, FunctionDefinition};
use crate::error::RelayError;

pub const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";
pub const DEFAULT_DONE_MARKER: &str = "[done]";
pub const DEFAULT_TEXT_PREFIX: &str = "\nassistant > ";
pub const DEFAULT_MODEL: &str = "gpt-4o";
pub const DEFAULT_HOST: &str = "0.0.0.0";
pub const DEFAULT_PORT: u16 = 8000;
pub const DEFAULT_MAX_TOOL_ROUNDS: usize = 8;

/// Connection settings for the remote Assistants API.
#[derive(Debug, Clone)]
pub struct OpenAiConfig {
    pub api_key: SecretString,
    pub base_url: String,
    pub organization: Option<String>,
    pub project: Option<String>,
    pub connect_timeout: Duration,
}

impl OpenAiConfig {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: SecretString::from(api_key.into()),
            base_url: DEFAULT_BASE_URL.to_string(),
            organization: None,
            project: None,
            connect_timeout: Duration::from_secs(10),
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    pub fn with_organization(mut self, organization: impl Into<String>) -> Self {
        self.organization = Some(organization.into());
        self
    }

    pub fn with_project(mut self, project: impl Into<String>) -> Self {
        self.project = Some(project.into());
        self
    }

    pub const fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }
}

/// The assistant registered (or adopted) at startup.
#[derive(Debug, Clone)]
pub struct AssistantSettings {
    /// Reuse this assistant instead of registering a new one.
    pub id: Option<String>,
    pub name: String,
    pub instructions: String,
    pub model: String,
    pub tools: Vec<AssistantTool>,
}

impl Default for AssistantSettings {
    fn default() -> Self {
        Self {
            id: None,
            name: "Weather forecast assistant".to_string(),
            instructions:
                "You are a weather bot. Use the provided functions to answer questions."
                    .to_string(),
            model: DEFAULT_MODEL.to_string(),
            tools: default_tools(),
        }
    }
}

impl AssistantSettings {
    pub fn to_create_request(&self) -> CreateAssistantRequest {
        CreateAssistantRequest {
            name: self.name.clone(),
            instructions: self.instructions.clone(),
            model: self.model.clone(),
            tools: self.tools.clone(),
        }
    }
}

/// Function tools the default assistant is registered with.
pub fn default_tools() -> Vec<AssistantTool> {
    vec![
        AssistantTool::function(FunctionDefinition::new(
            "get_current_temperature",
            "Get the current temperature for a specific location",
            json!({
                "type": "object",
                "properties": {
                    "location": {
                        "type": "string",
                        "description": "The city and state, e.g., San Francisco, CA"
                    },
                    "unit": {
                        "type": "string",
                        "enum": ["Celsius", "Fahrenheit"],
                        "description": "The temperature unit to use. Infer this from the user's location."
                    }
                },
                "required": ["location", "unit"]
            }),
        )),
        AssistantTool::function(FunctionDefinition::new(
            "get_rain_probability",
            "Get the probability of rain for a specific location",
            json!({
                "type": "object",
                "properties": {
                    "location": {
                        "type": "string",
                        "description": "The city and state, e.g., San Francisco, CA"
                    }
                },
                "required": ["location"]
            }),
        )),
    ]
}

/// Per-turn streaming behaviour.
#[derive(Debug, Clone)]
pub struct TurnSettings {
    /// Data of the final SSE event of a successful turn.
    pub done_marker: String,
    /// Chunk emitted when the assistant starts a new text part.
    pub text_prefix: String,
    /// Emit a chunk naming each function call as the run starts it.
    pub announce_tool_calls: bool,
    /// Open a fresh run on the thread after tool outputs were submitted.
    pub follow_up_run: bool,
    pub max_tool_rounds: usize,
}

impl Default for TurnSettings {
    fn default() -> Self {
        Self {
            done_marker: DEFAULT_DONE_MARKER.to_string(),
            text_prefix: DEFAULT_TEXT_PREFIX.to_string(),
            announce_tool_calls: true,
            follow_up_run: true,
            max_tool_rounds: DEFAULT_MAX_TOOL_ROUNDS,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ServerSettings {
    pub host: String,
    pub port: u16,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT,
        }
    }
}

impl ServerSettings {
    pub fn socket_addr(&self) -> Result<SocketAddr, RelayError> {
        format!("{}:{}", self.host, self.port)
            .parse()
            .map_err(|e| {
                RelayError::ConfigurationError(format!(
                    "Invalid listen address {}:{}: {e}",
                    self.host, self.port
                ))
            })
    }
}

/// Complete relay configuration.
#[derive(Debug, Clone)]
pub struct RelayConfig {
    pub openai: OpenAiConfig,
    pub assistant: AssistantSettings,
    pub turn: TurnSettings,
    pub server: ServerSettings,
}

impl RelayConfig {
    pub fn new(openai: OpenAiConfig) -> Self {
        Self {
            openai,
            assistant: AssistantSettings::default(),
            turn: TurnSettings::default(),
            server: ServerSettings::default(),
        }
    }

    pub fn with_assistant_id(mut self, id: impl Into<String>) -> Self {
        self.assistant.id = Some(id.into());
        self
    }

    pub fn with_turn_settings(mut self, turn: TurnSettings) -> Self {
        self.turn = turn;
        self
    }

    /// Read configuration from the process environment.
    pub fn from_env() -> Result<Self, RelayError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Read configuration through `lookup`. A missing API key is an error.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, RelayError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let api_key = get("OPENAI_API_KEY").ok_or_else(|| {
            RelayError::MissingApiKey(
                "OPENAI_API_KEY must be set to reach the Assistants API".to_string(),
            )
        })?;

        let mut openai = OpenAiConfig::new(api_key);
        if let Some(base_url) = get("OPENAI_BASE_URL") {
            openai = openai.with_base_url(base_url);
        }
        openai.organization = get("OPENAI_ORGANIZATION");
        openai.project = get("OPENAI_PROJECT");
        if let Some(secs) = parse_var::<u64>(&get, "RELAY_CONNECT_TIMEOUT_SECS")? {
            openai = openai.with_connect_timeout(Duration::from_secs(secs));
        }

        let mut assistant = AssistantSettings {
            id: get("OPENAI_ASSISTANT_ID"),
            ..Default::default()
        };
        if let Some(model) = get("OPENAI_ASSISTANT_MODEL") {
            assistant.model = model;
        }

        let mut turn = TurnSettings::default();
        if let Some(marker) = get("RELAY_DONE_MARKER") {
            turn.done_marker = marker;
        }
        if let Some(rounds) = parse_var::<usize>(&get, "RELAY_MAX_TOOL_ROUNDS")? {
            turn.max_tool_rounds = rounds;
        }
        if let Some(follow_up) = parse_bool(&get, "RELAY_FOLLOW_UP_RUN")? {
            turn.follow_up_run = follow_up;
        }

        let mut server = ServerSettings::default();
        if let Some(host) = get("HOST") {
            server.host = host;
        }
        if let Some(port) = parse_var::<u16>(&get, "PORT")? {
            server.port = port;
        }

        Ok(Self {
            openai,
            assistant,
            turn,
            server,
        })
    }
}

fn parse_var<T>(get: &impl Fn(&str) -> Option<String>, key: &str) -> Result<Option<T>, RelayError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    get(key)
        .map(|raw| {
            raw.trim().parse::<T>().map_err(|e| {
                RelayError::ConfigurationError(format!("Invalid value for {key}: {raw:?} ({e})"))
            })
        })
        .transpose()
}

fn parse_bool(
    get: &impl Fn(&str) -> Option<String>,
    key: &str,
) -> Result<Option<bool>, RelayError> {
    get(key)
        .map(|raw| match raw.trim().to_lowercase().as_str() {
            "1" | "true" | "yes" | "on" => Ok(true),
            "0" | "false" | "no" | "off" => Ok(false),
            _ => Err(RelayError::ConfigurationError(format!(
                "Invalid value for {key}: {raw:?} (expected true/false)"
            ))),
        })
        .transpose()
}
