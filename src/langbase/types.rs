use serde::{Deserialize, Serialize};

/// Message in a Langbase conversation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub role: MessageRole,
    pub content: String,
}

/// Message role
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    System,
    User,
    Assistant,
}

impl Message {
    /// Create a system message
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::System,
            content: content.into(),
        }
    }

    /// Create a user message
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::User,
            content: content.into(),
        }
    }
}

/// Request to run a Langbase pipe
#[derive(Debug, Clone, Serialize)]
pub struct PipeRequest {
    /// Pipe name (required by Langbase API)
    pub name: String,
    pub messages: Vec<Message>,
    /// Always false; the pipeline consumes whole completions.
    pub stream: bool,
}

impl PipeRequest {
    /// Create a non-streaming request for a pipe
    pub fn new(name: impl Into<String>, messages: Vec<Message>) -> Self {
        Self {
            name: name.into(),
            messages,
            stream: false,
        }
    }
}

/// Response from a Langbase pipe
#[derive(Debug, Clone, Deserialize)]
pub struct PipeResponse {
    pub success: bool,
    pub completion: String,
    #[serde(rename = "threadId")]
    pub thread_id: Option<String>,
    pub raw: Option<RawResponse>,
}

impl PipeResponse {
    /// Total tokens reported by the model, if the pipe returned usage
    pub fn total_tokens(&self) -> Option<u32> {
        self.raw
            .as_ref()
            .and_then(|raw| raw.usage.as_ref())
            .and_then(|usage| usage.total_tokens)
    }
}

/// Raw model response details
#[derive(Debug, Clone, Deserialize)]
pub struct RawResponse {
    pub model: Option<String>,
    pub usage: Option<Usage>,
}

/// Token usage information
#[derive(Debug, Clone, Deserialize)]
pub struct Usage {
    pub prompt_tokens: Option<u32>,
    pub completion_tokens: Option<u32>,
    pub total_tokens: Option<u32>,
}

/// Everything needed to provision one reasoning pipe.
#[derive(Debug, Clone, PartialEq)]
pub struct PipeDefinition {
    pub name: String,
    pub description: String,
    pub system_prompt: &'static str,
    /// Ask the model for a JSON-only completion.
    pub json_output: bool,
    pub temperature: f64,
    pub max_tokens: u32,
}

/// Request to create (or upsert) a Langbase pipe
#[derive(Debug, Clone, Serialize)]
pub struct CreatePipeRequest {
    pub name: String,
    pub description: String,
    pub model: String,
    pub upsert: bool,
    pub json: bool,
    pub temperature: f64,
    pub max_tokens: u32,
    pub messages: Vec<Message>,
}

/// Model every provisioned pipe runs on.
pub const DEFAULT_PIPE_MODEL: &str = "openai:gpt-4o-mini";

impl From<&PipeDefinition> for CreatePipeRequest {
    fn from(def: &PipeDefinition) -> Self {
        Self {
            name: def.name.clone(),
            description: def.description.clone(),
            model: DEFAULT_PIPE_MODEL.to_string(),
            upsert: true,
            json: def.json_output,
            temperature: def.temperature,
            max_tokens: def.max_tokens,
            messages: vec![Message::system(def.system_prompt)],
        }
    }
}

/// Response from creating a pipe
#[derive(Debug, Clone, Deserialize)]
pub struct CreatePipeResponse {
    pub name: String,
    pub description: Option<String>,
    pub status: String,
    pub url: String,
    #[serde(rename = "type")]
    pub pipe_type: String,
}
