use serde::{Deserialize, Serialize};

/// Backoff parameters for backend calls.
///
/// `503` responses back off linearly from `unavailable_base_ms` in steps of
/// `unavailable_step_ms` up to `unavailable_max_ms`, with no limit on the
/// number of attempts. Every other retryable error walks `other_delays_ms`;
/// its length is the number of retries allowed on that path.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RetrySettings {
    #[serde(default = "default_unavailable_base_ms")]
    pub unavailable_base_ms: u64,

    #[serde(default = "default_unavailable_step_ms")]
    pub unavailable_step_ms: u64,

    #[serde(default = "default_unavailable_max_ms")]
    pub unavailable_max_ms: u64,

    #[serde(default = "default_other_delays_ms")]
    pub other_delays_ms: Vec<u64>,

    /// How often a backoff sleep checks for cancellation.
    #[serde(default = "default_cancel_poll_ms")]
    pub cancel_poll_ms: u64,
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self {
            unavailable_base_ms: default_unavailable_base_ms(),
            unavailable_step_ms: default_unavailable_step_ms(),
            unavailable_max_ms: default_unavailable_max_ms(),
            other_delays_ms: default_other_delays_ms(),
            cancel_poll_ms: default_cancel_poll_ms(),
        }
    }
}

fn default_unavailable_base_ms() -> u64 {
    2000
}

fn default_unavailable_step_ms() -> u64 {
    2000
}

fn default_unavailable_max_ms() -> u64 {
    10000
}

fn default_other_delays_ms() -> Vec<u64> {
    vec![1000, 2000, 4000]
}

fn default_cancel_poll_ms() -> u64 {
    100
}

fn default_model() -> String {
    "default".to_string()
}

fn default_coder_mode() -> bool {
    true
}

fn default_max_tool_iterations() -> u32 {
    25
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Settings {
    /// Model identifier passed through to the provider untouched.
    #[serde(default = "default_model")]
    pub model: String,

    #[serde(default)]
    pub system_prompt: Option<String>,

    /// Declares the project tools to the model and injects the serialized
    /// project into each request.
    #[serde(default = "default_coder_mode")]
    pub coder_mode: bool,

    /// Use aggregate responses instead of streaming.
    #[serde(default)]
    pub disable_streaming: bool,

    /// Upper bound on send/execute cycles within one user turn.
    #[serde(default = "default_max_tool_iterations")]
    pub max_tool_iterations: u32,

    #[serde(default)]
    pub retry: RetrySettings,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            model: default_model(),
            system_prompt: None,
            coder_mode: default_coder_mode(),
            disable_streaming: false,
            max_tool_iterations: default_max_tool_iterations(),
            retry: RetrySettings::default(),
        }
    }
}
