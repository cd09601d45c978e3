//! Request, response, and result types for latency sampling.
//!
//! This module defines the immutable per-call configuration, the Gemini
//! wire format (request payloads and response payloads shared by the
//! streaming and blocking paths), and the normalized [`SampleResult`]
//! record that every measured call produces.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Who produced a conversation turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// The human side of the conversation.
    User,
    /// The model side of the conversation.
    Model,
}

/// A single conversation turn.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Turn {
    /// Who spoke.
    pub role: Role,
    /// What was said.
    pub text: String,
}

/// Ordered conversation history for multi-turn runs.
///
/// Owned by the experiment driver; a user/model pair is appended only
/// after a successful sample, so a failed turn leaves the history exactly
/// as it was.
#[derive(Debug, Clone, Default)]
pub struct Conversation {
    turns: Vec<Turn>,
}

impl Conversation {
    /// Create an empty conversation.
    pub fn new() -> Self {
        Self::default()
    }

    /// The accumulated turns, in order.
    pub fn turns(&self) -> &[Turn] {
        &self.turns
    }

    /// Number of accumulated turns (two per successful exchange).
    pub fn len(&self) -> usize {
        self.turns.len()
    }

    /// Whether no exchange has been recorded yet.
    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }

    /// Append one completed exchange: the user prompt and the model reply.
    pub fn push_exchange(&mut self, prompt: &str, reply: &str) {
        self.turns.push(Turn {
            role: Role::User,
            text: prompt.to_string(),
        });
        self.turns.push(Turn {
            role: Role::Model,
            text: reply.to_string(),
        });
    }
}

/// How a sample is measured.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    /// SSE streaming call; TTFT is the first text fragment's arrival.
    Streaming,
    /// Single blocking call; TTFT is defined to equal total time.
    Blocking,
}

impl std::fmt::Display for Mode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Mode::Streaming => write!(f, "streaming"),
            Mode::Blocking => write!(f, "blocking"),
        }
    }
}

/// Immutable configuration for one measured call.
#[derive(Debug, Clone)]
pub struct CallConfig {
    /// Model identifier, e.g. `gemini-2.5-flash`.
    pub model: String,
    /// Short label for the prompt (used as a grouping key in reports).
    pub prompt_label: String,
    /// The user prompt text.
    pub prompt: String,
    /// Optional system instruction.
    pub system_instruction: Option<String>,
    /// Conversation history preceding this prompt.
    pub history: Vec<Turn>,
    /// Thinking budget in tokens; `Some(0)` disables thinking on models
    /// that allow it, `None` leaves the backend default.
    pub thinking_budget: Option<u32>,
    /// Maximum output tokens.
    pub max_output_tokens: u32,
    /// Sampling temperature.
    pub temperature: f64,
}

impl CallConfig {
    /// Build the wire payload for this call.
    pub fn to_wire(&self) -> GenerateRequest {
        let mut contents: Vec<RequestContent> = self
            .history
            .iter()
            .map(|turn| RequestContent {
                role: Some(turn.role),
                parts: vec![RequestPart {
                    text: turn.text.clone(),
                }],
            })
            .collect();

        contents.push(RequestContent {
            role: Some(Role::User),
            parts: vec![RequestPart {
                text: self.prompt.clone(),
            }],
        });

        GenerateRequest {
            contents,
            generation_config: GenerationConfig {
                temperature: self.temperature,
                max_output_tokens: self.max_output_tokens,
                thinking_config: self
                    .thinking_budget
                    .map(|budget| ThinkingConfig { thinking_budget: budget }),
            },
            system_instruction: self.system_instruction.as_ref().map(|text| {
                SystemInstruction {
                    parts: vec![RequestPart { text: text.clone() }],
                }
            }),
        }
    }

    /// Short prompt preview for logging.
    pub fn display_prompt(&self) -> String {
        truncate_chars(&self.prompt, 50)
    }
}

/// Truncate a string to `max` characters, appending an ellipsis marker.
pub(crate) fn truncate_chars(s: &str, max: usize) -> String {
    if s.chars().count() > max {
        let head: String = s.chars().take(max).collect();
        format!("{head}...")
    } else {
        s.to_string()
    }
}

/// Rough output-size estimate by whitespace splitting.
///
/// Used for streaming responses (no usage metadata arrives) and as the
/// blocking-mode fallback, so the two modes stay comparable in reports.
pub fn estimate_tokens(text: &str) -> u32 {
    text.split_whitespace().count() as u32
}

// ---------------------------------------------------------------------------
// Wire format: request side
// ---------------------------------------------------------------------------

/// Request body for `generateContent` / `streamGenerateContent`.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerateRequest {
    /// Conversation contents, oldest first, ending with the user prompt.
    pub contents: Vec<RequestContent>,
    /// Generation knobs.
    pub generation_config: GenerationConfig,
    /// Optional system instruction.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub system_instruction: Option<SystemInstruction>,
}

/// One content entry in the request.
#[derive(Debug, Clone, Serialize)]
pub struct RequestContent {
    /// `user` or `model`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub role: Option<Role>,
    /// Text parts.
    pub parts: Vec<RequestPart>,
}

/// A plain-text request part.
#[derive(Debug, Clone, Serialize)]
pub struct RequestPart {
    /// The text payload.
    pub text: String,
}

/// System instruction wrapper (role-less content).
#[derive(Debug, Clone, Serialize)]
pub struct SystemInstruction {
    /// Text parts.
    pub parts: Vec<RequestPart>,
}

/// Generation configuration knobs.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerationConfig {
    /// Sampling temperature.
    pub temperature: f64,
    /// Maximum output tokens.
    pub max_output_tokens: u32,
    /// Thinking knob, only for models that support it.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub thinking_config: Option<ThinkingConfig>,
}

/// Thinking configuration; a budget of 0 disables thinking.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ThinkingConfig {
    /// Token budget for internal deliberation.
    pub thinking_budget: u32,
}

// ---------------------------------------------------------------------------
// Wire format: response side
// ---------------------------------------------------------------------------

/// Response payload, shared by blocking responses and streamed SSE events.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerateResponse {
    /// Generated candidates; only the first is consulted.
    #[serde(default)]
    pub candidates: Vec<Candidate>,
    /// Token accounting, present on blocking responses.
    #[serde(default)]
    pub usage_metadata: Option<UsageMetadata>,
}

impl GenerateResponse {
    /// Concatenated visible text of the first candidate.
    ///
    /// Parts flagged as thought output are filtered here, the same way the
    /// streaming reader filters them.
    pub fn visible_text(&self) -> String {
        let mut out = String::new();
        if let Some(candidate) = self.candidates.first() {
            if let Some(content) = &candidate.content {
                for part in &content.parts {
                    if part.thought {
                        continue;
                    }
                    if let Some(text) = &part.text {
                        out.push_str(text);
                    }
                }
            }
        }
        out
    }
}

/// One generated candidate.
#[derive(Debug, Clone, Deserialize)]
pub struct Candidate {
    /// Generated content; may be absent on early stream events.
    #[serde(default)]
    pub content: Option<CandidateContent>,
}

/// Content of a candidate.
#[derive(Debug, Clone, Deserialize)]
pub struct CandidateContent {
    /// Content parts, text or otherwise.
    #[serde(default)]
    pub parts: Vec<ResponsePart>,
}

/// One response part. Non-text parts deserialize with `text: None`.
#[derive(Debug, Clone, Deserialize)]
pub struct ResponsePart {
    /// Visible text, if this part carries any.
    #[serde(default)]
    pub text: Option<String>,
    /// Set by the backend on internal reasoning parts.
    #[serde(default)]
    pub thought: bool,
}

/// Token accounting attached to blocking responses.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UsageMetadata {
    /// Tokens in the prompt.
    #[serde(default)]
    pub prompt_token_count: Option<u32>,
    /// Tokens in the generated candidates.
    #[serde(default)]
    pub candidates_token_count: Option<u32>,
    /// Total tokens.
    #[serde(default)]
    pub total_token_count: Option<u32>,
}

/// Model listing response.
#[derive(Debug, Clone, Deserialize)]
pub struct ModelList {
    /// Available models.
    #[serde(default)]
    pub models: Vec<ModelInfo>,
}

/// One entry from the model listing.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModelInfo {
    /// Fully qualified model name, e.g. `models/gemini-2.5-flash`.
    pub name: String,
    /// Human-readable name.
    #[serde(default)]
    pub display_name: Option<String>,
    /// Supported generation methods, e.g. `generateContent`.
    #[serde(default)]
    pub supported_generation_methods: Vec<String>,
}

// ---------------------------------------------------------------------------
// Sample results
// ---------------------------------------------------------------------------

/// Normalized result of one measured call.
///
/// Exactly one of two shapes exists: success with a measured `total_time`,
/// or failure with an `error` description and no first-token timing.
/// The constructors below are the only way to build one.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SampleResult {
    /// Model that served the call.
    pub model: String,
    /// Prompt label (grouping key).
    pub prompt_label: String,
    /// Streaming or blocking.
    pub mode: Mode,
    /// Repetition index for single-turn runs, turn index for multi-turn.
    pub round: u32,
    /// Whether the call completed.
    pub success: bool,
    /// Time to first token, absent when no text arrived or on failure.
    #[serde(with = "duration_secs")]
    pub ttft: Option<Duration>,
    /// Total call duration, present on every success.
    #[serde(with = "duration_secs")]
    pub total_time: Option<Duration>,
    /// Output size in (estimated) tokens.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output_tokens: Option<u32>,
    /// Accumulated response text.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    /// Fault description on failure.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl SampleResult {
    /// Build a successful result.
    pub fn success(
        call: &CallConfig,
        mode: Mode,
        ttft: Option<Duration>,
        total_time: Duration,
        output_tokens: u32,
        text: String,
    ) -> Self {
        Self {
            model: call.model.clone(),
            prompt_label: call.prompt_label.clone(),
            mode,
            round: 0,
            success: true,
            ttft,
            total_time: Some(total_time),
            output_tokens: Some(output_tokens),
            text: Some(text),
            error: None,
        }
    }

    /// Build a failed result. Timing fields stay absent so downstream
    /// aggregation never mixes failed calls into latency statistics.
    pub fn failure(call: &CallConfig, mode: Mode, error: impl Into<String>) -> Self {
        Self {
            model: call.model.clone(),
            prompt_label: call.prompt_label.clone(),
            mode,
            round: 0,
            success: false,
            ttft: None,
            total_time: None,
            output_tokens: None,
            text: None,
            error: Some(error.into()),
        }
    }

    /// Set the repetition or turn index.
    pub fn with_round(mut self, round: u32) -> Self {
        self.round = round;
        self
    }

    /// Tokens per second over the whole call, when computable.
    pub fn tokens_per_second(&self) -> Option<f64> {
        let total = self.total_time?.as_secs_f64();
        let tokens = self.output_tokens?;
        if total > 0.0 && tokens > 0 {
            Some(f64::from(tokens) / total)
        } else {
            None
        }
    }
}

/// Serde helpers for `Option<Duration>` as fractional seconds.
mod duration_secs {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Option<Duration>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match duration {
            Some(d) => serializer.serialize_some(&d.as_secs_f64()),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<Duration>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let secs = Option::<f64>::deserialize(deserializer)?;
        Ok(secs.map(Duration::from_secs_f64))
    }
}
