//! Configuration management for gemprobe.
//!
//! All ambient inputs (CLI flags, `GEMINI_API_KEY`, proxy variables) are
//! resolved exactly once here into an explicit [`Config`] object that is
//! passed by reference into the driver and sampler — core logic never
//! reads the process environment.

use crate::error::{ProbeError, Result};
use crate::request::Mode;
use clap::{Parser, ValueEnum};
use std::path::PathBuf;
use std::time::Duration;

/// Default API base URL.
pub const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com";

/// CLI arguments for the gemprobe latency probe.
#[derive(Parser, Debug, Clone)]
#[command(
    name = "gemprobe",
    author = "Andy Chen <andy@voice-test.dev>",
    version,
    about = "Serial latency probe for the Gemini generative language API",
    long_about = "gemprobe measures time-to-first-token and total response time against\n\
                  the Gemini HTTP API, streaming (SSE) or blocking, across a cross-product\n\
                  of models x prompts x rounds, and writes a markdown report.\n\n\
                  Exactly one request is in flight at any time: this is a latency probe,\n\
                  not a load generator.",
    after_help = "EXAMPLES:\n    \
        gemprobe --model gemini-2.5-flash --rounds 3\n    \
        gemprobe -m gemini-2.5-pro -m gemini-2.5-flash --mode both -o report.md\n    \
        gemprobe --thinking-budget 0 --system \"Answer in one sentence.\" --multi-turn\n    \
        gemprobe --list-models"
)]
pub struct Args {
    /// Model identifiers to probe (repeat the flag for several)
    #[arg(
        short,
        long = "model",
        value_name = "MODEL",
        default_value = "gemini-2.5-flash"
    )]
    pub models: Vec<String>,

    /// Path to a JSONL prompt file, one {"label": ..., "text": ...} per line
    #[arg(short, long, env = "GEMPROBE_PROMPTS")]
    pub prompts: Option<PathBuf>,

    /// Measurement mode
    #[arg(long, value_enum, default_value = "streaming")]
    pub mode: ModeArg,

    /// Rounds per (model, prompt) pair
    #[arg(short, long, default_value = "3")]
    pub rounds: u32,

    /// Fixed delay between consecutive calls, in milliseconds
    #[arg(short, long, default_value = "500", value_name = "MS")]
    pub delay: u64,

    /// Request timeout in seconds
    #[arg(short, long, default_value = "60")]
    pub timeout: u64,

    /// Sampling temperature
    #[arg(long, default_value = "0.7")]
    pub temperature: f64,

    /// Maximum output tokens per call
    #[arg(long, default_value = "1024")]
    pub max_tokens: u32,

    /// Thinking budget in tokens; 0 disables thinking on models that allow it
    #[arg(long, value_name = "TOKENS")]
    pub thinking_budget: Option<u32>,

    /// System instruction applied to every call
    #[arg(long, value_name = "TEXT")]
    pub system: Option<String>,

    /// Also run the multi-turn conversation scenario
    #[arg(long)]
    pub multi_turn: bool,

    /// Gemini API key
    #[arg(long, env = "GEMINI_API_KEY", hide_env_values = true)]
    pub api_key: Option<String>,

    /// API base URL
    #[arg(long, env = "GEMINI_BASE_URL", default_value = DEFAULT_BASE_URL)]
    pub base_url: String,

    /// Markdown report path (default: timestamped file in the working directory)
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// Also write the raw result records as JSON
    #[arg(long, value_name = "PATH")]
    pub json_output: Option<PathBuf>,

    /// List available models and exit
    #[arg(long)]
    pub list_models: bool,

    /// Enable verbose logging
    #[arg(short, long, env = "GEMPROBE_VERBOSE")]
    pub verbose: bool,

    /// Output logs as JSON
    #[arg(long, env = "GEMPROBE_JSON_LOGS")]
    pub json_logs: bool,

    /// Disable the progress bar
    #[arg(long, env = "GEMPROBE_NO_PROGRESS")]
    pub no_progress: bool,

    /// Dry run - print the plan without calling the API
    #[arg(long)]
    pub dry_run: bool,
}

impl Args {
    /// Parse CLI arguments.
    pub fn parse_args() -> Self {
        Self::parse()
    }
}

/// Measurement mode selector for the CLI.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ModeArg {
    /// SSE streaming calls only.
    Streaming,
    /// Blocking calls only.
    Blocking,
    /// Both, for a streaming-vs-blocking comparison report.
    Both,
}

impl ModeArg {
    /// Expand into the concrete modes to run, in report order.
    pub fn modes(self) -> Vec<Mode> {
        match self {
            ModeArg::Streaming => vec![Mode::Streaming],
            ModeArg::Blocking => vec![Mode::Blocking],
            ModeArg::Both => vec![Mode::Streaming, Mode::Blocking],
        }
    }
}

/// Full application configuration, constructed once at startup.
#[derive(Debug, Clone)]
pub struct Config {
    /// API endpoint settings.
    pub api: ApiConfig,
    /// Per-call generation knobs shared by every sample.
    pub call: CallSettings,
    /// Experiment pacing.
    pub run: RunConfig,
}

/// API endpoint settings.
#[derive(Debug, Clone)]
pub struct ApiConfig {
    /// API key, sent as the `key` query parameter.
    pub api_key: String,
    /// Base URL, without a trailing slash.
    pub base_url: String,
    /// Optional HTTP/HTTPS proxy URL.
    pub proxy: Option<String>,
    /// Whole-request timeout.
    pub timeout: Duration,
}

/// Generation knobs applied to every call.
#[derive(Debug, Clone)]
pub struct CallSettings {
    /// Sampling temperature.
    pub temperature: f64,
    /// Maximum output tokens.
    pub max_output_tokens: u32,
    /// Thinking budget; `Some(0)` disables thinking.
    pub thinking_budget: Option<u32>,
    /// Optional system instruction.
    pub system_instruction: Option<String>,
}

/// Experiment pacing configuration.
#[derive(Debug, Clone)]
pub struct RunConfig {
    /// Rounds per (model, prompt) pair.
    pub rounds: u32,
    /// Fixed delay between consecutive calls.
    pub delay: Duration,
}

impl Config {
    /// Create configuration from CLI arguments.
    ///
    /// A missing or blank API key is the one fault that aborts the run
    /// before any sampling begins.
    pub fn from_args(args: &Args) -> Result<Self> {
        let api_key = args
            .api_key
            .as_deref()
            .map(str::trim)
            .filter(|key| !key.is_empty())
            .ok_or(ProbeError::MissingApiKey)?
            .to_string();

        let config = Self {
            api: ApiConfig {
                api_key,
                base_url: args.base_url.trim_end_matches('/').to_string(),
                proxy: proxy_from_env(),
                timeout: Duration::from_secs(args.timeout),
            },
            call: CallSettings {
                temperature: args.temperature,
                max_output_tokens: args.max_tokens,
                thinking_budget: args.thinking_budget,
                system_instruction: args.system.clone(),
            },
            run: RunConfig {
                rounds: args.rounds,
                delay: Duration::from_millis(args.delay),
            },
        };

        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<()> {
        if self.api.base_url.is_empty() {
            return Err(ProbeError::InvalidConfig(
                "base URL cannot be empty".to_string(),
            ));
        }
        if self.run.rounds == 0 {
            return Err(ProbeError::InvalidConfig(
                "rounds must be greater than 0".to_string(),
            ));
        }
        if self.api.timeout.is_zero() {
            return Err(ProbeError::InvalidConfig(
                "timeout must be greater than 0".to_string(),
            ));
        }
        Ok(())
    }
}

/// Resolve proxy settings from the conventional environment variables.
///
/// Read once at startup; the resulting value travels inside [`ApiConfig`].
fn proxy_from_env() -> Option<String> {
    for var in ["HTTPS_PROXY", "https_proxy", "HTTP_PROXY", "http_proxy"] {
        if let Ok(value) = std::env::var(var) {
            let value = value.trim();
            if !value.is_empty() {
                return Some(value.to_string());
            }
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(argv: &[&str]) -> Args {
        let mut full = vec!["gemprobe"];
        full.extend_from_slice(argv);
        Args::try_parse_from(full).unwrap()
    }

    #[test]
    fn test_missing_api_key_is_fatal() {
        let mut args = parse(&["--api-key", "placeholder"]);
        args.api_key = None;
        assert!(matches!(
            Config::from_args(&args),
            Err(ProbeError::MissingApiKey)
        ));

        args.api_key = Some("   ".to_string());
        assert!(matches!(
            Config::from_args(&args),
            Err(ProbeError::MissingApiKey)
        ));
    }

    #[test]
    fn test_defaults() {
        let mut args = parse(&[]);
        args.api_key = Some("test-key".to_string());
        let config = Config::from_args(&args).unwrap();

        assert_eq!(config.api.base_url, DEFAULT_BASE_URL);
        assert_eq!(config.api.timeout, Duration::from_secs(60));
        assert_eq!(config.run.rounds, 3);
        assert_eq!(config.run.delay, Duration::from_millis(500));
        assert_eq!(config.call.max_output_tokens, 1024);
        assert!(config.call.thinking_budget.is_none());
        assert_eq!(args.models, vec!["gemini-2.5-flash".to_string()]);
    }

    #[test]
    fn test_trailing_slash_trimmed_from_base_url() {
        let mut args = parse(&["--base-url", "http://localhost:9090/"]);
        args.api_key = Some("k".to_string());
        let config = Config::from_args(&args).unwrap();
        assert_eq!(config.api.base_url, "http://localhost:9090");
    }

    #[test]
    fn test_zero_rounds_rejected() {
        let mut args = parse(&["--rounds", "0"]);
        args.api_key = Some("k".to_string());
        assert!(matches!(
            Config::from_args(&args),
            Err(ProbeError::InvalidConfig(_))
        ));
    }

    #[test]
    fn test_mode_expansion() {
        assert_eq!(ModeArg::Streaming.modes(), vec![Mode::Streaming]);
        assert_eq!(ModeArg::Blocking.modes(), vec![Mode::Blocking]);
        assert_eq!(
            ModeArg::Both.modes(),
            vec![Mode::Streaming, Mode::Blocking]
        );
    }

    #[test]
    fn test_repeated_model_flags() {
        let args = parse(&["-m", "gemini-2.5-pro", "-m", "gemini-2.0-flash"]);
        assert_eq!(args.models.len(), 2);
        assert_eq!(args.models[1], "gemini-2.0-flash");
    }
}
