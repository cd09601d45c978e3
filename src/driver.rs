//! Experiment orchestration for latency runs.
//!
//! The driver iterates the cross-product of models × modes × prompts ×
//! rounds strictly in order, with exactly one call in flight and a fixed
//! delay between consecutive calls, so the collected results form a
//! deterministic replay log. Multi-turn runs thread one conversation
//! through an ordered prompt list, appending history only after
//! successful turns.

use crate::client::ApiClient;
use crate::config::Config;
use crate::error::{ProbeError, Result};
use crate::request::{CallConfig, Conversation, Mode, SampleResult, Turn};
use indicatif::{ProgressBar, ProgressStyle};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{info, warn};

/// A labeled prompt.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Prompt {
    /// Short grouping label, e.g. `short` or `code`.
    pub label: String,
    /// The prompt text sent to the model.
    pub text: String,
}

impl Prompt {
    /// Create a prompt.
    pub fn new(label: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            text: text.into(),
        }
    }

    /// Load prompts from a JSONL file, one `{"label", "text"}` record per
    /// line. Blank lines are skipped; a malformed line aborts with its
    /// line number.
    pub fn load_jsonl(path: &Path) -> Result<Vec<Prompt>> {
        let content = std::fs::read_to_string(path).map_err(|e| ProbeError::PromptFileRead {
            path: path.to_path_buf(),
            source: e,
        })?;

        let mut prompts = Vec::new();
        for (index, line) in content.lines().enumerate() {
            let trimmed = line.trim();
            if trimmed.is_empty() {
                continue;
            }
            let prompt: Prompt =
                serde_json::from_str(trimmed).map_err(|e| ProbeError::JsonParse {
                    line: index + 1,
                    source: e,
                })?;
            prompts.push(prompt);
        }

        if prompts.is_empty() {
            return Err(ProbeError::InvalidConfig(format!(
                "prompt file '{}' contains no prompts",
                path.display()
            )));
        }

        Ok(prompts)
    }
}

/// The built-in single-turn prompt set, spanning short factual, long
/// generative, non-Latin, and code-producing prompts.
pub fn default_prompts() -> Vec<Prompt> {
    vec![
        Prompt::new("short", "What is 2+2?"),
        Prompt::new(
            "medium",
            "Explain the concept of machine learning in 2-3 sentences.",
        ),
        Prompt::new(
            "long",
            "Write a detailed explanation of how neural networks work, including the \
             concepts of layers, weights, biases, and activation functions. Include an example.",
        ),
        Prompt::new("japanese", "日本の四季について簡単に説明してください。"),
        Prompt::new(
            "code",
            "Write a Python function to calculate the Fibonacci sequence up to n terms.",
        ),
    ]
}

/// The built-in multi-turn dialogue.
pub fn default_dialogue() -> Vec<Prompt> {
    vec![
        Prompt::new("turn-1", "Hello! I'm learning about space. Can you help me?"),
        Prompt::new("turn-2", "What is a black hole?"),
        Prompt::new("turn-3", "How are they formed?"),
        Prompt::new("turn-4", "Can anything escape from a black hole?"),
        Prompt::new("turn-5", "Thank you for the explanation!"),
    ]
}

/// An ordered sampling plan: models × modes × prompts × rounds.
#[derive(Debug, Clone)]
pub struct ExperimentPlan {
    /// Models to probe, in report order.
    pub models: Vec<String>,
    /// Modes to measure per model.
    pub modes: Vec<Mode>,
    /// Prompts, in iteration order.
    pub prompts: Vec<Prompt>,
    /// Repetitions per (model, mode, prompt).
    pub rounds: u32,
}

impl ExperimentPlan {
    /// Total number of samples this plan will produce.
    pub fn total_samples(&self) -> usize {
        self.models.len() * self.modes.len() * self.prompts.len() * self.rounds as usize
    }
}

/// Result of a multi-turn conversation run.
#[derive(Debug)]
pub struct MultiTurnRun {
    /// One result per planned turn, failed turns included.
    pub results: Vec<SampleResult>,
    /// The conversation as it stood at run end.
    pub conversation: Conversation,
}

/// Serial experiment driver.
pub struct Driver {
    config: Arc<Config>,
    client: ApiClient,
}

impl Driver {
    /// Create a driver (and its HTTP client) from the configuration.
    pub fn new(config: Arc<Config>) -> Result<Self> {
        let client = ApiClient::new(Arc::clone(&config))?;
        Ok(Self { config, client })
    }

    /// The underlying sampler client.
    pub fn client(&self) -> &ApiClient {
        &self.client
    }

    /// Run the single-turn plan, producing one result per planned sample
    /// in plan order.
    pub async fn run(&self, plan: &ExperimentPlan, show_progress: bool) -> Vec<SampleResult> {
        let total = plan.total_samples();
        let progress = show_progress.then(|| make_progress_bar(total as u64));
        let mut results: Vec<SampleResult> = Vec::with_capacity(total);

        for model in &plan.models {
            for &mode in &plan.modes {
                for prompt in &plan.prompts {
                    for round in 1..=plan.rounds {
                        if !results.is_empty() {
                            sleep(self.config.run.delay).await;
                        }

                        let call = self.call_for(model, prompt, &[]);
                        let result = self.client.sample(&call, mode).await.with_round(round);

                        log_result(&result);
                        results.push(result);
                        update_progress(progress.as_ref(), &results);
                    }
                }
            }
        }

        if let Some(pb) = progress {
            pb.finish_with_message("complete");
        }
        results
    }

    /// Run a multi-turn conversation for one model: the history grows by
    /// a user/model pair after each successful turn, and a failed turn
    /// leaves it untouched while the run continues.
    pub async fn run_conversation(
        &self,
        model: &str,
        mode: Mode,
        prompts: &[Prompt],
        show_progress: bool,
    ) -> MultiTurnRun {
        let progress = show_progress.then(|| make_progress_bar(prompts.len() as u64));
        let mut conversation = Conversation::new();
        let mut results: Vec<SampleResult> = Vec::with_capacity(prompts.len());

        for (index, prompt) in prompts.iter().enumerate() {
            if index > 0 {
                sleep(self.config.run.delay).await;
            }

            let call = self.call_for(model, prompt, conversation.turns());
            let result = self
                .client
                .sample(&call, mode)
                .await
                .with_round(index as u32 + 1);

            log_result(&result);
            if result.success {
                let reply = result.text.as_deref().unwrap_or_default();
                conversation.push_exchange(&prompt.text, reply);
            }
            results.push(result);
            update_progress(progress.as_ref(), &results);
        }

        if let Some(pb) = progress {
            pb.finish_with_message("complete");
        }
        MultiTurnRun {
            results,
            conversation,
        }
    }

    fn call_for(&self, model: &str, prompt: &Prompt, history: &[Turn]) -> CallConfig {
        let call = &self.config.call;
        CallConfig {
            model: model.to_string(),
            prompt_label: prompt.label.clone(),
            prompt: prompt.text.clone(),
            system_instruction: call.system_instruction.clone(),
            history: history.to_vec(),
            thinking_budget: call.thinking_budget,
            max_output_tokens: call.max_output_tokens,
            temperature: call.temperature,
        }
    }
}

fn make_progress_bar(total: u64) -> ProgressBar {
    let pb = ProgressBar::new(total);
    pb.set_style(
        ProgressStyle::default_bar()
            .template(
                "{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ({percent}%) | {msg}",
            )
            .unwrap()
            .progress_chars("█▓▒░"),
    );
    pb.enable_steady_tick(Duration::from_millis(100));
    pb
}

fn update_progress(progress: Option<&ProgressBar>, results: &[SampleResult]) {
    let Some(pb) = progress else {
        return;
    };

    let successes = results.iter().filter(|r| r.success).count();
    let failures = results.len() - successes;
    let last_ttft = results
        .iter()
        .rev()
        .find_map(|r| r.ttft)
        .map(|d| format!("{:.0}ms", d.as_secs_f64() * 1000.0))
        .unwrap_or_else(|| "-".to_string());

    pb.set_message(format!(
        "ok: {successes} | failed: {failures} | last TTFT: {last_ttft}"
    ));
    pb.inc(1);
}

fn log_result(result: &SampleResult) {
    if result.success {
        info!(
            model = %result.model,
            prompt = %result.prompt_label,
            mode = %result.mode,
            round = result.round,
            ttft_ms = result.ttft.map(|d| d.as_secs_f64() * 1000.0),
            total_ms = result.total_time.map(|d| d.as_secs_f64() * 1000.0),
            tokens = result.output_tokens,
            "sample complete"
        );
    } else {
        warn!(
            model = %result.model,
            prompt = %result.prompt_label,
            mode = %result.mode,
            round = result.round,
            error = result.error.as_deref().unwrap_or("unknown"),
            "sample failed"
        );
    }
}
