//! gemprobe CLI - serial latency probe for the Gemini API.
//!
//! Run `gemprobe --help` for usage information.

use anyhow::Result;
use chrono::Local;
use console::style;
use gemprobe::{
    Args, Config, Driver, ExperimentPlan, Prompt, RunMetadata, default_dialogue,
    default_prompts, report,
};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{Level, error, info};
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

#[tokio::main]
async fn main() -> Result<()> {
    // Parse CLI arguments
    let args = Args::parse_args();

    // Setup logging
    setup_logging(&args);

    // Print banner
    if !args.json_logs {
        print_banner();
    }

    // Load configuration; a missing API key aborts here, before any call
    let config = match Config::from_args(&args) {
        Ok(c) => Arc::new(c),
        Err(e) => {
            error!("Configuration error: {}", e);
            eprintln!("{} {}", style("Error:").red().bold(), e);
            std::process::exit(1);
        }
    };

    let driver = Driver::new(Arc::clone(&config))?;

    // Model listing short-circuits the experiment entirely
    if args.list_models {
        return list_models(&driver).await;
    }

    // Build the sampling plan
    let prompts = match &args.prompts {
        Some(path) => Prompt::load_jsonl(path)?,
        None => default_prompts(),
    };

    let plan = ExperimentPlan {
        models: args.models.clone(),
        modes: args.mode.modes(),
        prompts,
        rounds: config.run.rounds,
    };

    // Dry run mode
    if args.dry_run {
        println!("\n{}", style("DRY RUN MODE").yellow().bold());
        println!("Configuration validated successfully.\n");
        print_plan_summary(&args, &config, &plan);
        return Ok(());
    }

    if args.verbose && !args.json_logs {
        print_plan_summary(&args, &config, &plan);
    }

    let show_progress = !args.no_progress && !args.json_logs;

    // Single-turn pass
    info!(samples = plan.total_samples(), "starting single-turn run");
    let single = driver.run(&plan, show_progress).await;

    // Optional multi-turn pass; the first model carries the conversation
    let multi = if args.multi_turn {
        let dialogue = default_dialogue();
        let model = plan.models[0].clone();
        info!(model = %model, turns = dialogue.len(), "starting multi-turn run");
        Some(
            driver
                .run_conversation(&model, plan.modes[0], &dialogue, show_progress)
                .await,
        )
    } else {
        None
    };

    // Render and persist the report
    let meta = RunMetadata {
        models: plan.models.clone(),
        modes: plan.modes.clone(),
        rounds: plan.rounds,
        generated_at: Local::now(),
    };
    let rendered = report::render(&meta, &single, multi.as_ref());

    let output = args.output.clone().unwrap_or_else(default_report_path);
    report::write_report(&output, &rendered)?;

    if let Some(json_path) = &args.json_output {
        let mut all = single.clone();
        if let Some(run) = &multi {
            all.extend(run.results.iter().cloned());
        }
        report::write_report(json_path, &report::to_json(&all)?)?;
    }

    // Final output
    let total = single.len() + multi.as_ref().map_or(0, |run| run.results.len());
    let successes = single.iter().filter(|r| r.success).count()
        + multi
            .as_ref()
            .map_or(0, |run| run.results.iter().filter(|r| r.success).count());

    if args.json_logs {
        let json_result = serde_json::json!({
            "status": "complete",
            "total_samples": total,
            "success_count": successes,
            "failure_count": total - successes,
            "report": output.display().to_string(),
        });
        println!("{}", serde_json::to_string(&json_result)?);
    } else {
        println!();
        println!("{rendered}");
        println!(
            "{} Report saved to: {}",
            style("✓").green().bold(),
            output.display()
        );
        if let Some(json_path) = &args.json_output {
            println!(
                "{} Raw results saved to: {}",
                style("✓").green().bold(),
                json_path.display()
            );
        }
        if successes < total {
            println!(
                "{} {}/{} samples failed - see the report tables",
                style("⚠").yellow().bold(),
                total - successes,
                total
            );
        }
    }

    Ok(())
}

async fn list_models(driver: &Driver) -> Result<()> {
    let models = driver.client().list_models().await?;

    println!("{}", style("Available models:").bold());
    for model in &models {
        println!("  {}", model.name);
        if let Some(display_name) = &model.display_name {
            println!("    {}", style(display_name).dim());
        }
        if !model.supported_generation_methods.is_empty() {
            println!(
                "    methods: {}",
                model.supported_generation_methods.join(", ")
            );
        }
    }
    println!("\n{} models available", models.len());
    Ok(())
}

fn setup_logging(args: &Args) {
    let level = if args.verbose { Level::DEBUG } else { Level::INFO };

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("gemprobe={level}")));

    if args.json_logs {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(
                fmt::layer()
                    .with_target(false)
                    .with_thread_ids(false)
                    .compact(),
            )
            .init();
    }
}

fn print_banner() {
    let banner = r#"
                                           __
   ____ ____  ____ ___  ____  _________  / /_  ___
  / __ `/ _ \/ __ `__ \/ __ \/ ___/ __ \/ __ \/ _ \
 / /_/ /  __/ / / / / / /_/ / /  / /_/ / /_/ /  __/
 \__, /\___/_/ /_/ /_/ .___/_/   \____/_.___/\___/
/____/              /_/
    "#;

    println!("{}", style(banner).cyan().bold());
    println!(
        "    {}",
        style("Serial Gemini Latency Probe").white().dim()
    );
    println!(
        "    {}",
        style(format!("v{}", gemprobe::VERSION)).white().dim()
    );
    println!();
}

fn print_plan_summary(args: &Args, config: &Config, plan: &ExperimentPlan) {
    println!("{}", style("Plan:").bold());
    println!("  Models:      {}", plan.models.join(", "));
    println!(
        "  Modes:       {}",
        plan.modes
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join(", ")
    );
    println!("  Prompts:     {}", plan.prompts.len());
    println!("  Rounds:      {}", plan.rounds);
    println!("  Multi-turn:  {}", args.multi_turn);
    println!("  Delay:       {:?}", config.run.delay);
    println!("  Timeout:     {:?}", config.api.timeout);
    if let Some(budget) = config.call.thinking_budget {
        println!("  Thinking:    budget {budget}");
    }
    if config.call.system_instruction.is_some() {
        println!("  System:      set");
    }
    println!("  Base URL:    {}", config.api.base_url);
    println!("  Samples:     {}", plan.total_samples());
    println!();
}

fn default_report_path() -> PathBuf {
    PathBuf::from(format!(
        "gemini_latency_report_{}.md",
        Local::now().format("%Y%m%d_%H%M%S")
    ))
}
