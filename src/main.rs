//! Weft CLI - run and validate workflow descriptors

use std::collections::HashMap;
use std::fs;

use anyhow::Context;
use clap::{Parser, Subcommand, ValueEnum};
use colored::Colorize;
use serde_json::Value;

use weft::{
    BackendRegistry, Descriptor, Engine, FixSuggestion, RunLimits, RunStatus, Workflow,
};

#[derive(Parser)]
#[command(name = "weft")]
#[command(about = "Weft - execution core for LLM agent workflows")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a workflow descriptor
    Run {
        /// Path to the descriptor (.yaml or .json)
        file: String,

        /// Seed a workflow input (key=value, repeatable; value parsed
        /// as JSON when possible, otherwise taken as a string)
        #[arg(short, long, value_name = "KEY=VALUE")]
        input: Vec<String>,

        /// Replace every LLM binding with a scripted mock (dry run)
        #[arg(long)]
        mock: bool,

        /// Report output format
        #[arg(long, value_enum, default_value_t = ReportFormat::Text)]
        format: ReportFormat,
    },

    /// Validate a workflow descriptor without executing it
    Validate {
        /// Path to the descriptor (.yaml or .json)
        file: String,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum ReportFormat {
    Text,
    Json,
}

#[tokio::main]
async fn main() {
    // Load .env file (ignore if not present)
    let _ = dotenvy::dotenv();

    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::WARN.into()),
        )
        .init();

    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Run {
            file,
            input,
            mock,
            format,
        } => run_workflow(&file, &input, mock, format).await,
        Commands::Validate { file } => validate_workflow(&file),
    };

    if let Err(e) = result {
        eprintln!("{} {:#}", "Error:".red().bold(), e);
        if let Some(suggestion) = e
            .downcast_ref::<weft::WeftError>()
            .and_then(|w| w.fix_suggestion())
        {
            eprintln!("  {} {}", "Fix:".yellow(), suggestion);
        }
        std::process::exit(1);
    }
}

fn load_descriptor(file: &str) -> anyhow::Result<Descriptor> {
    let source =
        fs::read_to_string(file).with_context(|| format!("failed to read '{file}'"))?;
    let workflow = if file.ends_with(".json") {
        Workflow::from_json(&source)?
    } else {
        Workflow::from_yaml(&source)?
    };
    Ok(Descriptor::load(workflow)?)
}

fn parse_inputs(raw: &[String]) -> anyhow::Result<HashMap<String, Value>> {
    let mut inputs = HashMap::new();
    for pair in raw {
        let (key, value) = pair
            .split_once('=')
            .with_context(|| format!("invalid --input '{pair}', expected KEY=VALUE"))?;
        let value = serde_json::from_str(value)
            .unwrap_or_else(|_| Value::String(value.to_string()));
        inputs.insert(key.to_string(), value);
    }
    Ok(inputs)
}

async fn run_workflow(
    file: &str,
    raw_inputs: &[String],
    mock: bool,
    format: ReportFormat,
) -> anyhow::Result<()> {
    let descriptor = load_descriptor(file)?;
    let inputs = parse_inputs(raw_inputs)?;

    let registry = if mock {
        BackendRegistry::all_mock(&descriptor)
    } else {
        BackendRegistry::from_descriptor(&descriptor)?
    };

    println!(
        "{} Running workflow: {} ({} steps{})",
        "→".cyan(),
        descriptor.workflow_id().cyan().bold(),
        descriptor.steps().len(),
        if mock { ", mock backends" } else { "" }
    );

    let engine = Engine::new(descriptor, registry).with_limits(RunLimits::default());
    let report = engine.run_with_inputs(inputs).await?;

    match format {
        ReportFormat::Json => println!("{}", serde_json::to_string_pretty(&report)?),
        ReportFormat::Text => print_report(&report),
    }

    if report.status == RunStatus::Failed {
        anyhow::bail!("workflow '{}' failed", report.workflow_id);
    }
    Ok(())
}

fn print_report(report: &weft::RunReport) {
    for step in &report.steps {
        let (mark, status) = match step.status {
            weft::StepStatus::Success => ("✓".green(), "success".green()),
            weft::StepStatus::FallenBack => ("✓".yellow(), "fallen back".yellow()),
            weft::StepStatus::Failed => ("✗".red(), "failed".red()),
            weft::StepStatus::Skipped => ("-".dimmed(), "skipped".dimmed()),
        };
        let served = step
            .served_by
            .as_deref()
            .map(|agent| format!(" via {agent}"))
            .unwrap_or_default();
        println!(
            "{} {} [{}]{} ({} attempt(s), {}ms)",
            mark, step.step_id, status, served, step.attempts, step.duration_ms
        );
        if let Some(error) = &step.error {
            println!("    {}: {}", error.code.dimmed(), error.message.dimmed());
        }
    }

    if let Some(abort) = &report.abort {
        println!(
            "{} Aborted at '{}': {} ({})",
            "✗".red().bold(),
            abort.step_id,
            abort.message,
            abort.code
        );
    }

    if !report.outputs.is_empty() {
        println!("{}", "Outputs:".cyan().bold());
        for (key, value) in &report.outputs {
            println!("  {key}: {value}");
        }
    }

    let status = match report.status {
        RunStatus::Completed => "completed".green().bold(),
        RunStatus::Failed => "failed".red().bold(),
        RunStatus::Cancelled => "cancelled".yellow().bold(),
    };
    println!(
        "{} Workflow {} [{}] in {}ms",
        "→".cyan(),
        report.workflow_id,
        status,
        report.duration_ms
    );
}

fn validate_workflow(file: &str) -> anyhow::Result<()> {
    let descriptor = load_descriptor(file)?;

    println!(
        "{} Workflow '{}' is valid",
        "✓".green(),
        descriptor.workflow_id()
    );
    println!("  Steps: {}", descriptor.steps().len());
    for (index, step) in descriptor.steps().iter().enumerate() {
        let dependencies = descriptor.graph().dependencies(index);
        let upstream = if dependencies.is_empty() {
            "-".to_string()
        } else {
            dependencies
                .iter()
                .map(|&d| descriptor.steps()[d].step_id.as_str())
                .collect::<Vec<_>>()
                .join(", ")
        };
        println!("    {} (depends on: {})", step.step_id, upstream);
    }
    println!("  LLM bindings: {}", descriptor.llms().count());
    println!(
        "  Fallback agent: {}",
        descriptor
            .fallback_agent()
            .map(|a| a.agent_id.as_str())
            .unwrap_or("(none)")
    );

    Ok(())
}
