// SPDX-License-Identifier: MIT

use clap::{Parser, Subcommand};
use dotenv::dotenv;
use serde_json::{json, Value};
use std::sync::Arc;

use warden_rs::warden::admission::{AdmissionController, ProbeEstimate};
use warden_rs::warden::checkpoint::ResumeInput;
use warden_rs::warden::config::{WardenConfig, DEFAULT_CONFIG_FILE};
use warden_rs::warden::pipeline::simulated::SimulatedWarehouse;
use warden_rs::warden::pipeline::{build_pipeline, Collaborators, PipelineState};
use warden_rs::warden::resilience::{ErrorClassifier, ErrorContext, ErrorTranslator};
use warden_rs::warden::workflow::graph::{RunOutcome, StateGraphExecutor};

const BYTES_PER_GIB: f64 = 1024.0 * 1024.0 * 1024.0;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to the configuration file
    #[arg(short, long, global = true, default_value = DEFAULT_CONFIG_FILE)]
    config: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run the analytical pipeline against the simulated warehouse
    Run {
        /// The business question to answer
        #[arg(short, long)]
        question: String,

        /// Thread to run under (a new one is generated when omitted)
        #[arg(short, long)]
        thread_id: Option<String>,

        /// GB the simulated warehouse scans for an unfiltered query
        #[arg(long, default_value_t = 25.0)]
        simulate_gb: f64,
    },
    /// Resume a suspended thread with a review decision
    Resume {
        #[arg(short, long)]
        thread_id: String,

        /// approve, modify or regenerate
        #[arg(short, long)]
        decision: String,

        /// JSON payload, e.g. '{"chart_selection": "bar_chart"}'
        #[arg(short, long)]
        payload: Option<String>,

        #[arg(long, default_value_t = 25.0)]
        simulate_gb: f64,
    },
    /// Classify an error message and show its user-facing translation
    Classify {
        #[arg(short, long)]
        message: String,
    },
    /// Show the admission decision for a scan of the given size
    Admit {
        #[arg(long)]
        gb: f64,
    },
    /// List threads with a stored checkpoint
    Checkpoints,
}

async fn pipeline(config: &WardenConfig, simulate_gb: f64) -> anyhow::Result<StateGraphExecutor> {
    let services = config.services(config.breaker_registry())?;
    let executor = build_pipeline(
        Collaborators::simulated(simulate_gb),
        config.admission.clone(),
        services,
        config.executor.clone(),
    )
    .await?;
    Ok(executor)
}

fn print_outcome(outcome: &RunOutcome) -> anyhow::Result<()> {
    let rendered: Value = match outcome {
        RunOutcome::Completed(done) => json!({
            "outcome": "completed",
            "thread_id": done.thread_id,
            "path": done.path,
            "state": done.state.to_json(),
        }),
        RunOutcome::Suspended(suspension) => json!({
            "outcome": "suspended",
            "suspension": suspension,
        }),
        RunOutcome::Failed(failure) => json!({
            "outcome": "failed",
            "thread_id": failure.thread_id,
            "node": failure.node,
            "reason": failure.reason,
            "error": failure.error,
            "path": failure.path,
        }),
    };
    println!("{}", serde_json::to_string_pretty(&rendered)?);
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv().ok();
    env_logger::init();

    let args = Args::parse();
    let config = WardenConfig::load(&args.config)?;

    match args.command {
        Commands::Run {
            question,
            thread_id,
            simulate_gb,
        } => {
            let thread_id = thread_id.unwrap_or_else(|| uuid::Uuid::new_v4().to_string());
            log::info!("Running pipeline on thread {}", thread_id);
            let executor = pipeline(&config, simulate_gb).await?;
            let outcome = executor
                .run(PipelineState::for_question(&thread_id, question), &thread_id)
                .await?;
            print_outcome(&outcome)?;
        }
        Commands::Resume {
            thread_id,
            decision,
            payload,
            simulate_gb,
        } => {
            let mut input = ResumeInput::new(decision);
            if let Some(raw) = payload {
                input = input.with_payload(serde_json::from_str(&raw)?);
            }
            let executor = pipeline(&config, simulate_gb).await?;
            let outcome = executor.resume(&thread_id, input).await?;
            print_outcome(&outcome)?;
        }
        Commands::Classify { message } => {
            let classifier = ErrorClassifier::with_rules(&config.classifier.extra_rules)?;
            let (category, confidence) = classifier.classify(&message);
            let context = ErrorContext::new("cli", "classify", category, message)
                .with_confidence(confidence);
            let translated = ErrorTranslator::new().translate(&context);
            println!(
                "{}",
                serde_json::to_string_pretty(&json!({
                    "category": category,
                    "confidence": confidence,
                    "severity": category.default_severity(),
                    "retryable": category.is_retryable(),
                    "translation": translated,
                }))?
            );
        }
        Commands::Admit { gb } => {
            let controller =
                AdmissionController::new(Arc::new(SimulatedWarehouse::new(gb)), config.admission.clone());
            let decision = controller.decide(ProbeEstimate {
                bytes: (gb * BYTES_PER_GIB) as u64,
                rows_hint: None,
            });
            println!("{}", serde_json::to_string_pretty(&decision)?);
        }
        Commands::Checkpoints => {
            let threads = config.checkpoint_store().list().await?;
            if threads.is_empty() {
                println!("No suspended threads");
            }
            for thread in threads {
                println!("{}", thread);
            }
        }
    }

    Ok(())
}
