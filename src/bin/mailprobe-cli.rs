#[path = "mailprobe-cli/args.rs"]
mod args;
#[path = "mailprobe-cli/output.rs"]
mod output;

use std::collections::BTreeMap;
use std::fs;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result, bail};
use tracing_subscriber::EnvFilter;

use args::{Cli, Commands, method_from_str, verdict_from_str};
use mailprobe::{Engine, Orchestrator, Settings, TaskState, Verdict};

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    let json = cli.json();

    let settings = Arc::new(Settings::load(&cli.settings).context("load settings")?);
    let engine = Arc::new(Engine::new(settings).context("initialize engine")?);

    match &cli.cmd {
        Commands::Verify { email, method } => {
            let method = method_from_str(method)?;
            let result = engine.verify(email, method).context("verify")?;
            engine.persist_cache().ok();
            output::print_result(&result, json)?;
            if result.verdict == Verdict::Invalid {
                std::process::exit(2);
            }
        }
        Commands::Batch {
            file,
            method,
            poll_secs,
        } => {
            let method = method_from_str(method)?;
            let addresses: Vec<String> = fs::read_to_string(file)
                .with_context(|| format!("read address file {file}"))?
                .lines()
                .map(str::trim)
                .filter(|line| !line.is_empty())
                .map(str::to_string)
                .collect();
            if addresses.is_empty() {
                bail!("no addresses found in {file}");
            }

            let orchestrator = Orchestrator::new(engine);
            let task_id = orchestrator.start_batch(addresses, method);
            eprintln!("task {task_id} started");

            loop {
                let status = orchestrator
                    .task_status(&task_id)
                    .context("task disappeared")?;
                eprintln!(
                    "{}/{} ({:.0}%)",
                    status.completed, status.total, status.progress
                );
                if status.status == TaskState::Completed || status.status == TaskState::Failed {
                    break;
                }
                std::thread::sleep(Duration::from_secs(*poll_secs));
            }

            let results = orchestrator
                .task_results(&task_id)
                .context("task disappeared")?;
            output::print_task_results(&results, json)?;
        }
        Commands::Summary => {
            output::print_summary(&engine.results_summary(), json)?;
        }
        Commands::History { email, category } => match (email, category) {
            (Some(email), _) => {
                let entries = engine.history_for_address(email).context("history")?;
                let mut map = BTreeMap::new();
                map.insert(email.clone(), entries);
                output::print_history(&map, json)?;
            }
            (None, Some(category)) => {
                let verdict = verdict_from_str(category)?;
                let history = engine.history_for_category(verdict).context("history")?;
                output::print_history(&history, json)?;
            }
            (None, None) => bail!("pass --email or --category"),
        },
    }

    Ok(())
}
