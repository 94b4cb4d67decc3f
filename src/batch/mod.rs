//! Batch orchestration: worker pool, task lifecycle and result aggregation.
//!
//! Workers pull addresses from a shared queue, run the full verification
//! pipeline and publish results over a channel. Progress updates take the
//! task-map lock per completion, so `task_status` reads a consistent and
//! monotone snapshot. A fatal per-address error folds to a RISKY result and
//! never halts the batch.

mod task;

pub use task::{Task, TaskResults, TaskState, TaskStatus};

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::sync::mpsc;
use std::thread;
use std::time::Duration;

use parking_lot::Mutex;
use rand::Rng;
use tracing::{info, warn};

use crate::engine::Engine;
use crate::probe::bounce::{BounceProbe, BounceProbeOptions};
use crate::settings::WorkerMode;
use crate::types::{Method, ProbeOutcome, Verdict, VerificationResult};

pub struct Orchestrator {
    engine: Arc<Engine>,
    tasks: Arc<Mutex<HashMap<String, Task>>>,
}

impl Orchestrator {
    pub fn new(engine: Arc<Engine>) -> Self {
        Self {
            engine,
            tasks: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    pub fn engine(&self) -> &Arc<Engine> {
        &self.engine
    }

    /// Start a batch and return its task id. Verification runs on background
    /// threads; poll with [`task_status`](Self::task_status).
    pub fn start_batch(&self, addresses: Vec<String>, method: Method) -> String {
        let task_id = uuid::Uuid::new_v4().to_string();
        {
            let task = Task::new(task_id.clone(), addresses.clone(), method);
            self.tasks.lock().insert(task_id.clone(), task);
        }

        let engine = self.engine.clone();
        let tasks = self.tasks.clone();
        let id = task_id.clone();
        thread::spawn(move || {
            run_batch(engine, tasks, id, addresses, method);
        });

        task_id
    }

    pub fn task_status(&self, task_id: &str) -> Option<TaskStatus> {
        let tasks = self.tasks.lock();
        let task = tasks.get(task_id)?;
        Some(TaskStatus {
            task_id: task.id.clone(),
            status: task.state,
            total: task.total(),
            completed: task.completed,
            progress: task.progress_percent(),
            start: task.started,
            end: task.finished,
            method: task.method,
        })
    }

    pub fn task_results(&self, task_id: &str) -> Option<TaskResults> {
        let tasks = self.tasks.lock();
        let task = tasks.get(task_id)?;
        Some(TaskResults {
            task_id: task.id.clone(),
            status: task.state,
            total: task.total(),
            completed: task.completed,
            results: task.results.clone(),
            method: task.method,
        })
    }
}

fn run_batch(
    engine: Arc<Engine>,
    tasks: Arc<Mutex<HashMap<String, Task>>>,
    task_id: String,
    addresses: Vec<String>,
    method: Method,
) {
    if let Some(task) = tasks.lock().get_mut(&task_id) {
        task.state = TaskState::Running;
    }
    info!(target: "batch", %task_id, total = addresses.len(), "batch started");

    let config = engine.settings().config();

    // Bulk SMTP jobs go through the bounce probe when accounts exist;
    // otherwise the per-address pipeline applies.
    let bounce_results = if method == Method::Smtp && addresses.len() > 1 {
        let probe = BounceProbe::new(
            engine.settings().smtp_accounts(),
            BounceProbeOptions {
                batches_dir: config.batches_dir.clone().into(),
                wait: Duration::from_secs(config.bounce_wait_secs),
            },
        );
        if probe.available() {
            match probe.run(&addresses) {
                Ok(outcomes) => Some(outcomes),
                Err(err) => {
                    warn!(target: "batch", %task_id, %err, "bounce probe failed, falling back");
                    None
                }
            }
        } else {
            warn!(target: "batch", %task_id, "no SMTP accounts configured, falling back to RCPT probing");
            None
        }
    } else {
        None
    };

    if let Some(outcomes) = bounce_results {
        for address in &addresses {
            let result = match outcomes.get(address) {
                Some(ProbeOutcome::DefinitiveInvalid { reason, .. }) => VerificationResult::new(
                    address.clone(),
                    Verdict::Invalid,
                    reason.clone(),
                    address.split('@').nth(1).unwrap_or("unknown"),
                    "bounce",
                ),
                Some(ProbeOutcome::DefinitiveValid { reason, .. }) => VerificationResult::new(
                    address.clone(),
                    Verdict::Valid,
                    reason.clone(),
                    address.split('@').nth(1).unwrap_or("unknown"),
                    "bounce",
                ),
                _ => VerificationResult::new(
                    address.clone(),
                    Verdict::Invalid,
                    "Invalid email format",
                    "unknown",
                    "bounce",
                ),
            };
            if let Err(err) = engine.record_result(result.clone()) {
                warn!(target: "batch", %task_id, %address, %err, "failed to persist bounce result");
            }
            publish(&tasks, &task_id, address, result);
        }
        complete(&tasks, &task_id);
        engine.persist_cache().ok();
        return;
    }

    let worker_count = config.worker_count.max(1).min(addresses.len().max(1));
    let queue: Arc<Mutex<VecDeque<String>>> = Arc::new(Mutex::new(addresses.into_iter().collect()));
    let (tx, rx) = mpsc::channel::<(String, VerificationResult)>();

    let mut workers = Vec::with_capacity(worker_count);
    for worker_id in 0..worker_count {
        let engine = engine.clone();
        let queue = queue.clone();
        let tx = tx.clone();
        let isolated = config.worker_mode == WorkerMode::Isolated;
        workers.push(thread::spawn(move || {
            let probes = isolated.then(|| engine.isolated_probe_set());
            loop {
                let Some(address) = queue.lock().pop_front() else {
                    break;
                };
                info!(target: "batch", worker_id, %address, "verifying");

                let outcome = match &probes {
                    Some(probes) => engine.verify_with(probes, &address, method),
                    None => engine.verify(&address, method),
                };
                let result = outcome.unwrap_or_else(|err| {
                    VerificationResult::new(
                        address.clone(),
                        Verdict::Risky,
                        format!("Verification error: {err}"),
                        "unknown",
                        "error",
                    )
                });
                if tx.send((address, result)).is_err() {
                    break;
                }

                let jitter = rand::thread_rng().gen_range(500..=1500);
                thread::sleep(Duration::from_millis(jitter));
            }
        }));
    }
    drop(tx);

    for (address, result) in rx {
        publish(&tasks, &task_id, &address, result);
    }
    for worker in workers {
        worker.join().ok();
    }

    complete(&tasks, &task_id);
    engine.persist_cache().ok();
}

fn publish(
    tasks: &Arc<Mutex<HashMap<String, Task>>>,
    task_id: &str,
    address: &str,
    result: VerificationResult,
) {
    let mut tasks = tasks.lock();
    if let Some(task) = tasks.get_mut(task_id) {
        // At-most-once per address: a duplicate publish does not bump progress.
        if task.results.insert(address.to_string(), result).is_none() {
            task.completed += 1;
        }
    }
}

fn complete(tasks: &Arc<Mutex<HashMap<String, Task>>>, task_id: &str) {
    let mut tasks = tasks.lock();
    if let Some(task) = tasks.get_mut(task_id) {
        task.state = TaskState::Completed;
        task.finished = Some(chrono::Utc::now());
        info!(target: "batch", %task_id, completed = task.completed, "batch completed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dns::{DnsError, LookupMx, MxRecord, MxResolver};
    use crate::settings::{Config, Settings};

    struct EmptyMx;

    impl LookupMx for EmptyMx {
        fn lookup_mx(&self, _domain: &str) -> Result<Vec<MxRecord>, DnsError> {
            Ok(Vec::new())
        }
    }

    fn orchestrator(dir: &std::path::Path, workers: usize) -> Orchestrator {
        let config = Config {
            data_dir: dir.join("data").to_string_lossy().into_owned(),
            history_dir: dir.join("history").to_string_lossy().into_owned(),
            batches_dir: dir.join("batches").to_string_lossy().into_owned(),
            worker_count: workers,
            ..Config::default()
        };
        let settings = Arc::new(Settings::from_config(config));
        let engine =
            Engine::with_resolver(settings, MxResolver::with_lookup(EmptyMx)).expect("engine");
        Orchestrator::new(Arc::new(engine))
    }

    fn wait_for_completion(orchestrator: &Orchestrator, task_id: &str) -> TaskStatus {
        let mut last_completed = 0;
        for _ in 0..600 {
            let status = orchestrator.task_status(task_id).expect("status");
            assert!(status.completed >= last_completed, "progress is monotone");
            last_completed = status.completed;
            if status.status == TaskState::Completed {
                return status;
            }
            thread::sleep(Duration::from_millis(50));
        }
        panic!("batch did not complete in time");
    }

    #[test]
    fn batch_completes_every_address() {
        let dir = tempfile::tempdir().expect("tempdir");
        let orchestrator = orchestrator(dir.path(), 2);

        let addresses: Vec<String> = (0..6).map(|i| format!("user{i}@example.com")).collect();
        let task_id = orchestrator.start_batch(addresses.clone(), Method::Auto);

        let status = wait_for_completion(&orchestrator, &task_id);
        assert_eq!(status.completed, 6);
        assert_eq!(status.total, 6);
        assert!(status.end.is_some());

        let results = orchestrator.task_results(&task_id).expect("results");
        assert_eq!(results.results.len(), 6);
        for address in &addresses {
            let result = &results.results[address];
            assert!(
                matches!(
                    result.verdict,
                    Verdict::Valid | Verdict::Invalid | Verdict::Risky | Verdict::Custom
                ),
                "{result:?}"
            );
        }
    }

    #[test]
    fn malformed_addresses_resolve_without_probes() {
        let dir = tempfile::tempdir().expect("tempdir");
        let orchestrator = orchestrator(dir.path(), 1);
        let task_id = orchestrator.start_batch(vec!["not-an-address".to_string()], Method::Auto);

        let status = wait_for_completion(&orchestrator, &task_id);
        assert_eq!(status.completed, 1);

        let results = orchestrator.task_results(&task_id).expect("results");
        assert_eq!(
            results.results["not-an-address"].verdict,
            Verdict::Invalid
        );
    }

    #[test]
    fn unknown_task_yields_none() {
        let dir = tempfile::tempdir().expect("tempdir");
        let orchestrator = orchestrator(dir.path(), 1);
        assert!(orchestrator.task_status("missing").is_none());
        assert!(orchestrator.task_results("missing").is_none());
    }
}
