use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::types::{Method, VerificationResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskState {
    Pending,
    Running,
    Completed,
    Failed,
}

/// One batch verification job and its aggregated progress.
#[derive(Debug)]
pub struct Task {
    pub id: String,
    pub addresses: Vec<String>,
    pub method: Method,
    pub state: TaskState,
    pub completed: usize,
    pub results: HashMap<String, VerificationResult>,
    pub started: DateTime<Utc>,
    pub finished: Option<DateTime<Utc>>,
}

impl Task {
    pub fn new(id: String, addresses: Vec<String>, method: Method) -> Self {
        Self {
            id,
            addresses,
            method,
            state: TaskState::Pending,
            completed: 0,
            results: HashMap::new(),
            started: Utc::now(),
            finished: None,
        }
    }

    pub fn total(&self) -> usize {
        self.addresses.len()
    }

    pub fn progress_percent(&self) -> f64 {
        if self.addresses.is_empty() {
            100.0
        } else {
            (self.completed as f64 / self.addresses.len() as f64) * 100.0
        }
    }
}

/// Status snapshot returned to callers.
#[derive(Debug, Clone, Serialize)]
pub struct TaskStatus {
    pub task_id: String,
    pub status: TaskState,
    pub total: usize,
    pub completed: usize,
    pub progress: f64,
    pub start: DateTime<Utc>,
    pub end: Option<DateTime<Utc>>,
    pub method: Method,
}

/// Result snapshot returned to callers.
#[derive(Debug, Clone, Serialize)]
pub struct TaskResults {
    pub task_id: String,
    pub status: TaskState,
    pub total: usize,
    pub completed: usize,
    pub results: HashMap<String, VerificationResult>,
    pub method: Method,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn progress_tracks_completion() {
        let mut task = Task::new(
            "t1".to_string(),
            vec!["a@example.com".to_string(), "b@example.com".to_string()],
            Method::Auto,
        );
        assert_eq!(task.progress_percent(), 0.0);
        task.completed = 1;
        assert_eq!(task.progress_percent(), 50.0);
    }

    #[test]
    fn empty_task_is_fully_progressed() {
        let task = Task::new("t1".to_string(), Vec::new(), Method::Auto);
        assert_eq!(task.progress_percent(), 100.0);
    }
}
