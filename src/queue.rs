//! Task queue: owns all live tasks and their lifecycle.
//!
//! All state sits behind one mutex; external components only go through
//! the documented operations. At most one task is `active` at any moment,
//! transitions only advance, and the completion path returns the recorded
//! result so the caller can hand it to the rendezvous registry without a
//! second lock acquisition.

use std::collections::HashMap;
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::models::task::{FeedbackResult, Task, TaskStatus};
use crate::{AppError, Result};

/// Default bound on concurrently live tasks.
pub const DEFAULT_MAX_TASKS: usize = 10;

/// Count of tasks per status.
#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
pub struct QueueStats {
    pub total: usize,
    pub pending: usize,
    pub active: usize,
    pub completed: usize,
    pub max: usize,
}

struct QueueInner {
    tasks: HashMap<String, Task>,
    /// Creation order of live task ids.
    order: Vec<String>,
    active: Option<String>,
    next_serial: u64,
}

/// Owner of all [`Task`] state.
pub struct TaskQueue {
    project: String,
    max_tasks: usize,
    inner: Mutex<QueueInner>,
}

impl TaskQueue {
    /// Create an empty queue for the named project.
    #[must_use]
    pub fn new(project: impl Into<String>, max_tasks: usize) -> Self {
        let project = slugify(&project.into());
        info!(project = %project, max_tasks, "task queue initialized");
        Self {
            project,
            max_tasks,
            inner: Mutex::new(QueueInner {
                tasks: HashMap::new(),
                order: Vec::new(),
                active: None,
                next_serial: 1,
            }),
        }
    }

    /// Project slug used as the task-id prefix.
    #[must_use]
    pub fn project(&self) -> &str {
        &self.project
    }

    /// Create a task in `pending`, promoting it to `active` when nothing
    /// else is active. Returns the new task id.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Conflict` when the queue is at its bound.
    pub fn add(
        &self,
        prompt: String,
        predefined_options: Vec<String>,
        auto_resubmit_timeout: u64,
    ) -> Result<String> {
        let mut inner = self.lock();
        if inner.tasks.len() >= self.max_tasks {
            return Err(AppError::Conflict(format!(
                "task queue is full ({} tasks)",
                self.max_tasks
            )));
        }

        // Ids are never reused within a process lifetime.
        let serial = inner.next_serial;
        inner.next_serial += 1;
        let id = format!("{}-{serial:04}", self.project);

        let mut task = Task::new(id.clone(), prompt, predefined_options, auto_resubmit_timeout);
        if inner.active.is_none() {
            task.status = TaskStatus::Active;
            inner.active = Some(id.clone());
        }

        inner.order.push(id.clone());
        inner.tasks.insert(id.clone(), task);
        info!(task_id = %id, live = inner.tasks.len(), "task added");
        Ok(id)
    }

    /// Clone of one task, when it is still live.
    #[must_use]
    pub fn get(&self, task_id: &str) -> Option<Task> {
        self.lock().tasks.get(task_id).cloned()
    }

    /// Clones of all live tasks in creation order.
    #[must_use]
    pub fn list(&self) -> Vec<Task> {
        let inner = self.lock();
        inner
            .order
            .iter()
            .filter_map(|id| inner.tasks.get(id).cloned())
            .collect()
    }

    /// The currently active task, if any.
    #[must_use]
    pub fn active(&self) -> Option<Task> {
        let inner = self.lock();
        inner
            .active
            .as_ref()
            .and_then(|id| inner.tasks.get(id).cloned())
    }

    /// Explicitly activate a pending task, demoting the current active one
    /// back to pending. Activating the already-active task is a no-op.
    ///
    /// # Errors
    ///
    /// `AppError::NotFound` for an unknown id, `AppError::Conflict` when
    /// the task is already completed.
    pub fn activate(&self, task_id: &str) -> Result<()> {
        let mut inner = self.lock();
        match inner.tasks.get(task_id) {
            None => return Err(AppError::NotFound(format!("no such task: {task_id}"))),
            Some(task) if task.status == TaskStatus::Completed => {
                return Err(AppError::Conflict(format!(
                    "task already completed: {task_id}"
                )));
            }
            Some(task) if task.status == TaskStatus::Active => return Ok(()),
            Some(_) => {}
        }

        if let Some(old_id) = inner.active.take() {
            if let Some(old) = inner.tasks.get_mut(&old_id) {
                if old.status == TaskStatus::Active {
                    old.status = TaskStatus::Pending;
                }
            }
        }
        if let Some(task) = inner.tasks.get_mut(task_id) {
            task.status = TaskStatus::Active;
        }
        inner.active = Some(task_id.to_owned());
        info!(task_id, "task activated");
        Ok(())
    }

    /// Record a submission for a pending or active task and mark it
    /// completed. Returns the result back so the caller can deliver it to
    /// the rendezvous registry; queue state and rendezvous delivery thus
    /// stay consistent for any observer that sees `completed`.
    ///
    /// # Errors
    ///
    /// `AppError::NotFound` for an unknown id, `AppError::Conflict` on
    /// double submit.
    pub fn submit(&self, task_id: &str, result: FeedbackResult) -> Result<FeedbackResult> {
        let mut inner = self.lock();
        let task = inner
            .tasks
            .get_mut(task_id)
            .ok_or_else(|| AppError::NotFound(format!("no such task: {task_id}")))?;

        if task.status == TaskStatus::Completed {
            return Err(AppError::Conflict(format!(
                "task already completed: {task_id}"
            )));
        }

        task.status = TaskStatus::Completed;
        task.completed_at = Some(Utc::now());
        task.result = Some(result.clone());

        if inner.active.as_deref() == Some(task_id) {
            inner.active = None;
            Self::promote_next(&mut inner);
        }
        info!(task_id, "task completed");
        Ok(result)
    }

    /// Drop a task once its RPC caller has consumed the result. Promotes
    /// the next pending task when the evicted one was active.
    pub fn evict(&self, task_id: &str) -> bool {
        let mut inner = self.lock();
        if inner.tasks.remove(task_id).is_none() {
            warn!(task_id, "evict of unknown task ignored");
            return false;
        }
        inner.order.retain(|id| id != task_id);
        if inner.active.as_deref() == Some(task_id) {
            inner.active = None;
            Self::promote_next(&mut inner);
        }
        debug!(task_id, live = inner.tasks.len(), "task evicted");
        true
    }

    /// Drop every live task. Used by the startup path to shed residue.
    pub fn clear_all(&self) -> usize {
        let mut inner = self.lock();
        let count = inner.tasks.len();
        inner.tasks.clear();
        inner.order.clear();
        inner.active = None;
        if count > 0 {
            info!(count, "cleared all tasks");
        }
        count
    }

    /// Counts by status.
    #[must_use]
    pub fn stats(&self) -> QueueStats {
        let inner = self.lock();
        let mut stats = QueueStats {
            total: inner.tasks.len(),
            pending: 0,
            active: 0,
            completed: 0,
            max: self.max_tasks,
        };
        for task in inner.tasks.values() {
            match task.status {
                TaskStatus::Pending => stats.pending += 1,
                TaskStatus::Active => stats.active += 1,
                TaskStatus::Completed => stats.completed += 1,
            }
        }
        stats
    }

    /// FIFO promotion: the earliest-created pending task becomes active,
    /// ties broken by id. `order` is creation-ordered, so the first
    /// pending entry is the winner.
    fn promote_next(inner: &mut QueueInner) {
        let next = inner
            .order
            .iter()
            .filter_map(|id| inner.tasks.get(id))
            .filter(|t| t.status == TaskStatus::Pending)
            .min_by(|a, b| {
                a.created_at
                    .cmp(&b.created_at)
                    .then_with(|| a.id.cmp(&b.id))
            })
            .map(|t| t.id.clone());
        if let Some(id) = next {
            if let Some(task) = inner.tasks.get_mut(&id) {
                task.status = TaskStatus::Active;
            }
            info!(task_id = %id, "next task auto-activated");
            inner.active = Some(id);
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, QueueInner> {
        self.inner
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }
}

/// Server-authoritative clock value sent with every listing so clients can
/// render countdowns without local accumulation.
#[must_use]
pub fn server_time() -> DateTime<Utc> {
    Utc::now()
}

/// Reduce an arbitrary project name to a task-id slug: lowercase
/// alphanumerics with single dashes, never empty.
#[must_use]
pub fn slugify(name: &str) -> String {
    let mut slug = String::with_capacity(name.len());
    let mut last_dash = true;
    for c in name.chars() {
        if c.is_ascii_alphanumeric() {
            slug.push(c.to_ascii_lowercase());
            last_dash = false;
        } else if !last_dash {
            slug.push('-');
            last_dash = true;
        }
    }
    let slug = slug.trim_end_matches('-').to_owned();
    if slug.is_empty() {
        "task".to_owned()
    } else {
        slug
    }
}
