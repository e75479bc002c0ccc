//! Authoritative task registry and state machine.
//!
//! Every status change funnels through [`TaskStore::transition`], which
//! rejects anything outside the transition table with
//! [`TaskError::InvalidTransition`]. Entries are `Arc<Mutex<Task>>` so a
//! task's critical sections (acceptance, completion, settlement) serialize
//! per task without blocking the rest of the registry.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use chrono::{DateTime, Utc};
use parking_lot::{Mutex, RwLock};

use crate::model::{Task, TaskDraft, TaskId, TaskStatus, UserId};

use super::error::TaskError;

/// Registry of tasks keyed by id.
pub struct TaskStore {
    tasks: RwLock<HashMap<TaskId, Arc<Mutex<Task>>>>,
    next_id: AtomicU64,
}

impl TaskStore {
    pub fn new() -> Self {
        Self {
            tasks: RwLock::new(HashMap::new()),
            next_id: AtomicU64::new(1),
        }
    }

    /// Create a task in the `Open` state and return its id.
    pub fn insert(
        &self,
        poster: UserId,
        draft: TaskDraft,
        now: DateTime<Utc>,
    ) -> Result<TaskId, TaskError> {
        if draft.budget.is_zero() {
            return Err(TaskError::ZeroBudget);
        }
        if draft.deadline <= now {
            return Err(TaskError::DeadlinePassed);
        }

        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let task = Task {
            id,
            title: draft.title,
            description: draft.description,
            category: draft.category,
            priority: draft.priority,
            budget: draft.budget,
            deadline: draft.deadline,
            skills: draft.skills,
            posted_by: poster,
            assigned_to: None,
            status: TaskStatus::Open,
            marked_complete: false,
            response_ids: Vec::new(),
            review_ids: Vec::new(),
            created_at: now,
            updated_at: now,
            completed_at: None,
        };

        self.tasks.write().insert(id, Arc::new(Mutex::new(task)));
        Ok(id)
    }

    /// The lockable entry for a task, or `None` if unknown.
    pub fn entry(&self, id: TaskId) -> Option<Arc<Mutex<Task>>> {
        self.tasks.read().get(&id).cloned()
    }

    /// A point-in-time copy of a task.
    pub fn snapshot(&self, id: TaskId) -> Option<Task> {
        self.entry(id).map(|slot| slot.lock().clone())
    }

    /// Apply a checked status transition to a locked task.
    ///
    /// Updates `updated_at`, and stamps `completed_at` when the target is
    /// `Completed`. The caller is responsible for keeping `assigned_to`
    /// consistent with the new status.
    pub fn transition(
        task: &mut Task,
        to: TaskStatus,
        now: DateTime<Utc>,
    ) -> Result<(), TaskError> {
        if !task.status.can_transition_to(to) {
            return Err(TaskError::InvalidTransition {
                task: task.id,
                from: task.status,
                to,
            });
        }
        task.status = to;
        task.updated_at = now;
        if to == TaskStatus::Completed {
            task.completed_at = Some(now);
        }
        Ok(())
    }

    /// Sweep overdue `Open` tasks into `Expired`, returning the ids that
    /// transitioned. Tasks in any other state are untouched; an accepted
    /// task past its deadline stays on the dispute/confirmation path.
    pub fn expire_due(&self, now: DateTime<Utc>) -> Vec<TaskId> {
        let entries: Vec<Arc<Mutex<Task>>> = self.tasks.read().values().cloned().collect();

        let mut expired = Vec::new();
        for entry in entries {
            let mut task = entry.lock();
            if task.status == TaskStatus::Open && task.deadline <= now {
                // Open -> Expired is always in the table
                let _ = Self::transition(&mut task, TaskStatus::Expired, now);
                expired.push(task.id);
            }
        }
        expired
    }
}

impl Default for TaskStore {
    fn default() -> Self {
        Self::new()
    }
}
