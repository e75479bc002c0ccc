//! Response (bid) ledger.
//!
//! Responses are immutable after creation except for the `is_accepted`
//! flag, flipped exactly once by the acceptance path (and reverted only
//! when the paired fund hold fails). Single-acceptance is enforced by the
//! caller holding the task's lock across `mark_accepted`; the ledger
//! itself rejects a second flip of the same response.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};

use chrono::{DateTime, Utc};
use parking_lot::RwLock;

use crate::Amount;
use crate::model::{ResponseId, TaskId, TaskResponse, UserId};

use super::error::BidError;

#[derive(Default)]
struct Inner {
    responses: HashMap<ResponseId, TaskResponse>,
    by_task: HashMap<TaskId, Vec<ResponseId>>,
}

/// Registry of responses, indexed by id and by task.
pub struct ResponseLedger {
    inner: RwLock<Inner>,
    next_id: AtomicU64,
}

impl ResponseLedger {
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(Inner::default()),
            next_id: AtomicU64::new(1),
        }
    }

    /// Record a new response. The caller has already verified the task is
    /// open and the bidder is not the poster; the ledger enforces one
    /// response per bidder per task.
    pub fn submit(
        &self,
        task: TaskId,
        user: UserId,
        proposed_budget: Option<Amount>,
        estimated_time: Option<String>,
        now: DateTime<Utc>,
    ) -> Result<ResponseId, BidError> {
        let mut inner = self.inner.write();

        let existing = inner.by_task.get(&task);
        if let Some(ids) = existing {
            let duplicate = ids
                .iter()
                .filter_map(|id| inner.responses.get(id))
                .any(|r| r.user == user);
            if duplicate {
                return Err(BidError::DuplicateResponse { task, user });
            }
        }

        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let response = TaskResponse {
            id,
            task,
            user,
            proposed_budget,
            estimated_time,
            is_accepted: false,
            created_at: now,
        };
        inner.responses.insert(id, response);
        inner.by_task.entry(task).or_default().push(id);
        Ok(id)
    }

    /// Withdraw a pending response, returning the task it was on.
    /// An accepted response cannot be retracted.
    pub fn retract(&self, user: UserId, response: ResponseId) -> Result<TaskId, BidError> {
        let mut inner = self.inner.write();

        let record = inner
            .responses
            .get(&response)
            .ok_or(BidError::ResponseNotFound(response))?;
        if record.user != user {
            return Err(BidError::NotBidder { response, user });
        }
        if record.is_accepted {
            return Err(BidError::AlreadyAccepted(record.task));
        }

        let task = record.task;
        inner.responses.remove(&response);
        if let Some(ids) = inner.by_task.get_mut(&task) {
            ids.retain(|id| *id != response);
        }
        Ok(task)
    }

    /// Flip the acceptance flag on a response of the given task, returning
    /// the winning bidder. Call only with the task's lock held.
    pub fn mark_accepted(&self, task: TaskId, response: ResponseId) -> Result<UserId, BidError> {
        let mut inner = self.inner.write();

        let record = inner
            .responses
            .get_mut(&response)
            .filter(|r| r.task == task)
            .ok_or(BidError::ResponseNotFound(response))?;
        if record.is_accepted {
            return Err(BidError::AlreadyAccepted(task));
        }
        record.is_accepted = true;
        Ok(record.user)
    }

    /// Roll back an acceptance whose downstream fund hold failed.
    pub fn revert_accepted(&self, response: ResponseId) {
        if let Some(record) = self.inner.write().responses.get_mut(&response) {
            record.is_accepted = false;
        }
    }

    pub fn get(&self, response: ResponseId) -> Option<TaskResponse> {
        self.inner.read().responses.get(&response).cloned()
    }

    /// All responses on a task, in submission order.
    pub fn responses_for(&self, task: TaskId) -> Vec<TaskResponse> {
        let inner = self.inner.read();
        inner
            .by_task
            .get(&task)
            .map(|ids| {
                ids.iter()
                    .filter_map(|id| inner.responses.get(id).cloned())
                    .collect()
            })
            .unwrap_or_default()
    }
}

impl Default for ResponseLedger {
    fn default() -> Self {
        Self::new()
    }
}
