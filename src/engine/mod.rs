//! Marketplace engine.
//!
//! The engine owns the task registry, response ledger, escrow
//! settlement, reputation aggregates, and leaderboard ranker, and
//! exposes every operation of the marketplace core. It also consumes an
//! async stream of events, applying each and skipping failures.
//!
//! Cross-entity operations (accept and hold funds, confirm and release,
//! arbitrate and settle) run under the task's lock, so either both the
//! state transition and the fund movement commit, or neither is visible.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio_stream::{Stream, StreamExt};
use tracing::info;

use crate::Amount;
use crate::model::{
    DisputeOutcome, Event, LeaderboardEntry, ResponseId, ReviewId, Task, TaskDraft, TaskId,
    TaskResponse, TaskStatus, Transaction, UserId, UserStats,
};

mod tasks;
pub use tasks::TaskStore;

mod responses;
pub use responses::ResponseLedger;

mod escrow;
pub use escrow::{EscrowSettlement, Wallet};

mod reputation;
pub use reputation::{
    COMPLETION_AWARD, HIGH_RATING_BONUS, HIGH_RATING_THRESHOLD, ReputationEngine, level_for,
};

mod leaderboard;
pub use leaderboard::LeaderboardRanker;

mod error;
pub use error::{BidError, EscrowError, MarketError, ReviewError, TaskError};

/// The marketplace engine.
///
/// All operations take `&self`; entity-level locks inside the components
/// provide the required serialization, so the engine can be shared
/// behind an [`Arc`].
pub struct Marketplace {
    tasks: TaskStore,
    responses: ResponseLedger,
    escrow: EscrowSettlement,
    reputation: ReputationEngine,
    ranker: LeaderboardRanker,
}

/// Public API
impl Marketplace {
    pub fn new() -> Self {
        Self {
            tasks: TaskStore::new(),
            responses: ResponseLedger::new(),
            escrow: EscrowSettlement::new(),
            reputation: ReputationEngine::new(),
            ranker: LeaderboardRanker::new(),
        }
    }

    /// Run the engine over the given event stream.
    pub async fn run(&self, mut stream: impl Stream<Item = Event> + Unpin) {
        while let Some(event) = stream.next().await {
            // every failure is recoverable, so the engine never stops
            let _ = self.apply(event);
        }
    }

    /// Apply a single event on top of the current engine state.
    pub fn apply(&self, event: Event) -> Result<(), MarketError> {
        match event {
            Event::Deposit { user, amount } => {
                let result = self.deposit(user, amount);
                Self::log_result("deposit", None, Some(user), Some(amount), &result);
                result?;
            }
            Event::Withdraw { user, amount } => {
                let result = self.withdraw(user, amount);
                Self::log_result("withdraw", None, Some(user), Some(amount), &result);
                result?;
            }
            Event::CreateTask { poster, draft } => {
                let budget = draft.budget;
                let result = self.create_task(poster, draft).map(|_| ());
                Self::log_result("create_task", None, Some(poster), Some(budget), &result);
                result?;
            }
            Event::CancelTask { poster, task } => {
                let result = self.cancel_task(poster, task);
                Self::log_result("cancel_task", Some(task), Some(poster), None, &result);
                result?;
            }
            Event::SubmitResponse {
                bidder,
                task,
                proposed_budget,
                estimated_time,
            } => {
                let result = self
                    .submit_response(bidder, task, proposed_budget, estimated_time)
                    .map(|_| ());
                Self::log_result("submit_response", Some(task), Some(bidder), None, &result);
                result?;
            }
            Event::RetractResponse { bidder, response } => {
                let result = self.retract_response(bidder, response);
                Self::log_result("retract_response", None, Some(bidder), None, &result);
                result?;
            }
            Event::AcceptResponse {
                poster,
                task,
                response,
            } => {
                let result = self.accept_response(poster, task, response);
                Self::log_result("accept_response", Some(task), Some(poster), None, &result);
                result?;
            }
            Event::MarkComplete { doer, task } => {
                let result = self.mark_complete(doer, task);
                Self::log_result("mark_complete", Some(task), Some(doer), None, &result);
                result?;
            }
            Event::ConfirmCompletion { poster, task } => {
                let result = self.confirm_completion(poster, task);
                Self::log_result("confirm_completion", Some(task), Some(poster), None, &result);
                result?;
            }
            Event::OpenDispute { poster, task } => {
                let result = self.open_dispute(poster, task);
                Self::log_result("open_dispute", Some(task), Some(poster), None, &result);
                result?;
            }
            Event::ResolveDispute { task, outcome } => {
                let result = self.resolve_dispute(task, outcome);
                Self::log_result("resolve_dispute", Some(task), None, None, &result);
                result?;
            }
            Event::SubmitReview {
                reviewer,
                task,
                reviewee,
                rating,
                comment,
            } => {
                let result = self
                    .submit_review(reviewer, task, reviewee, rating, comment)
                    .map(|_| ());
                Self::log_result("submit_review", Some(task), Some(reviewer), None, &result);
                result?;
            }
        }
        Ok(())
    }

    /// Credit spendable funds to a user's wallet.
    pub fn deposit(&self, user: UserId, amount: Amount) -> Result<(), MarketError> {
        self.escrow.deposit(user, amount, Utc::now())?;
        Ok(())
    }

    /// Debit spendable funds from a user's wallet.
    pub fn withdraw(&self, user: UserId, amount: Amount) -> Result<(), MarketError> {
        self.escrow.withdraw(user, amount, Utc::now())?;
        Ok(())
    }

    /// Post a new task; it starts `Open` and accepting responses.
    pub fn create_task(&self, poster: UserId, draft: TaskDraft) -> Result<TaskId, MarketError> {
        let id = self.tasks.insert(poster, draft, Utc::now())?;
        Ok(id)
    }

    /// Withdraw an `Open` task. Acceptance closes this path; an assigned
    /// task can only end through confirmation or arbitration. No wallet
    /// is touched, since nothing is held before acceptance.
    pub fn cancel_task(&self, poster: UserId, task: TaskId) -> Result<(), MarketError> {
        let slot = self.tasks.entry(task).ok_or(TaskError::NotFound(task))?;
        let mut t = slot.lock();
        if t.posted_by != poster {
            return Err(TaskError::NotPoster { task, user: poster }.into());
        }
        TaskStore::transition(&mut t, TaskStatus::Cancelled, Utc::now())?;
        Ok(())
    }

    /// Sweep overdue `Open` tasks into `Expired`.
    pub fn expire_due(&self, now: DateTime<Utc>) -> Vec<TaskId> {
        self.tasks.expire_due(now)
    }

    /// Bid on an open task.
    pub fn submit_response(
        &self,
        bidder: UserId,
        task: TaskId,
        proposed_budget: Option<Amount>,
        estimated_time: Option<String>,
    ) -> Result<ResponseId, MarketError> {
        let now = Utc::now();
        let slot = self.tasks.entry(task).ok_or(TaskError::NotFound(task))?;
        let mut t = slot.lock();
        if t.status != TaskStatus::Open {
            return Err(BidError::TaskNotOpen(task).into());
        }
        if t.posted_by == bidder {
            return Err(BidError::OwnTask(task).into());
        }

        let id = self
            .responses
            .submit(task, bidder, proposed_budget, estimated_time, now)?;
        t.response_ids.push(id);
        t.updated_at = now;
        Ok(id)
    }

    /// Withdraw a pending bid.
    pub fn retract_response(
        &self,
        bidder: UserId,
        response: ResponseId,
    ) -> Result<(), MarketError> {
        let task = self.responses.retract(bidder, response)?;
        if let Some(slot) = self.tasks.entry(task) {
            let mut t = slot.lock();
            t.response_ids.retain(|id| *id != response);
            t.updated_at = Utc::now();
        }
        Ok(())
    }

    /// Accept one response on an open task.
    ///
    /// Serialized by the task's lock: of concurrent accept calls exactly
    /// one commits, the rest observe [`BidError::AlreadyAccepted`].
    /// Acceptance, assignment, the `Open -> InProgress` transition, and
    /// the escrow hold commit together; a failed hold rolls the
    /// acceptance flag back and leaves the task `Open`.
    pub fn accept_response(
        &self,
        poster: UserId,
        task: TaskId,
        response: ResponseId,
    ) -> Result<(), MarketError> {
        let now = Utc::now();
        let slot = self.tasks.entry(task).ok_or(TaskError::NotFound(task))?;
        let mut t = slot.lock();
        if t.posted_by != poster {
            return Err(TaskError::NotPoster { task, user: poster }.into());
        }
        if t.assigned_to.is_some() {
            return Err(BidError::AlreadyAccepted(task).into());
        }
        if t.status != TaskStatus::Open {
            return Err(BidError::TaskNotOpen(task).into());
        }

        let bidder = self.responses.mark_accepted(task, response)?;
        if let Err(e) = self.escrow.hold(task, t.budget, poster, now) {
            self.responses.revert_accepted(response);
            return Err(e.into());
        }

        t.assigned_to = Some(bidder);
        TaskStore::transition(&mut t, TaskStatus::InProgress, now)?;
        Ok(())
    }

    /// Doer-side completion mark. Records the flag and unlocks the
    /// poster's confirm/dispute choice; the task does not transition.
    /// Idempotent while the task is `InProgress`.
    pub fn mark_complete(&self, doer: UserId, task: TaskId) -> Result<(), MarketError> {
        let slot = self.tasks.entry(task).ok_or(TaskError::NotFound(task))?;
        let mut t = slot.lock();
        if t.status != TaskStatus::InProgress {
            return Err(TaskError::InvalidTransition {
                task,
                from: t.status,
                to: TaskStatus::Completed,
            }
            .into());
        }
        if t.assigned_to != Some(doer) {
            return Err(TaskError::NotAssignee { task, user: doer }.into());
        }
        t.marked_complete = true;
        t.updated_at = Utc::now();
        Ok(())
    }

    /// Poster-side confirmation: completes the task and releases the
    /// held budget to the doer. Requires the doer's completion mark.
    pub fn confirm_completion(&self, poster: UserId, task: TaskId) -> Result<(), MarketError> {
        let now = Utc::now();
        let slot = self.tasks.entry(task).ok_or(TaskError::NotFound(task))?;
        let mut t = slot.lock();
        if t.posted_by != poster {
            return Err(TaskError::NotPoster { task, user: poster }.into());
        }
        if t.status != TaskStatus::InProgress {
            return Err(TaskError::InvalidTransition {
                task,
                from: t.status,
                to: TaskStatus::Completed,
            }
            .into());
        }
        if !t.marked_complete {
            return Err(TaskError::NotMarkedComplete(task).into());
        }
        let Some(doer) = t.assigned_to else {
            return Err(TaskError::NotMarkedComplete(task).into());
        };

        self.escrow.release(task, doer, now)?;
        TaskStore::transition(&mut t, TaskStatus::Completed, now)?;
        self.reputation.record_completion(doer, now);
        Ok(())
    }

    /// Poster declines to confirm after the doer's mark. Funds stay held
    /// until arbitration resolves the dispute; there is no timeout.
    pub fn open_dispute(&self, poster: UserId, task: TaskId) -> Result<(), MarketError> {
        let slot = self.tasks.entry(task).ok_or(TaskError::NotFound(task))?;
        let mut t = slot.lock();
        if t.posted_by != poster {
            return Err(TaskError::NotPoster { task, user: poster }.into());
        }
        if t.status != TaskStatus::InProgress {
            return Err(TaskError::InvalidTransition {
                task,
                from: t.status,
                to: TaskStatus::Disputed,
            }
            .into());
        }
        if !t.marked_complete {
            return Err(TaskError::NotMarkedComplete(task).into());
        }
        TaskStore::transition(&mut t, TaskStatus::Disputed, Utc::now())?;
        Ok(())
    }

    /// Apply an external arbitration decision to a disputed task.
    pub fn resolve_dispute(
        &self,
        task: TaskId,
        outcome: DisputeOutcome,
    ) -> Result<(), MarketError> {
        let now = Utc::now();
        let slot = self.tasks.entry(task).ok_or(TaskError::NotFound(task))?;
        let mut t = slot.lock();
        let target = match outcome {
            DisputeOutcome::InFavorOfDoer => TaskStatus::Completed,
            DisputeOutcome::InFavorOfPoster => TaskStatus::Cancelled,
        };
        if t.status != TaskStatus::Disputed {
            return Err(TaskError::InvalidTransition {
                task,
                from: t.status,
                to: target,
            }
            .into());
        }
        let Some(doer) = t.assigned_to else {
            return Err(TaskError::NotMarkedComplete(task).into());
        };

        match outcome {
            DisputeOutcome::InFavorOfDoer => {
                self.escrow.release(task, doer, now)?;
                TaskStore::transition(&mut t, TaskStatus::Completed, now)?;
                self.reputation.record_completion(doer, now);
            }
            DisputeOutcome::InFavorOfPoster => {
                self.escrow.reverse(task)?;
                TaskStore::transition(&mut t, TaskStatus::Cancelled, now)?;
                // assignment is only meaningful while in progress, completed,
                // or disputed; a cancelled task carries none
                t.assigned_to = None;
                self.reputation.record_failure(doer);
            }
        }
        Ok(())
    }

    /// Review the counterpart on a completed task. The poster reviews
    /// the doer or the doer reviews the poster; a high rating of the
    /// doer earns the point bonus.
    pub fn submit_review(
        &self,
        reviewer: UserId,
        task: TaskId,
        reviewee: UserId,
        rating: u8,
        comment: String,
    ) -> Result<ReviewId, MarketError> {
        let now = Utc::now();
        let slot = self.tasks.entry(task).ok_or(TaskError::NotFound(task))?;
        let mut t = slot.lock();
        if t.status != TaskStatus::Completed {
            return Err(ReviewError::TaskNotCompleted(task).into());
        }
        let Some(doer) = t.assigned_to else {
            return Err(ReviewError::TaskNotCompleted(task).into());
        };
        let poster = t.posted_by;
        let valid_direction = (reviewer == poster && reviewee == doer)
            || (reviewer == doer && reviewee == poster);
        if !valid_direction {
            return Err(ReviewError::NotParticipant {
                task,
                user: reviewer,
            }
            .into());
        }

        let id = self.reputation.submit_review(
            task,
            reviewer,
            reviewee,
            rating,
            comment,
            reviewee == doer,
            now,
        )?;
        t.review_ids.push(id);
        t.updated_at = now;
        Ok(id)
    }

    /// Derived stats for a user.
    pub fn user_stats(&self, user: UserId) -> UserStats {
        self.reputation.stats(user)
    }

    /// Current full leaderboard, recomputed from a stats snapshot.
    pub fn leaderboard(&self) -> Vec<LeaderboardEntry> {
        self.ranker.rank(self.reputation.snapshot())
    }

    /// One page of the current leaderboard.
    pub fn leaderboard_page(&self, offset: usize, len: usize) -> Vec<LeaderboardEntry> {
        self.leaderboard().into_iter().skip(offset).take(len).collect()
    }

    /// Store current ranks as the baseline for `weekly_change`.
    pub fn roll_leaderboard_period(&self) {
        self.ranker.roll_period(self.reputation.snapshot());
    }

    /// Point-in-time copy of a task.
    pub fn task(&self, id: TaskId) -> Option<Task> {
        self.tasks.snapshot(id)
    }

    /// All responses on a task, in submission order.
    pub fn responses_for(&self, task: TaskId) -> Vec<TaskResponse> {
        self.responses.responses_for(task)
    }

    /// Point-in-time copy of a wallet.
    pub fn wallet(&self, user: UserId) -> Option<Wallet> {
        self.escrow.wallet(user)
    }

    /// All wallets, for reporting.
    pub fn wallets(&self) -> Vec<Wallet> {
        self.escrow.wallets()
    }

    /// Ledger entries for one wallet, oldest first.
    pub fn transactions(&self, user: UserId) -> Vec<Transaction> {
        self.escrow.transactions(user)
    }
}

/// Private API
impl Marketplace {
    /// Small helper to log `apply` results
    fn log_result(
        kind: &str,
        task: Option<TaskId>,
        user: Option<UserId>,
        amount: Option<Amount>,
        result: &Result<(), MarketError>,
    ) {
        match result {
            Ok(()) => {
                info!(task = ?task, user = ?user, amount = ?amount, "{kind} applied");
            }
            Err(e) => {
                info!(task = ?task, user = ?user, amount = ?amount, reason = %e, "{kind} skipped");
            }
        }
    }
}

impl Default for Marketplace {
    fn default() -> Self {
        Self::new()
    }
}

/// Periodic deadline sweep: the only background activity of the engine.
/// Ticks immediately, then every `period`, expiring overdue open tasks.
pub async fn run_expiry_sweep(market: Arc<Marketplace>, period: Duration) {
    let mut interval = tokio::time::interval(period);
    loop {
        interval.tick().await;
        let expired = market.expire_due(Utc::now());
        if !expired.is_empty() {
            info!(count = expired.len(), "expired overdue tasks");
        }
    }
}
