//! Core domain types for the marketplace engine.

use chrono::{DateTime, Utc};

use crate::Amount;

/// User identifier, issued by the authentication collaborator.
pub type UserId = u64;

/// Task identifier.
pub type TaskId = u64;

/// Response (bid) identifier.
pub type ResponseId = u64;

/// Review identifier.
pub type ReviewId = u64;

/// Wallet transaction identifier.
pub type TxId = u64;

/// Lifecycle state of a task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TaskStatus {
    /// Posted and accepting responses.
    Open,
    /// A response was accepted; funds are held; work is underway.
    InProgress,
    /// Both sides confirmed; funds released. Terminal.
    Completed,
    /// Poster declined to confirm; awaiting external arbitration.
    Disputed,
    /// Withdrawn by the poster before any acceptance. Terminal.
    Cancelled,
    /// Deadline passed with no accepted response. Terminal.
    Expired,
}

impl TaskStatus {
    /// Can a task transition from `self` to `to`?
    ///
    /// The machine is monotonic: the only paths out of a non-`Open` state
    /// are the two arbitration resolutions of `Disputed`.
    pub fn can_transition_to(self, to: TaskStatus) -> bool {
        use TaskStatus::*;
        matches!(
            (self, to),
            (Open, InProgress)
                | (Open, Cancelled)
                | (Open, Expired)
                | (InProgress, Completed)
                | (InProgress, Disputed)
                | (Disputed, Completed) // arbitration for the doer
                | (Disputed, Cancelled) // arbitration for the poster
        )
    }

    /// Is this a terminal state?
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            TaskStatus::Completed | TaskStatus::Cancelled | TaskStatus::Expired
        )
    }
}

impl std::fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            TaskStatus::Open => "open",
            TaskStatus::InProgress => "in_progress",
            TaskStatus::Completed => "completed",
            TaskStatus::Disputed => "disputed",
            TaskStatus::Cancelled => "cancelled",
            TaskStatus::Expired => "expired",
        };
        write!(f, "{s}")
    }
}

/// Creation fields for a task, produced by the form layer.
///
/// Text fields are opaque to the engine; validation beyond budget and
/// deadline happens upstream.
#[derive(Debug, Clone)]
pub struct TaskDraft {
    pub title: String,
    pub description: String,
    pub category: String,
    pub priority: String,
    pub budget: Amount,
    pub deadline: DateTime<Utc>,
    pub skills: Vec<String>,
}

/// A posted task and its lifecycle state.
///
/// `assigned_to` is `Some` exactly while the status is in
/// `{in_progress, completed, disputed}`. Mutated only through the
/// store's checked transitions.
#[derive(Debug, Clone)]
pub struct Task {
    pub id: TaskId,
    pub title: String,
    pub description: String,
    pub category: String,
    pub priority: String,
    pub budget: Amount,
    pub deadline: DateTime<Utc>,
    pub skills: Vec<String>,
    pub posted_by: UserId,
    pub assigned_to: Option<UserId>,
    pub status: TaskStatus,
    /// Doer-side completion mark; meaningful only while `InProgress`.
    /// Unlocks the poster's confirm/dispute choice without transitioning.
    pub marked_complete: bool,
    pub response_ids: Vec<ResponseId>,
    pub review_ids: Vec<ReviewId>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

/// A bid on an open task.
///
/// Immutable after creation except for `is_accepted`, which is flipped
/// at most once (and reverted only if the paired fund hold fails).
#[derive(Debug, Clone)]
pub struct TaskResponse {
    pub id: ResponseId,
    pub task: TaskId,
    pub user: UserId,
    /// Bidder's counter-offer; informational. `None` means the task budget.
    pub proposed_budget: Option<Amount>,
    pub estimated_time: Option<String>,
    pub is_accepted: bool,
    pub created_at: DateTime<Utc>,
}

/// A review left by one task participant about the other.
#[derive(Debug, Clone)]
pub struct TaskReview {
    pub id: ReviewId,
    pub task: TaskId,
    pub reviewer: UserId,
    pub reviewee: UserId,
    /// 1 through 5 inclusive.
    pub rating: u8,
    pub comment: String,
    pub created_at: DateTime<Utc>,
}

/// Direction of a wallet transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TxKind {
    Credit,
    Debit,
}

impl std::fmt::Display for TxKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TxKind::Credit => write!(f, "credit"),
            TxKind::Debit => write!(f, "debit"),
        }
    }
}

/// Settlement state of a wallet transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TxStatus {
    /// Escrowed: the debit is booked but the funds sit in `held`.
    Pending,
    /// Settled.
    Completed,
    /// Reversed: the pending debit never left the wallet.
    Failed,
}

impl std::fmt::Display for TxStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            TxStatus::Pending => "pending",
            TxStatus::Completed => "completed",
            TxStatus::Failed => "failed",
        };
        write!(f, "{s}")
    }
}

/// A ledger entry against a single wallet.
///
/// Entries referencing a task are unique per `(task, kind)`; replaying a
/// settlement produces no new entry.
#[derive(Debug, Clone)]
pub struct Transaction {
    pub id: TxId,
    pub wallet: UserId,
    pub kind: TxKind,
    pub status: TxStatus,
    pub amount: Amount,
    pub task: Option<TaskId>,
    pub timestamp: DateTime<Utc>,
}

/// External arbitration decision for a disputed task.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DisputeOutcome {
    /// Work stands: release the held budget to the doer.
    InFavorOfDoer,
    /// Full reversal: return the held budget to the poster.
    InFavorOfPoster,
}

/// Derived per-user metrics. Recomputed, never stored denormalized.
#[derive(Debug, Clone, PartialEq)]
pub struct UserStats {
    pub user: UserId,
    pub average_rating: f64,
    pub completion_rate: f64,
    pub streak_days: u32,
    pub points: u64,
    pub level: u32,
}

/// One row of the ranked leaderboard.
#[derive(Debug, Clone, PartialEq)]
pub struct LeaderboardEntry {
    pub user: UserId,
    /// 1-based.
    pub rank: u32,
    pub points: u64,
    pub average_rating: f64,
    /// Previous period rank minus current rank; 0 without a prior snapshot.
    pub weekly_change: i64,
}

/// An input event representing one exposed mutation of the engine.
#[derive(Debug, Clone)]
pub enum Event {
    Deposit {
        user: UserId,
        amount: Amount,
    },
    Withdraw {
        user: UserId,
        amount: Amount,
    },
    CreateTask {
        poster: UserId,
        draft: TaskDraft,
    },
    CancelTask {
        poster: UserId,
        task: TaskId,
    },
    SubmitResponse {
        bidder: UserId,
        task: TaskId,
        proposed_budget: Option<Amount>,
        estimated_time: Option<String>,
    },
    RetractResponse {
        bidder: UserId,
        response: ResponseId,
    },
    AcceptResponse {
        poster: UserId,
        task: TaskId,
        response: ResponseId,
    },
    MarkComplete {
        doer: UserId,
        task: TaskId,
    },
    ConfirmCompletion {
        poster: UserId,
        task: TaskId,
    },
    OpenDispute {
        poster: UserId,
        task: TaskId,
    },
    ResolveDispute {
        task: TaskId,
        outcome: DisputeOutcome,
    },
    SubmitReview {
        reviewer: UserId,
        task: TaskId,
        reviewee: UserId,
        rating: u8,
        comment: String,
    },
}
