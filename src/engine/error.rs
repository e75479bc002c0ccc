//! Error types for marketplace operations.
//!
//! Lower components return typed failures; the facade aggregates them
//! into [`MarketError`]. Every variant is recoverable: callers retry with
//! corrected input or surface the message, and entity state is unchanged
//! on any reported failure.

use thiserror::Error;

use crate::Amount;
use crate::model::{ResponseId, TaskId, TaskStatus, UserId};

/// Top-level error returned by [`Marketplace`](super::Marketplace) operations.
#[derive(Debug, Error)]
pub enum MarketError {
    #[error("task operation failed: {0}")]
    Task(#[from] TaskError),

    #[error("bid operation failed: {0}")]
    Bid(#[from] BidError),

    #[error("settlement failed: {0}")]
    Escrow(#[from] EscrowError),

    #[error("review rejected: {0}")]
    Review(#[from] ReviewError),
}

/// Error from the task state machine.
#[derive(Debug, Error)]
pub enum TaskError {
    #[error("task {0} not found")]
    NotFound(TaskId),

    #[error("task {task}: invalid transition {from} -> {to}")]
    InvalidTransition {
        task: TaskId,
        from: TaskStatus,
        to: TaskStatus,
    },

    #[error("task {task}: user {user} is not the poster")]
    NotPoster { task: TaskId, user: UserId },

    #[error("task {task}: user {user} is not the assignee")]
    NotAssignee { task: TaskId, user: UserId },

    #[error("task {0}: the assignee has not marked the work complete")]
    NotMarkedComplete(TaskId),

    #[error("task budget must be positive")]
    ZeroBudget,

    #[error("task deadline is not in the future")]
    DeadlinePassed,
}

/// Error from the response ledger.
#[derive(Debug, Error)]
pub enum BidError {
    #[error("task {0} is not open for responses")]
    TaskNotOpen(TaskId),

    #[error("user {user} already has a response on task {task}")]
    DuplicateResponse { task: TaskId, user: UserId },

    #[error("task {0} already has an accepted response")]
    AlreadyAccepted(TaskId),

    #[error("response {0} not found")]
    ResponseNotFound(ResponseId),

    #[error("response {response} does not belong to user {user}")]
    NotBidder { response: ResponseId, user: UserId },

    #[error("cannot respond to own task {0}")]
    OwnTask(TaskId),
}

/// Error from escrow settlement.
#[derive(Debug, Error)]
pub enum EscrowError {
    #[error("insufficient funds for user {user}: available {available}, requested {requested}")]
    InsufficientFunds {
        user: UserId,
        available: Amount,
        requested: Amount,
    },

    #[error("task {0}: settlement already resolved the other way")]
    SettlementConflict(TaskId),

    #[error("task {0}: no funds held")]
    HoldNotFound(TaskId),

    #[error("transaction amount must be positive")]
    ZeroAmount,
}

/// Error from review submission.
#[derive(Debug, Error)]
pub enum ReviewError {
    #[error("duplicate review of {reviewee} by {reviewer} on task {task}")]
    DuplicateReview {
        task: TaskId,
        reviewer: UserId,
        reviewee: UserId,
    },

    #[error("rating {0} is out of range (1-5)")]
    InvalidRating(u8),

    #[error("task {0} is not completed")]
    TaskNotCompleted(TaskId),

    #[error("task {task}: {user} is not a participant on the required side")]
    NotParticipant { task: TaskId, user: UserId },
}
