//! CSV event-log reader and report writers for the replay binary.
//!
//! An event log is a sparse table with one row per marketplace event:
//!
//! ```text
//! event,user,task,target,amount,rating,deadline,detail
//! deposit,1,,,500,,,
//! create_task,1,,,500,,2026-10-01T00:00:00Z,Move boxes
//! submit_response,2,1,,,,,about 2 hours
//! accept_response,1,1,1,,,,
//! ```
//!
//! `target` is the response id for accept/retract rows and the reviewee
//! for review rows. `detail` carries the title, estimated time, comment,
//! or arbitration outcome depending on the event.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::io;
use std::path::Path;
use thiserror::Error;

use crate::engine::Wallet;
use crate::model::{DisputeOutcome, LeaderboardEntry, TaskDraft};
use crate::{Amount, Event, UserId};

/// Errors that can occur when parsing csv rows
#[derive(Debug, Error)]
pub enum CsvError {
    #[error("line {line}: failed to parse row: {source}")]
    Parse { line: usize, source: csv::Error },

    #[error("line {line}: unrecognized event '{event}'")]
    UnrecognizedEvent { line: usize, event: String },

    #[error("line {line}: {event} missing {field}")]
    MissingField {
        line: usize,
        event: String,
        field: &'static str,
    },

    #[error("line {line}: invalid deadline '{value}'")]
    InvalidDeadline { line: usize, value: String },

    #[error("line {line}: unrecognized arbitration outcome '{outcome}'")]
    UnrecognizedOutcome { line: usize, outcome: String },
}

#[derive(Debug, Deserialize)]
struct InputRow {
    event: String,
    user: Option<u64>,
    task: Option<u64>,
    target: Option<u64>,
    amount: Option<u64>,
    rating: Option<u8>,
    deadline: Option<String>,
    detail: Option<String>,
}

#[derive(Debug, Serialize)]
struct WalletRow {
    user: UserId,
    balance: String,
    held: String,
    total: String,
}

#[derive(Debug, Serialize)]
struct LeaderboardRow {
    rank: u32,
    user: UserId,
    points: u64,
    rating: String,
    weekly_change: i64,
}

/// Read marketplace events from a csv file
pub fn read_events(path: impl AsRef<Path>) -> impl Iterator<Item = Result<Event, CsvError>> {
    let reader = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .from_path(path)
        .expect("failed to open csv file");

    reader
        .into_deserialize::<InputRow>()
        .enumerate()
        .map(|(idx, result)| {
            let line = idx + 2; // 1-indexed, skip header
            let row = result.map_err(|source| CsvError::Parse { line, source })?;
            row_to_event(row, line)
        })
}

fn row_to_event(row: InputRow, line: usize) -> Result<Event, CsvError> {
    let missing = |field: &'static str| CsvError::MissingField {
        line,
        event: row.event.clone(),
        field,
    };

    match row.event.as_str() {
        "deposit" => Ok(Event::Deposit {
            user: row.user.ok_or_else(|| missing("user"))?,
            amount: Amount::new(row.amount.ok_or_else(|| missing("amount"))?),
        }),
        "withdraw" => Ok(Event::Withdraw {
            user: row.user.ok_or_else(|| missing("user"))?,
            amount: Amount::new(row.amount.ok_or_else(|| missing("amount"))?),
        }),
        "create_task" => {
            let deadline = match &row.deadline {
                Some(value) if !value.is_empty() => value
                    .parse::<DateTime<Utc>>()
                    .map_err(|_| CsvError::InvalidDeadline {
                        line,
                        value: value.clone(),
                    })?,
                _ => Utc::now() + Duration::days(30),
            };
            Ok(Event::CreateTask {
                poster: row.user.ok_or_else(|| missing("user"))?,
                draft: TaskDraft {
                    title: row.detail.unwrap_or_default(),
                    description: String::new(),
                    category: "general".to_string(),
                    priority: "normal".to_string(),
                    budget: Amount::new(row.amount.ok_or_else(|| missing("amount"))?),
                    deadline,
                    skills: Vec::new(),
                },
            })
        }
        "cancel_task" => Ok(Event::CancelTask {
            poster: row.user.ok_or_else(|| missing("user"))?,
            task: row.task.ok_or_else(|| missing("task"))?,
        }),
        "submit_response" => Ok(Event::SubmitResponse {
            bidder: row.user.ok_or_else(|| missing("user"))?,
            task: row.task.ok_or_else(|| missing("task"))?,
            proposed_budget: row.amount.map(Amount::new),
            estimated_time: row.detail.filter(|d| !d.is_empty()),
        }),
        "retract_response" => Ok(Event::RetractResponse {
            bidder: row.user.ok_or_else(|| missing("user"))?,
            response: row.target.ok_or_else(|| missing("target"))?,
        }),
        "accept_response" => Ok(Event::AcceptResponse {
            poster: row.user.ok_or_else(|| missing("user"))?,
            task: row.task.ok_or_else(|| missing("task"))?,
            response: row.target.ok_or_else(|| missing("target"))?,
        }),
        "mark_complete" => Ok(Event::MarkComplete {
            doer: row.user.ok_or_else(|| missing("user"))?,
            task: row.task.ok_or_else(|| missing("task"))?,
        }),
        "confirm_completion" => Ok(Event::ConfirmCompletion {
            poster: row.user.ok_or_else(|| missing("user"))?,
            task: row.task.ok_or_else(|| missing("task"))?,
        }),
        "open_dispute" => Ok(Event::OpenDispute {
            poster: row.user.ok_or_else(|| missing("user"))?,
            task: row.task.ok_or_else(|| missing("task"))?,
        }),
        "resolve_dispute" => {
            let outcome = match row.detail.as_deref() {
                Some("doer") => DisputeOutcome::InFavorOfDoer,
                Some("poster") => DisputeOutcome::InFavorOfPoster,
                other => {
                    return Err(CsvError::UnrecognizedOutcome {
                        line,
                        outcome: other.unwrap_or_default().to_string(),
                    });
                }
            };
            Ok(Event::ResolveDispute {
                task: row.task.ok_or_else(|| missing("task"))?,
                outcome,
            })
        }
        "submit_review" => Ok(Event::SubmitReview {
            reviewer: row.user.ok_or_else(|| missing("user"))?,
            task: row.task.ok_or_else(|| missing("task"))?,
            reviewee: row.target.ok_or_else(|| missing("target"))?,
            rating: row.rating.ok_or_else(|| missing("rating"))?,
            comment: row.detail.unwrap_or_default(),
        }),
        other => Err(CsvError::UnrecognizedEvent {
            line,
            event: other.to_string(),
        }),
    }
}

/// write wallet balances to stdout in csv format, ordered by user
pub fn write_wallets(wallets: impl IntoIterator<Item = Wallet>) {
    let stdout = io::stdout();
    let mut writer = csv::Writer::from_writer(stdout.lock());

    let mut wallets: Vec<Wallet> = wallets.into_iter().collect();
    wallets.sort_by_key(|w| w.user);
    for wallet in wallets {
        let row = WalletRow {
            user: wallet.user,
            balance: wallet.balance.to_string(),
            held: wallet.held.to_string(),
            total: wallet.total().to_string(),
        };
        writer.serialize(&row).expect("failed to write csv row");
    }

    writer.flush().expect("failed to flush csv writer");
}

/// write leaderboard standings to stdout in csv format
pub fn write_leaderboard(entries: impl IntoIterator<Item = LeaderboardEntry>) {
    let stdout = io::stdout();
    let mut writer = csv::Writer::from_writer(stdout.lock());

    for entry in entries {
        let row = LeaderboardRow {
            rank: entry.rank,
            user: entry.user,
            points: entry.points,
            rating: format!("{:.2}", entry.average_rating),
            weekly_change: entry.weekly_change,
        };
        writer.serialize(&row).expect("failed to write csv row");
    }

    writer.flush().expect("failed to flush csv writer");
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    const HEADER: &str = "event,user,task,target,amount,rating,deadline,detail\n";

    fn write_csv(content: &str) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(HEADER.as_bytes()).unwrap();
        file.write_all(content.as_bytes()).unwrap();
        file
    }

    fn read_one(content: &str) -> Result<Event, CsvError> {
        let file = write_csv(content);
        let mut results: Vec<_> = read_events(file.path()).collect();
        assert_eq!(results.len(), 1);
        results.remove(0)
    }

    #[test]
    fn read_deposit() {
        let event = read_one("deposit,1,,,500,,,\n").unwrap();
        match event {
            Event::Deposit { user, amount } => {
                assert_eq!(user, 1);
                assert_eq!(amount, Amount::new(500));
            }
            _ => panic!("expected deposit"),
        }
    }

    #[test]
    fn read_create_task_with_deadline() {
        let event = read_one("create_task,1,,,500,,2026-10-01T00:00:00Z,Move boxes\n").unwrap();
        match event {
            Event::CreateTask { poster, draft } => {
                assert_eq!(poster, 1);
                assert_eq!(draft.budget, Amount::new(500));
                assert_eq!(draft.title, "Move boxes");
                assert_eq!(
                    draft.deadline,
                    "2026-10-01T00:00:00Z".parse::<DateTime<Utc>>().unwrap()
                );
            }
            _ => panic!("expected create_task"),
        }
    }

    #[test]
    fn read_create_task_defaults_deadline() {
        let event = read_one("create_task,1,,,500,,,\n").unwrap();
        match event {
            Event::CreateTask { draft, .. } => {
                assert!(draft.deadline > Utc::now() + Duration::days(29));
            }
            _ => panic!("expected create_task"),
        }
    }

    #[test]
    fn read_accept_uses_target_as_response() {
        let event = read_one("accept_response,1,3,2,,,,\n").unwrap();
        match event {
            Event::AcceptResponse {
                poster,
                task,
                response,
            } => {
                assert_eq!(poster, 1);
                assert_eq!(task, 3);
                assert_eq!(response, 2);
            }
            _ => panic!("expected accept_response"),
        }
    }

    #[test]
    fn read_review_row() {
        let event = read_one("submit_review,1,3,2,,5,,great work\n").unwrap();
        match event {
            Event::SubmitReview {
                reviewer,
                task,
                reviewee,
                rating,
                comment,
            } => {
                assert_eq!(reviewer, 1);
                assert_eq!(task, 3);
                assert_eq!(reviewee, 2);
                assert_eq!(rating, 5);
                assert_eq!(comment, "great work");
            }
            _ => panic!("expected submit_review"),
        }
    }

    #[test]
    fn read_resolve_dispute_outcomes() {
        let doer = read_one("resolve_dispute,,3,,,,,doer\n").unwrap();
        assert!(matches!(
            doer,
            Event::ResolveDispute {
                task: 3,
                outcome: DisputeOutcome::InFavorOfDoer
            }
        ));

        let poster = read_one("resolve_dispute,,3,,,,,poster\n").unwrap();
        assert!(matches!(
            poster,
            Event::ResolveDispute {
                outcome: DisputeOutcome::InFavorOfPoster,
                ..
            }
        ));

        let err = read_one("resolve_dispute,,3,,,,,split\n").unwrap_err();
        assert!(matches!(err, CsvError::UnrecognizedOutcome { line: 2, .. }));
    }

    #[test]
    fn read_with_whitespace() {
        let event = read_one("deposit, 1, , , 500, , ,\n").unwrap();
        assert!(matches!(event, Event::Deposit { user: 1, .. }));
    }

    #[test]
    fn read_returns_error_for_unknown_event() {
        let err = read_one("transmogrify,1,,,500,,,\n").unwrap_err();
        assert!(matches!(err, CsvError::UnrecognizedEvent { line: 2, .. }));
    }

    #[test]
    fn read_returns_error_for_missing_amount() {
        let err = read_one("deposit,1,,,,,,\n").unwrap_err();
        assert!(matches!(
            err,
            CsvError::MissingField {
                line: 2,
                field: "amount",
                ..
            }
        ));
    }

    #[test]
    fn read_returns_error_for_missing_user() {
        let err = read_one("mark_complete,,4,,,,,\n").unwrap_err();
        assert!(matches!(
            err,
            CsvError::MissingField {
                line: 2,
                field: "user",
                ..
            }
        ));
    }

    #[test]
    fn read_returns_error_for_invalid_deadline() {
        let err = read_one("create_task,1,,,500,,next week,\n").unwrap_err();
        assert!(matches!(err, CsvError::InvalidDeadline { line: 2, .. }));
    }

    #[test]
    fn submit_response_optional_fields() {
        let bare = read_one("submit_response,2,1,,,,,\n").unwrap();
        match bare {
            Event::SubmitResponse {
                proposed_budget,
                estimated_time,
                ..
            } => {
                assert_eq!(proposed_budget, None);
                assert_eq!(estimated_time, None);
            }
            _ => panic!("expected submit_response"),
        }

        let full = read_one("submit_response,2,1,,450,,,about 2 hours\n").unwrap();
        match full {
            Event::SubmitResponse {
                proposed_budget,
                estimated_time,
                ..
            } => {
                assert_eq!(proposed_budget, Some(Amount::new(450)));
                assert_eq!(estimated_time.as_deref(), Some("about 2 hours"));
            }
            _ => panic!("expected submit_response"),
        }
    }
}
