//! Review ingestion and derived per-user reputation.
//!
//! The engine keeps raw tallies (rating sum/count, completed and failed
//! task counts, points, streak state) and derives [`UserStats`] on
//! demand. Derivation is pure: recomputing with no new outcomes returns
//! an identical record. Ratings are aggregated as an equal-weight mean
//! with no decay, so the figure is reproducible from the review history.

use std::collections::{HashMap, HashSet};

use chrono::{DateTime, NaiveDate, Utc};
use parking_lot::RwLock;

use crate::model::{ReviewId, TaskId, TaskReview, UserId, UserStats};

use super::error::ReviewError;

/// Points earned per completed task.
pub const COMPLETION_AWARD: u64 = 10;
/// Extra points when the completed work is rated at or above
/// [`HIGH_RATING_THRESHOLD`] (a 1.5x award overall).
pub const HIGH_RATING_BONUS: u64 = 5;
/// Minimum rating that earns the bonus.
pub const HIGH_RATING_THRESHOLD: u8 = 4;

/// Cumulative points required to reach each level; level = index + 1.
const LEVEL_THRESHOLDS: [u64; 8] = [0, 50, 150, 300, 500, 750, 1_100, 1_500];

/// Level reached at a point total. Monotonic step function of points
/// alone; never derived by replaying task history.
pub fn level_for(points: u64) -> u32 {
    let reached = LEVEL_THRESHOLDS
        .iter()
        .take_while(|threshold| points >= **threshold)
        .count();
    reached as u32
}

#[derive(Debug, Clone, Default)]
struct UserRecord {
    rating_sum: u64,
    rating_count: u64,
    completed: u64,
    failed: u64,
    points: u64,
    streak_days: u32,
    last_completion: Option<NaiveDate>,
}

impl UserRecord {
    fn stats(&self, user: UserId) -> UserStats {
        let average_rating = if self.rating_count == 0 {
            0.0
        } else {
            self.rating_sum as f64 / self.rating_count as f64
        };
        let outcomes = self.completed + self.failed;
        let completion_rate = if outcomes == 0 {
            0.0
        } else {
            self.completed as f64 / outcomes as f64
        };
        UserStats {
            user,
            average_rating,
            completion_rate,
            streak_days: self.streak_days,
            points: self.points,
            level: level_for(self.points),
        }
    }
}

#[derive(Default)]
struct ReviewLedger {
    next_id: ReviewId,
    reviews: HashMap<ReviewId, TaskReview>,
    /// Uniqueness keys: one review per (task, reviewer, reviewee).
    keys: HashSet<(TaskId, UserId, UserId)>,
}

/// Aggregates task outcomes and reviews into per-user reputation.
pub struct ReputationEngine {
    records: RwLock<HashMap<UserId, UserRecord>>,
    reviews: RwLock<ReviewLedger>,
}

impl ReputationEngine {
    pub fn new() -> Self {
        Self {
            records: RwLock::new(HashMap::new()),
            reviews: RwLock::new(ReviewLedger::default()),
        }
    }

    /// Ingest a completed-task outcome for the doer: completion count,
    /// base point award, and the consecutive-day streak.
    pub fn record_completion(&self, user: UserId, when: DateTime<Utc>) {
        let day = when.date_naive();
        let mut records = self.records.write();
        let record = records.entry(user).or_default();

        record.completed += 1;
        record.points += COMPLETION_AWARD;
        record.streak_days = match record.last_completion {
            Some(last) if last == day => record.streak_days,
            Some(last) if last.succ_opt() == Some(day) => record.streak_days + 1,
            _ => 1,
        };
        record.last_completion = Some(day);
    }

    /// Ingest a dispute resolved against the doer.
    pub fn record_failure(&self, user: UserId) {
        self.records.write().entry(user).or_default().failed += 1;
    }

    /// Record a review with atomic insert-or-reject on the
    /// (task, reviewer, reviewee) key. `bonus_eligible` marks a review of
    /// the task's doer, the only direction that can earn the point bonus.
    pub fn submit_review(
        &self,
        task: TaskId,
        reviewer: UserId,
        reviewee: UserId,
        rating: u8,
        comment: String,
        bonus_eligible: bool,
        now: DateTime<Utc>,
    ) -> Result<ReviewId, ReviewError> {
        if !(1..=5).contains(&rating) {
            return Err(ReviewError::InvalidRating(rating));
        }

        let mut reviews = self.reviews.write();
        if !reviews.keys.insert((task, reviewer, reviewee)) {
            return Err(ReviewError::DuplicateReview {
                task,
                reviewer,
                reviewee,
            });
        }
        reviews.next_id += 1;
        let id = reviews.next_id;
        reviews.reviews.insert(
            id,
            TaskReview {
                id,
                task,
                reviewer,
                reviewee,
                rating,
                comment,
                created_at: now,
            },
        );
        drop(reviews);

        let mut records = self.records.write();
        let record = records.entry(reviewee).or_default();
        record.rating_sum += u64::from(rating);
        record.rating_count += 1;
        if bonus_eligible && rating >= HIGH_RATING_THRESHOLD {
            record.points += HIGH_RATING_BONUS;
        }
        Ok(id)
    }

    /// Derived stats for a user. Unknown users get the zero record at
    /// level 1 rather than an error.
    pub fn stats(&self, user: UserId) -> UserStats {
        self.records
            .read()
            .get(&user)
            .cloned()
            .unwrap_or_default()
            .stats(user)
    }

    /// Consistent snapshot of every tracked user's stats, for ranking.
    pub fn snapshot(&self) -> Vec<UserStats> {
        self.records
            .read()
            .iter()
            .map(|(user, record)| record.stats(*user))
            .collect()
    }
}

impl Default for ReputationEngine {
    fn default() -> Self {
        Self::new()
    }
}
