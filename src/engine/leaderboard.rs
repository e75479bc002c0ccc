//! Leaderboard ranking.
//!
//! Every ranking pass is a full recompute over a stats snapshot; there
//! is no incrementally mutated standings table to drift or go stale. The
//! sort key is total and reproducible: points descending, then average
//! rating descending, then user id ascending.

use std::collections::HashMap;

use parking_lot::RwLock;

use crate::model::{LeaderboardEntry, UserId, UserStats};

/// Derives ranked standings and period-over-period rank deltas.
pub struct LeaderboardRanker {
    /// Ranks captured at the start of the current period.
    previous: RwLock<HashMap<UserId, u32>>,
}

impl LeaderboardRanker {
    pub fn new() -> Self {
        Self {
            previous: RwLock::new(HashMap::new()),
        }
    }

    /// Rank a snapshot of user stats. `weekly_change` is the previous
    /// period rank minus the current rank (positive means the user moved
    /// up); users absent from the period baseline get 0.
    pub fn rank(&self, mut stats: Vec<UserStats>) -> Vec<LeaderboardEntry> {
        stats.sort_by(|a, b| {
            b.points
                .cmp(&a.points)
                .then_with(|| b.average_rating.total_cmp(&a.average_rating))
                .then_with(|| a.user.cmp(&b.user))
        });

        let previous = self.previous.read();
        stats
            .into_iter()
            .enumerate()
            .map(|(index, stats)| {
                let rank = index as u32 + 1;
                let weekly_change = previous
                    .get(&stats.user)
                    .map_or(0, |prev| i64::from(*prev) - i64::from(rank));
                LeaderboardEntry {
                    user: stats.user,
                    rank,
                    points: stats.points,
                    average_rating: stats.average_rating,
                    weekly_change,
                }
            })
            .collect()
    }

    /// Start a new period: store the current ranks as the baseline that
    /// subsequent `rank` calls diff against.
    pub fn roll_period(&self, stats: Vec<UserStats>) {
        let baseline: HashMap<UserId, u32> = self
            .rank(stats)
            .into_iter()
            .map(|entry| (entry.user, entry.rank))
            .collect();
        *self.previous.write() = baseline;
    }
}

impl Default for LeaderboardRanker {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stats(user: UserId, points: u64, rating: f64) -> UserStats {
        UserStats {
            user,
            average_rating: rating,
            completion_rate: 1.0,
            streak_days: 0,
            points,
            level: 1,
        }
    }

    #[test]
    fn ranks_by_points_descending() {
        let ranker = LeaderboardRanker::new();
        let entries = ranker.rank(vec![
            stats(1, 80, 5.0),
            stats(2, 100, 4.0),
            stats(3, 90, 4.5),
        ]);

        let order: Vec<UserId> = entries.iter().map(|e| e.user).collect();
        assert_eq!(order, vec![2, 3, 1]);
        assert_eq!(entries[0].rank, 1);
        assert_eq!(entries[2].rank, 3);
    }

    #[test]
    fn equal_points_tie_break_on_rating() {
        let ranker = LeaderboardRanker::new();
        let entries = ranker.rank(vec![
            stats(1, 100, 4.5),
            stats(2, 100, 4.8),
            stats(3, 80, 5.0),
        ]);

        let order: Vec<UserId> = entries.iter().map(|e| e.user).collect();
        assert_eq!(order, vec![2, 1, 3]);
    }

    #[test]
    fn full_tie_falls_back_to_user_id_for_total_order() {
        let ranker = LeaderboardRanker::new();
        let entries = ranker.rank(vec![
            stats(9, 100, 4.5),
            stats(3, 100, 4.5),
            stats(7, 100, 4.5),
        ]);

        let order: Vec<UserId> = entries.iter().map(|e| e.user).collect();
        assert_eq!(order, vec![3, 7, 9]);
    }

    #[test]
    fn no_baseline_means_zero_change() {
        let ranker = LeaderboardRanker::new();
        let entries = ranker.rank(vec![stats(1, 100, 4.0), stats(2, 50, 4.0)]);
        assert!(entries.iter().all(|e| e.weekly_change == 0));
    }

    #[test]
    fn change_is_previous_rank_minus_current() {
        let ranker = LeaderboardRanker::new();
        ranker.roll_period(vec![stats(1, 100, 4.0), stats(2, 50, 4.0)]);

        // User 2 overtakes user 1
        let entries = ranker.rank(vec![stats(1, 100, 4.0), stats(2, 120, 4.0)]);
        let by_user: HashMap<UserId, i64> =
            entries.iter().map(|e| (e.user, e.weekly_change)).collect();
        assert_eq!(by_user[&2], 1); // rank 2 -> 1
        assert_eq!(by_user[&1], -1); // rank 1 -> 2
    }

    #[test]
    fn new_user_after_roll_has_zero_change() {
        let ranker = LeaderboardRanker::new();
        ranker.roll_period(vec![stats(1, 100, 4.0)]);

        let entries = ranker.rank(vec![stats(1, 100, 4.0), stats(5, 200, 4.0)]);
        let newcomer = entries.iter().find(|e| e.user == 5).unwrap();
        assert_eq!(newcomer.weekly_change, 0);
    }

    #[test]
    fn rank_is_a_pure_recompute() {
        let ranker = LeaderboardRanker::new();
        let input = vec![stats(1, 100, 4.0), stats(2, 50, 4.0)];
        assert_eq!(ranker.rank(input.clone()), ranker.rank(input));
    }

    #[test]
    fn empty_snapshot_ranks_empty() {
        let ranker = LeaderboardRanker::new();
        assert!(ranker.rank(Vec::new()).is_empty());
    }
}
