use chrono::{Duration, Utc};
use criterion::{BenchmarkId, Criterion, black_box, criterion_group, criterion_main};

use tasks_eng::model::TaskDraft;
use tasks_eng::{Amount, Event, Marketplace, TaskId, UserId};

/// Generates full task-lifecycle event sequences for benchmarking.
///
/// Pattern per task (repeating):
/// 1. Deposit 100 into the poster's wallet
/// 2. Create the task (budget 100)
/// 3. The paired doer responds
/// 4. Accept, mark complete, confirm
/// 5. Review the doer
///
/// Posters are users `1..=pairs`; each poster's doer is `poster + pairs`.
/// Task and response ids are deterministic because every task gets
/// exactly one response.
pub struct LifecycleGenerator {
    pairs: u64,
    tasks_per_pair: u32,
    current_pair: u64,
    current_task: u32,
    step: u8,
    next_task_id: TaskId,
    next_response_id: u64,
    task_id: TaskId,
    response_id: u64,
}

const STEPS_PER_TASK: u8 = 7;

impl LifecycleGenerator {
    pub fn new(pairs: u64, tasks_per_pair: u32) -> Self {
        Self {
            pairs,
            tasks_per_pair,
            current_pair: 1,
            current_task: 0,
            step: 0,
            next_task_id: 1,
            next_response_id: 1,
            task_id: 0,
            response_id: 0,
        }
    }

    /// Total number of events this generator will produce
    pub fn total_events(&self) -> u64 {
        self.pairs * u64::from(self.tasks_per_pair) * u64::from(STEPS_PER_TASK)
    }

    fn draft() -> TaskDraft {
        TaskDraft {
            title: "benchmark task".to_string(),
            description: String::new(),
            category: "general".to_string(),
            priority: "normal".to_string(),
            budget: Amount::new(100),
            deadline: Utc::now() + Duration::days(365),
            skills: Vec::new(),
        }
    }
}

impl Iterator for LifecycleGenerator {
    type Item = Event;

    fn next(&mut self) -> Option<Self::Item> {
        if self.current_pair > self.pairs {
            return None;
        }

        let poster: UserId = self.current_pair;
        let doer: UserId = self.current_pair + self.pairs;

        let event = match self.step {
            0 => Event::Deposit {
                user: poster,
                amount: Amount::new(100),
            },
            1 => {
                self.task_id = self.next_task_id;
                self.next_task_id += 1;
                Event::CreateTask {
                    poster,
                    draft: Self::draft(),
                }
            }
            2 => {
                self.response_id = self.next_response_id;
                self.next_response_id += 1;
                Event::SubmitResponse {
                    bidder: doer,
                    task: self.task_id,
                    proposed_budget: None,
                    estimated_time: None,
                }
            }
            3 => Event::AcceptResponse {
                poster,
                task: self.task_id,
                response: self.response_id,
            },
            4 => Event::MarkComplete {
                doer,
                task: self.task_id,
            },
            5 => Event::ConfirmCompletion {
                poster,
                task: self.task_id,
            },
            _ => Event::SubmitReview {
                reviewer: poster,
                task: self.task_id,
                reviewee: doer,
                // Cycle through 3..=5 so bonus and non-bonus paths both run
                rating: 3 + (self.current_task % 3) as u8,
                comment: String::new(),
            },
        };

        self.step += 1;
        if self.step >= STEPS_PER_TASK {
            self.step = 0;
            self.current_task += 1;
            if self.current_task >= self.tasks_per_pair {
                self.current_task = 0;
                self.current_pair += 1;
            }
        }

        Some(event)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let per_task = u64::from(STEPS_PER_TASK);
        let done = ((self.current_pair - 1) * u64::from(self.tasks_per_pair)
            + u64::from(self.current_task))
            * per_task
            + u64::from(self.step);
        let remaining = self.total_events().saturating_sub(done) as usize;
        (remaining, Some(remaining))
    }
}

impl ExactSizeIterator for LifecycleGenerator {}

fn apply_all(pairs: u64, tasks_per_pair: u32) -> Marketplace {
    let market = Marketplace::new();
    for event in LifecycleGenerator::new(pairs, tasks_per_pair) {
        let _ = black_box(market.apply(event));
    }
    market
}

fn bench_single_pair(c: &mut Criterion) {
    let mut group = c.benchmark_group("single_pair");

    for tasks in [1_000u32, 10_000] {
        group.bench_with_input(BenchmarkId::from_parameter(tasks), &tasks, |b, &tasks| {
            b.iter(|| apply_all(1, tasks));
        });
    }

    group.finish();
}

fn bench_many_pairs(c: &mut Criterion) {
    let mut group = c.benchmark_group("many_pairs");

    for (pairs, tasks_per) in [(100u64, 100u32), (1_000, 10), (10, 1_000)] {
        let label = format!("{}p_{}t", pairs, tasks_per);
        group.bench_with_input(
            BenchmarkId::from_parameter(&label),
            &(pairs, tasks_per),
            |b, &(pairs, tasks_per)| {
                b.iter(|| apply_all(pairs, tasks_per));
            },
        );
    }

    group.finish();
}

fn bench_leaderboard_recompute(c: &mut Criterion) {
    let mut group = c.benchmark_group("leaderboard");

    for pairs in [100u64, 1_000, 10_000] {
        let market = apply_all(pairs, 1);
        market.roll_leaderboard_period();
        group.bench_with_input(
            BenchmarkId::from_parameter(pairs),
            &market,
            |b, market| {
                b.iter(|| black_box(market.leaderboard()));
            },
        );
    }

    group.finish();
}

fn bench_stats_query(c: &mut Criterion) {
    let mut group = c.benchmark_group("stats_query");

    let market = apply_all(1_000, 10);
    group.bench_function("single_user", |b| {
        b.iter(|| black_box(market.user_stats(1_001)));
    });

    group.finish();
}

criterion_group!(
    benches,
    bench_single_pair,
    bench_many_pairs,
    bench_leaderboard_recompute,
    bench_stats_query,
);

criterion_main!(benches);
