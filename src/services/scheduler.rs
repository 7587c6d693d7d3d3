//! Pure memory model: given a card's memory state and a review rating,
//! computes the next state and due date. No I/O; callers may invoke it
//! freely without synchronization.
//!
//! The decay curve and weight-table updates follow the FSRS family of
//! models. The weight constants are product-tuning parameters surfaced on
//! `SchedulerConfig`, not part of the algorithm's contract.

use chrono::{DateTime, Duration, Utc};
use rand::Rng;
use serde::{Deserialize, Serialize};

const DECAY: f64 = -0.5;
const FACTOR: f64 = 19.0 / 81.0;

const MIN_STABILITY: f64 = 0.1;
const MIN_DIFFICULTY: f64 = 1.0;
const MAX_DIFFICULTY: f64 = 10.0;

/// Floor for elapsed time so a same-instant re-review never divides by
/// zero or produces a negative interval.
const MIN_ELAPSED_DAYS: f64 = 1.0 / 86_400.0;

const MINUTE_DAYS: f64 = 1.0 / 1_440.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Rating {
    Again = 1,
    Hard = 2,
    Good = 3,
    Easy = 4,
}

impl Rating {
    pub fn from_i64(value: i64) -> Option<Self> {
        match value {
            1 => Some(Self::Again),
            2 => Some(Self::Hard),
            3 => Some(Self::Good),
            4 => Some(Self::Easy),
            _ => None,
        }
    }

    pub fn as_i64(self) -> i64 {
        self as i64
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CardState {
    New,
    Learning,
    Review,
    Relearning,
}

impl CardState {
    pub fn parse(s: &str) -> Self {
        match s.to_uppercase().as_str() {
            "LEARNING" => Self::Learning,
            "REVIEW" => Self::Review,
            "RELEARNING" => Self::Relearning,
            _ => Self::New,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::New => "NEW",
            Self::Learning => "LEARNING",
            Self::Review => "REVIEW",
            Self::Relearning => "RELEARNING",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MemoryState {
    pub state: CardState,
    pub stability: f64,
    pub difficulty: f64,
    pub reps: i64,
    pub lapses: i64,
    pub due_at: DateTime<Utc>,
    pub last_reviewed_at: Option<DateTime<Utc>>,
}

impl MemoryState {
    /// State of a word the user has been exposed to but never reviewed.
    pub fn new_item(now: DateTime<Utc>) -> Self {
        Self {
            state: CardState::New,
            stability: 1.0,
            difficulty: 5.0,
            reps: 0,
            lapses: 0,
            due_at: now,
            last_reviewed_at: None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ScheduleOutcome {
    pub state: MemoryState,
    pub interval_days: f64,
    pub elapsed_days: f64,
    pub retrievability: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerConfig {
    pub weights: [f64; 17],
    pub desired_retention: f64,
    pub min_interval_days: f64,
    pub max_interval_days: f64,
    /// Sub-day steps (minutes) while a card is in Learning.
    pub learning_steps_minutes: [f64; 3],
    /// Sub-day steps (minutes) while a card is in Relearning.
    pub relearning_steps_minutes: [f64; 2],
    /// Interval shrink for Hard and stretch for Easy, applied after the
    /// stability-derived interval so rating order is always strict.
    pub hard_interval_factor: f64,
    pub easy_interval_factor: f64,
    pub fuzz_enabled: bool,
    /// Half-width of the fuzz band, as a fraction of the interval.
    pub fuzz_ratio: f64,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            weights: [
                0.4, 0.6, 2.4, 5.8, // w0-w3: initial stability per rating
                4.93, 0.94, 0.86, 0.01, 1.49, // w4-w8
                0.14, 0.94, 2.18, 0.05, 0.34, // w9-w13
                1.26, 0.29, 2.61, // w14-w16
            ],
            desired_retention: 0.9,
            min_interval_days: 1.0,
            max_interval_days: 36_500.0,
            learning_steps_minutes: [1.0, 6.0, 10.0],
            relearning_steps_minutes: [5.0, 30.0],
            hard_interval_factor: 0.8,
            easy_interval_factor: 1.3,
            fuzz_enabled: true,
            fuzz_ratio: 0.05,
        }
    }
}

/// Probability of recall after `elapsed_days` for a memory of the given
/// stability.
pub fn retrievability(stability: f64, elapsed_days: f64) -> f64 {
    if stability <= 0.0 {
        return 0.0;
    }
    let safe_elapsed = elapsed_days.max(0.0);
    (1.0 + FACTOR * safe_elapsed / stability).powf(DECAY)
}

/// Computes the next memory state and due date for one review.
///
/// Deterministic for identical inputs when fuzz is disabled; the fuzz,
/// when enabled, draws only from the injected `rng`.
pub fn schedule(
    prev: &MemoryState,
    rating: Rating,
    now: DateTime<Utc>,
    config: &SchedulerConfig,
    rng: &mut impl Rng,
) -> ScheduleOutcome {
    let elapsed_days = match prev.last_reviewed_at {
        Some(last) => ((now - last).num_milliseconds() as f64 / 86_400_000.0).max(MIN_ELAPSED_DAYS),
        None => 0.0,
    };

    let (next, interval_days, r) = match prev.state {
        CardState::New => schedule_new(prev, rating, config),
        CardState::Learning => schedule_learning(prev, rating, elapsed_days, config),
        CardState::Review => schedule_review(prev, rating, elapsed_days, config),
        CardState::Relearning => schedule_relearning(prev, rating, elapsed_days, config),
    };

    let interval_days = apply_fuzz(interval_days, config, rng);

    let state = MemoryState {
        due_at: now + duration_from_days(interval_days),
        last_reviewed_at: Some(now),
        stability: next.stability.max(MIN_STABILITY),
        ..next
    };

    ScheduleOutcome {
        state,
        interval_days,
        elapsed_days,
        retrievability: r,
    }
}

fn schedule_new(
    prev: &MemoryState,
    rating: Rating,
    config: &SchedulerConfig,
) -> (MemoryState, f64, f64) {
    let w = &config.weights;
    let stability = initial_stability(w, rating);
    let difficulty = initial_difficulty(w, rating);

    let (state, interval) = match rating {
        Rating::Again => (CardState::Learning, config.learning_steps_minutes[0] * MINUTE_DAYS),
        Rating::Hard => (CardState::Learning, config.learning_steps_minutes[1] * MINUTE_DAYS),
        Rating::Good => (CardState::Learning, config.learning_steps_minutes[2] * MINUTE_DAYS),
        // Easy graduates immediately to day-scale review.
        Rating::Easy => (
            CardState::Review,
            graduated_interval(stability, rating, config),
        ),
    };

    (
        MemoryState {
            state,
            stability,
            difficulty,
            reps: prev.reps + 1,
            lapses: prev.lapses,
            due_at: prev.due_at,
            last_reviewed_at: prev.last_reviewed_at,
        },
        interval,
        1.0,
    )
}

fn schedule_learning(
    prev: &MemoryState,
    rating: Rating,
    elapsed_days: f64,
    config: &SchedulerConfig,
) -> (MemoryState, f64, f64) {
    let w = &config.weights;
    let r = retrievability(prev.stability, elapsed_days);
    let difficulty = next_difficulty(w, prev.difficulty, rating);

    match rating {
        Rating::Again | Rating::Hard => {
            let stability = if rating == Rating::Again {
                next_forget_stability(w, prev.difficulty, prev.stability, r)
            } else {
                prev.stability
            };
            let step = match rating {
                Rating::Again => config.learning_steps_minutes[0],
                _ => config.learning_steps_minutes[1],
            };
            (
                MemoryState {
                    state: CardState::Learning,
                    stability,
                    difficulty,
                    reps: prev.reps + 1,
                    lapses: prev.lapses,
                    due_at: prev.due_at,
                    last_reviewed_at: prev.last_reviewed_at,
                },
                step * MINUTE_DAYS,
                r,
            )
        }
        Rating::Good | Rating::Easy => {
            let stability =
                next_recall_stability(w, prev.difficulty, prev.stability, r, rating);
            let interval = graduated_interval(stability, rating, config);
            (
                MemoryState {
                    state: CardState::Review,
                    stability,
                    difficulty,
                    reps: prev.reps + 1,
                    lapses: prev.lapses,
                    due_at: prev.due_at,
                    last_reviewed_at: prev.last_reviewed_at,
                },
                interval,
                r,
            )
        }
    }
}

fn schedule_review(
    prev: &MemoryState,
    rating: Rating,
    elapsed_days: f64,
    config: &SchedulerConfig,
) -> (MemoryState, f64, f64) {
    let w = &config.weights;
    let r = retrievability(prev.stability, elapsed_days);
    let difficulty = next_difficulty(w, prev.difficulty, rating);

    if rating == Rating::Again {
        // Lapse: back to relearning with a penalized stability and a
        // minutes-scale due interval.
        let stability = next_forget_stability(w, prev.difficulty, prev.stability, r);
        return (
            MemoryState {
                state: CardState::Relearning,
                stability,
                difficulty,
                reps: prev.reps + 1,
                lapses: prev.lapses + 1,
                due_at: prev.due_at,
                last_reviewed_at: prev.last_reviewed_at,
            },
            config.relearning_steps_minutes[0] * MINUTE_DAYS,
            r,
        );
    }

    let stability = next_recall_stability(w, prev.difficulty, prev.stability, r, rating);
    let interval = graduated_interval(stability, rating, config);

    (
        MemoryState {
            state: CardState::Review,
            stability,
            difficulty,
            reps: prev.reps + 1,
            lapses: prev.lapses,
            due_at: prev.due_at,
            last_reviewed_at: prev.last_reviewed_at,
        },
        interval,
        r,
    )
}

fn schedule_relearning(
    prev: &MemoryState,
    rating: Rating,
    elapsed_days: f64,
    config: &SchedulerConfig,
) -> (MemoryState, f64, f64) {
    let w = &config.weights;
    let r = retrievability(prev.stability, elapsed_days);
    let difficulty = next_difficulty(w, prev.difficulty, rating);

    match rating {
        Rating::Again | Rating::Hard => {
            let (stability, lapses) = if rating == Rating::Again {
                (
                    next_forget_stability(w, prev.difficulty, prev.stability, r),
                    prev.lapses + 1,
                )
            } else {
                (prev.stability, prev.lapses)
            };
            let step = match rating {
                Rating::Again => config.relearning_steps_minutes[0],
                _ => config.relearning_steps_minutes[1],
            };
            (
                MemoryState {
                    state: CardState::Relearning,
                    stability,
                    difficulty,
                    reps: prev.reps + 1,
                    lapses,
                    due_at: prev.due_at,
                    last_reviewed_at: prev.last_reviewed_at,
                },
                step * MINUTE_DAYS,
                r,
            )
        }
        Rating::Good | Rating::Easy => {
            let stability =
                next_recall_stability(w, prev.difficulty, prev.stability, r, rating);
            let interval = graduated_interval(stability, rating, config);
            (
                MemoryState {
                    state: CardState::Review,
                    stability,
                    difficulty,
                    reps: prev.reps + 1,
                    lapses: prev.lapses,
                    due_at: prev.due_at,
                    last_reviewed_at: prev.last_reviewed_at,
                },
                interval,
                r,
            )
        }
    }
}

fn initial_stability(w: &[f64; 17], rating: Rating) -> f64 {
    w[(rating.as_i64() - 1) as usize].max(MIN_STABILITY)
}

fn initial_difficulty(w: &[f64; 17], rating: Rating) -> f64 {
    let d = w[4] - (rating.as_i64() - 3) as f64 * w[5];
    d.clamp(MIN_DIFFICULTY, MAX_DIFFICULTY)
}

fn next_difficulty(w: &[f64; 17], d: f64, rating: Rating) -> f64 {
    let delta = -(rating.as_i64() - 3) as f64;
    let d_new = d + w[6] * delta;
    let d_mean = w[7] * (w[4] - 3.0 * w[5]) + (1.0 - w[7]) * d_new;
    d_mean.clamp(MIN_DIFFICULTY, MAX_DIFFICULTY)
}

fn next_recall_stability(w: &[f64; 17], d: f64, s: f64, r: f64, rating: Rating) -> f64 {
    let hard_penalty = if rating == Rating::Hard { w[15] } else { 1.0 };
    let easy_bonus = if rating == Rating::Easy { w[16] } else { 1.0 };

    let new_s = s
        * (1.0
            + w[8].exp()
                * (11.0 - d)
                * s.powf(-w[9])
                * ((1.0 - r) * w[10]).exp_m1()
                * hard_penalty
                * easy_bonus);
    new_s.max(MIN_STABILITY)
}

fn next_forget_stability(w: &[f64; 17], d: f64, s: f64, r: f64) -> f64 {
    let new_s =
        w[11] * d.powf(-w[12]) * ((s + 1.0).powf(w[13]) - 1.0) * ((1.0 - r) * w[14]).exp();
    new_s.clamp(MIN_STABILITY, s)
}

fn stability_interval(stability: f64, config: &SchedulerConfig) -> f64 {
    let safe_retention = config.desired_retention.clamp(0.0001, 0.9999);
    let interval = stability / FACTOR * (safe_retention.powf(1.0 / DECAY) - 1.0);
    interval.clamp(config.min_interval_days, config.max_interval_days)
}

/// Day-scale interval for a card entering (or staying in) Review. The
/// rating factors apply after the min-interval clamp so the strict
/// interval ordering Again < Hard < Good < Easy never collapses.
fn graduated_interval(stability: f64, rating: Rating, config: &SchedulerConfig) -> f64 {
    let base = stability_interval(stability, config);
    let factored = match rating {
        Rating::Hard => base * config.hard_interval_factor,
        Rating::Easy => base * config.easy_interval_factor,
        _ => base,
    };
    factored.min(config.max_interval_days)
}

fn apply_fuzz(interval_days: f64, config: &SchedulerConfig, rng: &mut impl Rng) -> f64 {
    if !config.fuzz_enabled || interval_days < 2.5 {
        return interval_days;
    }
    let ratio = config.fuzz_ratio.clamp(0.0, 0.2);
    if ratio == 0.0 {
        return interval_days;
    }
    let factor = rng.random_range(1.0 - ratio..=1.0 + ratio);
    (interval_days * factor).min(config.max_interval_days)
}

fn duration_from_days(days: f64) -> Duration {
    Duration::milliseconds((days * 86_400_000.0).round() as i64)
}
