//! Property tests for the pure scheduling model.

use chrono::{Duration, TimeZone, Utc};
use proptest::prelude::*;
use rand::rngs::StdRng;
use rand::SeedableRng;

use lingua_trip_backend::services::scheduler::{
    retrievability, schedule, CardState, MemoryState, Rating, SchedulerConfig,
};

fn config() -> SchedulerConfig {
    SchedulerConfig {
        fuzz_enabled: false,
        ..SchedulerConfig::default()
    }
}

fn rating_strategy() -> impl Strategy<Value = Rating> {
    prop_oneof![
        Just(Rating::Again),
        Just(Rating::Hard),
        Just(Rating::Good),
        Just(Rating::Easy),
    ]
}

fn state_strategy() -> impl Strategy<Value = CardState> {
    prop_oneof![
        Just(CardState::New),
        Just(CardState::Learning),
        Just(CardState::Review),
        Just(CardState::Relearning),
    ]
}

fn memory_strategy() -> impl Strategy<Value = MemoryState> {
    (
        state_strategy(),
        0.1f64..200.0,
        1.0f64..10.0,
        0i64..500,
        0i64..50,
        0i64..3650,
    )
        .prop_map(|(state, stability, difficulty, reps, lapses, age_days)| {
            let now = Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).unwrap();
            let last_reviewed_at = if state == CardState::New {
                None
            } else {
                Some(now - Duration::days(age_days))
            };
            MemoryState {
                state,
                stability,
                difficulty,
                reps,
                lapses,
                due_at: now,
                last_reviewed_at,
            }
        })
}

proptest! {
    #[test]
    fn schedule_always_produces_valid_state(prev in memory_strategy(), rating in rating_strategy()) {
        let now = Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).unwrap();
        let out = schedule(&prev, rating, now, &config(), &mut StdRng::seed_from_u64(0));

        prop_assert!(out.state.stability > 0.0);
        prop_assert!(out.state.difficulty >= 1.0 && out.state.difficulty <= 10.0);
        prop_assert!(out.state.due_at >= now);
        prop_assert_eq!(out.state.last_reviewed_at, Some(now));
        prop_assert_eq!(out.state.reps, prev.reps + 1);
        prop_assert!(out.state.lapses >= prev.lapses);
        prop_assert!(out.interval_days > 0.0);
        prop_assert!((0.0..=1.0).contains(&out.retrievability));
    }

    #[test]
    fn intervals_are_strictly_ordered_by_rating(prev in memory_strategy()) {
        let now = Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).unwrap();
        let cfg = config();
        let intervals: Vec<f64> = [Rating::Again, Rating::Hard, Rating::Good, Rating::Easy]
            .iter()
            .map(|&r| schedule(&prev, r, now, &cfg, &mut StdRng::seed_from_u64(0)).interval_days)
            .collect();

        prop_assert!(intervals[0] < intervals[1], "again {} !< hard {}", intervals[0], intervals[1]);
        prop_assert!(intervals[1] < intervals[2], "hard {} !< good {}", intervals[1], intervals[2]);
        prop_assert!(intervals[2] < intervals[3], "good {} !< easy {}", intervals[2], intervals[3]);
    }

    #[test]
    fn deterministic_without_fuzz(prev in memory_strategy(), rating in rating_strategy(), seed_a in any::<u64>(), seed_b in any::<u64>()) {
        let now = Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).unwrap();
        let cfg = config();
        let a = schedule(&prev, rating, now, &cfg, &mut StdRng::seed_from_u64(seed_a));
        let b = schedule(&prev, rating, now, &cfg, &mut StdRng::seed_from_u64(seed_b));

        prop_assert_eq!(a.interval_days, b.interval_days);
        prop_assert_eq!(a.state.stability, b.state.stability);
        prop_assert_eq!(a.state.due_at, b.state.due_at);
    }

    #[test]
    fn fuzz_stays_within_the_configured_band(stability in 5.0f64..100.0, seed in any::<u64>()) {
        let now = Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).unwrap();
        let fuzzed = SchedulerConfig::default();
        let exact = config();
        let prev = MemoryState {
            state: CardState::Review,
            stability,
            difficulty: 5.0,
            reps: 5,
            lapses: 0,
            due_at: now,
            last_reviewed_at: Some(now - Duration::days(3)),
        };

        let base = schedule(&prev, Rating::Good, now, &exact, &mut StdRng::seed_from_u64(seed));
        let with_fuzz = schedule(&prev, Rating::Good, now, &fuzzed, &mut StdRng::seed_from_u64(seed));

        let lo = base.interval_days * (1.0 - fuzzed.fuzz_ratio) - 1e-9;
        let hi = base.interval_days * (1.0 + fuzzed.fuzz_ratio) + 1e-9;
        prop_assert!(with_fuzz.interval_days >= lo && with_fuzz.interval_days <= hi);
    }

    #[test]
    fn retrievability_is_monotonic_in_elapsed_time(stability in 0.1f64..365.0, t1 in 0.0f64..1000.0, dt in 0.001f64..1000.0) {
        let r1 = retrievability(stability, t1);
        let r2 = retrievability(stability, t1 + dt);
        prop_assert!(r2 < r1);
        prop_assert!((0.0..=1.0).contains(&r1));
    }
}
