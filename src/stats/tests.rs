//! Accumulator tests - streaming formulas, reset semantics and buffer growth
//!
//! Test suite organized by component:
//! - EWMA: first-sample identity, decay and the in-flight gauge
//! - Interval: incremental mean, typed min/max and plain increments
//! - Buffer: validation, growth, overruns, reset and release

use super::*;
use crate::config::EngineConfig;
use crate::engine::Engine;
use crate::reclaim::Reclaimable;
use crate::sync::Unsynchronized;
use once_cell::sync::Lazy;
use proptest::prelude::*;
use std::sync::Arc;
use std::thread;

static ENGINE: Lazy<Engine> = Lazy::new(|| Engine::new(EngineConfig::default()).unwrap());

fn isolated() -> Engine {
    Engine::new(EngineConfig::default()).unwrap()
}

fn close(a: f64, b: f64) -> bool {
    (a - b).abs() <= 1e-9 * a.abs().max(b.abs()).max(1.0)
}

#[cfg(test)]
mod ewma_tests {
    use super::*;

    #[test]
    fn first_sample_sets_every_statistic() {
        let ewma = ConcurrentEwma::new_in(&ENGINE, 1_000).unwrap();
        assert!(ewma.is_empty());

        ewma.append_at(5.0, 10_000);

        assert_eq!(ewma.average(), 5.0);
        assert_eq!(ewma.minimum(), 5.0);
        assert_eq!(ewma.maximum(), 5.0);
        assert_eq!(ewma.mean(), 5.0);
        assert_eq!(ewma.count(), 1);
        assert_eq!(ewma.last_sample(), 10_000);
    }

    #[test]
    fn later_samples_decay_by_elapsed_time() {
        let ewma = ConcurrentEwma::new_in(&ENGINE, 1_000).unwrap();
        ewma.append_at(0.0, 5_000);
        ewma.append_at(10.0, 6_000);

        let coeff = (-1.0f64).exp();
        assert!(close(ewma.average(), (1.0 - coeff) * 10.0));
        assert_eq!(ewma.minimum(), 0.0);
        assert_eq!(ewma.maximum(), 10.0);
        assert_eq!(ewma.mean(), 5.0);
        assert_eq!(ewma.count(), 2);
    }

    #[test]
    fn same_instant_sample_keeps_average() {
        let ewma = DirectEwma::new_in(&ENGINE, 1_000).unwrap();
        ewma.append_at(4.0, 100);
        ewma.append_at(100.0, 100);

        assert_eq!(ewma.average(), 4.0);
        assert_eq!(ewma.mean(), 52.0);
    }

    #[test]
    fn zero_window_follows_latest_sample() {
        assert_eq!(decay(10, 0), 0.0);

        let ewma = DirectEwma::new_in(&ENGINE, 0).unwrap();
        ewma.append_at(1.0, 1);
        ewma.append_at(9.0, 2);
        assert_eq!(ewma.average(), 9.0);
    }

    #[test]
    fn reset_keeps_window_and_restarts() {
        let ewma = ConcurrentEwma::new_in(&ENGINE, 250).unwrap();
        for (i, v) in [3.0, 8.0, -2.0].into_iter().enumerate() {
            ewma.append_at(v, i as u64 * 10);
        }
        ewma.error();

        ewma.reset();
        assert_eq!(ewma.window(), 250);
        assert_eq!(ewma.count(), 0);
        assert_eq!(ewma.errors(), 0);

        ewma.append_at(7.0, 1_000);
        let s = ewma.snapshot();
        assert_eq!((s.average, s.minimum, s.maximum, s.mean), (7.0, 7.0, 7.0, 7.0));
        assert_eq!(s.count, 1);
    }

    #[test]
    fn errors_are_counted_apart_from_samples() {
        let ewma = ConcurrentEwma::new_in(&ENGINE, 100).unwrap();
        assert_eq!(ewma.error(), 1);
        assert_eq!(ewma.error(), 2);
        assert_eq!(ewma.count(), 0);
        assert_eq!(ewma.errors(), 2);
    }

    #[test]
    fn concurrency_gauge_never_negative() {
        let ewma = DirectEwma::new_in(&ENGINE, 100).unwrap();
        assert_eq!(ewma.enter(), 1);
        assert_eq!(ewma.enter(), 2);
        assert_eq!(ewma.exit(), 1);
        assert_eq!(ewma.exit(), 0);
        assert_eq!(ewma.exit(), 0);
    }

    #[test]
    fn snapshot_serializes_to_json() {
        let ewma = ConcurrentEwma::new_in(&ENGINE, 60_000).unwrap();
        ewma.append_at(2.5, 42);

        let json = ewma.to_json().unwrap();
        let back: EwmaSnapshot = serde_json::from_str(&json).unwrap();
        assert_eq!(back, ewma.snapshot());
        assert!(json.contains("\"window\":60000"));
    }

    #[test]
    fn concurrent_appends_are_all_counted() {
        let ewma = Arc::new(ConcurrentEwma::new_in(&ENGINE, 1_000).unwrap());

        let handles: Vec<_> = (0..4)
            .map(|t| {
                let ewma = Arc::clone(&ewma);
                thread::spawn(move || {
                    for i in 0..2_500 {
                        ewma.append(f64::from(t * 2_500 + i));
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(ewma.count(), 10_000);
        assert_eq!(ewma.minimum(), 0.0);
        assert_eq!(ewma.maximum(), 9_999.0);
        assert!(close(ewma.mean(), 4_999.5));
    }

    #[test]
    fn variant_is_visible_at_runtime() {
        assert!(ConcurrentEwma::new_in(&ENGINE, 1).unwrap().is_concurrent());
        assert!(!DirectEwma::new_in(&ENGINE, 1).unwrap().is_concurrent());
    }

    proptest! {
        #[test]
        fn prop_average_stays_within_bounds(
            samples in prop::collection::vec((-1e6f64..1e6, 0u64..5_000), 1..64),
            window in 1u64..10_000,
        ) {
            let ewma = DirectEwma::new_in(&ENGINE, window).unwrap();
            let mut now = 0;
            for (value, gap) in samples {
                now += gap;
                ewma.append_at(value, now);
                let s = ewma.snapshot();
                prop_assert!(s.minimum <= s.average + 1e-6);
                prop_assert!(s.average <= s.maximum + 1e-6);
            }
        }
    }
}

#[cfg(test)]
mod interval_tests {
    use super::*;

    #[test]
    fn bounds_are_absent_before_first_sample() {
        let acc = ConcurrentIntervalAccumulator::<i64>::new_in(&ENGINE, 7).unwrap();
        assert_eq!(acc.id(), 7);
        assert_eq!(acc.kind(), SampleKind::Long);
        assert_eq!(acc.min(), None);
        assert_eq!(acc.max(), None);
        assert_eq!(acc.mean(), 0.0);
    }

    #[test]
    fn long_samples_track_min_max_mean() {
        let acc = IntervalAccumulator::<i64>::new_in(&ENGINE, 1).unwrap();
        for v in [5, -3, 12, 2] {
            acc.append_at(v, 99);
        }

        assert_eq!(acc.count(), 4);
        assert_eq!(acc.min(), Some(-3));
        assert_eq!(acc.max(), Some(12));
        assert_eq!(acc.mean(), 4.0);
        assert_eq!(acc.last_time(), 99);
    }

    #[test]
    fn extreme_values_win_first_comparison() {
        let acc = IntervalAccumulator::<i64>::new_in(&ENGINE, 1).unwrap();
        acc.append(i64::MAX);
        assert_eq!(acc.min(), Some(i64::MAX));
        assert_eq!(acc.max(), Some(i64::MAX));

        acc.reset();
        acc.append(i64::MIN);
        assert_eq!(acc.min(), Some(i64::MIN));
        assert_eq!(acc.max(), Some(i64::MIN));
    }

    #[test]
    fn increment_counts_without_sampling() {
        let acc = ConcurrentIntervalAccumulator::<f64>::new_in(&ENGINE, 2).unwrap();
        acc.append(3.0);
        assert_eq!(acc.increment(4), 5);

        assert_eq!(acc.count(), 5);
        assert_eq!(acc.samples(), 1);
        assert_eq!(acc.mean(), 3.0);

        acc.append(5.0);
        assert_eq!(acc.mean(), 4.0);
    }

    #[test]
    fn increment_saturates_at_counter_limit() {
        let acc = IntervalAccumulator::<i64>::new_in(&ENGINE, 6).unwrap();
        acc.append(1);
        assert_eq!(acc.increment(u64::MAX), u64::MAX);
        assert_eq!(acc.increment(u64::MAX), u64::MAX);

        acc.append(3);
        assert_eq!(acc.count(), u64::MAX);
        assert_eq!(acc.samples(), 2);
        assert_eq!(acc.mean(), 2.0);
    }

    #[test]
    fn reset_restores_first_append_behavior() {
        let acc = ConcurrentIntervalAccumulator::<f64>::new_in(&ENGINE, 3).unwrap();
        for v in [1.0, 100.0, -50.0] {
            acc.append(v);
        }

        acc.reset();
        assert_eq!(acc.count(), 0);
        assert_eq!(acc.min(), None);

        acc.append(0.25);
        assert_eq!(acc.min(), Some(0.25));
        assert_eq!(acc.max(), Some(0.25));
        assert_eq!(acc.mean(), 0.25);
        assert_eq!(acc.id(), 3);
    }

    #[test]
    fn snapshot_carries_type_tag() {
        let acc = ConcurrentIntervalAccumulator::<f64>::new_in(&ENGINE, 9).unwrap();
        acc.append_at(1.5, 10);

        let json = acc.to_json().unwrap();
        assert!(json.contains("\"kind\":\"double\""));
        assert!(json.contains("\"min\":1.5"));

        let empty = IntervalAccumulator::<i64>::new_in(&ENGINE, 9).unwrap();
        assert!(empty.to_json().unwrap().contains("\"max\":null"));
    }

    #[test]
    fn unsynchronized_accumulator_moves_between_threads() {
        let acc = IntervalAccumulator::<i64>::new_in(&ENGINE, 4).unwrap();
        let acc = thread::spawn(move || {
            acc.append(10);
            acc
        })
        .join()
        .unwrap();

        acc.append(20);
        assert_eq!(acc.mean(), 15.0);
    }

    #[test]
    fn concurrent_accumulator_counts_every_append() {
        let acc = Arc::new(ConcurrentIntervalAccumulator::<i64>::new_in(&ENGINE, 5).unwrap());

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let acc = Arc::clone(&acc);
                thread::spawn(move || {
                    for v in 1..=1_000 {
                        acc.append(v);
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(acc.count(), 8_000);
        assert_eq!(acc.min(), Some(1));
        assert_eq!(acc.max(), Some(1_000));
        assert!(close(acc.mean(), 500.5));
    }

    proptest! {
        #[test]
        fn prop_mean_matches_arithmetic_mean(values in prop::collection::vec(-1e9f64..1e9, 1..200)) {
            let acc = IntervalAccumulator::<f64>::new_in(&ENGINE, 0).unwrap();
            for &v in &values {
                acc.append(v);
            }

            let expected = values.iter().sum::<f64>() / values.len() as f64;
            prop_assert!((acc.mean() - expected).abs() <= 1e-6 * expected.abs().max(1.0));
            prop_assert_eq!(acc.count(), values.len() as u64);
        }

        #[test]
        fn prop_long_bounds_match_iterator(values in prop::collection::vec(any::<i64>(), 1..100)) {
            let acc = IntervalAccumulator::<i64>::new_in(&ENGINE, 0).unwrap();
            for &v in &values {
                acc.append(v);
            }

            prop_assert_eq!(acc.min(), values.iter().copied().min());
            prop_assert_eq!(acc.max(), values.iter().copied().max());
        }
    }
}

#[cfg(test)]
mod buffer_tests {
    use super::*;
    use crate::error::ConfigError;

    #[test]
    fn spec_validation() {
        assert!(matches!(BufferSpec::new(8, 4, 4), Err(ConfigError::InvalidBuffer(_))));
        assert!(matches!(BufferSpec::new(2, 0, 8), Err(ConfigError::InvalidBuffer(_))));

        let fixed = BufferSpec::new(4, 0, 4).unwrap();
        assert!(!fixed.can_grow());
        assert_eq!(fixed, BufferSpec::fixed(4));

        let growing = BufferSpec::new(0, 3, 9).unwrap();
        assert!(growing.can_grow());
        assert_eq!(growing.extended(6), Some(9));
        assert_eq!(growing.extended(7), None);
    }

    #[test]
    fn deserialized_spec_is_validated() {
        let shrinking = serde_json::from_str::<BufferSpec>(
            r#"{"initial_size":8,"extend_size":0,"max_size":2}"#,
        );
        assert!(shrinking.is_err());

        let stuck = serde_json::from_str::<BufferSpec>(
            r#"{"initial_size":2,"extend_size":0,"max_size":8}"#,
        );
        assert!(stuck.is_err());

        let spec: BufferSpec =
            serde_json::from_str(r#"{"initial_size":2,"extend_size":2,"max_size":8}"#).unwrap();
        assert_eq!(spec, BufferSpec::new(2, 2, 8).unwrap());
        assert!(spec.reset_to_initial());

        let fixed: BufferSpec = serde_json::from_str(
            r#"{"initial_size":4,"max_size":4,"reset_to_initial":false}"#,
        )
        .unwrap();
        assert_eq!(fixed, BufferSpec::fixed(4).with_reset_to_initial(false));
    }

    #[test]
    fn serialized_spec_round_trips() {
        let spec = BufferSpec::new(1, 3, 10).unwrap().with_reset_to_initial(false);
        let json = serde_json::to_string(&spec).unwrap();
        assert_eq!(serde_json::from_str::<BufferSpec>(&json).unwrap(), spec);
        assert_eq!((spec.initial_size(), spec.extend_size(), spec.max_size()), (1, 3, 10));
    }

    #[test]
    fn appends_return_consecutive_indices() {
        let buffer = LongBuffer::new_in(&ENGINE, BufferSpec::new(2, 2, 6).unwrap()).unwrap();

        let indices: Vec<_> = (0..6)
            .map(|v| buffer.append(v * 10).unwrap().index())
            .collect();

        assert_eq!(indices, (0..6).map(Some).collect::<Vec<_>>());
        assert_eq!(buffer.to_vec(), vec![0, 10, 20, 30, 40, 50]);
        assert_eq!(buffer.capacity(), 6);
        assert_eq!(buffer.get(5), Some(50));
        assert_eq!(buffer.get(6), None);
    }

    #[test]
    fn full_buffer_counts_overruns() {
        let buffer = LongBuffer::new_in(&ENGINE, BufferSpec::new(1, 2, 4).unwrap()).unwrap();
        for v in 0..3 {
            assert!(!buffer.append(v).unwrap().is_overrun());
        }

        // 3 + 2 > 4: cannot extend again
        assert_eq!(buffer.capacity(), 3);
        assert_eq!(buffer.append(99).unwrap(), Appended::Overrun);
        assert_eq!(buffer.append(99).unwrap(), Appended::Overrun);

        assert_eq!(buffer.len(), 3);
        assert_eq!(buffer.overruns(), 2);
        assert_eq!(buffer.to_vec(), vec![0, 1, 2]);
    }

    #[test]
    fn zero_sized_fixed_buffer_always_overruns() {
        let buffer = LongBuffer::new_in(&ENGINE, BufferSpec::fixed(0)).unwrap();
        assert!(buffer.is_empty());
        assert!(buffer.append(1).unwrap().is_overrun());
        assert_eq!(buffer.overruns(), 1);
        assert!(buffer.to_vec().is_empty());
    }

    #[test]
    fn reset_shrinks_to_initial_and_truncates() {
        let buffer = LongBuffer::new_in(&ENGINE, BufferSpec::new(2, 3, 20).unwrap()).unwrap();
        for v in 0..7 {
            let _ = buffer.append(v).unwrap();
        }
        assert_eq!(buffer.capacity(), 8);
        let before = buffer.last_reset();

        buffer.reset().unwrap();

        assert_eq!(buffer.capacity(), 2);
        assert_eq!(buffer.len(), 2);
        assert_eq!(buffer.to_vec(), vec![0, 1]);
        assert!(buffer.last_reset() >= before);
    }

    #[test]
    fn reset_without_flag_keeps_contents() {
        let spec = BufferSpec::new(1, 1, 10).unwrap().with_reset_to_initial(false);
        let buffer = LongBuffer::new_in(&ENGINE, spec).unwrap();
        for v in 0..4 {
            let _ = buffer.append(v).unwrap();
        }

        buffer.reset().unwrap();
        assert_eq!(buffer.capacity(), 4);
        assert_eq!(buffer.len(), 4);

        buffer.clear().unwrap();
        assert_eq!(buffer.capacity(), 4);
        assert!(buffer.is_empty());
    }

    #[test]
    fn clear_empties_and_keeps_overruns() {
        let buffer = LongBuffer::new_in(&ENGINE, BufferSpec::new(1, 1, 2).unwrap()).unwrap();
        for v in 0..3 {
            let _ = buffer.append(v).unwrap();
        }
        assert_eq!(buffer.overruns(), 1);

        buffer.clear().unwrap();
        assert!(buffer.is_empty());
        assert_eq!(buffer.capacity(), 1);
        assert_eq!(buffer.overruns(), 1);
        assert_eq!(buffer.append(5).unwrap(), Appended::Stored(0));
    }

    #[test]
    fn growth_keeps_data_slot_current() {
        let buffer = LongBuffer::new_in(&ENGINE, BufferSpec::new(1, 64, 1 << 16).unwrap()).unwrap();
        for v in 0..1_000 {
            let _ = buffer.append(v).unwrap();
        }

        assert_eq!(buffer.address_table().get(1), buffer.data_address());
        assert_eq!(buffer.to_vec(), (0..1_000).collect::<Vec<i64>>());
    }

    #[test]
    fn non_long_elements_round_trip() {
        let buffer: GrowableBuffer<(u32, f32), Unsynchronized> =
            GrowableBuffer::new_in(&ENGINE, BufferSpec::new(0, 1, 3).unwrap()).unwrap();
        let _ = buffer.append((1, 0.5)).unwrap();
        let _ = buffer.append((2, 1.5)).unwrap();
        assert_eq!(buffer.to_vec(), vec![(1, 0.5), (2, 1.5)]);
    }

    #[test]
    fn dropping_buffer_releases_both_blocks() {
        let engine = isolated();
        let buffer = LongBuffer::new_in(&engine, BufferSpec::new(4, 4, 64).unwrap()).unwrap();
        for v in 0..20 {
            let _ = buffer.append(v).unwrap();
        }
        assert_eq!(engine.stats().live_allocation_count, 2);

        drop(buffer);
        engine.flush();

        let stats = engine.stats();
        assert_eq!(stats.live_allocation_count, 0);
        assert_eq!(stats.total_bytes, 0);
        assert_eq!(stats.pending_reclamation_count, 0);
        assert_eq!(engine.reclaim_stats().reclaimed, 1);
    }

    #[test]
    fn stats_serialize() {
        let buffer = LongBuffer::new_in(&ENGINE, BufferSpec::fixed(2)).unwrap();
        let _ = buffer.append(1).unwrap();

        let json = serde_json::to_string(&buffer.stats()).unwrap();
        assert!(json.contains("\"size\":1"));
        assert!(json.contains("\"initial_size\":2"));
    }

    proptest! {
        #[test]
        fn prop_size_never_exceeds_capacity_or_max(
            initial in 0usize..8,
            extend in 1usize..5,
            extra in 0usize..16,
            appends in 0usize..64,
        ) {
            let spec = BufferSpec::new(initial, extend, initial + extra).unwrap();
            let buffer = LongBuffer::new_in(&ENGINE, spec).unwrap();

            for v in 0..appends {
                let before = buffer.stats();
                let full = before.size == before.capacity
                    && before.capacity + extend > spec.max_size();

                let outcome = buffer.append(v as i64).unwrap();
                let after = buffer.stats();

                prop_assert!(after.size <= after.capacity);
                prop_assert!(after.capacity <= spec.max_size());
                if full {
                    prop_assert_eq!(outcome, Appended::Overrun);
                    prop_assert_eq!(after.size, before.size);
                    prop_assert_eq!(after.overruns, before.overruns + 1);
                } else {
                    prop_assert_eq!(outcome, Appended::Stored(before.size));
                }
            }
        }
    }
}
