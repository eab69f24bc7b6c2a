//! Property tests for feature building and chronological splits.
//!
//! Uses proptest to verify:
//! 1. Row count: `bars - warmup - horizon` labeled rows, dates strictly increasing
//! 2. Split coverage: train + test = all rows, both non-empty, train precedes test

use chrono::{Duration, NaiveDate};
use movelab_runner::{train_test_split, Bar, FeatureBuilder, OhlcvFeatures};
use proptest::prelude::*;

fn arb_bars() -> impl Strategy<Value = Vec<Bar>> {
    prop::collection::vec((-0.05..0.05_f64, 0.0..0.03_f64, 1.0e3..1.0e7_f64), 22..120).prop_map(
        |steps| {
            let start = NaiveDate::from_ymd_opt(2020, 1, 1).unwrap();
            let mut close = 50.0;
            steps
                .into_iter()
                .enumerate()
                .map(|(i, (ret, spread, volume))| {
                    let open = close;
                    close = open * (1.0 + ret);
                    Bar {
                        date: start + Duration::days(i as i64),
                        open,
                        high: open.max(close) * (1.0 + spread),
                        low: open.min(close) * (1.0 - spread),
                        close,
                        volume,
                    }
                })
                .collect()
        },
    )
}

proptest! {
    #[test]
    fn feature_rows_match_bar_count(bars in arb_bars(), horizon in 1usize..3) {
        let builder = OhlcvFeatures::new(horizon);
        let data = builder.build(&bars).unwrap();
        prop_assert_eq!(data.len(), bars.len() - builder.warmup() - horizon);
        prop_assert_eq!(data.x.n_rows(), data.len());
        prop_assert!(data.dates.windows(2).all(|w| w[0] < w[1]));
    }

    #[test]
    fn split_covers_all_rows_in_order(bars in arb_bars(), fraction in 0.05..0.5_f64) {
        let data = OhlcvFeatures::default().build(&bars).unwrap();
        let split = train_test_split(&data, fraction).unwrap();
        prop_assert_eq!(split.train.len() + split.test.len(), data.len());
        prop_assert!(!split.train.is_empty() && !split.test.is_empty());
        prop_assert!(split.train.last_date().unwrap() < split.test.first_date().unwrap());
    }
}
