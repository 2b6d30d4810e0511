//! Integration tests for trend signals, changepoints, crossovers and forecasts

mod common;

use common::papers_with_counts;
use proptest::prelude::*;
use trendscope::analytics::{
    detect_crossovers, detect_series_crossovers, ChangepointDetector, ChangepointType,
    ForecastResponse, Forecaster, Granularity, SignalBuilder, TimeSeries, TopicMode,
};
use trendscope::config::ChangepointConfig;

#[test]
fn test_signals_share_one_period_index() {
    let mut papers = papers_with_counts("cs.LG", &[1, 0, 2, 3]);
    papers.extend(papers_with_counts("cs.DB", &[0, 0, 1]));

    let signals = SignalBuilder::new(Granularity::Month, TopicMode::PrimaryCategory).build(&papers);
    assert_eq!(signals.len(), 2);
    assert_eq!(signals["cs.LG"].values, vec![1.0, 0.0, 2.0, 3.0]);
    assert_eq!(signals["cs.DB"].values, vec![0.0, 0.0, 1.0, 0.0]);
    assert_eq!(signals["cs.LG"].periods, signals["cs.DB"].periods);
}

#[test]
fn test_explosion_found_end_to_end() {
    let mut counts = vec![2usize; 20];
    counts.extend(vec![9usize; 20]);
    let papers = papers_with_counts("cs.AI", &counts);

    let series = SignalBuilder::default().build_topic(&papers, "cs.AI").unwrap();
    let cps = ChangepointDetector::default().detect_series(&series);
    assert_eq!(cps.len(), 1);
    assert_eq!(cps[0].index, 20);
    assert_eq!(cps[0].kind, ChangepointType::Explosion);
    assert_eq!(cps[0].date, series.periods[20]);
}

#[test]
fn test_paradigm_shift_between_topics() {
    let mut papers = papers_with_counts("old", &[5, 5, 4, 2, 1, 1]);
    papers.extend(papers_with_counts("new", &[1, 1, 3, 4, 6, 8]));

    let signals = SignalBuilder::default().build(&papers);
    let events = detect_series_crossovers("old", &signals["old"], "new", &signals["new"]);
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].winner_id, "new");
    assert_eq!(events[0].loser_id, "old");
    assert_eq!(events[0].index, 2);
    assert_eq!(events[0].magnitude, 2.0);
}

#[test]
fn test_forecast_short_series_reports_insufficient_data() {
    let papers = papers_with_counts("cs.CL", &[1, 2, 3, 4, 5]);
    let series = SignalBuilder::default().build_topic(&papers, "cs.CL").unwrap();

    let response = ForecastResponse::from(Forecaster::default().forecast(&series, None));
    let json = serde_json::to_value(&response).unwrap();
    assert_eq!(json, serde_json::json!({ "error": "Insufficient data" }));
}

#[test]
fn test_forecast_json_shape() {
    let counts: Vec<usize> = (0..36).map(|t| 3 + t / 6 + (t % 12) / 4).collect();
    let papers = papers_with_counts("cs.CV", &counts);
    let series = SignalBuilder::default().build_topic(&papers, "cs.CV").unwrap();

    let response = ForecastResponse::from(Forecaster::default().forecast(&series, Some(6)));
    let json = serde_json::to_value(&response).unwrap();
    assert_eq!(json["future_dates"].as_array().unwrap().len(), 6);
    assert_eq!(json["forecast_values"].as_array().unwrap().len(), 6);
    assert!(json["fitted_params"]["alpha"].is_number());
}

proptest! {
    #[test]
    fn prop_changepoints_increasing_and_in_bounds(values in prop::collection::vec(0.0f64..50.0, 0..80)) {
        let series = TimeSeries::from_values(
            Granularity::Month,
            common::month(0),
            values.clone(),
        );
        let detector = ChangepointDetector::new(ChangepointConfig::default());
        let cps = detector.detect_series(&series);

        for cp in &cps {
            prop_assert!(cp.index > 0 && cp.index < values.len());
            prop_assert!(cp.p_value < 0.05);
            prop_assert_eq!(cp.date, series.periods[cp.index]);
        }
        for pair in cps.windows(2) {
            prop_assert!(pair[0].index < pair[1].index);
        }
    }

    #[test]
    fn prop_crossover_magnitudes_non_negative(
        pairs in prop::collection::vec((-20.0f64..20.0, -20.0f64..20.0), 0..40)
    ) {
        let (a, b): (Vec<f64>, Vec<f64>) = pairs.into_iter().unzip();
        let dates = TimeSeries::from_values(Granularity::Year, common::month(0), vec![0.0; a.len()]).periods;
        let events = detect_crossovers(&dates, "a", &a, "b", &b);

        for event in &events {
            prop_assert!(event.magnitude >= 0.0);
            prop_assert!(event.index + 1 < a.len());
            prop_assert_ne!(&event.winner_id, &event.loser_id);
        }
    }

    #[test]
    fn prop_forecast_rejects_fewer_than_one_season(values in prop::collection::vec(0.0f64..10.0, 0..12)) {
        let result = Forecaster::default().forecast_values(&values, 12);
        prop_assert!(result.is_err());
    }
}
