//! Tests for config module

use serial_test::serial;
use std::io::Write;
use trendscope::analytics::Granularity;
use trendscope::config::Config;

fn clear_env() {
    for key in [
        "TRENDSCOPE_GRANULARITY",
        "TRENDSCOPE_CHANGEPOINT_PENALTY",
        "TRENDSCOPE_CHANGEPOINT_ALPHA",
        "TRENDSCOPE_FORECAST_HORIZON",
        "TRENDSCOPE_MIN_CLUSTER_SIZE",
        "TRENDSCOPE_SEED",
        "TRENDSCOPE_BETWEENNESS_SAMPLES",
        "TRENDSCOPE_LOG_LEVEL",
        "TRENDSCOPE_LOG_FORMAT",
    ] {
        std::env::remove_var(key);
    }
}

#[test]
#[serial]
fn test_from_env_defaults() {
    clear_env();
    let config = Config::from_env().unwrap();
    assert_eq!(config.changepoint.penalty, 10.0);
    assert_eq!(config.signal.granularity, Granularity::Month);
    assert_eq!(config.logging.format, "text");
    assert!(config.validate().is_ok());
}

#[test]
#[serial]
fn test_from_env_overrides() {
    clear_env();
    std::env::set_var("TRENDSCOPE_GRANULARITY", "yearly");
    std::env::set_var("TRENDSCOPE_CHANGEPOINT_PENALTY", "3.5");
    std::env::set_var("TRENDSCOPE_MIN_CLUSTER_SIZE", "15");
    std::env::set_var("TRENDSCOPE_FORECAST_HORIZON", "not-a-number");

    let config = Config::from_env().unwrap();
    assert_eq!(config.signal.granularity, Granularity::Year);
    assert_eq!(config.changepoint.penalty, 3.5);
    assert_eq!(config.topics.min_cluster_size, 15);
    // Unparseable values fall back to the default
    assert_eq!(config.forecast.horizon, 12);
    clear_env();
}

#[test]
#[serial]
fn test_from_env_rejects_unknown_granularity() {
    clear_env();
    std::env::set_var("TRENDSCOPE_GRANULARITY", "fortnight");
    assert!(Config::from_env().is_err());
    clear_env();
}

#[test]
fn test_from_file() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    writeln!(
        file,
        r#"
[signal]
granularity = "year"
topic_mode = "all_categories"

[forecast]
season_length = 4
horizon = 8

[network]
pagerank_damping = 0.9
"#
    )
    .unwrap();

    let config = Config::from_file(file.path()).unwrap();
    assert_eq!(config.signal.granularity, Granularity::Year);
    assert_eq!(config.forecast.season_length, 4);
    assert_eq!(config.forecast.horizon, 8);
    assert_eq!(config.network.pagerank_damping, 0.9);
    assert_eq!(config.changepoint.alpha, 0.05);
    assert!(config.validate().is_ok());
}

#[test]
fn test_from_file_errors() {
    assert!(Config::from_file(std::path::Path::new("/nonexistent/trendscope.toml")).is_err());

    let mut file = tempfile::NamedTempFile::new().unwrap();
    writeln!(file, "[changepoint\npenalty = ").unwrap();
    assert!(Config::from_file(file.path()).is_err());
}

#[test]
fn test_validate_rejects_bad_values() {
    let mut config = Config::default();
    config.forecast.season_length = 0;
    assert!(config.validate().is_err());

    let mut config = Config::default();
    config.topics.min_cluster_size = 1;
    assert!(config.validate().is_err());

    let mut config = Config::default();
    config.network.resolution = 0.0;
    assert!(config.validate().is_err());
}
