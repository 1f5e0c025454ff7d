use drainq::config::Config;
use std::time::Duration;

const VARS: [&str; 5] = [
    "DRAINQ_ADDR",
    "DRAINQ_UNITS",
    "DRAINQ_WORK_MS",
    "DRAINQ_JOBS_FILE",
    "DRAINQ_DRAIN_TIMEOUT_SECS",
];

fn clear() {
    for var in VARS {
        unsafe {
            std::env::remove_var(var);
        }
    }
}

// Env vars are process-wide, so every case runs in this one test.
#[test]
fn config_from_env() {
    clear();
    let config = Config::from_env().unwrap();
    assert_eq!(config.listen_addr.to_string(), "127.0.0.1:8080");
    assert_eq!(config.units_per_trigger, 3);
    assert_eq!(config.work_duration, Duration::from_secs(5));
    assert!(config.jobs_file.is_none());
    assert!(config.drain_timeout.is_none());
    assert!(!config.log_level.is_empty());

    unsafe {
        std::env::set_var("DRAINQ_ADDR", "0.0.0.0:9000");
        std::env::set_var("DRAINQ_UNITS", "5");
        std::env::set_var("DRAINQ_WORK_MS", "250");
        std::env::set_var("DRAINQ_JOBS_FILE", "jobs.toml");
        std::env::set_var("DRAINQ_DRAIN_TIMEOUT_SECS", "30");
    }
    let config = Config::from_env().unwrap();
    assert_eq!(config.listen_addr.port(), 9000);
    assert_eq!(config.units_per_trigger, 5);
    assert_eq!(config.work_duration, Duration::from_millis(250));
    assert_eq!(config.jobs_file.unwrap().to_str(), Some("jobs.toml"));
    assert_eq!(config.drain_timeout, Some(Duration::from_secs(30)));

    unsafe {
        std::env::set_var("DRAINQ_UNITS", "0");
    }
    assert!(Config::from_env().is_err());

    unsafe {
        std::env::set_var("DRAINQ_UNITS", "three");
    }
    assert!(Config::from_env().is_err());

    clear();
}
