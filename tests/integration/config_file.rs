//! Static configuration files driving a scheduler.

use crate::helpers::SimulatedClock;
use hydropump::config::{LockMode, PumpConfig};
use hydropump::{HydropumpConfig, MemoryOutput, PumpError, Scheduler};
use hydropump_cloud::DataApiClient;
use std::sync::Arc;

#[tokio::test]
async fn file_config_builds_scheduler() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("config.toml");
    std::fs::write(
        &path,
        r##"
        [[pumps]]
        code = "#03"
        channel = 19
        pulse_duration_ms = 600000

        [[pumps]]
        code = "#05"
        channel = 21

        [locking]
        mode = "per_pump"

        [timers]
        pool_capacity = 2
        "##,
    )
    .unwrap();

    let config = HydropumpConfig::from_file(&path).unwrap();
    assert_eq!(config.locking.mode, LockMode::PerPump);
    assert_eq!(config.pumps[1], PumpConfig::new("#05", 21, 900_000));

    let scheduler = Scheduler::from_config(
        &config,
        Arc::new(MemoryOutput::new()),
        Arc::new(DataApiClient::new(config.cloud.clone()).unwrap()),
        Arc::new(SimulatedClock::starting_at(0, 0, 0)),
    )
    .unwrap();

    assert_eq!(scheduler.pumps().len(), 2);
    assert_eq!(scheduler.timers().in_use(), 2);
    assert_eq!(scheduler.find_by_channel(21).unwrap().code(), "#05");
}

#[tokio::test]
async fn default_config_round_trips_through_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("hydropump").join("config.toml");

    HydropumpConfig::default().save_to_file(&path).unwrap();
    let loaded = HydropumpConfig::from_file(&path).unwrap();

    loaded.validate().unwrap();
    assert_eq!(loaded.pumps, HydropumpConfig::default().pumps);
    assert_eq!(loaded.clock.server, "a.st1.ntp.br:123");
}

#[tokio::test]
async fn invalid_file_config_is_rejected_before_any_output_changes() {
    let mut config = HydropumpConfig::default();
    config.timers.pool_capacity = 1;

    let err = Scheduler::from_config(
        &config,
        Arc::new(MemoryOutput::new()),
        Arc::new(DataApiClient::new(config.cloud.clone()).unwrap()),
        Arc::new(SimulatedClock::starting_at(0, 0, 0)),
    )
    .unwrap_err();

    assert!(matches!(err, PumpError::Config(_)));
}
