//! Scheduler wired to the HTTP data API client against a mock server.

use crate::helpers::SimulatedClock;
use hydropump::{
    HydropumpConfig, MemoryOutput, PumpError, PumpId, Scheduler, ScheduleSet, SystemStatus,
};
use hydropump_cloud::DataApiClient;
use std::sync::Arc;
use std::time::Duration;
use wiremock::matchers::{body_partial_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn config_for(server: &MockServer) -> HydropumpConfig {
    let mut config = HydropumpConfig::default();
    config.cloud.endpoint = format!("{}/action/findOne", server.uri());
    config.cloud.api_key = "secret".into();
    config
}

async fn mount_document(server: &MockServer, code: &str, document: serde_json::Value) {
    Mock::given(method("POST"))
        .and(path("/action/findOne"))
        .and(header("api-key", "secret"))
        .and(body_partial_json(serde_json::json!({
            "dataSource": "Tomatoes",
            "database": "first-api",
            "collection": "sensors",
            "filter": {"pumperCode": code}
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "document": document
        })))
        .mount(server)
        .await;
}

fn scheduler_for(config: &HydropumpConfig) -> Scheduler {
    let client = DataApiClient::new(config.cloud.clone()).unwrap();
    Scheduler::from_config(
        config,
        Arc::new(MemoryOutput::new()),
        Arc::new(client),
        Arc::new(SimulatedClock::starting_at(6, 0, 0)),
    )
    .unwrap()
}

#[tokio::test]
async fn startup_pulls_both_pumps_from_data_api() {
    let server = MockServer::start().await;
    mount_document(
        &server,
        "#03",
        serde_json::json!({
            "pumperCode": "#03",
            "driveTimes": [
                {"time": "06:00:00", "state": true},
                {"time": "12:00:00", "state": false},
                {"time": "18:00:00", "state": true}
            ],
            "pulseDuration": 900000
        }),
    )
    .await;
    mount_document(
        &server,
        "#04",
        serde_json::json!({
            "pumperCode": "#04",
            "schedule": [{"time": "07:30:00", "enabled": true}],
            "pulseDuration": 300000
        }),
    )
    .await;

    let scheduler = scheduler_for(&config_for(&server));
    scheduler.startup().await;

    let first = scheduler.find_by_code("#03").unwrap();
    assert_eq!(
        first.schedule(),
        ScheduleSet::from_times(["06:00:00", "18:00:00"]).unwrap()
    );
    let second = scheduler.find_by_code("#04").unwrap();
    assert_eq!(second.pulse_duration(), Duration::from_millis(300_000));

    let status = SystemStatus::capture(&scheduler);
    assert_eq!(status.pumps[0].schedule, vec!["06:00:00", "18:00:00"]);
    assert_eq!(status.pumps[1].pulse_duration_ms, 300_000);
}

#[tokio::test]
async fn unknown_pump_keeps_defaults() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "document": null
        })))
        .mount(&server)
        .await;

    let scheduler = scheduler_for(&config_for(&server));
    let err = scheduler.sync_pump(PumpId::new(0)).await.unwrap_err();

    assert!(matches!(err, PumpError::MalformedConfig(_)));
    assert!(scheduler.pumps()[0].schedule().is_empty());
    assert_eq!(
        scheduler.pumps()[0].pulse_duration(),
        Duration::from_millis(900_000)
    );
}

#[tokio::test]
async fn slow_data_api_is_cut_off_by_fetch_timeout() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_delay(Duration::from_secs(5))
                .set_body_json(serde_json::json!({"document": null})),
        )
        .mount(&server)
        .await;

    let mut config = config_for(&server);
    config.timeouts.fetch_secs = 1;
    let scheduler = scheduler_for(&config);

    let started = std::time::Instant::now();
    let err = scheduler.sync_pump(PumpId::new(0)).await.unwrap_err();

    assert!(matches!(err, PumpError::Transport(_)));
    assert!(started.elapsed() < Duration::from_secs(4));
}
