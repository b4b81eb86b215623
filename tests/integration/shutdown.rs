//! Cancellation and forced shutdown.

use crate::helpers::{FakeProvider, Reply, SimulatedClock, remote, single_pump_scheduler};
use async_trait::async_trait;
use hydropump::{Connectivity, Level, MemoryOutput, OutputDriver, SchedulerOptions};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;

#[derive(Default)]
struct DownLink {
    reconnects: AtomicUsize,
}

#[async_trait]
impl Connectivity for DownLink {
    async fn is_connected(&self) -> bool {
        false
    }

    async fn reconnect(&self) {
        self.reconnects.fetch_add(1, Ordering::SeqCst);
    }
}

#[tokio::test(start_paused = true)]
async fn cancel_then_stop_all_cuts_pulse_short() {
    let output = Arc::new(MemoryOutput::new());
    let provider = FakeProvider::new().route(
        "#03",
        [Reply::Doc(remote(&[("06:00:00", true)], 900_000))],
    );
    let link = Arc::new(DownLink::default());
    let scheduler = single_pump_scheduler(
        output.clone(),
        Arc::new(provider),
        SimulatedClock::starting_at(6, 0, 0),
        SchedulerOptions::default(),
    )
    .with_connectivity(link.clone());
    let cancel = CancellationToken::new();

    let handles = scheduler.start(&cancel).await;
    assert_eq!(handles.len(), 4);

    sleep(Duration::from_secs(60)).await;
    assert!(scheduler.pumps()[0].is_active());
    assert!(link.reconnects.load(Ordering::SeqCst) > 0);

    cancel.cancel();
    for handle in handles {
        handle.await.unwrap();
    }
    scheduler.stop_all();

    assert!(!scheduler.pumps()[0].is_active());
    assert_eq!(output.level(19), Level::Low);

    // The pulse timer was stopped too: nothing flips the output later.
    sleep(Duration::from_secs(900)).await;
    assert_eq!(output.level(19), Level::Low);
}

#[tokio::test(start_paused = true)]
async fn shutdown_turns_pumps_off_even_when_a_task_panicked() {
    let output = Arc::new(MemoryOutput::new());
    let scheduler = single_pump_scheduler(
        output.clone(),
        Arc::new(FakeProvider::new()),
        SimulatedClock::starting_at(12, 0, 0),
        SchedulerOptions::default(),
    );
    let cancel = CancellationToken::new();

    let mut handles = scheduler.start(&cancel).await;
    handles.insert(0, tokio::spawn(async { panic!("task crashed") }));
    assert!(scheduler.pumps()[0].start_pump());
    assert_eq!(output.level(19), Level::High);

    cancel.cancel();
    let err = scheduler.shutdown(handles).await.unwrap_err();

    assert!(err.is_panic());
    assert!(!scheduler.pumps()[0].is_active());
    assert_eq!(output.level(19), Level::Low);
}

#[tokio::test(start_paused = true)]
async fn shutdown_after_clean_cancel_is_ok() {
    let output = Arc::new(MemoryOutput::new());
    let scheduler = single_pump_scheduler(
        output.clone(),
        Arc::new(FakeProvider::new()),
        SimulatedClock::starting_at(12, 0, 0),
        SchedulerOptions::default(),
    );
    let cancel = CancellationToken::new();
    let handles = scheduler.start(&cancel).await;
    scheduler.pumps()[0].start_pump();

    cancel.cancel();
    scheduler.shutdown(handles).await.unwrap();

    assert_eq!(output.level(19), Level::Low);
}

#[tokio::test(start_paused = true)]
async fn restart_mid_pulse_starts_low() {
    let output = Arc::new(MemoryOutput::with_levels([(19, Level::High)]));
    let scheduler = single_pump_scheduler(
        output.clone(),
        Arc::new(FakeProvider::new()),
        SimulatedClock::starting_at(3, 0, 0),
        SchedulerOptions::default(),
    );

    assert_eq!(output.level(19), Level::Low);
    assert!(!scheduler.pumps()[0].is_active());
}
