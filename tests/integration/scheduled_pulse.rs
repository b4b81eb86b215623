//! End-to-end trigger scenarios on a paused clock.

use crate::helpers::{FakeProvider, Reply, SimulatedClock, remote, single_pump_scheduler};
use hydropump::{Level, MemoryOutput, OutputDriver, ScheduleSet, SchedulerOptions};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;

#[tokio::test(start_paused = true)]
async fn pulse_at_six_runs_for_fifteen_minutes() {
    let output = Arc::new(MemoryOutput::new());
    let provider = FakeProvider::new().route(
        "#03",
        [Reply::Doc(remote(&[("06:00:00", true)], 900_000))],
    );
    let scheduler = single_pump_scheduler(
        output.clone(),
        Arc::new(provider),
        SimulatedClock::starting_at(5, 59, 58),
        SchedulerOptions::default(),
    );
    let pump = scheduler.pumps()[0].clone();
    let cancel = CancellationToken::new();
    let handles = scheduler.start(&cancel).await;

    sleep(Duration::from_millis(1_950)).await;
    assert!(!pump.is_active(), "05:59:59 must not trigger");
    assert_eq!(output.level(19), Level::Low);

    sleep(Duration::from_millis(100)).await;
    assert!(pump.is_active(), "06:00:00 must trigger");
    assert_eq!(output.level(19), Level::High);

    // Still inside the pulse, well past the matched second.
    sleep(Duration::from_secs(899)).await;
    assert!(pump.is_active());
    assert_eq!(output.level(19), Level::High);

    sleep(Duration::from_secs(1)).await;
    assert!(!pump.is_active(), "pulse must end after 900000 ms");
    assert_eq!(output.level(19), Level::Low);

    cancel.cancel();
    for handle in handles {
        handle.await.unwrap();
    }
}

#[tokio::test(start_paused = true)]
async fn disabled_entry_never_triggers() {
    let output = Arc::new(MemoryOutput::new());
    let provider = FakeProvider::new().route(
        "#03",
        [Reply::Doc(remote(
            &[("07:00:00", true), ("08:00:00", false)],
            1_000,
        ))],
    );
    let scheduler = single_pump_scheduler(
        output.clone(),
        Arc::new(provider),
        SimulatedClock::starting_at(7, 59, 58),
        SchedulerOptions::default(),
    );
    let pump = scheduler.pumps()[0].clone();
    let cancel = CancellationToken::new();
    let handles = scheduler.start(&cancel).await;

    assert_eq!(pump.schedule(), ScheduleSet::from_times(["07:00:00"]).unwrap());
    assert_eq!(pump.pulse_duration(), Duration::from_millis(1_000));

    for _ in 0..50 {
        sleep(Duration::from_millis(100)).await;
        assert!(!pump.is_active());
        assert_eq!(output.level(19), Level::Low);
    }

    cancel.cancel();
    for handle in handles {
        handle.await.unwrap();
    }
}

#[tokio::test(start_paused = true)]
async fn no_trigger_before_first_clock_sync() {
    let output = Arc::new(MemoryOutput::new());
    let scheduler = single_pump_scheduler(
        output.clone(),
        Arc::new(FakeProvider::new()),
        SimulatedClock::starting_at(6, 0, 0),
        SchedulerOptions::default(),
    );
    let pump = scheduler.pumps()[0].clone();
    pump.set_schedule(ScheduleSet::from_times(["06:00:00"]).unwrap());

    // No startup pass, so the cache has never been written.
    assert!(scheduler.clock().formatted_time().is_none());
    assert!(!hydropump::scheduler::tasks::trigger_once(&pump, scheduler.clock()));
    assert!(!pump.is_active());
}
