//! Shared versus per-pump sync locks with a provider that never answers.

use crate::helpers::{FakeProvider, Reply, remote, two_pump_scheduler};
use hydropump::config::LockMode;
use hydropump::{PumpError, PumpId, SchedulerOptions};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

fn options(lock_mode: LockMode) -> SchedulerOptions {
    SchedulerOptions {
        fetch_timeout: Duration::from_secs(10),
        lock_mode,
        ..SchedulerOptions::default()
    }
}

fn hanging_first_pump() -> Arc<FakeProvider> {
    Arc::new(
        FakeProvider::new()
            .route("#03", [Reply::Hang])
            .route("#04", [Reply::Doc(remote(&[("21:00:00", true)], 30_000))]),
    )
}

#[tokio::test(start_paused = true)]
async fn shared_lock_serialises_pumps_and_timeout_releases_it() {
    let provider = hanging_first_pump();
    let scheduler = two_pump_scheduler(provider.clone(), options(LockMode::Shared));
    let start = Instant::now();

    let (first, second) = tokio::join!(scheduler.sync_pump(PumpId::new(0)), async {
        tokio::task::yield_now().await;
        let result = scheduler.sync_pump(PumpId::new(1)).await;
        (result, start.elapsed())
    });

    assert!(matches!(first, Err(PumpError::Transport(_))));
    let (second, waited) = second;
    assert!(second.is_ok());
    assert!(
        waited >= Duration::from_secs(10),
        "second pump ran after {waited:?}"
    );
    assert!(scheduler.pumps()[1].schedule().matches("21:00:00"));
    assert_eq!(provider.calls_for("#04"), 1);
}

#[tokio::test(start_paused = true)]
async fn shared_lock_also_blocks_clock_sync() {
    let scheduler = two_pump_scheduler(hanging_first_pump(), options(LockMode::Shared));
    let start = Instant::now();

    let (_, waited) = tokio::join!(scheduler.sync_pump(PumpId::new(0)), async {
        tokio::task::yield_now().await;
        scheduler.sync_clock().await.unwrap();
        start.elapsed()
    });

    assert!(waited >= Duration::from_secs(10));
}

#[tokio::test(start_paused = true)]
async fn per_pump_locks_let_other_pumps_proceed() {
    let provider = hanging_first_pump();
    let scheduler = two_pump_scheduler(provider.clone(), options(LockMode::PerPump));
    let start = Instant::now();

    let (first, (second, clock, waited)) =
        tokio::join!(scheduler.sync_pump(PumpId::new(0)), async {
            tokio::task::yield_now().await;
            let second = scheduler.sync_pump(PumpId::new(1)).await;
            let clock = scheduler.sync_clock().await;
            (second, clock, start.elapsed())
        });

    assert!(matches!(first, Err(PumpError::Transport(_))));
    assert!(second.is_ok());
    assert!(clock.is_ok());
    assert!(waited < Duration::from_secs(1), "waited {waited:?}");
}
