use crate::config::StressConfig;
use crate::load::LoadGenerator;
use crate::state::{now_unix, CollectError, CrashEvent, MetricsSnapshot, SystemInfo, TestRun};
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::{self, Instant, MissedTickBehavior};
use tracing::{error, info, warn};

// One stress session. Takes a baseline snapshot, then samples at a fixed
// interval under synthetic CPU load until the duration elapses; a collector
// failure or a shutdown signal ends the loop early. The load generator is
// released on every exit path before the final snapshot is read.
pub async fn run_stress<F>(
    cfg: &StressConfig,
    system: SystemInfo,
    collect: &mut F,
    shutdown: &mut watch::Receiver<bool>,
) -> TestRun
where
    F: FnMut() -> Result<MetricsSnapshot, CollectError>,
{
    let started_at_unix = now_unix();
    let duration = Duration::from_secs(cfg.duration_secs);

    let mut samples: Vec<MetricsSnapshot> = Vec::new();
    let mut crash_events: Vec<CrashEvent> = Vec::new();
    let mut interrupted = false;
    let mut failed = false;

    // Baseline before any synthetic load is applied.
    let initial_snapshot = match collect() {
        Ok(snap) => snap,
        Err(err) => {
            error!(error = %err, "initial metrics collection failed");
            crash_events.push(CrashEvent {
                at_unix: now_unix(),
                message: err.to_string(),
            });
            failed = true;
            MetricsSnapshot::empty(now_unix())
        }
    };

    let mut load = LoadGenerator::new();
    if !failed {
        load.start();
        info!(
            duration_secs = cfg.duration_secs,
            interval_secs = cfg.interval_secs,
            "stress session started"
        );
    }

    let started = Instant::now();
    let mut ticker = time::interval(Duration::from_secs(cfg.interval_secs));
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    while !failed {
        tokio::select! {
            _ = shutdown.changed() => {
                info!("stress session interrupted");
                interrupted = true;
                break;
            }
            _ = ticker.tick() => {
                let elapsed = started.elapsed();
                if elapsed >= duration {
                    break;
                }
                match collect() {
                    Ok(snap) => {
                        let remaining = duration.saturating_sub(elapsed);
                        info!(
                            elapsed_secs = elapsed.as_secs(),
                            remaining_secs = remaining.as_secs(),
                            percent = progress_percent(elapsed.as_secs_f64(), duration.as_secs_f64()),
                            "stress progress"
                        );
                        if let Some(gpu) = &snap.gpu {
                            if gpu.temperature_celsius > cfg.gpu_temp_warn_celsius {
                                warn!(
                                    gpu_temp = gpu.temperature_celsius,
                                    threshold = cfg.gpu_temp_warn_celsius,
                                    "GPU temperature above warning threshold"
                                );
                            }
                        }
                        samples.push(snap);
                    }
                    Err(err) => {
                        error!(error = %err, "metrics collection failed, aborting session");
                        crash_events.push(CrashEvent {
                            at_unix: now_unix(),
                            message: err.to_string(),
                        });
                        failed = true;
                    }
                }
            }
        }
    }

    load.stop();

    // Best effort: when collection itself is what broke, reuse the last
    // observation so the record still carries a final state.
    let final_snapshot = match collect() {
        Ok(snap) => snap,
        Err(_) => samples
            .last()
            .cloned()
            .unwrap_or_else(|| initial_snapshot.clone()),
    };

    let completed = !failed && !interrupted;

    TestRun {
        started_at_unix,
        ended_at_unix: now_unix(),
        requested_duration_secs: cfg.duration_secs,
        interval_secs: cfg.interval_secs,
        system,
        initial_snapshot,
        final_snapshot,
        samples,
        crash_events,
        completed,
        interrupted,
    }
}

fn progress_percent(elapsed_secs: f64, total_secs: f64) -> f64 {
    if total_secs <= 0.0 {
        return 100.0;
    }
    (elapsed_secs / total_secs * 100.0).clamp(0.0, 100.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::RamReading;

    fn test_cfg(duration_secs: u64, interval_secs: u64) -> StressConfig {
        StressConfig {
            duration_secs,
            interval_secs,
            ..StressConfig::default()
        }
    }

    fn healthy() -> MetricsSnapshot {
        MetricsSnapshot {
            taken_at_unix: now_unix(),
            cpu_usage_percent: Some(40.0),
            cpu_temp_celsius: None,
            ram: Some(RamReading::from_total_free(32.0, 24.0)),
            gpu: None,
        }
    }

    #[tokio::test(start_paused = true)]
    async fn completed_run_collects_floor_of_duration_over_interval() {
        let cfg = test_cfg(20, 5);
        let (_tx, mut rx) = watch::channel(false);
        let mut collect = || Ok(healthy());

        let run = run_stress(&cfg, SystemInfo::default(), &mut collect, &mut rx).await;

        assert!(run.completed);
        assert!(!run.interrupted);
        assert!(run.crash_events.is_empty());
        assert_eq!(run.samples.len(), 4);
        assert_eq!(run.requested_duration_secs, 20);
        assert_eq!(run.interval_secs, 5);
    }

    #[tokio::test(start_paused = true)]
    async fn zero_duration_skips_sampling_but_keeps_boundary_snapshots() {
        let cfg = test_cfg(0, 5);
        let (_tx, mut rx) = watch::channel(false);
        let mut collect = || Ok(healthy());

        let run = run_stress(&cfg, SystemInfo::default(), &mut collect, &mut rx).await;

        assert!(run.completed);
        assert!(run.samples.is_empty());
        assert!(run.crash_events.is_empty());
        assert!(run.initial_snapshot.ram.is_some());
        assert!(run.final_snapshot.ram.is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn collector_error_records_crash_and_fails_the_run() {
        let cfg = test_cfg(30, 5);
        let (_tx, mut rx) = watch::channel(false);
        let mut calls = 0u32;
        let mut collect = move || {
            calls += 1;
            if calls >= 4 {
                Err(CollectError("probe backend gone".to_string()))
            } else {
                Ok(healthy())
            }
        };

        let run = run_stress(&cfg, SystemInfo::default(), &mut collect, &mut rx).await;

        assert!(!run.completed);
        assert!(!run.interrupted);
        assert_eq!(run.samples.len(), 2);
        assert_eq!(run.crash_events.len(), 1);
        assert!(run.crash_events[0].message.contains("probe backend gone"));
        // Final capture failed too, so the record reuses the last sample.
        assert!(run.final_snapshot.ram.is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn failed_initial_collection_short_circuits_the_loop() {
        let cfg = test_cfg(60, 5);
        let (_tx, mut rx) = watch::channel(false);
        let mut collect = || Err(CollectError("no sources".to_string()));

        let run = run_stress(&cfg, SystemInfo::default(), &mut collect, &mut rx).await;

        assert!(!run.completed);
        assert!(run.samples.is_empty());
        assert_eq!(run.crash_events.len(), 1);
        assert!(run.initial_snapshot.ram.is_none());
        assert!(run.final_snapshot.ram.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn shutdown_signal_interrupts_the_session() {
        let cfg = test_cfg(3600, 5);
        let (tx, mut rx) = watch::channel(false);
        let signal = tokio::spawn(async move {
            time::sleep(Duration::from_secs(12)).await;
            let _ = tx.send(true);
        });
        let mut collect = || Ok(healthy());

        let run = run_stress(&cfg, SystemInfo::default(), &mut collect, &mut rx).await;

        assert!(run.interrupted);
        assert!(!run.completed);
        assert!(run.crash_events.is_empty());
        assert_eq!(run.samples.len(), 3);
        signal.await.expect("signal task");
    }

    #[test]
    fn progress_saturates_under_clock_skew() {
        assert_eq!(progress_percent(-5.0, 120.0), 0.0);
        assert_eq!(progress_percent(60.0, 120.0), 50.0);
        assert_eq!(progress_percent(500.0, 120.0), 100.0);
        assert_eq!(progress_percent(10.0, 0.0), 100.0);
    }
}
