//! Device runtime: the two execution contexts as tokio tasks.
//!
//! [`Device::spawn`] wires the sample queue, the fill-trigger pulse relay, the
//! start level relay and the reset line between an [`AcquisitionController`]
//! (fast context) and a [`HostController`] (slow context), then steps each
//! controller from its own task on its own interval. The tasks share nothing
//! else.
//!
//! Status is published per context through `watch` channels. It is for
//! observers only; neither controller reads it.

use crate::config::AppConfig;
use crate::controller::{
    AcquisitionController, AcquisitionPorts, AcquisitionState, AcquisitionStats, HostController,
    HostPorts, HostState, HostStats,
};
use crate::data::processor::SignalChain;
use crate::data::waveform::SampleSource;
use crate::error::{AppResult, DaqError};
use crate::hardware::link::ByteLink;
use daq_fifo::{level_relay, pulse_relay, reset_line, LevelSource, ResetSource};
use serde::Serialize;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{info, info_span, Instrument};

/// Fast context snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct AcquisitionStatus {
    /// Controller state
    pub state: AcquisitionState,
    /// Controller counters
    pub stats: AcquisitionStats,
    /// Held in reset
    pub in_reset: bool,
}

/// Slow context snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct HostStatus {
    /// Controller state
    pub state: HostState,
    /// Controller counters
    pub stats: HostStats,
    /// Held in reset
    pub in_reset: bool,
}

/// Combined snapshot of both contexts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct DeviceStatus {
    /// Fast context
    pub acquisition: AcquisitionStatus,
    /// Slow context
    pub host: HostStatus,
}

/// Entry point for running the acquisition core.
#[derive(Debug)]
pub struct Device;

impl Device {
    /// Build the core and start both contexts.
    ///
    /// Must be called from within a tokio runtime. The contexts come out of
    /// reset right away; with `acquisition.auto_start` the fast context then
    /// starts acquiring on its own, otherwise it waits for
    /// [`DeviceHandle::start`].
    pub fn spawn<S, C, L>(
        config: &AppConfig,
        source: S,
        chain: C,
        link: L,
    ) -> AppResult<DeviceHandle>
    where
        S: SampleSource + 'static,
        C: SignalChain + 'static,
        L: ByteLink + 'static,
    {
        let (producer, consumer) = daq_fifo::channel(config.fifo.capacity)?;
        let (trigger_tx, trigger_rx) = pulse_relay();
        let (start, start_sink) = level_relay(config.acquisition.auto_start);
        let (reset, line) = reset_line();

        let mut acquisition = AcquisitionController::new(
            AcquisitionPorts {
                producer,
                fill_trigger: trigger_rx,
                start: start_sink,
                reset: line.synchronizer(),
            },
            source,
            chain,
        );
        let mut host = HostController::new(HostPorts {
            consumer,
            fill_trigger: trigger_tx,
            reset: line.synchronizer(),
        });

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let (acquisition_tx, acquisition_rx) = watch::channel(AcquisitionStatus::default());
        let (host_tx, host_rx) = watch::channel(HostStatus::default());

        let fast_period = config.acquisition.step_period();
        let slow_period = config.host.step_period();

        let fast = tokio::spawn(
            run_context(fast_period, shutdown_rx.clone(), move || {
                let state = acquisition.step();
                let next = AcquisitionStatus {
                    state,
                    stats: acquisition.stats(),
                    in_reset: acquisition.in_reset(),
                };
                publish(&acquisition_tx, next);
            })
            .instrument(info_span!("device", context = "fast")),
        );

        let mut link = link;
        let slow = tokio::spawn(
            run_context(slow_period, shutdown_rx, move || {
                let state = host.step(&mut link);
                let next = HostStatus {
                    state,
                    stats: host.stats(),
                    in_reset: host.in_reset(),
                };
                publish(&host_tx, next);
            })
            .instrument(info_span!("device", context = "slow")),
        );

        reset.release();
        info!(
            capacity = config.fifo.capacity,
            fast_period_us = config.acquisition.step_period_us,
            slow_period_us = config.host.step_period_us,
            auto_start = config.acquisition.auto_start,
            "device started"
        );

        Ok(DeviceHandle {
            start,
            reset,
            shutdown: shutdown_tx,
            acquisition: acquisition_rx,
            host: host_rx,
            tasks: vec![fast, slow],
        })
    }
}

fn publish<T: PartialEq + Copy>(tx: &watch::Sender<T>, next: T) {
    tx.send_if_modified(|current| {
        if *current == next {
            false
        } else {
            *current = next;
            true
        }
    });
}

async fn run_context<F>(period: Duration, mut shutdown: watch::Receiver<bool>, mut step: F)
where
    F: FnMut() + Send,
{
    let mut interval = tokio::time::interval(period);
    // Keep the average step rate when the timer lags behind
    interval.set_missed_tick_behavior(MissedTickBehavior::Burst);

    info!(period_us = period.as_micros() as u64, "context started");
    loop {
        tokio::select! {
            _ = interval.tick() => step(),
            changed = shutdown.changed() => {
                if changed.is_err() || *shutdown.borrow() {
                    break;
                }
            }
        }
    }
    info!("context stopped");
}

/// Control surface of a running device.
#[derive(Debug)]
pub struct DeviceHandle {
    start: LevelSource,
    reset: ResetSource,
    shutdown: watch::Sender<bool>,
    acquisition: watch::Receiver<AcquisitionStatus>,
    host: watch::Receiver<HostStatus>,
    tasks: Vec<JoinHandle<()>>,
}

impl DeviceHandle {
    /// Drive the external start level high.
    pub fn start(&self) {
        self.start.set(true);
    }

    /// Pulse the shared reset line: both contexts return to their initial
    /// states and the queue empties. The start level is left as it is.
    ///
    /// The line is released only once both contexts have reported being in
    /// reset, so neither side can keep a stale queue index.
    pub async fn reset(&self) -> AppResult<()> {
        info!("device reset");
        self.reset.assert();
        let seen = tokio::try_join!(
            self.wait_for_acquisition(|s| s.in_reset),
            self.wait_for_host(|s| s.in_reset),
        );
        self.reset.release();
        seen.map(|_| ())
    }

    /// Latest snapshot of both contexts.
    pub fn status(&self) -> DeviceStatus {
        DeviceStatus {
            acquisition: *self.acquisition.borrow(),
            host: *self.host.borrow(),
        }
    }

    /// Wait until the fast context publishes a snapshot matching `f`.
    pub async fn wait_for_acquisition<F>(&self, f: F) -> AppResult<AcquisitionStatus>
    where
        F: FnMut(&AcquisitionStatus) -> bool,
    {
        let mut rx = self.acquisition.clone();
        let status = rx
            .wait_for(f)
            .await
            .map_err(|_| DaqError::Shutdown("acquisition context stopped".to_string()))?;
        Ok(*status)
    }

    /// Wait until the slow context publishes a snapshot matching `f`.
    pub async fn wait_for_host<F>(&self, f: F) -> AppResult<HostStatus>
    where
        F: FnMut(&HostStatus) -> bool,
    {
        let mut rx = self.host.clone();
        let status = rx
            .wait_for(f)
            .await
            .map_err(|_| DaqError::Shutdown("host context stopped".to_string()))?;
        Ok(*status)
    }

    /// Stop both contexts and wait for their tasks.
    pub async fn shutdown(self) -> AppResult<()> {
        // Receivers may all be gone already; the tasks check the value
        let _ = self.shutdown.send(true);
        for task in self.tasks {
            task.await
                .map_err(|e| DaqError::Shutdown(format!("context task failed: {}", e)))?;
        }
        info!("device stopped");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::processor::PassThrough;
    use crate::hardware::link::LoopbackLink;

    fn fast_config(capacity: usize, auto_start: bool) -> AppConfig {
        let mut config = AppConfig::default();
        config.fifo.capacity = capacity;
        config.acquisition.auto_start = auto_start;
        config.acquisition.step_period_us = 50;
        config.host.step_period_us = 100;
        config
    }

    fn counter() -> impl FnMut() -> i16 + Send {
        let mut n = 0i16;
        move || {
            n = n.wrapping_add(1);
            n
        }
    }

    #[tokio::test]
    async fn test_auto_start_reaches_acquiring() {
        let handle = Device::spawn(
            &fast_config(8, true),
            counter(),
            PassThrough::new(),
            LoopbackLink::default(),
        )
        .unwrap();

        let status = tokio::time::timeout(
            Duration::from_secs(2),
            handle.wait_for_acquisition(|s| s.state == AcquisitionState::Acquiring),
        )
        .await
        .unwrap()
        .unwrap();
        assert_eq!(status.stats.written, 0);
        assert_eq!(handle.status().host.state, HostState::WaitFillCmd);

        handle.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_manual_start() {
        let handle = Device::spawn(
            &fast_config(8, false),
            counter(),
            PassThrough::new(),
            LoopbackLink::default(),
        )
        .unwrap();

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(handle.status().acquisition.state, AcquisitionState::Idle);

        handle.start();
        tokio::time::timeout(
            Duration::from_secs(2),
            handle.wait_for_acquisition(|s| s.state == AcquisitionState::Acquiring),
        )
        .await
        .unwrap()
        .unwrap();

        handle.reset().await.unwrap();
        handle.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_reset_released_after_both_contexts_cleared() {
        // Slow context far behind the fast one
        let mut config = fast_config(8, true);
        config.host.step_period_us = 5_000;
        let handle = Device::spawn(
            &config,
            counter(),
            PassThrough::new(),
            LoopbackLink::default(),
        )
        .unwrap();

        tokio::time::timeout(
            Duration::from_secs(2),
            handle.wait_for_acquisition(|s| s.state == AcquisitionState::Acquiring),
        )
        .await
        .unwrap()
        .unwrap();
        assert!(!handle.reset.is_asserted());

        tokio::time::timeout(Duration::from_secs(2), handle.reset())
            .await
            .unwrap()
            .unwrap();

        // The slow context needs two more of its steps to leave reset
        let status = handle.status();
        assert!(status.host.in_reset);
        assert_eq!(status.acquisition.stats, AcquisitionStats::default());
        assert_eq!(status.host.state, HostState::WaitFillCmd);
        assert!(!handle.reset.is_asserted());

        tokio::time::timeout(Duration::from_secs(2), handle.wait_for_host(|s| !s.in_reset))
            .await
            .unwrap()
            .unwrap();

        handle.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_invalid_capacity_rejected() {
        let result = Device::spawn(
            &fast_config(12, true),
            counter(),
            PassThrough::new(),
            LoopbackLink::default(),
        );
        assert!(matches!(result, Err(DaqError::Fifo(_))));
    }
}
