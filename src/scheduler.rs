//! ==============================================================================
//! scheduler.rs - acquisition loop
//! ==============================================================================
//!
//! purpose:
//!     owns every piece of mutable run state (interval, anchor, buffer,
//!     throttle, transport) and drives the poll cycle.
//!
//! states:
//!
//!     start ──> Polling ──> Waiting ──(tick)──> Polling ──> ...
//!                             │  ▲
//!                     command │  │ interval changed / input rejected
//!                             ▼  │
//!                         Reconfiguring ──(quit)──> final flush, close port
//!
//! timing:
//!     ticks are aligned to the anchor (process start), not to the end of the
//!     previous cycle, so slow gauge exchanges do not make the schedule drift.
//!
//! relationships:
//!     - uses: frame.rs, transport.rs, throttle.rs, rotation.rs, control.rs
//!     - used by: main.rs
//!
//! ==============================================================================

use std::time::Duration;

use chrono::{Local, NaiveDateTime};
use tokio::sync::mpsc;
use tokio::time::Instant;

use crate::archive::Archive;
use crate::config::StationConfig;
use crate::control::ControlCommand;
use crate::domain::{format_reading, PublishOutcome, Sample};
use crate::error::TransportError;
use crate::frame::{build_query, decode_response, decode_response_strict, describe_frame, GaugeAddress};
use crate::publisher::{Publisher, StatusTemplate};
use crate::rotation::RotationBuffer;
use crate::throttle::PublishThrottle;
use crate::transport::Transport;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum State {
    /// sleeping until the next aligned tick
    Waiting,
    /// exchanging frames with the gauges
    Polling,
    /// handling an operator command
    Reconfiguring,
}

/// counters logged at shutdown
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunStats {
    pub cycles: u64,
    pub absent_readings: u64,
    pub published: u64,
    pub publish_skipped: u64,
    pub publish_failed: u64,
    pub files_written: u64,
}

impl RunStats {
    fn record_publish(&mut self, outcome: PublishOutcome) {
        match outcome {
            PublishOutcome::Sent => self.published += 1,
            PublishOutcome::Skipped => self.publish_skipped += 1,
            PublishOutcome::Failed => self.publish_failed += 1,
        }
    }

    pub fn log(&self) {
        tracing::info!(
            "[SHUTDOWN] {} cycles, {} absent readings, publishes {} sent / {} skipped / {} failed, {} files written",
            self.cycles,
            self.absent_readings,
            self.published,
            self.publish_skipped,
            self.publish_failed,
            self.files_written,
        );
    }
}

/// time left until the next multiple of `interval` past `anchor`
///
/// always in `(0, interval]`: standing exactly on a tick waits a full interval.
pub fn wait_duration(interval: Duration, anchor: Instant, now: Instant) -> Duration {
    let interval_ns = interval.as_nanos().max(1);
    let elapsed_ns = now.saturating_duration_since(anchor).as_nanos();
    let remaining = interval_ns - elapsed_ns % interval_ns;
    Duration::from_nanos(u64::try_from(remaining).unwrap_or(u64::MAX))
}

pub struct Scheduler {
    transport: Box<dyn Transport>,
    publisher: Box<dyn Publisher>,
    archive: Box<dyn Archive>,
    commands: mpsc::Receiver<ControlCommand>,
    commands_open: bool,

    throttle: PublishThrottle,
    buffer: RotationBuffer,

    interval: Duration,
    anchor: Instant,
    settle: Duration,
    verify_crc: bool,
    show_sensor_data: bool,

    state: State,
    stats: RunStats,
}

impl Scheduler {
    pub fn new(
        config: &StationConfig,
        transport: Box<dyn Transport>,
        publisher: Box<dyn Publisher>,
        archive: Box<dyn Archive>,
        commands: mpsc::Receiver<ControlCommand>,
    ) -> Self {
        let anchor = Instant::now();
        Self {
            transport,
            publisher,
            archive,
            commands,
            commands_open: true,
            throttle: PublishThrottle::new(
                config.publish_interval(),
                StatusTemplate::new(&config.gauges),
            ),
            buffer: RotationBuffer::new(config.rotation_period(), anchor),
            interval: config.interval(),
            anchor,
            settle: config.settle_delay(),
            verify_crc: config.protocol.verify_response_crc,
            show_sensor_data: config.logging.show_sensor_data,
            state: State::Waiting,
            stats: RunStats::default(),
        }
    }

    /// run until the operator quits or the port fails
    ///
    /// the final flush and port release happen on both paths; only the
    /// transport fault is returned.
    pub async fn run(&mut self) -> Result<RunStats, TransportError> {
        tracing::info!(
            "[RUNTIME] Starting acquisition ({}s interval)",
            self.interval.as_secs()
        );

        let outcome = self.poll_loop().await;
        if let Err(e) = &outcome {
            tracing::error!("[RUNTIME] ✗ Fatal transport fault: {}", e);
        }

        self.shutdown().await;
        outcome.map(|()| self.stats)
    }

    async fn poll_loop(&mut self) -> Result<(), TransportError> {
        loop {
            self.run_cycle(Instant::now(), Local::now().naive_local()).await?;
            if !self.wait_for_tick().await {
                return Ok(());
            }
        }
    }

    /// one complete acquisition cycle stamped with the given clocks
    pub async fn run_cycle(
        &mut self,
        now: Instant,
        wall_clock: NaiveDateTime,
    ) -> Result<Sample, TransportError> {
        self.state = State::Polling;

        let reading1 = self.exchange(GaugeAddress::First).await?;
        let reading2 = self.exchange(GaugeAddress::Second).await?;
        let sample = Sample::new(wall_clock, reading1, reading2);

        self.stats.cycles += 1;
        self.stats.absent_readings += sample.absent_count() as u64;
        self.log_sample(&sample);

        self.buffer.append(sample.clone());

        let outcome = self
            .throttle
            .maybe_publish(&sample, now, self.publisher.as_mut())
            .await;
        self.stats.record_publish(outcome);

        if self.buffer.should_flush(now) {
            self.flush(now, wall_clock).await;
        }

        self.state = State::Waiting;
        Ok(sample)
    }

    /// query one gauge: send, settle, read whatever arrived
    async fn exchange(&mut self, address: GaugeAddress) -> Result<Option<f64>, TransportError> {
        let query = build_query(address);
        tracing::debug!("[POLL] {} >> {}", address, describe_frame(&query));
        self.transport.send(&query).await?;

        tokio::time::sleep(self.settle).await;

        let response = self.transport.read_available().await?;
        tracing::debug!("[POLL] {} << {}", address, describe_frame(&response));

        let reading = if self.verify_crc {
            decode_response_strict(&response)
        } else {
            decode_response(&response)
        };
        if reading.is_none() {
            tracing::warn!(
                "[POLL] ⚠ {} gave no reading ({} bytes received)",
                address,
                response.len()
            );
        }
        Ok(reading)
    }

    fn log_sample(&self, sample: &Sample) {
        let r1 = format_reading(sample.reading1);
        let r2 = format_reading(sample.reading2);
        if self.show_sensor_data {
            tracing::info!("[POLL] {} {} | gauge 1: {} | gauge 2: {}", sample.date(), sample.time(), r1, r2);
        } else {
            tracing::debug!("[POLL] {} {} | gauge 1: {} | gauge 2: {}", sample.date(), sample.time(), r1, r2);
        }
    }

    async fn flush(&mut self, now: Instant, wall_clock: NaiveDateTime) {
        let count = self.buffer.len();
        if self.buffer.is_empty() {
            tracing::debug!("[ARCHIVE] Nothing buffered, writing a header-only file");
        }
        match self.buffer.flush(self.archive.as_mut(), now, wall_clock).await {
            Ok(path) => {
                self.stats.files_written += 1;
                tracing::info!("[ARCHIVE] ✓ Wrote {} ({} samples)", path.display(), count);
            }
            Err(e) => {
                tracing::warn!("[ARCHIVE] ⚠ {} ({} samples kept for the next attempt)", e, count);
            }
        }
    }

    /// sleep to the next tick, handling operator commands meanwhile
    ///
    /// returns false when the operator asked to quit.
    async fn wait_for_tick(&mut self) -> bool {
        loop {
            self.state = State::Waiting;
            let wait = wait_duration(self.interval, self.anchor, Instant::now());
            tracing::debug!("[RUNTIME] {:?}, next tick in {:.1}s", self.state, wait.as_secs_f64());

            let received = tokio::select! {
                _ = tokio::time::sleep(wait) => None,
                command = self.commands.recv(), if self.commands_open => Some(command),
            };

            match received {
                None => return true,
                Some(None) => {
                    tracing::debug!("[CONSOLE] control channel closed");
                    self.commands_open = false;
                }
                Some(Some(command)) => {
                    self.state = State::Reconfiguring;
                    if !self.apply_command(command) {
                        return false;
                    }
                }
            }
        }
    }

    /// returns false on quit
    fn apply_command(&mut self, command: ControlCommand) -> bool {
        match command {
            ControlCommand::Quit => {
                tracing::info!("[CONSOLE] Quit requested");
                false
            }
            ControlCommand::SetInterval(0) => {
                tracing::warn!("[CONSOLE] Interval must be at least 1 second, keeping {}s", self.interval.as_secs());
                true
            }
            ControlCommand::SetInterval(seconds) => {
                self.interval = Duration::from_secs(seconds);
                tracing::info!("[CONSOLE] ✓ Polling every {}s", seconds);
                true
            }
            ControlCommand::Invalid(input) => {
                tracing::warn!("[CONSOLE] Invalid input {:?}, please try again", input);
                true
            }
        }
    }

    /// unconditional final flush, then release the port
    async fn shutdown(&mut self) {
        self.flush(Instant::now(), Local::now().naive_local()).await;
        if let Err(e) = self.transport.close().await {
            tracing::warn!("[SHUTDOWN] ⚠ Failed to close transport: {}", e);
        }
        self.stats.log();
    }
}
