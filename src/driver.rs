//! Driver controller: connection state machine, read loop and command gating
//!
//! One `DriverController` owns one physical base. A dedicated reader thread
//! pulls bytes from the transport, frames and decodes them, stores the latest
//! record per category and fires events. Command-side calls run on the
//! caller's thread and communicate with the loop through the shared
//! aggregates; outgoing motion commands are transmitted only while the driver
//! is enabled.

use crate::config::{DriverConfig, OperatingMode};
use crate::error::{Error, Result};
use crate::events::{Event, EventHub, EventKind, SubscriptionId};
use crate::kinematics::{EncoderSample, KinematicsTracker, OdometryState};
use crate::protocol::codec::VersionInfo;
use crate::protocol::{DriveCommand, FrameAccumulator, FrameError, PacketKind, PacketRecord, codec};
use crate::transport::{SerialLink, Transport};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

/// Consecutive failed reads treated as a dead link
const MAX_CONSECUTIVE_READ_ERRORS: u32 = 5;

/// Reader idle sleep when the line is quiet
const IDLE_SLEEP: Duration = Duration::from_millis(2);

/// Connection/command state, single authoritative instance per controller
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DriverState {
    /// No live link; `connect()` may be called
    Disconnected,
    /// Link open, waiting for the handshake packet
    Connecting,
    /// Link confirmed; telemetry flows, commands are not transmitted
    Connected,
    /// Commands are transmitted to the hardware
    Enabled,
    /// Terminal: loop joined, link released
    Closed,
}

/// State shared between the controller and its reader thread
struct Shared {
    transport: Mutex<Box<dyn Transport>>,
    state: Mutex<DriverState>,
    command: Mutex<DriveCommand>,
    kinematics: Mutex<KinematicsTracker>,
    latest: Mutex<HashMap<PacketKind, PacketRecord>>,
    events: EventHub,
    shutdown: AtomicBool,
}

/// Serial packet driver for a differential-drive base
///
/// # Example
///
/// ```no_run
/// use diffbase_io::{DriverConfig, DriverController};
///
/// # fn main() -> diffbase_io::Result<()> {
/// let mut driver = DriverController::open(DriverConfig::base_defaults())?;
/// driver.enable()?;
/// driver.set_command(0.2, 0.0)?; // 0.2 m/s forward
///
/// let odom = driver.get_odometry();
/// println!("travelled L={:.1}mm R={:.1}mm", odom.distance_left_mm, odom.distance_right_mm);
///
/// driver.disable()?;
/// driver.close();
/// # Ok(())
/// # }
/// ```
pub struct DriverController {
    config: DriverConfig,
    shared: Arc<Shared>,
    reader_handle: Option<JoinHandle<()>>,
}

impl DriverController {
    /// Create a controller over an already-open transport (not yet connected)
    pub fn with_transport(config: DriverConfig, transport: Box<dyn Transport>) -> Self {
        let shared = Arc::new(Shared {
            transport: Mutex::new(transport),
            state: Mutex::new(DriverState::Disconnected),
            command: Mutex::new(DriveCommand::stop()),
            kinematics: Mutex::new(KinematicsTracker::new(config.wheel.clone())),
            latest: Mutex::new(HashMap::new()),
            events: EventHub::new(),
            shutdown: AtomicBool::new(false),
        });
        Self {
            config,
            shared,
            reader_handle: None,
        }
    }

    /// Open the configured serial device (bounded retry) and connect
    pub fn open(config: DriverConfig) -> Result<Self> {
        let link = SerialLink::open_with_retry(
            &config.serial.device,
            config.serial.baud,
            config.link.connect_attempts,
            config.link.connect_backoff(),
        )?;
        let mut driver = Self::with_transport(config, Box::new(link));
        driver.connect()?;
        Ok(driver)
    }

    // === State machine ===

    /// Start the read loop and confirm link health
    ///
    /// In full mode this blocks until the first valid packet arrives or the
    /// handshake window elapses; simple mode reports connected immediately.
    /// There is no automatic retry after a handshake timeout - the caller
    /// must reinitiate.
    pub fn connect(&mut self) -> Result<()> {
        match *self.shared.state.lock() {
            DriverState::Closed => return Err(Error::CommandRejected("driver is closed")),
            DriverState::Connected | DriverState::Enabled => {
                log::debug!("Driver: connect() ignored, already connected");
                return Ok(());
            }
            DriverState::Disconnected | DriverState::Connecting => {}
        }

        // Reap a reader left over from a lost session
        self.shared.shutdown.store(true, Ordering::Relaxed);
        if let Some(handle) = self.reader_handle.take() {
            handle.join().map_err(|_| Error::ThreadPanic)?;
        }
        self.shared.shutdown.store(false, Ordering::Relaxed);

        *self.shared.state.lock() = DriverState::Connecting;
        log::info!("Driver: connecting ({:?} mode)", self.config.link.mode);

        let (link_up_tx, link_up_rx) = crossbeam_channel::bounded::<()>(1);
        let shared = Arc::clone(&self.shared);
        self.reader_handle = Some(
            thread::Builder::new()
                .name("base-reader".to_string())
                .spawn(move || reader_loop(shared, link_up_tx))
                .map_err(|e| Error::Other(format!("Failed to spawn reader thread: {e}")))?,
        );

        match self.config.link.mode {
            OperatingMode::Simple => {
                *self.shared.state.lock() = DriverState::Connected;
                log::info!("Driver: connected (handshake skipped)");
            }
            OperatingMode::Full => {
                let timeout = self.config.link.handshake_timeout();
                match link_up_rx.recv_timeout(timeout) {
                    Ok(()) => {
                        *self.shared.state.lock() = DriverState::Connected;
                        log::info!("Driver: connected (first valid packet received)");
                    }
                    Err(_) => {
                        log::error!("Driver: handshake timed out after {:?}", timeout);
                        self.shared.shutdown.store(true, Ordering::Relaxed);
                        if let Some(handle) = self.reader_handle.take() {
                            let _ = handle.join();
                        }
                        *self.shared.state.lock() = DriverState::Disconnected;
                        return Err(Error::HandshakeTimeout(timeout));
                    }
                }
            }
        }
        Ok(())
    }

    /// Begin honoring motion commands
    ///
    /// Resets odometry accumulation as a side effect. Enabling while already
    /// enabled is idempotent: the odometry reset still happens, nothing is
    /// transmitted.
    pub fn enable(&self) -> Result<()> {
        let mut state = self.shared.state.lock();
        match *state {
            DriverState::Connected | DriverState::Enabled => {
                self.shared.kinematics.lock().reset();
                *state = DriverState::Enabled;
                log::info!("Driver: enabled, odometry reset");
                Ok(())
            }
            _ => Err(Error::CommandRejected("enable requires a connected driver")),
        }
    }

    /// Stop honoring motion commands
    ///
    /// Zeroes the buffered command and transmits a single stop so the wheels
    /// are not left running. A no-op when not enabled.
    pub fn disable(&self) -> Result<()> {
        let mut state = self.shared.state.lock();
        if *state != DriverState::Enabled {
            log::debug!("Driver: disable() ignored, not enabled");
            return Ok(());
        }
        *state = DriverState::Connected;
        drop(state);

        *self.shared.command.lock() = DriveCommand::stop();
        self.transmit(&DriveCommand::stop().encode())?;
        log::info!("Driver: disabled, stop transmitted");
        Ok(())
    }

    /// Cancel the read loop, join it and release the link; terminal
    pub fn close(&mut self) {
        {
            let state = self.shared.state.lock();
            if *state == DriverState::Closed {
                return;
            }
            log::info!("Driver: closing (state {:?})", *state);
        }

        if self.is_enabled() {
            // Best effort: do not leave the wheels spinning
            let _ = self.transmit(&DriveCommand::stop().encode());
        }

        self.shared.shutdown.store(true, Ordering::Relaxed);
        if let Some(handle) = self.reader_handle.take() {
            if handle.join().is_err() {
                log::error!("Driver: reader thread panicked");
            }
        }
        *self.shared.state.lock() = DriverState::Closed;
        log::info!("Driver: closed");
    }

    /// Alias for [`close`](Self::close)
    pub fn stop(&mut self) {
        self.close();
    }

    // === Commands ===

    /// Set the desired (linear m/s, angular rad/s) velocity
    ///
    /// Values are clamped to the configured maxima and converted to the wire
    /// command. While enabled the command is transmitted immediately; in any
    /// other state it is only buffered and nothing is written to the link.
    pub fn set_command(&self, linear: f64, angular: f64) -> Result<()> {
        if !linear.is_finite() || !angular.is_finite() {
            return Err(Error::InvalidParameter(format!(
                "velocity must be finite, got ({linear}, {angular})"
            )));
        }

        let max_v = self.config.velocity.max_linear;
        let max_w = self.config.velocity.max_angular;
        let clamped_v = linear.clamp(-max_v, max_v);
        let clamped_w = angular.clamp(-max_w, max_w);
        if clamped_v != linear || clamped_w != angular {
            log::debug!(
                "Driver: command ({:.3}, {:.3}) clamped to ({:.3}, {:.3})",
                linear,
                angular,
                clamped_v,
                clamped_w
            );
        }

        let command = self
            .shared
            .kinematics
            .lock()
            .velocity_to_command(clamped_v, clamped_w);
        *self.shared.command.lock() = command;

        self.send_command()
    }

    /// Transmit the buffered command if the driver is enabled
    ///
    /// Outside the enabled state this is a logged no-op: the command is
    /// discarded from the wire's point of view, not an error.
    pub fn send_command(&self) -> Result<()> {
        if *self.shared.state.lock() != DriverState::Enabled {
            log::debug!("Driver: command not transmitted (not enabled)");
            return Ok(());
        }
        let bytes = self.shared.command.lock().encode();
        self.transmit(&bytes)
    }

    /// Reset accumulated odometry and the encoder baseline
    pub fn reset_odometry(&self) {
        self.shared.kinematics.lock().reset();
    }

    // === Data retrieval ===

    /// Latest decoded record for a category, if one has arrived
    pub fn get_latest(&self, kind: PacketKind) -> Option<PacketRecord> {
        self.shared.latest.lock().get(&kind).copied()
    }

    /// Current accumulated odometry
    pub fn get_odometry(&self) -> OdometryState {
        self.shared.kinematics.lock().state()
    }

    /// Hardware revision, once reported by the controller
    pub fn hardware_version(&self) -> Option<VersionInfo> {
        match self.get_latest(PacketKind::Hardware) {
            Some(PacketRecord::Hardware(v)) => Some(v),
            _ => None,
        }
    }

    /// Firmware revision, once reported by the controller
    pub fn firmware_version(&self) -> Option<VersionInfo> {
        match self.get_latest(PacketKind::Firmware) {
            Some(PacketRecord::Firmware(v)) => Some(v),
            _ => None,
        }
    }

    /// Register an event handler; see [`EventHub::subscribe`]
    pub fn subscribe<F>(&self, kind: EventKind, handler: F) -> SubscriptionId
    where
        F: Fn(&Event) + Send + Sync + 'static,
    {
        self.shared.events.subscribe(kind, handler)
    }

    /// Remove an event handler
    pub fn unsubscribe(&self, id: SubscriptionId) {
        self.shared.events.unsubscribe(id);
    }

    /// Current driver state
    pub fn state(&self) -> DriverState {
        *self.shared.state.lock()
    }

    /// True while commands are honored
    pub fn is_enabled(&self) -> bool {
        self.state() == DriverState::Enabled
    }

    /// True while the link is confirmed (connected or enabled)
    pub fn is_connected(&self) -> bool {
        matches!(
            self.state(),
            DriverState::Connected | DriverState::Enabled
        )
    }

    fn transmit(&self, bytes: &[u8]) -> Result<()> {
        let mut transport = self.shared.transport.lock();
        transport.write(bytes)?;
        transport.flush()?;
        Ok(())
    }
}

impl Drop for DriverController {
    fn drop(&mut self) {
        self.close();
    }
}

/// Read/decode loop; sole owner of the frame accumulator, sole notifier
fn reader_loop(shared: Arc<Shared>, link_up: crossbeam_channel::Sender<()>) {
    let mut accumulator = FrameAccumulator::new();
    let mut buf = [0u8; 256];
    let mut consecutive_errors = 0u32;
    let mut link_confirmed = false;

    log::info!("Driver: reader loop started");

    while !shared.shutdown.load(Ordering::Relaxed) {
        let read_result = shared.transport.lock().read(&mut buf);
        let n = match read_result {
            Ok(0) => {
                thread::sleep(IDLE_SLEEP);
                continue;
            }
            Ok(n) => {
                consecutive_errors = 0;
                n
            }
            Err(e) => {
                consecutive_errors += 1;
                log::warn!(
                    "Driver: read error ({}/{}): {}",
                    consecutive_errors,
                    MAX_CONSECUTIVE_READ_ERRORS,
                    e
                );
                if consecutive_errors >= MAX_CONSECUTIVE_READ_ERRORS {
                    log::error!("Driver: link lost, leaving read loop");
                    *shared.state.lock() = DriverState::Disconnected;
                    shared.events.notify(
                        EventKind::ConnectionLost,
                        &Event::ConnectionLost(e.to_string()),
                    );
                    break;
                }
                thread::sleep(Duration::from_millis(10));
                continue;
            }
        };

        accumulator.feed(&buf[..n]);
        for item in accumulator.extract_frames() {
            match item {
                Ok(frame) => {
                    if !link_confirmed {
                        link_confirmed = true;
                        let _ = link_up.try_send(());
                    }
                    match codec::decode(&frame) {
                        Ok(record) => handle_record(&shared, record),
                        Err(e) => {
                            // Unknown/short packets are dropped, never fatal
                            log::debug!("Driver: dropped frame: {}", e);
                        }
                    }
                }
                Err(FrameError::ChecksumMismatch { residue, bytes }) => {
                    log::warn!(
                        "Driver: discarding corrupt frame ({} bytes, residue {:#04x})",
                        bytes.len(),
                        residue
                    );
                    shared
                        .events
                        .notify(EventKind::InvalidPacket, &Event::Invalid(bytes));
                }
            }
        }
    }

    log::info!("Driver: reader loop exiting");
}

/// Store a decoded record and fire its notifications, in decode order
fn handle_record(shared: &Arc<Shared>, record: PacketRecord) {
    if let PacketRecord::Default(core) = &record {
        let odometry = shared.kinematics.lock().update(EncoderSample {
            tick_left: core.tick_left,
            tick_right: core.tick_right,
            timestamp: core.timestamp,
            received_at: Instant::now(),
        });
        shared
            .events
            .notify(EventKind::WheelState, &Event::Wheel(odometry));
    }

    let kind = record.kind();
    shared.latest.lock().insert(kind, record);

    let event = Event::Packet(record);
    shared.events.notify(EventKind::Packet(kind), &event);
    shared.events.notify(EventKind::SensorData, &event);
}
