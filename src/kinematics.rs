//! Encoder-tick kinematics for the differential-drive base
//!
//! Converts raw, wrapping 16-bit encoder counters into accumulated wheel
//! travel, per-wheel rotation angle, heading and instantaneous wheel
//! velocities, and converts requested (linear, angular) velocity into the
//! controller's speed/radius wire fields.

use crate::config::WheelConfig;
use crate::protocol::DriveCommand;
use std::time::Instant;

/// Velocities below this are treated as zero in the command conversion
const VEL_EPSILON: f64 = 1e-4;

/// Resolution of the controller-side 16-bit timestamp (ticks per second)
const DEVICE_CLOCK_HZ: f64 = 1000.0;

/// Signed wraparound-aware delta between two 16-bit counter values
///
/// Yields the smallest-magnitude difference modulo 2^16, so a counter that
/// wrapped from near-max to near-zero produces a small positive delta rather
/// than a huge negative one. Samples further apart than half the counter
/// range cannot be disambiguated; the polling rate keeps real deltas well
/// inside that.
#[inline]
pub fn wrap_diff(to: u16, from: u16) -> i32 {
    to.wrapping_sub(from) as i16 as i32
}

/// One encoder reading as it arrived off the wire
#[derive(Debug, Clone, Copy)]
pub struct EncoderSample {
    /// Left wheel counter, wraps at 2^16
    pub tick_left: u16,
    /// Right wheel counter, wraps at 2^16
    pub tick_right: u16,
    /// Controller-side timestamp, wraps at 2^16
    pub timestamp: u16,
    /// Host arrival time, fallback clock when the device timestamp stalls
    pub received_at: Instant,
}

/// Accumulated odometry, mutated only by the tracker on new samples
#[derive(Debug, Clone, Copy)]
pub struct OdometryState {
    /// Accumulated left wheel travel (mm, signed)
    pub distance_left_mm: f64,
    /// Accumulated right wheel travel (mm, signed)
    pub distance_right_mm: f64,
    /// Accumulated left wheel rotation (rad, signed), for joint readback
    pub angle_left_rad: f64,
    /// Accumulated right wheel rotation (rad, signed), for joint readback
    pub angle_right_rad: f64,
    /// Accumulated heading (rad, positive = CCW)
    pub heading_rad: f64,
    /// Last left wheel velocity (mm/s)
    pub velocity_left_mm_s: f64,
    /// Last right wheel velocity (mm/s)
    pub velocity_right_mm_s: f64,
}

impl Default for OdometryState {
    fn default() -> Self {
        Self {
            distance_left_mm: 0.0,
            distance_right_mm: 0.0,
            angle_left_rad: 0.0,
            angle_right_rad: 0.0,
            heading_rad: 0.0,
            velocity_left_mm_s: 0.0,
            velocity_right_mm_s: 0.0,
        }
    }
}

/// Tracks encoder ticks and produces incremental motion
pub struct KinematicsTracker {
    wheel: WheelConfig,
    last_sample: Option<EncoderSample>,
    state: OdometryState,
    last_log: Option<Instant>,
}

impl KinematicsTracker {
    /// Create a tracker with the given wheel geometry
    pub fn new(wheel: WheelConfig) -> Self {
        log::debug!(
            "Kinematics: initialized with bias={:.3}m, tick_to_mm={:.6}",
            wheel.bias,
            wheel.tick_to_mm
        );
        Self {
            wheel,
            last_sample: None,
            state: OdometryState::default(),
            last_log: None,
        }
    }

    /// Fold a new encoder sample into the accumulated state
    ///
    /// The first sample only establishes the baseline. Returns the updated
    /// state so the caller can publish it without re-locking.
    pub fn update(&mut self, sample: EncoderSample) -> OdometryState {
        let Some(last) = self.last_sample else {
            self.last_sample = Some(sample);
            log::debug!(
                "Kinematics: baseline ticks L={}, R={}",
                sample.tick_left,
                sample.tick_right
            );
            return self.state;
        };

        let delta_left = wrap_diff(sample.tick_left, last.tick_left);
        let delta_right = wrap_diff(sample.tick_right, last.tick_right);

        // Elapsed time from the device clock; host clock when it stalls
        let device_ticks = wrap_diff(sample.timestamp, last.timestamp);
        let elapsed_s = if device_ticks > 0 {
            device_ticks as f64 / DEVICE_CLOCK_HZ
        } else {
            sample
                .received_at
                .duration_since(last.received_at)
                .as_secs_f64()
        };

        let left_mm = delta_left as f64 * self.wheel.tick_to_mm;
        let right_mm = delta_right as f64 * self.wheel.tick_to_mm;

        self.state.distance_left_mm += left_mm;
        self.state.distance_right_mm += right_mm;
        self.state.angle_left_rad += delta_left as f64 * self.wheel.tick_to_rad;
        self.state.angle_right_rad += delta_right as f64 * self.wheel.tick_to_rad;
        self.state.heading_rad += (right_mm - left_mm) / (self.wheel.bias * 1000.0);

        if elapsed_s > 0.0 {
            self.state.velocity_left_mm_s = left_mm / elapsed_s;
            self.state.velocity_right_mm_s = right_mm / elapsed_s;
        }

        self.last_sample = Some(sample);

        // Throttled to 1Hz; the stream runs at 50Hz
        let should_log = self
            .last_log
            .is_none_or(|t| t.elapsed() >= std::time::Duration::from_secs(1));
        if should_log && (delta_left != 0 || delta_right != 0) {
            log::debug!(
                "Kinematics: ΔL={}, ΔR={}, travel=({:.1}, {:.1})mm, heading={:.3}rad",
                delta_left,
                delta_right,
                self.state.distance_left_mm,
                self.state.distance_right_mm,
                self.state.heading_rad
            );
            self.last_log = Some(Instant::now());
        }

        self.state
    }

    /// Current accumulated state
    pub fn state(&self) -> OdometryState {
        self.state
    }

    /// Reset accumulators and encoder baseline
    pub fn reset(&mut self) {
        log::debug!("Kinematics: reset - clearing baseline and accumulators");
        self.last_sample = None;
        self.state = OdometryState::default();
    }

    /// Convert desired (linear m/s, angular rad/s) into wire-level fields
    ///
    /// Unit conversion only; velocity-limit policy belongs to the caller.
    pub fn velocity_to_command(&self, linear: f64, angular: f64) -> DriveCommand {
        let radius: f64 = if angular.abs() < VEL_EPSILON {
            0.0
        } else if linear.abs() < VEL_EPSILON {
            if angular > 0.0 { 1.0 } else { -1.0 }
        } else {
            linear * 1000.0 / angular
        };

        let speed: f64 = if linear.abs() < VEL_EPSILON {
            // Rotate in place: rim speed of a wheel at half the bias
            1000.0 * self.wheel.bias * angular / 2.0
        } else {
            1000.0 * linear
        };

        // Wire fields are i16; a turn rate barely above the epsilon yields a
        // radius of millions of mm, which saturates at the representable
        // bound (an effectively straight arc)
        DriveCommand {
            speed: speed.round().clamp(i16::MIN as f64, i16::MAX as f64) as i16,
            radius: radius.round().clamp(i16::MIN as f64, i16::MAX as f64) as i16,
        }
    }
}
