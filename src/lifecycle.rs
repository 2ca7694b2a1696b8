//! Event device lifecycle state machine.
//!
//! The state of a device is kept in a single `AtomicU8` and every transition
//! is a CAS against an explicit set of source states, so a transition that
//! races with another one either wins cleanly or observes the new state.
//!
//! # State Transitions
//!
//! ```text
//! Unconfigured ──configure()──> Configured ──start()──> Started
//!      ▲                          │    ▲                  │
//!      └──driver configure fails──┘    └──configure()──┐  │ stop()
//!                                                      │  ▼
//!                                                      Stopped ──start()──> Started
//!
//! any state except Started ──close()──> Closed (terminal)
//! ```

use core::sync::atomic::{AtomicU8, Ordering};

/// Lifecycle states of an event device.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum DevState {
    /// Attached, never configured (or the last driver configure failed).
    Unconfigured = 0,
    /// Configured and stopped; queues and ports may be set up.
    Configured = 1,
    /// Running; fast-path calls reach the driver.
    Started = 2,
    /// Stopped after running; reconfigurable.
    Stopped = 3,
    /// Closed; only detaching the driver is allowed.
    Closed = 4,
}

impl DevState {
    #[inline]
    const fn from_raw(raw: u8) -> Self {
        match raw {
            0 => Self::Unconfigured,
            1 => Self::Configured,
            2 => Self::Started,
            3 => Self::Stopped,
            _ => Self::Closed,
        }
    }

    /// Whether queue and port metadata may be mutated in this state.
    #[inline]
    pub const fn is_mutable(self) -> bool {
        matches!(self, Self::Unconfigured | Self::Configured | Self::Stopped)
    }
}

/// Atomic lifecycle tracker of one event device.
pub struct DevLifecycle(AtomicU8);

impl DevLifecycle {
    /// Creates a lifecycle in the `Unconfigured` state.
    pub const fn new() -> Self {
        Self(AtomicU8::new(DevState::Unconfigured as u8))
    }

    /// Gets the current state.
    #[inline]
    pub fn state(&self) -> DevState {
        DevState::from_raw(self.0.load(Ordering::Acquire))
    }

    /// Returns `true` if the device is started.
    #[inline]
    pub fn is_started(&self) -> bool {
        self.state() == DevState::Started
    }

    /// Atomically moves to `to` if the current state is one of `from`.
    ///
    /// Returns the previous state on success, or the observed state when it
    /// is not an allowed source.
    fn transition(&self, from: &[DevState], to: DevState) -> Result<DevState, DevState> {
        loop {
            let current = self.0.load(Ordering::Acquire);
            let state = DevState::from_raw(current);
            if !from.contains(&state) {
                return Err(state);
            }
            match self
                .0
                .compare_exchange_weak(current, to as u8, Ordering::AcqRel, Ordering::Acquire)
            {
                Ok(_) => return Ok(state),
                Err(_) => continue,
            }
        }
    }

    /// Records a successful configuration.
    pub fn mark_configured(&self) -> Result<DevState, DevState> {
        self.transition(
            &[DevState::Unconfigured, DevState::Configured, DevState::Stopped],
            DevState::Configured,
        )
    }

    /// Records a failed driver configuration.
    pub fn mark_unconfigured(&self) -> Result<DevState, DevState> {
        self.transition(
            &[DevState::Unconfigured, DevState::Configured, DevState::Stopped],
            DevState::Unconfigured,
        )
    }

    /// Records a successful start.
    pub fn mark_started(&self) -> Result<DevState, DevState> {
        self.transition(&[DevState::Configured, DevState::Stopped], DevState::Started)
    }

    /// Records a stop.
    pub fn mark_stopped(&self) -> Result<DevState, DevState> {
        self.transition(&[DevState::Started], DevState::Stopped)
    }

    /// Records a close. Fails while started.
    pub fn mark_closed(&self) -> Result<DevState, DevState> {
        self.transition(
            &[
                DevState::Unconfigured,
                DevState::Configured,
                DevState::Stopped,
                DevState::Closed,
            ],
            DevState::Closed,
        )
    }
}

impl Default for DevLifecycle {
    fn default() -> Self {
        Self::new()
    }
}

impl core::fmt::Debug for DevLifecycle {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("DevLifecycle")
            .field("state", &self.state())
            .finish()
    }
}
