//! Event timer adapter lifecycle.
//!
//! A timer adapter injects timer-expiry events into an event device. When
//! the device cannot schedule timers from an internal port, the adapter gets
//! a dedicated event port added to the device on the fly: the default port
//! callback stops the device if needed, configures one more port, sets it up
//! and restarts the device.
//!
//! Adapter state lives in a named shared block
//! (`"event_timer_adapter_data_<id>"`) so a second [`TimerAdapterRegistry`]
//! attached to the same [`NamedZones`] can `lookup` an adapter it did not
//! create.
//!
//! The timer wheel itself belongs to the device driver, reached through
//! [`TimerAdapterOps`].

use alloc::format;
use alloc::string::String;
use alloc::sync::Arc;
use core::fmt;
use core::sync::atomic::{AtomicBool, Ordering};

use axerrno::{AxError, AxResult, ax_err};
use bitflags::bitflags;
use spin::{Mutex, Once};

use crate::config::{PortCfgFlags, PortConf};
use crate::event::Event;
use crate::memzone::NamedZones;
use crate::registry::EventDevRegistry;

/// Number of adapter slots.
pub const MAX_TIMER_ADAPTERS: usize = 32;

const DATA_ZONE_PREFIX: &str = "event_timer_adapter_data";

bitflags! {
    /// Timer adapter support of an event device.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct TimerAdapterCaps: u32 {
        /// Expiry events are injected without an application event port.
        const INTERNAL_PORT = 1 << 0;
        /// Periodic timers are supported.
        const PERIODIC = 1 << 1;
    }

    /// Adapter creation flags.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct TimerAdapterFlags: u32 {
        /// Round the tick to the nearest supported resolution.
        const ADJUST_RES = 1 << 0;
        /// Arm/cancel are called from a single thread.
        const SP_PUT = 1 << 1;
        const PERIODIC = 1 << 2;
    }
}

/// Clock driving the adapter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TimerClockSource {
    #[default]
    Cpu,
    Ext0,
    Ext1,
    Ext2,
    Ext3,
}

/// Configuration of a timer adapter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TimerAdapterConfig {
    pub event_dev_id: u8,
    pub timer_adapter_id: u16,
    pub socket_id: i32,
    pub clk_src: TimerClockSource,
    pub timer_tick_ns: u64,
    pub max_tmo_ns: u64,
    pub nb_timers: u64,
    pub flags: TimerAdapterFlags,
}

/// Properties of a created adapter.
#[derive(Debug, Clone, Copy, Default)]
pub struct TimerAdapterInfo {
    pub min_resolution_ns: u64,
    pub max_tmo_ns: u64,
    pub conf: TimerAdapterConfig,
    pub caps: TimerAdapterCaps,
    /// Event port used to inject expiries; `None` with an internal port.
    pub event_dev_port_id: Option<u8>,
}

/// State of an event timer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum EventTimerState {
    #[default]
    NotArmed,
    Armed,
    Canceled,
    Error,
    ErrorTooEarly,
    ErrorTooLate,
}

/// A timer that delivers `ev` when it expires.
#[derive(Debug, Clone, Copy, Default)]
pub struct EventTimer {
    pub ev: Event,
    pub state: EventTimerState,
    pub timeout_ticks: u64,
    pub impl_opaque: [u64; 2],
}

/// Shared control block of one adapter.
#[derive(Debug)]
pub struct TimerAdapterData {
    id: u16,
    conf: TimerAdapterConfig,
    caps: TimerAdapterCaps,
    event_port_id: Once<u8>,
    started: AtomicBool,
}

impl TimerAdapterData {
    fn new(conf: &TimerAdapterConfig, caps: TimerAdapterCaps) -> Self {
        Self {
            id: conf.timer_adapter_id,
            conf: *conf,
            caps,
            event_port_id: Once::new(),
            started: AtomicBool::new(false),
        }
    }

    pub fn id(&self) -> u16 {
        self.id
    }

    pub fn conf(&self) -> &TimerAdapterConfig {
        &self.conf
    }

    pub fn caps(&self) -> TimerAdapterCaps {
        self.caps
    }

    pub fn event_dev_id(&self) -> u8 {
        self.conf.event_dev_id
    }

    pub fn event_port_id(&self) -> Option<u8> {
        self.event_port_id.get().copied()
    }

    pub fn is_started(&self) -> bool {
        self.started.load(Ordering::Acquire)
    }
}

/// Timer adapter implementation supplied by an event device driver.
pub trait TimerAdapterOps: Send + Sync {
    fn init(&self, data: &TimerAdapterData) -> AxResult;

    fn uninit(&self, data: &TimerAdapterData) -> AxResult;

    fn start(&self, data: &TimerAdapterData) -> AxResult;

    fn stop(&self, data: &TimerAdapterData) -> AxResult;

    /// Fills the resolution and timeout limits of `info`.
    fn get_info(&self, _data: &TimerAdapterData, _info: &mut TimerAdapterInfo) {}

    /// Arms timers with their own `timeout_ticks`; returns how many leading
    /// timers were armed.
    fn arm_burst(&self, data: &TimerAdapterData, timers: &mut [EventTimer]) -> usize;

    /// Arms timers sharing one timeout.
    fn arm_tmo_tick_burst(
        &self,
        data: &TimerAdapterData,
        timers: &mut [EventTimer],
        timeout_ticks: u64,
    ) -> usize;

    fn cancel_burst(&self, data: &TimerAdapterData, timers: &mut [EventTimer]) -> usize;
}

/// Handle of a created adapter.
///
/// Arm and cancel calls go straight to the driver operations captured at
/// creation.
pub struct TimerAdapter {
    data: Arc<TimerAdapterData>,
    ops: Arc<dyn TimerAdapterOps>,
}

impl fmt::Debug for TimerAdapter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TimerAdapter")
            .field("data", &self.data)
            .finish_non_exhaustive()
    }
}

impl TimerAdapter {
    pub fn id(&self) -> u16 {
        self.data.id
    }

    pub fn data(&self) -> &TimerAdapterData {
        &self.data
    }

    pub fn event_port_id(&self) -> Option<u8> {
        self.data.event_port_id()
    }

    pub fn is_started(&self) -> bool {
        self.data.is_started()
    }

    /// Starts the adapter. The driver is always called; the adapter is
    /// marked started only if it succeeds.
    pub fn start(&self) -> AxResult {
        self.ops.start(&self.data)?;
        self.data.started.store(true, Ordering::Release);
        Ok(())
    }

    /// Stops the adapter. Stopping a stopped adapter does nothing.
    pub fn stop(&self) -> AxResult {
        if !self.data.is_started() {
            warn!("event timer adapter {} already stopped", self.data.id);
            return Ok(());
        }
        self.ops.stop(&self.data)?;
        self.data.started.store(false, Ordering::Release);
        Ok(())
    }

    pub fn get_info(&self) -> TimerAdapterInfo {
        let mut info = TimerAdapterInfo {
            conf: self.data.conf,
            caps: self.data.caps,
            event_dev_port_id: self.data.event_port_id(),
            ..Default::default()
        };
        self.ops.get_info(&self.data, &mut info);
        info
    }

    #[inline]
    pub fn arm_burst(&self, timers: &mut [EventTimer]) -> usize {
        self.ops.arm_burst(&self.data, timers)
    }

    #[inline]
    pub fn arm_tmo_tick_burst(&self, timers: &mut [EventTimer], timeout_ticks: u64) -> usize {
        self.ops.arm_tmo_tick_burst(&self.data, timers, timeout_ticks)
    }

    #[inline]
    pub fn cancel_burst(&self, timers: &mut [EventTimer]) -> usize {
        self.ops.cancel_burst(&self.data, timers)
    }
}

fn data_zone_name(id: u16) -> String {
    format!("{}_{}", DATA_ZONE_PREFIX, id)
}

/// Adds a port to `dev_id` for timer adapter `adapter_id`.
///
/// Stops the device if it runs, configures one more port (counted as a
/// single-link port when `port_conf` asks for one), sets it up with
/// `port_conf` or the default configuration of the last existing port, and
/// restarts the device. Returns the new port id.
pub fn default_port_conf_cb(
    devices: &EventDevRegistry,
    adapter_id: u16,
    dev_id: u8,
    port_conf: Option<&PortConf>,
) -> AxResult<u8> {
    let mut dev_conf = devices.dev_conf(dev_id)?;
    let port_id = dev_conf.nb_event_ports;
    let port_conf = match port_conf {
        Some(conf) => *conf,
        None => devices.port_default_conf(dev_id, port_id.wrapping_sub(1))?,
    };

    dev_conf.nb_event_ports = port_id
        .checked_add(1)
        .ok_or(AxError::InvalidInput)?;
    if port_conf
        .event_port_cfg
        .contains(PortCfgFlags::SINGLE_LINK)
    {
        dev_conf.nb_single_link_event_port_queues =
            dev_conf.nb_single_link_event_port_queues.saturating_add(1);
    }

    let started = devices.is_started(dev_id)?;
    if started {
        devices.stop(dev_id)?;
    }

    let setup = devices
        .configure(dev_id, &dev_conf)
        .and_then(|_| devices.port_setup(dev_id, port_id, Some(&port_conf)));
    if let Err(e) = setup {
        error!(
            "failed to add port {} on dev{} for timer adapter {}: {:?}",
            port_id, dev_id, adapter_id, e
        );
        if started && devices.start(dev_id).is_err() {
            error!("failed to restart dev{}", dev_id);
        }
        return Err(e);
    }

    if started {
        devices.start(dev_id)?;
    }
    debug!(
        "timer adapter {} uses port {} of dev{}",
        adapter_id, port_id, dev_id
    );
    Ok(port_id)
}

/// Table of timer adapters bound to an event device table.
pub struct TimerAdapterRegistry<'a> {
    devices: &'a EventDevRegistry,
    zones: &'a NamedZones<TimerAdapterData>,
    adapters: [Mutex<Option<Arc<TimerAdapter>>>; MAX_TIMER_ADAPTERS],
}

impl<'a> TimerAdapterRegistry<'a> {
    pub fn new(devices: &'a EventDevRegistry, zones: &'a NamedZones<TimerAdapterData>) -> Self {
        Self {
            devices,
            zones,
            adapters: core::array::from_fn(|_| Mutex::new(None)),
        }
    }

    fn slot(&self, id: u16) -> AxResult<&Mutex<Option<Arc<TimerAdapter>>>> {
        match self.adapters.get(usize::from(id)) {
            Some(slot) => Ok(slot),
            None => {
                error!("Invalid timer adapter id {}", id);
                ax_err!(InvalidInput, "invalid timer adapter id")
            }
        }
    }

    /// Creates an adapter, adding an event port with
    /// [`default_port_conf_cb`] when the device needs one.
    pub fn create(&self, conf: &TimerAdapterConfig) -> AxResult<Arc<TimerAdapter>> {
        self.create_ext(conf, |devices, id, dev_id| {
            default_port_conf_cb(devices, id, dev_id, None)
        })
    }

    /// Creates an adapter; `port_conf_cb` provides the event port when the
    /// device has no internal port.
    ///
    /// # Errors
    ///
    /// - `InvalidInput` for an unknown device or an out-of-range id.
    /// - `AlreadyExists` if the adapter id or its shared block is taken.
    /// - `Unsupported` if the device offers no timer adapter.
    /// - Any error of the port callback or the driver `init`; the shared
    ///   block is released in that case.
    pub fn create_ext<F>(&self, conf: &TimerAdapterConfig, port_conf_cb: F) -> AxResult<Arc<TimerAdapter>>
    where
        F: FnOnce(&EventDevRegistry, u16, u8) -> AxResult<u8>,
    {
        let id = conf.timer_adapter_id;
        let dev_id = conf.event_dev_id;
        if !self.devices.is_valid_dev(dev_id) {
            error!("Invalid event device id {} for timer adapter {}", dev_id, id);
            return ax_err!(InvalidInput, "invalid event device");
        }

        let mut slot = self.slot(id)?.lock();
        if slot.is_some() {
            error!("timer adapter {} already allocated", id);
            return ax_err!(AlreadyExists, "timer adapter exists");
        }

        let (caps, ops) = self.devices.timer_adapter_caps_get(dev_id)?;
        let Some(ops) = ops else {
            error!("dev{} has no timer adapter implementation", dev_id);
            return ax_err!(Unsupported);
        };

        let name = data_zone_name(id);
        let data = self.zones.reserve(&name, TimerAdapterData::new(conf, caps))?;

        let init = || -> AxResult {
            if !caps.contains(TimerAdapterCaps::INTERNAL_PORT) {
                let port_id = port_conf_cb(self.devices, id, dev_id)?;
                data.event_port_id.call_once(|| port_id);
            }
            ops.init(&data)
        };
        if let Err(e) = init() {
            error!("failed to create timer adapter {}: {:?}", id, e);
            let _ = self.zones.free(&name);
            return Err(e);
        }

        let adapter = Arc::new(TimerAdapter { data, ops });
        *slot = Some(adapter.clone());
        debug!("timer adapter {} created on dev{}", id, dev_id);
        Ok(adapter)
    }

    /// Finds an adapter, attaching to its shared block if this registry did
    /// not create it.
    pub fn lookup(&self, id: u16) -> AxResult<Arc<TimerAdapter>> {
        let mut slot = self.slot(id)?.lock();
        if let Some(adapter) = slot.as_ref() {
            return Ok(adapter.clone());
        }

        let Some(data) = self.zones.lookup(&data_zone_name(id)) else {
            return ax_err!(NotFound, "timer adapter not found");
        };
        let (_, ops) = self.devices.timer_adapter_caps_get(data.event_dev_id())?;
        let Some(ops) = ops else {
            return ax_err!(Unsupported);
        };

        let adapter = Arc::new(TimerAdapter { data, ops });
        *slot = Some(adapter.clone());
        Ok(adapter)
    }

    /// Frees a stopped adapter and its shared block.
    ///
    /// # Errors
    ///
    /// `ResourceBusy` while started, `InvalidInput` for an unused id, or the
    /// driver `uninit` error.
    pub fn free(&self, id: u16) -> AxResult {
        let mut slot = self.slot(id)?.lock();
        let Some(adapter) = slot.as_ref() else {
            return ax_err!(InvalidInput, "timer adapter not allocated");
        };
        if adapter.is_started() {
            error!("timer adapter {} must be stopped before free", id);
            return ax_err!(ResourceBusy, "timer adapter is started");
        }

        adapter.ops.uninit(&adapter.data)?;
        if self.zones.free(&data_zone_name(id)).is_err() {
            warn!("shared block of timer adapter {} already freed", id);
        }
        *slot = None;
        debug!("timer adapter {} freed", id);
        Ok(())
    }
}
