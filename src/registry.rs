//! Fixed-capacity event device table and the control-path API.
//!
//! Devices live in [`MAX_EVENT_DEVS`] slots indexed by `dev_id`. A slot is
//! filled when a driver attaches with [`EventDevRegistry::allocate`] and
//! emptied by [`EventDevRegistry::release`]; a `dev_id` is never reused while
//! its device is attached.
//!
//! # Concurrency
//!
//! Each slot has its own lock. Control-path calls on one device must still
//! be serialized by the application: the lock only keeps the table
//! consistent, it does not order configure/setup/link sequences issued from
//! different threads. Fast-path calls go through the per-slot dispatch table
//! (see the `dispatch` module) and never take a slot lock.

use alloc::boxed::Box;
use alloc::string::String;
use alloc::sync::Arc;
use alloc::vec::Vec;
use core::fmt;
use core::sync::atomic::{AtomicUsize, Ordering};

use axerrno::{AxResult, ax_err};
use spin::{Mutex, Once};

use crate::config::{DevAttr, DevConfig, DevInfo, PortAttr, PortConf, QueueAttr, QueueConf};
use crate::device::{EventDev, StopFlushFn};
use crate::dispatch::FpSlot;
use crate::driver::{EventDevDriver, XstatsMode, XstatsName};
use crate::event::Event;
use crate::lifecycle::DevState;
use crate::links::PortLinks;
use crate::timer_adapter::{TimerAdapterCaps, TimerAdapterOps};
use crate::{EVENTDEV_NAME_MAX_LEN, MAX_EVENT_DEVS};

/// Table of attached event devices.
pub struct EventDevRegistry {
    devices: [Mutex<Option<EventDev>>; MAX_EVENT_DEVS],
    pub(crate) fp: Box<[FpSlot]>,
    nb_devs: AtomicUsize,
}

static EVENT_DEVICES: Once<EventDevRegistry> = Once::new();

/// The process-wide device table.
pub fn event_devices() -> &'static EventDevRegistry {
    EVENT_DEVICES.call_once(EventDevRegistry::new)
}

impl EventDevRegistry {
    /// Creates an empty table.
    pub fn new() -> Self {
        Self {
            devices: core::array::from_fn(|_| Mutex::new(None)),
            fp: (0..MAX_EVENT_DEVS).map(|_| FpSlot::new()).collect(),
            nb_devs: AtomicUsize::new(0),
        }
    }

    /// Runs `f` on an attached device.
    fn with_dev<R>(&self, dev_id: u8, f: impl FnOnce(&mut EventDev) -> AxResult<R>) -> AxResult<R> {
        let Some(slot) = self.devices.get(usize::from(dev_id)) else {
            error!("Invalid dev_id={}", dev_id);
            return ax_err!(InvalidInput, "invalid dev_id");
        };
        match slot.lock().as_mut() {
            Some(dev) => f(dev),
            None => {
                error!("Invalid dev_id={}", dev_id);
                ax_err!(InvalidInput, "invalid dev_id")
            }
        }
    }

    /// Attaches a driver and returns the new `dev_id`.
    ///
    /// # Errors
    ///
    /// - `InvalidInput` if `name` is empty or too long.
    /// - `AlreadyExists` if a device with `name` is attached.
    /// - `NoMemory` if every slot is taken.
    pub fn allocate(&self, name: &str, socket_id: i32, driver: Box<dyn EventDevDriver>) -> AxResult<u8> {
        if name.is_empty() || name.len() >= EVENTDEV_NAME_MAX_LEN {
            error!("Invalid event device name {:?}", name);
            return ax_err!(InvalidInput, "invalid device name");
        }
        if self.get_dev_id_by_name(name).is_ok() {
            error!("Event device with name {} already allocated!", name);
            return ax_err!(AlreadyExists, "device name in use");
        }

        for (dev_id, slot) in self.devices.iter().enumerate() {
            let mut slot = slot.lock();
            if slot.is_none() {
                let dev_id = dev_id as u8;
                *slot = Some(EventDev::new(String::from(name), dev_id, socket_id, driver));
                self.fp[usize::from(dev_id)].reset();
                self.nb_devs.fetch_add(1, Ordering::AcqRel);
                debug!("Event device {} attached as dev_id={}", name, dev_id);
                return Ok(dev_id);
            }
        }

        error!("Reached maximum number of event devices");
        ax_err!(NoMemory, "no free event device slot")
    }

    /// Detaches a device and frees its slot.
    ///
    /// # Errors
    ///
    /// `ResourceBusy` if the device is started.
    pub fn release(&self, dev_id: u8) -> AxResult {
        let Some(slot) = self.devices.get(usize::from(dev_id)) else {
            return ax_err!(InvalidInput, "invalid dev_id");
        };
        let mut slot = slot.lock();
        let started = match slot.as_ref() {
            Some(dev) => dev.data().is_started(),
            None => return ax_err!(InvalidInput, "invalid dev_id"),
        };
        if started {
            error!("Device {} must be stopped before release", dev_id);
            return ax_err!(ResourceBusy, "device is started");
        }

        *slot = None;
        self.fp[usize::from(dev_id)].reset();
        self.nb_devs.fetch_sub(1, Ordering::AcqRel);
        debug!("dev{} released", dev_id);
        Ok(())
    }

    /// Number of attached devices.
    pub fn count(&self) -> usize {
        self.nb_devs.load(Ordering::Acquire)
    }

    /// Whether `dev_id` names an attached device.
    pub fn is_valid_dev(&self, dev_id: u8) -> bool {
        self.devices
            .get(usize::from(dev_id))
            .is_some_and(|slot| slot.lock().is_some())
    }

    pub fn get_dev_id_by_name(&self, name: &str) -> AxResult<u8> {
        if name.is_empty() {
            return ax_err!(InvalidInput, "empty device name");
        }
        for (dev_id, slot) in self.devices.iter().enumerate() {
            if slot.lock().as_ref().is_some_and(|dev| dev.data().name() == name) {
                return Ok(dev_id as u8);
            }
        }
        ax_err!(NotFound)
    }

    /// NUMA hint of a device; `0` when unknown.
    pub fn socket_id(&self, dev_id: u8) -> AxResult<i32> {
        self.with_dev(dev_id, |dev| Ok(dev.data().socket_id().max(0)))
    }

    pub fn info_get(&self, dev_id: u8) -> AxResult<DevInfo> {
        self.with_dev(dev_id, |dev| dev.info_get())
    }

    pub fn attr_get(&self, dev_id: u8, attr: DevAttr) -> AxResult<u32> {
        self.with_dev(dev_id, |dev| Ok(dev.attr_get(attr)))
    }

    /// The configuration currently applied.
    pub fn dev_conf(&self, dev_id: u8) -> AxResult<DevConfig> {
        self.with_dev(dev_id, |dev| Ok(*dev.data().dev_conf()))
    }

    pub fn state(&self, dev_id: u8) -> AxResult<DevState> {
        self.with_dev(dev_id, |dev| Ok(dev.data().state()))
    }

    pub fn is_started(&self, dev_id: u8) -> AxResult<bool> {
        self.with_dev(dev_id, |dev| Ok(dev.data().is_started()))
    }

    /// Last control-path error code of a device, `0` if none.
    pub fn errno(&self, dev_id: u8) -> AxResult<i32> {
        self.with_dev(dev_id, |dev| Ok(dev.data().errno().code()))
    }

    /// Configures a device. See [`EventDev::configure`].
    pub fn configure(&self, dev_id: u8, conf: &DevConfig) -> AxResult {
        self.with_dev(dev_id, |dev| dev.configure(conf))
    }

    pub fn queue_default_conf(&self, dev_id: u8, queue_id: u8) -> AxResult<QueueConf> {
        self.with_dev(dev_id, |dev| dev.queue_default_conf(queue_id))
    }

    pub fn queue_setup(&self, dev_id: u8, queue_id: u8, conf: Option<&QueueConf>) -> AxResult {
        self.with_dev(dev_id, |dev| dev.queue_setup(queue_id, conf))
    }

    pub fn queue_count(&self, dev_id: u8) -> AxResult<u8> {
        self.with_dev(dev_id, |dev| Ok(dev.data().nb_queues()))
    }

    pub fn queue_attr_get(&self, dev_id: u8, queue_id: u8, attr: QueueAttr) -> AxResult<u64> {
        self.with_dev(dev_id, |dev| dev.queue_attr_get(queue_id, attr))
    }

    pub fn queue_attr_set(&self, dev_id: u8, queue_id: u8, attr: QueueAttr, value: u64) -> AxResult {
        self.with_dev(dev_id, |dev| dev.queue_attr_set(queue_id, attr, value))
    }

    /// Priority of a queue; normal priority unless the device has queue QoS.
    pub fn queue_priority(&self, dev_id: u8, queue_id: u8) -> AxResult<u8> {
        self.queue_attr_get(dev_id, queue_id, QueueAttr::Priority)
            .map(|prio| prio as u8)
    }

    pub fn port_default_conf(&self, dev_id: u8, port_id: u8) -> AxResult<PortConf> {
        self.with_dev(dev_id, |dev| dev.port_default_conf(port_id))
    }

    pub fn port_setup(&self, dev_id: u8, port_id: u8, conf: Option<&PortConf>) -> AxResult {
        self.with_dev(dev_id, |dev| dev.port_setup(port_id, conf))
    }

    pub fn port_count(&self, dev_id: u8) -> AxResult<u8> {
        self.with_dev(dev_id, |dev| Ok(dev.data().nb_ports()))
    }

    pub fn port_attr_get(&self, dev_id: u8, port_id: u8, attr: PortAttr) -> AxResult<u32> {
        self.with_dev(dev_id, |dev| dev.port_attr_get(port_id, attr))
    }

    pub fn port_dequeue_depth(&self, dev_id: u8, port_id: u8) -> AxResult<u16> {
        self.port_attr_get(dev_id, port_id, PortAttr::DeqDepth)
            .map(|depth| depth as u16)
    }

    pub fn port_enqueue_depth(&self, dev_id: u8, port_id: u8) -> AxResult<u16> {
        self.port_attr_get(dev_id, port_id, PortAttr::EnqDepth)
            .map(|depth| depth as u16)
    }

    /// Releases the events a port holds, handing each to `flush`.
    pub fn port_quiesce(&self, dev_id: u8, port_id: u8, flush: &mut dyn FnMut(Event)) -> AxResult {
        self.with_dev(dev_id, |dev| dev.port_quiesce(port_id, flush))
    }

    /// Links queues to a port in profile 0. See [`EventDev::port_link`].
    pub fn port_link(
        &self,
        dev_id: u8,
        port_id: u8,
        queues: Option<&[u8]>,
        priorities: Option<&[u8]>,
    ) -> AxResult<usize> {
        self.port_profile_links_set(dev_id, port_id, queues, priorities, 0)
    }

    pub fn port_profile_links_set(
        &self,
        dev_id: u8,
        port_id: u8,
        queues: Option<&[u8]>,
        priorities: Option<&[u8]>,
        profile: u8,
    ) -> AxResult<usize> {
        self.with_dev(dev_id, |dev| dev.port_link(port_id, queues, priorities, profile))
    }

    /// Unlinks queues from a port in profile 0. See [`EventDev::port_unlink`].
    pub fn port_unlink(&self, dev_id: u8, port_id: u8, queues: Option<&[u8]>) -> AxResult<usize> {
        self.port_profile_unlink(dev_id, port_id, queues, 0)
    }

    pub fn port_profile_unlink(
        &self,
        dev_id: u8,
        port_id: u8,
        queues: Option<&[u8]>,
        profile: u8,
    ) -> AxResult<usize> {
        self.with_dev(dev_id, |dev| dev.port_unlink(port_id, queues, profile))
    }

    pub fn port_unlinks_in_progress(&self, dev_id: u8, port_id: u8) -> AxResult<usize> {
        self.with_dev(dev_id, |dev| dev.port_unlinks_in_progress(port_id))
    }

    /// Links of a port in profile 0, read from the library's link map.
    pub fn port_links_get(&self, dev_id: u8, port_id: u8) -> AxResult<PortLinks> {
        self.port_profile_links_get(dev_id, port_id, 0)
    }

    pub fn port_profile_links_get(&self, dev_id: u8, port_id: u8, profile: u8) -> AxResult<PortLinks> {
        self.with_dev(dev_id, |dev| dev.port_links_get(port_id, profile))
    }

    /// Converts a dequeue timeout in nanoseconds to device ticks.
    pub fn dequeue_timeout_ticks(&self, dev_id: u8, ns: u64) -> AxResult<u64> {
        self.with_dev(dev_id, |dev| dev.timeout_ticks(ns))
    }

    pub fn dump(&self, dev_id: u8, out: &mut dyn fmt::Write) -> AxResult {
        self.with_dev(dev_id, |dev| dev.dump(out))
    }

    pub fn xstats_names_get(&self, dev_id: u8, mode: XstatsMode) -> AxResult<Vec<XstatsName>> {
        self.with_dev(dev_id, |dev| dev.xstats_names_get(mode))
    }

    pub fn xstats_get(&self, dev_id: u8, mode: XstatsMode, ids: &[u64]) -> AxResult<Vec<u64>> {
        self.with_dev(dev_id, |dev| dev.xstats_get(mode, ids))
    }

    pub fn xstats_by_name_get(&self, dev_id: u8, name: &str) -> AxResult<(u64, u64)> {
        self.with_dev(dev_id, |dev| dev.xstats_by_name_get(name))
    }

    pub fn xstats_reset(&self, dev_id: u8, mode: XstatsMode, ids: &[u64]) -> AxResult {
        self.with_dev(dev_id, |dev| dev.xstats_reset(mode, ids))
    }

    /// Registers the callback receiving events flushed by `stop`. `None`
    /// unregisters it.
    pub fn stop_flush_callback_register(&self, dev_id: u8, callback: Option<StopFlushFn>) -> AxResult {
        self.with_dev(dev_id, |dev| {
            dev.set_stop_flush(callback);
            Ok(())
        })
    }

    /// Starts a device and publishes its ports to the fast path.
    pub fn start(&self, dev_id: u8) -> AxResult {
        self.with_dev(dev_id, |dev| {
            dev.start()?;
            let data = dev.data();
            self.fp[usize::from(dev_id)].install(
                dev.fp_ports(),
                data.event_dev_cap(),
                data.max_profiles_per_port(),
            );
            Ok(())
        })
    }

    /// Stops a device; its ports fall back to the dummy fast path.
    pub fn stop(&self, dev_id: u8) -> AxResult {
        self.with_dev(dev_id, |dev| {
            dev.stop();
            self.fp[usize::from(dev_id)].reset();
            Ok(())
        })
    }

    pub fn close(&self, dev_id: u8) -> AxResult {
        self.with_dev(dev_id, |dev| {
            dev.close()?;
            self.fp[usize::from(dev_id)].reset();
            Ok(())
        })
    }

    /// Timer adapter capabilities and operations of a device.
    pub fn timer_adapter_caps_get(
        &self,
        dev_id: u8,
    ) -> AxResult<(TimerAdapterCaps, Option<Arc<dyn TimerAdapterOps>>)> {
        self.with_dev(dev_id, |dev| dev.timer_adapter_caps_get())
    }
}

impl Default for EventDevRegistry {
    fn default() -> Self {
        Self::new()
    }
}
