//! Driver interfaces.
//!
//! A driver plugs into the library through two traits:
//!
//! - [`EventDevDriver`]: the configuration-path operations. Called under the
//!   device lock, never on the per-event path. Every operation except
//!   [`EventDevDriver::info_get`] and [`EventDevDriver::configure`] has a
//!   default that reports `Unsupported`.
//! - [`EventPort`]: the fast-path operations of one port. Handles are
//!   returned by `port_setup` and cached in the dispatch table while the
//!   device runs, so a burst call does not go through the device.

use alloc::string::String;
use alloc::sync::Arc;
use alloc::vec::Vec;
use core::fmt;

use axerrno::{AxResult, ax_err};

use crate::config::{DevInfo, MaintainFlags, PortConf, PreschedType, QueueAttr, QueueConf};
use crate::device::EventDevData;
use crate::errno::Errno;
use crate::event::Event;
use crate::timer_adapter::{TimerAdapterCaps, TimerAdapterOps};

/// Scope of an extended statistics request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum XstatsMode {
    Device,
    Port(u8),
    Queue(u8),
}

/// Name and id of one extended statistic.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct XstatsName {
    pub id: u64,
    pub name: String,
}

/// Configuration-path operations of an event device driver.
///
/// `data` is the library-owned device state; drivers read the live
/// configuration from it and report quota conditions through
/// [`EventDevData::errno`].
pub trait EventDevDriver: Send {
    /// Reports limits and capabilities.
    fn info_get(&self, data: &EventDevData) -> AxResult<DevInfo>;

    /// Applies `data.dev_conf()`.
    fn configure(&mut self, data: &EventDevData) -> AxResult;

    /// Default configuration of a queue.
    fn queue_def_conf(&self, _data: &EventDevData, _queue_id: u8) -> AxResult<QueueConf> {
        ax_err!(Unsupported)
    }

    fn queue_setup(&mut self, _data: &EventDevData, _queue_id: u8, _conf: &QueueConf) -> AxResult {
        ax_err!(Unsupported)
    }

    /// Releases a queue removed by reconfiguration or close.
    fn queue_release(&mut self, _data: &EventDevData, _queue_id: u8) {}

    /// Changes a runtime-settable queue attribute.
    fn queue_attr_set(
        &mut self,
        _data: &EventDevData,
        _queue_id: u8,
        _attr: QueueAttr,
        _value: u64,
    ) -> AxResult {
        ax_err!(Unsupported)
    }

    /// Default configuration of a port.
    fn port_def_conf(&self, _data: &EventDevData, _port_id: u8) -> AxResult<PortConf> {
        ax_err!(Unsupported)
    }

    /// Sets up a port and returns its fast-path handle.
    fn port_setup(
        &mut self,
        _data: &EventDevData,
        _port_id: u8,
        _conf: &PortConf,
    ) -> AxResult<Arc<dyn EventPort>> {
        ax_err!(Unsupported)
    }

    /// Releases a port removed by reconfiguration or close.
    fn port_release(&mut self, _data: &EventDevData, _port_id: u8) {}

    /// Releases the events held by a port, handing each to `flush`.
    fn port_quiesce(
        &mut self,
        _data: &EventDevData,
        _port_id: u8,
        _flush: &mut dyn FnMut(Event),
    ) -> AxResult {
        ax_err!(Unsupported)
    }

    /// Links `queues` to a port in link profile `profile`.
    ///
    /// Returns the number of leading entries established. A short count
    /// with [`axerrno::LinuxError::EDQUOT`] published in `data.errno()`
    /// reports a single-link queue already bound to another port.
    fn port_link(
        &mut self,
        _data: &EventDevData,
        _port_id: u8,
        _queues: &[u8],
        _priorities: &[u8],
        _profile: u8,
    ) -> AxResult<usize> {
        ax_err!(Unsupported)
    }

    /// Unlinks `queues` from a port in link profile `profile`.
    ///
    /// Returns the number of leading entries whose unlink was accepted; the
    /// unlink may still be in progress.
    fn port_unlink(
        &mut self,
        _data: &EventDevData,
        _port_id: u8,
        _queues: &[u8],
        _profile: u8,
    ) -> AxResult<usize> {
        ax_err!(Unsupported)
    }

    /// Number of accepted unlinks not yet completed.
    fn port_unlinks_in_progress(&self, _data: &EventDevData, _port_id: u8) -> AxResult<usize> {
        Ok(0)
    }

    /// Converts a dequeue timeout to device ticks. Must not block.
    fn timeout_ticks(&self, _data: &EventDevData, _ns: u64) -> AxResult<u64> {
        ax_err!(Unsupported)
    }

    /// Writes driver state in human readable form.
    fn dump(&self, _data: &EventDevData, _out: &mut dyn fmt::Write) -> AxResult {
        ax_err!(Unsupported)
    }

    fn start(&mut self, _data: &EventDevData) -> AxResult {
        ax_err!(Unsupported)
    }

    /// Stops scheduling. Events still inside the device go to `flush`.
    fn stop(&mut self, _data: &EventDevData, _flush: &mut dyn FnMut(Event)) {}

    fn close(&mut self, _data: &EventDevData) -> AxResult {
        ax_err!(Unsupported)
    }

    fn xstats_names_get(&self, _data: &EventDevData, _mode: XstatsMode) -> AxResult<Vec<XstatsName>> {
        ax_err!(Unsupported)
    }

    fn xstats_get(&self, _data: &EventDevData, _mode: XstatsMode, _ids: &[u64]) -> AxResult<Vec<u64>> {
        ax_err!(Unsupported)
    }

    /// Looks up one statistic by name, returning `(id, value)`.
    fn xstats_by_name_get(&self, _data: &EventDevData, _name: &str) -> AxResult<(u64, u64)> {
        ax_err!(Unsupported)
    }

    /// Resets the statistics in `ids`, or every statistic of `mode` when
    /// `ids` is empty.
    fn xstats_reset(&mut self, _data: &EventDevData, _mode: XstatsMode, _ids: &[u64]) -> AxResult {
        ax_err!(Unsupported)
    }

    /// Timer adapter support of this device.
    ///
    /// Returns the capability set and the adapter operations, `None` when the
    /// device offers no adapter implementation.
    fn timer_adapter_caps_get(
        &self,
        _data: &EventDevData,
    ) -> AxResult<(TimerAdapterCaps, Option<Arc<dyn TimerAdapterOps>>)> {
        ax_err!(Unsupported)
    }
}

/// Fast-path operations of one event port.
///
/// A port is driven by one thread at a time. `errno` is the port's side
/// channel: burst calls that return a short count publish the reason there.
pub trait EventPort: Send + Sync {
    /// Enqueues a burst; returns the number of leading events accepted.
    fn enqueue_burst(&self, events: &[Event], errno: &Errno) -> usize;

    /// Dequeues up to `events.len()` events, waiting up to `timeout_ticks`
    /// for the first one. Returns the number of slots filled.
    fn dequeue_burst(&self, events: &mut [Event], timeout_ticks: u64, errno: &Errno) -> usize;

    /// Enqueue of a burst made only of NEW events.
    fn enqueue_new_burst(&self, events: &[Event], errno: &Errno) -> usize {
        self.enqueue_burst(events, errno)
    }

    /// Enqueue of a burst made only of FORWARD events.
    fn enqueue_forward_burst(&self, events: &[Event], errno: &Errno) -> usize {
        self.enqueue_burst(events, errno)
    }

    fn maintain(&self, _flags: MaintainFlags) -> AxResult {
        Ok(())
    }

    /// Selects the link profile used by the next dequeue.
    fn profile_switch(&self, _profile: u8) -> AxResult {
        ax_err!(Unsupported)
    }

    fn preschedule_modify(&self, _kind: PreschedType) -> AxResult {
        ax_err!(Unsupported)
    }

    /// Hints the device to schedule for this port ahead of the next dequeue.
    fn preschedule(&self, _kind: PreschedType) {}

    /// Transmit adapter enqueue.
    fn txa_enqueue(&self, _events: &[Event], _errno: &Errno) -> usize {
        warn!("txa_enqueue not supported by port");
        0
    }

    /// Crypto adapter enqueue.
    fn ca_enqueue(&self, _events: &[Event], _errno: &Errno) -> usize {
        warn!("ca_enqueue not supported by port");
        0
    }

    /// DMA adapter enqueue.
    fn dma_enqueue(&self, _events: &[Event], _errno: &Errno) -> usize {
        warn!("dma_enqueue not supported by port");
        0
    }
}
