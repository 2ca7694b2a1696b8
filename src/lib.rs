#![no_std]

//! # ArceOS Event Device Framework
//!
//! This crate provides the device-independent layer of event-driven packet
//! processing: event producers (NIC receive, timers, crypto completions,
//! CPU-generated work) and worker threads exchange work through the queues
//! and ports of an *event device*, which load-balances it across workers
//! while keeping per-flow ordering guarantees.
//!
//! It is designed for `no_std` environments and uses the `alloc` crate for
//! dynamic memory allocation.
//!
//! ## Architecture
//!
//! ### Control Path
//! - [`EventDevRegistry`]: fixed-capacity device table and the control API
//!   (configure, queue/port setup, link/unlink, start/stop/close)
//! - [`EventDev`] / [`EventDevData`]: per-device configuration state machine
//! - [`DevLifecycle`]: atomic device state (Unconfigured/Configured/Started/Stopped/Closed)
//! - [`LinkMap`]: port-to-queue link map with link profiles
//!
//! ### Fast Path
//! - [`EventDevRegistry::enqueue_burst`] / [`EventDevRegistry::dequeue_burst`]
//!   and friends, resolved through a per-device dispatch table captured at
//!   start time
//! - [`Errno`]: per-port side channel explaining short burst counts
//!
//! ### Drivers
//! - [`EventDevDriver`]: configuration-path driver operations
//! - [`EventPort`]: fast-path operations of one port
//!
//! ### Timer Adapter
//! - [`TimerAdapterRegistry`]: adapter create/lookup/free, backed by
//!   [`NamedZones`] shared blocks
//!
//! ## Examples
//!
//! ```rust,ignore
//! use axeventdev::{event_devices, DevConfig, Event, PortConf, QueueConf};
//!
//! let devs = event_devices();
//! let dev_id = devs.allocate("event_sw0", 0, Box::new(my_driver))?;
//!
//! let info = devs.info_get(dev_id)?;
//! let mut conf = DevConfig::from_info(&info);
//! conf.nb_event_queues = 2;
//! conf.nb_event_ports = 1;
//! devs.configure(dev_id, &conf)?;
//!
//! devs.queue_setup(dev_id, 0, None)?;
//! devs.queue_setup(dev_id, 1, None)?;
//! devs.port_setup(dev_id, 0, None)?;
//! devs.port_link(dev_id, 0, None, None)?;
//! devs.start(dev_id)?;
//!
//! // Worker loop
//! let mut evs = [Event::default(); 32];
//! loop {
//!     let n = devs.dequeue_burst(dev_id, 0, &mut evs, 0);
//!     for ev in &mut evs[..n] {
//!         *ev = ev.forward_to(1);
//!     }
//!     devs.enqueue_forward_burst(dev_id, 0, &evs[..n]);
//! }
//! ```

extern crate alloc;
#[macro_use]
extern crate log;

mod config;
mod device;
mod dispatch;
mod driver;
mod errno;
mod event;
mod lifecycle;
mod links;
mod memzone;
mod registry;
mod timer_adapter;

pub use config::{
    ConfigField, ConfigViolation, DevAttr, DevCfgFlags, DevConfig, DevInfo, EventDevCap,
    MaintainFlags, PRIORITY_HIGHEST, PRIORITY_LOWEST, PRIORITY_NORMAL, PortAttr, PortCfgFlags,
    PortConf, PreschedType, QueueAttr, QueueCfgFlags, QueueConf,
};
pub use device::{EventDev, EventDevData, StopFlushFn};
pub use driver::{EventDevDriver, EventPort, XstatsMode, XstatsName};
pub use errno::Errno;
pub use event::{Event, EventOp, EventPayload, EventType, FLOW_ID_MASK, SchedType};
pub use lifecycle::{DevLifecycle, DevState};
pub use links::{LINK_UNLINKED, LinkMap, PortLinks, QueueLink};
pub use memzone::NamedZones;
pub use registry::{EventDevRegistry, event_devices};
pub use timer_adapter::{
    EventTimer, EventTimerState, MAX_TIMER_ADAPTERS, TimerAdapter, TimerAdapterCaps,
    TimerAdapterConfig, TimerAdapterData, TimerAdapterFlags, TimerAdapterInfo, TimerAdapterOps,
    TimerAdapterRegistry, TimerClockSource, default_port_conf_cb,
};

/// Maximum number of attached event devices.
pub const MAX_EVENT_DEVS: usize = 16;
/// Maximum number of event queues per device.
pub const MAX_QUEUES_PER_DEV: usize = 255;
/// Maximum number of event ports per device.
pub const MAX_PORTS_PER_DEV: usize = 255;
/// Maximum number of link profiles per port.
pub const MAX_PROFILES_PER_PORT: usize = 8;
/// Maximum length of a device name, terminator included.
pub const EVENTDEV_NAME_MAX_LEN: usize = 64;
