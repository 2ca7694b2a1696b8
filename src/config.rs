//! Device, queue and port configuration.
//!
//! Everything an application hands to the control path is plain `Copy` data
//! defined here, together with the capability and flag sets a driver
//! advertises and the attribute ids readable after setup.

use core::fmt;

use bitflags::bitflags;

use crate::event::SchedType;

/// Highest event or queue priority.
pub const PRIORITY_HIGHEST: u8 = 0;
/// Default priority.
pub const PRIORITY_NORMAL: u8 = 128;
/// Lowest event or queue priority.
pub const PRIORITY_LOWEST: u8 = 255;

bitflags! {
    /// Capabilities an event device advertises through `info_get`.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct EventDevCap: u32 {
        /// Queues honour their configured priority.
        const QUEUE_QOS = 1 << 0;
        /// Events honour their own priority field.
        const EVENT_QOS = 1 << 1;
        /// Scheduling happens inside the enqueue/dequeue calls.
        const DISTRIBUTED_SCHED = 1 << 2;
        /// A queue may carry atomic, ordered and parallel events at once.
        const QUEUE_ALL_TYPES = 1 << 3;
        /// Burst enqueue/dequeue is supported natively.
        const BURST_MODE = 1 << 4;
        /// Ports may disable implicit release.
        const IMPLICIT_RELEASE_DISABLE = 1 << 5;
        /// Dequeue may return events out of a non-sequential order.
        const NONSEQ_MODE = 1 << 6;
        /// Links may change while the device runs.
        const RUNTIME_PORT_LINK = 1 << 7;
        /// A port may be linked to more than one queue.
        const MULTIPLE_QUEUE_PORT = 1 << 8;
        /// The flow id survives a trip through the device.
        const CARRY_FLOW_ID = 1 << 9;
        /// `maintain` never needs to be called.
        const MAINTENANCE_FREE = 1 << 10;
        /// Queue attributes may change while the device runs.
        const RUNTIME_QUEUE_ATTR = 1 << 11;
        /// Ports hold more than one link profile.
        const PROFILE_LINK = 1 << 12;
        /// Atomic scheduling.
        const ATOMIC = 1 << 13;
        /// Ordered scheduling.
        const ORDERED = 1 << 14;
        /// Parallel scheduling.
        const PARALLEL = 1 << 15;
        /// Ports may enqueue forwarded events in any order.
        const INDEPENDENT_ENQ = 1 << 16;
        const EVENT_PRESCHEDULE = 1 << 17;
        const EVENT_PRESCHEDULE_ADAPTIVE = 1 << 18;
        const PER_PORT_PRESCHEDULE = 1 << 19;
        const PRESCHEDULE_EXPLICIT = 1 << 20;
    }

    /// Device-wide configuration flags.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct DevCfgFlags: u32 {
        /// Every dequeue call supplies its own timeout; the device-level
        /// timeout is not range-checked.
        const PER_DEQUEUE_TIMEOUT = 1 << 0;
    }

    /// Per-queue configuration flags.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct QueueCfgFlags: u32 {
        /// The queue accepts every schedule type.
        const ALL_TYPES = 1 << 0;
        /// The queue is linked to exactly one port.
        const SINGLE_LINK = 1 << 1;
    }

    /// Per-port configuration flags.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct PortCfgFlags: u32 {
        /// The application releases events explicitly.
        const DISABLE_IMPL_REL = 1 << 0;
        /// The port is the only one linked to its queue.
        const SINGLE_LINK = 1 << 1;
        const HINT_PRODUCER = 1 << 2;
        const HINT_CONSUMER = 1 << 3;
        const HINT_WORKER = 1 << 4;
        /// Forwarded events may be enqueued in any order.
        const INDEPENDENT_ENQ = 1 << 5;
    }

    /// Flags for `maintain`.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct MaintainFlags: u32 {
        /// Flush buffered events to the device.
        const FLUSH = 1 << 0;
    }
}

/// Event preschedule policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[repr(u8)]
pub enum PreschedType {
    #[default]
    None = 0,
    /// Preschedule on every dequeue.
    Prescheduled = 1,
    /// Preschedule only while the port keeps dequeuing.
    Adaptive = 2,
}

/// Limits and capabilities reported by a driver.
#[derive(Debug, Clone, Copy, Default)]
pub struct DevInfo {
    pub driver_name: &'static str,
    pub min_dequeue_timeout_ns: u32,
    pub max_dequeue_timeout_ns: u32,
    /// Filled from the live configuration, not from the driver.
    pub dequeue_timeout_ns: u32,
    pub max_event_queues: u8,
    pub max_event_queue_flows: u32,
    pub max_event_queue_priority_levels: u8,
    pub max_event_priority_levels: u8,
    pub max_event_ports: u8,
    pub max_event_port_dequeue_depth: u32,
    pub max_event_port_enqueue_depth: u32,
    pub max_event_port_links: u32,
    /// In-flight event cap of a closed system; `-1` for an open system.
    pub max_num_events: i32,
    pub event_dev_cap: EventDevCap,
    pub max_single_link_event_port_queue_pairs: u8,
    pub max_profiles_per_port: u8,
}

/// Device-wide configuration applied by `configure`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DevConfig {
    pub dequeue_timeout_ns: u32,
    pub nb_events_limit: i32,
    pub nb_event_queues: u8,
    pub nb_event_ports: u8,
    pub nb_event_queue_flows: u32,
    pub nb_event_port_dequeue_depth: u32,
    pub nb_event_port_enqueue_depth: u32,
    pub event_dev_cfg: DevCfgFlags,
    pub nb_single_link_event_port_queues: u8,
    pub preschedule_type: PreschedType,
}

/// The configuration field a [`ConfigViolation`] refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigField {
    DequeueTimeoutNs,
    EventsLimit,
    EventQueues,
    EventPorts,
    SingleLinkQueues,
    QueueFlows,
    PortDequeueDepth,
    PortEnqueueDepth,
}

impl ConfigField {
    fn name(self) -> &'static str {
        match self {
            Self::DequeueTimeoutNs => "dequeue_timeout_ns",
            Self::EventsLimit => "nb_events_limit",
            Self::EventQueues => "nb_event_queues",
            Self::EventPorts => "nb_event_ports",
            Self::SingleLinkQueues => "nb_single_link_event_port_queues",
            Self::QueueFlows => "nb_event_queue_flows",
            Self::PortDequeueDepth => "nb_event_port_dequeue_depth",
            Self::PortEnqueueDepth => "nb_event_port_enqueue_depth",
        }
    }
}

/// A `DevConfig` field outside the range the device supports.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConfigViolation {
    pub field: ConfigField,
    pub value: i64,
    pub min: i64,
    pub max: i64,
}

impl ConfigViolation {
    fn check(field: ConfigField, value: i64, min: i64, max: i64) -> Result<(), Self> {
        if value < min || value > max {
            Err(Self {
                field,
                value,
                min,
                max,
            })
        } else {
            Ok(())
        }
    }
}

impl fmt::Display for ConfigViolation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}={} not in [{}, {}]",
            self.field.name(),
            self.value,
            self.min,
            self.max
        )
    }
}

impl DevConfig {
    /// Builds a configuration requesting every maximum `info` reports.
    pub fn from_info(info: &DevInfo) -> Self {
        Self {
            dequeue_timeout_ns: info.min_dequeue_timeout_ns,
            nb_events_limit: info.max_num_events,
            nb_event_queues: info.max_event_queues,
            nb_event_ports: info.max_event_ports,
            nb_event_queue_flows: info.max_event_queue_flows,
            nb_event_port_dequeue_depth: info.max_event_port_dequeue_depth,
            nb_event_port_enqueue_depth: info.max_event_port_enqueue_depth,
            ..Default::default()
        }
    }

    /// Number of queues that are not part of a single-link pair.
    #[inline]
    pub fn nb_load_balanced_queues(&self) -> u8 {
        self.nb_event_queues
            .saturating_sub(self.nb_single_link_event_port_queues)
    }

    /// Checks every field against the limits in `info`.
    ///
    /// Fields are checked in a fixed order and the first violation is
    /// returned. A zero `dequeue_timeout_ns` selects the device default and
    /// is always accepted.
    pub fn validate(&self, info: &DevInfo) -> Result<(), ConfigViolation> {
        use ConfigField::*;

        if !self.event_dev_cfg.contains(DevCfgFlags::PER_DEQUEUE_TIMEOUT)
            && self.dequeue_timeout_ns != 0
        {
            ConfigViolation::check(
                DequeueTimeoutNs,
                self.dequeue_timeout_ns.into(),
                info.min_dequeue_timeout_ns.into(),
                info.max_dequeue_timeout_ns.into(),
            )?;
        }

        // A negative maximum means an open system
        if info.max_num_events >= 0 {
            ConfigViolation::check(
                EventsLimit,
                self.nb_events_limit.into(),
                i64::MIN,
                info.max_num_events.into(),
            )?;
        }

        let pairs = i64::from(info.max_single_link_event_port_queue_pairs);
        ConfigViolation::check(
            EventQueues,
            self.nb_event_queues.into(),
            1,
            i64::from(info.max_event_queues) + pairs,
        )?;
        ConfigViolation::check(
            SingleLinkQueues,
            self.nb_single_link_event_port_queues.into(),
            0,
            self.nb_event_queues.into(),
        )?;
        ConfigViolation::check(
            EventQueues,
            self.nb_load_balanced_queues().into(),
            0,
            info.max_event_queues.into(),
        )?;

        ConfigViolation::check(
            EventPorts,
            self.nb_event_ports.into(),
            1,
            i64::from(info.max_event_ports) + pairs,
        )?;
        ConfigViolation::check(
            SingleLinkQueues,
            self.nb_single_link_event_port_queues.into(),
            0,
            self.nb_event_ports.into(),
        )?;
        ConfigViolation::check(
            EventPorts,
            self.nb_event_ports
                .saturating_sub(self.nb_single_link_event_port_queues)
                .into(),
            0,
            info.max_event_ports.into(),
        )?;

        ConfigViolation::check(
            SingleLinkQueues,
            self.nb_single_link_event_port_queues.into(),
            0,
            pairs,
        )?;

        ConfigViolation::check(
            QueueFlows,
            self.nb_event_queue_flows.into(),
            1,
            info.max_event_queue_flows.into(),
        )?;
        ConfigViolation::check(
            PortDequeueDepth,
            self.nb_event_port_dequeue_depth.into(),
            1,
            info.max_event_port_dequeue_depth.into(),
        )?;
        ConfigViolation::check(
            PortEnqueueDepth,
            self.nb_event_port_enqueue_depth.into(),
            1,
            info.max_event_port_enqueue_depth.into(),
        )
    }
}

/// Configuration of one event queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueueConf {
    pub nb_atomic_flows: u32,
    pub nb_atomic_order_sequences: u32,
    pub event_queue_cfg: QueueCfgFlags,
    /// Ignored when `event_queue_cfg` has [`QueueCfgFlags::ALL_TYPES`].
    pub schedule_type: SchedType,
    pub priority: u8,
    pub weight: u8,
    pub affinity: u8,
}

impl Default for QueueConf {
    fn default() -> Self {
        Self {
            nb_atomic_flows: 0,
            nb_atomic_order_sequences: 0,
            event_queue_cfg: QueueCfgFlags::empty(),
            schedule_type: SchedType::Atomic,
            priority: PRIORITY_NORMAL,
            weight: 0,
            affinity: 0,
        }
    }
}

impl QueueConf {
    /// Whether the queue may carry atomic events.
    #[inline]
    pub fn wants_atomic(&self) -> bool {
        self.event_queue_cfg.contains(QueueCfgFlags::ALL_TYPES)
            || self.schedule_type == SchedType::Atomic
    }

    /// Whether the queue may carry ordered events.
    #[inline]
    pub fn wants_ordered(&self) -> bool {
        self.event_queue_cfg.contains(QueueCfgFlags::ALL_TYPES)
            || self.schedule_type == SchedType::Ordered
    }
}

/// Configuration of one event port.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PortConf {
    /// New-event backpressure threshold of a closed system.
    pub new_event_threshold: i32,
    pub dequeue_depth: u16,
    pub enqueue_depth: u16,
    pub event_port_cfg: PortCfgFlags,
}

/// Device attributes readable through `attr_get`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DevAttr {
    PortCount,
    QueueCount,
    Started,
}

/// Queue attributes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueueAttr {
    Priority,
    NbAtomicFlows,
    NbAtomicOrderSequences,
    EventQueueCfg,
    ScheduleType,
    Weight,
    Affinity,
}

impl QueueAttr {
    /// Whether the attribute may be changed after setup.
    pub fn is_runtime_settable(self) -> bool {
        matches!(self, Self::Priority | Self::Weight | Self::Affinity)
    }
}

/// Port attributes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PortAttr {
    EnqDepth,
    DeqDepth,
    NewEventThreshold,
    ImplicitReleaseDisable,
}
