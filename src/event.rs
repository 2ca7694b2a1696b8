//! The event record scheduled by a device.

/// Flow ids are 20 bits wide.
pub const FLOW_ID_MASK: u32 = 0xF_FFFF;

/// How a queue schedules the events of one flow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[repr(u8)]
pub enum SchedType {
    /// Order is restored when events of a flow are forwarded.
    Ordered = 0,
    /// At most one port holds a flow at a time.
    #[default]
    Atomic = 1,
    /// No ordering or exclusivity.
    Parallel = 2,
}

/// What an enqueued event means to the device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[repr(u8)]
pub enum EventOp {
    /// First injection into the device.
    #[default]
    New = 0,
    /// Re-enqueue of an event dequeued on the same port.
    Forward = 1,
    /// Completion of an event dequeued on the same port.
    Release = 2,
}

/// Producer class of an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[repr(u8)]
pub enum EventType {
    Ethdev = 0x0,
    Cryptodev = 0x1,
    Timer = 0x2,
    #[default]
    Cpu = 0x3,
    EthRxAdapter = 0x4,
    Dmadev = 0x5,
    EthdevVector = 0x8,
    CryptodevVector = 0x9,
    CpuVector = 0xB,
    EthRxAdapterVector = 0xC,
}

impl EventType {
    const VECTOR: u8 = 0x8;

    /// Whether the payload is an event vector.
    #[inline]
    pub const fn is_vector(self) -> bool {
        self as u8 & Self::VECTOR != 0
    }
}

/// The 64-bit payload carried by an event.
///
/// Pointer variants are opaque addresses; the device never dereferences
/// them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventPayload {
    U64(u64),
    Ptr(usize),
    Mbuf(usize),
    Vector(usize),
}

impl Default for EventPayload {
    fn default() -> Self {
        Self::U64(0)
    }
}

/// A unit of scheduling.
///
/// `impl_opaque` belongs to the driver: an application forwarding or
/// releasing an event must hand it back unchanged.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Event {
    flow_id: u32,
    pub sub_event_type: u8,
    pub event_type: EventType,
    pub op: EventOp,
    pub sched_type: SchedType,
    pub queue_id: u8,
    pub priority: u8,
    pub impl_opaque: u8,
    pub payload: EventPayload,
}

impl Event {
    /// Creates a NEW event for `queue_id` at normal priority.
    pub const fn new(queue_id: u8) -> Self {
        Self {
            flow_id: 0,
            sub_event_type: 0,
            event_type: EventType::Cpu,
            op: EventOp::New,
            sched_type: SchedType::Atomic,
            queue_id,
            priority: crate::config::PRIORITY_NORMAL,
            impl_opaque: 0,
            payload: EventPayload::U64(0),
        }
    }

    #[inline]
    pub const fn flow_id(&self) -> u32 {
        self.flow_id
    }

    /// Sets the flow id, keeping the low 20 bits.
    #[inline]
    pub fn set_flow_id(&mut self, flow_id: u32) {
        self.flow_id = flow_id & FLOW_ID_MASK;
    }

    pub const fn with_flow_id(mut self, flow_id: u32) -> Self {
        self.flow_id = flow_id & FLOW_ID_MASK;
        self
    }

    pub const fn with_sched_type(mut self, sched_type: SchedType) -> Self {
        self.sched_type = sched_type;
        self
    }

    pub const fn with_event_type(mut self, event_type: EventType, sub_event_type: u8) -> Self {
        self.event_type = event_type;
        self.sub_event_type = sub_event_type;
        self
    }

    pub const fn with_priority(mut self, priority: u8) -> Self {
        self.priority = priority;
        self
    }

    pub const fn with_payload(mut self, payload: EventPayload) -> Self {
        self.payload = payload;
        self
    }

    /// Turns a dequeued event into a FORWARD to `queue_id`.
    pub const fn forward_to(mut self, queue_id: u8) -> Self {
        self.op = EventOp::Forward;
        self.queue_id = queue_id;
        self
    }

    /// Turns a dequeued event into a RELEASE.
    pub const fn into_release(mut self) -> Self {
        self.op = EventOp::Release;
        self
    }
}
