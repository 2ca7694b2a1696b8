//! Fast-path dispatch.
//!
//! Each device slot owns an [`FpSlot`]: one [`FpPort`] per port plus the
//! device capabilities captured when the device started. Burst calls resolve
//! `(dev_id, port_id)` to a port handle without touching the device record
//! or its lock.
//!
//! A port is published by setting its `live` flag after its handle is
//! stored. Readers test the flag first and fall back to a dummy when it is
//! clear, so once a stop clears the flags no new burst takes the port lock
//! and the writer only waits for bursts already in flight. Each port lock
//! is only ever shared by the thread driving that port and the control path.
//!
//! Until a device starts (and again after it stops or closes) every port
//! resolves to a dummy that logs an error and does nothing, so a stray call
//! fails loudly without reaching a driver.

use alloc::sync::Arc;
use alloc::vec::Vec;
use core::sync::atomic::{AtomicBool, AtomicU8, AtomicU32, Ordering};

use axerrno::{AxResult, ax_err};
use spin::{RwLock, RwLockReadGuard};

use crate::MAX_PORTS_PER_DEV;
use crate::config::{EventDevCap, MaintainFlags, PreschedType};
use crate::driver::EventPort;
use crate::errno::Errno;
use crate::event::Event;
use crate::registry::EventDevRegistry;

/// Device properties cached for the fast path.
#[derive(Debug, Clone, Copy, Default)]
struct FpInfo {
    cap: EventDevCap,
    max_profiles: u8,
}

type PortHandle = Option<Arc<dyn EventPort>>;

/// Fast-path state of one port.
pub(crate) struct FpPort {
    live: AtomicBool,
    handle: RwLock<PortHandle>,
    errno: Errno,
}

impl FpPort {
    fn new() -> Self {
        Self {
            live: AtomicBool::new(false),
            handle: RwLock::new(None),
            errno: Errno::new(),
        }
    }
}

/// Fast-path state of one device slot.
pub(crate) struct FpSlot {
    ports: [FpPort; MAX_PORTS_PER_DEV],
    cap: AtomicU32,
    max_profiles: AtomicU8,
}

impl FpSlot {
    pub(crate) fn new() -> Self {
        Self {
            ports: core::array::from_fn(|_| FpPort::new()),
            cap: AtomicU32::new(0),
            max_profiles: AtomicU8::new(0),
        }
    }

    /// Publishes the handles of a started device.
    pub(crate) fn install(&self, ports: Vec<PortHandle>, cap: EventDevCap, max_profiles: u8) {
        self.cap.store(cap.bits(), Ordering::Relaxed);
        self.max_profiles.store(max_profiles, Ordering::Relaxed);

        let mut handles = ports.into_iter();
        for slot in &self.ports {
            let handle = handles.next().flatten();
            let live = handle.is_some();
            slot.live.store(false, Ordering::Release);
            *slot.handle.write() = handle;
            slot.errno.clear();
            // The handle and the device info are visible before the flag
            slot.live.store(live, Ordering::Release);
        }
    }

    /// Points every port back at the dummy.
    pub(crate) fn reset(&self) {
        for slot in &self.ports {
            slot.live.store(false, Ordering::Release);
        }
        for slot in &self.ports {
            *slot.handle.write() = None;
        }
    }

    #[inline]
    fn info(&self) -> FpInfo {
        FpInfo {
            cap: EventDevCap::from_bits_retain(self.cap.load(Ordering::Relaxed)),
            max_profiles: self.max_profiles.load(Ordering::Relaxed),
        }
    }
}

struct DummyPort;

static DUMMY_PORT: DummyPort = DummyPort;

impl EventPort for DummyPort {
    fn enqueue_burst(&self, _events: &[Event], _errno: &Errno) -> usize {
        error!("event enqueue requested for unconfigured event device");
        0
    }

    fn dequeue_burst(&self, _events: &mut [Event], _timeout_ticks: u64, _errno: &Errno) -> usize {
        error!("event dequeue requested for unconfigured event device");
        0
    }

    fn maintain(&self, _flags: MaintainFlags) -> AxResult {
        error!("maintenance requested for unconfigured event device");
        Ok(())
    }

    fn profile_switch(&self, _profile: u8) -> AxResult {
        error!("change profile requested for unconfigured event device");
        ax_err!(InvalidInput, "unconfigured event device")
    }

    fn preschedule_modify(&self, _kind: PreschedType) -> AxResult {
        error!("modify pre-schedule requested for unconfigured event device");
        ax_err!(InvalidInput, "unconfigured event device")
    }

    fn preschedule(&self, _kind: PreschedType) {
        error!("pre-schedule requested for unconfigured event device");
    }

    fn txa_enqueue(&self, _events: &[Event], _errno: &Errno) -> usize {
        error!("event Tx adapter enqueue requested for unconfigured event device");
        0
    }

    fn ca_enqueue(&self, _events: &[Event], _errno: &Errno) -> usize {
        error!("event crypto adapter enqueue requested for unconfigured event device");
        0
    }

    fn dma_enqueue(&self, _events: &[Event], _errno: &Errno) -> usize {
        error!("event DMA adapter enqueue requested for unconfigured event device");
        0
    }
}

struct Resolved<'a> {
    guard: Option<RwLockReadGuard<'a, PortHandle>>,
    errno: &'a Errno,
    info: FpInfo,
}

impl Resolved<'_> {
    /// Returns `true` if a driver port, not the dummy, answers.
    #[inline]
    fn is_live(&self) -> bool {
        self.guard.as_ref().is_some_and(|g| g.is_some())
    }

    #[inline]
    fn port(&self) -> &dyn EventPort {
        match self.guard.as_deref() {
            Some(Some(port)) => port.as_ref(),
            _ => &DUMMY_PORT,
        }
    }
}

/// Fast-path API.
///
/// Safe to call concurrently for different ports; a single port must be
/// driven by one thread at a time. Ids beyond the table bounds are rejected
/// without touching any port.
impl EventDevRegistry {
    #[inline]
    fn resolve(&self, dev_id: u8, port_id: u8) -> Option<Resolved<'_>> {
        let Some(slot) = self.fp.get(usize::from(dev_id)) else {
            error!("Invalid dev_id={} on fast path", dev_id);
            return None;
        };
        let Some(port) = slot.ports.get(usize::from(port_id)) else {
            error!("Invalid port_id={} on fast path", port_id);
            return None;
        };
        if !port.live.load(Ordering::Acquire) {
            return Some(Resolved {
                guard: None,
                errno: &port.errno,
                info: FpInfo::default(),
            });
        }
        Some(Resolved {
            guard: Some(port.handle.read()),
            errno: &port.errno,
            info: slot.info(),
        })
    }

    /// Enqueues a burst on a port.
    ///
    /// Returns the number of leading events accepted. On a short count the
    /// port errno tells why: `EINVAL` for a malformed event, `ENOSPC` when a
    /// closed system hit its new-event threshold.
    pub fn enqueue_burst(&self, dev_id: u8, port_id: u8, events: &[Event]) -> usize {
        trace!("dev{} port{} enqueue {}", dev_id, port_id, events.len());
        match self.resolve(dev_id, port_id) {
            Some(r) => r.port().enqueue_burst(events, r.errno),
            None => 0,
        }
    }

    /// Like [`Self::enqueue_burst`] for bursts made only of NEW events.
    pub fn enqueue_new_burst(&self, dev_id: u8, port_id: u8, events: &[Event]) -> usize {
        match self.resolve(dev_id, port_id) {
            Some(r) => r.port().enqueue_new_burst(events, r.errno),
            None => 0,
        }
    }

    /// Like [`Self::enqueue_burst`] for bursts made only of FORWARD events.
    pub fn enqueue_forward_burst(&self, dev_id: u8, port_id: u8, events: &[Event]) -> usize {
        match self.resolve(dev_id, port_id) {
            Some(r) => r.port().enqueue_forward_burst(events, r.errno),
            None => 0,
        }
    }

    /// Dequeues up to `events.len()` events.
    ///
    /// `timeout_ticks == 0` returns immediately; otherwise the call may wait
    /// up to `timeout_ticks` for a first event.
    pub fn dequeue_burst(
        &self,
        dev_id: u8,
        port_id: u8,
        events: &mut [Event],
        timeout_ticks: u64,
    ) -> usize {
        trace!("dev{} port{} dequeue {}", dev_id, port_id, events.len());
        match self.resolve(dev_id, port_id) {
            Some(r) => r.port().dequeue_burst(events, timeout_ticks, r.errno),
            None => 0,
        }
    }

    /// Lets the device flush buffered state. A no-op on maintenance-free
    /// devices.
    pub fn maintain(&self, dev_id: u8, port_id: u8, flags: MaintainFlags) -> AxResult {
        let Some(r) = self.resolve(dev_id, port_id) else {
            return ax_err!(InvalidInput, "invalid event port");
        };
        if r.info.cap.contains(EventDevCap::MAINTENANCE_FREE) {
            return Ok(());
        }
        r.port().maintain(flags)
    }

    /// Selects the link profile used by the next dequeue on a port.
    pub fn profile_switch(&self, dev_id: u8, port_id: u8, profile: u8) -> AxResult {
        let Some(r) = self.resolve(dev_id, port_id) else {
            return ax_err!(InvalidInput, "invalid event port");
        };
        if r.is_live() && profile >= r.info.max_profiles {
            error!(
                "dev{} port{} Invalid profile_id={}, max {}",
                dev_id, port_id, profile, r.info.max_profiles
            );
            return ax_err!(InvalidInput, "invalid link profile");
        }
        r.port().profile_switch(profile)
    }

    /// Changes the preschedule policy of one port.
    pub fn preschedule_modify(&self, dev_id: u8, port_id: u8, kind: PreschedType) -> AxResult {
        let Some(r) = self.resolve(dev_id, port_id) else {
            return ax_err!(InvalidInput, "invalid event port");
        };
        if r.is_live() {
            let cap = r.info.cap;
            let supported = cap.contains(EventDevCap::PER_PORT_PRESCHEDULE)
                && match kind {
                    PreschedType::None => true,
                    PreschedType::Prescheduled => cap.contains(EventDevCap::EVENT_PRESCHEDULE),
                    PreschedType::Adaptive => {
                        cap.contains(EventDevCap::EVENT_PRESCHEDULE_ADAPTIVE)
                    }
                };
            if !supported {
                return ax_err!(Unsupported);
            }
        }
        r.port().preschedule_modify(kind)
    }

    /// Hints the device to schedule ahead for a port. Ignored unless the
    /// device supports explicit preschedule.
    pub fn preschedule(&self, dev_id: u8, port_id: u8, kind: PreschedType) {
        if let Some(r) = self.resolve(dev_id, port_id) {
            if !r.is_live() || r.info.cap.contains(EventDevCap::PRESCHEDULE_EXPLICIT) {
                r.port().preschedule(kind);
            }
        }
    }

    /// Enqueues through the transmit adapter of a port.
    pub fn txa_enqueue(&self, dev_id: u8, port_id: u8, events: &[Event]) -> usize {
        match self.resolve(dev_id, port_id) {
            Some(r) => r.port().txa_enqueue(events, r.errno),
            None => 0,
        }
    }

    /// Enqueues through the crypto adapter of a port.
    pub fn ca_enqueue(&self, dev_id: u8, port_id: u8, events: &[Event]) -> usize {
        match self.resolve(dev_id, port_id) {
            Some(r) => r.port().ca_enqueue(events, r.errno),
            None => 0,
        }
    }

    /// Enqueues through the DMA adapter of a port.
    pub fn dma_enqueue(&self, dev_id: u8, port_id: u8, events: &[Event]) -> usize {
        match self.resolve(dev_id, port_id) {
            Some(r) => r.port().dma_enqueue(events, r.errno),
            None => 0,
        }
    }

    /// Last error code published on a port, `0` if none.
    pub fn port_errno(&self, dev_id: u8, port_id: u8) -> i32 {
        self.fp
            .get(usize::from(dev_id))
            .and_then(|slot| slot.ports.get(usize::from(port_id)))
            .map_or(0, |port| port.errno.code())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axerrno::{AxError, LinuxError};

    struct EchoPort;

    impl EventPort for EchoPort {
        fn enqueue_burst(&self, events: &[Event], errno: &Errno) -> usize {
            if events.len() > 2 {
                errno.set(LinuxError::ENOSPC);
                return 2;
            }
            events.len()
        }

        fn dequeue_burst(&self, events: &mut [Event], _timeout_ticks: u64, _errno: &Errno) -> usize {
            events.len().min(1)
        }

        fn maintain(&self, _flags: MaintainFlags) -> AxResult {
            ax_err!(BadState)
        }

        fn profile_switch(&self, _profile: u8) -> AxResult {
            Ok(())
        }
    }

    fn started(registry: &EventDevRegistry, cap: EventDevCap) {
        let port: Arc<dyn EventPort> = Arc::new(EchoPort);
        registry.fp[0].install(alloc::vec![Some(port), None], cap, 2);
    }

    #[test]
    fn test_dummy_before_start() {
        let registry = EventDevRegistry::new();
        let events = [Event::new(0); 4];
        let mut out = [Event::default(); 4];

        assert_eq!(registry.enqueue_burst(0, 0, &events), 0);
        assert_eq!(registry.dequeue_burst(0, 0, &mut out, 0), 0);
        assert_eq!(registry.txa_enqueue(0, 0, &events), 0);
        assert!(registry.maintain(0, 0, MaintainFlags::empty()).is_ok());
        assert_eq!(registry.profile_switch(0, 0, 0), Err(AxError::InvalidInput));
    }

    #[test]
    fn test_installed_port_is_reached() {
        let registry = EventDevRegistry::new();
        started(&registry, EventDevCap::empty());

        let events = [Event::new(0); 4];
        let mut out = [Event::default(); 4];
        assert_eq!(registry.enqueue_burst(0, 0, &events[..2]), 2);
        assert_eq!(registry.dequeue_burst(0, 0, &mut out, 0), 1);

        // Short count publishes the reason on the port
        assert_eq!(registry.enqueue_burst(0, 0, &events), 2);
        assert_eq!(registry.port_errno(0, 0), LinuxError::ENOSPC as i32);
        assert_eq!(registry.port_errno(0, 1), 0);

        // Port 1 was never set up
        assert_eq!(registry.enqueue_burst(0, 1, &events), 0);

        registry.fp[0].reset();
        assert_eq!(registry.enqueue_burst(0, 0, &events[..2]), 0);
    }

    #[test]
    fn test_reset_unpublishes_every_port() {
        let registry = EventDevRegistry::new();
        started(&registry, EventDevCap::PROFILE_LINK);
        assert!(registry.fp[0].ports[0].live.load(Ordering::Acquire));
        assert!(!registry.fp[0].ports[1].live.load(Ordering::Acquire));

        registry.fp[0].reset();
        assert!(registry.fp[0].ports.iter().all(|p| !p.live.load(Ordering::Acquire)));
        assert!(registry.fp[0].ports[0].handle.read().is_none());
        // The dummy answers with no device limits applied
        assert_eq!(registry.profile_switch(0, 0, 1), Err(AxError::InvalidInput));

        // A restart publishes again and clears stale errnos
        registry.fp[0].ports[0].errno.set(LinuxError::EINVAL);
        started(&registry, EventDevCap::PROFILE_LINK);
        assert_eq!(registry.port_errno(0, 0), 0);
        assert!(registry.profile_switch(0, 0, 1).is_ok());
    }

    #[test]
    fn test_out_of_range_ids() {
        let registry = EventDevRegistry::new();
        let events = [Event::new(0); 1];
        assert_eq!(registry.enqueue_burst(200, 0, &events), 0);
        assert_eq!(registry.enqueue_burst(0, 255, &events), 0);
        assert_eq!(
            registry.maintain(200, 0, MaintainFlags::FLUSH),
            Err(AxError::InvalidInput)
        );
        assert_eq!(registry.port_errno(200, 0), 0);
    }

    #[test]
    fn test_maintenance_free_skips_driver() {
        let registry = EventDevRegistry::new();
        started(&registry, EventDevCap::empty());
        assert_eq!(
            registry.maintain(0, 0, MaintainFlags::FLUSH),
            Err(AxError::BadState)
        );

        started(&registry, EventDevCap::MAINTENANCE_FREE);
        assert!(registry.maintain(0, 0, MaintainFlags::FLUSH).is_ok());
    }

    #[test]
    fn test_profile_switch_range() {
        let registry = EventDevRegistry::new();
        started(&registry, EventDevCap::PROFILE_LINK);
        assert!(registry.profile_switch(0, 0, 1).is_ok());
        assert_eq!(registry.profile_switch(0, 0, 2), Err(AxError::InvalidInput));
    }

    #[test]
    fn test_preschedule_modify_requires_caps() {
        let registry = EventDevRegistry::new();
        started(&registry, EventDevCap::empty());
        assert_eq!(
            registry.preschedule_modify(0, 0, PreschedType::Prescheduled),
            Err(AxError::Unsupported)
        );

        started(
            &registry,
            EventDevCap::PER_PORT_PRESCHEDULE | EventDevCap::EVENT_PRESCHEDULE,
        );
        // Port falls back to the trait default
        assert_eq!(
            registry.preschedule_modify(0, 0, PreschedType::Prescheduled),
            Err(AxError::Unsupported)
        );
        assert_eq!(
            registry.preschedule_modify(0, 0, PreschedType::Adaptive),
            Err(AxError::Unsupported)
        );
    }
}
