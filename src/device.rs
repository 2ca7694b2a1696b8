//! Event device record and its configuration state machine.
//!
//! [`EventDev`] pairs a driver with the library-owned [`EventDevData`]. All
//! control-path rules live here: argument validation before any mutation,
//! the busy check while started, rebuild-and-swap reallocation of queue and
//! port metadata, and link bookkeeping after the driver accepted a request.
//!
//! Methods are not synchronized; the registry serializes them per device.

use alloc::boxed::Box;
use alloc::string::String;
use alloc::sync::Arc;
use alloc::vec::Vec;
use core::fmt;

use arrayvec::ArrayVec;
use axerrno::{AxError, AxResult, ax_err};

use crate::config::{
    DevAttr, DevConfig, DevInfo, EventDevCap, PRIORITY_NORMAL, PortAttr, PortCfgFlags, PortConf,
    QueueAttr, QueueCfgFlags, QueueConf,
};
use crate::driver::{EventDevDriver, EventPort, XstatsMode, XstatsName};
use crate::errno::Errno;
use crate::event::Event;
use crate::lifecycle::{DevLifecycle, DevState};
use crate::links::{LinkMap, PortLinks};
use crate::timer_adapter::{TimerAdapterCaps, TimerAdapterOps};
use crate::{MAX_PROFILES_PER_PORT, MAX_QUEUES_PER_DEV};

/// Callback receiving events flushed out of a device while it stops.
pub type StopFlushFn = Box<dyn FnMut(u8, Event) + Send>;

#[derive(Debug, Clone, Copy, Default)]
struct QueueMeta {
    priority: u8,
    conf: Option<QueueConf>,
}

#[derive(Clone, Default)]
struct PortMeta {
    handle: Option<Arc<dyn EventPort>>,
    dequeue_depth: u16,
    enqueue_depth: u16,
    conf: Option<PortConf>,
}

/// Library-owned state of an event device, shared with its driver.
pub struct EventDevData {
    name: String,
    dev_id: u8,
    socket_id: i32,
    dev_conf: DevConfig,
    queues: Vec<QueueMeta>,
    ports: Vec<PortMeta>,
    links: LinkMap,
    event_dev_cap: EventDevCap,
    max_profiles: u8,
    lifecycle: DevLifecycle,
    errno: Errno,
}

impl EventDevData {
    fn new(name: String, dev_id: u8, socket_id: i32) -> Self {
        Self {
            name,
            dev_id,
            socket_id,
            dev_conf: DevConfig::default(),
            queues: Vec::new(),
            ports: Vec::new(),
            links: LinkMap::new(),
            event_dev_cap: EventDevCap::empty(),
            max_profiles: 1,
            lifecycle: DevLifecycle::new(),
            errno: Errno::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn dev_id(&self) -> u8 {
        self.dev_id
    }

    /// NUMA hint; negative when unknown.
    pub fn socket_id(&self) -> i32 {
        self.socket_id
    }

    /// The last configuration accepted by `configure`.
    pub fn dev_conf(&self) -> &DevConfig {
        &self.dev_conf
    }

    pub fn nb_queues(&self) -> u8 {
        self.queues.len() as u8
    }

    pub fn nb_ports(&self) -> u8 {
        self.ports.len() as u8
    }

    /// Capabilities cached at the last `configure`.
    pub fn event_dev_cap(&self) -> EventDevCap {
        self.event_dev_cap
    }

    pub fn max_profiles_per_port(&self) -> u8 {
        self.max_profiles
    }

    pub fn state(&self) -> DevState {
        self.lifecycle.state()
    }

    pub fn is_started(&self) -> bool {
        self.lifecycle.is_started()
    }

    /// Control-path side channel, e.g. link quota conditions.
    pub fn errno(&self) -> &Errno {
        &self.errno
    }

    /// Configuration applied to a queue by its last setup.
    pub fn queue_conf(&self, queue_id: u8) -> Option<&QueueConf> {
        self.queues.get(usize::from(queue_id))?.conf.as_ref()
    }

    /// Configuration applied to a port by its last setup.
    pub fn port_conf(&self, port_id: u8) -> Option<&PortConf> {
        self.ports.get(usize::from(port_id))?.conf.as_ref()
    }

    /// Links of a port as recorded by the library.
    pub fn links(&self, profile: u8, port_id: u8) -> PortLinks {
        self.links.links(profile, port_id, self.nb_queues())
    }
}

impl fmt::Debug for EventDevData {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventDevData")
            .field("name", &self.name)
            .field("dev_id", &self.dev_id)
            .field("state", &self.state())
            .field("nb_queues", &self.nb_queues())
            .field("nb_ports", &self.nb_ports())
            .finish()
    }
}

/// An attached event device: its driver plus its state.
pub struct EventDev {
    driver: Box<dyn EventDevDriver>,
    data: EventDevData,
    stop_flush: Option<StopFlushFn>,
}

impl EventDev {
    /// Attaches `driver` as device `dev_id`.
    pub fn new(name: String, dev_id: u8, socket_id: i32, driver: Box<dyn EventDevDriver>) -> Self {
        Self {
            driver,
            data: EventDevData::new(name, dev_id, socket_id),
            stop_flush: None,
        }
    }

    pub fn data(&self) -> &EventDevData {
        &self.data
    }

    fn check_queue(&self, queue_id: u8) -> AxResult {
        if queue_id >= self.data.nb_queues() {
            error!("Invalid queue_id={} on dev_id={}", queue_id, self.data.dev_id);
            return ax_err!(InvalidInput, "invalid queue id");
        }
        Ok(())
    }

    fn check_port(&self, port_id: u8) -> AxResult {
        if port_id >= self.data.nb_ports() {
            error!("Invalid port_id={} on dev_id={}", port_id, self.data.dev_id);
            return ax_err!(InvalidInput, "invalid port id");
        }
        Ok(())
    }

    fn check_profile(&self, profile: u8) -> AxResult {
        if profile >= self.data.max_profiles {
            error!(
                "Invalid profile_id={} on dev_id={}, max {}",
                profile, self.data.dev_id, self.data.max_profiles
            );
            return ax_err!(InvalidInput, "invalid link profile");
        }
        Ok(())
    }

    fn check_stopped(&self, what: &str) -> AxResult {
        if self.data.is_started() {
            error!(
                "device {} must be stopped to allow {}",
                self.data.dev_id, what
            );
            return ax_err!(ResourceBusy, "device is started");
        }
        Ok(())
    }

    /// Driver info with the fields owned by the library filled in.
    pub fn info_get(&self) -> AxResult<DevInfo> {
        let mut info = self.driver.info_get(&self.data)?;
        info.dequeue_timeout_ns = self.data.dev_conf.dequeue_timeout_ns;
        info.max_profiles_per_port = info
            .max_profiles_per_port
            .clamp(1, MAX_PROFILES_PER_PORT as u8);
        Ok(info)
    }

    pub fn attr_get(&self, attr: DevAttr) -> u32 {
        match attr {
            DevAttr::PortCount => self.data.nb_ports().into(),
            DevAttr::QueueCount => self.data.nb_queues().into(),
            DevAttr::Started => self.data.is_started().into(),
        }
    }

    /// Validates and applies `conf`, resizing queue and port metadata.
    ///
    /// # Errors
    ///
    /// - `ResourceBusy` while started, `BadState` once closed.
    /// - `InvalidInput` if a field is outside the device limits; nothing is
    ///   modified in that case.
    /// - `NoMemory` if metadata cannot be allocated; nothing is modified.
    /// - The driver error if the driver rejects the configuration. Queue and
    ///   port metadata are then released and the device is unconfigured.
    pub fn configure(&mut self, conf: &DevConfig) -> AxResult {
        let dev_id = self.data.dev_id;
        self.check_stopped("configure")?;
        if self.data.state() == DevState::Closed {
            error!("dev{} is closed", dev_id);
            return ax_err!(BadState, "device is closed");
        }

        let info = self.info_get()?;
        if let Err(violation) = conf.validate(&info) {
            error!("dev{} configure: {}", dev_id, violation);
            return ax_err!(InvalidInput, "configuration out of range");
        }

        let queues = self.rebuild_queues(conf.nb_event_queues)?;
        let (ports, links) = self.rebuild_ports(conf.nb_event_ports)?;

        self.data.dev_conf = *conf;
        self.commit_queues(queues);
        self.commit_ports(ports, links);
        self.data.event_dev_cap = info.event_dev_cap;
        self.data.max_profiles = info.max_profiles_per_port;

        if let Err(e) = self.driver.configure(&self.data) {
            error!("dev{} dev_configure = {:?}", dev_id, e);
            self.commit_queues(Vec::new());
            self.commit_ports(Vec::new(), LinkMap::new());
            self.data.dev_conf = DevConfig::default();
            let _ = self.data.lifecycle.mark_unconfigured();
            return Err(e);
        }

        self.data
            .lifecycle
            .mark_configured()
            .map_err(|_| AxError::BadState)?;
        debug!(
            "dev{} configured with {} queues and {} ports",
            dev_id, conf.nb_event_queues, conf.nb_event_ports
        );
        Ok(())
    }

    fn rebuild_queues(&self, nb_queues: u8) -> AxResult<Vec<QueueMeta>> {
        let nb = usize::from(nb_queues);
        let mut queues = Vec::new();
        if queues.try_reserve_exact(nb).is_err() {
            error!("failed to get mem for queue cfg, nb_queues {}", nb_queues);
            return ax_err!(NoMemory);
        }
        let kept = nb.min(self.data.queues.len());
        queues.extend_from_slice(&self.data.queues[..kept]);
        queues.resize(nb, QueueMeta::default());
        Ok(queues)
    }

    fn rebuild_ports(&self, nb_ports: u8) -> AxResult<(Vec<PortMeta>, LinkMap)> {
        let nb = usize::from(nb_ports);
        let mut ports = Vec::new();
        if ports.try_reserve_exact(nb).is_err() {
            error!("failed to get mem for port meta data, nb_ports {}", nb_ports);
            return ax_err!(NoMemory);
        }
        let kept = nb.min(self.data.ports.len());
        ports.extend_from_slice(&self.data.ports[..kept]);
        ports.resize(nb, PortMeta::default());
        let links = self.data.links.resized(nb)?;
        Ok((ports, links))
    }

    /// Releases queues that do not survive, then swaps in `queues`.
    fn commit_queues(&mut self, queues: Vec<QueueMeta>) {
        for queue_id in queues.len()..self.data.queues.len() {
            self.driver.queue_release(&self.data, queue_id as u8);
        }
        self.data.queues = queues;
    }

    fn commit_ports(&mut self, ports: Vec<PortMeta>, links: LinkMap) {
        for port_id in ports.len()..self.data.ports.len() {
            self.driver.port_release(&self.data, port_id as u8);
        }
        self.data.ports = ports;
        self.data.links = links;
    }

    pub fn queue_default_conf(&self, queue_id: u8) -> AxResult<QueueConf> {
        self.check_queue(queue_id)?;
        self.driver.queue_def_conf(&self.data, queue_id)
    }

    /// Sets up a queue; `None` applies the driver default.
    pub fn queue_setup(&mut self, queue_id: u8, conf: Option<&QueueConf>) -> AxResult {
        let dev_id = self.data.dev_id;
        self.check_queue(queue_id)?;

        if let Some(conf) = conf {
            let max_flows = self.data.dev_conf.nb_event_queue_flows;
            if conf.wants_atomic()
                && (conf.nb_atomic_flows == 0 || conf.nb_atomic_flows > max_flows)
            {
                error!(
                    "dev{} queue{} Invalid nb_atomic_flows={} max_flows={}",
                    dev_id, queue_id, conf.nb_atomic_flows, max_flows
                );
                return ax_err!(InvalidInput, "nb_atomic_flows out of range");
            }
            if conf.wants_ordered()
                && (conf.nb_atomic_order_sequences == 0
                    || conf.nb_atomic_order_sequences > max_flows)
            {
                error!(
                    "dev{} queue{} Invalid nb_atomic_order_seq={} max_flows={}",
                    dev_id, queue_id, conf.nb_atomic_order_sequences, max_flows
                );
                return ax_err!(InvalidInput, "nb_atomic_order_sequences out of range");
            }
        }

        self.check_stopped("queue setup")?;

        let conf = match conf {
            Some(conf) => *conf,
            None => {
                let mut def = self.driver.queue_def_conf(&self.data, queue_id)?;
                def.event_queue_cfg = QueueCfgFlags::empty();
                def
            }
        };

        self.driver.queue_setup(&self.data, queue_id, &conf)?;
        self.data.queues[usize::from(queue_id)] = QueueMeta {
            priority: conf.priority,
            conf: Some(conf),
        };
        trace!("dev{} queue{} setup", dev_id, queue_id);
        Ok(())
    }

    pub fn queue_attr_get(&self, queue_id: u8, attr: QueueAttr) -> AxResult<u64> {
        self.check_queue(queue_id)?;
        let meta = &self.data.queues[usize::from(queue_id)];
        let conf = meta.conf.unwrap_or_default();

        Ok(match attr {
            QueueAttr::Priority => {
                if self.data.event_dev_cap.contains(EventDevCap::QUEUE_QOS) {
                    meta.priority.into()
                } else {
                    PRIORITY_NORMAL.into()
                }
            }
            QueueAttr::NbAtomicFlows => conf.nb_atomic_flows.into(),
            QueueAttr::NbAtomicOrderSequences => conf.nb_atomic_order_sequences.into(),
            QueueAttr::EventQueueCfg => conf.event_queue_cfg.bits().into(),
            QueueAttr::ScheduleType => {
                if conf.event_queue_cfg.contains(QueueCfgFlags::ALL_TYPES) {
                    return ax_err!(InvalidInput, "queue carries all schedule types");
                }
                conf.schedule_type as u64
            }
            QueueAttr::Weight => conf.weight.into(),
            QueueAttr::Affinity => conf.affinity.into(),
        })
    }

    /// Changes a priority, weight or affinity at runtime.
    pub fn queue_attr_set(&mut self, queue_id: u8, attr: QueueAttr, value: u64) -> AxResult {
        let dev_id = self.data.dev_id;
        self.check_queue(queue_id)?;
        if !attr.is_runtime_settable() {
            error!("dev{} queue attribute {:?} is not settable", dev_id, attr);
            return ax_err!(InvalidInput, "queue attribute not settable");
        }
        let Ok(value8) = u8::try_from(value) else {
            return ax_err!(InvalidInput, "queue attribute value out of range");
        };
        if !self
            .data
            .event_dev_cap
            .contains(EventDevCap::RUNTIME_QUEUE_ATTR)
        {
            error!(
                "Device {} does not support changing queue attributes at runtime",
                dev_id
            );
            return ax_err!(Unsupported);
        }

        self.driver
            .queue_attr_set(&self.data, queue_id, attr, value)?;

        let meta = &mut self.data.queues[usize::from(queue_id)];
        let mut conf = meta.conf.unwrap_or_default();
        match attr {
            QueueAttr::Priority => {
                conf.priority = value8;
                meta.priority = value8;
            }
            QueueAttr::Weight => conf.weight = value8,
            _ => conf.affinity = value8,
        }
        meta.conf = Some(conf);
        Ok(())
    }

    pub fn port_default_conf(&self, port_id: u8) -> AxResult<PortConf> {
        self.check_port(port_id)?;
        self.driver.port_def_conf(&self.data, port_id)
    }

    /// Sets up a port; `None` applies the driver default.
    ///
    /// On success the port is unlinked from every queue of profile 0.
    pub fn port_setup(&mut self, port_id: u8, conf: Option<&PortConf>) -> AxResult {
        let dev_id = self.data.dev_id;
        self.check_port(port_id)?;

        if let Some(conf) = conf {
            let dev_conf = &self.data.dev_conf;
            if conf.new_event_threshold == 0
                || conf.new_event_threshold > dev_conf.nb_events_limit
            {
                error!(
                    "dev{} port{} Invalid event_threshold={} nb_events_limit={}",
                    dev_id, port_id, conf.new_event_threshold, dev_conf.nb_events_limit
                );
                return ax_err!(InvalidInput, "new_event_threshold out of range");
            }
            if conf.dequeue_depth == 0
                || u32::from(conf.dequeue_depth) > dev_conf.nb_event_port_dequeue_depth
            {
                error!(
                    "dev{} port{} Invalid dequeue depth={} max_dequeue_depth={}",
                    dev_id, port_id, conf.dequeue_depth, dev_conf.nb_event_port_dequeue_depth
                );
                return ax_err!(InvalidInput, "dequeue_depth out of range");
            }
            if conf.enqueue_depth == 0
                || u32::from(conf.enqueue_depth) > dev_conf.nb_event_port_enqueue_depth
            {
                error!(
                    "dev{} port{} Invalid enqueue depth={} max_enqueue_depth={}",
                    dev_id, port_id, conf.enqueue_depth, dev_conf.nb_event_port_enqueue_depth
                );
                return ax_err!(InvalidInput, "enqueue_depth out of range");
            }
            let cap = self.data.event_dev_cap;
            if conf.event_port_cfg.contains(PortCfgFlags::DISABLE_IMPL_REL)
                && !cap.contains(EventDevCap::IMPLICIT_RELEASE_DISABLE)
            {
                error!("dev{} port{} Implicit release disable not supported", dev_id, port_id);
                return ax_err!(InvalidInput, "implicit release disable not supported");
            }
            if conf.event_port_cfg.contains(PortCfgFlags::INDEPENDENT_ENQ)
                && !cap.contains(EventDevCap::INDEPENDENT_ENQ)
            {
                error!("dev{} port{} Independent enqueue not supported", dev_id, port_id);
                return ax_err!(InvalidInput, "independent enqueue not supported");
            }
        }

        self.check_stopped("port setup")?;

        let conf = match conf {
            Some(conf) => *conf,
            None => self.driver.port_def_conf(&self.data, port_id)?,
        };

        let handle = self.driver.port_setup(&self.data, port_id, &conf)?;
        self.data.ports[usize::from(port_id)] = PortMeta {
            handle: Some(handle),
            dequeue_depth: conf.dequeue_depth,
            enqueue_depth: conf.enqueue_depth,
            conf: Some(conf),
        };

        // Start from an empty link set whatever the map held before
        self.port_unlink(port_id, None, 0)?;
        trace!("dev{} port{} setup", dev_id, port_id);
        Ok(())
    }

    pub fn port_attr_get(&self, port_id: u8, attr: PortAttr) -> AxResult<u32> {
        self.check_port(port_id)?;
        let meta = &self.data.ports[usize::from(port_id)];
        let conf = meta.conf.unwrap_or_default();
        Ok(match attr {
            PortAttr::EnqDepth => meta.enqueue_depth.into(),
            PortAttr::DeqDepth => meta.dequeue_depth.into(),
            PortAttr::NewEventThreshold => conf.new_event_threshold as u32,
            PortAttr::ImplicitReleaseDisable => conf
                .event_port_cfg
                .contains(PortCfgFlags::DISABLE_IMPL_REL)
                .into(),
        })
    }

    /// Releases the events a port holds, handing each to `flush`.
    pub fn port_quiesce(&mut self, port_id: u8, flush: &mut dyn FnMut(Event)) -> AxResult {
        self.check_port(port_id)?;
        self.driver.port_quiesce(&self.data, port_id, flush)
    }

    fn check_runtime_link(&self) -> AxResult {
        if self.data.is_started()
            && !self
                .data
                .event_dev_cap
                .contains(EventDevCap::RUNTIME_PORT_LINK)
        {
            error!(
                "dev{} does not support changing links while started",
                self.data.dev_id
            );
            return ax_err!(ResourceBusy, "device is started");
        }
        Ok(())
    }

    fn queue_list(&self, queues: Option<&[u8]>) -> AxResult<ArrayVec<u8, MAX_QUEUES_PER_DEV>> {
        let mut list = ArrayVec::new();
        match queues {
            None => list.extend(0..self.data.nb_queues()),
            Some(queues) => {
                for &queue_id in queues {
                    self.check_queue(queue_id)?;
                    if list.try_push(queue_id).is_err() {
                        return ax_err!(InvalidInput, "too many queues");
                    }
                }
            }
        }
        Ok(list)
    }

    /// Links queues to a port in link profile `profile`.
    ///
    /// `queues == None` links every configured queue; `priorities == None`
    /// uses [`PRIORITY_NORMAL`]. Returns the number of leading entries the
    /// driver established; only those are recorded.
    pub fn port_link(
        &mut self,
        port_id: u8,
        queues: Option<&[u8]>,
        priorities: Option<&[u8]>,
        profile: u8,
    ) -> AxResult<usize> {
        self.check_port(port_id)?;
        self.check_profile(profile)?;
        self.check_runtime_link()?;

        let queues = self.queue_list(queues)?;
        let mut prios: ArrayVec<u8, MAX_QUEUES_PER_DEV> = ArrayVec::new();
        match priorities {
            None => prios.extend(core::iter::repeat_n(PRIORITY_NORMAL, queues.len())),
            Some(p) if p.len() >= queues.len() => prios.extend(p[..queues.len()].iter().copied()),
            Some(p) => {
                error!(
                    "dev{} port{} {} priorities for {} queues",
                    self.data.dev_id,
                    port_id,
                    p.len(),
                    queues.len()
                );
                return ax_err!(InvalidInput, "priority list too short");
            }
        }

        self.data.errno.clear();
        let linked = self
            .driver
            .port_link(&self.data, port_id, &queues, &prios, profile)?
            .min(queues.len());

        for (&queue_id, &priority) in queues.iter().zip(prios.iter()).take(linked) {
            self.data.links.set(profile, port_id, queue_id, priority);
        }
        Ok(linked)
    }

    /// Unlinks queues from a port in link profile `profile`.
    ///
    /// `queues == None` unlinks every configured queue. Returns the number of
    /// leading entries the driver accepted; only those are recorded.
    pub fn port_unlink(&mut self, port_id: u8, queues: Option<&[u8]>, profile: u8) -> AxResult<usize> {
        self.check_port(port_id)?;
        self.check_profile(profile)?;
        self.check_runtime_link()?;

        let queues = self.queue_list(queues)?;
        let unlinked = self
            .driver
            .port_unlink(&self.data, port_id, &queues, profile)?
            .min(queues.len());

        for &queue_id in queues.iter().take(unlinked) {
            self.data.links.unset(profile, port_id, queue_id);
        }
        Ok(unlinked)
    }

    pub fn port_unlinks_in_progress(&self, port_id: u8) -> AxResult<usize> {
        self.check_port(port_id)?;
        self.driver.port_unlinks_in_progress(&self.data, port_id)
    }

    pub fn port_links_get(&self, port_id: u8, profile: u8) -> AxResult<PortLinks> {
        self.check_port(port_id)?;
        self.check_profile(profile)?;
        Ok(self.data.links(profile, port_id))
    }

    pub fn timeout_ticks(&self, ns: u64) -> AxResult<u64> {
        self.driver.timeout_ticks(&self.data, ns)
    }

    pub fn dump(&self, out: &mut dyn fmt::Write) -> AxResult {
        self.driver.dump(&self.data, out)
    }

    pub fn xstats_names_get(&self, mode: XstatsMode) -> AxResult<Vec<XstatsName>> {
        self.driver.xstats_names_get(&self.data, mode)
    }

    pub fn xstats_get(&self, mode: XstatsMode, ids: &[u64]) -> AxResult<Vec<u64>> {
        self.driver.xstats_get(&self.data, mode, ids)
    }

    pub fn xstats_by_name_get(&self, name: &str) -> AxResult<(u64, u64)> {
        self.driver.xstats_by_name_get(&self.data, name)
    }

    pub fn xstats_reset(&mut self, mode: XstatsMode, ids: &[u64]) -> AxResult {
        self.driver.xstats_reset(&self.data, mode, ids)
    }

    pub fn timer_adapter_caps_get(
        &self,
    ) -> AxResult<(TimerAdapterCaps, Option<Arc<dyn TimerAdapterOps>>)> {
        self.driver.timer_adapter_caps_get(&self.data)
    }

    /// Installs the stop-flush callback, replacing the previous one.
    pub fn set_stop_flush(&mut self, callback: Option<StopFlushFn>) {
        self.stop_flush = callback;
    }

    /// Starts the device. Starting a started device succeeds.
    ///
    /// # Errors
    ///
    /// `BadState` if the device is not configured, or the driver error.
    pub fn start(&mut self) -> AxResult {
        let dev_id = self.data.dev_id;
        match self.data.state() {
            DevState::Started => {
                warn!("Device with dev_id={} already started", dev_id);
                return Ok(());
            }
            DevState::Unconfigured | DevState::Closed => {
                error!("dev{} is not configured", dev_id);
                return ax_err!(BadState, "device is not configured");
            }
            DevState::Configured | DevState::Stopped => {}
        }

        self.driver.start(&self.data)?;
        self.data
            .lifecycle
            .mark_started()
            .map_err(|_| AxError::BadState)?;
        debug!("dev{} started", dev_id);
        Ok(())
    }

    /// Port handles for the fast-path table, `None` for ports never set up.
    pub fn fp_ports(&self) -> Vec<Option<Arc<dyn EventPort>>> {
        self.data.ports.iter().map(|p| p.handle.clone()).collect()
    }

    /// Stops the device. Stopping a stopped device does nothing.
    pub fn stop(&mut self) {
        let dev_id = self.data.dev_id;
        if self.data.lifecycle.mark_stopped().is_err() {
            warn!("Device with dev_id={} already stopped", dev_id);
            return;
        }

        let stop_flush = &mut self.stop_flush;
        self.driver.stop(&self.data, &mut |ev| {
            if let Some(cb) = stop_flush.as_mut() {
                cb(dev_id, ev);
            }
        });
        debug!("dev{} stopped", dev_id);
    }

    /// Closes the device and drops its queue and port metadata.
    pub fn close(&mut self) -> AxResult {
        let dev_id = self.data.dev_id;
        if self.data.is_started() {
            error!("Device {} must be stopped before closing", dev_id);
            return ax_err!(ResourceBusy, "device is started");
        }

        self.driver.close(&self.data)?;
        self.data.queues = Vec::new();
        self.data.ports = Vec::new();
        self.data.links = LinkMap::new();
        self.data.lifecycle.mark_closed().map_err(|_| AxError::BadState)?;
        debug!("dev{} closed", dev_id);
        Ok(())
    }
}
