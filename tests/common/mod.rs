#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::atomic::{AtomicI32, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use axerrno::{AxError, AxResult, LinuxError, ax_err};
use axeventdev::{
    DevInfo, Errno, Event, EventDevCap, EventDevData, EventDevDriver, EventOp, EventPort,
    EventTimer, EventTimerState, PortConf, QueueAttr, QueueConf, SchedType, TimerAdapterCaps,
    TimerAdapterData, TimerAdapterInfo, TimerAdapterOps, XstatsMode, XstatsName,
};

/// Everything the mock driver was asked to do.
#[derive(Debug, Default)]
pub struct Calls {
    pub configure: usize,
    pub queue_setup: Vec<(u8, QueueConf)>,
    pub queue_release: Vec<u8>,
    pub port_setup: Vec<(u8, PortConf)>,
    pub port_release: Vec<u8>,
    pub link: Vec<(u8, Vec<u8>, Vec<u8>, u8)>,
    pub unlink: Vec<(u8, Vec<u8>, u8)>,
    pub start: usize,
    pub stop: usize,
    pub close: usize,
}

/// Knobs and records shared between a test and its mock driver.
#[derive(Debug, Default)]
pub struct MockState {
    pub calls: Calls,
    /// Accept at most this many links per call, reporting EDQUOT.
    pub link_limit: Option<usize>,
    pub fail_configure: bool,
    pub fail_start: bool,
}

/// Event storage shared by all ports of a mock device.
#[derive(Default)]
pub struct Scheduler {
    fifo: Mutex<VecDeque<Event>>,
    inflight: AtomicI32,
}

pub struct MockPort {
    sched: Arc<Scheduler>,
    nb_queues: u8,
    new_event_threshold: i32,
    enqueued: Arc<AtomicU64>,
}

impl EventPort for MockPort {
    fn enqueue_burst(&self, events: &[Event], errno: &Errno) -> usize {
        let mut fifo = self.sched.fifo.lock().unwrap();
        for (i, ev) in events.iter().enumerate() {
            if ev.queue_id >= self.nb_queues {
                errno.set(LinuxError::EINVAL);
                return i;
            }
            match ev.op {
                EventOp::New => {
                    if self.sched.inflight.load(Ordering::Acquire) >= self.new_event_threshold {
                        errno.set(LinuxError::ENOSPC);
                        return i;
                    }
                    self.sched.inflight.fetch_add(1, Ordering::AcqRel);
                    fifo.push_back(*ev);
                }
                EventOp::Forward => fifo.push_back(*ev),
                EventOp::Release => {
                    self.sched.inflight.fetch_sub(1, Ordering::AcqRel);
                }
            }
            self.enqueued.fetch_add(1, Ordering::Relaxed);
        }
        events.len()
    }

    fn dequeue_burst(&self, events: &mut [Event], timeout_ticks: u64, _errno: &Errno) -> usize {
        let mut waited = 0;
        loop {
            {
                let mut fifo = self.sched.fifo.lock().unwrap();
                if !fifo.is_empty() || waited >= timeout_ticks {
                    let n = events.len().min(fifo.len());
                    for slot in events.iter_mut().take(n) {
                        *slot = fifo.pop_front().unwrap();
                    }
                    return n;
                }
            }
            waited += 1;
            std::thread::yield_now();
        }
    }
}

pub struct MockDriver {
    pub info: DevInfo,
    pub state: Arc<Mutex<MockState>>,
    pub timer_ops: Option<(TimerAdapterCaps, Arc<MockTimerOps>)>,
    sched: Arc<Scheduler>,
    enqueued: Arc<AtomicU64>,
}

pub fn mock_info() -> DevInfo {
    DevInfo {
        driver_name: "event_mock",
        min_dequeue_timeout_ns: 1_000,
        max_dequeue_timeout_ns: 1_000_000,
        max_event_queues: 8,
        max_event_queue_flows: 1024,
        max_event_queue_priority_levels: 8,
        max_event_priority_levels: 8,
        max_event_ports: 4,
        max_event_port_dequeue_depth: 16,
        max_event_port_enqueue_depth: 16,
        max_event_port_links: 8,
        max_num_events: 4096,
        event_dev_cap: EventDevCap::BURST_MODE
            | EventDevCap::ATOMIC
            | EventDevCap::ORDERED
            | EventDevCap::PARALLEL,
        max_profiles_per_port: 2,
        ..Default::default()
    }
}

impl MockDriver {
    pub fn new(info: DevInfo) -> (Self, Arc<Mutex<MockState>>) {
        let state = Arc::new(Mutex::new(MockState::default()));
        let driver = Self {
            info,
            state: state.clone(),
            timer_ops: None,
            sched: Arc::new(Scheduler::default()),
            enqueued: Arc::new(AtomicU64::new(0)),
        };
        (driver, state)
    }

    pub fn with_timer_ops(mut self, caps: TimerAdapterCaps, ops: Arc<MockTimerOps>) -> Self {
        self.timer_ops = Some((caps, ops));
        self
    }
}

impl EventDevDriver for MockDriver {
    fn info_get(&self, _data: &EventDevData) -> AxResult<DevInfo> {
        Ok(self.info)
    }

    fn configure(&mut self, _data: &EventDevData) -> AxResult {
        let mut state = self.state.lock().unwrap();
        state.calls.configure += 1;
        if state.fail_configure {
            return ax_err!(BadState, "injected configure failure");
        }
        Ok(())
    }

    fn queue_def_conf(&self, _data: &EventDevData, _queue_id: u8) -> AxResult<QueueConf> {
        Ok(QueueConf {
            nb_atomic_flows: 64,
            nb_atomic_order_sequences: 64,
            schedule_type: SchedType::Atomic,
            priority: 64,
            ..Default::default()
        })
    }

    fn queue_setup(&mut self, _data: &EventDevData, queue_id: u8, conf: &QueueConf) -> AxResult {
        self.state.lock().unwrap().calls.queue_setup.push((queue_id, *conf));
        Ok(())
    }

    fn queue_release(&mut self, _data: &EventDevData, queue_id: u8) {
        self.state.lock().unwrap().calls.queue_release.push(queue_id);
    }

    fn queue_attr_set(
        &mut self,
        _data: &EventDevData,
        _queue_id: u8,
        _attr: QueueAttr,
        _value: u64,
    ) -> AxResult {
        Ok(())
    }

    fn port_def_conf(&self, _data: &EventDevData, _port_id: u8) -> AxResult<PortConf> {
        Ok(PortConf {
            new_event_threshold: 1024,
            dequeue_depth: 8,
            enqueue_depth: 8,
            ..Default::default()
        })
    }

    fn port_setup(
        &mut self,
        data: &EventDevData,
        port_id: u8,
        conf: &PortConf,
    ) -> AxResult<Arc<dyn EventPort>> {
        self.state.lock().unwrap().calls.port_setup.push((port_id, *conf));
        Ok(Arc::new(MockPort {
            sched: self.sched.clone(),
            nb_queues: data.nb_queues(),
            new_event_threshold: conf.new_event_threshold,
            enqueued: self.enqueued.clone(),
        }))
    }

    fn port_release(&mut self, _data: &EventDevData, port_id: u8) {
        self.state.lock().unwrap().calls.port_release.push(port_id);
    }

    fn port_quiesce(
        &mut self,
        _data: &EventDevData,
        _port_id: u8,
        flush: &mut dyn FnMut(Event),
    ) -> AxResult {
        let drained: Vec<Event> = self.sched.fifo.lock().unwrap().drain(..).collect();
        drained.into_iter().for_each(flush);
        Ok(())
    }

    fn port_link(
        &mut self,
        data: &EventDevData,
        port_id: u8,
        queues: &[u8],
        priorities: &[u8],
        profile: u8,
    ) -> AxResult<usize> {
        let mut state = self.state.lock().unwrap();
        state
            .calls
            .link
            .push((port_id, queues.to_vec(), priorities.to_vec(), profile));
        match state.link_limit {
            Some(limit) if limit < queues.len() => {
                data.errno().set(LinuxError::EDQUOT);
                Ok(limit)
            }
            _ => Ok(queues.len()),
        }
    }

    fn port_unlink(
        &mut self,
        _data: &EventDevData,
        port_id: u8,
        queues: &[u8],
        profile: u8,
    ) -> AxResult<usize> {
        self.state
            .lock()
            .unwrap()
            .calls
            .unlink
            .push((port_id, queues.to_vec(), profile));
        Ok(queues.len())
    }

    fn timeout_ticks(&self, _data: &EventDevData, ns: u64) -> AxResult<u64> {
        // 100 MHz tick
        Ok(ns / 10)
    }

    fn dump(&self, data: &EventDevData, out: &mut dyn std::fmt::Write) -> AxResult {
        write!(
            out,
            "{}: queues={} ports={}",
            data.name(),
            data.nb_queues(),
            data.nb_ports()
        )
        .map_err(|_| AxError::Io)
    }

    fn start(&mut self, _data: &EventDevData) -> AxResult {
        let mut state = self.state.lock().unwrap();
        state.calls.start += 1;
        if state.fail_start {
            return ax_err!(BadState, "injected start failure");
        }
        Ok(())
    }

    fn stop(&mut self, _data: &EventDevData, flush: &mut dyn FnMut(Event)) {
        self.state.lock().unwrap().calls.stop += 1;
        let drained: Vec<Event> = self.sched.fifo.lock().unwrap().drain(..).collect();
        drained.into_iter().for_each(flush);
    }

    fn close(&mut self, _data: &EventDevData) -> AxResult {
        self.state.lock().unwrap().calls.close += 1;
        Ok(())
    }

    fn xstats_names_get(&self, _data: &EventDevData, mode: XstatsMode) -> AxResult<Vec<XstatsName>> {
        match mode {
            XstatsMode::Device => Ok(vec![XstatsName {
                id: 0,
                name: String::from("dev_enqueued"),
            }]),
            _ => Ok(Vec::new()),
        }
    }

    fn xstats_get(&self, _data: &EventDevData, _mode: XstatsMode, ids: &[u64]) -> AxResult<Vec<u64>> {
        ids.iter()
            .map(|&id| match id {
                0 => Ok(self.enqueued.load(Ordering::Relaxed)),
                _ => ax_err!(InvalidInput),
            })
            .collect()
    }

    fn xstats_by_name_get(&self, _data: &EventDevData, name: &str) -> AxResult<(u64, u64)> {
        match name {
            "dev_enqueued" => Ok((0, self.enqueued.load(Ordering::Relaxed))),
            _ => ax_err!(NotFound),
        }
    }

    fn xstats_reset(&mut self, _data: &EventDevData, _mode: XstatsMode, _ids: &[u64]) -> AxResult {
        self.enqueued.store(0, Ordering::Relaxed);
        Ok(())
    }

    fn timer_adapter_caps_get(
        &self,
        _data: &EventDevData,
    ) -> AxResult<(TimerAdapterCaps, Option<Arc<dyn TimerAdapterOps>>)> {
        match &self.timer_ops {
            Some((caps, ops)) => {
                let ops: Arc<dyn TimerAdapterOps> = ops.clone();
                Ok((*caps, Some(ops)))
            }
            None => Ok((TimerAdapterCaps::empty(), None)),
        }
    }
}

/// Timer adapter operations recording their calls.
#[derive(Debug, Default)]
pub struct MockTimerOps {
    pub calls: Mutex<Vec<&'static str>>,
    pub fail_init: bool,
    pub fail_start: bool,
}

impl MockTimerOps {
    fn record(&self, call: &'static str) {
        self.calls.lock().unwrap().push(call);
    }

    pub fn count(&self, call: &str) -> usize {
        self.calls.lock().unwrap().iter().filter(|c| **c == call).count()
    }
}

impl TimerAdapterOps for MockTimerOps {
    fn init(&self, _data: &TimerAdapterData) -> AxResult {
        self.record("init");
        if self.fail_init {
            return ax_err!(NoMemory, "injected init failure");
        }
        Ok(())
    }

    fn uninit(&self, _data: &TimerAdapterData) -> AxResult {
        self.record("uninit");
        Ok(())
    }

    fn start(&self, _data: &TimerAdapterData) -> AxResult {
        self.record("start");
        if self.fail_start {
            return ax_err!(BadState, "injected start failure");
        }
        Ok(())
    }

    fn stop(&self, _data: &TimerAdapterData) -> AxResult {
        self.record("stop");
        Ok(())
    }

    fn get_info(&self, data: &TimerAdapterData, info: &mut TimerAdapterInfo) {
        info.min_resolution_ns = data.conf().timer_tick_ns;
        info.max_tmo_ns = data.conf().max_tmo_ns;
    }

    fn arm_burst(&self, _data: &TimerAdapterData, timers: &mut [EventTimer]) -> usize {
        self.record("arm");
        for timer in timers.iter_mut() {
            timer.state = EventTimerState::Armed;
        }
        timers.len()
    }

    fn arm_tmo_tick_burst(
        &self,
        data: &TimerAdapterData,
        timers: &mut [EventTimer],
        timeout_ticks: u64,
    ) -> usize {
        for timer in timers.iter_mut() {
            timer.timeout_ticks = timeout_ticks;
        }
        self.arm_burst(data, timers)
    }

    fn cancel_burst(&self, _data: &TimerAdapterData, timers: &mut [EventTimer]) -> usize {
        self.record("cancel");
        for timer in timers.iter_mut() {
            timer.state = EventTimerState::Canceled;
        }
        timers.len()
    }
}
