//! Port-to-queue link map.
//!
//! For every link profile the map keeps a dense `nb_ports × MAX_QUEUES_PER_DEV`
//! matrix. A cell holds the priority of the link or [`LINK_UNLINKED`]. In
//! profile 0 the rows of newly added ports start zeroed, which reads as
//! "linked at priority 0" until the port is set up and unlinked; in the other
//! profiles they start unlinked.

use alloc::vec::Vec;

use arrayvec::ArrayVec;
use axerrno::{AxResult, ax_err};

use crate::{MAX_PROFILES_PER_PORT, MAX_QUEUES_PER_DEV};

/// Cell value of a queue that is not linked to the port.
pub const LINK_UNLINKED: u16 = 0xdead;

/// One established link as seen from a port.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct QueueLink {
    pub queue_id: u8,
    pub priority: u8,
}

/// Links of a port, at most one per queue.
pub type PortLinks = ArrayVec<QueueLink, MAX_QUEUES_PER_DEV>;

/// Link matrices of every profile of a device.
#[derive(Debug, Default)]
pub struct LinkMap {
    nb_ports: usize,
    profiles: [Vec<u16>; MAX_PROFILES_PER_PORT],
}

impl LinkMap {
    /// Creates a map with no ports.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of port rows.
    #[inline]
    pub fn nb_ports(&self) -> usize {
        self.nb_ports
    }

    /// Builds a map for `nb_ports` ports keeping the rows of surviving ports.
    ///
    /// New rows are zeroed in profile 0 and unlinked in every other profile.
    ///
    /// # Errors
    ///
    /// Returns `NoMemory` if a matrix cannot be allocated. `self` is never
    /// modified.
    pub fn resized(&self, nb_ports: usize) -> AxResult<Self> {
        let cells = nb_ports * MAX_QUEUES_PER_DEV;
        let kept = self.nb_ports.min(nb_ports) * MAX_QUEUES_PER_DEV;
        let mut profiles: [Vec<u16>; MAX_PROFILES_PER_PORT] = Default::default();

        for (profile, (new, old)) in profiles.iter_mut().zip(self.profiles.iter()).enumerate() {
            if new.try_reserve_exact(cells).is_err() {
                return ax_err!(NoMemory, "failed to allocate link map");
            }
            new.extend_from_slice(&old[..kept]);
            // Profile 0 rows are cleared by the unlink in port setup
            let fill = if profile == 0 { 0 } else { LINK_UNLINKED };
            new.resize(cells, fill);
        }

        Ok(Self { nb_ports, profiles })
    }

    #[inline]
    fn cell(port_id: u8, queue_id: u8) -> usize {
        usize::from(port_id) * MAX_QUEUES_PER_DEV + usize::from(queue_id)
    }

    /// Raw cell content; `None` if the port or profile is out of range.
    pub fn raw(&self, profile: u8, port_id: u8, queue_id: u8) -> Option<u16> {
        if usize::from(port_id) >= self.nb_ports || usize::from(queue_id) >= MAX_QUEUES_PER_DEV {
            return None;
        }
        self.profiles
            .get(usize::from(profile))
            .map(|m| m[Self::cell(port_id, queue_id)])
    }

    /// Records a link at `priority`. Out-of-range ids are ignored.
    pub fn set(&mut self, profile: u8, port_id: u8, queue_id: u8, priority: u8) {
        self.store(profile, port_id, queue_id, priority.into());
    }

    /// Marks the queue unlinked from the port.
    pub fn unset(&mut self, profile: u8, port_id: u8, queue_id: u8) {
        self.store(profile, port_id, queue_id, LINK_UNLINKED);
    }

    fn store(&mut self, profile: u8, port_id: u8, queue_id: u8, value: u16) {
        if usize::from(port_id) >= self.nb_ports || usize::from(queue_id) >= MAX_QUEUES_PER_DEV {
            return;
        }
        if let Some(matrix) = self.profiles.get_mut(usize::from(profile)) {
            matrix[Self::cell(port_id, queue_id)] = value;
        }
    }

    /// Collects the links of the first `nb_queues` queues of a port row.
    pub fn links(&self, profile: u8, port_id: u8, nb_queues: u8) -> PortLinks {
        let mut out = PortLinks::new();
        let Some(matrix) = self.profiles.get(usize::from(profile)) else {
            return out;
        };
        if usize::from(port_id) >= self.nb_ports {
            return out;
        }

        let row = Self::cell(port_id, 0);
        for (queue_id, &cell) in matrix[row..row + usize::from(nb_queues)].iter().enumerate() {
            if cell != LINK_UNLINKED {
                out.push(QueueLink {
                    queue_id: queue_id as u8,
                    priority: cell as u8,
                });
            }
        }
        out
    }
}
