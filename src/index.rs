//! Known plots of a world, and which of them are waiting to be deleted.

use hashbrown::{hash_map::Entry, HashMap, HashSet};
use parking_lot::RwLock;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::{debug, trace};
use vek::*;

#[derive(Copy, Clone, Debug, Hash, Eq, PartialEq, Ord, PartialOrd)]
pub struct PlotId(pub u64);

/// How a plot came to exist.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum PlotKind {
    /// Handed out by the allocator.
    Allocated,
    /// Taken preemptively because natural terrain was found around it.
    Reserved,
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct PlotRecord {
    pub id: PlotId,
    pub center: Vec2<i32>,
    pub kind: PlotKind,
}

/// The plot lookups the allocator relies on.
pub trait PlotIndex: Send + Sync {
    /// The plot whose footprint contains `wpos`, if any.
    fn plot_at(&self, wpos: Vec2<i32>) -> Option<PlotRecord>;

    /// Whether the plot area containing `wpos` is queued for deletion.
    fn is_marked_for_deletion(&self, wpos: Vec2<i32>) -> bool;

    /// Atomically register a plot centred on `center` unless one is there
    /// already. Returns the new record if this call created it.
    fn claim(&self, center: Vec2<i32>, kind: PlotKind) -> Option<PlotRecord>;
}

/// The lattice point of the grid anchored at `origin` whose footprint
/// contains `wpos`.
pub fn lattice_point(origin: Vec2<i32>, spacing: i32, wpos: Vec2<i32>) -> Vec2<i32> {
    let pitch = spacing * 2;
    let cell = (wpos - origin + spacing).map(|e| e.div_euclid(pitch));
    origin + cell * pitch
}

/// An in-memory [`PlotIndex`] for plots laid out on a lattice.
///
/// The lattice has its origin at `origin` and a pitch of `2 * spacing`. Each
/// lattice point owns the half-open square `[c - spacing, c + spacing)`, so
/// every world position belongs to exactly one cell.
pub struct PlotRegistry {
    origin: Vec2<i32>,
    spacing: i32,
    plots: RwLock<HashMap<Vec2<i32>, PlotRecord>>,
    deletions: RwLock<HashSet<Vec2<i32>>>,
    next_id: AtomicU64,
}

impl PlotRegistry {
    pub fn new(origin: Vec2<i32>, spacing: i32) -> Self {
        Self {
            origin,
            spacing,
            plots: RwLock::new(HashMap::new()),
            deletions: RwLock::new(HashSet::new()),
            next_id: AtomicU64::new(0),
        }
    }

    /// The lattice point whose footprint contains `wpos`.
    pub fn cell_center(&self, wpos: Vec2<i32>) -> Vec2<i32> {
        lattice_point(self.origin, self.spacing, wpos)
    }

    /// All plots, in no particular order.
    pub fn plots(&self) -> Vec<PlotRecord> { self.plots.read().values().cloned().collect() }

    pub fn len(&self) -> usize { self.plots.read().len() }

    pub fn is_empty(&self) -> bool { self.plots.read().is_empty() }

    /// Remove the plot containing `wpos` immediately.
    pub fn remove(&self, wpos: Vec2<i32>) -> Option<PlotRecord> {
        let center = self.cell_center(wpos);
        self.deletions.write().remove(&center);
        self.plots.write().remove(&center)
    }

    /// Queue the plot containing `wpos` for deletion. Its area stays
    /// unavailable until it is removed or unmarked.
    pub fn mark_for_deletion(&self, wpos: Vec2<i32>) -> bool {
        let center = self.cell_center(wpos);
        debug!(?center, "plot area marked for deletion");
        self.deletions.write().insert(center)
    }

    pub fn unmark_deletion(&self, wpos: Vec2<i32>) -> bool {
        self.deletions.write().remove(&self.cell_center(wpos))
    }
}

impl PlotIndex for PlotRegistry {
    fn plot_at(&self, wpos: Vec2<i32>) -> Option<PlotRecord> {
        self.plots.read().get(&self.cell_center(wpos)).cloned()
    }

    fn is_marked_for_deletion(&self, wpos: Vec2<i32>) -> bool {
        self.deletions.read().contains(&self.cell_center(wpos))
    }

    fn claim(&self, center: Vec2<i32>, kind: PlotKind) -> Option<PlotRecord> {
        let center = self.cell_center(center);
        match self.plots.write().entry(center) {
            Entry::Occupied(_) => {
                trace!(?center, "plot already claimed");
                None
            },
            Entry::Vacant(v) => {
                let record = PlotRecord {
                    id: PlotId(self.next_id.fetch_add(1, Ordering::Relaxed)),
                    center,
                    kind,
                };
                debug!(?record, "plot claimed");
                Some(v.insert(record).clone())
            },
        }
    }
}
