//! Deciding whether a candidate plot centre is free.
//!
//! The cheap checks (known plots, pending deletions, whether the terrain
//! exists yet) happen inline. Only when the surrounding terrain has been
//! generated by the natural world generator do we look at the blocks around
//! the candidate, which means loading up to eight regions. Those loads are
//! spawned as separate tasks so that they proceed in parallel.

use crate::{
    index::{PlotIndex, PlotKind},
    terrain::{RegionContent, Terrain, TerrainError},
};
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{debug, trace, warn};
use vek::*;

#[derive(Copy, Clone, Debug, Hash, Eq, PartialEq)]
pub enum Occupancy {
    /// A known plot (or one pending deletion) overlaps the footprint.
    Plot,
    /// Natural terrain was found next to the candidate, or the terrain could
    /// not be read.
    Terrain,
    Free,
}

/// The eight neighbour directions, in the order their probes are dispatched
/// and joined: north first, then clockwise.
pub const NEIGHBOURS: [Vec2<i32>; 8] = [
    Vec2 { x: 0, y: 1 },
    Vec2 { x: 1, y: 1 },
    Vec2 { x: 1, y: 0 },
    Vec2 { x: 1, y: -1 },
    Vec2 { x: 0, y: -1 },
    Vec2 { x: -1, y: -1 },
    Vec2 { x: -1, y: 0 },
    Vec2 { x: -1, y: 1 },
];

/// Evaluates plot candidates for one world.
pub struct OccupancyProbe {
    index: Arc<dyn PlotIndex>,
    terrain: Arc<dyn Terrain>,
    spacing: i32,
    height: i32,
    use_own_generator: bool,
}

impl OccupancyProbe {
    pub fn new(
        index: Arc<dyn PlotIndex>,
        terrain: Arc<dyn Terrain>,
        spacing: i32,
        height: i32,
        use_own_generator: bool,
    ) -> Self {
        Self {
            index,
            terrain,
            spacing,
            height,
            use_own_generator,
        }
    }

    /// The candidate itself followed by the four corners of its footprint.
    pub fn footprint_samples(&self, pos: Vec2<i32>) -> [Vec2<i32>; 5] {
        let d = self.spacing;
        [
            pos,
            Vec2::new(pos.x - d, pos.y - d),
            Vec2::new(pos.x - d, pos.y + d - 1),
            Vec2::new(pos.x + d - 1, pos.y - d),
            Vec2::new(pos.x + d - 1, pos.y + d - 1),
        ]
    }

    /// Must be called from within a tokio runtime, the terrain probes are
    /// spawned onto it.
    pub async fn evaluate(&self, pos: Vec2<i32>) -> Occupancy {
        if self.index.plot_at(pos).is_some() {
            return Occupancy::Plot;
        }

        let samples = self.footprint_samples(pos);
        if samples
            .iter()
            .any(|&s| self.index.plot_at(s).is_some() || self.index.is_marked_for_deletion(s))
        {
            return Occupancy::Plot;
        }

        // Nothing can have grown on terrain that doesn't exist yet
        if samples.iter().any(|&s| !self.terrain.is_generated(s)) {
            trace!(?pos, "footprint not generated, treating as free");
            return Occupancy::Free;
        }

        if self.use_own_generator {
            return Occupancy::Free;
        }

        let probes = NEIGHBOURS
            .iter()
            .map(|&dir| self.spawn_neighbour_probe(pos, dir))
            .collect::<Vec<_>>();

        // Join in dispatch order and stop at the first hit. Probes that are
        // still outstanding are detached and left to finish on their own.
        for (dir, probe) in NEIGHBOURS.iter().zip(probes) {
            match probe.await {
                Ok(Ok(Occupancy::Free)) => {},
                Ok(Ok(occupancy)) => {
                    debug!(?pos, ?dir, "blocks found next to candidate");
                    return occupancy;
                },
                Ok(Err(e)) => {
                    warn!(?e, ?pos, ?dir, "Failed to load terrain around candidate");
                    return Occupancy::Terrain;
                },
                Err(e) => {
                    warn!(?e, ?pos, ?dir, "Terrain probe did not complete");
                    return Occupancy::Terrain;
                },
            }
        }

        Occupancy::Free
    }

    fn spawn_neighbour_probe(
        &self,
        pos: Vec2<i32>,
        dir: Vec2<i32>,
    ) -> JoinHandle<Result<Occupancy, TerrainError>> {
        let load = self.terrain.load_region(pos + dir);
        let index = Arc::clone(&self.index);
        let wpos = Vec3::from(pos + dir).with_z(self.height);

        tokio::spawn(async move {
            let region = load.await?;
            Ok::<_, TerrainError>(inspect_block(&*region, wpos, || {
                // Mark this area as belonging to a plot so that nobody else
                // goes through the same work
                index.claim(pos, PlotKind::Reserved);
            }))
        })
    }
}

fn inspect_block(
    region: &dyn RegionContent,
    wpos: Vec3<i32>,
    on_blocked: impl FnOnce(),
) -> Occupancy {
    match region.block(wpos) {
        Some(kind) if kind.is_fluid() => Occupancy::Free,
        Some(kind) => {
            trace!(?wpos, %kind, "solid block next to candidate");
            on_blocked();
            Occupancy::Terrain
        },
        None => Occupancy::Terrain,
    }
}
