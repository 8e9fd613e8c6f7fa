//! Finding the next free plot in a world.
//!
//! Every world remembers the last centre it handed out. A request resumes the
//! spiral walk from there and probes candidates until one is free. Plots that
//! are already taken are simply skipped, however many there are. Terrain is
//! another matter: finding natural blocks around many candidates in a row
//! means the world was never meant to host the plot grid, so we give up after
//! [`MAX_TERRAIN_ATTEMPTS`].

use crate::{
    error::{AllocError, AttemptCounts},
    index::{lattice_point, PlotIndex, PlotKind},
    probe::{Occupancy, OccupancyProbe},
    settings::{WorldId, WorldSettings},
    spiral::next_grid_pos,
    terrain::Terrain,
};
use futures_util::{future::BoxFuture, FutureExt};
use hashbrown::HashMap;
use parking_lot::RwLock;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, error, info};
use vek::*;

/// Number of terrain-blocked candidates tolerated within one request.
pub const MAX_TERRAIN_ATTEMPTS: u32 = 20;

/// Something that can pick where the next plot of a world goes.
pub trait LocationStrategy: Send + Sync {
    fn next_location<'a>(
        &'a self,
        world: &'a WorldId,
    ) -> BoxFuture<'a, Result<Vec2<i32>, AllocError>>;
}

struct WorldState {
    settings: WorldSettings,
    index: Arc<dyn PlotIndex>,
    probe: OccupancyProbe,
    /// Held for the whole of a request, so that concurrent requests for the
    /// same world walk the spiral one after another.
    last: Mutex<Option<Vec2<i32>>>,
}

/// The default [`LocationStrategy`]: a square spiral over the plot grid.
#[derive(Default)]
pub struct PlotAllocator {
    worlds: RwLock<HashMap<WorldId, Arc<WorldState>>>,
}

impl PlotAllocator {
    pub fn new() -> Self { Self::default() }

    /// Start allocating plots in `world`. Registering a world again replaces
    /// its previous state, including the last allocated position.
    pub fn register_world(
        &self,
        world: WorldId,
        settings: WorldSettings,
        index: Arc<dyn PlotIndex>,
        terrain: Arc<dyn Terrain>,
    ) -> Result<(), AllocError> {
        settings.validate()?;

        let probe = OccupancyProbe::new(
            Arc::clone(&index),
            terrain,
            settings.spacing,
            settings.height,
            settings.use_own_generator,
        );
        debug!(%world, ?settings, "registering world");
        self.worlds.write().insert(
            world,
            Arc::new(WorldState {
                settings,
                index,
                probe,
                last: Mutex::new(None),
            }),
        );
        Ok(())
    }

    pub fn unregister_world(&self, world: &WorldId) -> bool {
        self.worlds.write().remove(world).is_some()
    }

    pub fn is_registered(&self, world: &WorldId) -> bool { self.worlds.read().contains_key(world) }

    fn world(&self, world: &WorldId) -> Result<Arc<WorldState>, AllocError> {
        self.worlds
            .read()
            .get(world)
            .cloned()
            .ok_or_else(|| AllocError::UnknownWorld(world.clone()))
    }

    /// The centre most recently handed out in `world`, if any.
    pub async fn last(&self, world: &WorldId) -> Result<Option<Vec2<i32>>, AllocError> {
        let state = self.world(world)?;
        let last = *state.last.lock().await;
        Ok(last)
    }

    /// Override where the next search in `world` starts, e.g. when restoring
    /// persisted plots. `pos` is snapped to the centre of the plot grid cell
    /// containing it.
    pub async fn set_last(&self, world: &WorldId, pos: Vec2<i32>) -> Result<(), AllocError> {
        let state = self.world(world)?;
        let pos = lattice_point(state.settings.origin(), state.settings.spacing, pos);
        *state.last.lock().await = Some(pos);
        Ok(())
    }

    /// Find and claim a free plot centre in `world`.
    ///
    /// On failure the last allocated position is left untouched, so the next
    /// request starts from the same point.
    pub async fn allocate(&self, world: &WorldId) -> Result<Vec2<i32>, AllocError> {
        let state = self.world(world)?;
        let mut last = state.last.lock().await;

        let spacing = state.settings.spacing;
        let mut pos = last.unwrap_or_else(|| state.settings.origin());
        let mut counts = AttemptCounts::default();

        loop {
            match state.probe.evaluate(pos).await {
                Occupancy::Free => {
                    if state.index.claim(pos, PlotKind::Allocated).is_some() {
                        *last = Some(pos);
                        info!(%world, ?pos, ?counts, "Allocated plot");
                        return Ok(pos);
                    }
                    // Reserved by a terrain probe that outlived its request
                    counts.plots += 1;
                },
                Occupancy::Plot => counts.plots += 1,
                Occupancy::Terrain => counts.terrain += 1,
            }

            if counts.terrain >= MAX_TERRAIN_ATTEMPTS {
                error!(%world, "Could not find a free spot for plots! Is this world empty?");
                error!(
                    "Blocks around center locations: {} max {}",
                    counts.terrain, MAX_TERRAIN_ATTEMPTS
                );
                error!("Known plots: {} max unlimited.", counts.plots);
                return Err(AllocError::NoFreeSpot(counts));
            }

            pos = next_grid_pos(pos, spacing);
        }
    }
}

impl LocationStrategy for PlotAllocator {
    fn next_location<'a>(
        &'a self,
        world: &'a WorldId,
    ) -> BoxFuture<'a, Result<Vec2<i32>, AllocError>> {
        self.allocate(world).boxed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        index::PlotRegistry,
        settings::SettingsError,
        spiral::GridSpiral,
        terrain::{BlockKind, ChunkGen, ChunkStore, FlatGen, TerrainChunk, TerrainError},
    };

    const SPACING: i32 = 16;
    const HEIGHT: i32 = 64;

    fn settings() -> WorldSettings {
        WorldSettings {
            spacing: SPACING,
            start: Vec2::zero(),
            offset: Vec2::zero(),
            height: HEIGHT,
            use_own_generator: false,
        }
    }

    fn register(
        alloc: &PlotAllocator,
        settings: WorldSettings,
        gen: impl ChunkGen + 'static,
    ) -> (WorldId, Arc<PlotRegistry>, ChunkStore) {
        let world = WorldId::from("test");
        let index = Arc::new(PlotRegistry::new(settings.origin(), settings.spacing));
        let terrain = ChunkStore::new(gen);
        alloc
            .register_world(
                world.clone(),
                settings,
                Arc::clone(&index) as Arc<dyn PlotIndex>,
                Arc::new(terrain.clone()),
            )
            .unwrap();
        (world, index, terrain)
    }

    fn solid() -> FlatGen {
        FlatGen {
            height: HEIGHT + 8,
            ground: BlockKind::Rock,
            sea_level: 0,
        }
    }

    /// Solid to the west of x = 0, open sea everywhere else.
    struct WestCoast;

    impl ChunkGen for WestCoast {
        fn generate(&self, key: Vec2<i32>) -> Result<TerrainChunk, TerrainError> {
            Ok(if key.x < 0 {
                TerrainChunk::new(key, HEIGHT + 8, BlockKind::Rock, HEIGHT + 4)
            } else {
                TerrainChunk::new(key, HEIGHT - 20, BlockKind::Sand, HEIGHT - 4)
            })
        }
    }

    #[tokio::test]
    async fn follows_the_spiral() {
        let alloc = PlotAllocator::new();
        let (world, index, _) = register(&alloc, settings(), solid());

        // Nothing is generated, so every candidate is free
        let expected = GridSpiral::new(Vec2::zero(), SPACING).take(10).collect::<Vec<_>>();
        for pos in expected {
            assert_eq!(alloc.allocate(&world).await.unwrap(), pos);
            assert_eq!(index.plot_at(pos).unwrap().kind, PlotKind::Allocated);
        }
        assert_eq!(index.len(), 10);
    }

    #[tokio::test]
    async fn starts_at_the_world_origin() {
        let alloc = PlotAllocator::new();
        let settings = WorldSettings {
            start: Vec2::new(1000, -1000),
            offset: Vec2::new(32, 0),
            ..settings()
        };
        let (world, _, _) = register(&alloc, settings, solid());
        assert_eq!(alloc.last(&world).await.unwrap(), None);
        assert_eq!(alloc.allocate(&world).await.unwrap(), Vec2::new(1032, -1000));
        assert_eq!(
            alloc.last(&world).await.unwrap(),
            Some(Vec2::new(1032, -1000))
        );
    }

    #[tokio::test]
    async fn unknown_world() {
        let alloc = PlotAllocator::new();
        assert!(matches!(
            alloc.allocate(&"nowhere".into()).await,
            Err(AllocError::UnknownWorld(_))
        ));
    }

    #[tokio::test]
    async fn rejects_bad_spacing() {
        let alloc = PlotAllocator::new();
        let settings = WorldSettings {
            spacing: -3,
            ..settings()
        };
        let res = alloc.register_world(
            "bad".into(),
            settings,
            Arc::new(PlotRegistry::new(Vec2::zero(), 1)),
            Arc::new(ChunkStore::new(solid())),
        );
        assert!(matches!(res, Err(AllocError::InvalidSettings(_))));
        assert!(!alloc.is_registered(&"bad".into()));

        // Too wide to lay out a grid in i32 coordinates
        let settings = WorldSettings {
            spacing: i32::MAX / 2 + 1,
            ..self::settings()
        };
        let res = alloc.register_world(
            "huge".into(),
            settings,
            Arc::new(PlotRegistry::new(Vec2::zero(), 1)),
            Arc::new(ChunkStore::new(solid())),
        );
        assert!(matches!(
            res,
            Err(AllocError::InvalidSettings(SettingsError::SpacingTooLarge(_)))
        ));
        assert!(matches!(
            alloc.allocate(&"huge".into()).await,
            Err(AllocError::UnknownWorld(_))
        ));
    }

    #[tokio::test]
    async fn gives_up_on_the_twentieth_blocked_candidate() {
        let alloc = PlotAllocator::new();
        let (world, index, terrain) = register(&alloc, settings(), solid());
        terrain.pregenerate(Vec2::zero(), 6).unwrap();

        match alloc.allocate(&world).await {
            Err(AllocError::NoFreeSpot(counts)) => assert_eq!(counts, AttemptCounts {
                plots: 0,
                terrain: MAX_TERRAIN_ATTEMPTS,
            }),
            other => panic!("expected failure, got {:?}", other),
        }
        assert_eq!(alloc.last(&world).await.unwrap(), None);

        // Every blocked candidate was reserved. The 21st never got probed.
        let spiral = GridSpiral::new(Vec2::zero(), SPACING)
            .take(21)
            .collect::<Vec<_>>();
        for pos in &spiral[..20] {
            assert_eq!(index.plot_at(*pos).unwrap().kind, PlotKind::Reserved);
        }
        assert!(index.plot_at(spiral[20]).is_none());

        // The next request skips the reserved plots and hits fresh terrain
        match alloc.allocate(&world).await {
            Err(AllocError::NoFreeSpot(counts)) => assert_eq!(counts, AttemptCounts {
                plots: 20,
                terrain: MAX_TERRAIN_ATTEMPTS,
            }),
            other => panic!("expected failure, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn walks_past_terrain() {
        let alloc = PlotAllocator::new();
        let (world, index, terrain) = register(&alloc, settings(), WestCoast);
        terrain.pregenerate(Vec2::zero(), 4).unwrap();

        // (0, 0) and (0, 32) both touch the solid chunks west of x = 0
        assert_eq!(alloc.allocate(&world).await.unwrap(), Vec2::new(32, 32));
        assert_eq!(
            index.plot_at(Vec2::new(0, 0)).unwrap().kind,
            PlotKind::Reserved
        );
        assert_eq!(
            index.plot_at(Vec2::new(0, 32)).unwrap().kind,
            PlotKind::Reserved
        );
        assert_eq!(alloc.allocate(&world).await.unwrap(), Vec2::new(32, 0));
    }

    #[tokio::test]
    async fn resumes_from_set_last() {
        let alloc = PlotAllocator::new();
        let (world, _, _) = register(&alloc, settings(), solid());
        alloc.set_last(&world, Vec2::new(-32, 32)).await.unwrap();
        assert_eq!(alloc.allocate(&world).await.unwrap(), Vec2::new(-32, 32));
        assert_eq!(alloc.allocate(&world).await.unwrap(), Vec2::new(-32, 64));
    }

    #[tokio::test]
    async fn set_last_snaps_to_the_grid() {
        let alloc = PlotAllocator::new();
        let (world, index, _) = register(&alloc, settings(), solid());
        assert_eq!(alloc.allocate(&world).await.unwrap(), Vec2::zero());

        alloc.set_last(&world, Vec2::new(5, 5)).await.unwrap();
        assert_eq!(alloc.last(&world).await.unwrap(), Some(Vec2::zero()));
        // (0, 0) is taken, so the walk moves on to its successor
        assert_eq!(alloc.allocate(&world).await.unwrap(), Vec2::new(0, 32));

        alloc.set_last(&world, Vec2::new(-20, 40)).await.unwrap();
        assert_eq!(alloc.allocate(&world).await.unwrap(), Vec2::new(-32, 32));
        for plot in index.plots() {
            assert_eq!(plot.center.map(|e| e.rem_euclid(SPACING * 2)), Vec2::zero());
        }
    }

    #[tokio::test]
    async fn strategy_object() {
        let alloc = PlotAllocator::new();
        let (world, _, _) = register(&alloc, settings(), solid());
        let strategy: &dyn LocationStrategy = &alloc;
        assert_eq!(strategy.next_location(&world).await.unwrap(), Vec2::zero());
        assert_eq!(
            strategy.next_location(&world).await.unwrap(),
            Vec2::new(0, 32)
        );
    }
}
