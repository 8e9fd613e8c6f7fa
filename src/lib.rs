//! Placement of plots on an endless world grid.
//!
//! New plots are sited by [`PlotAllocator`], which walks a square spiral over
//! a lattice of plot centres and asks an [`OccupancyProbe`] about each one
//! until it finds a spot that is neither taken by another plot nor covered by
//! naturally generated terrain.
#![deny(unsafe_code)]
#![deny(clippy::clone_on_ref_ptr)]

pub mod allocator;
pub mod error;
pub mod index;
pub mod probe;
pub mod settings;
pub mod spiral;
pub mod terrain;

// Reexports
pub use crate::{
    allocator::{LocationStrategy, PlotAllocator, MAX_TERRAIN_ATTEMPTS},
    error::{AllocError, AttemptCounts},
    index::{PlotId, PlotIndex, PlotKind, PlotRecord, PlotRegistry},
    probe::{Occupancy, OccupancyProbe},
    settings::{Settings, WorldId, WorldSettings},
    spiral::{next_grid_pos, GridSpiral},
    terrain::{RegionContent, Terrain, TerrainError},
};
