use crate::settings::{SettingsError, WorldId};
use std::fmt;

/// What the allocator saw before it gave up on a request.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
pub struct AttemptCounts {
    /// Candidates rejected because a plot was already there.
    pub plots: u32,
    /// Candidates rejected because of natural terrain (or unreadable terrain).
    pub terrain: u32,
}

#[derive(Debug)]
pub enum AllocError {
    /// Too many candidates were blocked by terrain. The world is most likely
    /// not empty.
    NoFreeSpot(AttemptCounts),
    UnknownWorld(WorldId),
    InvalidSettings(SettingsError),
}

impl fmt::Display for AllocError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NoFreeSpot(counts) => write!(
                f,
                "Could not find a free spot for a plot ({} blocked by terrain, {} known plots)",
                counts.terrain, counts.plots
            ),
            Self::UnknownWorld(world) => write!(f, "World {} is not registered", world),
            Self::InvalidSettings(e) => write!(f, "Invalid world settings: {}", e),
        }
    }
}

impl std::error::Error for AllocError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::InvalidSettings(e) => Some(e),
            _ => None,
        }
    }
}

impl From<SettingsError> for AllocError {
    fn from(error: SettingsError) -> Self { AllocError::InvalidSettings(error) }
}
