//! Per-world plot layout configuration, stored as RON.

use hashbrown::HashMap;
use serde::{Deserialize, Serialize};
use std::{fmt, fs, io, path::Path};
use tracing::{error, info, warn};
use vek::*;

/// Largest accepted plot spacing. Leaves room for the lattice pitch and the
/// footprint corners of a centre to be computed without overflowing.
pub const MAX_SPACING: i32 = i32::MAX / 4;

#[derive(Clone, Debug, Hash, Eq, PartialEq, Ord, PartialOrd, Serialize, Deserialize)]
#[serde(transparent)]
pub struct WorldId(pub String);

impl From<&str> for WorldId {
    fn from(name: &str) -> Self { Self(name.to_owned()) }
}

impl fmt::Display for WorldId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str(&self.0) }
}

#[derive(Debug)]
pub enum SettingsError {
    Io(io::Error),
    Parse(ron::error::SpannedError),
    Serialize(ron::Error),
    NonPositiveSpacing(i32),
    SpacingTooLarge(i32),
}

impl fmt::Display for SettingsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Io(e) => write!(f, "{}", e),
            Self::Parse(e) => write!(f, "{}", e),
            Self::Serialize(e) => write!(f, "{}", e),
            Self::NonPositiveSpacing(spacing) => {
                write!(f, "plot spacing must be positive, got {}", spacing)
            },
            Self::SpacingTooLarge(spacing) => write!(
                f,
                "plot spacing must be at most {}, got {}",
                MAX_SPACING, spacing
            ),
        }
    }
}

impl std::error::Error for SettingsError {}

impl From<io::Error> for SettingsError {
    fn from(error: io::Error) -> Self { SettingsError::Io(error) }
}

impl From<ron::error::SpannedError> for SettingsError {
    fn from(error: ron::error::SpannedError) -> Self { SettingsError::Parse(error) }
}

impl From<ron::Error> for SettingsError {
    fn from(error: ron::Error) -> Self { SettingsError::Serialize(error) }
}

/// Layout of the plot grid in one world.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WorldSettings {
    /// Minimum distance between plot centres and edge, i.e. half the pitch
    /// of the plot grid.
    pub spacing: i32,
    /// Where the very first plot is placed.
    pub start: Vec2<i32>,
    /// Added to `start`, lets a world shift its grid without moving the
    /// nominal start.
    pub offset: Vec2<i32>,
    /// Vertical position of plot centres.
    pub height: i32,
    /// The world's terrain comes from a generator of our own, which never
    /// produces anything that could collide with a plot.
    pub use_own_generator: bool,
}

impl Default for WorldSettings {
    fn default() -> Self {
        Self {
            spacing: 400,
            start: Vec2::zero(),
            offset: Vec2::zero(),
            height: 120,
            use_own_generator: false,
        }
    }
}

impl WorldSettings {
    pub fn origin(&self) -> Vec2<i32> { self.start + self.offset }

    pub fn validate(&self) -> Result<(), SettingsError> {
        if self.spacing <= 0 {
            return Err(SettingsError::NonPositiveSpacing(self.spacing));
        }
        if self.spacing > MAX_SPACING {
            return Err(SettingsError::SpacingTooLarge(self.spacing));
        }
        Ok(())
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub worlds: HashMap<WorldId, WorldSettings>,
}

impl Default for Settings {
    fn default() -> Self {
        let mut worlds = HashMap::new();
        worlds.insert(WorldId::from("default"), WorldSettings::default());
        Self { worlds }
    }
}

impl Settings {
    /// Load the settings at `path`. A missing file is created with the
    /// defaults, a broken one is ignored in favour of the defaults.
    pub fn load(path: &Path) -> Self {
        match fs::read_to_string(path) {
            Ok(contents) => match Self::from_ron(&contents) {
                Ok(settings) => settings,
                Err(e) => {
                    warn!(
                        ?e,
                        ?path,
                        "Failed to parse setting file! Falling back to default"
                    );
                    Self::default()
                },
            },
            Err(_) => {
                info!(?path, "No settings file found, creating one with the defaults");
                let default_settings = Self::default();
                if let Err(e) = default_settings.save_to_file(path) {
                    error!(?e, "Failed to create default setting file!");
                }
                default_settings
            },
        }
    }

    pub fn from_ron(s: &str) -> Result<Self, SettingsError> { Ok(ron::de::from_str(s)?) }

    pub fn to_ron(&self) -> Result<String, SettingsError> {
        Ok(ron::ser::to_string_pretty(
            self,
            ron::ser::PrettyConfig::default(),
        )?)
    }

    pub fn save_to_file(&self, path: &Path) -> Result<(), SettingsError> {
        if let Some(dir) = path.parent() {
            fs::create_dir_all(dir)?;
        }
        fs::write(path, self.to_ron()?)?;
        Ok(())
    }

    pub fn world(&self, id: &WorldId) -> Option<&WorldSettings> { self.worlds.get(id) }
}
