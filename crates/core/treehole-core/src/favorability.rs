//! Favorability score shown next to a character

use crate::identity::is_valid_identity;
use crate::Result;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;

/// Score used when nothing has been recorded yet
pub const DEFAULT_FAVORABILITY: f64 = 50.0;

/// Relationship band derived from a score
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FavorabilityBand {
    /// 0..=20
    Cold,
    /// 21..=40
    Distant,
    /// 41..=60
    Normal,
    /// 61..=80
    Close,
    /// 81..=100
    Intimate,
}

impl FavorabilityBand {
    const BANDS: [(f64, FavorabilityBand); 5] = [
        (20.0, FavorabilityBand::Cold),
        (40.0, FavorabilityBand::Distant),
        (60.0, FavorabilityBand::Normal),
        (80.0, FavorabilityBand::Close),
        (100.0, FavorabilityBand::Intimate),
    ];

    /// Human readable label
    pub fn label(&self) -> &'static str {
        match self {
            FavorabilityBand::Cold => "cold / resistant",
            FavorabilityBand::Distant => "distant",
            FavorabilityBand::Normal => "normal",
            FavorabilityBand::Close => "close",
            FavorabilityBand::Intimate => "highly intimate",
        }
    }
}

/// A favorability score, always within `[0, 100]`
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(from = "f64", into = "f64")]
pub struct Favorability(f64);

impl Favorability {
    /// Clamp `score` into range. Non-finite input counts as zero.
    pub fn new(score: f64) -> Self {
        let score = if score.is_finite() { score } else { 0.0 };
        Self(score.clamp(0.0, 100.0))
    }

    /// Parse a stored value, falling back to the default when missing or malformed
    pub fn from_stored(stored: Option<&str>) -> Self {
        match stored.map(str::trim).filter(|s| !s.is_empty()) {
            Some(raw) => match raw.parse::<f64>() {
                Ok(v) if v.is_finite() => Self::new(v),
                _ => Self::default(),
            },
            None => Self::default(),
        }
    }

    /// Clamped score
    pub fn value(&self) -> f64 {
        self.0
    }

    /// Band the score falls into
    pub fn band(&self) -> FavorabilityBand {
        FavorabilityBand::BANDS
            .iter()
            .find(|(max, _)| self.0 <= *max)
            .map(|(_, band)| *band)
            .unwrap_or(FavorabilityBand::Intimate)
    }
}

impl Default for Favorability {
    fn default() -> Self {
        Self(DEFAULT_FAVORABILITY)
    }
}

impl From<f64> for Favorability {
    fn from(value: f64) -> Self {
        Self::new(value)
    }
}

impl From<Favorability> for f64 {
    fn from(value: Favorability) -> Self {
        value.0
    }
}

/// Locally kept scores, one per user and character
///
/// Backed by a flat JSON object of string keys to string values, so entries
/// written by hand or by older clients are read the same way.
#[derive(Debug, Clone)]
pub struct FavorabilityStore {
    entries: HashMap<String, String>,
}

impl FavorabilityStore {
    /// Read the store at `path`; a missing file is an empty store
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let entries = match std::fs::read_to_string(path.as_ref()) {
            Ok(raw) if raw.trim().is_empty() => HashMap::new(),
            Ok(raw) => serde_json::from_str(&raw)?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => HashMap::new(),
            Err(e) => return Err(e.into()),
        };
        Ok(Self { entries })
    }

    /// Key for a user and character. Invalid identities share one anonymous slot.
    pub fn key(user_id: &str, character_id: Option<&str>) -> String {
        let user = if is_valid_identity(user_id) {
            user_id.trim()
        } else {
            "anonymous"
        };
        format!("favorability:{}:{}", user, character_id.unwrap_or_default())
    }

    /// Score for a user and character, default when nothing usable is stored
    pub fn get(&self, user_id: &str, character_id: Option<&str>) -> Favorability {
        let key = Self::key(user_id, character_id);
        Favorability::from_stored(self.entries.get(&key).map(String::as_str))
    }
}
