use std::collections::HashMap;
use std::path::Path;

use crate::error::ConfigError;
use crate::types::Rect;

/// Region the loop reads the countdown from.
pub const TIME: &str = "time";
/// First click target.
pub const BUY: &str = "buy";
/// Second click target.
pub const VERIFY: &str = "verify";

/// Named screen rectangles, read-only after load.
///
/// Source format is a JSON object mapping a name to `[left, top, right, bottom]`:
///
/// ```json
/// { "time": [1180, 96, 1380, 140], "buy": [2150, 1290, 2400, 1360] }
/// ```
#[derive(Debug, Clone)]
pub struct RegionRegistry {
    regions: HashMap<String, Rect>,
    time: Rect,
}

impl RegionRegistry {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json(&text)
    }

    pub fn from_json(text: &str) -> Result<Self, ConfigError> {
        let raw: HashMap<String, [i32; 4]> = serde_json::from_str(text)?;
        Self::from_map(raw)
    }

    pub fn from_map(raw: HashMap<String, [i32; 4]>) -> Result<Self, ConfigError> {
        let mut regions = HashMap::with_capacity(raw.len());
        for (name, [l, t, r, b]) in raw {
            if l >= r || t >= b {
                return Err(ConfigError::BadRect { name, l, t, r, b });
            }
            regions.insert(name, Rect::new(l, t, r, b));
        }

        let time = *regions
            .get(TIME)
            .ok_or_else(|| ConfigError::MissingRegion(TIME.to_string()))?;

        Ok(Self { regions, time })
    }

    pub fn get(&self, name: &str) -> Option<Rect> {
        self.regions.get(name).copied()
    }

    /// The mandatory countdown region.
    pub fn time(&self) -> Rect {
        self.time
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.regions.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.regions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.regions.is_empty()
    }
}
