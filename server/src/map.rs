//! Map geometry and collision queries.
//!
//! The simulation only talks to maps through [`MapGeometry`] and obtains them
//! through a [`MapProvider`]. [`TileMap`] is the bundled implementation: a grid
//! of solid and open tiles, loadable from JSON files by [`JsonMapProvider`].

use crate::error::MapError;
use log::debug;
use rand::{Rng, RngCore};
use serde::Deserialize;
use shared::Weapon;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

/// Map-specific overrides for the server configuration.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct MapConfig {
    pub bot_count: Option<i32>,
    pub bot_depart_limit: Option<i32>,
    pub bot_weapons: Option<Vec<Weapon>>,
    pub items: Vec<ItemSpawn>,
}

#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
pub struct ItemSpawn {
    pub kind: u8,
    pub x: f32,
    pub y: f32,
}

pub trait MapGeometry: Send + Sync + std::fmt::Debug {
    fn name(&self) -> &str;

    /// Checksum clients use to verify their local copy of the map.
    fn checksum(&self) -> u32;

    fn config(&self) -> &MapConfig;

    /// Returns true if the point is inside the map and not inside a wall.
    fn contains(&self, x: f32, y: f32) -> bool;

    /// A random point that is not inside solid geometry.
    fn find_spot(&self, rng: &mut dyn RngCore) -> (f32, f32);

    /// Returns true if a wall blocks the segment between the two points.
    fn find_wall(&self, x1: f32, y1: f32, x2: f32, y2: f32) -> bool;
}

pub trait MapProvider: Send {
    fn load(&self, name: &str) -> Result<Arc<dyn MapGeometry>, MapError>;
}

#[derive(Debug, Clone)]
pub struct TileMap {
    name: String,
    width: usize,
    height: usize,
    tile_size: f32,
    solid: Vec<bool>,
    checksum: u32,
    config: MapConfig,
}

impl TileMap {
    /// Builds a map from text rows where `#` marks a wall tile.
    pub fn from_rows(name: &str, tile_size: f32, rows: &[&str]) -> Result<Self, MapError> {
        let malformed = |reason: &str| MapError::Malformed {
            name: name.to_string(),
            reason: reason.to_string(),
        };

        let height = rows.len();
        let width = rows.first().map(|r| r.chars().count()).unwrap_or(0);
        if width == 0 || height == 0 {
            return Err(malformed("map has no tiles"));
        }
        if rows.iter().any(|r| r.chars().count() != width) {
            return Err(malformed("rows have different lengths"));
        }
        if tile_size <= 0.0 {
            return Err(malformed("tile size must be positive"));
        }

        let solid = rows
            .iter()
            .flat_map(|row| row.chars().map(|c| c == '#'))
            .collect();

        Ok(Self {
            name: name.to_string(),
            width,
            height,
            tile_size,
            solid,
            checksum: 0,
            config: MapConfig::default(),
        })
    }

    /// An open rectangular arena enclosed by a one-tile border.
    pub fn arena(name: &str, width: usize, height: usize, tile_size: f32) -> Self {
        let width = width.max(3);
        let height = height.max(3);
        let solid = (0..height)
            .flat_map(|ty| {
                (0..width).map(move |tx| tx == 0 || ty == 0 || tx == width - 1 || ty == height - 1)
            })
            .collect();

        Self {
            name: name.to_string(),
            width,
            height,
            tile_size,
            solid,
            checksum: 0,
            config: MapConfig::default(),
        }
    }

    pub fn with_config(mut self, config: MapConfig) -> Self {
        self.config = config;
        self
    }

    pub fn with_checksum(mut self, checksum: u32) -> Self {
        self.checksum = checksum;
        self
    }

    pub fn pixel_size(&self) -> (f32, f32) {
        (
            self.width as f32 * self.tile_size,
            self.height as f32 * self.tile_size,
        )
    }

    fn is_solid_at(&self, x: f32, y: f32) -> bool {
        if x < 0.0 || y < 0.0 {
            return true;
        }
        let tx = (x / self.tile_size) as usize;
        let ty = (y / self.tile_size) as usize;
        if tx >= self.width || ty >= self.height {
            return true;
        }
        self.solid[ty * self.width + tx]
    }
}

impl MapGeometry for TileMap {
    fn name(&self) -> &str {
        &self.name
    }

    fn checksum(&self) -> u32 {
        self.checksum
    }

    fn config(&self) -> &MapConfig {
        &self.config
    }

    fn contains(&self, x: f32, y: f32) -> bool {
        !self.is_solid_at(x, y)
    }

    fn find_spot(&self, rng: &mut dyn RngCore) -> (f32, f32) {
        for _ in 0..1000 {
            let tx = rng.gen_range(0..self.width);
            let ty = rng.gen_range(0..self.height);
            if !self.solid[ty * self.width + tx] {
                return (
                    (tx as f32 + 0.5) * self.tile_size,
                    (ty as f32 + 0.5) * self.tile_size,
                );
            }
        }
        // Practically unreachable for sane maps; fall back to the first open tile
        let index = self.solid.iter().position(|s| !s).unwrap_or(0);
        (
            ((index % self.width) as f32 + 0.5) * self.tile_size,
            ((index / self.width) as f32 + 0.5) * self.tile_size,
        )
    }

    fn find_wall(&self, x1: f32, y1: f32, x2: f32, y2: f32) -> bool {
        let length = ((x2 - x1).powi(2) + (y2 - y1).powi(2)).sqrt();
        let step = self.tile_size / 4.0;
        let samples = (length / step).ceil().max(1.0) as usize;

        (0..=samples).any(|i| {
            let t = i as f32 / samples as f32;
            self.is_solid_at(x1 + (x2 - x1) * t, y1 + (y2 - y1) * t)
        })
    }
}

/// On-disk map format.
#[derive(Debug, Deserialize)]
struct MapFile {
    tile_size: f32,
    rows: Vec<String>,
    #[serde(default)]
    checksum: u32,
    #[serde(default)]
    config: MapConfig,
}

/// Loads `<dir>/<name>.json` files.
pub struct JsonMapProvider {
    dir: PathBuf,
}

impl JsonMapProvider {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }
}

impl MapProvider for JsonMapProvider {
    fn load(&self, name: &str) -> Result<Arc<dyn MapGeometry>, MapError> {
        let path = self.dir.join(format!("{}.json", name));
        debug!("Loading map {} from {}", name, path.display());

        let text = std::fs::read_to_string(&path).map_err(|source| MapError::Io {
            name: name.to_string(),
            source,
        })?;
        let file: MapFile = serde_json::from_str(&text).map_err(|e| MapError::Malformed {
            name: name.to_string(),
            reason: e.to_string(),
        })?;

        let rows: Vec<&str> = file.rows.iter().map(String::as_str).collect();
        let map = TileMap::from_rows(name, file.tile_size, &rows)?
            .with_checksum(file.checksum)
            .with_config(file.config);
        Ok(Arc::new(map))
    }
}

/// Serves maps that were built in memory.
#[derive(Default)]
pub struct MemoryMapProvider {
    maps: HashMap<String, Arc<dyn MapGeometry>>,
}

impl MemoryMapProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_map(mut self, map: impl MapGeometry + 'static) -> Self {
        self.maps.insert(map.name().to_string(), Arc::new(map));
        self
    }
}

impl MapProvider for MemoryMapProvider {
    fn load(&self, name: &str) -> Result<Arc<dyn MapGeometry>, MapError> {
        self.maps.get(name).cloned().ok_or_else(|| MapError::Io {
            name: name.to_string(),
            source: std::io::Error::new(std::io::ErrorKind::NotFound, "no such map"),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn walled() -> TileMap {
        TileMap::from_rows(
            "walled",
            10.0,
            &["#####", "#.#.#", "#...#", "#####"],
        )
        .unwrap()
    }

    #[test]
    fn test_from_rows_rejects_ragged_rows() {
        assert!(TileMap::from_rows("bad", 10.0, &["###", "#."]).is_err());
        assert!(TileMap::from_rows("bad", 10.0, &[]).is_err());
    }

    #[test]
    fn test_contains() {
        let map = walled();
        assert!(map.contains(15.0, 15.0));
        assert!(!map.contains(25.0, 15.0));
        assert!(!map.contains(-1.0, 15.0));
        assert!(!map.contains(500.0, 15.0));
    }

    #[test]
    fn test_find_wall() {
        let map = walled();
        // Pillar at tile (2, 1) sits between the two open tiles of row 1
        assert!(map.find_wall(15.0, 15.0, 35.0, 15.0));
        // Row 2 is open end to end
        assert!(!map.find_wall(15.0, 25.0, 35.0, 25.0));
    }

    #[test]
    fn test_find_spot_is_open() {
        let map = walled();
        let mut rng = StdRng::seed_from_u64(7);
        for _ in 0..50 {
            let (x, y) = map.find_spot(&mut rng);
            assert!(map.contains(x, y));
        }
    }

    #[test]
    fn test_arena_has_border() {
        let map = TileMap::arena("arena", 10, 8, 32.0);
        assert_eq!(map.pixel_size(), (320.0, 256.0));
        assert!(!map.contains(16.0, 16.0));
        assert!(map.contains(48.0, 48.0));
    }

    #[test]
    fn test_memory_provider() {
        let provider = MemoryMapProvider::new().with_map(walled());
        assert_eq!(provider.load("walled").unwrap().name(), "walled");
        assert!(provider.load("missing").is_err());
    }

    #[test]
    fn test_json_map_file_parses() {
        let file: MapFile = serde_json::from_str(
            r####"{ "tile_size": 16, "rows": ["###", "#.#", "###"], "checksum": 42,
                 "config": { "bot_count": 3, "items": [{ "kind": 1, "x": 24, "y": 24 }] } }"####,
        )
        .unwrap();
        assert_eq!(file.checksum, 42);
        assert_eq!(file.config.bot_count, Some(3));
        assert_eq!(file.config.items.len(), 1);
    }
}
