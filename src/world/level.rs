//! Room collection and level files
//!
//! `Level` owns the rooms of a world and the data derived from all of them
//! at once: concatenated collision segments, area weights for random
//! placement, and the floor-plan extents.
//!
//! Levels can be described declaratively with `LevelDesc` and stored as RON.
//! Supports both compressed (brotli) and uncompressed RON files.
//! - Reading: Auto-detects format by checking for valid RON start
//! - Writing: Always uses brotli compression

use std::fs;
use std::io::Cursor;
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use serde::{Serialize, Deserialize};
use crate::error::{WorldError, WorldResult};
use crate::math::Vec2;
use super::{PortalBound, PortalExtent, Room, RoomStyle, WallSegment};

/// Source of static data generations, shared by all levels so two levels
/// never report the same one
static NEXT_GENERATION: AtomicU64 = AtomicU64::new(1);

/// Axis-aligned bounds of the whole floor plan
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct FloorExtents {
    pub min_x: f32,
    pub max_x: f32,
    pub min_z: f32,
    pub max_z: f32,
}

impl FloorExtents {
    pub fn width(&self) -> f32 {
        self.max_x - self.min_x
    }

    pub fn depth(&self) -> f32 {
        self.max_z - self.min_z
    }
}

/// All rooms of a world
#[derive(Debug, Clone, Default)]
pub struct Level {
    pub(super) rooms: Vec<Room>,
    frozen: bool,
    wall_segments: Vec<WallSegment>,
    room_weights: Vec<f32>,
    extents: FloorExtents,
    /// Changes every time static data is (re)generated; 0 before the first time
    generation: u64,
}

impl Level {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn rooms(&self) -> &[Room] {
        &self.rooms
    }

    pub fn num_rooms(&self) -> usize {
        self.rooms.len()
    }

    pub fn room(&self, idx: usize) -> WorldResult<&Room> {
        self.rooms.get(idx).ok_or(WorldError::UnknownRoom(idx))
    }

    /// True once static data exists; rooms and portals can't change until
    /// [`Level::invalidate_static_data`] is called.
    pub fn is_frozen(&self) -> bool {
        self.frozen
    }

    pub fn add_room(&mut self, room: Room) -> WorldResult<usize> {
        if self.frozen {
            return Err(WorldError::StructuralFrozen);
        }
        self.rooms.push(room);
        Ok(self.rooms.len() - 1)
    }

    /// Add an axis-aligned rectangular room
    pub fn add_rect_room(
        &mut self,
        min_x: f32,
        max_x: f32,
        min_z: f32,
        max_z: f32,
        style: RoomStyle,
    ) -> WorldResult<usize> {
        if !(max_x > min_x && max_z > min_z) {
            return Err(WorldError::InvalidGeometry(format!(
                "empty rectangle x {}..{} z {}..{}", min_x, max_x, min_z, max_z
            )));
        }
        let room = Room::new(&Room::rect_outline(min_x, max_x, min_z, max_z), style)?;
        self.add_room(room)
    }

    /// Cut an opening into a wall of one room
    pub fn add_portal(
        &mut self,
        room: usize,
        edge: usize,
        extent: PortalExtent,
        min_y: f32,
        max_y: Option<f32>,
    ) -> WorldResult<(f32, f32)> {
        if self.frozen {
            return Err(WorldError::StructuralFrozen);
        }
        self.rooms
            .get_mut(room)
            .ok_or(WorldError::UnknownRoom(room))?
            .add_portal(edge, extent, min_y, max_y)
    }

    // =========================================================================
    // Static data
    // =========================================================================

    /// Generate meshes and collision data for every room. Calling this again
    /// without invalidating first does nothing.
    pub fn generate_static_data(&mut self) {
        if self.frozen {
            return;
        }

        let mut wall_segments = Vec::new();
        for room in &mut self.rooms {
            wall_segments.extend_from_slice(&room.generate_static_data().segments);
        }

        let total_area: f32 = self.rooms.iter().map(Room::area).sum();
        self.room_weights = self.rooms
            .iter()
            .map(|r| if total_area > 0.0 { r.area() / total_area } else { 0.0 })
            .collect();

        self.extents = if self.rooms.is_empty() {
            FloorExtents::default()
        } else {
            self.rooms.iter().fold(
                FloorExtents {
                    min_x: f32::INFINITY,
                    max_x: f32::NEG_INFINITY,
                    min_z: f32::INFINITY,
                    max_z: f32::NEG_INFINITY,
                },
                |e, r| FloorExtents {
                    min_x: e.min_x.min(r.min_x()),
                    max_x: e.max_x.max(r.max_x()),
                    min_z: e.min_z.min(r.min_z()),
                    max_z: e.max_z.max(r.max_z()),
                },
            )
        };

        self.wall_segments = wall_segments;
        self.frozen = true;
        self.generation = NEXT_GENERATION.fetch_add(1, Ordering::Relaxed);

        log::info!(
            "generated static data: {} rooms, {} wall segments (generation {})",
            self.rooms.len(), self.wall_segments.len(), self.generation
        );
    }

    /// Drop all derived data so the topology can be edited again
    pub fn invalidate_static_data(&mut self) {
        for room in &mut self.rooms {
            room.invalidate();
        }
        self.wall_segments.clear();
        self.room_weights.clear();
        self.frozen = false;
    }

    /// Collision segments of every room (empty until static data exists)
    pub fn wall_segments(&self) -> &[WallSegment] {
        &self.wall_segments
    }

    /// Per-room probability of being chosen for random placement,
    /// proportional to floor area
    pub fn room_weights(&self) -> &[f32] {
        &self.room_weights
    }

    pub fn extents(&self) -> FloorExtents {
        self.extents
    }

    /// Identifies the current static data, for render caches
    pub fn generation(&self) -> u64 {
        self.generation
    }
}

// =============================================================================
// Level descriptions
// =============================================================================

/// Validation limits to prevent resource exhaustion from malicious files
pub mod limits {
    /// Maximum number of rooms in a level
    pub const MAX_ROOMS: usize = 256;
    /// Maximum outline points per room
    pub const MAX_OUTLINE_POINTS: usize = 256;
    /// Maximum number of extra portals or connections
    pub const MAX_PORTALS: usize = 1024;
    /// Maximum string length for texture names
    pub const MAX_STRING_LEN: usize = 256;
    /// Maximum coordinate value (prevents overflow issues)
    pub const MAX_COORD: f32 = 1_000_000.0;
}

/// Error type for level loading
#[derive(Debug, thiserror::Error)]
pub enum LevelError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Parse error: {0}")]
    Parse(#[from] ron::error::SpannedError),
    #[error("Serialize error: {0}")]
    Serialize(#[from] ron::Error),
    #[error("Validation error: {0}")]
    Validation(String),
    #[error("Geometry error: {0}")]
    World(#[from] WorldError),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoomDesc {
    /// Outline points (x, z), wound like `Room::rect_outline`
    pub outline: Vec<Vec2>,
    #[serde(default)]
    pub style: RoomStyle,
}

/// An opening added explicitly, before connections are made
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PortalDesc {
    pub room: usize,
    pub edge: usize,
    pub extent: PortalExtent,
    #[serde(default)]
    pub min_y: f32,
    #[serde(default)]
    pub max_y: Option<f32>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConnectionDesc {
    pub room_a: usize,
    pub room_b: usize,
    #[serde(default)]
    pub bound: Option<PortalBound>,
    #[serde(default)]
    pub max_y: Option<f32>,
}

/// Declarative level: rooms, then portals, then connections
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LevelDesc {
    pub rooms: Vec<RoomDesc>,
    #[serde(default)]
    pub portals: Vec<PortalDesc>,
    #[serde(default)]
    pub connections: Vec<ConnectionDesc>,
}

impl LevelDesc {
    /// Build the rooms. Static data is not generated yet so the caller can
    /// still add geometry.
    pub fn build(&self) -> Result<Level, LevelError> {
        validate_level_desc(self)?;

        let mut level = Level::new();
        for room in &self.rooms {
            level.add_room(Room::new(&room.outline, room.style.clone())?)?;
        }
        for portal in &self.portals {
            level.add_portal(portal.room, portal.edge, portal.extent, portal.min_y, portal.max_y)?;
        }
        for conn in &self.connections {
            level.connect_rooms(conn.room_a, conn.room_b, conn.bound, conn.max_y)?;
        }
        Ok(level)
    }
}

/// Check if a float is valid (not NaN or Inf)
fn is_valid_float(f: f32) -> bool {
    f.is_finite() && f.abs() <= limits::MAX_COORD
}

fn validate_style(style: &RoomStyle, context: &str) -> Result<(), String> {
    if !is_valid_float(style.wall_height) {
        return Err(format!("{}: invalid wall height {}", context, style.wall_height));
    }
    for tex in [&style.floor_tex, &style.wall_tex, &style.ceil_tex] {
        if tex.name.len() > limits::MAX_STRING_LEN {
            return Err(format!("{}: texture name too long ({} > {})",
                context, tex.name.len(), limits::MAX_STRING_LEN));
        }
    }
    Ok(())
}

fn validate_extent(extent: &PortalExtent, context: &str) -> Result<(), String> {
    let (a, b) = match *extent {
        PortalExtent::Offsets { start, end } => (start, end),
        PortalExtent::X { min, max } | PortalExtent::Z { min, max } => (min, max),
    };
    if !is_valid_float(a) || !is_valid_float(b) {
        return Err(format!("{}: invalid portal extent", context));
    }
    Ok(())
}

/// Check sizes, coordinates and room references before building anything
pub fn validate_level_desc(desc: &LevelDesc) -> Result<(), LevelError> {
    if desc.rooms.len() > limits::MAX_ROOMS {
        return Err(LevelError::Validation(format!(
            "too many rooms ({} > {})", desc.rooms.len(), limits::MAX_ROOMS
        )));
    }
    if desc.portals.len() + desc.connections.len() > limits::MAX_PORTALS {
        return Err(LevelError::Validation(format!(
            "too many portals and connections ({} > {})",
            desc.portals.len() + desc.connections.len(), limits::MAX_PORTALS
        )));
    }

    let total = desc.rooms.len();
    for (i, room) in desc.rooms.iter().enumerate() {
        let context = format!("room {}", i);
        if room.outline.len() > limits::MAX_OUTLINE_POINTS {
            return Err(LevelError::Validation(format!(
                "{}: too many outline points ({} > {})",
                context, room.outline.len(), limits::MAX_OUTLINE_POINTS
            )));
        }
        if room.outline.iter().any(|p| !is_valid_float(p.x) || !is_valid_float(p.y)) {
            return Err(LevelError::Validation(format!("{}: invalid outline coordinate", context)));
        }
        validate_style(&room.style, &context).map_err(LevelError::Validation)?;
    }

    for (i, portal) in desc.portals.iter().enumerate() {
        let context = format!("portal {}", i);
        if portal.room >= total {
            return Err(LevelError::Validation(format!(
                "{}: room index {} out of range ({} rooms)", context, portal.room, total
            )));
        }
        validate_extent(&portal.extent, &context).map_err(LevelError::Validation)?;
    }

    for (i, conn) in desc.connections.iter().enumerate() {
        if conn.room_a >= total || conn.room_b >= total {
            return Err(LevelError::Validation(format!(
                "connection {}: room index out of range ({} rooms)", i, total
            )));
        }
    }

    Ok(())
}

/// Parse level data from bytes: plain or brotli-compressed RON
pub fn parse_level_desc(bytes: &[u8]) -> Result<LevelDesc, LevelError> {
    // Detect format: RON files start with '(' or whitespace, brotli is binary
    let is_plain_ron = bytes.first().map(|&b| b == b'(' || b == b' ' || b == b'\n' || b == b'\r' || b == b'\t').unwrap_or(false);

    let contents = if is_plain_ron {
        String::from_utf8(bytes.to_vec())
            .map_err(|e| LevelError::Io(std::io::Error::new(
                std::io::ErrorKind::InvalidData,
                format!("invalid UTF-8: {}", e)
            )))?
    } else {
        let mut decompressed = Vec::new();
        brotli::BrotliDecompress(&mut Cursor::new(bytes), &mut decompressed)
            .map_err(|e| LevelError::Io(std::io::Error::new(
                std::io::ErrorKind::InvalidData,
                format!("brotli decompression failed: {}", e)
            )))?;
        String::from_utf8(decompressed)
            .map_err(|e| LevelError::Io(std::io::Error::new(
                std::io::ErrorKind::InvalidData,
                format!("invalid UTF-8 after decompression: {}", e)
            )))?
    };

    load_level_desc_from_str(&contents)
}

/// Load a level description from a RON string (for embedded levels or testing)
pub fn load_level_desc_from_str(s: &str) -> Result<LevelDesc, LevelError> {
    let desc: LevelDesc = match ron::from_str(s) {
        Ok(d) => d,
        Err(e) => {
            let pos = e.position;
            if let Some(line) = s.lines().nth(pos.line.saturating_sub(1)) {
                log::error!("RON parse error at line {}: {}", pos.line, e);
                log::error!("  {}", line);
            }
            return Err(e.into());
        }
    };

    validate_level_desc(&desc)?;
    Ok(desc)
}

/// Load a level description from a file (compressed or plain)
pub fn load_level_desc<P: AsRef<Path>>(path: P) -> Result<LevelDesc, LevelError> {
    let path = path.as_ref();
    let bytes = fs::read(path)?;
    log::debug!("loading level {} ({} bytes)", path.display(), bytes.len());
    parse_level_desc(&bytes)
}

/// Serialize a level description to compressed bytes
pub fn serialize_level_desc(desc: &LevelDesc) -> Result<Vec<u8>, LevelError> {
    let config = ron::ser::PrettyConfig::new()
        .depth_limit(4)
        .indentor("  ".to_string());

    let ron_string = ron::ser::to_string_pretty(desc, config)?;

    // Compress with brotli (quality 6, window 22 - good balance of speed/ratio)
    let mut compressed = Vec::new();
    brotli::BrotliCompress(&mut Cursor::new(ron_string.as_bytes()), &mut compressed, &brotli::enc::BrotliEncoderParams {
        quality: 6,
        lgwin: 22,
        ..Default::default()
    }).map_err(|e| LevelError::Io(std::io::Error::new(
        std::io::ErrorKind::Other,
        format!("brotli compression failed: {}", e)
    )))?;

    Ok(compressed)
}

/// Save a level description to a compressed RON file (brotli)
pub fn save_level_desc<P: AsRef<Path>>(desc: &LevelDesc, path: P) -> Result<(), LevelError> {
    fs::write(path, serialize_level_desc(desc)?)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::math::Vec3;
    use tempfile::TempDir;

    const TWO_ROOMS: &str = r#"(
        rooms: [
            (outline: [(x: 5.0, y: 5.0), (x: 5.0, y: 0.0), (x: 0.0, y: 0.0), (x: 0.0, y: 5.0)]),
            (
                outline: [(x: 10.0, y: 5.0), (x: 10.0, y: 0.0), (x: 7.0, y: 0.0), (x: 7.0, y: 5.0)],
                style: (wall_tex: (name: "brick_wall"), no_ceiling: true),
            ),
        ],
        connections: [
            (room_a: 0, room_b: 1, bound: Some(Z(min: 1.0, max: 3.0))),
        ],
    )"#;

    #[test]
    fn test_static_data_is_idempotent() {
        let mut level = Level::new();
        level.add_rect_room(0.0, 4.0, 0.0, 4.0, RoomStyle::default()).unwrap();
        level.generate_static_data();
        let segs = level.wall_segments().len();
        let generation = level.generation();

        level.generate_static_data();
        assert_eq!(level.wall_segments().len(), segs);
        assert_eq!(level.generation(), generation);
        assert_eq!(segs, 4);

        // Another level never shares a generation
        let mut other = level.clone();
        other.invalidate_static_data();
        other.generate_static_data();
        assert_ne!(other.generation(), generation);
    }

    #[test]
    fn test_frozen_level_rejects_rooms() {
        let mut level = Level::new();
        level.add_rect_room(0.0, 4.0, 0.0, 4.0, RoomStyle::default()).unwrap();
        level.generate_static_data();
        assert!(level.is_frozen());
        assert_eq!(
            level.add_rect_room(5.0, 6.0, 0.0, 1.0, RoomStyle::default()),
            Err(WorldError::StructuralFrozen)
        );
        assert_eq!(
            level.add_portal(0, 0, PortalExtent::Offsets { start: 1.0, end: 2.0 }, 0.0, None),
            Err(WorldError::StructuralFrozen)
        );

        let first_generation = level.generation();
        level.invalidate_static_data();
        assert!(!level.is_frozen());
        assert!(level.add_rect_room(5.0, 6.0, 0.0, 1.0, RoomStyle::default()).is_ok());
        level.generate_static_data();
        assert_eq!(level.wall_segments().len(), 8);
        assert_ne!(level.generation(), first_generation);
    }

    #[test]
    fn test_room_weights_follow_area() {
        let mut level = Level::new();
        level.add_rect_room(0.0, 1.0, 0.0, 1.0, RoomStyle::default()).unwrap();
        level.add_rect_room(2.0, 5.0, 0.0, 1.0, RoomStyle::default()).unwrap();
        level.generate_static_data();

        let weights = level.room_weights();
        assert!((weights[0] - 0.25).abs() < 1e-5);
        assert!((weights[1] - 0.75).abs() < 1e-5);

        let e = level.extents();
        assert_eq!((e.min_x, e.max_x, e.min_z, e.max_z), (0.0, 5.0, 0.0, 1.0));
    }

    #[test]
    fn test_unknown_room() {
        let level = Level::new();
        assert!(matches!(level.room(3), Err(WorldError::UnknownRoom(3))));
    }

    #[test]
    fn test_build_from_str() {
        let desc = load_level_desc_from_str(TWO_ROOMS).unwrap();
        assert_eq!(desc.rooms[1].style.wall_tex.name, "brick_wall");
        // Unspecified style fields keep their defaults
        assert_eq!(desc.rooms[0].style.floor_tex.name, "floor_tiles_bw");

        let mut level = desc.build().unwrap();
        assert_eq!(level.num_rooms(), 3);
        level.generate_static_data();
        assert!(level.room(2).unwrap().point_inside(Vec3::ground(6.0, 2.0)));
    }

    #[test]
    fn test_validation_rejects_bad_reference() {
        let bad = r#"(
            rooms: [(outline: [(x: 1.0, y: 1.0), (x: 1.0, y: 0.0), (x: 0.0, y: 0.0)])],
            connections: [(room_a: 0, room_b: 4)],
        )"#;
        assert!(matches!(load_level_desc_from_str(bad), Err(LevelError::Validation(_))));
    }

    #[test]
    fn test_build_surfaces_geometry_errors() {
        let degenerate = r#"(
            rooms: [(outline: [(x: 0.0, y: 0.0), (x: 1.0, y: 0.0)])],
        )"#;
        let desc = load_level_desc_from_str(degenerate).unwrap();
        assert!(matches!(desc.build(), Err(LevelError::World(WorldError::InvalidGeometry(_)))));
    }

    #[test]
    fn test_parse_error() {
        assert!(matches!(load_level_desc_from_str("(rooms: [oops"), Err(LevelError::Parse(_))));
    }

    #[test]
    fn test_save_and_load_compressed() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("two_rooms.ron");
        let desc = load_level_desc_from_str(TWO_ROOMS).unwrap();

        save_level_desc(&desc, &path).unwrap();
        let bytes = fs::read(&path).unwrap();
        // Brotli output, not plain text
        assert_ne!(bytes.first(), Some(&b'('));

        let loaded = load_level_desc(&path).unwrap();
        assert_eq!(loaded, desc);
    }

    #[test]
    fn test_load_plain_ron_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("plain.ron");
        fs::write(&path, TWO_ROOMS.trim_start()).unwrap();
        let loaded = load_level_desc(&path).unwrap();
        assert_eq!(loaded.connections.len(), 1);
    }
}
