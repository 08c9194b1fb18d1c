//! Core geometry types for polygonal rooms
//!
//! A room is an outline in the XZ plane extruded up to a wall height.
//! Walls can carry portals (openings); the wall spans around portals are
//! turned into renderable quads, and the spans touching the floor also
//! become 2D collision segments.

use serde::{Serialize, Deserialize};
use crate::error::{WorldError, WorldResult};
use crate::math::{Vec2, Vec3};

/// Wall height used when a room doesn't specify one
pub const DEFAULT_WALL_HEIGHT: f32 = 8.0;

/// Texture density in texels per metre. Texture coordinates are emitted in
/// metres; renderers multiply by `TEX_DENSITY / texture_size`.
pub const TEX_DENSITY: f32 = 512.0;

/// Portal offsets this close outside the edge are treated as lying on it
const PORTAL_EPSILON: f32 = 1e-4;

/// Texture reference by name
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct TextureRef {
    /// Texture name without extension (e.g., "brick_wall")
    pub name: String,
}

impl TextureRef {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }

    /// Create a None reference (renderers fall back to a flat colour)
    pub fn none() -> Self {
        Self { name: String::new() }
    }

    /// Check if this is a valid reference
    pub fn is_valid(&self) -> bool {
        !self.name.is_empty()
    }
}

impl Default for TextureRef {
    fn default() -> Self {
        Self::none()
    }
}

fn default_wall_height() -> f32 { DEFAULT_WALL_HEIGHT }
fn default_floor_tex() -> TextureRef { TextureRef::new("floor_tiles_bw") }
fn default_wall_tex() -> TextureRef { TextureRef::new("concrete") }
fn default_ceil_tex() -> TextureRef { TextureRef::new("concrete_tiles") }

/// Surface appearance and height of a room
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoomStyle {
    #[serde(default = "default_wall_height")]
    pub wall_height: f32,
    #[serde(default = "default_floor_tex")]
    pub floor_tex: TextureRef,
    #[serde(default = "default_wall_tex")]
    pub wall_tex: TextureRef,
    #[serde(default = "default_ceil_tex")]
    pub ceil_tex: TextureRef,
    /// Open-air room: no ceiling polygon is generated
    #[serde(default)]
    pub no_ceiling: bool,
}

impl Default for RoomStyle {
    fn default() -> Self {
        Self {
            wall_height: DEFAULT_WALL_HEIGHT,
            floor_tex: default_floor_tex(),
            wall_tex: default_wall_tex(),
            ceil_tex: default_ceil_tex(),
            no_ceiling: false,
        }
    }
}

impl RoomStyle {
    pub fn with_textures(floor: &str, wall: &str, ceil: &str) -> Self {
        Self {
            floor_tex: TextureRef::new(floor),
            wall_tex: TextureRef::new(wall),
            ceil_tex: TextureRef::new(ceil),
            ..Default::default()
        }
    }
}

/// An opening in one wall edge
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Portal {
    /// Offset along the edge where the opening starts
    pub start: f32,
    /// Offset along the edge where the opening ends
    pub end: f32,
    /// Bottom of the opening (0 = floor level)
    pub min_y: f32,
    /// Top of the opening
    pub max_y: f32,
}

/// How the horizontal extent of a new portal is given
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum PortalExtent {
    /// Raw offsets along the edge
    Offsets { start: f32, end: f32 },
    /// World X bounds, projected onto the edge
    X { min: f32, max: f32 },
    /// World Z bounds, projected onto the edge
    Z { min: f32, max: f32 },
}

/// Ground-level wall span used for collision (height ignored)
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WallSegment {
    pub a: Vec3,
    pub b: Vec3,
}

/// A renderable wall rectangle
#[derive(Debug, Clone, PartialEq)]
pub struct WallQuad {
    /// Corners: bottom-start, top-start, top-end, bottom-end
    pub vertices: [Vec3; 4],
    /// Normal of the visible face
    pub normal: Vec3,
    /// Texture coordinates in metres (distance along the wall, height)
    pub texcoords: [Vec2; 4],
}

/// Static render and collision data derived from a room
#[derive(Debug, Clone, Default)]
pub struct RoomMesh {
    /// Floor polygon (the outline as-is)
    pub floor: Vec<Vec3>,
    pub floor_texcoords: Vec<Vec2>,
    /// Ceiling polygon: outline reversed and lifted to wall height
    pub ceiling: Option<Vec<Vec3>>,
    pub ceiling_texcoords: Vec<Vec2>,
    pub walls: Vec<WallQuad>,
    pub segments: Vec<WallSegment>,
}

/// A room: outline, walls, and the portals cut into them
#[derive(Debug, Clone)]
pub struct Room {
    /// Outline points with y = 0
    outline: Vec<Vec3>,
    style: RoomStyle,

    min_x: f32,
    max_x: f32,
    min_z: f32,
    max_z: f32,
    area: f32,

    /// Unit direction of each edge (point i to point i+1)
    edge_dirs: Vec<Vec3>,
    /// Wall normals, `-cross(edge_dir, UP)`. With the winding produced by
    /// rectangular rooms these point toward the interior.
    edge_normals: Vec<Vec3>,

    /// Portals per edge, sorted by start offset
    portals: Vec<Vec<Portal>>,

    /// Generated on demand; its presence freezes the portal lists
    mesh: Option<RoomMesh>,
}

impl Room {
    /// Create a room from its XZ outline.
    ///
    /// Points must be wound the same way as [`Room::rect_outline`]; the
    /// outline needs at least 3 points, no zero-length edges and a non-zero area.
    pub fn new(outline: &[Vec2], style: RoomStyle) -> WorldResult<Self> {
        if outline.len() < 3 {
            return Err(WorldError::InvalidGeometry(format!(
                "outline needs at least 3 points, got {}", outline.len()
            )));
        }
        if outline.iter().any(|p| !p.x.is_finite() || !p.y.is_finite()) {
            return Err(WorldError::InvalidGeometry("outline has non-finite coordinates".into()));
        }
        if !(style.wall_height > 0.0) {
            return Err(WorldError::InvalidGeometry(format!(
                "wall height must be positive, got {}", style.wall_height
            )));
        }

        let outline: Vec<Vec3> = outline.iter().map(|p| Vec3::ground(p.x, p.y)).collect();
        let n = outline.len();

        let mut edge_dirs = Vec::with_capacity(n);
        let mut edge_normals = Vec::with_capacity(n);
        for i in 0..n {
            let edge = outline[(i + 1) % n] - outline[i];
            if edge.len() < 1e-6 {
                return Err(WorldError::InvalidGeometry(format!("edge {} has zero length", i)));
            }
            let dir = edge.normalize();
            edge_dirs.push(dir);
            edge_normals.push((-dir.cross(Vec3::UP)).normalize());
        }

        // Shoelace area
        let twice_area: f32 = (0..n)
            .map(|i| {
                let p = outline[i];
                let q = outline[(i + 1) % n];
                p.x * q.z - q.x * p.z
            })
            .sum();
        let area = twice_area.abs() * 0.5;
        if area < 1e-6 {
            return Err(WorldError::InvalidGeometry("outline has zero area".into()));
        }

        let min_x = outline.iter().map(|p| p.x).fold(f32::INFINITY, f32::min);
        let max_x = outline.iter().map(|p| p.x).fold(f32::NEG_INFINITY, f32::max);
        let min_z = outline.iter().map(|p| p.z).fold(f32::INFINITY, f32::min);
        let max_z = outline.iter().map(|p| p.z).fold(f32::NEG_INFINITY, f32::max);

        Ok(Self {
            outline,
            style,
            min_x,
            max_x,
            min_z,
            max_z,
            area,
            edge_dirs,
            edge_normals,
            portals: vec![Vec::new(); n],
            mesh: None,
        })
    }

    /// Outline of an axis-aligned rectangle in the winding rooms expect:
    /// east wall, north wall, west wall, south wall.
    pub fn rect_outline(min_x: f32, max_x: f32, min_z: f32, max_z: f32) -> [Vec2; 4] {
        [
            Vec2::new(max_x, max_z),
            Vec2::new(max_x, min_z),
            Vec2::new(min_x, min_z),
            Vec2::new(min_x, max_z),
        ]
    }

    // =========================================================================
    // Derived attributes
    // =========================================================================

    pub fn num_walls(&self) -> usize {
        self.outline.len()
    }

    pub fn outline(&self) -> &[Vec3] {
        &self.outline
    }

    pub fn style(&self) -> &RoomStyle {
        &self.style
    }

    pub fn wall_height(&self) -> f32 {
        self.style.wall_height
    }

    pub fn min_x(&self) -> f32 { self.min_x }
    pub fn max_x(&self) -> f32 { self.max_x }
    pub fn min_z(&self) -> f32 { self.min_z }
    pub fn max_z(&self) -> f32 { self.max_z }

    /// Midpoint of the bounding extents
    pub fn center(&self) -> Vec3 {
        Vec3::ground((self.min_x + self.max_x) * 0.5, (self.min_z + self.max_z) * 0.5)
    }

    /// Floor surface area
    pub fn area(&self) -> f32 {
        self.area
    }

    /// Unit direction of an edge, from its start point to its end point
    ///
    /// # Panics
    ///
    /// Panics if `edge >= self.num_walls()`.
    pub fn edge_dir(&self, edge: usize) -> Vec3 {
        self.edge_dirs[edge]
    }

    /// Inward unit normal of an edge
    ///
    /// # Panics
    ///
    /// Panics if `edge >= self.num_walls()`.
    pub fn edge_normal(&self, edge: usize) -> Vec3 {
        self.edge_normals[edge]
    }

    /// Start and end point of an edge
    ///
    /// # Panics
    ///
    /// Panics if `edge >= self.num_walls()`.
    pub fn edge_points(&self, edge: usize) -> (Vec3, Vec3) {
        let n = self.outline.len();
        (self.outline[edge], self.outline[(edge + 1) % n])
    }

    /// # Panics
    ///
    /// Panics if `edge >= self.num_walls()`.
    pub fn edge_len(&self, edge: usize) -> f32 {
        let (p0, p1) = self.edge_points(edge);
        (p1 - p0).len()
    }

    /// Portals on an edge, sorted by start offset
    ///
    /// # Panics
    ///
    /// Panics if `edge >= self.num_walls()`.
    pub fn portals(&self, edge: usize) -> &[Portal] {
        &self.portals[edge]
    }

    pub fn has_static_data(&self) -> bool {
        self.mesh.is_some()
    }

    pub fn mesh(&self) -> Option<&RoomMesh> {
        self.mesh.as_ref()
    }

    // =========================================================================
    // Portals
    // =========================================================================

    /// Cut an opening into wall `edge`.
    ///
    /// `max_y` defaults to the wall height. Returns the resolved
    /// `(start, end)` offsets along the edge.
    ///
    /// Portals on the same edge must not overlap. This is not checked;
    /// overlapping openings produce inverted wall spans that are skipped.
    pub fn add_portal(
        &mut self,
        edge: usize,
        extent: PortalExtent,
        min_y: f32,
        max_y: Option<f32>,
    ) -> WorldResult<(f32, f32)> {
        if self.mesh.is_some() {
            return Err(WorldError::StructuralFrozen);
        }
        if edge >= self.num_walls() {
            return Err(WorldError::InvalidGeometry(format!(
                "edge {} out of range ({} walls)", edge, self.num_walls()
            )));
        }

        let max_y = max_y.unwrap_or(self.style.wall_height);
        if !(max_y > min_y) {
            return Err(WorldError::InvalidGeometry(format!(
                "portal max_y {} must exceed min_y {}", max_y, min_y
            )));
        }
        if min_y < 0.0 || max_y > self.style.wall_height + PORTAL_EPSILON {
            return Err(WorldError::InvalidGeometry(format!(
                "portal span {}..{} outside wall height {}", min_y, max_y, self.style.wall_height
            )));
        }

        let (p0, _) = self.edge_points(edge);
        let dir = self.edge_dirs[edge];
        let edge_len = self.edge_len(edge);

        let (mut start, mut end) = match extent {
            PortalExtent::Offsets { start, end } => (start, end),
            PortalExtent::X { min, max } => {
                if dir.x.abs() < 1e-6 {
                    return Err(WorldError::InvalidGeometry(format!(
                        "edge {} is parallel to the Z axis, cannot use X bounds", edge
                    )));
                }
                let m0 = (min - p0.x) / dir.x;
                let m1 = (max - p0.x) / dir.x;
                (m0.min(m1), m0.max(m1))
            }
            PortalExtent::Z { min, max } => {
                if dir.z.abs() < 1e-6 {
                    return Err(WorldError::InvalidGeometry(format!(
                        "edge {} is parallel to the X axis, cannot use Z bounds", edge
                    )));
                }
                let m0 = (min - p0.z) / dir.z;
                let m1 = (max - p0.z) / dir.z;
                (m0.min(m1), m0.max(m1))
            }
        };

        if start < 0.0 && start > -PORTAL_EPSILON {
            start = 0.0;
        }
        if end > edge_len && end < edge_len + PORTAL_EPSILON {
            end = edge_len;
        }

        if !(end > start) {
            return Err(WorldError::InvalidGeometry(format!(
                "portal end {} must exceed start {}", end, start
            )));
        }
        if start < 0.0 || end > edge_len {
            return Err(WorldError::InvalidGeometry(format!(
                "portal {}..{} outside of wall extents 0..{}", start, end, edge_len
            )));
        }

        let portals = &mut self.portals[edge];
        portals.push(Portal { start, end, min_y, max_y });
        portals.sort_by(|a, b| a.start.total_cmp(&b.start));

        Ok((start, end))
    }

    // =========================================================================
    // Queries
    // =========================================================================

    /// Test if a point (height ignored) is inside the room.
    ///
    /// Half-plane test against every wall: exact for convex outlines.
    /// Non-convex outlines are only classified correctly where the
    /// half-plane test agrees with the polygon interior.
    pub fn point_inside(&self, p: Vec3) -> bool {
        let p = p.flatten();
        self.outline
            .iter()
            .zip(&self.edge_normals)
            .all(|(&a, &n)| (p - a).dot(n) > 0.0)
    }

    // =========================================================================
    // Static data
    // =========================================================================

    /// Generate render polygons and collision segments. Idempotent: a second
    /// call returns the cached data until [`Room::invalidate`] is called.
    pub fn generate_static_data(&mut self) -> &RoomMesh {
        if self.mesh.is_none() {
            self.mesh = Some(self.build_mesh());
        }
        // Just populated above
        self.mesh.get_or_insert_with(RoomMesh::default)
    }

    /// Drop generated data, unfreezing the portal lists
    pub fn invalidate(&mut self) {
        self.mesh = None;
    }

    fn build_mesh(&self) -> RoomMesh {
        let height = self.style.wall_height;
        let mut mesh = RoomMesh {
            floor: self.outline.clone(),
            floor_texcoords: self.outline.iter().map(|p| p.xz()).collect(),
            ..Default::default()
        };

        if !self.style.no_ceiling {
            // Reversed so the face still points into the room after moving to the top
            let ceiling: Vec<Vec3> = self.outline
                .iter()
                .rev()
                .map(|&p| p + Vec3::UP * height)
                .collect();
            mesh.ceiling_texcoords = ceiling.iter().map(|p| p.xz()).collect();
            mesh.ceiling = Some(ceiling);
        }

        for edge in 0..self.num_walls() {
            let (p0, _) = self.edge_points(edge);
            let side = self.edge_dirs[edge];
            let width = self.edge_len(edge);
            let portals = &self.portals[edge];

            let first_end = portals.first().map_or(width, |p| p.start);
            push_wall_span(&mut mesh, p0, side, 0.0, first_end, 0.0, height);

            for (i, portal) in portals.iter().enumerate() {
                // Below the opening
                push_wall_span(&mut mesh, p0, side, portal.start, portal.end, 0.0, portal.min_y);
                // Above the opening
                push_wall_span(&mut mesh, p0, side, portal.start, portal.end, portal.max_y, height);

                let next_start = portals.get(i + 1).map_or(width, |p| p.start);
                push_wall_span(&mut mesh, p0, side, portal.end, next_start, 0.0, height);
            }
        }

        mesh
    }
}

/// Emit one wall rectangle, plus a collision segment if it touches the floor.
/// Zero-width and zero-height spans are skipped.
fn push_wall_span(
    mesh: &mut RoomMesh,
    edge_p0: Vec3,
    side: Vec3,
    seg_start: f32,
    seg_end: f32,
    min_y: f32,
    max_y: f32,
) {
    if seg_end <= seg_start || max_y <= min_y {
        return;
    }

    let s_p0 = edge_p0 + side * seg_start;
    let s_p1 = edge_p0 + side * seg_end;

    if min_y <= 0.0 {
        mesh.segments.push(WallSegment { a: s_p1, b: s_p0 });
    }

    let normal = (-(s_p1 - s_p0).cross(Vec3::UP)).normalize();

    mesh.walls.push(WallQuad {
        vertices: [
            s_p0 + Vec3::UP * min_y,
            s_p0 + Vec3::UP * max_y,
            s_p1 + Vec3::UP * max_y,
            s_p1 + Vec3::UP * min_y,
        ],
        normal,
        texcoords: [
            Vec2::new(seg_start, min_y),
            Vec2::new(seg_start, max_y),
            Vec2::new(seg_end, max_y),
            Vec2::new(seg_end, min_y),
        ],
    });
}
