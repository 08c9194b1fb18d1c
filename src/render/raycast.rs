//! Software ray caster
//!
//! One ray per pixel against floor and ceiling polygons, wall rectangles
//! and entity boxes. Surfaces use flat colours per texture name with a
//! faint checker so distance and motion stay readable at low resolution.

use image::{Rgb, RgbImage};
use crate::game::{EntityId, EpisodeParams};
use crate::math::{facing_vector, point_in_polygon_xz, point_to_segment_distance, ray_plane_intersection, Ray, Vec3};
use crate::world::{Level, WallSegment, TEX_DENSITY};
use super::{CameraPose, Renderer, Scene, SceneEntity, TopDownPose};

/// Checker tile side in texels
const CHECKER_TEXELS: f32 = 256.0;
/// Brightness of the darker checker tiles
const CHECKER_CONTRAST: f32 = 0.85;
/// Hits closer than this are clipped, like a near plane
const NEAR_CLIP: f32 = 0.01;
/// Wall outlines on the map are this many pixels wide
const MAP_WALL_PIXELS: f32 = 1.5;

/// Flat colour standing in for a texture
pub fn texture_color(name: &str) -> [f32; 3] {
    match name {
        "asphalt" => [0.33, 0.33, 0.35],
        "brick_wall" => [0.6, 0.3, 0.22],
        "concrete" => [0.62, 0.62, 0.6],
        "concrete_tiles" => [0.72, 0.72, 0.7],
        "floor_tiles_bw" => [0.8, 0.8, 0.8],
        "wood" | "wood_planks" => [0.55, 0.38, 0.2],
        "grass" => [0.3, 0.55, 0.2],
        "carpet" => [0.45, 0.2, 0.25],
        "marble" => [0.88, 0.86, 0.84],
        _ => [0.5, 0.5, 0.5],
    }
}

// =============================================================================
// Static geometry
// =============================================================================

/// Horizontal polygon (a floor or a ceiling)
#[derive(Debug, Clone)]
struct FlatPolygon {
    points: Vec<Vec3>,
    y: f32,
    normal: Vec3,
    color: [f32; 3],
}

/// Vertical wall rectangle
#[derive(Debug, Clone)]
struct WallRect {
    /// Bottom corner at the start of the span
    origin: Vec3,
    /// Unit vector along the wall
    side: Vec3,
    width: f32,
    min_y: f32,
    max_y: f32,
    normal: Vec3,
    /// Distance along the full wall edge where this span starts
    u0: f32,
    color: [f32; 3],
}

#[derive(Debug, Clone, Default)]
struct StaticGeometry {
    generation: u64,
    floors: Vec<FlatPolygon>,
    ceilings: Vec<FlatPolygon>,
    walls: Vec<WallRect>,
    segments: Vec<WallSegment>,
}

impl StaticGeometry {
    fn build(level: &Level) -> Self {
        let mut geom = StaticGeometry { generation: level.generation(), ..Default::default() };

        for room in level.rooms() {
            let Some(mesh) = room.mesh() else {
                log::warn!("room without static data skipped by renderer");
                continue;
            };
            let style = room.style();

            geom.floors.push(FlatPolygon {
                points: mesh.floor.clone(),
                y: 0.0,
                normal: Vec3::UP,
                color: texture_color(&style.floor_tex.name),
            });
            if let Some(ceiling) = &mesh.ceiling {
                geom.ceilings.push(FlatPolygon {
                    points: ceiling.clone(),
                    y: room.wall_height(),
                    normal: -Vec3::UP,
                    color: texture_color(&style.ceil_tex.name),
                });
            }

            let wall_color = texture_color(&style.wall_tex.name);
            for quad in &mesh.walls {
                let [bottom_start, top_start, _, bottom_end] = quad.vertices;
                let along = bottom_end - bottom_start;
                geom.walls.push(WallRect {
                    origin: bottom_start,
                    side: along.normalize(),
                    width: along.len(),
                    min_y: bottom_start.y,
                    max_y: top_start.y,
                    normal: quad.normal,
                    u0: quad.texcoords[0].x,
                    color: wall_color,
                });
            }
            geom.segments.extend_from_slice(&mesh.segments);
        }

        geom
    }
}

// =============================================================================
// Tracing
// =============================================================================

#[derive(Debug, Clone, Copy)]
struct Hit {
    t: f32,
    point: Vec3,
    normal: Vec3,
    color: [f32; 3],
    entity: Option<EntityId>,
}

/// Slab test against an entity's box, oriented along its facing.
/// Returns the entry distance and the normal of the face hit.
fn ray_vs_entity(ray: &Ray, e: &SceneEntity) -> Option<(f32, Vec3)> {
    let forward = facing_vector(e.body.dir);
    let axes = [forward, Vec3::UP, forward.cross(Vec3::UP)];
    let half = [e.half_width, e.body.height * 0.5, e.half_width];
    let d = ray.origin - e.body.center();

    let mut t_min = f32::NEG_INFINITY;
    let mut t_max = f32::INFINITY;
    let mut normal = Vec3::ZERO;

    for (axis, h) in axes.into_iter().zip(half) {
        let o = d.dot(axis);
        let v = ray.direction.dot(axis);
        if v.abs() < 1e-8 {
            if o.abs() > h {
                return None;
            }
            continue;
        }

        let mut t0 = (-h - o) / v;
        let mut t1 = (h - o) / v;
        let mut n = -axis;
        if t0 > t1 {
            std::mem::swap(&mut t0, &mut t1);
            n = axis;
        }
        if t0 > t_min {
            t_min = t0;
            normal = n;
        }
        t_max = t_max.min(t1);
        if t_min > t_max {
            return None;
        }
    }

    // Origin inside the box
    if t_min < 0.0 {
        return None;
    }
    Some((t_min, normal))
}

fn closer(best: &mut Option<Hit>, hit: Hit) {
    if hit.t >= NEAR_CLIP && best.map_or(true, |b| hit.t < b.t) {
        *best = Some(hit);
    }
}

fn trace(geom: &StaticGeometry, entities: &[SceneEntity], ray: &Ray) -> Option<Hit> {
    let mut best: Option<Hit> = None;

    for poly in geom.floors.iter().chain(&geom.ceilings) {
        let plane_point = Vec3::new(0.0, poly.y, 0.0);
        if let Some(t) = ray_plane_intersection(ray, plane_point, poly.normal) {
            let point = ray.at(t);
            if point_in_polygon_xz(point, &poly.points) {
                let color = checker(poly.color, point.x, point.z);
                closer(&mut best, Hit { t, point, normal: poly.normal, color, entity: None });
            }
        }
    }

    for wall in &geom.walls {
        let Some(t) = ray_plane_intersection(ray, wall.origin, wall.normal) else {
            continue;
        };
        let point = ray.at(t);
        let s = (point - wall.origin).dot(wall.side);
        if s < 0.0 || s > wall.width || point.y < wall.min_y || point.y > wall.max_y {
            continue;
        }
        let color = checker(wall.color, wall.u0 + s, point.y);
        closer(&mut best, Hit { t, point, normal: wall.normal, color, entity: None });
    }

    for e in entities.iter().filter(|e| !e.is_agent) {
        if let Some((t, normal)) = ray_vs_entity(ray, e) {
            closer(&mut best, Hit { t, point: ray.at(t), normal, color: e.color, entity: Some(e.id) });
        }
    }

    // Faces are visible from both sides
    best.map(|mut hit| {
        if hit.normal.dot(ray.direction) > 0.0 {
            hit.normal = -hit.normal;
        }
        hit
    })
}

fn checker(color: [f32; 3], u: f32, v: f32) -> [f32; 3] {
    let tile = CHECKER_TEXELS / TEX_DENSITY;
    let parity = ((u / tile).floor() + (v / tile).floor()) as i64 & 1;
    if parity == 1 {
        color.map(|c| c * CHECKER_CONTRAST)
    } else {
        color
    }
}

/// Ambient plus Lambert term from the point light
fn shade(color: [f32; 3], normal: Vec3, point: Vec3, params: &EpisodeParams) -> [f32; 3] {
    let to_light = params.light_pos - point;
    let n_dot_l = if to_light.len() < 0.001 {
        0.0
    } else {
        normal.dot(to_light.normalize()).max(0.0)
    };
    [0, 1, 2].map(|i| color[i] * (params.light_ambient[i] + params.light_color[i] * n_dot_l))
}

fn to_pixel(color: [f32; 3]) -> Rgb<u8> {
    Rgb(color.map(|c| (c.clamp(0.0, 1.0) * 255.0).round() as u8))
}

/// True if floor point `p` lies on the square footprint of `e`
fn on_footprint(p: Vec3, e: &SceneEntity) -> bool {
    let forward = facing_vector(e.body.dir);
    let d = (p - e.body.pos).flatten();
    d.dot(forward).abs() <= e.half_width && d.dot(forward.cross(Vec3::UP)).abs() <= e.half_width
}

// =============================================================================
// Renderer
// =============================================================================

/// CPU renderer; static geometry is rebuilt only when the level's
/// generation changes
#[derive(Debug, Default)]
pub struct RayCastRenderer {
    cache: Option<StaticGeometry>,
}

impl RayCastRenderer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Generation of the geometry currently cached, if any
    pub fn cached_generation(&self) -> Option<u64> {
        self.cache.as_ref().map(|g| g.generation)
    }

    fn geometry(&mut self, level: &Level) -> &StaticGeometry {
        // Generation 0 means no static data yet; never cache that
        let stale = level.generation() == 0
            || self.cache.as_ref().map_or(true, |g| g.generation != level.generation());
        if stale {
            log::debug!("rebuilding render geometry for generation {}", level.generation());
            self.cache = None;
        }
        self.cache.get_or_insert_with(|| StaticGeometry::build(level))
    }
}

impl Renderer for RayCastRenderer {
    fn render_view(&mut self, scene: &Scene, camera: &CameraPose, width: u32, height: u32) -> RgbImage {
        let params = scene.params;
        let geom = self.geometry(scene.level);
        let sky = to_pixel(params.sky_color);

        RgbImage::from_fn(width, height, |px, py| {
            let ray = camera.pixel_ray(px, py, width, height);
            match trace(geom, &scene.entities, &ray) {
                Some(hit) => to_pixel(shade(hit.color, hit.normal, hit.point, &params)),
                None => sky,
            }
        })
    }

    fn render_top_view(&mut self, scene: &Scene, width: u32, height: u32) -> RgbImage {
        let params = scene.params;
        let pose = TopDownPose::framing(scene.level.extents(), width, height);
        let geom = self.geometry(scene.level);
        let sky = to_pixel(params.sky_color);
        let wall_dist = MAP_WALL_PIXELS * 0.5 * (pose.max_x - pose.min_x) / width.max(1) as f32;

        RgbImage::from_fn(width, height, |px, py| {
            let p = pose.pixel_to_floor(px, py, width, height);

            if let Some(agent) = scene.entities.iter().find(|e| e.is_agent && p.distance_xz(e.body.pos) <= e.body.radius) {
                // Darker nose towards the facing direction
                let forward = agent.body.dir_vec();
                let d = (p - agent.body.pos).flatten();
                let nose = d.dot(forward) > agent.body.radius * 0.4
                    && d.dot(forward.cross(Vec3::UP)).abs() < agent.body.radius * 0.25;
                let color = if nose { agent.color.map(|c| c * 0.5) } else { agent.color };
                return to_pixel(color);
            }

            // Highest block top over this point
            let top = scene.entities
                .iter()
                .filter(|e| !e.is_agent && on_footprint(p, e))
                .max_by(|a, b| {
                    let (ta, tb) = (a.body.pos.y + a.body.height, b.body.pos.y + b.body.height);
                    ta.total_cmp(&tb)
                });
            if let Some(e) = top {
                let point = Vec3::new(p.x, e.body.pos.y + e.body.height, p.z);
                return to_pixel(shade(e.color, Vec3::UP, point, &params));
            }

            if geom.segments.iter().any(|s| point_to_segment_distance(p, s.a, s.b) <= wall_dist) {
                return to_pixel(geom.walls.first().map_or([0.0; 3], |w| w.color.map(|c| c * 0.6)));
            }

            match geom.floors.iter().find(|f| point_in_polygon_xz(p, &f.points)) {
                Some(floor) => to_pixel(shade(checker(floor.color, p.x, p.z), Vec3::UP, p, &params)),
                None => sky,
            }
        })
    }

    fn visible_entities(&mut self, scene: &Scene, camera: &CameraPose, width: u32, height: u32) -> Vec<EntityId> {
        let geom = self.geometry(scene.level);

        scene.entities
            .iter()
            .filter(|e| !e.is_agent)
            .filter(|e| {
                let center = e.body.center();
                if !camera.sees(center, width, height) {
                    return false;
                }
                let ray = Ray::new(camera.position, center - camera.position);
                trace(geom, &scene.entities, &ray).and_then(|hit| hit.entity) == Some(e.id)
            })
            .map(|e| e.id)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::{BlockColor, Entity, Placement, World, WorldSettings};
    use crate::world::RoomStyle;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn room_world(no_ceiling: bool) -> World {
        let mut level = Level::new();
        let style = RoomStyle { no_ceiling, ..RoomStyle::with_textures("asphalt", "brick_wall", "concrete_tiles") };
        level.add_rect_room(0.0, 6.0, 0.0, 6.0, style).unwrap();
        level.generate_static_data();
        World::new(level, WorldSettings::default())
    }

    fn add_block(world: &mut World, color: BlockColor, x: f32, z: f32) -> EntityId {
        let mut rng = StdRng::seed_from_u64(0);
        world
            .place_entity(Entity::block(color, 0.6), &Placement::at(Vec3::ground(x, z), 0.0), &mut rng)
            .unwrap()
    }

    fn eye(x: f32, z: f32, dir: f32) -> CameraPose {
        let position = Vec3::new(x, 1.5, z);
        CameraPose { position, target: position + facing_vector(dir), up: Vec3::UP, fov_y: 60.0 }
    }

    #[test]
    fn test_trace_walls_and_blocks() {
        let mut world = room_world(false);
        let scene = Scene::from_world(&world);
        let geom = StaticGeometry::build(scene.level);

        let ray = Ray::new(Vec3::new(1.0, 0.3, 3.0), Vec3::new(1.0, 0.0, 0.0));
        let hit = trace(&geom, &scene.entities, &ray).unwrap();
        assert!((hit.t - 5.0).abs() < 1e-4);
        assert!((hit.normal - Vec3::new(-1.0, 0.0, 0.0)).len() < 1e-5);
        assert!(hit.entity.is_none());

        let id = add_block(&mut world, BlockColor::Red, 4.0, 3.0);
        let scene = Scene::from_world(&world);
        let hit = trace(&geom, &scene.entities, &ray).unwrap();
        assert!((hit.t - 2.7).abs() < 1e-4);
        assert_eq!(hit.entity, Some(id));
        assert_eq!(hit.color, [1.0, 0.0, 0.0]);
    }

    #[test]
    fn test_ceiling_and_sky() {
        let up = Ray::new(Vec3::new(3.0, 1.0, 3.0), Vec3::UP);

        let closed = room_world(false);
        let scene = Scene::from_world(&closed);
        let hit = trace(&StaticGeometry::build(scene.level), &scene.entities, &up).unwrap();
        assert!((hit.t - 7.0).abs() < 1e-4);
        assert!(hit.normal.y < 0.0);

        let open = room_world(true);
        let scene = Scene::from_world(&open);
        assert!(trace(&StaticGeometry::build(scene.level), &scene.entities, &up).is_none());
    }

    #[test]
    fn test_render_view_sizes_and_sky() {
        let world = room_world(true);
        let scene = Scene::from_world(&world);
        let mut renderer = RayCastRenderer::new();

        // Looking straight up an open room shows only sky
        let position = Vec3::new(3.0, 1.0, 3.0);
        let cam = CameraPose { position, target: position + Vec3::UP, up: Vec3::new(1.0, 0.0, 0.0), fov_y: 20.0 };
        let img = renderer.render_view(&scene, &cam, 8, 6);
        assert_eq!(img.dimensions(), (8, 6));
        let sky = to_pixel(scene.params.sky_color);
        assert!(img.pixels().all(|p| *p == sky));

        // Level view: walls and floor, no sky
        let img = renderer.render_view(&scene, &eye(1.0, 3.0, 0.0), 8, 6);
        assert_ne!(*img.get_pixel(4, 3), sky);
        assert_ne!(*img.get_pixel(4, 5), *img.get_pixel(4, 1));
    }

    #[test]
    fn test_eye_on_the_floor() {
        let world = room_world(false);
        let scene = Scene::from_world(&world);
        let geom = StaticGeometry::build(scene.level);

        // The floor under the eye is clipped; the far wall is still hit
        let ray = Ray::new(Vec3::new(1.0, 0.0, 3.0), Vec3::new(1.0, 0.1, 0.0));
        let hit = trace(&geom, &scene.entities, &ray).unwrap();
        assert!((hit.point.x - 6.0).abs() < 1e-4);
    }

    #[test]
    fn test_cache_follows_generation() {
        let mut world = room_world(false);
        let mut renderer = RayCastRenderer::new();
        assert_eq!(renderer.cached_generation(), None);

        let generation = world.level().generation();
        renderer.render_view(&Scene::from_world(&world), &eye(1.0, 3.0, 0.0), 4, 3);
        assert_eq!(renderer.cached_generation(), Some(generation));

        world.level_mut().invalidate_static_data();
        world.level_mut().generate_static_data();
        renderer.render_view(&Scene::from_world(&world), &eye(1.0, 3.0, 0.0), 4, 3);
        assert_eq!(renderer.cached_generation(), Some(world.level().generation()));
        assert_ne!(renderer.cached_generation(), Some(generation));
    }

    #[test]
    fn test_visible_entities_respects_occlusion() {
        let mut world = room_world(false);
        let front = add_block(&mut world, BlockColor::Red, 3.0, 3.0);
        let hidden = add_block(&mut world, BlockColor::Blue, 5.0, 3.0);
        let behind = add_block(&mut world, BlockColor::Green, 0.5, 3.0);
        let scene = Scene::from_world(&world);
        let mut renderer = RayCastRenderer::new();

        // Camera at block height so the front block covers the other one
        let position = Vec3::new(1.0, 0.3, 3.0);
        let cam = CameraPose { position, target: position + Vec3::new(1.0, 0.0, 0.0), up: Vec3::UP, fov_y: 60.0 };
        let visible = renderer.visible_entities(&scene, &cam, 80, 60);
        assert_eq!(visible, vec![front]);
        assert!(!visible.contains(&hidden) && !visible.contains(&behind));
    }

    #[test]
    fn test_top_view() {
        let mut world = room_world(false);
        add_block(&mut world, BlockColor::Red, 4.0, 1.0);
        let scene = Scene::from_world(&world);
        let img = RayCastRenderer::new().render_top_view(&scene, 60, 60);

        // Outside the floor plan
        assert_eq!(*img.get_pixel(0, 0), Rgb([64, 209, 255]));
        // Pixel (37, 14) lies over the block at (4.0, 0.93)
        let Rgb([r, g, b]) = *img.get_pixel(37, 14);
        assert!(r > 150 && g < 30 && b < 30);
    }
}
