use std::f64::consts::PI;

use canopy_core::{Coordinate, Viewport};
use glam::{DVec2, Vec2};

/// Side length of a zoom-zero world tile in pixels.
const TILE_SIZE: f64 = 512.0;
/// Latitude bound of the square Web Mercator world.
const MAX_LATITUDE: f64 = 85.051_128_779_806_59;

/// Web Mercator projection anchored at a viewport.
#[derive(Clone, Copy, Debug)]
pub(crate) struct Projection {
    scale: f64,
    center: DVec2,
    half_size: DVec2,
}

impl Projection {
    pub(crate) fn new(viewport: &Viewport) -> Self {
        let scale = TILE_SIZE * viewport.zoom.exp2();
        Self {
            scale,
            center: world_position(viewport.center, scale),
            half_size: viewport.size.as_dvec2() * 0.5,
        }
    }

    /// Absolute pixel position of a coordinate at the projection's zoom.
    pub(crate) fn world(&self, coordinate: Coordinate) -> DVec2 {
        world_position(coordinate, self.scale)
    }

    pub(crate) fn to_screen(&self, coordinate: Coordinate) -> Vec2 {
        (self.world(coordinate) - self.center + self.half_size).as_vec2()
    }

    pub(crate) fn to_coordinate(&self, screen: Vec2) -> Coordinate {
        let world = screen.as_dvec2() - self.half_size + self.center;
        let lon = world.x / self.scale * 360.0 - 180.0;
        let n = PI - 2.0 * PI * world.y / self.scale;
        Coordinate::new(n.sinh().atan().to_degrees(), lon)
    }
}

fn world_position(coordinate: Coordinate, scale: f64) -> DVec2 {
    let lat = coordinate
        .lat()
        .clamp(-MAX_LATITUDE, MAX_LATITUDE)
        .to_radians();
    let x = (coordinate.lon() + 180.0) / 360.0 * scale;
    let y = (1.0 - (lat.tan() + 1.0 / lat.cos()).ln() / PI) / 2.0 * scale;
    DVec2::new(x, y)
}
