use cgmath::prelude::*;
use cgmath::{Vector2, Vector3};
use enum_map::EnumMap;
use lazy_static::lazy_static;

use crate::world::voxel_data::RampDirection;

/// Corner of a voxel shape in local space, `-0.5..=0.5` on every axis.
/// `uv` is the coordinate inside a single atlas tile.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct TemplateVertex {
    pub position: Vector3<f32>,
    pub uv: Vector2<f32>,
}

lazy_static! {
    pub static ref CUBE: Vec<TemplateVertex> = cube();
    pub static ref RAMPS: EnumMap<RampDirection, Vec<TemplateVertex>> = EnumMap::from_fn(|direction: RampDirection| {
        if direction.is_diagonal() {
            corner_ramp(direction)
        } else {
            wedge_ramp(direction)
        }
    });
}

/// Collects triangles of a convex shape and turns each one counterclockwise as seen from outside.
struct ShapeBuilder {
    center: Vector3<f32>,
    vertices: Vec<TemplateVertex>,
}

impl ShapeBuilder {
    fn new(corners: &[Vector3<f32>]) -> Self {
        let center = corners
            .iter()
            .fold(Vector3::zero(), |sum, &corner| sum + corner)
            / corners.len() as f32;

        Self {
            center,
            vertices: Vec::new(),
        }
    }

    fn add_triangle(&mut self, a: Vector3<f32>, b: Vector3<f32>, c: Vector3<f32>) {
        let mut normal = (b - a).cross(c - a);
        let middle = (a + b + c) / 3.0;

        let (b, c) = if normal.dot(middle - self.center) < 0.0 {
            normal = -normal;
            (c, b)
        } else {
            (b, c)
        };

        for position in [a, b, c] {
            self.vertices.push(TemplateVertex {
                position,
                uv: planar_uv(position, normal),
            });
        }
    }

    /// a, b, c, d in order around the quad's edge
    fn add_quad(&mut self, a: Vector3<f32>, b: Vector3<f32>, c: Vector3<f32>, d: Vector3<f32>) {
        self.add_triangle(a, b, c);
        self.add_triangle(c, d, a);
    }

    fn build(self) -> Vec<TemplateVertex> {
        self.vertices
    }
}

/// Projects onto the plane the normal points away from most.
fn planar_uv(position: Vector3<f32>, normal: Vector3<f32>) -> Vector2<f32> {
    let n = normal.map(f32::abs);

    let (u, v) = if n.x >= n.y && n.x >= n.z {
        (position.z, position.y)
    } else if n.y >= n.z {
        (position.x, position.z)
    } else {
        (position.x, position.y)
    };

    Vector2::new(u + 0.5, v + 0.5)
}

fn corner(x: f32, y: f32, z: f32) -> Vector3<f32> {
    Vector3::new(x, y, z)
}

fn cube() -> Vec<TemplateVertex> {
    let c = |x: f32, y: f32, z: f32| corner(x * 0.5, y * 0.5, z * 0.5);
    let mut shape = ShapeBuilder::new(&[c(-1.0, -1.0, -1.0), c(1.0, 1.0, 1.0)]);

    // +X, -X
    shape.add_quad(c(1.0, -1.0, 1.0), c(1.0, -1.0, -1.0), c(1.0, 1.0, -1.0), c(1.0, 1.0, 1.0));
    shape.add_quad(c(-1.0, -1.0, -1.0), c(-1.0, -1.0, 1.0), c(-1.0, 1.0, 1.0), c(-1.0, 1.0, -1.0));
    // +Y, -Y
    shape.add_quad(c(-1.0, 1.0, 1.0), c(1.0, 1.0, 1.0), c(1.0, 1.0, -1.0), c(-1.0, 1.0, -1.0));
    shape.add_quad(c(-1.0, -1.0, -1.0), c(1.0, -1.0, -1.0), c(1.0, -1.0, 1.0), c(-1.0, -1.0, 1.0));
    // +Z, -Z
    shape.add_quad(c(-1.0, -1.0, 1.0), c(1.0, -1.0, 1.0), c(1.0, 1.0, 1.0), c(-1.0, 1.0, 1.0));
    shape.add_quad(c(1.0, -1.0, -1.0), c(-1.0, -1.0, -1.0), c(-1.0, 1.0, -1.0), c(1.0, 1.0, -1.0));

    shape.build()
}

/// Wedge rising away from the ramp direction: bottom, slope, back, two sides.
fn wedge_ramp(direction: RampDirection) -> Vec<TemplateVertex> {
    let (dx, dz) = direction.offset();
    let along = Vector3::new(dx as f32, 0.0, dz as f32);
    let across = Vector3::new(dz.abs() as f32, 0.0, dx.abs() as f32);
    let at = |u: f32, v: f32, y: f32| along * u + across * v + Vector3::unit_y() * y;

    let (low_a, low_b) = (at(0.5, -0.5, -0.5), at(0.5, 0.5, -0.5));
    let (high_a, high_b) = (at(-0.5, -0.5, -0.5), at(-0.5, 0.5, -0.5));
    let (top_a, top_b) = (at(-0.5, -0.5, 0.5), at(-0.5, 0.5, 0.5));

    let mut shape = ShapeBuilder::new(&[low_a, low_b, high_a, high_b, top_a, top_b]);
    shape.add_quad(low_a, low_b, high_b, high_a);
    shape.add_quad(low_a, low_b, top_b, top_a);
    shape.add_quad(high_a, high_b, top_b, top_a);
    shape.add_triangle(low_a, high_a, top_a);
    shape.add_triangle(low_b, high_b, top_b);

    shape.build()
}

/// Pyramid with its apex above the corner opposite of the ramp direction.
fn corner_ramp(direction: RampDirection) -> Vec<TemplateVertex> {
    let (dx, dz) = direction.offset();
    let (dx, dz) = (dx as f32 * 0.5, dz as f32 * 0.5);

    let high = corner(-dx, -0.5, -dz);
    let far = corner(dx, -0.5, dz);
    let side_x = corner(dx, -0.5, -dz);
    let side_z = corner(-dx, -0.5, dz);
    let apex = corner(-dx, 0.5, -dz);

    let mut shape = ShapeBuilder::new(&[high, far, side_x, side_z, apex]);
    shape.add_quad(high, side_x, far, side_z);
    shape.add_triangle(apex, side_x, far);
    shape.add_triangle(apex, far, side_z);
    shape.add_triangle(high, side_x, apex);
    shape.add_triangle(high, side_z, apex);

    shape.build()
}

#[cfg(test)]
mod tests {
    use cgmath::prelude::*;
    use cgmath::Vector3;
    use strum::IntoEnumIterator;

    use crate::world::meshing::templates::{TemplateVertex, CUBE, RAMPS};
    use crate::world::voxel_data::RampDirection;

    fn normals(template: &[TemplateVertex]) -> Vec<(Vector3<f32>, Vector3<f32>)> {
        template
            .chunks_exact(3)
            .map(|t| {
                let normal = (t[1].position - t[0].position).cross(t[2].position - t[0].position);
                let middle = (t[0].position + t[1].position + t[2].position) / 3.0;
                (normal, middle)
            })
            .collect()
    }

    #[test]
    fn test_cube_faces_point_outwards() {
        assert_eq!(CUBE.len(), 36);

        for (normal, middle) in normals(&CUBE) {
            assert!(normal.magnitude() > 0.0);
            assert!(normal.dot(middle) > 0.0, "triangle at {middle:?} faces inwards");
        }
    }

    #[test]
    fn test_ramp_vertex_counts() {
        for direction in RampDirection::iter() {
            let expected = if direction.is_diagonal() { 18 } else { 24 };
            assert_eq!(RAMPS[direction].len(), expected, "{direction}");
        }
    }

    #[test]
    fn test_ramp_slopes_face_up_and_down_the_ramp() {
        for direction in RampDirection::iter() {
            let (dx, dz) = direction.offset();
            let downhill = Vector3::new(dx as f32, 0.0, dz as f32);

            let slopes = normals(&RAMPS[direction])
                .into_iter()
                .filter(|(normal, _)| normal.y > 0.0 && normal.dot(downhill) > 0.0)
                .count();
            assert_eq!(slopes, 2, "{direction}");

            // nothing but the bottom may face down
            let bottom = normals(&RAMPS[direction])
                .into_iter()
                .filter(|(normal, _)| normal.y < 0.0)
                .count();
            assert_eq!(bottom, 2, "{direction}");
        }
    }

    #[test]
    fn test_templates_stay_within_unit_voxel() {
        let all = CUBE
            .iter()
            .chain(RampDirection::iter().flat_map(|direction| RAMPS[direction].iter()));

        for vertex in all {
            assert!((0..3).all(|axis| vertex.position[axis].abs() <= 0.5));
            assert!((0.0..=1.0).contains(&vertex.uv.x) && (0.0..=1.0).contains(&vertex.uv.y));
        }
    }
}
