use std::mem::size_of;

use bytemuck::{Pod, Zeroable};
use cgmath::{Vector2, Vector3};
use static_assertions::const_assert_eq;

/// Vertex layout handed to renderers, uploadable as-is with [bytemuck::cast_slice].
#[repr(C)]
#[derive(Copy, Clone, Debug, PartialEq, Pod, Zeroable)]
pub struct Vertex {
    pub position: [f32; 3],
    pub tex_coords: [f32; 2],
}

const_assert_eq!(size_of::<Vertex>(), 20);

impl Vertex {
    pub fn new(position: Vector3<f32>, tex_coords: Vector2<f32>) -> Self {
        Self {
            position: position.into(),
            tex_coords: tex_coords.into(),
        }
    }

    pub fn position(&self) -> Vector3<f32> {
        self.position.into()
    }

    pub fn tex_coords(&self) -> Vector2<f32> {
        self.tex_coords.into()
    }
}

#[cfg(test)]
mod tests {
    use cgmath::{Vector2, Vector3};

    use crate::world::mesh::Vertex;

    #[test]
    fn test_vertex_bytes() {
        let vertices = [Vertex::new(Vector3::new(1.0, 2.0, 3.0), Vector2::new(0.25, 1.0))];
        let bytes: &[u8] = bytemuck::cast_slice(&vertices);

        assert_eq!(bytes.len(), 20);
        assert_eq!(&bytes[0..4], &1.0f32.to_ne_bytes());
        assert_eq!(&bytes[12..16], &0.25f32.to_ne_bytes());
    }
}
