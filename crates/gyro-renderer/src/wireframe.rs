use bytemuck::{Pod, Zeroable};
use thiserror::Error;

/// Vertex format for wireframe line lists.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct WireVertex {
    pub position: [f32; 3],
}

impl WireVertex {
    pub fn layout() -> wgpu::VertexBufferLayout<'static> {
        wgpu::VertexBufferLayout {
            array_stride: std::mem::size_of::<Self>() as wgpu::BufferAddress,
            step_mode: wgpu::VertexStepMode::Vertex,
            attributes: &[wgpu::VertexAttribute {
                offset: 0,
                shader_location: 0,
                format: wgpu::VertexFormat::Float32x3,
            }],
        }
    }
}

/// A line-list mesh: every pair of indices is one edge.
pub struct WireMesh {
    pub vertices: Vec<WireVertex>,
    pub indices: Vec<u16>,
}

impl WireMesh {
    pub fn edge_count(&self) -> usize {
        self.indices.len() / 2
    }
}

/// Axis-aligned cube centred on the origin, 8 corners and 12 edges.
pub fn cube(half_extent: f32) -> WireMesh {
    let h = half_extent;

    // Corner i has x = bit 0, y = bit 1, z = bit 2 (0 → -h, 1 → +h).
    let vertices = (0..8u16)
        .map(|i| {
            let pick = |bit: u16| if i & bit != 0 { h } else { -h };
            WireVertex {
                position: [pick(1), pick(2), pick(4)],
            }
        })
        .collect();

    // Edges join corners that differ in exactly one bit.
    let mut indices = Vec::with_capacity(24);
    for a in 0..8u16 {
        for bit in [1u16, 2, 4] {
            let b = a | bit;
            if b != a {
                indices.push(a);
                indices.push(b);
            }
        }
    }

    WireMesh { vertices, indices }
}

#[derive(Debug, Error, PartialEq, Eq)]
#[error("Invalid colour {0:?}, expected #rrggbb")]
pub struct ColorError(pub String);

/// Parse `#rrggbb` into linear RGBA for an sRGB surface.
pub fn parse_color(hex: &str) -> Result<[f32; 4], ColorError> {
    let digits = hex
        .trim()
        .strip_prefix('#')
        .filter(|d| d.len() == 6 && d.is_ascii())
        .ok_or_else(|| ColorError(hex.to_string()))?;

    let channel = |range: std::ops::Range<usize>| -> Result<f32, ColorError> {
        let byte = u8::from_str_radix(&digits[range], 16).map_err(|_| ColorError(hex.to_string()))?;
        Ok(srgb_to_linear(byte as f32 / 255.0))
    };

    Ok([channel(0..2)?, channel(2..4)?, channel(4..6)?, 1.0])
}

fn srgb_to_linear(c: f32) -> f32 {
    if c <= 0.04045 {
        c / 12.92
    } else {
        ((c + 0.055) / 1.055).powf(2.4)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cube_has_eight_corners_and_twelve_edges() {
        let mesh = cube(1.5);
        assert_eq!(mesh.vertices.len(), 8);
        assert_eq!(mesh.indices.len(), 24);
        assert_eq!(mesh.edge_count(), 12);
    }

    #[test]
    fn cube_edges_have_full_edge_length() {
        let mesh = cube(1.5);
        for edge in mesh.indices.chunks(2) {
            let a = mesh.vertices[edge[0] as usize].position;
            let b = mesh.vertices[edge[1] as usize].position;
            let len = ((a[0] - b[0]).powi(2) + (a[1] - b[1]).powi(2) + (a[2] - b[2]).powi(2)).sqrt();
            assert!((len - 3.0).abs() < 1e-6);
        }
    }

    #[test]
    fn cube_corners_are_distinct() {
        let mesh = cube(1.0);
        for (i, a) in mesh.vertices.iter().enumerate() {
            for b in &mesh.vertices[i + 1..] {
                assert_ne!(a, b);
            }
            assert!(a.position.iter().all(|c| c.abs() == 1.0));
        }
    }

    #[test]
    fn parse_known_colors() {
        assert_eq!(parse_color("#000000").unwrap(), [0.0, 0.0, 0.0, 1.0]);
        let white = parse_color("#ffffff").unwrap();
        assert!(white.iter().all(|c| (c - 1.0).abs() < 1e-5));

        let cyan = parse_color("#22d3ee").unwrap();
        assert!(cyan[2] > cyan[1] && cyan[1] > cyan[0]);
    }

    #[test]
    fn parse_rejects_bad_colors() {
        assert!(parse_color("22d3ee").is_err());
        assert!(parse_color("#22d3e").is_err());
        assert!(parse_color("#gggggg").is_err());
        assert!(parse_color("#ééé").is_err());
    }
}
