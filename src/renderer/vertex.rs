use bytemuck::{Pod, Zeroable};
use std::mem;

/// Fixed attribute slots. Every program binds these names to these
/// locations before linking, so vertex arrays can be shared across programs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u32)]
pub enum AttributeLocation {
    Position = 0,
    Normal,
    Texcoord0,
    Texcoord1,
    Color,
    Tangent,
    BonesId,
    BonesWeight,
    ModelMatrixRow0,
    ModelMatrixRow1,
    ModelMatrixRow2,
    NormalMatrixCol0,
    NormalMatrixCol1,
    NormalMatrixCol2,
}

impl AttributeLocation {
    pub const ALL: [AttributeLocation; 14] = [
        AttributeLocation::Position,
        AttributeLocation::Normal,
        AttributeLocation::Texcoord0,
        AttributeLocation::Texcoord1,
        AttributeLocation::Color,
        AttributeLocation::Tangent,
        AttributeLocation::BonesId,
        AttributeLocation::BonesWeight,
        AttributeLocation::ModelMatrixRow0,
        AttributeLocation::ModelMatrixRow1,
        AttributeLocation::ModelMatrixRow2,
        AttributeLocation::NormalMatrixCol0,
        AttributeLocation::NormalMatrixCol1,
        AttributeLocation::NormalMatrixCol2,
    ];

    pub const fn index(self) -> u32 {
        self as u32
    }

    pub const fn name(self) -> &'static str {
        match self {
            AttributeLocation::Position => "a_position",
            AttributeLocation::Normal => "a_normal",
            AttributeLocation::Texcoord0 => "a_texcoord0",
            AttributeLocation::Texcoord1 => "a_texcoord1",
            AttributeLocation::Color => "a_color",
            AttributeLocation::Tangent => "a_tangent",
            AttributeLocation::BonesId => "a_boneIDs",
            AttributeLocation::BonesWeight => "a_weights",
            AttributeLocation::ModelMatrixRow0 => "a_mMatrixRow0",
            AttributeLocation::ModelMatrixRow1 => "a_mMatrixRow1",
            AttributeLocation::ModelMatrixRow2 => "a_mMatrixRow2",
            AttributeLocation::NormalMatrixCol0 => "a_normalMatrixCol0",
            AttributeLocation::NormalMatrixCol1 => "a_normalMatrixCol1",
            AttributeLocation::NormalMatrixCol2 => "a_normalMatrixCol2",
        }
    }

    pub fn bindings() -> Vec<(u32, &'static str)> {
        Self::ALL
            .iter()
            .map(|location| (location.index(), location.name()))
            .collect()
    }
}

/// One float attribute inside an interleaved buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VertexAttribute {
    pub location: AttributeLocation,
    pub components: u32,
    pub offset: usize,
}

const fn attr(location: AttributeLocation, components: u32, offset: usize) -> VertexAttribute {
    VertexAttribute {
        location,
        components,
        offset,
    }
}

#[repr(C)]
#[derive(Clone, Copy, Pod, Zeroable, Debug, PartialEq)]
pub struct Vertex {
    pub position: [f32; 3],
    pub normal: [f32; 3],
    pub uv0: [f32; 2],
    pub uv1: [f32; 2],
    pub color: [f32; 4],
    pub tangent: [f32; 3],
    pub bones_id: [f32; 4],
    pub bones_weight: [f32; 4],
}

impl Vertex {
    pub const STRIDE: usize = mem::size_of::<Vertex>();

    pub const ATTRIBUTES: [VertexAttribute; 8] = [
        attr(AttributeLocation::Position, 3, mem::offset_of!(Vertex, position)),
        attr(AttributeLocation::Normal, 3, mem::offset_of!(Vertex, normal)),
        attr(AttributeLocation::Texcoord0, 2, mem::offset_of!(Vertex, uv0)),
        attr(AttributeLocation::Texcoord1, 2, mem::offset_of!(Vertex, uv1)),
        attr(AttributeLocation::Color, 4, mem::offset_of!(Vertex, color)),
        attr(AttributeLocation::Tangent, 3, mem::offset_of!(Vertex, tangent)),
        attr(AttributeLocation::BonesId, 4, mem::offset_of!(Vertex, bones_id)),
        attr(AttributeLocation::BonesWeight, 4, mem::offset_of!(Vertex, bones_weight)),
    ];
}

impl Default for Vertex {
    fn default() -> Self {
        Self {
            color: [1.0; 4],
            ..Vertex::zeroed()
        }
    }
}

#[inline]
pub fn v(position: [f32; 3], normal: [f32; 3], uv0: [f32; 2]) -> Vertex {
    Vertex {
        position,
        normal,
        uv0,
        ..Vertex::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn attributes_fit_inside_stride() {
        for attribute in Vertex::ATTRIBUTES {
            let end = attribute.offset + attribute.components as usize * 4;
            assert!(end <= Vertex::STRIDE, "{:?} overflows", attribute.location);
        }
        assert_eq!(Vertex::STRIDE, 25 * 4);
    }

    #[test]
    fn bindings_cover_every_location_once() {
        let bindings = AttributeLocation::bindings();
        let mut indices: Vec<u32> = bindings.iter().map(|(index, _)| *index).collect();
        indices.dedup();
        assert_eq!(indices, (0..14).collect::<Vec<_>>());
    }
}
