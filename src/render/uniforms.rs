// CPU mirrors of the WGSL uniform/storage blocks. Field order and padding
// must match the shader structs exactly.

use bytemuck::{Pod, Zeroable};
use glam::{Mat4, Vec3, Vec4};

use crate::render::cascade::{ShadowCascades, MAX_CASCADES};
use crate::render::light::ForwardLightList;
use crate::render::scene::{SceneEnvironment, SceneView};

#[repr(C)]
#[derive(Clone, Copy, Pod, Zeroable)]
pub struct FrameUniform {
    pub view_proj: [[f32; 4]; 4],
    pub inv_view_proj: [[f32; 4]; 4],
    pub camera_pos: [f32; 4],
}

impl FrameUniform {
    pub fn from_view(view: &SceneView, time: f32) -> Self {
        Self {
            view_proj: view.view_proj.to_cols_array_2d(),
            inv_view_proj: view.inv_view_proj.to_cols_array_2d(),
            camera_pos: [view.position.x, view.position.y, view.position.z, time],
        }
    }
}

impl Default for FrameUniform {
    fn default() -> Self {
        Self {
            view_proj: Mat4::IDENTITY.to_cols_array_2d(),
            inv_view_proj: Mat4::IDENTITY.to_cols_array_2d(),
            camera_pos: [0.0; 4],
        }
    }
}

/// Per-primitive record in the objects storage buffer. The slot index equals
/// the primitive's arena index, so draws address objects with the
/// `first_instance` trick and `@builtin(instance_index)`.
#[repr(C)]
#[derive(Clone, Copy, Pod, Zeroable)]
pub struct ObjectData {
    pub model: [[f32; 4]; 4],
    pub normal: [[f32; 4]; 4],
    pub material_index: u32,
    pub light_count: u32,
    pub _pad: [u32; 2],
    pub light_indices: [u32; 4],
    /// Free-form per-primitive parameters; debug shapes store their color
    /// here.
    pub custom: [f32; 4],
}

impl ObjectData {
    pub fn new(model: Mat4, normal: Mat4, material_index: u32) -> Self {
        Self {
            model: model.to_cols_array_2d(),
            normal: normal.to_cols_array_2d(),
            material_index,
            light_count: 0,
            _pad: [0; 2],
            light_indices: [0; 4],
            custom: [0.0; 4],
        }
    }

    pub fn with_lights(mut self, lights: &ForwardLightList) -> Self {
        for (slot, &index) in self.light_indices.iter_mut().zip(lights.indices()) {
            *slot = index;
        }
        self.light_count = lights.len() as u32;
        self
    }

    pub fn with_custom(mut self, custom: Vec4) -> Self {
        self.custom = custom.to_array();
        self
    }
}

#[repr(C)]
#[derive(Clone, Copy, Pod, Zeroable)]
pub struct ShadowViewUniform {
    pub view_proj: [[f32; 4]; 4],
}

#[repr(C)]
#[derive(Clone, Copy, Pod, Zeroable)]
pub struct LightingUniform {
    pub inv_view_proj: [[f32; 4]; 4],
    pub camera_pos: [f32; 4],
    pub sun_direction: [f32; 4],
    pub sun_color: [f32; 4],
    /// cascade count, ambient, ibl intensity, ao strength.
    pub params: [f32; 4],
    pub cascade_ranges: [[f32; 4]; 2],
    pub cascades: [[[f32; 4]; 4]; MAX_CASCADES],
}

impl LightingUniform {
    pub fn build(
        view: &SceneView,
        environment: &SceneEnvironment,
        cascades: &ShadowCascades,
        ambient: f32,
        ibl_intensity: f32,
        ao_strength: f32,
    ) -> Self {
        let mut uniform = Self::zeroed();
        uniform.inv_view_proj = view.inv_view_proj.to_cols_array_2d();
        uniform.camera_pos = [view.position.x, view.position.y, view.position.z, 0.0];
        uniform.sun_direction = [
            environment.sun_direction.x,
            environment.sun_direction.y,
            environment.sun_direction.z,
            if environment.sun_enabled { 1.0 } else { 0.0 },
        ];
        uniform.sun_color = [
            environment.sun_color.x,
            environment.sun_color.y,
            environment.sun_color.z,
            environment.sun_power,
        ];
        uniform.params = [
            cascades.count() as f32,
            ambient,
            ibl_intensity,
            ao_strength,
        ];
        for (index, range) in cascades.ranges().iter().enumerate().take(8) {
            uniform.cascade_ranges[index / 4][index % 4] = *range;
        }
        for (index, cascade) in cascades.cascades().iter().enumerate() {
            uniform.cascades[index] = cascade.view_proj.to_cols_array_2d();
        }
        uniform
    }
}

#[repr(C)]
#[derive(Clone, Copy, Pod, Zeroable)]
pub struct ForwardUniform {
    pub sun_direction: [f32; 4],
    pub sun_color: [f32; 4],
    /// ambient, unused, unused, unused.
    pub params: [f32; 4],
}

impl ForwardUniform {
    pub fn build(environment: &SceneEnvironment, ambient: f32) -> Self {
        Self {
            sun_direction: [
                environment.sun_direction.x,
                environment.sun_direction.y,
                environment.sun_direction.z,
                if environment.sun_enabled { 1.0 } else { 0.0 },
            ],
            sun_color: [
                environment.sun_color.x,
                environment.sun_color.y,
                environment.sun_color.z,
                environment.sun_power,
            ],
            params: [ambient, 0.0, 0.0, 0.0],
        }
    }
}

#[repr(C)]
#[derive(Clone, Copy, Pod, Zeroable)]
pub struct SkyUniform {
    pub inv_view_proj: [[f32; 4]; 4],
    pub camera_pos: [f32; 4],
    pub sun_direction: [f32; 4],
    pub sun_color: [f32; 4],
}

impl SkyUniform {
    pub fn build(view: &SceneView, environment: &SceneEnvironment) -> Self {
        Self {
            inv_view_proj: view.inv_view_proj.to_cols_array_2d(),
            camera_pos: [view.position.x, view.position.y, view.position.z, 0.0],
            sun_direction: [
                environment.sun_direction.x,
                environment.sun_direction.y,
                environment.sun_direction.z,
                if environment.sun_enabled { 1.0 } else { 0.0 },
            ],
            sun_color: [
                environment.sun_color.x,
                environment.sun_color.y,
                environment.sun_color.z,
                environment.sun_power,
            ],
        }
    }
}

#[repr(C)]
#[derive(Clone, Copy, Pod, Zeroable)]
pub struct SsaoUniform {
    pub proj: [[f32; 4]; 4],
    pub inv_proj: [[f32; 4]; 4],
    pub view: [[f32; 4]; 4],
    /// radius, bias, intensity, kernel size.
    pub params: [f32; 4],
    /// width, height, noise scale x, noise scale y.
    pub resolution: [f32; 4],
}

#[repr(C)]
#[derive(Clone, Copy, Pod, Zeroable)]
pub struct BlurUniform {
    pub texel: [f32; 4],
}

#[repr(C)]
#[derive(Clone, Copy, Pod, Zeroable)]
pub struct TonemapUniform {
    /// exposure, gamma, unused, unused.
    pub params: [f32; 4],
}

#[repr(C)]
#[derive(Clone, Copy, Pod, Zeroable)]
pub struct FxaaUniform {
    /// 1/width, 1/height, edge threshold, edge threshold min.
    pub params: [f32; 4],
}

#[repr(C)]
#[derive(Clone, Copy, Pod, Zeroable)]
pub struct InstancedUniform {
    pub material_index: [u32; 4],
}

#[repr(C)]
#[derive(Clone, Copy, Pod, Zeroable)]
pub struct FaceUniform {
    pub forward: [f32; 4],
    pub right: [f32; 4],
    pub up: [f32; 4],
    pub sun: [f32; 4],
    pub sun_color: [f32; 4],
}

#[repr(C)]
#[derive(Clone, Copy, Pod, Zeroable)]
pub struct PrefilterUniform {
    pub forward: [f32; 4],
    pub right: [f32; 4],
    pub up: [f32; 4],
    /// roughness, sample count, unused, unused.
    pub params: [f32; 4],
}

/// Per-face orientation bases for cube map rendering, in wgpu's cube face
/// order (+X, -X, +Y, -Y, +Z, -Z).
pub fn cube_face_basis(face: usize) -> (Vec3, Vec3, Vec3) {
    match face {
        0 => (Vec3::X, Vec3::NEG_Z, Vec3::NEG_Y),
        1 => (Vec3::NEG_X, Vec3::Z, Vec3::NEG_Y),
        2 => (Vec3::Y, Vec3::X, Vec3::Z),
        3 => (Vec3::NEG_Y, Vec3::X, Vec3::NEG_Z),
        4 => (Vec3::Z, Vec3::X, Vec3::NEG_Y),
        _ => (Vec3::NEG_Z, Vec3::NEG_X, Vec3::NEG_Y),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn uniform_sizes_match_wgsl_layout() {
        assert_eq!(std::mem::size_of::<FrameUniform>(), 144);
        assert_eq!(std::mem::size_of::<ObjectData>(), 176);
        assert_eq!(std::mem::size_of::<LightingUniform>(), 64 + 16 * 4 + 32 + 512);
        assert_eq!(std::mem::size_of::<SsaoUniform>(), 224);
        assert_eq!(std::mem::size_of::<FaceUniform>(), 80);
    }

    #[test]
    fn cube_faces_are_orthonormal() {
        for face in 0..6 {
            let (forward, right, up) = cube_face_basis(face);
            assert!(forward.dot(right).abs() < 1e-6);
            assert!(forward.dot(up).abs() < 1e-6);
            assert!(right.dot(up).abs() < 1e-6);
        }
    }

    #[test]
    fn object_data_carries_forward_lights() {
        let mut lights = ForwardLightList::default();
        lights.push(3);
        lights.push(9);
        let data = ObjectData::new(Mat4::IDENTITY, Mat4::IDENTITY, 5).with_lights(&lights);
        assert_eq!(data.light_count, 2);
        assert_eq!(data.light_indices[0], 3);
        assert_eq!(data.light_indices[1], 9);
    }
}
