use bytemuck::{Pod, Zeroable};
use glam::Vec3;

/// Upper bound on lights uploaded to the deferred lighting pass; the shader
/// loops over the array in a single fullscreen draw.
pub const MAX_DEFERRED_LIGHTS: usize = 32;
/// Upper bound on per-primitive lights re-derived for the forward pass.
pub const MAX_FORWARD_LIGHTS: usize = 4;

/// Kind discriminant as uploaded to the GPU; slot 0 in the uniform array
/// means "no light".
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LightKind {
    Directional = 1,
    Point = 2,
    Spot = 3,
}

/// Per-frame snapshot of one visible light. Allocated during scene
/// collection, dropped in bulk on clear.
#[derive(Clone, Copy, Debug)]
pub struct RenderLight {
    pub kind: LightKind,
    pub position: Vec3,
    pub direction: Vec3,
    pub radius: f32,
    pub inner_cos: f32,
    pub outer_cos: f32,
    pub color: Vec3,
    pub power: f32,
}

impl RenderLight {
    pub fn directional(direction: Vec3, color: Vec3, power: f32) -> Self {
        Self {
            kind: LightKind::Directional,
            position: Vec3::ZERO,
            direction,
            radius: 0.0,
            inner_cos: 0.0,
            outer_cos: 0.0,
            color,
            power,
        }
    }

    pub fn point(position: Vec3, radius: f32, color: Vec3, power: f32) -> Self {
        Self {
            kind: LightKind::Point,
            position,
            direction: Vec3::NEG_Y,
            radius,
            inner_cos: 0.0,
            outer_cos: 0.0,
            color,
            power,
        }
    }

    pub fn spot(
        position: Vec3,
        direction: Vec3,
        radius: f32,
        inner_angle: f32,
        outer_angle: f32,
        color: Vec3,
        power: f32,
    ) -> Self {
        let mut inner = inner_angle;
        let mut outer = outer_angle;
        if inner > outer {
            std::mem::swap(&mut inner, &mut outer);
        }
        Self {
            kind: LightKind::Spot,
            position,
            direction,
            radius,
            inner_cos: inner.cos(),
            outer_cos: outer.cos(),
            color,
            power,
        }
    }
}

/// Bounded forward light list carried on translucent primitives.
#[derive(Clone, Copy, Debug, Default)]
pub struct ForwardLightList {
    indices: [u32; MAX_FORWARD_LIGHTS],
    count: u32,
}

impl ForwardLightList {
    pub fn push(&mut self, index: u32) -> bool {
        if (self.count as usize) < MAX_FORWARD_LIGHTS {
            self.indices[self.count as usize] = index;
            self.count += 1;
            true
        } else {
            false
        }
    }

    pub fn len(&self) -> usize {
        self.count as usize
    }

    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    pub fn indices(&self) -> &[u32] {
        &self.indices[..self.count as usize]
    }
}

#[repr(C)]
#[derive(Clone, Copy, Pod, Zeroable)]
pub struct LightRaw {
    pub position_radius: [f32; 4],
    /// xyz = direction, w = kind (0 = empty slot).
    pub direction_kind: [f32; 4],
    pub color_power: [f32; 4],
    /// x = cos(inner), y = cos(outer).
    pub cone: [f32; 4],
}

impl LightRaw {
    pub fn from_light(light: &RenderLight) -> Self {
        Self {
            position_radius: [
                light.position.x,
                light.position.y,
                light.position.z,
                light.radius,
            ],
            direction_kind: [
                light.direction.x,
                light.direction.y,
                light.direction.z,
                light.kind as u32 as f32,
            ],
            color_power: [light.color.x, light.color.y, light.color.z, light.power],
            cone: [light.inner_cos, light.outer_cos, 0.0, 0.0],
        }
    }
}

#[repr(C)]
#[derive(Clone, Copy, Pod, Zeroable)]
pub struct LightsUniform {
    pub counts: [u32; 4],
    pub lights: [LightRaw; MAX_DEFERRED_LIGHTS],
}

impl LightsUniform {
    pub fn from_lights(lights: &[RenderLight]) -> Self {
        let mut uniform = Self::zeroed();
        let count = lights.len().min(MAX_DEFERRED_LIGHTS);
        if lights.len() > MAX_DEFERRED_LIGHTS {
            log::warn!(
                "Dropping {} lights over the deferred limit of {}",
                lights.len() - MAX_DEFERRED_LIGHTS,
                MAX_DEFERRED_LIGHTS
            );
        }
        uniform.counts[0] = count as u32;
        for (dst, src) in uniform.lights.iter_mut().zip(lights.iter()).take(count) {
            *dst = LightRaw::from_light(src);
        }
        uniform
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn spot_orders_cone_angles() {
        let light = RenderLight::spot(
            Vec3::ZERO,
            Vec3::NEG_Y,
            10.0,
            0.8, // wider than outer on purpose
            0.4,
            Vec3::ONE,
            1.0,
        );
        assert!(light.inner_cos > light.outer_cos);
    }

    #[test]
    fn forward_list_is_bounded() {
        let mut list = ForwardLightList::default();
        for i in 0..MAX_FORWARD_LIGHTS as u32 {
            assert!(list.push(i));
        }
        assert!(!list.push(99));
        assert_eq!(list.indices(), &[0, 1, 2, 3]);
    }

    #[test]
    fn uniform_counts_and_truncates() {
        let lights: Vec<RenderLight> = (0..40)
            .map(|i| RenderLight::point(Vec3::splat(i as f32), 5.0, Vec3::ONE, 1.0))
            .collect();
        let uniform = LightsUniform::from_lights(&lights);
        assert_eq!(uniform.counts[0], MAX_DEFERRED_LIGHTS as u32);
        assert_eq!(
            uniform.lights[MAX_DEFERRED_LIGHTS - 1].position_radius[0],
            31.0
        );
    }

    #[test]
    fn empty_slot_kind_is_zero() {
        let uniform = LightsUniform::from_lights(&[]);
        assert_eq!(uniform.counts[0], 0);
        assert_eq!(uniform.lights[0].direction_kind[3], 0.0);
    }
}
