use glam::{Vec3, Vec4};
use instant::Instant;

/// Fire-and-forget debug draw queue. Requests expire on their own clock;
/// `time = 0` keeps a box alive for exactly one frame.
pub struct RenderDebug {
    boxes: Vec<DebugBox>,
}

struct DebugBox {
    position: Vec3,
    scale: Vec3,
    color: Vec4,
    expires_at: Option<Instant>,
    drawn_once: bool,
}

impl RenderDebug {
    pub fn new() -> Self {
        Self { boxes: Vec::new() }
    }

    /// Queues a box at `position` with half-extents implied by `scale`,
    /// drawn for `time` seconds.
    pub fn draw_box(&mut self, position: Vec3, scale: Vec3, color: Vec4, time: f32) {
        let expires_at = if time > 0.0 {
            Some(Instant::now() + std::time::Duration::from_secs_f32(time))
        } else {
            None
        };
        self.boxes.push(DebugBox {
            position,
            scale,
            color,
            expires_at,
            drawn_once: false,
        });
    }

    /// Yields the boxes to draw this frame and retires expired entries.
    pub(crate) fn drain_frame(&mut self, mut visit: impl FnMut(Vec3, Vec3, Vec4)) {
        let now = Instant::now();
        self.boxes.retain_mut(|entry| {
            let keep = match entry.expires_at {
                Some(expires_at) => now < expires_at,
                // One-frame entries die after their first draw.
                None => !entry.drawn_once,
            };
            if keep {
                visit(entry.position, entry.scale, entry.color);
                entry.drawn_once = true;
            }
            keep
        });
    }

    pub fn is_empty(&self) -> bool {
        self.boxes.is_empty()
    }
}

impl Default for RenderDebug {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_time_box_lives_one_frame() {
        let mut debug = RenderDebug::new();
        debug.draw_box(Vec3::ZERO, Vec3::ONE, Vec4::ONE, 0.0);

        let mut drawn = 0;
        debug.drain_frame(|_, _, _| drawn += 1);
        assert_eq!(drawn, 1);

        drawn = 0;
        debug.drain_frame(|_, _, _| drawn += 1);
        assert_eq!(drawn, 0);
        assert!(debug.is_empty());
    }

    #[test]
    fn timed_box_survives_multiple_frames() {
        let mut debug = RenderDebug::new();
        debug.draw_box(Vec3::ZERO, Vec3::ONE, Vec4::ONE, 60.0);

        for _ in 0..3 {
            let mut drawn = 0;
            debug.drain_frame(|_, _, _| drawn += 1);
            assert_eq!(drawn, 1);
        }
    }
}
