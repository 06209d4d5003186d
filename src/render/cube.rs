use crate::preset::{Environment, Face, MaterialKind, parse_hex_color};
use crate::reaction::RenderParams;

type Vec3 = [f32; 3];

const CAMERA_DISTANCE: f32 = 3.2;
/// Faces with a corner closer to the camera than this are not drawn.
const NEAR_PLANE: f32 = 0.2;
const HALF_EXTENT: f32 = 0.55;
const LIGHT: Vec3 = [-0.38, -0.55, -0.74];

/// Outward normal per face, in `Face::index()` order. The camera looks down +z.
const NORMALS: [Vec3; Face::COUNT] = [
    [0.0, 0.0, -1.0],
    [0.0, 0.0, 1.0],
    [-1.0, 0.0, 0.0],
    [1.0, 0.0, 0.0],
    [0.0, -1.0, 0.0],
    [0.0, 1.0, 0.0],
];

/// CPU rasterizer for the reactive cube. Keeps the accumulated rotation
/// between frames.
pub struct CubeView {
    yaw: f32,
    pitch: f32,
    rng: fastrand::Rng,
}

impl Default for CubeView {
    fn default() -> Self {
        Self::new()
    }
}

impl CubeView {
    pub fn new() -> Self {
        Self {
            yaw: 0.6,
            pitch: -0.45,
            rng: fastrand::Rng::new(),
        }
    }

    pub fn advance(&mut self, dt_s: f32, rotation_speed: f32) {
        self.yaw = (self.yaw + rotation_speed * dt_s) % std::f32::consts::TAU;
        self.pitch = (self.pitch + rotation_speed * 0.31 * dt_s) % std::f32::consts::TAU;
    }

    fn rotate(&self, v: Vec3) -> Vec3 {
        let (sy, cy) = self.yaw.sin_cos();
        let (sp, cp) = self.pitch.sin_cos();
        let x = cy * v[0] + sy * v[2];
        let z = -sy * v[0] + cy * v[2];
        let y = cp * v[1] - sp * z;
        let z = sp * v[1] + cp * z;
        [x, y, z]
    }

    /// Draws one frame into `out` (`w * h` RGBA pixels). `lit` marks the face
    /// holding the active lyric.
    pub fn draw(
        &mut self,
        params: &RenderParams,
        env: &Environment,
        lit: Option<Face>,
        w: usize,
        h: usize,
        out: &mut Vec<u8>,
    ) {
        out.clear();
        out.resize(w * h * 4, 255);
        if w == 0 || h == 0 {
            return;
        }

        let bg = color_or(&env.bg_color, (0, 0, 0));
        for px in out.chunks_exact_mut(4) {
            px[..3].copy_from_slice(&[bg.0, bg.1, bg.2]);
        }

        let m = &params.material;
        let base = color_or(&m.color, (200, 200, 200));
        let wire = color_or(&m.wireframe_color, (255, 255, 255));
        let focal = w.min(h) as f32 * 1.6;
        let project = |p: Vec3| -> (f32, f32) {
            let z = p[2] + CAMERA_DISTANCE;
            (
                w as f32 * 0.5 + p[0] / z * focal,
                h as f32 * 0.5 + p[1] / z * focal,
            )
        };

        let extent = HALF_EXTENT * params.cube_scale;
        let push = params.fracture_strength * 0.18;

        let mut visible: Vec<(f32, usize, [(f32, f32); 4], f32)> = Vec::with_capacity(3);
        for (idx, normal) in NORMALS.iter().enumerate() {
            let n = self.rotate(*normal);
            let corners = face_corners(*normal, extent, push);
            let world: Vec<Vec3> = corners.iter().map(|c| self.rotate(*c)).collect();
            let center = [
                world.iter().map(|p| p[0]).sum::<f32>() / 4.0,
                world.iter().map(|p| p[1]).sum::<f32>() / 4.0,
                world.iter().map(|p| p[2]).sum::<f32>() / 4.0 + CAMERA_DISTANCE,
            ];
            if dot(n, center) >= 0.0 {
                continue;
            }
            if world.iter().any(|p| p[2] + CAMERA_DISTANCE <= NEAR_PLANE) {
                continue;
            }
            let shade = 0.25 + 0.75 * (-dot(n, normalize(LIGHT))).max(0.0);
            let quad = [
                project(world[0]),
                project(world[1]),
                project(world[2]),
                project(world[3]),
            ];
            visible.push((center[2], idx, quad, shade));
        }
        // Far faces first.
        visible.sort_by(|a, b| b.0.total_cmp(&a.0));

        for (_, idx, quad, shade) in &visible {
            let mut color = scale_rgb(base, *shade * material_gain(m.kind, m.metalness));
            if lit.map(Face::index) == Some(*idx) {
                color = scale_rgb(color, 1.35);
            }
            let alpha = m.opacity.clamp(0.08, 1.0);
            fill_quad(out, w, h, quad, color, alpha);

            if m.wireframe || m.edge_glow > 0.0 {
                let edge_color = if m.wireframe {
                    wire
                } else {
                    mix_rgb(color, (255, 255, 255), m.edge_glow)
                };
                let thickness = if m.wireframe { m.wireframe_thickness } else { 1.0 };
                for i in 0..4 {
                    draw_line(out, w, h, quad[i], quad[(i + 1) % 4], edge_color, thickness);
                }
            }
        }

        if params.bloom_intensity > 0.0 {
            let lift = (params.bloom_intensity * 38.0).min(90.0) as u8;
            for px in out.chunks_exact_mut(4) {
                if px[..3] != [bg.0, bg.1, bg.2] {
                    for c in &mut px[..3] {
                        *c = c.saturating_add(lift);
                    }
                }
            }
        }

        if params.glitch_strength > 0.0 {
            self.glitch_rows(out, w, h, params.glitch_strength);
        }
    }

    fn glitch_rows(&mut self, out: &mut [u8], w: usize, h: usize, strength: f32) {
        let chance = (strength * 0.35).min(0.9);
        let max_shift = ((strength * 10.0) as usize).clamp(1, w.max(1));
        for y in 0..h {
            if self.rng.f32() >= chance {
                continue;
            }
            let shift = self.rng.usize(1..=max_shift);
            let row = &mut out[y * w * 4..(y + 1) * w * 4];
            if self.rng.bool() {
                row.rotate_right(shift * 4);
            } else {
                row.rotate_left(shift * 4);
            }
        }
    }
}

fn face_corners(normal: Vec3, extent: f32, push: f32) -> [Vec3; 4] {
    // Two axes spanning the face, chosen so corners wind consistently.
    let (u, v) = if normal[0] != 0.0 {
        ([0.0, 1.0, 0.0], [0.0, 0.0, 1.0])
    } else if normal[1] != 0.0 {
        ([1.0, 0.0, 0.0], [0.0, 0.0, 1.0])
    } else {
        ([1.0, 0.0, 0.0], [0.0, 1.0, 0.0])
    };
    let c = [
        normal[0] * (extent + push),
        normal[1] * (extent + push),
        normal[2] * (extent + push),
    ];
    let at = |su: f32, sv: f32| -> Vec3 {
        [
            c[0] + (u[0] * su + v[0] * sv) * extent,
            c[1] + (u[1] * su + v[1] * sv) * extent,
            c[2] + (u[2] * su + v[2] * sv) * extent,
        ]
    };
    [at(-1.0, -1.0), at(1.0, -1.0), at(1.0, 1.0), at(-1.0, 1.0)]
}

fn material_gain(kind: MaterialKind, metalness: f32) -> f32 {
    match kind {
        MaterialKind::Metallic => 0.9 + metalness * 0.3,
        MaterialKind::Glass => 1.1,
        MaterialKind::Hologram => 1.2,
        MaterialKind::Rock => 0.8,
        MaterialKind::Standard => 1.0,
    }
}

fn dot(a: Vec3, b: Vec3) -> f32 {
    a[0] * b[0] + a[1] * b[1] + a[2] * b[2]
}

fn normalize(v: Vec3) -> Vec3 {
    let len = dot(v, v).sqrt().max(1e-6);
    [v[0] / len, v[1] / len, v[2] / len]
}

fn color_or(hex: &str, fallback: (u8, u8, u8)) -> (u8, u8, u8) {
    parse_hex_color(hex).unwrap_or(fallback)
}

fn scale_rgb((r, g, b): (u8, u8, u8), k: f32) -> (u8, u8, u8) {
    let s = |c: u8| (c as f32 * k).clamp(0.0, 255.0) as u8;
    (s(r), s(g), s(b))
}

fn mix_rgb(a: (u8, u8, u8), b: (u8, u8, u8), t: f32) -> (u8, u8, u8) {
    let t = t.clamp(0.0, 1.0);
    let l = |x: u8, y: u8| (x as f32 * (1.0 - t) + y as f32 * t) as u8;
    (l(a.0, b.0), l(a.1, b.1), l(a.2, b.2))
}

fn blend(out: &mut [u8], w: usize, x: usize, y: usize, color: (u8, u8, u8), alpha: f32) {
    let i = (y * w + x) * 4;
    let dst = (out[i], out[i + 1], out[i + 2]);
    let (r, g, b) = mix_rgb(dst, color, alpha);
    out[i] = r;
    out[i + 1] = g;
    out[i + 2] = b;
}

fn edge(a: (f32, f32), b: (f32, f32), p: (f32, f32)) -> f32 {
    (b.0 - a.0) * (p.1 - a.1) - (b.1 - a.1) * (p.0 - a.0)
}

fn fill_quad(
    out: &mut [u8],
    w: usize,
    h: usize,
    quad: &[(f32, f32); 4],
    color: (u8, u8, u8),
    alpha: f32,
) {
    let min_x = quad.iter().map(|p| p.0).fold(f32::MAX, f32::min).floor().max(0.0) as usize;
    let max_x = quad.iter().map(|p| p.0).fold(f32::MIN, f32::max).ceil().max(0.0) as usize;
    let min_y = quad.iter().map(|p| p.1).fold(f32::MAX, f32::min).floor().max(0.0) as usize;
    let max_y = quad.iter().map(|p| p.1).fold(f32::MIN, f32::max).ceil().max(0.0) as usize;

    for y in min_y..=max_y.min(h.saturating_sub(1)) {
        for x in min_x..=max_x.min(w.saturating_sub(1)) {
            let p = (x as f32 + 0.5, y as f32 + 0.5);
            let e = [
                edge(quad[0], quad[1], p),
                edge(quad[1], quad[2], p),
                edge(quad[2], quad[3], p),
                edge(quad[3], quad[0], p),
            ];
            let inside = e.iter().all(|v| *v >= 0.0) || e.iter().all(|v| *v <= 0.0);
            if inside {
                blend(out, w, x, y, color, alpha);
            }
        }
    }
}

fn draw_line(
    out: &mut [u8],
    w: usize,
    h: usize,
    a: (f32, f32),
    b: (f32, f32),
    color: (u8, u8, u8),
    thickness: f32,
) {
    let radius = ((thickness - 1.0).max(0.0) * 0.5).round() as isize;
    let pad = radius as f32 + 1.0;
    let bounds = (-pad, -pad, w as f32 + pad, h as f32 + pad);
    let Some((a, b)) = clip_segment(a, b, bounds) else {
        return;
    };
    let steps = (b.0 - a.0).abs().max((b.1 - a.1).abs()).ceil().max(1.0) as usize;
    for s in 0..=steps {
        let t = s as f32 / steps as f32;
        let cx = (a.0 + (b.0 - a.0) * t).round() as isize;
        let cy = (a.1 + (b.1 - a.1) * t).round() as isize;
        for dy in -radius..=radius {
            for dx in -radius..=radius {
                let (x, y) = (cx + dx, cy + dy);
                if x >= 0 && y >= 0 && (x as usize) < w && (y as usize) < h {
                    blend(out, w, x as usize, y as usize, color, 1.0);
                }
            }
        }
    }
}

/// Liang-Barsky clip of `a..b` to `(min_x, min_y, max_x, max_y)`.
fn clip_segment(
    a: (f32, f32),
    b: (f32, f32),
    bounds: (f32, f32, f32, f32),
) -> Option<((f32, f32), (f32, f32))> {
    if !(a.0.is_finite() && a.1.is_finite() && b.0.is_finite() && b.1.is_finite()) {
        return None;
    }
    let (dx, dy) = (b.0 - a.0, b.1 - a.1);
    let (mut t0, mut t1) = (0.0f32, 1.0f32);
    let checks = [
        (-dx, a.0 - bounds.0),
        (dx, bounds.2 - a.0),
        (-dy, a.1 - bounds.1),
        (dy, bounds.3 - a.1),
    ];
    for (p, q) in checks {
        if p == 0.0 {
            if q < 0.0 {
                return None;
            }
            continue;
        }
        let r = q / p;
        if p < 0.0 {
            t0 = t0.max(r);
        } else {
            t1 = t1.min(r);
        }
        if t0 > t1 {
            return None;
        }
    }
    Some((
        (a.0 + dx * t0, a.1 + dy * t0),
        (a.0 + dx * t1, a.1 + dy * t1),
    ))
}
