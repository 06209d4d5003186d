use bass_cube::preset::{Preset, builtin_presets};
use bass_cube::reaction::{
    BASE_ROTATION, bloom_intensity, cube_scale, fracture_strength, glitch_strength, react,
    rotation_speed,
};

fn preset(id: &str) -> Preset {
    builtin_presets()
        .into_iter()
        .find(|p| p.id == id)
        .expect("builtin preset exists")
}

fn levels() -> impl Iterator<Item = f32> {
    (0..=100).map(|i| i as f32 / 100.0)
}

#[test]
fn half_bass_with_scale_point_two_is_exactly_one_point_one() {
    let mut p = preset("p2");
    p.bass_reaction.scale = 0.2;
    assert_eq!(cube_scale(0.5, &p), 1.1);
}

#[test]
fn identical_inputs_give_bit_identical_output() {
    for p in builtin_presets() {
        for bass in levels() {
            let a = react(bass, &p);
            let b = react(bass, &p);
            assert_eq!(a, b);
            assert_eq!(a.cube_scale.to_bits(), b.cube_scale.to_bits());
            assert_eq!(a.glitch_strength.to_bits(), b.glitch_strength.to_bits());
        }
    }
}

#[test]
fn react_leaves_preset_untouched() {
    let p = preset("p1");
    let before = p.clone();
    let _ = react(0.93, &p);
    assert_eq!(p, before);
}

#[test]
fn glitch_is_zero_up_to_threshold_and_rises_after() {
    let p = preset("p1");
    for bass in levels().filter(|b| *b <= 0.6) {
        assert_eq!(glitch_strength(bass, &p), 0.0, "bass={bass}");
    }
    let above: Vec<f32> = levels()
        .filter(|b| *b > 0.6)
        .map(|b| glitch_strength(b, &p))
        .collect();
    assert!(above[0] > 0.0);
    for pair in above.windows(2) {
        assert!(pair[1] > pair[0], "glitch must increase: {pair:?}");
    }
}

#[test]
fn glitch_follows_preset_intensity() {
    let p = preset("p2");
    assert_eq!(p.bass_reaction.glitch, 0.0);
    assert_eq!(glitch_strength(1.0, &p), 0.0);

    let p1 = preset("p1");
    let expected = (1.0 - 0.6) * 2.0 * p1.bass_reaction.glitch;
    assert!((glitch_strength(1.0, &p1) - expected).abs() < 1e-6);
}

#[test]
fn fracture_is_zero_up_to_its_own_threshold() {
    let p = preset("p3");
    for bass in levels().filter(|b| *b <= 0.8) {
        assert_eq!(fracture_strength(bass, &p), 0.0, "bass={bass}");
    }
    assert!(fracture_strength(0.81, &p) > 0.0);
    let full = (1.0 - 0.8) * 5.0 * p.effects.bass_fracture;
    assert!((fracture_strength(1.0, &p) - full).abs() < 1e-6);
}

#[test]
fn rotation_and_bloom_scale_with_bass() {
    let p = preset("p2");
    assert_eq!(rotation_speed(0.0, &p), BASE_ROTATION);
    assert!((rotation_speed(1.0, &p) - (0.5 + 0.1 * 10.0)).abs() < 1e-6);
    assert_eq!(bloom_intensity(0.0, &p), 0.0);
    assert!((bloom_intensity(0.5, &p) - 0.4).abs() < 1e-6);
}

#[test]
fn material_passes_through_from_preset() {
    let p = preset("p1");
    let r = react(0.7, &p);
    assert_eq!(r.material.kind, p.cube_material.kind);
    assert_eq!(r.material.color, p.cube_material.color);
    assert_eq!(r.material.roughness, p.cube_material.roughness);
    assert_eq!(r.material.metalness, p.cube_material.metalness);
    assert_eq!(r.material.opacity, p.cube_material.opacity);
    assert_eq!(r.material.wireframe, p.wireframe.enabled);
    assert_eq!(r.material.corner_radius, p.edges.corner_radius);
}
