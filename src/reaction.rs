//! Maps a bass level and a preset to per-frame render parameters.
//!
//! Everything here is a pure function of its inputs: the same bass level and
//! preset always produce bit-identical output, and the preset is only read.

use crate::preset::{MaterialKind, Preset};

/// Auto-rotation speed with no bass at all.
pub const BASE_ROTATION: f32 = 0.5;
/// Glitch engages only above this bass level.
pub const GLITCH_THRESHOLD: f32 = 0.6;
/// Fracture engages only above this bass level.
pub const FRACTURE_THRESHOLD: f32 = 0.8;

const GLITCH_GAIN: f32 = 2.0;
const FRACTURE_GAIN: f32 = 5.0;
const ROTATION_GAIN: f32 = 10.0;

/// Material and geometry values copied straight from the preset.
#[derive(Clone, Debug, PartialEq)]
pub struct MaterialParams {
    pub kind: MaterialKind,
    pub color: String,
    pub roughness: f32,
    pub metalness: f32,
    pub opacity: f32,
    pub wireframe: bool,
    pub wireframe_color: String,
    pub wireframe_thickness: f32,
    pub edge_glow: f32,
    pub corner_radius: f32,
}

#[derive(Clone, Debug, PartialEq)]
pub struct RenderParams {
    pub bass_level: f32,
    pub cube_scale: f32,
    pub rotation_speed: f32,
    pub glitch_strength: f32,
    pub fracture_strength: f32,
    pub bloom_intensity: f32,
    pub material: MaterialParams,
}

pub fn cube_scale(bass: f32, preset: &Preset) -> f32 {
    1.0 + bass * preset.bass_reaction.scale
}

pub fn rotation_speed(bass: f32, preset: &Preset) -> f32 {
    BASE_ROTATION + bass * preset.bass_reaction.rotation * ROTATION_GAIN
}

pub fn glitch_strength(bass: f32, preset: &Preset) -> f32 {
    ((bass - GLITCH_THRESHOLD) * GLITCH_GAIN * preset.bass_reaction.glitch).max(0.0)
}

pub fn fracture_strength(bass: f32, preset: &Preset) -> f32 {
    ((bass - FRACTURE_THRESHOLD) * FRACTURE_GAIN * preset.effects.bass_fracture).max(0.0)
}

pub fn bloom_intensity(bass: f32, preset: &Preset) -> f32 {
    bass * preset.effects.chorus_bloom
}

pub fn material_params(preset: &Preset) -> MaterialParams {
    let m = &preset.cube_material;
    MaterialParams {
        kind: m.kind,
        color: m.color.clone(),
        roughness: m.roughness,
        metalness: m.metalness,
        opacity: m.opacity,
        wireframe: preset.wireframe.enabled,
        wireframe_color: preset.wireframe.color.clone(),
        wireframe_thickness: preset.wireframe.thickness,
        edge_glow: preset.edges.glow,
        corner_radius: preset.edges.corner_radius,
    }
}

pub fn react(bass: f32, preset: &Preset) -> RenderParams {
    RenderParams {
        bass_level: bass,
        cube_scale: cube_scale(bass, preset),
        rotation_speed: rotation_speed(bass, preset),
        glitch_strength: glitch_strength(bass, preset),
        fracture_strength: fracture_strength(bass, preset),
        bloom_intensity: bloom_intensity(bass, preset),
        material: material_params(preset),
    }
}
