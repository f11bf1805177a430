//! In-memory patch record.
//!
//! A patch is replaced wholesale at a block boundary through the message
//! interface; nothing edits a live patch in place on the render thread.
//! JSON decoding and range validation happen on the control thread, and a
//! rejected update leaves the previous patch in force.

use once_cell::sync::Lazy;
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum VcaType {
    Gate,
    #[default]
    Env,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum PwmMod {
    #[default]
    Manual,
    Lfo,
    Env,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LfoPatch {
    pub auto_trigger: bool,
    pub frequency: f32,
    pub delay: f32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DcoPatch {
    pub range: f32,
    pub saw: bool,
    pub pulse: bool,
    pub sub: bool,
    pub sub_amount: f32,
    pub noise: f32,
    pub pwm: f32,
    pub pwm_mod: PwmMod,
    /// LFO-to-pitch modulation depth.
    pub lfo: f32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VcfPatch {
    pub frequency: f32,
    pub resonance: f32,
    /// Polarity of the envelope's cutoff modulation.
    pub mod_positive: bool,
    pub env_mod: f32,
    pub lfo_mod: f32,
    pub key_mod: f32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EnvPatch {
    pub attack: f32,
    pub decay: f32,
    pub sustain: f32,
    pub release: f32,
}

/// Full instrument patch. All sliders are normalized 0.0..1.0; `chorus`
/// selects one of the four chorus modes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Patch {
    pub name: String,
    pub vca: f32,
    pub vca_type: VcaType,
    pub lfo: LfoPatch,
    pub dco: DcoPatch,
    pub hpf: f32,
    pub vcf: VcfPatch,
    pub env: EnvPatch,
    pub chorus: u8,
}

impl Default for Patch {
    fn default() -> Self {
        // A soft string-machine patch: saw + sub through a half-open filter.
        Self {
            name: "Init Strings".to_string(),
            vca: 0.5,
            vca_type: VcaType::Env,
            lfo: LfoPatch {
                auto_trigger: true,
                frequency: 0.4,
                delay: 0.3,
            },
            dco: DcoPatch {
                range: 0.5,
                saw: true,
                pulse: false,
                sub: true,
                sub_amount: 0.6,
                noise: 0.0,
                pwm: 0.0,
                pwm_mod: PwmMod::Manual,
                lfo: 0.05,
            },
            hpf: 0.0,
            vcf: VcfPatch {
                frequency: 0.55,
                resonance: 0.1,
                mod_positive: true,
                env_mod: 0.3,
                lfo_mod: 0.0,
                key_mod: 0.5,
            },
            env: EnvPatch {
                attack: 0.35,
                decay: 0.5,
                sustain: 0.7,
                release: 0.45,
            },
            chorus: 1,
        }
    }
}

impl Patch {
    /// Decode a patch from JSON. Missing or malformed fields reject the
    /// whole update; out-of-range values are clamped (and logged), matching
    /// the render path's clamping rules.
    pub fn from_json(json: &str) -> Result<Patch, String> {
        let mut patch: Patch =
            serde_json::from_str(json).map_err(|e| format!("invalid patch: {}", e))?;
        patch.sanitize();
        Ok(patch)
    }

    pub fn to_json(&self) -> Result<String, String> {
        serde_json::to_string_pretty(self).map_err(|e| format!("patch serialization: {}", e))
    }

    /// Clamp every normalized field into its valid range.
    pub fn sanitize(&mut self) {
        let mut clamped = false;
        let mut clamp01 = |v: &mut f32| {
            if !v.is_finite() {
                *v = 0.0;
                clamped = true;
                return;
            }
            let c = v.clamp(0.0, 1.0);
            if c != *v {
                clamped = true;
                *v = c;
            }
        };

        clamp01(&mut self.vca);
        clamp01(&mut self.hpf);
        clamp01(&mut self.lfo.frequency);
        clamp01(&mut self.lfo.delay);
        clamp01(&mut self.dco.range);
        clamp01(&mut self.dco.sub_amount);
        clamp01(&mut self.dco.noise);
        clamp01(&mut self.dco.pwm);
        clamp01(&mut self.dco.lfo);
        clamp01(&mut self.vcf.frequency);
        clamp01(&mut self.vcf.resonance);
        clamp01(&mut self.vcf.env_mod);
        clamp01(&mut self.vcf.lfo_mod);
        clamp01(&mut self.vcf.key_mod);
        clamp01(&mut self.env.attack);
        clamp01(&mut self.env.decay);
        clamp01(&mut self.env.sustain);
        clamp01(&mut self.env.release);

        if self.chorus > 3 {
            self.chorus = 3;
            clamped = true;
        }

        if clamped {
            log::warn!("patch '{}' had out-of-range values, clamped", self.name);
        }
    }
}

type Lens = fn(&mut Patch, f32);

fn as_bool(value: f32) -> bool {
    value >= 0.5
}

/// Path-based accessor table for control-boundary edits, built once.
/// Paths use the patch's JSON field names.
static PARAM_LENSES: Lazy<FxHashMap<&'static str, Lens>> = Lazy::new(|| {
    let mut map: FxHashMap<&'static str, Lens> = FxHashMap::default();
    map.insert("vca", |p, v| p.vca = v.clamp(0.0, 1.0));
    map.insert("vcaType", |p, v| {
        p.vca_type = if as_bool(v) { VcaType::Env } else { VcaType::Gate }
    });
    map.insert("hpf", |p, v| p.hpf = v.clamp(0.0, 1.0));
    map.insert("chorus", |p, v| p.chorus = (v as i64).clamp(0, 3) as u8);
    map.insert("lfo.autoTrigger", |p, v| p.lfo.auto_trigger = as_bool(v));
    map.insert("lfo.frequency", |p, v| p.lfo.frequency = v.clamp(0.0, 1.0));
    map.insert("lfo.delay", |p, v| p.lfo.delay = v.clamp(0.0, 1.0));
    map.insert("dco.range", |p, v| p.dco.range = v.clamp(0.0, 1.0));
    map.insert("dco.saw", |p, v| p.dco.saw = as_bool(v));
    map.insert("dco.pulse", |p, v| p.dco.pulse = as_bool(v));
    map.insert("dco.sub", |p, v| p.dco.sub = as_bool(v));
    map.insert("dco.subAmount", |p, v| {
        p.dco.sub_amount = v.clamp(0.0, 1.0)
    });
    map.insert("dco.noise", |p, v| p.dco.noise = v.clamp(0.0, 1.0));
    map.insert("dco.pwm", |p, v| p.dco.pwm = v.clamp(0.0, 1.0));
    map.insert("dco.pwmMod", |p, v| {
        p.dco.pwm_mod = match v as i64 {
            1 => PwmMod::Lfo,
            2 => PwmMod::Env,
            _ => PwmMod::Manual,
        }
    });
    map.insert("dco.lfo", |p, v| p.dco.lfo = v.clamp(0.0, 1.0));
    map.insert("vcf.frequency", |p, v| p.vcf.frequency = v.clamp(0.0, 1.0));
    map.insert("vcf.resonance", |p, v| p.vcf.resonance = v.clamp(0.0, 1.0));
    map.insert("vcf.modPositive", |p, v| p.vcf.mod_positive = as_bool(v));
    map.insert("vcf.envMod", |p, v| p.vcf.env_mod = v.clamp(0.0, 1.0));
    map.insert("vcf.lfoMod", |p, v| p.vcf.lfo_mod = v.clamp(0.0, 1.0));
    map.insert("vcf.keyMod", |p, v| p.vcf.key_mod = v.clamp(0.0, 1.0));
    map.insert("env.attack", |p, v| p.env.attack = v.clamp(0.0, 1.0));
    map.insert("env.decay", |p, v| p.env.decay = v.clamp(0.0, 1.0));
    map.insert("env.sustain", |p, v| p.env.sustain = v.clamp(0.0, 1.0));
    map.insert("env.release", |p, v| p.env.release = v.clamp(0.0, 1.0));
    map
});

/// Apply a single path-addressed edit (`"dco.pwm"` style) to a patch.
pub fn set_param(patch: &mut Patch, path: &str, value: f32) -> Result<(), String> {
    match PARAM_LENSES.get(path) {
        Some(lens) => {
            lens(patch, value);
            Ok(())
        }
        None => Err(format!("unknown patch parameter '{}'", path)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_patch_round_trips_through_json() {
        let patch = Patch::default();
        let json = patch.to_json().unwrap();
        let back = Patch::from_json(&json).unwrap();
        assert_eq!(patch, back);
    }

    #[test]
    fn missing_fields_reject_the_update() {
        let result = Patch::from_json(r#"{"name": "broken", "vca": 0.5}"#);
        assert!(result.is_err());
    }

    #[test]
    fn malformed_nested_field_rejects_the_update() {
        let mut json = Patch::default().to_json().unwrap();
        json = json.replace("\"sustain\": 0.7", "\"sustain\": \"loud\"");
        assert!(Patch::from_json(&json).is_err());
    }

    #[test]
    fn out_of_range_values_are_clamped() {
        let mut patch = Patch::default();
        patch.vca = 7.0;
        patch.env.attack = -3.0;
        patch.chorus = 200;
        patch.sanitize();
        assert_eq!(patch.vca, 1.0);
        assert_eq!(patch.env.attack, 0.0);
        assert_eq!(patch.chorus, 3);
    }

    #[test]
    fn lens_edits_hit_the_right_fields() {
        let mut patch = Patch::default();
        set_param(&mut patch, "dco.pwm", 0.8).unwrap();
        assert_eq!(patch.dco.pwm, 0.8);
        set_param(&mut patch, "vcf.frequency", 0.25).unwrap();
        assert_eq!(patch.vcf.frequency, 0.25);
        set_param(&mut patch, "dco.saw", 0.0).unwrap();
        assert!(!patch.dco.saw);
        set_param(&mut patch, "dco.pwmMod", 1.0).unwrap();
        assert_eq!(patch.dco.pwm_mod, PwmMod::Lfo);
        set_param(&mut patch, "chorus", 2.0).unwrap();
        assert_eq!(patch.chorus, 2);
    }

    #[test]
    fn unknown_path_is_an_error() {
        let mut patch = Patch::default();
        assert!(set_param(&mut patch, "dco.nonsense", 1.0).is_err());
    }

    #[test]
    fn lens_edits_clamp_like_the_render_path() {
        let mut patch = Patch::default();
        set_param(&mut patch, "env.sustain", 9.0).unwrap();
        assert_eq!(patch.env.sustain, 1.0);
    }
}
