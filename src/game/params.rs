//! Domain randomization parameters
//!
//! A table of named simulation parameters, each with a default and a
//! range. Sampling without a random source returns the default, which
//! turns randomization off.

use std::collections::BTreeMap;
use rand::Rng;
use serde::{Serialize, Deserialize};
use crate::math::Vec3;

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ParamError {
    #[error("unknown parameter '{0}'")]
    Unknown(String),
    #[error("parameter '{name}': {reason}")]
    Invalid { name: String, reason: String },
}

/// Scalar or 3-component parameter value
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum ParamValue {
    Scalar(f32),
    Vec3([f32; 3]),
}

impl ParamValue {
    fn components(&self) -> &[f32] {
        match self {
            ParamValue::Scalar(v) => std::slice::from_ref(v),
            ParamValue::Vec3(v) => v,
        }
    }

    fn same_shape(&self, other: &ParamValue) -> bool {
        matches!(
            (self, other),
            (ParamValue::Scalar(_), ParamValue::Scalar(_)) | (ParamValue::Vec3(_), ParamValue::Vec3(_))
        )
    }

    /// Scalar value; for vectors, the first component
    pub fn as_scalar(&self) -> f32 {
        match *self {
            ParamValue::Scalar(v) => v,
            ParamValue::Vec3(v) => v[0],
        }
    }

    /// Vector value; scalars are splatted
    pub fn as_vec3(&self) -> [f32; 3] {
        match *self {
            ParamValue::Scalar(v) => [v; 3],
            ParamValue::Vec3(v) => v,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ParamKind {
    Float,
    /// Sampled uniformly among the integers in `min..=max`
    Int,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DomainParam {
    pub default: ParamValue,
    pub min: ParamValue,
    pub max: ParamValue,
    pub kind: ParamKind,
}

/// Named simulation parameters with randomization ranges
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DomainParams {
    params: BTreeMap<String, DomainParam>,
}

impl DomainParams {
    /// Empty table
    pub fn empty() -> Self {
        Self { params: BTreeMap::new() }
    }

    /// Register or replace a parameter. `min`/`max` default to `default`.
    ///
    /// Requires `min <= default <= max` per component, and a replaced
    /// parameter must keep its kind and shape.
    pub fn set(
        &mut self,
        name: &str,
        default: ParamValue,
        min: Option<ParamValue>,
        max: Option<ParamValue>,
        kind: ParamKind,
    ) -> Result<(), ParamError> {
        let invalid = |reason: &str| ParamError::Invalid { name: name.to_string(), reason: reason.to_string() };

        let min = min.unwrap_or(default);
        let max = max.unwrap_or(default);
        if !default.same_shape(&min) || !default.same_shape(&max) {
            return Err(invalid("default, min and max must have the same shape"));
        }

        let in_range = default
            .components()
            .iter()
            .zip(min.components())
            .zip(max.components())
            .all(|((d, lo), hi)| lo <= d && d <= hi);
        if !in_range {
            return Err(invalid("default must lie within min..max"));
        }

        if let Some(existing) = self.params.get(name) {
            if existing.kind != kind {
                return Err(invalid("kind cannot change"));
            }
            if !existing.default.same_shape(&default) {
                return Err(invalid("shape cannot change"));
            }
        }

        self.params.insert(name.to_string(), DomainParam { default, min, max, kind });
        Ok(())
    }

    pub fn get(&self, name: &str) -> Result<&DomainParam, ParamError> {
        self.params.get(name).ok_or_else(|| ParamError::Unknown(name.to_string()))
    }

    pub fn get_max(&self, name: &str) -> Result<ParamValue, ParamError> {
        Ok(self.get(name)?.max)
    }

    /// Sample a parameter. Without a random source this is the default.
    pub fn sample<R: Rng>(&self, name: &str, rng: Option<&mut R>) -> Result<ParamValue, ParamError> {
        let p = self.get(name)?;
        let Some(rng) = rng else {
            return Ok(p.default);
        };

        let mut draw = |lo: f32, hi: f32| match p.kind {
            ParamKind::Float => rng.gen_range(lo..=hi),
            ParamKind::Int => rng.gen_range(lo.round() as i64..=hi.round() as i64) as f32,
        };

        Ok(match (p.min, p.max) {
            (ParamValue::Scalar(lo), ParamValue::Scalar(hi)) => ParamValue::Scalar(draw(lo, hi)),
            (lo, hi) => {
                let (lo, hi) = (lo.as_vec3(), hi.as_vec3());
                ParamValue::Vec3([draw(lo[0], hi[0]), draw(lo[1], hi[1]), draw(lo[2], hi[2])])
            }
        })
    }

    pub fn sample_scalar<R: Rng>(&self, name: &str, rng: Option<&mut R>) -> Result<f32, ParamError> {
        Ok(self.sample(name, rng)?.as_scalar())
    }

    pub fn sample_vec3<R: Rng>(&self, name: &str, rng: Option<&mut R>) -> Result<[f32; 3], ParamError> {
        Ok(self.sample(name, rng)?.as_vec3())
    }

    /// Copy with every range collapsed onto its default
    pub fn no_random(&self) -> Self {
        let params = self.params
            .iter()
            .map(|(name, p)| {
                (name.clone(), DomainParam { default: p.default, min: p.default, max: p.default, kind: p.kind })
            })
            .collect();
        Self { params }
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.params.keys().map(String::as_str)
    }
}

impl Default for DomainParams {
    /// Default simulation parameters
    fn default() -> Self {
        use ParamValue::{Scalar, Vec3 as V};

        let table = [
            ("sky_color", V([0.25, 0.82, 1.0]), V([0.1, 0.1, 0.1]), V([1.0, 1.0, 1.0])),
            ("light_pos", V([0.0, 2.5, 0.0]), V([-40.0, 2.5, -40.0]), V([40.0, 5.0, 40.0])),
            ("light_color", V([0.7; 3]), V([0.45; 3]), V([0.8; 3])),
            ("light_ambient", V([0.45; 3]), V([0.35; 3]), V([0.55; 3])),
            ("obj_color_bias", V([0.0; 3]), V([-0.2; 3]), V([0.2; 3])),
            ("bot_radius", Scalar(0.4), Scalar(0.38), Scalar(0.42)),
            // Degrees
            ("turn_step", Scalar(15.0), Scalar(10.0), Scalar(20.0)),
            ("forward_step", Scalar(0.15), Scalar(0.12), Scalar(0.17)),
        ];

        let params = table
            .into_iter()
            .map(|(name, default, min, max)| {
                (name.to_string(), DomainParam { default, min, max, kind: ParamKind::Float })
            })
            .collect();
        Self { params }
    }
}

/// Per-episode scene parameters drawn from the table
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct EpisodeParams {
    pub sky_color: [f32; 3],
    pub light_pos: Vec3,
    pub light_color: [f32; 3],
    pub light_ambient: [f32; 3],
    pub obj_color_bias: [f32; 3],
    /// Largest forward step, used to keep carried blocks clear of the agent
    pub max_forward_step: f32,
}

impl EpisodeParams {
    pub fn sample<R: Rng>(params: &DomainParams, mut rng: Option<&mut R>) -> Result<Self, ParamError> {
        let light_pos = params.sample_vec3("light_pos", rng.as_deref_mut())?;
        Ok(Self {
            sky_color: params.sample_vec3("sky_color", rng.as_deref_mut())?,
            light_pos: Vec3::new(light_pos[0], light_pos[1], light_pos[2]),
            light_color: params.sample_vec3("light_color", rng.as_deref_mut())?,
            light_ambient: params.sample_vec3("light_ambient", rng.as_deref_mut())?,
            obj_color_bias: params.sample_vec3("obj_color_bias", rng.as_deref_mut())?,
            max_forward_step: params.get_max("forward_step")?.as_scalar(),
        })
    }
}

impl Default for EpisodeParams {
    fn default() -> Self {
        // The built-in table contains every name sampled above
        let params = DomainParams::default();
        EpisodeParams {
            sky_color: [0.25, 0.82, 1.0],
            light_pos: Vec3::new(0.0, 2.5, 0.0),
            light_color: [0.7; 3],
            light_ambient: [0.45; 3],
            obj_color_bias: [0.0; 3],
            max_forward_step: params.get_max("forward_step").map_or(0.17, |v| v.as_scalar()),
        }
    }
}
