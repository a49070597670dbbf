//! Element encodings for stored vectors.
//!
//! Vectors are always accepted as f32 and encoded at write time:
//! float32 is stored as given, float16 rounds to nearest (ties to even), and the
//! integer encoding clamps to `[0, 255]` and rounds. Distance kernels read any
//! encoding through [`Element::to_f32`], so queries keep full f32 precision.

use crate::property::ObjectType;
use half::f16;
use serde::{Deserialize, Serialize};

/// A stored vector component.
pub trait Element: Copy + Send + Sync + 'static {
    /// Lossy conversion from the f32 input.
    fn encode(value: f32) -> Self;
    fn to_f32(self) -> f32;
}

impl Element for f32 {
    #[inline]
    fn encode(value: f32) -> Self {
        value
    }

    #[inline]
    fn to_f32(self) -> f32 {
        self
    }
}

impl Element for f16 {
    #[inline]
    fn encode(value: f32) -> Self {
        f16::from_f32(value)
    }

    #[inline]
    fn to_f32(self) -> f32 {
        f16::to_f32(self)
    }
}

impl Element for u8 {
    /// NaN maps to 0; infinities saturate.
    #[inline]
    fn encode(value: f32) -> Self {
        value.round().clamp(0.0, 255.0) as u8
    }

    #[inline]
    fn to_f32(self) -> f32 {
        self as f32
    }
}

/// Contiguous storage for all vectors of one encoding. Slot `i` holds id `i + 1`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Arena {
    Float(Vec<f32>),
    Float16(Vec<f16>),
    Integer(Vec<u8>),
}

impl Arena {
    pub fn new(object_type: ObjectType) -> Self {
        match object_type {
            ObjectType::Float => Arena::Float(Vec::new()),
            ObjectType::Float16 => Arena::Float16(Vec::new()),
            ObjectType::Integer => Arena::Integer(Vec::new()),
        }
    }

    pub fn object_type(&self) -> ObjectType {
        match self {
            Arena::Float(_) => ObjectType::Float,
            Arena::Float16(_) => ObjectType::Float16,
            Arena::Integer(_) => ObjectType::Integer,
        }
    }

    /// Total number of stored components (objects × dimension).
    pub fn components(&self) -> usize {
        match self {
            Arena::Float(v) => v.len(),
            Arena::Float16(v) => v.len(),
            Arena::Integer(v) => v.len(),
        }
    }

    /// Encodes and appends one vector.
    pub fn push(&mut self, vector: &[f32]) {
        match self {
            Arena::Float(v) => v.extend_from_slice(vector),
            Arena::Float16(v) => v.extend(vector.iter().map(|&x| f16::encode(x))),
            Arena::Integer(v) => v.extend(vector.iter().map(|&x| u8::encode(x))),
        }
    }

    /// Decodes the components in `start..start + len`.
    pub fn decode(&self, start: usize, len: usize) -> Vec<f32> {
        match self {
            Arena::Float(v) => v[start..start + len].to_vec(),
            Arena::Float16(v) => v[start..start + len].iter().map(|x| x.to_f32()).collect(),
            Arena::Integer(v) => v[start..start + len].iter().map(|&x| x as f32).collect(),
        }
    }
}
