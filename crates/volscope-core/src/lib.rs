//! Core types for volscope.
//!
//! This crate holds everything about volume rendering that does not touch the GPU:
//! - [`Histogram`] and the transfer-function generators that turn it into a [`Lut`]
//! - [`ChannelState`], the per-scene view of one volume channel
//! - configuration records read by the renderers
//! - [`ObjectId`] for keying per-object GPU caches

// Documentation lints - internal functions don't need exhaustive panic/error docs
#![allow(clippy::missing_panics_doc)]
#![allow(clippy::missing_errors_doc)]
// Builder patterns return Self which doesn't need must_use
#![allow(clippy::must_use_candidate)]
#![allow(clippy::struct_excessive_bools)]

pub mod channel;
pub mod colors;
pub mod error;
pub mod histogram;
pub mod id;
pub mod lut;
pub mod settings;

pub use channel::{enabled_channels, ChannelState, MAX_FUSED_CHANNELS};
pub use colors::color_by_index;
pub use error::{Result, VolscopeError};
pub use histogram::{
    Histogram, DEFAULT_PERCENTILE_MAX, DEFAULT_PERCENTILE_MIN, HISTOGRAM_BINS,
};
pub use id::ObjectId;
pub use lut::{ControlPoint, Lut, LUT_ARRAY_LENGTH, LUT_ENTRIES};
pub use settings::{
    PathTraceSettings, PowerPreference, RendererKind, ViewerOptions, VolumeRenderSettings,
};

// Re-export glam types for convenience
pub use glam::{Mat4, Vec2, Vec3, Vec4};
