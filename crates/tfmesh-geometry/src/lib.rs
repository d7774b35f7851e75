//! `tfmesh-geometry` – rigid-body math and the local transform buffer.
//!
//! # Modules
//!
//! - [`transform`] – [`Vec3`][transform::Vec3],
//!   [`Quaternion`][transform::Quaternion] and
//!   [`Transform3D`][transform::Transform3D], including pose differencing
//!   ([`Transform3D::relative_to`][transform::Transform3D::relative_to]).
//! - [`buffer`] – [`TfBuffer`][buffer::TfBuffer]: a stamped frame graph that
//!   answers lookups through the [`TransformLookup`][buffer::TransformLookup]
//!   trait, failing with a typed [`LookupError`][buffer::LookupError].

pub mod buffer;
pub mod transform;

pub use buffer::{LookupError, LookupTime, StampedTransform, TfBuffer, TransformLookup};
pub use transform::{Quaternion, Transform3D, Vec3};
