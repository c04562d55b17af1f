//! f32 geometry primitives shared by the sector scene and the culler: bounding boxes,
//! planes, view frusta and matrix helpers.

mod aabb;
mod frustum;
mod transform;

pub use aabb::Aabb;
pub use frustum::{Frustum, Plane};
pub use transform::{matrices_equal, try_inverse};
