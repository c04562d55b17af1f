//! Level selection from the screen-space size of a sector's proxy quads.

use tessera_scene::{LevelOfDetail, SectorMetadata};

/// World-space quad size that still projects below `max_quad_size` (a
/// fraction of the viewport height) at `distance` with vertical field of
/// view `fov_y` (radians).
pub fn quad_size_threshold(distance: f32, fov_y: f32, max_quad_size: f32) -> f32 {
    max_quad_size * 2.0 * distance * (fov_y * 0.5).tan()
}

/// Pick the level a sector should be shown at from `distance` away.
///
/// When the proxy's quads are smaller than [`quad_size_threshold`] the proxy
/// is sufficient: Simple if the sector has one, Discarded otherwise (nothing
/// coarser to show). Anything closer wants Detailed.
pub fn determine_level_of_detail(
    sector: &SectorMetadata,
    distance: f32,
    fov_y: f32,
    max_quad_size: f32,
) -> LevelOfDetail {
    debug_assert!(distance >= 0.0, "distance must be non-negative");
    if sector.quad_size < quad_size_threshold(distance, fov_y, max_quad_size) {
        if sector.has_simple_proxy() {
            LevelOfDetail::Simple
        } else {
            LevelOfDetail::Discarded
        }
    } else {
        LevelOfDetail::Detailed
    }
}
