//! Visibility ranking: the ordered list of sectors the budgeted pass walks.

use tessera_scene::{CadModel, ModelId, SectorId};

use crate::CameraState;

/// A sector with its visibility score.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct PrioritizedSector {
    pub model: ModelId,
    pub sector: SectorId,
    /// In `[0, 1]`, higher is more visible.
    pub priority: f64,
}

/// Source of the per-view visibility order, typically a GPU coverage pass.
pub trait VisibilityRanking {
    /// Sectors of `models` sorted by descending priority. Only called when
    /// the view or the model set changed.
    fn order_by_visibility(
        &mut self,
        camera: &CameraState,
        models: &[CadModel],
    ) -> Vec<PrioritizedSector>;
}

/// CPU ranking: every sector inside the view frustum, scored by its size
/// over its distance to the viewer and normalized so the best scores 1.
#[derive(Clone, Copy, Debug, Default)]
pub struct DistanceVisibilityRanking;

impl VisibilityRanking for DistanceVisibilityRanking {
    fn order_by_visibility(
        &mut self,
        camera: &CameraState,
        models: &[CadModel],
    ) -> Vec<PrioritizedSector> {
        let Ok(view) = camera.view_matrix() else {
            return Vec::new();
        };
        let eye = camera.position();

        let mut ranked = Vec::new();
        for model in models {
            let model_view = view * model.model_matrix;
            for sector in model
                .scene
                .sectors_intersecting_frustum(&camera.projection, &model_view)
            {
                let bounds = sector.bounds.transformed(&model.model_matrix);
                let distance = bounds.distance_to_point(eye).max(camera.near);
                ranked.push(PrioritizedSector {
                    model: model.id,
                    sector: sector.id,
                    priority: f64::from(bounds.diagonal() / distance),
                });
            }
        }

        let best = ranked.iter().map(|s| s.priority).fold(0.0, f64::max);
        if best > 0.0 {
            for s in &mut ranked {
                s.priority /= best;
            }
        }
        ranked.sort_by(|a, b| {
            b.priority
                .total_cmp(&a.priority)
                .then_with(|| (a.model, a.sector).cmp(&(b.model, b.sector)))
        });
        ranked
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use glam::{Mat4, Vec3};
    use std::sync::Arc;
    use tessera_scene::synthetic::{OctreeParams, octree};

    fn model(id: ModelId, offset: Vec3) -> CadModel {
        let scene = octree(&OctreeParams {
            depth: 1,
            half_extent: 8.0,
            ..Default::default()
        });
        CadModel::new(id, Arc::new(scene)).with_model_matrix(Mat4::from_translation(offset))
    }

    fn camera_looking_down_z() -> CameraState {
        CameraState::look_at(
            Vec3::new(0.0, 0.0, 40.0),
            Vec3::ZERO,
            Vec3::Y,
            60f32.to_radians(),
            1.0,
            0.1,
            1000.0,
        )
    }

    /// Scores are sorted, normalized into `[0, 1]` and led by a 1.
    #[test]
    fn test_ranking_is_sorted_and_normalized() {
        let ranked = DistanceVisibilityRanking
            .order_by_visibility(&camera_looking_down_z(), &[model(0, Vec3::ZERO)]);
        assert!(!ranked.is_empty());
        assert!((ranked[0].priority - 1.0).abs() < 1e-9);
        for pair in ranked.windows(2) {
            assert!(pair[0].priority >= pair[1].priority);
        }
        assert!(ranked.iter().all(|s| (0.0..=1.0).contains(&s.priority)));
    }

    /// The model-level root outranks its smaller children.
    #[test]
    fn test_root_ranks_first() {
        let ranked = DistanceVisibilityRanking
            .order_by_visibility(&camera_looking_down_z(), &[model(0, Vec3::ZERO)]);
        assert_eq!(ranked[0].sector, 0);
    }

    /// A model moved behind the camera is not ranked.
    #[test]
    fn test_model_behind_camera_is_skipped() {
        let ranked = DistanceVisibilityRanking.order_by_visibility(
            &camera_looking_down_z(),
            &[model(0, Vec3::ZERO), model(1, Vec3::new(0.0, 0.0, 200.0))],
        );
        assert!(ranked.iter().all(|s| s.model == 0));
    }

    /// A degenerate camera ranks nothing.
    #[test]
    fn test_degenerate_camera() {
        let mut camera = camera_looking_down_z();
        camera.world = Mat4::ZERO;
        assert!(DistanceVisibilityRanking
            .order_by_visibility(&camera, &[model(0, Vec3::ZERO)])
            .is_empty());
    }
}
