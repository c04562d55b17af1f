//! Budgeted sector selection across all loaded models.
//!
//! Each pass starts from freshly seeded [`TakenSectorTree`]s, forces every
//! sector near the viewer to Detailed, then walks the visibility ranking and
//! accepts Detailed or Simple marks while their cost fits the budget.

use std::sync::Arc;

use glam::Mat4;
use rustc_hash::FxHashMap;
use tessera_math::{Plane, matrices_equal, try_inverse};
use tessera_scene::{
    CadModel, DownloadSizeCost, LevelOfDetail, ModelId, SectorCostModel, SectorId, SectorMetadata,
    SectorScene,
};
use tracing::debug;

use crate::level::determine_level_of_detail;
use crate::wanted::priority_order;
use crate::{
    CameraState, CullError, PrioritizedSector, SectorBudget, SpentBudget, TakenSectorTree,
    TreePlan, VisibilityRanking, WantedSector,
};

/// LOD state trees for every model in a pass, keyed by model id.
pub struct TakenSectorMap {
    cost_model: Arc<dyn SectorCostModel>,
    trees: FxHashMap<ModelId, TakenSectorTree>,
}

impl TakenSectorMap {
    pub fn new(cost_model: Arc<dyn SectorCostModel>) -> Self {
        Self {
            cost_model,
            trees: FxHashMap::default(),
        }
    }

    /// Start a fresh tree for `model`, replacing any previous one.
    pub fn initialize_model(&mut self, model: &CadModel) {
        self.trees.insert(
            model.id,
            TakenSectorTree::new(Arc::clone(&model.scene), Arc::clone(&self.cost_model)),
        );
    }

    pub fn tree(&self, model: ModelId) -> Option<&TakenSectorTree> {
        self.trees.get(&model)
    }

    /// `None` when the model is unknown.
    pub fn plan(
        &self,
        model: ModelId,
        sector: SectorId,
        lod: LevelOfDetail,
        priority: f64,
    ) -> Option<TreePlan> {
        let tree = self.trees.get(&model)?;
        match lod {
            LevelOfDetail::Detailed => Some(tree.plan_detailed(sector, priority)),
            LevelOfDetail::Simple => Some(tree.plan_simple(sector, priority)),
            LevelOfDetail::Discarded => None,
        }
    }

    pub fn apply(&mut self, model: ModelId, plan: &TreePlan) {
        if let Some(tree) = self.trees.get_mut(&model) {
            tree.apply(plan);
        }
    }

    pub fn mark_detailed(&mut self, model: ModelId, sector: SectorId, priority: f64) {
        match self.trees.get_mut(&model) {
            Some(tree) => tree.mark_detailed(sector, priority),
            None => debug!(model, sector, "mark for unknown model ignored"),
        }
    }

    pub fn total_cost(&self) -> f64 {
        self.trees.values().map(TakenSectorTree::total_cost).sum()
    }

    pub fn budgeted_cost(&self) -> f64 {
        self.trees.values().map(TakenSectorTree::budgeted_cost).sum()
    }

    pub fn wanted_sector_count(&self) -> usize {
        self.trees.values().map(TakenSectorTree::wanted_sector_count).sum()
    }

    /// Loaded sectors of every model, by descending priority.
    pub fn collect_wanted_sectors(&self) -> Vec<WantedSector> {
        let mut wanted: Vec<WantedSector> = self
            .trees
            .iter()
            .flat_map(|(&model, tree)| tree.to_wanted_sectors(model))
            .collect();
        wanted.sort_by(priority_order);
        wanted
    }

    pub fn clear(&mut self) {
        self.trees.clear();
    }
}

/// Everything a pass depends on.
#[derive(Clone, Copy, Debug)]
pub struct CullInput<'a> {
    pub camera: &'a CameraState,
    pub models: &'a [CadModel],
    pub budget: &'a SectorBudget,
    pub clip_planes: &'a [Plane],
}

/// Snapshot of the inputs of the last completed pass.
struct PassInputs {
    camera: CameraState,
    models: Vec<(ModelId, Mat4, Arc<SectorScene>)>,
    budget: SectorBudget,
    clip_planes: Vec<Plane>,
}

impl PassInputs {
    fn capture(input: &CullInput<'_>) -> Self {
        Self {
            camera: *input.camera,
            models: input
                .models
                .iter()
                .map(|m| (m.id, m.model_matrix, Arc::clone(&m.scene)))
                .collect(),
            budget: *input.budget,
            clip_planes: input.clip_planes.to_vec(),
        }
    }

    fn matches(&self, input: &CullInput<'_>) -> bool {
        self.camera.same_view(input.camera)
            && self.camera.fov_y == input.camera.fov_y
            && self.budget == *input.budget
            && self.clip_planes == input.clip_planes
            && self.models.len() == input.models.len()
            && self.models.iter().zip(input.models).all(|((id, matrix, scene), m)| {
                *id == m.id
                    && matrices_equal(matrix, &m.model_matrix)
                    && Arc::ptr_eq(scene, &m.scene)
            })
    }
}

/// Turns a view, the loaded models and a visibility ranking into the wanted
/// sector set under a global cost budget.
pub struct VisibilityPriorityCuller {
    taken: TakenSectorMap,
    last_inputs: Option<PassInputs>,
    wanted: Vec<WantedSector>,
    spent: SpentBudget,
}

impl Default for VisibilityPriorityCuller {
    fn default() -> Self {
        Self::new(Arc::new(DownloadSizeCost))
    }
}

impl VisibilityPriorityCuller {
    pub fn new(cost_model: Arc<dyn SectorCostModel>) -> Self {
        Self {
            taken: TakenSectorMap::new(cost_model),
            last_inputs: None,
            wanted: Vec::new(),
            spent: SpentBudget::default(),
        }
    }

    /// Recompute the wanted set unless nothing it depends on changed.
    /// Returns whether a pass ran.
    ///
    /// On error nothing changes, so the next call retries.
    pub fn determine_sectors(
        &mut self,
        input: &CullInput<'_>,
        ranking: &mut dyn VisibilityRanking,
    ) -> Result<bool, CullError> {
        if self
            .last_inputs
            .as_ref()
            .is_some_and(|last| last.matches(input))
        {
            return Ok(false);
        }

        let view = input.camera.view_matrix()?;
        for model in input.models {
            if try_inverse(&model.model_matrix).is_none() {
                return Err(CullError::NonInvertibleTransform {
                    model: Some(model.id),
                });
            }
        }

        self.taken.clear();
        for model in input.models {
            self.taken.initialize_model(model);
        }

        let forced = self.add_near_sectors(input, &view);
        let prioritized = ranking.order_by_visibility(input.camera, input.models);
        let (accepted, considered) = self.add_prioritized_sectors(input, &prioritized);

        self.wanted = self.taken.collect_wanted_sectors();
        let total_sectors = input.models.iter().map(|m| m.scene.sector_count()).sum();
        self.spent = SpentBudget::from_wanted(
            &self.wanted,
            total_sectors,
            self.taken.total_cost(),
            self.taken.budgeted_cost(),
        );
        self.last_inputs = Some(PassInputs::capture(input));

        debug!(
            near = forced,
            accepted,
            considered,
            ranked = prioritized.len(),
            budget = input.budget.max_cost,
            "culling pass: {}",
            self.spent
        );
        Ok(true)
    }

    /// Wanted sectors of the last pass across all models.
    pub fn wanted_sectors(&self) -> &[WantedSector] {
        &self.wanted
    }

    /// Wanted sectors of the last pass belonging to `model`, in priority order.
    pub fn wanted_for_model(&self, model: ModelId) -> impl Iterator<Item = &WantedSector> + '_ {
        self.wanted.iter().filter(move |w| w.model == model)
    }

    pub fn spent_budget(&self) -> &SpentBudget {
        &self.spent
    }

    /// LOD tree of the last pass for `model`.
    pub fn taken_tree(&self, model: ModelId) -> Option<&TakenSectorTree> {
        self.taken.tree(model)
    }

    /// Force the next call to run a pass.
    pub fn invalidate(&mut self) {
        self.last_inputs = None;
    }

    /// Mark every sector inside the short-range frustum Detailed at infinite
    /// priority. Returns the number of sectors marked.
    fn add_near_sectors(&mut self, input: &CullInput<'_>, view: &Mat4) -> usize {
        let Some(projection) = input
            .camera
            .short_range_projection(input.budget.high_detail_proximity_threshold)
        else {
            return 0;
        };

        let mut marked = 0;
        for model in input.models {
            let model_view = *view * model.model_matrix;
            let local_planes: Vec<Plane> = input
                .clip_planes
                .iter()
                .map(|p| p.to_local_space(&model.model_matrix))
                .collect();
            let near: Vec<SectorId> = model
                .scene
                .sectors_intersecting_frustum(&projection, &model_view)
                .into_iter()
                .filter(|s| passes_clip_planes(s, &local_planes))
                .map(|s| s.id)
                .collect();
            for id in near {
                self.taken.mark_detailed(model.id, id, f64::INFINITY);
                marked += 1;
            }
        }
        marked
    }

    /// Walk the ranking, accepting marks while they fit the budget. Returns
    /// `(accepted, considered)`.
    fn add_prioritized_sectors(
        &mut self,
        input: &CullInput<'_>,
        prioritized: &[PrioritizedSector],
    ) -> (usize, usize) {
        let budget = input.budget;
        let detailed_limit = budget.detailed_limit();
        let eye = input.camera.position();
        let models: FxHashMap<ModelId, &CadModel> =
            input.models.iter().map(|m| (m.id, m)).collect();

        let mut accepted = 0;
        let mut considered = 0;
        for entry in prioritized {
            // Near-field and seed cost counts against the budget too.
            let spent = self.taken.total_cost();
            if spent >= budget.max_cost {
                break;
            }
            considered += 1;
            if entry.priority.is_nan() {
                continue;
            }
            // Ranked sectors always compete for the budget.
            let priority = entry.priority.clamp(0.0, 1.0);
            let Some(model) = models.get(&entry.model) else {
                debug!(model = entry.model, "ranked sector of unknown model ignored");
                continue;
            };
            let Some(sector) = model.scene.get_by_id(entry.sector) else {
                debug!(model = model.id, sector = entry.sector, "ranked sector not in scene");
                continue;
            };

            let distance = sector
                .bounds
                .transformed(&model.model_matrix)
                .distance_to_point(eye);
            let mut lod = determine_level_of_detail(
                sector,
                distance,
                input.camera.fov_y,
                budget.max_quad_size,
            );

            if lod == LevelOfDetail::Detailed {
                if let Some(plan) = self.taken.plan(model.id, sector.id, lod, priority) {
                    if spent + plan.cost_delta() <= detailed_limit {
                        self.taken.apply(model.id, &plan);
                        accepted += 1;
                        continue;
                    }
                }
                if !sector.has_simple_proxy() {
                    continue;
                }
                lod = LevelOfDetail::Simple;
            }
            if lod == LevelOfDetail::Simple {
                if let Some(plan) = self.taken.plan(model.id, sector.id, lod, priority) {
                    if spent + plan.cost_delta() <= budget.max_cost {
                        self.taken.apply(model.id, &plan);
                        accepted += 1;
                    }
                }
            }
        }
        (accepted, considered)
    }
}

/// A sector survives when every plane has at least one bounds corner on its
/// accepted side.
fn passes_clip_planes(sector: &SectorMetadata, planes: &[Plane]) -> bool {
    let corners = sector.bounds.corners();
    planes
        .iter()
        .all(|plane| corners.iter().any(|&c| plane.distance_to_point(c) >= 0.0))
}
