//! Per-model level-of-detail assignment.
//!
//! [`TakenSectorTree`] tracks the level of every sector of one model and keeps
//! the loaded set a connected prefix of the sector tree: a loaded sector's
//! parent is always loaded, every ancestor of a Detailed sector is Detailed,
//! and only sectors with a coarse proxy are ever Simple. Changes are first
//! computed as a [`TreePlan`] so callers can check the cost of a mark before
//! committing to it.

use std::sync::Arc;

use rustc_hash::FxHashMap;
use tessera_scene::{
    DownloadSizeCost, LevelOfDetail, ModelId, SectorCostModel, SectorId, SectorMetadata,
    SectorScene,
};

use crate::wanted::{WantedSector, priority_order};

#[derive(Clone, Copy, Debug, PartialEq)]
struct SectorRecord {
    lod: LevelOfDetail,
    priority: f64,
    cost: f64,
}

impl SectorRecord {
    const DISCARDED: Self = Self {
        lod: LevelOfDetail::Discarded,
        priority: 0.0,
        cost: 0.0,
    };

    fn budgeted_cost(&self) -> f64 {
        if self.priority.is_finite() { self.cost } else { 0.0 }
    }

    fn forced_cost(&self) -> f64 {
        if self.priority.is_finite() { 0.0 } else { self.cost }
    }
}

/// One sector's change within a [`TreePlan`].
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct LodTransition {
    pub sector: SectorId,
    pub from: LevelOfDetail,
    pub to: LevelOfDetail,
    /// Priority after the change.
    pub priority: f64,
    /// Cost at `to`.
    pub cost: f64,
}

/// The changes a mark would make, computed without mutating the tree.
///
/// A plan is only valid for the tree state it was computed against; apply it
/// before any other mutation.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct TreePlan {
    transitions: Vec<LodTransition>,
    cost_delta: f64,
    budgeted_delta: f64,
}

impl TreePlan {
    pub fn transitions(&self) -> &[LodTransition] {
        &self.transitions
    }

    pub fn is_empty(&self) -> bool {
        self.transitions.is_empty()
    }

    /// Change in [`TakenSectorTree::total_cost`].
    pub fn cost_delta(&self) -> f64 {
        self.cost_delta
    }

    /// Change in [`TakenSectorTree::budgeted_cost`], i.e. excluding sectors
    /// that end up at infinite priority.
    pub fn budgeted_delta(&self) -> f64 {
        self.budgeted_delta
    }
}

/// Level-of-detail state of every sector in one model.
#[derive(Clone)]
pub struct TakenSectorTree {
    scene: Arc<SectorScene>,
    cost_model: Arc<dyn SectorCostModel>,
    records: Vec<SectorRecord>,
    total_cost: f64,
    budgeted_cost: f64,
    forced_cost: f64,
    loaded_count: usize,
}

impl std::fmt::Debug for TakenSectorTree {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TakenSectorTree")
            .field("sectors", &self.records.len())
            .field("loaded", &self.loaded_count)
            .field("total_cost", &self.total_cost)
            .finish()
    }
}

impl TakenSectorTree {
    /// Seed the tree with the coarsest loadable cover of the model: the root
    /// at Simple, or at Detailed with its children promoted when it has no
    /// proxy. Seeded sectors get infinite priority.
    pub fn new(scene: Arc<SectorScene>, cost_model: Arc<dyn SectorCostModel>) -> Self {
        let mut tree = Self {
            records: vec![SectorRecord::DISCARDED; scene.sector_count()],
            scene,
            cost_model,
            total_cost: 0.0,
            budgeted_cost: 0.0,
            forced_cost: 0.0,
            loaded_count: 0,
        };
        let root = tree.scene.root_id();
        let plan = if tree.scene.root().has_simple_proxy() {
            tree.plan_simple(root, f64::INFINITY)
        } else {
            tree.plan_detailed(root, f64::INFINITY)
        };
        tree.apply(&plan);
        tree
    }

    /// A tree costed by download size.
    pub fn with_download_cost(scene: Arc<SectorScene>) -> Self {
        Self::new(scene, Arc::new(DownloadSizeCost))
    }

    pub fn scene(&self) -> &Arc<SectorScene> {
        &self.scene
    }

    /// # Panics
    ///
    /// Panics if `id` is not a sector of this model.
    pub fn lod_of(&self, id: SectorId) -> LevelOfDetail {
        self.record(id).lod
    }

    /// # Panics
    ///
    /// Panics if `id` is not a sector of this model.
    pub fn priority_of(&self, id: SectorId) -> f64 {
        self.record(id).priority
    }

    /// Sum of the cost of every loaded sector.
    pub fn total_cost(&self) -> f64 {
        self.total_cost
    }

    /// Cost of loaded sectors at infinite priority.
    pub fn forced_cost(&self) -> f64 {
        self.forced_cost
    }

    /// Cost of loaded sectors at finite priority.
    pub fn budgeted_cost(&self) -> f64 {
        self.budgeted_cost
    }

    /// Number of sectors at Simple or Detailed.
    pub fn wanted_sector_count(&self) -> usize {
        self.loaded_count
    }

    /// Plan for [`mark_detailed`](Self::mark_detailed).
    pub fn plan_detailed(&self, id: SectorId, priority: f64) -> TreePlan {
        let mut planner = Planner::new(self);
        planner.mark_detailed(id, priority);
        planner.finish()
    }

    /// Plan for [`mark_simple`](Self::mark_simple).
    pub fn plan_simple(&self, id: SectorId, priority: f64) -> TreePlan {
        let mut planner = Planner::new(self);
        planner.mark_simple(id, priority);
        planner.finish()
    }

    /// Raise `id` to Detailed, pulling in its ancestors and promoting the
    /// children of every sector that becomes Detailed. Priorities are only
    /// ever raised.
    ///
    /// # Panics
    ///
    /// Panics if `id` is not a sector of this model.
    pub fn mark_detailed(&mut self, id: SectorId, priority: f64) {
        let plan = self.plan_detailed(id, priority);
        self.apply(&plan);
    }

    /// Raise `id` to at least Simple. A Discarded sector is reached by making
    /// its parent Detailed; a loaded sector keeps its level.
    ///
    /// Marking a sector without a proxy is an invariant violation: it panics
    /// in debug builds and does nothing in release builds.
    ///
    /// # Panics
    ///
    /// Panics if `id` is not a sector of this model.
    pub fn mark_simple(&mut self, id: SectorId, priority: f64) {
        let plan = self.plan_simple(id, priority);
        self.apply(&plan);
    }

    /// Commit a plan computed against the current state.
    pub fn apply(&mut self, plan: &TreePlan) {
        for t in &plan.transitions {
            let old = self.records[t.sector as usize];
            debug_assert_eq!(old.lod, t.from, "stale plan for sector {}", t.sector);
            let new = SectorRecord {
                lod: t.to,
                priority: t.priority,
                cost: t.cost,
            };
            self.total_cost += new.cost - old.cost;
            self.budgeted_cost += new.budgeted_cost() - old.budgeted_cost();
            self.forced_cost += new.forced_cost() - old.forced_cost();
            match (old.lod.is_loaded(), new.lod.is_loaded()) {
                (false, true) => self.loaded_count += 1,
                (true, false) => self.loaded_count -= 1,
                _ => {}
            }
            self.records[t.sector as usize] = new;
        }
    }

    /// Every loaded sector, by descending priority then ascending id.
    pub fn to_wanted_sectors(&self, model: ModelId) -> Vec<WantedSector> {
        let mut wanted: Vec<WantedSector> = self
            .records
            .iter()
            .enumerate()
            .filter(|(_, r)| r.lod.is_loaded())
            .map(|(id, r)| WantedSector {
                model,
                sector: id as SectorId,
                lod: r.lod,
                priority: r.priority,
            })
            .collect();
        wanted.sort_by(priority_order);
        wanted
    }

    fn record(&self, id: SectorId) -> &SectorRecord {
        assert!(
            (id as usize) < self.records.len(),
            "sector {id} is not part of a scene with {} sectors",
            self.records.len()
        );
        &self.records[id as usize]
    }

    fn sector(&self, id: SectorId) -> &SectorMetadata {
        self.record(id);
        &self.scene.get_all()[id as usize]
    }

    fn level_cost(&self, id: SectorId, lod: LevelOfDetail) -> f64 {
        // A sector without its own geometry at a level costs nothing to hold.
        self.cost_model.cost(self.sector(id), lod).unwrap_or(0.0)
    }
}

/// Copy-on-write view of the tree used to build a [`TreePlan`].
struct Planner<'a> {
    tree: &'a TakenSectorTree,
    overlay: FxHashMap<SectorId, (LevelOfDetail, f64)>,
    order: Vec<SectorId>,
}

impl<'a> Planner<'a> {
    fn new(tree: &'a TakenSectorTree) -> Self {
        Self {
            tree,
            overlay: FxHashMap::default(),
            order: Vec::new(),
        }
    }

    fn get(&self, id: SectorId) -> (LevelOfDetail, f64) {
        match self.overlay.get(&id) {
            Some(&state) => state,
            None => {
                let r = self.tree.record(id);
                (r.lod, r.priority)
            }
        }
    }

    /// Raise level and priority. A Simple sector held at infinite priority
    /// only as part of a forced cover takes the finite priority of the mark
    /// that upgrades it, so the upgrade is budgeted.
    fn raise(&mut self, id: SectorId, lod: LevelOfDetail, priority: f64) {
        let (current_lod, current_priority) = self.get(id);
        let upgrades_forced_proxy = current_lod == LevelOfDetail::Simple
            && lod == LevelOfDetail::Detailed
            && current_priority.is_infinite()
            && priority.is_finite();
        let next_priority = if upgrades_forced_proxy {
            priority
        } else {
            current_priority.max(priority)
        };
        let next = (current_lod.max(lod), next_priority);
        if next != (current_lod, current_priority) && self.overlay.insert(id, next).is_none() {
            self.order.push(id);
        }
    }

    fn mark_detailed(&mut self, id: SectorId, priority: f64) {
        let (lod, _) = self.get(id);
        if lod == LevelOfDetail::Detailed {
            self.raise(id, lod, priority);
            return;
        }

        let tree = self.tree;
        let mut became_detailed = vec![id];
        for ancestor in tree.scene.ancestors(id) {
            if self.get(ancestor.id).0 == LevelOfDetail::Detailed {
                break;
            }
            became_detailed.push(ancestor.id);
        }
        for &sector in &became_detailed {
            self.raise(sector, LevelOfDetail::Detailed, priority);
        }
        for &sector in &became_detailed {
            self.promote_children(sector, priority);
        }
    }

    /// Give the Discarded children of a Detailed sector a level: Simple when
    /// they have a proxy, otherwise Detailed with their own children promoted.
    fn promote_children(&mut self, id: SectorId, priority: f64) {
        let tree = self.tree;
        let mut stack: Vec<SectorId> = tree.sector(id).children.clone();
        while let Some(child) = stack.pop() {
            if self.get(child).0 != LevelOfDetail::Discarded {
                continue;
            }
            let sector = tree.sector(child);
            if sector.has_simple_proxy() {
                self.raise(child, LevelOfDetail::Simple, priority);
            } else {
                self.raise(child, LevelOfDetail::Detailed, priority);
                stack.extend(sector.children.iter().copied());
            }
        }
    }

    fn mark_simple(&mut self, id: SectorId, priority: f64) {
        let tree = self.tree;
        let sector = tree.sector(id);
        debug_assert!(
            sector.has_simple_proxy(),
            "sector {id} has no coarse proxy and cannot be Simple"
        );
        if !sector.has_simple_proxy() {
            return;
        }
        if self.get(id).0 == LevelOfDetail::Discarded {
            if let Some(parent) = sector.parent {
                self.mark_detailed(parent, priority);
            }
        }
        self.raise(id, LevelOfDetail::Simple, priority);
    }

    fn finish(self) -> TreePlan {
        let mut plan = TreePlan::default();
        for id in self.order {
            let (lod, priority) = self.overlay[&id];
            let old = *self.tree.record(id);
            let new = SectorRecord {
                lod,
                priority,
                cost: self.tree.level_cost(id, lod),
            };
            plan.cost_delta += new.cost - old.cost;
            plan.budgeted_delta += new.budgeted_cost() - old.budgeted_cost();
            plan.transitions.push(LodTransition {
                sector: id,
                from: old.lod,
                to: lod,
                priority,
                cost: new.cost,
            });
        }
        plan
    }
}
