//! Immutable spatial index over one model's sector hierarchy.
//!
//! Sectors live in a dense arena indexed by [`SectorId`]. All spatial queries
//! are depth-first and prune a subtree as soon as its bounds fail the
//! predicate: a parent's bounds enclose its children, so pruning is sound.

use std::collections::VecDeque;

use glam::{Mat4, Vec3};
use tessera_math::{Aabb, Frustum};

use crate::{SceneError, SectorDescriptor, SectorId, SectorMetadata};

/// The sector tree of one loaded model.
///
/// Built once from descriptors and never mutated, so it can be shared
/// between threads behind an `Arc` without locking.
#[derive(Clone, Debug)]
pub struct SectorScene {
    /// Dense array where `index == SectorMetadata.id`.
    sectors: Vec<SectorMetadata>,
    root: SectorId,
    max_depth: u32,
}

impl SectorScene {
    /// Link a flat descriptor list into a tree.
    ///
    /// Ids must be dense (`0..len`), there must be exactly one root, every
    /// parent must exist, every sector must be reachable from the root, and
    /// each path must extend its parent's path.
    pub fn from_descriptors(descriptors: Vec<SectorDescriptor>) -> Result<Self, SceneError> {
        if descriptors.is_empty() {
            return Err(SceneError::Empty);
        }
        let count = descriptors.len();

        let mut slots: Vec<Option<SectorDescriptor>> = vec![None; count];
        for d in descriptors {
            let index = d.id as usize;
            if index >= count {
                return Err(SceneError::IdOutOfRange { id: d.id, count });
            }
            if slots[index].is_some() {
                return Err(SceneError::DuplicateId(d.id));
            }
            slots[index] = Some(d);
        }
        // Every slot is filled: `count` unique ids, all below `count`.
        let descriptors: Vec<SectorDescriptor> = slots.into_iter().flatten().collect();

        let mut root = None;
        let mut children: Vec<Vec<SectorId>> = vec![Vec::new(); count];
        for d in &descriptors {
            match d.parent {
                None => {
                    if let Some(first) = root {
                        return Err(SceneError::MultipleRoots {
                            first,
                            second: d.id,
                        });
                    }
                    root = Some(d.id);
                }
                Some(parent) => {
                    if parent as usize >= count || parent == d.id {
                        return Err(SceneError::UnknownParent {
                            sector: d.id,
                            parent,
                        });
                    }
                    children[parent as usize].push(d.id);
                }
            }
        }
        let root = root.ok_or(SceneError::NoRoot)?;

        // Breadth-first from the root assigns depths and detects sectors
        // whose parent chain never reaches it.
        let mut depth: Vec<Option<u32>> = vec![None; count];
        depth[root as usize] = Some(0);
        let mut queue = VecDeque::from([root]);
        while let Some(id) = queue.pop_front() {
            let d = depth[id as usize].unwrap_or_default();
            for &child in &children[id as usize] {
                depth[child as usize] = Some(d + 1);
                queue.push_back(child);
            }
        }
        if let Some(index) = depth.iter().position(Option::is_none) {
            return Err(SceneError::Unreachable(index as SectorId));
        }

        for d in &descriptors {
            if let Some(parent) = d.parent {
                let parent_path = &descriptors[parent as usize].path;
                if !d.path.starts_with(parent_path.as_str()) || d.path.len() <= parent_path.len() {
                    return Err(SceneError::PathMismatch {
                        sector: d.id,
                        path: d.path.clone(),
                        parent_path: parent_path.clone(),
                    });
                }
                let parent_bounds = descriptors[parent as usize].bounds;
                if !parent_bounds.contains(&d.bounds) {
                    tracing::warn!(
                        "Sector {} bounds exceed parent {} bounds; spatial pruning may skip it",
                        d.id,
                        parent
                    );
                }
            }
        }

        let mut max_depth = 0;
        let sectors = descriptors
            .into_iter()
            .zip(children)
            .zip(depth)
            .map(|((d, mut kids), depth)| {
                kids.sort_unstable();
                let depth = depth.unwrap_or_default();
                max_depth = max_depth.max(depth);
                SectorMetadata {
                    id: d.id,
                    path: d.path,
                    depth,
                    bounds: d.bounds,
                    parent: d.parent,
                    children: kids,
                    detailed_cost: d.detailed_cost,
                    simple_cost: d.simple_cost,
                    quad_size: d.quad_size,
                }
            })
            .collect();

        Ok(Self {
            sectors,
            root,
            max_depth,
        })
    }

    pub fn get_by_id(&self, id: SectorId) -> Option<&SectorMetadata> {
        self.sectors.get(id as usize)
    }

    /// All sectors in id order.
    pub fn get_all(&self) -> &[SectorMetadata] {
        &self.sectors
    }

    pub fn root(&self) -> &SectorMetadata {
        &self.sectors[self.root as usize]
    }

    pub fn root_id(&self) -> SectorId {
        self.root
    }

    pub fn sector_count(&self) -> usize {
        self.sectors.len()
    }

    pub fn max_depth(&self) -> u32 {
        self.max_depth
    }

    /// Bounds of the whole model (the root's bounds).
    pub fn bounds(&self) -> Aabb {
        self.root().bounds
    }

    /// Walk from `id`'s parent up to the root. Empty for the root itself
    /// and for unknown ids.
    pub fn ancestors(&self, id: SectorId) -> Ancestors<'_> {
        Ancestors {
            scene: self,
            next: self.get_by_id(id).and_then(|s| s.parent),
        }
    }

    /// Sectors whose bounds contain `p` (model space).
    pub fn sectors_containing_point(&self, p: Vec3) -> Vec<&SectorMetadata> {
        self.traverse_pruned(|bounds| bounds.contains_point(p))
    }

    /// Sectors whose bounds overlap `aabb` (model space).
    pub fn sectors_intersecting(&self, aabb: &Aabb) -> Vec<&SectorMetadata> {
        self.traverse_pruned(|bounds| bounds.intersects(aabb))
    }

    /// Sectors whose bounds intersect the frustum of `projection * view`,
    /// where `view` maps model space into camera space.
    pub fn sectors_intersecting_frustum(
        &self,
        projection: &Mat4,
        view: &Mat4,
    ) -> Vec<&SectorMetadata> {
        let frustum = Frustum::from_projection_view(projection, view);
        self.traverse_pruned(|bounds| frustum.intersects_aabb(bounds))
    }

    /// Depth-first pre-order traversal that skips the subtree of any sector
    /// failing `accept`.
    fn traverse_pruned<F>(&self, accept: F) -> Vec<&SectorMetadata>
    where
        F: Fn(&Aabb) -> bool,
    {
        let mut out = Vec::new();
        let mut stack = vec![self.root];
        while let Some(id) = stack.pop() {
            let sector = &self.sectors[id as usize];
            if !accept(&sector.bounds) {
                continue;
            }
            out.push(sector);
            stack.extend(sector.children.iter().rev());
        }
        out
    }
}

/// Iterator over a sector's ancestors, nearest first.
pub struct Ancestors<'a> {
    scene: &'a SectorScene,
    next: Option<SectorId>,
}

impl<'a> Iterator for Ancestors<'a> {
    type Item = &'a SectorMetadata;

    fn next(&mut self) -> Option<Self::Item> {
        let sector = self.scene.get_by_id(self.next?)?;
        self.next = sector.parent;
        Some(sector)
    }
}
