//! Procedurally generated sector scenes for demos, benchmarks and tests.

use std::collections::VecDeque;

use glam::Vec3;
use tessera_math::Aabb;

use crate::{SceneError, SectorDescriptor, SectorId, SectorScene};

/// Parameters for a uniformly subdivided octree model.
#[derive(Clone, Debug)]
pub struct OctreeParams {
    /// Number of subdivision levels below the root (0 = root only).
    pub depth: u32,
    pub center: Vec3,
    pub half_extent: f32,
    /// Detailed download size of every sector.
    pub detailed_cost: f64,
    /// Proxy size as a fraction of the detailed size.
    pub simple_cost_ratio: f64,
    /// Sectors shallower than this depth have no coarse proxy.
    pub proxy_min_depth: u32,
}

impl Default for OctreeParams {
    fn default() -> Self {
        Self {
            depth: 3,
            center: Vec3::ZERO,
            half_extent: 512.0,
            detailed_cost: 256.0 * 1024.0,
            simple_cost_ratio: 0.05,
            proxy_min_depth: 0,
        }
    }
}

/// Build a complete octree. Ids are assigned breadth-first, so the root is 0
/// and the scene holds `(8^(depth+1) - 1) / 7` sectors.
pub fn octree(params: &OctreeParams) -> SectorScene {
    let mut descriptors = Vec::new();
    let root_bounds = Aabb::from_center_half_extents(params.center, Vec3::splat(params.half_extent));
    let mut frontier: VecDeque<(SectorId, Aabb, u32)> = VecDeque::from([(0, root_bounds, 0)]);
    descriptors.push(octree_descriptor(params, 0, None, "0/".to_string(), root_bounds, 0));

    let mut next_id: SectorId = 1;
    while let Some((parent, bounds, depth)) = frontier.pop_front() {
        if depth >= params.depth {
            continue;
        }
        let parent_path = descriptors[parent as usize].path.clone();
        let half = bounds.extents() * 0.5;
        for octant in 0..8u32 {
            let offset = Vec3::new(
                if octant & 1 == 0 { -half.x } else { half.x },
                if octant & 2 == 0 { -half.y } else { half.y },
                if octant & 4 == 0 { -half.z } else { half.z },
            );
            let child_bounds = Aabb::from_center_half_extents(bounds.center() + offset, half);
            let id = next_id;
            next_id += 1;
            let path = format!("{parent_path}{octant}/");
            descriptors.push(octree_descriptor(
                params,
                id,
                Some(parent),
                path,
                child_bounds,
                depth + 1,
            ));
            frontier.push_back((id, child_bounds, depth + 1));
        }
    }

    // Generated descriptors are valid by construction.
    match SectorScene::from_descriptors(descriptors) {
        Ok(scene) => scene,
        Err(e) => unreachable!("synthetic octree is malformed: {e}"),
    }
}

fn octree_descriptor(
    params: &OctreeParams,
    id: SectorId,
    parent: Option<SectorId>,
    path: String,
    bounds: Aabb,
    depth: u32,
) -> SectorDescriptor {
    let simple_cost = (depth >= params.proxy_min_depth)
        .then_some(params.detailed_cost * params.simple_cost_ratio);
    SectorDescriptor {
        id,
        path,
        parent,
        bounds,
        detailed_cost: Some(params.detailed_cost),
        simple_cost,
        quad_size: bounds.size().max_element() / 16.0,
    }
}

/// Build a scene from a parent table (`parents[id]`, `None` for the root).
///
/// Bounds are laid out automatically: the root spans the unit cube and each
/// child takes an equal slice of its parent along x. `costs(id)` returns the
/// `(detailed, simple)` cost descriptors.
pub fn tree_from_parents<F>(parents: &[Option<SectorId>], costs: F) -> Result<SectorScene, SceneError>
where
    F: Fn(SectorId) -> (Option<f64>, Option<f64>),
{
    let count = parents.len();
    let mut children: Vec<Vec<SectorId>> = vec![Vec::new(); count];
    let mut root = None;
    for (id, parent) in parents.iter().enumerate() {
        match parent {
            Some(p) if (*p as usize) < count => children[*p as usize].push(id as SectorId),
            Some(_) => {}
            None => root = root.or(Some(id as SectorId)),
        }
    }

    let mut layout: Vec<Option<(String, Aabb)>> = vec![None; count];
    if let Some(root) = root {
        let mut stack = vec![(root, format!("{root}/"), Aabb::new(Vec3::ZERO, Vec3::ONE))];
        while let Some((id, path, bounds)) = stack.pop() {
            let kids = &children[id as usize];
            let slice = bounds.size().x / kids.len().max(1) as f32;
            for (i, &child) in kids.iter().enumerate() {
                if layout[child as usize].is_some() {
                    continue;
                }
                let min = Vec3::new(bounds.min.x + slice * i as f32, bounds.min.y, bounds.min.z);
                let max = Vec3::new(min.x + slice, bounds.max.y, bounds.max.z);
                stack.push((child, format!("{path}{child}/"), Aabb::new(min, max)));
            }
            layout[id as usize] = Some((path, bounds));
        }
    }

    let descriptors = parents
        .iter()
        .enumerate()
        .map(|(index, parent)| {
            let id = index as SectorId;
            // Unreachable sectors get a placeholder layout; validation rejects them.
            let (path, bounds) = layout[index]
                .clone()
                .unwrap_or_else(|| (format!("?{id}/"), Aabb::new(Vec3::ZERO, Vec3::ONE)));
            let (detailed_cost, simple_cost) = costs(id);
            SectorDescriptor {
                id,
                path,
                parent: *parent,
                bounds,
                detailed_cost,
                simple_cost,
                quad_size: bounds.size().max_element() / 16.0,
            }
        })
        .collect();
    SectorScene::from_descriptors(descriptors)
}
