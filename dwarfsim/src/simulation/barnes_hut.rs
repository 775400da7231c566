//! # Barnes–Hut Octree (3D)
//!
//! This module implements a **3D Barnes–Hut octree** for approximating the
//! self-gravity of the dwarf particles. The naive `O(N²)` all-pairs sum is
//! replaced by an approximate `O(N log N)` walk that treats distant groups of
//! particles as a single pseudo-particle.
//!
//! ## Core Concepts
//!
//! - The space around the particles is recursively subdivided into 8
//!   regions (octants). Each region becomes a node of the octree.
//! - Nodes live in a single arena (`Vec<TreeNode>`) and refer to their
//!   children by index.
//! - A node is split while it holds more than [`LEAF_CAPACITY`] particles.
//!   At [`MAX_DEPTH`] splitting stops and the node becomes a *bucket leaf*,
//!   which keeps coincident or nearly coincident particles from recursing
//!   forever.
//! - Each node stores:
//!   - total mass and center of mass (COM) of its subtree
//!   - the quadrupole tensor about the COM (when corrections are enabled)
//!   - its bounding box and critical opening radius `rcrit`
//!
//! ## Lifetime
//!
//! A tree is built from scratch for every force evaluation and is read-only
//! while it is walked, so per-particle walks can run in parallel.
//!
//! ## Opening criteria
//!
//! For an internal node of edge length `s` and accuracy parameter `theta`:
//!
//! | criterion       | `rcrit`                                  |
//! |-----------------|------------------------------------------|
//! | `Exact`         | infinite (never admitted)                |
//! | `Bh86`          | `s / theta`                              |
//! | `NewCriterion`  | `s / theta + |com - center|`             |
//! | `Sw93`          | `max(bmax, s) / theta`                   |
//!
//! `bmax` is the distance from the COM to the farthest corner of the box.
//! A node is admitted as a single source for a particle at distance `d` from
//! its COM when `d > rcrit + drift`, where `drift` is the distance the
//! particle sweeps during one step (only non-zero for `Sw93`). A node whose
//! box contains the particle is never admitted.

use crate::simulation::engine::{Criterion, Engine};
use crate::simulation::states::{NMat3, NVec3, System3};

/// Depth at which subdivision stops and nodes become bucket leaves
pub const MAX_DEPTH: usize = 32;

/// Nodes holding at most this many particles are not split further
pub const LEAF_CAPACITY: usize = 1;

/// A single octree node.
///
/// Each node represents a cubic region of space that holds either:
/// - child nodes (internal node), or
/// - a contiguous run of particle indices (leaf node), usually one.
///
/// The particle run is a slice of [`BarnesHutTree3::body_order`] given by
/// `body_start..body_start + body_count`; it is valid for internal nodes too
/// and then covers every particle in the subtree.
#[derive(Debug, Clone)]
pub struct TreeNode {
    pub mass: f64,
    pub com: NVec3,
    pub quad: NMat3,
    pub bbox_min: NVec3,
    pub bbox_max: NVec3,
    pub rcrit: f64,
    pub depth: usize,
    pub children: [Option<usize>; 8], // indices into BarnesHutTree3::nodes
    pub body_start: usize,
    pub body_count: usize,
}

impl TreeNode {
    fn new(bbox_min: NVec3, bbox_max: NVec3, depth: usize, body_start: usize, body_count: usize) -> Self {
        Self {
            mass: 0.0,
            com: NVec3::zeros(),
            quad: NMat3::zeros(),
            bbox_min,
            bbox_max,
            rcrit: 0.0,
            depth,
            children: [None; 8],
            body_start,
            body_count,
        }
    }

    pub fn is_leaf(&self) -> bool {
        self.children.iter().all(|c| c.is_none())
    }

    /// Edge length of the (cubic) box
    pub fn size(&self) -> f64 {
        let s = self.bbox_max - self.bbox_min;
        s.x.max(s.y).max(s.z)
    }

    pub fn center(&self) -> NVec3 {
        (self.bbox_min + self.bbox_max) * 0.5
    }

    /// Inclusive containment test
    pub fn contains(&self, p: &NVec3) -> bool {
        (0..3).all(|k| p[k] >= self.bbox_min[k] && p[k] <= self.bbox_max[k])
    }
}

/// A complete 3D Barnes–Hut octree built over the particle system.
///
/// This structure owns:
/// - a vector of all octree nodes (`nodes`), root first
/// - the particle indices ordered so that every node's particles are
///   contiguous (`body_order`)
/// - the engine settings it was built for
pub struct BarnesHutTree3 {
    pub nodes: Vec<TreeNode>,
    pub root: usize,
    body_order: Vec<usize>,
    engine: Engine,
}

impl BarnesHutTree3 {
    /// Build an octree from the current state of the system.
    ///
    /// This:
    /// 1. Computes a cubic bounding box that encloses all particles.
    /// 2. Creates a root node covering that box.
    /// 3. Recursively partitions the particles into octants, up to
    ///    [`MAX_DEPTH`].
    /// 4. Computes mass, COM and (optionally) quadrupole moments bottom-up.
    /// 5. Sets every internal node's critical radius for `engine.criterion`.
    pub fn build(sys: &System3, engine: &Engine) -> Self {
        Self::build_with_max_depth(sys, engine, MAX_DEPTH)
    }

    /// Same as [`BarnesHutTree3::build`] with an explicit depth limit
    pub fn build_with_max_depth(sys: &System3, engine: &Engine, max_depth: usize) -> Self {
        let n = sys.particles.len();
        let mut tree = BarnesHutTree3 {
            nodes: Vec::new(),
            root: 0,
            body_order: (0..n).collect(),
            engine: *engine,
        };
        if n == 0 {
            return tree;
        }

        let (bbox_min, bbox_max) = compute_global_bbox(sys);
        tree.nodes.push(TreeNode::new(bbox_min, bbox_max, 0, 0, n));

        tree.split_node(tree.root, sys, max_depth);
        tree.compute_moments(sys, tree.root);

        for node in tree.nodes.iter_mut().filter(|node| !node.is_leaf()) {
            node.rcrit = critical_radius(node, engine);
        }

        tree
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Deepest level reached by any node
    pub fn depth(&self) -> usize {
        self.nodes.iter().map(|n| n.depth).max().unwrap_or(0)
    }

    /// Particle indices held by (or below) a node
    pub fn bodies_of(&self, node_idx: usize) -> &[usize] {
        let node = &self.nodes[node_idx];
        &self.body_order[node.body_start..node.body_start + node.body_count]
    }

    /// Whether the node would be treated as a single source for a particle at
    /// `pos` that sweeps `drift` during the step
    pub fn admits(&self, node_idx: usize, pos: &NVec3, drift: f64) -> bool {
        let node = &self.nodes[node_idx];
        if node.is_leaf() || node.contains(pos) {
            return false;
        }
        let reach = node.rcrit + drift;
        (node.com - pos).norm_squared() > reach * reach
    }

    /// Net self-gravity acceleration on particle `i`.
    ///
    /// - Traverses the octree starting from the root.
    /// - Admitted nodes contribute their monopole (and quadrupole, if
    ///   enabled) at the COM.
    /// - Leaves contribute exact softened particle–particle terms, skipping
    ///   particle `i` itself.
    ///
    /// # Parameters
    /// - `i`    : Index of the particle in `sys.particles`.
    /// - `sys`  : The system the tree was built from.
    /// - `drift`: Distance particle `i` sweeps during the step, widening
    ///   every node's critical radius for this walk.
    pub fn force_on_body(&self, i: usize, sys: &System3, drift: f64) -> NVec3 {
        let mut acc = NVec3::zeros();
        if self.nodes.is_empty() {
            return acc;
        }
        let pos_i = sys.particles[i].x;
        self.traverse_node(self.root, i, &pos_i, drift, sys, &mut acc);
        acc
    }

    // helpers ==============================================================================

    /// Partition a node's particles into its octants and recurse.
    ///
    /// The node's slice of `body_order` is stably sorted by octant, so each
    /// child again owns a contiguous run and the order within an octant is
    /// the original particle order. Nodes at or below `LEAF_CAPACITY`
    /// particles, or at `max_depth`, stay leaves.
    fn split_node(&mut self, node_idx: usize, sys: &System3, max_depth: usize) {
        let node = &self.nodes[node_idx];
        let (start, count, depth) = (node.body_start, node.body_count, node.depth);
        let (bbox_min, bbox_max) = (node.bbox_min, node.bbox_max);

        if count <= LEAF_CAPACITY || depth >= max_depth {
            return;
        }

        let bodies = &mut self.body_order[start..start + count];
        bodies.sort_by_key(|&b| child_index_for_point(&sys.particles[b].x, &bbox_min, &bbox_max));

        let mut counts = [0usize; 8];
        for &b in bodies.iter() {
            counts[child_index_for_point(&sys.particles[b].x, &bbox_min, &bbox_max)] += 1;
        }

        let mut offset = start;
        for (child_idx, &run) in counts.iter().enumerate() {
            if run == 0 {
                continue;
            }
            let (cmin, cmax) = child_bbox(&bbox_min, &bbox_max, child_idx);
            let new_idx = self.nodes.len();
            self.nodes.push(TreeNode::new(cmin, cmax, depth + 1, offset, run));
            self.nodes[node_idx].children[child_idx] = Some(new_idx);

            self.split_node(new_idx, sys, max_depth);
            offset += run;
        }
    }

    /// Recursively compute mass, center of mass and quadrupole moment.
    ///
    /// Leaves sum their particles directly. Internal nodes combine their
    /// children, shifting each child's quadrupole to the parent COM with the
    /// parallel-axis term `m (3 d dᵀ - |d|² I)`, `d = com_child - com`.
    fn compute_moments(&mut self, sys: &System3, node_idx: usize) {
        let children = self.nodes[node_idx].children; // [Option<usize>; 8] is Copy
        let use_quad = self.engine.use_quad;

        let mut mass = 0.0;
        let mut weighted = NVec3::zeros();
        let mut quad = NMat3::zeros();

        if self.nodes[node_idx].is_leaf() {
            for &b in self.bodies_of(node_idx) {
                let p = &sys.particles[b];
                mass += p.m;
                weighted += p.x * p.m;
            }
            let com = if mass > 0.0 { weighted / mass } else { weighted };
            if use_quad {
                for &b in self.bodies_of(node_idx) {
                    let p = &sys.particles[b];
                    quad += point_quadrupole(p.m, &(p.x - com));
                }
            }
            let node = &mut self.nodes[node_idx];
            node.mass = mass;
            node.com = com;
            node.quad = quad;
            return;
        }

        for &child_idx in children.iter().flatten() {
            // recurse first
            self.compute_moments(sys, child_idx);
            let cn = &self.nodes[child_idx];
            mass += cn.mass;
            weighted += cn.com * cn.mass;
        }
        let com = if mass > 0.0 { weighted / mass } else { weighted };

        if use_quad {
            for &child_idx in children.iter().flatten() {
                let cn = &self.nodes[child_idx];
                quad += cn.quad + point_quadrupole(cn.mass, &(cn.com - com));
            }
        }

        // finally write back to this node
        let node = &mut self.nodes[node_idx];
        node.mass = mass;
        node.com = com;
        node.quad = quad;
    }

    /// Recursively traverse a subtree to accumulate the acceleration on
    /// particle `body_idx` at `pos_i`.
    ///
    /// - **Empty node** (`mass == 0.0`): no contribution.
    /// - **Leaf**: exact softened interaction with each of its particles,
    ///   except `body_idx` itself.
    /// - **Internal node**: if [`BarnesHutTree3::admits`] it, add its
    ///   aggregate contribution, otherwise visit the children.
    fn traverse_node(&self, node_idx: usize, body_idx: usize, pos_i: &NVec3, drift: f64, sys: &System3, acc: &mut NVec3) {
        let node = &self.nodes[node_idx];
        let eps2 = self.engine.eps2;

        if node.mass == 0.0 {
            return;
        }

        if node.is_leaf() {
            for &bidx in self.bodies_of(node_idx) {
                if bidx == body_idx {
                    continue; // don't self-interact
                }
                let b = &sys.particles[bidx];
                *acc += monopole(b.m, &(b.x - pos_i), eps2);
            }
            return;
        }

        if self.admits(node_idx, pos_i, drift) {
            let dr = node.com - pos_i;
            *acc += monopole(node.mass, &dr, eps2);
            if self.engine.use_quad {
                *acc += quadrupole_correction(&node.quad, &dr, eps2);
            }
        } else {
            for child_idx in node.children.iter().flatten() {
                self.traverse_node(*child_idx, body_idx, pos_i, drift, sys, acc);
            }
        }
    }
}

// helpers ===========================================================================

/// Softened point-mass acceleration towards a source at offset `dr`
fn monopole(mass: f64, dr: &NVec3, eps2: f64) -> NVec3 {
    let dist2 = dr.norm_squared() + eps2;
    let inv_r = dist2.sqrt().recip();
    let inv_r3 = inv_r * inv_r * inv_r;
    dr * (mass * inv_r3)
}

/// Quadrupole term for a source at offset `dr` (from the particle to the
/// COM): `-Q dr / r^5 + 5/2 (drᵀ Q dr) dr / r^7`, with softened `r`
fn quadrupole_correction(quad: &NMat3, dr: &NVec3, eps2: f64) -> NVec3 {
    let dr2 = dr.norm_squared() + eps2;
    let drab = dr2.sqrt();
    let dr5inv = 1.0 / (dr2 * dr2 * drab);

    let qdr = quad * dr;
    let drqdr = dr.dot(&qdr);
    dr * (2.5 * drqdr * dr5inv / dr2) - qdr * dr5inv
}

/// Traceless quadrupole of a point mass at offset `s`: `m (3 s sᵀ - |s|² I)`
fn point_quadrupole(mass: f64, s: &NVec3) -> NMat3 {
    (s * s.transpose() * 3.0 - NMat3::identity() * s.norm_squared()) * mass
}

/// Critical opening radius of an internal node for the engine's criterion
fn critical_radius(node: &TreeNode, engine: &Engine) -> f64 {
    let psize = node.size();
    match engine.criterion {
        Criterion::Exact => f64::INFINITY,
        Criterion::Bh86 => psize / engine.theta,
        Criterion::NewCriterion => psize / engine.theta + (node.com - node.center()).norm(),
        Criterion::Sw93 => farthest_corner_distance(node).max(psize) / engine.theta,
    }
}

/// Distance from the node's COM to the farthest corner of its box
fn farthest_corner_distance(node: &TreeNode) -> f64 {
    let mut bmax2 = 0.0;
    for k in 0..3 {
        let d = node.com[k] - node.bbox_min[k];
        let extent = node.bbox_max[k] - node.bbox_min[k];
        let far = d.max(extent - d);
        bmax2 += far * far;
    }
    bmax2.sqrt()
}

/// Compute a global cubic bounding box that encloses all particles.
///
/// Finds the axis-aligned min and max of every position, then expands the
/// box into a **cube** around its center using the largest half-extent.
/// Using a cube keeps the node "size" in the opening criteria well defined.
fn compute_global_bbox(sys: &System3) -> (NVec3, NVec3) {
    let mut min = NVec3::repeat(f64::INFINITY);
    let mut max = NVec3::repeat(f64::NEG_INFINITY);

    for p in &sys.particles {
        min = min.inf(&p.x);
        max = max.sup(&p.x);
    }

    // Expand to a cube so size is well-defined, padded so rounding of the
    // center never leaves an extreme particle outside the root
    let center = (min + max) * 0.5;
    let half = (max - min) * 0.5;
    let max_half = half.x.max(half.y).max(half.z);
    let max_half = NVec3::repeat(max_half * (1.0 + 1e-12) + f64::MIN_POSITIVE);

    (center - max_half, center + max_half)
}

/// Compute the octant index for a point within a node's bounding box.
///
/// The index is encoded using 3 bits:
///
/// - Bit 0 (value 1): X axis — 0 for x < center.x, 1 for x >= center.x
/// - Bit 1 (value 2): Y axis — 0 for y < center.y, 1 for y >= center.y
/// - Bit 2 (value 4): Z axis — 0 for z < center.z, 1 for z >= center.z
///
/// A point exactly on a splitting plane goes to the upper octant.
fn child_index_for_point(p: &NVec3, bbox_min: &NVec3, bbox_max: &NVec3) -> usize {
    let center = (bbox_min + bbox_max) * 0.5;
    let mut idx = 0;

    if p.x >= center.x { idx |= 1; } // bit 0
    if p.y >= center.y { idx |= 2; } // bit 1
    if p.z >= center.z { idx |= 4; } // bit 2

    idx
}

/// Compute the axis-aligned bounding box for a given child octant, using
/// the same 3-bit encoding as `child_index_for_point`.
fn child_bbox(parent_min: &NVec3, parent_max: &NVec3, child_idx: usize) -> (NVec3, NVec3) {
    let center = (parent_min + parent_max) * 0.5;

    let mut min = *parent_min;
    let mut max = *parent_max;

    for axis in 0..3 {
        if (child_idx >> axis) & 1 == 0 {
            max[axis] = center[axis];
        } else {
            min[axis] = center[axis];
        }
    }

    (min, max)
}
