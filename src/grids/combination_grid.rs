use std::collections::hash_map::Entry;

use rayon::prelude::*;
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};

use crate::bounded_sum_iterator::BoundedSumIterator;
use crate::errors::SGError;
use crate::multi_index_manipulation::combination_coefficients;
use crate::one_dimensional_nodes::{num_points, RuleCache, UnivariateRule, MAX_LEVEL};

/// Ceiling on the estimated number of tensor-product points expanded
/// across all combination terms, before coincident points are merged.
/// Requests estimated above this fail with `ResourceLimitExceeded`
/// instead of attempting the expansion.
pub const MAX_EXPANDED_POINTS: usize = 1 << 24;

/// Coincident-node tolerance, relative to the widest axis of the box.
const RELATIVE_NODE_TOLERANCE: f64 = 1e-10;

/// Combination terms expanded per parallel batch. Peak memory holds one
/// batch of term grids rather than the whole expansion.
const EXPANSION_BATCH: usize = 64;

#[derive(Clone, Default, Debug, Serialize, Deserialize)]
pub struct BoundingBox
{
    pub lower: Vec<f64>,
    pub upper: Vec<f64>,
}
impl BoundingBox
{
    pub fn new(lower: &[f64], upper: &[f64]) -> Self
    {
        Self { lower: lower.to_owned(), upper: upper.to_owned() }
    }

    /// Box with the same [a, b] bounds on every axis.
    pub fn uniform(ndim: usize, a: f64, b: f64) -> Self
    {
        Self { lower: vec![a; ndim], upper: vec![b; ndim] }
    }

    #[inline]
    pub fn ndim(&self) -> usize
    {
        self.lower.len()
    }

    #[inline]
    pub fn width(&self, dim: usize) -> f64
    {
        self.upper[dim] - self.lower[dim]
    }

    pub fn max_width(&self) -> f64
    {
        let mut width = 0.0_f64;
        for d in 0..self.ndim()
        {
            width = width.max(self.width(d));
        }
        width
    }

    ///
    /// Volume of hypercube (width(dim1)*...*width(dim_n))
    ///
    pub fn volume(&self) -> f64
    {
        let mut volume = 1.0;
        for d in 0..self.ndim()
        {
            volume *= self.width(d);
        }
        volume
    }
}

/// One selected tensor-product rule: its signed combination coefficient
/// and a per-dimension view into the rule cache. Transient, consumed by
/// the expansion pass.
struct CombinationTerm<'a>
{
    coefficient: f64,
    rules: Vec<&'a UnivariateRule>,
}

///
/// Quadrature nodes and weights over a box, built with the Smolyak
/// combination technique from nested Clenshaw-Curtis rules. Construction
/// validates eagerly, expands every combination term with a nonzero
/// coefficient, and merges the weight contributions of coincident nodes,
/// so the stored node set is duplicate-free. Immutable once built.
///
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SparseQuadratureGrid
{
    ndim: usize,
    level: u32,
    bounding_box: BoundingBox,
    nodes: Vec<f64>,
    weights: Vec<f64>,
}

impl SparseQuadratureGrid
{
    ///
    /// Build the sparse grid of `level` over `bounding_box` in `ndim`
    /// dimensions. The admissible index set is `{k : |k|_1 <= level}`.
    ///
    pub fn new(ndim: usize, level: u32, bounding_box: BoundingBox) -> Result<Self, SGError>
    {
        validate(ndim, level, &bounding_box)?;

        let indices: Vec<u32> = BoundedSumIterator::new(ndim, level).flatten().collect();
        let coefficients = combination_coefficients(&indices, ndim);
        let terms: Vec<(&[u32], i64)> = indices.chunks_exact(ndim)
            .zip(coefficients)
            .filter(|(_, c)| *c != 0)
            .collect();

        // Pre-flight size estimate across the active terms, before any
        // rule generation or expansion.
        let mut estimate: u128 = 0;
        for (index, _) in &terms
        {
            estimate += index.iter().map(|&l| num_points(l) as u128).product::<u128>();
        }
        if estimate > MAX_EXPANDED_POINTS as u128
        {
            return Err(SGError::ResourceLimitExceeded);
        }

        // Fill the rule cache up front; expansion then reads it from
        // multiple threads without synchronization.
        let mut cache = RuleCache::default();
        for (index, _) in &terms
        {
            for (d, &l) in index.iter().enumerate()
            {
                cache.rule(l, bounding_box.lower[d], bounding_box.upper[d])?;
            }
        }
        let expansion: Vec<CombinationTerm> = terms.iter().map(|&(index, coefficient)| CombinationTerm
        {
            coefficient: coefficient as f64,
            // prefilled above, so the lookups cannot miss
            rules: index.iter().enumerate()
                .map(|(d, &l)| cache.get(l, bounding_box.lower[d], bounding_box.upper[d]).unwrap())
                .collect(),
        }).collect();

        // Expand terms in parallel batches, then merge sequentially in
        // term order so the accumulated weights are reproducible.
        let inv_eps = (RELATIVE_NODE_TOLERANCE * bounding_box.max_width()).recip();
        let mut node_map: FxHashMap<Vec<i64>, usize> = FxHashMap::default();
        let mut nodes: Vec<f64> = Vec::new();
        let mut weights: Vec<f64> = Vec::new();
        for batch in expansion.chunks(EXPANSION_BATCH)
        {
            let expanded: Vec<(Vec<f64>, Vec<f64>)> = batch.par_iter()
                .map(|term| expand_term(term, ndim))
                .collect();
            for (term_nodes, term_weights) in &expanded
            {
                for (node, &weight) in term_nodes.chunks_exact(ndim).zip(term_weights)
                {
                    let key: Vec<i64> = node.iter().map(|&x| (x * inv_eps).round() as i64).collect();
                    match node_map.entry(key)
                    {
                        Entry::Occupied(entry) =>
                        {
                            weights[*entry.get()] += weight;
                        }
                        Entry::Vacant(entry) =>
                        {
                            entry.insert(nodes.len() / ndim);
                            nodes.extend_from_slice(node);
                            weights.push(weight);
                        }
                    }
                }
            }
        }

        Ok(Self { ndim, level, bounding_box, nodes, weights })
    }

    ///
    /// Build the grid over the box [a, b]^ndim.
    ///
    pub fn uniform(ndim: usize, level: u32, a: f64, b: f64) -> Result<Self, SGError>
    {
        Self::new(ndim, level, BoundingBox::uniform(ndim, a, b))
    }

    /// Number of grid nodes.
    pub fn len(&self) -> usize
    {
        self.nodes.len() / self.ndim
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    ///
    /// Number of dimensions
    ///
    pub fn ndim(&self) -> usize
    {
        self.ndim
    }

    /// Sparse level the grid was built for.
    pub fn level(&self) -> u32
    {
        self.level
    }

    pub fn bounding_box(&self) -> &BoundingBox
    {
        &self.bounding_box
    }

    ///
    /// Flat node coordinates (size = `ndim` * len()), already mapped onto
    /// the bounding box. Chunk by `ndim` to walk the nodes.
    ///
    pub fn nodes(&self) -> &[f64]
    {
        &self.nodes
    }

    /// Coordinates of node `index`.
    pub fn node(&self, index: usize) -> &[f64]
    {
        &self.nodes[index * self.ndim..(index + 1) * self.ndim]
    }

    /// Quadrature weight per node, parallel to `nodes()`.
    pub fn weights(&self) -> &[f64]
    {
        &self.weights
    }

    ///
    /// Compute integral over grid from values evaluated at the nodes, in
    /// node order.
    ///
    pub fn integral(&self, values: &[f64]) -> f64
    {
        self.weights.iter().zip(values).map(|(&weight, &value)| weight * value).sum()
    }

    ///
    /// Integrate `integrand` over the box. Node evaluations run in
    /// parallel; the weighted reduction is sequential in node order, so
    /// the result is reproducible.
    ///
    pub fn integrate<F>(&self, integrand: F) -> f64
    where
        F: Fn(&[f64]) -> f64 + Sync,
    {
        let values: Vec<f64> = self.nodes.par_chunks_exact(self.ndim)
            .map(|node| integrand(node))
            .collect();
        self.integral(&values)
    }
}

fn validate(ndim: usize, level: u32, bounding_box: &BoundingBox) -> Result<(), SGError>
{
    if ndim < 1
    {
        return Err(SGError::InvalidDimension);
    }
    if level > MAX_LEVEL
    {
        return Err(SGError::InvalidLevel);
    }
    if bounding_box.lower.len() != ndim || bounding_box.upper.len() != ndim
    {
        return Err(SGError::InvalidDomain);
    }
    for d in 0..ndim
    {
        if !(bounding_box.lower[d] < bounding_box.upper[d])
        {
            return Err(SGError::InvalidDomain);
        }
    }
    Ok(())
}

///
/// Expand one combination term into its cartesian-product grid. Each flat
/// index is decomposed per dimension, last dimension fastest; the emitted
/// weight is the coefficient times the per-dimension weight product.
///
fn expand_term(term: &CombinationTerm, ndim: usize) -> (Vec<f64>, Vec<f64>)
{
    let total: usize = term.rules.iter().map(|rule| rule.len()).product();
    let mut nodes = vec![0.0; total * ndim];
    let mut weights = Vec::with_capacity(total);
    for (i, node) in nodes.chunks_exact_mut(ndim).enumerate()
    {
        let mut weight = term.coefficient;
        let mut remainder = i;
        for d in (0..ndim).rev()
        {
            let rule = term.rules[d];
            let j = remainder % rule.len();
            remainder /= rule.len();
            node[d] = rule.nodes[j];
            weight *= rule.weights[j];
        }
        weights.push(weight);
    }
    (nodes, weights)
}

#[test]
fn single_point_rule_1d()
{
    let grid = SparseQuadratureGrid::uniform(1, 0, 0.0, 1.0).unwrap();
    assert_eq!(grid.len(), 1);
    assert_eq!(grid.nodes(), &[0.5]);
    assert_eq!(grid.weights(), &[1.0]);
}

#[test]
fn one_dimension_matches_univariate_rule()
{
    // With a single dimension every combination term below the top level
    // cancels, so the grid must reproduce the plain rule exactly.
    let grid = SparseQuadratureGrid::uniform(1, 3, 0.0, 1.0).unwrap();
    let rule = UnivariateRule::new(3, 0.0, 1.0).unwrap();
    assert_eq!(grid.nodes(), &rule.nodes[..]);
    assert_eq!(grid.weights(), &rule.weights[..]);
}

#[test]
fn hand_checked_2d_level1()
{
    // Terms (0,1) and (1,0) enter with +1 and term (0,0) with -1; the
    // shared midpoint accumulates -1 + 2/3 + 2/3 = 1/3 and the four edge
    // midpoints keep 1/6 each.
    let grid = SparseQuadratureGrid::uniform(2, 1, 0.0, 1.0).unwrap();
    assert_eq!(grid.len(), 5);
    for i in 0..grid.len()
    {
        let node = grid.node(i);
        let weight = grid.weights()[i];
        println!("{node:?} -> {weight}");
        let expected = if node == &[0.5, 0.5] { 1.0 / 3.0 } else { 1.0 / 6.0 };
        assert!((weight - expected).abs() < 1e-14);
    }
    let total: f64 = grid.weights().iter().sum();
    assert!((total - 1.0).abs() < 1e-14);
}

#[test]
fn weights_sum_to_volume()
{
    for (ndim, level) in [(1_usize, 4_u32), (2, 3), (3, 4), (4, 3), (5, 2)]
    {
        let grid = SparseQuadratureGrid::uniform(ndim, level, 0.0, 1.0).unwrap();
        let total: f64 = grid.weights().iter().sum();
        println!("d={ndim}, q={level}: {} nodes, weight sum {total}", grid.len());
        assert!((total - 1.0).abs() < 1e-12);
    }

    let bbox = BoundingBox::new(&[-1.0, 0.0, 2.0], &[1.0, 2.0, 5.0]);
    let grid = SparseQuadratureGrid::new(3, 3, bbox).unwrap();
    let volume = grid.bounding_box().volume();
    assert_eq!(volume, 12.0);
    let total: f64 = grid.weights().iter().sum();
    assert!((total / volume - 1.0).abs() < 1e-12);
}

#[test]
fn node_counts_2d_3d()
{
    // Standard point counts for nested Clenshaw-Curtis sparse grids.
    for (level, expected) in [(0, 1), (1, 5), (2, 13), (3, 29), (4, 65)]
    {
        let grid = SparseQuadratureGrid::uniform(2, level, 0.0, 1.0).unwrap();
        assert_eq!(grid.level(), level);
        assert_eq!(grid.len(), expected);
    }
    for (level, expected) in [(1, 7), (2, 25)]
    {
        let grid = SparseQuadratureGrid::uniform(3, level, 0.0, 1.0).unwrap();
        assert_eq!(grid.len(), expected);
    }
}

#[test]
fn polynomial_exactness_2d()
{
    let grid = SparseQuadratureGrid::uniform(2, 1, 0.0, 1.0).unwrap();
    let integral = grid.integrate(|x| x[0] * x[1]);
    println!("integral={integral}");
    assert!((integral - 0.25).abs() < 1e-12);

    // Total degree 6 is still inside the exactness range at level 3.
    let grid = SparseQuadratureGrid::uniform(2, 3, 0.0, 1.0).unwrap();
    let integral = grid.integrate(|x| x[0].powi(3) * x[1].powi(3));
    assert!((integral - 1.0 / 16.0).abs() < 1e-12);
    let integral = grid.integrate(|x| x[0].powi(2) * x[1].powi(2));
    assert!((integral - 1.0 / 9.0).abs() < 1e-12);
}

#[test]
fn smooth_integrands_2d()
{
    let grid = SparseQuadratureGrid::uniform(2, 5, 0.0, 1.0).unwrap();
    let exact = (f64::exp(1.0) - 1.0) * (f64::exp(1.0) - 1.0);
    let integral = grid.integrate(|x| f64::exp(x[0] + x[1]));
    println!("exp: {integral} vs {exact}");
    assert!((integral - exact).abs() < 1e-6);

    use core::f64::consts::PI;
    let grid = SparseQuadratureGrid::uniform(2, 6, 0.0, 1.0).unwrap();
    let exact = 4.0 / (PI * PI);
    let integral = grid.integrate(|x| f64::sin(PI * x[0]) * f64::sin(PI * x[1]));
    println!("sin: {integral} vs {exact}");
    assert!((integral - exact).abs() < 1e-6);
}

#[test]
fn integral_matches_integrate()
{
    let grid = SparseQuadratureGrid::uniform(3, 3, -1.0, 2.0).unwrap();
    let mut values = Vec::with_capacity(grid.len());
    for node in grid.nodes().chunks_exact(grid.ndim())
    {
        values.push(node[0] * node[0] + node[1] * node[2]);
    }
    let from_values = grid.integral(&values);
    let from_closure = grid.integrate(|x| x[0] * x[0] + x[1] * x[2]);
    assert_eq!(from_values, from_closure);
}

#[test]
fn grids_are_nested()
{
    use rustc_hash::FxHashSet;
    for level in 0..4
    {
        let coarse = SparseQuadratureGrid::uniform(2, level, 0.0, 1.0).unwrap();
        let fine = SparseQuadratureGrid::uniform(2, level + 1, 0.0, 1.0).unwrap();
        let fine_nodes: FxHashSet<Vec<u64>> = fine.nodes().chunks_exact(2)
            .map(|node| node.iter().map(|x| x.to_bits()).collect())
            .collect();
        for node in coarse.nodes().chunks_exact(2)
        {
            let key: Vec<u64> = node.iter().map(|x| x.to_bits()).collect();
            assert!(fine_nodes.contains(&key), "missing {node:?}");
        }
    }
}

#[test]
fn nodes_are_pairwise_distinct()
{
    let grid = SparseQuadratureGrid::uniform(2, 3, 0.0, 1.0).unwrap();
    let eps = 1e-10;
    for i in 0..grid.len()
    {
        for j in i + 1..grid.len()
        {
            let a = grid.node(i);
            let b = grid.node(j);
            assert!(a.iter().zip(b).any(|(x, y)| (x - y).abs() > eps), "{a:?} vs {b:?}");
        }
    }
}

#[test]
fn node_set_symmetric_about_origin()
{
    use rustc_hash::FxHashSet;
    let grid = SparseQuadratureGrid::uniform(2, 2, -1.0, 1.0).unwrap();
    let keys: FxHashSet<Vec<u64>> = grid.nodes().chunks_exact(2)
        .map(|node| node.iter().map(|x| x.to_bits()).collect())
        .collect();
    for node in grid.nodes().chunks_exact(2)
    {
        let flipped: Vec<u64> = node.iter()
            .map(|&x| (if x == 0.0 { 0.0_f64 } else { -x }).to_bits())
            .collect();
        assert!(keys.contains(&flipped), "missing mirror of {node:?}");
    }
}

#[test]
fn validation_errors()
{
    assert_eq!(SparseQuadratureGrid::uniform(0, 1, 0.0, 1.0).unwrap_err(), SGError::InvalidDimension);
    assert_eq!(SparseQuadratureGrid::uniform(2, MAX_LEVEL + 1, 0.0, 1.0).unwrap_err(), SGError::InvalidLevel);
    assert_eq!(SparseQuadratureGrid::uniform(2, 1, 1.0, 0.0).unwrap_err(), SGError::InvalidDomain);
    assert_eq!(SparseQuadratureGrid::uniform(2, 1, 0.0, f64::NAN).unwrap_err(), SGError::InvalidDomain);

    let short_box = BoundingBox::new(&[0.0], &[1.0]);
    assert_eq!(SparseQuadratureGrid::new(2, 1, short_box).unwrap_err(), SGError::InvalidDomain);
}

#[test]
fn resource_limit_rejected_before_expansion()
{
    // The active terms of (d=2, q=20) expand to ~39M points, well past
    // the ceiling, but enumeration and the estimate stay tiny, so this
    // must fail fast.
    assert_eq!(SparseQuadratureGrid::uniform(2, 20, 0.0, 1.0).unwrap_err(),
        SGError::ResourceLimitExceeded);
}
