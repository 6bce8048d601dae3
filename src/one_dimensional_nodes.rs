use core::f64;
use f64::consts::PI;
use rustfft::{num_complex::Complex, FftPlanner};
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};

use crate::errors::SGError;

/// Largest refinement level accepted anywhere in the crate. Point counts
/// grow as 2^level + 1, so levels past this bound exhaust memory long
/// before they improve accuracy.
pub const MAX_LEVEL: u32 = 20;

///
/// Number of points for a given refinement `level` under the closed
/// doubling growth rule: 1, 3, 5, 9, 17, ... Level l > 0 has 2^l + 1
/// points, which makes each node set a subset of the next one.
///
pub fn num_points(level: u32) -> usize
{
    if level == 0 { 1 } else { (1 << level) + 1 }
}

///
/// Clenshaw-Curtis nodes over [-1, 1] in ascending order. The node set is
/// built from its negative half and mirrored, so it is exactly closed
/// under sign flip, the midpoint is exactly 0.0, and the level-l set is
/// bit-identical to every other node of the level-(l+1) set.
///
pub fn clenshaw_curtis_nodes(level: u32) -> Vec<f64>
{
    let n = num_points(level);
    let mut nodes = vec![0.0; n];
    if level == 0
    {
        return nodes;
    }
    let mm = (n - 1) as i64;
    for j in 0..n / 2
    {
        let t = (mm - 2 * j as i64) as f64 / mm as f64;
        let x = f64::sin(0.5 * PI * t);
        nodes[j] = -x;
        nodes[n - 1 - j] = x;
    }
    nodes
}

///
/// Clenshaw-Curtis weights over [-1, 1], exact for polynomials up to
/// degree 2^level. Computed with the FFT construction of J. Waldvogel,
/// "Fast construction of the Fejer and Clenshaw-Curtis quadrature rules".
///
pub fn clenshaw_curtis_weights(level: u32) -> Vec<f64>
{
    if level == 0
    {
        return vec![2.0];
    }
    let n = 1_usize << level;
    let odd: Vec<f64> = (1..n).step_by(2).map(|k| k as f64).collect();
    let l = odd.len();
    let m = n - l;

    let mut v0: Vec<f64> = odd.iter().map(|&k| 2.0 / (k * (k - 2.0))).collect();
    v0.push(1.0 / odd[l - 1]);
    v0.resize(n + 1, 0.0);

    // g + v2 from the paper, assembled in place: g has spikes of height n
    // at positions l and m on a constant -1 background.
    let g_scale = (n * n - 1 + n % 2) as f64;
    let mut buffer = vec![Complex::new(-1.0, 0.0); n];
    buffer[l].re += n as f64;
    buffer[m].re += n as f64;
    for (k, g) in buffer.iter_mut().enumerate()
    {
        g.re = g.re / g_scale - v0[k] - v0[n - k];
    }
    let mut planner = FftPlanner::new();
    planner.plan_fft_inverse(n).process(&mut buffer);

    // rustfft leaves the inverse transform unnormalized.
    let mut weights: Vec<f64> = buffer.iter().map(|w| w.re / n as f64).collect();
    weights.push(weights[0]);
    weights
}

///
/// A one-dimensional Clenshaw-Curtis rule mapped onto an interval [a, b].
/// Nodes are ascending and weights sum to b - a. Immutable once built;
/// shared read-only through the `RuleCache`.
///
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct UnivariateRule
{
    pub level: u32,
    pub nodes: Vec<f64>,
    pub weights: Vec<f64>,
}

impl UnivariateRule
{
    ///
    /// Build the rule of `level` on [a, b]. The affine map from the
    /// canonical [-1, 1] interval is baked in here, so downstream
    /// consumers never rescale.
    ///
    pub fn new(level: u32, a: f64, b: f64) -> Result<Self, SGError>
    {
        if level > MAX_LEVEL
        {
            return Err(SGError::InvalidLevel);
        }
        if !(a < b)
        {
            return Err(SGError::InvalidDomain);
        }
        let center = 0.5 * (a + b);
        let half_width = 0.5 * (b - a);
        let nodes = clenshaw_curtis_nodes(level).iter().map(|&x| center + half_width * x).collect();
        let weights = clenshaw_curtis_weights(level).iter().map(|&w| half_width * w).collect();
        Ok(Self { level, nodes, weights })
    }

    pub fn len(&self) -> usize
    {
        self.nodes.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

///
/// Cache of univariate rules keyed by (level, interval). The same level is
/// requested once per dimension of every combination term, so rules are
/// generated once and handed out by reference. Owned by the grid build
/// that creates it, never a process-wide static.
///
#[derive(Default, Clone)]
pub struct RuleCache
{
    rules: FxHashMap<(u32, u64, u64), UnivariateRule>,
}

impl RuleCache
{
    ///
    /// Fetch the rule for `level` on [a, b], generating it on first use.
    ///
    pub fn rule(&mut self, level: u32, a: f64, b: f64) -> Result<&UnivariateRule, SGError>
    {
        let key = (level, a.to_bits(), b.to_bits());
        if !self.rules.contains_key(&key)
        {
            let rule = UnivariateRule::new(level, a, b)?;
            self.rules.insert(key, rule);
        }
        Ok(&self.rules[&key])
    }

    ///
    /// Fetch a previously generated rule without taking `&mut self`.
    /// Used after the cache has been prefilled so expansion can read it
    /// from multiple threads.
    ///
    pub fn get(&self, level: u32, a: f64, b: f64) -> Option<&UnivariateRule>
    {
        self.rules.get(&(level, a.to_bits(), b.to_bits()))
    }

    pub fn len(&self) -> usize
    {
        self.rules.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[test]
fn check_weights()
{
    for level in 0..=6
    {
        let weights = clenshaw_curtis_weights(level);
        let total: f64 = weights.iter().sum();
        println!("level {level}: {} weights, sum {total}", weights.len());
        assert!((total / 2.0 - 1.0).abs() < 1e-14);
        assert!(weights.iter().all(|&w| w > 0.0));
    }

    // Weights computed from CLENSHAW_CURTIS_RULE by J. Burkardt over (-1,+1).
    let weights5 = [0.06666666666666668, 0.5333333333333333, 0.7999999999999999, 0.5333333333333334, 0.06666666666666668];
    let computed = clenshaw_curtis_weights(2);
    for i in 0..5
    {
        println!("{},{}", computed[i], weights5[i]);
        assert!((1.0 - computed[i] / weights5[i]).abs() < 1e-14);
    }
}

#[test]
fn check_nodes()
{
    let nodes = clenshaw_curtis_nodes(2);
    assert_eq!(nodes.len(), 5);
    assert_eq!(nodes[0], -1.0);
    assert_eq!(nodes[2], 0.0);
    assert_eq!(nodes[4], 1.0);
    for pair in nodes.windows(2)
    {
        assert!(pair[0] < pair[1]);
    }
}

#[test]
fn check_nodes_nested()
{
    for level in 0..5
    {
        let coarse = clenshaw_curtis_nodes(level);
        let fine = clenshaw_curtis_nodes(level + 1);
        let stride = if level == 0 { fine.len() / 2 } else { 2 };
        let offset = if level == 0 { fine.len() / 2 } else { 0 };
        for (j, &x) in coarse.iter().enumerate()
        {
            assert_eq!(x, fine[offset + stride * j]);
        }
    }
}

#[test]
fn check_nodes_symmetric()
{
    for level in 1..=4
    {
        let nodes = clenshaw_curtis_nodes(level);
        let n = nodes.len();
        for j in 0..n
        {
            assert_eq!(nodes[j], -nodes[n - 1 - j]);
        }
    }
}

#[test]
fn check_mapped_rule()
{
    let rule = UnivariateRule::new(0, 0.0, 1.0).unwrap();
    assert_eq!(rule.nodes, vec![0.5]);
    assert_eq!(rule.weights, vec![1.0]);

    let rule = UnivariateRule::new(3, 2.0, 5.0).unwrap();
    assert_eq!(rule.len(), num_points(3));
    assert!(rule.nodes.iter().all(|&x| (2.0..=5.0).contains(&x)));
    let total: f64 = rule.weights.iter().sum();
    assert!((total / 3.0 - 1.0).abs() < 1e-14);
}

#[test]
fn check_rule_cache()
{
    let mut cache = RuleCache::default();
    cache.rule(2, 0.0, 1.0).unwrap();
    cache.rule(2, 0.0, 1.0).unwrap();
    cache.rule(3, 0.0, 1.0).unwrap();
    cache.rule(2, -1.0, 1.0).unwrap();
    assert_eq!(cache.len(), 3);
    assert_eq!(cache.get(2, 0.0, 1.0).unwrap().len(), 5);
    assert!(cache.get(4, 0.0, 1.0).is_none());
}

#[test]
fn check_invalid_inputs()
{
    assert_eq!(UnivariateRule::new(MAX_LEVEL + 1, 0.0, 1.0).unwrap_err(), SGError::InvalidLevel);
    assert_eq!(UnivariateRule::new(1, 1.0, 1.0).unwrap_err(), SGError::InvalidDomain);
    assert_eq!(UnivariateRule::new(1, 2.0, -2.0).unwrap_err(), SGError::InvalidDomain);
    assert_eq!(UnivariateRule::new(1, f64::NAN, 1.0).unwrap_err(), SGError::InvalidDomain);
}
