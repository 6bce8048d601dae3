//! Sparse grid quadrature over hyperrectangles.
//!
//! Nodes and weights are built with the Smolyak combination technique
//! from nested one-dimensional Clenshaw-Curtis rules: admissible level
//! combinations are enumerated, each tensor-product rule enters with its
//! inclusion-exclusion coefficient, and coincident nodes produced by the
//! nesting are merged into a single weighted node set.

pub mod bounded_sum_iterator;
pub mod errors;
pub mod grids;
pub mod multi_index_manipulation;
pub mod one_dimensional_nodes;

pub use errors::SGError;
pub use grids::combination_grid::{BoundingBox, SparseQuadratureGrid};
pub use one_dimensional_nodes::UnivariateRule;
