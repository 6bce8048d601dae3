use rustc_hash::FxHashSet;

///
/// Compute the combination coefficient of every multi-index in
/// `level_sets` (flattened, `ndim` entries per index) by inclusion-
/// exclusion over its 0/1 shifts:
///
///   c(k) = sum over j in {0,1}^d with k + j in Q of (-1)^|j|_1
///
/// Membership is tested against the enumerated set itself rather than a
/// closed-form binomial, so the coefficients stay correct at the boundary
/// of Q under any admissibility convention. Coefficients may be zero;
/// callers drop those terms.
///
pub fn combination_coefficients(level_sets: &[u32], ndim: usize) -> Vec<i64>
{
    let members: FxHashSet<&[u32]> = level_sets.chunks_exact(ndim).collect();
    let mut shifted = vec![0_u32; ndim];
    let mut coefficients = Vec::with_capacity(level_sets.len() / ndim);
    for index in level_sets.chunks_exact(ndim)
    {
        shifted.copy_from_slice(index);
        coefficients.push(signed_shift_count(&members, &mut shifted, 0, 1));
    }
    coefficients
}

///
/// Walk the 0/1 shift lattice of one index dimension by dimension,
/// accumulating the signed count of shifts that stay inside the set.
/// A shift that leaves the set is pruned together with all its
/// extensions, which is valid because the admissible set is downward
/// closed: growing an outside index never re-enters the set.
///
fn signed_shift_count(members: &FxHashSet<&[u32]>, shifted: &mut [u32], dim: usize, sign: i64) -> i64
{
    if dim == shifted.len()
    {
        return sign;
    }
    let mut count = signed_shift_count(members, shifted, dim + 1, sign);
    shifted[dim] += 1;
    if members.contains(&shifted[..])
    {
        count += signed_shift_count(members, shifted, dim + 1, -sign);
    }
    shifted[dim] -= 1;
    count
}

#[test]
fn test_coefficients_one_dimension()
{
    use crate::bounded_sum_iterator::BoundedSumIterator;
    // In one dimension every lower level telescopes away: only the top
    // level survives, with coefficient one.
    let indices: Vec<u32> = BoundedSumIterator::new(1, 4).flatten().collect();
    let coefficients = combination_coefficients(&indices, 1);
    assert_eq!(coefficients, vec![0, 0, 0, 0, 1]);
}

#[test]
fn test_coefficients_2d_level1()
{
    use crate::bounded_sum_iterator::BoundedSumIterator;
    // Q = {(0,0), (0,1), (1,0)}: the two level-1 terms enter with +1 and
    // the shared level-(0,0) tensor is subtracted once.
    let indices: Vec<u32> = BoundedSumIterator::new(2, 1).flatten().collect();
    let coefficients = combination_coefficients(&indices, 2);
    assert_eq!(coefficients, vec![-1, 1, 1]);
}

#[test]
fn test_coefficients_match_simplex_closed_form()
{
    use crate::bounded_sum_iterator::BoundedSumIterator;
    fn binomial(n: i64, k: i64) -> i64
    {
        if k < 0 || k > n
        {
            return 0;
        }
        let mut r = 1_i64;
        for i in 0..k
        {
            r = r * (n - i) / (i + 1);
        }
        r
    }
    // On the unshifted simplex the general formula reduces to the
    // classic (-1)^(q-|k|) * C(d-1, q-|k|).
    for (ndim, bound) in [(2_usize, 3_u32), (3, 3), (4, 2), (5, 4)]
    {
        let indices: Vec<u32> = BoundedSumIterator::new(ndim, bound).flatten().collect();
        let coefficients = combination_coefficients(&indices, ndim);
        for (index, &c) in indices.chunks_exact(ndim).zip(&coefficients)
        {
            let slack = (bound - index.iter().sum::<u32>()) as i64;
            let expected = (if slack % 2 == 0 { 1 } else { -1 }) * binomial(ndim as i64 - 1, slack);
            assert_eq!(c, expected, "index {index:?}");
        }
    }
}

#[test]
fn test_coefficients_sum_to_one()
{
    use crate::bounded_sum_iterator::BoundedSumIterator;
    // Constant functions must integrate exactly, which forces the
    // coefficients to sum to one.
    for (ndim, bound) in [(1_usize, 0_u32), (2, 5), (3, 4), (6, 2)]
    {
        let indices: Vec<u32> = BoundedSumIterator::new(ndim, bound).flatten().collect();
        let total: i64 = combination_coefficients(&indices, ndim).iter().sum();
        assert_eq!(total, 1);
    }
}
