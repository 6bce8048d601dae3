///
/// Iterates over every multi-index k in N_0^d whose level sum satisfies
/// |k|_1 <= level_bound, in lexicographic ascending order. This is the
/// admissible index set of the combination technique; the order is fixed
/// so grid construction is reproducible.
///
#[derive(Clone)]
pub struct BoundedSumIterator
{
    ndim: usize,
    level_bound: u32,
    index_sum: u32,
    index_head: Vec<u32>,
    first: bool,
}

impl BoundedSumIterator
{
    pub fn new(ndim: usize, level_bound: u32) -> Self
    {
        Self { ndim, level_bound, index_sum: 0, index_head: vec![0; ndim], first: true }
    }

    pub fn ndim(&self) -> usize
    {
        self.ndim
    }

    pub fn level_bound(&self) -> u32
    {
        self.level_bound
    }
}

impl Iterator for BoundedSumIterator
{
    type Item = Vec<u32>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.first
        {
            self.first = false;
            return Some(self.index_head.clone());
        }
        if self.index_sum < self.level_bound
        {
            self.index_sum += 1;
            self.index_head[self.ndim - 1] += 1;
            return Some(self.index_head.clone());
        }
        // Sum is saturated: clear the rightmost nonzero entry and carry
        // one level into the dimension to its left.
        let mut dim = self.ndim - 1;
        while self.index_head[dim] == 0
        {
            if dim == 0
            {
                return None;
            }
            dim -= 1;
        }
        if dim == 0
        {
            return None;
        }
        self.index_sum -= self.index_head[dim] - 1;
        self.index_head[dim] = 0;
        self.index_head[dim - 1] += 1;
        Some(self.index_head.clone())
    }
}

#[test]
fn test_iterator_order()
{
    let indices: Vec<Vec<u32>> = BoundedSumIterator::new(2, 1).collect();
    assert_eq!(indices, vec![vec![0, 0], vec![0, 1], vec![1, 0]]);

    let indices: Vec<Vec<u32>> = BoundedSumIterator::new(2, 2).collect();
    assert_eq!(indices, vec![vec![0, 0], vec![0, 1], vec![0, 2],
        vec![1, 0], vec![1, 1], vec![2, 0]]);
}

#[test]
fn test_iterator_count()
{
    // |{k : |k|_1 <= q}| = C(q + d, d)
    fn binomial(n: u32, k: u32) -> usize
    {
        let mut r = 1_usize;
        for i in 0..k
        {
            r = r * (n - i) as usize / (i + 1) as usize;
        }
        r
    }
    for (ndim, bound) in [(1, 0), (1, 5), (2, 3), (3, 2), (4, 4), (6, 3)]
    {
        let count = BoundedSumIterator::new(ndim, bound).count();
        println!("d={ndim}, q={bound}: {count} indices");
        assert_eq!(count, binomial(bound + ndim as u32, ndim as u32));
    }
}

#[test]
fn test_iterator_admissible()
{
    for index in BoundedSumIterator::new(3, 4)
    {
        assert!(index.iter().sum::<u32>() <= 4);
    }
}

#[test]
fn test_iterator_one_dimension()
{
    let indices: Vec<Vec<u32>> = BoundedSumIterator::new(1, 3).collect();
    assert_eq!(indices, vec![vec![0], vec![1], vec![2], vec![3]]);
}
