use criterion::{criterion_group, criterion_main, Criterion};
use sgquad::SparseQuadratureGrid;

fn build_grid() -> SparseQuadratureGrid
{
    SparseQuadratureGrid::uniform(3, 6, 0.0, 1.0).unwrap()
}

fn integrate(grid: &SparseQuadratureGrid)
{
    let _ = grid.integrate(|x| f64::exp(x[0] + x[1] + x[2]));
}

fn run_case(c: &mut Criterion)
{
    c.bench_function("build", |b| b.iter(build_grid));

    let grid = build_grid();
    c.bench_function("integrate", |b| b.iter(|| integrate(&grid)));
}

criterion_group!(benches, run_case);
criterion_main!(benches);
