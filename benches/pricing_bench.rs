use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion};
use std::hint::black_box;

use ferricnote::engines::{price, RunConfig};
use ferricnote::instruments::TermSheet;

// Pricing performance benchmarks
// Goals:
// - Path generation should dominate; event evaluation stays under ~20%.
// - Block size should not change wall time materially beyond cache effects.

fn benchmark_sheet() -> TermSheet {
    TermSheet::from_json(
        r#"{
        "meta": {"product_id": "BENCH1", "notional": 1000000,
                 "valuation_date": "2024-01-02", "maturity_date": "2027-01-04",
                 "maturity_payment_date": "2027-01-11"},
        "underlyings": [
            {"id": "A", "spot": 100,
             "dividend_model": {"type": "continuous", "continuous_yield": 0.02},
             "vol_model": {"type": "flat", "flat_vol": 0.22}},
            {"id": "B", "spot": 250,
             "dividend_model": {"type": "continuous", "continuous_yield": 0.01},
             "vol_model": {"type": "flat", "flat_vol": 0.28}}],
        "discount_curve": {"flat_rate": 0.035},
        "correlation": {"pairwise": {"A_B": 0.65}},
        "schedules": {
            "observation_dates": ["2024-07-02", "2025-01-02", "2025-07-02",
                                  "2026-01-02", "2026-07-02", "2027-01-04"],
            "payment_dates": ["2024-07-09", "2025-01-09", "2025-07-09",
                              "2026-01-09", "2026-07-09", "2027-01-11"],
            "autocall_levels": [1.0, 1.0, 1.0, 1.0, 1.0, 1.0],
            "coupon_barriers": [0.7, 0.7, 0.7, 0.7, 0.7, 0.7],
            "coupon_rates": [0.025, 0.025, 0.025, 0.025, 0.025, 0.025]},
        "ki_barrier": {"level": 0.6, "monitoring": "continuous"}
    }"#,
    )
    .expect("benchmark sheet should be valid")
}

fn bench_price_paths(c: &mut Criterion) {
    let sheet = benchmark_sheet();
    let mut group = c.benchmark_group("price_paths");

    for paths in [10_000usize, 50_000, 100_000] {
        group.bench_with_input(BenchmarkId::from_parameter(paths), &paths, |b, &paths| {
            let config = RunConfig::new(paths, 42).with_block_size(paths.min(25_000));
            b.iter(|| {
                let result = price(black_box(&sheet), black_box(&config))
                    .expect("pricing should succeed");
                black_box(result.summary.pv)
            })
        });
    }

    group.finish();
}

fn bench_refined_grid(c: &mut Criterion) {
    let sheet = benchmark_sheet();
    let mut group = c.benchmark_group("price_grid_refinement");
    group.sample_size(10);

    for steps_per_year in [52u32, 252] {
        group.bench_with_input(
            BenchmarkId::from_parameter(steps_per_year),
            &steps_per_year,
            |b, &steps| {
                let config = RunConfig::new(20_000, 42)
                    .with_block_size(10_000)
                    .with_steps_per_year(steps);
                b.iter(|| {
                    let result = price(black_box(&sheet), black_box(&config))
                        .expect("pricing should succeed");
                    black_box(result.summary.pv)
                })
            },
        );
    }

    group.finish();
}

criterion_group!(benches, bench_price_paths, bench_refined_grid);
criterion_main!(benches);
