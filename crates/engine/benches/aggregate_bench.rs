//! 스케줄링 핫패스 벤치마크
//!
//! 그룹 상태 집계, 웨이브 분할, 상태 표 렌더링 성능을 측정합니다.

use std::sync::Arc;

use criterion::{black_box, criterion_group, criterion_main, Criterion, Throughput};
use rigcheck_core::error::PhaseError;
use rigcheck_core::status::TestStatus;
use rigcheck_engine::group::plan_waves;
use rigcheck_engine::report::collect_reports;
use rigcheck_engine::{aggregate_status, render_status_table, TaskContext, TestCase, TestEntity};

struct Noop;

impl TestCase for Noop {
    async fn procedure(&self, _ctx: &TaskContext) -> Result<(), PhaseError> {
        Ok(())
    }
}

fn children(count: usize) -> Vec<Arc<TestEntity>> {
    (0..count)
        .map(|i| Arc::new(TestEntity::case(format!("case-{i}"), Noop).parallel(i % 3 != 0)))
        .collect()
}

fn bench_aggregate(c: &mut Criterion) {
    let mut group = c.benchmark_group("aggregate_status");
    for size in [8usize, 128, 1024] {
        let passing = vec![TestStatus::Pass; size];
        let mut late_fail = passing.clone();
        if let Some(last) = late_fail.last_mut() {
            *last = TestStatus::Fail;
        }

        group.throughput(Throughput::Elements(size as u64));
        group.bench_function(format!("all_pass_{size}"), |b| {
            b.iter(|| aggregate_status(black_box(&passing).iter().copied()))
        });
        group.bench_function(format!("last_fail_{size}"), |b| {
            b.iter(|| aggregate_status(black_box(&late_fail).iter().copied()))
        });
    }
    group.finish();
}

fn bench_plan_waves(c: &mut Criterion) {
    let entities = children(256);
    let mut group = c.benchmark_group("plan_waves");
    group.throughput(Throughput::Elements(entities.len() as u64));
    group.bench_function("mixed_256", |b| {
        b.iter(|| plan_waves(black_box(&entities), true).len())
    });
    group.finish();
}

fn bench_status_table(c: &mut Criterion) {
    let roots = vec![Arc::new(TestEntity::group(
        "suite",
        (0..64).map(|i| TestEntity::case(format!("case-{i}"), Noop)).collect(),
    ))];
    let reports = collect_reports(&roots);
    c.bench_function("render_status_table_65", |b| {
        b.iter(|| render_status_table(black_box(&reports)))
    });
}

criterion_group!(benches, bench_aggregate, bench_plan_waves, bench_status_table);
criterion_main!(benches);
