//! Benchmarks for the agenda calendar and token accounting.
//!
//! Benchmarks cover:
//! - Reservation insertion with id allocation
//! - Calendar queries (current, future, intersection)
//! - Daughter admission and restore against a root pool

use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use rand::Rng;
use std::hint::black_box;
use std::sync::Arc;

use chrono::{DateTime, TimeDelta, TimeZone, Utc};
use session_agenda::builders::AgendaBuilder;
use session_agenda::config::{AgendaConfig, UseCaseConfig};
use session_agenda::core::{
    Agenda, CardinalityProfile, CardinalityRequest, Reservation, ResourcePool, TimePeriod,
    TokenCapacity,
};
use session_agenda::infra::InMemoryCatalog;
use session_agenda::util::ManualClock;

// ============================================================================
// Fixtures
// ============================================================================

fn origin() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap()
}

fn catalog(resources: i32) -> InMemoryCatalog {
    (0..resources)
        .try_fold(InMemoryCatalog::new(), |catalog, id| {
            catalog.add_resource(id, format!("res-{id}"), TokenCapacity::Limited(4))
        })
        .unwrap()
}

fn random_reservation(rng: &mut impl Rng) -> Reservation {
    let start = origin() + TimeDelta::minutes(rng.random_range(0..60 * 24 * 30));
    let end = start + TimeDelta::minutes(rng.random_range(1..240));
    Reservation::new(
        TimePeriod::new(start, end).unwrap(),
        UseCaseConfig::new("hold", "lock").with_property("duration", "1m"),
    )
}

fn filled_agenda(size: usize) -> Agenda {
    let agenda = AgendaBuilder::new(AgendaConfig::default(), Arc::new(catalog(4)))
        .with_clock(Arc::new(ManualClock::new(origin() + TimeDelta::days(15))))
        .build()
        .unwrap();
    let mut rng = rand::rng();
    for _ in 0..size {
        agenda.add_reservation(random_reservation(&mut rng)).unwrap();
    }
    agenda
}

// ============================================================================
// Calendar
// ============================================================================

fn bench_add_reservations(c: &mut Criterion) {
    let mut group = c.benchmark_group("agenda_add");
    for size in [100_u64, 1_000] {
        group.throughput(Throughput::Elements(size));
        group.bench_with_input(BenchmarkId::from_parameter(size), &size, |b, &size| {
            let mut rng = rand::rng();
            let batch: Vec<Reservation> = (0..size).map(|_| random_reservation(&mut rng)).collect();
            b.iter(|| {
                let agenda = AgendaBuilder::new(AgendaConfig::default(), Arc::new(catalog(1)))
                    .with_clock(Arc::new(ManualClock::new(origin())))
                    .build()
                    .unwrap();
                for reservation in &batch {
                    agenda.add_reservation(reservation.clone()).unwrap();
                }
                black_box(agenda.len())
            });
        });
    }
    group.finish();
}

fn bench_calendar_queries(c: &mut Criterion) {
    let mut group = c.benchmark_group("agenda_queries");
    for size in [100_usize, 1_000, 10_000] {
        let agenda = filled_agenda(size);
        let window = TimePeriod::new(
            origin() + TimeDelta::days(10),
            origin() + TimeDelta::days(11),
        )
        .unwrap();
        group.bench_with_input(BenchmarkId::new("current", size), &size, |b, _| {
            b.iter(|| black_box(agenda.compute_current_sessions()));
        });
        group.bench_with_input(BenchmarkId::new("future", size), &size, |b, _| {
            b.iter(|| black_box(agenda.compute_future_sessions()));
        });
        group.bench_with_input(BenchmarkId::new("intersection", size), &size, |b, _| {
            b.iter(|| black_box(agenda.compute_intersection_sessions(&window)));
        });
        group.bench_with_input(BenchmarkId::new("next", size), &size, |b, _| {
            b.iter(|| black_box(agenda.next_session()));
        });
    }
    group.finish();
}

// ============================================================================
// Token accounting
// ============================================================================

fn bench_pool_admission(c: &mut Criterion) {
    let mut group = c.benchmark_group("pool_admission");
    for resources in [4_i32, 64] {
        let catalog = catalog(resources);
        let mut root = ResourcePool::new();
        root.init_root(&catalog, &CardinalityRequest::new(), CardinalityProfile::All)
            .unwrap();
        let request: CardinalityRequest = (0..resources).map(|id| (id, 2)).collect();
        group.bench_with_input(
            BenchmarkId::from_parameter(resources),
            &resources,
            |b, _| {
                b.iter(|| {
                    let mut daughter = ResourcePool::new();
                    ResourcePool::load_daughter_from_parent(
                        &mut root,
                        &mut daughter,
                        &catalog,
                        &request,
                    )
                    .unwrap();
                    ResourcePool::restore_parent_from_daughter(&mut root, &mut daughter).unwrap();
                    black_box(daughter.is_initialized())
                });
            },
        );
    }
    group.finish();
}

criterion_group!(
    benches,
    bench_add_reservations,
    bench_calendar_queries,
    bench_pool_admission
);
criterion_main!(benches);
