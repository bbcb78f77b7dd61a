use std::hint::black_box;

use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion};
use polysi_core::{AuditOptions, History, IsolationLevel, PruningMode, Reachability};
use polysi_sat::audit;
use polysi_testgen::generator::generate_single_history;

fn sample(n_node: u64, n_transaction: u64, staleness: u64) -> History<u64, u64> {
    let sessions = generate_single_history(n_node, 8, n_transaction, 6, staleness);
    History::try_from(sessions.as_slice()).unwrap()
}

/// Full audits of serial executions, which every mode accepts.
fn bench_modes(c: &mut Criterion) {
    let mut group = c.benchmark_group("audit_modes");
    group.sample_size(20);
    for n_transaction in [10u64, 40] {
        let history = sample(6, n_transaction, 0);
        for pruning in [PruningMode::Iterative, PruningMode::PreprocessOnly] {
            for reachability in [Reachability::Dense, Reachability::Sparse] {
                let options = AuditOptions::builder()
                    .level(IsolationLevel::SnapshotIsolation)
                    .pruning(pruning)
                    .reachability(reachability)
                    .build();
                group.bench_with_input(
                    BenchmarkId::new(format!("{pruning:?}_{reachability:?}"), 6 * n_transaction),
                    &history,
                    |b, history| b.iter(|| black_box(audit(history, &options).is_ok())),
                );
            }
        }
    }
    group.finish();
}

/// Stale snapshots leave more constraints open and hit the rejection path.
fn bench_levels(c: &mut Criterion) {
    let mut group = c.benchmark_group("audit_levels");
    group.sample_size(20);
    let history = sample(4, 20, 3);
    for level in [IsolationLevel::SnapshotIsolation, IsolationLevel::Serializable] {
        let options = AuditOptions::for_level(level);
        group.bench_with_input(BenchmarkId::new("stale", format!("{level:?}")), &history, |b, history| {
            b.iter(|| black_box(audit(history, &options).is_ok()));
        });
    }
    group.finish();
}

criterion_group!(benches, bench_modes, bench_levels);
criterion_main!(benches);
