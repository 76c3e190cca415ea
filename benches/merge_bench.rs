//! Three-way text merge and structure CRDT benchmarks.
//!
//! # Running
//!
//! ```bash
//! cargo bench --bench merge_bench
//! ```

use criterion::{BenchmarkId, Criterion, Throughput, criterion_group, criterion_main};
use uuid::Uuid;
use vault_sync::content_store::merge;
use vault_sync::crdt::structure::{StructureCrdtStore, StructureEntry, StructureUpdate};

fn make_doc(lines: usize) -> String {
    (0..lines).map(|i| format!("line {i} of the document body\n")).collect()
}

fn bench_merge_non_conflicting(c: &mut Criterion) {
    let mut group = c.benchmark_group("merge_non_conflicting");
    for &lines in &[100usize, 1_000, 10_000] {
        let base = make_doc(lines);
        let mut local = base.clone();
        local.push_str("local appended line\n");
        let remote = base.replacen("line 0 ", "line zero edited ", 1);

        group.throughput(Throughput::Elements(lines as u64));
        group.bench_with_input(BenchmarkId::from_parameter(lines), &lines, |b, _| {
            b.iter(|| merge::merge(base.as_bytes(), local.as_bytes(), remote.as_bytes()));
        });
    }
    group.finish();
}

fn bench_merge_conflicting(c: &mut Criterion) {
    let mut group = c.benchmark_group("merge_conflicting");
    for &lines in &[100usize, 1_000, 10_000] {
        let base = make_doc(lines);
        let local = base.replacen("line 0 ", "line zero ALICE ", 1);
        let remote = base.replacen("line 0 ", "line zero BOB ", 1);

        group.throughput(Throughput::Elements(lines as u64));
        group.bench_with_input(BenchmarkId::from_parameter(lines), &lines, |b, _| {
            b.iter(|| merge::merge(base.as_bytes(), local.as_bytes(), remote.as_bytes()));
        });
    }
    group.finish();
}

fn bench_structure_crdt_apply(c: &mut Criterion) {
    let mut group = c.benchmark_group("structure_crdt_apply");
    for &entries in &[100usize, 1_000, 10_000] {
        let store = StructureCrdtStore::default();
        let ids: Vec<Uuid> = (0..entries).map(|_| Uuid::new_v4()).collect();
        for (i, id) in ids.iter().enumerate() {
            store.apply_update(&StructureUpdate {
                file_id: *id,
                entry: StructureEntry {
                    path: format!("file-{i}.md"),
                    entry_type: "file".to_owned(),
                    deleted: false,
                    updated_at: i as i64,
                    hash: None,
                },
            });
        }

        group.throughput(Throughput::Elements(1));
        group.bench_with_input(BenchmarkId::from_parameter(entries), &entries, |b, _| {
            let id = ids[entries / 2];
            b.iter(|| {
                store.apply_update(&StructureUpdate {
                    file_id: id,
                    entry: StructureEntry {
                        path: "file-updated.md".to_owned(),
                        entry_type: "file".to_owned(),
                        deleted: false,
                        updated_at: (entries as i64) + 1,
                        hash: None,
                    },
                });
            });
        });
    }
    group.finish();
}

criterion_group!(benches, bench_merge_non_conflicting, bench_merge_conflicting, bench_structure_crdt_apply);
criterion_main!(benches);
