//! Cascade cost on a wide, deep synthetic taxonomy.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};

use taxograph::graph::cascade::{recompute_all, reparent};
use taxograph::graph::cycles::{find_cycles, validate_parents};
use taxograph::graph::index::GraphIndex;
use taxograph::types::Category;

/// `fanout` children per node, `depth` levels, every third node also
/// hanging under the first root as a secondary parent.
fn taxonomy(fanout: usize, depth: usize) -> GraphIndex {
    let mut cats = vec![
        Category::new("root", "Root", "root"),
        Category::new("side", "Side", "side"),
    ];
    let mut frontier = vec!["root".to_string()];
    let mut n = 0usize;
    for _ in 0..depth {
        let mut next = Vec::new();
        for parent in &frontier {
            for _ in 0..fanout {
                n += 1;
                let id = format!("n{n}");
                let mut parents = vec![parent.clone()];
                if n % 3 == 0 {
                    parents.push("side".to_string());
                }
                cats.push(Category::new(id.clone(), id.clone(), id.clone()).with_parents(parents));
                next.push(id);
            }
        }
        frontier = next;
    }
    let raw = GraphIndex::build(cats.clone());
    let repair = recompute_all(&raw);
    for c in cats.iter_mut() {
        if let Some(u) = repair.update_for(&c.id) {
            c.level = u.level;
            c.path = u.path.clone();
        }
    }
    GraphIndex::build(cats)
}

fn bench_cascade(c: &mut Criterion) {
    let mut group = c.benchmark_group("reparent_subtree");
    for (fanout, depth) in [(4, 4), (6, 5)] {
        let index = taxonomy(fanout, depth);
        group.bench_with_input(
            BenchmarkId::from_parameter(index.len()),
            &index,
            |b, index| b.iter(|| reparent(black_box("n1"), black_box(&["side"]), index)),
        );
    }
    group.finish();
}

fn bench_validation(c: &mut Criterion) {
    let index = taxonomy(6, 5);
    c.bench_function("validate_parents_deep_leaf", |b| {
        let leaf = format!("n{}", index.len() - 2);
        b.iter(|| validate_parents(black_box("root"), black_box(&[leaf.as_str()]), &index))
    });
    c.bench_function("find_cycles_full_scan", |b| b.iter(|| find_cycles(black_box(&index))));
}

criterion_group!(benches, bench_cascade, bench_validation);
criterion_main!(benches);
