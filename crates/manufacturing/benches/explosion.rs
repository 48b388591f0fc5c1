use criterion::{BenchmarkId, Criterion, black_box, criterion_group, criterion_main};
use rust_decimal::Decimal;

use ordercash_inventory::{BillOfMaterial, BomLine, InventoryItemId, ItemType};
use ordercash_manufacturing::{BomGraph, BomNode};

fn raw_node() -> BomNode {
    BomNode {
        item_type: ItemType::RawMaterial,
        unit_cost: Decimal::new(125, 2),
        bom: None,
    }
}

fn assembly(components: &[InventoryItemId]) -> BomNode {
    BomNode {
        item_type: ItemType::Manufactured,
        unit_cost: Decimal::ZERO,
        bom: Some(BillOfMaterial::new(
            components
                .iter()
                .map(|c| BomLine::new(*c, Decimal::from(2)))
                .collect(),
            Decimal::ONE,
        )),
    }
}

/// Chain of `depth` sub-assemblies, each using the previous one plus one raw item.
fn deep_graph(depth: usize) -> (BomGraph, InventoryItemId) {
    let mut graph = BomGraph::new();
    let raw = InventoryItemId::generate();
    graph.insert(raw, raw_node());

    let mut current = raw;
    for _ in 0..depth {
        let id = InventoryItemId::generate();
        let components = if current == raw { vec![raw] } else { vec![current, raw] };
        graph.insert(id, assembly(&components));
        current = id;
    }
    (graph, current)
}

/// One assembly over `width` distinct raw items.
fn wide_graph(width: usize) -> (BomGraph, InventoryItemId) {
    let mut graph = BomGraph::new();
    let raws: Vec<_> = (0..width)
        .map(|_| {
            let id = InventoryItemId::generate();
            graph.insert(id, raw_node());
            id
        })
        .collect();
    let top = InventoryItemId::generate();
    graph.insert(top, assembly(&raws));
    (graph, top)
}

fn bench_explosion(c: &mut Criterion) {
    let mut group = c.benchmark_group("bom_explosion");

    for depth in [8usize, 16] {
        let (graph, top) = deep_graph(depth);
        group.bench_with_input(BenchmarkId::new("deep", depth), &depth, |b, _| {
            b.iter(|| graph.explode(black_box(top), Decimal::from(10)).unwrap());
        });
    }

    for width in [100usize, 1000] {
        let (graph, top) = wide_graph(width);
        group.bench_with_input(BenchmarkId::new("wide", width), &width, |b, _| {
            b.iter(|| graph.explode(black_box(top), Decimal::from(10)).unwrap());
        });
    }

    group.finish();
}

fn bench_roll_up(c: &mut Criterion) {
    let mut group = c.benchmark_group("bom_roll_up_cost");
    let (graph, top) = deep_graph(32);
    group.bench_function("deep_32", |b| {
        b.iter(|| graph.roll_up_cost(black_box(top)).unwrap());
    });
    group.finish();
}

criterion_group!(benches, bench_explosion, bench_roll_up);
criterion_main!(benches);
