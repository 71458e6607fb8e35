use std::sync::Arc;

use criterion::{criterion_group, criterion_main, Criterion};
use costwise::{new_cost_estimator, PlanCostEstimator};
use costwise_core::config::EstimatorConfig;
use costwise_core::oracle::StaticRowCounts;
use costwise_core::schema::{Column, DataType, SchemaBuilder};
use costwise_model::StoreCostModel;
use costwise_planner::{IndexScan, RequiredTables, SingleIndexScan, TableGroupJoinTree};

/// A group with `fanout` children under each of `depth` levels.
fn wide_schema(depth: usize, fanout: usize) -> (SchemaBuilder, Vec<String>) {
    let mut b = SchemaBuilder::new();
    let mut names = vec!["t0".to_string()];
    b.table(
        "t0",
        None,
        vec![
            Column::new("id", DataType::BigInt),
            Column::new("label", DataType::Varchar(64)),
        ],
        &["id"],
    );
    let mut frontier = vec!["t0".to_string()];
    for level in 1..=depth {
        let mut next = Vec::new();
        for parent in &frontier {
            for k in 0..fanout {
                let name = format!("{parent}_{level}{k}");
                b.table(
                    name.clone(),
                    Some(parent.as_str()),
                    vec![
                        Column::new("id", DataType::BigInt),
                        Column::new("payload", DataType::Varchar(255)),
                    ],
                    &["id"],
                );
                names.push(name.clone());
                next.push(name);
            }
        }
        frontier = next;
    }
    b.table_index("t0", "t0_label", &["label"], false);
    (b, names)
}

fn bench_statistics_cache(c: &mut Criterion) {
    let (b, names) = wide_schema(3, 4);
    let schema = Arc::new(b.build().unwrap());
    let mut counts = StaticRowCounts::new();
    for (i, name) in names.iter().enumerate() {
        counts.set(schema.table_named(name).unwrap().id, 10 * (i as u64 + 1));
    }
    c.bench_function("store_model_build", |bench| {
        bench.iter(|| {
            StoreCostModel::new(schema.clone(), &counts, Default::default()).unwrap()
        })
    });
}

fn bench_plan_estimate(c: &mut Criterion) {
    let (b, names) = wide_schema(2, 4);
    let schema = Arc::new(b.build().unwrap());
    let mut counts = StaticRowCounts::new();
    for (i, name) in names.iter().enumerate() {
        counts.set(schema.table_named(name).unwrap().id, 10 * (i as u64 + 1));
    }
    let estimator =
        new_cost_estimator(schema.clone(), Arc::new(counts), EstimatorConfig::default()).unwrap();
    let tree = Arc::new(TableGroupJoinTree::for_group(&schema, schema.groups()[0].id).unwrap());
    // Root plus every leaf: one side branch each.
    let required: Arc<RequiredTables> = Arc::new(
        names
            .iter()
            .filter(|n| n.as_str() == "t0" || n.matches('_').count() == 2)
            .map(|n| schema.table_named(n).unwrap().id)
            .collect(),
    );
    let root = schema.table_named("t0").unwrap().id;
    let index = schema.index_named("t0_label").unwrap().id;

    c.bench_function("flatten_sort_with_limit", |bench| {
        bench.iter(|| {
            let mut plan = PlanCostEstimator::new(&estimator);
            plan.index_scan(IndexScan::Single(SingleIndexScan::full(index)))
                .flatten(tree.clone(), root, required.clone())
                .unwrap()
                .sort(2)
                .unwrap()
                .set_limit(50)
                .unwrap();
            plan.cost_estimate().unwrap()
        })
    });
}

criterion_group!(costing, bench_statistics_cache, bench_plan_estimate);
criterion_main!(costing);
