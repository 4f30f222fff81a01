use criterion::{BenchmarkId, Criterion, Throughput, black_box, criterion_group, criterion_main};
use field_calculator::calculator::{CalculatorOptions, FieldCalculator};
use field_calculator::strategy::Directive;
use field_calculator::types::{DataSet, DataType, Field, Schema, Value};
use geo::{Geometry, point};
use serde_json::json;

fn make_dataset(rows: usize) -> DataSet {
    let schema = Schema::new(vec![
        Field::new("len", DataType::Float64),
        Field::new("time", DataType::Float64),
        Field::new("class", DataType::Int64),
        Field::new("geom", DataType::Geometry),
    ]);
    let data = (0..rows)
        .map(|i| {
            vec![
                Value::Float64((i % 500) as f64 * 1.5 + 1.0),
                Value::Float64((i % 13) as f64 + 0.5),
                Value::Int64((i % 5) as i64),
                Value::Geometry(Geometry::Point(point!(x: (i % 97) as f64, y: (i % 89) as f64))),
            ]
        })
        .collect();
    DataSet::new(schema, data)
        .with_geometry_column("geom")
        .expect("geom column is a geometry column")
}

fn bench_strategies(c: &mut Criterion) {
    let directives = [
        (
            "vector",
            json!({"strategy": "vector", "expression": "(!len! / !time!) ** 2"}),
        ),
        (
            "conditional",
            json!({
                "strategy": "conditional",
                "rules": [
                    {"if": "class == 0 and len > 300", "then": "a"},
                    {"if": "class < 3", "then": "b"}
                ],
                "else": "c"
            }),
        ),
        (
            "spatial",
            json!({
                "strategy": "spatial",
                "operations": [{"method": "buffer", "args": [1.0]}, {"method": "area"}]
            }),
        ),
    ];

    let mut group = c.benchmark_group("strategies");
    for rows in [1_000usize, 10_000] {
        let base = make_dataset(rows);
        group.throughput(Throughput::Elements(rows as u64));
        for (name, payload) in &directives {
            let directive = Directive::from_json(payload).expect("valid directive");
            for (mode, threshold) in [("seq", usize::MAX), ("par", 1_024)] {
                let calc = FieldCalculator::new(CalculatorOptions {
                    parallel_min_rows: threshold,
                    ..Default::default()
                })
                .expect("calculator");
                group.bench_with_input(
                    BenchmarkId::new(format!("{name}/{mode}"), rows),
                    &base,
                    |b, base| {
                        b.iter(|| {
                            let mut ds = base.clone();
                            calc.calculate(&mut ds, &directive, "out").expect("calculation");
                            black_box(ds)
                        })
                    },
                );
            }
        }
    }
    group.finish();
}

criterion_group!(benches, bench_strategies);
criterion_main!(benches);
