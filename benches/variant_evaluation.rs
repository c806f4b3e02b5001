use chrono::Utc;
use criterion::{black_box, criterion_group, criterion_main, Criterion, Throughput};

use decider_core::experiments::SimpleExperiment;
use decider_core::{Attributes, ExperimentConfig};

fn experiment(config: &str) -> SimpleExperiment {
    let config: ExperimentConfig = serde_json::from_str(config).unwrap();
    SimpleExperiment::new(&config).unwrap()
}

fn criterion_benchmark(c: &mut Criterion) {
    let now = Utc::now();

    {
        let mut group = c.benchmark_group("bucketing");
        group.throughput(Throughput::Elements(1));
        let exp = experiment(
            r#"{
              "id": 1,
              "name": "bucketing_benchmark",
              "enabled": true,
              "type": "single_variant",
              "start_ts": 0,
              "stop_ts": 4102444800,
              "experiment": {
                "shuffle_version": 1,
                "variants": [
                  {"name": "variant_1", "size": 0.5},
                  {"name": "variant_2", "size": 0.5}
                ]
              }
            }"#,
        );
        let args: Attributes = [("user_id".to_owned(), "subject1".into())].into();
        group.bench_function("variant", |b| {
            b.iter(|| exp.variant_at(black_box(&args), black_box(now)))
        });
        group.finish();
    }

    {
        let mut group = c.benchmark_group("targeting");
        group.throughput(Throughput::Elements(1));
        let exp = experiment(
            r#"{
              "id": 2,
              "name": "targeting_benchmark",
              "enabled": true,
              "type": "single_variant",
              "start_ts": 0,
              "stop_ts": 4102444800,
              "experiment": {
                "shuffle_version": 1,
                "variants": [
                  {"name": "variant_1", "size": 0.5},
                  {"name": "variant_2", "size": 0.5}
                ],
                "targeting": {"ALL": [
                  {"EQ": {"field": "country", "values": ["us", "ca"]}},
                  {"GE": {"field": "age", "value": 21}}
                ]}
              }
            }"#,
        );
        let args: Attributes = [
            ("user_id".to_owned(), "subject1".into()),
            ("country".to_owned(), "us".into()),
            ("age".to_owned(), 30.into()),
        ]
        .into();
        group.bench_function("variant", |b| {
            b.iter(|| exp.variant_at(black_box(&args), black_box(now)))
        });
        group.finish();
    }

    {
        let mut group = c.benchmark_group("override");
        group.throughput(Throughput::Elements(1));
        let exp = experiment(
            r#"{
              "id": 3,
              "name": "override_benchmark",
              "enabled": true,
              "type": "single_variant",
              "start_ts": 0,
              "stop_ts": 4102444800,
              "experiment": {
                "shuffle_version": 1,
                "variants": [
                  {"name": "variant_1", "size": 0.5},
                  {"name": "variant_2", "size": 0.5}
                ],
                "overrides": [
                  {"variant_2": {"EQ": {"field": "user_id", "value": "subject1"}}}
                ]
              }
            }"#,
        );
        let args: Attributes = [("user_id".to_owned(), "subject1".into())].into();
        group.bench_function("variant", |b| {
            b.iter(|| exp.variant_at(black_box(&args), black_box(now)))
        });
        group.finish();
    }
}

criterion_group!(benches, criterion_benchmark);
criterion_main!(benches);
