use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};

use pmemkv_breakdown::config::Phase;
use pmemkv_breakdown::convergence::is_stable;
use pmemkv_breakdown::sampler::{PhaseBatches, SampleBatch};
use pmemkv_breakdown::test_utils::BenchmarkOutput;
use pmemkv_breakdown::{
    parse_output, AggregatedRecord, BenchmarkConfiguration, RoundingPolicy, SchemaVariant,
    SeriesBuilder,
};

fn sample_output(seed: u64) -> String {
    (1..=17).fold(BenchmarkOutput::new(1_000_000), |output, line| {
        if line == 6 {
            output
        } else {
            output.line(line, 1_000 + seed * 7 + line as u64 * 311)
        }
    })
    .render()
}

fn bench_parse(c: &mut Criterion) {
    let mut group = c.benchmark_group("parse");
    let output = sample_output(1);
    for variant in SchemaVariant::ALL {
        let schema = variant.schema();
        group.bench_with_input(BenchmarkId::from_parameter(variant), &output, |b, output| {
            b.iter(|| {
                let parsed = parse_output(black_box(output), &schema).unwrap();
                parsed.percentages(&schema).unwrap()
            })
        });
    }
    group.finish();
}

fn bench_convergence_check(c: &mut Criterion) {
    let schema = SchemaVariant::PmdkKvPool.schema();
    let load = SampleBatch::new(
        (0..5)
            .map(|seed| {
                parse_output(&sample_output(seed), &schema)
                    .and_then(|parsed| parsed.percentages(&schema))
                    .unwrap()
            })
            .collect(),
    );
    let batches = PhaseBatches {
        update: load.clone(),
        load,
    };
    c.bench_function("is_stable", |b| b.iter(|| is_stable(black_box(&batches), 0.1)));
}

fn bench_series(c: &mut Criterion) {
    let schema = SchemaVariant::PmdkKvNoMaintenance.schema();
    let batch = SampleBatch::new(
        (0..5)
            .map(|seed| {
                parse_output(&sample_output(seed), &schema)
                    .and_then(|parsed| parsed.percentages(&schema))
                    .unwrap()
            })
            .collect(),
    );
    let records: Vec<AggregatedRecord> = [1024, 2048, 4096, 8192]
        .into_iter()
        .map(|size| {
            AggregatedRecord::from_batch(
                BenchmarkConfiguration::new(size, Phase::Load),
                &batch,
                &schema,
                0.1,
                1,
            )
            .unwrap()
        })
        .collect();
    let refs: Vec<&AggregatedRecord> = records.iter().collect();
    let builder = SeriesBuilder::new(&schema, RoundingPolicy::Ceil);

    c.bench_function("series_build", |b| {
        b.iter(|| {
            for subsystem in schema.subsystems() {
                black_box(builder.build(subsystem, black_box(&refs)).unwrap());
            }
        })
    });
}

criterion_group!(benches, bench_parse, bench_convergence_check, bench_series);
criterion_main!(benches);
