#![allow(missing_docs)]

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use tabulens::fixture::TableImageBuilder;
use tabulens::stats::inv_sqrt;
use tabulens::{DisplayRecord, Inspector, LayoutDescriptor, Role, U64Decoder};

fn bench_traverse(c: &mut Criterion) {
    let mut group = c.benchmark_group("traverse");
    for &count in &[100u64, 1500] {
        let mut builder = TableImageBuilder::new(LayoutDescriptor::new(Role::Set), 8);
        for i in 0..count {
            builder = builder.push_u64(i * 13 + 7);
        }
        let (image, table) = builder.build();
        let inspector = Inspector::new(image);
        group.bench_function(format!("set_{count}"), |b| {
            b.iter(|| {
                let records: Vec<DisplayRecord> = inspector
                    .traverse(black_box(&table), &U64Decoder)
                    .expect("raw pointers always resolve")
                    .collect();
                black_box(records)
            })
        });
    }
    group.finish();
}

fn bench_inv_sqrt(c: &mut Criterion) {
    c.bench_function("inv_sqrt", |b| {
        b.iter(|| {
            let mut acc = 0.0f64;
            for x in 1..64u32 {
                acc += inv_sqrt(black_box(f64::from(x) * 0.37));
            }
            black_box(acc)
        })
    });
}

criterion_group!(benches, bench_traverse, bench_inv_sqrt);
criterion_main!(benches);
