#![allow(missing_docs)]
use criterion::{Criterion, criterion_group, criterion_main};
use strand::format::{Endian, PointerWidth};
use strand::link::link;
use strand::schema::{SchemaBuilder, SchemaTable};
use strand::NullReport;

/// `structs` structs, each nesting the previous one and adding `fields` scalars.
fn wide_schema(structs: usize, fields: usize, renamed: bool) -> Vec<u8> {
    let names: Vec<String> = (0..structs).map(|i| format!("Struct{i}")).collect();
    let members: Vec<Vec<(String, String)>> = (0..structs)
        .map(|i| {
            let mut m: Vec<(String, String)> = (0..fields)
                .map(|f| {
                    let ty = if renamed && f % 3 == 0 { "double" } else { "float" };
                    (ty.to_string(), format!("field{f}"))
                })
                .collect();
            if i > 0 {
                m.push((names[i - 1].clone(), "inner".to_string()));
                m.push((names[i - 1].clone(), "*link".to_string()));
            }
            m
        })
        .collect();

    let mut builder = SchemaBuilder::new(PointerWidth::Eight).with_primitives();
    for (name, fields) in names.iter().zip(&members) {
        let refs: Vec<(&str, &str)> =
            fields.iter().map(|(t, n)| (t.as_str(), n.as_str())).collect();
        builder = builder.structure(name, &refs);
    }
    builder.build().expect("Failed to build schema")
}

fn bench_schema(c: &mut Criterion) {
    let file_blob = wide_schema(24, 32, false);
    let memory_blob = wide_schema(24, 32, true);

    let mut group = c.benchmark_group("Schema");

    group.bench_function("compile", |b| {
        b.iter(|| {
            let table = SchemaTable::compile(&file_blob, PointerWidth::Eight, Endian::native())
                .expect("Failed to compile");
            std::hint::black_box(table.structs().len());
        });
    });

    let memory = SchemaTable::compile(&memory_blob, PointerWidth::Eight, Endian::native())
        .expect("Failed to compile");
    group.bench_function("link", |b| {
        b.iter_batched(
            || {
                SchemaTable::compile(&file_blob, PointerWidth::Eight, Endian::native())
                    .expect("Failed to compile")
            },
            |mut file| {
                let result = link(&mut file, &memory, "Link", &NullReport).expect("Failed to link");
                std::hint::black_box(result.stats());
            },
            criterion::BatchSize::SmallInput,
        );
    });

    group.finish();
}

criterion_group!(benches, bench_schema);
criterion_main!(benches);
