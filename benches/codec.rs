use criterion::{black_box, criterion_group, criterion_main, Criterion};
use wasm_syntax::{
    load_binary_module, parse_module, print_module, save_binary_module, CountingWrite,
    FeatureSpec,
};

fn arithmetic_module_text(num_functions: usize) -> String {
    let mut text = String::from("(module (memory 1)\n");
    for index in 0..num_functions {
        text.push_str(&format!(
            "  (func (export \"f{index}\") (param i32 i32) (result i32)\n\
             \x20   local.get 0\n\
             \x20   local.get 1\n\
             \x20   i32.add\n\
             \x20   block (result i32)\n\
             \x20     local.get 0\n\
             \x20     i32.const 16\n\
             \x20     i32.mul\n\
             \x20   end\n\
             \x20   i32.xor)\n"
        ));
    }
    text.push(')');
    text
}

pub fn criterion_benchmark(c: &mut Criterion) {
    let text = arithmetic_module_text(64);
    let (module, errors) = parse_module(&text, FeatureSpec::default());
    assert!(errors.is_empty());
    let binary = save_binary_module(&module).unwrap();

    c.bench_function("parse_text", |b| {
        b.iter(|| {
            let (module, errors) = parse_module(black_box(&text), FeatureSpec::default());
            assert!(errors.is_empty());
            black_box(module)
        })
    });

    c.bench_function("load_binary", |b| {
        b.iter(|| {
            let module = load_binary_module(black_box(&binary), FeatureSpec::default()).unwrap();
            black_box(module)
        })
    });

    c.bench_function("save_binary", |b| {
        b.iter(|| {
            let mut counter = CountingWrite::new();
            wasm_syntax::emit_binary(black_box(&module), &mut counter).unwrap();
            black_box(counter.bytes())
        })
    });

    c.bench_function("print_text", |b| {
        b.iter(|| black_box(print_module(black_box(&module))))
    });
}

criterion_group!(benches, criterion_benchmark);
criterion_main!(benches);
