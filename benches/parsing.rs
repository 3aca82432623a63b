//! Response parsing benchmarks

use criterion::{black_box, criterion_group, criterion_main, Criterion, Throughput};
use switchlink_core::core::protocol::linear::{IdentifyReport, SwitcherParser};
use switchlink_core::core::protocol::matrix::MatrixParser;
use switchlink_core::core::protocol::Response;

fn switcher_benchmark(c: &mut Criterion) {
    let parser = SwitcherParser::new();
    let lines = ["V1 A1 T1 P0 S0 Z0 R0 QSC1.11 QPC1.11 M4", "C3", "AMUT1", "E04", "QSC1.11"];

    let mut group = c.benchmark_group("switcher");
    group.throughput(Throughput::Elements(lines.len() as u64));

    group.bench_function("dispatch", |b| {
        b.iter(|| {
            for line in &lines {
                black_box(parser.parse(&Response::unsolicited(black_box(line))));
            }
        });
    });

    group.bench_function("identify_report", |b| {
        b.iter(|| black_box(IdentifyReport::parse(black_box(lines[0]))));
    });

    group.finish();
}

fn matrix_benchmark(c: &mut Criterion) {
    let parser = MatrixParser::new();
    let verbose = ["V8X4 A8X4", "Out2 In3 Vid", "Out4 In1 All", "E12"];

    let mut group = c.benchmark_group("matrix");
    group.throughput(Throughput::Elements(verbose.len() as u64));

    group.bench_function("verbose", |b| {
        b.iter(|| {
            for line in &verbose {
                black_box(parser.parse(&Response::unsolicited(black_box(line))));
            }
        });
    });

    group.bench_function("terse_correlated", |b| {
        b.iter(|| black_box(parser.parse(&Response::new(Some("3*2%"), black_box("3")))));
    });

    group.finish();
}

criterion_group!(benches, switcher_benchmark, matrix_benchmark);
criterion_main!(benches);
