use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use libpump::protocol::{decode_4b6b, encode_4b6b};

fn bench_fourbsixb(c: &mut Criterion) {
    let mut group = c.benchmark_group("fourbsixb");
    for &size in &[7usize, 71usize, 150usize] {
        let data: Vec<u8> = (0..size).map(|i| (i * 7 & 0xff) as u8).collect();
        let coded = encode_4b6b(&data);
        group.bench_with_input(BenchmarkId::new("encode", size), &data, |b, d| {
            b.iter(|| black_box(encode_4b6b(black_box(d))));
        });
        group.bench_with_input(BenchmarkId::new("decode", size), &coded, |b, d| {
            b.iter(|| black_box(decode_4b6b(black_box(d))));
        });
    }
    group.finish();
}

criterion_group!(benches, bench_fourbsixb);
criterion_main!(benches);
