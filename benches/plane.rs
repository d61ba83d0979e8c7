use criterion::{
    criterion_group, criterion_main, AxisScale, BenchmarkId, Criterion, PlotConfiguration,
    Throughput,
};
use hyperstack::{
    element::ElementBuffer,
    plane::{deinterleave_rgb, interleave_rgb, pack_rgb, unpack_rgb, PlaneShape},
};

fn plane_rgb(c: &mut Criterion) {
    let plot_config = PlotConfiguration::default().summary_scale(AxisScale::Logarithmic);
    let mut group = c.benchmark_group("plane_rgb");
    group.plot_config(plot_config);

    for size in [64usize, 256, 1024, 2048] {
        let shape = PlaneShape::new(size, size);
        let num_bytes = shape.num_elements() * 3;
        let interleaved = ElementBuffer::UInt8((0..num_bytes).map(|i| (i % 251) as u8).collect());
        let [r, g, b] = deinterleave_rgb(&interleaved, shape).unwrap();
        group.throughput(Throughput::Bytes(num_bytes as u64));
        group.bench_function(BenchmarkId::new("deinterleave", num_bytes), |bench| {
            bench.iter(|| deinterleave_rgb(&interleaved, shape).unwrap());
        });
        group.bench_function(BenchmarkId::new("interleave", num_bytes), |bench| {
            bench.iter(|| interleave_rgb(&r, &g, &b).unwrap());
        });

        let [ElementBuffer::UInt8(r), ElementBuffer::UInt8(g), ElementBuffer::UInt8(b)] = [r, g, b] else {
            unreachable!()
        };
        let pixels = pack_rgb(&r, &g, &b);
        group.bench_function(BenchmarkId::new("pack", num_bytes), |bench| {
            bench.iter(|| pack_rgb(&r, &g, &b));
        });
        group.bench_function(BenchmarkId::new("unpack", num_bytes), |bench| {
            bench.iter(|| unpack_rgb(&pixels));
        });
    }
}

criterion_group!(benches, plane_rgb);
criterion_main!(benches);
