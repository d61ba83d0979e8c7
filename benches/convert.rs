use criterion::{
    criterion_group, criterion_main, AxisScale, BenchmarkId, Criterion, PlotConfiguration,
    Throughput,
};
use hyperstack::{
    convert::{narrow, NarrowPolicy},
    element::{ElementBuffer, ElementType},
};

fn convert_narrow(c: &mut Criterion) {
    let plot_config = PlotConfiguration::default().summary_scale(AxisScale::Logarithmic);
    let mut group = c.benchmark_group("convert_narrow");
    group.plot_config(plot_config);

    for size in [32u64, 64, 128, 256] {
        let num_elements = size * size * size;
        let float64 = ElementBuffer::Float64((0..num_elements).map(|i| i as f64).collect());
        let int32 = ElementBuffer::Int32((0..num_elements).map(|i| i as i32).collect());
        let uint16 = ElementBuffer::Int16((0..num_elements).map(|i| i as i16).collect());
        group.throughput(Throughput::Elements(num_elements));
        group.bench_function(BenchmarkId::new("float64_to_float32", num_elements), |b| {
            b.iter(|| narrow(float64.clone(), ElementType::FLOAT64, NarrowPolicy::ToFloat32));
        });
        group.bench_function(BenchmarkId::new("int32_to_int16", num_elements), |b| {
            b.iter(|| narrow(int32.clone(), ElementType::INT32, NarrowPolicy::ToInt16Truncate));
        });
        group.bench_function(BenchmarkId::new("uint16_to_float32", num_elements), |b| {
            b.iter(|| narrow(uint16.clone(), ElementType::UINT16, NarrowPolicy::ToFloat32));
        });
    }
}

criterion_group!(benches, convert_narrow);
criterion_main!(benches);
