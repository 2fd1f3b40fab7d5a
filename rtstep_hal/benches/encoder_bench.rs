use criterion::{black_box, criterion_group, criterion_main, Criterion};
use rtstep_hal::encoder::{AxisPinMap, Encoder};

fn axis(n: u8, steps_per_unit: f64) -> AxisPinMap {
    AxisPinMap {
        step_pin: n,
        dir_pin: n + 1,
        step_active_high: true,
        dir_active_high: true,
        steps_per_unit,
        min_pos_limit: -1_000_000.0,
        max_pos_limit: 1_000_000.0,
    }
}

fn six_axis_encoder() -> Encoder {
    Encoder::new([
        axis(2, 2000.0),
        axis(4, 2000.0),
        axis(6, 2000.0),
        axis(8, 2000.0),
        axis(2, 2000.0),
        axis(4, 2000.0),
    ])
}

fn bench_sample_cycle(c: &mut Criterion) {
    c.bench_function("encoder_sample_cycle_6_axis", |b| {
        let mut enc = six_axis_encoder();
        let mut buf = Vec::with_capacity(1 << 16);
        let mut t = 0.0f64;
        b.iter(|| {
            t += 0.001;
            let positions = [t, t * 2.0, t * 0.5, -t, t, t * 1.5];
            enc.sample_cycle(black_box(&mut buf), black_box(&positions));
        });
    });
}

fn bench_sample_cycle_with_direction_reversals(c: &mut Criterion) {
    c.bench_function("encoder_sample_cycle_reversals", |b| {
        let mut enc = six_axis_encoder();
        let mut buf = Vec::with_capacity(1 << 16);
        let mut i = 0i64;
        b.iter(|| {
            i += 1;
            let t = if i % 2 == 0 { i as f64 } else { -(i as f64) };
            let positions = [t, t, t, t, t, t];
            enc.sample_cycle(black_box(&mut buf), black_box(&positions));
        });
    });
}

criterion_group!(benches, bench_sample_cycle, bench_sample_cycle_with_direction_reversals);
criterion_main!(benches);
