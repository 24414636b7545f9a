//! Interpreter throughput on the host reference backend.
//!
//! Measures the dispatch loop itself (plan resolution, slot aliasing,
//! per-texel kernel evaluation) without any GPU in the way.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use texelnet::{CpuRaster, KernelSpec, Net, NetPlan, SlotSpec, StepSpec, WeightStore};

const SCALE: &str = "kernel:scale";
const ADD_PAIR: &str = "kernel:add_pair";

fn backend() -> CpuRaster {
    let mut r = CpuRaster::new();
    r.register(SCALE, 1, |f| f.fetch(0, f.index() as i64) * 2.0);
    r.register(ADD_PAIR, 2, |f| {
        let i = f.index() as i64;
        f.fetch(0, i) + f.fetch(1, i)
    });
    r
}

fn empty_container() -> Vec<u8> {
    let header = "{}";
    let mut data = (header.len() as u64).to_le_bytes().to_vec();
    data.extend_from_slice(header.as_bytes());
    data
}

fn two_step_net(elements: usize) -> Net<CpuRaster> {
    let plan = NetPlan {
        slots: vec![
            SlotSpec { elements, weight: None },
            SlotSpec { elements, weight: None },
            SlotSpec { elements, weight: None },
        ],
        kernels: vec![
            KernelSpec { name: "scale".into(), source: SCALE.into() },
            KernelSpec { name: "add".into(), source: ADD_PAIR.into() },
        ],
        steps: vec![
            StepSpec { kernel: 0, output: 1, inputs: vec![0] },
            StepSpec { kernel: 1, output: 2, inputs: vec![0, 1] },
        ],
        input: 0,
        output: 2,
    };
    let store = WeightStore::parse(empty_container()).unwrap();
    Net::setup(backend(), &plan, &store).unwrap()
}

fn bench_reference_infer(c: &mut Criterion) {
    let mut group = c.benchmark_group("reference_infer");

    for elements in [4096usize, 65536, 262144] {
        let mut net = two_step_net(elements);
        let input: Vec<f32> = (0..elements).map(|i| i as f32 * 0.001).collect();

        group.bench_with_input(BenchmarkId::new("two_step", elements), &elements, |b, _| {
            b.iter(|| {
                let out = net.infer_f32(black_box(&input)).unwrap();
                black_box(out);
            });
        });
    }

    group.finish();
}

criterion_group!(benches, bench_reference_infer);
criterion_main!(benches);
