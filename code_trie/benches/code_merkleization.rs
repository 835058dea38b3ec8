//! Benchmarks chunking and committing contract code of typical sizes, and
//! proving accesses to it.

use code_trie::{
    chunk::chunkify,
    commitment::{merkleize_with, CommitmentBackend},
    contract::Contract,
};
use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use rand::{rngs::StdRng, Rng, SeedableRng};

const CODE_SIZES: [usize; 3] = [1_000, 8_000, 24_576];

/// Random code in which every `PUSH` carries its full immediate.
fn random_code(len: usize) -> Vec<u8> {
    let mut rng = StdRng::seed_from_u64(len as u64);
    let mut code = Vec::with_capacity(len + 32);

    while code.len() < len {
        match rng.gen_bool(0.25) {
            true => {
                let op = rng.gen_range(0x60..=0x7f_u8);
                code.push(op);
                code.extend((0..=op - 0x60).map(|_| rng.gen::<u8>()));
            }
            false => code.push(rng.gen_range(0x00..0x60)),
        }
    }

    code.truncate(len);
    code
}

fn chunkify_benchmark(c: &mut Criterion) {
    let mut group = c.benchmark_group("chunkify");

    for size in CODE_SIZES {
        let code = random_code(size);
        group.throughput(Throughput::Bytes(size as u64));
        group.bench_with_input(BenchmarkId::from_parameter(size), &code, |b, code| {
            b.iter(|| chunkify(code, 32).unwrap())
        });
    }

    group.finish()
}

fn merkleize_benchmark(c: &mut Criterion) {
    let mut group = c.benchmark_group("merkleize");

    for backend in CommitmentBackend::ALL {
        for size in CODE_SIZES {
            let code = random_code(size);
            group.throughput(Throughput::Bytes(size as u64));
            group.bench_with_input(
                BenchmarkId::new(format!("{backend:?}"), size),
                &code,
                |b, code| b.iter(|| merkleize_with(code, 32, backend).unwrap()),
            );
        }
    }

    group.finish()
}

fn prove_benchmark(c: &mut Criterion) {
    let mut group = c.benchmark_group("prove");

    for size in CODE_SIZES {
        let mut contract = Contract::new(random_code(size));
        contract.touch_range(0, size / 2).unwrap();

        group.bench_with_input(BenchmarkId::from_parameter(size), &contract, |b, contract| {
            b.iter(|| contract.prove().unwrap())
        });
    }

    group.finish()
}

criterion_group!(
    name = benches;
    config = Criterion::default().sample_size(10);
    targets = chunkify_benchmark, merkleize_benchmark, prove_benchmark);
criterion_main!(benches);
