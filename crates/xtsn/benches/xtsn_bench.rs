use criterion::{criterion_group, criterion_main, Criterion, Throughput};
use rand::{RngCore, SeedableRng};
use rand_chacha::ChaCha20Rng;

use xtsn::{Backend, Direction, SectorParams, Xtsn};
use xtsn_aes::{encrypt_block, expand_key};

fn bench_block(c: &mut Criterion) {
    let mut rng = ChaCha20Rng::from_seed([1u8; 32]);
    let mut key = [0u8; 16];
    let mut block = [0u8; 16];
    rng.fill_bytes(&mut key);
    rng.fill_bytes(&mut block);
    let schedule = expand_key(&key);

    let mut group = c.benchmark_group("block");
    group.throughput(Throughput::Bytes(16));
    group.bench_function("software_encrypt", |b| {
        b.iter(|| encrypt_block(&block, &schedule));
    });
    group.bench_function("expand_key", |b| {
        b.iter(|| expand_key(&key));
    });
    group.finish();
}

fn bench_engine(c: &mut Criterion) {
    let mut rng = ChaCha20Rng::from_seed([2u8; 32]);
    let mut crypt = [0u8; 16];
    let mut tweak = [0u8; 16];
    rng.fill_bytes(&mut crypt);
    rng.fill_bytes(&mut tweak);
    let xtsn = Xtsn::from_keys(&crypt, &tweak);
    let mut data = vec![0u8; 64 * 1024];
    rng.fill_bytes(&mut data);

    let mut backends = vec![Backend::Software];
    let active = Backend::active();
    if active.is_accelerated() {
        backends.push(active);
    }

    let mut group = c.benchmark_group("engine");
    group.sample_size(20);
    group.throughput(Throughput::Bytes(data.len() as u64));
    for backend in &backends {
        for (label, params) in [
            ("nand_0x4000", SectorParams::new(0x4000)),
            ("sector_0x200_skip", SectorParams::default().with_skip(0x1f0)),
        ] {
            group.bench_function(format!("{}_{label}", backend.name()), |b| {
                b.iter(|| {
                    xtsn.crypt(backend, Direction::Decrypt, &data, 0x30u64, params)
                        .unwrap()
                });
            });
        }
    }
    group.finish();
}

criterion_group!(benches, bench_block, bench_engine);
criterion_main!(benches);
