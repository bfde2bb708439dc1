// Signing & recovery benchmarks for tally.
//
// Covers secp256k1 keypair generation, pre-hash signing, signer recovery and
// recovery over batches of distinct signers.

use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};

use tally_protocol::crypto::{keccak, recover_signer, Keypair};
use tally_protocol::B256;

fn message_hash(i: u64) -> B256 {
    keccak(format!("transferPreSigned to bob; value=500; nonce={i}").as_bytes())
}

fn bench_keypair_generation(c: &mut Criterion) {
    c.bench_function("secp256k1/keypair_generate", |b| {
        b.iter(Keypair::generate);
    });
}

fn bench_sign_hash(c: &mut Criterion) {
    let keypair = Keypair::generate();
    let hash = message_hash(42);

    c.bench_function("secp256k1/sign_hash", |b| {
        b.iter(|| keypair.sign_hash(&hash).unwrap());
    });
}

fn bench_recover_signer(c: &mut Criterion) {
    let keypair = Keypair::generate();
    let hash = message_hash(42);
    let signature = keypair.sign_hash(&hash).unwrap();

    c.bench_function("secp256k1/recover_signer", |b| {
        b.iter(|| recover_signer(&hash, &signature).unwrap());
    });
}

fn bench_recover_batch(c: &mut Criterion) {
    let mut group = c.benchmark_group("secp256k1/recover_batch");

    for size in [10u64, 50, 100] {
        let items: Vec<_> = (0..size)
            .map(|i| {
                let kp = Keypair::generate();
                let hash = message_hash(i);
                let sig = kp.sign_hash(&hash).unwrap();
                (kp.address(), hash, sig)
            })
            .collect();

        group.throughput(Throughput::Elements(size));
        group.bench_with_input(BenchmarkId::from_parameter(size), &items, |b, items| {
            b.iter(|| {
                for (address, hash, sig) in items {
                    assert_eq!(recover_signer(hash, sig).unwrap(), *address);
                }
            });
        });
    }

    group.finish();
}

criterion_group!(
    benches,
    bench_keypair_generation,
    bench_sign_hash,
    bench_recover_signer,
    bench_recover_batch,
);
criterion_main!(benches);
