use criterion::{black_box, criterion_group, criterion_main, Criterion};
use tempfile::TempDir;
use vark::{AppendOptions, Archive, OpenFlags};

fn bench_append(c: &mut Criterion) {
    let data: Vec<u8> = (0..1024 * 1024u32).map(|i| (i % 251) as u8).collect();

    c.bench_function("append_1mb_whole", |b| {
        b.iter(|| {
            let dir = TempDir::new().unwrap();
            let mut ar =
                Archive::create(dir.path().join("w.vark"), OpenFlags::writing().persistent())
                    .unwrap();
            ar.append_bytes("bench.bin", black_box(&data), AppendOptions::whole())
                .unwrap();
            ar.close();
        })
    });

    c.bench_function("append_1mb_sharded", |b| {
        b.iter(|| {
            let dir = TempDir::new().unwrap();
            let mut ar =
                Archive::create(dir.path().join("s.vark"), OpenFlags::writing().persistent())
                    .unwrap();
            ar.append_bytes("bench.bin", black_box(&data), AppendOptions::sharded())
                .unwrap();
            ar.close();
        })
    });
}

fn bench_ranged_reads(c: &mut Criterion) {
    let data: Vec<u8> = (0..8 * 1024 * 1024u32).map(|i| (i % 256) as u8).collect();
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("r.vark");
    {
        let mut ar = Archive::create(&path, OpenFlags::writing()).unwrap();
        ar.append_bytes("bench.bin", &data, AppendOptions::sharded()).unwrap();
        ar.close();
    }

    let mut mapped = Archive::load(&path, OpenFlags::mapped()).unwrap();
    c.bench_function("range_4k_mapped", |b| {
        b.iter(|| {
            mapped
                .decompress_range("bench.bin", black_box(3 * 1024 * 1024 + 17), 4096)
                .unwrap()
        })
    });

    let mut buffered = Archive::load(&path, OpenFlags::reading().persistent()).unwrap();
    c.bench_function("range_4k_buffered", |b| {
        b.iter(|| {
            buffered
                .decompress_range("bench.bin", black_box(3 * 1024 * 1024 + 17), 4096)
                .unwrap()
        })
    });
}

criterion_group!(benches, bench_append, bench_ranged_reads);
criterion_main!(benches);
