//! Destination parsing benchmarks.
//!
//! Measures address classification and SOCKS negotiation, the per-connection
//! work done before a relay starts.

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use tokio::io::{AsyncReadExt, AsyncWriteExt};

use proxy_bridge::metadata::{addr_to_metadata, split_host_port};
use proxy_bridge::proxy::socks5::handshake;

fn bench_addr_to_metadata(c: &mut Criterion) {
    let mut group = c.benchmark_group("addr_to_metadata");

    for (name, addr) in [
        ("ipv4", "93.184.216.34:443"),
        ("ipv6", "[2001:db8::1]:443"),
        ("domain", "www.example.com:443"),
    ] {
        group.bench_function(name, |b| b.iter(|| black_box(addr_to_metadata(black_box(addr)))));
    }

    group.bench_function("split_only", |b| {
        b.iter(|| black_box(split_host_port(black_box("www.example.com:443"))))
    });

    group.finish();
}

fn bench_socks5_handshake(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().unwrap();

    let mut request = vec![0x05, 0x01, 0x00, 0x05, 0x01, 0x00, 0x03, 15];
    request.extend_from_slice(b"www.example.com");
    request.extend_from_slice(&443u16.to_be_bytes());
    let request = request.as_slice();

    c.bench_function("socks5_handshake_domain", |b| {
        b.to_async(&rt).iter(|| async move {
            let (mut client, mut server) = tokio::io::duplex(256);
            client.write_all(request).await.unwrap();
            let metadata = handshake(&mut server).await.unwrap();

            let mut reply = [0u8; 12];
            client.read_exact(&mut reply).await.unwrap();
            black_box(metadata)
        })
    });
}

criterion_group!(benches, bench_addr_to_metadata, bench_socks5_handshake);
criterion_main!(benches);
