//! 합의 분석 및 CLI 출력 파서 벤치마크
//!
//! 노드 수에 따른 `analyze_consensus` 비용과 `node list`/`block list` 파싱 처리량을 측정합니다.

use std::collections::BTreeSet;

use criterion::{BenchmarkId, Criterion, Throughput, black_box, criterion_group, criterion_main};
use stage_env_monitoring::parse;
use stage_env_monitoring::{NodeMetrics, analyze_consensus};

fn address(i: usize) -> String {
    format!("A1B2::C3D4::0000::{i:04X}")
}

fn cluster(size: usize) -> Vec<NodeMetrics> {
    let list: BTreeSet<String> = (0..size).map(address).collect();
    (0..size)
        .map(|i| NodeMetrics {
            node_id: format!("node{}", i + 1),
            node_addr: Some(address(i)),
            node_list: list.clone(),
            chain_blocks: 1024,
            chain_last_hash: Some("0x9f3c".to_owned()),
            is_online: i % 7 != 6,
            ..NodeMetrics::default()
        })
        .collect()
}

fn bench_analyze(c: &mut Criterion) {
    let mut group = c.benchmark_group("analyze_consensus");
    for size in [3usize, 6, 16, 64] {
        let metrics = cluster(size);
        group.throughput(Throughput::Elements(size as u64));
        group.bench_with_input(BenchmarkId::from_parameter(size), &metrics, |b, m| {
            b.iter(|| analyze_consensus(black_box(m), size))
        });
    }
    group.finish();
}

fn bench_parsers(c: &mut Criterion) {
    let node_list: String = (0..64).map(|i| format!("node addr: {}  ipv4: 10.0.0.{i}\n", address(i))).collect();
    let block_list: String = (0..10)
        .map(|i| format!("block #{} hash: 0x{:064X}\n  datum: 0x{:064X}\n", 1000 + i, i, i * 31))
        .collect();
    let datum = format!("0x{:064X}", 9 * 31);

    let mut group = c.benchmark_group("cli_parsers");
    group.bench_function("node_list_64", |b| {
        b.iter(|| parse::parse_node_list(black_box(&node_list)))
    });
    group.bench_function("chain_tip_10", |b| {
        b.iter(|| parse::parse_chain_tip(black_box(&block_list)))
    });
    group.bench_function("find_datum_block_10", |b| {
        b.iter(|| parse::find_datum_block(black_box(&block_list), black_box(&datum)))
    });
    group.finish();
}

criterion_group!(benches, bench_analyze, bench_parsers);
criterion_main!(benches);
