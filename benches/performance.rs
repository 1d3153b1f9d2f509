//! Performance benchmarks for the hot paths of a speed run
//!
//! The pool coordinator reduces sample series on every phase, selection ranks
//! every probed candidate, and discovery parses the full server list, so these
//! are the pieces measured here.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use dsl_speed_observer::{
    cli::Cli,
    config::ConfigParser,
    discovery::{parse_client_config, parse_server_list},
    engine::{aggregate, rank, steady_state_mbps, ThroughputSample},
    models::{Server, SessionRecord},
    stats::LatencyStatistics,
    types::MeasurementMode,
};
use clap::Parser;
use std::time::Duration;

/// A ramping sample series at one tick per 100ms
fn create_sample_series(count: usize) -> Vec<ThroughputSample> {
    let mut bytes = 0u64;
    (1..=count)
        .map(|i| {
            bytes += if i < 10 { 50_000 * i as u64 } else { 500_000 };
            ThroughputSample::new(Duration::from_millis(100 * i as u64), bytes)
        })
        .collect()
}

fn create_servers(count: usize) -> Vec<Server> {
    (0..count)
        .map(|i| {
            let mut server = Server::new(i.to_string(), format!("Server {}", i), "http://s/upload.php")
                .with_location("Nowhere", "Bench", (i * 37 % 500) as f64);
            if i % 7 != 0 {
                server.latency = Some(Duration::from_micros(5_000 + (i as u64 * 7919) % 40_000));
            }
            server
        })
        .collect()
}

fn create_records(count: usize) -> Vec<SessionRecord> {
    create_servers(count)
        .into_iter()
        .enumerate()
        .map(|(i, mut server)| {
            server.download_mbps = Some(50.0 + i as f64);
            server.upload_mbps = Some(10.0 + i as f64 / 2.0);
            SessionRecord::completed(server, MeasurementMode::Full, Vec::new())
        })
        .collect()
}

fn create_server_list_json(count: usize) -> String {
    let entries: Vec<String> = (0..count)
        .map(|i| {
            format!(
                r#"{{"url":"http://s{i}.example.net:8080/speedtest/upload.php","lat":"{lat}","lon":"{lon}","distance":{i},"name":"City {i}","country":"Country","sponsor":"Sponsor","id":"{i}","host":"s{i}.example.net:8080"}}"#,
                i = i,
                lat = 10.0 + i as f64 / 100.0,
                lon = 20.0 - i as f64 / 100.0,
            )
        })
        .collect();
    format!("[{}]", entries.join(","))
}

/// Benchmark steady-state rate reduction over sample series
fn benchmark_steady_state(c: &mut Criterion) {
    let mut group = c.benchmark_group("steady_state");

    for size in [10, 90, 600].iter() {
        let samples = create_sample_series(*size);
        group.bench_with_input(BenchmarkId::new("steady_state_mbps", size), size, |b, _| {
            b.iter(|| black_box(steady_state_mbps(black_box(&samples), Duration::from_secs(1))));
        });
    }

    group.finish();
}

/// Benchmark candidate ranking and latency statistics
fn benchmark_selection(c: &mut Criterion) {
    let mut group = c.benchmark_group("selection");

    for size in [10, 100, 1000].iter() {
        let servers = create_servers(*size);
        group.bench_with_input(BenchmarkId::new("rank", size), size, |b, _| {
            b.iter(|| {
                let mut servers = servers.clone();
                rank(&mut servers);
                black_box(servers);
            });
        });
    }

    let samples: Vec<Duration> = (0..100).map(|i| Duration::from_micros(8_000 + i * 37 % 900)).collect();
    group.bench_function("latency_statistics", |b| {
        b.iter(|| black_box(LatencyStatistics::from_samples(black_box(&samples))));
    });

    group.finish();
}

/// Benchmark averaging across completed sessions
fn benchmark_aggregation(c: &mut Criterion) {
    let mut group = c.benchmark_group("aggregation");

    for size in [2, 10, 100].iter() {
        let records = create_records(*size);
        group.bench_with_input(BenchmarkId::new("aggregate", size), size, |b, _| {
            b.iter(|| black_box(aggregate(black_box(&records)).unwrap()));
        });
    }

    group.finish();
}

/// Benchmark discovery document parsing
fn benchmark_discovery_parsing(c: &mut Criterion) {
    let mut group = c.benchmark_group("discovery");

    let xml = r#"<settings><client ip="203.0.113.7" lat="35.6895" lon="139.6917" isp="Example ISP" isprating="3.7" /></settings>"#;
    group.bench_function("parse_client_config", |b| {
        b.iter(|| black_box(parse_client_config(black_box(xml)).unwrap()));
    });

    for size in [10, 100].iter() {
        let json = create_server_list_json(*size);
        group.bench_with_input(BenchmarkId::new("parse_server_list", size), size, |b, _| {
            b.iter(|| black_box(parse_server_list(black_box(&json)).unwrap()));
        });
    }

    group.finish();
}

/// Benchmark configuration parsing from CLI arguments
fn benchmark_config_parsing(c: &mut Criterion) {
    let mut group = c.benchmark_group("config_parsing");

    let args = ["dso", "--server", "1234", "--count", "5", "--timeout", "10", "--saving-mode"];
    group.bench_function("parse_cli_args", |b| {
        b.iter(|| black_box(Cli::try_parse_from(black_box(&args)).unwrap()));
    });

    group.bench_function("parse_from_cli", |b| {
        let cli = Cli::try_parse_from(args).unwrap();
        b.iter(|| {
            let parser = ConfigParser::new(black_box(cli.clone()));
            black_box(parser.parse())
        });
    });

    group.finish();
}

criterion_group!(
    benches,
    benchmark_steady_state,
    benchmark_selection,
    benchmark_aggregation,
    benchmark_discovery_parsing,
    benchmark_config_parsing
);
criterion_main!(benches);
