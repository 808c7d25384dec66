//! Benchmarks for dnsfilter query decisions.
//!
//! Run with: cargo bench
//!
//! This benchmark suite measures:
//! - Rule list query throughput with and without an allow list
//! - Scalability with different rule list sizes
//! - Engine rebuild cost

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use dnsfilter::manager::build_engine;
use dnsfilter::{
    Config, DnsFilter, FilterContext, Filter, RecordType, RequestFilteringSettings,
};
use std::sync::Arc;

/// Generate a rule list with network, wildcard and host rules.
fn generate_rules(domain_count: usize, host_count: usize) -> String {
    let mut rules = String::new();
    for i in 0..domain_count {
        rules.push_str(&format!("||domain{}.example.com^\n", i));
    }
    for i in 0..domain_count / 100 {
        rules.push_str(&format!("||ads{}*.example.net^\n", i));
    }
    for i in 0..host_count {
        rules.push_str(&format!("0.0.0.0 host{}.example.org\n", i));
    }
    rules
}

/// Generate test queries, a mix of hits and misses.
fn generate_queries(count: usize, hit_ratio: f64) -> Vec<String> {
    let hits = (count as f64 * hit_ratio) as usize;
    let mut queries = Vec::with_capacity(count);
    for i in 0..hits {
        if i % 2 == 0 {
            queries.push(format!("sub.domain{}.example.com", i % 1000));
        } else {
            queries.push(format!("host{}.example.org", i % 1000));
        }
    }
    for i in hits..count {
        queries.push(format!("unknown{}.nonexistent.org", i));
    }
    queries
}

fn filter(block: String, allow: String) -> DnsFilter {
    let config = Config::default();
    let context = Arc::new(FilterContext::new(&config));
    let filter = DnsFilter::with_context(config, context);
    filter
        .set_filters(vec![Filter::inline(block)], vec![Filter::inline(allow)], false)
        .unwrap();
    filter
}

fn settings() -> RequestFilteringSettings {
    RequestFilteringSettings {
        filtering_enabled: true,
        ..Default::default()
    }
}

/// Benchmark check_host throughput.
fn bench_check_host(c: &mut Criterion) {
    let settings = settings();
    let queries = generate_queries(1000, 0.8);

    let mut group = c.benchmark_group("check_host");
    group.throughput(Throughput::Elements(queries.len() as u64));

    let block_only = filter(generate_rules(10_000, 5_000), String::new());
    group.bench_function("block_only", |b| {
        b.iter(|| {
            for query in &queries {
                black_box(block_only.check_host(query, RecordType::A, &settings).unwrap());
            }
        })
    });

    let allow: String = (0..1000)
        .map(|i| format!("@@||domain{}.example.com^\n", i * 2))
        .collect();
    let with_allow = filter(generate_rules(10_000, 5_000), allow);
    group.bench_function("with_allow_list", |b| {
        b.iter(|| {
            for query in &queries {
                black_box(with_allow.check_host(query, RecordType::A, &settings).unwrap());
            }
        })
    });

    group.finish();
}

/// Benchmark scalability with different rule list sizes.
fn bench_scalability(c: &mut Criterion) {
    let settings = settings();
    let mut group = c.benchmark_group("scalability");

    for size in [100, 1_000, 10_000, 50_000].iter() {
        let filter = filter(generate_rules(*size, size / 2), String::new());
        let queries: Vec<_> = (0..100)
            .map(|i| format!("domain{}.example.com", i % size))
            .collect();

        group.throughput(Throughput::Elements(100));
        group.bench_with_input(BenchmarkId::new("rules", size), size, |b, _| {
            b.iter(|| {
                for query in &queries {
                    black_box(filter.check_host(query, RecordType::A, &settings).unwrap());
                }
            })
        });
    }

    group.finish();
}

/// Benchmark building an engine from rule text.
fn bench_build_engine(c: &mut Criterion) {
    let rules = generate_rules(10_000, 5_000);
    let filters = vec![Filter::inline(rules)];

    c.bench_function("build_engine_15k", |b| {
        b.iter(|| black_box(build_engine(&filters).unwrap()))
    });
}

criterion_group!(benches, bench_check_host, bench_scalability, bench_build_engine);
criterion_main!(benches);
