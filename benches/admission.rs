use std::hint::black_box;
use std::time::Duration;

use criterion::{Criterion, criterion_group, criterion_main};

use riftrelay::{Admission, LimitSpec, Limiter, LimiterConfig, Priority, RouteTable};

fn bench_route_parsing(c: &mut Criterion) {
    let mut group = c.benchmark_group("route/parse_path");
    group.sample_size(200);

    let table = RouteTable::with_patterns([
        "/lol/match/v5/matches/{id}",
        "/lol/match/v5/matches/by-puuid/{puuid}/ids",
        "/riot/account/v1/accounts/by-riot-id/{gameName}/{tagLine}",
    ]);

    group.bench_function("literal", |b| {
        b.iter(|| black_box(table.parse_path(black_box("/na1/lol/status/v4/platform-data"))));
    });

    group.bench_function("templated", |b| {
        b.iter(|| {
            black_box(table.parse_path(black_box("/americas/lol/match/v5/matches/NA1_1234567")))
        });
    });

    group.finish();
}

fn bench_admit(c: &mut Criterion) {
    let mut group = c.benchmark_group("limiter/admit");
    group.sample_size(50);

    let rt = tokio::runtime::Runtime::new().expect("tokio runtime");
    let limiter = rt.block_on(async {
        Limiter::new(LimiterConfig {
            key_count: 4,
            queue_capacity: 4096,
            default_app_limits: vec![LimitSpec {
                limit: 10_000_000,
                window: Duration::from_secs(1),
            }],
            ..LimiterConfig::default()
        })
        .expect("valid limiter config")
    });

    group.bench_function("high_priority_uncontended", |b| {
        b.to_async(&rt).iter(|| {
            let limiter = limiter.clone();
            async move {
                black_box(
                    limiter
                        .admit(Admission {
                            region: "na1".to_string(),
                            bucket: "na1:lol/status/v4/platform-data".to_string(),
                            priority: Priority::High,
                        })
                        .await,
                )
            }
        });
    });

    group.finish();
}

criterion_group!(benches, bench_route_parsing, bench_admit);
criterion_main!(benches);
