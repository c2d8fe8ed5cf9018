use criterion::{black_box, criterion_group, criterion_main, Criterion};
use tenant_observer::collector::{ContainerResources, NamespaceWorkload, PodFootprint, PodPhase};
use tenant_observer::parsing::{parse_cpu_to_millicores, parse_memory_to_bytes};
use tenant_observer::{calculate_snapshot, score_snapshot, ClusterCapacity, HealthPolicy};

fn cpu_parsing_benchmark(c: &mut Criterion) {
    let test_values = vec![
        "100m",
        "1",
        "0.5",
        "2.5",
        "1000000000n",
        "1000000u",
        "500m",
        "1500m",
    ];

    c.bench_function("parse_cpu_to_millicores", |b| {
        b.iter(|| {
            for value in &test_values {
                black_box(parse_cpu_to_millicores(black_box(value)));
            }
        })
    });
}

fn memory_parsing_benchmark(c: &mut Criterion) {
    let test_values = vec![
        "1Ki", "1Mi", "1Gi", "1Ti", "1K", "1M", "1G", "1T", "512Mi", "2.5Gi",
    ];

    c.bench_function("parse_memory_to_bytes", |b| {
        b.iter(|| {
            for value in &test_values {
                black_box(parse_memory_to_bytes(black_box(value)));
            }
        })
    });
}

fn tenant_scoring_benchmark(c: &mut Criterion) {
    // 20 namespaces x 50 pods, a large tenant
    let workloads: Vec<NamespaceWorkload> = (0..20)
        .map(|ns| NamespaceWorkload {
            namespace: format!("tenant-ns-{}", ns),
            pods: (0..50)
                .map(|p| PodFootprint {
                    name: format!("pod-{}", p),
                    phase: if p % 17 == 0 { PodPhase::Pending } else { PodPhase::Running },
                    containers: vec![ContainerResources {
                        name: "app".to_string(),
                        cpu_request: Some(100),
                        cpu_limit: Some(200),
                        memory_request: Some(128 * 1024 * 1024),
                        memory_limit: Some(256 * 1024 * 1024),
                    }],
                })
                .collect(),
            service_count: 3,
            deployment_count: 2,
            statefulset_count: 1,
            config_map_count: 4,
            secret_count: 2,
        })
        .collect();
    let capacity = Some(ClusterCapacity {
        cpu_millicores: 400_000,
        memory_bytes: 1024 * 1024 * 1024 * 1024,
    });
    let policy = HealthPolicy::default();

    c.bench_function("calculate_and_score_tenant", |b| {
        b.iter(|| {
            let snapshot = calculate_snapshot("bench", black_box(&workloads), capacity);
            black_box(score_snapshot(&snapshot, &policy))
        })
    });
}

criterion_group!(benches, cpu_parsing_benchmark, memory_parsing_benchmark, tenant_scoring_benchmark);
criterion_main!(benches);
