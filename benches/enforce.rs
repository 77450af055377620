use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use tollgate::{Enforcer, MemoryAdapter, Model};

const RBAC_MODEL: &str = "[request_definition]\nr = sub, obj, act\n\
                          [policy_definition]\np = sub, obj, act\n\
                          [role_definition]\ng = _, _\n\
                          [policy_effect]\ne = some(where (p.eft == allow))\n\
                          [matchers]\nm = g(r.sub, p.sub) && keyMatch2(r.obj, p.obj) && r.act == p.act\n";

/// Enforcer with `rules` permissions spread over 100 roles, one user per role
fn create_enforcer(rules: usize, cache: bool) -> Enforcer {
    let mut rows = Vec::with_capacity(rules + 100);
    for i in 0..rules {
        rows.push((
            "p",
            vec![format!("role{}", i % 100), format!("/api/resource{}/:id", i), "read".to_string()],
        ));
    }
    for role in 0..100 {
        rows.push(("g", vec![format!("user{}", role), format!("role{}", role)]));
    }

    let mut builder = Enforcer::builder(Model::from_text(RBAC_MODEL).unwrap())
        .adapter(MemoryAdapter::with_rules(rows));
    if cache {
        builder = builder.cache(10_000, None);
    }
    builder.build().unwrap()
}

/// Worst case: the only matching rule is the last one
fn bench_enforce_uncached(c: &mut Criterion) {
    let mut group = c.benchmark_group("enforce_uncached");

    for rules in [100, 1_000, 10_000] {
        group.throughput(Throughput::Elements(1));
        group.bench_with_input(BenchmarkId::from_parameter(rules), &rules, |b, &rules| {
            let enforcer = create_enforcer(rules, false);
            let last = rules - 1;
            let user = format!("user{}", last % 100);
            let obj = format!("/api/resource{}/42", last);

            b.iter(|| {
                let allowed = enforcer.enforce(&[user.as_str(), obj.as_str(), "read"]).unwrap();
                black_box(allowed);
            });
        });
    }

    group.finish();
}

/// Repeated request served from the decision cache
fn bench_enforce_cached(c: &mut Criterion) {
    let enforcer = create_enforcer(10_000, true);
    let request = ["user7", "/api/resource9907/1", "read"];

    c.bench_function("enforce_cached", |b| {
        b.iter(|| black_box(enforcer.enforce(&request).unwrap()));
    });
}

/// Role checks through a deep inheritance chain
fn bench_role_chain(c: &mut Criterion) {
    let mut group = c.benchmark_group("role_chain");

    for depth in [10, 100, 1_000] {
        group.bench_with_input(BenchmarkId::from_parameter(depth), &depth, |b, &depth| {
            let enforcer = create_enforcer(10, false);
            for i in 0..depth {
                enforcer
                    .add_role_for_user(&format!("chain{}", i), &format!("chain{}", i + 1), None)
                    .unwrap();
            }
            enforcer
                .add_role_for_user(&format!("chain{}", depth), "role0", None)
                .unwrap();

            b.iter(|| {
                let allowed = enforcer
                    .enforce(&["chain0", "/api/resource0/1", "read"])
                    .unwrap();
                black_box(allowed);
            });
        });
    }

    group.finish();
}

/// Single-rule insert, written through to the in-memory store
fn bench_add_policy(c: &mut Criterion) {
    c.bench_function("add_policy", |b| {
        let enforcer = create_enforcer(1_000, false);
        let mut n = 0u64;
        b.iter(|| {
            n += 1;
            let obj = format!("/bench/{}", n);
            black_box(enforcer.add_policy(&["role0", obj.as_str(), "write"]).unwrap());
        });
    });
}

criterion_group!(
    benches,
    bench_enforce_uncached,
    bench_enforce_cached,
    bench_role_chain,
    bench_add_policy
);
criterion_main!(benches);
