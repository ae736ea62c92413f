use async_trait::async_trait;
use criterion::{black_box, criterion_group, criterion_main, Criterion};
use switchyard::config::{BackendSettings, EndpointConfig, TuningConfig};
use switchyard::routing::{Pooler, RandomPooler, RoundRobinPooler};
use switchyard::{
    Backend, BackendError, BackendFactory, InstanceRegistry, Intent, LabelClassifier,
    RequestContext, RequestMeta, Role, Router, StoreKind,
};

struct NullBackend(String);

#[async_trait]
impl Backend for NullBackend {
    type Connection = String;

    fn connection(&self) -> String {
        self.0.clone()
    }

    async fn probe(&self) -> Result<(), BackendError> {
        Ok(())
    }

    async fn close(&self) -> Result<(), BackendError> {
        Ok(())
    }
}

struct NullFactory;

#[async_trait]
impl BackendFactory for NullFactory {
    type Backend = NullBackend;

    async fn open(&self, settings: &BackendSettings) -> Result<NullBackend, BackendError> {
        Ok(NullBackend(settings.name().to_string()))
    }
}

fn settings(name: &str) -> BackendSettings {
    BackendSettings::new(
        EndpointConfig {
            name: name.to_string(),
            address: format!("{}.db:3306", name),
            username: None,
            password: None,
            database: None,
        },
        TuningConfig::default(),
    )
}

async fn router() -> std::sync::Arc<Router<NullBackend>> {
    let registry = InstanceRegistry::new();
    let mut read = Vec::new();
    for i in 0..4 {
        read.push(registry.construct(&NullFactory, &settings(&format!("r{}", i))).await);
    }
    let write = vec![registry.construct(&NullFactory, &settings("w0")).await];
    let shadow = vec![registry.construct(&NullFactory, &settings("s0")).await];

    Router::builder("bench", StoreKind::Relational)
        .shadow_classifier(LabelClassifier::present("x-shadow"))
        .pooler(RoundRobinPooler::new())
        .role(Role::Read, read)
        .role(Role::Write, write)
        .role(Role::ShadowWrite, shadow)
        .build()
        .await
}

fn criterion_benchmark(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().unwrap();
    let router = rt.block_on(router());
    let plain = RequestContext::new();
    let shadowed = RequestContext::new().with_label("x-shadow", "1");

    c.bench_function("route_read", |b| {
        b.to_async(&rt)
            .iter(|| async { black_box(router.route(&plain, Intent::Read).await.unwrap()) })
    });

    c.bench_function("route_shadow_write", |b| {
        b.to_async(&rt)
            .iter(|| async { black_box(router.route(&shadowed, Intent::Write).await.unwrap()) })
    });

    let meta = RequestMeta::new();
    let round_robin = RoundRobinPooler::new();
    c.bench_function("round_robin_choose", |b| {
        b.iter(|| black_box(round_robin.choose(&meta, black_box(8))))
    });

    c.bench_function("random_choose", |b| {
        b.iter(|| black_box(RandomPooler.choose(&meta, black_box(8))))
    });
}

criterion_group!(benches, criterion_benchmark);
criterion_main!(benches);
