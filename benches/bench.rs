use criterion::{criterion_group, criterion_main, Criterion};
use httpbin_emf_probe::observation::{self, Observation};

fn criterion_benchmark(c: &mut Criterion) {
    let emitter = observation::probe_builder(observation::NAMESPACE).build().unwrap();

    let data = serde_json::json!({
        "args": {"location": "Manchester"},
        "headers": {"Accept": "*/*", "Host": "httpbin.org"},
        "url": "https://httpbin.org/get?location=Manchester"
    });
    let observation = Observation {
        endpoint: "httpbin.org".into(),
        path: "/get?location=Manchester".into(),
        success: 1,
        connection_latency_ms: 41,
        response_latency_ms: 87,
        status: 200,
        message: "OK".into(),
        correlation_id: "4bd2d365-3792-46c8-9b6c-6132f9630fbb".into(),
        data: data.as_object().cloned(),
        ..Default::default()
    };

    c.bench_function("emit", |b| {
        b.iter(|| emitter.emit(observation.record(), std::io::sink()))
    });
}

criterion_group!(benches, criterion_benchmark);
criterion_main!(benches);
