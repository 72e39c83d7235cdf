use bytes::Bytes;
use core::{fmt, hint::black_box};
use criterion::{Criterion, Throughput, criterion_group, criterion_main};
use futures::stream::{FuturesUnordered, StreamExt};
use jrplugin_core::proto::producer::{ProduceRequest, producer_client::ProducerClient};
use jrplugin_server::{ConsoleProducer, LogBridge, PluginServer, ServerConfig, ServerState};
use std::{collections::HashMap, io, sync::Arc, time::Instant};
use tokio::runtime::{Builder, Runtime};
use tonic::{codec::CompressionEncoding, transport::Channel};

#[derive(Clone, Copy, Debug)]
enum Compression {
    None,
    Gzip,
    Zstd,
}

impl fmt::Display for Compression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Compression::None => write!(f, "none"),
            Compression::Gzip => write!(f, "gzip"),
            Compression::Zstd => write!(f, "zstd"),
        }
    }
}

impl From<Compression> for Option<CompressionEncoding> {
    fn from(value: Compression) -> Self {
        match value {
            Compression::None => None,
            Compression::Gzip => Some(CompressionEncoding::Gzip),
            Compression::Zstd => Some(CompressionEncoding::Zstd),
        }
    }
}

#[derive(Clone, Copy, Debug)]
struct ProduceBenchParams {
    value_size: usize,
    concurrency: usize,
    compression: Compression,
}

/// Starts an in-process server on an ephemeral port and returns its address.
fn start_server(rt: &Runtime) -> String {
    rt.block_on(async {
        let config = ServerConfig {
            server_addr: "127.0.0.1:0".to_string(),
            num_workers: 32,
            ..Default::default()
        };
        let server = PluginServer::new(config, LogBridge::default(), Arc::new(ConsoleProducer));
        let handle = server.handle();
        let bound = server.bind().await.expect("failed to bind");
        let address = bound.handshake().address.clone();

        tokio::spawn(bound.serve_with_shutdown(io::sink(), std::future::pending()));
        assert_eq!(
            handle.wait_for(ServerState::Serving).await,
            ServerState::Serving
        );
        address
    })
}

fn produce_bench(c: &mut Criterion) {
    let rt = Builder::new_multi_thread().enable_all().build().unwrap();
    let uri = format!("http://{}", start_server(&rt));

    let value_size_cases = [16, 1_024, 64 * 1_024];
    let concurrency_cases = [1, 8, 32];
    let compression_cases = [Compression::None, Compression::Zstd, Compression::Gzip];

    // Generate cartesian product of all param combinations
    let mut cases = Vec::new();
    for &value_size in &value_size_cases {
        for &concurrency in &concurrency_cases {
            for &compression in &compression_cases {
                cases.push(ProduceBenchParams {
                    value_size,
                    concurrency,
                    compression,
                });
            }
        }
    }

    for params in &cases {
        let mut group = c.benchmark_group("grpc/produce");
        group.throughput(Throughput::Bytes(
            (params.value_size * params.concurrency) as u64,
        ));

        group.bench_function(
            format!(
                "bytes/{}/conc/{}/comp/{}",
                params.value_size, params.concurrency, params.compression,
            ),
            |b| {
                b.to_async(&rt).iter_custom(|iters| {
                    let uri = uri.clone();
                    async move {
                        let channel = Channel::from_shared(uri)
                            .expect("invalid URI")
                            .connect()
                            .await
                            .expect("Failed to connect to server");
                        let value = Bytes::from(vec![b'x'; params.value_size]);

                        let start = Instant::now();

                        for _ in 0..iters {
                            run_produce_bench(&channel, params, &value).await;
                        }

                        start.elapsed()
                    }
                });
            },
        );

        group.finish();
    }
}

async fn run_produce_bench(channel: &Channel, params: &ProduceBenchParams, value: &Bytes) {
    let mut tasks = FuturesUnordered::new();

    for _ in 0..params.concurrency {
        let mut client = ProducerClient::new(channel.clone());
        if let Some(encoding) = params.compression.into() {
            client = client.accept_compressed(encoding).send_compressed(encoding);
        }
        let request = ProduceRequest {
            key: Bytes::from_static(b"bench"),
            value: value.clone(),
            headers: HashMap::new(),
            config_params: HashMap::new(),
        };

        tasks.push(tokio::spawn(async move {
            let resp = client
                .produce(request)
                .await
                .expect("produce call failed")
                .into_inner();
            black_box(resp.bytes)
        }));
    }

    while let Some(res) = tasks.next().await {
        assert_eq!(res.unwrap(), params.value_size as u64);
    }
}

criterion_group!(benches, produce_bench);
criterion_main!(benches);
