//! `producer.Producer` implementation.
//!
//! [`ProducerService`] converts each `ProduceRequest` into a [`WorkUnit`] and
//! hands it to the bounded [`WorkerPool`]. Failures stay local to the call.

use crate::server::{
    pool::manager::WorkerPool,
    telemetry::{increment_request_errors, increment_requests, record_request_duration},
};
use jrplugin_core::{
    proto::producer::{ProduceRequest, ProduceResponse, producer_server::Producer},
    types::WorkUnit,
};
use std::sync::Arc;
use tonic::{Request, Response, Status};

#[derive(Clone)]
pub struct ProducerService {
    pool: Arc<WorkerPool>,
}

impl ProducerService {
    pub const fn new(pool: Arc<WorkerPool>) -> Self {
        Self { pool }
    }
}

#[tonic::async_trait]
impl Producer for ProducerService {
    #[tracing::instrument(skip_all, fields(value_len = req.get_ref().value.len()))]
    async fn produce(
        &self,
        req: Request<ProduceRequest>,
    ) -> Result<Response<ProduceResponse>, Status> {
        let start = std::time::Instant::now();
        increment_requests();

        let unit = WorkUnit::from(req.into_inner());
        match self.pool.dispatch(unit).await {
            Ok(ack) => {
                record_request_duration(start.elapsed().as_millis() as f64);
                Ok(Response::new(ack.into()))
            }
            Err(e) => {
                increment_request_errors();
                tracing::warn!("Produce failed: {e}");
                Err(e.into())
            }
        }
    }
}
