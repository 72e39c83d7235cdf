//! Health reporting over `grpc.health.v1.Health`.
//!
//! [`HealthReporter`] keeps the status of every named service in a
//! `tokio::sync::watch` channel: `check` is a plain read of the current map,
//! and `Watch` streams are just subscribers of the same channel.
//!
//! Unlike the stock `tonic-health` reporter, an unregistered name is answered
//! with `UNKNOWN` instead of a `NOT_FOUND` error.

use core::pin::Pin;
use futures::StreamExt;
use jrplugin_core::types::ServingStatus;
use std::{collections::HashMap, sync::Arc};
use tokio::sync::watch;
use tokio_stream::{Stream, wrappers::WatchStream};
use tonic::{Request, Response, Status};
use tonic_health::pb::{
    HealthCheckRequest, HealthCheckResponse, health_check_response, health_server::Health,
};

type StatusMap = HashMap<String, ServingStatus>;

/// Shared, cloneable map from service name to [`ServingStatus`].
#[derive(Clone)]
pub struct HealthReporter {
    statuses: Arc<watch::Sender<StatusMap>>,
}

impl HealthReporter {
    pub fn new() -> Self {
        let (tx, _) = watch::channel(StatusMap::new());
        Self {
            statuses: Arc::new(tx),
        }
    }

    /// Sets the status of `service`. Setting the same value twice is a no-op
    /// and does not wake watchers.
    pub fn set_status(&self, service: impl Into<String>, status: ServingStatus) {
        let service = service.into();
        self.statuses
            .send_if_modified(|map| map.insert(service, status) != Some(status));
    }

    /// Sets every registered service to `status`.
    pub fn set_all(&self, status: ServingStatus) {
        self.statuses.send_if_modified(|map| {
            let mut changed = false;
            for current in map.values_mut() {
                changed |= *current != status;
                *current = status;
            }
            changed
        });
    }

    /// Current status of `service`; [`ServingStatus::Unknown`] when it was
    /// never registered.
    pub fn check(&self, service: &str) -> ServingStatus {
        self.statuses
            .borrow()
            .get(service)
            .copied()
            .unwrap_or_default()
    }

    fn subscribe(&self) -> watch::Receiver<StatusMap> {
        self.statuses.subscribe()
    }
}

impl Default for HealthReporter {
    fn default() -> Self {
        Self::new()
    }
}

fn to_wire(status: ServingStatus) -> HealthCheckResponse {
    let status = match status {
        ServingStatus::Unknown => health_check_response::ServingStatus::Unknown,
        ServingStatus::Serving => health_check_response::ServingStatus::Serving,
        ServingStatus::NotServing => health_check_response::ServingStatus::NotServing,
    };
    HealthCheckResponse {
        status: status as i32,
    }
}

/// `grpc.health.v1.Health` implementation backed by a [`HealthReporter`].
#[derive(Clone)]
pub struct HealthService {
    reporter: HealthReporter,
}

impl HealthService {
    pub const fn new(reporter: HealthReporter) -> Self {
        Self { reporter }
    }
}

#[tonic::async_trait]
impl Health for HealthService {
    type WatchStream = Pin<Box<dyn Stream<Item = Result<HealthCheckResponse, Status>> + Send>>;

    async fn check(
        &self,
        req: Request<HealthCheckRequest>,
    ) -> Result<Response<HealthCheckResponse>, Status> {
        let status = self.reporter.check(&req.get_ref().service);
        Ok(Response::new(to_wire(status)))
    }

    /// Sends the current status, then one message per change of this
    /// service's status.
    async fn watch(
        &self,
        req: Request<HealthCheckRequest>,
    ) -> Result<Response<Self::WatchStream>, Status> {
        let service = req.into_inner().service;
        let mut last = None;

        let stream = WatchStream::new(self.reporter.subscribe()).filter_map(move |map| {
            let status = map.get(&service).copied().unwrap_or_default();
            let changed = last.replace(status) != Some(status);
            futures::future::ready(changed.then(|| Ok::<_, Status>(to_wire(status))))
        });

        Ok(Response::new(Box::pin(stream)))
    }
}
