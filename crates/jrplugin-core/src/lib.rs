#![doc = include_str!("../README.md")]

mod common;
pub use common::*;

/// gRPC service and message definitions generated from the `proto/`
/// directory.
///
/// ## Services
///
/// - [`producer::producer_server::Producer`] - the business RPC.
/// - [`plugin::grpc_controller_server::GrpcController`] - shutdown requests
///   from the host.
/// - [`plugin::grpc_stdio_server::GrpcStdio`] - the single, long lived log
///   stream the host mirrors.
///
/// Health checking uses the standard `grpc.health.v1` package shipped by
/// `tonic-health`.
pub mod proto {
    /// The `producer` protobuf package.
    pub mod producer {
        tonic::include_proto!("producer");
    }

    /// The `plugin` protobuf package shared with go-plugin hosts.
    pub mod plugin {
        tonic::include_proto!("plugin");
    }

    /// Encoded descriptors for both packages, used for server reflection.
    pub const FILE_DESCRIPTOR_SET: &[u8] =
        tonic::include_file_descriptor_set!("jrplugin_descriptor");
}
