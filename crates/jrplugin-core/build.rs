/// Builds the gRPC client and server code for the plugin protocol using
/// `tonic-prost-build`.
///
/// Two protobuf packages are compiled into the crate's `OUT_DIR`:
///
/// - `proto/producer.proto` - the `producer.Producer` business service.
/// - `proto/plugin.proto` - the `plugin.GRPCController` and `plugin.GRPCStdio`
///   services every plugin process exposes.
///
/// # Byte Field Optimization
///
/// The opaque payload fields are marked with `.bytes(...)` so they decode into
/// `Bytes` (from the `bytes` crate) instead of `Vec<u8>`. Record values and
/// log frames are then handed around between tasks without copying.
///
/// # Descriptor Set
///
/// A combined file descriptor set is written next to the generated code so
/// the server can register gRPC reflection for both packages.
///
/// # Output
///
/// Generated code is included in `src/lib.rs` via:
///
/// ```rust,ignore
/// pub mod producer {
///     tonic::include_proto!("producer");
/// }
/// pub mod plugin {
///     tonic::include_proto!("plugin");
/// }
/// ```
use std::env;
use std::path::PathBuf;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let out_dir = PathBuf::from(env::var("OUT_DIR")?);
    let descriptor_path = out_dir.join("jrplugin_descriptor.bin");

    let mut config = tonic_prost_build::Config::new();

    // Payloads stay as `Bytes`, not `Vec<u8>`
    config
        .bytes([
            ".producer.ProduceRequest.key",
            ".producer.ProduceRequest.value",
            ".plugin.StdioData.data",
        ])
        .file_descriptor_set_path(&descriptor_path);

    tonic_prost_build::configure().compile_with_config(
        config,
        &["proto/producer.proto", "proto/plugin.proto"],
        &["proto"],
    )?;

    Ok(())
}
