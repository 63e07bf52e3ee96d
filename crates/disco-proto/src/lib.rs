pub mod v1 {
    tonic::include_proto!("discovery.v1");
}

/// Encoded descriptors for every message and service, served by gRPC
/// reflection.
pub const FILE_DESCRIPTOR_SET: &[u8] = tonic::include_file_descriptor_set!("descriptor");
