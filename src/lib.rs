pub mod config;
pub mod dispatch;
pub mod error;
pub mod grpc;
pub mod http;
pub mod intake;
pub mod job;
pub mod manifest;
pub mod registry;
pub mod repository;
pub mod shutdown;
pub mod worker;

// Re-export generated protobuf types
pub mod proto {
    tonic::include_proto!("runner");
}
