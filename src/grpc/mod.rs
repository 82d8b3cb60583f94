//! RPC plumbing between the dispatcher and its runners: the generated
//! client wrapped as a `RunnerChannel`, the runner-side service, and the
//! proto/domain conversions both share.

mod channel;
pub mod convert;
mod runner_service;
mod server;

pub use channel::GrpcRunnerChannel;
pub use runner_service::RunnerService;
pub use server::serve;
