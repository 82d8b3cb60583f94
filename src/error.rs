use thiserror::Error;

/// Errors surfaced synchronously to whoever feeds commits into admission
/// (the bus consumer or the HTTP inlet).
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AdmissionError {
    #[error("commit already processed")]
    AlreadyProcessed,

    #[error("job queue full")]
    Backpressure,

    #[error("malformed commit event: {0}")]
    MalformedEvent(String),
}

/// Errors surfaced synchronously to the runner registration surface.
#[derive(Error, Debug)]
pub enum RegistryError {
    #[error("runner already registered: {0}")]
    AlreadyRegistered(String),

    #[error("runner {addr} unreachable: {source}")]
    Unreachable {
        addr: String,
        #[source]
        source: tonic::transport::Error,
    },

    #[error("runner not found: {0}")]
    NotFound(String),
}

/// Errors raised while forwarding a job to a runner. These are logged and
/// the job is dropped; nothing propagates past the dispatcher task.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DispatchError {
    #[error("no runners registered")]
    NoRunners,

    #[error("no live runners")]
    NoLiveRunners,

    #[error("rpc failure: {0}")]
    RpcFailure(String),

    #[error("job rpc timed out")]
    Timeout,
}

/// Runner-side execution failures, packed into the RunJob reply's error
/// string for the dispatcher to log.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum WorkerError {
    #[error("hosting service {0} not supported")]
    UnsupportedHost(String),

    #[error("clone: {0}")]
    CloneError(String),

    #[error("manifest: {0}")]
    ManifestError(String),

    #[error("image pull: {0}")]
    ImagePullError(String),

    #[error("container create: {0}")]
    ContainerCreateError(String),

    #[error("step {name} failed: exit {code}")]
    StepFailed { name: String, code: i64 },

    #[error("internal error: {0}")]
    Internal(String),
}
