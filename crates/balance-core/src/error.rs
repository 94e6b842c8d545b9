use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Machine registry is empty")]
    EmptyRegistry,

    #[error("Duplicate machine id in registry: {0}")]
    DuplicateMachine(String),

    #[error("Worker entry point cannot be resolved: {0}")]
    EntryPointUnresolvable(String),

    #[error("Queue depth store error: {0}")]
    Store(String),

    #[error("Forwarding to machine {machine_id} failed: {reason}")]
    Forwarding { machine_id: String, reason: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization/Deserialization error: {0}")]
    SerdeError(#[from] serde_json::Error),

    #[error("YAML error: {0}")]
    YamlError(#[from] serde_yaml::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
