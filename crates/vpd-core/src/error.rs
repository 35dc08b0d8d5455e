use thiserror::Error;

#[derive(Debug, Error)]
pub enum VpdError {
    #[error("not initialized: run 'vpdctl init'")]
    NotInitialized,

    #[error("unknown stage: {0}")]
    UnknownStage(String),

    #[error("stage '{0}' has no entry in the stage table")]
    StageNotConfigured(String),

    #[error("invalid stage config for '{stage}': {reason}")]
    InvalidStageConfig { stage: String, reason: String },

    #[error("unknown actuator: {0}")]
    UnknownActuator(String),

    #[error("unknown action id: {0}")]
    UnknownAction(String),

    #[error("override conflict: {0}")]
    OverrideConflict(String),

    #[error("policy table error: {0}")]
    PolicyTable(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Yaml(#[from] serde_yaml::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, VpdError>;
