use thiserror::Error;

use crate::config::ConfigError;
use crate::manifest::ManifestError;
use crate::schedule::ScheduleError;
use edgeside_bindings::{AiError, EnvError, FetchError, SqlError, WorkflowError};

pub type Result<T> = std::result::Result<T, EdgesideError>;

#[derive(Debug, Error)]
pub enum EdgesideError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Manifest(#[from] ManifestError),
    #[error(transparent)]
    Schedule(#[from] ScheduleError),
    #[error(transparent)]
    Env(#[from] EnvError),
    #[error(transparent)]
    Sql(#[from] SqlError),
    #[error(transparent)]
    Ai(#[from] AiError),
    #[error(transparent)]
    Fetch(#[from] FetchError),
    #[error(transparent)]
    Workflow(#[from] WorkflowError),
    #[error("worker `{0}` has no router")]
    MissingRouter(String),
    #[error("worker `{0}` declares cron triggers but no scheduled handler")]
    ScheduleWithoutHandler(String),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}
