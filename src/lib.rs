//! Edgeside runtime crate.
//!
//! This crate exposes an Axum-friendly runtime for edge-style workers that
//! run locally: a worker is an Axum router plus an env of bindings (vars,
//! key-value namespaces, SQL databases, actors, workflows, AI, assets),
//! declared in a `worker.toml` manifest and served over plain TCP.

pub mod config;
pub mod context;
pub mod error;
pub mod manifest;
pub mod runtime;
pub mod schedule;
pub mod worker;

pub use crate::config::{RuntimeConfig, RuntimeConfigBuilder};
pub use crate::context::{RequestMetadata, WorkerContext};
pub use crate::error::{EdgesideError, Result};
pub use crate::manifest::WorkerManifest;
pub use crate::runtime::{EdgesideRuntime, run, serve, serve_on};
pub use crate::schedule::{CronSchedule, ScheduledEvent};
pub use crate::worker::{Worker, WorkerBuilder};
pub use edgeside_bindings::{
    Actor, ActorContext, ActorError, ActorId, ActorNamespace, ActorRequest, ActorResponse,
    ActorStorage, ActorStub, AiClient, AiError, AiOutput, AiRequest, Asset, AssetCatalog,
    AssetCatalogBuilder, Backoff, Env, EnvBuilder, EnvError, FetchClient, FetchError, FetchedPage,
    InstanceState, KvError, KvStore, RetryPolicy, SocketId, SocketMessage, SqlDatabase, SqlError,
    SqlRow, SqlStatement, SqlValue, StepError, StepInput, StepState, StepStatus, Workflow,
    WorkflowError, WorkflowInstance, WorkflowSpec, WorkflowSpecBuilder, WorkflowStatus,
    content_type_for,
};
