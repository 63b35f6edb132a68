//! Binding implementations backing the edgeside runtime.
//!
//! A worker reaches everything outside its own request handlers through an
//! [`Env`]: a registry of named bindings assembled once at startup. Each
//! binding kind lives in its own module and is exposed here so the runtime
//! crate can re-export the whole surface.

pub mod actor;
pub mod ai;
pub mod assets;
pub mod env;
pub mod fetch;
pub mod kv;
pub mod sql;
pub mod workflow;

pub use actor::{
    Actor, ActorContext, ActorError, ActorId, ActorNamespace, ActorRequest, ActorResponse,
    ActorStorage, ActorStub, SocketId, SocketMessage,
};
pub use ai::{AiClient, AiError, AiOutput, AiRequest};
pub use assets::{Asset, AssetCatalog, AssetCatalogBuilder, content_type_for};
pub use env::{Env, EnvBuilder, EnvError};
pub use fetch::{FetchClient, FetchError, FetchedPage};
pub use kv::{KvError, KvStore};
pub use sql::{SqlDatabase, SqlError, SqlRow, SqlStatement, SqlValue};
pub use workflow::{
    Backoff, InstanceState, RetryPolicy, StepError, StepInput, StepState, StepStatus, Workflow,
    WorkflowError, WorkflowInstance, WorkflowSpec, WorkflowSpecBuilder, WorkflowStatus,
};
