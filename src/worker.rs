use std::fmt;
use std::future::Future;
use std::sync::Arc;

use axum::Router;

use edgeside_bindings::{
    ActorNamespace, AiClient, AssetCatalog, Env, EnvBuilder, FetchClient, KvStore, SqlDatabase,
    Workflow,
};

use crate::error::{EdgesideError, Result};
use crate::manifest::WorkerManifest;
use crate::schedule::{CronSchedule, ScheduledEvent, ScheduledHandler, ScheduledTrigger};

/// A fully assembled worker: a name, an Axum router for fetch traffic, an
/// [`Env`] of bindings, and optionally a scheduled handler with its cron
/// triggers.
///
/// Workers are built once at startup via [`Worker::builder`] and handed to
/// [`crate::serve`] or [`crate::run`].
pub struct Worker {
    pub(crate) name: String,
    pub(crate) router: Router,
    pub(crate) env: Env,
    pub(crate) triggers: Vec<ScheduledTrigger>,
    pub(crate) scheduled_handler: Option<ScheduledHandler>,
}

impl Worker {
    /// Returns a builder with no bindings configured.
    pub fn builder() -> WorkerBuilder {
        WorkerBuilder::default()
    }

    /// The worker's name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The worker's env, mostly useful for seeding bindings in tests.
    pub fn env(&self) -> &Env {
        &self.env
    }
}

impl fmt::Debug for Worker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Worker")
            .field("name", &self.name)
            .field("env", &self.env)
            .field("triggers", &self.triggers)
            .field("scheduled_handler", &self.scheduled_handler.is_some())
            .finish()
    }
}

/// Builder type for [`Worker`].
#[derive(Default)]
pub struct WorkerBuilder {
    name: Option<String>,
    manifest: Option<WorkerManifest>,
    router: Option<Router>,
    env: EnvBuilder,
    crons: Vec<String>,
    scheduled_handler: Option<ScheduledHandler>,
}

impl WorkerBuilder {
    /// Overrides the worker name. Defaults to the manifest name.
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Applies a manifest: its vars, kv namespaces, sql databases, and cron
    /// triggers are provisioned during [`build`](Self::build). Bindings added
    /// directly on the builder take precedence over manifest declarations
    /// with the same name.
    pub fn manifest(mut self, manifest: WorkerManifest) -> Self {
        self.manifest = Some(manifest);
        self
    }

    /// Sets the router that receives fetch traffic.
    pub fn router(mut self, router: Router) -> Self {
        self.router = Some(router);
        self
    }

    /// Adds a plain-text var.
    pub fn var(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.env = self.env.var(name, value);
        self
    }

    /// Adds a key-value namespace.
    pub fn kv(mut self, name: impl Into<String>, store: KvStore) -> Self {
        self.env = self.env.kv(name, store);
        self
    }

    /// Adds a SQL database.
    pub fn sql(mut self, name: impl Into<String>, database: SqlDatabase) -> Self {
        self.env = self.env.sql(name, database);
        self
    }

    /// Adds an actor namespace.
    pub fn actors(mut self, name: impl Into<String>, namespace: ActorNamespace) -> Self {
        self.env = self.env.actors(name, namespace);
        self
    }

    /// Adds a workflow.
    pub fn workflow(mut self, name: impl Into<String>, workflow: Workflow) -> Self {
        self.env = self.env.workflow(name, workflow);
        self
    }

    /// Adds an AI inference client.
    pub fn ai(mut self, name: impl Into<String>, client: AiClient) -> Self {
        self.env = self.env.ai(name, client);
        self
    }

    /// Adds a static asset catalog.
    pub fn assets(mut self, name: impl Into<String>, catalog: AssetCatalog) -> Self {
        self.env = self.env.assets(name, catalog);
        self
    }

    /// Overrides the outbound fetch client.
    pub fn fetcher(mut self, client: FetchClient) -> Self {
        self.env = self.env.fetcher(client);
        self
    }

    /// Adds a cron trigger on top of whatever the manifest declares.
    pub fn cron(mut self, expr: impl Into<String>) -> Self {
        self.crons.push(expr.into());
        self
    }

    /// Registers the handler invoked when a cron trigger fires.
    pub fn on_scheduled<F, Fut>(mut self, handler: F) -> Self
    where
        F: Fn(ScheduledEvent, Env) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        self.scheduled_handler = Some(Arc::new(move |event, env| Box::pin(handler(event, env))));
        self
    }

    /// Provisions manifest bindings and assembles the worker.
    ///
    /// # Errors
    ///
    /// Fails when no router was set, when a manifest-declared SQL database
    /// cannot be opened, when a cron expression does not parse, or when cron
    /// triggers exist without a scheduled handler.
    pub fn build(self) -> Result<Worker> {
        let mut env = self.env;
        let mut crons = self.crons;
        let mut name = self.name;

        if let Some(manifest) = self.manifest {
            if name.is_none() {
                name = Some(manifest.name);
            }
            for (key, value) in manifest.vars {
                if !env.has_binding(&key) {
                    env = env.var(key, value);
                }
            }
            for namespace in manifest.kv_namespaces {
                if !env.has_binding(&namespace.binding) {
                    env = env.kv(namespace.binding, KvStore::new());
                }
            }
            for database in manifest.sql_databases {
                if env.has_binding(&database.binding) {
                    continue;
                }
                let opened = match database.path {
                    Some(path) => SqlDatabase::open(path)?,
                    None => SqlDatabase::in_memory()?,
                };
                env = env.sql(database.binding, opened);
            }
            crons.extend(manifest.triggers.crons);
        }

        let name = name.unwrap_or_else(|| "worker".to_owned());

        let mut triggers = Vec::with_capacity(crons.len());
        for expr in crons {
            let schedule = CronSchedule::parse(&expr)?;
            triggers.push(ScheduledTrigger {
                schedule,
                expr,
            });
        }

        if !triggers.is_empty() && self.scheduled_handler.is_none() {
            return Err(EdgesideError::ScheduleWithoutHandler(name));
        }

        let router = self
            .router
            .ok_or_else(|| EdgesideError::MissingRouter(name.clone()))?;

        Ok(Worker {
            name,
            router,
            env: env.build(),
            triggers,
            scheduled_handler: self.scheduled_handler,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn empty_router() -> Router {
        Router::new()
    }

    #[test]
    fn builds_worker_from_manifest() {
        let manifest = WorkerManifest::from_str(
            r#"
            name = "manifest-worker"

            [vars]
            GREETING = "hi"

            [[kv_namespaces]]
            binding = "CACHE"
            "#,
        )
        .expect("manifest");

        let worker = Worker::builder()
            .manifest(manifest)
            .router(empty_router())
            .build()
            .expect("worker");

        assert_eq!(worker.name(), "manifest-worker");
        assert_eq!(worker.env().var("GREETING").as_deref(), Ok("hi"));
        assert!(worker.env().kv("CACHE").is_ok());
    }

    #[test]
    fn builder_bindings_win_over_manifest() {
        let manifest = WorkerManifest::from_str(
            r#"
            name = "precedence"

            [vars]
            MODE = "manifest"
            "#,
        )
        .expect("manifest");

        let worker = Worker::builder()
            .manifest(manifest)
            .var("MODE", "builder")
            .router(empty_router())
            .build()
            .expect("worker");

        assert_eq!(worker.env().var("MODE").as_deref(), Ok("builder"));
    }

    #[test]
    fn missing_router_is_an_error() {
        let err = Worker::builder().name("no-router").build().unwrap_err();
        assert!(matches!(err, EdgesideError::MissingRouter(name) if name == "no-router"));
    }

    #[test]
    fn cron_without_handler_is_an_error() {
        let err = Worker::builder()
            .name("cron-worker")
            .router(empty_router())
            .cron("*/5 * * * *")
            .build()
            .unwrap_err();
        assert!(matches!(err, EdgesideError::ScheduleWithoutHandler(name) if name == "cron-worker"));
    }

    #[test]
    fn cron_with_handler_builds() {
        let worker = Worker::builder()
            .name("cron-worker")
            .router(empty_router())
            .cron("*/5 * * * *")
            .on_scheduled(|_event, _env| async {})
            .build()
            .expect("worker");
        assert_eq!(worker.triggers.len(), 1);
    }

    #[test]
    fn invalid_manifest_cron_fails_build() {
        let manifest = WorkerManifest::from_str(
            r#"
            name = "bad-cron"

            [triggers]
            crons = ["nope"]
            "#,
        )
        .expect("manifest");

        let err = Worker::builder()
            .manifest(manifest)
            .router(empty_router())
            .on_scheduled(|_event, _env| async {})
            .build()
            .unwrap_err();
        assert!(matches!(err, EdgesideError::Schedule(_)));
    }
}
