//! The binding registry handed to every request handler.

use std::collections::HashMap;
use std::sync::Arc;

use thiserror::Error;

use crate::actor::ActorNamespace;
use crate::ai::AiClient;
use crate::assets::AssetCatalog;
use crate::fetch::FetchClient;
use crate::kv::KvStore;
use crate::sql::SqlDatabase;
use crate::workflow::Workflow;

/// The set of bindings a worker can reach at runtime, keyed by binding name.
///
/// An `Env` is assembled once at startup and shared with every handler.
/// Clones are cheap; all bindings sit behind one `Arc`.
#[derive(Clone, Debug)]
pub struct Env {
    inner: Arc<EnvInner>,
}

#[derive(Debug)]
struct EnvInner {
    bindings: HashMap<String, Binding>,
    fetcher: Option<FetchClient>,
}

#[derive(Debug)]
enum Binding {
    Var(String),
    Kv(KvStore),
    Sql(SqlDatabase),
    Actors(ActorNamespace),
    Workflow(Workflow),
    Ai(AiClient),
    Assets(AssetCatalog),
}

impl Binding {
    fn kind(&self) -> &'static str {
        match self {
            Binding::Var(_) => "var",
            Binding::Kv(_) => "kv",
            Binding::Sql(_) => "sql",
            Binding::Actors(_) => "actors",
            Binding::Workflow(_) => "workflow",
            Binding::Ai(_) => "ai",
            Binding::Assets(_) => "assets",
        }
    }
}

/// Errors looking up bindings by name.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum EnvError {
    #[error("no {kind} binding named `{name}`")]
    MissingBinding { kind: &'static str, name: String },
    #[error("binding `{name}` is a {found} binding, not {expected}")]
    WrongKind {
        name: String,
        expected: &'static str,
        found: &'static str,
    },
    #[error("no outbound fetch client configured")]
    MissingFetcher,
}

impl Env {
    pub fn builder() -> EnvBuilder {
        EnvBuilder::default()
    }

    /// Looks up a plain-text var.
    pub fn var(&self, name: &str) -> Result<String, EnvError> {
        match self.lookup(name, "var")? {
            Binding::Var(value) => Ok(value.clone()),
            other => Err(self.wrong_kind(name, "var", other)),
        }
    }

    /// Looks up a key-value namespace.
    pub fn kv(&self, name: &str) -> Result<KvStore, EnvError> {
        match self.lookup(name, "kv")? {
            Binding::Kv(store) => Ok(store.clone()),
            other => Err(self.wrong_kind(name, "kv", other)),
        }
    }

    /// Looks up a SQL database.
    pub fn sql(&self, name: &str) -> Result<SqlDatabase, EnvError> {
        match self.lookup(name, "sql")? {
            Binding::Sql(database) => Ok(database.clone()),
            other => Err(self.wrong_kind(name, "sql", other)),
        }
    }

    /// Looks up an actor namespace.
    pub fn actors(&self, name: &str) -> Result<ActorNamespace, EnvError> {
        match self.lookup(name, "actors")? {
            Binding::Actors(namespace) => Ok(namespace.clone()),
            other => Err(self.wrong_kind(name, "actors", other)),
        }
    }

    /// Looks up a workflow.
    pub fn workflow(&self, name: &str) -> Result<Workflow, EnvError> {
        match self.lookup(name, "workflow")? {
            Binding::Workflow(workflow) => Ok(workflow.clone()),
            other => Err(self.wrong_kind(name, "workflow", other)),
        }
    }

    /// Looks up an AI inference client.
    pub fn ai(&self, name: &str) -> Result<AiClient, EnvError> {
        match self.lookup(name, "ai")? {
            Binding::Ai(client) => Ok(client.clone()),
            other => Err(self.wrong_kind(name, "ai", other)),
        }
    }

    /// Looks up a static asset catalog.
    pub fn assets(&self, name: &str) -> Result<AssetCatalog, EnvError> {
        match self.lookup(name, "assets")? {
            Binding::Assets(catalog) => Ok(catalog.clone()),
            other => Err(self.wrong_kind(name, "assets", other)),
        }
    }

    /// The outbound fetch client, when one was configured.
    pub fn fetcher(&self) -> Result<FetchClient, EnvError> {
        self.inner.fetcher.clone().ok_or(EnvError::MissingFetcher)
    }

    /// Names of all registered bindings, sorted.
    pub fn binding_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.inner.bindings.keys().cloned().collect();
        names.sort_unstable();
        names
    }

    fn lookup(&self, name: &str, kind: &'static str) -> Result<&Binding, EnvError> {
        self.inner
            .bindings
            .get(name)
            .ok_or_else(|| EnvError::MissingBinding {
                kind,
                name: name.to_owned(),
            })
    }

    fn wrong_kind(&self, name: &str, expected: &'static str, found: &Binding) -> EnvError {
        EnvError::WrongKind {
            name: name.to_owned(),
            expected,
            found: found.kind(),
        }
    }
}

/// Builder type for [`Env`]. Later entries replace earlier ones with the
/// same name.
#[derive(Debug, Default)]
pub struct EnvBuilder {
    bindings: HashMap<String, Binding>,
    fetcher: Option<FetchClient>,
}

impl EnvBuilder {
    pub fn var(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.bindings.insert(name.into(), Binding::Var(value.into()));
        self
    }

    pub fn kv(mut self, name: impl Into<String>, store: KvStore) -> Self {
        self.bindings.insert(name.into(), Binding::Kv(store));
        self
    }

    pub fn sql(mut self, name: impl Into<String>, database: SqlDatabase) -> Self {
        self.bindings.insert(name.into(), Binding::Sql(database));
        self
    }

    pub fn actors(mut self, name: impl Into<String>, namespace: ActorNamespace) -> Self {
        self.bindings.insert(name.into(), Binding::Actors(namespace));
        self
    }

    pub fn workflow(mut self, name: impl Into<String>, workflow: Workflow) -> Self {
        self.bindings.insert(name.into(), Binding::Workflow(workflow));
        self
    }

    pub fn ai(mut self, name: impl Into<String>, client: AiClient) -> Self {
        self.bindings.insert(name.into(), Binding::Ai(client));
        self
    }

    pub fn assets(mut self, name: impl Into<String>, catalog: AssetCatalog) -> Self {
        self.bindings.insert(name.into(), Binding::Assets(catalog));
        self
    }

    pub fn fetcher(mut self, client: FetchClient) -> Self {
        self.fetcher = Some(client);
        self
    }

    /// Whether any binding is already registered under `name`.
    pub fn has_binding(&self, name: &str) -> bool {
        self.bindings.contains_key(name)
    }

    pub fn build(self) -> Env {
        Env {
            inner: Arc::new(EnvInner {
                bindings: self.bindings,
                fetcher: self.fetcher,
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn vars_and_kv_resolve_by_name() {
        let env = Env::builder()
            .var("GREETING", "hi")
            .kv("CACHE", KvStore::new())
            .build();
        assert_eq!(env.var("GREETING").as_deref(), Ok("hi"));
        assert!(env.kv("CACHE").is_ok());
        assert_eq!(env.binding_names(), vec!["CACHE", "GREETING"]);
    }

    #[test]
    fn missing_binding_names_the_kind() {
        let env = Env::builder().build();
        assert_eq!(
            env.kv("NOPE").err(),
            Some(EnvError::MissingBinding {
                kind: "kv",
                name: "NOPE".into(),
            })
        );
    }

    #[test]
    fn kind_mismatch_is_reported() {
        let env = Env::builder().var("CACHE", "not a kv").build();
        assert_eq!(
            env.kv("CACHE").err(),
            Some(EnvError::WrongKind {
                name: "CACHE".into(),
                expected: "kv",
                found: "var",
            })
        );
    }

    #[test]
    fn later_entries_replace_earlier_ones() {
        let env = Env::builder()
            .var("MODE", "old")
            .var("MODE", "new")
            .build();
        assert_eq!(env.var("MODE").as_deref(), Ok("new"));
    }

    #[test]
    fn fetcher_is_optional() {
        let env = Env::builder().build();
        assert_eq!(env.fetcher().err(), Some(EnvError::MissingFetcher));
    }
}
