//! Workflow bindings: named DAGs of retryable steps.

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use chrono::{DateTime, Utc};
use futures::stream::{FuturesUnordered, StreamExt};
use serde::Serialize;
use serde_json::Value;
use thiserror::Error;
use tracing::{debug, warn};
use uuid::Uuid;

type StepFuture = Pin<Box<dyn Future<Output = Result<Value, StepError>> + Send>>;
type StepHandler = Arc<dyn Fn(StepInput) -> StepFuture + Send + Sync>;
type RunFuture = Pin<Box<dyn Future<Output = (usize, Result<Value, StepError>)> + Send>>;

/// Error surfaced by a step handler.
///
/// Failed attempts are retried up to the step's [`RetryPolicy`]; once
/// attempts run out the failure is terminal for the whole instance.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
#[error("{message}")]
pub struct StepError {
    message: String,
}

impl StepError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

impl From<&str> for StepError {
    fn from(message: &str) -> Self {
        Self::new(message)
    }
}

impl From<String> for StepError {
    fn from(message: String) -> Self {
        Self::new(message)
    }
}

/// Delay strategy between retry attempts of one step.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub enum Backoff {
    #[default]
    None,
    Fixed(Duration),
    Exponential {
        base: Duration,
        max: Duration,
    },
}

impl Backoff {
    /// Delay before re-running a step that has already failed
    /// `failed_attempts` times.
    pub fn delay_for_attempt(&self, failed_attempts: u32) -> Duration {
        match self {
            Backoff::None => Duration::ZERO,
            Backoff::Fixed(delay) => *delay,
            Backoff::Exponential { base, max } => {
                let multiplier = 2u64.saturating_pow(failed_attempts.saturating_sub(1));
                let millis = (base.as_millis() as u64).saturating_mul(multiplier);
                Duration::from_millis(millis).min(*max)
            }
        }
    }
}

/// Retry policy for one step: total attempt budget plus backoff.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub backoff: Backoff,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 1,
            backoff: Backoff::None,
        }
    }
}

impl RetryPolicy {
    /// A policy allowing `max_attempts` runs with short exponential backoff.
    pub fn attempts(max_attempts: u32) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            backoff: Backoff::Exponential {
                base: Duration::from_millis(50),
                max: Duration::from_millis(500),
            },
        }
    }

    pub fn with_backoff(mut self, backoff: Backoff) -> Self {
        self.backoff = backoff;
        self
    }
}

/// What a step handler sees: the instance event plus the outputs of the steps
/// it declared as dependencies.
#[derive(Clone, Debug, Default)]
pub struct StepInput {
    event: Value,
    dependencies: HashMap<String, Value>,
}

impl StepInput {
    /// The payload the instance was created with.
    pub fn event(&self) -> &Value {
        &self.event
    }

    /// Output of a completed dependency, by step name.
    pub fn dependency(&self, step: &str) -> Option<&Value> {
        self.dependencies.get(step)
    }
}

/// Lifecycle of one step within an instance.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum StepState {
    Pending,
    Running,
    Completed,
    Failed,
    Skipped,
}

/// Lifecycle of a whole instance.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum InstanceState {
    Running,
    Complete,
    Errored,
}

/// Snapshot of one step's progress.
#[derive(Clone, Debug, Serialize)]
pub struct StepStatus {
    pub name: String,
    pub state: StepState,
    pub attempts: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Serializable snapshot of one instance.
#[derive(Clone, Debug, Serialize)]
pub struct WorkflowStatus {
    pub id: String,
    pub workflow: String,
    pub state: InstanceState,
    pub steps: Vec<StepStatus>,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
}

/// Errors validating a workflow definition.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum WorkflowError {
    #[error("duplicate step `{0}`")]
    DuplicateStep(String),
    #[error("step `{step}` depends on unknown step `{dependency}`")]
    UnknownDependency { step: String, dependency: String },
    #[error("retry policy references unknown step `{0}`")]
    UnknownRetryStep(String),
    #[error("dependency cycle involving steps: {}", .0.join(", "))]
    DependencyCycle(Vec<String>),
}

struct StepDef {
    name: String,
    depends_on: Vec<String>,
    retry: RetryPolicy,
    handler: StepHandler,
}

/// A validated, named DAG of steps.
pub struct WorkflowSpec {
    name: String,
    steps: Vec<StepDef>,
}

impl WorkflowSpec {
    pub fn builder(name: impl Into<String>) -> WorkflowSpecBuilder {
        WorkflowSpecBuilder {
            name: name.into(),
            steps: Vec::new(),
            retries: Vec::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

impl fmt::Debug for WorkflowSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let steps: Vec<&str> = self.steps.iter().map(|step| step.name.as_str()).collect();
        f.debug_struct("WorkflowSpec")
            .field("name", &self.name)
            .field("steps", &steps)
            .finish()
    }
}

pub struct WorkflowSpecBuilder {
    name: String,
    steps: Vec<StepDef>,
    retries: Vec<(String, RetryPolicy)>,
}

impl WorkflowSpecBuilder {
    /// Adds a step with no dependencies.
    pub fn step<F, Fut>(self, name: impl Into<String>, handler: F) -> Self
    where
        F: Fn(StepInput) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Value, StepError>> + Send + 'static,
    {
        self.step_after(name, &[], handler)
    }

    /// Adds a step that only becomes ready once every step named in
    /// `depends_on` has completed.
    pub fn step_after<F, Fut>(
        mut self,
        name: impl Into<String>,
        depends_on: &[&str],
        handler: F,
    ) -> Self
    where
        F: Fn(StepInput) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Value, StepError>> + Send + 'static,
    {
        self.steps.push(StepDef {
            name: name.into(),
            depends_on: depends_on.iter().map(|dep| (*dep).to_owned()).collect(),
            retry: RetryPolicy::default(),
            handler: Arc::new(move |input| Box::pin(handler(input))),
        });
        self
    }

    /// Overrides the retry policy of a previously added step.
    pub fn retry(mut self, step: impl Into<String>, policy: RetryPolicy) -> Self {
        self.retries.push((step.into(), policy));
        self
    }

    /// Validates the DAG: unique names, known dependencies, no cycles.
    pub fn build(mut self) -> Result<WorkflowSpec, WorkflowError> {
        let mut names = HashSet::new();
        for step in &self.steps {
            if !names.insert(step.name.clone()) {
                return Err(WorkflowError::DuplicateStep(step.name.clone()));
            }
        }
        for step in &self.steps {
            for dependency in &step.depends_on {
                if !names.contains(dependency) {
                    return Err(WorkflowError::UnknownDependency {
                        step: step.name.clone(),
                        dependency: dependency.clone(),
                    });
                }
            }
        }
        for (name, policy) in self.retries {
            match self.steps.iter_mut().find(|step| step.name == name) {
                Some(step) => step.retry = policy,
                None => return Err(WorkflowError::UnknownRetryStep(name)),
            }
        }
        detect_cycle(&self.steps)?;
        Ok(WorkflowSpec {
            name: self.name,
            steps: self.steps,
        })
    }
}

fn detect_cycle(steps: &[StepDef]) -> Result<(), WorkflowError> {
    let mut indegree: HashMap<&str, usize> = steps
        .iter()
        .map(|step| (step.name.as_str(), step.depends_on.len()))
        .collect();
    let mut dependents: HashMap<&str, Vec<&str>> = HashMap::new();
    for step in steps {
        for dependency in &step.depends_on {
            dependents
                .entry(dependency.as_str())
                .or_default()
                .push(step.name.as_str());
        }
    }

    let mut ready: Vec<&str> = indegree
        .iter()
        .filter(|(_, degree)| **degree == 0)
        .map(|(name, _)| *name)
        .collect();
    let mut visited = 0;
    while let Some(name) = ready.pop() {
        visited += 1;
        for dependent in dependents.get(name).into_iter().flatten() {
            if let Some(degree) = indegree.get_mut(dependent) {
                *degree -= 1;
                if *degree == 0 {
                    ready.push(dependent);
                }
            }
        }
    }

    if visited < steps.len() {
        let mut cyclic: Vec<String> = indegree
            .into_iter()
            .filter(|(_, degree)| *degree > 0)
            .map(|(name, _)| name.to_owned())
            .collect();
        cyclic.sort_unstable();
        return Err(WorkflowError::DependencyCycle(cyclic));
    }
    Ok(())
}

/// The binding workers use to launch and look up instances of one spec.
#[derive(Clone, Debug)]
pub struct Workflow {
    spec: Arc<WorkflowSpec>,
    instances: Arc<Mutex<HashMap<String, WorkflowInstance>>>,
}

impl Workflow {
    pub fn new(spec: WorkflowSpec) -> Self {
        Self {
            spec: Arc::new(spec),
            instances: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    pub fn name(&self) -> &str {
        self.spec.name()
    }

    /// Starts an instance with a null event payload.
    pub fn create(&self) -> WorkflowInstance {
        self.create_with(Value::Null)
    }

    /// Starts an instance whose steps receive `event` as input. The instance
    /// runs on its own task; the returned handle observes it.
    pub fn create_with(&self, event: Value) -> WorkflowInstance {
        let id = Uuid::new_v4().to_string();
        let steps = self
            .spec
            .steps
            .iter()
            .map(|step| StepStatus {
                name: step.name.clone(),
                state: StepState::Pending,
                attempts: 0,
                output: None,
                error: None,
            })
            .collect();
        let shared = Arc::new(InstanceShared {
            id: id.clone(),
            workflow: self.spec.name.clone(),
            status: Mutex::new(StatusInner {
                state: InstanceState::Running,
                steps,
                started_at: Utc::now(),
                finished_at: None,
            }),
        });
        let instance = WorkflowInstance {
            shared: shared.clone(),
        };
        lock(&self.instances).insert(id, instance.clone());
        debug!(workflow = %self.spec.name, instance = %instance.id(), "starting workflow instance");
        tokio::spawn(run_instance(self.spec.clone(), shared, event));
        instance
    }

    /// Looks up a previously created instance.
    pub fn get(&self, id: &str) -> Option<WorkflowInstance> {
        lock(&self.instances).get(id).cloned()
    }
}

/// Handle to one running (or finished) workflow instance.
#[derive(Clone, Debug)]
pub struct WorkflowInstance {
    shared: Arc<InstanceShared>,
}

impl WorkflowInstance {
    pub fn id(&self) -> &str {
        &self.shared.id
    }

    /// Snapshot of the instance's progress so far.
    pub fn status(&self) -> WorkflowStatus {
        let inner = self.shared.lock();
        WorkflowStatus {
            id: self.shared.id.clone(),
            workflow: self.shared.workflow.clone(),
            state: inner.state,
            steps: inner.steps.clone(),
            started_at: inner.started_at,
            finished_at: inner.finished_at,
        }
    }

    pub fn is_finished(&self) -> bool {
        self.shared.lock().state != InstanceState::Running
    }
}

#[derive(Debug)]
struct InstanceShared {
    id: String,
    workflow: String,
    status: Mutex<StatusInner>,
}

#[derive(Debug)]
struct StatusInner {
    state: InstanceState,
    steps: Vec<StepStatus>,
    started_at: DateTime<Utc>,
    finished_at: Option<DateTime<Utc>>,
}

impl InstanceShared {
    fn lock(&self) -> MutexGuard<'_, StatusInner> {
        self.status.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn mark_running(&self, index: usize) {
        self.lock().steps[index].state = StepState::Running;
    }

    fn record_attempt(&self, index: usize, attempts: u32) {
        self.lock().steps[index].attempts = attempts;
    }

    fn complete_step(&self, index: usize, output: Value) {
        let mut inner = self.lock();
        inner.steps[index].state = StepState::Completed;
        inner.steps[index].output = Some(output);
    }

    fn fail_step(&self, index: usize, error: String) {
        let mut inner = self.lock();
        inner.steps[index].state = StepState::Failed;
        inner.steps[index].error = Some(error);
    }

    fn finish(&self, errored: bool) {
        let mut inner = self.lock();
        for step in &mut inner.steps {
            if step.state == StepState::Pending || step.state == StepState::Running {
                step.state = StepState::Skipped;
            }
        }
        inner.state = if errored {
            InstanceState::Errored
        } else {
            InstanceState::Complete
        };
        inner.finished_at = Some(Utc::now());
    }
}

/// Drives one instance: starts every step whose dependencies have completed,
/// awaits whatever is in flight, and stops launching new work after the
/// first terminal step failure.
async fn run_instance(spec: Arc<WorkflowSpec>, shared: Arc<InstanceShared>, event: Value) {
    let mut outputs: HashMap<String, Value> = HashMap::new();
    let mut started: HashSet<usize> = HashSet::new();
    let mut in_flight: FuturesUnordered<RunFuture> = FuturesUnordered::new();
    let mut errored = false;

    loop {
        if !errored {
            for (index, step) in spec.steps.iter().enumerate() {
                if started.contains(&index) {
                    continue;
                }
                if !step
                    .depends_on
                    .iter()
                    .all(|dependency| outputs.contains_key(dependency))
                {
                    continue;
                }
                started.insert(index);
                shared.mark_running(index);
                let input = StepInput {
                    event: event.clone(),
                    dependencies: step
                        .depends_on
                        .iter()
                        .map(|dependency| (dependency.clone(), outputs[dependency].clone()))
                        .collect(),
                };
                in_flight.push(Box::pin(execute_step(
                    spec.clone(),
                    shared.clone(),
                    index,
                    input,
                )));
            }
        }

        match in_flight.next().await {
            Some((index, Ok(output))) => {
                outputs.insert(spec.steps[index].name.clone(), output.clone());
                shared.complete_step(index, output);
            }
            Some((index, Err(error))) => {
                warn!(
                    workflow = %spec.name,
                    instance = %shared.id,
                    step = %spec.steps[index].name,
                    %error,
                    "step failed, skipping downstream steps"
                );
                shared.fail_step(index, error.to_string());
                errored = true;
            }
            None => break,
        }
    }

    shared.finish(errored);
    debug!(workflow = %spec.name, instance = %shared.id, errored, "workflow instance finished");
}

async fn execute_step(
    spec: Arc<WorkflowSpec>,
    shared: Arc<InstanceShared>,
    index: usize,
    input: StepInput,
) -> (usize, Result<Value, StepError>) {
    let step = &spec.steps[index];
    let max_attempts = step.retry.max_attempts.max(1);
    let mut attempt = 0;
    loop {
        attempt += 1;
        shared.record_attempt(index, attempt);
        match (step.handler)(input.clone()).await {
            Ok(output) => return (index, Ok(output)),
            Err(error) if attempt < max_attempts => {
                let delay = step.retry.backoff.delay_for_attempt(attempt);
                debug!(
                    workflow = %spec.name,
                    step = %step.name,
                    attempt,
                    %error,
                    "step attempt failed, retrying"
                );
                if !delay.is_zero() {
                    tokio::time::sleep(delay).await;
                }
            }
            Err(error) => return (index, Err(error)),
        }
    }
}

fn lock(
    instances: &Mutex<HashMap<String, WorkflowInstance>>,
) -> MutexGuard<'_, HashMap<String, WorkflowInstance>> {
    instances.lock().unwrap_or_else(PoisonError::into_inner)
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU32, Ordering};

    use serde_json::json;
    use tokio::time::timeout;

    use super::*;

    async fn wait_for_finish(instance: &WorkflowInstance) {
        timeout(Duration::from_secs(5), async {
            while !instance.is_finished() {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("instance finished in time");
    }

    #[tokio::test]
    async fn linear_chain_passes_outputs_downstream() {
        let spec = WorkflowSpec::builder("chain")
            .step("first", |_input| async { Ok(json!({ "n": 1 })) })
            .step_after("second", &["first"], |input| async move {
                let n = input.dependency("first").and_then(|v| v["n"].as_i64());
                Ok(json!({ "n": n.unwrap_or_default() + 1 }))
            })
            .build()
            .expect("valid spec");

        let workflow = Workflow::new(spec);
        let instance = workflow.create();
        wait_for_finish(&instance).await;

        let status = instance.status();
        assert_eq!(status.state, InstanceState::Complete);
        assert_eq!(status.steps[1].state, StepState::Completed);
        assert_eq!(status.steps[1].output, Some(json!({ "n": 2 })));
        assert!(status.finished_at.is_some());
    }

    #[tokio::test]
    async fn independent_steps_run_concurrently() {
        let barrier = Arc::new(tokio::sync::Barrier::new(2));
        let left = barrier.clone();
        let right = barrier.clone();
        let spec = WorkflowSpec::builder("parallel")
            .step("left", move |_input| {
                let barrier = left.clone();
                async move {
                    barrier.wait().await;
                    Ok(json!("left"))
                }
            })
            .step("right", move |_input| {
                let barrier = right.clone();
                async move {
                    barrier.wait().await;
                    Ok(json!("right"))
                }
            })
            .build()
            .expect("valid spec");

        // Both steps block on the same barrier, so the instance can only
        // finish if they were in flight at the same time.
        let instance = Workflow::new(spec).create();
        wait_for_finish(&instance).await;
        assert_eq!(instance.status().state, InstanceState::Complete);
    }

    #[tokio::test]
    async fn failure_skips_downstream_and_errors_instance() {
        let spec = WorkflowSpec::builder("failing")
            .step("boom", |_input| async { Err(StepError::new("broke")) })
            .step_after("after", &["boom"], |_input| async { Ok(json!(null)) })
            .build()
            .expect("valid spec");

        let instance = Workflow::new(spec).create();
        wait_for_finish(&instance).await;

        let status = instance.status();
        assert_eq!(status.state, InstanceState::Errored);
        assert_eq!(status.steps[0].state, StepState::Failed);
        assert_eq!(status.steps[0].error.as_deref(), Some("broke"));
        assert_eq!(status.steps[1].state, StepState::Skipped);
    }

    #[tokio::test]
    async fn flaky_step_retries_until_success() {
        let calls = Arc::new(AtomicU32::new(0));
        let counter = calls.clone();
        let spec = WorkflowSpec::builder("flaky")
            .step("eventually", move |_input| {
                let counter = counter.clone();
                async move {
                    if counter.fetch_add(1, Ordering::SeqCst) < 2 {
                        Err(StepError::new("not yet"))
                    } else {
                        Ok(json!("done"))
                    }
                }
            })
            .retry(
                "eventually",
                RetryPolicy::attempts(5).with_backoff(Backoff::Fixed(Duration::from_millis(1))),
            )
            .build()
            .expect("valid spec");

        let instance = Workflow::new(spec).create();
        wait_for_finish(&instance).await;

        let status = instance.status();
        assert_eq!(status.state, InstanceState::Complete);
        assert_eq!(status.steps[0].attempts, 3);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn event_payload_reaches_steps() {
        let spec = WorkflowSpec::builder("payload")
            .step("echo", |input| {
                let event = input.event().clone();
                async move { Ok(event) }
            })
            .build()
            .expect("valid spec");

        let instance = Workflow::new(spec).create_with(json!({ "user": "ada" }));
        wait_for_finish(&instance).await;
        assert_eq!(
            instance.status().steps[0].output,
            Some(json!({ "user": "ada" }))
        );
    }

    #[tokio::test]
    async fn instances_are_retrievable_by_id() {
        let spec = WorkflowSpec::builder("lookup")
            .step("only", |_input| async { Ok(json!(null)) })
            .build()
            .expect("valid spec");
        let workflow = Workflow::new(spec);

        let instance = workflow.create();
        let found = workflow.get(instance.id()).expect("found");
        assert_eq!(found.id(), instance.id());
        assert!(workflow.get("no-such-id").is_none());
    }

    #[test]
    fn builder_rejects_duplicate_steps() {
        let result = WorkflowSpec::builder("dup")
            .step("a", |_input| async { Ok(json!(null)) })
            .step("a", |_input| async { Ok(json!(null)) })
            .build();
        assert_eq!(result.err(), Some(WorkflowError::DuplicateStep("a".into())));
    }

    #[test]
    fn builder_rejects_unknown_dependency() {
        let result = WorkflowSpec::builder("unknown")
            .step_after("a", &["ghost"], |_input| async { Ok(json!(null)) })
            .build();
        assert_eq!(
            result.err(),
            Some(WorkflowError::UnknownDependency {
                step: "a".into(),
                dependency: "ghost".into(),
            })
        );
    }

    #[test]
    fn builder_rejects_cycles() {
        let result = WorkflowSpec::builder("cycle")
            .step_after("a", &["b"], |_input| async { Ok(json!(null)) })
            .step_after("b", &["a"], |_input| async { Ok(json!(null)) })
            .build();
        assert_eq!(
            result.err(),
            Some(WorkflowError::DependencyCycle(vec!["a".into(), "b".into()]))
        );
    }

    #[test]
    fn builder_rejects_retry_for_unknown_step() {
        let result = WorkflowSpec::builder("retry")
            .step("a", |_input| async { Ok(json!(null)) })
            .retry("ghost", RetryPolicy::attempts(3))
            .build();
        assert_eq!(
            result.err(),
            Some(WorkflowError::UnknownRetryStep("ghost".into()))
        );
    }

    #[test]
    fn exponential_backoff_doubles_and_caps() {
        let backoff = Backoff::Exponential {
            base: Duration::from_millis(50),
            max: Duration::from_millis(500),
        };
        assert_eq!(backoff.delay_for_attempt(1), Duration::from_millis(50));
        assert_eq!(backoff.delay_for_attempt(2), Duration::from_millis(100));
        assert_eq!(backoff.delay_for_attempt(3), Duration::from_millis(200));
        assert_eq!(backoff.delay_for_attempt(10), Duration::from_millis(500));
    }

    #[test]
    fn states_serialize_lowercase() {
        assert_eq!(
            serde_json::to_string(&StepState::Completed).expect("encode"),
            r#""completed""#
        );
        assert_eq!(
            serde_json::to_string(&InstanceState::Errored).expect("encode"),
            r#""errored""#
        );
    }
}
