//! Pipeline orchestrator - executes pipeline stages in declared order.

use chrono::Utc;
use edgeship_config::{SiteConfig, VariableContext};
use edgeship_core::artifact::{Artifact, ArtifactRegistry, ArtifactTree};
use edgeship_core::build::BuildRunner;
use edgeship_core::context::ExecutionContext;
use edgeship_core::distribution::{EdgeDistribution, InvalidationRequest};
use edgeship_core::pipeline::{ActionKind, ActionSpec, ActionStatus, DistributionBinding, Pipeline, Stage};
use edgeship_core::run::{ActionFailure, ActionRecord, RunResult, RunStatus};
use edgeship_core::source::{REVISION_METADATA, SourceConnector, TriggerEvent};
use edgeship_core::store::ObjectStore;
use edgeship_core::{Error, Result, RunId};
use edgeship_deployer::deploy_tree;
use futures::future::join_all;
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};
use tokio::sync::{mpsc, watch};
use tracing::{debug, error, info, warn};

use crate::control::RunControl;

/// Event emitted during pipeline execution.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum PipelineEvent {
    RunStarted {
        run_id: RunId,
        pipeline: String,
        revision: String,
    },
    StageStarted {
        stage: String,
    },
    ActionStarted {
        stage: String,
        action: String,
    },
    ActionCompleted {
        stage: String,
        action: String,
        status: ActionStatus,
    },
    StageCompleted {
        stage: String,
        success: bool,
    },
    RunCompleted {
        status: RunStatus,
    },
}

/// External systems a pipeline run talks to.
#[derive(Clone)]
pub struct Collaborators {
    pub source: Arc<dyn SourceConnector>,
    pub builder: Arc<dyn BuildRunner>,
    pub store: Arc<dyn ObjectStore>,
    pub distribution: Arc<dyn EdgeDistribution>,
}

/// Orchestrates the execution of a pipeline.
#[derive(Clone)]
pub struct PipelineOrchestrator {
    pipeline: Arc<Pipeline>,
    collaborators: Collaborators,
    binding: DistributionBinding,
    base_url: String,
    /// Configured build environment, interpolated per run.
    build_env: BTreeMap<String, String>,
    site: Option<Arc<SiteConfig>>,
}

/// Mutable state of one run, shared by the actions of a stage.
struct RunState {
    ctx: ExecutionContext,
    trigger: TriggerEvent,
    registry: ArtifactRegistry,
    events: Option<mpsc::Sender<PipelineEvent>>,
    records: Mutex<Vec<ActionRecord>>,
    failure: Mutex<Option<ActionFailure>>,
    deployed: Mutex<Vec<String>>,
}

impl RunState {
    /// Events are dropped rather than awaited when the receiver lags or is gone.
    fn emit(&self, event: PipelineEvent) {
        if let Some(tx) = &self.events {
            if let Err(mpsc::error::TrySendError::Full(event)) = tx.try_send(event) {
                debug!(event = ?event, "Event channel full, dropping event");
            }
        }
    }

    fn push_pending(&self, stage: &Stage) {
        if let Ok(mut records) = self.records.lock() {
            records.extend(stage.actions.iter().map(|a| ActionRecord {
                stage: stage.name.clone(),
                action: a.name.clone(),
                kind: a.kind,
                status: ActionStatus::Pending,
                started_at: None,
                finished_at: None,
            }));
        }
    }

    fn update(&self, action: &str, f: impl FnOnce(&mut ActionRecord)) {
        if let Ok(mut records) = self.records.lock() {
            if let Some(record) = records.iter_mut().find(|r| r.action == action) {
                f(record);
            }
        }
    }

    fn mark_running(&self, action: &str) {
        self.update(action, |r| {
            r.status = ActionStatus::Running;
            r.started_at = Some(Utc::now());
        });
    }

    fn mark_finished(&self, action: &str, status: ActionStatus) {
        self.update(action, |r| {
            r.status = status;
            r.finished_at = Some(Utc::now());
        });
    }

    /// Keep only the first failure, by completion time.
    fn record_failure(&self, stage: &Stage, action: &ActionSpec, err: &Error) {
        if let Ok(mut failure) = self.failure.lock() {
            failure.get_or_insert_with(|| ActionFailure {
                stage: stage.name.clone(),
                action: action.name.clone(),
                kind: err.failure_kind(),
                message: err.to_string(),
            });
        }
    }

    fn record_deployed(&self, keys: impl IntoIterator<Item = String>) {
        if let Ok(mut deployed) = self.deployed.lock() {
            deployed.extend(keys);
        }
    }

    /// Mark the unfinished actions of an abandoned stage.
    fn abandon(&self, stage: &Stage) {
        if let Ok(mut records) = self.records.lock() {
            for record in records
                .iter_mut()
                .filter(|r| r.stage == stage.name && !r.status.is_terminal())
            {
                record.status = ActionStatus::Failed {
                    message: "cancelled".to_string(),
                };
                record.finished_at = Some(Utc::now());
            }
        }
    }

    fn input(&self, action: &ActionSpec) -> Result<Arc<Artifact>> {
        let name = action.input.as_deref().ok_or_else(|| {
            Error::Artifact(format!("action '{}' declares no input artifact", action.name))
        })?;
        self.registry.get(name)
    }

    /// Publish a successful action's output under each declared name.
    fn publish(&self, action: &ActionSpec, tree: ArtifactTree) -> Result<()> {
        for name in &action.outputs {
            let artifact = Artifact::new(name, &action.name, tree.clone())
                .with_metadata(REVISION_METADATA, &self.trigger.revision);
            self.registry.populate(artifact)?;
        }
        Ok(())
    }

    fn into_result(self, mut result: RunResult, cancelled: bool) -> RunResult {
        let failure = self.failure.into_inner().ok().flatten();
        result.status = match (&failure, cancelled) {
            (_, true) => RunStatus::Cancelled,
            (Some(f), false) => RunStatus::Failed {
                stage: f.stage.clone(),
                action: f.action.clone(),
            },
            (None, false) => RunStatus::Succeeded,
        };
        result.failure = failure;
        result.actions = self.records.into_inner().unwrap_or_default();
        result.deployed_objects = self.deployed.into_inner().unwrap_or_default();
        result.finished_at = Some(Utc::now());
        result
    }
}

impl PipelineOrchestrator {
    pub fn new(
        pipeline: Pipeline,
        collaborators: Collaborators,
        binding: DistributionBinding,
        base_url: impl Into<String>,
    ) -> Result<Self> {
        pipeline.validate()?;
        Ok(Self {
            pipeline: Arc::new(pipeline),
            collaborators,
            binding,
            base_url: base_url.into(),
            build_env: BTreeMap::new(),
            site: None,
        })
    }

    /// Orchestrator for the delivery pipeline of a configured site.
    pub fn for_site(site: &SiteConfig, collaborators: Collaborators) -> Result<Self> {
        let mut orchestrator =
            Self::new(site.pipeline(), collaborators, site.binding(), site.base_url())?;
        orchestrator.build_env = site.build.env.clone();
        orchestrator.site = Some(Arc::new(site.clone()));
        Ok(orchestrator)
    }

    pub fn pipeline(&self) -> &Pipeline {
        &self.pipeline
    }

    pub fn name(&self) -> &str {
        &self.pipeline.name
    }

    /// Execute a run, returning a channel of events and a handle to get the final result.
    ///
    /// The run never waits on the receiver: once 100 events are buffered, further
    /// events are dropped until the receiver catches up.
    pub fn execute(
        &self,
        trigger: TriggerEvent,
    ) -> (
        mpsc::Receiver<PipelineEvent>,
        tokio::task::JoinHandle<RunResult>,
    ) {
        let (tx, rx) = mpsc::channel(100);
        let orchestrator = self.clone();
        let control = RunControl::new(RunId::new());

        let handle = tokio::spawn(async move {
            orchestrator
                .execute_inner(trigger, &control, Some(tx))
                .await
        });

        (rx, handle)
    }

    /// Execute a run to completion under `control`.
    pub async fn run(&self, trigger: TriggerEvent, control: &RunControl) -> RunResult {
        self.execute_inner(trigger, control, None).await
    }

    fn context(&self, run_id: RunId, trigger: &TriggerEvent) -> ExecutionContext {
        let mut ctx = ExecutionContext::new(
            run_id,
            &self.pipeline.name,
            &trigger.revision,
            &self.base_url,
        );
        let vars = match &self.site {
            Some(site) => VariableContext::for_run(site, &ctx),
            None => VariableContext::from_execution(&ctx),
        };
        for (key, value) in vars.interpolate_map(&self.build_env) {
            // BASEURL always reflects the deployed site.
            ctx.env.entry(key).or_insert(value);
        }
        ctx
    }

    async fn execute_inner(
        &self,
        trigger: TriggerEvent,
        control: &RunControl,
        events: Option<mpsc::Sender<PipelineEvent>>,
    ) -> RunResult {
        let run_id = control.run_id();
        let mut result = RunResult::queued(run_id, &self.pipeline.name, trigger.clone());

        if !control.begin() {
            info!(run_id = %run_id, pipeline = %self.pipeline.name, "Run cancelled before start");
            result.status = RunStatus::Cancelled;
            result.finished_at = Some(Utc::now());
            control.finish();
            if let Some(tx) = &events {
                let _ = tx.try_send(PipelineEvent::RunCompleted {
                    status: result.status.clone(),
                });
            }
            return result;
        }
        result.started_at = Some(Utc::now());

        let run = RunState {
            ctx: self.context(run_id, &trigger),
            registry: ArtifactRegistry::declare(self.pipeline.declared_artifacts()),
            trigger,
            events,
            records: Mutex::new(Vec::new()),
            failure: Mutex::new(None),
            deployed: Mutex::new(Vec::new()),
        };

        info!(
            run_id = %run_id,
            pipeline = %self.pipeline.name,
            repo = %run.trigger.repository.full_name(),
            revision = %run.trigger.short_revision(),
            "Starting pipeline run"
        );
        run.emit(PipelineEvent::RunStarted {
            run_id,
            pipeline: self.pipeline.name.clone(),
            revision: run.trigger.revision.clone(),
        });

        let final_index = self.pipeline.final_stage_index();
        let mut cancelled = false;

        for (index, stage) in self.pipeline.stages.iter().enumerate() {
            let is_final = Some(index) == final_index;
            if !control.enter_stage(is_final) {
                cancelled = true;
                break;
            }

            info!(run_id = %run_id, stage = %stage.name, "Stage started");
            run.emit(PipelineEvent::StageStarted {
                stage: stage.name.clone(),
            });
            run.push_pending(stage);

            // The final stage runs to completion once entered.
            let success = if is_final {
                self.execute_stage(&run, stage).await
            } else {
                tokio::select! {
                    success = self.execute_stage(&run, stage) => success,
                    _ = control.cancelled() => {
                        cancelled = true;
                        false
                    }
                }
            };

            if cancelled {
                warn!(run_id = %run_id, stage = %stage.name, "Run cancelled, abandoning stage");
                run.abandon(stage);
            } else if success {
                info!(run_id = %run_id, stage = %stage.name, "Stage completed successfully");
            } else {
                error!(run_id = %run_id, stage = %stage.name, "Stage failed");
            }

            run.emit(PipelineEvent::StageCompleted {
                stage: stage.name.clone(),
                success,
            });

            if !success {
                break;
            }
        }

        control.finish();

        let events = run.events.clone();
        let result = run.into_result(result, cancelled);
        info!(run_id = %run_id, status = ?result.status, "Pipeline run finished");
        if let Some(tx) = events {
            let _ = tx.try_send(PipelineEvent::RunCompleted {
                status: result.status.clone(),
            });
        }
        result
    }

    /// Dispatch every action of a stage concurrently. True if all succeeded.
    async fn execute_stage(&self, run: &RunState, stage: &Stage) -> bool {
        // One-shot completion signal per action: None until it finishes.
        let signals: Vec<watch::Sender<Option<bool>>> = stage
            .actions
            .iter()
            .map(|_| watch::channel(None).0)
            .collect();

        let actions = stage.actions.iter().zip(&signals).map(|(action, done)| {
            let dependency = action.after.as_deref().and_then(|dep| {
                stage
                    .actions
                    .iter()
                    .position(|a| a.name == dep)
                    .map(|i| (dep, signals[i].subscribe()))
            });
            self.execute_action(run, stage, action, done, dependency)
        });

        join_all(actions).await.into_iter().all(|ok| ok)
    }

    async fn execute_action(
        &self,
        run: &RunState,
        stage: &Stage,
        action: &ActionSpec,
        done: &watch::Sender<Option<bool>>,
        dependency: Option<(&str, watch::Receiver<Option<bool>>)>,
    ) -> bool {
        let run_id = run.ctx.run_id;

        if let Some((dep, mut rx)) = dependency {
            let dep_succeeded = match rx.wait_for(Option::is_some).await {
                Ok(state) => *state == Some(true),
                Err(_) => false,
            };
            if !dep_succeeded {
                let reason = format!("'{}' did not succeed", dep);
                info!(run_id = %run_id, action = %action.name, %reason, "Skipping action");
                let status = ActionStatus::Skipped { reason };
                run.mark_finished(&action.name, status.clone());
                run.emit(PipelineEvent::ActionCompleted {
                    stage: stage.name.clone(),
                    action: action.name.clone(),
                    status,
                });
                done.send_replace(Some(false));
                return false;
            }
        }

        info!(run_id = %run_id, stage = %stage.name, action = %action.name, kind = %action.kind, "Action started");
        run.mark_running(&action.name);
        run.emit(PipelineEvent::ActionStarted {
            stage: stage.name.clone(),
            action: action.name.clone(),
        });

        let outcome = match action.timeout {
            Some(limit) => tokio::time::timeout(limit, self.dispatch(run, action))
                .await
                .unwrap_or_else(|_| {
                    Err(Error::Timeout(format!(
                        "action '{}' exceeded {:?}",
                        action.name, limit
                    )))
                }),
            None => self.dispatch(run, action).await,
        };

        let status = match outcome {
            Ok(()) => {
                info!(run_id = %run_id, action = %action.name, "Action succeeded");
                ActionStatus::Succeeded
            }
            Err(e) => {
                error!(run_id = %run_id, action = %action.name, error = %e, "Action failed");
                run.record_failure(stage, action, &e);
                ActionStatus::Failed {
                    message: e.to_string(),
                }
            }
        };

        let success = status.is_success();
        run.mark_finished(&action.name, status.clone());
        run.emit(PipelineEvent::ActionCompleted {
            stage: stage.name.clone(),
            action: action.name.clone(),
            status,
        });
        done.send_replace(Some(success));
        success
    }

    /// Perform an action's work.
    async fn dispatch(&self, run: &RunState, action: &ActionSpec) -> Result<()> {
        match action.kind {
            ActionKind::SourceFetch => {
                let tree = self
                    .collaborators
                    .source
                    .fetch(&run.trigger.repository, &run.trigger.revision)
                    .await?;
                info!(
                    run_id = %run.ctx.run_id,
                    files = tree.len(),
                    checksum = %tree.checksum(),
                    "Source fetched"
                );
                run.publish(action, tree)
            }
            ActionKind::Build => {
                let source = run.input(action)?;
                let tree = self.collaborators.builder.build(&source, &run.ctx).await?;
                run.publish(action, tree)
            }
            ActionKind::Deploy => {
                let build = run.input(action)?;
                match deploy_tree(self.collaborators.store.as_ref(), &build.tree).await {
                    Ok(report) => {
                        run.record_deployed(report.written);
                        Ok(())
                    }
                    Err(Error::Deploy { message, written }) => {
                        run.record_deployed(written.iter().cloned());
                        Err(Error::Deploy { message, written })
                    }
                    Err(e) => Err(e),
                }
            }
            ActionKind::Invoke => {
                let request = InvalidationRequest::wildcard(
                    &self.binding.distribution_id,
                    run.ctx.run_id.to_string(),
                );
                let receipt = self
                    .collaborators
                    .distribution
                    .create_invalidation(&request)
                    .await?;
                info!(
                    run_id = %run.ctx.run_id,
                    site = %self.binding.site,
                    distribution = %self.binding.distribution_id,
                    invalidation = %receipt.id,
                    "Edge cache invalidation requested"
                );
                Ok(())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{DOCS_SITE, FakeBuilder, Harness, REVISION, push};
    use async_trait::async_trait;
    use bytes::Bytes;
    use edgeship_core::FailureKind;
    use edgeship_core::store::StoredObject;
    use edgeship_deployer::{MemoryDistribution, MemoryObjectStore};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    /// Store that rejects one key.
    struct RejectingStore {
        inner: MemoryObjectStore,
        reject: &'static str,
    }

    #[async_trait]
    impl ObjectStore for RejectingStore {
        fn bucket(&self) -> &str {
            self.inner.bucket()
        }

        async fn put(&self, key: &str, data: Bytes, content_type: &str) -> Result<()> {
            if key == self.reject {
                return Err(Error::Internal("access denied".to_string()));
            }
            self.inner.put(key, data, content_type).await
        }

        async fn get(&self, key: &str) -> Result<Option<StoredObject>> {
            self.inner.get(key).await
        }

        async fn list(&self) -> Result<Vec<String>> {
            self.inner.list().await
        }
    }

    async fn collect(mut rx: mpsc::Receiver<PipelineEvent>) -> Vec<PipelineEvent> {
        let mut events = Vec::new();
        while let Some(event) = rx.recv().await {
            events.push(event);
        }
        events
    }

    #[tokio::test]
    async fn test_push_to_main_deploys_docs_site() {
        let harness = Harness::new(FakeBuilder::default(), MemoryDistribution::new());
        let (rx, handle) = harness.orchestrator().execute(push());
        let events = collect(rx).await;
        let result = handle.await.unwrap();

        assert!(result.is_success(), "run failed: {:?}", result.failure);
        assert_eq!(result.pipeline, "docs-pipeline");

        let index = harness.store.get("index.html").await.unwrap().unwrap();
        let body = String::from_utf8_lossy(&index.data);
        assert!(body.contains("https://docs.example.com/"));
        assert!(body.contains(REVISION));
        assert_eq!(index.content_type, "text/html; charset=utf-8");
        assert_eq!(result.deployed_objects, vec!["css/site.css", "index.html"]);

        let requests = harness.distribution.requests();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].distribution_id, "E2QWRUHAPOMQZL");
        assert_eq!(requests[0].paths, vec!["/*"]);
        assert_eq!(requests[0].caller_reference, result.run_id.to_string());

        let env = harness.builder.seen_env.lock().unwrap().clone().unwrap();
        assert_eq!(env["BASEURL"], "https://docs.example.com/");
        assert_eq!(env["SITE_URL"], "https://docs.example.com/");
        assert_eq!(env["COMMIT"], "4f2c9e1");

        assert!(matches!(events.first(), Some(PipelineEvent::RunStarted { .. })));
        assert!(matches!(
            events.last(),
            Some(PipelineEvent::RunCompleted {
                status: RunStatus::Succeeded
            })
        ));
    }

    #[tokio::test]
    async fn test_undrained_event_channel_does_not_stall_run() {
        let harness = Harness::new(FakeBuilder::default(), MemoryDistribution::new());
        let orchestrator = harness.orchestrator();
        let (tx, mut rx) = mpsc::channel(1);
        let control = RunControl::new(RunId::new());

        let result = tokio::time::timeout(
            Duration::from_secs(5),
            orchestrator.execute_inner(push(), &control, Some(tx)),
        )
        .await
        .expect("run stalled on a full event channel");

        assert!(result.is_success(), "run failed: {:?}", result.failure);
        assert_eq!(harness.distribution.requests().len(), 1);
        assert!(matches!(rx.recv().await, Some(PipelineEvent::RunStarted { .. })));
        assert!(rx.recv().await.is_none());
    }

    #[tokio::test]
    async fn test_stages_run_in_order_and_invalidation_follows_deploy() {
        let harness = Harness::new(FakeBuilder::default(), MemoryDistribution::new());
        let (rx, handle) = harness.orchestrator().execute(push());
        let events = collect(rx).await;
        handle.await.unwrap();

        let stages: Vec<&str> = events
            .iter()
            .filter_map(|e| match e {
                PipelineEvent::StageStarted { stage } => Some(stage.as_str()),
                _ => None,
            })
            .collect();
        assert_eq!(stages, vec!["source", "build", "deploy"]);

        let position =
            |pred: &dyn Fn(&PipelineEvent) -> bool| events.iter().position(|e| pred(e)).unwrap();
        let source_done = position(&|e| {
            matches!(e, PipelineEvent::StageCompleted { stage, success: true } if stage == "source")
        });
        let build_started = position(&|e| {
            matches!(e, PipelineEvent::ActionStarted { action, .. } if action == "docs-buildaction")
        });
        let deploy_done = position(&|e| {
            matches!(e, PipelineEvent::ActionCompleted { action, .. } if action == "docs-deployaction")
        });
        let invalidate_started = position(&|e| {
            matches!(e, PipelineEvent::ActionStarted { action, .. } if action == "docs-invalidate-action")
        });
        assert!(source_done < build_started);
        assert!(deploy_done < invalidate_started);
    }

    #[tokio::test]
    async fn test_build_failure_never_touches_store_or_cdn() {
        let harness = Harness::new(
            FakeBuilder {
                fail: Some("hugo: template not found"),
                ..Default::default()
            },
            MemoryDistribution::new(),
        );
        harness
            .store
            .put("index.html", Bytes::from_static(b"previous release"), "text/html")
            .await
            .unwrap();
        let before = harness.store.snapshot().await;

        let result = harness.orchestrator().run(push(), &RunControl::new(RunId::new())).await;

        assert_eq!(
            result.status,
            RunStatus::Failed {
                stage: "build".to_string(),
                action: "docs-buildaction".to_string(),
            }
        );
        let failure = result.failure.as_ref().unwrap();
        assert_eq!(failure.kind, FailureKind::Build);
        assert!(failure.message.contains("template not found"));

        assert!(!result.stage_dispatched("deploy"));
        assert!(result.action("docs-deployaction").is_none());
        assert_eq!(harness.store.snapshot().await, before);
        assert!(harness.distribution.requests().is_empty());
    }

    #[tokio::test]
    async fn test_invalidation_failure_keeps_deployed_content() {
        let harness = Harness::new(FakeBuilder::default(), MemoryDistribution::failing("throttled"));

        let result = harness.orchestrator().run(push(), &RunControl::new(RunId::new())).await;

        assert_eq!(
            result.status,
            RunStatus::Failed {
                stage: "deploy".to_string(),
                action: "docs-invalidate-action".to_string(),
            }
        );
        assert_eq!(result.failure.as_ref().unwrap().kind, FailureKind::Invalidation);
        assert!(result.action("docs-deployaction").unwrap().status.is_success());

        let snapshot = harness.store.snapshot().await;
        assert!(String::from_utf8_lossy(&snapshot["index.html"]).contains("https://docs.example.com/"));
    }

    #[tokio::test]
    async fn test_invalidation_timeout_fails_run() {
        let harness = Harness::new(
            FakeBuilder::default(),
            MemoryDistribution::new().with_delay(Duration::from_secs(5)),
        );
        let site = edgeship_config::parse_site(DOCS_SITE).unwrap();
        let mut pipeline = site.pipeline();
        pipeline.stages[2].actions[1].timeout = Some(Duration::from_millis(50));
        let orchestrator = PipelineOrchestrator::new(
            pipeline,
            harness.collaborators(),
            site.binding(),
            site.base_url(),
        )
        .unwrap();

        let result = orchestrator.run(push(), &RunControl::new(RunId::new())).await;

        assert_eq!(result.failure.as_ref().unwrap().kind, FailureKind::Timeout);
        assert!(harness.store.get("index.html").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_deploy_failure_skips_invalidation() {
        let harness = Harness::new(FakeBuilder::default(), MemoryDistribution::new());
        let store = Arc::new(RejectingStore {
            inner: MemoryObjectStore::new("docs-site-bucket"),
            reject: "index.html",
        });
        let collaborators = Collaborators {
            store: store.clone(),
            ..harness.collaborators()
        };
        let site = edgeship_config::parse_site(DOCS_SITE).unwrap();
        let orchestrator = PipelineOrchestrator::for_site(&site, collaborators).unwrap();

        let result = orchestrator.run(push(), &RunControl::new(RunId::new())).await;

        let failure = result.failure.clone().unwrap();
        assert_eq!(failure.kind, FailureKind::Deploy);
        assert_eq!(failure.action, "docs-deployaction");
        assert_eq!(result.deployed_objects, vec!["css/site.css"]);
        assert!(matches!(
            result.action("docs-invalidate-action").unwrap().status,
            ActionStatus::Skipped { .. }
        ));
        assert!(harness.distribution.requests().is_empty());
    }

    #[tokio::test]
    async fn test_failing_sibling_lets_others_finish() {
        /// The first build fails at once; later ones succeed after a delay.
        #[derive(Default)]
        struct SplitBuilder {
            calls: AtomicUsize,
        }

        #[async_trait]
        impl BuildRunner for SplitBuilder {
            fn name(&self) -> &'static str {
                "split"
            }

            async fn build(&self, _source: &Artifact, _ctx: &ExecutionContext) -> Result<ArtifactTree> {
                if self.calls.fetch_add(1, Ordering::SeqCst) == 0 {
                    return Err(Error::build("lint failed"));
                }
                tokio::time::sleep(Duration::from_millis(100)).await;
                Ok(ArtifactTree::new())
            }
        }

        let harness = Harness::new(FakeBuilder::default(), MemoryDistribution::new());
        let collaborators = Collaborators {
            builder: Arc::new(SplitBuilder::default()),
            ..harness.collaborators()
        };

        let pipeline = Pipeline::new("checks")
            .stage(
                "source",
                vec![ActionSpec::new("fetch", ActionKind::SourceFetch).with_output("checkout")],
            )
            .stage(
                "checks",
                vec![
                    ActionSpec::new("lint", ActionKind::Build).with_input("checkout"),
                    ActionSpec::new("render", ActionKind::Build).with_input("checkout"),
                ],
            )
            .stage("publish", vec![ActionSpec::new("notify", ActionKind::Invoke)]);

        let binding = DistributionBinding {
            site: "docs.example.com".to_string(),
            distribution_id: "E2QWRUHAPOMQZL".to_string(),
        };
        let orchestrator =
            PipelineOrchestrator::new(pipeline, collaborators, binding, "https://docs.example.com/")
                .unwrap();

        let result = orchestrator.run(push(), &RunControl::new(RunId::new())).await;

        let failure = result.failure.as_ref().unwrap();
        assert_eq!(failure.action, "lint");
        assert_eq!(failure.stage, "checks");
        let render = result.action("render").unwrap();
        assert!(render.status.is_success());
        assert!(render.finished_at.is_some());
        assert!(!result.stage_dispatched("publish"));
        assert!(harness.distribution.requests().is_empty());
    }

    #[tokio::test]
    async fn test_build_timeout_is_reported() {
        let harness = Harness::new(
            FakeBuilder {
                delay: Some(Duration::from_secs(5)),
                ..Default::default()
            },
            MemoryDistribution::new(),
        );
        let site = edgeship_config::parse_site(DOCS_SITE).unwrap();
        let mut pipeline = site.pipeline();
        pipeline.stages[1].actions[0].timeout = Some(Duration::from_millis(50));
        let orchestrator = PipelineOrchestrator::new(
            pipeline,
            harness.collaborators(),
            site.binding(),
            site.base_url(),
        )
        .unwrap();

        let result = orchestrator.run(push(), &RunControl::new(RunId::new())).await;

        assert_eq!(result.failure.as_ref().unwrap().kind, FailureKind::Timeout);
        assert!(harness.store.snapshot().await.is_empty());
    }

    #[tokio::test]
    async fn test_cancel_during_build_stops_before_deploy() {
        let harness = Harness::new(
            FakeBuilder {
                delay: Some(Duration::from_secs(5)),
                ..Default::default()
            },
            MemoryDistribution::new(),
        );
        let orchestrator = harness.orchestrator();
        let control = Arc::new(RunControl::new(RunId::new()));

        let run = {
            let control = control.clone();
            tokio::spawn(async move { orchestrator.run(push(), &control).await })
        };
        while harness.builder.running.load(Ordering::SeqCst) == 0 {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        control.cancel().unwrap();

        let result = tokio::time::timeout(Duration::from_secs(2), run)
            .await
            .unwrap()
            .unwrap();

        assert_eq!(result.status, RunStatus::Cancelled);
        assert!(matches!(
            result.action("docs-buildaction").unwrap().status,
            ActionStatus::Failed { .. }
        ));
        assert!(!result.stage_dispatched("deploy"));
        assert!(harness.store.snapshot().await.is_empty());
    }

    #[tokio::test]
    async fn test_cancelled_before_start_runs_nothing() {
        let harness = Harness::new(FakeBuilder::default(), MemoryDistribution::new());
        let control = RunControl::new(RunId::new());
        control.cancel().unwrap();

        let result = harness.orchestrator().run(push(), &control).await;

        assert_eq!(result.status, RunStatus::Cancelled);
        assert!(result.actions.is_empty());
        assert_eq!(harness.source.fetches.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_rejects_invalid_pipeline() {
        let harness = Harness::new(FakeBuilder::default(), MemoryDistribution::new());
        let binding = DistributionBinding {
            site: "docs.example.com".to_string(),
            distribution_id: "E2QWRUHAPOMQZL".to_string(),
        };
        let err = PipelineOrchestrator::new(
            Pipeline::new("empty"),
            harness.collaborators(),
            binding,
            "https://docs.example.com/",
        )
        .err()
        .unwrap();
        assert!(matches!(err, Error::InvalidInput(_)));
    }
}
