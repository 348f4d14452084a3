//! Pipeline orchestrator.
//!
//! Steps run strictly in order. A failed step halts the run, cancellation is
//! checked before every step, and the session is closed on every exit path.

use serde::Serialize;
use serde_json::Value;
use std::path::PathBuf;

use crate::cancel::CancellationToken;
use crate::config::SshdbgConfig;
use crate::error::{Error, Hint, Result};
use crate::launch::{self, DebugLauncher, LaunchFile};
use crate::progress::ProgressSink;
use crate::project::{BuildCollaborator, BuildOutcome, ProjectInfo, PublishCollaborator, PublishOutcome};
use crate::provision::{ProvisionOutcome, Provisioner, RuntimeKind};
use crate::ssh::{RemoteTarget, Session, Transport};
use crate::sync;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Step {
    Build,
    Publish,
    Connect,
    ProvisionRuntime,
    ProvisionDebugAgent,
    ManageTargetDir,
    Upload,
    EmitConfig,
    Launch,
}

impl Step {
    pub fn label(&self) -> &'static str {
        match self {
            Step::Build => "Build",
            Step::Publish => "Publish",
            Step::Connect => "Connect",
            Step::ProvisionRuntime => ".NET Install",
            Step::ProvisionDebugAgent => "VSDBG Install",
            Step::ManageTargetDir => "Manage Folders",
            Step::Upload => "File Transfer",
            Step::EmitConfig => "Generate launch.json",
            Step::Launch => "Launch VSDBG",
        }
    }
}

pub const DEPLOY_STEPS: [Step; 9] = [
    Step::Build,
    Step::Publish,
    Step::Connect,
    Step::ProvisionRuntime,
    Step::ProvisionDebugAgent,
    Step::ManageTargetDir,
    Step::Upload,
    Step::EmitConfig,
    Step::Launch,
];

/// The debug-only run re-checks the build, then skips straight to the session.
pub const DEBUG_STEPS: [Step; 4] = [Step::Build, Step::Connect, Step::EmitConfig, Step::Launch];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StepOutcome {
    Succeeded,
    Skipped,
    Failed,
    Cancelled,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StepRecord {
    pub step: Step,
    pub label: String,
    pub outcome: StepOutcome,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub diagnostic: Option<String>,
}

impl StepRecord {
    pub fn new(step: Step, outcome: StepOutcome, diagnostic: Option<String>) -> Self {
        Self {
            step,
            label: step.label().to_string(),
            outcome,
            diagnostic,
        }
    }

    pub fn status_text(&self) -> String {
        let verb = match self.outcome {
            StepOutcome::Succeeded => "completed",
            StepOutcome::Skipped => "skipped",
            StepOutcome::Failed => "failed",
            StepOutcome::Cancelled => "cancelled",
        };
        format!("Step '{}' {}", self.label, verb)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PipelineKind {
    Deploy,
    Debug,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Succeeded,
    Failed,
    Cancelled,
}

#[derive(Debug, Clone, Serialize)]
pub struct ReportError {
    pub code: String,
    pub message: String,
    #[serde(skip_serializing_if = "Value::is_null")]
    pub details: Value,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub hints: Vec<Hint>,
}

impl From<&Error> for ReportError {
    fn from(err: &Error) -> Self {
        Self {
            code: err.code.as_str().to_string(),
            message: err.message.clone(),
            details: err.details.clone(),
            hints: err.hints.clone(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    pub total_steps: usize,
    pub succeeded: usize,
    pub skipped: usize,
    pub failed: usize,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub next_actions: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct PipelineReport {
    pub pipeline: PipelineKind,
    pub status: RunStatus,
    pub steps: Vec<StepRecord>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failed_step: Option<Step>,
    /// First step that did not run to completion because of cancellation.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cancelled_at: Option<Step>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ReportError>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cleanup_warning: Option<String>,
    pub started_at: String,
    pub finished_at: String,
    pub summary: RunSummary,
    #[serde(skip)]
    cause: Option<Error>,
}

impl PipelineReport {
    pub fn executed(&self) -> Vec<Step> {
        self.steps.iter().map(|r| r.step).collect()
    }

    pub fn outcome_of(&self, step: Step) -> Option<StepOutcome> {
        self.steps.iter().find(|r| r.step == step).map(|r| r.outcome)
    }

    /// The error that failed the run, with the whole report under `details.report`.
    pub fn into_error(self) -> Error {
        let report = serde_json::to_value(&self).unwrap_or(Value::Null);
        let mut err = self
            .cause
            .unwrap_or_else(|| Error::internal_unexpected("Pipeline failed without an error"));
        match &mut err.details {
            Value::Object(map) => {
                map.insert("report".to_string(), report);
            }
            other => *other = serde_json::json!({ "report": report }),
        }
        err
    }
}

/// What a step body hands back to the runner.
enum StepResult<T> {
    Done {
        value: T,
        outcome: StepOutcome,
        diagnostic: Option<String>,
    },
    Cancelled,
}

fn completed<T>(value: T, note: impl Into<String>) -> StepResult<T> {
    StepResult::Done {
        value,
        outcome: StepOutcome::Succeeded,
        diagnostic: Some(note.into()),
    }
}

fn skipped<T>(value: T, note: impl Into<String>) -> StepResult<T> {
    StepResult::Done {
        value,
        outcome: StepOutcome::Skipped,
        diagnostic: Some(note.into()),
    }
}

fn provisioned(outcome: ProvisionOutcome, component: &str) -> StepResult<()> {
    match outcome {
        ProvisionOutcome::Installed => completed((), format!("{} installed", component)),
        ProvisionOutcome::AlreadyPresent => skipped((), format!("{} already installed", component)),
    }
}

/// State of one run: the records so far and the session, if one is open.
struct Run<'a> {
    kind: PipelineKind,
    progress: &'a dyn ProgressSink,
    cancel: &'a CancellationToken,
    started_at: String,
    records: Vec<StepRecord>,
    failure: Option<(Step, Error)>,
    cancelled_at: Option<Step>,
    session: Option<Session>,
}

impl<'a> Run<'a> {
    fn new(kind: PipelineKind, progress: &'a dyn ProgressSink, cancel: &'a CancellationToken) -> Self {
        Self {
            kind,
            progress,
            cancel,
            started_at: chrono::Utc::now().to_rfc3339(),
            records: Vec::new(),
            failure: None,
            cancelled_at: None,
            session: None,
        }
    }

    fn session(&mut self) -> Result<&mut Session> {
        self.session
            .as_mut()
            .ok_or_else(|| Error::internal_unexpected("No open SSH session"))
    }

    fn record(&mut self, record: StepRecord) {
        self.progress.report_step(&record);
        self.records.push(record);
    }

    /// Run one step. `None` means the pipeline must stop here.
    fn step<T>(
        &mut self,
        step: Step,
        body: impl FnOnce(&mut Self) -> Result<StepResult<T>>,
    ) -> Option<T> {
        if self.cancel.is_cancelled() {
            self.cancelled_at = Some(step);
            self.progress.write_line("Cancelled");
            return None;
        }

        match body(self) {
            Ok(StepResult::Done {
                value,
                outcome,
                diagnostic,
            }) => {
                if let Some(note) = &diagnostic {
                    self.progress.write_line(note);
                }
                self.record(StepRecord::new(step, outcome, diagnostic));
                Some(value)
            }
            Ok(StepResult::Cancelled) => {
                self.cancelled_at = Some(step);
                self.progress.write_line("Cancelled");
                self.record(StepRecord::new(step, StepOutcome::Cancelled, None));
                None
            }
            Err(err) => {
                self.progress.write_line(&err.message);
                for hint in &err.hints {
                    self.progress.write_line(&format!("Hint: {}", hint.message));
                }
                self.record(StepRecord::new(
                    step,
                    StepOutcome::Failed,
                    Some(err.message.clone()),
                ));
                self.failure = Some((step, err));
                None
            }
        }
    }

    fn finish(mut self) -> PipelineReport {
        let cleanup_warning = match self.session.take() {
            Some(mut session) => match session.close() {
                Ok(()) => None,
                Err(err) => {
                    self.progress
                        .write_line(&format!("Disconnect failed: {}", err.message));
                    Some(err.message)
                }
            },
            None => None,
        };

        let (status, failed_step, error, cause) = match self.failure.take() {
            Some((step, err)) => (
                RunStatus::Failed,
                Some(step),
                Some(ReportError::from(&err)),
                Some(err),
            ),
            None if self.cancelled_at.is_some() => (RunStatus::Cancelled, None, None, None),
            None => (RunStatus::Succeeded, None, None, None),
        };

        let count = |outcome: StepOutcome| self.records.iter().filter(|r| r.outcome == outcome).count();
        let summary = RunSummary {
            total_steps: self.records.len(),
            succeeded: count(StepOutcome::Succeeded),
            skipped: count(StepOutcome::Skipped),
            failed: count(StepOutcome::Failed),
            next_actions: match status {
                RunStatus::Failed => vec![
                    "Fix the issue and re-run (installers are idempotent, completed steps will be skipped)"
                        .to_string(),
                ],
                _ => Vec::new(),
            },
        };

        PipelineReport {
            pipeline: self.kind,
            status,
            steps: self.records,
            failed_step,
            cancelled_at: self.cancelled_at,
            error,
            cleanup_warning,
            started_at: self.started_at,
            finished_at: chrono::Utc::now().to_rfc3339(),
            summary,
            cause,
        }
    }
}

/// The external collaborators a run talks to.
pub struct Collaborators<'a> {
    pub transport: &'a dyn Transport,
    pub build: &'a dyn BuildCollaborator,
    pub publish: &'a dyn PublishCollaborator,
    pub launcher: &'a dyn DebugLauncher,
    pub progress: &'a dyn ProgressSink,
}

pub struct Orchestrator<'a> {
    config: &'a SshdbgConfig,
    target: &'a RemoteTarget,
    project: &'a ProjectInfo,
    deps: Collaborators<'a>,
    cancel: CancellationToken,
}

impl<'a> Orchestrator<'a> {
    pub fn new(
        config: &'a SshdbgConfig,
        target: &'a RemoteTarget,
        project: &'a ProjectInfo,
        deps: Collaborators<'a>,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            config,
            target,
            project,
            deps,
            cancel,
        }
    }

    /// Build, publish, provision, deploy and launch.
    pub fn run_deploy(&self) -> PipelineReport {
        let mut run = Run::new(PipelineKind::Deploy, self.deps.progress, &self.cancel);
        let _ = self.deploy_steps(&mut run);
        run.finish()
    }

    /// Attach to what is already deployed. The project must be up to date.
    pub fn run_debug(&self) -> PipelineReport {
        let mut run = Run::new(PipelineKind::Debug, self.deps.progress, &self.cancel);
        let _ = self.debug_steps(&mut run);
        run.finish()
    }

    fn deploy_steps(&self, run: &mut Run<'_>) -> Option<()> {
        run.step(Step::Build, |_| self.build())?;
        let publish_dir = run.step(Step::Publish, |_| self.publish())?;
        run.step(Step::Connect, |run| self.connect(run))?;

        let provisioner = Provisioner::new(
            &self.config.runtime,
            &self.config.debugger,
            &self.config.markers,
            self.deps.progress,
        );
        let kind = RuntimeKind::for_project(self.project.is_web);
        run.step(Step::ProvisionRuntime, |run| {
            Ok(provisioned(provisioner.ensure_runtime(run.session()?, kind)?, ".NET"))
        })?;
        run.step(Step::ProvisionDebugAgent, |run| {
            Ok(provisioned(provisioner.ensure_debugger(run.session()?)?, "VSDBG"))
        })?;

        let deploy_dir = self.config.remote_paths().deployment_dir(&self.project.name);
        run.step(Step::ManageTargetDir, |run| {
            sync::prepare_target_dir(run.session()?, &deploy_dir)?;
            Ok(completed((), format!("Prepared {}", deploy_dir)))
        })?;
        run.step(Step::Upload, |run| {
            let remote = sync::upload(run.session()?, &publish_dir, &deploy_dir)?;
            Ok(completed((), format!("Uploaded {} to {}", publish_dir.display(), remote)))
        })?;

        self.configure_and_launch(run)
    }

    fn debug_steps(&self, run: &mut Run<'_>) -> Option<()> {
        run.step(Step::Build, |_| {
            if self.deps.build.is_up_to_date(self.project)? {
                Ok(skipped((), format!("Project, {}, is up to date", self.project.name)))
            } else {
                Err(Error::project_not_built(&self.project.name))
            }
        })?;
        run.step(Step::Connect, |run| self.connect(run))?;
        self.configure_and_launch(run)
    }

    fn configure_and_launch(&self, run: &mut Run<'_>) -> Option<()> {
        let file = run.step(Step::EmitConfig, |_| {
            let spec = launch::build_launch_spec(self.config, self.target, self.project);
            let file = LaunchFile::write(&spec)?;
            let note = format!("Wrote {}", file.path().display());
            Ok(completed(file, note))
        })?;
        // Dropping the file unlaunched (cancellation) deletes it too.
        run.step(Step::Launch, |_| {
            file.launch_with(self.deps.launcher)?;
            Ok(completed((), "Debugger launched"))
        })
    }

    fn build(&self) -> Result<StepResult<()>> {
        if self.deps.build.is_up_to_date(self.project)? {
            return Ok(skipped(
                (),
                format!("Project, {}, is up to date, skipping build", self.project.name),
            ));
        }

        match self.deps.build.build(self.project, &self.cancel, self.deps.progress)? {
            BuildOutcome::Built => Ok(completed((), format!("Built {}", self.project.name))),
            BuildOutcome::Cancelled => Ok(StepResult::Cancelled),
        }
    }

    fn publish(&self) -> Result<StepResult<PathBuf>> {
        match self.deps.publish.publish(self.project, &self.cancel, self.deps.progress)? {
            PublishOutcome::Published(dir) => {
                let note = format!("Published to {}", dir.display());
                Ok(completed(dir, note))
            }
            PublishOutcome::Cancelled => Ok(StepResult::Cancelled),
        }
    }

    /// Key check first: a bad key must fail before any network I/O.
    fn connect(&self, run: &mut Run<'_>) -> Result<StepResult<()>> {
        self.deps.transport.validate_key(self.target)?;
        run.session = Some(self.deps.transport.open(self.target)?);
        run.session()?.probe()?;
        Ok(completed(
            (),
            format!("Connected to {}:{}", self.target.destination(), self.target.port),
        ))
    }
}
