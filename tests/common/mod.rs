#![allow(dead_code)]

use std::cell::RefCell;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use sshdbg::cancel::CancellationToken;
use sshdbg::config::SshdbgConfig;
use sshdbg::launch::DebugLauncher;
use sshdbg::pipeline::{Collaborators, Orchestrator, PipelineReport, Step, StepRecord};
use sshdbg::progress::ProgressSink;
use sshdbg::project::{
    BuildCollaborator, BuildOutcome, ProjectInfo, PublishCollaborator, PublishOutcome,
};
use sshdbg::ssh::{CommandChannel, CommandOutput, RemoteTarget, Session, TransferChannel, Transport};
use sshdbg::{Error, Result};

pub const RUNTIME_ALREADY: &str =
    "dotnet-install: .NET Core Runtime with version '8.0.1' is already installed.";
pub const RUNTIME_INSTALLED: &str =
    "dotnet-install: Adding to current process PATH\ndotnet-install: Installation finished successfully.";
pub const DEBUGGER_SKIPPED: &str =
    "Info: Previous installation at '/home/pi/.vsdbg' found\nInfo: Skipping downloads";
pub const DEBUGGER_INSTALLED: &str = "Info: Successfully installed vsdbg at '/home/pi/.vsdbg'";

/// Everything the fakes observed, in order.
#[derive(Debug, Default)]
pub struct Remote {
    pub events: Vec<String>,
    pub commands: Vec<String>,
    pub uploads: Vec<(PathBuf, String)>,
    pub connected: bool,
}

/// Scripted remote host behaviour.
#[derive(Debug, Clone)]
pub struct Script {
    pub key_error: Option<String>,
    pub open_error: Option<String>,
    pub probe_reply: String,
    pub runtime_reply: String,
    pub debugger_reply: String,
    pub manage_reply: String,
    pub upload_error: Option<String>,
    pub disconnect_error: Option<String>,
}

impl Default for Script {
    fn default() -> Self {
        Self {
            key_error: None,
            open_error: None,
            probe_reply: "ping\n".to_string(),
            runtime_reply: RUNTIME_ALREADY.to_string(),
            debugger_reply: DEBUGGER_SKIPPED.to_string(),
            manage_reply: String::new(),
            upload_error: None,
            disconnect_error: None,
        }
    }
}

impl Script {
    fn reply_for(&self, command: &str) -> String {
        if command == "echo ping" {
            self.probe_reply.clone()
        } else if command.contains("--info") {
            "Host:\n  Version: 8.0.1".to_string()
        } else if command.contains("dotnet-install.sh") {
            self.runtime_reply.clone()
        } else if command.contains("getvsdbgsh") {
            self.debugger_reply.clone()
        } else if command.contains("mkdir -p") {
            self.manage_reply.clone()
        } else {
            String::new()
        }
    }
}

pub struct FakeTransport {
    pub script: Script,
    pub remote: Arc<Mutex<Remote>>,
}

impl FakeTransport {
    pub fn new(script: Script) -> Self {
        Self {
            script,
            remote: Arc::new(Mutex::new(Remote::default())),
        }
    }

    pub fn events(&self) -> Vec<String> {
        self.remote.lock().unwrap().events.clone()
    }

    pub fn commands(&self) -> Vec<String> {
        self.remote.lock().unwrap().commands.clone()
    }

    pub fn uploads(&self) -> Vec<(PathBuf, String)> {
        self.remote.lock().unwrap().uploads.clone()
    }

    pub fn saw(&self, event: &str) -> bool {
        self.events().iter().any(|e| e == event)
    }

    pub fn is_connected(&self) -> bool {
        self.remote.lock().unwrap().connected
    }
}

struct FakeCommand {
    script: Script,
    remote: Arc<Mutex<Remote>>,
}

impl CommandChannel for FakeCommand {
    fn run(&mut self, command: &str) -> Result<CommandOutput> {
        let mut remote = self.remote.lock().unwrap();
        remote.events.push("run".to_string());
        remote.commands.push(command.to_string());
        Ok(CommandOutput {
            stdout: self.script.reply_for(command),
            stderr: String::new(),
            exit_code: Some(0),
        })
    }

    fn is_connected(&self) -> bool {
        self.remote.lock().unwrap().connected
    }

    fn disconnect(&mut self) -> Result<()> {
        let mut remote = self.remote.lock().unwrap();
        remote.connected = false;
        remote.events.push("disconnect".to_string());
        match &self.script.disconnect_error {
            Some(msg) => Err(Error::internal_unexpected(msg.clone())),
            None => Ok(()),
        }
    }
}

struct FakeTransfer {
    script: Script,
    remote: Arc<Mutex<Remote>>,
}

impl TransferChannel for FakeTransfer {
    fn upload_tree(&self, local_dir: &Path, remote_dir: &str) -> Result<()> {
        let mut remote = self.remote.lock().unwrap();
        remote.events.push("upload".to_string());
        if let Some(msg) = &self.script.upload_error {
            return Err(Error::transfer_upload_failed(
                local_dir.display().to_string(),
                remote_dir,
                msg.clone(),
            ));
        }
        remote
            .uploads
            .push((local_dir.to_path_buf(), remote_dir.to_string()));
        Ok(())
    }
}

impl Transport for FakeTransport {
    fn validate_key(&self, target: &RemoteTarget) -> Result<()> {
        self.remote.lock().unwrap().events.push("validate_key".to_string());
        match &self.script.key_error {
            Some(reason) => Err(Error::ssh_key_invalid(
                target.private_key.display().to_string(),
                reason.clone(),
            )),
            None => Ok(()),
        }
    }

    fn open(&self, target: &RemoteTarget) -> Result<Session> {
        let mut remote = self.remote.lock().unwrap();
        remote.events.push("open".to_string());
        if let Some(msg) = &self.script.open_error {
            return Err(Error::ssh_connect_failed(target.details(), msg.clone()));
        }
        remote.connected = true;
        drop(remote);

        Ok(Session::new(
            target.clone(),
            Box::new(FakeCommand {
                script: self.script.clone(),
                remote: self.remote.clone(),
            }),
            Box::new(FakeTransfer {
                script: self.script.clone(),
                remote: self.remote.clone(),
            }),
        ))
    }
}

pub struct FakeBuild {
    pub up_to_date: bool,
    pub fail: bool,
    pub builds: RefCell<usize>,
}

impl FakeBuild {
    pub fn up_to_date() -> Self {
        Self {
            up_to_date: true,
            fail: false,
            builds: RefCell::new(0),
        }
    }

    pub fn stale() -> Self {
        Self {
            up_to_date: false,
            ..Self::up_to_date()
        }
    }
}

impl BuildCollaborator for FakeBuild {
    fn is_up_to_date(&self, _project: &ProjectInfo) -> Result<bool> {
        Ok(self.up_to_date)
    }

    fn build(
        &self,
        _project: &ProjectInfo,
        _cancel: &CancellationToken,
        _progress: &dyn ProgressSink,
    ) -> Result<BuildOutcome> {
        *self.builds.borrow_mut() += 1;
        if self.fail {
            return Err(Error::local_build_failed("dotnet build Blinky.csproj", Some(1)));
        }
        Ok(BuildOutcome::Built)
    }
}

pub enum PublishBehaviour {
    Succeed,
    Exit(i32),
    Cancel,
}

pub struct FakePublish {
    pub behaviour: PublishBehaviour,
    pub dir: PathBuf,
    pub calls: RefCell<usize>,
}

impl FakePublish {
    pub fn new(behaviour: PublishBehaviour, dir: &Path) -> Self {
        Self {
            behaviour,
            dir: dir.to_path_buf(),
            calls: RefCell::new(0),
        }
    }
}

impl PublishCollaborator for FakePublish {
    fn publish(
        &self,
        _project: &ProjectInfo,
        _cancel: &CancellationToken,
        _progress: &dyn ProgressSink,
    ) -> Result<PublishOutcome> {
        *self.calls.borrow_mut() += 1;
        match self.behaviour {
            PublishBehaviour::Succeed => Ok(PublishOutcome::Published(self.dir.clone())),
            PublishBehaviour::Exit(code) => Err(Error::local_publish_failed(
                "dotnet publish Blinky.csproj -c Debug",
                Some(code),
            )),
            PublishBehaviour::Cancel => Ok(PublishOutcome::Cancelled),
        }
    }
}

pub enum LaunchBehaviour {
    Accept,
    Decline,
    Fail,
}

pub struct FakeLauncher {
    pub behaviour: LaunchBehaviour,
    pub seen: RefCell<Vec<(PathBuf, String)>>,
}

impl FakeLauncher {
    pub fn new(behaviour: LaunchBehaviour) -> Self {
        Self {
            behaviour,
            seen: RefCell::new(Vec::new()),
        }
    }

    pub fn launched_path(&self) -> Option<PathBuf> {
        self.seen.borrow().first().map(|(p, _)| p.clone())
    }

    pub fn launched_document(&self) -> Option<serde_json::Value> {
        self.seen
            .borrow()
            .first()
            .map(|(_, content)| serde_json::from_str(content).unwrap())
    }
}

impl DebugLauncher for FakeLauncher {
    fn launch(&self, launch_json: &Path) -> Result<bool> {
        let content = std::fs::read_to_string(launch_json).unwrap();
        self.seen
            .borrow_mut()
            .push((launch_json.to_path_buf(), content));
        match self.behaviour {
            LaunchBehaviour::Accept => Ok(true),
            LaunchBehaviour::Decline => Ok(false),
            LaunchBehaviour::Fail => Err(Error::launcher_failed("adapter host exited")),
        }
    }
}

/// Records the run log and step reports; can cancel once a given step is reported.
#[derive(Default)]
pub struct RecordingProgress {
    pub lines: RefCell<Vec<String>>,
    pub reports: RefCell<Vec<String>>,
    pub records: RefCell<Vec<StepRecord>>,
    pub cancel_after: Option<(Step, CancellationToken)>,
}

impl RecordingProgress {
    pub fn cancelling_after(step: Step, token: CancellationToken) -> Self {
        Self {
            cancel_after: Some((step, token)),
            ..Self::default()
        }
    }

    pub fn logged(&self, needle: &str) -> bool {
        self.lines.borrow().iter().any(|l| l.contains(needle))
    }
}

impl ProgressSink for RecordingProgress {
    fn write_line(&self, line: &str) {
        self.lines.borrow_mut().push(line.to_string());
    }

    fn report_step(&self, record: &StepRecord) {
        self.reports.borrow_mut().push(record.status_text());
        self.records.borrow_mut().push(record.clone());
        if let Some((step, token)) = &self.cancel_after {
            if *step == record.step {
                token.cancel();
            }
        }
    }
}

pub fn target() -> RemoteTarget {
    RemoteTarget {
        host: "raspberrypi.local".to_string(),
        port: 22,
        user: "pi".to_string(),
        private_key: PathBuf::from("/home/dev/.ssh/id_ecdsa"),
        passphrase: None,
    }
}

pub fn project(is_web: bool) -> ProjectInfo {
    ProjectInfo {
        name: "Blinky".to_string(),
        full_path: PathBuf::from("/src/Blinky/Blinky.csproj"),
        configuration: "Debug".to_string(),
        target_framework: "net8.0".to_string(),
        assembly_name: "Blinky".to_string(),
        is_web,
    }
}

/// Collaborators for one run, with knobs for each scenario.
pub struct Harness {
    pub config: SshdbgConfig,
    pub target: RemoteTarget,
    pub project: ProjectInfo,
    pub transport: FakeTransport,
    pub build: FakeBuild,
    pub publish: FakePublish,
    pub launcher: FakeLauncher,
    pub progress: RecordingProgress,
    pub cancel: CancellationToken,
    pub publish_dir: tempfile::TempDir,
}

impl Harness {
    pub fn new(script: Script) -> Self {
        let publish_dir = tempfile::TempDir::new().unwrap();
        std::fs::write(publish_dir.path().join("Blinky.dll"), "MZ").unwrap();

        Self {
            config: SshdbgConfig::default(),
            target: target(),
            project: project(false),
            transport: FakeTransport::new(script),
            build: FakeBuild::up_to_date(),
            publish: FakePublish::new(PublishBehaviour::Succeed, publish_dir.path()),
            launcher: FakeLauncher::new(LaunchBehaviour::Accept),
            progress: RecordingProgress::default(),
            cancel: CancellationToken::new(),
            publish_dir,
        }
    }

    pub fn cancel_after(mut self, step: Step) -> Self {
        self.progress = RecordingProgress::cancelling_after(step, self.cancel.clone());
        self
    }

    fn orchestrator(&self) -> Orchestrator<'_> {
        Orchestrator::new(
            &self.config,
            &self.target,
            &self.project,
            Collaborators {
                transport: &self.transport,
                build: &self.build,
                publish: &self.publish,
                launcher: &self.launcher,
                progress: &self.progress,
            },
            self.cancel.clone(),
        )
    }

    pub fn deploy(&self) -> PipelineReport {
        self.orchestrator().run_deploy()
    }

    pub fn debug(&self) -> PipelineReport {
        self.orchestrator().run_debug()
    }
}
