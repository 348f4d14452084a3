use clap::Args;

use sshdbg::launch;
use sshdbg::pipeline::{Collaborators, Orchestrator};
use sshdbg::project::{DotnetBuild, DotnetPublish};
use sshdbg::ssh::OpenSshTransport;

use super::{report_result, CmdResult, GlobalArgs, ProjectArgs, RunContext, RunOutput};

#[derive(Args)]
pub struct DebugArgs {
    #[command(flatten)]
    pub project: ProjectArgs,
}

/// Attach to the last deployment: connect, write launch.json, launch.
pub fn run(args: DebugArgs, global: &GlobalArgs) -> CmdResult<RunOutput> {
    let ctx = RunContext::prepare(&args.project, global)?;

    let transport = OpenSshTransport::new(ctx.config.transport.clone());
    let build = DotnetBuild::default();
    // Never invoked by the debug-only run.
    let publish = DotnetPublish::default();
    let launcher = launch::launcher_for(&ctx.config.launcher, &ctx.progress);

    let orchestrator = Orchestrator::new(
        &ctx.config,
        &ctx.target,
        &ctx.project,
        Collaborators {
            transport: &transport,
            build: &build,
            publish: &publish,
            launcher: launcher.as_ref(),
            progress: &ctx.progress,
        },
        ctx.cancel.clone(),
    );

    let report = orchestrator.run_debug();
    report_result("debug", ctx.project.clone(), report)
}
