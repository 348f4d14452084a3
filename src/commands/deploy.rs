use clap::Args;

use sshdbg::launch;
use sshdbg::pipeline::{Collaborators, Orchestrator};
use sshdbg::project::{DotnetBuild, DotnetPublish};
use sshdbg::ssh::OpenSshTransport;

use super::{report_result, CmdResult, GlobalArgs, ProjectArgs, RunContext, RunOutput};

#[derive(Args)]
pub struct DeployArgs {
    #[command(flatten)]
    pub project: ProjectArgs,

    /// dotnet executable used for build and publish
    #[arg(long, default_value = "dotnet")]
    pub dotnet: String,
}

/// Build, publish, provision the target, upload and launch the debugger.
pub fn run(args: DeployArgs, global: &GlobalArgs) -> CmdResult<RunOutput> {
    let ctx = RunContext::prepare(&args.project, global)?;

    let transport = OpenSshTransport::new(ctx.config.transport.clone());
    let build = DotnetBuild::with_program(&args.dotnet);
    let publish = DotnetPublish::with_program(&args.dotnet);
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

    let report = orchestrator.run_deploy();
    report_result("deploy", ctx.project.clone(), report)
}
