use clap::{Parser, Subcommand};

use commands::GlobalArgs;

mod commands;
mod output;
mod tty;

use commands::{config, debug, deploy, key};

const VERSION: &str = env!("CARGO_PKG_VERSION");

#[derive(Parser)]
#[command(name = "sshdbg")]
#[command(version = VERSION)]
#[command(about = "Deploy .NET apps to a Linux host over SSH and launch a remote debugger")]
struct Cli {
    /// Suppress the run log on stderr
    #[arg(long, short = 'q', global = true)]
    quiet: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Build, publish, provision the host, upload and launch the debugger
    Deploy(deploy::DeployArgs),
    /// Launch the debugger against the last deployment
    Debug(debug::DebugArgs),
    /// Manage sshdbg.json
    Config(config::ConfigArgs),
    /// Manage the SSH private key passphrase
    Key(key::KeyArgs),
}

fn main() -> std::process::ExitCode {
    let cli = Cli::parse();
    let global = GlobalArgs { quiet: cli.quiet };

    if matches!(cli.command, Commands::Deploy(_) | Commands::Debug(_)) && !global.quiet {
        tty::status("sshdbg is working...");
    }

    let (json_result, exit_code) = commands::run_json(cli.command, &global);
    if let Err(err) = output::print_json_result(json_result) {
        eprintln!("{}", err);
        return std::process::ExitCode::from(1);
    }

    std::process::ExitCode::from(exit_code_to_u8(exit_code))
}

fn exit_code_to_u8(code: i32) -> u8 {
    if code <= 0 {
        0
    } else if code >= 255 {
        255
    } else {
        code as u8
    }
}
