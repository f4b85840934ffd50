use clap::{Parser, Subcommand};

mod commands;
mod output;
mod tty;

use commands::{deploy, promote, push, version, GlobalArgs};

const VERSION: &str = env!("CARGO_PKG_VERSION");

#[derive(Parser)]
#[command(name = "porter")]
#[command(version = VERSION)]
#[command(about = "Build, render and push containerized applications to a cluster scheduler")]
struct Cli {
    #[command(flatten)]
    global: GlobalArgs,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Pull, build and push applications to an environment
    Deploy(deploy::DeployArgs),
    /// Render descriptors for an image and push them to an environment
    Push(push::PushArgs),
    /// Push the images running in one environment to another
    Promote(promote::PromoteArgs),
    /// Show the next image version for an application
    Version(version::VersionArgs),
}

fn main() -> std::process::ExitCode {
    let cli = Cli::parse();

    let (json_result, exit_code) = commands::run_json(cli.command, &cli.global);
    if let Err(err) = output::print_json_result(json_result) {
        eprintln!("{}", err.message);
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
