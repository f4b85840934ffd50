use clap::Args;
use serde::Serialize;

use porter::source::{DockerCliRegistry, Registry};
use porter::version::{self, BumpPolicy};

use super::{CmdResult, GlobalArgs, Workspace};

#[derive(Args)]
pub struct VersionArgs {
    /// Application config file (relative to the config directory)
    pub config_file: String,

    /// Application name
    pub application: String,

    /// Revision id the next image is built from
    #[arg(short, long)]
    pub revision: String,

    /// Bump the major version
    #[arg(short = 'M', long)]
    pub major: bool,

    /// Bump the patch version
    #[arg(short, long)]
    pub patch: bool,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VersionOutput {
    pub command: &'static str,
    pub application: String,
    pub bump: BumpPolicy,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub latest: Option<String>,
    pub next: String,
    pub image: String,
}

pub fn run(args: VersionArgs, global: &GlobalArgs) -> CmdResult<VersionOutput> {
    let workspace = Workspace::load(global, &args.config_file)?;
    workspace.config.app(&args.application)?;
    let registry = workspace.tool.registry()?;
    let config_name = &workspace.config.name;
    let environments = workspace.tool.environment_names();

    let tags = DockerCliRegistry.search(registry, config_name, &args.application)?;
    let found = version::candidates(&tags, config_name, &args.application, &environments)?;
    let bump = BumpPolicy::from_flags(args.major, args.patch);
    let next = version::next_version(
        &tags,
        config_name,
        &args.application,
        &environments,
        &args.revision,
        bump,
    )?;

    Ok((
        VersionOutput {
            command: "version.next",
            application: args.application.clone(),
            bump,
            latest: version::latest(&found).map(ToString::to_string),
            image: version::image_name(config_name, &args.application, &next),
            next: next.to_string(),
        },
        0,
    ))
}
