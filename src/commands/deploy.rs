use std::path::PathBuf;

use clap::Args;

use porter::version::BumpPolicy;
use porter::{DeployOptions, DeployReport, Pipeline};

use super::{parse_build_args, CmdResult, DefaultServices, GlobalArgs, RenderArgs, Workspace};

#[derive(Args)]
pub struct DeployArgs {
    /// Application config file (relative to the config directory)
    pub config_file: String,

    /// Applications: `all`, `app`, `app1:app2` or `app[c1,c2]`
    pub applications: String,

    /// Target environment (defaults to PORTER_ENV, then default_environment)
    #[arg(short, long)]
    pub env: Option<String>,

    /// Branch to check out and build
    #[arg(short, long, default_value = porter::pipeline::DEFAULT_BRANCH)]
    pub branch: String,

    /// Working directory for checkouts (a temporary one is used otherwise)
    #[arg(short, long)]
    pub directory: Option<PathBuf>,

    /// Bump the major version
    #[arg(short = 'M', long)]
    pub major: bool,

    /// Bump the patch version
    #[arg(short, long)]
    pub patch: bool,

    /// Use the existing checkout in --directory
    #[arg(long)]
    pub skip_gitpull: bool,

    /// Reuse the image already deployed in the environment
    #[arg(long)]
    pub skip_build: bool,

    /// Render and validate only
    #[arg(long)]
    pub skip_push: bool,

    /// Docker build arg (repeatable); overrides the config's build-args
    #[arg(long = "build-arg", value_name = "KEY=VALUE")]
    pub build_args: Vec<String>,

    #[command(flatten)]
    pub render: RenderArgs,
}

pub fn run(args: DeployArgs, global: &GlobalArgs) -> CmdResult<DeployReport> {
    let workspace = Workspace::load(global, &args.config_file)?;
    let environment = workspace.tool.resolve_environment(args.env.as_deref())?;
    let defaults = DefaultServices::new(&workspace.tool)?;
    let pipeline = Pipeline::new(
        &workspace.settings,
        &workspace.tool,
        &workspace.config,
        defaults.services(),
    );

    let options = DeployOptions {
        branch: args.branch,
        work_dir: args.directory,
        bump: BumpPolicy::from_flags(args.major, args.patch),
        skip_gitpull: args.skip_gitpull,
        skip_build: args.skip_build,
        skip_push: args.skip_push,
        force_push: args.render.force_push,
        secrets_file: args.render.secrets_file.clone(),
        overrides: args.render.overrides()?,
        validation: args.render.validation(),
        build_args: parse_build_args(&args.build_args)?,
        ..DeployOptions::new(environment)
    };

    let report = pipeline.deploy(&args.applications, &options)?;
    let exit_code = if report.is_success() { 0 } else { 1 };
    Ok((report, exit_code))
}
