use std::path::PathBuf;

use clap::Args;

use porter::selector;
use porter::{Pipeline, PushOptions, PushReport};

use super::{CmdResult, DefaultServices, GlobalArgs, RenderArgs, Workspace};

#[derive(Args)]
pub struct PushArgs {
    /// Application config file (relative to the config directory)
    pub config_file: String,

    /// Application, optionally with containers: `app` or `app:c1,c2`
    pub application: String,

    /// Image name, with or without the registry prefix
    pub image: String,

    /// Target environment (defaults to PORTER_ENV, then default_environment)
    #[arg(short, long)]
    pub env: Option<String>,

    /// Directory holding the repository checkout
    #[arg(short, long)]
    pub directory: Option<PathBuf>,

    /// Render and validate only
    #[arg(long)]
    pub skip_push: bool,

    #[command(flatten)]
    pub render: RenderArgs,
}

pub fn run(args: PushArgs, global: &GlobalArgs) -> CmdResult<PushReport> {
    let selection = selector::parse_push(&args.application)?;
    let workspace = Workspace::load(global, &args.config_file)?;
    let environment = workspace.tool.resolve_environment(args.env.as_deref())?;
    let defaults = DefaultServices::new(&workspace.tool)?;
    let pipeline = Pipeline::new(
        &workspace.settings,
        &workspace.tool,
        &workspace.config,
        defaults.services(),
    );

    let options = PushOptions {
        work_dir: args.directory,
        secrets_file: args.render.secrets_file.clone(),
        overrides: args.render.overrides()?,
        validation: args.render.validation(),
        force_push: args.render.force_push,
        skip_push: args.skip_push,
        ..PushOptions::new(environment, args.image)
    };

    let report = pipeline.push(&selection, &options)?;
    Ok((report, 0))
}
