use clap::Args;

use porter::selector;
use porter::{Pipeline, PromoteOptions, PromoteReport};

use super::{CmdResult, DefaultServices, GlobalArgs, RenderArgs, Workspace};

#[derive(Args)]
pub struct PromoteArgs {
    /// Environment the images currently run in
    pub from_env: String,

    /// Environment to promote to
    pub to_env: String,

    /// Application config file (relative to the config directory)
    pub config_file: String,

    /// Application, optionally with containers: `app` or `app:c1,c2`
    pub application: String,

    /// Branch holding the templates
    #[arg(short, long, default_value = porter::pipeline::DEFAULT_BRANCH)]
    pub branch: String,

    #[command(flatten)]
    pub render: RenderArgs,
}

pub fn run(args: PromoteArgs, global: &GlobalArgs) -> CmdResult<PromoteReport> {
    let selection = selector::parse_push(&args.application)?;
    let workspace = Workspace::load(global, &args.config_file)?;
    let defaults = DefaultServices::new(&workspace.tool)?;
    let pipeline = Pipeline::new(
        &workspace.settings,
        &workspace.tool,
        &workspace.config,
        defaults.services(),
    );

    let options = PromoteOptions {
        branch: args.branch,
        containers: selection.containers,
        secrets_file: args.render.secrets_file.clone(),
        overrides: args.render.overrides()?,
        validation: args.render.validation(),
        force_push: args.render.force_push,
        ..PromoteOptions::new(args.from_env, args.to_env)
    };

    let report = pipeline.promote(&selection.application, &options)?;
    Ok((report, 0))
}
