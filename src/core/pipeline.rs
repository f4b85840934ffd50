//! Release operations: push, deploy and promote.
//!
//! A `Pipeline` borrows the loaded configuration and one implementation of
//! each collaborator. Every operation runs sequentially: applications in
//! request order, containers in declaration order.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::Utc;
use serde_json::{Map, Value};
use tempfile::TempDir;

use crate::config::{AppConfig, AppsConfig, Container, EnvironmentConfig, Settings, ToolEnv};
use crate::context::{Release, ReleaseContext};
use crate::document;
use crate::error::{Error, PipelineLocation, Result};
use crate::hooks::{HookRunner, Phase, Stage};
use crate::notify::{Action, NotificationDispatcher, Notifier, Outcome};
use crate::output::{AppDeployment, BulkSummary, DeployReport, ItemOutcome, PromoteReport, PromotedContainer, PushReport};
use crate::push::{self, PushExecutor};
use crate::retry::RetryPolicy;
use crate::scheduler::Scheduler;
use crate::secrets::SecretVault;
use crate::selector::{self, AppSelection};
use crate::source::{self, BuildRequest, ImageBuilder, Registry, SourceControl};
use crate::template::{write_descriptor, RenderJob, TemplateRenderer};
use crate::validator::{gate, DeploymentValidator, RoutingSource, ValidationPolicy};
use crate::variables::{self, VariableSources};
use crate::version::{self, BumpPolicy};

pub const DEFAULT_BRANCH: &str = "master";

/// External systems the pipeline talks to.
#[derive(Clone, Copy)]
pub struct Services<'a> {
    pub registry: &'a dyn Registry,
    pub source: &'a dyn SourceControl,
    pub builder: &'a dyn ImageBuilder,
    pub scheduler: &'a dyn Scheduler,
    pub routing: &'a dyn RoutingSource,
    pub notifier: Option<&'a dyn Notifier>,
}

#[derive(Debug, Clone)]
pub struct PushOptions {
    pub environment: String,
    /// Image name, with or without the registry prefix.
    pub image: String,
    /// Directory holding the repository checkout. Required when the
    /// application sets `template_path` or `extra_variables_path`.
    pub work_dir: Option<PathBuf>,
    pub secrets_file: Option<String>,
    pub overrides: Map<String, Value>,
    pub validation: ValidationPolicy,
    pub force_push: bool,
    pub skip_push: bool,
}

impl PushOptions {
    pub fn new(environment: impl Into<String>, image: impl Into<String>) -> Self {
        Self {
            environment: environment.into(),
            image: image.into(),
            work_dir: None,
            secrets_file: None,
            overrides: Map::new(),
            validation: ValidationPolicy::default(),
            force_push: false,
            skip_push: false,
        }
    }
}

#[derive(Debug, Clone)]
pub struct DeployOptions {
    pub environment: String,
    pub branch: String,
    /// Working directory for checkouts; a temporary one is used when absent.
    pub work_dir: Option<PathBuf>,
    pub bump: BumpPolicy,
    pub skip_gitpull: bool,
    pub skip_build: bool,
    pub skip_push: bool,
    pub force_push: bool,
    pub secrets_file: Option<String>,
    pub overrides: Map<String, Value>,
    pub validation: ValidationPolicy,
    /// `--build-arg` values; these win over the config's `build-args`.
    pub build_args: BTreeMap<String, String>,
}

impl DeployOptions {
    pub fn new(environment: impl Into<String>) -> Self {
        Self {
            environment: environment.into(),
            branch: DEFAULT_BRANCH.to_string(),
            work_dir: None,
            bump: BumpPolicy::default(),
            skip_gitpull: false,
            skip_build: false,
            skip_push: false,
            force_push: false,
            secrets_file: None,
            overrides: Map::new(),
            validation: ValidationPolicy::default(),
            build_args: BTreeMap::new(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct PromoteOptions {
    pub from: String,
    pub to: String,
    pub branch: String,
    /// Empty means every configured container.
    pub containers: Vec<String>,
    pub secrets_file: Option<String>,
    pub overrides: Map<String, Value>,
    pub validation: ValidationPolicy,
    pub force_push: bool,
    pub retry: RetryPolicy,
}

impl PromoteOptions {
    pub fn new(from: impl Into<String>, to: impl Into<String>) -> Self {
        Self {
            from: from.into(),
            to: to.into(),
            branch: DEFAULT_BRANCH.to_string(),
            containers: Vec::new(),
            secrets_file: None,
            overrides: Map::new(),
            validation: ValidationPolicy::default(),
            force_push: false,
            retry: RetryPolicy::promotion(),
        }
    }
}

/// Prefix `image` with the registry unless it already names it.
pub fn image_path(registry: &str, image: &str) -> String {
    if image.contains(registry) {
        image.to_string()
    } else {
        format!("{}/{}", registry, image)
    }
}

/// Inverse of [`image_path`].
pub fn strip_registry(registry: &str, image: &str) -> String {
    image
        .strip_prefix(registry)
        .map(|rest| rest.trim_start_matches('/'))
        .unwrap_or(image)
        .to_string()
}

fn location(phase: &str, application: &str, environment: &str) -> PipelineLocation {
    PipelineLocation {
        phase: Some(phase.to_string()),
        application: Some(application.to_string()),
        container: None,
        environment: Some(environment.to_string()),
    }
}

pub struct Pipeline<'a> {
    settings: &'a Settings,
    tool: &'a ToolEnv,
    config: &'a AppsConfig,
    services: Services<'a>,
}

impl<'a> Pipeline<'a> {
    pub fn new(settings: &'a Settings, tool: &'a ToolEnv, config: &'a AppsConfig, services: Services<'a>) -> Self {
        Self {
            settings,
            tool,
            config,
            services,
        }
    }

    /// Render, validate and push one application's containers.
    pub fn push(&self, selection: &AppSelection, options: &PushOptions) -> Result<PushReport> {
        let mut ctx = ReleaseContext::new(&self.config.name, &self.settings.user, &selection.application);
        self.push_app(&mut ctx, selection, options)
    }

    /// Pull, build and push every selected application.
    ///
    /// A failing application is recorded and the next one proceeds.
    /// Configuration errors stop the whole deploy.
    pub fn deploy(&self, selector: &str, options: &DeployOptions) -> Result<DeployReport> {
        if options.skip_gitpull && options.work_dir.is_none() {
            return Err(Error::validation_invalid_argument(
                "directory",
                "Skipping git pull requires a working directory holding the checkout",
                None,
                None,
            ));
        }

        let environment = options.environment.as_str();
        self.tool.environment(environment)?;
        self.tool.registry()?;

        let configured: Vec<String> = self.config.apps.keys().cloned().collect();
        let selections = selector::parse_deploy(selector, &configured)?;
        for selection in &selections {
            self.config
                .app(&selection.application)?
                .select_containers(&selection.containers)?;
        }

        let mut scratch: Option<TempDir> = None;
        let work_dir = match &options.work_dir {
            Some(dir) => dir.clone(),
            None => {
                let dir = tempfile::Builder::new()
                    .prefix("porter-")
                    .tempdir()
                    .map_err(|e| Error::internal_io(e.to_string(), Some("create work dir".to_string())))?;
                let path = dir.path().to_path_buf();
                scratch = Some(dir);
                path
            }
        };

        let mut ctx = ReleaseContext::new(&self.config.name, &self.settings.user, selector);
        let mut applications = Vec::new();
        for selection in &selections {
            log_status!("deploy", "Deploying {} to {}", selection.application, environment);
            match self.deploy_app(&mut ctx, selection, &work_dir, options) {
                Ok(deployment) => {
                    applications.push(ItemOutcome::succeeded(&selection.application, deployment));
                }
                Err(err) if err.code.is_configuration() => return Err(err),
                Err(err) => {
                    log_status!("deploy", "Deploy of {} failed: {}", selection.application, err.message);
                    applications.push(ItemOutcome::failed(&selection.application, &err));
                }
            }
        }
        drop(scratch);

        let elapsed_seconds = (Utc::now() - ctx.started_at).num_seconds();
        log_status!(
            "deploy",
            "{}'s deploy for {} / {} / {} completed in {} seconds",
            ctx.user,
            selector,
            environment,
            options.branch,
            elapsed_seconds
        );

        let summary = BulkSummary::of(&applications);
        Ok(DeployReport {
            identifier: ctx.identifier,
            environment: environment.to_string(),
            applications,
            summary,
            timings: ctx.timings,
            task_ids: ctx.task_ids,
            elapsed_seconds,
        })
    }

    /// Push the images running in `from` to `to`, one container at a time.
    ///
    /// Each container's whole step (image lookup, hooks, render, checks and
    /// submit) is retried per `options.retry`. Failed containers are
    /// collected and reported once every container was tried.
    pub fn promote(&self, application: &str, options: &PromoteOptions) -> Result<PromoteReport> {
        let app = self.config.app(application)?;
        let from_target = self.tool.environment(&options.from)?;
        self.tool.environment(&options.to)?;
        let registry = self.tool.registry()?;
        let containers = app.select_containers(&options.containers)?;

        let repo = self.config.repo_for(application, app);
        let repo_name = source::repo_name(&repo);
        let checkout = if app.template_path.is_some() || app.extra_variables_path.is_some() {
            let dir = tempfile::Builder::new()
                .prefix("porter-promote-")
                .tempdir()
                .map_err(|e| Error::internal_io(e.to_string(), Some("create work dir".to_string())))?;
            let url = source::repo_url(&repo, self.tool.default_repo_prefix.as_deref())?;
            self.services
                .source
                .checkout(&url, &options.branch, dir.path(), &repo_name)?;
            Some(dir)
        } else {
            None
        };
        let work_dir = checkout.as_ref().map(|dir| dir.path());

        let renderer = self.renderer(app, work_dir, &repo_name)?;
        let extra = self.extra_variables(app, work_dir, &repo_name)?;
        let location = location("promote", application, &options.to);

        let mut ctx = ReleaseContext::new(&self.config.name, &self.settings.user, application);
        let mut promoted = Vec::new();
        let mut failures = Vec::new();
        for container in containers {
            log_status!(
                "promote",
                "Promoting {}:{} from {} to {}",
                application,
                container.name(),
                options.from,
                options.to
            );
            let selection = AppSelection {
                application: application.to_string(),
                containers: vec![container.name().to_string()],
            };
            let mut attempts = 0;
            let result = options.retry.run(|attempt| {
                attempts = attempt;
                let deployed = self.deployed_image(
                    &renderer,
                    app,
                    container,
                    &options.from,
                    from_target,
                    extra.as_ref(),
                    options.secrets_file.clone(),
                )?;
                let image = strip_registry(registry, &deployed);
                let push_options = PushOptions {
                    environment: options.to.clone(),
                    image: image.clone(),
                    work_dir: work_dir.map(Path::to_path_buf),
                    secrets_file: options.secrets_file.clone(),
                    overrides: options.overrides.clone(),
                    validation: options.validation,
                    force_push: options.force_push,
                    skip_push: false,
                };
                self.push_app(&mut ctx, &selection, &push_options)?;
                Ok(image)
            });

            match result {
                Ok(image) => {
                    promoted.push(PromotedContainer {
                        container: container.name().to_string(),
                        image,
                        attempts,
                    });
                }
                Err(err) => {
                    log_status!("promote", "{} failed: {}", container.name(), err.message);
                    failures.push(err.into_failure(container.name()));
                }
            }
        }
        drop(checkout);

        if !failures.is_empty() {
            return Err(Error::promote_failed(failures, location));
        }
        Ok(PromoteReport {
            application: application.to_string(),
            from: options.from.clone(),
            to: options.to.clone(),
            promoted,
            task_ids: ctx.task_ids,
        })
    }

    fn deploy_app(
        &self,
        ctx: &mut ReleaseContext,
        selection: &AppSelection,
        work_dir: &Path,
        options: &DeployOptions,
    ) -> Result<AppDeployment> {
        let name = selection.application.as_str();
        let environment = options.environment.as_str();
        let app = self.config.app(name)?;
        let repo = self.config.repo_for(name, app);
        let repo_name = source::repo_name(&repo);
        let checkout = work_dir.join(&repo_name);

        if options.skip_gitpull {
            log_status!("deploy", "Skipping git pull for {}", name);
        } else {
            let repo_url = source::repo_url(&repo, self.tool.default_repo_prefix.as_deref())?;
            self.run_phase(ctx, app, name, environment, Phase::GitPull, work_dir, || {
                self.services
                    .source
                    .checkout(&repo_url, &options.branch, work_dir, &repo_name)
                    .map(|_| ())
            })?;
        }

        let registry = self.tool.registry()?;
        let (image, version) = if options.skip_build {
            let renderer = self.renderer(app, Some(work_dir), &repo_name)?;
            let extra = self.extra_variables(app, Some(work_dir), &repo_name)?;
            let first = app
                .select_containers(&selection.containers)?
                .into_iter()
                .next()
                .ok_or_else(|| {
                    Error::validation_invalid_argument(
                        "application",
                        "Application declares no containers",
                        Some(name.to_string()),
                        None,
                    )
                })?;
            let target = self.tool.environment(environment)?;
            let deployed = self.deployed_image(
                &renderer,
                app,
                first,
                environment,
                target,
                extra.as_ref(),
                options.secrets_file.clone(),
            )?;
            log_status!("deploy", "Skipping build for {}, reusing {}", name, deployed);
            (strip_registry(registry, &deployed), None)
        } else {
            let revision = self.services.source.revision(&checkout, &options.branch)?;
            let tags = self.services.registry.search(registry, &self.config.name, name)?;
            let next = version::next_version(
                &tags,
                &self.config.name,
                name,
                &self.tool.environment_names(),
                &revision,
                options.bump,
            )?;
            let image = version::image_name(&self.config.name, name, &next);
            let full_image = image_path(registry, &image);
            let context = match &app.path {
                Some(path) => checkout.join(path),
                None => checkout.clone(),
            };
            let build_args = app.build_args_for(environment, &options.build_args);
            self.run_phase(ctx, app, name, environment, Phase::Build, &context, || {
                let dockerfile = resolve_dockerfile(&context, app.build_filename.as_deref())?;
                self.services.builder.build_and_push(&BuildRequest {
                    context: &context,
                    dockerfile: dockerfile.as_deref(),
                    image: &full_image,
                    build_args: &build_args,
                })
            })?;
            (image, Some(next.to_string()))
        };

        let push_options = PushOptions {
            environment: environment.to_string(),
            image: image.clone(),
            work_dir: Some(work_dir.to_path_buf()),
            secrets_file: options.secrets_file.clone(),
            overrides: options.overrides.clone(),
            validation: options.validation,
            force_push: options.force_push,
            skip_push: options.skip_push,
        };
        let push = self.push_app(ctx, selection, &push_options)?;

        Ok(AppDeployment {
            release: Release {
                application: name.to_string(),
                environment: environment.to_string(),
                branch: options.branch.clone(),
                repository: repo,
                image,
                version,
            },
            push,
        })
    }

    fn push_app(
        &self,
        ctx: &mut ReleaseContext,
        selection: &AppSelection,
        options: &PushOptions,
    ) -> Result<PushReport> {
        let name = selection.application.as_str();
        let app = self.config.app(name)?;
        let repo_name = source::repo_name(&self.config.repo_for(name, app));
        let work_dir = options.work_dir.as_deref();
        let renderer = self.renderer(app, work_dir, &repo_name)?;
        let extra = self.extra_variables(app, work_dir, &repo_name)?;
        let location = location("push", name, &options.environment);

        let mut accepted = Vec::new();
        let result = self.run_phase(
            ctx,
            app,
            name,
            &options.environment,
            Phase::Push,
            renderer.root(),
            || {
                let report = self.render_and_push(app, selection, &renderer, extra.as_ref(), options)?;
                accepted = report.task_ids();
                report.into_result(&location)
            },
        );
        ctx.record_task_ids(accepted);
        result
    }

    /// Render, check and submit. Per-container push failures are left in the
    /// report's batch for the caller to judge.
    fn render_and_push(
        &self,
        app: &AppConfig,
        selection: &AppSelection,
        renderer: &TemplateRenderer,
        extra: Option<&Value>,
        options: &PushOptions,
    ) -> Result<PushReport> {
        let environment = options.environment.as_str();
        let location = location("push", &selection.application, environment);
        let target = self.tool.environment(environment)?;
        let registry = self.tool.registry()?;
        let containers = app.select_containers(&selection.containers)?;
        let image = image_path(registry, &options.image);

        let vault = SecretVault::new(&self.settings.secrets_dir).with_explicit_file(options.secrets_file.clone());
        let jobs = containers.iter().map(|container| {
            let job = self.render_job(&vault, app, container, environment, &image, extra, &options.overrides);
            (container.name().to_string(), job)
        });
        let batch = renderer.render_batch(&self.config.name, jobs, &location);

        let mut descriptors = Vec::new();
        for rendered in &batch.rendered {
            descriptors.push(write_descriptor(
                &self.settings.components_dir,
                environment,
                &self.config.name,
                &rendered.container,
                &rendered.descriptor,
            )?);
        }
        let rendered = batch.into_result(&location)?;

        let checks = match self
            .services
            .routing
            .routing_table(environment, target)
            .map_err(|e| e.at(&location))?
        {
            Some(table) => {
                let validator = DeploymentValidator::new(table);
                rendered
                    .iter()
                    .map(|r| validator.check(&r.container, &r.descriptor))
                    .collect()
            }
            None => {
                log_status!("validate", "No routing config for {}, skipping deployment checks", environment);
                Vec::new()
            }
        };
        let skip = gate(&checks, options.validation, options.force_push, &location)?;

        let output_dir = self.settings.components_dir.join(environment);
        if options.skip_push {
            log_status!("push", "Skipping push, descriptors are in {}", output_dir.display());
            return Ok(PushReport {
                application: selection.application.clone(),
                environment: environment.to_string(),
                image,
                output_dir,
                descriptors,
                checks,
                push: None,
            });
        }

        let executor = PushExecutor::new(self.services.scheduler, environment, target).act_as(self.config.act_as());
        let pushed = executor.push_batch(&rendered, &skip, &location);

        Ok(PushReport {
            application: selection.application.clone(),
            environment: environment.to_string(),
            image,
            output_dir,
            descriptors,
            checks,
            push: Some(pushed),
        })
    }

    #[allow(clippy::too_many_arguments)]
    fn render_job(
        &self,
        vault: &SecretVault,
        app: &AppConfig,
        container: &Container,
        environment: &str,
        image: &str,
        extra: Option<&Value>,
        overrides: &Map<String, Value>,
    ) -> Result<RenderJob> {
        let secrets = vault.load(environment, &container.descriptor_file_name(&self.config.name))?;
        let variables = variables::resolve(&VariableSources {
            environment,
            image,
            config_vars: self.config.vars.as_ref(),
            app_vars: app.vars.as_ref(),
            container_vars: container.vars(),
            extra,
            secrets: secrets.as_ref(),
            overrides: Some(overrides),
        });
        Ok(RenderJob { variables, secrets })
    }

    /// Image the scheduler runs for `container` in `environment`.
    ///
    /// The app id comes from the container's descriptor rendered for that
    /// environment.
    #[allow(clippy::too_many_arguments)]
    fn deployed_image(
        &self,
        renderer: &TemplateRenderer,
        app: &AppConfig,
        container: &Container,
        environment: &str,
        target: &EnvironmentConfig,
        extra: Option<&Value>,
        secrets_file: Option<String>,
    ) -> Result<String> {
        let location = PipelineLocation {
            phase: Some("lookup".to_string()),
            application: None,
            container: Some(container.name().to_string()),
            environment: Some(environment.to_string()),
        };

        let vault = SecretVault::new(&self.settings.secrets_dir).with_explicit_file(secrets_file);
        let secrets = vault.load(environment, &container.descriptor_file_name(&self.config.name))?;
        let variables = variables::resolve(&VariableSources {
            environment,
            config_vars: self.config.vars.as_ref(),
            app_vars: app.vars.as_ref(),
            container_vars: container.vars(),
            extra,
            secrets: secrets.as_ref(),
            ..Default::default()
        });
        let descriptor = renderer.render_text(&self.config.name, container.name(), &variables, &location)?;

        let app_id = push::task_ids(&descriptor).into_iter().next().ok_or_else(|| {
            Error::validation_invalid_argument(
                "id",
                "Rendered descriptor has no application id",
                Some(container.name().to_string()),
                None,
            )
        })?;
        self.services
            .scheduler
            .current_image(environment, target, &app_id)
            .map_err(|e| e.at(&location))?
            .ok_or_else(|| {
                Error::validation_invalid_argument(
                    "application",
                    format!("No image of {} is deployed in {}", app_id, environment),
                    Some(app_id.clone()),
                    None,
                )
            })
    }

    fn renderer(&self, app: &AppConfig, work_dir: Option<&Path>, repo_name: &str) -> Result<TemplateRenderer> {
        match &app.template_path {
            Some(path) => {
                let root = checkout_root(work_dir, "template_path")?;
                Ok(TemplateRenderer::in_repository(root, repo_name, path))
            }
            None => Ok(TemplateRenderer::new(&self.settings.templates_dir)),
        }
    }

    fn extra_variables(&self, app: &AppConfig, work_dir: Option<&Path>, repo_name: &str) -> Result<Option<Value>> {
        let Some(path) = &app.extra_variables_path else {
            return Ok(None);
        };
        let root = checkout_root(work_dir, "extra_variables_path")?;
        let file = root.join(repo_name).join(path);
        log_status!("render", "Loading extra variables from {}", file.display());
        document::load(&file).map(Some)
    }

    /// Pre hook, `op`, post hook, all timed as one phase and announced.
    #[allow(clippy::too_many_arguments)]
    fn run_phase<T>(
        &self,
        ctx: &mut ReleaseContext,
        app: &AppConfig,
        application: &str,
        environment: &str,
        phase: Phase,
        dir: &Path,
        op: impl FnOnce() -> Result<T>,
    ) -> Result<T> {
        let (result, elapsed) = ctx.time(application, phase, || -> Result<T> {
            let hooks = HookRunner::new(&app.hooks, dir)?;
            hooks.run_stage(Stage::Pre, phase)?;
            let value = op()?;
            hooks.run_stage(Stage::Post, phase)?;
            Ok(value)
        });

        let outcome = if result.is_ok() {
            Outcome::Success
        } else {
            Outcome::Failure
        };
        self.announce(app, application, environment, &ctx.user, phase, elapsed, outcome);

        result.map_err(|e| e.at(&location(phase.as_str(), application, environment)))
    }

    #[allow(clippy::too_many_arguments)]
    fn announce(
        &self,
        app: &AppConfig,
        application: &str,
        environment: &str,
        user: &str,
        phase: Phase,
        elapsed: Duration,
        outcome: Outcome,
    ) {
        let action = Action {
            stage: Stage::Post,
            phase,
            application,
            environment,
            user,
            elapsed,
            outcome,
        };
        NotificationDispatcher::new(self.services.notifier).dispatch(app.notifications.as_ref(), &action);
    }
}

/// `build_filename` inside the build context. A named file must exist.
fn resolve_dockerfile(context: &Path, build_filename: Option<&str>) -> Result<Option<PathBuf>> {
    let Some(name) = build_filename.filter(|n| !n.trim().is_empty()) else {
        return Ok(None);
    };
    let file = context.join(name);
    if !file.is_file() {
        return Err(Error::build_failed(
            format!("docker build -f {}", file.display()),
            format!("Specified build file {} does not exist", file.display()),
        ));
    }
    Ok(Some(file))
}

fn checkout_root<'p>(work_dir: Option<&'p Path>, key: &str) -> Result<&'p Path> {
    work_dir.ok_or_else(|| {
        Error::validation_invalid_argument(
            "directory",
            format!("Application sets {}; a working directory holding the checkout is required", key),
            None,
            None,
        )
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn image_path_adds_registry_once() {
        assert_eq!(
            image_path("registry.example:5000", "content-kairos-abc/v0.1.0"),
            "registry.example:5000/content-kairos-abc/v0.1.0"
        );
        assert_eq!(
            image_path("registry.example:5000", "registry.example:5000/content-kairos-abc/v0.1.0"),
            "registry.example:5000/content-kairos-abc/v0.1.0"
        );
    }

    #[test]
    fn dockerfile_resolves_inside_the_build_context() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("Dockerfile.prod"), "FROM scratch\n").unwrap();

        assert_eq!(resolve_dockerfile(dir.path(), None).unwrap(), None);
        assert_eq!(
            resolve_dockerfile(dir.path(), Some("Dockerfile.prod")).unwrap(),
            Some(dir.path().join("Dockerfile.prod"))
        );
        let err = resolve_dockerfile(dir.path(), Some("Dockerfile.missing")).unwrap_err();
        assert_eq!(err.code, crate::ErrorCode::BuildFailed);
    }

    #[test]
    fn strip_registry_leaves_foreign_images() {
        assert_eq!(
            strip_registry("registry.example:5000", "registry.example:5000/content-kairos-abc/v0.1.0"),
            "content-kairos-abc/v0.1.0"
        );
        assert_eq!(strip_registry("registry.example:5000", "nginx:1.25"), "nginx:1.25");
    }
}
