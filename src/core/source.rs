//! Registry, source control and image build collaborators.
//!
//! The pipeline only talks to these traits. The default implementations
//! shell out to `docker` and `git`.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use crate::error::{Error, Result};
use crate::utils::command;

/// Image names known to the registry for `<config>-<app>`.
pub trait Registry {
    /// Newline-delimited search output, one image per line.
    fn search(&self, registry: &str, config: &str, application: &str) -> Result<Vec<String>>;
}

pub trait SourceControl {
    /// Make `<work_dir>/<repo_name>` a checkout of `branch`, cloning or pulling.
    fn checkout(&self, repo_url: &str, branch: &str, work_dir: &Path, repo_name: &str) -> Result<PathBuf>;

    /// Revision id of the checked-out branch.
    fn revision(&self, checkout: &Path, branch: &str) -> Result<String>;
}

/// One image build.
#[derive(Debug, Clone, Copy)]
pub struct BuildRequest<'a> {
    /// Build context: `<checkout>/<path>`.
    pub context: &'a Path,
    /// `None` leaves docker to find `Dockerfile` in the context.
    pub dockerfile: Option<&'a Path>,
    pub image: &'a str,
    pub build_args: &'a BTreeMap<String, String>,
}

pub trait ImageBuilder {
    /// Build the requested image and push it to the registry.
    fn build_and_push(&self, request: &BuildRequest<'_>) -> Result<()>;
}

pub struct DockerCliRegistry;

impl Registry for DockerCliRegistry {
    fn search(&self, registry: &str, config: &str, application: &str) -> Result<Vec<String>> {
        let term = format!("{}/{}-{}", registry, config, application);
        let output = command::run("docker", &["search", &term], "docker search")
            .map_err(|e| Error::registry_query_failed(format!("docker search {}", term), e.message))?;
        Ok(output
            .lines()
            .map(str::trim)
            .filter(|l| !l.is_empty())
            .map(str::to_string)
            .collect())
    }
}

pub struct GitCli;

impl SourceControl for GitCli {
    fn checkout(&self, repo_url: &str, branch: &str, work_dir: &Path, repo_name: &str) -> Result<PathBuf> {
        let target = work_dir.join(repo_name);
        if target.join(".git").is_dir() {
            for args in [
                vec!["fetch", "origin"],
                vec!["checkout", branch],
                vec!["pull", "origin", branch],
            ] {
                command::run_in(&target, "git", &args, "git pull").map_err(|e| {
                    Error::source_command_failed(
                        format!("git {}", args.join(" ")),
                        error_cause(&e),
                        Some(target.display().to_string()),
                    )
                })?;
            }
        } else {
            std::fs::create_dir_all(work_dir).map_err(|e| {
                Error::internal_io(e.to_string(), Some(format!("create {}", work_dir.display())))
            })?;
            command::run_in(
                work_dir,
                "git",
                &["clone", "--branch", branch, repo_url, repo_name],
                "git clone",
            )
            .map_err(|e| {
                Error::source_command_failed(
                    format!("git clone --branch {} {}", branch, repo_url),
                    error_cause(&e),
                    Some(work_dir.display().to_string()),
                )
            })?;
        }
        Ok(target)
    }

    fn revision(&self, checkout: &Path, branch: &str) -> Result<String> {
        command::run_in(checkout, "git", &["rev-parse", "--verify", branch], "git rev-parse")
            .or_else(|_| command::run_in(checkout, "git", &["rev-parse", "HEAD"], "git rev-parse"))
            .map_err(|e| {
                Error::source_command_failed("git rev-parse", error_cause(&e), Some(checkout.display().to_string()))
            })
    }
}

pub struct DockerCliBuilder;

impl ImageBuilder for DockerCliBuilder {
    fn build_and_push(&self, request: &BuildRequest<'_>) -> Result<()> {
        let args = docker_build_args(request);
        let args: Vec<&str> = args.iter().map(String::as_str).collect();

        command::run("docker", &args, "docker build")
            .map_err(|e| Error::build_failed(format!("docker {}", args.join(" ")), error_cause(&e)))?;
        command::run("docker", &["push", request.image], "docker push")
            .map_err(|e| Error::build_failed(format!("docker push {}", request.image), error_cause(&e)))?;
        Ok(())
    }
}

fn docker_build_args(request: &BuildRequest<'_>) -> Vec<String> {
    let mut args = vec!["build".to_string(), "-t".to_string(), request.image.to_string()];
    if let Some(file) = request.dockerfile {
        args.push("-f".to_string());
        args.push(file.display().to_string());
    }
    for (key, value) in request.build_args {
        args.push("--build-arg".to_string());
        args.push(format!("{}={}", key, value));
    }
    args.push(request.context.display().to_string());
    args
}

fn error_cause(err: &Error) -> String {
    err.details["error"].as_str().unwrap_or(&err.message).to_string()
}

/// Short repository name: `git@github.com:org/name.git` → `name`.
pub fn repo_name(repo: &str) -> String {
    if repo.contains("git@github") {
        let tail = repo.rsplit('/').next().unwrap_or(repo);
        return tail.trim_end_matches(".git").to_string();
    }
    repo.to_string()
}

/// Clone URL for a repo. Full git URLs pass through; bare names need a prefix.
pub fn repo_url(repo: &str, default_prefix: Option<&str>) -> Result<String> {
    if repo.starts_with("git@") || repo.contains("://") {
        return Ok(repo.to_string());
    }
    match default_prefix.filter(|p| !p.is_empty()) {
        Some(prefix) => Ok(format!("{}{}.git", prefix, repo)),
        None => Err(Error::config_missing_key(
            "default_repo_prefix",
            Some("porter.yml".to_string()),
        )
        .with_hint("Use a full git URL for the repo or set default_repo_prefix")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn docker_build_passes_file_and_build_args() {
        let mut build_args = BTreeMap::new();
        build_args.insert("NODE_ENV".to_string(), "production".to_string());
        build_args.insert("WORKERS".to_string(), "2".to_string());
        let request = BuildRequest {
            context: Path::new("/work/api/service"),
            dockerfile: Some(Path::new("/work/api/service/Dockerfile.prod")),
            image: "registry:5000/content-api-abc/v1.0.0",
            build_args: &build_args,
        };
        assert_eq!(
            docker_build_args(&request),
            vec![
                "build",
                "-t",
                "registry:5000/content-api-abc/v1.0.0",
                "-f",
                "/work/api/service/Dockerfile.prod",
                "--build-arg",
                "NODE_ENV=production",
                "--build-arg",
                "WORKERS=2",
                "/work/api/service",
            ]
        );
    }

    #[test]
    fn repo_name_strips_org_and_suffix() {
        assert_eq!(repo_name("git@github.com:moz/content-api.git"), "content-api");
        assert_eq!(repo_name("content-api"), "content-api");
    }

    #[test]
    fn repo_url_uses_prefix_for_bare_names() {
        assert_eq!(
            repo_url("content-api", Some("git@github.com:moz/")).unwrap(),
            "git@github.com:moz/content-api.git"
        );
        assert_eq!(
            repo_url("git@github.com:x/y.git", None).unwrap(),
            "git@github.com:x/y.git"
        );
        assert_eq!(
            repo_url("y", None).unwrap_err().code,
            crate::ErrorCode::ConfigMissingKey
        );
    }
}
