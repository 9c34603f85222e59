//! Deployment driving
//!
//! The engine never talks to the container runtime directly; it goes
//! through the [`DeploymentDriver`] trait so tests can substitute a
//! stub. The production driver shells out to `docker compose` with
//! bounded fixed-delay retries, and to `docker` for in-container probe
//! reads and the instantaneous stats sample.

use crate::error::EngineError;
use crate::runcfg::{BuildMode, RunConfig};
use async_trait::async_trait;
use ceval_core::ProbeError;
use std::process::Output;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::process::Command;

/// Seam between the pipeline and the container runtime.
#[async_trait]
pub trait DeploymentDriver: Send + Sync {
    /// Start the backend services once, before the first mode.
    async fn start_backends(&self) -> Result<(), EngineError>;

    /// Recreate the router so it picks up the mutated configuration.
    async fn apply_router(&self, mode_name: &str) -> Result<(), EngineError>;

    /// Run a shell command inside the router container, capturing stdout.
    ///
    /// Failures surface as probe errors; resource sampling degrades on
    /// them rather than aborting the run.
    async fn probe_capture(&self, command: &str) -> Result<String, ProbeError>;

    /// One instantaneous `<cpu>%,<mem> / <limit>` stats line for the
    /// router container.
    async fn stats_sample(&self) -> Result<String, ProbeError>;
}

/// `docker compose` backed driver.
pub struct ComposeDriver {
    compose_file: String,
    router_service: String,
    backend_services: Vec<String>,
    attempts: u32,
    retry_delay: Duration,
    build_mode: BuildMode,
    built_once: AtomicBool,
}

impl ComposeDriver {
    /// Build from the run configuration.
    #[must_use]
    pub fn new(cfg: &RunConfig) -> Self {
        Self {
            compose_file: cfg.compose_file.display().to_string(),
            router_service: cfg.router_service.clone(),
            backend_services: cfg.backend_services.clone(),
            attempts: cfg.orchestration_attempts.max(1),
            retry_delay: cfg.orchestration_retry_delay,
            build_mode: cfg.build_mode,
            built_once: AtomicBool::new(false),
        }
    }

    fn compose_args(&self) -> Vec<String> {
        vec![
            "compose".to_string(),
            "-f".to_string(),
            self.compose_file.clone(),
        ]
    }

    fn should_build(&self) -> bool {
        match self.build_mode {
            BuildMode::Reuse => false,
            BuildMode::BuildPerMode => true,
            BuildMode::BuildOnce => !self.built_once.swap(true, Ordering::SeqCst),
        }
    }

    /// Run one docker invocation with bounded retries on non-zero exit.
    async fn run_with_retry(&self, args: &[String]) -> Result<(), EngineError> {
        let command_line = format!("docker {}", args.join(" "));
        let mut last_detail = String::new();
        for attempt in 1..=self.attempts {
            match Command::new("docker").args(args).output().await {
                Ok(output) if output.status.success() => return Ok(()),
                Ok(output) => last_detail = describe_failure(&output),
                Err(err) => last_detail = format!("spawn failed: {err}"),
            }
            if attempt < self.attempts {
                tracing::warn!(
                    command = %command_line,
                    attempt,
                    detail = %last_detail,
                    "orchestration command failed, retrying"
                );
                tokio::time::sleep(self.retry_delay).await;
            }
        }
        Err(EngineError::Orchestration {
            command: command_line,
            attempts: self.attempts,
            detail: last_detail,
        })
    }
}

fn describe_failure(output: &Output) -> String {
    let stderr = String::from_utf8_lossy(&output.stderr);
    // keep only the tail of a long compose error dump
    let reversed: Vec<char> = stderr.trim().chars().rev().take(400).collect();
    let tail: String = reversed.into_iter().rev().collect();
    format!("exit {}: {}", output.status, tail)
}

#[async_trait]
impl DeploymentDriver for ComposeDriver {
    async fn start_backends(&self) -> Result<(), EngineError> {
        if self.backend_services.is_empty() {
            return Ok(());
        }
        let mut args = self.compose_args();
        args.extend(["up".to_string(), "-d".to_string()]);
        args.extend(self.backend_services.iter().cloned());
        self.run_with_retry(&args).await
    }

    async fn apply_router(&self, mode_name: &str) -> Result<(), EngineError> {
        tracing::info!(mode = mode_name, "recreating router");
        let mut args = self.compose_args();
        args.extend([
            "up".to_string(),
            "-d".to_string(),
            "--force-recreate".to_string(),
        ]);
        if self.should_build() {
            args.push("--build".to_string());
        }
        args.push(self.router_service.clone());
        self.run_with_retry(&args).await
    }

    async fn probe_capture(&self, command: &str) -> Result<String, ProbeError> {
        let mut args = self.compose_args();
        args.extend([
            "exec".to_string(),
            "-T".to_string(),
            self.router_service.clone(),
            "sh".to_string(),
            "-c".to_string(),
            command.to_string(),
        ]);
        let output = Command::new("docker")
            .args(&args)
            .output()
            .await
            .map_err(|_| ProbeError::Empty)?;
        if !output.status.success() {
            return Err(ProbeError::Empty);
        }
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }

    async fn stats_sample(&self) -> Result<String, ProbeError> {
        let output = Command::new("docker")
            .args([
                "stats",
                "--no-stream",
                "--format",
                "{{.CPUPerc}},{{.MemUsage}}",
                &self.router_service,
            ])
            .output()
            .await
            .map_err(|_| ProbeError::Empty)?;
        if !output.status.success() {
            return Err(ProbeError::Empty);
        }
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}

/// Poll the router until any response below 500 comes back.
///
/// Transport errors and 5xx answers both count as "not ready yet".
pub async fn wait_ready(
    client: &reqwest::Client,
    url: &str,
    mode_name: &str,
    attempts: u32,
    delay: Duration,
) -> Result<(), EngineError> {
    for attempt in 1..=attempts.max(1) {
        match client.get(url).send().await {
            Ok(response) if response.status().as_u16() < 500 => {
                tracing::debug!(mode = mode_name, attempt, "router ready");
                return Ok(());
            }
            Ok(response) => {
                tracing::trace!(mode = mode_name, status = %response.status(), "not ready")
            }
            Err(err) => tracing::trace!(mode = mode_name, %err, "not ready"),
        }
        tokio::time::sleep(delay).await;
    }
    Err(EngineError::ReadinessTimeout {
        mode: mode_name.to_string(),
        attempts,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn driver(build_mode: BuildMode) -> ComposeDriver {
        let cfg = RunConfig {
            build_mode,
            ..RunConfig::default()
        };
        ComposeDriver::new(&cfg)
    }

    #[test]
    fn reuse_never_builds() {
        let d = driver(BuildMode::Reuse);
        assert!(!d.should_build());
        assert!(!d.should_build());
    }

    #[test]
    fn build_once_builds_exactly_once() {
        let d = driver(BuildMode::BuildOnce);
        assert!(d.should_build());
        assert!(!d.should_build());
        assert!(!d.should_build());
    }

    #[test]
    fn per_mode_always_builds() {
        let d = driver(BuildMode::BuildPerMode);
        assert!(d.should_build());
        assert!(d.should_build());
    }
}
