//! ceval — comparative evaluation of a carbon-aware traffic router

use anyhow::Context;
use ceval_engine::deploy::ComposeDriver;
use ceval_engine::engine::Engine;
use ceval_engine::error::EngineError;
use ceval_engine::runcfg::RunConfig;
use clap::{Arg, ArgAction, Command};
use std::future::Future;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

fn cli() -> Command {
    Command::new("ceval")
        .version(ceval_engine::VERSION)
        .about("Drives a carbon-aware router through a policy matrix and reports baseline-relative results")
        .arg(
            Arg::new("config")
                .long("config")
                .value_name("PATH")
                .help("Router configuration file to mutate and restore"),
        )
        .arg(
            Arg::new("results-dir")
                .long("results-dir")
                .value_name("DIR")
                .help("Directory run results land under"),
        )
        .arg(
            Arg::new("requests-per-region")
                .long("requests-per-region")
                .value_name("N")
                .value_parser(clap::value_parser!(u32))
                .help("Requests sent per region per scenario"),
        )
        .arg(
            Arg::new("base-url")
                .long("base-url")
                .value_name("URL")
                .help("Router base URL for load and readiness"),
        )
        .arg(
            Arg::new("failure-scenario")
                .long("failure-scenario")
                .action(ArgAction::SetTrue)
                .help("Include the provider-timeout failure scenario"),
        )
        .arg(
            Arg::new("keep-results")
                .long("keep-results")
                .action(ArgAction::SetTrue)
                .help("Keep previous result directories instead of removing them"),
        )
}

fn apply_cli_overrides(cfg: &mut RunConfig, matches: &clap::ArgMatches) {
    if let Some(path) = matches.get_one::<String>("config") {
        cfg.config_path = path.into();
    }
    if let Some(dir) = matches.get_one::<String>("results-dir") {
        cfg.results_base = dir.into();
    }
    if let Some(n) = matches.get_one::<u32>("requests-per-region") {
        cfg.requests_per_region = *n;
    }
    if let Some(url) = matches.get_one::<String>("base-url") {
        cfg.base_url = url.trim_end_matches('/').to_string();
    }
    if matches.get_flag("failure-scenario") {
        cfg.failure_scenario = true;
    }
    if matches.get_flag("keep-results") {
        cfg.clean_results = false;
    }
}

/// Race the run against an interrupt.
///
/// Dropping the losing run future drops the configuration guard inside
/// it, which restores the original document before the process exits.
async fn run_until_interrupt(
    run: impl Future<Output = Result<PathBuf, EngineError>>,
    interrupt: impl Future<Output = ()>,
) -> Result<Option<PathBuf>, EngineError> {
    tokio::select! {
        result = run => result.map(Some),
        () = interrupt => Ok(None),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let matches = cli().get_matches();
    let mut cfg = RunConfig::from_env().context("reading run settings")?;
    apply_cli_overrides(&mut cfg, &matches);

    let driver = ComposeDriver::new(&cfg);
    let engine = Engine::new(cfg, driver).context("building engine")?;
    let interrupt = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            tracing::error!(%err, "interrupt handler unavailable");
            std::future::pending::<()>().await;
        }
    };
    match run_until_interrupt(engine.run(), interrupt)
        .await
        .context("comparative run failed")?
    {
        Some(out_dir) => {
            println!("results written to {}", out_dir.display());
            Ok(())
        }
        None => anyhow::bail!("interrupted; original configuration restored"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cli_parses_overrides() {
        let matches = cli().get_matches_from([
            "ceval",
            "--config",
            "/tmp/router.json",
            "--requests-per-region",
            "25",
            "--failure-scenario",
            "--keep-results",
        ]);
        let mut cfg = RunConfig::default();
        apply_cli_overrides(&mut cfg, &matches);
        assert_eq!(cfg.config_path.to_str(), Some("/tmp/router.json"));
        assert_eq!(cfg.requests_per_region, 25);
        assert!(cfg.failure_scenario);
        assert!(!cfg.clean_results);
    }

    #[test]
    fn cli_debug_assert() {
        cli().debug_assert();
    }

    #[tokio::test]
    async fn interrupt_restores_the_guarded_config() {
        use std::sync::atomic::{AtomicBool, Ordering};
        use std::sync::Arc;

        const ORIGINAL: &str = "{\"proxies\":[]}\n";
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, ORIGINAL).unwrap();

        let mutated = Arc::new(AtomicBool::new(false));
        let run = {
            let path = path.clone();
            let mutated = Arc::clone(&mutated);
            async move {
                let guard = ceval_config::ConfigGuard::capture(&path)?;
                guard.write_mutated("mid-run mutation")?;
                mutated.store(true, Ordering::SeqCst);
                std::future::pending::<()>().await;
                drop(guard);
                Ok(PathBuf::new())
            }
        };
        // one yield so the run future gets polled and mutates first
        let interrupt = tokio::task::yield_now();

        let result = run_until_interrupt(run, interrupt).await.unwrap();
        assert!(result.is_none());
        assert!(mutated.load(Ordering::SeqCst));
        assert_eq!(std::fs::read_to_string(&path).unwrap(), ORIGINAL);
    }

    #[tokio::test]
    async fn completed_run_wins_over_pending_interrupt() {
        let run = async { Ok(PathBuf::from("/tmp/out")) };
        let result = run_until_interrupt(run, std::future::pending())
            .await
            .unwrap();
        assert_eq!(result, Some(PathBuf::from("/tmp/out")));
    }
}
