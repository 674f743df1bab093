use std::num::NonZeroUsize;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;

use anyhow::{bail, Context, Result};
use ionogram_core::Record;
use itertools::Itertools;
use tracing::{info, warn};

use crate::cli::RunArgs;
use crate::config::{self, BatchConfig};
use crate::engine::{run_all, JobContext, RunReport};
use crate::resolution::{check_resolution, ResolutionReport};
use crate::window::{discover_start_second, enumerate_windows, WindowJob};

pub fn run_from_config(config_path: &Path, args: &RunArgs) -> Result<()> {
    let config = resolve_config(config_path, Some(args))?;
    let cancel = install_cancel_handler()?;
    let report = run_pipeline(&config, cancel, |path: &Path| Record::load(path))?;
    if report.failed > 0 {
        bail!("{} window(s) failed", report.failed);
    }
    Ok(())
}

pub fn check_from_config(config_path: &Path) -> Result<()> {
    let config = resolve_config(config_path, None)?;
    let start_second = start_second(&config)?;
    let report = check_resolution(&config, start_second, |path: &Path| Record::load(path));
    report.log();
    print!("{}", render_report(&report));
    Ok(())
}

fn resolve_config(path: &Path, args: Option<&RunArgs>) -> Result<BatchConfig> {
    let mut file = config::load(path)?;
    file.apply_env()?;
    if let Some(args) = args {
        file.apply_run_args(args);
    }
    let config = file.resolve()?;
    config.log_summary();
    Ok(config)
}

fn install_cancel_handler() -> Result<Arc<AtomicBool>> {
    let cancel = Arc::new(AtomicBool::new(false));
    let flag = Arc::clone(&cancel);
    ctrlc::set_handler(move || {
        if !flag.swap(true, Ordering::SeqCst) {
            warn!("interrupt received; letting in-flight windows finish");
        }
    })
    .context("failed to install Ctrl-C handler")?;
    Ok(cancel)
}

/// A configured start second wins over the one found on disk.
pub fn start_second(config: &BatchConfig) -> Result<u32> {
    match config.start_second {
        Some(second) => Ok(second),
        None => discover_start_second(&config.input_dir.render(config.date_from)),
    }
}

pub fn run_pipeline<F>(config: &BatchConfig, cancel: Arc<AtomicBool>, load: F) -> Result<RunReport>
where
    F: Fn(&Path) -> ionogram_core::Result<Record> + Sync,
{
    let start_second = start_second(config)?;
    let jobs = enumerate_windows(config);
    info!(start_second, total = jobs.len(), "windows: [{}]", job_preview(&jobs));

    if config.check_resolution {
        check_resolution(config, start_second, &load).log();
    } else {
        info!("resolution check disabled; pass --check to enable it");
    }

    let workers = config
        .workers
        .unwrap_or_else(|| thread::available_parallelism().map_or(1, NonZeroUsize::get));
    let ctx = JobContext::new(config, start_second, jobs.len(), cancel);
    let report = run_all(&jobs, &ctx, workers, load)?;

    let progress = ctx.progress.snapshot();
    info!(%report, "completed {}/{}", progress.completed, progress.total);
    if report.cancelled > 0 {
        warn!(cancelled = report.cancelled, "run was interrupted");
    }
    Ok(report)
}

/// First two and last two jobs.
fn job_preview(jobs: &[WindowJob]) -> String {
    if jobs.len() <= 4 {
        return jobs.iter().join(", ");
    }
    let n = jobs.len();
    format!(
        "{}, {}, ..., {}, {}",
        jobs[0],
        jobs[1],
        jobs[n - 2],
        jobs[n - 1]
    )
}

fn render_report(report: &ResolutionReport) -> String {
    let mut out = match report.first {
        Some(first) => format!("first record resolution: {first} points\n"),
        None => "no source records found\n".to_string(),
    };
    if !report.divergent.is_empty() {
        out.push_str("records with a different resolution:\n");
        for name in &report.divergent {
            out.push_str(&format!("  {name}\n"));
        }
    }
    out
}
