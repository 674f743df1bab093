use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use anyhow::{Context, Result};
use ionogram_core::{Record, WriteMode, WriteOutcome};
use rayon::prelude::*;
use rayon::ThreadPoolBuilder;
use tracing::{debug, error, info, warn};

use crate::config::{BatchConfig, PathTemplate};
use crate::progress::Progress;
use crate::window::WindowJob;

/// Terminal state of one window job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobOutcome {
    /// Output already present; no source was read.
    Skipped,
    /// No source record could be loaded.
    EmptyAborted,
    Done { inputs: usize, output: PathBuf },
    /// Never started because the run was cancelled.
    Cancelled,
}

/// Everything a worker needs to process a window.
#[derive(Debug)]
pub struct JobContext {
    pub input_dir: PathTemplate,
    pub output_dir: PathTemplate,
    pub start_second: u32,
    pub overwrite: bool,
    pub progress: Progress,
    pub cancel: Arc<AtomicBool>,
}

impl JobContext {
    pub fn new(
        config: &BatchConfig,
        start_second: u32,
        total: usize,
        cancel: Arc<AtomicBool>,
    ) -> Self {
        Self {
            input_dir: config.input_dir.clone(),
            output_dir: config.output_dir.clone(),
            start_second,
            overwrite: config.overwrite,
            progress: Progress::new(total),
            cancel,
        }
    }

    pub fn output_path(&self, job: &WindowJob) -> PathBuf {
        self.output_dir
            .render(job.date)
            .join(job.output_name(self.start_second).file_name())
    }

    fn write_mode(&self) -> WriteMode {
        if self.overwrite {
            WriteMode::Overwrite
        } else {
            WriteMode::CreateNew
        }
    }
}

pub fn process_window<F>(job: &WindowJob, ctx: &JobContext, load: &F) -> Result<JobOutcome>
where
    F: Fn(&Path) -> ionogram_core::Result<Record>,
{
    if ctx.cancel.load(Ordering::Relaxed) {
        return Ok(JobOutcome::Cancelled);
    }

    let output = ctx.output_path(job);
    if !ctx.overwrite && output.exists() {
        let progress = ctx.progress.record_done();
        debug!(%job, output = %output.display(), %progress, "output exists, skipping");
        return Ok(JobOutcome::Skipped);
    }

    info!(%job, progress = %ctx.progress.snapshot(), "processing window");
    let input_dir = ctx.input_dir.render(job.date);
    let mut records = Vec::new();
    for slot in job.source_slots(ctx.start_second) {
        let path = input_dir.join(slot.file_name());
        if !path.exists() {
            debug!(path = %path.display(), "source file does not exist");
            continue;
        }
        match load(&path) {
            Ok(record) => records.push(record),
            Err(err) => warn!(path = %path.display(), error = %err, "skipping unreadable source"),
        }
    }

    let progress = ctx.progress.record_done();
    if records.is_empty() {
        warn!(%job, %progress, "no source records, nothing written");
        return Ok(JobOutcome::EmptyAborted);
    }

    let inputs = records.len();
    let average = Record::average(&records)
        .with_context(|| format!("failed to average window {job}"))?;

    if let Some(parent) = output.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("failed to create {}", parent.display()))?;
    }
    let outcome = average
        .save(&output, ctx.write_mode())
        .with_context(|| format!("failed to write {}", output.display()))?;
    match outcome {
        WriteOutcome::Written => {
            info!(%job, inputs, output = %output.display(), %progress, "saved");
            Ok(JobOutcome::Done { inputs, output })
        }
        WriteOutcome::AlreadyExists => {
            info!(output = %output.display(), %progress, "destination file already exists");
            Ok(JobOutcome::Skipped)
        }
    }
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct RunReport {
    pub done: usize,
    pub skipped: usize,
    pub empty: usize,
    pub cancelled: usize,
    pub failed: usize,
}

impl RunReport {
    fn tally(&mut self, outcome: &Result<JobOutcome>) {
        match outcome {
            Ok(JobOutcome::Done { .. }) => self.done += 1,
            Ok(JobOutcome::Skipped) => self.skipped += 1,
            Ok(JobOutcome::EmptyAborted) => self.empty += 1,
            Ok(JobOutcome::Cancelled) => self.cancelled += 1,
            Err(_) => self.failed += 1,
        }
    }

    pub fn completed(&self) -> usize {
        self.done + self.skipped + self.empty + self.failed
    }
}

impl fmt::Display for RunReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "done={} skipped={} empty={} failed={} cancelled={}",
            self.done, self.skipped, self.empty, self.failed, self.cancelled
        )
    }
}

/// Runs every job on a dedicated pool; jobs share nothing but `ctx`.
pub fn run_all<F>(
    jobs: &[WindowJob],
    ctx: &JobContext,
    workers: usize,
    load: F,
) -> Result<RunReport>
where
    F: Fn(&Path) -> ionogram_core::Result<Record> + Sync,
{
    let pool = ThreadPoolBuilder::new()
        .num_threads(workers)
        .thread_name(|index| format!("ionobatch-worker-{index}"))
        .build()
        .context("failed to build worker pool")?;
    info!(workers, jobs = jobs.len(), "dispatching windows");

    let outcomes: Vec<Result<JobOutcome>> = pool.install(|| {
        jobs.par_iter()
            .map(|job| process_window(job, ctx, &load))
            .collect()
    });

    let mut report = RunReport::default();
    for (job, outcome) in jobs.iter().zip(&outcomes) {
        if let Err(err) = outcome {
            error!(%job, "window failed: {err:#}");
        }
        report.tally(outcome);
    }
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures;
    use chrono::NaiveDate;
    use std::sync::atomic::AtomicUsize;
    use tempfile::tempdir;

    fn job(minute: u32) -> WindowJob {
        WindowJob {
            date: NaiveDate::from_ymd_opt(2020, 1, 1).unwrap(),
            hour: 0,
            start_minute: minute,
            end_minute: minute + 5,
        }
    }

    fn context(root: &Path, total: usize) -> JobContext {
        JobContext {
            input_dir: PathTemplate::new(root.join("in/{YEAR}{MONTH}{DAY}").to_string_lossy()),
            output_dir: PathTemplate::new(root.join("out/{DAY}").to_string_lossy()),
            start_second: 0,
            overwrite: false,
            progress: Progress::new(total),
            cancel: Arc::new(AtomicBool::new(false)),
        }
    }

    fn counting_loader(
        reads: &AtomicUsize,
    ) -> impl Fn(&Path) -> ionogram_core::Result<Record> + Sync + '_ {
        move |path: &Path| {
            reads.fetch_add(1, Ordering::SeqCst);
            Record::load(path)
        }
    }

    #[test]
    fn second_run_skips_without_reading() {
        let dir = tempdir().unwrap();
        let input = dir.path().join("in/20200101");
        let single = fixtures::record(&[10.0], &[(0, 20, 40.0)]);
        let double = fixtures::record(&[10.0], &[(0, 20, 40.0), (0, 25, 30.0)]);
        fixtures::write(&input, "01_01_00_00_00.dat", &single);
        fixtures::write(&input, "01_01_00_03_15.dat", &double);

        let reads = AtomicUsize::new(0);
        let ctx = context(dir.path(), 2);
        let load = counting_loader(&reads);

        let first = process_window(&job(0), &ctx, &load).unwrap();
        let expected = dir.path().join("out/01/01_01_00_00_00.dat");
        assert_eq!(
            first,
            JobOutcome::Done {
                inputs: 2,
                output: expected.clone()
            }
        );
        assert_eq!(reads.load(Ordering::SeqCst), 2);
        let written = fs::read(&expected).unwrap();

        let second = process_window(&job(0), &ctx, &load).unwrap();
        assert_eq!(second, JobOutcome::Skipped);
        assert_eq!(reads.load(Ordering::SeqCst), 2);
        assert_eq!(fs::read(&expected).unwrap(), written);
        assert_eq!(ctx.progress.snapshot().completed, 2);
    }

    #[test]
    fn averaged_output_pins_strongest_echo() {
        let dir = tempdir().unwrap();
        let input = dir.path().join("in/20200101");
        let record = fixtures::record(&[10.0], &[(0, 20, 40.0), (0, 21, 30.0)]);
        fixtures::write(&input, "01_01_00_05_00.dat", &record);
        fixtures::write(&input, "01_01_00_05_30.dat", &record);
        let ctx = context(dir.path(), 1);

        let outcome = process_window(&job(5), &ctx, &|p: &Path| Record::load(p)).unwrap();
        let JobOutcome::Done { output, inputs } = outcome else {
            panic!("unexpected outcome {outcome:?}");
        };
        assert_eq!(inputs, 2);
        let average = Record::load(output).unwrap();
        let strongest = average.echoes().iter().find(|e| e.height == 20).unwrap();
        assert_eq!(strongest.amplitude, Some(1.0));
        let other = average.echoes().iter().find(|e| e.height == 21).unwrap();
        // written amplitudes are truncated to whole numbers
        assert!((other.amplitude.unwrap() - 30.0).abs() <= 1.0);
    }

    #[test]
    fn records_with_different_tallest_echo_are_all_averaged() {
        let dir = tempdir().unwrap();
        let input = dir.path().join("in/20200101");
        let low = fixtures::record(&[10.0], &[(0, 20, 40.0), (0, 500, 30.0)]);
        let high = fixtures::record(&[10.0], &[(0, 20, 40.0), (0, 510, 30.0)]);
        fixtures::write(&input, "01_01_00_00_00.dat", &low);
        fixtures::write(&input, "01_01_00_00_15.dat", &high);
        let ctx = context(dir.path(), 1);

        let outcome = process_window(&job(0), &ctx, &|p: &Path| Record::load(p)).unwrap();
        let JobOutcome::Done { inputs, output } = outcome else {
            panic!("unexpected outcome {outcome:?}");
        };
        assert_eq!(inputs, 2);
        let average = Record::load(output).unwrap();
        let heights: Vec<_> = average.echoes().iter().map(|e| e.height).collect();
        assert!(heights.contains(&500));
        assert!(heights.contains(&510));
    }

    #[test]
    fn misaligned_records_fail_only_their_window() {
        let dir = tempdir().unwrap();
        let input = dir.path().join("in/20200101");
        let narrow = fixtures::record(&[10.0], &[(0, 20, 40.0)]);
        let wide = fixtures::record(&[10.0, 9.0], &[(1, 20, 40.0)]);
        fixtures::write(&input, "01_01_00_00_00.dat", &narrow);
        fixtures::write(&input, "01_01_00_00_15.dat", &wide);
        fixtures::write(&input, "01_01_00_05_00.dat", &narrow);
        let jobs = [job(0), job(5)];
        let ctx = context(dir.path(), jobs.len());

        let report = run_all(&jobs, &ctx, 2, |p: &Path| Record::load(p)).unwrap();
        assert_eq!(report.failed, 1);
        assert_eq!(report.done, 1);
        assert_eq!(ctx.progress.snapshot().completed, 2);
        assert!(!dir.path().join("out/01/01_01_00_00_00.dat").exists());
        assert!(dir.path().join("out/01/01_01_00_05_00.dat").exists());
    }

    #[test]
    fn empty_window_is_aborted_without_output() {
        let dir = tempdir().unwrap();
        let ctx = context(dir.path(), 1);
        let outcome = process_window(&job(10), &ctx, &|p: &Path| Record::load(p)).unwrap();
        assert_eq!(outcome, JobOutcome::EmptyAborted);
        assert!(!dir.path().join("out").exists());
        assert_eq!(ctx.progress.snapshot().completed, 1);
    }

    #[test]
    fn unreadable_source_only_drops_that_file() {
        let dir = tempdir().unwrap();
        let input = dir.path().join("in/20200101");
        let record = fixtures::record(&[10.0], &[(0, 20, 40.0)]);
        fixtures::write(&input, "01_01_00_00_00.dat", &record);
        fs::write(input.join("01_01_00_00_15.dat"), b"garbage").unwrap();
        let ctx = context(dir.path(), 1);
        let outcome = process_window(&job(0), &ctx, &|p: &Path| Record::load(p)).unwrap();
        assert!(matches!(outcome, JobOutcome::Done { inputs: 1, .. }));
    }

    #[test]
    fn overwrite_replaces_existing_output() {
        let dir = tempdir().unwrap();
        let input = dir.path().join("in/20200101");
        let record = fixtures::record(&[10.0], &[(0, 20, 40.0)]);
        fixtures::write(&input, "01_01_00_00_00.dat", &record);
        let output = dir.path().join("out/01/01_01_00_00_00.dat");
        fs::create_dir_all(output.parent().unwrap()).unwrap();
        fs::write(&output, b"stale").unwrap();

        let mut ctx = context(dir.path(), 1);
        ctx.overwrite = true;
        let outcome = process_window(&job(0), &ctx, &|p: &Path| Record::load(p)).unwrap();
        assert!(matches!(outcome, JobOutcome::Done { .. }));
        assert!(Record::load(&output).is_ok());
    }

    #[test]
    fn cancelled_jobs_do_not_advance_progress() {
        let dir = tempdir().unwrap();
        let ctx = context(dir.path(), 3);
        ctx.cancel.store(true, Ordering::SeqCst);
        let reads = AtomicUsize::new(0);
        let jobs = [job(0), job(5), job(10)];
        let report = run_all(&jobs, &ctx, 2, counting_loader(&reads)).unwrap();
        assert_eq!(report.cancelled, 3);
        assert_eq!(report.completed(), 0);
        assert_eq!(ctx.progress.snapshot().completed, 0);
        assert_eq!(reads.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn pool_processes_every_window_once() {
        let dir = tempdir().unwrap();
        let input = dir.path().join("in/20200101");
        let record = fixtures::record(&[10.0], &[(0, 20, 40.0)]);
        for minute in [0, 5, 10] {
            let name = format!("01_01_00_{minute:02}_00.dat");
            fixtures::write(&input, &name, &record);
        }
        let jobs: Vec<_> = (0..60).step_by(5).map(job).collect();
        let ctx = context(dir.path(), jobs.len());
        let report = run_all(&jobs, &ctx, 4, |p: &Path| Record::load(p)).unwrap();
        assert_eq!(report.done, 3);
        assert_eq!(report.empty, 9);
        assert_eq!(ctx.progress.snapshot().completed, jobs.len());
    }
}
