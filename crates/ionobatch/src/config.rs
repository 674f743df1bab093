use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{anyhow, bail, Context, Result};
use chrono::{Datelike, NaiveDate};
use serde::Deserialize;
use tracing::info;

use crate::cli::RunArgs;

pub const ENV_DATE_FROM: &str = "IONOBATCH_DATE_FROM";
pub const ENV_DATE_TO: &str = "IONOBATCH_DATE_TO";
pub const ENV_DELTA_MINUTES: &str = "IONOBATCH_DELTA_MINUTES";
pub const ENV_FOLDER_IN: &str = "IONOBATCH_FOLDER_IN";
pub const ENV_FOLDER_OUT: &str = "IONOBATCH_FOLDER_OUT";

const DATE_FORMAT: &str = "%Y-%m-%d";

/// Raw `ionobatch.toml`; every key may still come from the environment.
#[derive(Debug, Default, Clone, Deserialize)]
pub struct FileConfig {
    pub date_from: Option<NaiveDate>,
    pub date_to: Option<NaiveDate>,
    pub input_dir: Option<String>,
    pub output_dir: Option<String>,
    pub window_minutes: Option<u32>,
    pub start_second: Option<u32>,
    pub workers: Option<usize>,
    #[serde(default)]
    pub check_resolution: bool,
    #[serde(default)]
    pub overwrite: bool,
}

/// A missing file is not an error; the environment may carry everything.
pub fn load(path: &Path) -> Result<FileConfig> {
    if !path.exists() {
        return Ok(FileConfig::default());
    }
    let contents = fs::read_to_string(path)
        .with_context(|| format!("failed to read config {}", path.display()))?;
    toml::from_str(&contents).map_err(|e| anyhow!("invalid config {}: {e}", path.display()))
}

impl FileConfig {
    pub fn apply_env(&mut self) -> Result<()> {
        self.apply_env_with(|key| env::var(key).ok())
    }

    pub fn apply_env_with<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        let lookup = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());
        if let Some(raw) = lookup(ENV_DATE_FROM) {
            self.date_from = Some(parse_date(ENV_DATE_FROM, &raw)?);
        }
        if let Some(raw) = lookup(ENV_DATE_TO) {
            self.date_to = Some(parse_date(ENV_DATE_TO, &raw)?);
        }
        if let Some(raw) = lookup(ENV_DELTA_MINUTES) {
            let minutes = raw
                .trim()
                .parse()
                .with_context(|| format!("{ENV_DELTA_MINUTES}={raw:?} is not a number"))?;
            self.window_minutes = Some(minutes);
        }
        if let Some(raw) = lookup(ENV_FOLDER_IN) {
            self.input_dir = Some(raw);
        }
        if let Some(raw) = lookup(ENV_FOLDER_OUT) {
            self.output_dir = Some(raw);
        }
        Ok(())
    }

    pub fn apply_run_args(&mut self, args: &RunArgs) {
        if args.workers.is_some() {
            self.workers = args.workers;
        }
        self.check_resolution |= args.check;
        self.overwrite |= args.overwrite;
    }

    pub fn resolve(self) -> Result<BatchConfig> {
        let date_from = self
            .date_from
            .ok_or_else(|| missing("date_from", ENV_DATE_FROM))?;
        let date_to = self.date_to.ok_or_else(|| missing("date_to", ENV_DATE_TO))?;
        let input_dir = self
            .input_dir
            .ok_or_else(|| missing("input_dir", ENV_FOLDER_IN))?;
        let output_dir = self
            .output_dir
            .ok_or_else(|| missing("output_dir", ENV_FOLDER_OUT))?;
        let window_minutes = self
            .window_minutes
            .ok_or_else(|| missing("window_minutes", ENV_DELTA_MINUTES))?;

        if !(1..=60).contains(&window_minutes) {
            bail!("window_minutes must be within 1..=60, got {window_minutes}");
        }
        if date_from > date_to {
            bail!("date_from {date_from} is after date_to {date_to}");
        }
        if let Some(second) = self.start_second {
            if second >= 60 {
                bail!("start_second must be below 60, got {second}");
            }
        }
        if self.workers == Some(0) {
            bail!("workers must be at least 1");
        }

        Ok(BatchConfig {
            date_from,
            date_to,
            input_dir: PathTemplate::new(input_dir),
            output_dir: PathTemplate::new(output_dir),
            window_minutes,
            start_second: self.start_second,
            workers: self.workers,
            check_resolution: self.check_resolution,
            overwrite: self.overwrite,
        })
    }
}

fn missing(key: &str, env_key: &str) -> anyhow::Error {
    anyhow!("missing `{key}`: set it in the config file or via {env_key}")
}

fn parse_date(key: &str, raw: &str) -> Result<NaiveDate> {
    NaiveDate::parse_from_str(raw.trim(), DATE_FORMAT)
        .with_context(|| format!("{key}={raw:?} is not a YYYY-MM-DD date"))
}

/// Directory template with `{YEAR}`, `{MONTH}` and `{DAY}` placeholders.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathTemplate(String);

impl PathTemplate {
    pub fn new(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    pub fn render(&self, date: NaiveDate) -> PathBuf {
        PathBuf::from(
            self.0
                .replace("{YEAR}", &format!("{:02}", date.year()))
                .replace("{MONTH}", &format!("{:02}", date.month()))
                .replace("{DAY}", &format!("{:02}", date.day())),
        )
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

#[derive(Debug, Clone)]
pub struct BatchConfig {
    pub date_from: NaiveDate,
    pub date_to: NaiveDate,
    pub input_dir: PathTemplate,
    pub output_dir: PathTemplate,
    pub window_minutes: u32,
    pub start_second: Option<u32>,
    pub workers: Option<usize>,
    pub check_resolution: bool,
    pub overwrite: bool,
}

impl BatchConfig {
    /// Every calendar day of the range, both ends included.
    pub fn days(&self) -> impl Iterator<Item = NaiveDate> + Clone {
        let last = self.date_to;
        self.date_from.iter_days().take_while(move |day| *day <= last)
    }

    pub fn log_summary(&self) {
        info!(
            date_from = %self.date_from,
            date_to = %self.date_to,
            window_minutes = self.window_minutes,
            input_dir = self.input_dir.as_str(),
            output_dir = self.output_dir.as_str(),
            "batch configuration"
        );
    }
}
