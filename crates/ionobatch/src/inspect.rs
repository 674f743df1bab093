use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{anyhow, Context, Result};
use ionogram_core::{FieldKey, Record, WriteMode, WriteOutcome};
use tracing::{info, warn};

pub fn inspect(path: &Path, json: bool) -> Result<()> {
    let record =
        Record::load(path).with_context(|| format!("failed to decode {}", path.display()))?;
    if json {
        let summary = serde_json::to_string_pretty(&record.summary())?;
        println!("{summary}");
        return Ok(());
    }
    print!("{}", describe(&record));
    Ok(())
}

fn describe(record: &Record) -> String {
    let calibration = record.calibration();
    let present = record.echoes().iter().filter(|e| e.amplitude.is_some()).count();
    format!(
        "{record}\n\n{passport}\
         frequencies: {frequencies} x {step} kHz from {freq0} kHz\n\
         heights: {heights} (max index {max_index}, step {height_step:.3} km, resolution {resolution})\n\
         noise samples: {noise}\n\
         echoes: {present} present, {missing} missing\n",
        passport = record.passport().to_text(),
        frequencies = record.frequency_count(),
        step = record.passport().int(FieldKey::FreqStep),
        freq0 = record.passport().int(FieldKey::Freq0),
        heights = record.height_count(),
        max_index = record.max_height_index(),
        height_step = calibration.height_step,
        resolution = record.resolution(),
        noise = record.noise().len(),
        missing = record.echoes().len() - present,
    )
}

/// Averages `inputs` the same way a window is averaged.
pub fn merge(inputs: &[PathBuf], output: &Path, overwrite: bool) -> Result<()> {
    let records = inputs
        .iter()
        .map(|path| {
            Record::load(path).with_context(|| format!("failed to decode {}", path.display()))
        })
        .collect::<Result<Vec<_>>>()?;
    if records.is_empty() {
        return Err(anyhow!("no input records given"));
    }
    let average = Record::average(&records).context("failed to average records")?;
    if let Some(parent) = output.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)
            .with_context(|| format!("failed to create {}", parent.display()))?;
    }
    let mode = if overwrite {
        WriteMode::Overwrite
    } else {
        WriteMode::CreateNew
    };
    match average
        .save(output, mode)
        .with_context(|| format!("failed to write {}", output.display()))?
    {
        WriteOutcome::Written => {
            info!(inputs = records.len(), output = %output.display(), "saved");
            Ok(())
        }
        WriteOutcome::AlreadyExists => {
            warn!(
                output = %output.display(),
                "destination file already exists; pass --overwrite to replace it"
            );
            Ok(())
        }
    }
}
