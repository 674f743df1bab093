use std::fmt;
use std::fs;
use std::io::{self, Write};
use std::path::Path;

use bytes::{BufMut, BytesMut};
use chrono::NaiveDateTime;
use serde::Serialize;
use tempfile::NamedTempFile;
use tracing::{debug, warn};

use crate::calibration::Calibration;
use crate::codec::{self, Echo, NoiseSample, DELIMITER};
use crate::error::{CodecError, Result};
use crate::passport::{Field, FieldKey, Passport, DATE_TIME_FORMAT};

/// Cluster headers carry `index + 1` in 15 bits.
const MAX_FREQUENCY_COUNT: usize = 0x7FFF;
/// Echo heights travel in a 16-bit word.
const MAX_HEIGHT_INDEX: usize = u16::MAX as usize;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteMode {
    CreateNew,
    Overwrite,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteOutcome {
    Written,
    AlreadyExists,
}

/// A decoded ionogram: passport, per-frequency noise and sparse echoes.
#[derive(Debug, Clone)]
pub struct Record {
    pub(crate) passport: Passport,
    pub(crate) calibration: Calibration,
    pub(crate) noise: Vec<NoiseSample>,
    pub(crate) echoes: Vec<Echo>,
}

impl Record {
    pub fn from_parts(
        passport: Passport,
        noise: Vec<NoiseSample>,
        echoes: Vec<Echo>,
    ) -> Result<Self> {
        let max_height_index = echoes
            .iter()
            .map(|e| e.height)
            .max()
            .ok_or(CodecError::NoEchoes)?;
        let calibration = Calibration::derive(&passport, max_height_index)?;

        let count = calibration.frequency_count;
        if count > MAX_FREQUENCY_COUNT {
            return Err(CodecError::OutOfRange {
                what: "frequency count",
                value: count as i64,
            }
            .into());
        }
        if max_height_index > MAX_HEIGHT_INDEX {
            return Err(CodecError::OutOfRange {
                what: "echo height index",
                value: max_height_index as i64,
            }
            .into());
        }
        let out_of_range = noise
            .iter()
            .map(|n| n.frequency)
            .chain(echoes.iter().map(|e| e.frequency))
            .find(|&index| index >= count);
        if let Some(index) = out_of_range {
            return Err(CodecError::FrequencyOutOfRange { index, count }.into());
        }
        if noise.is_empty() {
            warn!(path = passport.text(FieldKey::Path), "record holds no noise data");
        }

        Ok(Self {
            passport,
            calibration,
            noise,
            echoes,
        })
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let (header, body) = codec::split_header(bytes)?;
        let passport = Passport::parse(&codec::decode_header_text(header))?;
        let body = codec::decode_body(body)?;
        debug!(
            clusters = body.clusters,
            noise = body.noise.len(),
            echoes = body.echoes.len(),
            "decoded body"
        );
        Self::from_parts(passport, body.noise, body.echoes)
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        let header = codec::encode_header_text(&self.passport.to_text())?;
        let mut out = BytesMut::with_capacity(
            header.len() + DELIMITER.len() + 8 * self.noise.len() + 4 * self.echoes.len(),
        );
        out.put_slice(&header);
        out.put_slice(&DELIMITER);
        codec::encode_body(&mut out, &self.noise, &self.dense()?)?;
        Ok(out.to_vec())
    }

    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let bytes = fs::read(path)?;
        Self::from_bytes(&bytes)
    }

    /// Encodes fully in memory, then persists through a temporary file in the
    /// destination directory so a partial file is never visible.
    pub fn save<P: AsRef<Path>>(&self, path: P, mode: WriteMode) -> Result<WriteOutcome> {
        let path = path.as_ref();
        if mode == WriteMode::CreateNew && path.exists() {
            return Ok(WriteOutcome::AlreadyExists);
        }
        let bytes = self.to_bytes()?;
        let dir = match path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        };
        let mut file = NamedTempFile::new_in(dir)?;
        file.write_all(&bytes)?;
        file.flush()?;
        match mode {
            WriteMode::Overwrite => {
                file.persist(path)?;
            }
            WriteMode::CreateNew => match file.persist_noclobber(path) {
                Ok(_) => {}
                Err(err) if err.error.kind() == io::ErrorKind::AlreadyExists => {
                    return Ok(WriteOutcome::AlreadyExists);
                }
                Err(err) => return Err(err.into()),
            },
        }
        Ok(WriteOutcome::Written)
    }

    pub fn passport(&self) -> &Passport {
        &self.passport
    }

    pub fn calibration(&self) -> &Calibration {
        &self.calibration
    }

    pub fn noise(&self) -> &[NoiseSample] {
        &self.noise
    }

    pub fn echoes(&self) -> &[Echo] {
        &self.echoes
    }

    pub fn date_time(&self) -> NaiveDateTime {
        self.passport.date_time()
    }

    pub fn frequency_count(&self) -> usize {
        self.calibration.frequency_count
    }

    pub fn height_count(&self) -> usize {
        self.calibration.height_count
    }

    pub fn max_height_index(&self) -> usize {
        self.calibration.max_height_index
    }

    pub fn resolution(&self) -> u32 {
        self.calibration.resolution()
    }

    pub fn frequencies(&self) -> impl Iterator<Item = f64> + Clone {
        self.calibration.frequencies()
    }

    pub fn heights(&self) -> impl Iterator<Item = f64> + Clone {
        self.calibration.heights()
    }

    pub fn noise_floor(&self, frequency: usize) -> Option<f64> {
        self.noise
            .get(frequency)
            .filter(|n| n.frequency == frequency)
            .map(|n| n.level)
    }

    /// Height × frequency view of the echoes. Later echoes win on duplicate
    /// cells; echoes outside the grid are left out.
    pub fn dense(&self) -> std::result::Result<DenseMatrix, CodecError> {
        let mut matrix = DenseMatrix::new(self.height_count(), self.frequency_count())?;
        for echo in &self.echoes {
            if echo.height < matrix.heights && echo.frequency < matrix.frequencies {
                matrix.set(echo.height, echo.frequency, echo.amplitude);
            }
        }
        Ok(matrix)
    }

    pub fn summary(&self) -> RecordSummary<'_> {
        RecordSummary {
            timestamp: self.date_time().format(DATE_TIME_FORMAT).to_string(),
            path: self.passport.text(FieldKey::Path),
            mode: self.passport.text(FieldKey::Mode),
            resolution: self.resolution(),
            calibration: self.calibration,
            noise_samples: self.noise.len(),
            echoes: self.echoes.iter().filter(|e| e.amplitude.is_some()).count(),
            missing_echoes: self.echoes.iter().filter(|e| e.amplitude.is_none()).count(),
            passport: self.passport.fields(),
        }
    }
}

impl fmt::Display for Record {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}\n{} UT",
            self.passport.text(FieldKey::Path),
            self.date_time().format(DATE_TIME_FORMAT)
        )
    }
}

#[derive(Debug, Serialize)]
pub struct RecordSummary<'a> {
    pub timestamp: String,
    pub path: &'a str,
    pub mode: &'a str,
    pub resolution: u32,
    pub calibration: Calibration,
    pub noise_samples: usize,
    pub echoes: usize,
    pub missing_echoes: usize,
    pub passport: &'a [Field],
}

/// Dense amplitude grid, row-major by height. `None` marks "no data".
#[derive(Debug, Clone, PartialEq)]
pub struct DenseMatrix {
    heights: usize,
    frequencies: usize,
    cells: Vec<Option<f64>>,
}

impl DenseMatrix {
    pub fn new(heights: usize, frequencies: usize) -> std::result::Result<Self, CodecError> {
        let len = heights
            .checked_mul(frequencies)
            .ok_or(CodecError::OutOfRange {
                what: "dense grid size",
                value: i64::MAX,
            })?;
        Ok(Self {
            heights,
            frequencies,
            cells: vec![None; len],
        })
    }

    /// `(heights, frequencies)`
    pub fn dims(&self) -> (usize, usize) {
        (self.heights, self.frequencies)
    }

    pub fn get(&self, height: usize, frequency: usize) -> Option<f64> {
        if height >= self.heights || frequency >= self.frequencies {
            return None;
        }
        self.cells[height * self.frequencies + frequency]
    }

    pub(crate) fn set(&mut self, height: usize, frequency: usize, value: Option<f64>) {
        self.cells[height * self.frequencies + frequency] = value;
    }

    pub fn row(&self, height: usize) -> &[Option<f64>] {
        let start = height * self.frequencies;
        &self.cells[start..start + self.frequencies]
    }

    /// Present cells of one frequency column in ascending height order.
    pub fn column(&self, frequency: usize) -> impl Iterator<Item = (usize, f64)> + '_ {
        (0..self.heights).filter_map(move |h| self.get(h, frequency).map(|v| (h, v)))
    }

    pub fn present(&self) -> usize {
        self.cells.iter().filter(|c| c.is_some()).count()
    }
}

#[cfg(test)]
pub(crate) fn sample_record(noise: &[f64], echoes: &[(usize, usize, f64)]) -> Record {
    use crate::passport::{sample_fields, FieldValue};

    let mut fields = sample_fields();
    // one frequency bin per noise entry
    let freq_n = 1000 + 50 * noise.len() as i64;
    fields[6] = Field::new(FieldKey::FreqN, FieldValue::Int(freq_n)).with_units("кГц");
    let passport = Passport::from_fields(fields).unwrap();
    let noise = noise
        .iter()
        .enumerate()
        .map(|(frequency, &level)| NoiseSample { frequency, level })
        .collect();
    let echoes = echoes
        .iter()
        .map(|&(f, h, a)| Echo::new(f, h, a))
        .collect();
    Record::from_parts(passport, noise, echoes).unwrap()
}
