//! Merge algebra on records. Amplitudes and noise live in the dB domain;
//! combining two values sums them in linear amplitude and converts back.

use std::collections::{HashMap, HashSet};
use std::ops::{Add, Div};

use crate::codec::Echo;
use crate::error::MergeError;
use crate::passport::FieldKey;
use crate::record::Record;

const HEIGHT_RATIO_TOLERANCE: f64 = 0.01;
/// Amplitude given to the strongest echo after division.
pub const REFERENCE_AMPLITUDE: f64 = 1.0;

pub fn to_linear(db: f64) -> f64 {
    10f64.powf(db / 20.0)
}

pub fn to_db(linear: f64) -> f64 {
    20.0 * linear.log10()
}

pub fn db_sum(a: f64, b: f64) -> f64 {
    to_db(to_linear(a) + to_linear(b))
}

/// `==` is [`Record::is_compatible`]. It compares scan geometry with a
/// tolerance, so it is not transitive.
impl PartialEq for Record {
    fn eq(&self, other: &Self) -> bool {
        self.is_compatible(other)
    }
}

impl Add<&Record> for &Record {
    type Output = Result<Record, MergeError>;

    fn add(self, other: &Record) -> Self::Output {
        self.checked_add(other)
    }
}

impl Div<f64> for &Record {
    type Output = Result<Record, MergeError>;

    fn div(self, k: f64) -> Self::Output {
        self.checked_div(k)
    }
}

impl Record {
    /// Coarse geometry check: same frequency grid and delay, height step
    /// within a small tolerance. Samples are not compared.
    pub fn is_compatible(&self, other: &Record) -> bool {
        let same_key = |key| self.passport.int(key) == other.passport.int(key);
        self.noise.len() == other.noise.len()
            && same_key(FieldKey::Freq0)
            && same_key(FieldKey::FreqN)
            && same_key(FieldKey::FreqStep)
            && same_key(FieldKey::Delay)
            && (self.calibration.height_ratio() - other.calibration.height_ratio()).abs()
                <= HEIGHT_RATIO_TOLERANCE
    }

    /// `self += other`: noise is power-summed per frequency, then every echo
    /// of either operand is kept only while it stays above the updated noise
    /// floor. Matching cells are power-summed first.
    pub fn checked_add_assign(&mut self, other: &Record) -> Result<(), MergeError> {
        if self.noise.len() != other.noise.len() {
            return Err(MergeError::NoiseLengthMismatch {
                left: self.noise.len(),
                right: other.noise.len(),
            });
        }
        for (index, (mine, theirs)) in self.noise.iter().zip(&other.noise).enumerate() {
            if mine.frequency != index || theirs.frequency != index {
                return Err(MergeError::MissingNoise(index));
            }
        }
        if let Some(echo) = self
            .echoes
            .iter()
            .chain(&other.echoes)
            .find(|e| e.frequency >= self.noise.len())
        {
            return Err(MergeError::MissingNoise(echo.frequency));
        }

        for (mine, theirs) in self.noise.iter_mut().zip(&other.noise) {
            mine.level = db_sum(mine.level, theirs.level);
        }

        let own = self.echoes.len();
        let mut touched: HashSet<usize> = HashSet::new();
        let mut slots: Vec<Option<Echo>> = self.echoes.drain(..).map(Some).collect();
        let mut index: HashMap<(usize, usize), usize> = slots
            .iter()
            .enumerate()
            .filter_map(|(i, slot)| slot.map(|e| (e.key(), i)))
            .collect();

        for echo in &other.echoes {
            let floor = self.noise[echo.frequency].level;
            match index.get(&echo.key()).copied() {
                Some(pos) => {
                    touched.insert(pos);
                    let existing = slots[pos].and_then(|e| e.amplitude);
                    let sum = existing
                        .zip(echo.amplitude)
                        .map(|(a, b)| db_sum(a, b))
                        .filter(|sum| *sum > floor);
                    match sum {
                        Some(sum) => {
                            if let Some(slot) = slots[pos].as_mut() {
                                slot.amplitude = Some(sum);
                            }
                        }
                        None => {
                            slots[pos] = None;
                            index.remove(&echo.key());
                        }
                    }
                }
                None => {
                    if echo.amplitude.map_or(false, |a| a > floor) {
                        index.insert(echo.key(), slots.len());
                        slots.push(Some(*echo));
                    }
                }
            }
        }

        for (pos, slot) in slots.iter_mut().enumerate().take(own) {
            if touched.contains(&pos) {
                continue;
            }
            let above = slot.map_or(false, |e| {
                e.amplitude
                    .map_or(false, |a| a > self.noise[e.frequency].level)
            });
            if !above {
                *slot = None;
            }
        }

        self.echoes = slots.into_iter().flatten().collect();
        // height grid covers the taller operand so no echo falls off on encode
        let tallest = self.max_height_index().max(other.max_height_index());
        if tallest != self.max_height_index() {
            self.calibration = self.calibration.with_max_height_index(tallest);
        }
        Ok(())
    }

    /// Non-mutating `self + other`.
    pub fn checked_add(&self, other: &Record) -> Result<Record, MergeError> {
        let mut sum = self.clone();
        sum.checked_add_assign(other)?;
        Ok(sum)
    }

    /// `self / k`: everything drops by `dB(k)`, noise is clamped at zero, the
    /// strongest echo is pinned to [`REFERENCE_AMPLITUDE`] and echoes pushed
    /// below zero are marked missing.
    pub fn checked_div(&self, k: f64) -> Result<Record, MergeError> {
        if !k.is_finite() || k <= 0.0 {
            return Err(MergeError::InvalidDivisor(k));
        }
        let shift = to_db(k);
        let mut out = self.clone();

        for noise in &mut out.noise {
            noise.level = (noise.level - shift).max(0.0);
        }

        let strongest = strongest_echo(&out.echoes);
        for (i, echo) in out.echoes.iter_mut().enumerate() {
            echo.amplitude = if Some(i) == strongest {
                Some(REFERENCE_AMPLITUDE)
            } else {
                echo.amplitude.map(|a| a - shift).filter(|a| *a >= 0.0)
            };
        }
        Ok(out)
    }

    /// Folds `records` with `+=` from the first one and divides by their count.
    pub fn average<'a, I>(records: I) -> Result<Record, MergeError>
    where
        I: IntoIterator<Item = &'a Record>,
    {
        let mut iter = records.into_iter();
        let mut sum = iter.next().ok_or(MergeError::Empty)?.clone();
        let mut count = 1usize;
        for record in iter {
            sum.checked_add_assign(record)?;
            count += 1;
        }
        sum.checked_div(count as f64)
    }
}

/// Position of the first echo holding the maximum present amplitude.
fn strongest_echo(echoes: &[Echo]) -> Option<usize> {
    let mut best: Option<(usize, f64)> = None;
    for (i, echo) in echoes.iter().enumerate() {
        let Some(amplitude) = echo.amplitude else {
            continue;
        };
        if best.map_or(true, |(_, top)| amplitude > top) {
            best = Some((i, amplitude));
        }
    }
    best.map(|(i, _)| i)
}
