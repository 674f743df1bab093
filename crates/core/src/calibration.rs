use serde::Serialize;

use crate::error::PassportError;
use crate::passport::{FieldKey, Passport};

pub const LIGHT_SPEED: f64 = 3.0e8;

/// Oblique (transmission) sounding: one-way propagation path.
pub const OBLIQUE_MODE: &str = "НЗ";
/// Vertical sounding: two-way propagation path.
pub const VERTICAL_MODE: &str = "ВЗ";

pub const LOW_RESOLUTION: u32 = 512;
pub const HIGH_RESOLUTION: u32 = 1024;

/// Scan geometry derived from the passport and the tallest observed echo.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Calibration {
    pub frequency_count: usize,
    pub first_delay: f64,
    pub max_height: f64,
    pub max_height_index: usize,
    pub height_step: f64,
    pub height_count: usize,
    freq0: f64,
    freq_step: f64,
}

impl Calibration {
    pub fn derive(passport: &Passport, max_height_index: usize) -> Result<Self, PassportError> {
        let freq0 = passport.int(FieldKey::Freq0);
        let freq_n = passport.int(FieldKey::FreqN);
        let freq_step = passport.int(FieldKey::FreqStep);
        let chirp_rate = passport.int(FieldKey::ChirpRate);
        let band_width = passport.int(FieldKey::BandWidth);
        let delay = passport.int(FieldKey::Delay);

        if freq_step <= 0 {
            return Err(PassportError::Geometry("frequency step must be positive"));
        }
        if freq_n < freq0 {
            return Err(PassportError::Geometry("final frequency precedes the initial one"));
        }
        if chirp_rate == 0 {
            return Err(PassportError::Geometry("chirp rate is zero"));
        }
        if max_height_index == 0 {
            return Err(PassportError::Geometry("maximum height index is zero"));
        }

        let frequency_count = ((freq_n - freq0) as f64 / freq_step as f64).trunc() as usize;
        let first_delay = delay as f64 * LIGHT_SPEED / 1000.0 / 1000.0;
        let one_way = LIGHT_SPEED * band_width as f64 / chirp_rate as f64 / 1000.0;
        let max_height = if passport.text(FieldKey::Mode) == OBLIQUE_MODE {
            one_way
        } else {
            one_way / 2.0
        };
        let height_step = max_height / max_height_index as f64 / 1000.0;

        Ok(Self {
            frequency_count,
            first_delay,
            max_height,
            max_height_index,
            height_step,
            height_count: max_height_index + 1,
            freq0: freq0 as f64,
            freq_step: freq_step as f64,
        })
    }

    /// Same scan with the height grid stretched or shrunk to `max_height_index`.
    pub(crate) fn with_max_height_index(self, max_height_index: usize) -> Self {
        Self {
            max_height_index,
            height_step: self.max_height / max_height_index as f64 / 1000.0,
            height_count: max_height_index + 1,
            ..self
        }
    }

    /// Frequency bin edges in MHz, `frequency_count + 1` points.
    pub fn frequencies(&self) -> impl Iterator<Item = f64> + Clone {
        let (freq0, step) = (self.freq0, self.freq_step);
        (0..=self.frequency_count).map(move |i| (freq0 + i as f64 * step) / 1000.0)
    }

    /// Height bin edges, `height_count + 1` points.
    pub fn heights(&self) -> impl Iterator<Item = f64> + Clone {
        let (first, step) = (self.first_delay, self.height_step);
        (0..=self.height_count).map(move |i| first + i as f64 * step)
    }

    pub fn resolution(&self) -> u32 {
        if self.max_height_index > LOW_RESOLUTION as usize {
            HIGH_RESOLUTION
        } else {
            LOW_RESOLUTION
        }
    }

    /// Height spacing ratio used by the coarse compatibility check.
    pub fn height_ratio(&self) -> f64 {
        self.max_height / self.max_height_index as f64
    }
}
