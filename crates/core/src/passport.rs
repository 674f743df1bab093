use std::fmt;

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

use crate::error::PassportError;

pub const DATE_TIME_FORMAT: &str = "%d.%m.%Y %H:%M:%S";

const SEPARATOR: &str = ": ";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldKey {
    Date,
    Time,
    Path,
    Mode,
    Delay,
    Freq0,
    #[serde(rename = "freqN")]
    FreqN,
    ChirpRate,
    BandWidth,
    Antenna,
    Adc,
    FreqStep,
    AmplCoef,
    Latitude,
    Longitude,
    Height,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    Text,
    Int,
    Float,
}

#[derive(Debug, Clone, Copy)]
pub struct FieldSpec {
    pub key: FieldKey,
    pub name: &'static str,
    pub description: &'static str,
    pub kind: FieldKind,
}

/// Passport vocabulary in header order. A field's position equals its
/// `FieldKey` discriminant.
pub static FIELDS: [FieldSpec; 16] = [
    spec(FieldKey::Date, "date", "Дата", FieldKind::Text),
    spec(FieldKey::Time, "time", "Время начала сеанса", FieldKind::Text),
    spec(FieldKey::Path, "path", "Трасса зондирования", FieldKind::Text),
    spec(FieldKey::Mode, "mode", "Режим", FieldKind::Text),
    spec(FieldKey::Delay, "delay", "Задержка", FieldKind::Int),
    spec(FieldKey::Freq0, "freq0", "Начальная частота", FieldKind::Int),
    spec(FieldKey::FreqN, "freqN", "Конечная частота", FieldKind::Int),
    spec(FieldKey::ChirpRate, "chirp_rate", "Скорость сканирования", FieldKind::Int),
    spec(FieldKey::BandWidth, "band_width", "Полоса анализа", FieldKind::Int),
    spec(FieldKey::Antenna, "antenna", "Антенна", FieldKind::Text),
    spec(FieldKey::Adc, "adc", "Номер АЦП", FieldKind::Int),
    spec(
        FieldKey::FreqStep,
        "freq_step",
        "Дискретность по частоте зондирования",
        FieldKind::Int,
    ),
    spec(FieldKey::AmplCoef, "ampl_coef", "Коэффициент усиления", FieldKind::Int),
    spec(FieldKey::Latitude, "latitude", "Широта пункта приёма", FieldKind::Float),
    spec(FieldKey::Longitude, "longitude", "Долгота пункта приёма", FieldKind::Float),
    spec(FieldKey::Height, "height", "Высота пункта приёма", FieldKind::Float),
];

const fn spec(
    key: FieldKey,
    name: &'static str,
    description: &'static str,
    kind: FieldKind,
) -> FieldSpec {
    FieldSpec {
        key,
        name,
        description,
        kind,
    }
}

impl FieldKey {
    pub fn spec(self) -> &'static FieldSpec {
        &FIELDS[self as usize]
    }

    pub fn name(self) -> &'static str {
        self.spec().name
    }

    pub fn kind(self) -> FieldKind {
        self.spec().kind
    }
}

impl fmt::Display for FieldKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FieldValue {
    Int(i64),
    Float(f64),
    Text(String),
}

impl FieldValue {
    pub fn kind(&self) -> FieldKind {
        match self {
            FieldValue::Text(_) => FieldKind::Text,
            FieldValue::Int(_) => FieldKind::Int,
            FieldValue::Float(_) => FieldKind::Float,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            FieldValue::Text(value) => Some(value),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            FieldValue::Int(value) => Some(*value),
            _ => None,
        }
    }

    pub fn as_float(&self) -> Option<f64> {
        match self {
            FieldValue::Float(value) => Some(*value),
            FieldValue::Int(value) => Some(*value as f64),
            FieldValue::Text(_) => None,
        }
    }
}

impl fmt::Display for FieldValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldValue::Text(value) => f.write_str(value),
            FieldValue::Int(value) => write!(f, "{value}"),
            FieldValue::Float(value) => write!(f, "{value:.4}"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Field {
    pub key: FieldKey,
    pub value: FieldValue,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub units: String,
}

impl Field {
    pub fn new(key: FieldKey, value: FieldValue) -> Self {
        Self {
            key,
            value,
            units: String::new(),
        }
    }

    pub fn with_units(mut self, units: impl Into<String>) -> Self {
        self.units = units.into();
        self
    }
}

/// Typed header of an ionogram file. Always complete: every field of
/// [`FIELDS`] is present with a value of its declared kind.
#[derive(Debug, Clone, PartialEq)]
pub struct Passport {
    fields: Vec<Field>,
    date_time: NaiveDateTime,
}

impl Passport {
    pub fn parse(text: &str) -> Result<Self, PassportError> {
        let mut raw: Vec<Option<(String, String)>> = vec![None; FIELDS.len()];
        for line in text.lines().filter(|line| !line.trim().is_empty()) {
            for spec in FIELDS.iter() {
                if !line.contains(spec.description) {
                    continue;
                }
                let Some(idx) = line.find(SEPARATOR) else {
                    continue;
                };
                let rest = &line[idx + SEPARATOR.len()..];
                raw[spec.key as usize] = Some(match spec.kind {
                    FieldKind::Text => (rest.trim().to_string(), String::new()),
                    FieldKind::Int | FieldKind::Float => split_value_units(rest),
                });
            }
        }

        let mut fields = Vec::with_capacity(FIELDS.len());
        let mut pending = Vec::with_capacity(FIELDS.len());
        for (spec, entry) in FIELDS.iter().zip(raw) {
            let (value, units) = entry.ok_or(PassportError::MissingField(spec.key))?;
            pending.push((spec, value, units));
        }

        // date/time is validated before numeric casts
        let date_time = parse_date_time(&pending[0].1, &pending[1].1)?;

        for (spec, value, units) in pending {
            let value = cast(spec, value)?;
            fields.push(Field {
                key: spec.key,
                value,
                units,
            });
        }
        Ok(Self { fields, date_time })
    }

    pub fn from_fields(fields: Vec<Field>) -> Result<Self, PassportError> {
        let mut ordered: Vec<Option<Field>> = vec![None; FIELDS.len()];
        for field in fields {
            if field.value.kind() != field.key.kind() {
                return Err(PassportError::WrongKind(field.key));
            }
            let slot = field.key as usize;
            ordered[slot] = Some(field);
        }
        let fields = FIELDS
            .iter()
            .zip(ordered)
            .map(|(spec, field)| field.ok_or(PassportError::MissingField(spec.key)))
            .collect::<Result<Vec<_>, _>>()?;
        let date_time = parse_date_time(
            fields[FieldKey::Date as usize].value.as_text().unwrap_or_default(),
            fields[FieldKey::Time as usize].value.as_text().unwrap_or_default(),
        )?;
        Ok(Self { fields, date_time })
    }

    pub fn fields(&self) -> &[Field] {
        &self.fields
    }

    pub fn field(&self, key: FieldKey) -> &Field {
        &self.fields[key as usize]
    }

    pub fn date_time(&self) -> NaiveDateTime {
        self.date_time
    }

    // Kinds are checked on construction, so the fallbacks below never fire.
    pub fn text(&self, key: FieldKey) -> &str {
        self.field(key).value.as_text().unwrap_or_default()
    }

    pub fn int(&self, key: FieldKey) -> i64 {
        self.field(key).value.as_int().unwrap_or_default()
    }

    pub fn float(&self, key: FieldKey) -> f64 {
        self.field(key).value.as_float().unwrap_or_default()
    }

    /// Human-readable form; also the header text written ahead of the body.
    pub fn to_text(&self) -> String {
        let mut out = String::new();
        for field in &self.fields {
            out.push_str(field.key.spec().description);
            out.push(':');
            out.push(' ');
            out.push_str(&field.value.to_string());
            if !field.units.is_empty() {
                out.push(' ');
                out.push_str(&field.units);
            }
            out.push('\n');
        }
        out.push('\n');
        out
    }
}

fn split_value_units(rest: &str) -> (String, String) {
    let rest = rest.trim_start_matches(' ');
    match rest.split_once(' ') {
        Some((value, units)) => (value.trim().to_string(), units.trim().to_string()),
        None => (rest.trim().to_string(), String::new()),
    }
}

fn cast(spec: &FieldSpec, value: String) -> Result<FieldValue, PassportError> {
    let not_numeric = |value: String| PassportError::NotNumeric {
        key: spec.key,
        value,
    };
    match spec.kind {
        FieldKind::Text => Ok(FieldValue::Text(value)),
        FieldKind::Int => value
            .parse::<i64>()
            .map(FieldValue::Int)
            .map_err(|_| not_numeric(value)),
        FieldKind::Float => value
            .parse::<f64>()
            .map(FieldValue::Float)
            .map_err(|_| not_numeric(value)),
    }
}

fn parse_date_time(date: &str, time: &str) -> Result<NaiveDateTime, PassportError> {
    let time: String = time.chars().take(8).collect();
    let stamp = format!("{date} {time}");
    NaiveDateTime::parse_from_str(&stamp, DATE_TIME_FORMAT)
        .map_err(|_| PassportError::DateTime(stamp))
}

#[cfg(test)]
pub(crate) fn sample_fields() -> Vec<Field> {
    vec![
        Field::new(FieldKey::Date, FieldValue::Text("01.01.2020".into())),
        Field::new(FieldKey::Time, FieldValue::Text("00:00:00.000".into())),
        Field::new(FieldKey::Path, FieldValue::Text("Иркутск - Торы".into())),
        Field::new(FieldKey::Mode, FieldValue::Text("ВЗ".into())),
        Field::new(FieldKey::Delay, FieldValue::Int(1000)).with_units("мкс"),
        Field::new(FieldKey::Freq0, FieldValue::Int(1000)).with_units("кГц"),
        Field::new(FieldKey::FreqN, FieldValue::Int(15000)).with_units("кГц"),
        Field::new(FieldKey::ChirpRate, FieldValue::Int(100000)).with_units("Гц/с"),
        Field::new(FieldKey::BandWidth, FieldValue::Int(200)).with_units("Гц"),
        Field::new(FieldKey::Antenna, FieldValue::Text("Дельта".into())),
        Field::new(FieldKey::Adc, FieldValue::Int(1)),
        Field::new(FieldKey::FreqStep, FieldValue::Int(50)).with_units("кГц"),
        Field::new(FieldKey::AmplCoef, FieldValue::Int(20)).with_units("дБ"),
        Field::new(FieldKey::Latitude, FieldValue::Float(51.8125)).with_units("град"),
        Field::new(FieldKey::Longitude, FieldValue::Float(103.0781)).with_units("град"),
        Field::new(FieldKey::Height, FieldValue::Float(0.5)).with_units("км"),
    ]
}
