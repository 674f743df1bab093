use thiserror::Error;

use crate::passport::FieldKey;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum PassportError {
    #[error("passport field `{0}` is missing")]
    MissingField(FieldKey),
    #[error("passport field `{key}` has non-numeric value {value:?}")]
    NotNumeric { key: FieldKey, value: String },
    #[error("passport field `{0}` holds a value of the wrong kind")]
    WrongKind(FieldKey),
    #[error("passport date/time {0:?} does not match dd.mm.yyyy HH:MM:SS")]
    DateTime(String),
    #[error("passport geometry is degenerate: {0}")]
    Geometry(&'static str),
    #[error("passport text cannot be represented in IBM866: {0:?}")]
    Unmappable(String),
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CodecError {
    #[error("header delimiter (four null bytes) not found")]
    MissingDelimiter,
    #[error("truncated body: {remaining} byte(s) left at offset {offset}")]
    Truncated { offset: usize, remaining: usize },
    #[error("sample group at offset {offset} precedes the first cluster header")]
    SampleBeforeCluster { offset: usize },
    #[error("body holds no echo samples")]
    NoEchoes,
    #[error("frequency index {index} out of range (frequency count {count})")]
    FrequencyOutOfRange { index: usize, count: usize },
    #[error("{what} {value} cannot be encoded")]
    OutOfRange { what: &'static str, value: i64 },
    #[error("no noise level for frequency index {0}")]
    MissingNoise(usize),
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum MergeError {
    #[error("noise vectors differ in length ({left} vs {right})")]
    NoiseLengthMismatch { left: usize, right: usize },
    #[error("no aligned noise entry for frequency index {0}")]
    MissingNoise(usize),
    #[error("divisor must be finite and positive, got {0}")]
    InvalidDivisor(f64),
    #[error("nothing to merge")]
    Empty,
}

#[derive(Error, Debug)]
pub enum IonError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("passport error: {0}")]
    Passport(#[from] PassportError),
    #[error("codec error: {0}")]
    Codec(#[from] CodecError),
    #[error("merge error: {0}")]
    Merge(#[from] MergeError),
}

pub type Result<T> = std::result::Result<T, IonError>;

impl From<tempfile::PersistError> for IonError {
    fn from(value: tempfile::PersistError) -> Self {
        Self::Io(value.error)
    }
}
