mod calibration;
mod codec;
mod error;
mod filename;
mod merge;
mod passport;
mod record;

pub use calibration::{
    Calibration, HIGH_RESOLUTION, LIGHT_SPEED, LOW_RESOLUTION, OBLIQUE_MODE, VERTICAL_MODE,
};
pub use codec::{
    decode_body, decode_header_text, encode_body, encode_header_text, split_header, Body, Echo,
    NoiseSample, ALIGN, CLUSTER_FLAG, DELIMITER,
};
pub use error::{CodecError, IonError, MergeError, PassportError, Result};
pub use filename::SlotName;
pub use merge::{db_sum, to_db, to_linear, REFERENCE_AMPLITUDE};
pub use passport::{
    Field, FieldKey, FieldKind, FieldSpec, FieldValue, Passport, DATE_TIME_FORMAT, FIELDS,
};
pub use record::{DenseMatrix, Record, RecordSummary, WriteMode, WriteOutcome};
