use bytes::{Buf, BufMut, BytesMut};
use encoding_rs::IBM866;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::{CodecError, PassportError};
use crate::record::DenseMatrix;

/// Separates the passport text from the binary body.
pub const DELIMITER: [u8; 4] = [0; 4];
/// High bit of the first byte marks a cluster header group.
pub const CLUSTER_FLAG: u8 = 0x80;
pub const ALIGN: u16 = 1;

const GROUP_LEN: usize = 4;
const NOISE_HEIGHT: u16 = 1;
const INDEX_MASK: u16 = 0x7FFF;
const HEADER_BIT: u16 = 0x8000;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct NoiseSample {
    pub frequency: usize,
    pub level: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Echo {
    pub frequency: usize,
    pub height: usize,
    /// `None` once the echo has been marked missing.
    pub amplitude: Option<f64>,
}

impl Echo {
    pub fn new(frequency: usize, height: usize, amplitude: f64) -> Self {
        Self {
            frequency,
            height,
            amplitude: Some(amplitude),
        }
    }

    pub fn key(&self) -> (usize, usize) {
        (self.frequency, self.height)
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Body {
    pub noise: Vec<NoiseSample>,
    pub echoes: Vec<Echo>,
    pub clusters: usize,
    pub align_warnings: usize,
}

pub fn split_header(bytes: &[u8]) -> Result<(&[u8], &[u8]), CodecError> {
    let pos = bytes
        .windows(DELIMITER.len())
        .position(|w| w == DELIMITER)
        .ok_or(CodecError::MissingDelimiter)?;
    Ok((&bytes[..pos], &bytes[pos + DELIMITER.len()..]))
}

pub fn decode_header_text(bytes: &[u8]) -> String {
    IBM866.decode_without_bom_handling(bytes).0.into_owned()
}

pub fn encode_header_text(text: &str) -> Result<Vec<u8>, PassportError> {
    let (bytes, _, unmappable) = IBM866.encode(text);
    if unmappable {
        return Err(PassportError::Unmappable(text.to_string()));
    }
    Ok(bytes.into_owned())
}

fn is_cluster_header(first_byte: u8) -> bool {
    first_byte & CLUSTER_FLAG == CLUSTER_FLAG
}

pub fn decode_body(body: &[u8]) -> Result<Body, CodecError> {
    let mut buf = body;
    let mut cluster: Option<usize> = None;
    let mut out = Body::default();

    while buf.has_remaining() {
        let offset = body.len() - buf.remaining();
        if buf.remaining() < GROUP_LEN {
            return Err(CodecError::Truncated {
                offset,
                remaining: buf.remaining(),
            });
        }
        let header = is_cluster_header(buf.chunk()[0]);
        let first = buf.get_u16();
        let second = buf.get_u16();

        if header {
            let index = cluster.map_or(0, |c| c + 1);
            cluster = Some(index);
            let declared = (first & INDEX_MASK) as usize;
            if declared != index + 1 {
                warn!(offset, declared, expected = index + 1, "cluster index out of sequence");
            }
            if second != ALIGN {
                warn!(offset, align = second, "ERROR in align!");
                out.align_warnings += 1;
            }
            continue;
        }

        let frequency = cluster.ok_or(CodecError::SampleBeforeCluster { offset })?;
        if second == NOISE_HEIGHT {
            out.noise.push(NoiseSample {
                frequency,
                level: f64::from(first),
            });
        } else {
            out.echoes
                .push(Echo::new(frequency, usize::from(second), f64::from(first)));
        }
    }

    out.clusters = cluster.map_or(0, |c| c + 1);
    Ok(out)
}

pub fn encode_body(
    out: &mut BytesMut,
    noise: &[NoiseSample],
    dense: &DenseMatrix,
) -> Result<(), CodecError> {
    let (_, frequency_count) = dense.dims();
    out.reserve(frequency_count * GROUP_LEN * 2);
    for frequency in 0..frequency_count {
        let declared = sample_word("cluster index", (frequency + 1) as f64)?;
        let level = noise
            .get(frequency)
            .ok_or(CodecError::MissingNoise(frequency))?
            .level;

        out.put_u16(declared | HEADER_BIT);
        out.put_u16(ALIGN);
        out.put_u16(sample_word("noise level", level)?);
        out.put_u16(ALIGN);

        for (height, amplitude) in dense.column(frequency) {
            if height == usize::from(NOISE_HEIGHT) || height > usize::from(u16::MAX) {
                return Err(CodecError::OutOfRange {
                    what: "echo height index",
                    value: height as i64,
                });
            }
            out.put_u16(sample_word("echo amplitude", amplitude)?);
            out.put_u16(height as u16);
        }
    }
    Ok(())
}

/// Truncates toward zero; the result must stay clear of the header bit.
fn sample_word(what: &'static str, value: f64) -> Result<u16, CodecError> {
    let truncated = value.trunc();
    if !truncated.is_finite() || truncated < 0.0 || truncated > f64::from(INDEX_MASK) {
        return Err(CodecError::OutOfRange {
            what,
            value: truncated as i64,
        });
    }
    Ok(truncated as u16)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn groups(words: &[(u16, u16)]) -> Vec<u8> {
        let mut buf = BytesMut::new();
        for (a, b) in words {
            buf.put_u16(*a);
            buf.put_u16(*b);
        }
        buf.to_vec()
    }

    #[test]
    fn decode_splits_noise_and_echoes() {
        let body = groups(&[
            (0x8001, 1),
            (5, 1),
            (42, 10),
            (0x8002, 1),
            (7, 1),
            (30, 11),
            (31, 12),
        ]);
        let decoded = decode_body(&body).unwrap();
        assert_eq!(decoded.clusters, 2);
        assert_eq!(
            decoded.noise,
            vec![
                NoiseSample { frequency: 0, level: 5.0 },
                NoiseSample { frequency: 1, level: 7.0 },
            ]
        );
        assert_eq!(
            decoded.echoes,
            vec![
                Echo::new(0, 10, 42.0),
                Echo::new(1, 11, 30.0),
                Echo::new(1, 12, 31.0),
            ]
        );
        assert_eq!(decoded.align_warnings, 0);
    }

    #[test]
    fn bad_alignment_is_not_fatal() {
        let body = groups(&[(0x8001, 3), (5, 1), (42, 10)]);
        let decoded = decode_body(&body).unwrap();
        assert_eq!(decoded.align_warnings, 1);
        assert_eq!(decoded.echoes.len(), 1);
    }

    #[test]
    fn truncated_body_is_rejected() {
        let mut body = groups(&[(0x8001, 1), (5, 1)]);
        body.extend_from_slice(&[0, 42]);
        assert_eq!(
            decode_body(&body),
            Err(CodecError::Truncated {
                offset: 8,
                remaining: 2
            })
        );
    }

    #[test]
    fn sample_before_first_cluster_is_rejected() {
        let body = groups(&[(5, 1)]);
        assert_eq!(
            decode_body(&body),
            Err(CodecError::SampleBeforeCluster { offset: 0 })
        );
    }

    #[test]
    fn header_split_and_text() {
        let mut bytes = encode_header_text("Дата: 01.01.2020\n").unwrap();
        bytes.extend_from_slice(&DELIMITER);
        bytes.extend_from_slice(&[0x80, 0x01, 0x00, 0x01]);
        let (header, body) = split_header(&bytes).unwrap();
        assert_eq!(decode_header_text(header), "Дата: 01.01.2020\n");
        assert_eq!(body, &[0x80, 0x01, 0x00, 0x01]);
        assert_eq!(split_header(b"no delimiter"), Err(CodecError::MissingDelimiter));
    }

    #[test]
    fn unmappable_header_text_is_rejected() {
        assert!(encode_header_text("Дата: 01.01.2020 \u{1F600}").is_err());
    }

    #[test]
    fn encode_rejects_values_colliding_with_header_bit() {
        let mut dense = DenseMatrix::new(11, 1).unwrap();
        dense.set(10, 0, Some(40_000.0));
        let noise = [NoiseSample { frequency: 0, level: 3.0 }];
        let mut out = BytesMut::new();
        assert!(matches!(
            encode_body(&mut out, &noise, &dense),
            Err(CodecError::OutOfRange { what: "echo amplitude", .. })
        ));
    }

    #[test]
    fn encode_truncates_fractional_values() {
        let mut dense = DenseMatrix::new(11, 1).unwrap();
        dense.set(10, 0, Some(41.9));
        dense.set(4, 0, None);
        let noise = [NoiseSample { frequency: 0, level: 5.7 }];
        let mut out = BytesMut::new();
        encode_body(&mut out, &noise, &dense).unwrap();
        assert_eq!(out.to_vec(), groups(&[(0x8001, 1), (5, 1), (41, 10)]));
    }
}
