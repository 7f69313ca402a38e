//! JSON protocol definitions.
//!
//! ```json
//! {
//!   "signature": [170, 85],
//!   "fields": [
//!     { "name": "type", "type": "u8" },
//!     { "name": "words", "type": "u16be" }
//!   ],
//!   "payload_length": { "field": "words", "unit": 4 },
//!   "max_frame_size": 4096
//! }
//! ```

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::codec::{PayloadLength, Protocol, DEFAULT_MAX_FRAME_SIZE, DEFAULT_SIGNATURE, LENGTH_FIELD};
use crate::error::{FrameError, Result};
use crate::header::{Endian, FieldKind, HeaderLayout};
use crate::signature::Signature;

/// Serializable description of a [`Protocol`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ProtocolConfig {
    pub signature: Vec<u8>,
    #[serde(default)]
    pub fields: Vec<FieldConfig>,
    pub payload_length: PayloadLengthConfig,
    #[serde(default = "default_max_frame_size")]
    pub max_frame_size: usize,
}

/// One header field: a name and a type string such as `u16be` or `raw:4`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FieldConfig {
    pub name: String,
    #[serde(rename = "type")]
    pub kind: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PayloadLengthConfig {
    Field {
        field: String,
        #[serde(default = "default_unit")]
        unit: usize,
    },
    Fixed {
        fixed: usize,
    },
}

fn default_max_frame_size() -> usize {
    DEFAULT_MAX_FRAME_SIZE
}

fn default_unit() -> usize {
    1
}

impl Default for ProtocolConfig {
    /// `0x7E`, one `u8` length byte, 64 KiB cap.
    fn default() -> Self {
        Self {
            signature: vec![DEFAULT_SIGNATURE],
            fields: vec![FieldConfig {
                name: LENGTH_FIELD.to_string(),
                kind: "u8".to_string(),
            }],
            payload_length: PayloadLengthConfig::Field {
                field: LENGTH_FIELD.to_string(),
                unit: 1,
            },
            max_frame_size: DEFAULT_MAX_FRAME_SIZE,
        }
    }
}

impl ProtocolConfig {
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|err| {
            FrameError::Config(format!("cannot read {}: {err}", path.display()))
        })?;
        Self::from_json(&text)
    }

    /// Validate and build the runtime protocol.
    pub fn into_protocol(self) -> Result<Protocol> {
        let signature = Signature::new(&self.signature)?;

        let mut builder = HeaderLayout::builder();
        for field in &self.fields {
            builder = builder.field(field.name.clone(), parse_kind(&field.kind)?);
        }
        let layout = builder.build()?;

        let payload_length = match self.payload_length {
            PayloadLengthConfig::Field { field, unit } => PayloadLength::Field { name: field, unit },
            PayloadLengthConfig::Fixed { fixed } => PayloadLength::Fixed(fixed),
        };

        Protocol::new(signature, layout, payload_length, self.max_frame_size)
    }
}

fn parse_kind(kind: &str) -> Result<FieldKind> {
    let parsed = match kind {
        "flag" | "bool" => FieldKind::Flag,
        "u8" => FieldKind::U8,
        "u16le" => FieldKind::U16(Endian::Little),
        "u16be" => FieldKind::U16(Endian::Big),
        "u32le" => FieldKind::U32(Endian::Little),
        "u32be" => FieldKind::U32(Endian::Big),
        "u64le" => FieldKind::U64(Endian::Little),
        "u64be" => FieldKind::U64(Endian::Big),
        other => match other.strip_prefix("raw:") {
            Some(width) => {
                let width = width
                    .parse::<usize>()
                    .map_err(|_| FrameError::Config(format!("invalid raw width in '{other}'")))?;
                FieldKind::Raw(width)
            }
            None => return Err(FrameError::Config(format!("unknown field type '{other}'"))),
        },
    };
    Ok(parsed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::header::FieldValue;

    #[test]
    fn field_kinds_render_as_config_type_names() {
        for name in ["flag", "u8", "u16le", "u32be", "u64le", "raw:3"] {
            assert_eq!(parse_kind(name).unwrap().to_string(), name);
        }
    }

    #[test]
    fn default_config_builds_byte_length_protocol() {
        let protocol = ProtocolConfig::default().into_protocol().unwrap();
        assert_eq!(protocol, Protocol::byte_length(&[0x7E], DEFAULT_MAX_FRAME_SIZE).unwrap());
    }

    #[test]
    fn parses_word_counted_protocol() {
        let json = r#"{
            "signature": [170, 85],
            "fields": [
                { "name": "type", "type": "u8" },
                { "name": "words", "type": "u16be" },
                { "name": "tag", "type": "raw:2" }
            ],
            "payload_length": { "field": "words", "unit": 4 },
            "max_frame_size": 4096
        }"#;
        let protocol = ProtocolConfig::from_json(json).unwrap().into_protocol().unwrap();

        assert_eq!(protocol.signature().as_bytes(), &[0xAA, 0x55]);
        assert_eq!(protocol.layout().width(), 5);
        assert_eq!(
            protocol.payload_length(),
            &PayloadLength::Field {
                name: "words".to_string(),
                unit: 4
            }
        );
        assert_eq!(protocol.max_frame_size(), 4096);

        let wire = protocol
            .encode_to_bytes(&[("tag", FieldValue::Raw(bytes::Bytes::from_static(b"ok")))], &[0; 8])
            .unwrap();
        assert_eq!(&wire[2..7], &[0x00, 0x00, 0x02, b'o', b'k']);
    }

    #[test]
    fn fixed_length_and_default_cap() {
        let json = r#"{ "signature": [1, 2, 3], "payload_length": { "fixed": 16 } }"#;
        let protocol = ProtocolConfig::from_json(json).unwrap().into_protocol().unwrap();
        assert_eq!(protocol.payload_length(), &PayloadLength::Fixed(16));
        assert_eq!(protocol.max_frame_size(), DEFAULT_MAX_FRAME_SIZE);
        assert_eq!(protocol.layout().width(), 0);
    }

    #[test]
    fn rejects_bad_configs() {
        let unknown_type = r#"{ "signature": [1], "fields": [{ "name": "x", "type": "i8" }],
                                "payload_length": { "fixed": 0 } }"#;
        assert!(matches!(
            ProtocolConfig::from_json(unknown_type).unwrap().into_protocol(),
            Err(FrameError::Config(_))
        ));

        let bad_raw = r#"{ "signature": [1], "fields": [{ "name": "x", "type": "raw:many" }],
                           "payload_length": { "fixed": 0 } }"#;
        assert!(matches!(
            ProtocolConfig::from_json(bad_raw).unwrap().into_protocol(),
            Err(FrameError::Config(_))
        ));

        let empty_signature = r#"{ "signature": [], "payload_length": { "fixed": 1 } }"#;
        assert!(matches!(
            ProtocolConfig::from_json(empty_signature).unwrap().into_protocol(),
            Err(FrameError::InvalidSignature { .. })
        ));

        let extra_key = r#"{ "signature": [1], "payload_length": { "fixed": 1 }, "crc": true }"#;
        assert!(matches!(
            ProtocolConfig::from_json(extra_key),
            Err(FrameError::Json(_))
        ));
    }

    #[test]
    fn from_file_reports_missing_path() {
        let err = ProtocolConfig::from_file("/nonexistent/framesync-protocol.json").unwrap_err();
        assert!(matches!(err, FrameError::Config(msg) if msg.contains("cannot read")));
    }

    #[test]
    fn serializes_back_to_json() {
        let json = serde_json::to_string(&ProtocolConfig::default()).unwrap();
        assert!(json.contains(r#""payload_length":{"field":"length","unit":1}"#));
        assert_eq!(ProtocolConfig::from_json(&json).unwrap(), ProtocolConfig::default());
    }
}
