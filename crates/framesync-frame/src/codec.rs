use std::sync::Arc;

use bytes::{BufMut, Bytes, BytesMut};

use crate::error::{FrameError, Result};
use crate::header::{DecodedHeader, FieldKind, FieldValue, FromField, HeaderLayout};
use crate::signature::Signature;

/// Default maximum payload size: 64 KiB.
pub const DEFAULT_MAX_FRAME_SIZE: usize = 64 * 1024;

/// Default signature byte used when no protocol is configured.
pub const DEFAULT_SIGNATURE: u8 = 0x7E;

/// Name of the length field in the built-in protocols.
pub const LENGTH_FIELD: &str = "length";

/// How the payload length is derived from a decoded header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PayloadLength {
    /// Payload bytes = value of the named unsigned field × `unit`.
    Field { name: String, unit: usize },
    /// Every frame carries exactly this many payload bytes.
    Fixed(usize),
}

impl PayloadLength {
    /// Length counted in bytes by the named field.
    pub fn field(name: impl Into<String>) -> Self {
        PayloadLength::Field {
            name: name.into(),
            unit: 1,
        }
    }
}

/// Static description of one framing protocol:
/// signature, header layout, payload length rule and size cap.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Protocol {
    signature: Signature,
    layout: Arc<HeaderLayout>,
    payload_length: PayloadLength,
    max_frame_size: usize,
}

impl Protocol {
    /// Assemble and validate a protocol description.
    ///
    /// `max_frame_size` caps the payload length a header may declare.
    pub fn new(
        signature: Signature,
        layout: HeaderLayout,
        payload_length: PayloadLength,
        max_frame_size: usize,
    ) -> Result<Self> {
        if max_frame_size == 0 {
            return Err(FrameError::InvalidLayout(
                "max frame size must be greater than zero".to_string(),
            ));
        }
        match &payload_length {
            PayloadLength::Field { name, unit } => {
                let spec = layout
                    .field(name)
                    .ok_or_else(|| FrameError::UnknownField(name.clone()))?;
                if !spec.kind().is_unsigned() {
                    return Err(FrameError::InvalidLayout(format!(
                        "length field '{name}' must be an unsigned integer"
                    )));
                }
                if *unit == 0 {
                    return Err(FrameError::InvalidLayout(
                        "length unit must be at least 1".to_string(),
                    ));
                }
            }
            PayloadLength::Fixed(len) => {
                if *len > max_frame_size {
                    return Err(FrameError::PayloadTooLarge {
                        size: *len,
                        max: max_frame_size,
                    });
                }
            }
        }
        Ok(Self {
            signature,
            layout: Arc::new(layout),
            payload_length,
            max_frame_size,
        })
    }

    /// Signature followed by a single `u8` length byte.
    pub fn byte_length(signature: &[u8], max_frame_size: usize) -> Result<Self> {
        let layout = HeaderLayout::builder()
            .field(LENGTH_FIELD, FieldKind::U8)
            .build()?;
        Self::new(
            Signature::new(signature)?,
            layout,
            PayloadLength::field(LENGTH_FIELD),
            max_frame_size,
        )
    }

    /// Signature followed by a header-less, fixed-size payload.
    pub fn fixed(signature: &[u8], payload_len: usize) -> Result<Self> {
        Self::new(
            Signature::new(signature)?,
            HeaderLayout::empty(),
            PayloadLength::Fixed(payload_len),
            payload_len.max(1),
        )
    }

    pub fn signature(&self) -> &Signature {
        &self.signature
    }

    pub fn layout(&self) -> &Arc<HeaderLayout> {
        &self.layout
    }

    pub fn payload_length(&self) -> &PayloadLength {
        &self.payload_length
    }

    pub fn max_frame_size(&self) -> usize {
        self.max_frame_size
    }

    /// Signature plus header width.
    pub fn prefix_len(&self) -> usize {
        self.signature.len() + self.layout.width()
    }

    /// Payload length declared by a complete header (not yet checked against the cap).
    pub fn declared_payload_len(&self, header: &[u8]) -> Result<usize> {
        match &self.payload_length {
            PayloadLength::Fixed(len) => Ok(*len),
            PayloadLength::Field { name, unit } => {
                let count: u64 = self.layout.read_as(header, name)?;
                let count = usize::try_from(count).unwrap_or(usize::MAX);
                Ok(count.saturating_mul(*unit))
            }
        }
    }

    /// Encode one frame: signature, header (with the length field filled in
    /// from `payload`) and payload.
    ///
    /// Wire format:
    /// ```text
    /// ┌────────────────┬──────────────────────────┬──────────────────┐
    /// │ Signature      │ Header (layout.width())  │ Payload          │
    /// │ (1..=8 bytes)  │ fixed offsets, explicit  │ (length rule)    │
    /// │                │ byte order               │                  │
    /// └────────────────┴──────────────────────────┴──────────────────┘
    /// ```
    pub fn encode(
        &self,
        fields: &[(&str, FieldValue)],
        payload: &[u8],
        dst: &mut BytesMut,
    ) -> Result<()> {
        if payload.len() > self.max_frame_size {
            return Err(FrameError::PayloadTooLarge {
                size: payload.len(),
                max: self.max_frame_size,
            });
        }

        let mut header = vec![0u8; self.layout.width()];
        for (name, value) in fields {
            self.layout.write(&mut header, name, value)?;
        }

        match &self.payload_length {
            PayloadLength::Fixed(len) => {
                if payload.len() != *len {
                    return Err(FrameError::PayloadLength {
                        size: payload.len(),
                        reason: format!("protocol requires exactly {len} bytes"),
                    });
                }
            }
            PayloadLength::Field { name, unit } => {
                if payload.len() % unit != 0 {
                    return Err(FrameError::PayloadLength {
                        size: payload.len(),
                        reason: format!("not a multiple of the {unit}-byte length unit"),
                    });
                }
                let count = (payload.len() / unit) as u64;
                self.layout
                    .write(&mut header, name, &FieldValue::Unsigned(count))?;
            }
        }

        dst.reserve(self.prefix_len() + payload.len());
        dst.put_slice(self.signature.as_bytes());
        dst.put_slice(&header);
        dst.put_slice(payload);
        Ok(())
    }

    /// Encode one frame into a fresh buffer.
    pub fn encode_to_bytes(&self, fields: &[(&str, FieldValue)], payload: &[u8]) -> Result<Bytes> {
        let mut buf = BytesMut::new();
        self.encode(fields, payload, &mut buf)?;
        Ok(buf.freeze())
    }
}

/// One complete frame: signature + header + payload in a single buffer,
/// plus a decoded view of the header.
#[derive(Clone, PartialEq, Eq)]
pub struct Frame {
    bytes: Bytes,
    header: DecodedHeader,
    signature_len: usize,
}

impl Frame {
    /// Wrap a complete frame buffer laid out according to `protocol`.
    pub(crate) fn from_parts(bytes: Bytes, protocol: &Protocol) -> Self {
        let signature_len = protocol.signature().len();
        let header_end = signature_len + protocol.layout().width();
        let header = DecodedHeader::new(
            Arc::clone(protocol.layout()),
            bytes.slice(signature_len..header_end),
        );
        Self {
            bytes,
            header,
            signature_len,
        }
    }

    /// The whole frame as received.
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn signature(&self) -> &[u8] {
        &self.bytes[..self.signature_len]
    }

    pub fn header_bytes(&self) -> &[u8] {
        self.header.raw()
    }

    pub fn header(&self) -> &DecodedHeader {
        &self.header
    }

    /// Typed access to a header field.
    pub fn field<T: FromField>(&self, name: &str) -> Result<T> {
        self.header.field(name)
    }

    pub fn payload(&self) -> &[u8] {
        &self.bytes[self.payload_offset()..]
    }

    /// The payload as a shared, zero-copy buffer.
    pub fn payload_bytes(&self) -> Bytes {
        self.bytes.slice(self.payload_offset()..)
    }

    /// Total frame length on the wire.
    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    pub fn into_bytes(self) -> Bytes {
        self.bytes
    }

    fn payload_offset(&self) -> usize {
        self.signature_len + self.header.raw().len()
    }
}

impl std::fmt::Debug for Frame {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Frame")
            .field("signature", &self.signature())
            .field("header", &self.header)
            .field("payload_len", &self.payload().len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::header::Endian;

    fn word_protocol() -> Protocol {
        let layout = HeaderLayout::builder()
            .field("type", FieldKind::U8)
            .field("words", FieldKind::U16(Endian::Big))
            .build()
            .unwrap();
        Protocol::new(
            Signature::new(&[0xAA, 0x55]).unwrap(),
            layout,
            PayloadLength::Field {
                name: "words".to_string(),
                unit: 4,
            },
            1024,
        )
        .unwrap()
    }

    #[test]
    fn encode_fills_length_field() {
        let protocol = Protocol::byte_length(&[0x7E], 64).unwrap();
        let wire = protocol.encode_to_bytes(&[], b"ABC").unwrap();
        assert_eq!(wire.as_ref(), &[0x7E, 0x03, 0x41, 0x42, 0x43]);
    }

    #[test]
    fn encode_counts_in_units() {
        let protocol = word_protocol();
        let wire = protocol
            .encode_to_bytes(&[("type", FieldValue::Unsigned(9))], &[1, 2, 3, 4, 5, 6, 7, 8])
            .unwrap();
        assert_eq!(&wire[..5], &[0xAA, 0x55, 0x09, 0x00, 0x02]);
        assert_eq!(protocol.declared_payload_len(&wire[2..5]).unwrap(), 8);
    }

    #[test]
    fn encode_rejects_misaligned_payload() {
        let err = word_protocol()
            .encode_to_bytes(&[], &[1, 2, 3])
            .unwrap_err();
        assert!(matches!(err, FrameError::PayloadLength { size: 3, .. }));
    }

    #[test]
    fn encode_rejects_oversized_payload() {
        let protocol = Protocol::byte_length(&[0x7E], 4).unwrap();
        let err = protocol.encode_to_bytes(&[], b"too long").unwrap_err();
        assert!(matches!(err, FrameError::PayloadTooLarge { size: 8, max: 4 }));
    }

    #[test]
    fn fixed_protocol_requires_exact_payload() {
        let protocol = Protocol::fixed(b"HDR", 2).unwrap();
        assert_eq!(protocol.prefix_len(), 3);
        assert!(protocol.encode_to_bytes(&[], b"ok").is_ok());
        assert!(matches!(
            protocol.encode_to_bytes(&[], b"nope"),
            Err(FrameError::PayloadTooLarge { .. }) | Err(FrameError::PayloadLength { .. })
        ));
    }

    #[test]
    fn new_validates_length_rule() {
        let layout = HeaderLayout::builder()
            .field("flag", FieldKind::Flag)
            .build()
            .unwrap();
        let sig = Signature::new(&[1]).unwrap();

        let not_unsigned = Protocol::new(sig, layout.clone(), PayloadLength::field("flag"), 16);
        assert!(matches!(not_unsigned, Err(FrameError::InvalidLayout(_))));

        let missing = Protocol::new(sig, layout.clone(), PayloadLength::field("len"), 16);
        assert!(matches!(missing, Err(FrameError::UnknownField(_))));

        let zero_cap = Protocol::new(sig, layout, PayloadLength::Fixed(0), 0);
        assert!(matches!(zero_cap, Err(FrameError::InvalidLayout(_))));
    }

    #[test]
    fn frame_views_share_one_buffer() {
        let protocol = word_protocol();
        let wire = protocol
            .encode_to_bytes(&[("type", FieldValue::Unsigned(1))], b"abcd")
            .unwrap();
        let frame = Frame::from_parts(wire.clone(), &protocol);

        assert_eq!(frame.signature(), &[0xAA, 0x55]);
        assert_eq!(frame.header_bytes(), &[0x01, 0x00, 0x01]);
        assert_eq!(frame.payload(), b"abcd");
        assert_eq!(frame.payload_bytes().as_ref(), b"abcd");
        assert_eq!(frame.field::<u8>("type").unwrap(), 1);
        assert_eq!(frame.len(), wire.len());
        assert_eq!(frame.into_bytes(), wire);
    }
}
