//! Fixed-layout frame headers.
//!
//! A [`HeaderLayout`] is an ordered list of named fields with explicit widths
//! and byte order. The [`HeaderDecoder`] accumulates exactly `width` bytes and
//! then exposes typed field accessors.

use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;

use bytes::{Buf, BufMut, Bytes};

use crate::error::{FrameError, Result};

/// Byte order of a multi-byte field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Endian {
    Big,
    Little,
}

/// Wire type of a header field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    /// One byte, non-zero means true.
    Flag,
    U8,
    U16(Endian),
    U32(Endian),
    U64(Endian),
    /// Opaque bytes of the given width.
    Raw(usize),
}

impl FieldKind {
    /// Width of the field on the wire.
    pub fn width(&self) -> usize {
        match self {
            FieldKind::Flag | FieldKind::U8 => 1,
            FieldKind::U16(_) => 2,
            FieldKind::U32(_) => 4,
            FieldKind::U64(_) => 8,
            FieldKind::Raw(width) => *width,
        }
    }

    /// True for kinds that decode to an unsigned integer.
    pub fn is_unsigned(&self) -> bool {
        matches!(
            self,
            FieldKind::U8 | FieldKind::U16(_) | FieldKind::U32(_) | FieldKind::U64(_)
        )
    }

    fn decode(&self, mut src: &[u8]) -> FieldValue {
        match self {
            FieldKind::Flag => FieldValue::Flag(src[0] != 0),
            FieldKind::U8 => FieldValue::Unsigned(u64::from(src[0])),
            FieldKind::U16(Endian::Big) => FieldValue::Unsigned(u64::from(src.get_u16())),
            FieldKind::U16(Endian::Little) => FieldValue::Unsigned(u64::from(src.get_u16_le())),
            FieldKind::U32(Endian::Big) => FieldValue::Unsigned(u64::from(src.get_u32())),
            FieldKind::U32(Endian::Little) => FieldValue::Unsigned(u64::from(src.get_u32_le())),
            FieldKind::U64(Endian::Big) => FieldValue::Unsigned(src.get_u64()),
            FieldKind::U64(Endian::Little) => FieldValue::Unsigned(src.get_u64_le()),
            FieldKind::Raw(_) => FieldValue::Raw(Bytes::copy_from_slice(src)),
        }
    }
}

/// Renders the type names accepted in protocol configs (`u16be`, `raw:4`).
impl fmt::Display for FieldKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let suffix = |endian: &Endian| match endian {
            Endian::Big => "be",
            Endian::Little => "le",
        };
        match self {
            FieldKind::Flag => f.write_str("flag"),
            FieldKind::U8 => f.write_str("u8"),
            FieldKind::U16(endian) => write!(f, "u16{}", suffix(endian)),
            FieldKind::U32(endian) => write!(f, "u32{}", suffix(endian)),
            FieldKind::U64(endian) => write!(f, "u64{}", suffix(endian)),
            FieldKind::Raw(width) => write!(f, "raw:{width}"),
        }
    }
}

/// One named field of a [`HeaderLayout`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldSpec {
    name: String,
    offset: usize,
    kind: FieldKind,
}

impl FieldSpec {
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Offset from the first header byte.
    pub fn offset(&self) -> usize {
        self.offset
    }

    pub fn kind(&self) -> FieldKind {
        self.kind
    }

    pub fn width(&self) -> usize {
        self.kind.width()
    }

    fn slice<'a>(&self, header: &'a [u8]) -> &'a [u8] {
        &header[self.offset..self.offset + self.width()]
    }
}

/// A decoded header field value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldValue {
    Flag(bool),
    Unsigned(u64),
    Raw(Bytes),
}

/// Conversion from a [`FieldValue`] into a typed accessor result.
pub trait FromField: Sized {
    /// Name used in [`FrameError::FieldType`] messages.
    const TYPE_NAME: &'static str;

    fn from_field(value: FieldValue) -> Option<Self>;
}

impl FromField for bool {
    const TYPE_NAME: &'static str = "bool";

    fn from_field(value: FieldValue) -> Option<Self> {
        match value {
            FieldValue::Flag(flag) => Some(flag),
            FieldValue::Unsigned(v) => Some(v != 0),
            FieldValue::Raw(_) => None,
        }
    }
}

macro_rules! impl_from_field_unsigned {
    ($($ty:ty),*) => {
        $(
            impl FromField for $ty {
                const TYPE_NAME: &'static str = stringify!($ty);

                fn from_field(value: FieldValue) -> Option<Self> {
                    match value {
                        FieldValue::Unsigned(v) => <$ty>::try_from(v).ok(),
                        FieldValue::Flag(flag) => Some(<$ty>::from(flag)),
                        FieldValue::Raw(_) => None,
                    }
                }
            }
        )*
    };
}

impl_from_field_unsigned!(u8, u16, u32, u64, usize);

impl FromField for Bytes {
    const TYPE_NAME: &'static str = "bytes";

    fn from_field(value: FieldValue) -> Option<Self> {
        match value {
            FieldValue::Raw(bytes) => Some(bytes),
            _ => None,
        }
    }
}

impl FromField for Vec<u8> {
    const TYPE_NAME: &'static str = "bytes";

    fn from_field(value: FieldValue) -> Option<Self> {
        Bytes::from_field(value).map(|b| b.to_vec())
    }
}

impl FromField for FieldValue {
    const TYPE_NAME: &'static str = "value";

    fn from_field(value: FieldValue) -> Option<Self> {
        Some(value)
    }
}

/// Ordered, fixed-width header description.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct HeaderLayout {
    fields: Vec<FieldSpec>,
    width: usize,
}

impl HeaderLayout {
    /// Start describing a layout.
    pub fn builder() -> HeaderLayoutBuilder {
        HeaderLayoutBuilder::default()
    }

    /// A layout with no header bytes at all.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Total header width in bytes.
    pub fn width(&self) -> usize {
        self.width
    }

    pub fn fields(&self) -> &[FieldSpec] {
        &self.fields
    }

    /// Look up a field by name.
    pub fn field(&self, name: &str) -> Option<&FieldSpec> {
        self.fields.iter().find(|f| f.name == name)
    }

    /// Decode the value of `name` from a complete header buffer.
    pub fn read(&self, header: &[u8], name: &str) -> Result<FieldValue> {
        if header.len() < self.width {
            return Err(FrameError::IncompleteHeader {
                received: header.len(),
                width: self.width,
            });
        }
        let spec = self
            .field(name)
            .ok_or_else(|| FrameError::UnknownField(name.to_string()))?;
        Ok(spec.kind.decode(spec.slice(header)))
    }

    /// Decode `name` from a complete header buffer as `T`.
    pub fn read_as<T: FromField>(&self, header: &[u8], name: &str) -> Result<T> {
        let value = self.read(header, name)?;
        T::from_field(value).ok_or_else(|| FrameError::FieldType {
            name: name.to_string(),
            requested: T::TYPE_NAME,
        })
    }

    /// Encode `value` into the slot of `name` inside `header`.
    pub fn write(&self, header: &mut [u8], name: &str, value: &FieldValue) -> Result<()> {
        let spec = self
            .field(name)
            .ok_or_else(|| FrameError::UnknownField(name.to_string()))?;
        let width = spec.width();
        let mut dst = &mut header[spec.offset..spec.offset + width];

        let overflow = |value: u64| FrameError::FieldOverflow {
            name: name.to_string(),
            value,
            width,
        };
        let mismatch = |requested: &'static str| FrameError::FieldType {
            name: name.to_string(),
            requested,
        };

        match (spec.kind, value) {
            (FieldKind::Flag, FieldValue::Flag(flag)) => dst.put_u8(u8::from(*flag)),
            (FieldKind::Flag, _) => return Err(mismatch("bool")),
            (FieldKind::Raw(_), FieldValue::Raw(bytes)) => {
                if bytes.len() != width {
                    return Err(mismatch("bytes"));
                }
                dst.put_slice(bytes);
            }
            (FieldKind::Raw(_), _) => return Err(mismatch("bytes")),
            (kind, FieldValue::Unsigned(v)) => {
                let v = *v;
                match kind {
                    FieldKind::U8 => dst.put_u8(u8::try_from(v).map_err(|_| overflow(v))?),
                    FieldKind::U16(endian) => {
                        let v = u16::try_from(v).map_err(|_| overflow(v))?;
                        match endian {
                            Endian::Big => dst.put_u16(v),
                            Endian::Little => dst.put_u16_le(v),
                        }
                    }
                    FieldKind::U32(endian) => {
                        let v = u32::try_from(v).map_err(|_| overflow(v))?;
                        match endian {
                            Endian::Big => dst.put_u32(v),
                            Endian::Little => dst.put_u32_le(v),
                        }
                    }
                    FieldKind::U64(Endian::Big) => dst.put_u64(v),
                    FieldKind::U64(Endian::Little) => dst.put_u64_le(v),
                    FieldKind::Flag | FieldKind::Raw(_) => unreachable!("handled above"),
                }
            }
            (_, _) => return Err(mismatch("unsigned")),
        }
        Ok(())
    }
}

/// Builder assigning sequential offsets to header fields.
#[derive(Debug, Default)]
pub struct HeaderLayoutBuilder {
    fields: Vec<FieldSpec>,
    width: usize,
    error: Option<String>,
}

impl HeaderLayoutBuilder {
    /// Append a named field.
    pub fn field(mut self, name: impl Into<String>, kind: FieldKind) -> Self {
        let name = name.into();
        if name.is_empty() {
            self.error.get_or_insert_with(|| "field name must not be empty".to_string());
        }
        if kind.width() == 0 {
            self.error
                .get_or_insert_with(|| format!("field '{name}' has zero width"));
        }
        self.fields.push(FieldSpec {
            name,
            offset: self.width,
            kind,
        });
        self.width += kind.width();
        self
    }

    /// Append unnamed padding bytes.
    pub fn reserved(mut self, width: usize) -> Self {
        self.width += width;
        self
    }

    pub fn build(self) -> Result<HeaderLayout> {
        if let Some(err) = self.error {
            return Err(FrameError::InvalidLayout(err));
        }
        let mut seen = HashSet::new();
        for field in &self.fields {
            if !seen.insert(field.name.as_str()) {
                return Err(FrameError::InvalidLayout(format!(
                    "duplicate field '{}'",
                    field.name
                )));
            }
        }
        Ok(HeaderLayout {
            fields: self.fields,
            width: self.width,
        })
    }
}

/// Progress of a [`HeaderDecoder`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HeaderProgress {
    Accumulating,
    HeaderComplete,
}

/// Accumulates exactly `layout.width()` bytes and decodes fields from them.
#[derive(Debug, Clone)]
pub struct HeaderDecoder {
    layout: Arc<HeaderLayout>,
    buf: Vec<u8>,
}

impl HeaderDecoder {
    pub fn new(layout: Arc<HeaderLayout>) -> Self {
        let buf = Vec::with_capacity(layout.width());
        Self { layout, buf }
    }

    /// Append one header byte.
    ///
    /// Feeding a complete decoder starts a new header.
    pub fn feed(&mut self, byte: u8) -> HeaderProgress {
        if self.is_complete() {
            self.buf.clear();
        }
        self.buf.push(byte);
        if self.is_complete() {
            HeaderProgress::HeaderComplete
        } else {
            HeaderProgress::Accumulating
        }
    }

    /// Typed access to a decoded field; fails with
    /// [`FrameError::IncompleteHeader`] until the header is complete.
    pub fn field<T: FromField>(&self, name: &str) -> Result<T> {
        if !self.is_complete() {
            return Err(FrameError::IncompleteHeader {
                received: self.buf.len(),
                width: self.layout.width(),
            });
        }
        self.layout.read_as(&self.buf, name)
    }

    /// Snapshot of the complete header.
    pub fn decoded(&self) -> Result<DecodedHeader> {
        if !self.is_complete() {
            return Err(FrameError::IncompleteHeader {
                received: self.buf.len(),
                width: self.layout.width(),
            });
        }
        Ok(DecodedHeader::new(
            Arc::clone(&self.layout),
            Bytes::copy_from_slice(&self.buf),
        ))
    }

    pub fn reset(&mut self) {
        self.buf.clear();
    }

    pub fn is_complete(&self) -> bool {
        self.buf.len() == self.layout.width()
    }

    /// Header bytes received so far.
    pub fn received(&self) -> usize {
        self.buf.len()
    }

    pub fn layout(&self) -> &Arc<HeaderLayout> {
        &self.layout
    }
}

/// Read-only view of a complete header.
#[derive(Clone, PartialEq, Eq)]
pub struct DecodedHeader {
    layout: Arc<HeaderLayout>,
    raw: Bytes,
}

impl DecodedHeader {
    pub(crate) fn new(layout: Arc<HeaderLayout>, raw: Bytes) -> Self {
        Self { layout, raw }
    }

    /// Typed access to a field by name.
    pub fn field<T: FromField>(&self, name: &str) -> Result<T> {
        self.layout.read_as(&self.raw, name)
    }

    /// Raw header bytes (signature excluded).
    pub fn raw(&self) -> &[u8] {
        &self.raw
    }

    pub fn layout(&self) -> &HeaderLayout {
        &self.layout
    }

    /// All fields in layout order.
    pub fn values(&self) -> impl Iterator<Item = (&str, FieldValue)> + '_ {
        self.layout
            .fields()
            .iter()
            .map(|spec| (spec.name(), spec.kind.decode(spec.slice(&self.raw))))
    }
}

impl std::fmt::Debug for DecodedHeader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut map = f.debug_map();
        for (name, value) in self.values() {
            map.entry(&name, &value);
        }
        map.finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_layout() -> Arc<HeaderLayout> {
        Arc::new(
            HeaderLayout::builder()
                .field("ack", FieldKind::Flag)
                .field("seq", FieldKind::U16(Endian::Big))
                .field("len", FieldKind::U32(Endian::Little))
                .reserved(1)
                .field("tag", FieldKind::Raw(2))
                .build()
                .unwrap(),
        )
    }

    #[test]
    fn builder_assigns_offsets_and_width() {
        let layout = sample_layout();
        assert_eq!(layout.width(), 1 + 2 + 4 + 1 + 2);
        assert_eq!(layout.field("ack").unwrap().offset(), 0);
        assert_eq!(layout.field("seq").unwrap().offset(), 1);
        assert_eq!(layout.field("len").unwrap().offset(), 3);
        assert_eq!(layout.field("tag").unwrap().offset(), 8);
    }

    #[test]
    fn builder_rejects_duplicates_and_empty_names() {
        let dup = HeaderLayout::builder()
            .field("a", FieldKind::U8)
            .field("a", FieldKind::U8)
            .build();
        assert!(matches!(dup, Err(FrameError::InvalidLayout(_))));

        let empty = HeaderLayout::builder().field("", FieldKind::U8).build();
        assert!(matches!(empty, Err(FrameError::InvalidLayout(_))));

        let zero = HeaderLayout::builder().field("z", FieldKind::Raw(0)).build();
        assert!(matches!(zero, Err(FrameError::InvalidLayout(_))));
    }

    #[test]
    fn decodes_fields_with_explicit_endianness() {
        let mut decoder = HeaderDecoder::new(sample_layout());
        let bytes = [0x01, 0x12, 0x34, 0x78, 0x56, 0x34, 0x12, 0xFF, b'o', b'k'];
        let mut progress = Vec::new();
        for b in bytes {
            progress.push(decoder.feed(b));
        }
        assert!(progress[..bytes.len() - 1]
            .iter()
            .all(|p| *p == HeaderProgress::Accumulating));
        assert_eq!(progress.last(), Some(&HeaderProgress::HeaderComplete));

        assert!(decoder.field::<bool>("ack").unwrap());
        assert_eq!(decoder.field::<u16>("seq").unwrap(), 0x1234);
        assert_eq!(decoder.field::<u32>("len").unwrap(), 0x1234_5678);
        assert_eq!(decoder.field::<Vec<u8>>("tag").unwrap(), b"ok".to_vec());
    }

    #[test]
    fn field_before_completion_is_incomplete_header() {
        let mut decoder = HeaderDecoder::new(sample_layout());
        decoder.feed(0x00);
        let err = decoder.field::<u16>("seq").unwrap_err();
        assert!(matches!(
            err,
            FrameError::IncompleteHeader {
                received: 1,
                width: 10
            }
        ));
        assert!(decoder.decoded().is_err());
    }

    #[test]
    fn unknown_field_and_type_mismatch() {
        let layout = Arc::new(
            HeaderLayout::builder()
                .field("len", FieldKind::U16(Endian::Little))
                .field("raw", FieldKind::Raw(1))
                .build()
                .unwrap(),
        );
        let mut decoder = HeaderDecoder::new(layout);
        for b in [0x00, 0x01, 0x02] {
            decoder.feed(b);
        }
        assert!(matches!(
            decoder.field::<u16>("nope"),
            Err(FrameError::UnknownField(_))
        ));
        assert!(matches!(
            decoder.field::<u64>("raw"),
            Err(FrameError::FieldType { .. })
        ));
        // 0x0100 does not fit in a u8
        assert!(matches!(
            decoder.field::<u8>("len"),
            Err(FrameError::FieldType { .. })
        ));
        assert_eq!(decoder.field::<u16>("len").unwrap(), 0x0100);
    }

    #[test]
    fn reset_clears_accumulated_bytes() {
        let mut decoder = HeaderDecoder::new(sample_layout());
        decoder.feed(1);
        decoder.feed(2);
        decoder.reset();
        assert_eq!(decoder.received(), 0);
        assert!(!decoder.is_complete());
    }

    #[test]
    fn empty_layout_is_complete_immediately() {
        let decoder = HeaderDecoder::new(Arc::new(HeaderLayout::empty()));
        assert!(decoder.is_complete());
        assert_eq!(decoder.decoded().unwrap().raw(), b"");
    }

    #[test]
    fn write_then_read_each_kind() {
        let layout = sample_layout();
        let mut header = vec![0u8; layout.width()];
        layout.write(&mut header, "ack", &FieldValue::Flag(true)).unwrap();
        layout
            .write(&mut header, "seq", &FieldValue::Unsigned(0xBEEF))
            .unwrap();
        layout
            .write(&mut header, "len", &FieldValue::Unsigned(7))
            .unwrap();
        layout
            .write(&mut header, "tag", &FieldValue::Raw(Bytes::from_static(b"hi")))
            .unwrap();

        assert_eq!(&header[1..3], &[0xBE, 0xEF]);
        assert_eq!(&header[3..7], &[7, 0, 0, 0]);

        let decoded = DecodedHeader::new(Arc::clone(&layout), Bytes::from(header));
        assert!(decoded.field::<bool>("ack").unwrap());
        assert_eq!(decoded.field::<u64>("seq").unwrap(), 0xBEEF);
        let names: Vec<&str> = decoded.values().map(|(n, _)| n).collect();
        assert_eq!(names, vec!["ack", "seq", "len", "tag"]);
    }

    #[test]
    fn write_rejects_overflow_and_wrong_kind() {
        let layout = sample_layout();
        let mut header = vec![0u8; layout.width()];
        assert!(matches!(
            layout.write(&mut header, "seq", &FieldValue::Unsigned(70_000)),
            Err(FrameError::FieldOverflow { width: 2, .. })
        ));
        assert!(matches!(
            layout.write(&mut header, "ack", &FieldValue::Unsigned(1)),
            Err(FrameError::FieldType { .. })
        ));
        assert!(matches!(
            layout.write(&mut header, "tag", &FieldValue::Raw(Bytes::from_static(b"long"))),
            Err(FrameError::FieldType { .. })
        ));
    }
}
