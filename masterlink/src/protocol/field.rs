//! Typed fields of a command layout and their wire encodings.

use {
    crate::error::{Error, Result},
    byteorder::{BigEndian, ByteOrder, WriteBytesExt},
    std::{collections::BTreeMap, fmt},
};

/// Wire encoding of a single field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    /// One byte, 0..=255.
    Byte,
    /// Big-endian u16.
    Word,
    /// Big-endian u32.
    Int32,
    /// Exactly `n` raw bytes.
    Str(usize),
    /// Length byte, data, then spaces up to `n` data bytes.
    VarStr(usize),
    /// `n` zero bytes; ignored when decoding.
    Padding(usize),
    /// Fixed bytes that must match exactly.
    Literal(&'static [u8]),
    /// System value temperature, see [`Svt`].
    Svt,
    /// Dimmer level 0..=100, stored on the wire as 0..=60.
    Dimmer,
    /// Count byte followed by (output, dimmer) pairs.
    OutputList,
    /// `'C'` followed by the big-endian u16 sum of the preceding payload.
    Crc,
}

impl fmt::Display for FieldKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Byte => write!(f, "byte"),
            Self::Word => write!(f, "word"),
            Self::Int32 => write!(f, "int32"),
            Self::Str(n) => write!(f, "str({n})"),
            Self::VarStr(n) => write!(f, "varstr({n})"),
            Self::Padding(n) => write!(f, "padding({n})"),
            Self::Literal(_) => write!(f, "literal"),
            Self::Svt => write!(f, "svt"),
            Self::Dimmer => write!(f, "dimmer"),
            Self::OutputList => write!(f, "output list"),
            Self::Crc => write!(f, "crc"),
        }
    }
}

/// A named field in a command layout.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Field {
    name: &'static str,
    kind: FieldKind,
}

impl Field {
    /// Single byte field.
    pub const fn byte(name: &'static str) -> Self {
        Self {
            name,
            kind: FieldKind::Byte,
        }
    }

    /// Two byte big-endian field.
    pub const fn word(name: &'static str) -> Self {
        Self {
            name,
            kind: FieldKind::Word,
        }
    }

    /// Four byte big-endian field.
    pub const fn int32(name: &'static str) -> Self {
        Self {
            name,
            kind: FieldKind::Int32,
        }
    }

    /// Fixed-length byte string.
    pub const fn str(name: &'static str, len: usize) -> Self {
        Self {
            name,
            kind: FieldKind::Str(len),
        }
    }

    /// Length-prefixed, space-padded byte string.
    pub const fn varstr(name: &'static str, max_len: usize) -> Self {
        Self {
            name,
            kind: FieldKind::VarStr(max_len),
        }
    }

    /// Zero padding.
    pub const fn padding(len: usize) -> Self {
        Self {
            name: "padding",
            kind: FieldKind::Padding(len),
        }
    }

    /// Literal bytes.
    pub const fn lit(bytes: &'static [u8]) -> Self {
        Self {
            name: "literal",
            kind: FieldKind::Literal(bytes),
        }
    }

    /// Temperature field.
    pub const fn svt(name: &'static str) -> Self {
        Self {
            name,
            kind: FieldKind::Svt,
        }
    }

    /// Dimmer level field.
    pub const fn dimmer(name: &'static str) -> Self {
        Self {
            name,
            kind: FieldKind::Dimmer,
        }
    }

    /// Variable-length output list.
    pub const fn output_list(name: &'static str) -> Self {
        Self {
            name,
            kind: FieldKind::OutputList,
        }
    }

    /// Checksum over the preceding output payload.
    pub const fn crc() -> Self {
        Self {
            name: "crc",
            kind: FieldKind::Crc,
        }
    }

    /// Field name.
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Field encoding.
    pub fn kind(&self) -> FieldKind {
        self.kind
    }

    /// Whether the field carries a value in [`Fields`].
    pub fn has_value(&self) -> bool {
        !matches!(self.kind, FieldKind::Padding(_) | FieldKind::Literal(_))
    }

    /// Encode a value for this field.
    ///
    /// Padding and literals ignore `value`; every other kind requires one.
    pub fn encode(&self, value: Option<&FieldValue>) -> Result<Vec<u8>> {
        match self.kind {
            FieldKind::Padding(n) => return Ok(vec![0; n]),
            FieldKind::Literal(bytes) => return Ok(bytes.to_vec()),
            _ => {},
        }

        let value =
            value.ok_or_else(|| Error::Encoding(format!("missing field '{}'", self.name)))?;
        let mut out = Vec::new();
        match (self.kind, value) {
            (FieldKind::Byte, FieldValue::Int(v)) => out.push(self.in_range(*v, 0xFF)?),
            (FieldKind::Word, FieldValue::Int(v)) => {
                let v = u16::try_from(*v).map_err(|_| self.out_of_range(*v))?;
                out.write_u16::<BigEndian>(v)?;
            },
            (FieldKind::Int32, FieldValue::Int(v)) => out.write_u32::<BigEndian>(*v)?,
            (FieldKind::Str(n), FieldValue::Bytes(data)) => {
                if data.len() != n {
                    return Err(Error::Encoding(format!(
                        "field '{}' must be exactly {n} bytes, got {}",
                        self.name,
                        data.len()
                    )));
                }
                out.extend_from_slice(data);
            },
            (FieldKind::VarStr(n), FieldValue::Bytes(data)) => {
                if data.len() > n {
                    return Err(Error::Encoding(format!(
                        "field '{}' holds at most {n} bytes, got {}",
                        self.name,
                        data.len()
                    )));
                }
                out.push(self.in_range(u32::try_from(data.len()).unwrap_or(u32::MAX), 0xFF)?);
                out.extend_from_slice(data);
                out.resize(n + 1, b' ');
            },
            (FieldKind::Svt, FieldValue::Svt(svt)) => out.push(svt.raw()),
            (FieldKind::Dimmer, FieldValue::Int(v)) => {
                let v = self.in_range(*v, 100)?;
                out.push(dimmer_to_byte(v));
            },
            (FieldKind::OutputList, FieldValue::Outputs(outputs)) => {
                let count = u8::try_from(outputs.len()).map_err(|_| {
                    Error::Encoding(format!("field '{}' holds at most 255 outputs", self.name))
                })?;
                out.push(count);
                for &(output, dimmer) in outputs {
                    if dimmer > 100 {
                        return Err(self.out_of_range(u32::from(dimmer)));
                    }
                    out.push(output);
                    out.push(dimmer_to_byte(dimmer));
                }
            },
            (FieldKind::Crc, FieldValue::Bytes(data)) if data.len() == 3 => {
                out.extend_from_slice(data);
            },
            (kind, value) => {
                return Err(Error::Encoding(format!(
                    "field '{}' expects {kind}, got {}",
                    self.name,
                    value.type_name()
                )));
            },
        }
        Ok(out)
    }

    /// Number of wire bytes this field occupies at the start of `data`.
    ///
    /// `None` when more bytes are needed to tell.
    pub(crate) fn wire_len(&self, data: &[u8]) -> Option<usize> {
        match self.kind {
            FieldKind::Byte | FieldKind::Svt | FieldKind::Dimmer => Some(1),
            FieldKind::Word => Some(2),
            FieldKind::Int32 => Some(4),
            FieldKind::Str(n) | FieldKind::Padding(n) => Some(n),
            FieldKind::VarStr(n) => Some(n + 1),
            FieldKind::Literal(bytes) => Some(bytes.len()),
            FieldKind::OutputList => data.first().map(|&count| 1 + 2 * usize::from(count)),
            FieldKind::Crc => Some(3),
        }
    }

    /// Decode a value from exactly [`Field::wire_len`] bytes.
    ///
    /// Returns `None` for fields that carry no value.
    pub(crate) fn decode(&self, data: &[u8]) -> Option<FieldValue> {
        match self.kind {
            FieldKind::Byte => Some(FieldValue::Int(u32::from(data[0]))),
            FieldKind::Word => Some(FieldValue::Int(u32::from(BigEndian::read_u16(data)))),
            FieldKind::Int32 => Some(FieldValue::Int(BigEndian::read_u32(data))),
            FieldKind::Str(_) | FieldKind::Crc => Some(FieldValue::Bytes(data.to_vec())),
            FieldKind::VarStr(n) => {
                let len = usize::from(data[0]).min(n);
                Some(FieldValue::Bytes(data[1..=len].to_vec()))
            },
            FieldKind::Svt => Some(FieldValue::Svt(Svt::from_raw(data[0]))),
            FieldKind::Dimmer => Some(FieldValue::Int(u32::from(byte_to_dimmer(data[0])))),
            FieldKind::OutputList => Some(FieldValue::Outputs(
                data[1..]
                    .chunks_exact(2)
                    .map(|pair| (pair[0], byte_to_dimmer(pair[1])))
                    .collect(),
            )),
            FieldKind::Padding(_) | FieldKind::Literal(_) => None,
        }
    }

    fn in_range(&self, value: u32, max: u32) -> Result<u8> {
        if value > max {
            return Err(self.out_of_range(value));
        }
        u8::try_from(value).map_err(|_| self.out_of_range(value))
    }

    fn out_of_range(&self, value: u32) -> Error {
        Error::Encoding(format!(
            "value {value} out of range for {} field '{}'",
            self.kind, self.name
        ))
    }
}

fn dimmer_to_byte(level: u8) -> u8 {
    // 0..=100 -> 0..=60
    u8::try_from(u16::from(level) * 6 / 10).unwrap_or(u8::MAX)
}

fn byte_to_dimmer(raw: u8) -> u8 {
    u8::try_from(u16::from(raw) * 10 / 6).unwrap_or(u8::MAX)
}

/// System value temperature: one byte holding `(t + 32) * 2`.
///
/// Covers -32.0 to 95.5 degrees in half-degree steps.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Svt(u8);

impl Svt {
    /// Wrap a raw wire byte.
    pub const fn from_raw(raw: u8) -> Self {
        Self(raw)
    }

    /// Encode a temperature in degrees Celsius.
    pub fn temperature(celsius: f64) -> Result<Self> {
        let raw = ((celsius + 32.0) * 2.0).round();
        if !(0.0..=255.0).contains(&raw) {
            return Err(Error::Encoding(format!(
                "temperature {celsius} out of range -32.0..=95.5"
            )));
        }
        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        let raw = raw as u8;
        Ok(Self(raw))
    }

    /// Raw wire byte.
    pub const fn raw(self) -> u8 {
        self.0
    }

    /// Temperature in degrees Celsius.
    pub fn to_temperature(self) -> f64 {
        f64::from(self.0) / 2.0 - 32.0
    }
}

/// A decoded or to-be-encoded field value.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum FieldValue {
    /// Byte, word, int32 and dimmer fields.
    Int(u32),
    /// String, varstring and crc fields.
    Bytes(Vec<u8>),
    /// Temperature fields.
    Svt(Svt),
    /// Output lists as (output, dimmer level) pairs.
    Outputs(Vec<(u8, u8)>),
}

impl FieldValue {
    fn type_name(&self) -> &'static str {
        match self {
            Self::Int(_) => "an integer",
            Self::Bytes(_) => "bytes",
            Self::Svt(_) => "a temperature",
            Self::Outputs(_) => "an output list",
        }
    }
}

impl From<u8> for FieldValue {
    fn from(v: u8) -> Self {
        Self::Int(u32::from(v))
    }
}

impl From<u16> for FieldValue {
    fn from(v: u16) -> Self {
        Self::Int(u32::from(v))
    }
}

impl From<u32> for FieldValue {
    fn from(v: u32) -> Self {
        Self::Int(v)
    }
}

impl From<&[u8]> for FieldValue {
    fn from(v: &[u8]) -> Self {
        Self::Bytes(v.to_vec())
    }
}

impl<const N: usize> From<&[u8; N]> for FieldValue {
    fn from(v: &[u8; N]) -> Self {
        Self::Bytes(v.to_vec())
    }
}

impl From<Vec<u8>> for FieldValue {
    fn from(v: Vec<u8>) -> Self {
        Self::Bytes(v)
    }
}

impl From<&str> for FieldValue {
    fn from(v: &str) -> Self {
        Self::Bytes(v.as_bytes().to_vec())
    }
}

impl From<Svt> for FieldValue {
    fn from(v: Svt) -> Self {
        Self::Svt(v)
    }
}

impl From<Vec<(u8, u8)>> for FieldValue {
    fn from(v: Vec<(u8, u8)>) -> Self {
        Self::Outputs(v)
    }
}

/// Field values keyed by field name.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(transparent))]
pub struct Fields(BTreeMap<String, FieldValue>);

impl Fields {
    /// Empty field set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insert.
    #[must_use]
    pub fn with(mut self, name: &str, value: impl Into<FieldValue>) -> Self {
        self.insert(name, value);
        self
    }

    /// Insert or replace a value.
    pub fn insert(&mut self, name: &str, value: impl Into<FieldValue>) {
        self.0.insert(name.to_string(), value.into());
    }

    /// Look up a value.
    pub fn get(&self, name: &str) -> Option<&FieldValue> {
        self.0.get(name)
    }

    /// Integer value of a byte, word, int32 or dimmer field.
    pub fn get_int(&self, name: &str) -> Option<u32> {
        match self.get(name)? {
            FieldValue::Int(v) => Some(*v),
            _ => None,
        }
    }

    /// Raw bytes of a string field.
    pub fn get_bytes(&self, name: &str) -> Option<&[u8]> {
        match self.get(name)? {
            FieldValue::Bytes(v) => Some(v),
            _ => None,
        }
    }

    /// String field as text, with invalid UTF-8 replaced.
    pub fn get_str(&self, name: &str) -> Option<String> {
        self.get_bytes(name)
            .map(|b| String::from_utf8_lossy(b).into_owned())
    }

    /// Temperature field.
    pub fn get_svt(&self, name: &str) -> Option<Svt> {
        match self.get(name)? {
            FieldValue::Svt(v) => Some(*v),
            _ => None,
        }
    }

    /// Output list field.
    pub fn get_outputs(&self, name: &str) -> Option<&[(u8, u8)]> {
        match self.get(name)? {
            FieldValue::Outputs(v) => Some(v),
            _ => None,
        }
    }

    /// Number of values.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether there are no values.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Iterate values in name order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &FieldValue)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_byte_range() {
        let f = Field::byte("test");
        assert_eq!(f.encode(Some(&0u8.into())).unwrap(), vec![0]);
        assert_eq!(f.encode(Some(&255u8.into())).unwrap(), vec![255]);
        assert!(matches!(
            f.encode(Some(&FieldValue::Int(1024))),
            Err(Error::Encoding(_))
        ));
    }

    #[test]
    fn test_encode_word_big_endian() {
        let f = Field::word("timer");
        assert_eq!(
            f.encode(Some(&FieldValue::Int(256 + 17))).unwrap(),
            vec![0x01, 0x11]
        );
        assert!(f.encode(Some(&FieldValue::Int(102_400))).is_err());
        assert_eq!(
            f.decode(&[0xFF, 0xFF]),
            Some(FieldValue::Int(0xFFFF))
        );
    }

    #[test]
    fn test_missing_value_is_encoding_error() {
        let err = Field::byte("action_type").encode(None).unwrap_err();
        assert!(err.to_string().contains("action_type"));
    }

    #[test]
    fn test_wrong_type_is_encoding_error() {
        let err = Field::byte("x")
            .encode(Some(&FieldValue::from("a")))
            .unwrap_err();
        assert!(matches!(err, Error::Encoding(_)));
    }

    #[test]
    fn test_str_must_match_length() {
        let f = Field::str("test", 5);
        assert_eq!(f.encode(Some(&"hello".into())).unwrap(), b"hello");
        assert!(f.encode(Some(&"nope".into())).is_err());
    }

    #[test]
    fn test_varstr_pads_with_spaces() {
        let f = Field::varstr("data", 10);
        assert_eq!(
            f.encode(Some(&"".into())).unwrap(),
            b"\x00          ".to_vec()
        );
        assert_eq!(
            f.encode(Some(&"hello".into())).unwrap(),
            b"\x05hello     ".to_vec()
        );
        assert_eq!(
            f.encode(Some(&"helloworld".into())).unwrap(),
            b"\x0Ahelloworld".to_vec()
        );
        assert!(
            Field::varstr("data", 2)
                .encode(Some(&"toolarggge".into()))
                .is_err()
        );
        assert_eq!(
            f.decode(b"\x05hello     "),
            Some(FieldValue::from("hello"))
        );
    }

    #[test]
    fn test_padding_ignores_value() {
        assert_eq!(Field::padding(0).encode(None).unwrap(), Vec::<u8>::new());
        assert_eq!(Field::padding(2).encode(None).unwrap(), vec![0, 0]);
        assert_eq!(Field::padding(3).decode(&[1, 2, 3]), None);
    }

    #[test]
    fn test_svt_encoding() {
        let one = Svt::temperature(1.0).unwrap();
        assert_eq!(one.raw(), 0x42);
        assert_eq!(
            Field::svt("t").encode(Some(&one.into())).unwrap(),
            vec![0x42]
        );

        let hot = Svt::temperature(64.0).unwrap();
        assert!((hot.to_temperature() - 64.0).abs() < f64::EPSILON);
        assert!(Svt::temperature(200.0).is_err());
    }

    #[test]
    fn test_dimmer_scaling() {
        let f = Field::dimmer("dimmer");
        assert_eq!(f.encode(Some(&FieldValue::Int(100))).unwrap(), vec![60]);
        assert_eq!(f.decode(&[16]), Some(FieldValue::Int(26)));
        assert!(f.encode(Some(&FieldValue::Int(101))).is_err());
    }

    #[test]
    fn test_output_list_length() {
        let f = Field::output_list("outputs");
        assert_eq!(f.wire_len(&[]), None);
        assert_eq!(f.wire_len(&[3]), Some(7));
        assert_eq!(
            f.decode(&[2, 5, 16, 1, 2]),
            Some(FieldValue::Outputs(vec![(5, 26), (1, 3)]))
        );
    }

    #[test]
    fn test_fields_accessors() {
        let fields = Fields::new()
            .with("resp", "OK")
            .with("bank", 3u8)
            .with("temp", Svt::from_raw(0x42));

        assert_eq!(fields.get_str("resp").as_deref(), Some("OK"));
        assert_eq!(fields.get_int("bank"), Some(3));
        assert_eq!(fields.get_svt("temp"), Some(Svt::from_raw(0x42)));
        assert_eq!(fields.get_int("resp"), None);
        assert_eq!(fields.len(), 3);
    }
}
