//! Command descriptors: encoding requests and incrementally decoding replies.

use {
    super::field::{Field, FieldKind, Fields},
    crate::error::{Error, Result},
    byteorder::{BigEndian, ByteOrder},
};

/// Prefix of every request frame.
pub const REQUEST_PREFIX: &[u8] = b"STR";

/// Suffix of every request frame.
pub const REQUEST_SUFFIX: &[u8] = b"\r\n";

/// Bytes before the first field of a reply: action (2) + correlation id (1).
pub const REPLY_HEADER_LEN: usize = 3;

/// Offset of the correlation id in a reply frame.
pub const CID_OFFSET: usize = 2;

/// A byte that must sit at a given offset for a frame to match.
///
/// Narrows the candidates when several layouts share a header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MatchHint {
    /// Offset from the start of the frame.
    pub offset: usize,
    /// Expected byte.
    pub value: u8,
}

impl MatchHint {
    /// Hint matching a correlation id.
    pub const fn cid(cid: u8) -> Self {
        Self {
            offset: CID_OFFSET,
            value: cid,
        }
    }
}

/// Outcome of matching a buffer against a command layout.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decoded {
    /// A complete frame with a valid checksum (if the layout has one).
    Frame {
        /// Bytes taken from the start of the buffer.
        consumed: usize,
        /// Correlation id carried by the frame.
        cid: u8,
        /// Decoded output values.
        fields: Fields,
    },
    /// A complete frame whose checksum did not match; still consumed.
    Corrupt {
        /// Bytes taken from the start of the buffer.
        consumed: usize,
        /// Correlation id carried by the frame.
        cid: u8,
        /// Checksum computed over the payload.
        expected: u16,
        /// Checksum carried by the frame.
        actual: u16,
    },
    /// The buffer is a prefix of a possible frame.
    Incomplete,
    /// The buffer does not start with this command; advance one byte.
    NoMatch,
}

/// Immutable description of one master command.
#[derive(Debug)]
pub struct CommandSpec {
    action: &'static str,
    input: &'static [Field],
    output: Option<&'static [Field]>,
}

impl CommandSpec {
    /// Describe a command. `action` must be two ASCII characters.
    ///
    /// Commands without `output` get no reply from the master.
    pub const fn new(
        action: &'static str,
        input: &'static [Field],
        output: Option<&'static [Field]>,
    ) -> Self {
        assert!(action.len() == 2, "action must be two bytes");
        Self {
            action,
            input,
            output,
        }
    }

    /// Two-character action code.
    pub fn action(&self) -> &'static str {
        self.action
    }

    /// Input layout.
    pub fn input_fields(&self) -> &'static [Field] {
        self.input
    }

    /// Output layout, if the master answers this command.
    pub fn output_fields(&self) -> Option<&'static [Field]> {
        self.output
    }

    /// Whether the master answers this command.
    pub fn expects_reply(&self) -> bool {
        self.output.is_some()
    }

    /// Encode a request frame.
    pub fn create_input(&self, cid: u8, fields: &Fields) -> Result<Vec<u8>> {
        let mut frame = Vec::with_capacity(32);
        frame.extend_from_slice(REQUEST_PREFIX);
        frame.extend_from_slice(self.action.as_bytes());
        frame.push(cid);
        for field in self.input {
            frame.extend(field.encode(fields.get(field.name()))?);
        }
        frame.extend_from_slice(REQUEST_SUFFIX);
        Ok(frame)
    }

    /// Encode a reply frame the way the master would.
    ///
    /// A `crc` value in `fields` is written as given; otherwise the checksum
    /// is computed. Used by simulators and tests.
    pub fn create_output(&self, cid: u8, fields: &Fields) -> Result<Vec<u8>> {
        let layout = self.output.ok_or_else(|| {
            Error::Encoding(format!("command {} has no reply", self.action))
        })?;

        let mut frame = Vec::with_capacity(32);
        frame.extend_from_slice(self.action.as_bytes());
        frame.push(cid);
        for field in layout {
            match (field.kind(), fields.get(field.name())) {
                (FieldKind::Crc, None) => {
                    let sum = checksum(&frame[REPLY_HEADER_LEN..]);
                    frame.push(b'C');
                    frame.extend_from_slice(&sum.to_be_bytes());
                },
                (_, value) => frame.extend(field.encode(value)?),
            }
        }
        Ok(frame)
    }

    /// Try to decode a reply at the start of `buf`.
    ///
    /// A checksum mismatch still consumes the whole frame so the stream
    /// keeps moving.
    pub fn try_decode(&self, buf: &[u8], hint: Option<MatchHint>) -> Decoded {
        let Some(layout) = self.output else {
            return Decoded::NoMatch;
        };

        let action = self.action.as_bytes();
        let head = buf.len().min(action.len());
        if buf[..head] != action[..head] {
            return Decoded::NoMatch;
        }
        if hint.is_some_and(|h| buf.get(h.offset).is_some_and(|&b| b != h.value)) {
            return Decoded::NoMatch;
        }
        if buf.len() < REPLY_HEADER_LEN {
            return Decoded::Incomplete;
        }

        let cid = buf[CID_OFFSET];
        let mut pos = REPLY_HEADER_LEN;
        let mut fields = Fields::new();
        let mut bad_crc = None;

        for field in layout {
            let rest = &buf[pos..];
            if let FieldKind::Literal(expected) = field.kind() {
                let n = rest.len().min(expected.len());
                if rest[..n] != expected[..n] {
                    return Decoded::NoMatch;
                }
            }

            let Some(len) = field.wire_len(rest) else {
                return Decoded::Incomplete;
            };
            if rest.len() < len {
                return Decoded::Incomplete;
            }
            let data = &rest[..len];

            if field.kind() == FieldKind::Crc {
                let expected = checksum(&buf[REPLY_HEADER_LEN..pos]);
                let actual = BigEndian::read_u16(&data[1..]);
                if data[0] != b'C' || expected != actual {
                    bad_crc = Some((expected, actual));
                }
            }
            if let Some(value) = field.decode(data) {
                fields.insert(field.name(), value);
            }
            pos += len;
        }

        match bad_crc {
            Some((expected, actual)) => Decoded::Corrupt {
                consumed: pos,
                cid,
                expected,
                actual,
            },
            None => Decoded::Frame {
                consumed: pos,
                cid,
                fields,
            },
        }
    }
}

/// Sum of all bytes, truncated to 16 bits.
pub fn checksum(payload: &[u8]) -> u16 {
    payload
        .iter()
        .fold(0u16, |acc, &b| acc.wrapping_add(u16::from(b)))
}
