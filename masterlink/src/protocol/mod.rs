//! Classic master wire protocol.
//!
//! ## Frame Format
//!
//! Requests sent to the master:
//!
//! ```text
//! +-------+--------+-----+------------------------+------+
//! | "STR" | action | cid |  input fields          | CRLF |
//! +-------+--------+-----+------------------------+------+
//! |   3   |   2    |  1  |  per command layout    |  2   |
//! +-------+--------+-----+------------------------+------+
//! ```
//!
//! Replies and unsolicited events sent by the master:
//!
//! ```text
//! +--------+-----+--------------------------------------+
//! | action | cid |  output fields (terminator included)  |
//! +--------+-----+--------------------------------------+
//! |   2    |  1  |  per command layout                   |
//! +--------+-----+--------------------------------------+
//! ```
//!
//! Commands are static descriptors ([`CommandSpec`]) defined in [`api`].

pub mod api;
pub mod command;
pub mod field;

use std::fmt::Write as _;

pub use {
    command::{CommandSpec, Decoded, MatchHint},
    field::{Field, FieldKind, FieldValue, Fields, Svt},
};

/// Render bytes as a decimal dump followed by their printable ASCII.
///
/// Non-printable bytes show as `.` in the ASCII column.
pub fn printable(data: &[u8]) -> String {
    let mut out = String::with_capacity(data.len() * 5 + 4);
    for (i, b) in data.iter().enumerate() {
        if i > 0 {
            out.push(' ');
        }
        let _ = write!(out, "{b:3}");
    }
    out.push_str("    ");
    out.extend(data.iter().map(|&b| {
        if (33..=126).contains(&b) {
            char::from(b)
        } else {
            '.'
        }
    }));
    out
}
