// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Ownership markers.
//!
//! Every artifact gitid generates for an identity carries a short tag of the
//! form `[gitid:<name>]`. For SSH keys the tag lives in the key comment, for
//! git configs it lives in the header comment. Once an identity disappears
//! from the identity store, the marker is the only thing left that ties an
//! artifact back to the identity that owns it.

const OPEN: &str = "[gitid:";
const CLOSE: char = ']';

/// Format ownership marker for identity.
pub fn format_marker(name: &str) -> String {
    format!("{OPEN}{name}{CLOSE}")
}

/// Extract identity name from first ownership marker found in text.
///
/// Returns `None` if there is no marker, or if the marker is malformed, i.e.,
/// unterminated, empty, or containing whitespace.
pub fn parse_marker(text: &str) -> Option<&str> {
    let start = text.find(OPEN)? + OPEN.len();
    let rest = &text[start..];
    let name = &rest[..rest.find(CLOSE)?];

    if name.is_empty() || name.chars().any(char::is_whitespace) {
        return None;
    }

    Some(name)
}

/// Comment embedded into an identity's public key.
pub fn key_comment(email: &str, name: &str) -> String {
    format!("{email} {}", format_marker(name))
}
