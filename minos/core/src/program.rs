//! Program images as whitespace-separated two-character hex tokens.
//!
//! This is both the shell's load format and the swap-file format, so parse
//! and format have to stay inverses of each other.

use crate::{CoreError, Result};

pub fn parse_hex_tokens(text: &str) -> Result<Vec<u8>> {
    let mut bytes = Vec::new();
    for token in text.split_whitespace() {
        if token.len() != 2 {
            return Err(CoreError::InvalidProgram { token: token.to_string() });
        }
        let byte = u8::from_str_radix(token, 16)
            .map_err(|_| CoreError::InvalidProgram { token: token.to_string() })?;
        bytes.push(byte);
    }
    Ok(bytes)
}

pub fn format_hex_tokens(bytes: &[u8]) -> String {
    bytes.iter().map(|byte| format!("{byte:02X}")).collect::<Vec<_>>().join(" ")
}
