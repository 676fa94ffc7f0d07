//! Control socket wire format.
//!
//! A request is exactly [`REQUEST_LEN`] ASCII bytes: the command name padded
//! with NUL bytes. Toggle commands are answered with [`ACK`]; query commands
//! with a [`DATA_ACK_HEADER_LEN`]-byte header carrying the zero-padded payload
//! length, followed by the payload itself.

use std::fmt;

use crate::errors::{NetcontrolError, Result};

pub const REQUEST_LEN: usize = 16;
pub const ACK: &str = "CTLD_ACK";
pub const DATA_ACK: &str = "CTLD_DATA_ACK";
/// `CTLD_DATA_ACK` + space + six length digits
pub const DATA_ACK_HEADER_LEN: usize = 20;
/// Largest payload length the six-digit header can carry
pub const MAX_PAYLOAD_LEN: usize = 999_999;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ControlCommand {
    DebugOn,
    DebugOff,
    RebalanceOn,
    RebalanceOff,
    RebalanceCount,
    Status,
}

impl ControlCommand {
    pub const ALL: [ControlCommand; 6] = [
        ControlCommand::DebugOn,
        ControlCommand::DebugOff,
        ControlCommand::RebalanceOn,
        ControlCommand::RebalanceOff,
        ControlCommand::RebalanceCount,
        ControlCommand::Status,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ControlCommand::DebugOn => "CTLD_DEBUG_ON",
            ControlCommand::DebugOff => "CTLD_DEBUG_OFF",
            ControlCommand::RebalanceOn => "CTLD_REBAL_ON",
            ControlCommand::RebalanceOff => "CTLD_REBAL_OFF",
            ControlCommand::RebalanceCount => "CTLD_REBAL_CNT",
            ControlCommand::Status => "CTLD_STATUS",
        }
    }

    /// True for commands answered with a data payload instead of a bare ack.
    pub fn expects_data(&self) -> bool {
        matches!(self, ControlCommand::RebalanceCount | ControlCommand::Status)
    }

    /// Parses a raw request. Anything past the command literal must be NUL or
    /// whitespace padding.
    pub fn parse(raw: &[u8]) -> Result<Self> {
        let trimmed = trim_padding(raw);
        let text = std::str::from_utf8(trimmed)
            .map_err(|_| NetcontrolError::UnknownCommand(format!("{trimmed:?}")))?;

        Self::ALL
            .into_iter()
            .find(|cmd| cmd.as_str() == text)
            .ok_or_else(|| NetcontrolError::UnknownCommand(text.to_string()))
    }

    /// Fixed-size request as written on the socket.
    pub fn to_request(&self) -> [u8; REQUEST_LEN] {
        let mut request = [0u8; REQUEST_LEN];
        let literal = self.as_str().as_bytes();
        request[..literal.len()].copy_from_slice(literal);
        request
    }
}

impl fmt::Display for ControlCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

fn trim_padding(raw: &[u8]) -> &[u8] {
    let end = raw
        .iter()
        .rposition(|b| *b != 0 && !b.is_ascii_whitespace())
        .map_or(0, |idx| idx + 1);
    &raw[..end]
}

/// Header announcing a payload of `len` bytes.
pub fn data_ack_header(len: usize) -> String {
    format!("{DATA_ACK} {:06}", len.min(MAX_PAYLOAD_LEN))
}

/// Reads the payload length out of a data header.
pub fn parse_data_ack_header(header: &[u8]) -> Result<usize> {
    let text = std::str::from_utf8(header)
        .map_err(|_| NetcontrolError::MalformedResponse("header is not ascii".into()))?;
    let digits = text
        .strip_prefix(DATA_ACK)
        .map(str::trim)
        .ok_or_else(|| NetcontrolError::MalformedResponse(format!("unexpected header {text:?}")))?;

    digits
        .parse::<usize>()
        .map_err(|_| NetcontrolError::MalformedResponse(format!("bad payload length {digits:?}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn requests_are_nul_padded_to_fixed_length() {
        let request = ControlCommand::RebalanceOff.to_request();
        assert_eq!(request.len(), REQUEST_LEN);
        assert_eq!(&request[..14], b"CTLD_REBAL_OFF");
        assert_eq!(&request[14..], &[0, 0]);
    }

    #[test]
    fn every_command_fits_a_request() {
        for cmd in ControlCommand::ALL {
            assert!(cmd.as_str().len() <= REQUEST_LEN);
            assert_eq!(ControlCommand::parse(&cmd.to_request()).unwrap(), cmd);
        }
    }

    #[test]
    fn parse_accepts_space_padding() {
        assert_eq!(
            ControlCommand::parse(b"CTLD_STATUS     ").unwrap(),
            ControlCommand::Status
        );
    }

    #[test]
    fn parse_rejects_unknown_and_prefixed_commands() {
        for raw in [&b"CTLD_NOPE"[..], b"CTLD_STATUSX", b"", b"\0\0\0", b"ctld_status"] {
            assert!(matches!(
                ControlCommand::parse(raw),
                Err(NetcontrolError::UnknownCommand(_))
            ));
        }
    }

    #[test]
    fn data_header_is_zero_padded() {
        let header = data_ack_header(42);
        assert_eq!(header, "CTLD_DATA_ACK 000042");
        assert_eq!(header.len(), DATA_ACK_HEADER_LEN);
        assert_eq!(parse_data_ack_header(header.as_bytes()).unwrap(), 42);
    }

    #[test]
    fn malformed_header_is_rejected() {
        assert!(parse_data_ack_header(b"CTLD_ACK").is_err());
        assert!(parse_data_ack_header(b"CTLD_DATA_ACK abcdef").is_err());
    }
}
