//! WebSocket frame validation, encoding, and decoding.
//!
//! This is the leaf component in the dependency graph: the connection state
//! machine and transport adapters both sit on top of [`Frame`], but this
//! module depends on nothing else in the crate beyond [`crate::error`].

use derive_more::Display;

use crate::error::ErrorKind;

/// Maximum payload size, in bytes, a WebSocket control frame may carry.
pub const MAX_CONTROL_FRAME_LEN: usize = 125;

/// Close codes that must never be sent or accepted on the wire.
const RESERVED_CLOSE_CODES: [u16; 4] = [1004, 1005, 1006, 1015];

/// A parsed WebSocket close frame body.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct CloseFrame {
    /// The close code, if one was present.
    pub code: Option<u16>,
    /// The UTF-8 reason bytes accompanying the code (empty if absent).
    pub reason: Vec<u8>,
}

/// A single WebSocket frame, in the shape the core operates on.
///
/// `Ping`/`Pong` cover both the bare and payload-carrying variants from
/// spec.md §4.1 by defaulting to an empty payload; `Close` likewise covers
/// `close`, `close(code)`, and `close(code, reason_bytes)` via
/// [`CloseFrame`].
#[derive(Clone, Debug, PartialEq)]
pub enum Frame {
    /// A text frame; payload is validated as UTF-8 by [`validate`].
    Text(Vec<u8>),
    /// A binary frame; payload is opaque to the codec.
    Binary(Vec<u8>),
    /// A ping control frame.
    Ping(Vec<u8>),
    /// A pong control frame.
    Pong(Vec<u8>),
    /// A close frame, with an optional code and reason.
    Close(Option<CloseFrame>),
}

/// Error produced by [`validate`] or [`decode`].
#[derive(Clone, Copy, Debug, Display, Eq, PartialEq)]
pub enum FrameError {
    /// Text frame payload was not valid UTF-8.
    #[display(fmt = "invalid text data")]
    InvalidTextData,
    /// Binary frame payload was rejected.
    #[display(fmt = "invalid binary data")]
    InvalidBinaryData,
    /// A control frame payload exceeded [`MAX_CONTROL_FRAME_LEN`] bytes.
    #[display(fmt = "control frame too large")]
    ControlFrameTooLarge,
    /// Close code fell outside the valid ranges.
    #[display(fmt = "invalid close code")]
    InvalidCloseCode,
    /// Close code is in [`RESERVED_CLOSE_CODES`].
    #[display(fmt = "reserved close code")]
    ReservedCloseCode,
    /// Frame could not be parsed at all.
    #[display(fmt = "invalid frame")]
    InvalidFrame,
}

impl From<FrameError> for ErrorKind {
    fn from(e: FrameError) -> Self {
        match e {
            FrameError::InvalidTextData => ErrorKind::InvalidTextData,
            FrameError::InvalidBinaryData => ErrorKind::InvalidBinaryData,
            FrameError::ControlFrameTooLarge => ErrorKind::ControlFrameTooLarge,
            FrameError::InvalidCloseCode => ErrorKind::InvalidCloseCode,
            FrameError::ReservedCloseCode => ErrorKind::ReservedCloseCode,
            FrameError::InvalidFrame => ErrorKind::InvalidFrame,
        }
    }
}

/// Validates a close code per spec.md §4.1/§8's boundary table.
///
/// # Errors
///
/// Returns [`FrameError::ReservedCloseCode`] for codes that must never
/// appear on the wire, and [`FrameError::InvalidCloseCode`] for anything
/// outside the valid ranges.
pub fn validate_close_code(code: u16) -> Result<(), FrameError> {
    if RESERVED_CLOSE_CODES.contains(&code) {
        return Err(FrameError::ReservedCloseCode);
    }
    let in_range = (1000..=1003).contains(&code)
        || (1007..=1014).contains(&code)
        || (3000..=4999).contains(&code);
    if in_range {
        Ok(())
    } else {
        Err(FrameError::InvalidCloseCode)
    }
}

/// Validates a [`Frame`] against the rules in spec.md §4.1.
///
/// # Errors
///
/// See [`FrameError`] for the conditions under which each variant is
/// returned.
pub fn validate(frame: &Frame) -> Result<(), FrameError> {
    match frame {
        Frame::Text(bytes) => {
            std::str::from_utf8(bytes).map_err(|_| FrameError::InvalidTextData)?;
            Ok(())
        }
        Frame::Binary(_) => Ok(()),
        Frame::Ping(payload) | Frame::Pong(payload) => {
            if payload.len() > MAX_CONTROL_FRAME_LEN {
                Err(FrameError::ControlFrameTooLarge)
            } else {
                Ok(())
            }
        }
        Frame::Close(None) => Ok(()),
        Frame::Close(Some(close)) => {
            if close.reason.len() > MAX_CONTROL_FRAME_LEN {
                return Err(FrameError::ControlFrameTooLarge);
            }
            match close.code {
                Some(code) => validate_close_code(code),
                None => Ok(()),
            }
        }
    }
}

/// Encodes a [`Frame`] into its wire-ready, normalized form.
///
/// Normalizes a bare `close(code)` into `close(code, "")`, matching the
/// transport-facing shape spec.md §4.1 describes. Callers must [`validate`]
/// the frame first; `encode` does not re-validate.
#[must_use]
pub fn encode(frame: Frame) -> Frame {
    match frame {
        Frame::Close(Some(close)) if close.reason.is_empty() && close.code.is_some() => {
            Frame::Close(Some(CloseFrame { code: close.code, reason: Vec::new() }))
        }
        other => other,
    }
}

/// Decodes raw wire bytes for a given opcode into a [`Frame`].
///
/// `opcode` follows the WebSocket base framing opcodes: `0x1` text, `0x2`
/// binary, `0x8` close, `0x9` ping, `0xA` pong.
///
/// # Errors
///
/// Returns [`FrameError::InvalidFrame`] for an unrecognized opcode or a
/// close frame whose body is shorter than two bytes but non-empty.
pub fn decode(opcode: u8, payload: &[u8]) -> Result<Frame, FrameError> {
    match opcode {
        0x1 => Ok(Frame::Text(payload.to_vec())),
        0x2 => Ok(Frame::Binary(payload.to_vec())),
        0x9 => Ok(Frame::Ping(payload.to_vec())),
        0xA => Ok(Frame::Pong(payload.to_vec())),
        0x8 => {
            if payload.is_empty() {
                Ok(Frame::Close(None))
            } else if payload.len() >= 2 {
                let code = u16::from_be_bytes([payload[0], payload[1]]);
                Ok(Frame::Close(Some(CloseFrame {
                    code: Some(code),
                    reason: payload[2..].to_vec(),
                })))
            } else {
                Err(FrameError::InvalidFrame)
            }
        }
        _ => Err(FrameError::InvalidFrame),
    }
}

/// Returns a human-readable meaning for a WebSocket close code.
#[must_use]
pub fn close_code_meaning(code: u16) -> String {
    match code {
        1000 => "normal closure".to_owned(),
        1001 => "going away".to_owned(),
        1002 => "protocol error".to_owned(),
        1003 => "unsupported data".to_owned(),
        1007 => "invalid frame payload data".to_owned(),
        1008 => "policy violation".to_owned(),
        1009 => "message too big".to_owned(),
        1010 => "mandatory extension".to_owned(),
        1011 => "internal server error".to_owned(),
        1012 => "service restart".to_owned(),
        1013 => "try again later".to_owned(),
        1014 => "bad gateway".to_owned(),
        1004 | 1005 | 1006 | 1015 => format!("reserved code {code}"),
        3000..=3999 => format!("registered code {code}"),
        4000..=4999 => format!("private-use code {code}"),
        other => format!("unknown code {other}"),
    }
}

#[cfg(test)]
mod tests {
    use super::{
        close_code_meaning, decode, encode, validate, validate_close_code, CloseFrame, Frame,
        FrameError, MAX_CONTROL_FRAME_LEN,
    };

    #[test]
    fn close_code_boundaries() {
        for ok in [1000, 1003, 1007, 1014, 3000, 4999] {
            assert_eq!(validate_close_code(ok), Ok(()));
        }
        for reserved in [1004, 1005, 1006, 1015] {
            assert_eq!(validate_close_code(reserved), Err(FrameError::ReservedCloseCode));
        }
        for invalid in [999, 1016, 2999, 5000] {
            assert_eq!(validate_close_code(invalid), Err(FrameError::InvalidCloseCode));
        }
    }

    #[test]
    fn control_frame_size() {
        let ok = Frame::Ping(vec![0; MAX_CONTROL_FRAME_LEN]);
        assert_eq!(validate(&ok), Ok(()));
        let too_big = Frame::Ping(vec![0; MAX_CONTROL_FRAME_LEN + 1]);
        assert_eq!(validate(&too_big), Err(FrameError::ControlFrameTooLarge));
    }

    #[test]
    fn reserved_close_code_rejected_before_send() {
        let frame = Frame::Close(Some(CloseFrame { code: Some(1005), reason: Vec::new() }));
        assert_eq!(validate(&frame), Err(FrameError::ReservedCloseCode));
    }

    #[test]
    fn validate_encode_preserves_validity() {
        let frames = vec![
            Frame::Text(b"hello".to_vec()),
            Frame::Binary(vec![1, 2, 3]),
            Frame::Ping(Vec::new()),
            Frame::Close(Some(CloseFrame { code: Some(1000), reason: Vec::new() })),
        ];
        for frame in frames {
            assert_eq!(validate(&frame), Ok(()));
            let encoded = encode(frame);
            assert_eq!(validate(&encoded), Ok(()));
        }
    }

    #[test]
    fn decode_encode_roundtrip_for_in_range_frames() {
        let text = decode(0x1, b"hi").unwrap();
        assert_eq!(text, Frame::Text(b"hi".to_vec()));

        let close = decode(0x8, &[0x03, 0xE8, b'b', b'y', b'e']).unwrap();
        assert_eq!(
            close,
            Frame::Close(Some(CloseFrame { code: Some(1000), reason: b"bye".to_vec() }))
        );
    }

    #[test]
    fn close_with_bare_code_normalizes_reason() {
        let frame = Frame::Close(Some(CloseFrame { code: Some(1000), reason: Vec::new() }));
        assert_eq!(encode(frame.clone()), frame);
    }

    #[test]
    fn meaning_is_never_empty() {
        assert!(!close_code_meaning(1000).is_empty());
        assert!(!close_code_meaning(4999).is_empty());
    }
}
