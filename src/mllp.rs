//! MLLP block framing codec
//!
//! Each logical message on the wire is one start-of-block byte, one or more
//! carriage-return-delimited HL7 segments, one end-of-block byte, and a
//! trailing carriage return:
//!
//! ```text
//! ┌──────┬────────────────────────────┬──────┬──────┐
//! │ 0x0B │ segment \r segment \r ...  │ 0x1C │ 0x0D │
//! └──────┴────────────────────────────┴──────┴──────┘
//! ```
//!
//! Round-trip property: `decode(&encode(segments))? == segments` for any
//! non-empty sequence of ASCII segments.

use crate::error::{Error, Result};

/// Start-of-block marker byte
pub const START_OF_BLOCK: u8 = 0x0B;
/// End-of-block marker byte
pub const END_OF_BLOCK: u8 = 0x1C;
/// Segment delimiter and trailing byte
pub const CARRIAGE_RETURN: u8 = 0x0D;

/// Fixed HL7 acknowledgment payload sent back after every received frame
pub const ACK_SEGMENTS: [&str; 2] = ["MSH|^~\\&|||||20240129093837||ACK|||2.5", "MSA|AA"];

/// Minimum frame size: start byte + one segment byte + end byte + trailing CR
const MIN_FRAME_LEN: usize = 4;

/// Strip MLLP framing from a received frame, yielding the HL7 segments.
///
/// Verifies the start/end markers so that a truncated or garbled frame is
/// rejected here rather than producing phantom segments downstream.
pub fn decode(buffer: &[u8]) -> Result<Vec<String>> {
    if buffer.len() < MIN_FRAME_LEN {
        return Err(Error::Framing(format!(
            "frame too short: {} bytes",
            buffer.len()
        )));
    }
    if buffer[0] != START_OF_BLOCK {
        return Err(Error::Framing(format!(
            "missing start-of-block: first byte {:#04x}",
            buffer[0]
        )));
    }
    let tail = &buffer[buffer.len() - 3..];
    if tail != [CARRIAGE_RETURN, END_OF_BLOCK, CARRIAGE_RETURN] {
        return Err(Error::Framing(format!(
            "missing end-of-block: trailing bytes {:02x?}",
            tail
        )));
    }

    let body = &buffer[1..buffer.len() - 3];
    if !body.is_ascii() {
        return Err(Error::Framing("non-ASCII bytes in frame body".to_string()));
    }
    // Safe to unwrap into UTF-8 after the ASCII check, but stay on Result
    let text = std::str::from_utf8(body)
        .map_err(|e| Error::Framing(format!("invalid text in frame body: {}", e)))?;

    Ok(text.split('\r').map(str::to_string).collect())
}

/// Wrap HL7 segments in MLLP framing for transmission.
pub fn encode(segments: &[impl AsRef<str>]) -> Vec<u8> {
    let body: Vec<&str> = segments.iter().map(|s| s.as_ref()).collect();
    let mut frame = Vec::with_capacity(body.iter().map(|s| s.len() + 1).sum::<usize>() + 3);
    frame.push(START_OF_BLOCK);
    frame.extend_from_slice(body.join("\r").as_bytes());
    frame.push(CARRIAGE_RETURN);
    frame.push(END_OF_BLOCK);
    frame.push(CARRIAGE_RETURN);
    frame
}

/// The acknowledgment frame, ready to write on the feed socket.
pub fn ack_frame() -> Vec<u8> {
    encode(&ACK_SEGMENTS)
}
