// Mirror link wire grammar - separates byte-level parsing/encoding from transport I/O
//
// Every packet starts with the magic byte 0xDA followed by a kind byte that
// dispatches between frame data, server commands, and (client-to-server)
// acknowledgements. All multi-byte integers are little-endian with no padding.

use bytes::Buf;
use num_enum::TryFromPrimitive;
use thiserror::Error;

/// First byte of every packet in either direction.
pub const MAGIC: u8 = 0xDA;
/// Kind byte for a frame packet (server to client).
pub const KIND_FRAME: u8 = 0x7E;
/// Kind byte for a command packet (server to client).
pub const KIND_COMMAND: u8 = 0x7F;
/// Kind byte for an acknowledgement (client to server).
pub const KIND_ACK: u8 = 0x7A;

/// Frame flag bit: payload is a complete keyframe rather than an XOR delta.
pub const FLAG_KEYFRAME: u8 = 0x01;

/// Fixed frame-packet tail after the two magic bytes: flags + seq + length.
pub const FRAME_HEADER_LEN: usize = 9;
/// An ack is always exactly this many bytes.
pub const ACK_LEN: usize = 6;
/// A compressed payload may exceed the frame's pixel count by at most this much.
pub const MAX_COMPRESSED_SLACK: usize = 256;
/// Upper bound on either frame dimension.
pub const MAX_DIMENSION: u32 = 4096;

/// Server command opcodes.
///
/// Opcodes other than `Resolution` carry a single value byte; unknown opcodes
/// are consumed the same way and ignored so the stream stays in sync.
#[derive(TryFromPrimitive)]
#[repr(u8)]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Opcode {
    /// Set the display backlight brightness (0..=255).
    Brightness = 0x01,
    /// Set the display backlight warmth (0..=255).
    Warmth = 0x02,
    /// Change the stream resolution; body is `w:u16 h:u16`.
    Resolution = 0x04,
}

/// Decoded command packet body.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Command {
    Brightness(u8),
    Warmth(u8),
    Resolution { width: u16, height: u16 },
    /// Opcode the client does not understand. One value byte has already been
    /// consumed from the stream; the command is otherwise ignored.
    Unknown { opcode: u8, value: u8 },
}

/// Fixed 9-byte tail of a frame packet: `flags:u8 seq:u32 length:u32`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FrameHeader {
    pub flags: u8,
    pub seq: u32,
    pub length: u32,
}

impl FrameHeader {
    /// Decode the fixed tail that follows the `0xDA 0x7E` magic.
    pub fn decode(raw: &[u8; FRAME_HEADER_LEN]) -> Self {
        let mut buf = &raw[..];
        FrameHeader {
            flags: buf.get_u8(),
            seq: buf.get_u32_le(),
            length: buf.get_u32_le(),
        }
    }

    /// Whether the payload replaces the current frame outright.
    pub fn keyframe(&self) -> bool {
        self.flags & FLAG_KEYFRAME != 0
    }
}

/// One packet as read off the wire.
///
/// Frame payloads borrow the connection's reusable compressed buffer; they
/// must be consumed before the next read.
#[derive(Debug)]
pub enum Packet<'a> {
    Frame {
        header: FrameHeader,
        payload: &'a [u8],
    },
    Command(Command),
}

/// Encode an acknowledgement for `seq`.
pub fn encode_ack(seq: u32) -> [u8; ACK_LEN] {
    let s = seq.to_le_bytes();
    [MAGIC, KIND_ACK, s[0], s[1], s[2], s[3]]
}

/// Decode the command body bytes that follow `0xDA 0x7F cmd`.
///
/// `body` is the raw bytes the transport read for this opcode: four bytes for
/// `Resolution`, one value byte for everything else.
pub fn decode_command(opcode: u8, mut body: &[u8]) -> Command {
    match Opcode::try_from(opcode) {
        Ok(Opcode::Resolution) => Command::Resolution {
            width: body.get_u16_le(),
            height: body.get_u16_le(),
        },
        Ok(Opcode::Brightness) => Command::Brightness(body.get_u8()),
        Ok(Opcode::Warmth) => Command::Warmth(body.get_u8()),
        Err(_) => Command::Unknown {
            opcode,
            value: body.get_u8(),
        },
    }
}

/// Codec errors. Every variant is fatal to the connection: the stream has no
/// resynchronization mechanism, so a framing violation means the link is gone.
#[derive(Debug, Error)]
pub enum CodecError {
    #[error("bad magic byte: {0:#04x}")]
    BadMagic(u8),

    #[error("unknown packet kind: {0:#04x}")]
    UnknownKind(u8),

    #[error("payload length {length} exceeds limit {max}")]
    OversizedPayload { length: u32, max: usize },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
