//! Radio link framing
//!
//! The camera board sits on the other end of a transparent serial radio module
//! (HC-12 style): whatever bytes go into the UART come out of the peer's UART.
//! Messages are fixed 13 byte frames:
//!
//! | byte  | content                         |
//! |-------|---------------------------------|
//! | 0     | start byte `0xA5`               |
//! | 1-6   | destination address             |
//! | 7     | opcode                          |
//! | 8-11  | payload, u32 little endian      |
//! | 12    | XOR of bytes 1-11               |
//!
//! There is no acknowledgement, retry or sequence matching at this layer.

use embedded_io_async::{Read, ReadExactError, Write};

/// Encoded frame size
pub const FRAME_LEN: usize = 13;

/// Marks the beginning of a frame
const START_BYTE: u8 = 0xA5;

/// Six byte station address
pub type PeerAddress = [u8; 6];

/// Message kinds
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Opcode {
    /// Robot → camera: take a picture now
    TakePicture,
    /// Camera → robot: picture taken
    Done,
    /// Anything else, kept so receivers can log and ignore it
    Unknown(u8),
}

impl From<u8> for Opcode {
    fn from(raw: u8) -> Self {
        match raw {
            0x01 => Opcode::TakePicture,
            0x02 => Opcode::Done,
            other => Opcode::Unknown(other),
        }
    }
}

impl From<Opcode> for u8 {
    fn from(opcode: Opcode) -> Self {
        match opcode {
            Opcode::TakePicture => 0x01,
            Opcode::Done => 0x02,
            Opcode::Unknown(raw) => raw,
        }
    }
}

/// One radio message
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Frame {
    pub dest: PeerAddress,
    pub opcode: Opcode,
    pub payload: u32,
}

/// Reasons a received frame is rejected
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum FrameError {
    /// First byte was not the start byte
    BadStart(u8),
    /// Checksum did not match the content
    Checksum { expected: u8, found: u8 },
}

/// Transport failure
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum LinkError<E> {
    /// The byte stream ended
    Closed,
    Io(E),
}

impl<E> From<ReadExactError<E>> for LinkError<E> {
    fn from(err: ReadExactError<E>) -> Self {
        match err {
            ReadExactError::UnexpectedEof => LinkError::Closed,
            ReadExactError::Other(e) => LinkError::Io(e),
        }
    }
}

fn checksum(body: &[u8]) -> u8 {
    body.iter().fold(0, |acc, byte| acc ^ byte)
}

impl Frame {
    pub fn new(dest: PeerAddress, opcode: Opcode, payload: u32) -> Self {
        Self { dest, opcode, payload }
    }

    pub fn encode(&self) -> [u8; FRAME_LEN] {
        let mut bytes = [0u8; FRAME_LEN];
        bytes[0] = START_BYTE;
        bytes[1..7].copy_from_slice(&self.dest);
        bytes[7] = self.opcode.into();
        bytes[8..12].copy_from_slice(&self.payload.to_le_bytes());
        bytes[12] = checksum(&bytes[1..12]);
        bytes
    }

    pub fn decode(bytes: &[u8; FRAME_LEN]) -> Result<Self, FrameError> {
        if bytes[0] != START_BYTE {
            return Err(FrameError::BadStart(bytes[0]));
        }
        let expected = checksum(&bytes[1..12]);
        if expected != bytes[12] {
            return Err(FrameError::Checksum {
                expected,
                found: bytes[12],
            });
        }

        let mut dest = [0u8; 6];
        dest.copy_from_slice(&bytes[1..7]);
        Ok(Self {
            dest,
            opcode: Opcode::from(bytes[7]),
            payload: u32::from_le_bytes([bytes[8], bytes[9], bytes[10], bytes[11]]),
        })
    }
}

/// Outbound half of the link
#[allow(async_fn_in_trait)]
pub trait FrameSink {
    type Error;

    async fn send(&mut self, frame: &Frame) -> Result<(), LinkError<Self::Error>>;
}

/// Writes frames to a byte stream
pub struct FrameWriter<W> {
    writer: W,
}

impl<W: Write> FrameWriter<W> {
    pub fn new(writer: W) -> Self {
        Self { writer }
    }
}

impl<W: Write> FrameSink for FrameWriter<W> {
    type Error = W::Error;

    async fn send(&mut self, frame: &Frame) -> Result<(), LinkError<Self::Error>> {
        self.writer.write_all(&frame.encode()).await.map_err(LinkError::Io)?;
        self.writer.flush().await.map_err(LinkError::Io)
    }
}

/// Reads frames addressed to this station from a byte stream
pub struct FrameReader<R> {
    reader: R,
    local: PeerAddress,
}

impl<R: Read> FrameReader<R> {
    pub fn new(reader: R, local: PeerAddress) -> Self {
        Self { reader, local }
    }

    /// Waits for the next valid frame addressed to us.
    ///
    /// Garbage and corrupt frames are skipped by realigning on the next start
    /// byte; frames for other stations are dropped whole.
    pub async fn receive(&mut self) -> Result<Frame, LinkError<R::Error>> {
        let mut buf = [0u8; FRAME_LEN];
        let mut filled = 0;

        loop {
            self.reader.read_exact(&mut buf[filled..]).await?;

            if buf[0] == START_BYTE {
                match Frame::decode(&buf) {
                    Ok(frame) if frame.dest == self.local => return Ok(frame),
                    Ok(frame) => {
                        debug!("Dropping frame for {:?}", frame.dest);
                        filled = 0;
                        continue;
                    }
                    Err(e) => warn!("Corrupt radio frame: {:?}", e),
                }
            }

            // drop the head byte and realign on the next start byte
            let next = buf[1..]
                .iter()
                .position(|&byte| byte == START_BYTE)
                .map_or(FRAME_LEN, |offset| offset + 1);
            buf.copy_within(next.., 0);
            filled = FRAME_LEN - next;
        }
    }
}
