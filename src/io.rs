//! Length-prefixed packet transport over any duplex byte stream.

use std::io::{BufReader, Read, Write};

use crate::codec::Command;
use crate::error::MilterError;

/// Upper bound accepted for one packet. The protocol itself caps BODY
/// chunks at 65535 bytes but REPLBODY carries a full body in one frame, so
/// the limit is generous; anything past it is a hostile length prefix.
pub const MAX_PACKET_SIZE: u32 = 16 * 1024 * 1024;

/// Buffered packet reader/writer. Reads go through a [`BufReader`]; writes
/// go straight to the stream and are flushed, one write per logical action.
pub struct PacketStream<S: Read + Write> {
    inner: BufReader<S>,
}

impl<S: Read + Write> PacketStream<S> {
    pub fn new(stream: S) -> Self {
        PacketStream {
            inner: BufReader::new(stream),
        }
    }

    pub fn get_ref(&self) -> &S {
        self.inner.get_ref()
    }

    /// Write a full buffer and flush. On error the bytes may be partially
    /// written and the connection must be abandoned.
    pub fn write(&mut self, data: &[u8]) -> Result<(), MilterError> {
        let stream = self.inner.get_mut();
        stream.write_all(data)?;
        stream.flush()?;
        Ok(())
    }

    /// Read the next packet: 4-byte big-endian length, then that many bytes
    /// (command byte included in both). PROGRESS keep-alives are consumed
    /// here and never surface to the caller; they only re-arm the peer's
    /// watchdog while the filter is busy.
    pub fn receive_packet(&mut self) -> Result<Vec<u8>, MilterError> {
        loop {
            let mut len_buf = [0u8; 4];
            self.inner.read_exact(&mut len_buf)?;
            let length = u32::from_be_bytes(len_buf);
            if length == 0 {
                return Err(MilterError::Protocol(
                    "zero-length packet, frames carry at least the command byte".to_string(),
                ));
            }
            if length > MAX_PACKET_SIZE {
                return Err(MilterError::Protocol(format!(
                    "packet length {length} exceeds the {MAX_PACKET_SIZE} byte limit"
                )));
            }

            let mut msg = vec![0u8; length as usize];
            self.inner.read_exact(&mut msg)?;

            if length == 1 && msg[0] == Command::Progress.byte() {
                log::debug!("discarding PROGRESS keep-alive");
                continue;
            }
            return Ok(msg);
        }
    }
}

/// In-memory duplex stream for scripted protocol tests: reads come from a
/// canned input buffer, writes accumulate in `output`.
#[cfg(test)]
pub(crate) struct Pipe {
    input: std::io::Cursor<Vec<u8>>,
    pub output: Vec<u8>,
}

#[cfg(test)]
impl Pipe {
    pub fn new(input: Vec<u8>) -> Self {
        Pipe {
            input: std::io::Cursor::new(input),
            output: Vec::new(),
        }
    }
}

#[cfg(test)]
impl Read for Pipe {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        self.input.read(buf)
    }
}

#[cfg(test)]
impl Write for Pipe {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.output.extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec;

    #[test]
    fn receive_packet_returns_command_and_payload() {
        let mut stream = PacketStream::new(Pipe::new(codec::encode_helo("hi", &Default::default())));
        let packet = stream.receive_packet().unwrap();
        assert_eq!(packet, b"Hhi\0");
    }

    #[test]
    fn progress_frames_are_elided() {
        let mut input = codec::encode_progress();
        input.extend_from_slice(&codec::encode_progress());
        input.extend_from_slice(&codec::encode_accept());
        let mut stream = PacketStream::new(Pipe::new(input));
        assert_eq!(stream.receive_packet().unwrap(), b"a");
    }

    #[test]
    fn zero_length_frame_is_rejected() {
        let mut stream = PacketStream::new(Pipe::new(vec![0, 0, 0, 0]));
        assert!(matches!(
            stream.receive_packet(),
            Err(MilterError::Protocol(_))
        ));
    }

    #[test]
    fn oversized_length_is_rejected() {
        let mut stream = PacketStream::new(Pipe::new(vec![0xff, 0xff, 0xff, 0xff]));
        assert!(matches!(
            stream.receive_packet(),
            Err(MilterError::Protocol(_))
        ));
    }

    #[test]
    fn eof_inside_frame_is_an_io_error() {
        // length says 10 bytes, stream ends after 2
        let mut stream = PacketStream::new(Pipe::new(vec![0, 0, 0, 10, b'B', b'x']));
        match stream.receive_packet() {
            Err(MilterError::Io(e)) => {
                assert_eq!(e.kind(), std::io::ErrorKind::UnexpectedEof)
            }
            other => panic!("expected io error, got {other:?}"),
        }
    }

    #[test]
    fn eof_at_frame_boundary_is_an_io_error() {
        let mut stream = PacketStream::new(Pipe::new(Vec::new()));
        assert!(matches!(stream.receive_packet(), Err(MilterError::Io(_))));
    }
}
