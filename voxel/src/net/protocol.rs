//! Binary framing of chunk transfers.
//!
//! A client sends a fixed 12 byte [ChunkRequest], the server answers with a fixed 20 byte [ChunkHeader]
//! followed by two bytes per voxel. All integers are little-endian and signed chunk coordinates travel as
//! their two's-complement bit pattern. A connection carries one request at a time.

use std::io::{ErrorKind, Read, Write};
use std::mem::size_of;

use static_assertions::const_assert_eq;

use crate::error::{ProtocolError, TransportError, WireError};
use crate::world::chunk::Chunk;
use crate::world::chunk_data::ChunkDimensions;
use crate::world::location::ChunkLocation;

pub const REQUEST_LEN: usize = 3 * size_of::<u32>();
/// Two trailing zero bytes pad the header
pub const HEADER_LEN: usize = 3 * size_of::<u32>() + 3 * size_of::<u16>() + 2;
pub const BYTES_PER_VOXEL: usize = 2;
/// Largest payload a header may announce, a 512×128×512 chunk
pub const MAX_PAYLOAD_LEN: usize = 64 * 1024 * 1024;

const_assert_eq!(REQUEST_LEN, 12);
const_assert_eq!(HEADER_LEN, 20);

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct ChunkRequest {
    pub chunk_x: u32,
    /// Unused, clients send 0
    pub chunk_y: u32,
    pub chunk_z: u32,
}

impl ChunkRequest {
    pub fn for_location(location: ChunkLocation) -> Self {
        Self {
            chunk_x: location.x as u32,
            chunk_y: 0,
            chunk_z: location.z as u32,
        }
    }

    pub fn location(&self) -> ChunkLocation {
        ChunkLocation::new(self.chunk_x as i32, self.chunk_z as i32)
    }

    pub fn encode(&self) -> [u8; REQUEST_LEN] {
        let mut bytes = [0; REQUEST_LEN];
        bytes[0..4].copy_from_slice(&self.chunk_x.to_le_bytes());
        bytes[4..8].copy_from_slice(&self.chunk_y.to_le_bytes());
        bytes[8..12].copy_from_slice(&self.chunk_z.to_le_bytes());
        bytes
    }

    pub fn decode(bytes: &[u8; REQUEST_LEN]) -> Self {
        Self {
            chunk_x: read_u32(bytes, 0),
            chunk_y: read_u32(bytes, 4),
            chunk_z: read_u32(bytes, 8),
        }
    }
}

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct ChunkHeader {
    pub chunk_x: u32,
    pub chunk_y: u32,
    pub chunk_z: u32,
    pub width: u16,
    pub height: u16,
    pub depth: u16,
}

impl ChunkHeader {
    pub fn new(location: ChunkLocation, dimensions: ChunkDimensions) -> Result<Self, ProtocolError> {
        let field = |value: usize| u16::try_from(value).map_err(|_| ProtocolError::DimensionTooLarge(value));

        Self {
            chunk_x: location.x as u32,
            chunk_y: 0,
            chunk_z: location.z as u32,
            width: field(dimensions.width)?,
            height: field(dimensions.height)?,
            depth: field(dimensions.depth)?,
        }
        .validated()
    }

    /// Rejects empty chunks and payloads above [MAX_PAYLOAD_LEN] before anything gets allocated for them.
    fn validated(self) -> Result<Self, ProtocolError> {
        if self.dimensions().is_empty() {
            return Err(ProtocolError::EmptyDimensions(self.dimensions()));
        }

        let len = self.width as u64 * self.height as u64 * self.depth as u64 * BYTES_PER_VOXEL as u64;
        if len > MAX_PAYLOAD_LEN as u64 {
            return Err(ProtocolError::PayloadTooLarge {
                len,
                max: MAX_PAYLOAD_LEN,
            });
        }

        Ok(self)
    }

    pub fn location(&self) -> ChunkLocation {
        ChunkLocation::new(self.chunk_x as i32, self.chunk_z as i32)
    }

    pub fn dimensions(&self) -> ChunkDimensions {
        ChunkDimensions::new(self.width as usize, self.height as usize, self.depth as usize)
    }

    pub fn payload_len(&self) -> usize {
        self.dimensions().volume() * BYTES_PER_VOXEL
    }

    pub fn encode(&self) -> [u8; HEADER_LEN] {
        let mut bytes = [0; HEADER_LEN];
        bytes[0..4].copy_from_slice(&self.chunk_x.to_le_bytes());
        bytes[4..8].copy_from_slice(&self.chunk_y.to_le_bytes());
        bytes[8..12].copy_from_slice(&self.chunk_z.to_le_bytes());
        bytes[12..14].copy_from_slice(&self.width.to_le_bytes());
        bytes[14..16].copy_from_slice(&self.height.to_le_bytes());
        bytes[16..18].copy_from_slice(&self.depth.to_le_bytes());
        bytes
    }

    pub fn decode(bytes: &[u8; HEADER_LEN]) -> Result<Self, ProtocolError> {
        Self {
            chunk_x: read_u32(bytes, 0),
            chunk_y: read_u32(bytes, 4),
            chunk_z: read_u32(bytes, 8),
            width: read_u16(bytes, 12),
            height: read_u16(bytes, 14),
            depth: read_u16(bytes, 16),
        }
        .validated()
    }
}

/// A complete response as it came off the wire.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ChunkPayload {
    pub header: ChunkHeader,
    pub bytes: Vec<u8>,
}

impl ChunkPayload {
    pub fn from_chunk(chunk: &Chunk) -> Result<Self, ProtocolError> {
        Ok(Self {
            header: ChunkHeader::new(chunk.location, chunk.dimensions())?,
            bytes: chunk.data.to_wire_bytes(),
        })
    }

    pub fn decode_chunk(&self) -> Result<Chunk, ProtocolError> {
        Chunk::from_wire_bytes(self.header.location(), self.header.dimensions(), &self.bytes)
    }
}

fn read_u32(bytes: &[u8], offset: usize) -> u32 {
    u32::from_le_bytes([bytes[offset], bytes[offset + 1], bytes[offset + 2], bytes[offset + 3]])
}

fn read_u16(bytes: &[u8], offset: usize) -> u16 {
    u16::from_le_bytes([bytes[offset], bytes[offset + 1]])
}

/// Fills `buf` completely, retrying short and interrupted reads.
/// A socket read timeout surfaces as [TransportError::TimedOut] with the bytes received so far.
pub fn read_full<R: Read>(reader: &mut R, buf: &mut [u8]) -> Result<(), TransportError> {
    let mut filled = 0;

    while filled < buf.len() {
        match reader.read(&mut buf[filled..]) {
            Ok(0) => {
                return Err(TransportError::ConnectionClosed {
                    received: filled,
                    expected: buf.len(),
                });
            }
            Ok(n) => filled += n,
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            // sockets report an elapsed read timeout as either kind depending on the platform
            Err(e) if matches!(e.kind(), ErrorKind::WouldBlock | ErrorKind::TimedOut) => {
                return Err(TransportError::TimedOut {
                    received: filled,
                    expected: buf.len(),
                });
            }
            Err(e) => return Err(e.into()),
        }
    }

    Ok(())
}

/// Writes all of `buf`, retrying short and interrupted writes.
pub fn write_full<W: Write>(writer: &mut W, buf: &[u8]) -> Result<(), TransportError> {
    let mut written = 0;

    while written < buf.len() {
        match writer.write(&buf[written..]) {
            Ok(0) => {
                return Err(TransportError::ConnectionClosed {
                    received: written,
                    expected: buf.len(),
                });
            }
            Ok(n) => written += n,
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(e) => return Err(e.into()),
        }
    }

    Ok(())
}

pub fn write_request<W: Write>(writer: &mut W, request: ChunkRequest) -> Result<(), WireError> {
    write_full(writer, &request.encode())?;
    writer.flush()?;
    Ok(())
}

/// Reads the next request. `Ok(None)` means the peer hung up or stayed idle past the read timeout between requests.
pub fn read_request<R: Read>(reader: &mut R) -> Result<Option<ChunkRequest>, WireError> {
    let mut bytes = [0; REQUEST_LEN];

    match read_full(reader, &mut bytes) {
        Ok(()) => Ok(Some(ChunkRequest::decode(&bytes))),
        Err(TransportError::ConnectionClosed { received: 0, .. } | TransportError::TimedOut { received: 0, .. }) => Ok(None),
        Err(e) => Err(e.into()),
    }
}

pub fn write_response<W: Write>(writer: &mut W, header: &ChunkHeader, payload: &[u8]) -> Result<(), WireError> {
    if payload.len() != header.payload_len() {
        return Err(ProtocolError::PayloadLength {
            expected: header.payload_len(),
            actual: payload.len(),
        }
        .into());
    }

    write_full(writer, &header.encode())?;
    write_full(writer, payload)?;
    writer.flush()?;
    Ok(())
}

pub fn read_response<R: Read>(reader: &mut R) -> Result<ChunkPayload, WireError> {
    let mut header_bytes = [0; HEADER_LEN];
    read_full(reader, &mut header_bytes)?;
    let header = ChunkHeader::decode(&header_bytes)?;

    let mut bytes = vec![0; header.payload_len()];
    read_full(reader, &mut bytes)?;

    Ok(ChunkPayload { header, bytes })
}

#[cfg(test)]
pub(crate) mod tests {
    use std::io::{self, Read, Write};

    use test_case::test_case;

    use crate::error::{ProtocolError, TransportError, WireError};
    use crate::net::protocol::{
        read_full, read_request, read_response, write_request, write_response, ChunkHeader, ChunkPayload, ChunkRequest, HEADER_LEN,
        MAX_PAYLOAD_LEN,
    };
    use crate::world::chunk_data::ChunkDimensions;
    use crate::world::location::ChunkLocation;
    use crate::world::worldgen::{TerrainGenerator, TerrainPreset};

    /// Hands out at most `step` bytes per read and write, interrupting every other call.
    pub(crate) struct FragmentedStream {
        pub input: Vec<u8>,
        pub output: Vec<u8>,
        position: usize,
        step: usize,
        interrupt_next: bool,
    }

    impl FragmentedStream {
        pub fn new(input: Vec<u8>, step: usize) -> Self {
            Self {
                input,
                output: Vec::new(),
                position: 0,
                step,
                interrupt_next: true,
            }
        }

        fn interrupt(&mut self) -> bool {
            self.interrupt_next = !self.interrupt_next;
            !self.interrupt_next
        }
    }

    impl Read for FragmentedStream {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            if self.interrupt() {
                return Err(io::ErrorKind::Interrupted.into());
            }

            let n = buf
                .len()
                .min(self.step)
                .min(self.input.len() - self.position);
            buf[..n].copy_from_slice(&self.input[self.position..self.position + n]);
            self.position += n;
            Ok(n)
        }
    }

    impl Write for FragmentedStream {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            if self.interrupt() {
                return Err(io::ErrorKind::Interrupted.into());
            }

            let n = buf.len().min(self.step);
            self.output.extend_from_slice(&buf[..n]);
            Ok(n)
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn test_request_layout() {
        let request = ChunkRequest::for_location(ChunkLocation::new(2, -1));

        assert_eq!(request.encode(), [2, 0, 0, 0, 0, 0, 0, 0, 0xff, 0xff, 0xff, 0xff]);
        assert_eq!(ChunkRequest::decode(&request.encode()).location(), ChunkLocation::new(2, -1));
    }

    #[test]
    fn test_header_layout() {
        let header = ChunkHeader::new(ChunkLocation::new(2, 3), ChunkDimensions::new(16, 64, 16)).unwrap();
        let bytes = header.encode();

        assert_eq!(&bytes[0..12], &[2, 0, 0, 0, 0, 0, 0, 0, 3, 0, 0, 0]);
        assert_eq!(&bytes[12..18], &[16, 0, 64, 0, 16, 0]);
        assert_eq!(header.payload_len(), 32768);
        assert_eq!(ChunkHeader::decode(&bytes), Ok(header));
    }

    #[test]
    fn test_header_rejects_bad_dimensions() {
        let mut bytes = [0; HEADER_LEN];
        bytes[12] = 4;
        bytes[14] = 4;

        assert!(matches!(ChunkHeader::decode(&bytes), Err(ProtocolError::EmptyDimensions(_))));
        assert_eq!(
            ChunkHeader::new(ChunkLocation::new(0, 0), ChunkDimensions::new(70000, 1, 1)),
            Err(ProtocolError::DimensionTooLarge(70000))
        );
    }

    /// Yields `input` and then reports a read timeout on every further call.
    struct StallingStream {
        input: io::Cursor<Vec<u8>>,
    }

    impl Read for StallingStream {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            match self.input.read(buf)? {
                0 => Err(io::ErrorKind::WouldBlock.into()),
                n => Ok(n),
            }
        }
    }

    fn header_bytes(width: u16, height: u16, depth: u16) -> [u8; HEADER_LEN] {
        let mut bytes = [0; HEADER_LEN];
        bytes[12..14].copy_from_slice(&width.to_le_bytes());
        bytes[14..16].copy_from_slice(&height.to_le_bytes());
        bytes[16..18].copy_from_slice(&depth.to_le_bytes());
        bytes
    }

    #[test]
    fn test_oversized_header_is_rejected_before_reading_payload() {
        let mut stream = io::Cursor::new(header_bytes(u16::MAX, u16::MAX, u16::MAX).to_vec());

        assert!(matches!(
            read_response(&mut stream),
            Err(WireError::Protocol(ProtocolError::PayloadTooLarge { len, max: MAX_PAYLOAD_LEN }))
                if len == 65535 * 65535 * 65535 * 2
        ));
        assert_eq!(stream.position(), HEADER_LEN as u64);
    }

    #[test]
    fn test_payload_limit_is_inclusive() {
        assert!(ChunkHeader::decode(&header_bytes(512, 128, 512)).is_ok());
        assert!(matches!(
            ChunkHeader::decode(&header_bytes(512, 129, 512)),
            Err(ProtocolError::PayloadTooLarge { .. })
        ));
        assert!(matches!(
            ChunkHeader::new(ChunkLocation::new(0, 0), ChunkDimensions::new(1024, 1024, 1024)),
            Err(ProtocolError::PayloadTooLarge { .. })
        ));
    }

    #[test]
    fn test_idle_timeout_between_requests_is_hangup() {
        let request = ChunkRequest::for_location(ChunkLocation::new(3, 3));
        let mut stream = StallingStream {
            input: io::Cursor::new(request.encode().to_vec()),
        };

        assert_eq!(read_request(&mut stream).unwrap(), Some(request));
        assert_eq!(read_request(&mut stream).unwrap(), None);
    }

    #[test]
    fn test_timeout_inside_request_is_error() {
        let mut stream = StallingStream {
            input: io::Cursor::new(vec![0; 6]),
        };

        assert!(matches!(
            read_request(&mut stream),
            Err(WireError::Transport(TransportError::TimedOut { received: 6, expected: 12 }))
        ));
    }

    #[test_case(1 ; "single bytes")]
    #[test_case(3 ; "three bytes")]
    #[test_case(7 ; "seven bytes")]
    #[test_case(4096 ; "whole buffers")]
    fn test_fragmented_response(step: usize) {
        let generator = TerrainGenerator::new(1, ChunkDimensions::new(4, 16, 4), TerrainPreset::GENTLE);
        let chunk = generator.generate_chunk(ChunkLocation::new(-3, 8));
        let payload = ChunkPayload::from_chunk(&chunk).unwrap();

        let mut server_side = FragmentedStream::new(Vec::new(), step);
        write_response(&mut server_side, &payload.header, &payload.bytes).unwrap();

        let mut client_side = FragmentedStream::new(server_side.output, step);
        let received = read_response(&mut client_side).unwrap();

        assert_eq!(received, payload);
        assert_eq!(received.decode_chunk(), Ok(chunk));
    }

    #[test_case(1 ; "single bytes")]
    #[test_case(5 ; "five bytes")]
    fn test_fragmented_request(step: usize) {
        let request = ChunkRequest::for_location(ChunkLocation::new(-100, 7));

        let mut client_side = FragmentedStream::new(Vec::new(), step);
        write_request(&mut client_side, request).unwrap();

        let mut server_side = FragmentedStream::new(client_side.output, step);
        assert_eq!(read_request(&mut server_side).unwrap(), Some(request));
        assert_eq!(read_request(&mut server_side).unwrap(), None);
    }

    #[test]
    fn test_truncated_stream_is_transport_error() {
        let mut stream = FragmentedStream::new(vec![1, 2, 3, 4, 5], 2);
        let mut buf = [0; 8];

        assert!(matches!(
            read_full(&mut stream, &mut buf),
            Err(TransportError::ConnectionClosed { received: 5, expected: 8 })
        ));

        let mut partial_request = FragmentedStream::new(vec![0; 6], 6);
        assert!(matches!(
            read_request(&mut partial_request),
            Err(WireError::Transport(TransportError::ConnectionClosed { received: 6, .. }))
        ));
    }

    #[test]
    fn test_write_response_checks_payload_length() {
        let header = ChunkHeader::new(ChunkLocation::new(0, 0), ChunkDimensions::new(1, 1, 1)).unwrap();
        let mut stream = FragmentedStream::new(Vec::new(), 16);

        assert!(matches!(
            write_response(&mut stream, &header, &[0; 3]),
            Err(WireError::Protocol(ProtocolError::PayloadLength { expected: 2, actual: 3 }))
        ));
        assert!(stream.output.is_empty());
    }
}
