//! Length-Prefixed Frame Encoding
//!
//! Message boundaries over stream transports (pipes, stdio). Each frame is
//! a 4-byte little-endian length followed by an rkyv payload.

use rkyv::ser::serializers::AllocSerializer;
use rkyv::validation::validators::DefaultValidator;
use rkyv::{Archive, CheckBytes, Deserialize, Infallible, Serialize};
use std::io::{BufReader, BufWriter, Read, Write};
use thiserror::Error;

/// Maximum frame size (16 MB). A run with millions of samples still fits;
/// anything larger indicates a corrupted length prefix.
pub const MAX_FRAME_SIZE: usize = 16 * 1024 * 1024;

const IO_BUFFER: usize = 64 * 1024;

/// Errors during frame encoding/decoding.
#[derive(Debug, Error)]
pub enum FrameError {
    /// Underlying I/O failure
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    /// Payload could not be serialized
    #[error("serialize: {0}")]
    Serialize(String),

    /// Payload failed validation or deserialization
    #[error("deserialize: {0}")]
    Deserialize(String),

    /// Length prefix exceeded [`MAX_FRAME_SIZE`] or was zero
    #[error("bad frame length: {0} bytes")]
    BadLength(usize),

    /// The peer closed the stream between frames
    #[error("end of stream")]
    EndOfStream,
}

/// Writes framed messages to a stream.
pub struct FrameWriter<W: Write> {
    inner: BufWriter<W>,
}

impl<W: Write> FrameWriter<W> {
    /// Wrap a writer.
    pub fn new(writer: W) -> Self {
        Self {
            inner: BufWriter::with_capacity(IO_BUFFER, writer),
        }
    }

    /// Serialize `message`, prefix it with its length, and flush.
    pub fn write<T>(&mut self, message: &T) -> Result<(), FrameError>
    where
        T: Serialize<AllocSerializer<256>>,
    {
        let bytes =
            rkyv::to_bytes::<_, 256>(message).map_err(|e| FrameError::Serialize(e.to_string()))?;

        if bytes.len() > MAX_FRAME_SIZE {
            return Err(FrameError::BadLength(bytes.len()));
        }

        self.inner.write_all(&(bytes.len() as u32).to_le_bytes())?;
        self.inner.write_all(&bytes)?;
        self.inner.flush()?;
        Ok(())
    }
}

/// Reads framed messages from a stream.
pub struct FrameReader<R: Read> {
    inner: BufReader<R>,
}

impl<R: Read> FrameReader<R> {
    /// Wrap a reader.
    pub fn new(reader: R) -> Self {
        Self {
            inner: BufReader::with_capacity(IO_BUFFER, reader),
        }
    }

    /// Read one frame, validate the archive, and deserialize it.
    pub fn read<T>(&mut self) -> Result<T, FrameError>
    where
        T: Archive,
        T::Archived: for<'a> CheckBytes<DefaultValidator<'a>> + Deserialize<T, Infallible>,
    {
        let mut len_buf = [0u8; 4];
        match self.inner.read_exact(&mut len_buf) {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
                return Err(FrameError::EndOfStream);
            }
            Err(e) => return Err(FrameError::Io(e)),
        }

        let len = u32::from_le_bytes(len_buf) as usize;
        if len == 0 || len > MAX_FRAME_SIZE {
            return Err(FrameError::BadLength(len));
        }

        let mut buf = rkyv::AlignedVec::with_capacity(len);
        buf.resize(len, 0);
        self.inner.read_exact(&mut buf)?;

        let archived = rkyv::check_archived_root::<T>(&buf)
            .map_err(|e| FrameError::Deserialize(e.to_string()))?;

        archived
            .deserialize(&mut Infallible)
            .map_err(|_| FrameError::Deserialize("infallible deserialization failed".into()))
    }

    /// Whether buffered bytes are waiting (a frame may already be in memory).
    pub fn has_buffered_data(&self) -> bool {
        !self.inner.buffer().is_empty()
    }
}
