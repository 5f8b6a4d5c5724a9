//! Wire framing and payload encoding.
//!
//! ## Wire format
//!
//! Every frame on the wire is length-prefixed:
//!
//! ```text
//! [4 bytes: payload length (i32, configured byte order)] [N bytes: payload]
//! ```
//!
//! A non-positive length is a keep-alive and carries no payload; the reader
//! skips it and waits for the next header. Payloads are bincode with
//! fixed-width integers in the same byte order as the length prefix, so a
//! mesh configured big-endian is big-endian all the way down regardless of
//! the host.

use {
    crate::error::{MeshError, Result},
    bincode::Options,
    log::trace,
    serde::{de::DeserializeOwned, Deserialize, Serialize},
    tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt},
    tokio_util::sync::CancellationToken,
};

/// Size of the frame length prefix.
pub const FRAME_HEADER_LEN: usize = 4;

/// Byte order used for every fixed-width number on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ByteOrder {
    #[default]
    Little,
    Big,
}

macro_rules! fixed_width {
    ($encode:ident, $decode:ident, $ty:ty, $len:literal) => {
        pub fn $encode(self, value: $ty) -> [u8; $len] {
            match self {
                Self::Little => value.to_le_bytes(),
                Self::Big => value.to_be_bytes(),
            }
        }

        pub fn $decode(self, bytes: [u8; $len]) -> $ty {
            match self {
                Self::Little => <$ty>::from_le_bytes(bytes),
                Self::Big => <$ty>::from_be_bytes(bytes),
            }
        }
    };
}

impl ByteOrder {
    fixed_width!(encode_i32, decode_i32, i32, 4);
    fixed_width!(encode_u32, decode_u32, u32, 4);
    fixed_width!(encode_i64, decode_i64, i64, 8);
    fixed_width!(encode_u64, decode_u64, u64, 8);
    fixed_width!(encode_f32, decode_f32, f32, 4);
    fixed_width!(encode_f64, decode_f64, f64, 8);
}

/// Length-prefixed frame reader/writer bound to one byte order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameCodec {
    byte_order: ByteOrder,
    max_frame_size: usize,
}

impl FrameCodec {
    pub fn new(byte_order: ByteOrder, max_frame_size: usize) -> Self {
        Self {
            byte_order,
            max_frame_size,
        }
    }

    pub fn byte_order(&self) -> ByteOrder {
        self.byte_order
    }

    pub fn max_frame_size(&self) -> usize {
        self.max_frame_size
    }

    /// Serialize a value with this codec's byte order.
    pub fn encode_payload<T: Serialize>(&self, value: &T) -> Result<Vec<u8>> {
        let options = bincode::DefaultOptions::new().with_fixint_encoding();
        let bytes = match self.byte_order {
            ByteOrder::Little => options.with_little_endian().serialize(value)?,
            ByteOrder::Big => options.with_big_endian().serialize(value)?,
        };
        Ok(bytes)
    }

    /// Deserialize a value with this codec's byte order.
    pub fn decode_payload<T: DeserializeOwned>(&self, bytes: &[u8]) -> Result<T> {
        let options = bincode::DefaultOptions::new()
            .with_fixint_encoding()
            .with_limit(self.max_frame_size as u64);
        let value = match self.byte_order {
            ByteOrder::Little => options.with_little_endian().deserialize(bytes)?,
            ByteOrder::Big => options.with_big_endian().deserialize(bytes)?,
        };
        Ok(value)
    }

    /// Build the complete frame (header plus payload) for `payload`.
    pub fn frame(&self, payload: &[u8]) -> Result<Vec<u8>> {
        let too_large = || MeshError::FrameTooLarge {
            size: payload.len(),
            max: self.max_frame_size,
        };
        if payload.len() > self.max_frame_size {
            return Err(too_large());
        }
        let len = i32::try_from(payload.len()).map_err(|_| too_large())?;
        let mut frame = Vec::with_capacity(FRAME_HEADER_LEN.saturating_add(payload.len()));
        frame.extend_from_slice(&self.byte_order.encode_i32(len));
        frame.extend_from_slice(payload);
        Ok(frame)
    }

    /// Write one frame and flush.
    pub async fn write_frame<W>(&self, writer: &mut W, payload: &[u8]) -> Result<()>
    where
        W: AsyncWrite + Unpin,
    {
        let frame = self.frame(payload)?;
        writer.write_all(&frame).await?;
        writer.flush().await?;
        Ok(())
    }

    /// Write a zero-length keep-alive frame.
    pub async fn write_keep_alive<W>(&self, writer: &mut W) -> Result<()>
    where
        W: AsyncWrite + Unpin,
    {
        writer.write_all(&self.byte_order.encode_i32(0)).await?;
        writer.flush().await?;
        Ok(())
    }

    /// Read the next frame with a positive length.
    ///
    /// Returns `Ok(None)` when the stream ends, the peer resets the
    /// connection, or `cancel` fires while waiting. Keep-alive frames are
    /// consumed silently.
    pub async fn read_frame<R>(
        &self,
        reader: &mut R,
        cancel: &CancellationToken,
    ) -> Result<Option<Vec<u8>>>
    where
        R: AsyncRead + Unpin,
    {
        loop {
            let mut header = [0u8; FRAME_HEADER_LEN];
            if !read_segment(reader, &mut header, cancel).await? {
                return Ok(None);
            }

            let len = self.byte_order.decode_i32(header);
            let Ok(size) = usize::try_from(len) else {
                trace!("skipping keep-alive frame ({len})");
                continue;
            };
            if size == 0 {
                trace!("skipping keep-alive frame");
                continue;
            }
            if size > self.max_frame_size {
                return Err(MeshError::FrameTooLarge {
                    size,
                    max: self.max_frame_size,
                });
            }

            let mut payload = vec![0u8; size];
            if !read_segment(reader, &mut payload, cancel).await? {
                return Ok(None);
            }
            return Ok(Some(payload));
        }
    }
}

/// Fill `buf` completely. `Ok(false)` means the stream is gone.
async fn read_segment<R>(reader: &mut R, buf: &mut [u8], cancel: &CancellationToken) -> Result<bool>
where
    R: AsyncRead + Unpin,
{
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Ok(false),
        read = reader.read_exact(buf) => match read {
            Ok(_) => Ok(true),
            Err(e) if is_disconnect(&e) => Ok(false),
            Err(e) => Err(e.into()),
        },
    }
}

fn is_disconnect(error: &std::io::Error) -> bool {
    use std::io::ErrorKind::*;
    matches!(
        error.kind(),
        UnexpectedEof | ConnectionReset | ConnectionAborted | BrokenPipe
    )
}
