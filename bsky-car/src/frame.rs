//! Varint length prefixed frames.

use std::io::ErrorKind;

use integer_encoding::{VarInt, VarIntAsyncWriter};
use libipld::Cid;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::error::Error;

/// Largest frame a reader accepts. A block plus its CID never comes close.
pub const MAX_FRAME_SIZE: usize = 4 * 1024 * 1024;

/// Reads the next frame into `buf` and returns its length.
///
/// `None` means the input ended cleanly before a new frame started.
pub(crate) async fn read_frame<R>(reader: &mut R, buf: &mut Vec<u8>) -> Result<Option<usize>, Error>
where
    R: AsyncRead + Send + Unpin,
{
    let Some(len) = read_length(reader).await? else {
        return Ok(None);
    };
    if len > MAX_FRAME_SIZE {
        return Err(Error::FrameTooLarge(len));
    }
    buf.resize(len, 0);
    match reader.read_exact(buf).await {
        Ok(_) => Ok(Some(len)),
        Err(e) if e.kind() == ErrorKind::UnexpectedEof => Err(Error::Parsing(format!(
            "frame truncated, expected {len} bytes"
        ))),
        Err(e) => Err(e.into()),
    }
}

/// Longest varint encoding of a `u64`.
const MAX_VARINT_LEN: usize = 10;

/// Reads a frame length. Only an end of input before its first byte counts as clean.
async fn read_length<R>(reader: &mut R) -> Result<Option<usize>, Error>
where
    R: AsyncRead + Send + Unpin,
{
    let mut bytes = [0u8; MAX_VARINT_LEN];
    for i in 0..MAX_VARINT_LEN {
        bytes[i] = match reader.read_u8().await {
            Ok(byte) => byte,
            Err(e) if e.kind() == ErrorKind::UnexpectedEof && i == 0 => return Ok(None),
            Err(e) if e.kind() == ErrorKind::UnexpectedEof => {
                return Err(Error::Parsing("input ends inside a frame length".to_string()))
            }
            Err(e) => return Err(e.into()),
        };
        if bytes[i] & 0x80 == 0 {
            return usize::decode_var(&bytes[..=i])
                .map(|(len, _)| Some(len))
                .ok_or_else(|| Error::Parsing("bad frame length".to_string()));
        }
    }
    Err(Error::Parsing("frame length longer than a varint".to_string()))
}

/// Writes one frame made of the concatenation of `parts`.
pub(crate) async fn write_frame<W>(writer: &mut W, parts: &[&[u8]]) -> Result<(), Error>
where
    W: AsyncWrite + Send + Unpin,
{
    let len = parts.iter().map(|p| p.len()).sum::<usize>();
    writer.write_varint_async(len).await?;
    for part in parts {
        writer.write_all(part).await?;
    }
    Ok(())
}

/// Splits a block frame into its CID and data.
pub(crate) fn split_block(frame: &[u8]) -> Result<(Cid, Vec<u8>), Error> {
    let mut cursor = std::io::Cursor::new(frame);
    let cid = Cid::read_bytes(&mut cursor)?;
    let offset = cursor.position() as usize;
    Ok((cid, frame[offset..].to_vec()))
}
