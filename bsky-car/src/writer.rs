use libipld::Cid;
use tokio::io::{AsyncWrite, AsyncWriteExt};

use crate::error::Error;
use crate::frame::write_frame;
use crate::header::CarHeader;

/// Writes a bundle to any [`AsyncWrite`].
///
/// The header goes out with the first block, or on [`CarWriter::finish`] for a bundle
/// without blocks.
#[derive(Debug)]
pub struct CarWriter<W> {
    writer: W,
    header: Option<CarHeader>,
    cid_buf: Vec<u8>,
}

impl<W> CarWriter<W>
where
    W: AsyncWrite + Send + Unpin,
{
    pub fn new(header: CarHeader, writer: W) -> Self {
        Self {
            writer,
            header: Some(header),
            cid_buf: Vec::new(),
        }
    }

    async fn ensure_header(&mut self) -> Result<(), Error> {
        if let Some(header) = self.header.take() {
            write_frame(&mut self.writer, &[&header.encode()?]).await?;
        }
        Ok(())
    }

    /// Appends one block. The caller is responsible for `data` matching `cid`.
    pub async fn write<T>(&mut self, cid: Cid, data: T) -> Result<(), Error>
    where
        T: AsRef<[u8]>,
    {
        self.ensure_header().await?;
        self.cid_buf.clear();
        cid.write_bytes(&mut self.cid_buf)?;
        write_frame(&mut self.writer, &[&self.cid_buf, data.as_ref()]).await
    }

    /// Writes any pending header, flushes, and hands back the writer.
    pub async fn finish(mut self) -> Result<W, Error> {
        self.ensure_header().await?;
        self.writer.flush().await?;
        Ok(self.writer)
    }
}
