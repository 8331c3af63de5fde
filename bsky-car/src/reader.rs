use futures::Stream;
use libipld::Cid;
use tokio::io::AsyncRead;
use tracing::trace;

use crate::error::Error;
use crate::frame::{read_frame, split_block};
use crate::header::CarHeader;

/// Reads a bundle from any [`AsyncRead`].
///
/// The header is read by the constructor, blocks on demand.
#[derive(Debug)]
pub struct CarReader<R> {
    reader: R,
    header: CarHeader,
    buf: Vec<u8>,
}

impl<R> CarReader<R>
where
    R: AsyncRead + Send + Unpin,
{
    /// Reads the header of a bundle with any number of roots.
    pub async fn new(reader: R) -> Result<Self, Error> {
        Self::open(reader, None).await
    }

    /// Reads the header, rejecting bundles that declare more than `max_roots` roots.
    pub async fn with_max_roots(reader: R, max_roots: usize) -> Result<Self, Error> {
        Self::open(reader, Some(max_roots)).await
    }

    async fn open(mut reader: R, max_roots: Option<usize>) -> Result<Self, Error> {
        let mut buf = Vec::new();
        let Some(len) = read_frame(&mut reader, &mut buf).await? else {
            return Err(Error::Parsing("missing header".to_string()));
        };
        let header = CarHeader::decode(&buf[..len], max_roots)?;
        trace!(roots = ?header.roots(), "read car header");
        Ok(Self {
            reader,
            header,
            buf,
        })
    }

    pub fn header(&self) -> &CarHeader {
        &self.header
    }

    /// The next block, or `None` at the end of the bundle.
    ///
    /// The data is not checked against the CID.
    pub async fn next_block(&mut self) -> Result<Option<(Cid, Vec<u8>)>, Error> {
        match read_frame(&mut self.reader, &mut self.buf).await? {
            Some(len) => split_block(&self.buf[..len]).map(Some),
            None => Ok(None),
        }
    }

    /// All remaining blocks as a stream.
    pub fn stream(self) -> impl Stream<Item = Result<(Cid, Vec<u8>), Error>> {
        futures::stream::try_unfold(self, |mut this| async move {
            Ok(this.next_block().await?.map(|block| (block, this)))
        })
    }
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use futures::TryStreamExt;
    use libipld::cbor::DagCborCodec;
    use libipld::multihash::{Code, MultihashDigest};

    use super::*;
    use crate::writer::CarWriter;

    fn cid_of(data: &[u8]) -> Cid {
        Cid::new_v1(DagCborCodec.into(), Code::Sha2_256.digest(data))
    }

    #[tokio::test]
    async fn blocks_in_written_order() {
        let (hello, world) = (cid_of(b"hello"), cid_of(b"world"));
        let mut writer = CarWriter::new(CarHeader::new_v1(vec![world]), Vec::new());
        writer.write(hello, b"hello").await.unwrap();
        writer.write(world, b"world").await.unwrap();
        let bytes = writer.finish().await.unwrap();

        let reader = CarReader::new(Cursor::new(bytes)).await.unwrap();
        assert_eq!(reader.header().roots(), &[world]);
        let blocks: Vec<_> = reader.stream().try_collect().await.unwrap();
        assert_eq!(
            blocks,
            [(hello, b"hello".to_vec()), (world, b"world".to_vec())]
        );
    }

    #[tokio::test]
    async fn header_without_blocks() {
        let root = cid_of(b"root");
        let bytes = CarWriter::new(CarHeader::new_v1(vec![root]), Vec::new())
            .finish()
            .await
            .unwrap();

        let mut reader = CarReader::new(Cursor::new(bytes)).await.unwrap();
        assert!(reader.next_block().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn no_input() {
        let res = CarReader::new(Cursor::new(Vec::<u8>::new())).await;
        assert!(matches!(res, Err(Error::Parsing(_))));
    }
}
