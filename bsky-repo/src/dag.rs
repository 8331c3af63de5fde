//! Moving DAGs in and out of block stores as car bundles.

use std::collections::HashSet;

use bsky_car::{CarHeader, CarReader, CarWriter};
use bytes::Bytes;
use libipld::Cid;
use tokio::io::{AsyncRead, AsyncWrite};
use tracing::{debug, trace};

use crate::block::parse_links;
use crate::error::Result;
use crate::store::BlockStore;

/// Writes every block reachable from `root` as a bundle with a single root.
///
/// Returns the number of blocks written.
pub async fn export<W>(store: &(impl BlockStore + ?Sized), root: Cid, writer: W) -> Result<usize>
where
    W: AsyncWrite + Send + Unpin,
{
    export_diff(store, root, None, writer).await
}

/// Like [`export`], but leaves out every block reachable from `base`.
///
/// The receiver is expected to hold the DAG of `base` already.
pub async fn export_diff<W>(
    store: &(impl BlockStore + ?Sized),
    root: Cid,
    base: Option<Cid>,
    writer: W,
) -> Result<usize>
where
    W: AsyncWrite + Send + Unpin,
{
    let known = match base {
        Some(base) => reachable(store, base)?,
        None => HashSet::new(),
    };

    let mut writer = CarWriter::new(CarHeader::new_v1(vec![root]), writer);
    let mut seen = HashSet::new();
    let mut stack = vec![root];
    let mut written = 0;
    while let Some(cid) = stack.pop() {
        if known.contains(&cid) || !seen.insert(cid) {
            continue;
        }
        let data = store.get(&cid)?;
        let links = parse_links(&cid, &data)?;
        writer.write(cid, &data).await?;
        written += 1;
        stack.extend(links.into_iter().rev());
    }
    writer.finish().await?;
    debug!(%root, ?base, blocks = written, "exported dag");
    Ok(written)
}

/// All CIDs reachable from `root`, which must be fully present in `store`.
pub fn reachable(store: &(impl BlockStore + ?Sized), root: Cid) -> Result<HashSet<Cid>> {
    let mut seen = HashSet::new();
    let mut stack = vec![root];
    while let Some(cid) = stack.pop() {
        if !seen.insert(cid) {
            continue;
        }
        let data = store.get(&cid)?;
        stack.extend(parse_links(&cid, &data)?);
    }
    Ok(seen)
}

/// Reads a bundle into `staging` and returns its declared roots.
///
/// Every block is checked against its CID before it is stored. Nothing is checked about
/// the shape of the graph, see [`crate::GraphVerifier`] for that.
pub async fn import<R>(
    reader: R,
    staging: &(impl BlockStore + ?Sized),
    max_roots: usize,
) -> Result<Vec<Cid>>
where
    R: AsyncRead + Send + Unpin,
{
    let mut reader = CarReader::with_max_roots(reader, max_roots).await?;
    let roots = reader.header().roots().to_vec();
    let mut count = 0;
    while let Some((cid, data)) = reader.next_block().await? {
        trace!(%cid, len = data.len(), "import block");
        staging.put_keyed(&cid, Bytes::from(data))?;
        count += 1;
    }
    debug!(?roots, blocks = count, "imported bundle");
    Ok(roots)
}
