//! Completeness check for incoming DAGs.

use std::collections::HashSet;

use libipld::Cid;
use tracing::{debug, warn};

use crate::block::parse_links;
use crate::error::{Error, Result};
use crate::store::BlockStore;

/// Checks that a DAG is fully available before it is accepted.
///
/// A block already in the durable store is trusted to have its whole subgraph stored
/// as well, so the walk does not descend into it.
#[derive(Debug)]
pub struct GraphVerifier<D> {
    durable: D,
}

impl<D: BlockStore> GraphVerifier<D> {
    pub fn new(durable: D) -> Self {
        Self { durable }
    }

    /// Walks the DAG below `root` through `staging`.
    ///
    /// Fails with [`Error::IncompleteGraph`] on the first block that is in neither store.
    /// Returns the number of staged blocks that were visited.
    pub fn verify(&self, root: &Cid, staging: &(impl BlockStore + ?Sized)) -> Result<usize> {
        let mut visited = HashSet::new();
        let mut stack = vec![*root];
        let mut staged = 0;
        while let Some(cid) = stack.pop() {
            if !visited.insert(cid) {
                continue;
            }
            if self.durable.has(&cid)? {
                continue;
            }
            let data = match staging.get(&cid) {
                Ok(data) => data,
                Err(Error::NotFound(_)) => {
                    warn!(%root, missing = %cid, "incomplete graph");
                    return Err(Error::IncompleteGraph { missing: cid });
                }
                Err(err) => return Err(err),
            };
            staged += 1;
            stack.extend(parse_links(&cid, &data)?);
        }
        debug!(%root, staged, visited = visited.len(), "graph complete");
        Ok(staged)
    }
}
