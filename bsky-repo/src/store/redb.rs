use std::path::Path;

use ::redb::{backends::InMemoryBackend, Database, ReadableTable, TableDefinition};
use bytes::Bytes;
use libipld::Cid;
use tracing::{debug, info};

use super::BlockStore;
use crate::error::{Error, Result};

const BLOCKS_TABLE: TableDefinition<&[u8], &[u8]> = TableDefinition::new("blocks-1");

/// A persistent block store backed by a redb database.
///
/// Keys are the binary encoding of the CID.
#[derive(Debug)]
pub struct RedbBlockStore {
    db: Database,
}

fn db_err(err: impl Into<::redb::Error>) -> Error {
    Error::Storage(err.into())
}

impl RedbBlockStore {
    /// Opens or creates the database at `path`.
    pub fn persistent(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        info!("loading block database from {}", path.to_string_lossy());
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|err| db_err(::redb::StorageError::Io(err)))?;
        }
        let db = Database::builder().create(path).map_err(db_err)?;
        Self::open(db)
    }

    /// Creates a store that lives only in memory.
    pub fn in_memory() -> Result<Self> {
        info!("using in-memory block database");
        let db = Database::builder()
            .create_with_backend(InMemoryBackend::new())
            .map_err(db_err)?;
        Self::open(db)
    }

    fn open(db: Database) -> Result<Self> {
        let write_tx = db.begin_write().map_err(db_err)?;
        {
            let _table = write_tx.open_table(BLOCKS_TABLE).map_err(db_err)?;
        }
        write_tx.commit().map_err(db_err)?;
        Ok(Self { db })
    }
}

impl BlockStore for RedbBlockStore {
    fn insert(&self, cid: &Cid, data: &Bytes) -> Result<()> {
        self.insert_many(&[(*cid, data.clone())])
    }

    fn insert_many(&self, blocks: &[(Cid, Bytes)]) -> Result<()> {
        let tx = self.db.begin_write().map_err(db_err)?;
        let mut inserted = 0;
        {
            let mut table = tx.open_table(BLOCKS_TABLE).map_err(db_err)?;
            for (cid, data) in blocks {
                let key = cid.to_bytes();
                if table.get(key.as_slice()).map_err(db_err)?.is_some() {
                    continue;
                }
                table
                    .insert(key.as_slice(), data.as_ref())
                    .map_err(db_err)?;
                inserted += 1;
            }
        }
        tx.commit().map_err(db_err)?;
        debug!(inserted, total = blocks.len(), "stored blocks");
        Ok(())
    }

    fn get(&self, cid: &Cid) -> Result<Bytes> {
        let tx = self.db.begin_read().map_err(db_err)?;
        let table = tx.open_table(BLOCKS_TABLE).map_err(db_err)?;
        let Some(row) = table.get(cid.to_bytes().as_slice()).map_err(db_err)? else {
            return Err(Error::NotFound(*cid));
        };
        Ok(Bytes::copy_from_slice(row.value()))
    }

    fn has(&self, cid: &Cid) -> Result<bool> {
        let tx = self.db.begin_read().map_err(db_err)?;
        let table = tx.open_table(BLOCKS_TABLE).map_err(db_err)?;
        let row = table.get(cid.to_bytes().as_slice()).map_err(db_err)?;
        Ok(row.is_some())
    }

    fn all_keys(&self) -> Result<Vec<Cid>> {
        let tx = self.db.begin_read().map_err(db_err)?;
        let table = tx.open_table(BLOCKS_TABLE).map_err(db_err)?;
        let mut keys = Vec::new();
        for entry in table.iter().map_err(db_err)? {
            let (key, _) = entry.map_err(db_err)?;
            let cid = Cid::try_from(key.value()).map_err(Error::decode)?;
            keys.push(cid);
        }
        Ok(keys)
    }
}
