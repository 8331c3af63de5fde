//! Which roots the agent knows, by identity.

use std::path::Path;

use anyhow::{Context, Result};
use bsky_repo::Cid;
use redb::{backends::InMemoryBackend, Database, ReadableTable, TableDefinition};

const ROOTS_TABLE: TableDefinition<&str, &[u8]> = TableDefinition::new("roots-1");
const NAMES_TABLE: TableDefinition<&str, &str> = TableDefinition::new("names-1");

/// Maps DIDs to the last root seen for them, and names to DIDs.
#[derive(Debug)]
pub struct UserIndex {
    db: Database,
}

impl UserIndex {
    pub fn persistent(path: impl AsRef<Path>) -> Result<Self> {
        let db = Database::builder()
            .create(path.as_ref())
            .with_context(|| format!("failed to open {}", path.as_ref().display()))?;
        Self::open(db)
    }

    pub fn in_memory() -> Result<Self> {
        let db = Database::builder().create_with_backend(InMemoryBackend::new())?;
        Self::open(db)
    }

    fn open(db: Database) -> Result<Self> {
        let write_tx = db.begin_write()?;
        {
            let _roots = write_tx.open_table(ROOTS_TABLE)?;
            let _names = write_tx.open_table(NAMES_TABLE)?;
        }
        write_tx.commit()?;
        Ok(Self { db })
    }

    /// Records `root` as the current root of `did`, known as `name`.
    pub fn set(&self, did: &str, name: &str, root: &Cid) -> Result<()> {
        let tx = self.db.begin_write()?;
        {
            let mut roots = tx.open_table(ROOTS_TABLE)?;
            roots.insert(did, root.to_bytes().as_slice())?;
            let mut names = tx.open_table(NAMES_TABLE)?;
            names.insert(name, did)?;
        }
        tx.commit()?;
        Ok(())
    }

    /// The root of `id`, a DID or a name.
    pub fn get(&self, id: &str) -> Result<Option<Cid>> {
        let tx = self.db.begin_read()?;
        let did = if id.starts_with("did:") {
            id.to_string()
        } else {
            let names = tx.open_table(NAMES_TABLE)?;
            let Some(did) = names.get(id)? else {
                return Ok(None);
            };
            let did = did.value().to_string();
            did
        };
        let roots = tx.open_table(ROOTS_TABLE)?;
        let Some(root) = roots.get(did.as_str())? else {
            return Ok(None);
        };
        Ok(Some(Cid::try_from(root.value())?))
    }

    /// All known DIDs with their roots.
    pub fn list(&self) -> Result<Vec<(String, Cid)>> {
        let tx = self.db.begin_read()?;
        let roots = tx.open_table(ROOTS_TABLE)?;
        let mut out = Vec::new();
        for entry in roots.iter()? {
            let (did, root) = entry?;
            out.push((did.value().to_string(), Cid::try_from(root.value())?));
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use bsky_repo::{block::RAW, Block};

    use super::*;

    #[test]
    fn set_get() -> testresult::TestResult {
        let index = UserIndex::in_memory()?;
        let a = *Block::new(RAW, &b"a"[..]).cid();
        let b = *Block::new(RAW, &b"b"[..]).cid();
        assert_eq!(index.get("did:key:alice")?, None);
        index.set("did:key:alice", "alice", &a)?;
        index.set("did:key:alice", "alice", &b)?;
        assert_eq!(index.get("did:key:alice")?, Some(b));
        assert_eq!(index.get("alice")?, Some(b));
        assert_eq!(index.get("bob")?, None);
        assert_eq!(index.list()?, vec![("did:key:alice".to_string(), b)]);
        Ok(())
    }
}
