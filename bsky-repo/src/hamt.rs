//! A hash array mapped trie over dag-cbor values.
//!
//! Every node holds a 256 bit [`Bitfield`] and a dense array with one pointer per set bit.
//! A pointer is either a bucket of up to [`BUCKET_SIZE`] entries sorted by key, or a link
//! to a child node. Keys are hashed with sha2-256 and each level consumes one byte of the
//! digest, so the trie is at most [`MAX_DEPTH`] levels deep.
//!
//! The layout only depends on the set of keys, never on insertion order.

use std::marker::PhantomData;

use libipld::cbor::DagCborCodec;
use libipld::codec::{Codec, Decode, Encode};
use libipld::multihash::{Code, MultihashDigest};
use libipld::{Cid, Ipld};
use once_cell::sync::OnceCell;
use tracing::{debug, trace};

use self::bitfield::Bitfield;
use crate::block::{self, Block};
use crate::error::{Error, Result};
use crate::store::BlockStore;

mod bitfield;

/// Entries per bucket before it is split into a child node.
pub const BUCKET_SIZE: usize = 3;

/// Maximum depth, this is the length of a hashed key.
pub const MAX_DEPTH: usize = 32;

type HashedKey = [u8; MAX_DEPTH];

/// A persistent map from string keys to values of type `V`.
///
/// Children are loaded lazily and cached, so reads only need `&self`. Writes copy the
/// path from the root to the touched bucket; [`Hamt::flush`] writes exactly those nodes.
#[derive(Debug)]
pub struct Hamt<V> {
    root: Node,
    /// CID of the root if nothing changed since it was loaded or flushed.
    cid: Option<Cid>,
    _value: PhantomData<V>,
}

#[derive(Debug, Default)]
struct Node {
    bitfield: Bitfield,
    pointers: Vec<Pointer>,
}

#[derive(Debug)]
enum Pointer {
    Bucket(Vec<(String, Ipld)>),
    Link { cid: Cid, cache: OnceCell<Box<Node>> },
    Dirty(Box<Node>),
}

impl<V> Default for Hamt<V> {
    fn default() -> Self {
        Self {
            root: Node::default(),
            cid: None,
            _value: PhantomData,
        }
    }
}

impl<V> Hamt<V>
where
    V: Encode<DagCborCodec> + Decode<DagCborCodec>,
{
    /// Creates an empty map.
    pub fn new() -> Self {
        Self::default()
    }

    /// Loads the map rooted at `root`. Only the root node is read.
    pub fn load(store: &(impl BlockStore + ?Sized), root: &Cid) -> Result<Self> {
        Ok(Self {
            root: Node::load(store, root)?,
            cid: Some(*root),
            _value: PhantomData,
        })
    }

    /// Looks up `key`.
    pub fn get(&self, store: &(impl BlockStore + ?Sized), key: &str) -> Result<Option<V>> {
        let hashed_key = hash_key(key);
        let mut node = &self.root;
        for depth in 0..MAX_DEPTH {
            let idx = hashed_key[depth];
            if !node.bitfield.contains(idx) {
                return Ok(None);
            }
            match &node.pointers[node.bitfield.rank(idx)] {
                Pointer::Bucket(entries) => {
                    return match entries.binary_search_by(|(k, _)| k.as_str().cmp(key)) {
                        Ok(i) => from_ipld(&entries[i].1).map(Some),
                        Err(_) => Ok(None),
                    };
                }
                Pointer::Link { cid, cache } => {
                    node = &**cache.get_or_try_init(|| Node::load(store, cid).map(Box::new))?;
                }
                Pointer::Dirty(child) => node = &**child,
            }
        }
        Err(Error::Hamt("max depth reached".into()))
    }

    /// Inserts or replaces `key`. Returns true if the key was not present before.
    pub fn set(&mut self, store: &(impl BlockStore + ?Sized), key: &str, value: &V) -> Result<bool> {
        let value = to_ipld(value)?;
        let inserted = self
            .root
            .set(store, &hash_key(key), 0, key.to_string(), value)?;
        self.cid = None;
        Ok(inserted)
    }

    /// Writes all changed nodes, children first, and returns the root CID.
    ///
    /// Subtrees that were not modified keep their CIDs and are not written again.
    pub fn flush(&mut self, store: &(impl BlockStore + ?Sized)) -> Result<Cid> {
        if let Some(cid) = self.cid {
            return Ok(cid);
        }
        let mut written = 0;
        let cid = self.root.flush(store, &mut written)?;
        debug!(%cid, nodes = written, "flushed hamt");
        self.cid = Some(cid);
        Ok(cid)
    }

    /// All entries. The order only depends on the set of keys.
    pub fn entries(&self, store: &(impl BlockStore + ?Sized)) -> Result<Vec<(String, V)>> {
        let mut out = Vec::new();
        let mut stack: Vec<&Node> = vec![&self.root];
        while let Some(node) = stack.pop() {
            // children are pushed in reverse so they pop in slot order
            for pointer in node.pointers.iter().rev() {
                match pointer {
                    Pointer::Bucket(_) => {}
                    Pointer::Link { cid, cache } => stack
                        .push(&**cache.get_or_try_init(|| Node::load(store, cid).map(Box::new))?),
                    Pointer::Dirty(child) => stack.push(&**child),
                }
            }
            for pointer in &node.pointers {
                if let Pointer::Bucket(entries) = pointer {
                    for (k, v) in entries {
                        out.push((k.clone(), from_ipld(v)?));
                    }
                }
            }
        }
        Ok(out)
    }
}

impl Node {
    fn load(store: &(impl BlockStore + ?Sized), cid: &Cid) -> Result<Self> {
        trace!(%cid, "load hamt node");
        let data = store.get(cid)?;
        let ipld: Ipld = block::decode(cid, &data)?;
        Self::from_ipld(ipld)
    }

    fn from_ipld(ipld: Ipld) -> Result<Self> {
        let Ipld::List(parts) = ipld else {
            return Err(Error::Hamt("node is not a list".into()));
        };
        let [Ipld::Bytes(bits), Ipld::List(raw_pointers)] = <[Ipld; 2]>::try_from(parts)
            .map_err(|_| Error::Hamt("node must have two fields".into()))?
        else {
            return Err(Error::Hamt("invalid node fields".into()));
        };
        let bitfield = Bitfield::from_bytes(&bits)?;
        if bitfield.count() != raw_pointers.len() {
            return Err(Error::Hamt(format!(
                "bitfield has {} bits set but node has {} pointers",
                bitfield.count(),
                raw_pointers.len()
            )));
        }
        let pointers = raw_pointers
            .into_iter()
            .map(Pointer::from_ipld)
            .collect::<Result<_>>()?;
        Ok(Self { bitfield, pointers })
    }

    fn to_ipld(&self) -> Result<Ipld> {
        let pointers = self
            .pointers
            .iter()
            .map(|pointer| match pointer {
                Pointer::Link { cid, .. } => Ok(Ipld::Link(*cid)),
                Pointer::Bucket(entries) => Ok(Ipld::List(
                    entries
                        .iter()
                        .map(|(k, v)| Ipld::List(vec![Ipld::String(k.clone()), v.clone()]))
                        .collect(),
                )),
                Pointer::Dirty(_) => Err(Error::Hamt("cannot encode unflushed child".into())),
            })
            .collect::<Result<_>>()?;
        Ok(Ipld::List(vec![
            Ipld::Bytes(self.bitfield.to_bytes().to_vec()),
            Ipld::List(pointers),
        ]))
    }

    fn set(
        &mut self,
        store: &(impl BlockStore + ?Sized),
        hashed_key: &HashedKey,
        depth: usize,
        key: String,
        value: Ipld,
    ) -> Result<bool> {
        if depth >= MAX_DEPTH {
            return Err(Error::Hamt("max depth reached".into()));
        }
        let idx = hashed_key[depth];
        let cindex = self.bitfield.rank(idx);
        if !self.bitfield.contains(idx) {
            self.bitfield.insert(idx);
            self.pointers
                .insert(cindex, Pointer::Bucket(vec![(key, value)]));
            return Ok(true);
        }

        let pointer = &mut self.pointers[cindex];
        if let Pointer::Link { cid, cache } = &mut *pointer {
            let child = match cache.take() {
                Some(child) => child,
                None => Box::new(Node::load(store, cid)?),
            };
            *pointer = Pointer::Dirty(child);
        }
        match pointer {
            Pointer::Bucket(entries) => {
                match entries.binary_search_by(|(k, _)| k.cmp(&key)) {
                    Ok(i) => {
                        entries[i].1 = value;
                        return Ok(false);
                    }
                    Err(i) if entries.len() < BUCKET_SIZE => {
                        entries.insert(i, (key, value));
                        return Ok(true);
                    }
                    Err(_) => {}
                }
                // overflow, push the bucket one level down
                let mut child = Node::default();
                for (k, v) in std::mem::take(entries) {
                    let hashed = hash_key(&k);
                    child.set(store, &hashed, depth + 1, k, v)?;
                }
                child.set(store, hashed_key, depth + 1, key, value)?;
                *pointer = Pointer::Dirty(Box::new(child));
                Ok(true)
            }
            Pointer::Dirty(child) => child.set(store, hashed_key, depth + 1, key, value),
            Pointer::Link { .. } => Err(Error::Hamt("child not loaded".into())),
        }
    }

    fn flush(&mut self, store: &(impl BlockStore + ?Sized), written: &mut usize) -> Result<Cid> {
        for pointer in &mut self.pointers {
            if let Pointer::Dirty(child) = pointer {
                let cid = child.flush(store, written)?;
                let cache = OnceCell::new();
                let child = std::mem::take(child);
                let _ = cache.set(child);
                *pointer = Pointer::Link { cid, cache };
            }
        }
        let block = Block::encode(&self.to_ipld()?)?;
        *written += 1;
        store.put(&block)
    }
}

impl Pointer {
    fn from_ipld(ipld: Ipld) -> Result<Self> {
        match ipld {
            Ipld::Link(cid) => Ok(Pointer::Link {
                cid,
                cache: OnceCell::new(),
            }),
            Ipld::List(raw) => {
                if raw.is_empty() || raw.len() > BUCKET_SIZE {
                    return Err(Error::Hamt(format!("invalid bucket size {}", raw.len())));
                }
                let entries = raw
                    .into_iter()
                    .map(|entry| {
                        let Ipld::List(kv) = entry else {
                            return Err(Error::Hamt("bucket entry is not a list".into()));
                        };
                        match <[Ipld; 2]>::try_from(kv) {
                            Ok([Ipld::String(k), v]) => Ok((k, v)),
                            _ => Err(Error::Hamt("bucket entry must be [key, value]".into())),
                        }
                    })
                    .collect::<Result<Vec<_>>>()?;
                if !entries.windows(2).all(|w| w[0].0 < w[1].0) {
                    return Err(Error::Hamt("bucket keys are not sorted".into()));
                }
                Ok(Pointer::Bucket(entries))
            }
            _ => Err(Error::Hamt("invalid pointer".into())),
        }
    }
}

fn hash_key(key: &str) -> HashedKey {
    let mut out = [0u8; MAX_DEPTH];
    out.copy_from_slice(Code::Sha2_256.digest(key.as_bytes()).digest());
    out
}

fn to_ipld<V: Encode<DagCborCodec>>(value: &V) -> Result<Ipld> {
    let bytes = DagCborCodec.encode(value).map_err(Error::encode)?;
    DagCborCodec.decode(&bytes).map_err(Error::decode)
}

fn from_ipld<V: Decode<DagCborCodec>>(ipld: &Ipld) -> Result<V> {
    let bytes = DagCborCodec.encode(ipld).map_err(Error::encode)?;
    DagCborCodec.decode(&bytes).map_err(Error::decode)
}
