//! The post list of a user, stored in a [`Hamt`] keyed by decimal index.

use libipld::Cid;

use crate::error::{Error, Result};
use crate::hamt::Hamt;
use crate::store::BlockStore;
use crate::types::Post;

/// An append-only list of posts.
#[derive(Debug)]
pub struct Posts {
    hamt: Hamt<Post>,
}

impl Default for Posts {
    fn default() -> Self {
        Self::new()
    }
}

impl Posts {
    pub fn new() -> Self {
        Self { hamt: Hamt::new() }
    }

    pub fn load(store: &(impl BlockStore + ?Sized), root: &Cid) -> Result<Self> {
        Ok(Self {
            hamt: Hamt::load(store, root)?,
        })
    }

    /// Returns post number `index`.
    pub fn get(&self, store: &(impl BlockStore + ?Sized), index: i64) -> Result<Option<Post>> {
        self.hamt.get(store, &index.to_string())
    }

    /// Stores `post` under `index`, which must be the current post count.
    ///
    /// Returns the new post count.
    pub fn append(
        &mut self,
        store: &(impl BlockStore + ?Sized),
        index: i64,
        post: &Post,
    ) -> Result<i64> {
        let key = index.to_string();
        if self.hamt.get(store, &key)?.is_some() {
            return Err(Error::Hamt(format!("post {index} already exists")));
        }
        self.hamt.set(store, &key, post)?;
        Ok(index + 1)
    }

    /// Writes pending changes and returns the index root.
    pub fn flush(&mut self, store: &(impl BlockStore + ?Sized)) -> Result<Cid> {
        self.hamt.flush(store)
    }

    /// Posts `0..count` in order.
    pub fn list(&self, store: &(impl BlockStore + ?Sized), count: i64) -> Result<Vec<Post>> {
        (0..count)
            .map(|i| {
                self.get(store, i)?
                    .ok_or_else(|| Error::Hamt(format!("post {i} missing from index")))
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemBlockStore;

    #[test]
    fn append_and_list() {
        let store = MemBlockStore::new();
        let mut posts = Posts::new();
        let mut next = 0;
        for body in ["a", "b", "c"] {
            let post = Post {
                timestamp: "2022-05-01T10:00:00Z".into(),
                body: body.into(),
            };
            next = posts.append(&store, next, &post).unwrap();
        }
        assert_eq!(next, 3);
        let root = posts.flush(&store).unwrap();
        let posts = Posts::load(&store, &root).unwrap();
        let bodies: Vec<_> = posts
            .list(&store, next)
            .unwrap()
            .into_iter()
            .map(|p| p.body)
            .collect();
        assert_eq!(bodies, ["a", "b", "c"]);
        assert!(posts.get(&store, 3).unwrap().is_none());
        assert!(posts.list(&store, 4).is_err());
    }

    #[test]
    fn append_twice_at_same_index() {
        let store = MemBlockStore::new();
        let mut posts = Posts::new();
        let post = Post {
            timestamp: "2022-05-01T10:00:00Z".into(),
            body: "x".into(),
        };
        posts.append(&store, 0, &post).unwrap();
        assert!(matches!(posts.append(&store, 0, &post), Err(Error::Hamt(_))));
    }
}
