//! High level operations on a user repository.

use libipld::Cid;
use tracing::{debug, info};

use crate::codec::ObjectStore;
use crate::error::{Error, Result};
use crate::posts::Posts;
use crate::store::BlockStore;
use crate::types::{Post, RootPayload, SignedRoot, User};

/// A resolved repository root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepoRoot {
    /// The root as published, either a [`SignedRoot`] or a bare [`User`] block.
    pub cid: Cid,
    /// The signature envelope, absent for a bare user root.
    pub signed: Option<SignedRoot>,
    pub user_cid: Cid,
    pub user: User,
}

/// Reads and writes repositories in a block store.
///
/// Every write produces new blocks and returns the new [`User`] record together with
/// its CID; nothing is ever updated in place.
#[derive(Debug, Clone)]
pub struct Repo<S> {
    objects: ObjectStore<S>,
}

impl<S: BlockStore> Repo<S> {
    pub fn new(store: S) -> Self {
        Self {
            objects: ObjectStore::new(store),
        }
    }

    pub fn store(&self) -> &S {
        self.objects.store()
    }

    pub fn objects(&self) -> &ObjectStore<S> {
        &self.objects
    }

    /// Creates a user with no posts and no follows.
    pub fn create_user(&self, did: &str, name: &str) -> Result<(Cid, User)> {
        let posts_root = Posts::new().flush(self.store())?;
        let user = User {
            did: did.to_string(),
            name: name.to_string(),
            posts_root,
            next_post: 0,
            follows: Vec::new(),
        };
        let cid = self.objects.put(&user)?;
        info!(%cid, did, name, "created user");
        Ok((cid, user))
    }

    /// Appends `post` to the user's posts.
    pub fn add_post(&self, user: &User, post: &Post) -> Result<(Cid, User)> {
        let mut posts = Posts::load(self.store(), &user.posts_root)?;
        let next_post = posts.append(self.store(), user.next_post, post)?;
        let posts_root = posts.flush(self.store())?;
        let user = User {
            posts_root,
            next_post,
            ..user.clone()
        };
        let cid = self.objects.put(&user)?;
        debug!(%cid, next_post, "added post");
        Ok((cid, user))
    }

    /// Adds `did` to the follow list. Following twice is a no-op.
    pub fn follow(&self, user: &User, did: &str) -> Result<(Cid, User)> {
        let mut user = user.clone();
        if !user.follows.iter().any(|f| f == did) {
            user.follows.push(did.to_string());
        }
        let cid = self.objects.put(&user)?;
        debug!(%cid, follows = user.follows.len(), "updated follows");
        Ok((cid, user))
    }

    /// All posts of `user`, oldest first.
    pub fn posts(&self, user: &User) -> Result<Vec<Post>> {
        let posts = Posts::load(self.store(), &user.posts_root)?;
        posts.list(self.store(), user.next_post)
    }

    /// Wraps `user` in a [`SignedRoot`] replacing `prev`.
    ///
    /// `sign` receives the bytes to sign and returns the signature.
    pub fn sign_root(
        &self,
        user: Cid,
        prev: Option<Cid>,
        sign: impl FnOnce(&[u8]) -> Vec<u8>,
    ) -> Result<Cid> {
        let payload = RootPayload { user, prev };
        let sig = sign(&payload.signing_bytes()?);
        let root = SignedRoot {
            user,
            prev,
            sig: sig.into_boxed_slice(),
        };
        self.objects.put(&root)
    }

    /// Resolves `cid` to the user record it publishes.
    ///
    /// Accepts both a [`SignedRoot`] and a bare [`User`] block.
    pub fn load_root(&self, cid: &Cid) -> Result<RepoRoot> {
        match self.objects.get::<SignedRoot>(cid) {
            Ok(signed) => {
                let user_cid = signed.user;
                let user = self.objects.get::<User>(&user_cid)?;
                Ok(RepoRoot {
                    cid: *cid,
                    signed: Some(signed),
                    user_cid,
                    user,
                })
            }
            Err(Error::Decode(_)) => {
                let user = self.objects.get::<User>(cid)?;
                Ok(RepoRoot {
                    cid: *cid,
                    signed: None,
                    user_cid: *cid,
                    user,
                })
            }
            Err(err) => Err(err),
        }
    }
}
