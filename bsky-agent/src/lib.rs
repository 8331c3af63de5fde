//! The local side of a user repository.
//!
//! An [`Agent`] owns a signing key, a local block store and an index of known roots. It
//! edits the user's repository locally and pushes the changed blocks to an aggregator,
//! and pulls other users' repositories from it.

use std::io::Cursor;

use anyhow::{bail, Context, Result};
use bsky_auth::{
    Attenuation, DidKeyResolver, DidResolver, NestedCapabilities, Resource, SecretKey,
    TokenBuilder,
};
use bsky_repo::{
    dag, BlockStore, Cid, GraphVerifier, Layered, MemBlockStore, Post, RedbBlockStore, Repo,
    User,
};
use bytes::Bytes;
use time::format_description::well_known::Rfc3339;
use tracing::{debug, info};

pub mod account;
pub mod client;
pub mod index;

pub use self::account::{Account, AgentDir};
pub use self::client::{Client, ClientError};
pub use self::index::UserIndex;

/// The capability updates are granted with.
pub const CAP_POST: &str = "POST";

/// Seconds a token stays valid.
const TOKEN_LIFETIME: i64 = 300;

/// A local agent acting for one user.
#[derive(Debug)]
pub struct Agent {
    dir: AgentDir,
    account: Account,
    key: SecretKey,
    repo: Repo<RedbBlockStore>,
    index: UserIndex,
    client: Client,
}

impl Agent {
    /// Creates a new identity named `name` in `dir`, with an empty repository.
    ///
    /// Nothing is sent to the server until [`Agent::register`].
    pub fn init(dir: AgentDir, name: &str, server: &str) -> Result<Self> {
        if dir.exists() {
            bail!("{} already contains an account", dir.root().display());
        }
        let key = SecretKey::generate();
        let account = Account {
            name: name.to_string(),
            did: key.did(),
            server: server.to_string(),
            account_kind: account::DEFAULT_ACCOUNT_KIND.to_string(),
        };
        dir.save_key(&key)?;
        dir.save_account(&account)?;

        let agent = Self::with_parts(dir, account, key)?;
        let (root, _) = agent
            .repo
            .create_user(&agent.account.did, &agent.account.name)?;
        agent
            .index
            .set(&agent.account.did, &agent.account.name, &root)?;
        info!(did = %agent.account.did, name, "created account");
        Ok(agent)
    }

    /// Opens an existing agent directory.
    pub fn open(dir: AgentDir) -> Result<Self> {
        let account = dir.load_account()?;
        let key = dir.load_key()?;
        if key.did() != account.did {
            bail!("key does not match account {}", account.did);
        }
        Self::with_parts(dir, account, key)
    }

    fn with_parts(dir: AgentDir, account: Account, key: SecretKey) -> Result<Self> {
        let store = RedbBlockStore::persistent(dir.blocks_path())?;
        let index = UserIndex::persistent(dir.index_path())?;
        let client = Client::new(account.server.as_str());
        Ok(Self {
            dir,
            account,
            key,
            repo: Repo::new(store),
            index,
            client,
        })
    }

    pub fn account(&self) -> &Account {
        &self.account
    }

    pub fn dir(&self) -> &AgentDir {
        &self.dir
    }

    pub fn client(&self) -> &Client {
        &self.client
    }

    /// The last root of this user that the server accepted, or the initial root.
    fn current_root(&self) -> Result<Cid> {
        self.index
            .get(&self.account.did)?
            .context("own root missing from index")
    }

    fn current_user(&self) -> Result<(Cid, User)> {
        let root = self.current_root()?;
        Ok((root, self.repo.load_root(&root)?.user))
    }

    /// Registers the repository with the server.
    pub async fn register(&self) -> Result<Cid> {
        let root = self.current_root()?;
        let mut car = Vec::new();
        dag::export(self.repo.store(), root, &mut car).await?;
        let service = self.client.service_did().await?;
        let token = TokenBuilder::new(&self.key, service)
            .valid_for(TOKEN_LIFETIME)
            .build()?;
        self.client.register(&token, car).await?;
        info!(did = %self.account.did, %root, "registered");
        Ok(root)
    }

    /// Publishes a new post. Returns the new root.
    pub async fn post(&self, body: &str) -> Result<Cid> {
        let (prev, user) = self.current_user()?;
        let post = Post {
            timestamp: time::OffsetDateTime::now_utc().format(&Rfc3339)?,
            body: body.to_string(),
        };
        let (user_cid, _) = self.repo.add_post(&user, &post)?;
        self.push(user_cid, prev).await
    }

    /// Follows `did`. Returns the new root.
    pub async fn follow(&self, did: &str) -> Result<Cid> {
        DidKeyResolver
            .resolve(did)
            .with_context(|| format!("cannot follow {did}"))?;
        let (prev, user) = self.current_user()?;
        let (user_cid, _) = self.repo.follow(&user, did)?;
        self.push(user_cid, prev).await
    }

    /// Signs `user_cid` as the successor of `prev` and sends the difference.
    async fn push(&self, user_cid: Cid, prev: Cid) -> Result<Cid> {
        let root = self
            .repo
            .sign_root(user_cid, Some(prev), |bytes| self.key.sign(bytes))?;
        let mut car = Vec::new();
        let blocks = dag::export_diff(self.repo.store(), root, Some(prev), &mut car).await?;

        let service = self.client.service_did().await?;
        let caps = NestedCapabilities::new([CAP_POST]);
        let att = Attenuation::new(
            Resource::account(self.account.account_kind.as_str(), self.account.name.as_str()),
            caps.cap(CAP_POST)?,
        );
        let token = TokenBuilder::new(&self.key, service)
            .attenuation(&att)
            .valid_for(TOKEN_LIFETIME)
            .build()?;
        self.client.update(&token, car).await?;

        self.index.set(&self.account.did, &self.account.name, &root)?;
        info!(%root, %prev, blocks, "pushed update");
        Ok(root)
    }

    /// The user record and posts of `id`, or of this user. Only local data is read.
    pub fn list(&self, id: Option<&str>) -> Result<(User, Vec<Post>)> {
        let root = match id {
            None => self.current_root()?,
            Some(id) => self
                .index
                .get(id)?
                .with_context(|| format!("{id} is unknown, pull it first"))?,
        };
        let user = self.repo.load_root(&root)?.user;
        let posts = self.repo.posts(&user)?;
        Ok((user, posts))
    }

    /// Fetches the repository of `id`, a DID or a name, from the server.
    pub async fn pull(&self, id: &str) -> Result<User> {
        let car = self.client.get_user(id).await?;
        let (root, user) = self.import_bundle(car).await?;
        self.index.set(&user.did, &user.name, &root)?;
        debug!(%root, "pulled {id}");
        Ok(user)
    }

    /// Checks a repository bundle and merges it into the local store.
    ///
    /// Nothing is stored unless the graph is complete and the root signature verifies.
    async fn import_bundle(&self, car: Bytes) -> Result<(Cid, User)> {
        let staging = MemBlockStore::new();
        let roots = dag::import(Cursor::new(car), &staging, 1).await?;
        let root = roots.first().copied().context("bundle without root")?;
        GraphVerifier::new(self.repo.store()).verify(&root, &staging)?;

        let loaded = Repo::new(Layered::new(&staging, self.repo.store())).load_root(&root)?;
        if let Some(signed) = &loaded.signed {
            DidKeyResolver
                .resolve(&loaded.user.did)?
                .verify(&signed.signing_bytes()?, &signed.sig)
                .context("root signature does not verify")?;
        }
        let merged = staging.copy_into(self.repo.store())?;
        debug!(%root, blocks = merged, "merged bundle");
        Ok((root, loaded.user))
    }

    /// All identities with a known root.
    pub fn known(&self) -> Result<Vec<(String, Cid)>> {
        self.index.list()
    }
}
