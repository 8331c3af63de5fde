//! Accepting registrations and updates.
//!
//! Both run the same pipeline: verify the token, read the bundle into a request private
//! staging store, check that the graph below the root is complete, check that the token
//! allows the change, and only then merge the staged blocks and publish the new root.
//! Nothing reaches the durable store unless every step succeeded.

use bsky_auth::{
    AccountAttenuationParser, Attenuation, Attenuations, AuthError, DidResolver,
    EmptyAttenuationParser, Resource, Token, TokenParser,
};
use bsky_repo::{
    dag, BlockStore, Cid, GraphVerifier, Layered, MemBlockStore, RedbBlockStore, Repo, User,
};
use tokio::io::AsyncRead;
use tracing::{debug, info, warn};

use crate::state::AppState;

/// The capability needed to update an account.
pub const CAP_POST: &str = "POST";

/// Why a registration or update was refused.
#[derive(Debug, thiserror::Error)]
pub enum UpdateError {
    /// The bundle or the records in it are invalid.
    #[error(transparent)]
    Repo(#[from] bsky_repo::Error),
    /// The bundle is not a valid car file.
    #[error(transparent)]
    Car(#[from] bsky_car::Error),
    /// The token failed verification.
    #[error(transparent)]
    Auth(#[from] AuthError),
    /// The root changed since the update was made.
    #[error("conflict, current root is {current}")]
    Conflict {
        /// The currently published root.
        current: Cid,
    },
    /// The name or identity belongs to someone else.
    #[error("{0} is already registered")]
    AlreadyRegistered(String),
    /// The token is valid but does not allow this change.
    #[error("unauthorized: {0}")]
    Unauthorized(String),
    /// No such user.
    #[error("user {0} not found")]
    NotFound(String),
}

/// Registers the repository in `body`, which must be rooted at a [`User`] record.
///
/// The token needs no attenuations, but it must be issued by the user's own DID.
pub async fn register<R>(state: &AppState, bearer: &str, body: R) -> Result<User, UpdateError>
where
    R: AsyncRead + Send + Unpin,
{
    let token = TokenParser::new(&EmptyAttenuationParser, state.resolver(), state.tokens())
        .with_max_depth(state.auth.max_chain_depth)
        .parse_and_verify(bearer)?;
    state.authorizer().check_audience(&token)?;

    let staging = MemBlockStore::new();
    let root = import_single_root(body, &staging).await?;
    GraphVerifier::new(state.store.as_ref()).verify(&root, &staging)?;
    let user: User = Repo::new(layered(&staging, state)).objects().get(&root)?;

    if token.issuer != user.did {
        warn!(issuer = %token.issuer, did = %user.did, "registration token not issued by user");
        return Err(UpdateError::Unauthorized(
            "token issuer does not match user".to_string(),
        ));
    }

    // reject taken names before anything reaches the durable store
    state
        .registry
        .check_register(&user.did, &user.name, &token.issuer, root)?;
    let merged = staging.copy_into(state.store.as_ref())?;
    state
        .registry
        .register(&user.did, &user.name, &token.issuer, root)?;
    info!(did = %user.did, name = %user.name, %root, blocks = merged, "registration accepted");
    Ok(user)
}

/// Applies the update in `body`, which must be rooted at a signed root.
///
/// Returns the newly published root.
pub async fn update<R>(state: &AppState, bearer: &str, body: R) -> Result<Cid, UpdateError>
where
    R: AsyncRead + Send + Unpin,
{
    let attenuations = AccountAttenuationParser::new(state.auth.capabilities.clone());
    let token = TokenParser::new(&attenuations, state.resolver(), state.tokens())
        .with_max_depth(state.auth.max_chain_depth)
        .parse_and_verify(bearer)?;
    state.authorizer().check_audience(&token)?;

    let staging = MemBlockStore::new();
    let root = import_single_root(body, &staging).await?;
    GraphVerifier::new(state.store.as_ref()).verify(&root, &staging)?;
    let loaded = Repo::new(layered(&staging, state)).load_root(&root)?;
    let Some(signed) = loaded.signed else {
        return Err(bsky_repo::Error::Decode("update root must be a signed root".into()).into());
    };
    let user = loaded.user;

    authorize_update(state, &token, &user)?;
    state
        .resolver()
        .resolve(&user.did)?
        .verify(&signed.signing_bytes()?, &signed.sig)?;

    // fail early, publish re-checks under the entry lock
    let current = state.registry.lookup(&user.did)?;
    if signed.prev != Some(current) {
        return Err(UpdateError::Conflict { current });
    }

    let merged = staging.copy_into(state.store.as_ref())?;
    state.registry.publish(&user.did, signed.prev, root)?;
    info!(did = %user.did, %root, blocks = merged, posts = user.next_post, "update accepted");
    Ok(root)
}

/// The token must grant `POST` on the user's account and be rooted at the registering
/// issuer.
fn authorize_update(state: &AppState, token: &Token, user: &User) -> Result<(), UpdateError> {
    let entry = state.registry.entry(&user.did).ok_or_else(|| {
        UpdateError::Unauthorized(format!("{} is not registered", user.did))
    })?;
    if entry.name != user.name {
        return Err(UpdateError::Unauthorized(format!(
            "{} is registered as {}",
            user.did, entry.name
        )));
    }
    let required = Attenuations(vec![Attenuation::new(
        Resource::account(state.auth.account_kind.as_str(), user.name.as_str()),
        state.auth.capabilities.cap(CAP_POST)?,
    )]);
    state.authorizer().check_attenuation(token, &required)?;
    if token.root_issuer() != entry.issuer {
        return Err(UpdateError::Unauthorized(
            "root issuer does not match registered issuer".to_string(),
        ));
    }
    debug!(did = %user.did, "update authorized");
    Ok(())
}

async fn import_single_root<R>(body: R, staging: &MemBlockStore) -> Result<Cid, UpdateError>
where
    R: AsyncRead + Send + Unpin,
{
    let roots = dag::import(body, staging, 1).await?;
    roots.into_iter().next().ok_or_else(|| {
        bsky_repo::Error::Format(bsky_car::Error::Parsing("no roots".to_string())).into()
    })
}

fn layered<'a>(
    staging: &'a MemBlockStore,
    state: &'a AppState,
) -> Layered<'a, MemBlockStore, RedbBlockStore> {
    Layered::new(staging, state.store.as_ref())
}
