use std::io::Cursor;

use bsky_repo::{dag, BlockStore, Error, GraphVerifier, MemBlockStore, Post, RedbBlockStore, Repo};
use testresult::TestResult;

fn post(body: &str) -> Post {
    Post {
        timestamp: "2022-05-01T10:00:00Z".into(),
        body: body.into(),
    }
}

/// A client pushes its repository in two steps, the second only sending the difference.
#[tokio::test]
async fn incremental_push() -> TestResult {
    let client = Repo::new(MemBlockStore::new());
    let server = RedbBlockStore::in_memory()?;

    let (first, user) = client.create_user("did:key:z6Mkalice", "alice")?;
    let mut buf = Vec::new();
    dag::export(client.store(), first, &mut buf).await?;
    let staging = MemBlockStore::new();
    let roots = dag::import(Cursor::new(buf), &staging, 1).await?;
    GraphVerifier::new(&server).verify(&roots[0], &staging)?;
    staging.copy_into(&server)?;

    let (_, user) = client.add_post(&user, &post("a"))?;
    let (second, _) = client.add_post(&user, &post("b"))?;
    let mut buf = Vec::new();
    let sent = dag::export_diff(client.store(), second, Some(first), &mut buf).await?;
    let staging = MemBlockStore::new();
    let roots = dag::import(Cursor::new(buf), &staging, 1).await?;
    assert_eq!(staging.len(), sent);
    let staged = GraphVerifier::new(&server).verify(&roots[0], &staging)?;
    assert_eq!(staged, sent);
    staging.copy_into(&server)?;

    let repo = Repo::new(&server);
    let root = repo.load_root(&second)?;
    let bodies: Vec<_> = repo.posts(&root.user)?.into_iter().map(|p| p.body).collect();
    assert_eq!(bodies, ["a", "b"]);
    Ok(())
}

/// A bundle that relies on blocks the server never received is refused.
#[tokio::test]
async fn diff_against_unknown_base_is_incomplete() -> TestResult {
    let client = Repo::new(MemBlockStore::new());
    let server = MemBlockStore::new();

    let (first, user) = client.create_user("did:key:z6Mkalice", "alice")?;
    let (second, _) = client.add_post(&user, &post("a"))?;
    let mut buf = Vec::new();
    dag::export_diff(client.store(), second, Some(first), &mut buf).await?;

    let staging = MemBlockStore::new();
    let roots = dag::import(Cursor::new(buf), &staging, 1).await?;
    let res = GraphVerifier::new(&server).verify(&roots[0], &staging);
    assert!(matches!(res, Err(Error::IncompleteGraph { .. })));
    assert!(server.is_empty());
    Ok(())
}
