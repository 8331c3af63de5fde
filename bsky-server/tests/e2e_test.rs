use bsky_agent::{Agent, AgentDir, Client};
use bsky_auth::{Attenuation, NestedCapabilities, Resource, SecretKey, TokenBuilder};
use bsky_car::{CarHeader, CarWriter};
use bsky_repo::{dag, BlockStore, Cid, MemBlockStore, Post, Repo};
use bsky_server::server::Server;
use http::StatusCode;
use testresult::TestResult;

fn post(body: &str) -> Post {
    Post {
        timestamp: "2024-01-01T00:00:00Z".into(),
        body: body.into(),
    }
}

fn update_token(key: &SecretKey, service: &str, name: &str) -> TestResult<String> {
    let caps = NestedCapabilities::new(["POST"]);
    let att = Attenuation::new(Resource::account("bsky", name), caps.cap("POST")?);
    Ok(TokenBuilder::new(key, service)
        .attenuation(&att)
        .valid_for(60)
        .build()?)
}

async fn export(store: &MemBlockStore, root: Cid, base: Option<Cid>) -> TestResult<Vec<u8>> {
    let mut car = Vec::new();
    dag::export_diff(store, root, base, &mut car).await?;
    Ok(car)
}

#[tokio::test]
#[tracing_test::traced_test]
async fn publish_and_pull() -> TestResult {
    let (server, url) = Server::spawn_for_tests().await?;
    let tmp = tempfile::tempdir()?;

    let alice = Agent::init(AgentDir::new(tmp.path().join("alice")), "alice", &url)?;
    alice.register().await?;
    for body in ["a", "b", "c"] {
        alice.post(body).await?;
    }

    let bob = Agent::init(AgentDir::new(tmp.path().join("bob")), "bob", &url)?;
    bob.register().await?;
    bob.follow(&alice.account().did).await?;

    let user = bob.pull("alice").await?;
    assert_eq!(user.did, alice.account().did);
    assert_eq!(user.next_post, 3);
    let (_, posts) = bob.list(Some("alice"))?;
    let bodies: Vec<_> = posts.iter().map(|p| p.body.as_str()).collect();
    assert_eq!(bodies, ["a", "b", "c"]);

    let (me, _) = bob.list(None)?;
    assert_eq!(me.follows, [alice.account().did.clone()]);

    // alice sees bob by DID as well
    alice.pull(&bob.account().did).await?;
    assert_eq!(alice.list(Some("bob"))?.0.follows.len(), 1);

    let client = Client::new(url.as_str());
    assert_eq!(
        client.webfinger("alice").await?,
        alice.account().did.clone()
    );
    let err = client.get_user("nobody").await.unwrap_err();
    assert_eq!(err.status(), Some(StatusCode::NOT_FOUND));

    server.shutdown().await?;
    Ok(())
}

#[tokio::test]
async fn rejected_updates() -> TestResult {
    let (server, url) = Server::spawn_for_tests().await?;
    let client = Client::new(url.as_str());
    let service = client.service_did().await?;
    let durable = server.state().store.clone();

    let key = SecretKey::generate();
    let store = MemBlockStore::new();
    let repo = Repo::new(&store);
    let (root0, user0) = repo.create_user(&key.did(), "carol")?;

    let token = TokenBuilder::new(&key, service.as_str()).valid_for(60).build()?;
    client.register(&token, export(&store, root0, None).await?).await?;

    // the same registration again is accepted
    client.register(&token, export(&store, root0, None).await?).await?;

    // someone else cannot take the name
    let mallory = SecretKey::generate();
    let (other, _) = repo.create_user(&mallory.did(), "carol")?;
    let token = TokenBuilder::new(&mallory, service.as_str()).valid_for(60).build()?;
    let err = client
        .register(&token, export(&store, other, None).await?)
        .await
        .unwrap_err();
    assert_eq!(err.status(), Some(StatusCode::CONFLICT));
    assert!(!durable.has(&other)?);

    let (user1, _) = repo.add_post(&user0, &post("first"))?;
    let root1 = repo.sign_root(user1, Some(root0), |b| key.sign(b))?;
    let car = export(&store, root1, Some(root0)).await?;

    // a token from a key that does not own the account
    let token = update_token(&mallory, &service, "carol")?;
    let err = client.update(&token, car.clone()).await.unwrap_err();
    assert_eq!(err.status(), Some(StatusCode::UNAUTHORIZED));

    // a token for another audience
    let token = update_token(&key, &mallory.did(), "carol")?;
    let err = client.update(&token, car.clone()).await.unwrap_err();
    assert_eq!(err.status(), Some(StatusCode::UNAUTHORIZED));
    assert!(!durable.has(&root1)?);
    assert!(!durable.has(&user1)?);

    let token = update_token(&key, &service, "carol")?;
    client.update(&token, car).await?;

    // a sibling of root1 built on the stale root
    let (stale, _) = repo.add_post(&user0, &post("second"))?;
    let stale = repo.sign_root(stale, Some(root0), |b| key.sign(b))?;
    let err = client
        .update(&token, export(&store, stale, Some(root0)).await?)
        .await
        .unwrap_err();
    assert_eq!(err.status(), Some(StatusCode::CONFLICT));
    assert!(!durable.has(&stale)?);

    // only the root block of an otherwise new DAG
    let user1 = repo.load_root(&root1)?.user;
    let (user2, _) = repo.add_post(&user1, &post("third"))?;
    let root2 = repo.sign_root(user2, Some(root1), |b| key.sign(b))?;
    let mut writer = CarWriter::new(CarHeader::new_v1(vec![root2]), Vec::new());
    writer.write(root2, store.get(&root2)?).await?;
    let car = writer.finish().await?;
    let err = client.update(&token, car).await.unwrap_err();
    assert_eq!(err.status(), Some(StatusCode::UNPROCESSABLE_ENTITY));
    assert!(!durable.has(&root2)?);

    // the complete one goes through and is what readers get
    client
        .update(&token, export(&store, root2, Some(root1)).await?)
        .await?;
    assert_eq!(server.state().registry.lookup("carol")?, root2);

    let bundle = client.get_user("carol").await?;
    let pulled = MemBlockStore::new();
    let roots = dag::import(std::io::Cursor::new(bundle), &pulled, 1).await?;
    assert_eq!(roots, [root2]);
    let pulled_repo = Repo::new(&pulled);
    let user = pulled_repo.load_root(&root2)?.user;
    let bodies: Vec<_> = pulled_repo
        .posts(&user)?
        .into_iter()
        .map(|p| p.body)
        .collect();
    assert_eq!(bodies, ["first", "third"]);

    server.shutdown().await?;
    Ok(())
}
