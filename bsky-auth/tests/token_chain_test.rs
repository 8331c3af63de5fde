use bsky_auth::{
    AccountAttenuationParser, Attenuation, Attenuations, AuthError, Authorizer, DidKeyResolver,
    EmptyAttenuationParser, MemTokenStore, NestedCapabilities, Resource, SecretKey, TokenBuilder,
    TokenParser, TokenStore,
};
use data_encoding::BASE64URL_NOPAD;
use testresult::TestResult;

const SERVICE: &str = "did:key:z6Mkmi4eUvWtRAP6PNB7MnGfUFdLkGe255ftW9sGo28uv44g";
const NOW: i64 = 1_700_000_000;

fn caps() -> NestedCapabilities {
    NestedCapabilities::new(["SUPER", "POST"])
}

fn post_on(name: &str) -> Attenuation {
    Attenuation::new(Resource::account("bsky", name), caps().cap("POST").unwrap())
}

fn super_on(name: &str) -> Attenuation {
    Attenuation::new(Resource::account("bsky", name), caps().cap("SUPER").unwrap())
}

struct Verifier {
    parser: AccountAttenuationParser,
    store: MemTokenStore,
}

impl Verifier {
    fn new() -> Self {
        Self {
            parser: AccountAttenuationParser::new(caps()),
            store: MemTokenStore::new(),
        }
    }

    fn parser(&self) -> TokenParser<'_> {
        TokenParser::new(&self.parser, &DidKeyResolver, &self.store).with_now(NOW)
    }
}

#[test]
fn self_issued_token() -> TestResult {
    let alice = SecretKey::generate();
    let raw = TokenBuilder::new(&alice, SERVICE)
        .attenuation(&post_on("alice"))
        .expires_at(NOW + 60)
        .build()?;

    let v = Verifier::new();
    let token = v.parser().parse_and_verify(&raw)?;
    assert_eq!(token.issuer, alice.did());
    assert_eq!(token.root_issuer(), alice.did());
    assert_eq!(token.raw(), raw);

    let auth = Authorizer::new(SERVICE);
    auth.check_audience(&token)?;
    auth.check_attenuation(&token, &Attenuations(vec![post_on("alice")]))?;
    assert!(matches!(
        auth.check_attenuation(&token, &Attenuations(vec![super_on("alice")])),
        Err(AuthError::AttenuationDenied)
    ));
    assert!(matches!(
        auth.check_attenuation(
            &token,
            &Attenuations(vec![Attenuation::new(
                Resource::account("mail", "alice"),
                caps().cap("POST")?
            )])
        ),
        Err(AuthError::AttenuationDenied)
    ));
    Ok(())
}

#[test]
fn wrong_audience() -> TestResult {
    let alice = SecretKey::generate();
    let raw = TokenBuilder::new(&alice, "did:key:z6Mkother").build()?;
    let v = Verifier::new();
    let token = v.parser().parse_and_verify(&raw)?;
    assert!(matches!(
        Authorizer::new(SERVICE).check_audience(&token),
        Err(AuthError::AudienceMismatch { .. })
    ));
    Ok(())
}

#[test]
fn time_bounds() -> TestResult {
    let alice = SecretKey::generate();
    let v = Verifier::new();

    let expired = TokenBuilder::new(&alice, SERVICE).expires_at(NOW).build()?;
    assert!(matches!(
        v.parser().parse_and_verify(&expired),
        Err(AuthError::Expired { exp: NOW })
    ));

    let early = TokenBuilder::new(&alice, SERVICE).not_before(NOW + 1).build()?;
    assert!(matches!(
        v.parser().parse_and_verify(&early),
        Err(AuthError::NotYetValid { .. })
    ));

    let current = TokenBuilder::new(&alice, SERVICE)
        .not_before(NOW)
        .expires_at(NOW + 1)
        .build()?;
    v.parser().parse_and_verify(&current)?;
    Ok(())
}

#[test]
fn delegated_token() -> TestResult {
    let alice = SecretKey::generate();
    let device = SecretKey::generate();
    let root = TokenBuilder::new(&alice, device.did())
        .attenuation(&super_on("alice"))
        .build()?;
    let leaf = TokenBuilder::new(&device, SERVICE)
        .attenuation(&post_on("alice"))
        .proof(&root)
        .build()?;

    let v = Verifier::new();
    let token = v.parser().parse_and_verify(&leaf)?;
    assert_eq!(token.issuer, device.did());
    assert_eq!(token.root_issuer(), alice.did());
    assert_eq!(token.proofs.len(), 1);
    Ok(())
}

#[test]
fn stored_proof() -> TestResult {
    let alice = SecretKey::generate();
    let device = SecretKey::generate();
    let root = TokenBuilder::new(&alice, device.did())
        .attenuation(&post_on("alice"))
        .build()?;

    let v = Verifier::new();
    let cid = v.store.put_token(&root)?;
    let leaf = TokenBuilder::new(&device, SERVICE)
        .attenuation(&post_on("alice"))
        .proof(cid.to_string())
        .build()?;
    assert_eq!(v.parser().parse_and_verify(&leaf)?.root_issuer(), alice.did());

    let unknown = TokenBuilder::new(&device, SERVICE)
        .proof(bsky_auth::store::token_cid("not stored").to_string())
        .build()?;
    assert!(matches!(
        v.parser().parse_and_verify(&unknown),
        Err(AuthError::MissingProof(_))
    ));
    Ok(())
}

#[test]
fn delegation_cannot_amplify() -> TestResult {
    let alice = SecretKey::generate();
    let device = SecretKey::generate();
    let root = TokenBuilder::new(&alice, device.did())
        .attenuation(&post_on("alice"))
        .build()?;
    let leaf = TokenBuilder::new(&device, SERVICE)
        .attenuation(&super_on("alice"))
        .proof(&root)
        .build()?;

    let v = Verifier::new();
    assert!(matches!(
        v.parser().parse_and_verify(&leaf),
        Err(AuthError::AttenuationDenied)
    ));
    Ok(())
}

#[test]
fn proof_for_someone_else() -> TestResult {
    let alice = SecretKey::generate();
    let device = SecretKey::generate();
    let thief = SecretKey::generate();
    let root = TokenBuilder::new(&alice, device.did())
        .attenuation(&post_on("alice"))
        .build()?;
    let leaf = TokenBuilder::new(&thief, SERVICE)
        .attenuation(&post_on("alice"))
        .proof(&root)
        .build()?;

    let v = Verifier::new();
    assert!(matches!(
        v.parser().parse_and_verify(&leaf),
        Err(AuthError::DelegationMismatch { .. })
    ));
    Ok(())
}

fn chain(len: usize) -> TestResult<String> {
    let keys: Vec<_> = (0..=len).map(|_| SecretKey::generate()).collect();
    let mut raw = TokenBuilder::new(&keys[0], keys[1].did())
        .attenuation(&post_on("alice"))
        .build()?;
    for i in 1..len {
        raw = TokenBuilder::new(&keys[i], keys[i + 1].did())
            .attenuation(&post_on("alice"))
            .proof(raw)
            .build()?;
    }
    Ok(TokenBuilder::new(&keys[len], SERVICE)
        .attenuation(&post_on("alice"))
        .proof(raw)
        .build()?)
}

#[test]
fn chain_depth_bound() -> TestResult {
    let v = Verifier::new();
    // a chain of n delegations has n proofs below the presented token
    v.parser().with_max_depth(3).parse_and_verify(&chain(3)?)?;
    assert!(matches!(
        v.parser().with_max_depth(3).parse_and_verify(&chain(4)?),
        Err(AuthError::ChainTooLong(3))
    ));
    Ok(())
}

#[test]
fn tampered_signature() -> TestResult {
    let alice = SecretKey::generate();
    let mallory = SecretKey::generate();
    let raw = TokenBuilder::new(&alice, SERVICE).build()?;
    let (signed, _) = raw.rsplit_once('.').unwrap();
    let forged = format!(
        "{signed}.{}",
        BASE64URL_NOPAD.encode(&mallory.sign(signed.as_bytes()))
    );
    let v = Verifier::new();
    assert!(matches!(
        v.parser().parse_and_verify(&forged),
        Err(AuthError::BadSignature)
    ));
    Ok(())
}

#[test]
fn unsupported_algorithm() -> TestResult {
    let alice = SecretKey::generate();
    let header = BASE64URL_NOPAD.encode(br#"{"alg":"HS256","typ":"JWT"}"#);
    let claims = BASE64URL_NOPAD.encode(
        format!(r#"{{"iss":"{}","aud":"{SERVICE}"}}"#, alice.did()).as_bytes(),
    );
    let raw = format!("{header}.{claims}.AAAA");
    let v = Verifier::new();
    assert!(matches!(
        v.parser().parse_and_verify(&raw),
        Err(AuthError::UnsupportedAlgorithm(alg)) if alg == "HS256"
    ));
    Ok(())
}

#[test]
fn registration_ignores_attenuations() -> TestResult {
    let alice = SecretKey::generate();
    let raw = TokenBuilder::new(&alice, SERVICE)
        .attenuation(&post_on("alice"))
        .build()?;
    let store = MemTokenStore::new();
    let token = TokenParser::new(&EmptyAttenuationParser, &DidKeyResolver, &store)
        .parse_and_verify(&raw)?;
    assert!(token.attenuations.is_empty());
    Ok(())
}
