//! Token verification.

use libipld::Cid;
use tracing::{debug, trace};

use crate::attenuation::{AttenuationParser, Attenuations};
use crate::did::DidResolver;
use crate::error::AuthError;
use crate::store::TokenStore;
use crate::token::{now, Parts, Token, ALG_EDDSA};

/// Default bound on the number of proofs between a token and its root.
pub const DEFAULT_MAX_CHAIN_DEPTH: usize = 8;

/// Parses tokens and verifies them together with their proof chains.
#[derive(Debug)]
pub struct TokenParser<'a> {
    attenuations: &'a dyn AttenuationParser,
    resolver: &'a dyn DidResolver,
    store: &'a dyn TokenStore,
    max_depth: usize,
    now: Option<i64>,
}

impl<'a> TokenParser<'a> {
    pub fn new(
        attenuations: &'a dyn AttenuationParser,
        resolver: &'a dyn DidResolver,
        store: &'a dyn TokenStore,
    ) -> Self {
        Self {
            attenuations,
            resolver,
            store,
            max_depth: DEFAULT_MAX_CHAIN_DEPTH,
            now: None,
        }
    }

    pub fn with_max_depth(mut self, max_depth: usize) -> Self {
        self.max_depth = max_depth;
        self
    }

    /// Checks time bounds against `now` instead of the system clock.
    pub fn with_now(mut self, now: i64) -> Self {
        self.now = Some(now);
        self
    }

    /// Verifies `raw` and every proof it references.
    ///
    /// For each token: the encoding is parsed, the signature is checked against the
    /// issuer's key, the time bounds are checked, and then each proof is verified the same
    /// way. A proof must be addressed to the issuer of its child and must grant everything
    /// the child grants.
    pub fn parse_and_verify(&self, raw: &str) -> Result<Token, AuthError> {
        let now = self.now.unwrap_or_else(now);
        self.verify_at(raw, 0, now)
    }

    fn verify_at(&self, raw: &str, depth: usize, now: i64) -> Result<Token, AuthError> {
        if depth > self.max_depth {
            return Err(AuthError::ChainTooLong(self.max_depth));
        }
        let Parts {
            header,
            claims,
            signed,
            signature,
        } = Parts::decode(raw)?;
        if header.alg != ALG_EDDSA {
            return Err(AuthError::UnsupportedAlgorithm(header.alg));
        }
        let key = self.resolver.resolve(&claims.iss)?;
        key.verify(signed.as_bytes(), &signature)?;

        if let Some(exp) = claims.exp {
            if now >= exp {
                return Err(AuthError::Expired { exp });
            }
        }
        if let Some(nbf) = claims.nbf {
            if now < nbf {
                return Err(AuthError::NotYetValid { nbf });
            }
        }

        let mut attenuations = Vec::with_capacity(claims.att.len());
        for att in &claims.att {
            if let Some(att) = self.attenuations.parse(att)? {
                attenuations.push(att);
            }
        }
        let attenuations = Attenuations(attenuations);

        let mut proofs = Vec::with_capacity(claims.prf.len());
        for prf in &claims.prf {
            let proof = self.verify_at(&self.resolve_proof(prf)?, depth + 1, now)?;
            if proof.audience != claims.iss {
                return Err(AuthError::DelegationMismatch {
                    issuer: claims.iss,
                    audience: proof.audience,
                });
            }
            if !proof.attenuations.contains(&attenuations) {
                debug!(issuer = %claims.iss, proof_issuer = %proof.issuer, "attenuation exceeds proof");
                return Err(AuthError::AttenuationDenied);
            }
            proofs.push(proof);
        }
        trace!(iss = %claims.iss, depth, proofs = proofs.len(), "verified token");

        Ok(Token {
            raw: raw.trim().to_string(),
            issuer: claims.iss,
            audience: claims.aud,
            not_before: claims.nbf,
            expires_at: claims.exp,
            attenuations,
            proofs,
        })
    }

    /// Inline tokens are used as is, anything else is the CID of a stored token.
    fn resolve_proof(&self, prf: &str) -> Result<String, AuthError> {
        if prf.contains('.') {
            return Ok(prf.to_string());
        }
        let cid = Cid::try_from(prf).map_err(|_| AuthError::MissingProof(prf.to_string()))?;
        self.store
            .get_token(&cid)?
            .ok_or_else(|| AuthError::MissingProof(prf.to_string()))
    }
}

/// Checks a verified token against what a service requires.
#[derive(Debug, Clone)]
pub struct Authorizer {
    service_did: String,
}

impl Authorizer {
    pub fn new(service_did: impl Into<String>) -> Self {
        Self {
            service_did: service_did.into(),
        }
    }

    pub fn service_did(&self) -> &str {
        &self.service_did
    }

    /// The token must be addressed to this service.
    pub fn check_audience(&self, token: &Token) -> Result<(), AuthError> {
        if token.audience != self.service_did {
            return Err(AuthError::AudienceMismatch {
                expected: self.service_did.clone(),
                actual: token.audience.clone(),
            });
        }
        Ok(())
    }

    /// The token must grant everything in `required`.
    pub fn check_attenuation(
        &self,
        token: &Token,
        required: &Attenuations,
    ) -> Result<(), AuthError> {
        if !token.attenuations.contains(required) {
            return Err(AuthError::AttenuationDenied);
        }
        Ok(())
    }
}
