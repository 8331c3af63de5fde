//! Encoded tokens.
//!
//! A token is `base64url(header).base64url(claims).base64url(signature)` without padding.
//! The signature covers the first two segments as they appear on the wire.

use data_encoding::BASE64URL_NOPAD;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::attenuation::{Attenuation, Attenuations};
use crate::error::AuthError;
use crate::key::SecretKey;

pub const ALG_EDDSA: &str = "EdDSA";
const TYP_JWT: &str = "JWT";

#[derive(Debug, Serialize, Deserialize)]
pub(crate) struct Header {
    pub alg: String,
    pub typ: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub(crate) struct Claims {
    pub iss: String,
    pub aud: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nbf: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exp: Option<i64>,
    #[serde(default)]
    pub att: Vec<Map<String, Value>>,
    #[serde(default)]
    pub prf: Vec<String>,
}

/// The decoded, not yet verified, segments of a token.
#[derive(Debug)]
pub(crate) struct Parts<'a> {
    pub header: Header,
    pub claims: Claims,
    /// `header.claims` as signed.
    pub signed: &'a str,
    pub signature: Vec<u8>,
}

impl<'a> Parts<'a> {
    pub fn decode(raw: &'a str) -> Result<Self, AuthError> {
        let raw = raw.trim();
        let (signed, signature) = raw
            .rsplit_once('.')
            .ok_or_else(|| AuthError::Malformed("expected three segments".into()))?;
        let (header, claims) = signed
            .split_once('.')
            .ok_or_else(|| AuthError::Malformed("expected three segments".into()))?;
        if claims.contains('.') {
            return Err(AuthError::Malformed("too many segments".into()));
        }
        Ok(Self {
            header: decode_json(header)?,
            claims: decode_json(claims)?,
            signed,
            signature: decode_segment(signature)?,
        })
    }
}

fn decode_segment(segment: &str) -> Result<Vec<u8>, AuthError> {
    BASE64URL_NOPAD
        .decode(segment.as_bytes())
        .map_err(AuthError::malformed)
}

fn decode_json<T: serde::de::DeserializeOwned>(segment: &str) -> Result<T, AuthError> {
    serde_json::from_slice(&decode_segment(segment)?).map_err(AuthError::malformed)
}

fn encode_json<T: Serialize>(value: &T) -> Result<String, AuthError> {
    let json = serde_json::to_vec(value).map_err(AuthError::malformed)?;
    Ok(BASE64URL_NOPAD.encode(&json))
}

/// A verified token.
///
/// Only [`crate::TokenParser`] creates these, so holding one means the signature, time
/// bounds and the whole proof chain have been checked.
#[derive(Debug, Clone)]
pub struct Token {
    pub(crate) raw: String,
    pub issuer: String,
    pub audience: String,
    pub not_before: Option<i64>,
    pub expires_at: Option<i64>,
    pub attenuations: Attenuations,
    /// Verified parent tokens, in the order they were listed.
    pub proofs: Vec<Token>,
}

impl Token {
    /// The encoded form.
    pub fn raw(&self) -> &str {
        &self.raw
    }

    /// The issuer at the end of the chain of first proofs.
    pub fn root_issuer(&self) -> &str {
        let mut token = self;
        while let Some(proof) = token.proofs.first() {
            token = proof;
        }
        &token.issuer
    }
}

/// Builds and signs tokens.
#[derive(Debug)]
pub struct TokenBuilder<'a> {
    issuer: &'a SecretKey,
    audience: String,
    not_before: Option<i64>,
    expires_at: Option<i64>,
    attenuations: Vec<Map<String, Value>>,
    proofs: Vec<String>,
}

impl<'a> TokenBuilder<'a> {
    pub fn new(issuer: &'a SecretKey, audience: impl Into<String>) -> Self {
        Self {
            issuer,
            audience: audience.into(),
            not_before: None,
            expires_at: None,
            attenuations: Vec::new(),
            proofs: Vec::new(),
        }
    }

    /// Unix timestamp before which the token is invalid.
    pub fn not_before(mut self, nbf: i64) -> Self {
        self.not_before = Some(nbf);
        self
    }

    /// Unix timestamp from which on the token is invalid.
    pub fn expires_at(mut self, exp: i64) -> Self {
        self.expires_at = Some(exp);
        self
    }

    /// Expires `secs` seconds from now.
    pub fn valid_for(self, secs: i64) -> Self {
        self.expires_at(now() + secs)
    }

    pub fn attenuation(mut self, att: &Attenuation) -> Self {
        self.attenuations.push(att.to_json());
        self
    }

    /// Adds a proof, either an encoded token or the CID of a stored one.
    pub fn proof(mut self, proof: impl Into<String>) -> Self {
        self.proofs.push(proof.into());
        self
    }

    /// Signs and encodes the token.
    pub fn build(self) -> Result<String, AuthError> {
        let header = Header {
            alg: ALG_EDDSA.to_string(),
            typ: TYP_JWT.to_string(),
        };
        let claims = Claims {
            iss: self.issuer.did(),
            aud: self.audience,
            nbf: self.not_before,
            exp: self.expires_at,
            att: self.attenuations,
            prf: self.proofs,
        };
        let signed = format!("{}.{}", encode_json(&header)?, encode_json(&claims)?);
        let signature = self.issuer.sign(signed.as_bytes());
        Ok(format!("{signed}.{}", BASE64URL_NOPAD.encode(&signature)))
    }
}

/// Current unix time in seconds.
pub(crate) fn now() -> i64 {
    time::OffsetDateTime::now_utc().unix_timestamp()
}
