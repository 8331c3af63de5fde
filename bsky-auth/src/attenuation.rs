//! What a token allows: capabilities on resources.

use std::fmt::Debug;

use serde_json::{Map, Value};

use crate::error::AuthError;

/// Key of the capability in an encoded attenuation.
pub const CAP_KEY: &str = "cap";

/// An ordered set of capabilities, most powerful first.
///
/// A capability contains itself and every capability ranked below it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NestedCapabilities {
    caps: Vec<String>,
}

impl NestedCapabilities {
    pub fn new<I, S>(caps: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            caps: caps.into_iter().map(Into::into).collect(),
        }
    }

    /// Looks up a capability by name.
    pub fn cap(&self, name: &str) -> Result<Capability, AuthError> {
        self.caps
            .iter()
            .position(|c| c == name)
            .map(|rank| Capability {
                name: name.to_string(),
                rank,
            })
            .ok_or_else(|| AuthError::UnknownCapability(name.to_string()))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Capability {
    name: String,
    rank: usize,
}

impl Capability {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn contains(&self, other: &Capability) -> bool {
        self.rank <= other.rank
    }
}

/// An account resource, `kind` names the service and `value` the account.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resource {
    kind: String,
    value: String,
}

impl Resource {
    pub fn account(kind: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            value: value.into(),
        }
    }

    pub fn kind(&self) -> &str {
        &self.kind
    }

    pub fn value(&self) -> &str {
        &self.value
    }

    /// Same kind, and this value orders at or before the other one.
    pub fn contains(&self, other: &Resource) -> bool {
        self.kind == other.kind && self.value <= other.value
    }
}

/// A capability on a resource.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attenuation {
    pub resource: Resource,
    pub capability: Capability,
}

impl Attenuation {
    pub fn new(resource: Resource, capability: Capability) -> Self {
        Self {
            resource,
            capability,
        }
    }

    pub fn contains(&self, other: &Attenuation) -> bool {
        self.resource.contains(&other.resource) && self.capability.contains(&other.capability)
    }

    /// The encoded form, `{"cap": <capability>, <kind>: <value>}`.
    pub fn to_json(&self) -> Map<String, Value> {
        let mut map = Map::new();
        map.insert(CAP_KEY.to_string(), self.capability.name.clone().into());
        map.insert(self.resource.kind.clone(), self.resource.value.clone().into());
        map
    }
}

/// All attenuations granted by a token.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Attenuations(pub Vec<Attenuation>);

impl Attenuations {
    /// True if every required attenuation is contained in one of ours.
    pub fn contains(&self, required: &Attenuations) -> bool {
        required
            .0
            .iter()
            .all(|r| self.0.iter().any(|a| a.contains(r)))
    }

    pub fn iter(&self) -> impl Iterator<Item = &Attenuation> {
        self.0.iter()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl From<Vec<Attenuation>> for Attenuations {
    fn from(value: Vec<Attenuation>) -> Self {
        Self(value)
    }
}

/// Turns an encoded attenuation into an [`Attenuation`].
///
/// Returning `None` drops the entry, for verifiers that do not care about attenuations.
pub trait AttenuationParser: Debug + Send + Sync {
    fn parse(&self, map: &Map<String, Value>) -> Result<Option<Attenuation>, AuthError>;
}

/// Parses `{"cap": <capability>, <kind>: <account>}` attenuations.
#[derive(Debug, Clone)]
pub struct AccountAttenuationParser {
    caps: NestedCapabilities,
}

impl AccountAttenuationParser {
    pub fn new(caps: NestedCapabilities) -> Self {
        Self { caps }
    }
}

impl AttenuationParser for AccountAttenuationParser {
    fn parse(&self, map: &Map<String, Value>) -> Result<Option<Attenuation>, AuthError> {
        let mut cap = None;
        let mut resource = None;
        for (key, value) in map {
            let Value::String(value) = value else {
                return Err(AuthError::Malformed(format!(
                    "attenuation value for {key} is not a string"
                )));
            };
            if key == CAP_KEY {
                cap = Some(self.caps.cap(value)?);
            } else if resource.is_some() {
                return Err(AuthError::Malformed(
                    "attenuation names more than one resource".into(),
                ));
            } else {
                resource = Some(Resource::account(key.as_str(), value.as_str()));
            }
        }
        match (resource, cap) {
            (Some(resource), Some(capability)) => Ok(Some(Attenuation::new(resource, capability))),
            _ => Err(AuthError::Malformed(
                "attenuation needs a capability and a resource".into(),
            )),
        }
    }
}

/// Ignores all attenuations.
#[derive(Debug, Clone, Copy, Default)]
pub struct EmptyAttenuationParser;

impl AttenuationParser for EmptyAttenuationParser {
    fn parse(&self, _map: &Map<String, Value>) -> Result<Option<Attenuation>, AuthError> {
        Ok(None)
    }
}
