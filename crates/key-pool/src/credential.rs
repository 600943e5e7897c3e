//! Credential model
//!
//! A credential is either a single opaque secret or a correlated pair (e.g.
//! the `_U` and `SRCHHPGUSR` cookies an image provider needs together). Only
//! the primary name is ever written to the quarantine store; a pair is
//! eligible when none of its names is quarantined.

use common::Secret;
use serde::Deserialize;

use crate::store::QuarantineMap;

/// Shape of every credential in a key-type family.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CredentialShape {
    #[default]
    Single,
    Paired,
}

/// A named credential loaded from configuration.
#[derive(Debug, Clone)]
pub enum Credential {
    Single {
        name: String,
        secret: Secret<String>,
    },
    Paired {
        primary_name: String,
        primary_secret: Secret<String>,
        secondary_name: String,
        secondary_secret: Secret<String>,
    },
}

impl Credential {
    pub fn single(name: impl Into<String>, secret: impl Into<String>) -> Self {
        let secret: String = secret.into();
        Credential::Single {
            name: name.into(),
            secret: Secret::from(secret),
        }
    }

    pub fn paired(
        primary_name: impl Into<String>,
        primary_secret: impl Into<String>,
        secondary_name: impl Into<String>,
        secondary_secret: impl Into<String>,
    ) -> Self {
        let primary_secret: String = primary_secret.into();
        let secondary_secret: String = secondary_secret.into();
        Credential::Paired {
            primary_name: primary_name.into(),
            primary_secret: Secret::from(primary_secret),
            secondary_name: secondary_name.into(),
            secondary_secret: Secret::from(secondary_secret),
        }
    }

    /// Name reported to callers and used as the quarantine key.
    pub fn name(&self) -> &str {
        match self {
            Credential::Single { name, .. } => name,
            Credential::Paired { primary_name, .. } => primary_name,
        }
    }

    /// The single name written to the store when this credential goes bad.
    pub fn quarantine_key(&self) -> &str {
        self.name()
    }

    /// Every name that must be absent from quarantine for selection.
    pub fn names(&self) -> Vec<&str> {
        match self {
            Credential::Single { name, .. } => vec![name.as_str()],
            Credential::Paired {
                primary_name,
                secondary_name,
                ..
            } => vec![primary_name.as_str(), secondary_name.as_str()],
        }
    }

    pub fn is_eligible(&self, quarantine: &QuarantineMap) -> bool {
        self.names()
            .iter()
            .all(|name| !quarantine.contains_key(*name))
    }

    pub fn shape(&self) -> CredentialShape {
        match self {
            Credential::Single { .. } => CredentialShape::Single,
            Credential::Paired { .. } => CredentialShape::Paired,
        }
    }

    /// Primary secret value.
    pub fn secret(&self) -> &str {
        match self {
            Credential::Single { secret, .. } => secret.expose(),
            Credential::Paired { primary_secret, .. } => primary_secret.expose(),
        }
    }

    /// Second secret of a pair, `None` for single credentials.
    pub fn secondary_secret(&self) -> Option<&str> {
        match self {
            Credential::Single { .. } => None,
            Credential::Paired {
                secondary_secret, ..
            } => Some(secondary_secret.expose()),
        }
    }
}
