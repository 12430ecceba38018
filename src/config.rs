// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Configuration layout.
//!
//! Specify the layout of the identity store file to simplify the process of
//! serialization and deserialization. File I/O is left to the caller to
//! figure out, see [`IdentityStore`](crate::store::IdentityStore).
//!
//! # General Layout
//!
//! ```json
//! {
//!   "identities": {
//!     "work": {
//!       "user": "Jane Doe",
//!       "email": "jane@company.com",
//!       "domain": "github.com",
//!       "folders": ["~/Work"]
//!     }
//!   }
//! }
//! ```
//!
//! The name of an identity is the key it is stored under. It is not repeated
//! inside of the record itself. Identities keep the order they are written in,
//! which matters when two identities claim overlapping folders.

use regex::Regex;
use serde::{
    de::{MapAccess, Visitor},
    ser::SerializeMap,
    Deserialize, Deserializer, Serialize, Serializer,
};
use std::{
    collections::HashSet,
    fmt::{Display, Error as FmtError, Formatter, Result as FmtResult},
    str::FromStr,
    sync::LazyLock,
};

static EMAIL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[a-zA-Z0-9._%+-]+@[a-zA-Z0-9.-]+\.[a-zA-Z]{2,}$").expect("valid regex")
});

/// Identity store layout.
#[derive(Default, Debug, PartialEq, Eq, Clone, Deserialize, Serialize)]
pub struct IdentityConfig {
    /// All configured identities in declaration order.
    pub identities: Identities,
}

impl IdentityConfig {
    /// Validate every identity.
    ///
    /// Fails on the first invalid identity. There is no such thing as a
    /// partially valid configuration.
    ///
    /// # Errors
    ///
    /// - Return [`ConfigError::Invalid`] naming the offending identity.
    pub fn validate(&self) -> Result<()> {
        let mut seen = HashSet::new();
        for identity in &self.identities {
            if !seen.insert(identity.name.as_str()) {
                return Err(ConfigError::Invalid {
                    name: identity.name.clone(),
                    source: ValidationError::Duplicate,
                });
            }

            identity.validate().map_err(|source| ConfigError::Invalid {
                name: identity.name.clone(),
                source,
            })?;
        }

        Ok(())
    }
}

impl FromStr for IdentityConfig {
    type Err = ConfigError;

    fn from_str(data: &str) -> Result<Self, Self::Err> {
        let config: IdentityConfig = serde_json::from_str(data)?;

        // INVARIANT: Never hand out an identity store that failed validation.
        config.validate()?;

        Ok(config)
    }
}

impl Display for IdentityConfig {
    fn fmt(&self, fmt: &mut Formatter<'_>) -> FmtResult {
        let data = serde_json::to_string_pretty(self).map_err(ConfigError::Serialize)?;
        fmt.write_str(data.as_str())?;
        fmt.write_str("\n")
    }
}

/// A named git identity.
#[derive(Default, Debug, PartialEq, Eq, Clone, Deserialize, Serialize)]
pub struct Identity {
    /// Name of identity, taken from the key it is stored under.
    #[serde(skip)]
    pub name: String,

    /// Commit author name.
    #[serde(default)]
    pub user: String,

    /// Commit author email.
    #[serde(default)]
    pub email: String,

    /// Host of the forge the identity authenticates against.
    #[serde(default)]
    pub domain: String,

    /// Folder patterns whose repositories use this identity.
    #[serde(default)]
    pub folders: Vec<String>,
}

impl Identity {
    /// Construct new identity.
    pub fn new(
        name: impl Into<String>,
        user: impl Into<String>,
        email: impl Into<String>,
        domain: impl Into<String>,
        folders: impl IntoIterator<Item = impl Into<String>>,
    ) -> Self {
        Self {
            name: name.into(),
            user: user.into(),
            email: email.into(),
            domain: domain.into(),
            folders: folders.into_iter().map(Into::into).collect(),
        }
    }

    /// Check identity invariants.
    ///
    /// # Errors
    ///
    /// - Return [`ValidationError`] describing the first violated invariant.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.name.is_empty() {
            return Err(ValidationError::EmptyName);
        }

        // INVARIANT: Names become file names and marker payloads.
        if self.name.starts_with('.')
            || self
                .name
                .chars()
                .any(|c| c.is_whitespace() || matches!(c, '/' | '\\' | '[' | ']'))
        {
            return Err(ValidationError::BadName(self.name.clone()));
        }

        if self.user.is_empty() {
            return Err(ValidationError::EmptyUser);
        }

        if self.email.is_empty() {
            return Err(ValidationError::EmptyEmail);
        }

        if self.domain.is_empty() {
            return Err(ValidationError::EmptyDomain);
        }

        if self.folders.is_empty() {
            return Err(ValidationError::NoFolders);
        }

        if !EMAIL.is_match(&self.email) {
            return Err(ValidationError::BadEmail(self.email.clone()));
        }

        if self.folders.iter().any(String::is_empty) {
            return Err(ValidationError::EmptyFolder);
        }

        Ok(())
    }
}

/// Ordered collection of identities keyed by name.
#[derive(Default, Debug, PartialEq, Eq, Clone)]
pub struct Identities(Vec<Identity>);

impl Identities {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append identity, replacing any existing identity of the same name.
    pub fn insert(&mut self, identity: Identity) {
        match self.0.iter_mut().find(|entry| entry.name == identity.name) {
            Some(entry) => *entry = identity,
            None => self.0.push(identity),
        }
    }

    pub fn get(&self, name: &str) -> Option<&Identity> {
        self.0.iter().find(|identity| identity.name == name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(|identity| identity.name.as_str())
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Identity> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl FromIterator<Identity> for Identities {
    fn from_iter<I: IntoIterator<Item = Identity>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

impl<'a> IntoIterator for &'a Identities {
    type Item = &'a Identity;
    type IntoIter = std::slice::Iter<'a, Identity>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

impl Serialize for Identities {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.0.len()))?;
        for identity in &self.0 {
            map.serialize_entry(&identity.name, identity)?;
        }
        map.end()
    }
}

impl<'de> Deserialize<'de> for Identities {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct IdentitiesVisitor;

        impl<'de> Visitor<'de> for IdentitiesVisitor {
            type Value = Identities;

            fn expecting(&self, fmt: &mut Formatter) -> FmtResult {
                fmt.write_str("a map of identity names to identity records")
            }

            fn visit_map<A: MapAccess<'de>>(self, mut access: A) -> Result<Self::Value, A::Error> {
                let mut identities = Vec::with_capacity(access.size_hint().unwrap_or(0));

                // INVARIANT: Inject map key as identity name, keep document order.
                while let Some((name, mut identity)) = access.next_entry::<String, Identity>()? {
                    identity.name = name;
                    identities.push(identity);
                }

                Ok(Identities(identities))
            }
        }

        deserializer.deserialize_map(IdentitiesVisitor)
    }
}

/// Identity invariant violations.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    #[error("identity name must not be empty")]
    EmptyName,

    #[error("identity name {0:?} must not start with a dot, or contain whitespace, slashes, or brackets")]
    BadName(String),

    #[error("user must not be empty")]
    EmptyUser,

    #[error("email must not be empty")]
    EmptyEmail,

    #[error("invalid email address: {0}")]
    BadEmail(String),

    #[error("domain must not be empty")]
    EmptyDomain,

    #[error("at least one folder must be specified")]
    NoFolders,

    #[error("folder path must not be empty")]
    EmptyFolder,

    #[error("identity is defined more than once")]
    Duplicate,
}

/// Configuration error types.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Failed to deserialize configuration.
    #[error(transparent)]
    Deserialize(#[from] serde_json::Error),

    /// Failed to serialize configuration.
    #[error("failed to serialize identity store")]
    Serialize(#[source] serde_json::Error),

    /// An identity breaks one of its invariants.
    #[error("invalid identity {name}")]
    Invalid {
        name: String,
        #[source]
        source: ValidationError,
    },
}

impl From<ConfigError> for FmtError {
    fn from(_: ConfigError) -> Self {
        FmtError
    }
}

/// Friendly result alias :3
type Result<T, E = ConfigError> = std::result::Result<T, E>;
