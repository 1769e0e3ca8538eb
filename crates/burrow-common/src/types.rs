//! Domain primitive types used across the burrow workspace.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::constants::{DEFAULT_NAMESPACE, DEFAULT_TAG, SHA256_HEX_LENGTH};
use crate::error::{BurrowError, Result};

/// Unique identifier for one sandbox session, used to correlate log events.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SessionId(String);

impl SessionId {
    /// Generates a random session ID.
    #[must_use]
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().simple().to_string())
    }

    /// Returns the inner string representation.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Content address of a blob, e.g. `sha256:<64 hex chars>`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Digest {
    algorithm: String,
    hex: String,
}

impl Digest {
    /// Parses an `algorithm:encoded` digest string.
    ///
    /// `sha256` digests must carry exactly 64 lowercase hex characters.
    ///
    /// # Errors
    ///
    /// Returns `BurrowError::Config` if the string is not a valid digest.
    pub fn parse(value: &str) -> Result<Self> {
        let invalid = || BurrowError::Config {
            message: format!("invalid digest: {value:?}"),
        };
        let (algorithm, hex) = value.split_once(':').ok_or_else(invalid)?;
        let algorithm_ok = !algorithm.is_empty()
            && algorithm
                .chars()
                .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || "+._-".contains(c));
        let hex_ok = !hex.is_empty()
            && hex
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || "=_-".contains(c));
        if !algorithm_ok || !hex_ok {
            return Err(invalid());
        }
        if algorithm == "sha256"
            && (hex.len() != SHA256_HEX_LENGTH
                || !hex.chars().all(|c| c.is_ascii_digit() || ('a'..='f').contains(&c)))
        {
            return Err(invalid());
        }
        Ok(Self {
            algorithm: algorithm.into(),
            hex: hex.into(),
        })
    }

    /// Builds a SHA-256 digest from an already computed lowercase hex string.
    ///
    /// # Errors
    ///
    /// Returns an error if `hex` is not 64 lowercase hex characters.
    pub fn sha256(hex: &str) -> Result<Self> {
        Self::parse(&format!("sha256:{hex}"))
    }

    /// Returns the algorithm part (`sha256`).
    #[must_use]
    pub fn algorithm(&self) -> &str {
        &self.algorithm
    }

    /// Returns the encoded hash part.
    #[must_use]
    pub fn hex(&self) -> &str {
        &self.hex
    }

    /// Returns whether this is a SHA-256 digest.
    #[must_use]
    pub fn is_sha256(&self) -> bool {
        self.algorithm == "sha256"
    }

    /// Returns a shortened form for human-facing output.
    #[must_use]
    pub fn short(&self) -> &str {
        &self.hex[..self.hex.len().min(12)]
    }
}

impl fmt::Display for Digest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.algorithm, self.hex)
    }
}

impl TryFrom<String> for Digest {
    type Error = BurrowError;

    fn try_from(value: String) -> Result<Self> {
        Self::parse(&value)
    }
}

impl From<Digest> for String {
    fn from(digest: Digest) -> Self {
        digest.to_string()
    }
}

/// Tag or digest selecting one manifest of a repository.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Reference {
    /// Mutable tag such as `latest`.
    Tag(String),
    /// Immutable manifest digest.
    Digest(Digest),
}

impl fmt::Display for Reference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Tag(tag) => write!(f, "{tag}"),
            Self::Digest(digest) => write!(f, "{digest}"),
        }
    }
}

/// Image requested on the command line, resolved against the default registry.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ImageReference {
    repository: String,
    reference: Reference,
}

impl ImageReference {
    /// Parses `name`, `name:tag`, `namespace/name:tag` or `name@sha256:...`.
    ///
    /// Single-component names are placed under the `library/` namespace and
    /// a missing tag defaults to `latest`. Registry hostnames are rejected:
    /// the registry is chosen by configuration.
    ///
    /// # Errors
    ///
    /// Returns `BurrowError::Config` for empty or malformed references.
    pub fn parse(input: &str) -> Result<Self> {
        let input = input.trim();
        if input.is_empty() {
            return Err(BurrowError::Config {
                message: "image reference is empty".into(),
            });
        }

        let (name, reference) = if let Some((name, digest)) = input.split_once('@') {
            (name, Reference::Digest(Digest::parse(digest)?))
        } else {
            let last_slash = input.rfind('/').map_or(0, |i| i + 1);
            match input[last_slash..].rfind(':') {
                Some(colon) => {
                    let split = last_slash + colon;
                    let tag = &input[split + 1..];
                    validate_tag(tag)?;
                    (&input[..split], Reference::Tag(tag.into()))
                }
                None => (input, Reference::Tag(DEFAULT_TAG.into())),
            }
        };

        Ok(Self {
            repository: normalize_repository(name)?,
            reference,
        })
    }

    /// Returns the repository path, e.g. `library/alpine`.
    #[must_use]
    pub fn repository(&self) -> &str {
        &self.repository
    }

    /// Returns the tag or digest.
    #[must_use]
    pub const fn reference(&self) -> &Reference {
        &self.reference
    }
}

impl fmt::Display for ImageReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.reference {
            Reference::Tag(tag) => write!(f, "{}:{tag}", self.repository),
            Reference::Digest(digest) => write!(f, "{}@{digest}", self.repository),
        }
    }
}

fn normalize_repository(name: &str) -> Result<String> {
    let invalid = |why: &str| BurrowError::Config {
        message: format!("invalid repository name {name:?}: {why}"),
    };
    if name.is_empty() {
        return Err(invalid("empty"));
    }
    let components: Vec<&str> = name.split('/').collect();
    if components.len() > 1 {
        let first = components[0];
        if first.contains('.') || first.contains(':') || first == "localhost" {
            return Err(invalid("registry hosts are selected with --registry-url"));
        }
    }
    for component in &components {
        let ok = !component.is_empty()
            && component
                .chars()
                .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || "._-".contains(c))
            && component.starts_with(|c: char| c.is_ascii_alphanumeric());
        if !ok {
            return Err(invalid("components must be lowercase alphanumerics"));
        }
    }
    if components.len() == 1 {
        Ok(format!("{DEFAULT_NAMESPACE}/{name}"))
    } else {
        Ok(name.into())
    }
}

fn validate_tag(tag: &str) -> Result<()> {
    let ok = !tag.is_empty()
        && tag.len() <= 128
        && tag.starts_with(|c: char| c.is_ascii_alphanumeric() || c == '_')
        && tag
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || "._-".contains(c));
    if ok {
        Ok(())
    } else {
        Err(BurrowError::Config {
            message: format!("invalid tag: {tag:?}"),
        })
    }
}

/// Lifecycle state of a sandbox session.
///
/// ```text
/// Created -> RootPopulating -> RootReady -> IsolationEntered -> ChildRunning -> Terminated -> CleanedUp
///    \______________\______________\_______________\_______________\-> Failed -> CleanedUp
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SessionState {
    /// The ephemeral root exists but is empty.
    Created,
    /// Layers are being fetched and extracted.
    RootPopulating,
    /// Every layer has been extracted.
    RootReady,
    /// Namespaces were created and the root switch is armed.
    IsolationEntered,
    /// The command is running.
    ChildRunning,
    /// The command exited.
    Terminated,
    /// A stage failed; only cleanup remains.
    Failed,
    /// The ephemeral root has been removed.
    CleanedUp,
}

impl SessionState {
    /// Returns whether moving from `self` to `next` is a legal transition.
    #[must_use]
    pub const fn can_transition_to(self, next: Self) -> bool {
        matches!(
            (self, next),
            (Self::Created, Self::RootPopulating)
                | (Self::RootPopulating, Self::RootReady)
                | (Self::RootReady, Self::IsolationEntered)
                | (Self::IsolationEntered, Self::ChildRunning)
                | (Self::ChildRunning, Self::Terminated)
                | (Self::Terminated | Self::Failed, Self::CleanedUp)
                | (
                    Self::Created
                        | Self::RootPopulating
                        | Self::RootReady
                        | Self::IsolationEntered
                        | Self::ChildRunning,
                    Self::Failed
                )
        )
    }

    /// Returns whether no further transition is possible.
    #[must_use]
    pub const fn is_final(self) -> bool {
        matches!(self, Self::CleanedUp)
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Created => write!(f, "created"),
            Self::RootPopulating => write!(f, "root-populating"),
            Self::RootReady => write!(f, "root-ready"),
            Self::IsolationEntered => write!(f, "isolation-entered"),
            Self::ChildRunning => write!(f, "child-running"),
            Self::Terminated => write!(f, "terminated"),
            Self::Failed => write!(f, "failed"),
            Self::CleanedUp => write!(f, "cleaned-up"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const HEX: &str = "4bcff63911fcb4448bd4fdacec207030997caf25e9bea4045fa6c8c44de311d1";

    #[test]
    fn bare_name_resolves_to_library_latest() {
        let image = ImageReference::parse("alpine").unwrap();
        assert_eq!(image.repository(), "library/alpine");
        assert_eq!(image.reference(), &Reference::Tag("latest".into()));
        assert_eq!(image.to_string(), "library/alpine:latest");
    }

    #[test]
    fn explicit_tag_and_namespace_are_kept() {
        let image = ImageReference::parse("bitnami/redis:7.2").unwrap();
        assert_eq!(image.repository(), "bitnami/redis");
        assert_eq!(image.reference().to_string(), "7.2");
    }

    #[test]
    fn digest_reference_is_parsed() {
        let image = ImageReference::parse(&format!("busybox@sha256:{HEX}")).unwrap();
        assert_eq!(image.repository(), "library/busybox");
        assert!(matches!(image.reference(), Reference::Digest(d) if d.hex() == HEX));
    }

    #[test]
    fn registry_host_is_rejected() {
        assert!(ImageReference::parse("ghcr.io/org/app:1").is_err());
        assert!(ImageReference::parse("localhost/app").is_err());
    }

    #[test]
    fn malformed_references_are_rejected() {
        for input in ["", "  ", "Alpine", "alpine:", "alpine:bad/tag", "a//b", "alpine@sha256:xyz"] {
            assert!(ImageReference::parse(input).is_err(), "{input:?} should fail");
        }
    }

    #[test]
    fn digest_parse_validates_sha256_length() {
        assert!(Digest::parse(&format!("sha256:{HEX}")).is_ok());
        assert!(Digest::parse("sha256:abc").is_err());
        assert!(Digest::parse(&format!("sha256:{}", HEX.to_uppercase())).is_err());
        assert!(Digest::parse("no-colon").is_err());
    }

    #[test]
    fn digest_roundtrips_through_serde_string() {
        let digest = Digest::sha256(HEX).unwrap();
        let value: String = digest.clone().into();
        assert_eq!(Digest::try_from(value).unwrap(), digest);
        assert_eq!(digest.short(), "4bcff63911fc");
    }

    #[test]
    fn success_path_transitions_are_legal() {
        use SessionState::*;
        let path = [Created, RootPopulating, RootReady, IsolationEntered, ChildRunning, Terminated, CleanedUp];
        for pair in path.windows(2) {
            assert!(pair[0].can_transition_to(pair[1]), "{} -> {}", pair[0], pair[1]);
        }
    }

    #[test]
    fn failed_only_leads_to_cleanup() {
        use SessionState::*;
        assert!(RootPopulating.can_transition_to(Failed));
        assert!(Failed.can_transition_to(CleanedUp));
        assert!(!Failed.can_transition_to(RootReady));
        assert!(!Terminated.can_transition_to(Failed));
        assert!(!Created.can_transition_to(ChildRunning));
        assert!(CleanedUp.is_final());
    }
}
