//! Provider versions that carry their own generated repository.

use serde::{Deserialize, Serialize};
use std::fmt;

/// A generated provider flavour.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "lowercase")]
pub enum ProviderVersion {
    Ga,
    Beta,
    Private,
}

impl ProviderVersion {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProviderVersion::Ga => "ga",
            ProviderVersion::Beta => "beta",
            ProviderVersion::Private => "private",
        }
    }

    /// Top-level source directory inside the generated repository.
    pub fn provider_dir(&self) -> &'static str {
        match self {
            ProviderVersion::Ga => "google",
            ProviderVersion::Beta => "google-beta",
            ProviderVersion::Private => "google-private",
        }
    }

    /// Prefix under the cassette bucket where this version's fixtures live.
    pub fn bucket_path(&self) -> &'static str {
        match self {
            ProviderVersion::Ga => "",
            ProviderVersion::Beta => "beta/",
            ProviderVersion::Private => "private/",
        }
    }

    pub fn repo_name(&self) -> &'static str {
        match self {
            ProviderVersion::Ga => "terraform-provider-google",
            ProviderVersion::Beta => "terraform-provider-google-beta",
            ProviderVersion::Private => "terraform-next",
        }
    }

    /// Go module path; `go list` entries under `<module>/scripts` are never tested.
    pub fn module_path(&self) -> String {
        format!("github.com/hashicorp/{}", self.repo_name())
    }
}

impl fmt::Display for ProviderVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for ProviderVersion {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "ga" => Ok(ProviderVersion::Ga),
            "beta" => Ok(ProviderVersion::Beta),
            "private" => Ok(ProviderVersion::Private),
            other => Err(format!("unknown provider version: {other}")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_beta_paths() {
        let v = ProviderVersion::Beta;
        assert_eq!(v.provider_dir(), "google-beta");
        assert_eq!(v.bucket_path(), "beta/");
        assert_eq!(
            v.module_path(),
            "github.com/hashicorp/terraform-provider-google-beta"
        );
    }

    #[test]
    fn test_parse_version() {
        assert_eq!("Beta".parse::<ProviderVersion>(), Ok(ProviderVersion::Beta));
        assert!("alpha".parse::<ProviderVersion>().is_err());
    }
}
