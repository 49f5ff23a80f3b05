//! Change-surface analysis.
//!
//! Maps the paths touched by a change onto the set of provider service
//! packages whose acceptance tests must run, or decides that nothing short of
//! a full sweep is safe.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

use crate::domain::ProviderVersion;

// ---------------------------------------------------------------------------
// Rules
// ---------------------------------------------------------------------------

/// Path rules for a single provider repository.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SurfaceRules {
    /// Directory prefixes (with trailing `/`) whose first child names a service.
    /// The first root is also used to build package directories.
    pub service_roots: Vec<String>,

    /// Generated aggregator files that touch every service but never force a sweep.
    pub ignored_files: BTreeSet<String>,
}

impl SurfaceRules {
    pub fn for_version(version: ProviderVersion) -> Self {
        let dir = version.provider_dir();
        Self {
            service_roots: vec![format!("{dir}/services/")],
            ignored_files: [
                format!("{dir}/provider/provider_mmv1_resources.go"),
                format!("{dir}/provider/provider_dcl_resources.go"),
            ]
            .into_iter()
            .collect(),
        }
    }

    /// Add another prefix that service directories may live under.
    pub fn with_service_root(mut self, root: impl Into<String>) -> Self {
        let mut root = root.into();
        if !root.ends_with('/') {
            root.push('/');
        }
        self.service_roots.push(root);
        self
    }

    /// `./<root><service>`, the argument handed to `go test`.
    pub fn package_dir(&self, service: &str) -> String {
        let root = self
            .service_roots
            .first()
            .map(String::as_str)
            .unwrap_or("services/");
        format!("./{root}{service}")
    }

    fn service_of<'a>(&self, path: &'a str) -> Option<&'a str> {
        self.service_roots.iter().find_map(|root| {
            let rest = path.strip_prefix(root.as_str())?;
            let (service, remainder) = rest.split_once('/')?;
            (!service.is_empty() && !remainder.is_empty()).then_some(service)
        })
    }
}

// ---------------------------------------------------------------------------
// Surface
// ---------------------------------------------------------------------------

/// What a change touches, from the test runner's point of view.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeSurface {
    pub affected_packages: BTreeSet<String>,
    pub run_full_sweep: bool,
}

impl ChangeSurface {
    pub fn full_sweep() -> Self {
        Self {
            affected_packages: BTreeSet::new(),
            run_full_sweep: true,
        }
    }

    pub fn packages<I, S>(services: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            affected_packages: services.into_iter().map(Into::into).collect(),
            run_full_sweep: false,
        }
    }

    /// Nothing relevant changed: no tests run and nothing is posted.
    pub fn is_empty(&self) -> bool {
        !self.run_full_sweep && self.affected_packages.is_empty()
    }
}

/// Whether a path can influence acceptance test behaviour at all.
pub fn is_test_relevant(path: &str) -> bool {
    if path.ends_with(".go")
        || path.starts_with("test-fixtures/")
        || path.contains("/test-fixtures/")
    {
        return true;
    }
    let basename = path.rsplit('/').next().unwrap_or(path);
    basename == "go.mod" || basename == "go.sum"
}

/// Compute the change surface for a list of changed paths.
///
/// Order-insensitive. The scan stops at the first relevant path that is
/// neither an ignored aggregator nor inside a service directory.
pub fn compute_surface<S: AsRef<str>>(changed_files: &[S], rules: &SurfaceRules) -> ChangeSurface {
    let mut surface = ChangeSurface::default();

    for file in changed_files {
        let path = file.as_ref().trim();
        if path.is_empty() || !is_test_relevant(path) {
            continue;
        }
        if rules.ignored_files.contains(path) {
            continue;
        }
        match rules.service_of(path) {
            Some(service) => {
                surface.affected_packages.insert(service.to_string());
            }
            None => {
                tracing::debug!(path, "change outside service packages forces a full sweep");
                return ChangeSurface::full_sweep();
            }
        }
    }

    surface
}
