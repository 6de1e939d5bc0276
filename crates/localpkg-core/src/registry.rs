//! Package registry.
//!
//! Holds every discovered package keyed by manifest location. A build pass
//! drives it through a fixed handshake:
//!
//! 1. [`begin_discovery`](PackageRegistry::begin_discovery)
//! 2. [`register`](PackageRegistry::register) once per manifest
//! 3. [`complete_discovery`](PackageRegistry::complete_discovery): pending
//!    subscribers receive every eligible package
//! 4. consumers read the registry (partitioning, import maps)
//! 5. [`before_save`](PackageRegistry::before_save): subscriptions are dropped
//!
//! Registration is refused between steps 3 and 5 so consumers never observe a
//! half-populated table.

use crate::manifest::Package;
use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, warn};

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RegistryError {
    #[error("cannot register {location} after discovery for this pass completed")]
    DiscoveryClosed { location: PathBuf },
}

impl RegistryError {
    #[must_use]
    pub fn code(&self) -> &'static str {
        match self {
            Self::DiscoveryClosed { .. } => crate::codes::REGISTRY_DISCOVERY_CLOSED,
        }
    }
}

/// Which named packages a consumer wants to see.
#[derive(Debug, Clone, Default)]
pub struct EligibilityPolicy {
    /// Include packages with `"private": true`.
    pub include_private: bool,
    /// Package-name globs to leave out (e.g. to keep using a CDN copy).
    pub exclude: Vec<glob::Pattern>,
}

impl EligibilityPolicy {
    /// Build a policy from raw exclude globs; invalid globs are logged and ignored.
    #[must_use]
    pub fn new(include_private: bool, exclude: &[String]) -> Self {
        let exclude = exclude
            .iter()
            .filter_map(|raw| match glob::Pattern::new(raw) {
                Ok(p) => Some(p),
                Err(e) => {
                    warn!(pattern = %raw, error = %e, "Ignoring invalid package exclude pattern");
                    None
                }
            })
            .collect();
        Self {
            include_private,
            exclude,
        }
    }

    /// Check whether a package takes part in bundling under this policy.
    #[must_use]
    pub fn admits(&self, package: &Package) -> bool {
        let Some(name) = package.name.as_deref() else {
            return false;
        };
        if package.private && !self.include_private {
            return false;
        }
        !self.exclude.iter().any(|p| p.matches(name))
    }
}

/// A registered package plus the change stamp of the manifest it came from.
#[derive(Debug, Clone)]
pub struct RegisteredPackage {
    pub package: Package,
    pub fingerprint: Option<String>,
}

/// Where the registry is in the per-pass handshake.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Phase {
    #[default]
    Idle,
    Discovering,
    Discovered,
}

type Visitor = Box<dyn FnMut(&Package) + Send>;

struct Subscription {
    policy: EligibilityPolicy,
    visitor: Visitor,
    delivered: bool,
}

/// Table of discovered packages, keyed by manifest path.
#[derive(Default)]
pub struct PackageRegistry {
    packages: BTreeMap<PathBuf, RegisteredPackage>,
    subscriptions: Vec<Subscription>,
    phase: Phase,
}

impl std::fmt::Debug for PackageRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PackageRegistry")
            .field("packages", &self.packages.keys().collect::<Vec<_>>())
            .field("subscriptions", &self.subscriptions.len())
            .field("phase", &self.phase)
            .finish()
    }
}

impl PackageRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn phase(&self) -> Phase {
        self.phase
    }

    /// Open discovery for a new pass.
    pub fn begin_discovery(&mut self) {
        if !self.subscriptions.is_empty() && self.phase == Phase::Discovered {
            warn!(
                count = self.subscriptions.len(),
                "Previous pass never reached before_save; dropping its subscriptions"
            );
            self.subscriptions.clear();
        }
        self.phase = Phase::Discovering;
    }

    /// Insert or replace the package for a manifest location.
    pub fn register(
        &mut self,
        location: impl Into<PathBuf>,
        package: Package,
        fingerprint: Option<String>,
    ) -> Result<(), RegistryError> {
        let location = location.into();
        self.ensure_open(&location)?;
        debug!(manifest = %location.display(), name = ?package.name, "Registering package");
        self.packages.insert(
            location,
            RegisteredPackage {
                package,
                fingerprint,
            },
        );
        Ok(())
    }

    /// Forget a manifest that was removed from the source tree.
    pub fn remove(&mut self, location: &Path) -> Result<Option<Package>, RegistryError> {
        self.ensure_open(location)?;
        Ok(self.packages.remove(location).map(|r| r.package))
    }

    /// Drop every manifest not in `keep`, returning the removed locations.
    pub fn retain_locations(&mut self, keep: &BTreeSet<PathBuf>) -> Result<Vec<PathBuf>, RegistryError> {
        let stale: Vec<PathBuf> = self
            .packages
            .keys()
            .filter(|k| !keep.contains(*k))
            .cloned()
            .collect();
        for location in &stale {
            self.remove(location)?;
            debug!(manifest = %location.display(), "Manifest removed; dropping package");
        }
        Ok(stale)
    }

    /// Close discovery and deliver every pending subscription.
    pub fn complete_discovery(&mut self) {
        self.phase = Phase::Discovered;
        self.deliver_pending();
    }

    /// Pass-boundary event: drop all subscriptions and return to idle.
    pub fn before_save(&mut self) {
        self.subscriptions.clear();
        self.phase = Phase::Idle;
    }

    /// Ask to be handed every eligible package of the current pass, once.
    ///
    /// Delivered immediately if discovery has completed, otherwise at
    /// [`complete_discovery`](Self::complete_discovery).
    pub fn subscribe<F>(&mut self, policy: EligibilityPolicy, visitor: F)
    where
        F: FnMut(&Package) + Send + 'static,
    {
        self.subscriptions.push(Subscription {
            policy,
            visitor: Box::new(visitor),
            delivered: false,
        });
        if self.phase == Phase::Discovered {
            self.deliver_pending();
        }
    }

    /// Visit every eligible package in manifest-location order.
    pub fn for_each_eligible<'a, F>(&'a self, policy: &EligibilityPolicy, mut visitor: F)
    where
        F: FnMut(&'a Path, &'a Package),
    {
        for (location, entry) in &self.packages {
            if policy.admits(&entry.package) {
                visitor(location, &entry.package);
            }
        }
    }

    /// Eligible packages in manifest-location order.
    #[must_use]
    pub fn eligible(&self, policy: &EligibilityPolicy) -> Vec<&Package> {
        let mut out = Vec::new();
        self.for_each_eligible(policy, |_, p| out.push(p));
        out
    }

    #[must_use]
    pub fn get(&self, location: &Path) -> Option<&Package> {
        self.packages.get(location).map(|r| &r.package)
    }

    /// Change stamp recorded for a manifest location.
    #[must_use]
    pub fn fingerprint(&self, location: &Path) -> Option<&str> {
        self.packages
            .get(location)
            .and_then(|r| r.fingerprint.as_deref())
    }

    /// All registered packages, eligible or not.
    pub fn iter(&self) -> impl Iterator<Item = (&Path, &Package)> {
        self.packages.iter().map(|(k, v)| (k.as_path(), &v.package))
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.packages.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.packages.is_empty()
    }

    fn ensure_open(&mut self, location: &Path) -> Result<(), RegistryError> {
        match self.phase {
            Phase::Discovered => Err(RegistryError::DiscoveryClosed {
                location: location.to_path_buf(),
            }),
            Phase::Idle => {
                self.phase = Phase::Discovering;
                Ok(())
            }
            Phase::Discovering => Ok(()),
        }
    }

    fn deliver_pending(&mut self) {
        for sub in self.subscriptions.iter_mut().filter(|s| !s.delivered) {
            for entry in self.packages.values() {
                if sub.policy.admits(&entry.package) {
                    (sub.visitor)(&entry.package);
                }
            }
            sub.delivered = true;
        }
    }
}
