//! Package policy for snippet imports and on-demand installs.
//!
//! The policy is a closed world: only names listed as `safe` (standard
//! library) or `whitelisted` (third-party) may ever be installed, and names
//! listed as `blocked` may not even be imported directly by snippet code.
//!
//! # Resolution
//!
//! ```text
//! explicit path ──▶ <config dir>/snipbox/package_config.toml ──▶ bundled default
//!        │                         │                                   │
//!        └──── first existing file wins; a file that fails to parse ───┘
//!                          falls back to the hard-coded lists
//! ```

mod engine;

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::{Arc, OnceLock};

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::paths::SnipboxDirs;

pub use engine::{InstallStatus, Installer, PolicyEngine, UninstallStatus};

/// Policy shipped with the crate.
const BUNDLED_POLICY: &str = include_str!("../../config/package_config.toml");

const FALLBACK_BLOCKED: &[&str] = &[
    "os",
    "sys",
    "subprocess",
    "shutil",
    "socket",
    "multiprocessing",
    "threading",
    "ctypes",
    "signal",
];

const FALLBACK_SAFE: &[&str] = &[
    "math",
    "json",
    "re",
    "datetime",
    "functools",
    "itertools",
    "collections",
    "random",
    "string",
    "time",
    "statistics",
];

const FALLBACK_WHITELISTED: &[&str] = &[
    "numpy",
    "pandas",
    "statsmodels",
    "scipy",
    "matplotlib",
    "seaborn",
    "plotly",
];

static PROCESS_POLICY: OnceLock<Arc<PackagePolicy>> = OnceLock::new();

/// Where a loaded policy came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PolicySource {
    /// A path given by the caller.
    Explicit,
    /// The user-level configuration directory.
    User,
    /// The default compiled into this crate.
    Bundled,
    /// Hard-coded lists, used when a policy file could not be read.
    Fallback,
}

impl fmt::Display for PolicySource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            PolicySource::Explicit => "explicit path",
            PolicySource::User => "user config",
            PolicySource::Bundled => "bundled default",
            PolicySource::Fallback => "built-in fallback",
        };
        f.write_str(name)
    }
}

/// Allow/deny lists governing imports and installs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PackagePolicy {
    /// Standard-library modules snippet code may not import.
    pub blocked: BTreeSet<String>,
    /// Standard-library modules that are always allowed.
    pub safe: BTreeSet<String>,
    /// Third-party packages that may be installed on demand.
    pub whitelisted: BTreeSet<String>,
    /// Import name → distribution name, for packages where they differ.
    pub aliases: BTreeMap<String, String>,
    /// Where this policy was loaded from.
    pub source: PolicySource,
}

/// On-disk layout of a policy file.
#[derive(Debug, Deserialize)]
struct PolicyFile {
    stdlib: StdlibSection,
    third_party: ThirdPartySection,
}

#[derive(Debug, Deserialize)]
struct StdlibSection {
    blocked: Vec<String>,
    safe: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct ThirdPartySection {
    whitelisted: Vec<String>,
    #[serde(default)]
    aliases: BTreeMap<String, String>,
}

impl PackagePolicy {
    /// Parse a policy from TOML text.
    pub fn from_toml_str(text: &str, source: PolicySource) -> Result<Self> {
        let file: PolicyFile =
            toml::from_str(text).map_err(|e| Error::Config(format!("invalid policy: {}", e)))?;

        Ok(Self {
            blocked: file.stdlib.blocked.into_iter().collect(),
            safe: file.stdlib.safe.into_iter().collect(),
            whitelisted: file.third_party.whitelisted.into_iter().collect(),
            aliases: file.third_party.aliases,
            source,
        })
    }

    /// Read and parse a policy file.
    pub fn load_from(path: &Path, source: PolicySource) -> Result<Self> {
        let text = std::fs::read_to_string(path).map_err(|e| {
            Error::Config(format!("Failed to read {}: {}", path.display(), e))
        })?;
        Self::from_toml_str(&text, source)
            .map_err(|e| Error::Config(format!("{}: {}", path.display(), e)))
    }

    /// The policy compiled into this crate.
    pub fn bundled() -> Self {
        Self::from_toml_str(BUNDLED_POLICY, PolicySource::Bundled).unwrap_or_else(|e| {
            tracing::warn!("Bundled policy is unreadable ({}), using fallback", e);
            Self::fallback()
        })
    }

    /// Hard-coded lists used when no policy file can be read.
    pub fn fallback() -> Self {
        let set = |names: &[&str]| names.iter().map(|name| name.to_string()).collect();
        Self {
            blocked: set(FALLBACK_BLOCKED),
            safe: set(FALLBACK_SAFE),
            whitelisted: set(FALLBACK_WHITELISTED),
            aliases: BTreeMap::new(),
            source: PolicySource::Fallback,
        }
    }

    /// Resolve the layered policy without touching the process cache.
    pub fn resolve(explicit: Option<&Path>) -> Self {
        Self::resolve_with(explicit, user_policy_path().as_deref())
    }

    /// Layered resolution with an injectable user-level file location.
    pub fn resolve_with(explicit: Option<&Path>, user_file: Option<&Path>) -> Self {
        let candidates = [
            (explicit, PolicySource::Explicit),
            (user_file, PolicySource::User),
        ];

        for (path, source) in candidates {
            let Some(path) = path else { continue };
            if !path.exists() {
                if source == PolicySource::Explicit {
                    tracing::warn!("Policy file {} does not exist, skipping", path.display());
                }
                continue;
            }

            return match Self::load_from(path, source) {
                Ok(policy) => {
                    tracing::info!("Loaded package policy from {} ({})", path.display(), source);
                    policy
                }
                Err(e) => {
                    tracing::warn!("{}. Using built-in fallback policy", e);
                    Self::fallback()
                }
            };
        }

        tracing::debug!("Using bundled package policy");
        Self::bundled()
    }

    /// True if snippet code may not import `name` directly.
    pub fn is_blocked(&self, name: &str) -> bool {
        self.blocked.contains(name)
    }

    /// True if `name` may be installed on demand.
    ///
    /// Blocked always wins; unknown names are never allowed.
    pub fn is_whitelisted(&self, name: &str) -> bool {
        if self.is_blocked(name) {
            return false;
        }
        self.safe.contains(name) || self.whitelisted.contains(name)
    }

    /// Distribution name the installer should be given for an import name.
    pub fn distribution_name<'a>(&'a self, name: &'a str) -> &'a str {
        self.aliases.get(name).map(String::as_str).unwrap_or(name)
    }

    /// Every name that may be auto-installed, sorted.
    pub fn installable(&self) -> Vec<&str> {
        self.safe
            .iter()
            .chain(self.whitelisted.iter())
            .filter(|name| !self.is_blocked(name))
            .map(String::as_str)
            .collect()
    }
}

/// Load the process-wide policy.
///
/// Resolved once; later calls return the cached policy and ignore `explicit`.
pub fn load_policy(explicit: Option<&Path>) -> Arc<PackagePolicy> {
    PROCESS_POLICY
        .get_or_init(|| Arc::new(PackagePolicy::resolve(explicit)))
        .clone()
}

/// Default location of the user-level policy file, if the platform has one.
pub fn user_policy_path() -> Option<PathBuf> {
    SnipboxDirs::user().map(|dirs| dirs.policy_file())
}
