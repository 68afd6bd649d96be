//! Host metadata attached to each job.

use serde::{Deserialize, Serialize};
use std::path::Path;

const RHEL_RELEASE: &str = "/etc/redhat-release";

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct EnvironmentInfo {
    /// `<os>-<arch>`, e.g. `linux-x86_64`.
    pub platform: String,
    pub hostname: String,
    pub is_openshift: bool,
    pub is_kubernetes: bool,
    pub is_rhel: bool,
}

impl EnvironmentInfo {
    /// Inspect the current process environment.
    pub fn detect() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok(), Path::new(RHEL_RELEASE).exists())
    }

    fn from_lookup(var: impl Fn(&str) -> Option<String>, rhel_release: bool) -> Self {
        let set = |key: &str| var(key).is_some_and(|v| !v.is_empty());

        Self {
            platform: format!("{}-{}", std::env::consts::OS, std::env::consts::ARCH),
            hostname: var("HOSTNAME").unwrap_or_else(|| "unknown".to_string()),
            is_openshift: set("OPENSHIFT_BUILD_NAME") || set("OPENSHIFT_BUILD_NAMESPACE"),
            is_kubernetes: set("KUBERNETES_SERVICE_HOST"),
            is_rhel: rhel_release,
        }
    }
}
