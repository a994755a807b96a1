//! Image profile registry.
//!
//! Profiles map a short name to a pre-built image tag, a bundled
//! Dockerfile for `pocketdock build`, and a networking default.

use pocketdock_error::{Error, Result};

/// Metadata for a built-in image profile.
#[derive(Debug, Clone, Copy)]
pub struct ProfileInfo {
    /// Profile name.
    pub name: &'static str,
    /// Image tag the profile resolves to.
    pub image_tag: &'static str,
    /// Whether containers from this profile get networking.
    pub network_default: bool,
    /// Short human description.
    pub description: &'static str,
    /// Rough image size.
    pub size_estimate: &'static str,
    /// Dockerfile used by `pocketdock build`.
    pub dockerfile: &'static str,
}

/// All built-in profiles.
pub const PROFILES: &[ProfileInfo] = &[
    ProfileInfo {
        name: "minimal",
        image_tag: "pocketdock/minimal",
        network_default: false,
        description: "Lightest sandbox: Python 3, bash, busybox",
        size_estimate: "~25MB",
        dockerfile: include_str!("../profiles/minimal.Dockerfile"),
    },
    ProfileInfo {
        name: "minimal-node",
        image_tag: "pocketdock/minimal-node",
        network_default: false,
        description: "Node.js sandbox: Node 22, npm, bash",
        size_estimate: "~60MB",
        dockerfile: include_str!("../profiles/minimal-node.Dockerfile"),
    },
    ProfileInfo {
        name: "minimal-bun",
        image_tag: "pocketdock/minimal-bun",
        network_default: false,
        description: "Bun sandbox: Bun runtime, bash",
        size_estimate: "~100MB",
        dockerfile: include_str!("../profiles/minimal-bun.Dockerfile"),
    },
    ProfileInfo {
        name: "dev",
        image_tag: "pocketdock/dev",
        network_default: true,
        description: "Interactive dev sandbox: git, curl, vim, build tools",
        size_estimate: "~250MB",
        dockerfile: include_str!("../profiles/dev.Dockerfile"),
    },
    ProfileInfo {
        name: "agent",
        image_tag: "pocketdock/agent",
        network_default: false,
        description: "Agent sandbox: requests, pandas, numpy, beautifulsoup4",
        size_estimate: "~350MB",
        dockerfile: include_str!("../profiles/agent.Dockerfile"),
    },
    ProfileInfo {
        name: "embedded",
        image_tag: "pocketdock/embedded",
        network_default: true,
        description: "C/C++ toolchain: GCC, CMake, ARM cross-compiler",
        size_estimate: "~450MB",
        dockerfile: include_str!("../profiles/embedded.Dockerfile"),
    },
];

/// Looks up a profile by name.
///
/// # Errors
///
/// Returns `InvalidInput` naming the known profiles for unknown names.
pub fn resolve_profile(name: &str) -> Result<&'static ProfileInfo> {
    PROFILES.iter().find(|p| p.name == name).ok_or_else(|| {
        let known: Vec<&str> = PROFILES.iter().map(|p| p.name).collect();
        Error::invalid_input(format!(
            "unknown profile {name:?}. Known profiles: {}",
            known.join(", ")
        ))
    })
}

/// Returns all built-in profiles.
#[must_use]
pub fn list_profiles() -> &'static [ProfileInfo] {
    PROFILES
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_known_profile() {
        let profile = resolve_profile("minimal").unwrap();
        assert_eq!(profile.image_tag, "pocketdock/minimal");
        assert!(!profile.network_default);
        assert!(profile.dockerfile.contains("FROM"));
    }

    #[test]
    fn test_resolve_unknown_profile_names_known_ones() {
        let err = resolve_profile("nope").unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("nope"));
        assert!(msg.contains("minimal"));
        assert!(msg.contains("dev"));
    }

    #[test]
    fn test_profile_names_unique() {
        let mut names: Vec<&str> = PROFILES.iter().map(|p| p.name).collect();
        names.sort_unstable();
        names.dedup();
        assert_eq!(names.len(), PROFILES.len());
    }
}
