//! ---
//! upd_section: "01-core-runtime"
//! upd_subsection: "module"
//! upd_type: "source"
//! upd_scope: "code"
//! upd_description: "Shared primitives for the updater daemons."
//! upd_version: "v0.1.0"
//! upd_owner: "tbd"
//! ---
/// Build metadata baked in by `vergen` at compile time.
///
/// Everything here is static; the daemons only ever read it for their
/// `-V` output and for the startup log line.
#[derive(Debug, Clone, Copy)]
pub struct VersionInfo {
    /// Workspace semantic version.
    pub semver: &'static str,
    /// Git commit hash captured at build time, `unknown` outside a checkout.
    pub git_sha: &'static str,
    /// Build timestamp from the compilation environment.
    pub build_timestamp: &'static str,
    /// Target triple used for the build.
    pub target: &'static str,
}

impl VersionInfo {
    #[must_use]
    pub fn current() -> Self {
        Self {
            semver: env!("CARGO_PKG_VERSION"),
            git_sha: option_env!("VERGEN_GIT_SHA").unwrap_or("unknown"),
            build_timestamp: option_env!("VERGEN_BUILD_TIMESTAMP").unwrap_or("unknown"),
            target: option_env!("VERGEN_CARGO_TARGET_TRIPLE").unwrap_or("unknown"),
        }
    }

    /// Short `version (sha)` form for log fields.
    #[must_use]
    pub fn cli_string(&self) -> String {
        format!("{} ({})", self.semver, self.git_sha)
    }

    /// Multi-line form printed by the daemons' `-V` flag.
    #[must_use]
    pub fn extended(&self) -> String {
        format!(
            "outpost v{} (git {})\nbuilt {} for {}",
            self.semver, self.git_sha, self.build_timestamp, self.target
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extended_contains_semver_and_sha() {
        let info = VersionInfo::current();
        let extended = info.extended();
        assert!(extended.contains(info.semver));
        assert!(extended.contains(info.git_sha));
    }

    #[test]
    fn cli_string_is_single_line() {
        assert!(!VersionInfo::current().cli_string().contains('\n'));
    }
}
