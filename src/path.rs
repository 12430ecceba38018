// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Path resolution utilities.
//!
//! Determine relevent path information for every file that gitid reads,
//! generates, or removes. All of it hangs off of a [`Layout`], so the whole
//! tool can be pointed at a scratch directory instead of the user's real
//! home directory.

use std::{
    env::VarError,
    path::{Path, PathBuf},
};

/// Determine absolute path to user's home directory.
///
/// Does not check if the path returned actually exists.
///
/// # Errors
///
/// - Return [`PathError::NoWayHome`] if home directory path cannot be
///   determined.
pub fn home_dir() -> Result<PathBuf> {
    dirs::home_dir().ok_or(PathError::NoWayHome)
}

/// Determine default absolute path to user's configuration directory.
///
/// Uses XDG Base Directory path `$XDG_CONFIG_HOME` on Linux, and the platform
/// equivalent elsewhere. Does not check if the path returned actually exists.
///
/// # Errors
///
/// - Return [`PathError::NoWayHome`] if configuration directory path cannot
///   be determined.
///
/// # See Also
///
/// - [XDG Base Directory](https://wiki.archlinux.org/title/XDG_Base_Directory)
pub fn default_config_dir() -> Result<PathBuf> {
    dirs::config_dir().ok_or(PathError::NoWayHome)
}

/// Locations of every file gitid touches.
///
/// Paths of managed artifacts are pure functions of an identity's name, so
/// nothing here is ever stored.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Layout {
    home: PathBuf,
    config_dir: PathBuf,
}

impl Layout {
    /// Construct new layout rooted at `home` and `config_dir`.
    pub fn new(home: impl Into<PathBuf>, config_dir: impl Into<PathBuf>) -> Self {
        Self {
            home: home.into(),
            config_dir: config_dir.into(),
        }
    }

    /// Construct layout for the current user.
    ///
    /// # Errors
    ///
    /// - Return [`PathError::NoWayHome`] if home or configuration directory
    ///   cannot be determined.
    pub fn try_default() -> Result<Self> {
        Ok(Self::new(home_dir()?, default_config_dir()?))
    }

    pub fn home(&self) -> &Path {
        &self.home
    }

    pub fn ssh_dir(&self) -> PathBuf {
        self.home.join(".ssh")
    }

    /// Identity store file, i.e., `~/.git-identities.json`.
    pub fn store_file(&self) -> PathBuf {
        self.home.join(".git-identities.json")
    }

    /// Directory holding gitid's own bookkeeping.
    pub fn tool_dir(&self) -> PathBuf {
        self.config_dir.join("gitid")
    }

    pub fn state_file(&self) -> PathBuf {
        self.tool_dir().join("state.json")
    }

    pub fn backup_dir(&self) -> PathBuf {
        self.tool_dir().join("backups")
    }

    pub fn private_key(&self, name: &str) -> PathBuf {
        self.ssh_dir().join(format!("{name}_key"))
    }

    pub fn public_key(&self, name: &str) -> PathBuf {
        self.ssh_dir().join(format!("{name}_key.pub"))
    }

    /// Convenience copy of public key placed at top-level of home directory.
    pub fn public_key_copy(&self, name: &str) -> PathBuf {
        self.home.join(format!("{name}_key.pub"))
    }

    pub fn identity_git_config(&self, name: &str) -> PathBuf {
        self.home.join(format!(".gitconfig-{name}"))
    }

    pub fn global_git_config(&self) -> PathBuf {
        self.home.join(".gitconfig")
    }

    pub fn ssh_config(&self) -> PathBuf {
        self.ssh_dir().join("config")
    }

    pub fn allowed_signers(&self) -> PathBuf {
        self.ssh_dir().join("allowed_signers")
    }

    /// Service folder of an identity, e.g., `~/Work` for identity "work".
    pub fn service_folder(&self, name: &str) -> PathBuf {
        let mut chars = name.chars();
        let capitalized = match chars.next() {
            Some(first) => first.to_uppercase().chain(chars).collect::<String>(),
            None => String::new(),
        };

        self.home.join(capitalized)
    }

    /// Expand folder pattern into absolute path.
    ///
    /// Performs shell expansion where `~` always refers to the layout's home
    /// directory, and `$VAR` refers to the process environment. Relative
    /// results are resolved against the home directory.
    ///
    /// # Errors
    ///
    /// - Return [`PathError::Expand`] if an environment variable in the
    ///   pattern cannot be resolved.
    pub fn expand(&self, pattern: &str) -> Result<PathBuf> {
        let expanded = shellexpand::full_with_context(
            pattern,
            || Some(self.home.to_string_lossy()),
            |var: &str| std::env::var(var).map(Some),
        )
        .map_err(|source| PathError::Expand {
            source,
            pattern: pattern.to_string(),
        })?;

        let path = PathBuf::from(expanded.into_owned());
        if path.is_relative() {
            return Ok(self.home.join(path));
        }

        Ok(path)
    }

    /// Render path relative to home directory with `~` prefix for display.
    pub fn tildify(&self, path: impl AsRef<Path>) -> String {
        match path.as_ref().strip_prefix(&self.home) {
            Ok(rest) if rest.as_os_str().is_empty() => "~".into(),
            Ok(rest) => format!("~/{}", rest.display()),
            Err(_) => path.as_ref().display().to_string(),
        }
    }
}

/// Path resolution error types.
#[derive(Debug, thiserror::Error)]
pub enum PathError {
    /// No way to determine user's home directory.
    ///
    /// # See Also
    ///
    /// - [`dirs::home_dir`](https://docs.rs/dirs/latest/dirs/fn.home_dir.html)
    #[error("cannot determine absolute path to user's home directory")]
    NoWayHome,

    /// Folder pattern references something that cannot be expanded.
    #[error("failed to expand folder pattern {pattern:?}")]
    Expand {
        #[source]
        source: shellexpand::LookupError<VarError>,
        pattern: String,
    },
}

/// Friendly result alias :3
pub type Result<T, E = PathError> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use sealed_test::prelude::*;

    fn layout() -> Layout {
        Layout::new("/home/blah", "/home/blah/.config")
    }

    #[test]
    fn managed_paths_derive_from_name() {
        let layout = layout();
        assert_eq!(layout.private_key("work"), PathBuf::from("/home/blah/.ssh/work_key"));
        assert_eq!(layout.public_key("work"), PathBuf::from("/home/blah/.ssh/work_key.pub"));
        assert_eq!(layout.public_key_copy("work"), PathBuf::from("/home/blah/work_key.pub"));
        assert_eq!(
            layout.identity_git_config("work"),
            PathBuf::from("/home/blah/.gitconfig-work")
        );
        assert_eq!(
            layout.state_file(),
            PathBuf::from("/home/blah/.config/gitid/state.json")
        );
        assert_eq!(layout.service_folder("work"), PathBuf::from("/home/blah/Work"));
    }

    #[test]
    fn expand_tilde_against_layout_home() -> anyhow::Result<()> {
        let layout = layout();
        assert_eq!(layout.expand("~/Work/Github")?, PathBuf::from("/home/blah/Work/Github"));
        assert_eq!(layout.expand("/srv/code")?, PathBuf::from("/srv/code"));
        assert_eq!(layout.expand("Code")?, PathBuf::from("/home/blah/Code"));
        Ok(())
    }

    #[sealed_test(env = [("WORKSPACE", "/srv/workspace")])]
    fn expand_environment_variables() -> anyhow::Result<()> {
        let layout = layout();
        assert_eq!(layout.expand("$WORKSPACE/oss")?, PathBuf::from("/srv/workspace/oss"));
        Ok(())
    }

    #[sealed_test]
    fn expand_unknown_variable_fails() {
        std::env::remove_var("GITID_SURELY_UNSET");
        let result = layout().expand("$GITID_SURELY_UNSET/oss");
        assert!(matches!(result, Err(PathError::Expand { .. })));
    }

    #[test]
    fn tildify_home_relative_paths() {
        let layout = layout();
        assert_eq!(layout.tildify("/home/blah/.ssh/work_key"), "~/.ssh/work_key");
        assert_eq!(layout.tildify("/home/blah"), "~");
        assert_eq!(layout.tildify("/etc/ssh"), "/etc/ssh");
    }
}
