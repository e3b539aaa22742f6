//! Host path access expansion.
//!
//! Turns a declarative [`AccessNode`] tree into concrete bind rules. Every
//! pattern is globbed against the host filesystem below the path its parent
//! matched; leaves bind each match to the same location inside the sandbox.

use crate::directive::Directive;
use crate::error::SandboxError;
use crate::Result;
use bubblebox_core::{AccessLevel, AccessNode, PatternKey, SessionEnv};
use glob::{MatchOptions, Pattern};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// A concrete host path exposed inside the sandbox.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Binding {
    /// How the path is mounted.
    pub level: AccessLevel,

    /// Path on the host.
    pub source: PathBuf,

    /// Path inside the sandbox.
    pub dest: PathBuf,
}

impl Binding {
    /// Bind `path` to itself.
    pub fn identity(level: AccessLevel, path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        Self {
            level,
            source: path.clone(),
            dest: path,
        }
    }

    /// The three executor tokens for this binding.
    pub fn to_flags(&self) -> Result<[String; 3]> {
        Ok([
            self.level.bind_flag().to_string(),
            path_arg(&self.source)?,
            path_arg(&self.dest)?,
        ])
    }
}

/// Convert a path into an executor argument.
pub fn path_arg(path: &Path) -> Result<String> {
    path.to_str()
        .map(str::to_string)
        .ok_or_else(|| SandboxError::NonUtf8Path(path.to_path_buf()))
}

/// Expands access policies against the host filesystem.
#[derive(Debug, Clone)]
pub struct AccessExpander {
    sort_matches: bool,
}

impl Default for AccessExpander {
    fn default() -> Self {
        Self { sort_matches: true }
    }
}

impl AccessExpander {
    /// Create an expander that sorts the matches of every glob.
    pub fn new() -> Self {
        Self::default()
    }

    /// Choose whether matches of one glob are sorted or left in listing order.
    pub fn with_sorted_matches(mut self, sort: bool) -> Self {
        self.sort_matches = sort;
        self
    }

    /// Expand `policy` rooted at `root`.
    ///
    /// The whole tree is checked for traversal segments before the first glob
    /// runs, and any pattern that matches nothing fails the expansion.
    pub fn expand(&self, root: &Path, policy: &AccessNode) -> Result<Vec<Binding>> {
        policy.validate()?;

        let mut bindings = Vec::new();
        self.descend(root, policy, &mut bindings)?;
        Ok(bindings)
    }

    /// Expand `policy` rooted at the invoking user's home directory.
    pub fn expand_home(&self, env: &SessionEnv, policy: &AccessNode) -> Result<Vec<Binding>> {
        self.expand(&env.home, policy)
    }

    /// Expand `policy` rooted at the session runtime directory.
    pub fn expand_runtime(&self, env: &SessionEnv, policy: &AccessNode) -> Result<Vec<Binding>> {
        self.expand(&env.runtime_dir, policy)
    }

    /// Expand `policy` and turn the result into a flags directive.
    pub fn directive(&self, root: &Path, policy: &AccessNode) -> Result<Directive> {
        host_access(&self.expand(root, policy)?)
    }

    /// Like [`directive`](Self::directive) for a flat list of patterns, but
    /// patterns matching nothing are dropped instead of failing.
    pub fn optional_directive<I, S>(
        &self,
        root: &Path,
        level: AccessLevel,
        patterns: I,
    ) -> Result<Directive>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut present = Vec::new();
        for pattern in patterns {
            let pattern = pattern.into();
            PatternKey::one(pattern.as_str()).validate()?;
            if self.glob_alternative(root, &pattern)?.is_empty() {
                debug!("Skipping optional pattern {} below {}", pattern, root.display());
            } else {
                present.push(pattern);
            }
        }
        self.directive(root, &AccessNode::uniform(level, present))
    }

    fn descend(&self, root: &Path, node: &AccessNode, out: &mut Vec<Binding>) -> Result<()> {
        match node {
            AccessNode::Leaf(level) => {
                let binding = Binding::identity(*level, root);
                debug!("{} {}", binding.level, binding.source.display());
                out.push(binding);
            }
            AccessNode::Branch(entries) => {
                for (key, child) in entries {
                    for alternative in key.alternatives() {
                        let matches = self.glob_alternative(root, alternative)?;
                        if matches.is_empty() {
                            return Err(SandboxError::NoMatches(join_pattern(root, alternative)?));
                        }
                        for matched in matches {
                            self.descend(&matched, child, out)?;
                        }
                    }
                }
            }
        }
        Ok(())
    }

    /// Glob one alternative below `root`. A trailing `/` keeps directories only.
    fn glob_alternative(&self, root: &Path, alternative: &str) -> Result<Vec<PathBuf>> {
        let mut matches = self.glob(&join_pattern(root, alternative)?)?;
        if alternative.ends_with('/') {
            matches.retain(|path| path.is_dir());
        }
        Ok(matches)
    }

    fn glob(&self, pattern: &str) -> Result<Vec<PathBuf>> {
        let options = MatchOptions {
            case_sensitive: true,
            require_literal_separator: true,
            require_literal_leading_dot: true,
        };
        let paths = glob::glob_with(pattern, options).map_err(|source| {
            SandboxError::InvalidPattern {
                pattern: pattern.to_string(),
                source,
            }
        })?;

        let mut matches = Vec::new();
        for entry in paths {
            match entry {
                Ok(path) => matches.push(path),
                Err(e) => warn!("Skipping unreadable path {}: {}", e.path().display(), e.error()),
            }
        }
        if self.sort_matches {
            matches.sort();
        }
        Ok(matches)
    }
}

/// Join a literal root and a relative glob pattern.
///
/// The root is escaped so only `pattern` carries glob syntax; repeated
/// separators collapse and a trailing `/.` or `/` is dropped.
fn join_pattern(root: &Path, pattern: &str) -> Result<String> {
    let root = path_arg(root)?;
    let joined = format!("{}/{}", Pattern::escape(&root), pattern);

    let mut collapsed = String::with_capacity(joined.len());
    for c in joined.chars() {
        if c == '/' && collapsed.ends_with('/') {
            continue;
        }
        collapsed.push(c);
    }
    loop {
        if let Some(stripped) = collapsed.strip_suffix("/.") {
            collapsed = stripped.to_string();
        } else if collapsed.len() > 1 && collapsed.ends_with('/') {
            collapsed.pop();
        } else {
            break;
        }
    }
    if collapsed.is_empty() {
        collapsed.push('/');
    }
    Ok(collapsed)
}

/// Executor flags binding each of `bindings`.
pub fn host_access(bindings: &[Binding]) -> Result<Directive> {
    let mut tokens = Vec::with_capacity(bindings.len() * 3);
    for binding in bindings {
        tokens.extend(binding.to_flags()?);
    }
    Ok(Directive::Flags(tokens))
}

fn literal_access<I, P>(level: AccessLevel, paths: I) -> Result<Directive>
where
    I: IntoIterator<Item = P>,
    P: AsRef<Path>,
{
    let bindings: Vec<Binding> = paths
        .into_iter()
        .map(|p| Binding::identity(level, p.as_ref()))
        .collect();
    host_access(&bindings)
}

/// Read-only binds of literal paths, without globbing.
pub fn ro_host_access<I, P>(paths: I) -> Result<Directive>
where
    I: IntoIterator<Item = P>,
    P: AsRef<Path>,
{
    literal_access(AccessLevel::Read, paths)
}

/// Read-write binds of literal paths, without globbing.
pub fn rw_host_access<I, P>(paths: I) -> Result<Directive>
where
    I: IntoIterator<Item = P>,
    P: AsRef<Path>,
{
    literal_access(AccessLevel::Write, paths)
}

/// Device binds of literal paths, without globbing.
pub fn dev_host_access<I, P>(paths: I) -> Result<Directive>
where
    I: IntoIterator<Item = P>,
    P: AsRef<Path>,
{
    literal_access(AccessLevel::Device, paths)
}
