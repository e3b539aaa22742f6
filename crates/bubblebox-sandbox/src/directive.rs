//! Composable launch directives and the per-launch accumulator.
//!
//! A [`Directive`] tree is pure data describing one sandbox flavour. It can be
//! built once and traversed for any number of launches; every traversal feeds
//! a fresh [`Invocation`], which is the only thing that ever changes.

use crate::proxy::{ProxyHandle, ProxyLauncher};
use crate::Result;
use tracing::debug;

/// One unit of launch policy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Directive {
    /// Tokens appended verbatim to the sandbox executor arguments.
    Flags(Vec<String>),

    /// Children visited in order, as if spliced in place.
    Group(Vec<Directive>),

    /// Allow-list rules for the bus filtering proxy.
    ProxyFlags(Vec<String>),
}

impl Directive {
    /// Executor flags.
    pub fn flags<I, S>(tokens: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::Flags(tokens.into_iter().map(Into::into).collect())
    }

    /// A group of directives.
    pub fn group<I>(children: I) -> Self
    where
        I: IntoIterator<Item = Directive>,
    {
        Self::Group(children.into_iter().collect())
    }

    /// Bus proxy allow-list rules.
    pub fn proxy_flags<I, S>(tokens: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::ProxyFlags(tokens.into_iter().map(Into::into).collect())
    }

    /// A directive that contributes nothing.
    pub fn empty() -> Self {
        Self::Group(Vec::new())
    }
}

impl Default for Directive {
    fn default() -> Self {
        Self::empty()
    }
}

/// Work deferred until the whole tree has been traversed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Finalizer {
    /// Start the bus proxy with the collected allow-list.
    BusProxy,
}

/// Mutable state of a single launch.
#[derive(Debug, Default)]
pub struct Invocation {
    args: Vec<String>,
    proxy_flags: Option<Vec<String>>,
    finalizers: Vec<Finalizer>,
}

/// Result of running the finalizers.
#[derive(Debug)]
pub struct Finalized {
    /// Complete executor argument list, without the executor itself.
    pub args: Vec<String>,

    /// The running proxy, which must outlive the executor exec.
    pub proxy: Option<ProxyHandle>,
}

impl Invocation {
    /// Create an empty accumulator.
    pub fn new() -> Self {
        Self::default()
    }

    /// Visit `directive` depth-first, left to right.
    pub fn traverse(&mut self, directive: &Directive) {
        match directive {
            Directive::Flags(tokens) => self.args.extend(tokens.iter().cloned()),
            Directive::Group(children) => {
                for child in children {
                    self.traverse(child);
                }
            }
            Directive::ProxyFlags(tokens) => {
                // The first proxy directive registers the one and only finalizer.
                if self.proxy_flags.is_none() {
                    self.finalizers.push(Finalizer::BusProxy);
                }
                self.proxy_flags
                    .get_or_insert_with(Vec::new)
                    .extend(tokens.iter().cloned());
            }
        }
    }

    /// Executor tokens collected so far.
    pub fn args(&self) -> &[String] {
        &self.args
    }

    /// Proxy allow-list, or `None` if no proxy was requested.
    pub fn proxy_flags(&self) -> Option<&[String]> {
        self.proxy_flags.as_deref()
    }

    /// Registered finalizers, in registration order.
    pub fn finalizers(&self) -> &[Finalizer] {
        &self.finalizers
    }

    /// Run every finalizer in registration order.
    pub fn finalize(self, proxy: &dyn ProxyLauncher) -> Result<Finalized> {
        let Self {
            mut args,
            proxy_flags,
            finalizers,
        } = self;
        debug!(
            "Traversal produced {} executor tokens and {} finalizer(s)",
            args.len(),
            finalizers.len()
        );

        let mut handle = None;
        for finalizer in finalizers {
            match finalizer {
                Finalizer::BusProxy => {
                    let allow_list = proxy_flags.as_deref().unwrap_or_default();
                    let started = proxy.launch(allow_list)?;
                    args.extend(started.sandbox_args().iter().cloned());
                    handle = Some(started);
                }
            }
        }

        Ok(Finalized {
            args,
            proxy: handle,
        })
    }
}
