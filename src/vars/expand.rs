// src/vars/expand.rs

//! `${name}` template expansion.
//!
//! Placeholders nest: in `${v${a}r}` the inner `${a}` is resolved first and
//! its value becomes part of the outer name. Expansion is all-or-nothing;
//! unbalanced braces, a malformed name, a missing value or too much nesting
//! all yield `None` and nothing is partially substituted.
//!
//! The scan keeps one output buffer per nesting level, so the work is
//! bounded by the template length times [`MAX_EXPAND_DEPTH`].

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicUsize, Ordering};

use regex::Regex;
use tracing::{debug, warn};

use crate::vars::store::VariableStore;
use crate::vars::{VAR_EXPR, is_param_name};

/// Maximum placeholder nesting, and maximum number of expandable variables
/// resolved during one invocation.
pub const MAX_EXPAND_DEPTH: usize = 10;

/// Something that can answer "what is the value of `name`?".
pub trait Lookup: Send + Sync {
    fn lookup(&self, name: &str) -> Option<String>;
}

impl<F> Lookup for F
where
    F: Fn(&str) -> Option<String> + Send + Sync,
{
    fn lookup(&self, name: &str) -> Option<String> {
        self(name)
    }
}

/// Post-processing that leaves substituted values untouched.
pub fn identity(value: &str) -> String {
    value.to_string()
}

/// Expand every placeholder in `template`.
///
/// `post` is applied to values substituted at the outermost level only;
/// values feeding an enclosing placeholder's name are used as-is.
pub fn expand<L, P>(template: &str, lookup: &L, post: P) -> Option<String>
where
    L: Lookup + ?Sized,
    P: Fn(&str) -> String,
{
    let bytes = template.as_bytes();
    let mut stack: Vec<Vec<u8>> = Vec::with_capacity(MAX_EXPAND_DEPTH);
    stack.push(Vec::with_capacity(bytes.len()));

    let mut i = 0;
    while i < bytes.len() {
        let b = bytes[i];
        if b == b'$' && bytes.get(i + 1) == Some(&b'{') {
            if stack.len() == MAX_EXPAND_DEPTH {
                debug!(template, "placeholder nesting too deep");
                return None;
            }
            stack.push(Vec::new());
            i += 2;
            continue;
        }

        if b == b'}' {
            if stack.len() < 2 {
                debug!(template, "unmatched '}}' in template");
                return None;
            }
            let name = stack.pop().and_then(|raw| String::from_utf8(raw).ok())?;
            if !VAR_EXPR.is_match(&name) {
                debug!(template, name = %name, "malformed placeholder name");
                return None;
            }
            let Some(value) = lookup.lookup(&name) else {
                debug!(template, name = %name, "placeholder has no value");
                return None;
            };

            let outermost = stack.len() == 1;
            let parent = stack.last_mut()?;
            if outermost {
                parent.extend_from_slice(post(&value).as_bytes());
            } else {
                parent.extend_from_slice(value.as_bytes());
            }
        } else if let Some(current) = stack.last_mut() {
            current.push(b);
        }
        i += 1;
    }

    if stack.len() != 1 {
        debug!(template, "unterminated '${{' in template");
        return None;
    }
    stack.pop().and_then(|out| String::from_utf8(out).ok())
}

/// Validated per-request parameter values.
///
/// Only names matching `^[a-zA-Z]\w*$` are ever answered; the first value
/// given for a name wins.
#[derive(Debug, Clone, Default)]
pub struct RequestParams {
    values: HashMap<String, String>,
}

impl RequestParams {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.values.entry(name.into()).or_insert_with(|| value.into());
    }

    /// Parse `name=value` pairs, skipping anything without `=`.
    pub fn from_pairs<I, S>(pairs: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut params = Self::new();
        for pair in pairs {
            match pair.as_ref().split_once('=') {
                Some((name, value)) => params.insert(name, value),
                None => warn!(pair = %pair.as_ref(), "ignoring parameter without '='"),
            }
        }
        params
    }

    pub fn get(&self, name: &str) -> Option<String> {
        if !is_param_name(name) {
            return None;
        }
        self.values.get(name).cloned()
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for RequestParams {
    fn from_iter<T: IntoIterator<Item = (K, V)>>(iter: T) -> Self {
        let mut params = Self::new();
        for (k, v) in iter {
            params.insert(k, v);
        }
        params
    }
}

/// Resolver for one invocation: the variable store first, then the request
/// parameters.
///
/// Expandable store values are expanded recursively through this same
/// resolver. Every such expansion counts against one budget of
/// [`MAX_EXPAND_DEPTH`] for the resolver's whole lifetime, which is what
/// makes a cycle like `a = "${b}"`, `b = "${a}"` fail instead of looping.
#[derive(Debug)]
pub struct ParamResolver<'a> {
    store: &'a VariableStore,
    request: Option<&'a RequestParams>,
    expansions: AtomicUsize,
}

impl<'a> ParamResolver<'a> {
    pub fn new(store: &'a VariableStore, request: Option<&'a RequestParams>) -> Self {
        Self {
            store,
            request,
            expansions: AtomicUsize::new(0),
        }
    }
}

impl Lookup for ParamResolver<'_> {
    fn lookup(&self, name: &str) -> Option<String> {
        if let Some(var) = self.store.entry(name) {
            if !var.expandable {
                return Some(var.value);
            }
            let used = self.expansions.fetch_add(1, Ordering::Relaxed) + 1;
            if used > MAX_EXPAND_DEPTH {
                warn!(var = %name, "variable expansion too deep; giving up");
                return None;
            }
            return expand(&var.value, self, identity);
        }
        self.request?.get(name)
    }
}

/// Check every validator against the value `lookup` gives for its name.
///
/// A missing value fails validation. Patterns are unanchored searches.
pub fn validate_params<L>(validators: &BTreeMap<String, Regex>, lookup: &L) -> bool
where
    L: Lookup + ?Sized,
{
    validators.iter().all(|(name, pattern)| match lookup.lookup(name) {
        Some(value) => pattern.is_match(&value),
        None => false,
    })
}
