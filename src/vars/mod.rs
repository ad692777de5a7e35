// src/vars/mod.rs

//! Variables and template expansion.
//!
//! - [`store`] holds the process-wide [`VariableStore`].
//! - [`expand`] implements `${name}` expansion and the request-scoped
//!   [`ParamResolver`] that looks names up in the store first and in the
//!   request parameters second.

use std::sync::LazyLock;

use regex::Regex;

pub mod expand;
pub mod store;

pub use expand::{
    expand, identity, validate_params, Lookup, ParamResolver, RequestParams, MAX_EXPAND_DEPTH,
};
pub use store::{VarPolicy, Variable, VariableStore, MAX_VAR_VALUE_SIZE};

/// Names accepted from the command line, the environment and requests.
pub(crate) static PARAM_NAME: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[a-zA-Z][a-zA-Z0-9_]*$").expect("static regex"));

/// Placeholder contents: an identifier, optionally dotted once.
pub(crate) static VAR_EXPR: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[a-zA-Z_][a-zA-Z0-9_]*(\.[a-zA-Z_][a-zA-Z0-9_]*)?$").expect("static regex")
});

/// Whether `name` is acceptable as an argument, environment or request
/// parameter name.
pub fn is_param_name(name: &str) -> bool {
    PARAM_NAME.is_match(name)
}
