//! Build and environment flag handling
//!
//! Path-list variables such as `LD_LIBRARY_PATH` accumulate: a new value is
//! prepended and whatever was there before survives as the suffix. All other
//! variables are simply overridden.

use std::collections::BTreeMap;

/// Flag name -> value, iterated in key order
pub type FlagMap = BTreeMap<String, String>;

/// Separator between entries of a path-list variable
#[cfg(windows)]
pub const PATH_LIST_SEPARATOR: char = ';';

/// Separator between entries of a path-list variable
#[cfg(not(windows))]
pub const PATH_LIST_SEPARATOR: char = ':';

/// Variables searched by the dynamic/static linker for libraries
const LIBRARY_SEARCH_PATH_VARIABLES: &[&str] = &[
    "LD_LIBRARY_PATH",
    "LIBRARY_PATH",
    "DYLD_LIBRARY_PATH",
    "DYLD_FALLBACK_LIBRARY_PATH",
];

/// Whether a variable holds a separator-joined list of paths
pub fn is_path_list_variable(name: &str) -> bool {
    name.ends_with("PATH")
}

/// Whether a variable is a library search path
pub fn is_library_search_path(name: &str) -> bool {
    LIBRARY_SEARCH_PATH_VARIABLES.contains(&name)
}

/// Prepend `new` to an existing path list
pub fn prepend_path(existing: Option<&str>, new: &str) -> String {
    match existing {
        Some(old) if !old.is_empty() => format!("{new}{PATH_LIST_SEPARATOR}{old}"),
        _ => new.to_string(),
    }
}

/// Layer `overlay` onto `env`, accumulating path lists and overriding the rest
pub fn layer_environment(env: &mut FlagMap, overlay: &FlagMap) {
    for (name, value) in overlay {
        let merged = if is_path_list_variable(name) {
            prepend_path(env.get(name).map(String::as_str), value)
        } else {
            value.clone()
        };
        env.insert(name.clone(), merged);
    }
}

/// Build the environment for an external command
///
/// `base` is the lowest layer (normally the current process environment);
/// each following layer takes priority over the ones before it.
pub fn merge_environment<I>(base: I, layers: &[&FlagMap]) -> FlagMap
where
    I: IntoIterator<Item = (String, String)>,
{
    let mut env: FlagMap = base.into_iter().collect();
    for layer in layers {
        layer_environment(&mut env, layer);
    }
    env
}

/// Combine default flags with declared ones into a single ordered list
///
/// Defaults the project does not override come first, then the project's own
/// flags, each group in key order.
pub fn merge_build_flags(defaults: &FlagMap, declared: &FlagMap) -> Vec<(String, String)> {
    defaults
        .iter()
        .filter(|(name, _)| !declared.contains_key(*name))
        .chain(declared.iter())
        .map(|(name, value)| (name.clone(), value.clone()))
        .collect()
}
