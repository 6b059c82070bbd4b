//! Test utilities for property-based testing
//!
//! This module provides generators and helpers for proptest.

#[cfg(test)]
pub mod generators {
    use proptest::prelude::*;

    /// Generate a project name
    pub fn project_name() -> impl Strategy<Value = String> {
        "[A-Za-z][A-Za-z0-9_-]{0,20}"
    }

    /// Generate an upper-case flag or variable name
    pub fn flag_name() -> impl Strategy<Value = String> {
        "[A-Z][A-Z0-9_]{0,15}"
    }

    /// Generate an absolute directory path
    pub fn absolute_dir() -> impl Strategy<Value = String> {
        proptest::collection::vec("[a-z0-9_]{1,8}", 1..5)
            .prop_map(|parts| format!("/{}", parts.join("/")))
    }

    /// Generate a full 40-character commit id
    pub fn commit_id() -> impl Strategy<Value = String> {
        "[0-9a-f]{40}"
    }

    /// Generate a library search path variable name
    pub fn library_path_variable() -> impl Strategy<Value = String> {
        prop_oneof![
            Just("LD_LIBRARY_PATH".to_string()),
            Just("LIBRARY_PATH".to_string()),
            Just("DYLD_LIBRARY_PATH".to_string()),
            Just("DYLD_FALLBACK_LIBRARY_PATH".to_string()),
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::generators::*;
    use crate::config::defaults::MIN_PROPTEST_ITERATIONS;
    use crate::core::flags::{is_library_search_path, is_path_list_variable};
    use proptest::prelude::*;

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(MIN_PROPTEST_ITERATIONS))]

        #[test]
        fn test_project_name_generator(name in project_name()) {
            prop_assert!(!name.is_empty());
            prop_assert!(!name.contains('/'));
        }

        #[test]
        fn test_absolute_dir_generator(dir in absolute_dir()) {
            prop_assert!(dir.starts_with('/'));
            prop_assert!(!dir.ends_with('/'));
        }

        #[test]
        fn test_commit_id_generator(id in commit_id()) {
            prop_assert_eq!(id.len(), 40);
        }

        #[test]
        fn test_library_variables_are_path_lists(var in library_path_variable()) {
            prop_assert!(is_library_search_path(&var));
            prop_assert!(is_path_list_variable(&var));
        }

        #[test]
        fn test_flag_name_generator(name in flag_name()) {
            prop_assert!(name.chars().all(|c| c.is_ascii_uppercase() || c.is_ascii_digit() || c == '_'));
        }
    }
}
