//! # Vault Paths
//!
//! Normalization and validation of the configuration paths each kind resolves to.

/// Normalize a Vault path: collapse duplicate slashes and strip leading and
/// trailing slashes.
///
/// ```
/// use vault_config_controller::crd::cleanse_path;
///
/// assert_eq!(cleanse_path("/auth//github/config/"), "auth/github/config");
/// ```
#[must_use]
pub fn cleanse_path(path: &str) -> String {
    path.split('/')
        .filter(|segment| !segment.is_empty())
        .collect::<Vec<_>>()
        .join("/")
}

/// Check that a resolved path is one the engine may send to Vault
///
/// A path that fails here is a bug in the kind's mapping, not bad user input,
/// but it still only fails the current reconcile attempt.
pub fn validate_path(path: &str) -> Result<(), String> {
    if path.is_empty() {
        return Err("path is empty".to_string());
    }
    if path.starts_with('/') || path.ends_with('/') {
        return Err(format!("path '{path}' has a leading or trailing slash"));
    }
    for segment in path.split('/') {
        if segment.is_empty() {
            return Err(format!("path '{path}' contains an empty segment"));
        }
        if segment == "." || segment == ".." {
            return Err(format!("path '{path}' contains a relative segment"));
        }
        if segment.chars().any(char::is_whitespace) {
            return Err(format!("path '{path}' contains whitespace"));
        }
    }
    Ok(())
}
