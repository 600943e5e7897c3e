//! Credential loading from environment-style configuration
//!
//! Single families read `{KEY_TYPE}_{i}`; paired families additionally read
//! `{KEY_TYPE}_SRCHHPGUSR_{i}`. Missing or blank entries are skipped, so gaps
//! in the numbering are fine.

use std::collections::HashMap;

use tracing::{debug, warn};

use crate::credential::{Credential, CredentialShape};
use crate::pool::PoolConfig;

/// Infix that names the second half of a paired credential.
pub const SECONDARY_INFIX: &str = "SRCHHPGUSR";

/// Key/value configuration the pool scans for credentials.
pub trait CredentialSource: Send + Sync {
    fn var(&self, key: &str) -> Option<String>;
}

/// Reads credentials from the process environment.
#[derive(Debug, Clone, Copy, Default)]
pub struct EnvSource;

impl CredentialSource for EnvSource {
    fn var(&self, key: &str) -> Option<String> {
        std::env::var(key).ok()
    }
}

impl CredentialSource for HashMap<String, String> {
    fn var(&self, key: &str) -> Option<String> {
        self.get(key).cloned()
    }
}

/// Read a value, treating blank as absent.
fn non_blank(source: &dyn CredentialSource, key: &str) -> Option<String> {
    source
        .var(key)
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

/// Scan `source` for the credentials of one family, in numeric order.
pub fn load_credentials(source: &dyn CredentialSource, config: &PoolConfig) -> Vec<Credential> {
    let key_type = &config.key_type;
    let mut credentials = Vec::new();

    for i in 1..=config.max_keys {
        let primary_name = format!("{key_type}_{i}");
        let Some(primary) = non_blank(source, &primary_name) else {
            continue;
        };

        match config.shape {
            CredentialShape::Single => {
                credentials.push(Credential::single(primary_name, primary));
            }
            CredentialShape::Paired => {
                let secondary_name = format!("{key_type}_{SECONDARY_INFIX}_{i}");
                match non_blank(source, &secondary_name) {
                    Some(secondary) => credentials.push(Credential::paired(
                        primary_name,
                        primary,
                        secondary_name,
                        secondary,
                    )),
                    None => {
                        warn!(
                            credential = %primary_name,
                            missing = %secondary_name,
                            "paired credential has no secondary value, skipping"
                        );
                    }
                }
            }
        }
    }

    debug!(key_type = %key_type, loaded = credentials.len(), "scanned credentials");
    credentials
}

#[cfg(test)]
mod tests {
    use super::*;

    fn source(entries: &[(&str, &str)]) -> HashMap<String, String> {
        entries
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    fn names(credentials: &[Credential]) -> Vec<&str> {
        credentials.iter().map(|c| c.name()).collect()
    }

    #[test]
    fn skips_blank_and_missing_entries() {
        let src = source(&[("K_1", "a"), ("K_2", "b"), ("K_3", "")]);
        let creds = load_credentials(&src, &PoolConfig::new("K", 50, CredentialShape::Single));
        assert_eq!(names(&creds), vec!["K_1", "K_2"]);
    }

    #[test]
    fn whitespace_only_is_blank() {
        let src = source(&[("K_1", "   "), ("K_2", "\tb\n")]);
        let creds = load_credentials(&src, &PoolConfig::new("K", 5, CredentialShape::Single));
        assert_eq!(names(&creds), vec!["K_2"]);
        assert_eq!(creds[0].secret(), "b");
    }

    #[test]
    fn keeps_numeric_order_across_gaps() {
        let src = source(&[("K_7", "g"), ("K_2", "b"), ("K_10", "j")]);
        let creds = load_credentials(&src, &PoolConfig::new("K", 10, CredentialShape::Single));
        assert_eq!(names(&creds), vec!["K_2", "K_7", "K_10"]);
    }

    #[test]
    fn respects_max_keys() {
        let src = source(&[("K_1", "a"), ("K_2", "b"), ("K_3", "c")]);
        let creds = load_credentials(&src, &PoolConfig::new("K", 2, CredentialShape::Single));
        assert_eq!(names(&creds), vec!["K_1", "K_2"]);
    }

    #[test]
    fn empty_source_yields_empty_pool() {
        let creds = load_credentials(
            &HashMap::new(),
            &PoolConfig::new("K", 50, CredentialShape::Single),
        );
        assert!(creds.is_empty());
    }

    #[test]
    fn paired_reads_both_halves() {
        let src = source(&[
            ("C_1", "u1"),
            ("C_SRCHHPGUSR_1", "s1"),
            ("C_2", "u2"),
            ("C_SRCHHPGUSR_2", "s2"),
        ]);
        let creds = load_credentials(&src, &PoolConfig::new("C", 5, CredentialShape::Paired));
        assert_eq!(names(&creds), vec!["C_1", "C_2"]);
        assert_eq!(creds[1].secret(), "u2");
        assert_eq!(creds[1].secondary_secret(), Some("s2"));
        assert_eq!(creds[0].names(), vec!["C_1", "C_SRCHHPGUSR_1"]);
    }

    #[test]
    fn paired_without_secondary_is_skipped() {
        let src = source(&[("C_1", "u1"), ("C_2", "u2"), ("C_SRCHHPGUSR_2", "s2")]);
        let creds = load_credentials(&src, &PoolConfig::new("C", 5, CredentialShape::Paired));
        assert_eq!(names(&creds), vec!["C_2"]);
    }

    #[test]
    fn env_source_reads_process_environment() {
        // Unique name so parallel tests never collide.
        let key = "KEY_POOL_SOURCE_TEST_ENV_1";
        // SAFETY: no other test reads or writes this variable.
        unsafe { std::env::set_var(key, "from-env") };
        assert_eq!(EnvSource.var(key).as_deref(), Some("from-env"));
        unsafe { std::env::remove_var(key) };
        assert_eq!(EnvSource.var(key), None);
    }
}
