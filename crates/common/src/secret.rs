//! Redacting wrapper for credential material

use std::fmt;
use zeroize::Zeroize;

/// Sensitive value (API key, auth cookie). Redacted in Debug/Display and
/// zeroed on drop.
pub struct Secret<T: Zeroize>(T);

impl<T: Zeroize> Secret<T> {
    pub fn new(value: T) -> Self {
        Self(value)
    }

    /// Expose the inner value. Only provider adapters should need this.
    pub fn expose(&self) -> &T {
        &self.0
    }
}

impl From<String> for Secret<String> {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl From<&str> for Secret<String> {
    fn from(value: &str) -> Self {
        Self(value.to_owned())
    }
}

impl<T: Zeroize> fmt::Debug for Secret<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[REDACTED]")
    }
}

impl<T: Zeroize> fmt::Display for Secret<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[REDACTED]")
    }
}

impl<T: Zeroize> Drop for Secret<T> {
    fn drop(&mut self) {
        self.0.zeroize();
    }
}

impl<T: Zeroize + Clone> Clone for Secret<T> {
    fn clone(&self) -> Self {
        Self(self.0.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn debug_and_display_are_redacted() {
        let secret = Secret::from("sk-or-v1-abcdef");
        assert_eq!(format!("{secret:?}"), "[REDACTED]");
        assert_eq!(secret.to_string(), "[REDACTED]");
    }

    #[test]
    fn expose_returns_inner_value() {
        let secret = Secret::new(String::from("_U=cookie-value"));
        assert_eq!(secret.expose(), "_U=cookie-value");
    }

    #[test]
    fn clone_is_independent() {
        let secret = Secret::from("key-1");
        let copy = secret.clone();
        drop(secret);
        assert_eq!(copy.expose(), "key-1");
    }

    #[test]
    fn redaction_survives_nesting() {
        #[derive(Debug)]
        #[allow(dead_code)]
        struct Holder {
            name: &'static str,
            secret: Secret<String>,
        }
        let holder = Holder {
            name: "TEXT_KEY_1",
            secret: Secret::from("super-secret"),
        };
        let debug = format!("{holder:?}");
        assert!(debug.contains("TEXT_KEY_1"));
        assert!(!debug.contains("super-secret"), "got: {debug}");
    }
}
