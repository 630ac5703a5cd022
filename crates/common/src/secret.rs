//! Secret types for stage join tokens.
//!
//! Stage participant tokens grant publish rights on a stage, so they are
//! wrapped in [`SecretString`] from the moment they enter the client. The
//! wrapper redacts itself in `Debug` output and is zeroized on drop; the raw
//! value is only reachable through an explicit [`ExposeSecret::expose_secret`]
//! call at the point where it is handed to the transport.
//!
//! # Example
//!
//! ```rust
//! use common::secret::{ExposeSecret, SecretString};
//!
//! #[derive(Debug)]
//! struct JoinAttempt {
//!     stage: String,
//!     token: SecretString,
//! }
//!
//! let attempt = JoinAttempt {
//!     stage: "main".to_string(),
//!     token: SecretString::from("eyJhbGciOi..."),
//! };
//!
//! assert!(!format!("{attempt:?}").contains("eyJhbGciOi"));
//! assert_eq!(attempt.token.expose_secret(), "eyJhbGciOi...");
//! ```

pub use secrecy::{ExposeSecret, SecretBox, SecretString};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_token_debug_is_redacted() {
        let token = SecretString::from("stage-token-123");
        let debug_str = format!("{token:?}");

        assert!(debug_str.contains("REDACTED"));
        assert!(!debug_str.contains("stage-token-123"));
    }

    #[test]
    fn test_expose_secret_returns_token() {
        let token = SecretString::from("tok1");
        assert_eq!(token.expose_secret(), "tok1");
    }

    #[test]
    fn test_cloned_token_keeps_value() {
        let token = SecretString::from("cloneable");
        let cloned = token.clone();
        assert_eq!(cloned.expose_secret(), "cloneable");
    }
}
