//! Structured error surface for the Sigil wallet.
//!
//! Library crates raise their own small `thiserror` enums and convert into
//! [`SigilError`] at the boundary. A `SigilError` carries a machine-readable
//! [`ErrorCode`], a human message, an optional sorted details map, an
//! optional suggestion, and the process exit code the CLI maps it to.

use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;

/// Machine-readable error category. The exit-code mapping is fixed:
/// `2` invalid input, `3` auth, `4` not found, `5` policy, `1` everything else.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCode {
    InvalidInput,
    NotFound,
    Auth,
    DecryptionFailed,
    WalletExists,
    WalletNotFound,
    SessionNotFound,
    SessionExpired,
    SessionCorrupted,
    KeyringUnavailable,
    AgentTokenInvalid,
    AgentTokenExpired,
    AgentPolicyViolation,
    AgentDailyLimit,
    AgentChainDenied,
    AgentAddrDenied,
    AgentXpubInvalid,
    AgentXpubWriteDenied,
    InsufficientFunds,
    UnsupportedChain,
    Network,
    Broadcast,
    CorruptCache,
    Internal,
}

impl ErrorCode {
    /// Process exit code for this category.
    pub fn exit_code(&self) -> i32 {
        use ErrorCode::*;
        match self {
            InvalidInput | AgentChainDenied | AgentAddrDenied | AgentXpubInvalid
            | UnsupportedChain => 2,
            Auth | DecryptionFailed | AgentTokenInvalid | AgentTokenExpired
            | AgentXpubWriteDenied => 3,
            NotFound | WalletNotFound | SessionNotFound => 4,
            AgentPolicyViolation | AgentDailyLimit | InsufficientFunds => 5,
            WalletExists | SessionExpired | SessionCorrupted | KeyringUnavailable | Network
            | Broadcast | CorruptCache | Internal => 1,
        }
    }

    /// Stable snake_case name used in JSON output.
    pub fn as_str(&self) -> &'static str {
        use ErrorCode::*;
        match self {
            InvalidInput => "invalid_input",
            NotFound => "not_found",
            Auth => "auth",
            DecryptionFailed => "decryption_failed",
            WalletExists => "wallet_exists",
            WalletNotFound => "wallet_not_found",
            SessionNotFound => "session_not_found",
            SessionExpired => "session_expired",
            SessionCorrupted => "session_corrupted",
            KeyringUnavailable => "keyring_unavailable",
            AgentTokenInvalid => "agent_token_invalid",
            AgentTokenExpired => "agent_token_expired",
            AgentPolicyViolation => "agent_policy_violation",
            AgentDailyLimit => "agent_daily_limit",
            AgentChainDenied => "agent_chain_denied",
            AgentAddrDenied => "agent_addr_denied",
            AgentXpubInvalid => "agent_xpub_invalid",
            AgentXpubWriteDenied => "agent_xpub_write_denied",
            InsufficientFunds => "insufficient_funds",
            UnsupportedChain => "unsupported_chain",
            Network => "network",
            Broadcast => "broadcast",
            CorruptCache => "corrupt_cache",
            Internal => "internal",
        }
    }
}

/// The outward-facing error type.
///
/// Details are held in a `BTreeMap` so rendering order is always
/// lexicographic, both in text and JSON output.
#[derive(Debug, Clone)]
pub struct SigilError {
    code: ErrorCode,
    message: String,
    details: BTreeMap<String, String>,
    suggestion: Option<String>,
}

impl SigilError {
    /// Create an error with a category and message.
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            details: BTreeMap::new(),
            suggestion: None,
        }
    }

    /// Attach a key/value detail.
    pub fn with_detail(mut self, key: impl Into<String>, value: impl fmt::Display) -> Self {
        self.details.insert(key.into(), value.to_string());
        self
    }

    /// Attach a suggestion shown as a footer in text output.
    pub fn with_suggestion(mut self, suggestion: impl Into<String>) -> Self {
        self.suggestion = Some(suggestion.into());
        self
    }

    pub fn code(&self) -> ErrorCode {
        self.code
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn details(&self) -> &BTreeMap<String, String> {
        &self.details
    }

    pub fn suggestion(&self) -> Option<&str> {
        self.suggestion.as_deref()
    }

    pub fn exit_code(&self) -> i32 {
        self.code.exit_code()
    }

    /// Render the text form: message, sorted details, suggestion footer.
    pub fn render_text(&self) -> String {
        let mut out = format!("Error: {}", self.message);
        for (key, value) in &self.details {
            out.push_str(&format!("\n  {key}: {value}"));
        }
        if let Some(suggestion) = &self.suggestion {
            out.push_str(&format!("\nSuggestion: {suggestion}"));
        }
        out
    }

    /// Render the JSON form: `{"error": {code, message, details?, suggestion?, exit_code}}`.
    pub fn render_json(&self) -> String {
        #[derive(Serialize)]
        struct Inner<'a> {
            code: &'a str,
            message: &'a str,
            #[serde(skip_serializing_if = "BTreeMap::is_empty")]
            details: &'a BTreeMap<String, String>,
            #[serde(skip_serializing_if = "Option::is_none")]
            suggestion: &'a Option<String>,
            exit_code: i32,
        }
        #[derive(Serialize)]
        struct Outer<'a> {
            error: Inner<'a>,
        }
        let outer = Outer {
            error: Inner {
                code: self.code.as_str(),
                message: &self.message,
                details: &self.details,
                suggestion: &self.suggestion,
                exit_code: self.exit_code(),
            },
        };
        serde_json::to_string(&outer).unwrap_or_else(|_| {
            format!("{{\"error\":{{\"code\":\"internal\",\"message\":\"{}\"}}}}", self.message)
        })
    }
}

/// `Display` prints only the message; details and suggestion are rendering
/// concerns of the CLI layer.
impl fmt::Display for SigilError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

impl std::error::Error for SigilError {}

impl From<std::io::Error> for SigilError {
    fn from(err: std::io::Error) -> Self {
        match err.kind() {
            std::io::ErrorKind::NotFound => {
                SigilError::new(ErrorCode::NotFound, format!("not found: {err}"))
            }
            _ => SigilError::new(ErrorCode::Internal, format!("I/O error: {err}")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exit_code_mapping() {
        assert_eq!(ErrorCode::InvalidInput.exit_code(), 2);
        assert_eq!(ErrorCode::AgentChainDenied.exit_code(), 2);
        assert_eq!(ErrorCode::AgentAddrDenied.exit_code(), 2);
        assert_eq!(ErrorCode::AgentXpubInvalid.exit_code(), 2);
        assert_eq!(ErrorCode::Auth.exit_code(), 3);
        assert_eq!(ErrorCode::AgentTokenInvalid.exit_code(), 3);
        assert_eq!(ErrorCode::AgentTokenExpired.exit_code(), 3);
        assert_eq!(ErrorCode::AgentXpubWriteDenied.exit_code(), 3);
        assert_eq!(ErrorCode::WalletNotFound.exit_code(), 4);
        assert_eq!(ErrorCode::AgentPolicyViolation.exit_code(), 5);
        assert_eq!(ErrorCode::AgentDailyLimit.exit_code(), 5);
        assert_eq!(ErrorCode::InsufficientFunds.exit_code(), 5);
        assert_eq!(ErrorCode::Network.exit_code(), 1);
        assert_eq!(ErrorCode::CorruptCache.exit_code(), 1);
    }

    #[test]
    fn details_render_sorted() {
        let err = SigilError::new(ErrorCode::InvalidInput, "bad amount")
            .with_detail("zeta", "z")
            .with_detail("alpha", "a")
            .with_detail("mid", "m");
        let text = err.render_text();
        let alpha = text.find("alpha").unwrap();
        let mid = text.find("mid").unwrap();
        let zeta = text.find("zeta").unwrap();
        assert!(alpha < mid && mid < zeta, "details out of order: {text}");
    }

    #[test]
    fn text_render_shape() {
        let err = SigilError::new(ErrorCode::InsufficientFunds, "insufficient funds")
            .with_detail("have", 10u64)
            .with_detail("need", 25u64)
            .with_suggestion("fund the wallet and retry");
        let text = err.render_text();
        assert!(text.starts_with("Error: insufficient funds"));
        assert!(text.contains("have: 10"));
        assert!(text.ends_with("Suggestion: fund the wallet and retry"));
    }

    #[test]
    fn json_render_shape() {
        let err = SigilError::new(ErrorCode::WalletNotFound, "no such wallet")
            .with_detail("name", "main");
        let json = err.render_json();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(value["error"]["code"], "wallet_not_found");
        assert_eq!(value["error"]["exit_code"], 4);
        assert_eq!(value["error"]["details"]["name"], "main");
        assert!(value["error"].get("suggestion").is_none());
    }

    #[test]
    fn json_render_omits_empty_details() {
        let err = SigilError::new(ErrorCode::Network, "timed out");
        let value: serde_json::Value = serde_json::from_str(&err.render_json()).unwrap();
        assert!(value["error"].get("details").is_none());
    }

    #[test]
    fn io_not_found_maps_to_not_found() {
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "gone");
        let err: SigilError = io.into();
        assert_eq!(err.code(), ErrorCode::NotFound);
    }
}
