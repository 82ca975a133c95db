//! Extension negotiation for `Sec-WebSocket-Extensions` (RFC 6455 Section 9).
//!
//! The only extension this client implements is `permessage-deflate`
//! ([`deflate`]); this module holds the header grammar shared with the
//! handshake: extensions are comma-separated, parameters semicolon-separated,
//! `name[=value]`.

pub mod deflate;

use crate::error::{Error, Result};

/// A single extension parameter, e.g. `client_max_window_bits=15` or a bare
/// flag like `server_no_context_takeover`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtensionParam {
    /// Parameter name.
    pub name: String,
    /// Parameter value; `None` for flag parameters.
    pub value: Option<String>,
}

impl ExtensionParam {
    /// Parse `name` or `name=value` (values may be quoted).
    #[must_use]
    pub fn parse(s: &str) -> Self {
        let s = s.trim();
        match s.split_once('=') {
            Some((name, value)) => Self {
                name: name.trim().to_string(),
                value: Some(value.trim().trim_matches('"').to_string()),
            },
            None => Self {
                name: s.to_string(),
                value: None,
            },
        }
    }
}

/// One entry of a `Sec-WebSocket-Extensions` header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtensionOffer {
    /// Extension name, e.g. `permessage-deflate`.
    pub name: String,
    /// Extension parameters.
    pub params: Vec<ExtensionParam>,
}

impl ExtensionOffer {
    /// Parse a single extension entry: `name; param1=value1; param2`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidHandshake`] on an empty extension name.
    pub fn parse(s: &str) -> Result<Self> {
        let mut parts = s.split(';');
        let name = parts.next().unwrap_or("").trim().to_string();
        if name.is_empty() {
            return Err(Error::InvalidHandshake("empty extension name".into()));
        }

        let params = parts.map(ExtensionParam::parse).collect();
        Ok(Self { name, params })
    }

    /// Parse a full header value (comma-separated extension entries).
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidHandshake`] if any entry is malformed.
    pub fn parse_header(header: &str) -> Result<Vec<Self>> {
        header.split(',').map(|s| Self::parse(s.trim())).collect()
    }

    /// Get a parameter's value by name, if present with a value.
    #[must_use]
    pub fn get_param(&self, name: &str) -> Option<&str> {
        self.params
            .iter()
            .find(|p| p.name == name)
            .and_then(|p| p.value.as_deref())
    }

    /// Check whether a parameter is present (with or without a value).
    #[must_use]
    pub fn has_param(&self, name: &str) -> bool {
        self.params.iter().any(|p| p.name == name)
    }
}
