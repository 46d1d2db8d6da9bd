//! Client identity forwarded by the TLS terminator
//!
//! The terminator verifies the client certificate and passes its subject in a
//! header. The subject is only trusted when the verify header reads `SUCCESS`;
//! otherwise the caller is anonymous.

use axum::http::HeaderMap;
use indirector_core::settings::ClientIdentityConfig;
use std::net::IpAddr;

/// Who is calling
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ClientIdentity {
    /// Certificate name, present only when verified
    pub name: Option<String>,
    pub ip: Option<IpAddr>,
}

impl ClientIdentity {
    pub fn anonymous(ip: Option<IpAddr>) -> Self {
        Self { name: None, ip }
    }

    pub fn verified(name: impl Into<String>, ip: Option<IpAddr>) -> Self {
        Self {
            name: Some(name.into()),
            ip,
        }
    }

    pub fn is_authenticated(&self) -> bool {
        self.name.is_some()
    }

    /// Read the identity from request headers
    pub fn from_headers(headers: &HeaderMap, config: &ClientIdentityConfig, ip: Option<IpAddr>) -> Self {
        let verified = headers
            .get(config.verify_header.as_str())
            .and_then(|v| v.to_str().ok())
            .map(|v| v.trim() == "SUCCESS")
            .unwrap_or(false);
        if !verified {
            return Self::anonymous(ip);
        }

        match headers
            .get(config.dn_header.as_str())
            .and_then(|v| v.to_str().ok())
            .and_then(common_name)
        {
            Some(name) => Self::verified(name, ip),
            None => Self::anonymous(ip),
        }
    }

    /// Name used in log lines and denial messages
    pub fn describe(&self) -> String {
        let ip = self
            .ip
            .map(|ip| ip.to_string())
            .unwrap_or_else(|| "unknown".to_string());
        match &self.name {
            Some(name) => format!("{}({})", name, ip),
            None => ip,
        }
    }
}

/// Extract the CN from `/CN=name/O=...` or `CN=name,O=...`
pub fn common_name(subject: &str) -> Option<String> {
    let subject = subject.trim();
    let separator = if subject.starts_with('/') { '/' } else { ',' };
    subject
        .split(separator)
        .map(str::trim)
        .find_map(|part| part.strip_prefix("CN="))
        .map(str::trim)
        .filter(|cn| !cn.is_empty())
        .map(str::to_string)
}
