//! Certificate authority documents
//!
//! Certificates, signing requests and revocation lists travel as opaque PEM
//! text; issuing and validating them is not the indirector's job.

use serde::{Deserialize, Serialize};

use crate::format::Format;
use crate::model::Model;

const PEM_FORMATS: &[Format] = &[Format::Text];

macro_rules! pem_model {
    ($(#[$meta:meta])* $ty:ident, $indirection:literal) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
        pub struct $ty {
            #[serde(default)]
            pub name: String,
            /// PEM-encoded document
            pub content: String,
        }

        impl $ty {
            pub fn new(name: impl Into<String>, content: impl Into<String>) -> Self {
                Self {
                    name: name.into(),
                    content: content.into(),
                }
            }
        }

        impl Model for $ty {
            const INDIRECTION: &'static str = $indirection;

            fn name(&self) -> &str {
                &self.name
            }

            fn supported_formats() -> &'static [Format] {
                PEM_FORMATS
            }
        }
    };
}

pem_model!(
    /// Signed certificate
    Certificate,
    "certificate"
);
pem_model!(
    /// Pending certificate signing request
    CertificateRequest,
    "certificate_request"
);
pem_model!(
    /// Certificate revocation list
    CertificateRevocationList,
    "certificate_revocation_list"
);

/// Lifecycle state of a host certificate
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CertificateState {
    Requested,
    Signed,
    Revoked,
}

/// Signing state of one host's certificate
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CertificateStatus {
    pub name: String,

    pub state: CertificateState,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fingerprint: Option<String>,
}

impl Model for CertificateStatus {
    const INDIRECTION: &'static str = "certificate_status";

    fn name(&self) -> &str {
        &self.name
    }
}
