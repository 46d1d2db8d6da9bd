//! Built-in models and their indirections

mod catalog;
mod certificate;
mod facts;
mod node;
mod report;
mod status;

pub use catalog::Catalog;
pub use certificate::{
    Certificate, CertificateRequest, CertificateRevocationList, CertificateState,
    CertificateStatus,
};
pub use facts::Facts;
pub use node::Node;
pub use report::Report;
pub use status::Status;

use crate::indirection::IndirectionSpec;
use crate::model::Model;
use crate::settings::RunMode;

/// Indirection for a typed model, with its `<name>_terminus` selector
fn spec_for<M: Model>(doc: &str) -> IndirectionSpec {
    IndirectionSpec::new(M::INDIRECTION, M::spec())
        .terminus_setting(format!("{}_terminus", M::INDIRECTION))
        .doc(doc)
}

/// Every indirection registered at start-up
pub fn standard_indirections() -> Vec<IndirectionSpec> {
    vec![
        spec_for::<Facts>("Facts reported by nodes.")
            .default_terminus(RunMode::Master, "yaml")
            .default_terminus(RunMode::Agent, "facter")
            .default_terminus(RunMode::User, "facter"),
        spec_for::<Catalog>("Compiled catalogs, one per node.")
            .default_terminus(RunMode::Master, "yaml")
            .default_terminus(RunMode::Agent, "rest")
            .default_terminus(RunMode::User, "yaml"),
        spec_for::<Node>("Node classification and parameters.")
            .default_terminus(RunMode::Master, "memory")
            .default_terminus(RunMode::Agent, "rest")
            .default_terminus(RunMode::User, "memory"),
        spec_for::<Report>("Reports uploaded after each agent run.")
            .default_terminus(RunMode::Master, "yaml")
            .default_terminus(RunMode::Agent, "rest")
            .default_terminus(RunMode::User, "yaml"),
        spec_for::<Status>("Liveness of the serving process.")
            .default_terminus(RunMode::Master, "local")
            .default_terminus(RunMode::Agent, "rest")
            .default_terminus(RunMode::User, "local"),
        spec_for::<Certificate>("Signed certificates.")
            .default_terminus(RunMode::Master, "file")
            .default_terminus(RunMode::Agent, "rest")
            .default_terminus(RunMode::User, "file"),
        spec_for::<CertificateRequest>("Pending certificate signing requests.")
            .default_terminus(RunMode::Master, "file")
            .default_terminus(RunMode::Agent, "rest")
            .default_terminus(RunMode::User, "file"),
        spec_for::<CertificateRevocationList>("The certificate revocation list.")
            .default_terminus(RunMode::Master, "file")
            .default_terminus(RunMode::Agent, "rest")
            .default_terminus(RunMode::User, "file"),
        spec_for::<CertificateStatus>("Signing state of host certificates.")
            .default_terminus(RunMode::Master, "file")
            .default_terminus(RunMode::Agent, "rest")
            .default_terminus(RunMode::User, "file"),
    ]
}
