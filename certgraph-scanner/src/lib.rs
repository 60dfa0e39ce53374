pub mod dispatcher;
pub mod domain;
pub mod error;
pub mod resolver;
pub mod result;
pub mod tracker;
pub mod walker;

pub use domain::{DomainGraph, DomainNode, FrontierItem, canonical_domain};
pub use error::{FailureKind, ResolveError, WalkError};
pub use resolver::{CertResolver, CertificateObservation, TlsResolver, derive_neighbors};
pub use result::{WalkResult, WalkStats};
pub use walker::{ProgressCallback, WalkConfig, Walker};
