pub mod cache;
pub mod check;
pub mod codec;
pub mod config;
pub mod diff;
pub mod git;
pub mod lockfile;
pub mod model;
pub mod output;
pub mod platform;
pub mod registry;
pub mod resolver;
pub mod sign;
pub mod status;

pub use cache::Cache;
pub use config::Config;
pub use lockfile::Lockfile;
pub use model::{Audit, CheckReport, CheckResult, GitRef, HexPackage, Package, SignedAudit, Verdict};
pub use registry::{HexRegistry, Registry};
pub use status::Status;
