mod check;
mod package;

pub use check::{CheckReport, CheckResult, GitRef, HexPackage};
pub use package::{Audit, Field, Package, SignedAudit, Verdict, DEFAULT_ECOSYSTEM};
