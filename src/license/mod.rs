//! Where a user's service plans come from, and which direct SKUs can go.
//!
//! - [`resolver`]: per-group disabled-plan table for the user's licensing groups.
//! - [`catalog`]: full plan list of every SKU the user or those groups touch.
//! - [`classifier`]: per-plan source: Direct, Group, Direct+Group, Extra-Direct or none.
//! - [`advisor`]: critical/redundant breakdown and the interactive removal dialog.
//! - [`bulk`]: SKU-level direct/group report for one user or all users.

pub mod advisor;
pub mod bulk;
pub mod catalog;
pub mod classifier;
pub mod resolver;
