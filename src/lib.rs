//! `license-source`: find out where a user's Microsoft 365 service plans come
//! from, and remove direct license assignments that groups already cover.
//!
//! # Flow
//! 1. Parse CLI arguments ([`cli`]).
//! 2. Load config and credentials ([`config::load_config`]).
//! 3. Open the tenant: Microsoft Graph or a JSON snapshot ([`directory`]).
//! 4. Build the group disabled-plan table and the SKU catalog ([`license::resolver`], [`license::catalog`]).
//! 5. Classify every plan ([`license::classifier`]) and render it ([`report`]).
//! 6. Assess each direct SKU and walk the removal dialog ([`license::advisor`], [`prompt`]).
//!
//! The bulk reporter ([`license::bulk`]) skips steps 4 to 6 and lists, per
//! user and SKU, whether the assignment is direct, from groups, or both.

pub mod cli;
pub mod config;
pub mod directory;
pub mod license;
pub mod models;
pub mod pipeline;
pub mod prompt;
pub mod report;
