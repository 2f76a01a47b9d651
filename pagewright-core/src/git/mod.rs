//! Git operations for Pagewright
//!
//! This module wraps the working copies that back published repositories:
//! initialisation, staging, committing, branch checkout and pushing.

mod branch;
mod repo;

pub use branch::PushCredentials;
pub use repo::{CommitAuthor, GitRepo};
