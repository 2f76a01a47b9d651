//! Pagewright GitHub - GitHub hosting for generated sites
//!
//! Creates public repositories for the authenticated account and publishes
//! their default branch through GitHub Pages.

mod client;
mod error;
mod provider;

pub use client::GitHubClient;
pub use error::{Error, Result};
pub use provider::GitHubProvider;
