//! Jupyter Kernel Activity Client
//!
//! Answers two questions about a running notebook server: is it idle right
//! now, and when did it last do anything. Both are derived from the Jupyter
//! server's `/api/kernels` listing.
//!
//! # Example
//!
//! ```no_run
//! use kernel_client::{ActivityOracle, JupyterKernelClient};
//! use std::time::Duration;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let client = JupyterKernelClient::new(Duration::from_secs(10))?;
//!
//! if client.is_idle("alice", "lab").await? {
//!     let last = client.last_activity("alice", "lab").await?;
//!     println!("idle since {last:?}");
//! }
//! # Ok(())
//! # }
//! ```

pub mod client;
pub mod error;
pub mod models;
#[path = "trait.rs"]
pub mod oracle_trait;
#[cfg(feature = "test-util")]
pub mod mock;

pub use client::JupyterKernelClient;
pub use error::KernelClientError;
pub use models::*;
pub use oracle_trait::ActivityOracle;
#[cfg(feature = "test-util")]
pub use mock::MockActivityOracle;
