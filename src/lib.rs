//! Seeds a game catalog from a storefront listing: taxonomy records first, then games with
//! descriptions scraped from product pages and cover/gallery images relayed to the CMS.
pub mod config;
pub mod database_ops;
pub mod error;
pub mod normalization;
pub mod orchestrator;
pub mod tracing;

pub mod util {
    pub mod env;
    pub mod http;
}

pub use config::PopulateConfig;
pub use error::{PopulateError, StoreError};
pub use orchestrator::{Populator, RunReport};
