//! HTTP implementations of the external service ports.

pub mod catalog;
pub mod directory;
pub mod error;
pub mod extraction;
pub(crate) mod http;
pub(crate) mod retry;

pub use catalog::HttpCatalogService;
pub use directory::HttpSupplierDirectory;
pub use error::ClientError;
pub use extraction::HttpExtractionService;
pub use http::ClientSettings;
