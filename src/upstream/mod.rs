pub mod client;
pub mod traits;
pub mod types;

pub use client::{parse_listings_body, ApiClient};
pub use traits::ListingSource;
pub use types::ListingsQuery;
