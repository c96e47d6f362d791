pub mod flatten;
pub mod mapper;
pub mod sentinel;

pub use flatten::{flatten, has_rent};
pub use mapper::{
    listing_id, AnomalyKind, ListingMapper, MappedListing, MappingAnomaly, MultilingualMapper,
    RawByLocale,
};
