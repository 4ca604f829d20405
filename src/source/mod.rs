//! Upstream entity sources
//!
//! An [`EntitySource`] answers the two questions the crawler asks: which ids
//! are on page `n` of this window, and what is the payload for one id.
//! [`ApiEntitySource`] answers them against the REST API according to an
//! [`EndpointSpec`].

mod api;
mod memory;
mod types;

pub use api::ApiEntitySource;
pub use memory::MemoryEntitySource;
pub use types::{
    DetailRequest, EndpointSpec, EntitySource, ListingShape, PageRequest, WindowFilter,
    SINGLETON_ID,
};

#[cfg(test)]
mod tests;
