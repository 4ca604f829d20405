//! Payload mapping
//!
//! Turns one upstream payload into the flat staging records stored for an
//! entity. Payloads are decoded into typed, all-optional structs; the only
//! hard requirement is the presence of the natural key. Every mapper returns
//! a `Result<_, ItemError>` so a bad payload becomes a failure ledger entry
//! instead of aborting the run.

mod mappers;
mod types;

pub use mappers::{
    map_bill_of_materials, map_company, map_contact, map_financial_category, map_product,
    map_product_category, map_product_group, map_sales_channel, map_sales_order, map_seller,
    map_stock_balance, map_warehouse,
};
pub use types::{MapFn, RecordMapper, StagingRecord, UpstreamId};
