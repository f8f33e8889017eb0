pub mod decode;
pub mod fetcher;
pub mod masterlist;
pub mod schema;
