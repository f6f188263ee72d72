pub mod currency;
pub mod summary;
