pub mod accounting;
pub mod config;
pub mod journal;
pub mod model;
pub mod statistic;
