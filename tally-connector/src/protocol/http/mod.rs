pub mod builder;
pub mod parser;
pub mod private;
pub mod rest;
