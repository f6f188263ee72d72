pub mod accounting_error;
pub mod journal_error;
pub mod recompute_error;
pub mod repository_error;
