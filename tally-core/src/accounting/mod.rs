pub mod cost_basis;
pub mod recompute;
