pub mod call;
pub mod definitions;
pub mod executor;
