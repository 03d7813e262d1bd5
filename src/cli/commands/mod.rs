pub mod approve;
pub mod migrate;
pub mod seed;
