pub mod message;
pub mod product;
pub mod proposal;
pub mod session;
