pub mod chat;
pub mod contract;
pub mod market;
