pub mod bid;
pub mod carrier;
pub mod catalog;
pub mod contract;
pub mod offer;
