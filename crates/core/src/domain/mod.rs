pub mod contract;
pub mod melt;
pub mod price;
pub mod ratios;
pub mod recommendation;
