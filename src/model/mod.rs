pub mod offer;
pub mod promotion;
