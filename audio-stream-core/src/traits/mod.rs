pub mod callbacks;
pub mod driver;
