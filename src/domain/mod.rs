// Domain layer - Pure models, reducers and geometry
pub mod device;
pub mod feed;
pub mod gauge;
pub mod metric;
pub mod price;
