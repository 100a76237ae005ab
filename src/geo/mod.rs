pub mod geo_index;

pub use geo_index::GeoIndex;
