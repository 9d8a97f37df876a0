pub mod models;
pub mod protocol;
pub mod style;
pub mod transform;
