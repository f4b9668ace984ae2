//! SQLite persistence: schema and row conversions.

pub mod converters;
pub mod schema;
