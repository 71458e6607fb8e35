//! Text formats for describing catalogs.

pub mod yaml;
