#![allow(clippy::large_enum_variant)]

#[path = "loglite.v1.rs"]
pub mod v1;
