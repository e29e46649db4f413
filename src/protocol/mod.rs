// src/protocol/mod.rs

pub mod property;

pub use property::{Property, PropertyId};
