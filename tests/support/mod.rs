#![allow(dead_code)]

pub mod faulty_store;
pub mod gated_store;

#[allow(unused_imports)]
pub use faulty_store::{FaultConfig, FaultyStore};
#[allow(unused_imports)]
pub use gated_store::{Gate, GatedStore};
