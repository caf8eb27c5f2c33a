#![no_std]

extern crate micromath;
extern crate nalgebra;
#[macro_use]
extern crate log;
#[macro_use]
extern crate serde;

pub mod algorithm;
pub mod config;
pub mod fcs;
pub mod types;

#[cfg(test)]
extern crate std;

#[cfg(test)]
#[macro_use]
extern crate pretty_assertions;
