extern crate serde;

extern crate ezicell_hal;

pub mod core;
pub mod trace;
pub mod cfg;
pub mod io;
