//! Instrument wire formats
//!
//! Each submodule holds pure encoding/parsing for one instrument family.

pub mod halo;
