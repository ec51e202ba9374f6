//! Hardware side of LCD brightness mapping: the Marlin gantry link, the
//! light sensors it carries and the raster scan that produces a
//! [`Measurement`](lcdmap_shared::Measurement).

pub mod marlin;
