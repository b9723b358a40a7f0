//! Platform front ends

pub mod win32;
