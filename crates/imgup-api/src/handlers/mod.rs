//! API handlers

pub mod images;
