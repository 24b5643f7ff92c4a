pub mod barcode;
pub mod command;
pub mod config;
pub mod feed;
pub mod fileformat;
pub mod model;
pub mod report;
pub mod runtime;
pub mod sequence;
pub mod stats;
