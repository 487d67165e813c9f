//! voxsentinel - command line front end for voxsentinel-core.

pub mod analyze;
pub mod cli;
pub mod generate;
pub mod report;
