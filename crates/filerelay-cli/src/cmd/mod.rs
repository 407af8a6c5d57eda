pub mod config;
pub mod mark;
pub mod run;
pub mod scan;
pub mod status;
