// Library surface for the binary and the integration tests.
pub mod app_dirs;
pub mod audio;
pub mod clip;
pub mod config;
pub mod controller;
pub mod form;
pub mod logging;
pub mod review;
pub mod runtime;
pub mod session;
pub mod source;

#[doc(hidden)]
pub mod fixtures;
