pub mod client;
pub mod commands;
pub mod config;
pub mod document;
pub mod highlight;
pub mod render;
pub mod studio;
pub mod telemetry;
#[doc(hidden)]
pub mod test_support;
pub mod view;
