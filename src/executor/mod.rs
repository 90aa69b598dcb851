pub mod action;
pub mod dispatcher;
#[cfg(feature = "desktop")]
pub mod input;
pub mod safety;
