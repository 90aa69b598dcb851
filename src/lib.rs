//! Screenshot-driven desktop agent: observe the screen, ask a model for the next
//! action, confirm it with the user, perform it, repeat.

pub mod agent_engine;
#[cfg(feature = "desktop")]
pub mod cli;
pub mod config;
pub mod errors;
pub mod executor;
pub mod llm;
pub mod logging;
pub mod perception;
pub mod platform;
#[cfg(any(test, feature = "test-support"))]
pub mod test_support;
