//! Concrete generation engines.
pub mod openai;
