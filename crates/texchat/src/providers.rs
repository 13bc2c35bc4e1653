pub mod base;
pub mod openai;
pub mod utils;

#[cfg(test)]
pub mod mock;
