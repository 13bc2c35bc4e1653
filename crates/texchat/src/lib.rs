pub mod errors;
pub mod markdown;
pub mod models;
pub mod providers;
pub mod session;
pub mod settings;
pub mod stream;
pub mod tools;
