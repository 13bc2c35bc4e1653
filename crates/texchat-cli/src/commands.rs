pub mod chat;
pub mod configure;
pub mod lookup;
pub mod render;
