pub mod chat;
pub mod csv;
pub mod script;
