pub mod mysql;
pub mod notify;
