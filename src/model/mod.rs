pub mod extension;
pub mod gate_log;
pub mod leave_application;
pub mod role;
pub mod student;
