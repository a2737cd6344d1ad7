pub mod antispam;
pub mod context;
pub mod message;
pub mod phase;
pub mod quiet_hours;
pub mod send_pool;
pub mod template;
