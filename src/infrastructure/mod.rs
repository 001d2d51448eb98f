pub mod bluetooth;
pub mod channel_access;
pub mod logging;
