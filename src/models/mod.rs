pub mod bulk;
pub mod operation;
pub mod server_info;
