pub mod client;
pub mod getter;
pub mod sink;
pub mod storage;
pub mod subscription;
pub mod table;
pub mod types;
