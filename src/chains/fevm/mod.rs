pub mod client;
pub mod getter;
pub mod poller;
pub mod producer;
pub mod worker;
