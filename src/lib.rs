pub mod record;
pub mod device;
pub mod capabilities;
pub mod connectivity;
pub mod stream;
pub mod console;
pub mod transport;
pub mod remote;
pub mod rpc;
pub mod config;
pub mod registry;
pub mod logger;
pub mod layer;

pub mod env;
pub mod init;
