pub mod common;
pub mod intent;
pub mod replay;
pub mod resolve;
pub mod table;
