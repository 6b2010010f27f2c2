//! This module provides reusable test utilities:
//! - An in-process fake RCON server
//! - An in-memory object store
//! - Temporary server directory builders
//! - Common test data

// Not every test binary uses every fixture
#![allow(dead_code)]
#![allow(unused_imports)]

pub mod memory_store;
pub mod mock_rcon;
pub mod server_dir;
pub mod test_data;

// Re-export commonly used items
pub use memory_store::MemoryStore;
pub use mock_rcon::MockRconServer;
pub use server_dir::TestServerDir;
pub use test_data::*;
