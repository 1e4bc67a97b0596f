// # Inventory Source Implementations
//
// This module provides implementations of the InventorySource trait that
// need no cloud credentials: an in-process inventory for embedding and
// tests, and a JSON inventory document on disk.

pub mod file;
pub mod memory;

pub use file::FileInventory;
pub use memory::MemoryInventory;
