//! Memlens Environment
//!
//! Platform queries for the memory readings the ledger records:
//! - Resident pages reported by the OS
//! - Live bytes handed out by a counting global allocator
//! - A scripted source for deterministic readings

pub mod allocator;
pub mod memory;
pub mod scripted;

pub use allocator::CountingAllocator;
pub use memory::{MemoryMode, MemorySource, ProcessMemory};
pub use scripted::ScriptedMemory;
