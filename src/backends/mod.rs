// Backend trait definitions and core types

pub mod capture;
pub mod process;

/// Backend priority ranking (higher = better)
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum BackendPriority {
    Fallback = 1, // Works but limited (raw /proc text parsing)
    Good = 2,     // Solid implementation
    Better = 3,   // Modern, efficient
    Best = 4,     // Native APIs
}
