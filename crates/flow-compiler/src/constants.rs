//! Constants shared across the compiler

/// Default configuration values
pub mod defaults {
    /// Deepest scope nesting the scheduler will lower
    pub const MAX_SCOPE_DEPTH: u32 = 16;
}

/// Label used for the top-level region in logs and errors
pub const ROOT_REGION: &str = "workflow";
