//! CLI Exit Code Registry
//!
//! This is the single source of truth for all CLI exit codes.
//! Exit codes are part of the shell contract; scripts rely on them.
//!
//! # Exit Code Ranges
//!
//! | Range   | Domain           | Description                              |
//! |---------|------------------|------------------------------------------|
//! | 0       | Universal        | Success                                  |
//! | 2       | Universal        | CLI usage error (bad args, missing file) |
//! | 60-69   | fuse             | Record fusion codes                      |
//!
//! # Adding New Exit Codes
//!
//! 1. Add the constant in the appropriate range
//! 2. Document what triggers it
//! 3. Update the table above
//! 4. Wire it into the relevant command's error handling

use visigrid_fuse::{ErrorKind, FuseError};

// =============================================================================
// Universal (0-2)
// =============================================================================

/// Success - command completed without errors.
pub const EXIT_SUCCESS: u8 = 0;

/// Usage error - bad arguments, missing required options.
pub const EXIT_USAGE: u8 = 2;

// =============================================================================
// Fuse (60-69)
// =============================================================================

/// Config file failed to parse or validate, or a job is malformed
/// (one-sided metadata, conflicting broadcast, unknown strategy).
pub const EXIT_FUSE_INVALID_CONFIG: u8 = 60;

/// Fusion failed while running: unreadable input, missing column or
/// record, strategy error.
pub const EXIT_FUSE_RUNTIME: u8 = 61;

/// Map a library error onto the registry.
pub fn fuse_exit_code(err: &FuseError) -> u8 {
    match err.kind() {
        ErrorKind::Configuration => EXIT_FUSE_INVALID_CONFIG,
        ErrorKind::Lookup | ErrorKind::Strategy | ErrorKind::Io => EXIT_FUSE_RUNTIME,
    }
}
