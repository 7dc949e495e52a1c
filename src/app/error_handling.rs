//! Fatal error reporting for the binary.

use tracing::error;

use crate::error::Error;

/// Exit code for a failed run: 2 for bad input or configuration, 1 otherwise.
pub fn exit_code(error: &anyhow::Error) -> i32 {
    match error.downcast_ref::<Error>() {
        Some(Error::Config(_) | Error::Validation(_) | Error::Parse(_) | Error::Build(_)) => 2,
        Some(_) => 1,
        None if error.downcast_ref::<serde_json::Error>().is_some() => 2,
        None => 1,
    }
}

/// Print `error` (with its cause chain when verbose) and exit.
pub fn handle_fatal_error(error: anyhow::Error, verbose: u8) -> ! {
    error!("Fatal error: {}", error);
    eprintln!("Error: {error}");

    if verbose >= 1 {
        eprintln!("\nError chain:");
        for (i, cause) in error.chain().enumerate() {
            eprintln!("  {}: {}", i, cause);
        }
    }

    std::process::exit(exit_code(&error))
}
