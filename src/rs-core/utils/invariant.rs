use std::error::Error;

use super::logger::Logger;

/// Report an error which should never happen if the crate is used as intended.
///
/// The error is logged. Debug builds also panic on it so such bugs are caught early, release
/// builds continue running.
pub fn report_invariant_violation(logger: &Logger, err: &impl Error) {
    logger.error(&format!("Invariant violation: {}", err));
    if cfg!(all(debug_assertions, not(test))) {
        panic!("Invariant violation: {}", err);
    }
}
