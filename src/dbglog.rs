// Copyright The dwarflint Authors
// SPDX-License-Identifier: Apache-2.0

//! Internal progress tracing.
//!
//! dwarflint's stdout is its findings stream, so the checker's own
//! chatter goes to stderr, and only when `-v` asked for it. A single
//! atomic flag and a macro cover that need; wiring up a logging
//! framework would buy nothing here.

use std::sync::atomic::{AtomicBool, Ordering};

// Re-exported so the macro is documented next to its switch.
pub use crate::debug;

/// Gate for [`debug`] output; off until [`enable`] is called.
pub static ENABLED: AtomicBool = AtomicBool::new(false);

/// Turn on [`debug`] tracing for the rest of the process.
pub fn enable() {
    ENABLED.store(true, Ordering::Relaxed);
}

/// Trace a line to stderr when `-v` tracing is on.
///
/// Takes the usual format-string forms. The arguments are not
/// evaluated at all while tracing is off.
#[macro_export]
macro_rules! debug {
    ( $($args:tt)* ) => {
        if $crate::dbglog::ENABLED.load(::std::sync::atomic::Ordering::Relaxed) {
            ::std::eprintln!( $($args)* );
        }
    };
}
