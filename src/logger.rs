// Copyright (C) 2023, Ava Labs, Inc. All rights reserved.
// See the file LICENSE.md for licensing terms.

// Makes the logging macros a true runtime no-op when the `logger`
// feature is off. As a library we cannot rely on the logging level
// static shortcut.

#[cfg(feature = "logger")]
pub use log::{debug, error, info, trace, warn};

#[cfg(not(feature = "logger"))]
pub use noop_logger::{debug, error, info, trace, warn};

#[cfg(not(feature = "logger"))]
mod noop_logger {
    #[macro_export]
    /// A noop logger, used when the `logger` feature is disabled
    macro_rules! noop {
        ($($arg:tt)+) => {
            if false {
                // Never executed. An empty macro would make the compiler and
                // clippy warn about unused variables in the expressions
                // passed in; this branch keeps them checked and is removed
                // entirely at any optimization level.
                let _ = format!($($arg)+);
            }
        };
    }

    pub use noop as debug;
    pub use noop as error;
    pub use noop as info;
    pub use noop as trace;
    pub use noop as warn;
}
