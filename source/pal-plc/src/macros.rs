#![allow(unused_macros)]

#[cfg(feature = "defmt-logging")]
macro_rules! pal_log {
    (trace,   $($arg:expr),*) => { defmt::trace!($($arg),*) };
    (debug,   $($arg:expr),*) => { defmt::debug!($($arg),*) };
    (info,    $($arg:expr),*) => { defmt::info!($($arg),*) };
    (warn,    $($arg:expr),*) => { defmt::warn!($($arg),*) };
    (error,   $($arg:expr),*) => { defmt::error!($($arg),*) };
}

#[cfg(not(feature = "defmt-logging"))]
macro_rules! pal_log {
    ($level:ident, $($arg:expr),*) => {{ $( let _ = &$arg; )* }}
}

macro_rules! pal_trace {
    ($($arg:expr),*) => (pal_log!(trace, $($arg),*));
}

macro_rules! pal_debug {
    ($($arg:expr),*) => (pal_log!(debug, $($arg),*));
}

macro_rules! pal_info {
    ($($arg:expr),*) => (pal_log!(info, $($arg),*));
}

macro_rules! pal_warn {
    ($($arg:expr),*) => (pal_log!(warn, $($arg),*));
}

macro_rules! pal_error {
    ($($arg:expr),*) => (pal_log!(error, $($arg),*));
}
