/// Diagnostic print usable from the render thread. Compiled out when the
/// `rt-safe` feature is enabled (the default), since stderr may block.
#[cfg(not(feature = "rt-safe"))]
macro_rules! rt_eprintln {
    ($($arg:tt)*) => { eprintln!($($arg)*) };
}

#[cfg(feature = "rt-safe")]
macro_rules! rt_eprintln {
    ($($arg:tt)*) => {};
}
