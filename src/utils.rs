/// `tracing::debug!` guarded by a runtime flag.
#[macro_export]
macro_rules! debug_if {
    ($flag:expr, $($arg:tt)+) => {
        {
            if $flag {
                ::tracing::debug!($($arg)+)
            }
        }
    };
}
