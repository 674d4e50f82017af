//! Assertion macros shared by test helpers and integration tests.

/// Await a send future and panic with contextual diagnostics on failure.
#[macro_export]
macro_rules! send_expect {
    ($fut:expr) => {{
        $fut.await
            .expect(concat!("send failed at ", file!(), ":", line!()))
    }};
    ($fut:expr, $msg:expr) => {{
        let m = ::std::format!("{msg} at {}:{}", file!(), line!(), msg = $msg);
        $fut.await.expect(&m)
    }};
}

/// Await a receive future and panic with contextual diagnostics on failure.
#[macro_export]
macro_rules! receive_expect {
    ($fut:expr) => {{
        $fut.await
            .expect(concat!("receive failed at ", file!(), ":", line!()))
    }};
    ($fut:expr, $msg:expr) => {{
        let m = ::std::format!("{msg} at {}:{}", file!(), line!(), msg = $msg);
        $fut.await.expect(&m)
    }};
}

pub use crate::{receive_expect, send_expect};
