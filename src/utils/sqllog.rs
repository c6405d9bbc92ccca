//! Statement tracing with a thread-local capture sink.
//! Tests enable the sink to assert on the exact SQL a call issued without touching the
//! global logger.

use std::cell::RefCell;

/// Log target for issued statements.
pub const SQL_TARGET: &str = "docsql::sql";

thread_local! {
    static TL_SINK: RefCell<Option<Vec<String>>> = const { RefCell::new(None) };
}

/// Guard that disables the thread-local sink on drop.
pub struct SqlSinkGuard;
impl Drop for SqlSinkGuard {
    fn drop(&mut self) {
        TL_SINK.with(|s| *s.borrow_mut() = None);
    }
}

/// Enable capture for the current thread until the returned guard drops.
#[must_use]
pub fn enable_thread_sink() -> SqlSinkGuard {
    TL_SINK.with(|s| *s.borrow_mut() = Some(Vec::new()));
    SqlSinkGuard
}

pub fn write_str(msg: &str) {
    TL_SINK.with(|s| {
        if let Some(buf) = s.borrow_mut().as_mut() {
            buf.push(msg.to_owned());
        }
    });
}

/// Drain captured statements. Empty when capture is disabled.
pub fn drain() -> Vec<String> {
    TL_SINK.with(|s| s.borrow_mut().as_mut().map(std::mem::take).unwrap_or_default())
}

pub fn snapshot() -> Vec<String> {
    TL_SINK.with(|s| s.borrow().as_ref().cloned().unwrap_or_default())
}

/// Record an issued statement in the thread-local sink and at TRACE on `docsql::sql`.
#[macro_export]
macro_rules! sql_trace {
    ($($arg:tt)*) => {{
        let __s = format!($($arg)*);
        $crate::utils::sqllog::write_str(&__s);
        log::log!(target: $crate::utils::sqllog::SQL_TARGET, log::Level::Trace, "{}", __s);
    }};
}
