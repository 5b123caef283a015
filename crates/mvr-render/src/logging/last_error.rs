use std::cell::RefCell;

thread_local! {
    static LAST_ERROR: RefCell<String> = const { RefCell::new(String::new()) };
}

/// Message of the last failure recorded on the calling thread.
///
/// Empty when nothing failed yet or after a successful `initialize`.
pub fn last_error() -> String {
    LAST_ERROR.with(|slot| slot.borrow().clone())
}

pub(crate) fn set_last_error(message: impl Into<String>) {
    let message = message.into();
    LAST_ERROR.with(|slot| *slot.borrow_mut() = message);
}

pub(crate) fn clear_last_error() {
    LAST_ERROR.with(|slot| slot.borrow_mut().clear());
}
