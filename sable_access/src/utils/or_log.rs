use std::fmt::{Debug, Display};

/// Log, rather than propagate, the error side of a result.
///
/// Used where one bad item (a single rule in a file, say) must not stop the
/// caller from carrying on with the rest.
pub trait OrLog<T> {
    fn or_log(self, context: impl Display) -> Option<T>;
}

impl<T, E: Debug> OrLog<T> for Result<T, E> {
    fn or_log(self, context: impl Display) -> Option<T> {
        match self {
            Ok(value) => Some(value),
            Err(e) => {
                tracing::error!("Error: {:?} ({})", e, context);
                None
            }
        }
    }
}
