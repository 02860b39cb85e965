pub use crate::types::SubdoError;

pub type Result<T> = std::result::Result<T, SubdoError>;

pub trait ErrorContext<T> {
    fn config_context<F>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> String;

    fn output_context<F>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> String;
}

impl<T, E> ErrorContext<T> for std::result::Result<T, E>
where
    E: std::fmt::Display,
{
    fn config_context<F>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> String,
    {
        self.map_err(|e| SubdoError::ConfigError(format!("{}: {}", f(), e)))
    }

    fn output_context<F>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> String,
    {
        self.map_err(|e| SubdoError::OutputError(format!("{}: {}", f(), e)))
    }
}
