use std::fmt;

/// Result type for foreman-runtime operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error types that can occur in the runtime layer
#[derive(Debug)]
pub enum Error {
    /// Storage layer error
    Store(foreman_store::Error),

    /// Engine layer error
    Engine(foreman_engine::Error),

    /// Agent plugin call failed
    Plugin(String),

    /// Configuration error
    Config(String),

    /// No agent registered under this id
    UnknownAgent(String),

    /// No plugin registered under this name
    UnknownPlugin(String),

    /// Operation conflicts with current state (e.g. assignment without a
    /// checkpoint)
    Conflict(String),

    /// IO operation failed
    Io(std::io::Error),

    /// File watcher error
    Watch(notify::Error),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Store(err) => write!(f, "Store error: {}", err),
            Error::Engine(err) => write!(f, "Engine error: {}", err),
            Error::Plugin(msg) => write!(f, "Plugin error: {}", msg),
            Error::Config(msg) => write!(f, "Configuration error: {}", msg),
            Error::UnknownAgent(id) => write!(f, "Unknown agent: {}", id),
            Error::UnknownPlugin(name) => write!(f, "Unknown plugin: {}", name),
            Error::Conflict(msg) => write!(f, "Conflict: {}", msg),
            Error::Io(err) => write!(f, "IO error: {}", err),
            Error::Watch(err) => write!(f, "Watch error: {}", err),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Store(err) => Some(err),
            Error::Engine(err) => Some(err),
            Error::Io(err) => Some(err),
            Error::Watch(err) => Some(err),
            Error::Plugin(_)
            | Error::Config(_)
            | Error::UnknownAgent(_)
            | Error::UnknownPlugin(_)
            | Error::Conflict(_) => None,
        }
    }
}

impl From<foreman_store::Error> for Error {
    fn from(err: foreman_store::Error) -> Self {
        Error::Store(err)
    }
}

impl From<foreman_engine::Error> for Error {
    fn from(err: foreman_engine::Error) -> Self {
        Error::Engine(err)
    }
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Error::Io(err)
    }
}

impl From<notify::Error> for Error {
    fn from(err: notify::Error) -> Self {
        Error::Watch(err)
    }
}

impl From<toml::de::Error> for Error {
    fn from(err: toml::de::Error) -> Self {
        Error::Config(err.to_string())
    }
}

impl From<toml::ser::Error> for Error {
    fn from(err: toml::ser::Error) -> Self {
        Error::Config(err.to_string())
    }
}
