use crate::enforcer::EnforcerState;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Model syntax error: {0}")]
    ModelSyntax(String),

    #[error("Policy store unavailable: {context}")]
    StoreUnavailable {
        context: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync + 'static>,
    },

    #[error("Matcher evaluation failed: {0}")]
    MatcherEval(String),

    #[error("Enforcer is not loaded (state: {0})")]
    NotLoaded(EnforcerState),

    #[error("Invalid policy: {0}")]
    InvalidPolicy(String),

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Wrap a backing-store failure, keeping the original error as the source
    pub fn store<E>(context: impl Into<String>, source: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        Error::StoreUnavailable {
            context: context.into(),
            source: Box::new(source),
        }
    }
}

impl From<toml::de::Error> for Error {
    fn from(err: toml::de::Error) -> Self {
        Error::Config(err.to_string())
    }
}

impl From<validator::ValidationErrors> for Error {
    fn from(err: validator::ValidationErrors) -> Self {
        Error::Config(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, Error>;
