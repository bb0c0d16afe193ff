//! Error types for expression evaluation.

/// Error type for evaluation, registry and configuration operations.
///
/// A fetch miss is not represented here: looking up a metric that has no
/// data for the requested window evaluates to an empty series list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Error {
    /// A call node reached evaluation without any arguments.
    MissingArgument { function: String },

    /// A call node names a function that is not registered.
    UnknownFunction(String),

    /// A function rejected its arguments (wrong kind, out of range, missing
    /// positional argument).
    InvalidArgument { function: String, message: String },

    /// A node produced a result that violates the output contract, such as
    /// a zero step or duplicate series names.
    InvalidOutput { target: String, message: String },

    /// A series was assembled from inconsistent parts.
    MalformedSeries(String),

    /// The evaluation window is empty or inverted.
    InvalidWindow { from: i64, until: i64 },

    /// The expression tree is nested deeper than the configured limit.
    DepthExceeded { max_depth: usize },

    /// A different implementation is already registered under this name.
    DuplicateFunction(String),

    /// Configuration could not be parsed.
    Config(String),
}

impl Error {
    pub(crate) fn invalid_argument(function: &str, message: impl Into<String>) -> Self {
        Error::InvalidArgument {
            function: function.to_string(),
            message: message.into(),
        }
    }
}

impl std::error::Error for Error {}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Error::MissingArgument { function } => {
                write!(f, "missing argument: {} called without arguments", function)
            }
            Error::UnknownFunction(name) => write!(f, "unknown function: {}", name),
            Error::InvalidArgument { function, message } => {
                write!(f, "invalid argument for {}: {}", function, message)
            }
            Error::InvalidOutput { target, message } => {
                write!(f, "invalid output from {}: {}", target, message)
            }
            Error::MalformedSeries(msg) => write!(f, "malformed series: {}", msg),
            Error::InvalidWindow { from, until } => {
                write!(f, "invalid window: from {} is not before until {}", from, until)
            }
            Error::DepthExceeded { max_depth } => {
                write!(f, "expression nested deeper than {} levels", max_depth)
            }
            Error::DuplicateFunction(name) => {
                write!(f, "function {} is already registered", name)
            }
            Error::Config(msg) => write!(f, "configuration error: {}", msg),
        }
    }
}

impl From<toml::de::Error> for Error {
    fn from(err: toml::de::Error) -> Self {
        Error::Config(err.to_string())
    }
}

/// Result type alias for evaluation operations.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn should_name_function_in_missing_argument_message() {
        // given
        let err = Error::MissingArgument {
            function: "sumSeries".to_string(),
        };

        // when
        let msg = err.to_string();

        // then
        assert!(msg.contains("missing argument"));
        assert!(msg.contains("sumSeries"));
    }

    #[test]
    fn should_convert_toml_errors_into_config_errors() {
        // given
        let parse_err = toml::from_str::<toml::Value>("max_depth = ").unwrap_err();

        // when
        let err: Error = parse_err.into();

        // then
        assert!(matches!(err, Error::Config(_)));
    }
}
