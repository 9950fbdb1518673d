use std::fmt;

#[derive(Debug)]
pub enum Error {
    /// The DNF distribution would produce at least `limit` AND clauses.
    TooComplex { conditions: usize, limit: usize },
    InvalidDocument(String),
    BsonDeError(bson::de::Error),
}

impl Error {
    /// Returns `true` if the error is the recoverable DNF explosion signal.
    pub fn is_too_complex(&self) -> bool {
        matches!(self, Error::TooComplex { .. })
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::TooComplex { conditions, limit } => {
                write!(
                    f,
                    "Filter condition is too complex: normalization would produce {} conditions (limit: {})",
                    conditions, limit
                )
            }
            Error::InvalidDocument(reason) => write!(f, "{}", reason),
            Error::BsonDeError(e) => write!(f, "{}", e),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::BsonDeError(e) => Some(e),
            _ => None,
        }
    }
}

impl From<bson::de::Error> for Error {
    fn from(err: bson::de::Error) -> Self {
        Error::BsonDeError(err)
    }
}

pub type Result<T> = std::result::Result<T, Error>;
