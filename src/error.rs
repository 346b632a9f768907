use thiserror::Error;

use crate::models::RequestKind;

/// Failure shapes reported by a [`crate::transport::Fetch`] implementation.
///
/// Network failures carry no status code; HTTP failures carry the status
/// code and its canonical reason text.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FetchError {
    #[error("{name}: {message}")]
    Network { name: String, message: String },
    #[error("HTTP {status}--{status_text}")]
    Http { status: u16, status_text: String },
}

impl FetchError {
    pub fn network(name: impl Into<String>, message: impl Into<String>) -> Self {
        FetchError::Network {
            name: name.into(),
            message: message.into(),
        }
    }

    pub fn http(status: u16, status_text: impl Into<String>) -> Self {
        FetchError::Http {
            status,
            status_text: status_text.into(),
        }
    }
}

/// Every reportable condition produced by the loader and the classifier.
#[derive(Debug, Error)]
pub enum Error {
    #[error("error loading {kind} data (URL= {url}): {source}")]
    Transport {
        kind: RequestKind,
        url: String,
        #[source]
        source: FetchError,
    },
    #[error("payload from {url} is not valid {format}: {detail}")]
    Decode {
        url: String,
        format: String,
        detail: String,
    },
    #[error("invalid format [dataFormat = {0}]")]
    InvalidFormat(String),
    #[error("no valid FK, check metadata (FK={foreign_key}): {detail}")]
    MissingForeignKey { foreign_key: String, detail: String },
    #[error("invalid data for attribute {attribute}: {detail}")]
    InvalidData { attribute: String, detail: String },
    #[error("invalid classification: {0}")]
    InvalidClassification(String),
    #[error("request name {0:?} is already registered in this session")]
    DuplicateName(String),
    #[error("no metadata for map [{group},{subject},{unit},{date}]")]
    NoMetadata {
        group: usize,
        subject: usize,
        unit: usize,
        date: usize,
    },
    #[error("no {kind} source {id:?} in the atlas metadata")]
    UnknownSource { kind: RequestKind, id: String },
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fetch_error_messages_match_both_shapes() {
        let net = FetchError::network("TypeError", "connection refused");
        assert_eq!(net.to_string(), "TypeError: connection refused");
        let http = FetchError::http(404, "Not Found");
        assert_eq!(http.to_string(), "HTTP 404--Not Found");
    }

    #[test]
    fn transport_error_names_kind_and_url() {
        let e = Error::Transport {
            kind: RequestKind::Attribute,
            url: "http://x/a.csv".into(),
            source: FetchError::http(503, "Service Unavailable"),
        };
        assert_eq!(
            e.to_string(),
            "error loading attribute data (URL= http://x/a.csv): HTTP 503--Service Unavailable"
        );
    }

    #[test]
    fn invalid_format_names_the_offending_string() {
        let e = Error::InvalidFormat("shapefile".into());
        assert!(e.to_string().contains("shapefile"));
    }
}
