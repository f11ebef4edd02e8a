use std::error::Error;
use std::io::{self, ErrorKind};

use http::StatusCode;

use crate::fs::FsError;

#[derive(Debug)]
pub(crate) enum DavError {
    // plain status response, connection stays open.
    Status(StatusCode),
    // status response, then close the connection.
    StatusClose(StatusCode),
    // status response with an explanatory text.
    Issue(StatusCode, &'static str),
    // same, but close the connection afterwards.
    IssueClose(StatusCode, &'static str),
    InvalidPath,   // error parsing path
    IllegalPath,   // path outside of the DAV root
    UnknownDavMethod,
    Timeout,         // request body did not arrive in time
    FsError(FsError),
    IoError(io::Error),
    XmlWriterError(xml::writer::Error),
}

impl Error for DavError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            DavError::FsError(e) => Some(e),
            DavError::IoError(e) => Some(e),
            DavError::XmlWriterError(e) => Some(e),
            _ => None,
        }
    }
}

impl std::fmt::Display for DavError {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match self {
            DavError::XmlWriterError(_) => write!(f, "XML generate error"),
            DavError::IoError(_) => write!(f, "I/O error"),
            DavError::Issue(_, text) | DavError::IssueClose(_, text) => write!(f, "{}", text),
            _ => write!(f, "{:?}", self),
        }
    }
}

impl From<FsError> for DavError {
    fn from(e: FsError) -> Self {
        DavError::FsError(e)
    }
}

impl From<DavError> for io::Error {
    fn from(e: DavError) -> Self {
        match e {
            DavError::IoError(e) => e,
            e => io::Error::other(e),
        }
    }
}

impl From<io::Error> for DavError {
    fn from(e: io::Error) -> Self {
        DavError::IoError(e)
    }
}

impl From<StatusCode> for DavError {
    fn from(e: StatusCode) -> Self {
        DavError::Status(e)
    }
}

impl From<xml::writer::Error> for DavError {
    fn from(e: xml::writer::Error) -> Self {
        DavError::XmlWriterError(e)
    }
}

fn ioerror_to_status(ioerror: &io::Error) -> StatusCode {
    match ioerror.kind() {
        ErrorKind::NotFound => StatusCode::NOT_FOUND,
        ErrorKind::PermissionDenied => StatusCode::FORBIDDEN,
        ErrorKind::AlreadyExists => StatusCode::CONFLICT,
        ErrorKind::TimedOut => StatusCode::REQUEST_TIMEOUT,
        ErrorKind::InvalidData | ErrorKind::UnexpectedEof => StatusCode::BAD_REQUEST,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

pub(crate) fn fserror_to_status(e: &FsError) -> StatusCode {
    match e {
        FsError::NotImplemented => StatusCode::NOT_IMPLEMENTED,
        FsError::GeneralFailure => StatusCode::INTERNAL_SERVER_ERROR,
        FsError::Exists => StatusCode::METHOD_NOT_ALLOWED,
        FsError::NotFound => StatusCode::NOT_FOUND,
        FsError::Forbidden => StatusCode::FORBIDDEN,
        FsError::InsufficientStorage => StatusCode::INSUFFICIENT_STORAGE,
        FsError::PathTooLong => StatusCode::URI_TOO_LONG,
        FsError::TooLarge => StatusCode::PAYLOAD_TOO_LARGE,
    }
}

impl DavError {
    pub(crate) fn statuscode(&self) -> StatusCode {
        match self {
            DavError::Status(e) | DavError::StatusClose(e) => *e,
            DavError::Issue(e, _) | DavError::IssueClose(e, _) => *e,
            DavError::InvalidPath => StatusCode::BAD_REQUEST,
            DavError::IllegalPath => StatusCode::NOT_FOUND,
            DavError::UnknownDavMethod => StatusCode::NOT_FOUND,
            DavError::Timeout => StatusCode::REQUEST_TIMEOUT,
            DavError::FsError(e) => fserror_to_status(e),
            DavError::IoError(e) => ioerror_to_status(e),
            DavError::XmlWriterError(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// The explanatory text that goes into the plain-text body.
    pub(crate) fn text(&self) -> &str {
        match self {
            DavError::Issue(_, text) | DavError::IssueClose(_, text) => text,
            DavError::Timeout => "Timed out waiting for data",
            _ => self.statuscode().canonical_reason().unwrap_or("Error"),
        }
    }

    pub(crate) fn must_close(&self) -> bool {
        !matches!(
            self,
            DavError::Status(_)
                | DavError::Issue(..)
                | DavError::FsError(_)
                | DavError::InvalidPath
                | DavError::IllegalPath
                | DavError::UnknownDavMethod
        )
    }
}

pub(crate) type DavResult<T> = Result<T, DavError>;
