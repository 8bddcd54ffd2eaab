use openflow::messages::*;
use std::error;
use std::fmt;
use std::io;
use std::result;

/// Failure while talking to a switch.
/// Only `Io` terminates the connection; the others are answered with
/// an OpenFlow error message.
#[derive(Debug)]
pub enum Error {
    Io(io::Error),
    BadRequest(OfpBadRequestCode, Vec<u8>),
    HelloFailed,
}

impl error::Error for Error {
    fn description(&self) -> &str {
        match *self {
            Error::Io(_) => "switch connection failure",
            Error::BadRequest(..) => "malformed OpenFlow message",
            Error::HelloFailed => "OpenFlow version negotiation failure",
        }
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match *self {
            Error::Io(ref e) => write!(f, "I/O error: {}", e),
            Error::BadRequest(ref code, ref body) => {
                write!(f, "bad request ({:?}) with {} body bytes", code, body.len())
            }
            Error::HelloFailed => write!(f, "no common OpenFlow version"),
        }
    }
}

impl From<io::Error> for Error {
    fn from(e: io::Error) -> Self {
        Error::Io(e)
    }
}

pub type Result<T> = result::Result<T, Error>;
