//! Converters from raw response bytes into typed results.
use std::{
    fs::File,
    io::Write,
    path::{Path, PathBuf},
};

use serde_json::Value;

use crate::{error::ConversionError, JsonObject};

/// Turns the body of a successful response into `T`.
///
/// Converters run on a dispatcher worker, after the final attempt and before the listener is
/// notified. A missing body is passed as an empty slice. Conversion errors are never retried.
pub trait ResponseBodyConverter<T>: Send {
    fn convert(&self, body: &[u8]) -> Result<T, ConversionError>;
}

impl<T, F> ResponseBodyConverter<T> for F
where
    F: Fn(&[u8]) -> Result<T, ConversionError> + Send,
{
    fn convert(&self, body: &[u8]) -> Result<T, ConversionError> {
        self(body)
    }
}

/// Parses the body as a JSON object.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonConverter;

impl ResponseBodyConverter<JsonObject> for JsonConverter {
    fn convert(&self, body: &[u8]) -> Result<JsonObject, ConversionError> {
        match serde_json::from_slice::<Value>(body)? {
            Value::Object(object) => Ok(object),
            _ => Err(ConversionError::NotAnObject),
        }
    }
}

/// Ignores the body.
#[derive(Debug, Clone, Copy, Default)]
pub struct VoidConverter;

impl ResponseBodyConverter<()> for VoidConverter {
    fn convert(&self, _body: &[u8]) -> Result<(), ConversionError> {
        Ok(())
    }
}

/// Writes the body to a file, replacing any previous content, and yields the file path.
#[derive(Debug, Clone)]
pub struct FileConverter {
    destination: PathBuf,
}

impl FileConverter {
    pub fn new(destination: impl Into<PathBuf>) -> FileConverter {
        FileConverter {
            destination: destination.into(),
        }
    }

    pub fn destination(&self) -> &Path {
        &self.destination
    }
}

impl ResponseBodyConverter<PathBuf> for FileConverter {
    fn convert(&self, body: &[u8]) -> Result<PathBuf, ConversionError> {
        // The handle is closed when `file` goes out of scope, on error paths too.
        let mut file = File::create(&self.destination)?;
        file.write_all(body)?;
        file.flush()?;

        log::trace!(
            target: "ddna", bytes = body.len();
            "wrote response body to {}", self.destination.display()
        );
        Ok(self.destination.clone())
    }
}
