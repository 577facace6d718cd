use serde::de::DeserializeOwned;

use crate::error::DocumentError;

fn document_error(err: serde_path_to_error::Error<serde_json::Error>) -> DocumentError {
    let path = err.path().to_string();
    DocumentError { path, message: err.into_inner().to_string() }
}

/// Deserialize with JSON-path context in error messages.
pub fn from_str_with_path<T: DeserializeOwned>(src: &str) -> Result<T, DocumentError> {
    let de = &mut serde_json::Deserializer::from_str(src);
    serde_path_to_error::deserialize::<_, T>(de).map_err(document_error)
}

/// Same, for an already parsed document.
pub fn from_value_with_path<T: DeserializeOwned>(value: serde_json::Value) -> Result<T, DocumentError> {
    serde_path_to_error::deserialize::<_, T>(value).map_err(document_error)
}
