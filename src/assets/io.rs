use std::path::Path;

use crate::errors::ResourceError;

/// Reads a whole source file, mapping failures to [`ResourceError::Io`].
pub fn read_file(path: impl AsRef<Path>) -> Result<Vec<u8>, ResourceError> {
    let path = path.as_ref();
    std::fs::read(path).map_err(|err| ResourceError::io(path, &err))
}

/// Reads a UTF-8 text source (shaders, OBJ).
pub fn read_text(path: impl AsRef<Path>) -> Result<String, ResourceError> {
    let path = path.as_ref();
    let bytes = read_file(path)?;
    String::from_utf8(bytes).map_err(|err| ResourceError::decode(path, err))
}
