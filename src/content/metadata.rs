//! EXIF extraction: make, model, capture time, exposure, GPS, and
//! whatever else the container carries, flattened into an opaque JSON
//! blob per file rather than a typed struct -- the set of tags in the
//! wild is too open-ended to model exhaustively.

use std::io::Cursor;

use serde_json::{Map, Value};
use uuid::Uuid;

use crate::domain::ContentMetadata;

/// `None` if `bytes` carries no readable EXIF (not an error -- most files
/// don't have any).
pub fn extract(file_id: Uuid, bytes: &[u8]) -> Option<ContentMetadata> {
    let mut cursor = Cursor::new(bytes);
    let exif = exif::Reader::new().read_from_container(&mut cursor).ok()?;

    let mut fields = Map::new();
    for field in exif.fields() {
        let key = field.tag.to_string();
        let value = field.display_value().with_unit(&exif).to_string();
        fields.insert(key, Value::String(value));
    }
    if fields.is_empty() {
        return None;
    }
    Some(ContentMetadata { file_id, data: Value::Object(fields) })
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn plain_bytes_have_no_exif() {
        assert!(extract(Uuid::nil(), b"not an image").is_none());
    }
}
