//! JSON text <-> BSON document conversion for keyword arguments and results.
//!
//! Input is parsed leniently, the way the mongo shell accepts it: unquoted
//! keys, single-quoted strings and trailing commas are fine, and extended JSON
//! wrappers such as `{"$oid": "..."}` become their BSON types. Output is
//! relaxed extended JSON.

use bson::{Bson, Document};
use serde_json::Value;

use super::connection::DatabaseError;

/// Parse a JSON object into a document. Anything other than an object fails.
pub fn parse_document(text: &str) -> Result<Document, DatabaseError> {
    let value: Value = json5::from_str(text)?;
    if !value.is_object() {
        return Err(DatabaseError::NotADocument(text.trim().to_string()));
    }
    match Bson::try_from(value) {
        Ok(Bson::Document(doc)) => Ok(doc),
        // An object that is itself an extended JSON wrapper, e.g. {"$oid": ...}
        Ok(_) => Err(DatabaseError::NotADocument(text.trim().to_string())),
        Err(e) => Err(DatabaseError::InvalidExtendedJson(e.to_string())),
    }
}

/// Like [`parse_document`], but blank text means the empty filter `{}`.
pub fn parse_filter(text: &str) -> Result<Document, DatabaseError> {
    if text.trim().is_empty() {
        return Ok(Document::new());
    }
    parse_document(text)
}

pub fn document_to_value(doc: Document) -> Value {
    Bson::Document(doc).into_relaxed_extjson()
}

pub fn document_to_string(doc: Document) -> String {
    document_to_value(doc).to_string()
}

/// Render a single BSON value for a keyword return, e.g. an inserted `_id`.
/// ObjectIds and strings come back bare; everything else as relaxed JSON.
pub fn bson_to_string(value: Bson) -> String {
    match value {
        Bson::ObjectId(oid) => oid.to_hex(),
        Bson::String(s) => s,
        other => other.into_relaxed_extjson().to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bson::oid::ObjectId;

    #[test]
    fn parses_shell_style_json() {
        let doc = parse_document("{say : 'Hello MongoDB!'}").unwrap();
        assert_eq!(doc.len(), 1);
        assert_eq!(doc.get_str("say").unwrap(), "Hello MongoDB!");
    }

    #[test]
    fn parses_nested_documents_and_arrays() {
        let doc = parse_document(r#"{"name": "a", tags: ['x', 'y'], meta: {count: 2, ok: true},}"#).unwrap();
        assert_eq!(doc.get_str("name").unwrap(), "a");
        assert_eq!(doc.get_array("tags").unwrap().len(), 2);
        let meta = doc.get_document("meta").unwrap();
        assert!(meta.get_bool("ok").unwrap());
    }

    #[test]
    fn parses_extended_json_object_id() {
        let doc = parse_document(r#"{"_id": {"$oid": "507f1f77bcf86cd799439011"}}"#).unwrap();
        let expected = ObjectId::parse_str("507f1f77bcf86cd799439011").unwrap();
        assert_eq!(doc.get_object_id("_id").unwrap(), expected);
    }

    #[test]
    fn rejects_non_documents() {
        assert!(matches!(parse_document("[1, 2]"), Err(DatabaseError::NotADocument(_))));
        assert!(matches!(parse_document("'text'"), Err(DatabaseError::NotADocument(_))));
        assert!(matches!(
            parse_document(r#"{"$oid": "507f1f77bcf86cd799439011"}"#),
            Err(DatabaseError::NotADocument(_))
        ));
    }

    #[test]
    fn rejects_malformed_json() {
        assert!(matches!(parse_document("{say: "), Err(DatabaseError::InvalidJson(_))));
    }

    #[test]
    fn blank_filter_is_empty_document() {
        assert!(parse_filter("").unwrap().is_empty());
        assert!(parse_filter("   ").unwrap().is_empty());
        assert_eq!(parse_filter("{a: 1}").unwrap().len(), 1);
    }

    #[test]
    fn renders_relaxed_extended_json() {
        let oid = ObjectId::parse_str("507f1f77bcf86cd799439011").unwrap();
        let doc = bson::doc! { "_id": oid, "say": "hi" };
        let value = document_to_value(doc);
        assert_eq!(value["_id"]["$oid"], "507f1f77bcf86cd799439011");
        assert_eq!(value["say"], "hi");
    }

    #[test]
    fn renders_inserted_ids() {
        let oid = ObjectId::parse_str("507f1f77bcf86cd799439011").unwrap();
        assert_eq!(bson_to_string(Bson::ObjectId(oid)), "507f1f77bcf86cd799439011");
        assert_eq!(bson_to_string(Bson::String("key".into())), "key");
        assert_eq!(bson_to_string(Bson::Int32(7)), "7");
    }
}
