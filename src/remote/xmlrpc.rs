//! XML-RPC envelopes. `dxr` owns the wire format; this module bounds what a
//! request may look like and maps values to and from JSON for the keywords.

use dxr::{Array, Fault, FaultResponse, Member, MethodCall, MethodResponse, Struct, TryFromValue, Value};
use quick_xml::events::Event;
use quick_xml::Reader;
use std::collections::HashMap;
use thiserror::Error;

/// Deepest element nesting accepted in an incoming document. Robot Framework
/// arguments stay well below this; anything deeper is rejected before decoding.
pub const MAX_DEPTH: usize = 64;

/// Outcome of a remote call: a value or a fault
pub type Response = Result<Value, Fault>;

#[derive(Debug, Error)]
pub enum XmlRpcError {
    #[error("XML error: {0}")]
    Xml(#[from] quick_xml::Error),

    #[error("Malformed XML-RPC: {0}")]
    Malformed(String),

    #[error("Unsupported XML-RPC value")]
    UnsupportedValue,
}

impl From<quick_xml::de::DeError> for XmlRpcError {
    fn from(e: quick_xml::de::DeError) -> Self {
        XmlRpcError::Malformed(e.to_string())
    }
}

pub fn parse_call(xml: &str) -> Result<MethodCall, XmlRpcError> {
    check_depth(xml)?;
    Ok(quick_xml::de::from_str(xml)?)
}

pub fn parse_response(xml: &str) -> Result<Response, XmlRpcError> {
    check_depth(xml)?;
    if let Ok(response) = quick_xml::de::from_str::<MethodResponse>(xml) {
        return Ok(Ok(response.inner()));
    }
    let fault: FaultResponse = quick_xml::de::from_str(xml)?;
    let fault = Fault::try_from(fault).map_err(|e| XmlRpcError::Malformed(e.to_string()))?;
    Ok(Err(fault))
}

pub fn call(method: &str, params: Vec<Value>) -> MethodCall {
    MethodCall::new(method.to_string(), params)
}

pub fn call_to_xml(call: &MethodCall) -> Result<String, XmlRpcError> {
    Ok(with_declaration(quick_xml::se::to_string(call)?))
}

pub fn response_to_xml(response: Response) -> Result<String, XmlRpcError> {
    let body = match response {
        Ok(value) => quick_xml::se::to_string(&MethodResponse::new(value))?,
        Err(fault) => quick_xml::se::to_string(&FaultResponse::from(fault))?,
    };
    Ok(with_declaration(body))
}

fn with_declaration(body: String) -> String {
    format!("<?xml version=\"1.0\"?>\n{}", body)
}

fn check_depth(xml: &str) -> Result<(), XmlRpcError> {
    let mut reader = Reader::from_str(xml);
    let mut depth = 0usize;
    loop {
        match reader.read_event()? {
            Event::Start(_) => {
                depth += 1;
                if depth > MAX_DEPTH {
                    return Err(XmlRpcError::Malformed(format!(
                        "document nests deeper than {} elements",
                        MAX_DEPTH
                    )));
                }
            }
            Event::End(_) => depth = depth.saturating_sub(1),
            Event::Eof => return Ok(()),
            _ => {}
        }
    }
}

/// XML-RPC integer: `<i4>` when it fits, `<i8>` otherwise
pub fn int(i: i64) -> Value {
    match i32::try_from(i) {
        Ok(small) => Value::i4(small),
        Err(_) => Value::i8(i),
    }
}

/// XML-RPC string. XML 1.0 cannot carry most control characters, so those
/// strings travel as `<base64>` bytes.
pub fn string(s: &str) -> Value {
    if s.chars().any(is_illegal_xml_char) {
        Value::base64(s.as_bytes().to_vec())
    } else {
        Value::string(s.to_string())
    }
}

pub fn strings(items: &[String]) -> Value {
    Value::array(Array::new(items.iter().map(|s| string(s)).collect()))
}

pub fn structure(members: Vec<(&str, Value)>) -> Value {
    let members = members
        .into_iter()
        .map(|(name, value)| Member::new(name.to_string(), value))
        .collect();
    Value::structure(Struct::new(members))
}

fn is_illegal_xml_char(c: char) -> bool {
    matches!(c, '\u{0}'..='\u{8}' | '\u{b}' | '\u{c}' | '\u{e}'..='\u{1f}' | '\u{fffe}' | '\u{ffff}')
}

/// Keyword results to XML-RPC. `null` has no standard encoding and becomes `""`.
pub fn from_json(value: &serde_json::Value) -> Value {
    match value {
        serde_json::Value::Null => Value::string(String::new()),
        serde_json::Value::Bool(b) => Value::boolean(*b),
        serde_json::Value::Number(n) => match n.as_i64() {
            Some(i) => int(i),
            None => Value::double(n.as_f64().unwrap_or_default()),
        },
        serde_json::Value::String(s) => string(s),
        serde_json::Value::Array(items) => Value::array(Array::new(items.iter().map(from_json).collect())),
        serde_json::Value::Object(map) => {
            let members = map
                .iter()
                .map(|(name, value)| Member::new(name.clone(), from_json(value)))
                .collect();
            Value::structure(Struct::new(members))
        }
    }
}

/// Keyword arguments from XML-RPC
pub fn to_json(value: &Value) -> Result<serde_json::Value, XmlRpcError> {
    if let Ok(i) = i32::try_from_value(value) {
        return Ok(i.into());
    }
    if let Ok(i) = i64::try_from_value(value) {
        return Ok(i.into());
    }
    if let Ok(b) = bool::try_from_value(value) {
        return Ok(b.into());
    }
    if let Ok(d) = f64::try_from_value(value) {
        return Ok(serde_json::Number::from_f64(d).map_or(serde_json::Value::Null, Into::into));
    }
    if let Ok(s) = String::try_from_value(value) {
        return Ok(s.into());
    }
    if let Ok(items) = Vec::<Value>::try_from_value(value) {
        return items.iter().map(to_json).collect::<Result<Vec<_>, _>>().map(Into::into);
    }
    if let Ok(members) = HashMap::<String, Value>::try_from_value(value) {
        let mut map = serde_json::Map::new();
        for (name, value) in &members {
            map.insert(name.clone(), to_json(value)?);
        }
        return Ok(map.into());
    }
    Err(XmlRpcError::UnsupportedValue)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn parses_run_keyword_call() {
        let xml = r#"<?xml version="1.0"?>
<methodCall>
  <methodName>run_keyword</methodName>
  <params>
    <param><value><string>Insert Json Document Into Collection</string></value></param>
    <param><value><array><data>
      <value><string>testCol</string></value>
      <value><string>{say : 'Hello &amp; bye'}</string></value>
    </data></array></value></param>
  </params>
</methodCall>"#;
        let call = parse_call(xml).unwrap();
        assert_eq!(call.name(), "run_keyword");
        assert_eq!(call.params().len(), 2);
        assert_eq!(to_json(&call.params()[0]).unwrap(), json!("Insert Json Document Into Collection"));
        assert_eq!(
            to_json(&call.params()[1]).unwrap(),
            json!(["testCol", "{say : 'Hello & bye'}"])
        );
    }

    #[test]
    fn parses_struct_kwargs_and_scalars() {
        let xml = "<methodCall><methodName>run_keyword</methodName><params>\
            <param><value><string>Document Count Should Be</string></value></param>\
            <param><value><array><data>\
              <value><int>-7</int></value>\
              <value><boolean>1</boolean></value>\
              <value><double>1.5</double></value>\
            </data></array></value></param>\
            <param><value><struct>\
              <member><name>collection</name><value><string>c</string></value></member>\
            </struct></value></param>\
            </params></methodCall>";
        let call = parse_call(xml).unwrap();
        assert_eq!(to_json(&call.params()[1]).unwrap(), json!([-7, true, 1.5]));
        assert_eq!(to_json(&call.params()[2]).unwrap(), json!({"collection": "c"}));
    }

    #[test]
    fn rejects_malformed_documents() {
        assert!(parse_call("").is_err());
        assert!(parse_call("<methodCall><methodName>x</methodName>").is_err());
        assert!(parse_call("<methodResponse/>").is_err());
    }

    #[test]
    fn rejects_deeply_nested_documents() {
        let levels = 10_000;
        let xml = format!(
            "<methodCall><methodName>m</methodName><params><param>{}{}</param></params></methodCall>",
            "<value><array><data>".repeat(levels),
            "</data></array></value>".repeat(levels),
        );
        let err = parse_call(&xml).unwrap_err();
        assert!(matches!(err, XmlRpcError::Malformed(ref m) if m.contains("deeper than")), "{err}");
    }

    #[test]
    fn nesting_within_the_limit_is_accepted() {
        let levels = 10;
        let xml = format!(
            "<methodCall><methodName>m</methodName><params><param>{}<value><string>x</string></value>{}</param></params></methodCall>",
            "<value><array><data>".repeat(levels),
            "</data></array></value>".repeat(levels),
        );
        assert!(parse_call(&xml).is_ok());
    }

    #[test]
    fn responses_and_faults_round_trip_through_dxr() {
        let xml = response_to_xml(Ok(structure(vec![("status", string("PASS")), ("return", string("<a & b>"))])))
            .unwrap();
        assert!(xml.starts_with("<?xml version=\"1.0\"?>"));
        let value = parse_response(&xml).unwrap().unwrap();
        assert_eq!(to_json(&value).unwrap(), json!({"status": "PASS", "return": "<a & b>"}));

        let xml = response_to_xml(Err(Fault::new(-32601, "Unknown method 'x'".to_string()))).unwrap();
        let fault = parse_response(&xml).unwrap().unwrap_err();
        assert_eq!(fault.code(), -32601);
        assert_eq!(fault.string(), "Unknown method 'x'");
    }

    #[test]
    fn large_integers_use_i8() {
        let xml = response_to_xml(Ok(int(5_000_000_000))).unwrap();
        assert!(xml.contains("<i8>5000000000</i8>"), "{xml}");
        assert_eq!(int(12), Value::i4(12));
    }

    #[test]
    fn control_characters_travel_as_base64() {
        let xml = response_to_xml(Ok(string("a\u{1}b"))).unwrap();
        assert!(xml.contains("<base64>YQFi</base64>"), "{xml}");
    }

    #[test]
    fn converts_json_results() {
        let value = from_json(&json!({
            "none": null,
            "count": 3,
            "ratio": 0.5,
            "names": ["a", "b"],
        }));
        assert_eq!(
            to_json(&value).unwrap(),
            json!({"none": "", "count": 3, "ratio": 0.5, "names": ["a", "b"]})
        );
    }
}
