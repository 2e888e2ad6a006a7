//! Parameter normalization.
//!
//! Converts the heterogeneous parameter map of an outgoing call into
//! wire-ready form: scalars stringified, nested structures JSON-encoded,
//! file references routed to multipart encoding.

use std::path::{Path, PathBuf};

use serde_json::Value;

/// A file attachment: either a path on the local filesystem (read at
/// send time, so retries re-open it) or named in-memory bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InputFile {
    Path(PathBuf),
    Memory { file_name: String, bytes: Vec<u8> },
}

impl InputFile {
    /// File name used for the multipart part.
    pub fn file_name(&self) -> String {
        match self {
            InputFile::Path(path) => path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_else(|| "file".to_string()),
            InputFile::Memory { file_name, .. } => file_name.clone(),
        }
    }
}

/// One parameter value of an outgoing call.
#[derive(Debug, Clone, PartialEq)]
pub enum ParamValue {
    Text(String),
    Int(i64),
    Float(f64),
    Bool(bool),
    /// Nested structure, JSON-encoded before transmission.
    Json(Value),
    File(InputFile),
}

impl From<&str> for ParamValue {
    fn from(value: &str) -> Self {
        ParamValue::Text(value.to_string())
    }
}

impl From<String> for ParamValue {
    fn from(value: String) -> Self {
        ParamValue::Text(value)
    }
}

impl From<i64> for ParamValue {
    fn from(value: i64) -> Self {
        ParamValue::Int(value)
    }
}

impl From<i32> for ParamValue {
    fn from(value: i32) -> Self {
        ParamValue::Int(value as i64)
    }
}

impl From<f64> for ParamValue {
    fn from(value: f64) -> Self {
        ParamValue::Float(value)
    }
}

impl From<bool> for ParamValue {
    fn from(value: bool) -> Self {
        ParamValue::Bool(value)
    }
}

impl From<Value> for ParamValue {
    fn from(value: Value) -> Self {
        ParamValue::Json(value)
    }
}

impl From<InputFile> for ParamValue {
    fn from(value: InputFile) -> Self {
        ParamValue::File(value)
    }
}

/// Ordered parameter map of an outgoing call.
///
/// Created per invocation, consumed by the dispatch engine, discarded
/// after the call completes or exhausts retries.
#[derive(Debug, Clone, Default)]
pub struct Params {
    entries: Vec<(String, ParamValue)>,
}

impl Params {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a parameter (builder style).
    #[must_use]
    pub fn with(mut self, key: impl Into<String>, value: impl Into<ParamValue>) -> Self {
        self.insert(key, value);
        self
    }

    /// Add a parameter in place.
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<ParamValue>) {
        self.entries.push((key.into(), value.into()));
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }
}

/// One field of a multipart payload.
#[derive(Debug, Clone, PartialEq)]
pub enum WireField {
    Text(String),
    File(InputFile),
}

/// The wire-ready body of an outgoing call.
///
/// Form encoding carries only stringified fields; the presence of any
/// file reference forces the whole payload to multipart, with every
/// other parameter re-serialized as a multipart field.
#[derive(Debug, Clone, PartialEq)]
pub enum WirePayload {
    Form(Vec<(String, String)>),
    Multipart(Vec<(String, WireField)>),
}

impl WirePayload {
    pub fn is_multipart(&self) -> bool {
        matches!(self, WirePayload::Multipart(_))
    }

    /// Form pairs view, used when a call goes out as a GET query string.
    pub fn form_pairs(&self) -> Option<&[(String, String)]> {
        match self {
            WirePayload::Form(pairs) => Some(pairs),
            WirePayload::Multipart(_) => None,
        }
    }
}

/// Stringify a scalar or JSON-encode a nested value.
fn stringify(value: &ParamValue) -> String {
    match value {
        ParamValue::Text(text) => text.clone(),
        ParamValue::Int(number) => number.to_string(),
        ParamValue::Float(number) => number.to_string(),
        ParamValue::Bool(flag) => flag.to_string(),
        // Nested structures travel as their JSON encoding.
        ParamValue::Json(json) => json.to_string(),
        ParamValue::File(_) => unreachable!("files are handled by the multipart path"),
    }
}

/// Whether a text parameter names a readable file on the local
/// filesystem, which promotes it to an upload.
fn is_local_file(text: &str) -> bool {
    let path = Path::new(text);
    path.is_file() && std::fs::File::open(path).is_ok()
}

/// Normalize a parameter map into its wire-ready payload.
///
/// Any file reference (explicit [`InputFile`] or a text value naming a
/// readable local path) switches the entire request to multipart.
pub fn normalize(params: Params) -> WirePayload {
    let has_files = params.entries.iter().any(|(_, value)| match value {
        ParamValue::File(_) => true,
        ParamValue::Text(text) => is_local_file(text),
        _ => false,
    });

    if !has_files {
        let pairs = params
            .entries
            .iter()
            .map(|(key, value)| (key.clone(), stringify(value)))
            .collect();
        return WirePayload::Form(pairs);
    }

    let fields = params
        .entries
        .into_iter()
        .map(|(key, value)| {
            let field = match value {
                ParamValue::File(file) => WireField::File(file),
                ParamValue::Text(text) if is_local_file(&text) => {
                    WireField::File(InputFile::Path(PathBuf::from(text)))
                }
                other => WireField::Text(stringify(&other)),
            };
            (key, field)
        })
        .collect();

    WirePayload::Multipart(fields)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::io::Write;

    #[test]
    fn test_scalar_params_form_encode() {
        let params = Params::new()
            .with("chat_id", 7_i64)
            .with("text", "hello")
            .with("disable_notification", true);

        let payload = normalize(params);
        assert!(!payload.is_multipart());
        assert_eq!(
            payload.form_pairs().unwrap(),
            &[
                ("chat_id".to_string(), "7".to_string()),
                ("text".to_string(), "hello".to_string()),
                ("disable_notification".to_string(), "true".to_string()),
            ]
        );
    }

    #[test]
    fn test_nested_params_json_encode() {
        let params = Params::new().with(
            "reply_markup",
            json!({"inline_keyboard": [[{"text": "Go", "callback_data": "go"}]]}),
        );

        let WirePayload::Form(pairs) = normalize(params) else {
            panic!("expected form payload");
        };
        let decoded: Value = serde_json::from_str(&pairs[0].1).unwrap();
        assert_eq!(decoded["inline_keyboard"][0][0]["text"], "Go");
    }

    #[test]
    fn test_file_param_forces_multipart() {
        let params = Params::new().with("chat_id", 7_i64).with(
            "document",
            InputFile::Memory {
                file_name: "report.txt".to_string(),
                bytes: b"contents".to_vec(),
            },
        );

        let WirePayload::Multipart(fields) = normalize(params) else {
            panic!("expected multipart payload");
        };
        assert_eq!(fields.len(), 2);
        assert_eq!(fields[0].1, WireField::Text("7".to_string()));
        assert!(matches!(fields[1].1, WireField::File(_)));
    }

    #[test]
    fn test_readable_path_is_promoted_to_upload() {
        let mut tmp = tempfile::NamedTempFile::new().unwrap();
        tmp.write_all(b"photo bytes").unwrap();
        let path = tmp.path().to_string_lossy().into_owned();

        let params = Params::new()
            .with("chat_id", 7_i64)
            .with("photo", path.as_str());

        let WirePayload::Multipart(fields) = normalize(params) else {
            panic!("expected multipart payload");
        };
        assert_eq!(
            fields[1].1,
            WireField::File(InputFile::Path(PathBuf::from(&path)))
        );
    }

    #[test]
    fn test_nonexistent_path_stays_text() {
        let params = Params::new().with("photo", "/no/such/file.png");

        let payload = normalize(params);
        assert!(!payload.is_multipart());
    }
}
