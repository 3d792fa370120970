use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};
use std::fmt;

/// Severity label attached to a finding.
///
/// The four known levels are matched case-insensitively; any other label is kept
/// as the service wrote it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum Severity {
    Information,
    Suspicious,
    Dangerous,
    Critical,
    Other(String),
}

impl From<String> for Severity {
    fn from(label: String) -> Self {
        match label.trim().to_ascii_uppercase().as_str() {
            "INFORMATION" => Severity::Information,
            "SUSPICIOUS" => Severity::Suspicious,
            "DANGEROUS" => Severity::Dangerous,
            "CRITICAL" => Severity::Critical,
            _ => Severity::Other(label),
        }
    }
}

impl From<Severity> for String {
    fn from(severity: Severity) -> Self {
        match severity {
            Severity::Other(label) => label,
            known => known.as_str().to_string(),
        }
    }
}

impl Severity {
    pub fn as_str(&self) -> &str {
        match self {
            Severity::Information => "INFORMATION",
            Severity::Suspicious => "SUSPICIOUS",
            Severity::Dangerous => "DANGEROUS",
            Severity::Critical => "CRITICAL",
            Severity::Other(label) => label,
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One observation reported by the analysis service.
///
/// Every field is optional on input. Keys outside the known set are kept in
/// `extra` and written back out unchanged.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Finding {
    #[serde(default, skip_serializing_if = "Option::is_none", deserialize_with = "lenient_text")]
    pub category: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none", deserialize_with = "lenient_severity")]
    pub severity: Option<Severity>,

    #[serde(default, skip_serializing_if = "Option::is_none", deserialize_with = "lenient_text")]
    pub description: Option<String>,

    #[serde(default, deserialize_with = "lenient_list")]
    pub ips: Vec<String>,

    /// Implicated log lines; may end with a synthetic "N more relevant log entries" element
    #[serde(default, deserialize_with = "lenient_list")]
    pub logs: Vec<String>,

    /// Time of the first implicated line, as reported (not validated)
    #[serde(default, skip_serializing_if = "Option::is_none", deserialize_with = "lenient_text")]
    pub start: Option<String>,

    #[serde(flatten)]
    pub extra: Map<String, Value>,

    /// The object exactly as the service emitted it, when the finding was parsed from one
    #[serde(skip)]
    pub raw: Option<Map<String, Value>>,
}

impl Finding {
    /// Typed view of an emitted object that also remembers the object itself.
    pub fn from_object(object: Map<String, Value>) -> Result<Self, serde_json::Error> {
        let mut finding: Finding = serde_json::from_value(Value::Object(object.clone()))?;
        finding.raw = Some(object);
        Ok(finding)
    }

    /// JSON written to the findings output: the emitted object when known.
    pub fn to_output(&self) -> Result<Value, serde_json::Error> {
        match &self.raw {
            Some(object) => Ok(Value::Object(object.clone())),
            None => serde_json::to_value(self),
        }
    }
}

fn scalar_text(value: Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(s) => Some(s),
        other => Some(other.to_string()),
    }
}

// Accepts strings, numbers and booleans; null becomes None
fn lenient_text<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(scalar_text(Value::deserialize(deserializer)?))
}

// Numbers and booleans go through their text form; arrays and objects are kept as JSON text
fn lenient_severity<'de, D>(deserializer: D) -> Result<Option<Severity>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Value::deserialize(deserializer)? {
        value @ (Value::Array(_) | Value::Object(_)) => Some(Severity::Other(value.to_string())),
        value => scalar_text(value).map(Severity::from),
    })
}

// Accepts a list, a single value, or null
fn lenient_list<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Value::deserialize(deserializer)? {
        Value::Array(items) => items.into_iter().filter_map(scalar_text).collect(),
        other => scalar_text(other).into_iter().collect(),
    })
}

/// Outcome of recovering findings from one response.
#[derive(Debug, Clone, PartialEq)]
pub enum ExtractionResult {
    /// At least one finding, in order of appearance
    Findings(Vec<Finding>),
    /// Nothing to report
    AllClear,
}
