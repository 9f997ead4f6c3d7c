use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// Index options, replaced wholesale on every configure call.
///
/// Recognized keys are `max_results` and `dimensions`; both are advisory and
/// stored as given. Unknown keys are kept verbatim.
pub type IndexConfig = serde_json::Map<String, serde_json::Value>;

/// Bytes counted per vector component in [`Document::size_estimate`].
const VECTOR_COMPONENT_SIZE: usize = std::mem::size_of::<f64>();

/// A stored unit of searchable content.
///
/// # Examples
///
/// ```
/// use bitscout::Document;
///
/// let doc = Document::new("1", "hello world", "notes/hello.md")
///     .with_meta("fileExtension", "md")
///     .with_vector(vec![0.5, 0.25]);
///
/// assert_eq!(doc.meta["fileExtension"], "md");
/// assert_eq!(doc.size_estimate(), 1 + 11 + 14 + 13 + 2 + 16);
/// ```
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Document {
    pub id: String,
    pub text: String,
    /// Where the document came from, e.g. a file path or URL.
    pub source: String,
    /// Non-finite components are written as `"NaN"`, `"inf"` or `"-inf"`
    /// so they survive a JSON round trip.
    #[serde(default, with = "vector_codec")]
    pub vector: Vec<f64>,
    #[serde(default)]
    pub meta: HashMap<String, String>,
}

impl Document {
    pub fn new(
        id: impl Into<String>,
        text: impl Into<String>,
        source: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            text: text.into(),
            source: source.into(),
            ..Self::default()
        }
    }

    pub fn with_meta(
        mut self,
        key: impl Into<String>,
        value: impl Into<String>,
    ) -> Self {
        self.meta.insert(key.into(), value.into());
        self
    }

    pub fn with_vector(mut self, vector: Vec<f64>) -> Self {
        self.vector = vector;
        self
    }

    /// Approximate in-memory footprint in bytes.
    pub fn size_estimate(&self) -> usize {
        let meta: usize =
            self.meta.iter().map(|(k, v)| k.len() + v.len()).sum();
        self.id.len()
            + self.text.len()
            + self.source.len()
            + meta
            + self.vector.len() * VECTOR_COMPONENT_SIZE
    }
}

mod vector_codec {
    use serde::{Deserialize, Deserializer, Serialize, Serializer, de};

    #[derive(Serialize, Deserialize)]
    #[serde(untagged)]
    enum Component {
        Finite(f64),
        Special(String),
    }

    pub fn serialize<S: Serializer>(
        vector: &[f64],
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        serializer.collect_seq(vector.iter().map(|&x| {
            if x.is_finite() {
                Component::Finite(x)
            } else if x.is_nan() {
                Component::Special("NaN".into())
            } else if x > 0.0 {
                Component::Special("inf".into())
            } else {
                Component::Special("-inf".into())
            }
        }))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Vec<f64>, D::Error> {
        Vec::<Component>::deserialize(deserializer)?
            .into_iter()
            .map(|c| match c {
                Component::Finite(x) => Ok(x),
                Component::Special(s) => match s.as_str() {
                    "NaN" => Ok(f64::NAN),
                    "inf" => Ok(f64::INFINITY),
                    "-inf" => Ok(f64::NEG_INFINITY),
                    other => Err(de::Error::custom(format!(
                        "invalid vector component '{other}'"
                    ))),
                },
            })
            .collect()
    }
}
