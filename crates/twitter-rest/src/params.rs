//! Request parameters.

use bytes::Bytes;

/// A binary upload sent as a multipart part.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Media {
    /// File name reported in the part's content disposition
    pub file_name: String,
    /// MIME type of the payload
    pub content_type: String,
    /// Raw bytes
    pub data: Bytes,
}

impl Media {
    #[must_use]
    pub fn new(
        file_name: impl Into<String>,
        content_type: impl Into<String>,
        data: impl Into<Bytes>,
    ) -> Self {
        Self {
            file_name: file_name.into(),
            content_type: content_type.into(),
            data: data.into(),
        }
    }
}

/// A single parameter value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParamValue {
    Text(String),
    Media(Media),
}

impl ParamValue {
    #[must_use]
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(text) => Some(text),
            Self::Media(_) => None,
        }
    }

    #[must_use]
    pub const fn is_media(&self) -> bool {
        matches!(self, Self::Media(_))
    }
}

impl From<&str> for ParamValue {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

impl From<String> for ParamValue {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

impl From<bool> for ParamValue {
    fn from(value: bool) -> Self {
        Self::Text(value.to_string())
    }
}

impl From<u64> for ParamValue {
    fn from(value: u64) -> Self {
        Self::Text(value.to_string())
    }
}

impl From<i64> for ParamValue {
    fn from(value: i64) -> Self {
        Self::Text(value.to_string())
    }
}

impl From<Media> for ParamValue {
    fn from(value: Media) -> Self {
        Self::Media(value)
    }
}

/// Ordered request parameters.
///
/// Each spawned unit of a batch gets its own clone; media payloads are
/// reference counted so cloning is cheap.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Params(Vec<(String, ParamValue)>);

impl Params {
    #[must_use]
    pub const fn new() -> Self {
        Self(Vec::new())
    }

    /// Builder-style insert.
    #[must_use]
    pub fn with(mut self, name: impl Into<String>, value: impl Into<ParamValue>) -> Self {
        self.insert(name, value);
        self
    }

    /// Set `name`, replacing any earlier value.
    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<ParamValue>) {
        let name = name.into();
        let value = value.into();
        match self.0.iter_mut().find(|(existing, _)| *existing == name) {
            Some((_, slot)) => *slot = value,
            None => self.0.push((name, value)),
        }
    }

    #[must_use]
    pub fn get(&self, name: &str) -> Option<&ParamValue> {
        self.0.iter().find(|(n, _)| n == name).map(|(_, v)| v)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &ParamValue)> {
        self.0.iter().map(|(n, v)| (n.as_str(), v))
    }

    /// True when any value is a binary upload, which forces a multipart body.
    #[must_use]
    pub fn has_media(&self) -> bool {
        self.0.iter().any(|(_, v)| v.is_media())
    }

    /// The text-valued pairs, used for query strings, form bodies and
    /// OAuth signature bases.
    #[must_use]
    pub fn text_pairs(&self) -> Vec<(String, String)> {
        self.0
            .iter()
            .filter_map(|(n, v)| v.as_text().map(|t| (n.clone(), t.to_string())))
            .collect()
    }
}

impl<K, V> FromIterator<(K, V)> for Params
where
    K: Into<String>,
    V: Into<ParamValue>,
{
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut params = Self::new();
        for (name, value) in iter {
            params.insert(name, value);
        }
        params
    }
}

impl IntoIterator for Params {
    type Item = (String, ParamValue);
    type IntoIter = std::vec::IntoIter<(String, ParamValue)>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}
