use std::collections::BTreeMap;
use std::fmt;

use serde::Serialize;

use crate::error::ParseError;

/// A single `name=value` entry of a view node.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Property {
    pub name: String,
    pub value: String,
}

impl Property {
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
        }
    }

    /// Namespace prefix of the property name (`layout` for `layout:mLeft`).
    pub fn category(&self) -> Option<&str> {
        self.name.split_once(':').map(|(category, _)| category)
    }
}

impl fmt::Display for Property {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}={}", self.name, self.value)
    }
}

/// Decodes a blob of `name=length,value` triples.
///
/// The declared length is counted in UTF-16 code units, which is how the
/// device side measures strings. A single space between the end of a value
/// and the next name is tolerated. Later duplicates of a name replace earlier
/// ones, and the result is sorted by name.
pub fn decode_properties(blob: &str) -> Result<Vec<Property>, ParseError> {
    let data = blob.trim_start();
    let mut decoded = BTreeMap::new();
    let mut start = 0;

    while start < data.len() {
        let rest = &data[start..];
        if rest.trim().is_empty() {
            break;
        }
        let eq = rest
            .find('=')
            .ok_or(ParseError::MalformedProperty { offset: start })?;
        let name = &rest[..eq];
        if name.is_empty() {
            return Err(ParseError::MalformedProperty { offset: start });
        }

        let after_eq = &rest[eq + 1..];
        let comma = after_eq
            .find(',')
            .ok_or(ParseError::MalformedProperty { offset: start + eq })?;
        let length: usize = after_eq[..comma].parse().map_err(|_| ParseError::InvalidLength {
            offset: start + eq + 1,
        })?;

        let value_start = start + eq + 1 + comma + 1;
        let value_end =
            advance_utf16(data, value_start, length).ok_or_else(|| ParseError::ValueOutOfBounds {
                name: name.to_string(),
                length,
            })?;

        decoded.insert(name.to_string(), data[value_start..value_end].to_string());

        start = value_end;
        if data[start..].starts_with(' ') {
            start += 1;
        }
    }

    Ok(decoded
        .into_iter()
        .map(|(name, value)| Property { name, value })
        .collect())
}

/// Returns the byte offset reached after `units` UTF-16 code units from `from`.
fn advance_utf16(data: &str, from: usize, units: usize) -> Option<usize> {
    if units == 0 {
        return (from <= data.len()).then_some(from);
    }
    let mut consumed = 0;
    for (offset, ch) in data.get(from..)?.char_indices() {
        consumed += ch.len_utf16();
        if consumed == units {
            return Some(from + offset + ch.len_utf8());
        }
        if consumed > units {
            return None;
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    fn as_pairs(properties: &[Property]) -> Vec<(&str, &str)> {
        properties
            .iter()
            .map(|p| (p.name.as_str(), p.value.as_str()))
            .collect()
    }

    #[test]
    fn test_decode_single_property() {
        let properties = decode_properties("name=3,abc").unwrap();
        assert_eq!(as_pairs(&properties), vec![("name", "abc")]);
    }

    #[test]
    fn test_decode_concatenated_without_separator() {
        let properties = decode_properties("a=1,xb=2,yz").unwrap();
        assert_eq!(as_pairs(&properties), vec![("a", "x"), ("b", "yz")]);
    }

    #[test]
    fn test_decode_space_separated() {
        let properties = decode_properties("a=1,x b=2,yz").unwrap();
        assert_eq!(as_pairs(&properties), vec![("a", "x"), ("b", "yz")]);
    }

    #[test]
    fn test_value_may_contain_delimiters() {
        let properties = decode_properties("text:mText=9,a=b,c d=e mID=5,NO_ID").unwrap();
        assert_eq!(
            as_pairs(&properties),
            vec![("mID", "NO_ID"), ("text:mText", "a=b,c d=e")]
        );
    }

    #[test]
    fn test_properties_sorted_by_name() {
        let properties = decode_properties("mTop=1,0 mLeft=2,10 getWidth()=3,100").unwrap();
        let names: Vec<_> = properties.iter().map(|p| p.name.as_str()).collect();
        assert_eq!(names, vec!["getWidth()", "mLeft", "mTop"]);
    }

    #[test]
    fn test_empty_value() {
        let properties = decode_properties("mText=0, mID=5,NO_ID").unwrap();
        assert_eq!(as_pairs(&properties), vec![("mID", "NO_ID"), ("mText", "")]);
    }

    #[test]
    fn test_length_counts_utf16_units() {
        let properties = decode_properties("mText=3,héé mID=5,NO_ID").unwrap();
        assert_eq!(as_pairs(&properties), vec![("mID", "NO_ID"), ("mText", "héé")]);
    }

    #[test]
    fn test_empty_blob_yields_no_properties() {
        assert!(decode_properties("").unwrap().is_empty());
        assert!(decode_properties("   ").unwrap().is_empty());
    }

    #[test]
    fn test_missing_equals_is_malformed() {
        assert_eq!(
            decode_properties("mID"),
            Err(ParseError::MalformedProperty { offset: 0 })
        );
    }

    #[test]
    fn test_non_numeric_length_rejected() {
        assert!(matches!(
            decode_properties("mID=x,NO_ID"),
            Err(ParseError::InvalidLength { .. })
        ));
    }

    #[test]
    fn test_length_past_end_rejected() {
        assert_eq!(
            decode_properties("mID=10,NO_ID"),
            Err(ParseError::ValueOutOfBounds {
                name: "mID".to_string(),
                length: 10
            })
        );
    }

    #[test]
    fn test_property_category() {
        assert_eq!(Property::new("layout:mLeft", "0").category(), Some("layout"));
        assert_eq!(Property::new("mLeft", "0").category(), None);
        assert_eq!(Property::new("mLeft", "0").to_string(), "mLeft=0");
    }

    mod proptests {
        use super::*;
        use proptest::prelude::*;

        fn encode(properties: &[(String, String)]) -> String {
            properties
                .iter()
                .map(|(name, value)| format!("{}={},{}", name, value.encode_utf16().count(), value))
                .collect::<Vec<_>>()
                .join(" ")
        }

        proptest! {
            #[test]
            fn decoding_recovers_encoded_values(
                entries in prop::collection::btree_map("[a-zA-Z:()_]{1,12}", "[ -~é]{0,20}", 0..8)
            ) {
                let entries: Vec<(String, String)> = entries.into_iter().collect();
                let decoded = decode_properties(&encode(&entries)).unwrap();
                let decoded: Vec<(String, String)> =
                    decoded.into_iter().map(|p| (p.name, p.value)).collect();
                prop_assert_eq!(decoded, entries);
            }
        }
    }
}
