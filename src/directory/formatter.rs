//! `{attribute}` templates evaluated against a roster record.

use once_cell::sync::Lazy;
use regex::{Captures, Regex};

use crate::error::SyncError;
use crate::types::AttrValue;

use super::RosterRecord;

static PLACEHOLDER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\{([^{}]+)\}").expect("placeholder pattern is valid"));

/// Builds one string from a record, e.g. `{givenName}.{familyName}@x.com`.
#[derive(Debug, Clone, Default)]
pub struct ValueFormatter {
    format: Option<String>,
    attribute_names: Vec<String>,
}

impl ValueFormatter {
    pub fn new(format: Option<&str>) -> Self {
        let attribute_names = format
            .map(|f| {
                PLACEHOLDER
                    .captures_iter(f)
                    .map(|c| c[1].to_string())
                    .collect()
            })
            .unwrap_or_default();
        ValueFormatter {
            format: format.map(str::to_string),
            attribute_names,
        }
    }

    pub fn attribute_names(&self) -> &[String] {
        &self.attribute_names
    }

    /// The formatted value, and the last attribute looked up.
    ///
    /// The value is `None` when there is no format or any placeholder has no value.
    pub fn generate_value(
        &self,
        record: &RosterRecord,
    ) -> Result<(Option<String>, Option<String>), SyncError> {
        let Some(format) = &self.format else {
            return Ok((None, None));
        };

        let mut values = Vec::with_capacity(self.attribute_names.len());
        let mut last = None;
        for name in &self.attribute_names {
            last = Some(name.clone());
            match get_attribute_value(record, name, true)? {
                Some(value) => values.push((name.as_str(), plain(&value))),
                None => return Ok((None, last)),
            }
        }

        let result = PLACEHOLDER.replace_all(format, |caps: &Captures| {
            values
                .iter()
                .find(|(name, _)| *name == &caps[1])
                .map(|(_, value)| value.clone())
                .unwrap_or_default()
        });
        Ok((Some(result.into_owned()), last))
    }
}

/// Look up `name` in `record`, treating empty values as absent.
///
/// A single-element list unwraps to its element, and so does any list when
/// `first_only` is set. Byte values are decoded as UTF-8.
pub fn get_attribute_value(
    record: &RosterRecord,
    name: &str,
    first_only: bool,
) -> Result<Option<AttrValue>, SyncError> {
    let Some(value) = record.get(name).filter(|v| !v.is_empty()) else {
        return Ok(None);
    };

    let value = match value {
        AttrValue::List(items) if first_only || items.len() == 1 => &items[0],
        AttrValue::List(items) => {
            let decoded = items
                .iter()
                .map(|item| decode(record, name, item))
                .collect::<Result<Vec<_>, _>>()?;
            return Ok(Some(AttrValue::List(decoded)));
        }
        other => other,
    };
    decode(record, name, value).map(Some)
}

fn decode(record: &RosterRecord, name: &str, value: &AttrValue) -> Result<AttrValue, SyncError> {
    match value {
        AttrValue::Bytes(bytes) => String::from_utf8(bytes.clone())
            .map(AttrValue::String)
            .map_err(|e| SyncError::AttributeFormatError {
                user: describe_record(record),
                message: format!("encoding error in value of attribute '{name}': {e}"),
            }),
        other => Ok(other.clone()),
    }
}

/// A value rendered into a template: strings verbatim, everything else displayed.
pub(crate) fn plain(value: &AttrValue) -> String {
    match value {
        AttrValue::String(s) => s.clone(),
        other => other.to_string(),
    }
}

pub(crate) fn describe_record(record: &RosterRecord) -> String {
    ["email", "sourcedId", "username"]
        .iter()
        .find_map(|k| record.get(*k).and_then(AttrValue::as_str))
        .unwrap_or("<unknown>")
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    fn record() -> RosterRecord {
        serde_json::from_str(
            r#"{
                "sourcedId": "18125",
                "username": "billy.flores",
                "givenName": "BILLY",
                "familyName": "FLORES",
                "email": "billy.flores@x.com",
                "sms": null,
                "phone": {"home": "111-111-1111", "work": "222-222-2222"},
                "agents": ["1", "2"],
                "orgs": [{"sourcedId": "2", "type": "org"}],
                "grades": ["15", ["11", "12"], "14"],
                "password": ""
            }"#,
        )
        .unwrap()
    }

    #[test]
    fn test_generate_value() {
        let formatter = ValueFormatter::new(Some("{givenName}.{familyName}@xxx.com"));
        assert_eq!(formatter.attribute_names(), ["givenName", "familyName"]);
        let (value, last) = formatter.generate_value(&record()).unwrap();
        assert_eq!(value.as_deref(), Some("BILLY.FLORES@xxx.com"));
        assert_eq!(last.as_deref(), Some("familyName"));
    }

    #[test]
    fn test_generate_value_missing_attribute() {
        let formatter = ValueFormatter::new(Some("{givenName} {countryCode}"));
        let (value, last) = formatter.generate_value(&record()).unwrap();
        assert_eq!(value, None);
        assert_eq!(last.as_deref(), Some("countryCode"));
    }

    #[test]
    fn test_unset_format() {
        let formatter = ValueFormatter::new(None);
        assert_eq!(formatter.generate_value(&record()).unwrap(), (None, None));
    }

    #[test]
    fn test_get_attribute_value() {
        let record = record();
        let get = |name| get_attribute_value(&record, name, false).unwrap();

        assert_eq!(get("username"), Some(AttrValue::from("billy.flores")));
        assert_eq!(
            get("agents"),
            Some(AttrValue::List(vec!["1".into(), "2".into()]))
        );
        assert!(matches!(get("phone"), Some(AttrValue::Map(m)) if m.len() == 2));
        assert!(matches!(get("orgs"), Some(AttrValue::Map(m)) if m["sourcedId"] == AttrValue::from("2")));
        assert!(matches!(get("grades"), Some(AttrValue::List(items)) if items.len() == 3));
        assert_eq!(get("sms"), None);
        assert_eq!(get("password"), None);
        assert_eq!(get("missing"), None);
    }

    #[test]
    fn test_first_only() {
        assert_eq!(
            get_attribute_value(&record(), "agents", true).unwrap(),
            Some(AttrValue::from("1"))
        );
    }

    #[test]
    fn test_bytes_are_decoded() {
        let record = BTreeMap::from([
            ("byte".to_string(), AttrValue::Bytes(b"byteencoded".to_vec())),
            ("bad".to_string(), AttrValue::Bytes(vec![0xff, 0xfe])),
        ]);
        assert_eq!(
            get_attribute_value(&record, "byte", false).unwrap(),
            Some(AttrValue::from("byteencoded"))
        );
        assert!(matches!(
            get_attribute_value(&record, "bad", false),
            Err(SyncError::AttributeFormatError { .. })
        ));
    }
}
