use super::Value;
use chrono::{DateTime, Utc};
use std::collections::BTreeMap;

/// Field name to value mapping, used for payloads and fetched rows alike.
pub type Row = BTreeMap<String, Value>;

pub const SQL_DATETIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Builds a [`Row`] from `field => value` pairs.
#[macro_export]
macro_rules! row {
    () => {
        $crate::core::Row::new()
    };
    ($($field:expr => $value:expr),+ $(,)?) => {{
        let mut row = $crate::core::Row::new();
        $(
            row.insert(::std::string::String::from($field), $crate::core::Value::from($value));
        )+
        row
    }};
}

/// An identifier is a positive integer or a non-empty text key.
pub fn is_valid_id(value: &Value) -> bool {
    match value {
        Value::Integer(i) => *i > 0,
        Value::Text(s) => !s.trim().is_empty(),
        _ => false,
    }
}

pub fn sql_datetime(time: DateTime<Utc>) -> String {
    time.format(SQL_DATETIME_FORMAT).to_string()
}

/// Keeps only the entries of `row` whose key is listed in `keys`.
pub fn filter_by_keys<S: AsRef<str>>(row: &Row, keys: &[S]) -> Row {
    keys.iter()
        .filter_map(|key| {
            row.get_key_value(key.as_ref())
                .map(|(k, v)| (k.clone(), v.clone()))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_valid_ids() {
        assert!(is_valid_id(&Value::Integer(1)));
        assert!(is_valid_id(&Value::Text("abc".into())));
        assert!(!is_valid_id(&Value::Integer(0)));
        assert!(!is_valid_id(&Value::Integer(-4)));
        assert!(!is_valid_id(&Value::Text("  ".into())));
        assert!(!is_valid_id(&Value::Null));
        assert!(!is_valid_id(&Value::Boolean(true)));
    }

    #[test]
    fn test_row_macro_and_filter() {
        let row = crate::row! { "a" => 1, "b" => "two", "c" => true };
        let filtered = filter_by_keys(&row, &["a", "c", "missing"]);
        assert_eq!(filtered.len(), 2);
        assert_eq!(filtered["a"], Value::Integer(1));
        assert!(!filtered.contains_key("b"));
    }

    #[test]
    fn test_sql_datetime() {
        let time = Utc.with_ymd_and_hms(2024, 3, 9, 7, 5, 1).unwrap();
        assert_eq!(sql_datetime(time), "2024-03-09 07:05:01");
    }
}
