//! Declarative construction of field maps.

/// Build a [`FieldMap`](crate::entity::FieldMap) from `name => value` pairs.
///
/// Values may be anything convertible into a
/// [`FieldValue`](crate::entity::FieldValue).
///
/// # Example
///
/// ```ignore
/// let fields = fields! {
///     "name" => "Alice",
///     "age" => 30,
///     "email" => None::<String>,
/// };
/// ```
#[macro_export]
macro_rules! fields {
    () => {
        $crate::entity::FieldMap::new()
    };
    ( $( $name:expr => $value:expr ),+ $(,)? ) => {{
        let mut map = $crate::entity::FieldMap::new();
        $(
            map.insert(($name).to_string(), $crate::entity::FieldValue::from($value));
        )+
        map
    }};
}

#[cfg(test)]
mod tests {
    use crate::entity::FieldValue;

    #[test]
    fn test_fields_macro_empty() {
        let map = fields! {};
        assert!(map.is_empty());
    }

    #[test]
    fn test_fields_macro_mixed_values() {
        let map = fields! {
            "name" => "Ada",
            "age" => 36,
            "score" => 9.5,
            "nickname" => None::<String>,
        };
        assert_eq!(map.len(), 4);
        assert_eq!(map["name"], FieldValue::Text("Ada".to_string()));
        assert_eq!(map["age"], FieldValue::Int(36));
        assert_eq!(map["score"], FieldValue::Float(9.5));
        assert_eq!(map["nickname"], FieldValue::Null);
    }
}
