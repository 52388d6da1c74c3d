use crate::core::AttrMap;

/// Jaccard similarity of two attribute maps, treating each key/value pair
/// as a set element. Returns a value in `[0, 1]`; two empty maps score 1.
pub fn estimate_jaccard(a: &AttrMap, b: &AttrMap) -> f64 {
    let intersection = a
        .iter()
        .filter(|(key, value)| b.get(*key) == Some(*value))
        .count();
    let union = a.len() + b.keys().filter(|key| !a.contains_key(*key)).count();

    if union == 0 {
        return 1.0;
    }
    intersection as f64 / union as f64
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::AttrValue;

    fn map(pairs: &[(&str, i64)]) -> AttrMap {
        pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), AttrValue::from(*v)))
            .collect()
    }

    #[test]
    fn test_jaccard_scenarios() {
        assert_eq!(estimate_jaccard(&AttrMap::new(), &AttrMap::new()), 1.0);
        assert_eq!(estimate_jaccard(&map(&[("a", 1), ("b", 2)]), &map(&[("a", 1), ("b", 2)])), 1.0);
        assert_eq!(estimate_jaccard(&map(&[("a", 1)]), &map(&[("b", 2)])), 0.0);
        assert_eq!(estimate_jaccard(&map(&[("a", 1), ("b", 2)]), &map(&[("a", 1), ("b", 3)])), 0.5);
    }

    #[test]
    fn test_jaccard_is_symmetric() {
        let a = map(&[("a", 1), ("b", 2), ("c", 3)]);
        let b = map(&[("a", 1), ("d", 4)]);
        assert_eq!(estimate_jaccard(&a, &b), estimate_jaccard(&b, &a));
        assert_eq!(estimate_jaccard(&a, &b), 0.25);
    }

    #[test]
    fn test_string_and_number_do_not_match() {
        let mut a = AttrMap::new();
        a.insert("code".to_string(), AttrValue::from("200"));
        let mut b = AttrMap::new();
        b.insert("code".to_string(), AttrValue::Number(200.0));
        assert_eq!(estimate_jaccard(&a, &b), 0.0);
    }
}
