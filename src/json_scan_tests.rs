//! Tests for span-based JSON field extraction

#[cfg(test)]
mod tests {
    use crate::json_scan::*;

    /// Encodes `s` as a JSON string literal, escaping everything outside
    /// printable ASCII as `\uXXXX` (surrogate pairs above the BMP).
    fn encode(s: &str) -> String {
        let mut out = String::from("\"");
        for c in s.chars() {
            match c {
                '"' => out.push_str("\\\""),
                '\\' => out.push_str("\\\\"),
                '\n' => out.push_str("\\n"),
                '\t' => out.push_str("\\t"),
                ' '..='~' => out.push(c),
                _ => {
                    let mut units = [0u16; 2];
                    for unit in c.encode_utf16(&mut units) {
                        out.push_str(&format!("\\u{:04X}", unit));
                    }
                }
            }
        }
        out.push('"');
        out
    }

    #[test]
    fn test_find_key_top_level_only() {
        let obj = r#"{"meta": {"id": 9}, "note": "\"id\": 3", "id": 5}"#;
        let pos = find_key(obj, "id").unwrap();
        assert_eq!(&obj[pos..pos + 4], "\"id\"");
        assert_eq!(extract_int(obj, "id"), Some(5));
        assert_eq!(find_key(obj, "missing"), None);
    }

    #[test]
    fn test_find_key_ignores_matching_values() {
        let obj = r#"{"name": "title", "title": "News"}"#;
        assert_eq!(extract_string(obj, "title").as_deref(), Some("News"));
    }

    #[test]
    fn test_extract_int_bare_and_quoted() {
        assert_eq!(extract_int(r#"{"a": 42}"#, "a"), Some(42));
        assert_eq!(extract_int(r#"{"a": "42"}"#, "a"), Some(42));
        assert_eq!(extract_int(r#"{"a":-7}"#, "a"), Some(-7));
        assert_eq!(extract_int(r#"{"a": "-7"}"#, "a"), Some(-7));
    }

    #[test]
    fn test_extract_int_rejects_non_digits() {
        assert_eq!(extract_int(r#"{"a": "abc"}"#, "a"), None);
        assert_eq!(extract_int(r#"{"a": null}"#, "a"), None);
        assert_eq!(extract_int(r#"{"a": ""}"#, "a"), None);
        assert_eq!(extract_int(r#"{"a": 99999999999999999999999}"#, "a"), None);
    }

    #[test]
    fn test_extract_bool_forms() {
        let obj = r#"{"a": true, "b": false, "c": 1, "d": 0, "e": "yes"}"#;
        assert_eq!(extract_bool(obj, "a"), Some(true));
        assert_eq!(extract_bool(obj, "b"), Some(false));
        assert_eq!(extract_bool(obj, "c"), Some(true));
        assert_eq!(extract_bool(obj, "d"), Some(false));
        assert_eq!(extract_bool(obj, "e"), None);
        assert_eq!(extract_bool(obj, "f"), None);
    }

    #[test]
    fn test_extract_string_escapes() {
        let obj = r#"{"s": "a\"b\\c\/d\be\ff\ng\rh\ti"}"#;
        assert_eq!(
            extract_string(obj, "s").as_deref(),
            Some("a\"b\\c/d\u{08}e\u{0C}f\ng\rh\ti")
        );
    }

    #[test]
    fn test_extract_string_surrogate_pair() {
        let obj = r#"{"s": "TV 📺 on"}"#;
        assert_eq!(extract_string(obj, "s").as_deref(), Some("TV \u{1F4FA} on"));
    }

    #[test]
    fn test_extract_string_lone_surrogates() {
        let obj = r#"{"hi": "x\uD83Dy", "lo": "x\uDCFAy"}"#;
        assert_eq!(extract_string(obj, "hi").as_deref(), Some("x\u{FFFD}y"));
        assert_eq!(extract_string(obj, "lo").as_deref(), Some("x\u{FFFD}y"));
    }

    #[test]
    fn test_extract_string_malformed_escapes_kept() {
        let obj = r#"{"s": "\u12G4 \q"}"#;
        assert_eq!(extract_string(obj, "s").as_deref(), Some("u12G4 q"));
    }

    #[test]
    fn test_extract_string_keeps_utf8() {
        let obj = r#"{"name": "Télé Ñews 東京"}"#;
        assert_eq!(extract_string(obj, "name").as_deref(), Some("Télé Ñews 東京"));
    }

    #[test]
    fn test_extract_string_non_string_value() {
        assert_eq!(extract_string(r#"{"s": 12}"#, "s"), None);
        assert_eq!(extract_string(r#"{"s": "open"#, "s"), None);
    }

    #[test]
    fn test_extract_string_round_trip() {
        let samples = [
            "plain",
            "quote \" and backslash \\",
            "line\nbreak\ttab",
            "accents éàü and CJK 東京",
            "emoji 📺🎬 outside the BMP",
            "",
        ];
        for original in samples {
            let obj = format!("{{\"k\": {}}}", encode(original));
            assert_eq!(extract_string(&obj, "k").as_deref(), Some(original), "{}", obj);
        }
    }

    #[test]
    fn test_extract_raw_nested() {
        let obj = r#"{"id": 1, "custom_properties": {"program": {"title": "a } b", "x": [1, {"y": "]"}]}}, "z": 2}"#;
        let props = extract_raw(obj, "custom_properties").unwrap();
        assert_eq!(
            props,
            r#"{"program": {"title": "a } b", "x": [1, {"y": "]"}]}}"#
        );
        let program = extract_raw(props, "program").unwrap();
        assert_eq!(extract_string(program, "title").as_deref(), Some("a } b"));
    }

    #[test]
    fn test_extract_raw_array_and_scalars() {
        let obj = r#"{"rules": [{"a": 1}, {"a": 2}], "n": 3}"#;
        assert_eq!(extract_raw(obj, "rules"), Some(r#"[{"a": 1}, {"a": 2}]"#));
        assert_eq!(extract_raw(obj, "n"), None);
        assert_eq!(extract_raw(r#"{"rules": [1, 2"#, "rules"), None);
    }

    #[test]
    fn test_for_each_object_counts() {
        let json = r#"  [{"stream_id": 1, "name": "A {x}"}, {"stream_id": "2", "nested": {"a": [1,2]}}, {"stream_id": 3}]"#;
        let mut ids = Vec::new();
        let ok = for_each_object(json, |obj| ids.push(extract_int(obj, "stream_id").unwrap()));
        assert!(ok);
        assert_eq!(ids, vec![1, 2, 3]);
    }

    #[test]
    fn test_for_each_object_generated_array() {
        let n = 500;
        let json = format!(
            "[{}]",
            (1..=n)
                .map(|i| format!(r#"{{"id": {}, "name": "ch \"{}\" \\ }}"}}"#, i, i))
                .collect::<Vec<_>>()
                .join(",")
        );
        let mut count = 0;
        let mut sum = 0;
        assert!(for_each_object(&json, |obj| {
            count += 1;
            sum += extract_int(obj, "id").unwrap();
            assert!(extract_string(obj, "name").unwrap().ends_with("\\ }"));
        }));
        assert_eq!(count, n);
        assert_eq!(sum, n * (n + 1) / 2);
    }

    #[test]
    fn test_for_each_object_empty_vs_not_array() {
        let mut calls = 0;
        assert!(for_each_object("[]", |_| calls += 1));
        assert!(for_each_object(" \n[ ]", |_| calls += 1));
        assert_eq!(calls, 0);

        assert!(!for_each_object(r#"{"user_info": {}}"#, |_| calls += 1));
        assert!(!for_each_object("", |_| calls += 1));
        assert!(!for_each_object("<html>", |_| calls += 1));
        assert_eq!(calls, 0);
    }

    #[test]
    fn test_for_each_object_stops_at_array_end() {
        let mut calls = 0;
        assert!(for_each_object(r#"[{"a":1}] {"b":2}"#, |_| calls += 1));
        assert_eq!(calls, 1);
    }
}
