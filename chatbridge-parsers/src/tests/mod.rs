use chatbridge_types::LlmError;
use schemars::JsonSchema;
use serde::Deserialize;
use serde_json::{Value, json};

use crate::{
    ObjectSchema, ResponseParser, ToolCallAccumulator, ToolCallDelta, parse_partial_json,
    strip_code_fence,
};

#[derive(Debug, Deserialize, JsonSchema, PartialEq)]
struct Itinerary {
    city: String,
    days: u32,
    budget: Option<f64>,
    stops: Vec<Stop>,
}

#[derive(Debug, Deserialize, JsonSchema, PartialEq)]
struct Stop {
    name: String,
    indoor: bool,
}

fn documents() -> Vec<Value> {
    vec![
        json!({
            "city": "Kyoto",
            "days": 3,
            "budget": 1200.5,
            "stops": [
                {"name": "Fushimi Inari", "indoor": false},
                {"name": "Nishiki \"Market\"", "indoor": true}
            ]
        }),
        json!({"city": "Reykjavík", "days": 1, "budget": null, "stops": []}),
        json!([1, -2.5e3, "two\nlines", [true, false, null], {"k": {}}]),
        json!({"escaped": "tab\there \\ slash \u{263a}", "n": 0}),
        json!({"path": "C:\\users\\me", "code": "```rust\nfn main() {}\n```"}),
    ]
}

#[derive(Debug, Deserialize, JsonSchema, PartialEq)]
struct Snippet {
    path: String,
    code: String,
}

#[test]
fn test_every_prefix_parses_without_error() {
    for doc in documents() {
        for text in [
            serde_json::to_string(&doc).unwrap(),
            serde_json::to_string_pretty(&doc).unwrap(),
        ] {
            let fenced = format!("```json\n{}\n```", text);
            for source in [&text, &fenced] {
                for (end, _) in source.char_indices() {
                    let prefix = &source[..end];
                    let partial = parse_partial_json(prefix);
                    if let Some(value) = &partial {
                        assert!(
                            value.is_object() || value.is_array() || end == 0,
                            "prefix {prefix:?} produced a scalar {value:?}"
                        );
                    }
                }
                assert_eq!(parse_partial_json(source), Some(doc.clone()));
            }
        }
    }
}

#[test]
fn test_parse_partial_placeholder_for_every_prefix() {
    let parser: ResponseParser<Itinerary> = ResponseParser::for_type();
    let text = serde_json::to_string(&documents()[0]).unwrap();
    for (end, _) in text.char_indices() {
        let value = parser.parse_partial(&text[..end]);
        assert!(value.is_object(), "prefix {:?}", &text[..end]);
    }
}

#[test]
fn test_fenced_and_unfenced_parse_identically() {
    let parser: ResponseParser<Itinerary> = ResponseParser::for_type();
    for doc in documents().into_iter().take(2) {
        let text = serde_json::to_string_pretty(&doc).unwrap();
        let plain = parser.parse_final(&text).unwrap();
        for fenced in [
            format!("```json\n{}\n```", text),
            format!("```\n{}\n```", text),
            format!("Here you go:\n\n```json\n{}\n```\nLet me know!", text),
        ] {
            assert_eq!(parser.parse_final(&fenced).unwrap(), plain);
            assert_eq!(strip_code_fence(&fenced), text);
        }
    }
}

#[test]
fn test_fenced_code_inside_string_parses_identically() {
    let parser: ResponseParser<Snippet> = ResponseParser::for_type();
    let doc = documents().pop().unwrap();
    for text in [
        serde_json::to_string(&doc).unwrap(),
        serde_json::to_string_pretty(&doc).unwrap(),
    ] {
        let plain = parser.parse_final(&text).unwrap();
        assert_eq!(plain.code, "```rust\nfn main() {}\n```");
        for fenced in [
            format!("```json\n{}\n```", text),
            format!("Snippet:\n```\n{}\n```\n", text),
        ] {
            assert_eq!(parser.parse_final(&fenced).unwrap(), plain);
        }
    }
}

#[test]
fn test_escaped_backslash_before_u_survives_partial_parse() {
    let text = r#"{"path": "C:\\users"}"#;
    let mut last = None;
    for end in text.find("C:").unwrap()..text.len() {
        let partial = parse_partial_json(&text[..end]);
        assert!(partial.is_some(), "prefix {:?} lost the object", &text[..end]);
        last = partial;
    }
    assert_eq!(last, Some(json!({"path": "C:\\users"})));
    assert_eq!(
        parse_partial_json(r#"{"path": "C:\\u"#),
        Some(json!({"path": "C:\\u"}))
    );
}

#[test]
fn test_fenced_invalid_fails_like_unfenced() {
    let parser: ResponseParser<Itinerary> = ResponseParser::for_type();
    let text = r#"{"city": "Kyoto", "days": "three", "stops": []}"#;
    assert!(matches!(parser.parse_final(text), Err(LlmError::ParseFailure(_))));
    assert!(matches!(
        parser.parse_final(&format!("```json\n{}\n```", text)),
        Err(LlmError::ParseFailure(_))
    ));
}

#[test]
fn test_no_content_is_empty_response() {
    let parser: ResponseParser<Value> =
        ResponseParser::new(ObjectSchema::new("anything", json!({})));
    assert!(matches!(parser.parse_final(""), Err(LlmError::EmptyResponse)));
}

fn split_at_every_width(text: &str, width: usize) -> Vec<String> {
    let chars: Vec<char> = text.chars().collect();
    chars
        .chunks(width)
        .map(|chunk| chunk.iter().collect())
        .collect()
}

#[test]
fn test_tool_argument_accumulation_is_associative() {
    let arguments = serde_json::to_string(&documents()[0]).unwrap();
    let expected: Value = serde_json::from_str(&arguments).unwrap();

    for width in [1, 2, 3, 7, 16, arguments.len()] {
        let mut acc = ToolCallAccumulator::new();
        for (i, fragment) in split_at_every_width(&arguments, width).into_iter().enumerate() {
            acc.apply(ToolCallDelta {
                index: 0,
                id: (i == 0).then(|| "call_0".to_string()),
                name: (i == 0).then(|| "plan_trip".to_string()),
                arguments: Some(fragment),
            })
            .unwrap();
        }
        assert_eq!(acc.get(0).unwrap().arguments, arguments);
        assert_eq!(acc.get(0).unwrap().input(), expected);

        let calls = acc.finish();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].input, expected);
        assert_eq!(calls[0].tool_call_id, "call_0");
    }
}

#[test]
fn test_interleaved_slots_accumulate_independently() {
    let first = r#"{"city": "Oslo"}"#;
    let second = r#"{"units": "metric"}"#;
    let mut acc = ToolCallAccumulator::new();

    let a = split_at_every_width(first, 3);
    let b = split_at_every_width(second, 4);
    for i in 0..a.len().max(b.len()) {
        if let Some(fragment) = a.get(i) {
            acc.apply(ToolCallDelta {
                index: 0,
                name: Some("weather".into()),
                arguments: Some(fragment.clone()),
                ..Default::default()
            })
            .unwrap();
        }
        if let Some(fragment) = b.get(i) {
            acc.apply(ToolCallDelta {
                index: 1,
                name: Some("settings".into()),
                arguments: Some(fragment.clone()),
                ..Default::default()
            })
            .unwrap();
        }
    }

    let calls = acc.finish();
    assert_eq!(calls[0].input, json!({"city": "Oslo"}));
    assert_eq!(calls[1].input, json!({"units": "metric"}));
}
