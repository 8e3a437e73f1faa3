//! SPARQL 1.1 Results JSON
//!
//! The standard shape plus a `direction` member on directional literals.
//! A reader is provided so result sets round-trip
//! (`parse(serialize(R)) = R`).

use crate::{IoError, IoResult, ResultSet};
use rdf_model::{Dictionary, Direction, Node, Triple};
use serde_json::{json, Map, Value};

/// Serialize a SELECT result set
pub fn serialize_solutions(results: &ResultSet<'_>) -> String {
    let bindings: Vec<Value> = results
        .rows
        .iter()
        .map(|row| {
            let mut object = Map::new();
            for (variable, term) in results.variables.iter().zip(row) {
                if let Some(term) = term {
                    object.insert(variable.clone(), term_to_json(term));
                }
            }
            Value::Object(object)
        })
        .collect();

    let value = json!({
        "head": { "vars": results.variables },
        "results": { "bindings": bindings },
    });
    serde_json::to_string_pretty(&value).unwrap_or_else(|_| "{}".to_string())
}

/// Serialize an ASK result
pub fn serialize_boolean(value: bool) -> String {
    serde_json::to_string_pretty(&json!({ "head": {}, "boolean": value }))
        .unwrap_or_else(|_| "{}".to_string())
}

/// Parse a SELECT result document
pub fn parse_solutions<'a>(text: &str, dict: &Dictionary) -> IoResult<ResultSet<'a>> {
    let value: Value = serde_json::from_str(text)?;

    let variables = value
        .pointer("/head/vars")
        .and_then(Value::as_array)
        .map(|vars| {
            vars.iter()
                .filter_map(Value::as_str)
                .map(str::to_string)
                .collect::<Vec<_>>()
        })
        .ok_or_else(|| IoError::Structure("missing head.vars".into()))?;

    let bindings = value
        .pointer("/results/bindings")
        .and_then(Value::as_array)
        .ok_or_else(|| IoError::Structure("missing results.bindings".into()))?;

    let mut rows = Vec::with_capacity(bindings.len());
    for binding in bindings {
        let Value::Object(object) = binding else {
            return Err(IoError::Structure("binding must be an object".into()));
        };
        let mut row = Vec::with_capacity(variables.len());
        for variable in &variables {
            match object.get(variable) {
                Some(term) => row.push(Some(json_to_term(term, dict)?)),
                None => row.push(None),
            }
        }
        rows.push(row);
    }

    Ok(ResultSet { variables, rows })
}

/// Parse an ASK result document
pub fn parse_boolean(text: &str) -> IoResult<bool> {
    let value: Value = serde_json::from_str(text)?;
    value
        .get("boolean")
        .and_then(Value::as_bool)
        .ok_or_else(|| IoError::Structure("missing boolean member".into()))
}

fn term_to_json(term: &Node<'_>) -> Value {
    match term {
        Node::Iri(iri) => json!({ "type": "uri", "value": iri.as_str() }),
        Node::BlankNode(id) => json!({ "type": "bnode", "value": format!("b{}", id.id()) }),
        Node::Literal(lit) => {
            let mut object = Map::new();
            object.insert("type".to_string(), Value::String("literal".to_string()));
            object.insert("value".to_string(), Value::String(lit.lexical.to_string()));
            if let Some(lang) = lit.language {
                object.insert("xml:lang".to_string(), Value::String(lang.to_string()));
                if let Some(dir) = lit.direction {
                    object.insert(
                        "direction".to_string(),
                        Value::String(dir.as_str().to_string()),
                    );
                }
            } else if let Some(dt) = lit.datatype {
                object.insert("datatype".to_string(), Value::String(dt.to_string()));
            }
            Value::Object(object)
        }
        Node::QuotedTriple(t) => json!({
            "type": "triple",
            "value": {
                "subject": term_to_json(&t.subject),
                "predicate": term_to_json(&t.predicate),
                "object": term_to_json(&t.object),
            },
        }),
        other => json!({ "type": "literal", "value": other.to_string() }),
    }
}

fn json_to_term<'a>(value: &Value, dict: &Dictionary) -> IoResult<Node<'a>> {
    let kind = value
        .get("type")
        .and_then(Value::as_str)
        .ok_or_else(|| IoError::Structure("term without type".into()))?;

    match kind {
        "uri" => {
            let iri = value
                .get("value")
                .and_then(Value::as_str)
                .ok_or_else(|| IoError::Structure("uri without value".into()))?;
            Ok(Node::iri(dict.intern(iri)))
        }
        "bnode" => {
            let label = value
                .get("value")
                .and_then(Value::as_str)
                .ok_or_else(|| IoError::Structure("bnode without value".into()))?;
            let id = label.trim_start_matches('b').parse().unwrap_or(0);
            Ok(Node::blank(id))
        }
        "literal" => {
            let lexical = value
                .get("value")
                .and_then(Value::as_str)
                .ok_or_else(|| IoError::Structure("literal without value".into()))?;
            let lexical = dict.intern(lexical);
            if let Some(lang) = value.get("xml:lang").and_then(Value::as_str) {
                let lang = dict.intern(&lang.to_ascii_lowercase());
                if let Some(dir) = value.get("direction").and_then(Value::as_str) {
                    let direction = Direction::parse(&dir.to_ascii_lowercase())?;
                    return Ok(Node::literal_dir(lexical, lang, direction));
                }
                return Ok(Node::literal_lang(lexical, lang));
            }
            if let Some(dt) = value.get("datatype").and_then(Value::as_str) {
                return Ok(Node::literal_typed(lexical, dict.intern(dt)));
            }
            Ok(Node::literal_str(lexical))
        }
        "triple" => {
            let inner = value
                .get("value")
                .ok_or_else(|| IoError::Structure("triple without value".into()))?;
            let subject = inner
                .get("subject")
                .ok_or_else(|| IoError::Structure("triple without subject".into()))?;
            let predicate = inner
                .get("predicate")
                .ok_or_else(|| IoError::Structure("triple without predicate".into()))?;
            let object = inner
                .get("object")
                .ok_or_else(|| IoError::Structure("triple without object".into()))?;
            let triple = Triple::try_new(
                json_to_term(subject, dict)?,
                json_to_term(predicate, dict)?,
                json_to_term(object, dict)?,
            )?;
            Ok(Node::quoted(triple))
        }
        other => Err(IoError::Structure(format!("unknown term type '{other}'"))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rdf_model::Vocabulary;

    fn sample() -> ResultSet<'static> {
        let dict = Dictionary::new();
        ResultSet {
            variables: vec!["t".to_string(), "l".to_string()],
            rows: vec![
                vec![
                    Some(Node::iri(dict.intern("http://example.org/task1"))),
                    Some(Node::literal_dir(
                        dict.intern("مرحبا"),
                        dict.intern("ar"),
                        Direction::Rtl,
                    )),
                ],
                vec![
                    Some(Node::iri(dict.intern("http://example.org/task2"))),
                    Some(Node::literal_typed(dict.intern("5"), Vocabulary::XSD_INTEGER)),
                ],
                vec![Some(Node::blank(3)), None],
            ],
        }
    }

    #[test]
    fn round_trip() {
        let results = sample();
        let text = serialize_solutions(&results);
        let dict = Dictionary::new();
        let reparsed = parse_solutions(&text, &dict).unwrap();
        assert_eq!(results, reparsed);
    }

    #[test]
    fn direction_member_is_present() {
        let text = serialize_solutions(&sample());
        let value: Value = serde_json::from_str(&text).unwrap();
        let first = value
            .pointer("/results/bindings/0/l")
            .expect("first binding");
        assert_eq!(first.get("direction").unwrap(), "rtl");
        assert_eq!(first.get("xml:lang").unwrap(), "ar");
    }

    #[test]
    fn boolean_round_trip() {
        assert!(parse_boolean(&serialize_boolean(true)).unwrap());
        assert!(!parse_boolean(&serialize_boolean(false)).unwrap());
    }

    #[test]
    fn quoted_triple_terms() {
        let dict = Dictionary::new();
        let triple = Triple::try_new(
            Node::iri(dict.intern("http://example.org/alice")),
            Node::iri(dict.intern("http://example.org/knows")),
            Node::iri(dict.intern("http://example.org/bob")),
        )
        .unwrap();
        let results = ResultSet {
            variables: vec!["s".to_string()],
            rows: vec![vec![Some(Node::quoted(triple))]],
        };
        let text = serialize_solutions(&results);
        let reparsed = parse_solutions(&text, &dict).unwrap();
        assert_eq!(results, reparsed);
    }
}
