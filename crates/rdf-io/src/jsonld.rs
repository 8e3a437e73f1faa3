//! JSON-LD reader and writer
//!
//! Emits expanded-style node objects under `@graph`, grouped by subject.
//! Directional literals carry `@direction` next to `@language`; quoted
//! triples serialize as `@quoted` objects (subject / predicate / object),
//! a form this reader round-trips without `@annotation` processing.

use crate::{IoError, IoResult};
use rdf_model::{BlankNodeAllocator, Dictionary, Direction, Node, Triple};
use serde_json::{json, Map, Value};
use std::collections::HashMap;
use std::sync::Arc;

/// JSON-LD writer
pub struct JsonLdSerializer;

impl JsonLdSerializer {
    /// Create a writer
    pub fn new() -> Self {
        Self
    }

    /// Serialize a whole graph
    pub fn serialize(&self, triples: &[Triple<'_>]) -> String {
        let value = json!({ "@graph": self.node_objects(triples) });
        serde_json::to_string_pretty(&value).unwrap_or_else(|_| "{}".to_string())
    }

    /// Serialize in chunks of `batch_size` node objects
    ///
    /// Every chunk is a complete JSON-LD document; the union of their
    /// graphs is the full graph.
    pub fn serialize_chunked(&self, triples: &[Triple<'_>], batch_size: usize) -> Vec<String> {
        let objects = self.node_objects(triples);
        let batch = batch_size.max(1);
        objects
            .chunks(batch)
            .map(|chunk| {
                let value = json!({ "@graph": chunk });
                serde_json::to_string_pretty(&value).unwrap_or_else(|_| "{}".to_string())
            })
            .collect()
    }

    /// Group triples by subject into expanded node objects
    fn node_objects(&self, triples: &[Triple<'_>]) -> Vec<Value> {
        let mut order: Vec<String> = Vec::new();
        let mut grouped: HashMap<String, (Value, Map<String, Value>)> = HashMap::new();

        for triple in triples {
            let key = triple.subject.to_string();
            let entry = grouped.entry(key.clone()).or_insert_with(|| {
                order.push(key);
                (subject_key(&triple.subject), Map::new())
            });
            let predicate = match triple.predicate.as_iri() {
                Some(iri) => iri.as_str().to_string(),
                None => continue,
            };
            let values = entry
                .1
                .entry(predicate)
                .or_insert_with(|| Value::Array(Vec::new()));
            if let Value::Array(array) = values {
                array.push(value_object(&triple.object));
            }
        }

        order
            .into_iter()
            .filter_map(|key| grouped.remove(&key))
            .map(|(subject, predicates)| {
                let mut object = Map::new();
                match &subject {
                    Value::String(id) => {
                        object.insert("@id".to_string(), Value::String(id.clone()));
                    }
                    other => {
                        object.insert("@quoted".to_string(), other.clone());
                    }
                }
                for (predicate, values) in predicates {
                    object.insert(predicate, values);
                }
                Value::Object(object)
            })
            .collect()
    }
}

impl Default for JsonLdSerializer {
    fn default() -> Self {
        Self::new()
    }
}

fn subject_key(node: &Node<'_>) -> Value {
    match node {
        Node::Iri(iri) => Value::String(iri.as_str().to_string()),
        Node::BlankNode(id) => Value::String(format!("_:b{}", id.id())),
        Node::QuotedTriple(t) => quoted_object(t),
        other => Value::String(other.to_string()),
    }
}

fn quoted_object(triple: &Triple<'_>) -> Value {
    json!({
        "subject": value_object(&triple.subject),
        "predicate": triple.predicate.as_iri().map(|iri| iri.as_str()).unwrap_or_default(),
        "object": value_object(&triple.object),
    })
}

fn value_object(node: &Node<'_>) -> Value {
    match node {
        Node::Iri(iri) => json!({ "@id": iri.as_str() }),
        Node::BlankNode(id) => json!({ "@id": format!("_:b{}", id.id()) }),
        Node::Literal(lit) => {
            let mut object = Map::new();
            object.insert("@value".to_string(), Value::String(lit.lexical.to_string()));
            if let Some(lang) = lit.language {
                object.insert("@language".to_string(), Value::String(lang.to_string()));
                if let Some(dir) = lit.direction {
                    object.insert(
                        "@direction".to_string(),
                        Value::String(dir.as_str().to_string()),
                    );
                }
            } else if let Some(dt) = lit.datatype {
                object.insert("@type".to_string(), Value::String(dt.to_string()));
            }
            Value::Object(object)
        }
        Node::QuotedTriple(t) => json!({ "@quoted": quoted_object(t) }),
        other => json!({ "@id": other.to_string() }),
    }
}

/// JSON-LD reader for the writer's expanded form
pub struct JsonLdParser {
    dict: Arc<Dictionary>,
    blanks: HashMap<String, rdf_model::BlankNodeId>,
    alloc: BlankNodeAllocator,
}

impl JsonLdParser {
    /// Create a reader interning through the given dictionary
    pub fn new(dict: Arc<Dictionary>) -> Self {
        Self {
            dict,
            blanks: HashMap::new(),
            alloc: BlankNodeAllocator::new(),
        }
    }

    /// Parse a document into triples
    pub fn parse<'a>(&mut self, text: &str) -> IoResult<Vec<Triple<'a>>> {
        let value: Value = serde_json::from_str(text)?;
        let graph = match &value {
            Value::Object(object) => object
                .get("@graph")
                .ok_or_else(|| IoError::Structure("missing @graph".into()))?,
            Value::Array(_) => &value,
            _ => return Err(IoError::Structure("expected object or array".into())),
        };
        let Value::Array(nodes) = graph else {
            return Err(IoError::Structure("@graph must be an array".into()));
        };

        let mut triples = Vec::new();
        for node in nodes {
            self.parse_node_object(node, &mut triples)?;
        }
        Ok(triples)
    }

    fn parse_node_object<'a>(
        &mut self,
        node: &Value,
        out: &mut Vec<Triple<'a>>,
    ) -> IoResult<()> {
        let Value::Object(object) = node else {
            return Err(IoError::Structure("node object expected".into()));
        };

        let subject = if let Some(Value::String(id)) = object.get("@id") {
            self.reference(id)
        } else if let Some(quoted) = object.get("@quoted") {
            self.parse_quoted(quoted)?
        } else {
            return Err(IoError::Structure(
                "node object without @id or @quoted".into(),
            ));
        };

        for (key, values) in object {
            if key.starts_with('@') {
                continue;
            }
            let predicate = Node::iri(self.dict.intern(key));
            let values = match values {
                Value::Array(array) => array.as_slice(),
                single => std::slice::from_ref(single),
            };
            for value in values {
                let object_node = self.parse_value_object(value)?;
                out.push(Triple::try_new(
                    subject.clone(),
                    predicate.clone(),
                    object_node,
                )?);
            }
        }
        Ok(())
    }

    fn parse_value_object<'a>(&mut self, value: &Value) -> IoResult<Node<'a>> {
        let Value::Object(object) = value else {
            return Err(IoError::Structure("value object expected".into()));
        };

        if let Some(quoted) = object.get("@quoted") {
            return self.parse_quoted(quoted);
        }
        if let Some(Value::String(id)) = object.get("@id") {
            return Ok(self.reference(id));
        }
        if let Some(Value::String(lexical)) = object.get("@value") {
            let lexical = self.dict.intern(lexical);
            if let Some(Value::String(lang)) = object.get("@language") {
                let lang = self.dict.intern(&lang.to_ascii_lowercase());
                if let Some(Value::String(dir)) = object.get("@direction") {
                    let direction = Direction::parse(&dir.to_ascii_lowercase())?;
                    return Ok(Node::literal_dir(lexical, lang, direction));
                }
                return Ok(Node::literal_lang(lexical, lang));
            }
            if let Some(Value::String(dt)) = object.get("@type") {
                return Ok(Node::literal_typed(lexical, self.dict.intern(dt)));
            }
            return Ok(Node::literal_str(lexical));
        }
        Err(IoError::Structure("unrecognized value object".into()))
    }

    fn parse_quoted<'a>(&mut self, value: &Value) -> IoResult<Node<'a>> {
        let Value::Object(object) = value else {
            return Err(IoError::Structure("@quoted must be an object".into()));
        };
        let subject = object
            .get("subject")
            .ok_or_else(|| IoError::Structure("@quoted without subject".into()))?;
        let predicate = object
            .get("predicate")
            .and_then(Value::as_str)
            .ok_or_else(|| IoError::Structure("@quoted without predicate".into()))?;
        let object_value = object
            .get("object")
            .ok_or_else(|| IoError::Structure("@quoted without object".into()))?;

        let subject = self.parse_value_object(subject)?;
        let object_node = self.parse_value_object(object_value)?;
        Ok(Node::quoted(Triple::try_new(
            subject,
            Node::iri(self.dict.intern(predicate)),
            object_node,
        )?))
    }

    fn reference<'a>(&mut self, id: &str) -> Node<'a> {
        if let Some(label) = id.strip_prefix("_:") {
            let alloc = &self.alloc;
            let id = *self.blanks.entry(label.to_string()).or_insert_with(|| alloc.fresh());
            Node::BlankNode(id)
        } else {
            Node::iri(self.dict.intern(id))
        }
    }
}
