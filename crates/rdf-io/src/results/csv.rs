//! CSV result serialization
//!
//! Header row of variable names; values are quoted when they contain a
//! comma, a quote or a newline. Directional language-tagged values
//! flatten to `value@lang--dir`.

use crate::ResultSet;
use rdf_model::Node;

/// Serialize a SELECT result set as CSV
pub fn serialize_solutions(results: &ResultSet<'_>) -> String {
    let mut out = String::new();
    out.push_str(&results.variables.join(","));
    out.push_str("\r\n");

    for row in &results.rows {
        for (index, term) in row.iter().enumerate() {
            if index > 0 {
                out.push(',');
            }
            if let Some(term) = term {
                out.push_str(&quote(&cell_text(term)));
            }
        }
        out.push_str("\r\n");
    }
    out
}

fn cell_text(term: &Node<'_>) -> String {
    match term {
        Node::Iri(iri) => iri.as_str().to_string(),
        Node::BlankNode(id) => format!("_:b{}", id.id()),
        Node::Literal(lit) => match (lit.language, lit.direction) {
            (Some(lang), Some(dir)) => format!("{}@{lang}--{dir}", lit.lexical),
            (Some(lang), None) => format!("{}@{lang}", lit.lexical),
            _ => lit.lexical.to_string(),
        },
        quoted @ Node::QuotedTriple(_) => quoted.to_string(),
        other => other.to_string(),
    }
}

fn quote(value: &str) -> String {
    if value.contains([',', '"', '\n', '\r']) {
        format!("\"{}\"", value.replace('"', "\"\""))
    } else {
        value.to_string()
    }
}
