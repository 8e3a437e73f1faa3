//! SPARQL Results XML
//!
//! Writer only; the engine reads result sets back through the JSON format.
//! Directional literals carry a `direction` attribute next to `xml:lang`.

use crate::{IoError, IoResult, ResultSet};
use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, BytesText, Event};
use quick_xml::Writer;
use rdf_model::Node;

const SPARQL_NS: &str = "http://www.w3.org/2005/sparql-results#";

/// Serialize a SELECT result set
pub fn serialize_solutions(results: &ResultSet<'_>) -> IoResult<String> {
    let mut writer = Writer::new(Vec::new());
    write(&mut writer, Event::Decl(BytesDecl::new("1.0", Some("UTF-8"), None)))?;

    let mut sparql = BytesStart::new("sparql");
    sparql.push_attribute(("xmlns", SPARQL_NS));
    write(&mut writer, Event::Start(sparql))?;

    write(&mut writer, Event::Start(BytesStart::new("head")))?;
    for variable in &results.variables {
        let mut elem = BytesStart::new("variable");
        elem.push_attribute(("name", variable.as_str()));
        write(&mut writer, Event::Empty(elem))?;
    }
    write(&mut writer, Event::End(BytesEnd::new("head")))?;

    write(&mut writer, Event::Start(BytesStart::new("results")))?;
    for row in &results.rows {
        write(&mut writer, Event::Start(BytesStart::new("result")))?;
        for (variable, term) in results.variables.iter().zip(row) {
            if let Some(term) = term {
                let mut binding = BytesStart::new("binding");
                binding.push_attribute(("name", variable.as_str()));
                write(&mut writer, Event::Start(binding))?;
                write_term(&mut writer, term)?;
                write(&mut writer, Event::End(BytesEnd::new("binding")))?;
            }
        }
        write(&mut writer, Event::End(BytesEnd::new("result")))?;
    }
    write(&mut writer, Event::End(BytesEnd::new("results")))?;
    write(&mut writer, Event::End(BytesEnd::new("sparql")))?;

    Ok(String::from_utf8_lossy(&writer.into_inner()).into_owned())
}

/// Serialize an ASK result
pub fn serialize_boolean(value: bool) -> IoResult<String> {
    let mut writer = Writer::new(Vec::new());
    write(&mut writer, Event::Decl(BytesDecl::new("1.0", Some("UTF-8"), None)))?;

    let mut sparql = BytesStart::new("sparql");
    sparql.push_attribute(("xmlns", SPARQL_NS));
    write(&mut writer, Event::Start(sparql))?;
    write(&mut writer, Event::Empty(BytesStart::new("head")))?;
    write(&mut writer, Event::Start(BytesStart::new("boolean")))?;
    write(
        &mut writer,
        Event::Text(BytesText::new(if value { "true" } else { "false" })),
    )?;
    write(&mut writer, Event::End(BytesEnd::new("boolean")))?;
    write(&mut writer, Event::End(BytesEnd::new("sparql")))?;

    Ok(String::from_utf8_lossy(&writer.into_inner()).into_owned())
}

fn write_term(writer: &mut Writer<Vec<u8>>, term: &Node<'_>) -> IoResult<()> {
    match term {
        Node::Iri(iri) => {
            write(writer, Event::Start(BytesStart::new("uri")))?;
            write(writer, Event::Text(BytesText::new(iri.as_str())))?;
            write(writer, Event::End(BytesEnd::new("uri")))?;
        }
        Node::BlankNode(id) => {
            write(writer, Event::Start(BytesStart::new("bnode")))?;
            write(writer, Event::Text(BytesText::new(&format!("b{}", id.id()))))?;
            write(writer, Event::End(BytesEnd::new("bnode")))?;
        }
        Node::Literal(lit) => {
            let mut elem = BytesStart::new("literal");
            if let Some(lang) = lit.language {
                elem.push_attribute(("xml:lang", lang));
                if let Some(dir) = lit.direction {
                    elem.push_attribute(("direction", dir.as_str()));
                }
            } else if let Some(dt) = lit.datatype {
                elem.push_attribute(("datatype", dt));
            }
            write(writer, Event::Start(elem))?;
            write(writer, Event::Text(BytesText::new(lit.lexical)))?;
            write(writer, Event::End(BytesEnd::new("literal")))?;
        }
        Node::QuotedTriple(t) => {
            write(writer, Event::Start(BytesStart::new("triple")))?;
            for (tag, inner) in [
                ("subject", &t.subject),
                ("predicate", &t.predicate),
                ("object", &t.object),
            ] {
                write(writer, Event::Start(BytesStart::new(tag)))?;
                write_term(writer, inner)?;
                write(writer, Event::End(BytesEnd::new(tag)))?;
            }
            write(writer, Event::End(BytesEnd::new("triple")))?;
        }
        other => {
            write(writer, Event::Start(BytesStart::new("literal")))?;
            write(writer, Event::Text(BytesText::new(&other.to_string())))?;
            write(writer, Event::End(BytesEnd::new("literal")))?;
        }
    }
    Ok(())
}

fn write(writer: &mut Writer<Vec<u8>>, event: Event<'_>) -> IoResult<()> {
    writer
        .write_event(event)
        .map_err(|e| IoError::Structure(format!("xml write failed: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rdf_model::{Dictionary, Direction};

    #[test]
    fn solutions_document_shape() {
        let dict = Dictionary::new();
        let results = ResultSet {
            variables: vec!["t".to_string(), "l".to_string()],
            rows: vec![vec![
                Some(Node::iri(dict.intern("http://example.org/task1"))),
                Some(Node::literal_dir(
                    dict.intern("مرحبا"),
                    dict.intern("ar"),
                    Direction::Rtl,
                )),
            ]],
        };

        let xml = serialize_solutions(&results).unwrap();
        assert!(xml.contains("<variable name=\"t\"/>"));
        assert!(xml.contains("<uri>http://example.org/task1</uri>"));
        assert!(xml.contains("xml:lang=\"ar\""));
        assert!(xml.contains("direction=\"rtl\""));
    }

    #[test]
    fn specials_are_escaped() {
        let dict = Dictionary::new();
        let results = ResultSet {
            variables: vec!["x".to_string()],
            rows: vec![vec![Some(Node::literal_str(
                dict.intern("a < b & \"c\""),
            ))]],
        };
        let xml = serialize_solutions(&results).unwrap();
        assert!(xml.contains("a &lt; b &amp;"));
        assert!(!xml.contains("a < b &"));
    }

    #[test]
    fn boolean_document() {
        let xml = serialize_boolean(true).unwrap();
        assert!(xml.contains("<boolean>true</boolean>"));
    }
}
