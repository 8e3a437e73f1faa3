//! N-Triples reader and writer
//!
//! The writer emits the canonical term text of the model layer (one triple
//! per line), so `parse(serialize(G)) = G` as sets. Quoted triples use the
//! `<< s p o >>` syntax; directional literals the `@lang--dir` suffix.

use crate::{IoError, IoResult};
use pest::iterators::Pair;
use pest::Parser as _;
use pest_derive::Parser;
use rdf_model::{BlankNodeAllocator, Dictionary, Direction, Node, Triple};
use std::collections::HashMap;
use std::sync::Arc;

#[derive(Parser)]
#[grammar = "ntriples.pest"]
struct PestNTriples;

/// N-Triples parser
///
/// Blank node labels map to fresh numeric ids, stable within one parser
/// instance (one document scope).
pub struct NTriplesParser {
    dict: Arc<Dictionary>,
    blanks: HashMap<String, rdf_model::BlankNodeId>,
    alloc: BlankNodeAllocator,
}

impl NTriplesParser {
    /// Create a parser interning through the given dictionary
    pub fn new(dict: Arc<Dictionary>) -> Self {
        Self {
            dict,
            blanks: HashMap::new(),
            alloc: BlankNodeAllocator::new(),
        }
    }

    /// Parse a whole document
    pub fn parse<'a>(&mut self, text: &str) -> IoResult<Vec<Triple<'a>>> {
        let mut pairs =
            PestNTriples::parse(Rule::ntriplesDoc, text).map_err(pest_error)?;
        let doc = pairs.next().ok_or(IoError::Structure("empty document".into()))?;

        let mut triples = Vec::new();
        for pair in doc.into_inner() {
            if pair.as_rule() == Rule::Triple {
                triples.push(self.parse_triple(pair)?);
            }
        }
        Ok(triples)
    }

    fn parse_triple<'a>(&mut self, pair: Pair<'_, Rule>) -> IoResult<Triple<'a>> {
        let mut subject = None;
        let mut predicate = None;
        let mut object = None;
        for part in pair.into_inner() {
            match part.as_rule() {
                Rule::Subject => subject = Some(self.parse_subject(part)?),
                Rule::Predicate => predicate = Some(self.parse_predicate(part)?),
                Rule::Object => object = Some(self.parse_object(part)?),
                _ => {}
            }
        }
        match (subject, predicate, object) {
            (Some(s), Some(p), Some(o)) => Ok(Triple::try_new(s, p, o)?),
            _ => Err(IoError::Structure("incomplete triple".into())),
        }
    }

    fn parse_subject<'a>(&mut self, pair: Pair<'_, Rule>) -> IoResult<Node<'a>> {
        let inner = only_inner(pair)?;
        match inner.as_rule() {
            Rule::IRIREF => Ok(self.parse_iriref(&inner)),
            Rule::BlankNodeLabel => Ok(self.parse_blank(&inner)),
            Rule::QuotedTriple => self.parse_quoted(inner),
            _ => Err(IoError::Structure("unexpected subject term".into())),
        }
    }

    fn parse_predicate<'a>(&mut self, pair: Pair<'_, Rule>) -> IoResult<Node<'a>> {
        let inner = only_inner(pair)?;
        Ok(self.parse_iriref(&inner))
    }

    fn parse_object<'a>(&mut self, pair: Pair<'_, Rule>) -> IoResult<Node<'a>> {
        let inner = only_inner(pair)?;
        match inner.as_rule() {
            Rule::IRIREF => Ok(self.parse_iriref(&inner)),
            Rule::BlankNodeLabel => Ok(self.parse_blank(&inner)),
            Rule::Literal => self.parse_literal(inner),
            Rule::QuotedTriple => self.parse_quoted(inner),
            _ => Err(IoError::Structure("unexpected object term".into())),
        }
    }

    fn parse_quoted<'a>(&mut self, pair: Pair<'_, Rule>) -> IoResult<Node<'a>> {
        let mut subject = None;
        let mut predicate = None;
        let mut object = None;
        for part in pair.into_inner() {
            match part.as_rule() {
                Rule::Subject => subject = Some(self.parse_subject(part)?),
                Rule::Predicate => predicate = Some(self.parse_predicate(part)?),
                Rule::Object => object = Some(self.parse_object(part)?),
                _ => {}
            }
        }
        match (subject, predicate, object) {
            (Some(s), Some(p), Some(o)) => Ok(Node::quoted(Triple::try_new(s, p, o)?)),
            _ => Err(IoError::Structure("incomplete quoted triple".into())),
        }
    }

    fn parse_iriref<'a>(&self, pair: &Pair<'_, Rule>) -> Node<'a> {
        let text = pair.as_str();
        Node::iri(self.dict.intern(&text[1..text.len() - 1]))
    }

    fn parse_blank<'a>(&mut self, pair: &Pair<'_, Rule>) -> Node<'a> {
        let label = pair.as_str()[2..].to_string();
        let alloc = &self.alloc;
        let id = *self.blanks.entry(label).or_insert_with(|| alloc.fresh());
        Node::BlankNode(id)
    }

    fn parse_literal<'a>(&mut self, pair: Pair<'_, Rule>) -> IoResult<Node<'a>> {
        let mut lexical = None;
        let mut language = None;
        let mut direction = None;
        let mut datatype = None;

        for part in pair.into_inner() {
            match part.as_rule() {
                Rule::String => lexical = Some(unescape(part.as_str())),
                Rule::LANGDIR => {
                    let (lang, dir) = split_langdir(&part.as_str()[1..])?;
                    language = Some(lang);
                    direction = dir;
                }
                Rule::IRIREF => {
                    let text = part.as_str();
                    datatype = Some(self.dict.intern(&text[1..text.len() - 1]));
                }
                _ => {}
            }
        }

        let lexical = self.dict.intern(&lexical.unwrap_or_default());
        Ok(match (language, direction, datatype) {
            (Some(lang), Some(dir), _) => {
                Node::literal_dir(lexical, self.dict.intern(&lang), dir)
            }
            (Some(lang), None, _) => Node::literal_lang(lexical, self.dict.intern(&lang)),
            (None, _, Some(dt)) => Node::literal_typed(lexical, dt),
            (None, _, None) => Node::literal_str(lexical),
        })
    }
}

/// Serialize a graph as N-Triples
pub fn serialize(triples: &[Triple<'_>]) -> String {
    let mut out = String::new();
    for triple in triples {
        out.push_str(&triple.to_ntriples());
        out.push('\n');
    }
    out
}

/// Split a language tag into (lowercased language, direction)
pub(crate) fn split_langdir(tag: &str) -> IoResult<(String, Option<Direction>)> {
    match tag.split_once("--") {
        Some((lang, dir)) => {
            let direction = Direction::parse(&dir.to_ascii_lowercase())?;
            Ok((lang.to_ascii_lowercase(), Some(direction)))
        }
        None => Ok((tag.to_ascii_lowercase(), None)),
    }
}

/// Strip quotes and resolve escapes of a string token
pub(crate) fn unescape(token: &str) -> String {
    let inner = if token.len() >= 2 {
        &token[1..token.len() - 1]
    } else {
        token
    };
    let mut out = String::with_capacity(inner.len());
    let mut chars = inner.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('t') => out.push('\t'),
            Some('b') => out.push('\u{8}'),
            Some('n') => out.push('\n'),
            Some('r') => out.push('\r'),
            Some('f') => out.push('\u{c}'),
            Some('u') => push_unicode(&mut chars, 4, &mut out),
            Some('U') => push_unicode(&mut chars, 8, &mut out),
            Some(other) => out.push(other),
            None => break,
        }
    }
    out
}

fn push_unicode(chars: &mut std::str::Chars<'_>, len: usize, out: &mut String) {
    let hex: String = chars.by_ref().take(len).collect();
    if let Ok(code) = u32::from_str_radix(&hex, 16) {
        if let Some(c) = char::from_u32(code) {
            out.push(c);
        }
    }
}

fn only_inner(pair: Pair<'_, Rule>) -> IoResult<Pair<'_, Rule>> {
    let (line, column) = pair.as_span().start_pos().line_col();
    pair.into_inner().next().ok_or(IoError::Syntax {
        line,
        column,
        message: "unexpected empty production".into(),
    })
}

fn pest_error(err: pest::error::Error<Rule>) -> IoError {
    let (line, column) = match err.line_col {
        pest::error::LineColLocation::Pos((l, c)) => (l, c),
        pest::error::LineColLocation::Span((l, c), _) => (l, c),
    };
    IoError::Syntax {
        line,
        column,
        message: err.variant.message().into_owned(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parser() -> NTriplesParser {
        NTriplesParser::new(Arc::new(Dictionary::new()))
    }

    #[test]
    fn simple_triples() {
        let mut p = parser();
        let triples = p
            .parse(
                "<http://example.org/s> <http://example.org/p> <http://example.org/o> .\n\
                 <http://example.org/s> <http://example.org/label> \"hello\" .",
            )
            .unwrap();
        assert_eq!(triples.len(), 2);
    }

    #[test]
    fn blank_nodes_stable_within_document() {
        let mut p = parser();
        let triples = p
            .parse(
                "_:a <http://example.org/p> _:b .\n\
                 _:a <http://example.org/q> _:a .",
            )
            .unwrap();
        assert_eq!(triples[0].subject, triples[1].subject);
        assert_eq!(triples[1].subject, triples[1].object);
        assert_ne!(triples[0].subject, triples[0].object);
    }

    #[test]
    fn directional_literal_round_trip() {
        let mut p = parser();
        let input = "<http://example.org/r> <http://example.org/label> \"مرحبا\"@ar--rtl .\n";
        let triples = p.parse(input).unwrap();

        let lit = triples[0].object.as_literal().unwrap();
        assert_eq!(lit.lexical, "مرحبا");
        assert_eq!(lit.language, Some("ar"));
        assert_eq!(lit.direction, Some(Direction::Rtl));

        assert_eq!(serialize(&triples), input);
    }

    #[test]
    fn quoted_triple_round_trip() {
        let mut p = parser();
        let input = "<< <http://example.org/alice> <http://example.org/knows> <http://example.org/bob> >> <http://example.org/source> <http://example.org/wikipedia> .\n";
        let triples = p.parse(input).unwrap();
        assert!(triples[0].subject.is_quoted());
        assert_eq!(serialize(&triples), input);
    }

    #[test]
    fn escapes_round_trip() {
        let mut p = parser();
        let input = "<http://s> <http://p> \"line\\nbreak \\\"quoted\\\"\" .\n";
        let triples = p.parse(input).unwrap();
        assert_eq!(
            triples[0].object.as_literal().unwrap().lexical,
            "line\nbreak \"quoted\""
        );
        assert_eq!(serialize(&triples), input);
    }

    #[test]
    fn syntax_error_has_position() {
        let mut p = parser();
        let err = p.parse("<http://s> <http://p> .").unwrap_err();
        assert!(matches!(err, IoError::Syntax { .. }));
    }
}
