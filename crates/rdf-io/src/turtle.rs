//! Turtle reader and writer
//!
//! The reader covers the vault exchange subset: prefix/base directives,
//! `;`/`,` abbreviations, RDF-star quoted triples and directional language
//! tags. The writer keeps a prefix table and supports chunked emission so
//! large graphs serialize in bounded memory.

use crate::ntriples::{split_langdir, unescape};
use crate::{IoError, IoResult};
use pest::iterators::Pair;
use pest::Parser as _;
use pest_derive::Parser;
use rdf_model::{escape_literal, BlankNodeAllocator, Dictionary, Node, Triple, Vocabulary};
use std::collections::HashMap;
use std::sync::Arc;

#[derive(Parser)]
#[grammar = "turtle.pest"]
struct PestTurtle;

/// Turtle parser
pub struct TurtleParser {
    dict: Arc<Dictionary>,
    prefixes: HashMap<String, String>,
    base: Option<String>,
    blanks: HashMap<String, rdf_model::BlankNodeId>,
    alloc: BlankNodeAllocator,
}

impl TurtleParser {
    /// Create a parser interning through the given dictionary
    pub fn new(dict: Arc<Dictionary>) -> Self {
        Self {
            dict,
            prefixes: HashMap::new(),
            base: None,
            blanks: HashMap::new(),
            alloc: BlankNodeAllocator::new(),
        }
    }

    /// Parse a whole document
    pub fn parse<'a>(&mut self, text: &str) -> IoResult<Vec<Triple<'a>>> {
        let mut pairs = PestTurtle::parse(Rule::turtleDoc, text).map_err(pest_error)?;
        let doc = pairs
            .next()
            .ok_or(IoError::Structure("empty document".into()))?;

        let mut triples = Vec::new();
        for statement in doc.into_inner() {
            if statement.as_rule() != Rule::statement {
                continue;
            }
            for inner in statement.into_inner() {
                match inner.as_rule() {
                    Rule::directive => self.parse_directive(inner)?,
                    Rule::triples => self.parse_triples(inner, &mut triples)?,
                    _ => {}
                }
            }
        }
        Ok(triples)
    }

    fn parse_directive(&mut self, pair: Pair<'_, Rule>) -> IoResult<()> {
        for inner in pair.into_inner() {
            match inner.as_rule() {
                Rule::prefixID | Rule::sparqlPrefix => {
                    let mut prefix = String::new();
                    let mut namespace = String::new();
                    for part in inner.into_inner() {
                        match part.as_rule() {
                            Rule::PNAME_NS => {
                                let text = part.as_str();
                                prefix = text[..text.len() - 1].to_string();
                            }
                            Rule::IRIREF => {
                                let text = part.as_str();
                                namespace = text[1..text.len() - 1].to_string();
                            }
                            _ => {}
                        }
                    }
                    self.prefixes.insert(prefix, namespace);
                }
                Rule::base | Rule::sparqlBase => {
                    for part in inner.into_inner() {
                        if part.as_rule() == Rule::IRIREF {
                            let text = part.as_str();
                            self.base = Some(text[1..text.len() - 1].to_string());
                        }
                    }
                }
                _ => {}
            }
        }
        Ok(())
    }

    fn parse_triples<'a>(
        &mut self,
        pair: Pair<'_, Rule>,
        out: &mut Vec<Triple<'a>>,
    ) -> IoResult<()> {
        let mut subject = None;
        for inner in pair.into_inner() {
            match inner.as_rule() {
                Rule::subject => subject = Some(self.parse_subject(inner)?),
                Rule::predicateObjectList => {
                    let subject = subject
                        .clone()
                        .ok_or(IoError::Structure("triples without subject".into()))?;
                    let mut predicate = None;
                    for part in inner.into_inner() {
                        match part.as_rule() {
                            Rule::verb => predicate = Some(self.parse_verb(part)?),
                            Rule::objectList => {
                                let predicate = predicate
                                    .clone()
                                    .ok_or(IoError::Structure("objects without verb".into()))?;
                                for object in part.into_inner() {
                                    if object.as_rule() == Rule::object {
                                        let object = self.parse_object(object)?;
                                        out.push(Triple::try_new(
                                            subject.clone(),
                                            predicate.clone(),
                                            object,
                                        )?);
                                    }
                                }
                            }
                            _ => {}
                        }
                    }
                }
                _ => {}
            }
        }
        Ok(())
    }

    fn parse_verb<'a>(&mut self, pair: Pair<'_, Rule>) -> IoResult<Node<'a>> {
        let inner = only_inner(pair)?;
        match inner.as_rule() {
            Rule::AToken => Ok(Node::iri(self.dict.intern(Vocabulary::RDF_TYPE))),
            Rule::iri => self.parse_iri(inner),
            _ => Err(IoError::Structure("unexpected verb".into())),
        }
    }

    fn parse_subject<'a>(&mut self, pair: Pair<'_, Rule>) -> IoResult<Node<'a>> {
        let inner = only_inner(pair)?;
        match inner.as_rule() {
            Rule::iri => self.parse_iri(inner),
            Rule::BlankNodeLabel => Ok(self.parse_blank(&inner)),
            Rule::quotedTriple => self.parse_quoted(inner),
            _ => Err(IoError::Structure("unexpected subject".into())),
        }
    }

    fn parse_object<'a>(&mut self, pair: Pair<'_, Rule>) -> IoResult<Node<'a>> {
        let inner = only_inner(pair)?;
        match inner.as_rule() {
            Rule::iri => self.parse_iri(inner),
            Rule::BlankNodeLabel => Ok(self.parse_blank(&inner)),
            Rule::literal => self.parse_literal(inner),
            Rule::quotedTriple => self.parse_quoted(inner),
            _ => Err(IoError::Structure("unexpected object".into())),
        }
    }

    fn parse_quoted<'a>(&mut self, pair: Pair<'_, Rule>) -> IoResult<Node<'a>> {
        let mut subject = None;
        let mut predicate = None;
        let mut object = None;
        for part in pair.into_inner() {
            match part.as_rule() {
                Rule::subject => subject = Some(self.parse_subject(part)?),
                Rule::verb => predicate = Some(self.parse_verb(part)?),
                Rule::object => object = Some(self.parse_object(part)?),
                _ => {}
            }
        }
        match (subject, predicate, object) {
            (Some(s), Some(p), Some(o)) => Ok(Node::quoted(Triple::try_new(s, p, o)?)),
            _ => Err(IoError::Structure("incomplete quoted triple".into())),
        }
    }

    fn parse_iri<'a>(&mut self, pair: Pair<'_, Rule>) -> IoResult<Node<'a>> {
        let (line, column) = pair.as_span().start_pos().line_col();
        let text = pair.as_str();
        let iri = if let Some(stripped) = text.strip_prefix('<') {
            let raw = stripped.trim_end_matches('>');
            match &self.base {
                Some(base) if !raw.contains(':') => format!("{base}{raw}"),
                _ => raw.to_string(),
            }
        } else {
            let colon = text.find(':').ok_or(IoError::Syntax {
                line,
                column,
                message: format!("malformed prefixed name '{text}'"),
            })?;
            let (prefix, local) = (&text[..colon], &text[colon + 1..]);
            let namespace = self.prefixes.get(prefix).ok_or(IoError::Syntax {
                line,
                column,
                message: format!("undefined prefix '{prefix}:'"),
            })?;
            format!("{namespace}{local}")
        };
        Ok(Node::iri(self.dict.intern(&iri)))
    }

    fn parse_blank<'a>(&mut self, pair: &Pair<'_, Rule>) -> Node<'a> {
        let label = pair.as_str()[2..].to_string();
        let alloc = &self.alloc;
        let id = *self.blanks.entry(label).or_insert_with(|| alloc.fresh());
        Node::BlankNode(id)
    }

    fn parse_literal<'a>(&mut self, pair: Pair<'_, Rule>) -> IoResult<Node<'a>> {
        let inner = only_inner(pair)?;
        match inner.as_rule() {
            Rule::RDFLiteral => {
                let mut lexical = None;
                let mut language = None;
                let mut direction = None;
                let mut datatype = None;
                for part in inner.into_inner() {
                    match part.as_rule() {
                        Rule::String => lexical = Some(unescape(part.as_str())),
                        Rule::LANGDIR => {
                            let (lang, dir) = split_langdir(&part.as_str()[1..])?;
                            language = Some(lang);
                            direction = dir;
                        }
                        Rule::iri => {
                            let node = self.parse_iri(part)?;
                            datatype = node.as_iri().map(|iri| iri.as_str());
                        }
                        _ => {}
                    }
                }
                let lexical = self.dict.intern(&lexical.unwrap_or_default());
                Ok(match (language, direction, datatype) {
                    (Some(lang), Some(dir), _) => {
                        Node::literal_dir(lexical, self.dict.intern(&lang), dir)
                    }
                    (Some(lang), None, _) => {
                        Node::literal_lang(lexical, self.dict.intern(&lang))
                    }
                    (None, _, Some(dt)) => Node::literal_typed(lexical, dt),
                    (None, _, None) => Node::literal_str(lexical),
                })
            }
            Rule::NumericLiteral => {
                let text = inner.as_str();
                let datatype = if text.contains(['e', 'E']) {
                    Vocabulary::XSD_DOUBLE
                } else if text.contains('.') {
                    Vocabulary::XSD_DECIMAL
                } else {
                    Vocabulary::XSD_INTEGER
                };
                Ok(Node::literal_typed(self.dict.intern(text), datatype))
            }
            Rule::BooleanLiteral => {
                let value = if inner.as_str().eq_ignore_ascii_case("true") {
                    "true"
                } else {
                    "false"
                };
                Ok(Node::literal_typed(
                    self.dict.intern(value),
                    Vocabulary::XSD_BOOLEAN,
                ))
            }
            _ => Err(IoError::Structure("unexpected literal".into())),
        }
    }
}

/// Turtle writer with a prefix table and chunked emission
pub struct TurtleSerializer {
    prefixes: Vec<(String, String)>,
}

impl TurtleSerializer {
    /// Writer without prefixes (full IRIs everywhere)
    pub fn new() -> Self {
        Self {
            prefixes: Vec::new(),
        }
    }

    /// Register a prefix for IRI compression
    pub fn with_prefix(mut self, prefix: &str, namespace: &str) -> Self {
        self.prefixes
            .push((prefix.to_string(), namespace.to_string()));
        self
    }

    /// Serialize the whole graph at once
    pub fn serialize(&self, triples: &[Triple<'_>]) -> String {
        let mut out = self.header();
        for triple in triples {
            self.write_triple(&mut out, triple);
        }
        out
    }

    /// Serialize in chunks of `batch_size` triples
    ///
    /// The first chunk carries the prefix header; concatenating all chunks
    /// is exactly [`TurtleSerializer::serialize`].
    pub fn serialize_chunked<'t, 'a>(
        &'t self,
        triples: &'t [Triple<'a>],
        batch_size: usize,
    ) -> impl Iterator<Item = String> + 't {
        let batch = batch_size.max(1);
        let mut first = true;
        triples.chunks(batch).map(move |chunk| {
            let mut out = if first {
                first = false;
                self.header()
            } else {
                String::new()
            };
            for triple in chunk {
                self.write_triple(&mut out, triple);
            }
            out
        })
    }

    fn header(&self) -> String {
        let mut out = String::new();
        for (prefix, namespace) in &self.prefixes {
            out.push_str(&format!("@prefix {prefix}: <{namespace}> .\n"));
        }
        if !self.prefixes.is_empty() {
            out.push('\n');
        }
        out
    }

    fn write_triple(&self, out: &mut String, triple: &Triple<'_>) {
        self.write_term(out, &triple.subject);
        out.push(' ');
        self.write_term(out, &triple.predicate);
        out.push(' ');
        self.write_term(out, &triple.object);
        out.push_str(" .\n");
    }

    fn write_term(&self, out: &mut String, node: &Node<'_>) {
        match node {
            Node::Iri(iri) => match self.compress(iri.as_str()) {
                Some(short) => out.push_str(&short),
                None => {
                    out.push('<');
                    out.push_str(iri.as_str());
                    out.push('>');
                }
            },
            Node::Literal(lit) => {
                out.push('"');
                out.push_str(&escape_literal(lit.lexical));
                out.push('"');
                if let Some(lang) = lit.language {
                    out.push('@');
                    out.push_str(lang);
                    if let Some(dir) = lit.direction {
                        out.push_str("--");
                        out.push_str(dir.as_str());
                    }
                } else if let Some(dt) = lit.datatype {
                    out.push_str("^^");
                    match self.compress(dt) {
                        Some(short) => out.push_str(&short),
                        None => {
                            out.push('<');
                            out.push_str(dt);
                            out.push('>');
                        }
                    }
                }
            }
            Node::BlankNode(id) => {
                out.push_str("_:b");
                out.push_str(&id.id().to_string());
            }
            Node::QuotedTriple(t) => {
                out.push_str("<< ");
                self.write_term(out, &t.subject);
                out.push(' ');
                self.write_term(out, &t.predicate);
                out.push(' ');
                self.write_term(out, &t.object);
                out.push_str(" >>");
            }
            Node::Variable(v) => {
                out.push('?');
                out.push_str(v.name());
            }
        }
    }

    fn compress(&self, iri: &str) -> Option<String> {
        for (prefix, namespace) in &self.prefixes {
            if let Some(local) = iri.strip_prefix(namespace.as_str()) {
                if !local.is_empty()
                    && local
                        .chars()
                        .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
                {
                    return Some(format!("{prefix}:{local}"));
                }
            }
        }
        None
    }
}

impl Default for TurtleSerializer {
    fn default() -> Self {
        Self::new()
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
