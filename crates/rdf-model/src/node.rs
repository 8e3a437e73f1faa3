//! RDF node types
//!
//! Implements the core RDF 1.1 term model plus the RDF 1.2 additions used
//! by the engine: quoted triples and directional language-tagged literals.
//! Nodes use borrowed references (`'a` lifetime); all strings are expected
//! to be interned via [`crate::Dictionary`].

use crate::{RdfError, Result, Triple, Vocabulary};
use std::borrow::Cow;
use std::fmt;
use std::hash::{Hash, Hasher};

/// RDF node - the core type of the term model
#[derive(Clone, PartialEq, Eq, Hash)]
pub enum Node<'a> {
    /// IRI reference, e.g. `<http://example.org/task1>`
    Iri(IriRef<'a>),

    /// Literal value, e.g. `"مرحبا"@ar--rtl` or `"42"^^xsd:integer`
    Literal(Literal<'a>),

    /// Blank node with a document-scoped identifier, e.g. `_:b0`
    BlankNode(BlankNodeId),

    /// Quoted triple (RDF-star), e.g. `<< :alice :knows :bob >>`
    QuotedTriple(Box<Triple<'a>>),

    /// Query variable, e.g. `?task` (only meaningful in patterns)
    Variable(VarName<'a>),
}

impl<'a> Node<'a> {
    /// Create an IRI node without syntax validation
    pub fn iri(iri: &'a str) -> Self {
        Node::Iri(IriRef(iri))
    }

    /// Create an IRI node, validating absolute-IRI syntax
    pub fn try_iri(iri: &'a str) -> Result<Self> {
        IriRef::parse(iri).map(Node::Iri)
    }

    /// Create a simple string literal
    pub fn literal_str(value: &'a str) -> Self {
        Node::Literal(Literal {
            lexical: value,
            language: None,
            direction: None,
            datatype: None,
        })
    }

    /// Create a language-tagged literal (tag must already be lowercase)
    pub fn literal_lang(value: &'a str, language: &'a str) -> Self {
        Node::Literal(Literal {
            lexical: value,
            language: Some(language),
            direction: None,
            datatype: None,
        })
    }

    /// Create a directional language-tagged literal
    pub fn literal_dir(value: &'a str, language: &'a str, direction: Direction) -> Self {
        Node::Literal(Literal {
            lexical: value,
            language: Some(language),
            direction: Some(direction),
            datatype: None,
        })
    }

    /// Create a typed literal
    pub fn literal_typed(value: &'a str, datatype: &'a str) -> Self {
        Node::Literal(Literal {
            lexical: value,
            language: None,
            direction: None,
            datatype: Some(datatype),
        })
    }

    /// Create a blank node
    pub fn blank(id: u64) -> Self {
        Node::BlankNode(BlankNodeId(id))
    }

    /// Create a query variable
    pub fn variable(name: &'a str) -> Self {
        Node::Variable(VarName(name))
    }

    /// Create a quoted triple node (RDF-star)
    pub fn quoted(triple: Triple<'a>) -> Self {
        Node::QuotedTriple(Box::new(triple))
    }

    /// Whether this node is an IRI
    pub fn is_iri(&self) -> bool {
        matches!(self, Node::Iri(_))
    }

    /// Whether this node is a literal
    pub fn is_literal(&self) -> bool {
        matches!(self, Node::Literal(_))
    }

    /// Whether this node is a blank node
    pub fn is_blank(&self) -> bool {
        matches!(self, Node::BlankNode(_))
    }

    /// Whether this node is a quoted triple
    pub fn is_quoted(&self) -> bool {
        matches!(self, Node::QuotedTriple(_))
    }

    /// Whether this node is a variable
    pub fn is_variable(&self) -> bool {
        matches!(self, Node::Variable(_))
    }

    /// View as IRI reference
    pub fn as_iri(&self) -> Option<&IriRef<'a>> {
        match self {
            Node::Iri(iri) => Some(iri),
            _ => None,
        }
    }

    /// View as literal
    pub fn as_literal(&self) -> Option<&Literal<'a>> {
        match self {
            Node::Literal(lit) => Some(lit),
            _ => None,
        }
    }

    /// View as blank node id
    pub fn as_blank(&self) -> Option<BlankNodeId> {
        match self {
            Node::BlankNode(id) => Some(*id),
            _ => None,
        }
    }

    /// View as quoted triple
    pub fn as_quoted(&self) -> Option<&Triple<'a>> {
        match self {
            Node::QuotedTriple(t) => Some(t),
            _ => None,
        }
    }

    /// View as variable
    pub fn as_variable(&self) -> Option<&VarName<'a>> {
        match self {
            Node::Variable(v) => Some(v),
            _ => None,
        }
    }
}

impl<'a> fmt::Debug for Node<'a> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Node::Iri(iri) => write!(f, "Iri({})", iri.0),
            Node::Literal(lit) => write!(f, "Literal({lit:?})"),
            Node::BlankNode(id) => write!(f, "BlankNode({})", id.0),
            Node::QuotedTriple(t) => write!(f, "QuotedTriple({t:?})"),
            Node::Variable(v) => write!(f, "Variable({})", v.0),
        }
    }
}

impl<'a> fmt::Display for Node<'a> {
    /// Canonical N-Triples-style rendering, including `<< .. >>` for quoted
    /// triples and `@lang--dir` suffixes for directional literals. This is
    /// the one canonical text form, shared by the serializers and by the
    /// dedup keys of CONSTRUCT/DESCRIBE.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Node::Iri(iri) => write!(f, "<{}>", iri.0),
            Node::Literal(lit) => write!(f, "{lit}"),
            Node::BlankNode(id) => write!(f, "_:b{}", id.0),
            Node::QuotedTriple(t) => write!(f, "<< {} {} {} >>", t.subject, t.predicate, t.object),
            Node::Variable(v) => write!(f, "?{}", v.0),
        }
    }
}

/// IRI reference (borrowed string, assumed interned)
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct IriRef<'a>(pub &'a str);

impl<'a> IriRef<'a> {
    /// Validate and wrap an absolute IRI
    ///
    /// Accepts `scheme ":" ...` with a syntactically valid scheme and no
    /// whitespace or angle-bracket characters anywhere.
    pub fn parse(s: &'a str) -> Result<Self> {
        if s.is_empty() {
            return Err(RdfError::InvalidIri("empty string".into()));
        }
        let colon = s
            .find(':')
            .ok_or_else(|| RdfError::InvalidIri(format!("no scheme in '{s}'")))?;
        let scheme = &s[..colon];
        let mut chars = scheme.chars();
        let valid_scheme = match chars.next() {
            Some(c) if c.is_ascii_alphabetic() => chars
                .all(|c| c.is_ascii_alphanumeric() || matches!(c, '+' | '-' | '.')),
            _ => false,
        };
        if !valid_scheme {
            return Err(RdfError::InvalidIri(format!("bad scheme in '{s}'")));
        }
        if let Some(c) = s
            .chars()
            .find(|c| c.is_whitespace() || c.is_control() || matches!(c, '<' | '>' | '"' | '{' | '}' | '|' | '\\' | '^' | '`'))
        {
            return Err(RdfError::InvalidIri(format!(
                "forbidden character {c:?} in '{s}'"
            )));
        }
        Ok(IriRef(s))
    }

    /// The full IRI string
    pub fn as_str(&self) -> &'a str {
        self.0
    }

    /// Namespace part (up to and including the last `#` or `/`)
    pub fn namespace(&self) -> &'a str {
        match self.0.rfind(['#', '/']) {
            Some(pos) => &self.0[..=pos],
            None => "",
        }
    }

    /// Local name (after the last `#` or `/`)
    pub fn local_name(&self) -> &'a str {
        match self.0.rfind(['#', '/']) {
            Some(pos) => &self.0[pos + 1..],
            None => self.0,
        }
    }
}

impl<'a> fmt::Debug for IriRef<'a> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "IriRef({})", self.0)
    }
}

impl<'a> fmt::Display for IriRef<'a> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "<{}>", self.0)
    }
}

/// Base direction of a directional language-tagged literal
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Direction {
    /// Left to right
    Ltr,
    /// Right to left
    Rtl,
}

impl Direction {
    /// Lowercase tag as written after `--` in Turtle
    pub fn as_str(self) -> &'static str {
        match self {
            Direction::Ltr => "ltr",
            Direction::Rtl => "rtl",
        }
    }

    /// Parse a direction tag; only `ltr` and `rtl` are valid
    pub fn parse(s: &str) -> Result<Self> {
        match s {
            "ltr" => Ok(Direction::Ltr),
            "rtl" => Ok(Direction::Rtl),
            other => Err(RdfError::InvalidLiteral(format!(
                "direction must be ltr or rtl, got '{other}'"
            ))),
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// RDF literal with optional language, direction, or datatype
///
/// Invariants (enforced by [`Literal::validated`], assumed elsewhere):
/// the lexical form is non-empty, datatype and language are mutually
/// exclusive, direction requires a language, and language tags are stored
/// lowercase.
#[derive(Clone, Copy)]
pub struct Literal<'a> {
    /// Lexical form
    pub lexical: &'a str,

    /// Language tag, lowercase (e.g. `en`, `ar`)
    pub language: Option<&'a str>,

    /// Base direction; only present together with a language
    pub direction: Option<Direction>,

    /// Datatype IRI (e.g. `http://www.w3.org/2001/XMLSchema#integer`)
    pub datatype: Option<&'a str>,
}

impl<'a> Literal<'a> {
    /// Construct a literal enforcing the term-model invariants
    ///
    /// The language tag is lowercased through `dict` before storage.
    pub fn validated(
        dict: &crate::Dictionary,
        lexical: &str,
        language: Option<&str>,
        direction: Option<Direction>,
        datatype: Option<&str>,
    ) -> Result<Literal<'a>> {
        if lexical.is_empty() {
            return Err(RdfError::InvalidLiteral("empty lexical form".into()));
        }
        if language.is_some() && datatype.is_some() {
            return Err(RdfError::InvalidLiteral(
                "language and datatype are mutually exclusive".into(),
            ));
        }
        if direction.is_some() && language.is_none() {
            return Err(RdfError::InvalidLiteral(
                "direction requires a language tag".into(),
            ));
        }
        let language = match language {
            Some(tag) if tag.is_empty() => {
                return Err(RdfError::InvalidLiteral("empty language tag".into()))
            }
            Some(tag) => Some(dict.intern(&tag.to_ascii_lowercase())),
            None => None,
        };
        Ok(Literal {
            lexical: dict.intern(lexical),
            language,
            direction,
            datatype: datatype.map(|dt| dict.intern(dt)),
        })
    }

    /// Whether this is a plain literal (no language, no datatype)
    pub fn is_plain(&self) -> bool {
        self.language.is_none() && self.datatype.is_none()
    }

    /// The datatype IRI under RDF 1.1 semantics
    ///
    /// A missing datatype on a language-less literal means `xsd:string`;
    /// language-tagged literals are `rdf:langString` or, with a direction,
    /// `rdf:dirLangString`.
    pub fn effective_datatype(&self) -> &'a str {
        if self.language.is_some() {
            if self.direction.is_some() {
                Vocabulary::RDF_DIR_LANG_STRING
            } else {
                Vocabulary::RDF_LANG_STRING
            }
        } else {
            self.datatype.unwrap_or(Vocabulary::XSD_STRING)
        }
    }

    /// Try to read the lexical form as an integer
    pub fn as_i64(&self) -> Option<i64> {
        self.lexical.parse().ok()
    }

    /// Try to read the lexical form as a float
    pub fn as_f64(&self) -> Option<f64> {
        self.lexical.parse().ok()
    }

    /// Try to read the lexical form as a boolean
    pub fn as_bool(&self) -> Option<bool> {
        match self.lexical {
            "true" | "1" => Some(true),
            "false" | "0" => Some(false),
            _ => None,
        }
    }
}

// RDF 1.1 literal equality: `"x"` and `"x"^^xsd:string` are the same term,
// so comparison and hashing go through the effective datatype.
impl<'a> PartialEq for Literal<'a> {
    fn eq(&self, other: &Self) -> bool {
        self.lexical == other.lexical
            && self.language == other.language
            && self.direction == other.direction
            && self.effective_datatype() == other.effective_datatype()
    }
}

impl<'a> Eq for Literal<'a> {}

impl<'a> Hash for Literal<'a> {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.lexical.hash(state);
        self.language.hash(state);
        self.direction.hash(state);
        self.effective_datatype().hash(state);
    }
}

impl<'a> fmt::Debug for Literal<'a> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Literal")
            .field("lexical", &self.lexical)
            .field("language", &self.language)
            .field("direction", &self.direction)
            .field("datatype", &self.datatype)
            .finish()
    }
}

impl<'a> fmt::Display for Literal<'a> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "\"{}\"", escape_literal(self.lexical))?;
        if let Some(lang) = self.language {
            write!(f, "@{lang}")?;
            if let Some(dir) = self.direction {
                write!(f, "--{dir}")?;
            }
        } else if let Some(dt) = self.datatype {
            write!(f, "^^<{dt}>")?;
        }
        Ok(())
    }
}

/// Escape a lexical form for N-Triples/Turtle quoting
pub fn escape_literal(s: &str) -> Cow<'_, str> {
    if !s.chars().any(|c| matches!(c, '"' | '\\' | '\n' | '\r' | '\t')) {
        return Cow::Borrowed(s);
    }
    let mut out = String::with_capacity(s.len() + 2);
    for c in s.chars() {
        match c {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            other => out.push(other),
        }
    }
    Cow::Owned(out)
}

/// Blank node identifier (numeric, document-scoped)
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BlankNodeId(pub u64);

impl BlankNodeId {
    /// Wrap a raw identifier
    pub fn new(id: u64) -> Self {
        BlankNodeId(id)
    }

    /// The numeric identifier
    pub fn id(&self) -> u64 {
        self.0
    }
}

impl fmt::Debug for BlankNodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "BlankNodeId({})", self.0)
    }
}

impl fmt::Display for BlankNodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "_:b{}", self.0)
    }
}

/// Query variable name (without the `?`/`$` prefix)
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct VarName<'a>(pub &'a str);

impl<'a> VarName<'a> {
    /// Wrap a variable name
    pub fn new(name: &'a str) -> Self {
        VarName(name)
    }

    /// The name without prefix
    pub fn name(&self) -> &'a str {
        self.0
    }
}

// Map lookups by plain name (ordering agrees with the derived Ord)
impl<'a> std::borrow::Borrow<str> for VarName<'a> {
    fn borrow(&self) -> &str {
        self.0
    }
}

impl<'a> fmt::Debug for VarName<'a> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "VarName({})", self.0)
    }
}

impl<'a> fmt::Display for VarName<'a> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "?{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Dictionary;

    #[test]
    fn iri_validation() {
        assert!(IriRef::parse("http://example.org/x").is_ok());
        assert!(IriRef::parse("obsidian://vault/Notes%2FTask").is_ok());
        assert!(IriRef::parse("urn:uuid:1234").is_ok());
        assert!(IriRef::parse("").is_err());
        assert!(IriRef::parse("no-scheme-here").is_err());
        assert!(IriRef::parse("http://example.org/a b").is_err());
        assert!(IriRef::parse("1http://x/").is_err());
    }

    #[test]
    fn iri_namespace_and_local_name() {
        let iri = IriRef("http://example.org/ns#task");
        assert_eq!(iri.namespace(), "http://example.org/ns#");
        assert_eq!(iri.local_name(), "task");
    }

    #[test]
    fn plain_literal_equals_xsd_string() {
        let plain = Node::literal_str("x");
        let typed = Node::literal_typed("x", Vocabulary::XSD_STRING);
        let int = Node::literal_typed("x", Vocabulary::XSD_INTEGER);

        assert_eq!(plain, typed);
        assert_ne!(plain, int);
        assert_ne!(typed, int);
    }

    #[test]
    fn directional_literal_identity() {
        let rtl = Node::literal_dir("مرحبا", "ar", Direction::Rtl);
        let ltr = Node::literal_dir("مرحبا", "ar", Direction::Ltr);
        let tagged = Node::literal_lang("مرحبا", "ar");

        assert_ne!(rtl, ltr);
        assert_ne!(rtl, tagged);
        assert_eq!(rtl, Node::literal_dir("مرحبا", "ar", Direction::Rtl));
    }

    #[test]
    fn validated_lowercases_language() {
        let dict = Dictionary::new();
        let lit = Literal::validated(&dict, "Hello", Some("EN-GB"), None, None).unwrap();
        assert_eq!(lit.language, Some("en-gb"));
    }

    #[test]
    fn validated_rejects_invariant_violations() {
        let dict = Dictionary::new();
        assert!(Literal::validated(&dict, "", None, None, None).is_err());
        assert!(Literal::validated(&dict, "x", Some("en"), None, Some(Vocabulary::XSD_STRING)).is_err());
        assert!(Literal::validated(&dict, "x", None, Some(Direction::Rtl), None).is_err());
    }

    #[test]
    fn display_forms() {
        let iri = Node::iri("http://example.org/r");
        assert_eq!(iri.to_string(), "<http://example.org/r>");

        let dir = Node::literal_dir("שלום", "he", Direction::Rtl);
        assert_eq!(dir.to_string(), "\"שלום\"@he--rtl");

        let typed = Node::literal_typed("42", Vocabulary::XSD_INTEGER);
        assert_eq!(
            typed.to_string(),
            "\"42\"^^<http://www.w3.org/2001/XMLSchema#integer>"
        );

        let escaped = Node::literal_str("line\n\"quoted\"");
        assert_eq!(escaped.to_string(), "\"line\\n\\\"quoted\\\"\"");
    }

    #[test]
    fn quoted_triple_equality_is_structural() {
        let t = || {
            Triple::try_new(
                Node::iri("http://example.org/alice"),
                Node::iri("http://example.org/knows"),
                Node::iri("http://example.org/bob"),
            )
            .unwrap()
        };
        assert_eq!(Node::quoted(t()), Node::quoted(t()));
    }
}
