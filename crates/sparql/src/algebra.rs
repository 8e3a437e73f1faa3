//! SPARQL query algebra
//!
//! Tagged-tree representation of parsed queries, produced by the parser
//! and walked bottom-up by the executors. All nodes are zero-copy with
//! borrowed lifetimes; strings come out of the engine dictionary.

use rdf_model::{Node, VarName};

/// Pattern element: variable, concrete term, or quoted-triple pattern
///
/// Quoted patterns may nest variables at any depth, which is what lets a
/// query match inside an RDF-star term (`<< ?who :knows :bob >> :source ?src`).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum TermPattern<'a> {
    /// Variable position
    Var(VarName<'a>),
    /// Concrete term
    Node(Node<'a>),
    /// Quoted-triple pattern, possibly with embedded variables
    Quoted(Box<QuotedPattern<'a>>),
}

impl<'a> TermPattern<'a> {
    /// Whether this element is a variable
    pub fn is_var(&self) -> bool {
        matches!(self, TermPattern::Var(_))
    }

    /// The concrete node, when the element is one (not for quoted patterns)
    pub fn as_node(&self) -> Option<&Node<'a>> {
        match self {
            TermPattern::Node(n) => Some(n),
            _ => None,
        }
    }

    /// Collect every variable mentioned, depth-first
    pub fn collect_vars(&self, out: &mut Vec<VarName<'a>>) {
        match self {
            TermPattern::Var(v) => out.push(*v),
            TermPattern::Node(_) => {}
            TermPattern::Quoted(q) => {
                q.subject.collect_vars(out);
                q.predicate.collect_vars(out);
                q.object.collect_vars(out);
            }
        }
    }
}

/// Quoted-triple pattern (subject, predicate, object elements)
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct QuotedPattern<'a> {
    /// Subject element
    pub subject: TermPattern<'a>,
    /// Predicate element (variable or IRI)
    pub predicate: TermPattern<'a>,
    /// Object element
    pub object: TermPattern<'a>,
}

/// Predicate position of a triple pattern: plain element or property path
#[derive(Debug, Clone, PartialEq)]
pub enum PredicatePattern<'a> {
    /// Plain predicate element (variable or IRI)
    Term(TermPattern<'a>),
    /// Property path expression
    Path(PropertyPath<'a>),
}

/// One triple pattern of a basic graph pattern
#[derive(Debug, Clone, PartialEq)]
pub struct TriplePattern<'a> {
    /// Subject element
    pub subject: TermPattern<'a>,
    /// Predicate element or path
    pub predicate: PredicatePattern<'a>,
    /// Object element
    pub object: TermPattern<'a>,
}

impl<'a> TriplePattern<'a> {
    /// Pattern with a plain (non-path) predicate
    pub fn new(
        subject: TermPattern<'a>,
        predicate: TermPattern<'a>,
        object: TermPattern<'a>,
    ) -> Self {
        Self {
            subject,
            predicate: PredicatePattern::Term(predicate),
            object,
        }
    }
}

/// Property path expression
#[derive(Debug, Clone, PartialEq)]
pub enum PropertyPath<'a> {
    /// Direct predicate IRI
    Predicate(Node<'a>),
    /// Inverse path `^p`
    Inverse(Box<PropertyPath<'a>>),
    /// Sequence `p1 / p2`
    Sequence(Box<PropertyPath<'a>>, Box<PropertyPath<'a>>),
    /// Alternative `p1 | p2`
    Alternative(Box<PropertyPath<'a>>, Box<PropertyPath<'a>>),
    /// Reflexive-transitive closure `p*`
    ZeroOrMore(Box<PropertyPath<'a>>),
    /// Transitive closure `p+`
    OneOrMore(Box<PropertyPath<'a>>),
    /// Optional step `p?`
    ZeroOrOne(Box<PropertyPath<'a>>),
    /// Negated property set `!(p1 | p2 | ...)`
    NegatedPropertySet(Vec<Node<'a>>),
}

/// Variable or concrete node (GRAPH names, DESCRIBE resources)
#[derive(Debug, Clone, PartialEq)]
pub enum VarOrNode<'a> {
    /// Variable
    Var(VarName<'a>),
    /// Concrete node
    Node(Node<'a>),
}

/// Algebra operator tree
#[derive(Debug, Clone, PartialEq)]
pub enum Algebra<'a> {
    /// Basic graph pattern: conjunctive triple patterns in source order
    Bgp(Vec<TriplePattern<'a>>),

    /// Join of two operands
    Join {
        /// Left operand
        left: Box<Algebra<'a>>,
        /// Right operand
        right: Box<Algebra<'a>>,
    },

    /// OPTIONAL with an optional join condition
    LeftJoin {
        /// Required pattern
        left: Box<Algebra<'a>>,
        /// Optional pattern
        right: Box<Algebra<'a>>,
        /// Join condition evaluated over the merged row
        expr: Option<Expression<'a>>,
    },

    /// FILTER over the inner solutions
    Filter {
        /// Constraint expression
        expr: Expression<'a>,
        /// Input operator
        input: Box<Algebra<'a>>,
    },

    /// UNION of two alternatives
    Union {
        /// First alternative
        left: Box<Algebra<'a>>,
        /// Second alternative
        right: Box<Algebra<'a>>,
    },

    /// MINUS (remove left rows with a compatible, domain-overlapping right row)
    Minus {
        /// Base pattern
        left: Box<Algebra<'a>>,
        /// Pattern whose solutions are removed
        right: Box<Algebra<'a>>,
    },

    /// GRAPH clause
    Graph {
        /// Graph name or variable ranging over named graphs
        graph: VarOrNode<'a>,
        /// Pattern evaluated inside the graph
        input: Box<Algebra<'a>>,
    },

    /// BIND (extend each row with a computed binding)
    Extend {
        /// Target variable
        var: VarName<'a>,
        /// Expression to evaluate per row
        expr: Expression<'a>,
        /// Input operator
        input: Box<Algebra<'a>>,
    },

    /// Projection to a set of variables
    Project {
        /// Variables to keep
        vars: Vec<VarName<'a>>,
        /// Input operator
        input: Box<Algebra<'a>>,
    },

    /// DISTINCT
    Distinct {
        /// Input operator
        input: Box<Algebra<'a>>,
    },

    /// REDUCED (executed as DISTINCT)
    Reduced {
        /// Input operator
        input: Box<Algebra<'a>>,
    },

    /// ORDER BY
    OrderBy {
        /// Sort conditions, most significant first
        conditions: Vec<OrderCondition<'a>>,
        /// Input operator
        input: Box<Algebra<'a>>,
    },

    /// OFFSET/LIMIT
    Slice {
        /// Rows to skip
        start: Option<usize>,
        /// Maximum rows to emit
        length: Option<usize>,
        /// Input operator
        input: Box<Algebra<'a>>,
    },

    /// GROUP BY with aggregates
    Group {
        /// Grouping variables
        vars: Vec<VarName<'a>>,
        /// Aggregate computations with their output variables
        aggregates: Vec<(VarName<'a>, Aggregate<'a>)>,
        /// Input operator
        input: Box<Algebra<'a>>,
    },

    /// VALUES inline data
    Table {
        /// Table variables
        vars: Vec<VarName<'a>>,
        /// Rows; `None` is UNDEF
        rows: Vec<Vec<Option<Node<'a>>>>,
    },

    /// LATERAL: evaluate `right` once per `left` row with its bindings in scope
    Lateral {
        /// Outer operand
        left: Box<Algebra<'a>>,
        /// Correlated inner operand
        right: Box<Algebra<'a>>,
    },
}

/// Expression tree for FILTER / BIND / ORDER BY / HAVING
#[derive(Debug, Clone, PartialEq)]
pub enum Expression<'a> {
    /// Variable reference
    Var(VarName<'a>),
    /// Constant term
    Constant(Node<'a>),
    /// `||`
    Or(Box<Expression<'a>>, Box<Expression<'a>>),
    /// `&&`
    And(Box<Expression<'a>>, Box<Expression<'a>>),
    /// `=`
    Equal(Box<Expression<'a>>, Box<Expression<'a>>),
    /// `!=`
    NotEqual(Box<Expression<'a>>, Box<Expression<'a>>),
    /// `<`
    Less(Box<Expression<'a>>, Box<Expression<'a>>),
    /// `>`
    Greater(Box<Expression<'a>>, Box<Expression<'a>>),
    /// `<=`
    LessOrEqual(Box<Expression<'a>>, Box<Expression<'a>>),
    /// `>=`
    GreaterOrEqual(Box<Expression<'a>>, Box<Expression<'a>>),
    /// `IN`
    In(Box<Expression<'a>>, Vec<Expression<'a>>),
    /// `NOT IN`
    NotIn(Box<Expression<'a>>, Vec<Expression<'a>>),
    /// `+`
    Add(Box<Expression<'a>>, Box<Expression<'a>>),
    /// `-`
    Subtract(Box<Expression<'a>>, Box<Expression<'a>>),
    /// `*`
    Multiply(Box<Expression<'a>>, Box<Expression<'a>>),
    /// `/`
    Divide(Box<Expression<'a>>, Box<Expression<'a>>),
    /// Unary `-`
    Negate(Box<Expression<'a>>),
    /// Unary `!`
    Not(Box<Expression<'a>>),
    /// Builtin function
    Builtin(BuiltinFunction<'a>),
    /// Extension function (or XSD cast) referenced by IRI
    FunctionCall {
        /// Function IRI
        iri: &'a str,
        /// Arguments in call order
        args: Vec<Expression<'a>>,
    },
    /// EXISTS group pattern
    Exists(Box<Algebra<'a>>),
    /// NOT EXISTS group pattern
    NotExists(Box<Algebra<'a>>),
}

/// Builtin SPARQL functions used in expressions
#[derive(Debug, Clone, PartialEq)]
pub enum BuiltinFunction<'a> {
    // Term accessors and constructors
    /// STR - lexical/IRI string of a term
    Str(Box<Expression<'a>>),
    /// LANG - language tag or ""
    Lang(Box<Expression<'a>>),
    /// LANGDIR - base direction tag or "" (SPARQL 1.2)
    LangDir(Box<Expression<'a>>),
    /// DATATYPE - datatype IRI of a literal
    Datatype(Box<Expression<'a>>),
    /// IRI/URI - construct an IRI from a string
    Iri(Box<Expression<'a>>),
    /// STRLANG - language-tagged literal
    StrLang(Box<Expression<'a>>, Box<Expression<'a>>),
    /// STRLANGDIR - directional language-tagged literal (SPARQL 1.2)
    StrLangDir(
        Box<Expression<'a>>,
        Box<Expression<'a>>,
        Box<Expression<'a>>,
    ),
    /// STRDT - typed literal
    StrDt(Box<Expression<'a>>, Box<Expression<'a>>),
    /// BNODE - fresh or labeled blank node
    BNode(Option<Box<Expression<'a>>>),
    /// UUID - urn:uuid IRI
    Uuid,
    /// STRUUID - uuid string literal
    StrUuid,

    // RDF-star accessors (SPARQL 1.2)
    /// TRIPLE - build a quoted triple from three terms
    TripleFn(
        Box<Expression<'a>>,
        Box<Expression<'a>>,
        Box<Expression<'a>>,
    ),
    /// SUBJECT of a quoted triple
    SubjectFn(Box<Expression<'a>>),
    /// PREDICATE of a quoted triple
    PredicateFn(Box<Expression<'a>>),
    /// OBJECT of a quoted triple
    ObjectFn(Box<Expression<'a>>),
    /// isTRIPLE test
    IsTriple(Box<Expression<'a>>),

    // Strings
    /// STRLEN
    StrLen(Box<Expression<'a>>),
    /// SUBSTR(str, start [, len]) with 1-based start
    Substr(
        Box<Expression<'a>>,
        Box<Expression<'a>>,
        Option<Box<Expression<'a>>>,
    ),
    /// UCASE
    UCase(Box<Expression<'a>>),
    /// LCASE
    LCase(Box<Expression<'a>>),
    /// STRSTARTS
    StrStarts(Box<Expression<'a>>, Box<Expression<'a>>),
    /// STRENDS
    StrEnds(Box<Expression<'a>>, Box<Expression<'a>>),
    /// CONTAINS
    Contains(Box<Expression<'a>>, Box<Expression<'a>>),
    /// STRBEFORE
    StrBefore(Box<Expression<'a>>, Box<Expression<'a>>),
    /// STRAFTER
    StrAfter(Box<Expression<'a>>, Box<Expression<'a>>),
    /// ENCODE_FOR_URI
    EncodeForUri(Box<Expression<'a>>),
    /// CONCAT
    Concat(Vec<Expression<'a>>),
    /// LANGMATCHES
    LangMatches(Box<Expression<'a>>, Box<Expression<'a>>),
    /// REPLACE(str, pattern, replacement [, flags])
    Replace(
        Box<Expression<'a>>,
        Box<Expression<'a>>,
        Box<Expression<'a>>,
        Option<Box<Expression<'a>>>,
    ),
    /// REGEX(str, pattern [, flags])
    Regex(
        Box<Expression<'a>>,
        Box<Expression<'a>>,
        Option<Box<Expression<'a>>>,
    ),

    // Numerics
    /// ABS
    Abs(Box<Expression<'a>>),
    /// ROUND
    Round(Box<Expression<'a>>),
    /// CEIL
    Ceil(Box<Expression<'a>>),
    /// FLOOR
    Floor(Box<Expression<'a>>),
    /// RAND
    Rand,

    // Date/time helpers
    /// NOW
    Now,
    /// YEAR
    Year(Box<Expression<'a>>),
    /// MONTH
    Month(Box<Expression<'a>>),
    /// DAY
    Day(Box<Expression<'a>>),
    /// HOURS
    Hours(Box<Expression<'a>>),
    /// MINUTES
    Minutes(Box<Expression<'a>>),
    /// SECONDS
    Seconds(Box<Expression<'a>>),
    /// TIMEZONE (as xsd:dayTimeDuration)
    Timezone(Box<Expression<'a>>),
    /// TZ (as plain string)
    Tz(Box<Expression<'a>>),

    // Tests
    /// isIRI / isURI
    IsIri(Box<Expression<'a>>),
    /// isBLANK
    IsBlank(Box<Expression<'a>>),
    /// isLITERAL
    IsLiteral(Box<Expression<'a>>),
    /// isNUMERIC
    IsNumeric(Box<Expression<'a>>),
    /// BOUND
    Bound(VarName<'a>),
    /// sameTerm
    SameTerm(Box<Expression<'a>>, Box<Expression<'a>>),

    // Control
    /// COALESCE - first successfully evaluated argument
    Coalesce(Vec<Expression<'a>>),
    /// IF(cond, then, else)
    If(
        Box<Expression<'a>>,
        Box<Expression<'a>>,
        Box<Expression<'a>>,
    ),
}

/// Aggregate computations
#[derive(Debug, Clone, PartialEq)]
pub enum Aggregate<'a> {
    /// COUNT; `expr: None` is COUNT(*)
    Count {
        /// Counted expression (None counts rows)
        expr: Option<Box<Expression<'a>>>,
        /// Count only distinct values
        distinct: bool,
    },
    /// SUM (typed xsd:decimal)
    Sum {
        /// Summed expression
        expr: Box<Expression<'a>>,
        /// Sum only distinct values
        distinct: bool,
    },
    /// MIN
    Min {
        /// Compared expression
        expr: Box<Expression<'a>>,
        /// Consider only distinct values
        distinct: bool,
    },
    /// MAX
    Max {
        /// Compared expression
        expr: Box<Expression<'a>>,
        /// Consider only distinct values
        distinct: bool,
    },
    /// AVG (typed xsd:decimal)
    Avg {
        /// Averaged expression
        expr: Box<Expression<'a>>,
        /// Average only distinct values
        distinct: bool,
    },
    /// SAMPLE - an arbitrary value of the group
    Sample {
        /// Sampled expression
        expr: Box<Expression<'a>>,
        /// Sample from distinct values
        distinct: bool,
    },
    /// GROUP_CONCAT
    GroupConcat {
        /// Concatenated expression
        expr: Box<Expression<'a>>,
        /// Separator (default single space)
        separator: Option<&'a str>,
        /// Concatenate only distinct values
        distinct: bool,
    },
    /// Extension aggregate referenced by IRI, resolved in the registry
    Custom {
        /// Aggregate IRI
        iri: &'a str,
        /// Stepped expression
        expr: Box<Expression<'a>>,
        /// Step only distinct values
        distinct: bool,
    },
}

/// One ORDER BY condition
#[derive(Debug, Clone, PartialEq)]
pub struct OrderCondition<'a> {
    /// Sort key expression
    pub expr: Expression<'a>,
    /// Ascending (false = DESC)
    pub ascending: bool,
}

/// SELECT projection
#[derive(Debug, Clone, PartialEq)]
pub enum Projection<'a> {
    /// `SELECT *`
    All,
    /// Explicit variable list (aliases included, in source order)
    Variables(Vec<VarName<'a>>),
}

/// DESCRIBE traversal options
///
/// The default path is symmetric with unlimited depth; the asymmetric
/// branch is carried for hosts that want outgoing-only descriptions.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DescribeOptions {
    /// Breadth-first expansion depth (None = unlimited)
    pub depth: Option<usize>,
    /// Also follow incoming triples (resource in object position)
    pub symmetric: bool,
}

impl Default for DescribeOptions {
    fn default() -> Self {
        Self {
            depth: None,
            symmetric: true,
        }
    }
}

/// Parsed query
#[derive(Debug, Clone, PartialEq)]
pub enum Query<'a> {
    /// SELECT - variable bindings
    Select {
        /// Projection (ordering of result variables)
        projection: Projection<'a>,
        /// Fully lowered pattern (modifiers folded in)
        pattern: Algebra<'a>,
        /// LIMIT as written (engine applies defaults/caps)
        limit: Option<usize>,
        /// OFFSET as written
        offset: Option<usize>,
    },
    /// CONSTRUCT - instantiated template triples
    Construct {
        /// Template triple patterns
        template: Vec<TriplePattern<'a>>,
        /// WHERE pattern
        pattern: Algebra<'a>,
        /// LIMIT over the solution stream
        limit: Option<usize>,
        /// OFFSET over the solution stream
        offset: Option<usize>,
    },
    /// DESCRIBE - triples describing resources
    Describe {
        /// Resources (IRIs or variables bound by the pattern)
        resources: Vec<VarOrNode<'a>>,
        /// Optional WHERE pattern binding resource variables
        pattern: Option<Algebra<'a>>,
        /// Traversal options
        options: DescribeOptions,
    },
    /// ASK - boolean
    Ask {
        /// WHERE pattern
        pattern: Algebra<'a>,
    },
}

/// Quad pattern in update operations
#[derive(Debug, Clone, PartialEq)]
pub struct QuadPattern<'a> {
    /// Subject element
    pub subject: TermPattern<'a>,
    /// Predicate element
    pub predicate: TermPattern<'a>,
    /// Object element
    pub object: TermPattern<'a>,
    /// Graph (None = default graph)
    pub graph: Option<VarOrNode<'a>>,
}

impl<'a> QuadPattern<'a> {
    /// First variable mentioned anywhere in the quad, if any
    pub fn first_var(&self) -> Option<VarName<'a>> {
        let mut vars = Vec::new();
        self.subject.collect_vars(&mut vars);
        self.predicate.collect_vars(&mut vars);
        self.object.collect_vars(&mut vars);
        if let Some(VarOrNode::Var(v)) = &self.graph {
            vars.push(*v);
        }
        vars.into_iter().next()
    }
}

/// Target of CLEAR / DROP and the graph-management operations
#[derive(Debug, Clone, PartialEq)]
pub enum GraphTarget<'a> {
    /// The default graph
    Default,
    /// One named graph
    Named(Node<'a>),
    /// Every named graph
    AllNamed,
    /// Default and named graphs
    All,
}

/// One update operation
#[derive(Debug, Clone, PartialEq)]
pub enum Update<'a> {
    /// INSERT DATA with concrete quads
    InsertData {
        /// Quads to add (variables are illegal)
        quads: Vec<QuadPattern<'a>>,
    },
    /// DELETE DATA with concrete quads
    DeleteData {
        /// Quads to remove (variables are illegal)
        quads: Vec<QuadPattern<'a>>,
    },
    /// DELETE/INSERT with WHERE clause
    DeleteInsert {
        /// Quad patterns to delete per solution
        delete: Vec<QuadPattern<'a>>,
        /// Quad patterns to insert per solution
        insert: Vec<QuadPattern<'a>>,
        /// WHERE pattern
        pattern: Algebra<'a>,
    },
    /// DELETE WHERE shorthand
    DeleteWhere {
        /// Patterns used both for matching and deletion
        quads: Vec<QuadPattern<'a>>,
    },
    /// LOAD a document into a graph (not executed)
    Load {
        /// Source IRI
        source: &'a str,
        /// Target graph (None = default)
        target: Option<Node<'a>>,
        /// Ignore errors
        silent: bool,
    },
    /// CLEAR a graph's triples
    Clear {
        /// Target graph(s)
        target: GraphTarget<'a>,
        /// Ignore missing graphs
        silent: bool,
    },
    /// CREATE a named graph (no-op; graphs are implicit)
    Create {
        /// Graph IRI
        graph: Node<'a>,
        /// Ignore pre-existing graphs
        silent: bool,
    },
    /// DROP a graph
    Drop {
        /// Target graph(s)
        target: GraphTarget<'a>,
        /// Ignore missing graphs
        silent: bool,
    },
    /// COPY between graphs (not executed)
    Copy {
        /// Source
        from: GraphTarget<'a>,
        /// Destination
        to: GraphTarget<'a>,
        /// Ignore errors
        silent: bool,
    },
    /// MOVE between graphs (not executed)
    Move {
        /// Source
        from: GraphTarget<'a>,
        /// Destination
        to: GraphTarget<'a>,
        /// Ignore errors
        silent: bool,
    },
    /// ADD between graphs (not executed)
    Add {
        /// Source
        from: GraphTarget<'a>,
        /// Destination
        to: GraphTarget<'a>,
        /// Ignore errors
        silent: bool,
    },
}

/// A parsed update request: ordered operations executed sequentially
#[derive(Debug, Clone, PartialEq, Default)]
pub struct UpdateRequest<'a> {
    /// Operations in source order
    pub operations: Vec<Update<'a>>,
}
