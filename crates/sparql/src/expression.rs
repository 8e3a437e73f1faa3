//! Expression and builtin evaluation
//!
//! SPARQL error semantics: an expression evaluates to a term, to "unbound"
//! (`Ok(None)`), or to an error. FILTER and aggregate callers absorb
//! errors by dropping the row or value; all other callers propagate.

use crate::algebra::{BuiltinFunction, Expression};
use crate::{Binding, BindingSet, Executor, QueryError, QueryResult};
use rdf_model::{Direction, Node, Triple, Vocabulary};
use std::cmp::Ordering;

impl<'a, 's> Executor<'a, 's> {
    /// Evaluate an expression against one solution
    pub fn eval_expression(
        &self,
        expr: &Expression<'a>,
        row: &Binding<'a>,
    ) -> QueryResult<Option<Node<'a>>> {
        match expr {
            Expression::Var(var) => Ok(row.get(var).cloned()),
            Expression::Constant(node) => Ok(Some(node.clone())),

            Expression::Or(left, right) => {
                let l = self.bool_operand(left, row);
                let r = self.bool_operand(right, row);
                Ok(Some(self.bool_node(l || r)))
            }
            Expression::And(left, right) => {
                let l = self.bool_operand(left, row);
                let r = self.bool_operand(right, row);
                Ok(Some(self.bool_node(l && r)))
            }
            Expression::Not(inner) => {
                let v = self.bool_operand(inner, row);
                Ok(Some(self.bool_node(!v)))
            }

            Expression::Equal(left, right) => self.binary(left, right, row, |this, l, r| {
                Some(this.bool_node(this.terms_equal(&l, &r)))
            }),
            Expression::NotEqual(left, right) => self.binary(left, right, row, |this, l, r| {
                Some(this.bool_node(!this.terms_equal(&l, &r)))
            }),
            Expression::Less(left, right) => self.ordering(left, right, row, Ordering::is_lt),
            Expression::Greater(left, right) => self.ordering(left, right, row, Ordering::is_gt),
            Expression::LessOrEqual(left, right) => {
                self.ordering(left, right, row, Ordering::is_le)
            }
            Expression::GreaterOrEqual(left, right) => {
                self.ordering(left, right, row, Ordering::is_ge)
            }

            Expression::In(needle, list) => {
                let value = self.eval_expression(needle, row)?;
                for item in list {
                    let candidate = self.eval_expression(item, row)?;
                    if let (Some(v), Some(c)) = (&value, &candidate) {
                        if self.terms_equal(v, c) {
                            return Ok(Some(self.bool_node(true)));
                        }
                    }
                }
                Ok(Some(self.bool_node(false)))
            }
            Expression::NotIn(needle, list) => {
                let inner = Expression::In(needle.clone(), list.clone());
                let result = self.eval_expression(&inner, row)?;
                Ok(result.map(|n| self.bool_node(!self.ebv(&n))))
            }

            Expression::Add(l, r) => self.arithmetic(l, r, row, |a, b| Some(a + b)),
            Expression::Subtract(l, r) => self.arithmetic(l, r, row, |a, b| Some(a - b)),
            Expression::Multiply(l, r) => self.arithmetic(l, r, row, |a, b| Some(a * b)),
            Expression::Divide(l, r) => {
                self.arithmetic(l, r, row, |a, b| if b == 0.0 { None } else { Some(a / b) })
            }
            Expression::Negate(inner) => {
                let value = self.eval_expression(inner, row)?;
                match value {
                    None => Ok(None),
                    Some(v) => {
                        let n = self.numeric_value(&v).ok_or_else(|| {
                            QueryError::Type("unary minus on a non-numeric value".into())
                        })?;
                        Ok(Some(self.decimal_like_node(-n, &v)))
                    }
                }
            }

            Expression::Builtin(builtin) => self.eval_builtin(builtin, row),

            Expression::FunctionCall { iri, args } => self.eval_function(iri, args, row),

            Expression::Exists(pattern) => {
                let rows = self.eval(pattern, BindingSet::from_rows(vec![row.clone()]))?;
                Ok(Some(self.bool_node(!rows.is_empty())))
            }
            Expression::NotExists(pattern) => {
                let rows = self.eval(pattern, BindingSet::from_rows(vec![row.clone()]))?;
                Ok(Some(self.bool_node(rows.is_empty())))
            }
        }
    }

    /// Evaluate as a filter condition: error and unbound are both false
    pub(crate) fn effective_boolean(&self, expr: &Expression<'a>, row: &Binding<'a>) -> bool {
        match self.eval_expression(expr, row) {
            Ok(Some(node)) => self.ebv(&node),
            _ => false,
        }
    }

    fn bool_operand(&self, expr: &Expression<'a>, row: &Binding<'a>) -> bool {
        self.effective_boolean(expr, row)
    }

    fn binary(
        &self,
        left: &Expression<'a>,
        right: &Expression<'a>,
        row: &Binding<'a>,
        f: impl FnOnce(&Self, Node<'a>, Node<'a>) -> Option<Node<'a>>,
    ) -> QueryResult<Option<Node<'a>>> {
        let l = self.eval_expression(left, row)?;
        let r = self.eval_expression(right, row)?;
        match (l, r) {
            (Some(l), Some(r)) => Ok(f(self, l, r)),
            _ => Ok(None),
        }
    }

    fn ordering(
        &self,
        left: &Expression<'a>,
        right: &Expression<'a>,
        row: &Binding<'a>,
        accept: fn(Ordering) -> bool,
    ) -> QueryResult<Option<Node<'a>>> {
        self.binary(left, right, row, |this, l, r| {
            Some(this.bool_node(accept(this.compare_terms(&l, &r))))
        })
    }

    fn arithmetic(
        &self,
        left: &Expression<'a>,
        right: &Expression<'a>,
        row: &Binding<'a>,
        f: fn(f64, f64) -> Option<f64>,
    ) -> QueryResult<Option<Node<'a>>> {
        let l = self.eval_expression(left, row)?;
        let r = self.eval_expression(right, row)?;
        match (l, r) {
            (Some(l), Some(r)) => {
                let (ln, rn) = match (self.numeric_value(&l), self.numeric_value(&r)) {
                    (Some(a), Some(b)) => (a, b),
                    _ => return Err(QueryError::Type("non-numeric operand".into())),
                };
                match f(ln, rn) {
                    Some(value) => Ok(Some(self.decimal_node(value))),
                    None => Err(QueryError::Type("division by zero".into())),
                }
            }
            _ => Ok(None),
        }
    }

    // ---- builtins -------------------------------------------------------

    fn eval_builtin(
        &self,
        builtin: &BuiltinFunction<'a>,
        row: &Binding<'a>,
    ) -> QueryResult<Option<Node<'a>>> {
        use BuiltinFunction as F;
        match builtin {
            F::Str(expr) => {
                let value = self.eval_expression(expr, row)?;
                Ok(value.map(|n| self.string_form(&n)))
            }
            F::Lang(expr) => {
                let value = self.eval_expression(expr, row)?;
                Ok(value.map(|n| match n {
                    Node::Literal(lit) => {
                        Node::literal_str(lit.language.unwrap_or(""))
                    }
                    _ => Node::literal_str(""),
                }))
            }
            F::LangDir(expr) => {
                let value = self.eval_expression(expr, row)?;
                Ok(value.map(|n| match n {
                    Node::Literal(lit) => Node::literal_str(
                        lit.direction.map(Direction::as_str).unwrap_or(""),
                    ),
                    _ => Node::literal_str(""),
                }))
            }
            F::Datatype(expr) => {
                let value = self.eval_expression(expr, row)?;
                Ok(value.and_then(|n| match n {
                    Node::Literal(lit) => Some(Node::iri(lit.effective_datatype())),
                    _ => None,
                }))
            }
            F::Iri(expr) => {
                let value = self.eval_expression(expr, row)?;
                match value {
                    None => Ok(None),
                    Some(v) => {
                        let s = self.string_value(&v).ok_or_else(|| {
                            QueryError::Type("IRI() needs a string".into())
                        })?;
                        let iri = rdf_model::IriRef::parse(self.dict.intern(s))?;
                        Ok(Some(Node::Iri(iri)))
                    }
                }
            }
            F::StrLang(s, lang) => self.binary(s, lang, row, |this, s, lang| {
                let (s, lang) = (this.string_value(&s)?, this.string_value(&lang)?);
                Some(Node::literal_lang(
                    this.dict.intern(s),
                    this.dict.intern(&lang.to_ascii_lowercase()),
                ))
            }),
            F::StrLangDir(s, lang, dir) => {
                let s = self.eval_expression(s, row)?;
                let lang = self.eval_expression(lang, row)?;
                let dir = self.eval_expression(dir, row)?;
                match (s, lang, dir) {
                    (Some(s), Some(lang), Some(dir)) => {
                        let direction = self
                            .string_value(&dir)
                            .and_then(|d| Direction::parse(d).ok())
                            .ok_or_else(|| {
                                QueryError::Type("STRLANGDIR direction must be ltr or rtl".into())
                            })?;
                        match (self.string_value(&s), self.string_value(&lang)) {
                            (Some(s), Some(lang)) => Ok(Some(Node::literal_dir(
                                self.dict.intern(s),
                                self.dict.intern(&lang.to_ascii_lowercase()),
                                direction,
                            ))),
                            _ => Ok(None),
                        }
                    }
                    _ => Ok(None),
                }
            }
            F::StrDt(s, datatype) => self.binary(s, datatype, row, |this, s, dt| {
                let lexical = this.string_value(&s)?;
                match dt {
                    Node::Iri(iri) => Some(Node::literal_typed(
                        this.dict.intern(lexical),
                        iri.as_str(),
                    )),
                    _ => None,
                }
            }),
            F::BNode(label) => match label {
                Some(expr) => {
                    let value = self.eval_expression(expr, row)?;
                    Ok(value.and_then(|v| {
                        self.string_value(&v).map(|label| {
                            use std::collections::hash_map::DefaultHasher;
                            use std::hash::{Hash, Hasher};
                            let mut hasher = DefaultHasher::new();
                            label.hash(&mut hasher);
                            Node::blank(hasher.finish())
                        })
                    }))
                }
                None => {
                    use rand::Rng;
                    Ok(Some(Node::blank(rand::thread_rng().gen())))
                }
            },
            F::Uuid => {
                let iri = format!("urn:uuid:{}", uuid::Uuid::new_v4());
                Ok(Some(Node::iri(self.dict.intern(&iri))))
            }
            F::StrUuid => {
                let id = uuid::Uuid::new_v4().to_string();
                Ok(Some(Node::literal_str(self.dict.intern(&id))))
            }

            // RDF-star accessors
            F::TripleFn(s, p, o) => {
                let s = self.eval_expression(s, row)?;
                let p = self.eval_expression(p, row)?;
                let o = self.eval_expression(o, row)?;
                match (s, p, o) {
                    (Some(s), Some(p), Some(o)) => {
                        let triple = Triple::try_new(s, p, o)?;
                        Ok(Some(Node::quoted(triple)))
                    }
                    _ => Ok(None),
                }
            }
            F::SubjectFn(expr) => {
                let value = self.eval_expression(expr, row)?;
                Ok(value
                    .and_then(|n| n.as_quoted().map(|t| t.subject.clone())))
            }
            F::PredicateFn(expr) => {
                let value = self.eval_expression(expr, row)?;
                Ok(value
                    .and_then(|n| n.as_quoted().map(|t| t.predicate.clone())))
            }
            F::ObjectFn(expr) => {
                let value = self.eval_expression(expr, row)?;
                Ok(value.and_then(|n| n.as_quoted().map(|t| t.object.clone())))
            }
            F::IsTriple(expr) => {
                let value = self.eval_expression(expr, row)?;
                Ok(Some(
                    self.bool_node(value.map(|n| n.is_quoted()).unwrap_or(false)),
                ))
            }

            // Strings
            F::StrLen(expr) => {
                let value = self.eval_expression(expr, row)?;
                Ok(value.and_then(|n| {
                    self.string_value(&n)
                        .map(|s| self.integer_node(s.chars().count() as i64))
                }))
            }
            F::Substr(s, start, length) => {
                let s_val = self.eval_expression(s, row)?;
                let start_val = self.eval_expression(start, row)?;
                let (s_val, start_val) = match (s_val, start_val) {
                    (Some(a), Some(b)) => (a, b),
                    _ => return Ok(None),
                };
                let text = self.string_value(&s_val).ok_or_else(|| {
                    QueryError::Type("SUBSTR needs a string".into())
                })?;
                let start_n = self.numeric_value(&start_val).ok_or_else(|| {
                    QueryError::Type("SUBSTR start must be numeric".into())
                })?;
                // SPARQL uses 1-based indexing
                let skip = (start_n as i64 - 1).max(0) as usize;
                let result: String = match length {
                    Some(length) => {
                        let length_val = self.eval_expression(length, row)?;
                        match length_val {
                            None => return Ok(None),
                            Some(l) => {
                                let take = self.numeric_value(&l).ok_or_else(|| {
                                    QueryError::Type("SUBSTR length must be numeric".into())
                                })?;
                                text.chars()
                                    .skip(skip)
                                    .take((take as i64).max(0) as usize)
                                    .collect()
                            }
                        }
                    }
                    None => text.chars().skip(skip).collect(),
                };
                Ok(Some(Node::literal_str(self.dict.intern(&result))))
            }
            F::UCase(expr) => self.map_string(expr, row, |s| s.to_uppercase()),
            F::LCase(expr) => self.map_string(expr, row, |s| s.to_lowercase()),
            F::StrStarts(a, b) => self.string_test(a, b, row, |s, t| s.starts_with(t)),
            F::StrEnds(a, b) => self.string_test(a, b, row, |s, t| s.ends_with(t)),
            F::Contains(a, b) => self.string_test(a, b, row, |s, t| s.contains(t)),
            F::StrBefore(a, b) => self.binary(a, b, row, |this, a, b| {
                let (s, t) = (this.string_value(&a)?, this.string_value(&b)?);
                let result = s.find(t).map(|pos| &s[..pos]).unwrap_or("");
                Some(Node::literal_str(this.dict.intern(result)))
            }),
            F::StrAfter(a, b) => self.binary(a, b, row, |this, a, b| {
                let (s, t) = (this.string_value(&a)?, this.string_value(&b)?);
                let result = s.find(t).map(|pos| &s[pos + t.len()..]).unwrap_or("");
                Some(Node::literal_str(this.dict.intern(result)))
            }),
            F::EncodeForUri(expr) => {
                self.map_string(expr, row, |s| urlencoding::encode(s).into_owned())
            }
            F::Concat(parts) => {
                let mut result = String::new();
                for part in parts {
                    match self.eval_expression(part, row)? {
                        Some(v) => match self.string_value(&v) {
                            Some(s) => result.push_str(s),
                            None => return Ok(None),
                        },
                        None => return Ok(None),
                    }
                }
                Ok(Some(Node::literal_str(self.dict.intern(&result))))
            }
            F::LangMatches(lang, range) => self.binary(lang, range, row, |this, lang, range| {
                let (lang, range) = (this.string_value(&lang)?, this.string_value(&range)?);
                let matched = if range == "*" {
                    !lang.is_empty()
                } else {
                    lang.eq_ignore_ascii_case(range)
                        || lang
                            .to_ascii_lowercase()
                            .starts_with(&format!("{}-", range.to_ascii_lowercase()))
                };
                Some(this.bool_node(matched))
            }),
            F::Replace(s, pattern, replacement, flags) => {
                let s_val = self.eval_expression(s, row)?;
                let p_val = self.eval_expression(pattern, row)?;
                let r_val = self.eval_expression(replacement, row)?;
                let (s_val, p_val, r_val) = match (s_val, p_val, r_val) {
                    (Some(a), Some(b), Some(c)) => (a, b, c),
                    _ => return Ok(None),
                };
                let (text, pattern, replacement) = match (
                    self.string_value(&s_val),
                    self.string_value(&p_val),
                    self.string_value(&r_val),
                ) {
                    (Some(a), Some(b), Some(c)) => (a, b, c),
                    _ => return Err(QueryError::Type("REPLACE needs strings".into())),
                };
                let regex = self.build_regex(pattern, flags, row)?;
                let result = regex.replace_all(text, replacement).into_owned();
                Ok(Some(Node::literal_str(self.dict.intern(&result))))
            }
            F::Regex(s, pattern, flags) => {
                let s_val = self.eval_expression(s, row)?;
                let p_val = self.eval_expression(pattern, row)?;
                let (s_val, p_val) = match (s_val, p_val) {
                    (Some(a), Some(b)) => (a, b),
                    _ => return Ok(None),
                };
                let (text, pattern) =
                    match (self.string_value(&s_val), self.string_value(&p_val)) {
                        (Some(a), Some(b)) => (a, b),
                        _ => return Err(QueryError::Type("REGEX needs strings".into())),
                    };
                let regex = self.build_regex(pattern, flags, row)?;
                Ok(Some(self.bool_node(regex.is_match(text))))
            }

            // Numerics
            F::Abs(expr) => self.map_numeric(expr, row, f64::abs),
            F::Round(expr) => self.map_numeric(expr, row, f64::round),
            F::Ceil(expr) => self.map_numeric(expr, row, f64::ceil),
            F::Floor(expr) => self.map_numeric(expr, row, f64::floor),
            F::Rand => {
                use rand::Rng;
                let value: f64 = rand::thread_rng().gen();
                Ok(Some(Node::literal_typed(
                    self.dict.intern(&value.to_string()),
                    Vocabulary::XSD_DOUBLE,
                )))
            }

            // Date/time helpers over xsd:dateTime lexical forms
            F::Now => {
                use std::time::{SystemTime, UNIX_EPOCH};
                let seconds = SystemTime::now()
                    .duration_since(UNIX_EPOCH)
                    .map(|d| d.as_secs())
                    .unwrap_or(0);
                Ok(Some(Node::literal_typed(
                    self.dict.intern(&seconds.to_string()),
                    Vocabulary::XSD_DATETIME,
                )))
            }
            F::Year(expr) => self.date_component(expr, row, |s| {
                s.split('-').next().and_then(|v| v.parse().ok())
            }),
            F::Month(expr) => self.date_component(expr, row, |s| {
                s.splitn(3, '-').nth(1).and_then(|v| v.parse().ok())
            }),
            F::Day(expr) => self.date_component(expr, row, |s| {
                s.split('T')
                    .next()
                    .and_then(|date| date.split('-').nth(2))
                    .and_then(|v| v.parse().ok())
            }),
            F::Hours(expr) => self.date_component(expr, row, |s| {
                s.split('T')
                    .nth(1)
                    .and_then(|time| time.split(':').next())
                    .and_then(|v| v.parse().ok())
            }),
            F::Minutes(expr) => self.date_component(expr, row, |s| {
                s.split('T')
                    .nth(1)
                    .and_then(|time| time.split(':').nth(1))
                    .and_then(|v| v.parse().ok())
            }),
            F::Seconds(expr) => {
                let value = self.eval_expression(expr, row)?;
                Ok(value.and_then(|n| {
                    let lit = n.as_literal()?;
                    let time = lit.lexical.split('T').nth(1)?;
                    let seconds = time.split(':').nth(2)?;
                    let seconds = seconds
                        .trim_end_matches('Z')
                        .split(['+', '-'])
                        .next()?
                        .parse::<f64>()
                        .ok()?;
                    Some(self.decimal_node(seconds))
                }))
            }
            F::Timezone(expr) => {
                let value = self.eval_expression(expr, row)?;
                Ok(value.and_then(|n| {
                    let lexical = n.as_literal()?.lexical;
                    if lexical.ends_with('Z') {
                        return Some(Node::literal_typed(
                            self.dict.intern("PT0S"),
                            Vocabulary::XSD_DAY_TIME_DURATION,
                        ));
                    }
                    let time = lexical.split('T').nth(1)?;
                    let pos = time.rfind(['+', '-'])?;
                    let offset = &time[pos..];
                    let negative = offset.starts_with('-');
                    let mut parts = offset[1..].split(':');
                    let hours: i64 = parts.next()?.parse().ok()?;
                    let minutes: i64 = parts.next().unwrap_or("0").parse().ok()?;
                    let total = hours * 60 + minutes;
                    let duration = if negative {
                        format!("-PT{total}M")
                    } else {
                        format!("PT{total}M")
                    };
                    Some(Node::literal_typed(
                        self.dict.intern(&duration),
                        Vocabulary::XSD_DAY_TIME_DURATION,
                    ))
                }))
            }
            F::Tz(expr) => {
                let value = self.eval_expression(expr, row)?;
                Ok(value.and_then(|n| {
                    let lexical = n.as_literal()?.lexical;
                    if lexical.ends_with('Z') {
                        return Some(Node::literal_str(self.dict.intern("Z")));
                    }
                    let time = lexical.split('T').nth(1)?;
                    let pos = time.rfind(['+', '-'])?;
                    Some(Node::literal_str(self.dict.intern(&time[pos..])))
                }))
            }

            // Tests
            F::IsIri(expr) => self.term_test(expr, row, Node::is_iri),
            F::IsBlank(expr) => self.term_test(expr, row, Node::is_blank),
            F::IsLiteral(expr) => self.term_test(expr, row, Node::is_literal),
            F::IsNumeric(expr) => {
                let value = self.eval_expression(expr, row)?;
                let numeric = value
                    .as_ref()
                    .and_then(Node::as_literal)
                    .map(|lit| {
                        // isNumeric tests the datatype, not parseability
                        lit.datatype
                            .map(Vocabulary::is_numeric_datatype)
                            .unwrap_or(false)
                    })
                    .unwrap_or(false);
                Ok(Some(self.bool_node(numeric)))
            }
            F::Bound(var) => Ok(Some(self.bool_node(row.contains(var)))),
            F::SameTerm(a, b) => self.binary(a, b, row, |this, a, b| {
                Some(this.bool_node(a == b))
            }),

            // Control
            F::Coalesce(exprs) => {
                for expr in exprs {
                    if let Ok(Some(value)) = self.eval_expression(expr, row) {
                        return Ok(Some(value));
                    }
                }
                Ok(None)
            }
            F::If(condition, then_branch, else_branch) => {
                if self.effective_boolean(condition, row) {
                    self.eval_expression(then_branch, row)
                } else {
                    self.eval_expression(else_branch, row)
                }
            }
        }
    }

    /// Extension function call: XSD casts first, then the registry
    fn eval_function(
        &self,
        iri: &'a str,
        args: &[Expression<'a>],
        row: &Binding<'a>,
    ) -> QueryResult<Option<Node<'a>>> {
        let mut values = Vec::with_capacity(args.len());
        for arg in args {
            match self.eval_expression(arg, row)? {
                Some(value) => values.push(value),
                None => return Ok(None),
            }
        }

        if let Some(local) = iri.strip_prefix(Vocabulary::XSD_NS) {
            if let Some(value) = values.first() {
                return self.xsd_cast(local, value);
            }
        }

        if let Some(registry) = self.functions {
            if let Some(result) = registry.call(iri, &values, row) {
                return Ok(result);
            }
        }
        Err(QueryError::UnknownFunction(iri.to_string()))
    }

    fn xsd_cast(&self, local: &str, value: &Node<'a>) -> QueryResult<Option<Node<'a>>> {
        let source = match self.string_value(value) {
            Some(s) => s,
            None => return Ok(None),
        };
        let result = match local {
            "string" => Some(Node::literal_typed(
                self.dict.intern(source),
                Vocabulary::XSD_STRING,
            )),
            "integer" | "int" | "long" => source
                .parse::<f64>()
                .ok()
                .map(|n| self.integer_node(n as i64)),
            "decimal" => source.parse::<f64>().ok().map(|n| self.decimal_node(n)),
            "double" | "float" => source.parse::<f64>().ok().map(|n| {
                Node::literal_typed(
                    self.dict.intern(&n.to_string()),
                    Vocabulary::XSD_DOUBLE,
                )
            }),
            "boolean" => match source {
                "true" | "1" => Some(self.bool_node(true)),
                "false" | "0" => Some(self.bool_node(false)),
                _ => None,
            },
            "dateTime" => Some(Node::literal_typed(
                self.dict.intern(source),
                Vocabulary::XSD_DATETIME,
            )),
            "date" => Some(Node::literal_typed(
                self.dict.intern(source),
                Vocabulary::XSD_DATE,
            )),
            other => {
                return Err(QueryError::UnknownFunction(format!(
                    "{}{other}",
                    Vocabulary::XSD_NS
                )))
            }
        };
        match result {
            Some(node) => Ok(Some(node)),
            None => Err(QueryError::Type(format!(
                "cannot cast '{source}' to xsd:{local}"
            ))),
        }
    }

    fn build_regex(
        &self,
        pattern: &str,
        flags: &Option<Box<Expression<'a>>>,
        row: &Binding<'a>,
    ) -> QueryResult<regex::Regex> {
        let mut builder = regex::RegexBuilder::new(pattern);
        if let Some(flags) = flags {
            if let Some(value) = self.eval_expression(flags, row)? {
                if let Some(flags) = self.string_value(&value) {
                    for flag in flags.chars() {
                        match flag {
                            'i' => {
                                builder.case_insensitive(true);
                            }
                            'm' => {
                                builder.multi_line(true);
                            }
                            's' => {
                                builder.dot_matches_new_line(true);
                            }
                            'x' => {
                                builder.ignore_whitespace(true);
                            }
                            other => {
                                return Err(QueryError::Type(format!(
                                    "invalid regex flag '{other}'"
                                )))
                            }
                        }
                    }
                }
            }
        }
        builder
            .build()
            .map_err(|e| QueryError::Type(format!("invalid regex: {e}")))
    }

    fn map_string(
        &self,
        expr: &Expression<'a>,
        row: &Binding<'a>,
        f: impl Fn(&str) -> String,
    ) -> QueryResult<Option<Node<'a>>> {
        let value = self.eval_expression(expr, row)?;
        Ok(value.and_then(|n| {
            self.string_value(&n)
                .map(|s| Node::literal_str(self.dict.intern(&f(s))))
        }))
    }

    fn string_test(
        &self,
        a: &Expression<'a>,
        b: &Expression<'a>,
        row: &Binding<'a>,
        test: fn(&str, &str) -> bool,
    ) -> QueryResult<Option<Node<'a>>> {
        self.binary(a, b, row, |this, a, b| {
            match (this.string_value(&a), this.string_value(&b)) {
                (Some(a), Some(b)) => Some(this.bool_node(test(a, b))),
                _ => None,
            }
        })
    }

    fn map_numeric(
        &self,
        expr: &Expression<'a>,
        row: &Binding<'a>,
        f: fn(f64) -> f64,
    ) -> QueryResult<Option<Node<'a>>> {
        let value = self.eval_expression(expr, row)?;
        Ok(value.and_then(|n| {
            self.numeric_value(&n)
                .map(|v| self.decimal_like_node(f(v), &n))
        }))
    }

    fn term_test(
        &self,
        expr: &Expression<'a>,
        row: &Binding<'a>,
        test: fn(&Node<'a>) -> bool,
    ) -> QueryResult<Option<Node<'a>>> {
        let value = self.eval_expression(expr, row)?;
        Ok(Some(
            self.bool_node(value.as_ref().map(test).unwrap_or(false)),
        ))
    }

    fn date_component(
        &self,
        expr: &Expression<'a>,
        row: &Binding<'a>,
        extract: fn(&str) -> Option<i64>,
    ) -> QueryResult<Option<Node<'a>>> {
        let value = self.eval_expression(expr, row)?;
        Ok(value.and_then(|n| {
            n.as_literal()
                .and_then(|lit| extract(lit.lexical))
                .map(|v| self.integer_node(v))
        }))
    }

    // ---- term helpers ---------------------------------------------------

    /// SPARQL `=`: term equality with value comparison for numerics
    pub(crate) fn terms_equal(&self, a: &Node<'a>, b: &Node<'a>) -> bool {
        if a == b {
            return true;
        }
        match (self.numeric_value(a), self.numeric_value(b)) {
            (Some(x), Some(y)) => x == y,
            _ => false,
        }
    }

    /// Ordering for ORDER BY and MIN/MAX: numeric when possible, else text
    pub(crate) fn compare_terms(&self, a: &Node<'a>, b: &Node<'a>) -> Ordering {
        if let (Some(x), Some(y)) = (self.numeric_value(a), self.numeric_value(b)) {
            return x.partial_cmp(&y).unwrap_or(Ordering::Equal);
        }
        match (a, b) {
            (Node::BlankNode(x), Node::BlankNode(y)) => x.cmp(y),
            (Node::BlankNode(_), _) => Ordering::Less,
            (_, Node::BlankNode(_)) => Ordering::Greater,
            (Node::Iri(x), Node::Iri(y)) => x.as_str().cmp(y.as_str()),
            (Node::Iri(_), _) => Ordering::Less,
            (_, Node::Iri(_)) => Ordering::Greater,
            (Node::Literal(x), Node::Literal(y)) => x.lexical.cmp(y.lexical),
            _ => a.to_string().cmp(&b.to_string()),
        }
    }

    /// Effective boolean value of a term
    pub(crate) fn ebv(&self, node: &Node<'a>) -> bool {
        match node {
            Node::Literal(lit) => {
                if lit.effective_datatype() == Vocabulary::XSD_BOOLEAN {
                    return lit.lexical == "true" || lit.lexical == "1";
                }
                if let Some(n) = self.numeric_value(node) {
                    return n != 0.0;
                }
                !lit.lexical.is_empty()
            }
            _ => true,
        }
    }

    /// Numeric value of a literal with a numeric datatype
    pub(crate) fn numeric_value(&self, node: &Node<'a>) -> Option<f64> {
        match node {
            Node::Literal(lit) => {
                if lit.language.is_some() {
                    return None;
                }
                match lit.datatype {
                    Some(dt) if Vocabulary::is_numeric_datatype(dt) => {
                        lit.lexical.parse().ok()
                    }
                    _ => None,
                }
            }
            _ => None,
        }
    }

    /// String view of a literal or IRI
    pub(crate) fn string_value(&self, node: &Node<'a>) -> Option<&'a str> {
        match node {
            Node::Literal(lit) => Some(lit.lexical),
            Node::Iri(iri) => Some(iri.as_str()),
            _ => None,
        }
    }

    /// STR(): lexical or IRI string as a plain literal
    pub(crate) fn string_form(&self, node: &Node<'a>) -> Node<'a> {
        match node {
            Node::Literal(lit) => Node::literal_str(lit.lexical),
            Node::Iri(iri) => Node::literal_str(iri.as_str()),
            other => Node::literal_str(self.dict.intern(&other.to_string())),
        }
    }

    pub(crate) fn bool_node(&self, value: bool) -> Node<'a> {
        Node::literal_typed(
            if value { "true" } else { "false" },
            Vocabulary::XSD_BOOLEAN,
        )
    }

    pub(crate) fn integer_node(&self, value: i64) -> Node<'a> {
        Node::literal_typed(self.dict.intern(&value.to_string()), Vocabulary::XSD_INTEGER)
    }

    /// xsd:decimal literal with a canonical lexical form
    pub(crate) fn decimal_node(&self, value: f64) -> Node<'a> {
        Node::literal_typed(
            self.dict.intern(&format_decimal(value)),
            Vocabulary::XSD_DECIMAL,
        )
    }

    /// Numeric result typed like its operand when it was an integer
    fn decimal_like_node(&self, value: f64, source: &Node<'a>) -> Node<'a> {
        let is_integer = source
            .as_literal()
            .and_then(|lit| lit.datatype)
            .map(|dt| dt == Vocabulary::XSD_INTEGER)
            .unwrap_or(false);
        if is_integer && value.fract() == 0.0 {
            self.integer_node(value as i64)
        } else {
            self.decimal_node(value)
        }
    }
}

/// Canonical xsd:decimal text: integral values render without a fraction
pub(crate) fn format_decimal(value: f64) -> String {
    if value.fract() == 0.0 && value.abs() < 9e15 {
        format!("{}", value as i64)
    } else {
        value.to_string()
    }
}
