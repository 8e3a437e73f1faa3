//! Parse-and-execute tests over a small vault graph

use graph_store::TripleStore;
use rdf_model::{Node, Triple, VarName, Vocabulary};
use sparql::{
    AggregateRegistry, BindingSet, Executor, Query, QueryError, SparqlParser,
};
use std::sync::Arc;

fn vault_store() -> TripleStore<'static> {
    let mut store = TripleStore::new();
    let dict = store.dictionary().clone();

    let rdf_type = dict.intern(Vocabulary::RDF_TYPE);
    for (task, label) in [("task1", "Task 1"), ("task2", "Task 2")] {
        store.add(
            Triple::try_new(
                Node::iri(dict.intern(&format!("http://example.org/{task}"))),
                Node::iri(rdf_type),
                Node::iri(dict.intern("http://example.org/Task")),
            )
            .unwrap(),
        );
        store.add(
            Triple::try_new(
                Node::iri(dict.intern(&format!("http://example.org/{task}"))),
                Node::iri(dict.intern("http://example.org/label")),
                Node::literal_str(dict.intern(label)),
            )
            .unwrap(),
        );
    }

    // Hierarchy for path queries
    for (child, parent) in [("task1", "proj1"), ("proj1", "area1")] {
        store.add(
            Triple::try_new(
                Node::iri(dict.intern(&format!("http://example.org/{child}"))),
                Node::iri(dict.intern("http://example.org/parent")),
                Node::iri(dict.intern(&format!("http://example.org/{parent}"))),
            )
            .unwrap(),
        );
    }

    // RDF-star provenance
    let statement = Triple::try_new(
        Node::iri(dict.intern("http://example.org/alice")),
        Node::iri(dict.intern("http://example.org/knows")),
        Node::iri(dict.intern("http://example.org/bob")),
    )
    .unwrap();
    store.add(
        Triple::try_new(
            Node::quoted(statement),
            Node::iri(dict.intern("http://example.org/source")),
            Node::iri(dict.intern("http://example.org/wikipedia")),
        )
        .unwrap(),
    );

    store
}

fn select(store: &TripleStore<'static>, text: &str) -> BindingSet<'static> {
    let mut parser = SparqlParser::new(store.dictionary().clone());
    let query = parser.parse_query(text).unwrap();
    let Query::Select { pattern, .. } = query else {
        panic!("expected SELECT");
    };
    let registry = AggregateRegistry::with_extensions();
    Executor::new(store)
        .with_aggregates(&registry)
        .execute(&pattern)
        .unwrap()
}

#[test]
fn select_bgp_join() {
    let store = vault_store();
    let rows = select(
        &store,
        "PREFIX ex: <http://example.org/> \
         PREFIX rdf: <http://www.w3.org/1999/02/22-rdf-syntax-ns#> \
         SELECT ?t ?l WHERE { ?t rdf:type ex:Task . ?t ex:label ?l }",
    );
    assert_eq!(rows.len(), 2);

    let mut labels: Vec<&str> = rows
        .iter()
        .map(|row| {
            row.get(&VarName::new("l"))
                .unwrap()
                .as_literal()
                .unwrap()
                .lexical
        })
        .collect();
    labels.sort_unstable();
    assert_eq!(labels, vec!["Task 1", "Task 2"]);
}

#[test]
fn quoted_triple_query() {
    let store = vault_store();
    let rows = select(
        &store,
        "PREFIX ex: <http://example.org/> \
         SELECT ?who WHERE { << ?who ex:knows ex:bob >> ex:source ex:wikipedia }",
    );
    assert_eq!(rows.len(), 1);
    assert_eq!(
        rows.rows()[0]
            .get(&VarName::new("who"))
            .unwrap()
            .as_iri()
            .unwrap()
            .as_str(),
        "http://example.org/alice"
    );
}

#[test]
fn property_path_plus() {
    let store = vault_store();
    let rows = select(
        &store,
        "PREFIX ex: <http://example.org/> SELECT ?a WHERE { ex:task1 ex:parent+ ?a }",
    );
    let mut ancestors: Vec<String> = rows
        .iter()
        .map(|row| row.get(&VarName::new("a")).unwrap().to_string())
        .collect();
    ancestors.sort();
    assert_eq!(
        ancestors,
        vec![
            "<http://example.org/area1>".to_string(),
            "<http://example.org/proj1>".to_string(),
        ]
    );
}

#[test]
fn filter_and_optional() {
    let store = vault_store();
    let rows = select(
        &store,
        "PREFIX ex: <http://example.org/> \
         PREFIX rdf: <http://www.w3.org/1999/02/22-rdf-syntax-ns#> \
         SELECT ?t ?p WHERE { \
            ?t rdf:type ex:Task . \
            OPTIONAL { ?t ex:parent ?p } \
            FILTER(STRSTARTS(STR(?t), \"http://example.org/task\")) \
         }",
    );
    assert_eq!(rows.len(), 2);
    let with_parent = rows
        .iter()
        .filter(|row| row.contains(&VarName::new("p")))
        .count();
    assert_eq!(with_parent, 1);
}

#[test]
fn aggregate_empty_graph_zero_row() {
    let store = TripleStore::new();
    let rows = select(
        &store,
        "PREFIX ex: <http://example.org/> \
         SELECT (COUNT(*) AS ?n) (SUM(?x) AS ?s) WHERE { ?s ex:p ?x }",
    );
    assert_eq!(rows.len(), 1);
    let row = &rows.rows()[0];

    let n = row.get(&VarName::new("n")).unwrap().as_literal().unwrap();
    assert_eq!((n.lexical, n.datatype), ("0", Some(Vocabulary::XSD_INTEGER)));

    let s = row.get(&VarName::new("s")).unwrap().as_literal().unwrap();
    assert_eq!((s.lexical, s.datatype), ("0", Some(Vocabulary::XSD_DECIMAL)));
}

#[test]
fn group_by_with_count() {
    let store = vault_store();
    let rows = select(
        &store,
        "PREFIX ex: <http://example.org/> \
         SELECT ?t (COUNT(?o) AS ?n) WHERE { ?t ?p ?o } GROUP BY ?t ORDER BY ?t",
    );
    assert!(!rows.is_empty());
    for row in rows.iter() {
        assert!(row.contains(&VarName::new("t")));
        assert!(row.contains(&VarName::new("n")));
        assert!(!row.contains(&VarName::new("o")));
    }
}

#[test]
fn ask_and_describe_forms() {
    let store = vault_store();
    let mut parser = SparqlParser::new(store.dictionary().clone());

    let ask = parser
        .parse_query(
            "PREFIX ex: <http://example.org/> ASK { ex:task1 ex:parent ex:proj1 }",
        )
        .unwrap();
    let Query::Ask { pattern } = ask else {
        panic!("expected ASK");
    };
    let executor = Executor::new(&store);
    assert!(!executor.execute(&pattern).unwrap().is_empty());

    let describe = parser
        .parse_query("PREFIX ex: <http://example.org/> DESCRIBE ex:task1")
        .unwrap();
    let Query::Describe {
        resources,
        pattern,
        options,
    } = describe
    else {
        panic!("expected DESCRIBE");
    };
    let triples = executor
        .execute_describe(&resources, pattern.as_ref(), options)
        .unwrap();
    // task1's type, label, parent, plus reachable neighborhood
    assert!(triples.len() >= 3);
}

#[test]
fn construct_form() {
    let store = vault_store();
    let mut parser = SparqlParser::new(store.dictionary().clone());
    let query = parser
        .parse_query(
            "PREFIX ex: <http://example.org/> \
             CONSTRUCT { ?t ex:title ?l } WHERE { ?t ex:label ?l }",
        )
        .unwrap();
    let Query::Construct {
        template, pattern, ..
    } = query
    else {
        panic!("expected CONSTRUCT");
    };
    let triples = Executor::new(&store)
        .execute_construct(&template, &pattern)
        .unwrap();
    assert_eq!(triples.len(), 2);
}

#[test]
fn values_and_subquery() {
    let store = vault_store();
    let rows = select(
        &store,
        "PREFIX ex: <http://example.org/> \
         SELECT ?t ?l WHERE { \
            VALUES ?t { ex:task1 } \
            { SELECT ?t ?l WHERE { ?t ex:label ?l } } \
         }",
    );
    assert_eq!(rows.len(), 1);
    assert_eq!(
        rows.rows()[0]
            .get(&VarName::new("l"))
            .unwrap()
            .as_literal()
            .unwrap()
            .lexical,
        "Task 1"
    );
}

#[test]
fn deadline_timeout_surfaces() {
    let store = vault_store();
    let mut parser = SparqlParser::new(store.dictionary().clone());
    let query = parser
        .parse_query("SELECT ?s ?p ?o WHERE { ?s ?p ?o }")
        .unwrap();
    let Query::Select { pattern, .. } = query else {
        panic!("expected SELECT");
    };

    let control = sparql::ExecControl::unbounded()
        .with_deadline(std::time::Instant::now() - std::time::Duration::from_millis(1));
    let result = Executor::new(&store).with_control(control).execute(&pattern);
    assert!(matches!(result, Err(QueryError::Timeout)));
}

#[test]
fn dictionaries_can_be_shared_across_components() {
    // The parser, store and executor share one dictionary
    let dict = Arc::new(rdf_model::Dictionary::new());
    let store = TripleStore::with_dictionary(dict.clone());
    let mut parser = SparqlParser::new(dict);
    let query = parser.parse_query("SELECT ?s WHERE { ?s ?p ?o }").unwrap();
    let Query::Select { pattern, .. } = query else {
        panic!("expected SELECT");
    };
    assert!(Executor::new(&store).execute(&pattern).unwrap().is_empty());
}
