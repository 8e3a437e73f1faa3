//! End-to-end scenarios over the engine facade

use vault_engine::{
    Direction, Engine, EngineConfig, QueryOptions, QueryOutcome, RdfFormat, Vocabulary,
};

fn init_tracing() {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
}

fn engine_with_tasks() -> Engine {
    init_tracing();
    let engine = Engine::default();
    engine
        .update(
            "PREFIX ex: <http://example.org/> \
             PREFIX rdf: <http://www.w3.org/1999/02/22-rdf-syntax-ns#> \
             INSERT DATA { \
                ex:task1 rdf:type ex:Task . \
                ex:task1 ex:label \"Task 1\" . \
                ex:task2 rdf:type ex:Task . \
                ex:task2 ex:label \"Task 2\" . \
             }",
        )
        .unwrap();
    engine
}

fn solutions(outcome: QueryOutcome) -> vault_engine::ResultSet<'static> {
    match outcome {
        QueryOutcome::Solutions(results) => results,
        other => panic!("expected solutions, got {other:?}"),
    }
}

/// S1 - BGP join
#[test]
fn bgp_join_over_tasks() {
    let engine = engine_with_tasks();
    let results = solutions(
        engine
            .query(
                "PREFIX ex: <http://example.org/> \
                 PREFIX rdf: <http://www.w3.org/1999/02/22-rdf-syntax-ns#> \
                 SELECT ?t ?l WHERE { ?t rdf:type ex:Task . ?t ex:label ?l }",
            )
            .unwrap(),
    );

    assert_eq!(results.variables, vec!["t", "l"]);
    assert_eq!(results.rows.len(), 2);

    let mut pairs: Vec<(String, String)> = results
        .rows
        .iter()
        .map(|row| {
            (
                row[0].as_ref().unwrap().to_string(),
                row[1].as_ref().unwrap().as_literal().unwrap().lexical.to_string(),
            )
        })
        .collect();
    pairs.sort();
    assert_eq!(
        pairs,
        vec![
            ("<http://example.org/task1>".to_string(), "Task 1".to_string()),
            ("<http://example.org/task2>".to_string(), "Task 2".to_string()),
        ]
    );
}

/// S2 - RDF-star quoted triple match
#[test]
fn quoted_triple_provenance() {
    let engine = Engine::default();
    engine
        .update(
            "PREFIX ex: <http://example.org/> \
             INSERT DATA { << ex:Alice ex:knows ex:Bob >> ex:source ex:Wikipedia }",
        )
        .unwrap();

    let results = solutions(
        engine
            .query(
                "PREFIX ex: <http://example.org/> \
                 SELECT ?who WHERE { << ?who ex:knows ex:Bob >> ex:source ex:Wikipedia }",
            )
            .unwrap(),
    );
    assert_eq!(results.rows.len(), 1);
    assert_eq!(
        results.rows[0][0].as_ref().unwrap().to_string(),
        "<http://example.org/Alice>"
    );
}

/// S3 - property path `+`
#[test]
fn transitive_parent_path() {
    let engine = Engine::default();
    engine
        .update(
            "PREFIX ex: <http://example.org/> \
             INSERT DATA { ex:task1 ex:parent ex:proj1 . ex:proj1 ex:parent ex:area1 }",
        )
        .unwrap();

    let results = solutions(
        engine
            .query(
                "PREFIX ex: <http://example.org/> SELECT ?a WHERE { ex:task1 ex:parent+ ?a }",
            )
            .unwrap(),
    );
    let mut ancestors: Vec<String> = results
        .rows
        .iter()
        .map(|row| row[0].as_ref().unwrap().to_string())
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

/// S4 - aggregates over the empty graph yield one zero row
#[test]
fn empty_graph_aggregates() {
    let engine = Engine::default();
    let results = solutions(
        engine
            .query(
                "PREFIX ex: <http://example.org/> \
                 SELECT (COUNT(*) AS ?n) (SUM(?x) AS ?s) WHERE { ?s ex:p ?x }",
            )
            .unwrap(),
    );
    assert_eq!(results.rows.len(), 1);

    let n = results.rows[0][0].as_ref().unwrap().as_literal().unwrap();
    assert_eq!(n.lexical, "0");
    assert_eq!(n.datatype, Some(Vocabulary::XSD_INTEGER));

    let s = results.rows[0][1].as_ref().unwrap().as_literal().unwrap();
    assert_eq!(s.lexical, "0");
    assert_eq!(s.datatype, Some(Vocabulary::XSD_DECIMAL));
}

/// S5 - directional literal round-trips through JSON-LD
#[test]
fn directional_literal_jsonld_round_trip() {
    let engine = Engine::default();
    engine
        .update(
            "PREFIX ex: <http://example.org/> \
             PREFIX rdfs: <http://www.w3.org/2000/01/rdf-schema#> \
             INSERT DATA { ex:r rdfs:label \"مرحبا\"@ar--rtl }",
        )
        .unwrap();

    let document = engine.dump_graph(RdfFormat::JsonLd);

    let reloaded = Engine::default();
    assert_eq!(reloaded.load_graph(&document, RdfFormat::JsonLd).unwrap(), 1);

    let results = solutions(
        reloaded
            .query(
                "PREFIX ex: <http://example.org/> \
                 PREFIX rdfs: <http://www.w3.org/2000/01/rdf-schema#> \
                 SELECT ?l WHERE { ex:r rdfs:label ?l }",
            )
            .unwrap(),
    );
    let literal = results.rows[0][0].as_ref().unwrap().as_literal().unwrap();
    assert_eq!(literal.lexical, "مرحبا");
    assert_eq!(literal.language, Some("ar"));
    assert_eq!(literal.direction, Some(Direction::Rtl));
}

/// S6 - cache hit, then file invalidation forces a recompute
#[test]
fn cache_invalidation_by_source_file() {
    let engine = engine_with_tasks();
    let query = "PREFIX ex: <http://example.org/> SELECT ?l WHERE { ex:task1 ex:label ?l }";
    let options = QueryOptions {
        source_files: vec!["notes/task1.md".to_string()],
        ..QueryOptions::default()
    };

    engine.query_with(query, options.clone()).unwrap();
    let first = engine.cache_stats();
    assert_eq!(first.hits, 0);

    engine.query_with(query, options.clone()).unwrap();
    let second = engine.cache_stats();
    assert_eq!(second.hits, 1);

    assert_eq!(engine.file_changed("notes/task1.md"), 1);
    let stats = engine.cache_stats();
    assert_eq!(stats.file_invalidations, 1);

    // The next run misses and recomputes
    engine.query_with(query, options).unwrap();
    let third = engine.cache_stats();
    assert_eq!(third.hits, 1);
    assert!(third.misses > second.misses);
}

#[test]
fn construct_and_ask_forms() {
    let engine = engine_with_tasks();

    let QueryOutcome::Graph(triples) = engine
        .query(
            "PREFIX ex: <http://example.org/> \
             CONSTRUCT { ?t ex:title ?l } WHERE { ?t ex:label ?l }",
        )
        .unwrap()
    else {
        panic!("expected graph outcome");
    };
    assert_eq!(triples.len(), 2);

    let QueryOutcome::Boolean(answer) = engine
        .query("PREFIX ex: <http://example.org/> ASK { ex:task1 ex:label \"Task 1\" }")
        .unwrap()
    else {
        panic!("expected boolean outcome");
    };
    assert!(answer);
}

#[test]
fn default_and_max_limits_apply() {
    let engine = Engine::new(EngineConfig {
        default_limit: Some(1),
        max_limit: Some(1),
        ..EngineConfig::default()
    });
    engine
        .update(
            "PREFIX ex: <http://example.org/> \
             INSERT DATA { ex:a ex:p ex:b . ex:c ex:p ex:d . ex:e ex:p ex:f }",
        )
        .unwrap();

    // No LIMIT in the query: the default applies
    let results = solutions(engine.query("SELECT ?s WHERE { ?s ?p ?o }").unwrap());
    assert_eq!(results.rows.len(), 1);

    // An explicit LIMIT above the cap is clamped
    let results =
        solutions(engine.query("SELECT ?s WHERE { ?s ?p ?o } LIMIT 100").unwrap());
    assert_eq!(results.rows.len(), 1);
}

#[test]
fn turtle_dump_reload_round_trip() {
    let engine = engine_with_tasks();
    let turtle = engine.dump_graph(RdfFormat::Turtle);

    let reloaded = Engine::default();
    assert_eq!(reloaded.load_graph(&turtle, RdfFormat::Turtle).unwrap(), 4);
    assert_eq!(reloaded.len(), engine.len());

    let ntriples_a = {
        let mut lines: Vec<String> = engine
            .dump_graph(RdfFormat::NTriples)
            .lines()
            .map(str::to_string)
            .collect();
        lines.sort();
        lines
    };
    let ntriples_b = {
        let mut lines: Vec<String> = reloaded
            .dump_graph(RdfFormat::NTriples)
            .lines()
            .map(str::to_string)
            .collect();
        lines.sort();
        lines
    };
    assert_eq!(ntriples_a, ntriples_b);
}

#[test]
fn updates_invalidate_cached_results() {
    let engine = engine_with_tasks();
    let query = "PREFIX ex: <http://example.org/> SELECT ?l WHERE { ex:task1 ex:label ?l }";

    engine.query(query).unwrap();
    engine.query(query).unwrap();
    assert_eq!(engine.cache_stats().hits, 1);

    engine
        .update(
            "PREFIX ex: <http://example.org/> \
             DELETE DATA { ex:task1 ex:label \"Task 1\" } ; \
             INSERT DATA { ex:task1 ex:label \"Renamed\" }",
        )
        .unwrap();

    let results = solutions(engine.query(query).unwrap());
    assert_eq!(
        results.rows[0][0].as_ref().unwrap().as_literal().unwrap().lexical,
        "Renamed"
    );
}

#[test]
fn change_recorder_drives_invalidation() {
    let engine = engine_with_tasks();
    let query = "PREFIX ex: <http://example.org/> SELECT ?l WHERE { ex:task2 ex:label ?l }";
    engine
        .query_with(
            query,
            QueryOptions {
                source_files: vec!["notes/task2.md".to_string()],
                ..QueryOptions::default()
            },
        )
        .unwrap();

    engine.record_change("notes/task2.md", vault_engine::ChangeKind::Modified, 10);
    engine.record_change("notes/task2.md", vault_engine::ChangeKind::Modified, 20);
    assert_eq!(engine.flush_changes(), 1);

    assert!(engine.has_file_changed("notes/task2.md", 1, 100));
    engine.note_file_seen("notes/task2.md", 1, 100);
    assert!(!engine.has_file_changed("notes/task2.md", 1, 100));
}

#[test]
fn cache_snapshot_round_trip() {
    let engine = engine_with_tasks();
    let query = "PREFIX ex: <http://example.org/> SELECT ?l WHERE { ex:task1 ex:label ?l }";
    engine.query(query).unwrap();

    let snapshot = engine.cache_snapshot();
    assert_eq!(snapshot.get("version").unwrap(), 1);

    let restored = engine_with_tasks();
    assert_eq!(restored.cache_restore(&snapshot).unwrap(), 1);
    restored.query(query).unwrap();
    assert_eq!(restored.cache_stats().hits, 1);
}

#[test]
fn solutions_serialize_in_all_formats() {
    let engine = engine_with_tasks();
    let QueryOutcome::Solutions(results) = engine
        .query(
            "PREFIX ex: <http://example.org/> \
             SELECT ?t ?l WHERE { ?t ex:label ?l } ORDER BY ?l",
        )
        .unwrap()
    else {
        panic!("expected solutions");
    };

    let json = vault_engine::serialize_solutions(&results, vault_engine::ResultsFormat::Json)
        .unwrap();
    assert!(json.contains("\"vars\""));
    assert!(json.contains("Task 1"));

    let xml =
        vault_engine::serialize_solutions(&results, vault_engine::ResultsFormat::Xml).unwrap();
    assert!(xml.contains("<sparql"));
    assert!(xml.contains("<literal>Task 1</literal>"));

    let csv =
        vault_engine::serialize_solutions(&results, vault_engine::ResultsFormat::Csv).unwrap();
    assert!(csv.starts_with("t,l\r\n"));

    let listing =
        vault_engine::serialize_solutions(&results, vault_engine::ResultsFormat::Turtle)
            .unwrap();
    assert!(listing.contains("?l = \"Task 1\""));

    let boolean =
        vault_engine::serialize_boolean(true, vault_engine::ResultsFormat::Json).unwrap();
    assert!(boolean.contains("true"));
}

#[test]
fn asymmetric_describe_surface() {
    let engine = Engine::default();
    engine
        .update(
            "PREFIX ex: <http://example.org/> \
             INSERT DATA { ex:task1 ex:parent ex:proj1 . ex:note1 ex:mentions ex:task1 }",
        )
        .unwrap();

    let task = vault_engine::Node::iri(engine.dictionary().intern("http://example.org/task1"));

    let symmetric = engine
        .describe_resources(
            std::slice::from_ref(&task),
            vault_engine::DescribeOptions {
                depth: Some(1),
                symmetric: true,
            },
        )
        .unwrap();
    assert_eq!(symmetric.len(), 2);

    let outgoing_only = engine
        .describe_resources(
            &[task],
            vault_engine::DescribeOptions {
                depth: Some(1),
                symmetric: false,
            },
        )
        .unwrap();
    assert_eq!(outgoing_only.len(), 1);
}

#[test]
fn custom_function_and_aggregate_registration() {
    init_tracing();
    let mut engine = Engine::default();
    let dict = engine.dictionary().clone();
    engine.register_function("http://example.org/fn/shout", move |args, _| {
        args.first().and_then(|n| n.as_literal()).map(|lit| {
            vault_engine::Node::literal_str(dict.intern(&lit.lexical.to_uppercase()))
        })
    });

    engine
        .update(
            "PREFIX ex: <http://example.org/> \
             INSERT DATA { ex:t ex:label \"task\" . ex:t ex:score 2 . ex:u ex:score 4 }",
        )
        .unwrap();

    let QueryOutcome::Solutions(results) = engine
        .query(
            "PREFIX ex: <http://example.org/> \
             PREFIX fn: <http://example.org/fn/> \
             SELECT ?u WHERE { ex:t ex:label ?l BIND(fn:shout(?l) AS ?u) }",
        )
        .unwrap()
    else {
        panic!("expected solutions");
    };
    assert_eq!(
        results.rows[0][0].as_ref().unwrap().as_literal().unwrap().lexical,
        "TASK"
    );

    // The packaged median extension, invoked by IRI with DISTINCT
    let QueryOutcome::Solutions(results) = engine
        .query(
            "PREFIX ex: <http://example.org/> \
             PREFIX agg: <https://vaultkg.org/aggregates#> \
             SELECT (agg:median(DISTINCT ?x) AS ?m) WHERE { ?s ex:score ?x }",
        )
        .unwrap()
    else {
        panic!("expected solutions");
    };
    assert_eq!(
        results.rows[0][0].as_ref().unwrap().as_literal().unwrap().lexical,
        "3"
    );
}

#[test]
fn cancellation_between_yields() {
    let engine = engine_with_tasks();
    let flag = vault_engine::CancelFlag::new();
    flag.cancel();

    let err = engine
        .query_with(
            "SELECT ?s WHERE { ?s ?p ?o }",
            QueryOptions {
                cancel: Some(flag),
                skip_cache: true,
                ..QueryOptions::default()
            },
        )
        .unwrap_err();
    assert!(matches!(
        err,
        vault_engine::EngineError::Query(vault_engine::QueryError::Cancelled)
    ));
}

#[test]
fn vault_note_iris_are_ordinary_iris() {
    let engine = Engine::default();
    let note = engine.note_iri("Projects/Task 1.md");
    assert_eq!(
        note.as_iri().unwrap().as_str(),
        "obsidian://vault/Projects/Task%201.md"
    );

    engine.update(
        "PREFIX rdfs: <http://www.w3.org/2000/01/rdf-schema#> \
         INSERT DATA { <obsidian://vault/Projects/Task%201.md> rdfs:label \"Task 1\" }",
    )
    .unwrap();

    let results = solutions(
        engine
            .query(
                "PREFIX rdfs: <http://www.w3.org/2000/01/rdf-schema#> \
                 SELECT ?n WHERE { ?n rdfs:label \"Task 1\" }",
            )
            .unwrap(),
    );
    assert_eq!(results.rows[0][0].as_ref().unwrap(), &note);
}
