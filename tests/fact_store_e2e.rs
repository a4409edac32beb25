use std::thread;
use std::time::Duration;

use chrono::{TimeZone, Utc};

use knowbase::graph::GraphQuery;
use knowbase::storage::MemoryServer;
use knowbase::{
    AnswerToken, DataBackend, FactStore, KbError, ModalIteration, ModalOperator, Modality, ObjectOperator,
    PersistentBackend, QueryableBackend, StoreConfig, Term, TimeInterval, Triple, TriplePattern,
};

fn fresh_store(host: &str) -> FactStore {
    let store = FactStore::connect(StoreConfig::with_uri(format!("memory://{host}"))).unwrap();
    store.drop_all().unwrap();
    store.create_search_indices().unwrap();
    store
}

fn triple(s: &str, p: &str, o: &str) -> Triple {
    Triple::new(s, p, o).unwrap().with_origin("test")
}

fn count(store: &FactStore, pattern: &TriplePattern) -> usize {
    store.lookup(pattern).unwrap().count()
}

#[test]
fn exact_round_trip_keeps_duplicates() {
    let store = fresh_store("e2e-round-trip");
    let t = triple("rex", "hasOwner", "alice");

    store.insert_one(&t).unwrap();
    let found: Vec<_> = store.lookup(&TriplePattern::exact(&t)).unwrap().collect();
    assert_eq!(found, vec![t.clone()]);

    store.insert_one(&t).unwrap();
    assert_eq!(count(&store, &TriplePattern::exact(&t)), 2);
    assert_eq!(store.lookup_triple(&t).unwrap().count(), 2);

    assert_eq!(store.remove_one(&t).unwrap(), 1);
    assert!(store.contains(&t).unwrap());
}

#[test]
fn exact_lookup_distinguishes_large_integers() {
    let store = fresh_store("e2e-large-ints");
    let low = Triple::new("a", "id", 9_007_199_254_740_992_i64).unwrap().with_origin("test");
    let high = Triple::new("a", "id", 9_007_199_254_740_993_i64).unwrap().with_origin("test");
    store.insert_all(&[low.clone(), high.clone()]).unwrap();

    let found: Vec<_> = store.lookup_triple(&high).unwrap().collect();
    assert_eq!(found, vec![high.clone()]);

    assert_eq!(store.remove_one(&high).unwrap(), 1);
    assert!(!store.contains(&high).unwrap());
    assert!(store.contains(&low).unwrap());
}

#[test]
fn taxonomic_closure_in_either_insert_order() {
    for (host, order) in [("e2e-closure-ab", [0, 1]), ("e2e-closure-ba", [1, 0])] {
        let store = fresh_store(host);
        let edges = [triple("A", "subClassOf", "B"), triple("B", "subClassOf", "C")];
        for i in order {
            store.insert_one(&edges[i]).unwrap();
        }
        store.insert_one(&triple("x", "type", "A")).unwrap();

        let matches: Vec<_> = store
            .lookup(&TriplePattern::new(Term::var("who"), "type", "C"))
            .unwrap()
            .collect();
        assert_eq!(matches.len(), 1, "order {order:?}");
        assert_eq!(matches[0].subject_name(), "x");
        assert!(store.is_subclass_of("A", "C").unwrap());
    }
}

#[test]
fn equivalent_taxonomic_names_are_interchangeable() {
    let store = fresh_store("e2e-equivalent-names");
    store.insert_one(&triple("Dog", "rdfs:subClassOf", "Animal")).unwrap();
    store.insert_one(&triple("rex", "rdf:type", "Dog")).unwrap();

    assert_eq!(count(&store, &TriplePattern::new(Term::var("c"), "subClassOf", "Animal")), 1);
    assert_eq!(count(&store, &TriplePattern::new(Term::var("x"), "type", "Animal")), 1);
}

#[test]
fn exact_operator_disables_widening() {
    let store = fresh_store("e2e-exact-op");
    store.insert_one(&triple("Dog", "subClassOf", "Animal")).unwrap();
    store.insert_one(&triple("rex", "type", "Dog")).unwrap();

    let widened = TriplePattern::new(Term::var("x"), "type", "Animal");
    assert_eq!(count(&store, &widened), 1);
    assert_eq!(count(&store, &widened.with_operator(ObjectOperator::Exact)), 0);
}

#[test]
fn cyclic_edge_is_rejected_and_not_persisted() {
    let store = fresh_store("e2e-cycle");
    store.insert_one(&triple("A", "subClassOf", "B")).unwrap();

    let err = store.insert_one(&triple("B", "subClassOf", "A")).unwrap_err();
    assert!(err.is_hierarchy_cycle());
    assert!(!store.contains(&triple("B", "subClassOf", "A")).unwrap());

    assert_eq!(store.class_descendants("A").unwrap().len(), 0);
    assert_eq!(store.class_descendants("B").unwrap().len(), 1);
    assert!(!store.is_subclass_of("B", "A").unwrap());

    // A batch containing a cyclic edge is rejected as a whole.
    let batch = [triple("C", "subClassOf", "A"), triple("B", "subClassOf", "C")];
    assert!(store.insert_all(&batch).unwrap_err().is_hierarchy_cycle());
    assert!(!store.contains(&batch[0]).unwrap());
    assert!(!store.is_subclass_of("C", "A").unwrap());
}

#[test]
fn removing_edge_rebuilds_closure() {
    let store = fresh_store("e2e-remove-edge");
    let ab = triple("A", "subClassOf", "B");
    let bc = triple("B", "subClassOf", "C");
    store.insert_all(&[ab.clone(), bc.clone(), ab.clone()]).unwrap();
    store.insert_one(&triple("x", "type", "A")).unwrap();

    let query = TriplePattern::new(Term::var("x"), "type", "C");
    assert_eq!(count(&store, &query), 1);

    // One of two supporting triples remains.
    store.remove_one(&ab).unwrap();
    assert_eq!(count(&store, &query), 1);

    store.remove_one(&ab).unwrap();
    assert_eq!(count(&store, &query), 0);
    assert!(store.is_subclass_of("B", "C").unwrap());
    assert!(!store.is_subclass_of("A", "C").unwrap());
}

#[test]
fn concurrent_taxonomic_mutations_keep_closure_consistent() {
    const PAIRS: usize = 24;
    const CHAIN: usize = 32;

    let store = fresh_store("e2e-concurrent-taxonomy");
    let pair = |i: usize, flipped: bool| {
        let (a, b) = (format!("A{i}"), format!("B{i}"));
        let (child, parent) = if flipped { (b, a) } else { (a, b) };
        triple(&child, "subClassOf", &parent)
    };

    thread::scope(|s| {
        for flipped in [false, true] {
            let store = &store;
            s.spawn(move || {
                for i in 0..PAIRS {
                    if let Err(err) = store.insert_one(&pair(i, flipped)) {
                        assert!(err.is_hierarchy_cycle(), "unexpected error: {err}");
                    }
                }
            });
        }
        let writer = &store;
        s.spawn(move || {
            for level in 1..CHAIN {
                let edge = triple(&format!("C{level}"), "subClassOf", &format!("C{}", level - 1));
                writer.insert_one(&edge).unwrap();
            }
        });
        let reader = &store;
        s.spawn(move || {
            for _ in 0..50 {
                let n = count(reader, &TriplePattern::new(Term::var("x"), "subClassOf", "C0"));
                assert!(n < CHAIN);
            }
        });
    });

    for i in 0..PAIRS {
        let forward = store.contains(&pair(i, false)).unwrap();
        let backward = store.contains(&pair(i, true)).unwrap();
        assert!(forward ^ backward, "pair {i}: exactly one direction must be stored");

        let (child, parent) = if forward {
            (format!("A{i}"), format!("B{i}"))
        } else {
            (format!("B{i}"), format!("A{i}"))
        };
        assert!(store.is_subclass_of(&child, &parent).unwrap());
        assert!(!store.is_subclass_of(&parent, &child).unwrap());
        assert_eq!(store.class_descendants(&parent).unwrap().len(), 1);
        assert!(store.class_descendants(&child).unwrap().is_empty());
    }
    let mut expected: Vec<String> = (1..CHAIN).map(|level| format!("C{level}")).collect();
    expected.sort();
    let descendants: Vec<String> = store.class_descendants("C0").unwrap().into_iter().collect();
    assert_eq!(descendants, expected);

    // Concurrent removals retract every edge they delete.
    thread::scope(|s| {
        for flipped in [false, true] {
            let store = &store;
            s.spawn(move || {
                for i in 0..PAIRS {
                    store.remove_one(&pair(i, flipped)).unwrap();
                }
            });
        }
        let remover = &store;
        s.spawn(move || {
            for level in (1..CHAIN).step_by(2) {
                let edge = triple(&format!("C{level}"), "subClassOf", &format!("C{}", level - 1));
                assert_eq!(remover.remove_one(&edge).unwrap(), 1);
            }
        });
    });

    for i in 0..PAIRS {
        assert!(store.class_descendants(&format!("A{i}")).unwrap().is_empty());
        assert!(store.class_descendants(&format!("B{i}")).unwrap().is_empty());
    }
    assert_eq!(store.class_descendants("C0").unwrap().len(), 0);
    assert_eq!(store.class_descendants("C2").unwrap().len(), 0);
    assert!(store.is_subclass_of("C2", "C1").unwrap());
    assert!(!store.is_subclass_of("C3", "C1").unwrap());
}

#[test]
fn subproperty_objects_are_widened() {
    let store = fresh_store("e2e-subproperty");
    store.insert_one(&triple("hasMother", "subPropertyOf", "hasParent")).unwrap();
    store.insert_one(&triple("hasParent", "subPropertyOf", "hasRelative")).unwrap();

    let subs: Vec<_> = store
        .lookup(&TriplePattern::new(Term::var("p"), "subPropertyOf", "hasRelative"))
        .unwrap()
        .map(|t| t.subject_name().to_string())
        .collect();
    assert_eq!(subs.len(), 2);
    assert!(subs.contains(&"hasMother".to_string()));
    assert!(store.is_subproperty_of("hasMother", "hasRelative").unwrap());
}

#[test]
fn version_records() {
    let store = fresh_store("e2e-versions");
    assert_eq!(store.get_version_of_origin("onto1").unwrap(), None);
    store.set_version_of_origin("onto1", "v1").unwrap();
    store.set_version_of_origin("onto1", "v2").unwrap();
    store.set_version_of_origin("onto1", "v2").unwrap();
    assert_eq!(store.get_version_of_origin("onto1").unwrap(), Some("v2".to_string()));
    assert_eq!(store.get_version_of_origin("onto2").unwrap(), None);
}

#[test]
fn read_only_store_rejects_mutations() {
    let host = "e2e-read-only";
    let writer = fresh_store(host);
    writer.insert_one(&triple("a", "p", "b")).unwrap();

    let config = StoreConfig {
        read_only: true,
        ..StoreConfig::with_uri(format!("memory://{host}"))
    };
    let reader = FactStore::connect(config).unwrap();
    assert!(reader.is_read_only());

    let err = reader.insert_one(&triple("c", "p", "d")).unwrap_err();
    assert!(err.is_read_only_violation());
    assert!(reader.remove_all_with_origin("test").unwrap_err().is_read_only_violation());
    assert!(reader.set_version_of_origin("test", "v1").unwrap_err().is_read_only_violation());
    assert!(reader.drop_all().unwrap_err().is_read_only_violation());

    // Nothing changed and reads still work.
    assert_eq!(count(&reader, &TriplePattern::new("a", "p", Term::var("o"))), 1);
    assert_eq!(count(&reader, &TriplePattern::new("c", "p", Term::var("o"))), 0);
}

#[test]
fn unbound_scan_is_a_pattern_error() {
    let store = fresh_store("e2e-unbound");
    store.insert_one(&triple("a", "p", "b")).unwrap();

    let scan = TriplePattern::new(Term::var("s"), Term::var("p"), Term::var("o"));
    let err = store.lookup(&scan).err().unwrap();
    assert!(err.is_pattern());

    assert_eq!(count(&store, &scan.clone().with_origin("test")), 1);

    let config = StoreConfig {
        allow_unbound_scan: true,
        ..StoreConfig::with_uri("memory://e2e-unbound")
    };
    let permissive = FactStore::connect(config).unwrap();
    assert_eq!(count(&permissive, &scan), 1);
}

#[test]
fn origin_and_pattern_removal() {
    let store = fresh_store("e2e-removal");
    store
        .insert_all(&[
            triple("Dog", "subClassOf", "Animal").with_origin("onto"),
            triple("rex", "type", "Dog").with_origin("onto"),
            triple("rex", "hasOwner", "alice"),
            triple("tom", "hasOwner", "bob"),
        ])
        .unwrap();

    assert_eq!(store.remove_all_with_origin("onto").unwrap(), 2);
    assert!(!store.is_subclass_of("Dog", "Animal").unwrap());

    let owned_by_alice = TriplePattern::new(Term::var("x"), "hasOwner", "alice");
    assert_eq!(store.remove_all_matching(&owned_by_alice).unwrap(), 1);
    assert_eq!(count(&store, &TriplePattern::new(Term::var("x"), "hasOwner", Term::var("y"))), 1);
}

#[test]
fn session_origins_are_dropped_on_connect() {
    let host = "e2e-session";
    let store = fresh_store(host);
    store.insert_one(&Triple::new("a", "p", "b").unwrap()).unwrap();
    store.insert_one(&triple("c", "p", "d")).unwrap();

    let reconnected = FactStore::connect(StoreConfig::with_uri(format!("memory://{host}"))).unwrap();
    let left: Vec<_> = reconnected
        .lookup(&TriplePattern::new(Term::var("s"), "p", Term::var("o")))
        .unwrap()
        .collect();
    assert_eq!(left.len(), 1);
    assert_eq!(left[0].origin(), "test");
}

#[test]
fn multi_pattern_join_propagates_bindings() {
    let store = fresh_store("e2e-join");
    store
        .insert_all(&[
            triple("rex", "hasOwner", "alice"),
            triple("tom", "hasOwner", "bob"),
            triple("alice", "livesIn", "paris"),
            triple("bob", "livesIn", "rome"),
        ])
        .unwrap();

    let patterns = vec![
        TriplePattern::new(Term::var("pet"), "hasOwner", Term::var("owner")),
        TriplePattern::new(Term::var("owner"), "livesIn", "paris"),
    ];
    let answers: Vec<_> = store.lookup_all(&patterns, None).unwrap().collect();
    assert_eq!(answers.len(), 1);
    assert_eq!(answers[0].substitution.get_by_name("pet"), Some(&Term::atom("rex")));
    assert!(answers[0].origins.contains("test"));

    let limited = store.lookup_all(&patterns[..1], Some(1)).unwrap().count();
    assert_eq!(limited, 1);
}

#[test]
fn join_literal_bound_into_subject_matches_nothing() {
    let store = fresh_store("e2e-join-literal");
    store
        .insert_all(&[
            Triple::new("a", "name", Term::string("bob")).unwrap().with_origin("test"),
            Triple::new("carol", "age", 30_i64).unwrap().with_origin("test"),
            Triple::new("dave", "age", 40_i64).unwrap().with_origin("test"),
            Triple::new("a", "rel", 7_i64).unwrap().with_origin("test"),
        ])
        .unwrap();

    let by_subject = vec![
        TriplePattern::new("a", "name", Term::var("n")),
        TriplePattern::new(Term::var("n"), "age", Term::var("x")),
    ];
    assert_eq!(store.lookup_all(&by_subject, None).unwrap().count(), 0);

    let by_predicate = vec![
        TriplePattern::new("a", "rel", Term::var("p")),
        TriplePattern::new("carol", Term::var("p"), Term::var("x")),
    ];
    assert_eq!(store.lookup_all(&by_predicate, None).unwrap().count(), 0);
}

#[test]
fn joined_intervals_must_overlap() {
    let store = fresh_store("e2e-intervals");
    let t = |h| Utc.with_ymd_and_hms(2024, 1, 1, h, 0, 0).unwrap();
    store
        .insert_all(&[
            triple("a", "p", "b").with_interval(TimeInterval::new(t(0), t(10)).unwrap()),
            triple("b", "q", "c").with_interval(TimeInterval::new(t(5), t(20)).unwrap()),
            triple("b", "q", "d").with_interval(TimeInterval::new(t(12), t(20)).unwrap()),
        ])
        .unwrap();

    let patterns = vec![
        TriplePattern::new("a", "p", Term::var("x")),
        TriplePattern::new(Term::var("x"), "q", Term::var("y")),
    ];
    let answers: Vec<_> = store.lookup_all(&patterns, None).unwrap().collect();
    assert_eq!(answers.len(), 1);
    assert_eq!(answers[0].substitution.get_by_name("y"), Some(&Term::atom("c")));
    assert_eq!(answers[0].interval, TimeInterval::new(t(5), t(10)).unwrap());

    let at = TriplePattern::new(Term::var("x"), "q", Term::var("y")).at_time(t(15));
    assert_eq!(count(&store, &at), 2);
    let before = TriplePattern::new(Term::var("x"), "q", Term::var("y")).at_time(t(6));
    assert_eq!(count(&store, &before), 1);
}

#[test]
fn modal_context_filters_facts() {
    let store = fresh_store("e2e-modal");
    let mut believed = ModalIteration::empty();
    believed.push_back(ModalOperator::necessity(Modality::belief()));

    store.insert_one(&triple("sky", "hasColor", "blue")).unwrap();
    store
        .insert_one(&triple("sky", "hasColor", "green").with_frame(believed.clone()))
        .unwrap();

    let any = TriplePattern::new("sky", "hasColor", Term::var("c"));
    assert_eq!(count(&store, &any), 2);
    assert_eq!(count(&store, &any.clone().in_context(ModalIteration::empty())), 1);

    let in_belief: Vec<_> = store.lookup(&any.in_context(believed.clone())).unwrap().collect();
    assert_eq!(in_belief.len(), 1);
    assert_eq!(in_belief[0].object(), &Term::atom("green"));
    assert_eq!(in_belief[0].frame(), &believed);
}

#[test]
fn numeric_comparisons() {
    let store = fresh_store("e2e-compare");
    for (s, v) in [("a", 1_i64), ("b", 5), ("c", 10)] {
        store
            .insert_one(&Triple::new(s, "weight", v).unwrap().with_origin("test"))
            .unwrap();
    }
    let heavier = TriplePattern::new(Term::var("x"), "weight", 5_i64).with_operator(ObjectOperator::Geq);
    assert_eq!(count(&store, &heavier), 2);
    let lighter = TriplePattern::new(Term::var("x"), "weight", 5_i64).with_operator(ObjectOperator::Lt);
    assert_eq!(count(&store, &lighter), 1);
}

#[test]
fn evaluate_query_publishes_answers_then_eos() {
    let store = fresh_store("e2e-evaluate");
    store.insert_one(&triple("rex", "hasOwner", "alice")).unwrap();
    store.insert_one(&triple("tom", "hasOwner", "alice")).unwrap();

    let (tx, rx) = knowbase::answer::token_channel(None);
    let query = GraphQuery::from(TriplePattern::new(Term::var("x"), "hasOwner", "alice"));
    store.evaluate_query(&query, &tx).unwrap();

    let tokens: Vec<_> = rx.try_iter().collect();
    assert_eq!(tokens.len(), 3);
    assert!(tokens[..2].iter().all(|t| !t.is_eos()));
    assert_eq!(tokens[2], AnswerToken::Eos);
}

#[test]
fn watch_query_streams_new_matches() {
    let store = fresh_store("e2e-watch");
    store.insert_one(&triple("Dog", "subClassOf", "Animal")).unwrap();
    store.insert_one(&triple("old", "type", "Dog")).unwrap();

    let mut watch = store
        .watch_query(&TriplePattern::new(Term::var("x"), "type", "Animal"))
        .unwrap();

    let writer = store.clone();
    let producer = thread::spawn(move || {
        writer.insert_one(&triple("cat", "likes", "fish")).unwrap();
        writer.insert_one(&triple("rex", "type", "Dog")).unwrap();
    });

    let got = watch.recv_timeout(Duration::from_secs(5)).unwrap();
    assert_eq!(got.subject_name(), "rex");
    producer.join().unwrap();

    assert!(matches!(
        watch.recv_timeout(Duration::from_millis(20)),
        Err(KbError::Timeout { .. })
    ));

    // Detaching from another handle wakes a blocked receiver.
    let cancel = watch.cancel_handle();
    let canceller = thread::spawn(move || {
        thread::sleep(Duration::from_millis(20));
        cancel.cancel();
    });
    assert!(matches!(watch.recv(), Err(KbError::Disconnected { .. })));
    canceller.join().unwrap();

    // A restarted stream sees the hierarchy as it is now.
    store.insert_one(&triple("Puppy", "subClassOf", "Dog")).unwrap();
    watch.restart().unwrap();
    store.insert_one(&triple("bit", "type", "Puppy")).unwrap();
    assert_eq!(watch.try_recv().unwrap().map(|t| t.subject_name().to_string()), Some("bit".to_string()));
}

#[test]
fn drop_all_disconnects_watchers() {
    let store = fresh_store("e2e-drop");
    store.insert_one(&triple("Dog", "subClassOf", "Animal")).unwrap();
    let mut watch = store.watch_query(&TriplePattern::new(Term::var("x"), "p", "y")).unwrap();

    store.drop_all().unwrap();
    assert!(matches!(watch.recv(), Err(KbError::Disconnected { .. })));
    assert!(store.class_descendants("Animal").unwrap().is_empty());
    assert_eq!(count(&store, &TriplePattern::new(Term::var("x"), "subClassOf", "Animal")), 0);
}

#[test]
fn unreachable_host_is_a_connection_error() {
    let host = "e2e-offline";
    MemoryServer::start(host).unwrap();
    MemoryServer::shutdown(host).unwrap();

    let err = FactStore::connect(StoreConfig::with_uri(format!("memory://{host}"))).unwrap_err();
    assert!(matches!(err, KbError::Connection { .. }));
    assert!(err.is_retryable());

    let err = FactStore::connect(StoreConfig::with_uri("mongodb://localhost:27017")).unwrap_err();
    assert!(matches!(err, KbError::Connection { .. }));
}
