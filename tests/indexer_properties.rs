use std::collections::BTreeSet;
use std::sync::Arc;

use taxis::entity::MemoryResolver;
use taxis::prelude::*;

#[derive(Debug)]
struct Part {
    id: i64,
    name: String,
    maker: &'static str,
}

impl Indexable for Part {
    fn kind(&self) -> &str {
        "ix.test.Part"
    }

    fn describe<'a>(&'a self, fields: &mut FieldSet<'a>) {
        fields
            .id("id", self.id)
            .field_with("name", IndexPolicy::new().suggest(), &self.name)
            .field_with("maker", IndexPolicy::new().facet().named("Maker"), self.maker);
    }
}

/// A part sold in several kits at once.
#[derive(Debug)]
struct Stocked {
    id: i64,
    kits: Vec<&'static str>,
}

impl Indexable for Stocked {
    fn kind(&self) -> &str {
        "ix.test.Stocked"
    }

    fn describe<'a>(&'a self, fields: &mut FieldSet<'a>) {
        fields.id("id", self.id);
        for kit in &self.kits {
            fields.field_with("kit", IndexPolicy::new().facet().named("Kit"), *kit);
        }
    }
}

const MAKERS: [&str; 4] = ["Acme", "Globex", "Initech", "Umbrella"];
const NAMES: [&str; 6] = [
    "Acetate washer",
    "Acorn nut",
    "Ace hinge",
    "Bolt",
    "Cable tie",
    "Acetyl bearing",
];

fn part(id: i64) -> Part {
    Part {
        id,
        name: format!("{} {id}", NAMES[id as usize % NAMES.len()]),
        maker: MAKERS[id as usize % MAKERS.len()],
    }
}

fn parts(count: i64) -> TextIndexer {
    let indexer = TextIndexer::builder()
        .resolver(Arc::new(MemoryResolver::new()))
        .build()
        .unwrap();
    for id in 0..count {
        indexer.add(&part(id)).unwrap();
    }
    indexer
}

#[test]
fn test_update_is_idempotent() {
    let indexer = parts(12);
    let before = indexer.facet_label_counts("Maker");

    for _ in 0..3 {
        assert!(indexer.update(&part(5)).unwrap());
    }
    assert_eq!(indexer.size(), 12);
    assert_eq!(indexer.facet_label_counts("Maker"), before);
    indexer.shutdown().unwrap();
}

#[test]
fn test_single_valued_facet_counts_sum_to_hits() {
    let indexer = parts(37);
    for query in [None, Some("name:acetate"), Some("name:bolt OR name:cable")] {
        let result = indexer
            .search(
                SearchOptions::new().kind("ix.test.Part").top(100).fetch(0),
                query,
                None,
            )
            .unwrap();
        let total: usize = result
            .facet("Maker")
            .map(|f| f.values().iter().map(|fv| fv.count).sum())
            .unwrap_or(0);
        assert_eq!(total, result.count(), "query {query:?}");
    }
    indexer.shutdown().unwrap();
}

#[test]
fn test_multi_valued_facet_counts_can_exceed_hits() {
    let indexer = TextIndexer::builder()
        .resolver(Arc::new(MemoryResolver::new()))
        .build()
        .unwrap();
    let kits = [
        vec!["Starter", "Pro"],
        vec!["Starter"],
        vec!["Pro", "Repair", "Starter"],
        vec![],
    ];
    for (id, kits) in kits.into_iter().enumerate() {
        indexer
            .add(&Stocked {
                id: id as i64,
                kits,
            })
            .unwrap();
    }

    let result = indexer
        .search(SearchOptions::new().kind("ix.test.Stocked").fetch(0), None, None)
        .unwrap();
    assert_eq!(result.count(), 4);
    let kit = result.facet("Kit").unwrap();
    let total: usize = kit.values().iter().map(|fv| fv.count).sum();
    assert_eq!(total, 6);
    assert!(total > result.count());
    assert_eq!(kit.count_of("Starter"), Some(3));
    assert!(kit.values().iter().all(|fv| fv.count <= result.count()));
    indexer.shutdown().unwrap();
}

#[test]
fn test_longer_prefix_narrows_suggestions() {
    let indexer = parts(30);
    let keys = |prefix: &str| -> BTreeSet<String> {
        indexer
            .suggest(Some("name"), prefix, 1000)
            .into_iter()
            .map(|s| s.key)
            .collect()
    };

    let mut previous = keys("a");
    assert!(!previous.is_empty());
    for prefix in ["ac", "ace", "acet", "aceta"] {
        let narrower = keys(prefix);
        assert!(narrower.is_subset(&previous), "{prefix} widened the suggestions");
        previous = narrower;
    }
    assert!(previous.iter().all(|k| k.starts_with("Acetate")));
    indexer.shutdown().unwrap();
}

#[test]
fn test_finished_result_holds_the_requested_page() {
    let indexer = parts(40);
    for (top, skip) in [(10, 0), (10, 35), (100, 0), (5, 50)] {
        let result = indexer
            .search(
                SearchOptions::new()
                    .kind("ix.test.Part")
                    .top(top)
                    .skip(skip)
                    .fetch(0),
                None,
                None,
            )
            .unwrap();
        assert!(result.finished());
        assert!(result.stop_time().is_some());
        assert_eq!(result.size(), top.min(result.count().saturating_sub(skip)));
    }
    indexer.shutdown().unwrap();
}

#[test]
fn test_suggestions_refresh_only_after_changes() {
    let indexer = parts(6);
    assert_eq!(indexer.suggest(Some("name"), "bolt", 10).len(), 1);
    let lookup = indexer.suggest_lookup("name").unwrap();
    let refreshes = lookup.refresh_count();

    indexer.suggest(Some("name"), "cable", 10);
    assert_eq!(lookup.refresh_count(), refreshes);

    indexer
        .update(&Part {
            id: 3,
            name: "Bolt cutter".to_string(),
            maker: "Acme",
        })
        .unwrap();
    assert!(lookup.dirty() > 0);
    let found = indexer.suggest(Some("name"), "cutter", 10);
    assert_eq!(found.len(), 1);
    assert_eq!(found[0].key, "Bolt cutter");
    assert_eq!(lookup.refresh_count(), refreshes + 1);
    assert_eq!(lookup.dirty(), 0);
    indexer.shutdown().unwrap();
}
