use std::sync::Arc;
use std::thread;
use std::time::Duration;

use taxis::entity::{EntityResolver, MemoryResolver};
use taxis::prelude::*;

#[derive(Debug)]
struct Widget {
    id: i64,
    name: String,
    color: &'static str,
    weight: i64,
}

impl Indexable for Widget {
    fn kind(&self) -> &str {
        "ix.test.Widget"
    }

    fn describe<'a>(&'a self, fields: &mut FieldSet<'a>) {
        fields
            .id("id", self.id)
            .field_with("name", IndexPolicy::new().suggest(), &self.name)
            .field_with("color", IndexPolicy::new().facet().named("Color"), self.color)
            .field_with("weight", IndexPolicy::new().sortable(), self.weight);
    }
}

#[derive(Debug)]
struct Drug {
    id: String,
    name: String,
}

impl Indexable for Drug {
    fn kind(&self) -> &str {
        "ix.test.Drug"
    }

    fn describe<'a>(&'a self, fields: &mut FieldSet<'a>) {
        fields
            .id("id", &self.id)
            .field_with("name", IndexPolicy::new().suggest(), &self.name);
    }
}

/// Resolver that takes a while for every entity.
#[derive(Debug)]
struct SlowResolver {
    inner: MemoryResolver,
    delay: Duration,
}

impl EntityResolver for SlowResolver {
    fn resolve(&self, kind: &str, id: &IdValue, expand: &[String]) -> Result<Option<EntityRef>> {
        thread::sleep(self.delay);
        self.inner.resolve(kind, id, expand)
    }
}

fn color_of(i: i64) -> &'static str {
    match i % 10 {
        0..=2 => "Red",
        3..=6 => "Blue",
        _ => "Green",
    }
}

fn widget(i: i64) -> Arc<Widget> {
    Arc::new(Widget {
        id: i,
        name: format!("widget {i}"),
        color: color_of(i),
        weight: i,
    })
}

fn indexer_with(count: i64, resolver: Arc<dyn EntityResolver>, inner: &MemoryResolver) -> TextIndexer {
    let indexer = TextIndexer::builder().resolver(resolver).build().unwrap();
    for i in 0..count {
        let w = widget(i);
        indexer.add(w.as_ref()).unwrap();
        inner.insert(w);
    }
    indexer
}

fn widgets(count: i64) -> (TextIndexer, Arc<MemoryResolver>) {
    let resolver = Arc::new(MemoryResolver::new());
    let indexer = indexer_with(count, resolver.clone(), &resolver);
    (indexer, resolver)
}

#[test]
fn test_facet_counts_over_all_widgets() {
    let (indexer, _) = widgets(100);
    let result = indexer
        .search(SearchOptions::new().kind("ix.test.Widget").fetch(0), None, None)
        .unwrap();

    assert_eq!(result.count(), 100);
    let color = result.facet("Color").unwrap();
    assert_eq!(color.count_of("Red"), Some(30));
    assert_eq!(color.count_of("Blue"), Some(40));
    assert_eq!(color.count_of("Green"), Some(30));
    assert_eq!(color.value(0), Some(&FV::new("Blue", 40)));
    indexer.shutdown().unwrap();
}

#[test]
fn test_drill_down_pins_the_drilled_label() {
    let (indexer, _) = widgets(100);
    let options = SearchOptions::new()
        .kind("ix.test.Widget")
        .facet("Color/Red")
        .top(100)
        .fetch(0);
    let result = indexer.search(options, None, None).unwrap();

    assert_eq!(result.count(), 30);
    assert_eq!(result.facet("Color").unwrap().value(0), Some(&FV::new("Red", 30)));
    assert!(result
        .matches_when_finished()
        .iter()
        .all(|e| e.downcast_ref::<Widget>().is_some_and(|w| w.color == "Red")));

    let sideways = SearchOptions::new()
        .kind("ix.test.Widget")
        .facet("Color/Red")
        .sideway(true)
        .fetch(0);
    let result = indexer.search(sideways, None, None).unwrap();
    let color = result.facet("Color").unwrap();
    assert_eq!(color.value(0), Some(&FV::new("Red", 30)));
    assert_eq!(color.count_of("Blue"), Some(40));
    indexer.shutdown().unwrap();
}

#[test]
fn test_suggest_completes_infix_words() {
    let resolver = Arc::new(MemoryResolver::new());
    let indexer = TextIndexer::builder().resolver(resolver).build().unwrap();
    for (id, name) in [
        ("d1", "Acetaminophen"),
        ("d2", "Ibuprofen"),
        ("d3", "Aspirin"),
    ] {
        indexer
            .add(&Drug {
                id: id.to_string(),
                name: name.to_string(),
            })
            .unwrap();
    }

    let results = indexer.suggest(Some("name"), "acet", 10);
    assert_eq!(results.len(), 1);
    assert_eq!(results[0].key, "Acetaminophen");
    assert_eq!(results[0].field, "name");
    assert!(indexer.suggest(None, "zzz", 10).is_empty());
    indexer.shutdown().unwrap();
}

#[test]
fn test_hydration_continues_in_the_background() {
    let inner = MemoryResolver::new();
    let widgets: Vec<Arc<Widget>> = (0..500).map(widget).collect();
    for w in &widgets {
        inner.insert(w.clone());
    }
    let slow = Arc::new(SlowResolver {
        inner,
        delay: Duration::from_millis(3),
    });
    let indexer = TextIndexer::builder().resolver(slow).build().unwrap();
    for w in &widgets {
        indexer.add(w.as_ref()).unwrap();
    }

    let options = SearchOptions::new()
        .kind("ix.test.Widget")
        .order("^weight")
        .top(500)
        .fetch(20);
    let result = indexer.search(options, None, None).unwrap();

    assert_eq!(result.count(), 500);
    let early = result.size();
    // Default floor of 20 plus a random share of the budget of 20.
    assert!((20..40).contains(&early), "{early} hydrated before returning");
    assert!(!result.finished());

    let all = result.matches_when_finished();
    assert!(result.finished());
    assert_eq!(all.len(), 500);
    let ids: Vec<i64> = all
        .iter()
        .filter_map(|e| e.downcast_ref::<Widget>().map(|w| w.id))
        .collect();
    assert_eq!(ids, (0..500).collect::<Vec<_>>());
    indexer.shutdown().unwrap();
}

#[test]
fn test_readers_during_hydration_see_a_growing_prefix() {
    let inner = MemoryResolver::new();
    let widgets: Vec<Arc<Widget>> = (0..300).map(widget).collect();
    for w in &widgets {
        inner.insert(w.clone());
    }
    let slow = Arc::new(SlowResolver {
        inner,
        delay: Duration::from_millis(1),
    });
    let indexer = TextIndexer::builder().resolver(slow).build().unwrap();
    for w in &widgets {
        indexer.add(w.as_ref()).unwrap();
    }

    let options = SearchOptions::new()
        .kind("ix.test.Widget")
        .order("^weight")
        .top(300)
        .fetch(10);
    let result = indexer.search(options, None, None).unwrap();

    thread::scope(|scope| {
        for _ in 0..4 {
            let result = &result;
            scope.spawn(move || {
                let mut seen = 0;
                let mut was_finished = false;
                loop {
                    let finished = result.finished();
                    assert!(finished || !was_finished, "finished reverted");
                    let matches = result.matches();
                    assert!(matches.len() >= seen, "prefix shrank");
                    for (rank, entity) in matches.iter().enumerate() {
                        let id = entity.downcast_ref::<Widget>().map(|w| w.id);
                        assert_eq!(id, Some(rank as i64));
                    }
                    seen = matches.len();
                    if finished {
                        assert_eq!(seen, 300);
                        break;
                    }
                    was_finished = finished;
                    thread::sleep(Duration::from_millis(2));
                }
            });
        }
    });
    assert!(result.finished());
    indexer.shutdown().unwrap();
}

#[test]
fn test_removed_entity_leaves_subset_search_empty() {
    let (indexer, resolver) = widgets(10);
    let target = resolver
        .resolve("ix.test.Widget", &IdValue::Long(4), &[])
        .unwrap()
        .unwrap();
    let subset = vec![target.clone()];

    let before = indexer
        .search(SearchOptions::new().fetch(0), None, Some(subset.as_slice()))
        .unwrap();
    assert_eq!(before.count(), 1);

    assert!(indexer.remove(target.as_ref()).unwrap() > 0);
    let after = indexer
        .search(SearchOptions::new().fetch(0), None, Some(subset.as_slice()))
        .unwrap();
    assert_eq!(after.count(), 0);
    assert_eq!(indexer.size(), 9);
    indexer.shutdown().unwrap();
}

#[test]
fn test_unparsable_query_matches_everything() {
    let (indexer, _) = widgets(25);
    let result = indexer
        .search(SearchOptions::new().top(100).fetch(0), Some("("), None)
        .unwrap();
    assert_eq!(result.count(), 25);
    assert_eq!(result.matches_when_finished().len(), 25);
    indexer.shutdown().unwrap();
}

#[test]
fn test_index_survives_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let resolver = Arc::new(MemoryResolver::new());
    {
        let indexer = TextIndexer::open_dir(dir.path(), resolver.clone()).unwrap();
        for i in 0..20 {
            let w = widget(i);
            indexer.add(w.as_ref()).unwrap();
            resolver.insert(w);
        }
        indexer.shutdown().unwrap();
    }

    let reopened = TextIndexer::open_dir(dir.path(), resolver).unwrap();
    assert_eq!(reopened.size(), 20);
    assert_eq!(reopened.facet_label_counts("Color").get("Red"), Some(&6));
    assert!(reopened
        .suggest(Some("name"), "widget 1", 20)
        .iter()
        .any(|s| s.key == "widget 1"));
    reopened.shutdown().unwrap();
}
