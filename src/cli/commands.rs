//! Command implementations for the Taxis CLI.

use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;

use chrono::{TimeZone, Utc};
use log::{info, warn};

use crate::cli::args::*;
use crate::cli::entity::{FieldSchema, JsonEntity, load_records};
use crate::cli::output::*;
use crate::config::IndexerConfig;
use crate::entity::MemoryResolver;
use crate::error::{Result, TaxisError};
use crate::indexer::TextIndexer;
use crate::search::SearchOptions;
use crate::termvec::TermVectors;

/// Execute a CLI command.
pub fn execute_command(args: TaxisArgs) -> Result<()> {
    match &args.command {
        Command::Index(index_args) => index_records(index_args, &args),
        Command::Search(search_args) => search_index(search_args, &args),
        Command::Suggest(suggest_args) => suggest(suggest_args, &args),
        Command::Facets(facets_args) => show_facets(facets_args, &args),
        Command::TermVectors(tv_args) => show_term_vectors(tv_args, &args),
        Command::Stats(stats_args) => show_stats(stats_args, &args),
    }
}

fn load_config(args: &TaxisArgs) -> Result<IndexerConfig> {
    match &args.config {
        Some(path) => IndexerConfig::from_file(path),
        None => Ok(IndexerConfig::default()),
    }
}

fn open_indexer(path: &Path, resolver: Arc<MemoryResolver>, args: &TaxisArgs) -> Result<TextIndexer> {
    TextIndexer::builder()
        .dir(path)
        .config(load_config(args)?)
        .resolver(resolver)
        .build()
}

/// Index the records of a file, replacing documents with the same id.
fn index_records(args: &IndexArgs, cli_args: &TaxisArgs) -> Result<()> {
    let start_time = Instant::now();
    let schema = Arc::new(FieldSchema {
        facets: args.facet.iter().cloned().collect(),
        taxonomy: args.taxonomy.iter().cloned().collect(),
        suggest: args.suggest.iter().cloned().collect(),
        sortable: args.sortable.iter().cloned().collect(),
    });
    let records = load_records(&args.records, schema)?;
    info!("indexing {} records into {}", records.len(), args.index_path.display());

    let indexer = open_indexer(&args.index_path, Arc::new(MemoryResolver::new()), cli_args)?;
    let mut indexed = 0;
    for record in &records {
        if indexer.update(record)? {
            indexed += 1;
        }
    }
    if args.no_commit {
        warn!("changes are left in the write-ahead log");
    } else {
        indexer.shutdown()?;
    }

    let duration = start_time.elapsed();
    output_result(
        "Records indexed",
        &IndexSummary {
            records_read: records.len(),
            documents_indexed: indexed,
            total_documents: indexer.size(),
            duration_ms: duration.as_millis() as u64,
            docs_per_second: indexed as f64 / duration.as_secs_f64().max(f64::EPSILON),
        },
        cli_args,
    )
}

/// Search and hydrate the hits from the record file.
fn search_index(args: &SearchArgs, cli_args: &TaxisArgs) -> Result<()> {
    let start_time = Instant::now();
    let resolver = Arc::new(MemoryResolver::new());
    for record in load_records(&args.records, Arc::new(FieldSchema::default()))? {
        resolver.insert(Arc::new(record));
    }
    let indexer = open_indexer(&args.index_path, resolver, cli_args)?;

    let mut pairs: Vec<(&str, String)> = vec![
        ("top", args.top.to_string()),
        ("skip", args.skip.to_string()),
        ("fdim", args.fdim.to_string()),
        ("drill", if args.sideway { "sideway" } else { "down" }.to_string()),
    ];
    if let Some(kind) = &args.kind {
        pairs.push(("kind", kind.clone()));
    }
    pairs.extend(args.drill.iter().map(|f| ("facet", f.clone())));
    pairs.extend(args.order.iter().map(|o| ("order", o.clone())));
    let options = SearchOptions::parse(pairs);

    let result = indexer.search(options, args.query.as_deref(), None)?;
    let hits = result
        .matches_when_finished()
        .iter()
        .filter_map(|e| e.downcast_ref::<JsonEntity>().map(JsonEntity::record))
        .collect();
    let facets = result
        .facets()
        .iter()
        .map(|f| FacetOutput {
            name: f.name().to_string(),
            values: f.values().to_vec(),
        })
        .collect();
    let summary = SearchSummary {
        query: args.query.clone(),
        total_hits: result.count(),
        hits,
        facets,
        duration_ms: start_time.elapsed().as_millis() as u64,
    };
    indexer.shutdown()?;
    output_result("Search results", &summary, cli_args)
}

fn suggest(args: &SuggestArgs, cli_args: &TaxisArgs) -> Result<()> {
    let indexer = open_indexer(&args.index_path, Arc::new(MemoryResolver::new()), cli_args)?;
    let results = indexer.suggest(args.field.as_deref(), &args.key, args.max);
    output_result("Suggestions", &results, cli_args)
}

fn show_facets(args: &FacetsArgs, cli_args: &TaxisArgs) -> Result<()> {
    let indexer = open_indexer(&args.index_path, Arc::new(MemoryResolver::new()), cli_args)?;
    match &args.dim {
        Some(dim) => output_result("Facet label counts", &indexer.facet_label_counts(dim), cli_args),
        None => output_result("Facet configuration", &indexer.facets_config()?, cli_args),
    }
}

/// Parse `field=value` filters.
fn parse_filters(filters: &[String]) -> Result<BTreeMap<String, String>> {
    filters
        .iter()
        .map(|f| match f.split_once('=') {
            Some((field, value)) if !field.is_empty() => Ok((field.to_string(), value.to_string())),
            _ => Err(TaxisError::invalid_operation(format!(
                "filter {f:?} is not of the form field=value"
            ))),
        })
        .collect()
}

fn show_term_vectors(args: &TermVectorsArgs, cli_args: &TaxisArgs) -> Result<()> {
    let indexer = open_indexer(&args.index_path, Arc::new(MemoryResolver::new()), cli_args)?;
    match &args.conditional {
        Some(conditional) => {
            let tvs = indexer.conditional_term_vectors(&args.kind, &args.field, conditional)?;
            let by_label: BTreeMap<&str, &TermVectors> =
                tvs.iter().map(|(label, tv)| (label.as_str(), tv.as_ref())).collect();
            output_result("Conditional term vectors", &by_label, cli_args)
        }
        None => {
            let filters = parse_filters(&args.filter)?;
            let tv = indexer.term_vectors_filtered(&args.kind, &args.field, &filters)?;
            output_result("Term vectors", tv.as_ref(), cli_args)
        }
    }
}

fn show_stats(args: &StatsArgs, cli_args: &TaxisArgs) -> Result<()> {
    let indexer = open_indexer(&args.index_path, Arc::new(MemoryResolver::new()), cli_args)?;
    let last_modified = Utc
        .timestamp_millis_opt(indexer.last_modified())
        .single()
        .map(|t| t.to_rfc3339())
        .unwrap_or_default();
    let store = indexer.store();
    let stats = IndexStats {
        total_documents: indexer.size(),
        last_modified,
        facet_dimensions: store
            .facets()
            .dims()
            .into_iter()
            .map(|(dim, _)| dim)
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect(),
        sort_fields: store
            .sorters()
            .fields()
            .into_iter()
            .map(|(field, ty)| (field, format!("{ty:?}")))
            .collect(),
        suggest_fields: indexer.suggest_fields(),
    };
    output_result("Index statistics", &stats, cli_args)
}
