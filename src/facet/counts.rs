//! Per-ordinal hit counts over a set of documents.

use crate::facet::{FV, Facet};
use crate::index::{DocId, IndexSnapshot, Ordinal, ROOT_ORDINAL, Taxonomy};

/// Number of documents carrying each taxonomy ordinal. Ancestors are
/// indexed with every label, so the count of a dimension is the number of
/// documents with at least one value in it.
#[derive(Debug, Clone)]
pub struct FacetCounts {
    counts: Vec<usize>,
}

impl FacetCounts {
    /// Count the ordinals of `docs`.
    pub fn count<I>(snapshot: &IndexSnapshot, docs: I) -> Self
    where
        I: IntoIterator<Item = DocId>,
    {
        let mut counts = vec![0usize; snapshot.taxonomy().len()];
        for doc in docs {
            let Some(doc) = snapshot.doc(doc) else {
                continue;
            };
            for &ord in &doc.ordinals {
                if let Some(count) = counts.get_mut(ord as usize) {
                    *count += 1;
                }
            }
        }
        FacetCounts { counts }
    }

    pub fn get(&self, ord: Ordinal) -> usize {
        self.counts.get(ord as usize).copied().unwrap_or(0)
    }

    /// Count of `dim/path...`; zero for unknown labels.
    pub fn specific_value(&self, taxonomy: &Taxonomy, dim: &str, path: &[&str]) -> usize {
        taxonomy
            .ordinal(dim, path)
            .map(|ord| self.get(ord))
            .unwrap_or(0)
    }

    /// The `n` most frequent children of `dim`, or `None` when no counted
    /// document has a value in it.
    pub fn top_children(&self, taxonomy: &Taxonomy, dim: &str, n: usize) -> Option<Facet> {
        let ord = taxonomy.ordinal(dim, &[])?;
        if self.get(ord) == 0 {
            return None;
        }
        let mut facet = Facet::with_values(
            dim,
            taxonomy
                .children(ord)
                .iter()
                .filter_map(|&child| {
                    let count = self.get(child);
                    let label = taxonomy.label(child)?;
                    (count > 0).then(|| FV::new(label, count))
                })
                .collect(),
        );
        facet.sort();
        facet.truncate(n);
        Some(facet)
    }

    /// Top children of every dimension with hits, dimensions ordered by
    /// their document count.
    pub fn all_dims(&self, taxonomy: &Taxonomy, n: usize) -> Vec<Facet> {
        let mut dims: Vec<(usize, &str)> = taxonomy
            .children(ROOT_ORDINAL)
            .iter()
            .filter_map(|&ord| {
                let count = self.get(ord);
                (count > 0).then_some((count, taxonomy.label(ord)?))
            })
            .collect();
        dims.sort_by(|a, b| b.0.cmp(&a.0).then_with(|| a.1.cmp(b.1)));
        dims.into_iter()
            .filter_map(|(_, dim)| self.top_children(taxonomy, dim, n))
            .collect()
    }
}
