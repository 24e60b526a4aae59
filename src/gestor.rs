//! Gestor suggestions learned from existing registros.
//!
//! Each produto (the cedente name on older sheets) is usually handled by the
//! same gestor, so the most frequent gestor seen for a produto is offered
//! when an imported row leaves the column empty.

use crate::models::{CanonicalRecord, RawValue};
use crate::aliases::Field;
use std::collections::{BTreeMap, HashMap};

#[derive(Debug, Clone, Default, PartialEq)]
pub struct GestorSuggestions {
    /// Lowercased, trimmed produto → gestor.
    by_produto: BTreeMap<String, String>,
}

impl GestorSuggestions {
    /// Builds suggestions from `(produto, gestor)` pairs.
    ///
    /// Pairs with a blank side are ignored. Produtos compare case-insensitively;
    /// gestor names are kept as written (trimmed). On a frequency tie the gestor
    /// seen first wins.
    pub fn from_pairs<I, P, G>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (P, G)>,
        P: AsRef<str>,
        G: AsRef<str>,
    {
        let mut tally: HashMap<String, Vec<(String, usize)>> = HashMap::new();

        for (produto, gestor) in pairs {
            let produto = produto.as_ref().trim();
            let gestor = gestor.as_ref().trim();
            if produto.is_empty() || gestor.is_empty() {
                continue;
            }

            let counts = tally.entry(produto.to_lowercase()).or_default();
            match counts.iter_mut().find(|(name, _)| name == gestor) {
                Some((_, count)) => *count += 1,
                None => counts.push((gestor.to_string(), 1)),
            }
        }

        let by_produto = tally
            .into_iter()
            .filter_map(|(produto, counts)| {
                let mut best: Option<(String, usize)> = None;
                for (gestor, count) in counts {
                    if best.as_ref().map_or(true, |(_, top)| count > *top) {
                        best = Some((gestor, count));
                    }
                }
                best.map(|(gestor, _)| (produto, gestor))
            })
            .collect();

        Self { by_produto }
    }

    /// Suggested gestor for `produto`, ignoring case and surrounding spaces.
    pub fn predict(&self, produto: &str) -> Option<&str> {
        let key = produto.trim().to_lowercase();
        if key.is_empty() {
            return None;
        }
        self.by_produto.get(&key).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.by_produto.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_produto.is_empty()
    }

    pub fn as_map(&self) -> &BTreeMap<String, String> {
        &self.by_produto
    }

    /// Sets `gestor` on records that have none but whose produto has a
    /// suggestion. Returns how many records were filled.
    pub fn fill_missing(&self, records: &mut [CanonicalRecord]) -> usize {
        let mut filled = 0;
        for record in records.iter_mut().filter(|r| r.gestor.is_none()) {
            let Some(gestor) = record.produto.as_deref().and_then(|p| self.predict(p)) else {
                continue;
            };
            let gestor = gestor.to_string();
            record
                .observacoes
                .insert(Field::Gestor.bag_key(), RawValue::from(gestor.as_str()));
            record.gestor = Some(gestor);
            filled += 1;
        }
        filled
    }
}
