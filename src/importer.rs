//! Import pipeline shared by the JSON and CSV routes and the `import_csv` CLI.

use crate::config::Config;
use crate::db_storage::RegistroStore;
use crate::errors::AppError;
use crate::gestor::GestorSuggestions;
use crate::models::{row_from_json, ImportSummary, NormalizedBatch, RawRow, RowIssue};
use crate::normalizer::normalize;
use moka::future::Cache;
use std::sync::Arc;
use uuid::Uuid;

/// Produto → gestor suggestions, cached as a single entry.
pub type GestorCache = Cache<&'static str, Arc<GestorSuggestions>>;

/// Single key of the suggestion cache; the whole map is cached as one value.
const SUGGESTIONS_KEY: &str = "all";

/// Extracts the rows of a `{ "records": [...] }` body.
///
/// A missing `records` field, a non-array value or any non-object element
/// rejects the whole body.
pub fn rows_from_body(body: serde_json::Value) -> Result<Vec<RawRow>, AppError> {
    let serde_json::Value::Object(mut body) = body else {
        return Err(AppError::invalid_format());
    };

    let Some(serde_json::Value::Array(records)) = body.remove("records") else {
        return Err(AppError::invalid_format());
    };

    records
        .into_iter()
        .map(|value| row_from_json(value).ok_or_else(AppError::invalid_format))
        .collect()
}

/// Normalizes `rows` for `user_id` and inserts the survivors in one batch.
///
/// With a `cache`, suggestions are read through it and it is invalidated after
/// the insert; without one they are loaded straight from the store.
pub async fn import_rows(
    store: &dyn RegistroStore,
    config: &Config,
    cache: Option<&GestorCache>,
    rows: &[RawRow],
    user_id: Uuid,
) -> Result<ImportSummary, AppError> {
    if rows.len() > config.import_soft_row_limit {
        tracing::warn!(
            "Import of {} row(s) by {} exceeds the recommended {} rows",
            rows.len(),
            user_id,
            config.import_soft_row_limit
        );
    }

    let mut batch = normalize(rows, user_id);
    log_diagnostics(&batch);

    if batch.records.is_empty() {
        tracing::warn!(
            "No valid records in import by {} ({} submitted)",
            user_id,
            batch.submitted
        );
        return Err(AppError::NoValidRecords);
    }

    let mut gestores_predicted = 0;
    if config.predict_gestor {
        match load_suggestions(store, cache).await {
            Ok(suggestions) => {
                gestores_predicted = suggestions.fill_missing(&mut batch.records);
            }
            Err(e) => {
                tracing::warn!("Gestor suggestions unavailable, importing without: {}", e);
            }
        }
    }

    let inserted = store.insert_batch(&batch.records).await?;
    if let Some(cache) = cache {
        cache.invalidate_all();
    }

    let summary = ImportSummary {
        submitted: batch.submitted,
        inserted,
        dropped: batch.dropped,
        dates_defaulted: batch.dates_defaulted,
        gestores_predicted,
    };

    tracing::info!(
        "✓ Import by {}: {} inserted, {} dropped, {} gestor(es) predicted",
        user_id,
        summary.inserted,
        summary.dropped,
        summary.gestores_predicted
    );

    Ok(summary)
}

/// Current suggestion map, built from the store on a cache miss.
pub async fn load_suggestions(
    store: &dyn RegistroStore,
    cache: Option<&GestorCache>,
) -> Result<Arc<GestorSuggestions>, AppError> {
    let Some(cache) = cache else {
        return build_suggestions(store).await;
    };

    cache
        .try_get_with(SUGGESTIONS_KEY, build_suggestions(store))
        .await
        .map_err(|e| Arc::try_unwrap(e).unwrap_or_else(|e| AppError::InternalError(e.to_string())))
}

async fn build_suggestions(store: &dyn RegistroStore) -> Result<Arc<GestorSuggestions>, AppError> {
    let pairs = store.produto_gestor_pairs().await?;
    let suggestions = GestorSuggestions::from_pairs(pairs);
    tracing::debug!("Loaded gestor suggestions for {} produto(s)", suggestions.len());
    Ok(Arc::new(suggestions))
}

fn log_diagnostics(batch: &NormalizedBatch) {
    const REPORTED: [RowIssue; 6] = [
        RowIssue::ValueUnparseable,
        RowIssue::NegativeValueClamped,
        RowIssue::StatusUnrecognized,
        RowIssue::ChannelMovedFromBoleto,
        RowIssue::PhoneUnrecognized,
        RowIssue::MissingClientName,
    ];

    for issue in REPORTED {
        let count = batch.issue_count(issue);
        if count > 0 {
            tracing::debug!("{:?}: {} row(s)", issue, count);
        }
    }
}
