//! Spreadsheet rows → insertable registros.
//!
//! Per-row ambiguity (dates, amounts, status text, channel placement) is
//! resolved locally with a fixed default per field and reported as a
//! [`RowIssue`]. The only row that does not produce a record is one without a
//! client name. Every column the alias table does not know is copied into
//! `observacoes`, as is a known column that lost to a higher-priority alias,
//! so nothing in the sheet is lost.

use crate::aliases::{is_known_header, resolve, resolve_entry, resolve_text, Field};
use crate::models::{
    CanonicalRecord, NormalizedBatch, Observacoes, RawRow, RawValue, RowDiagnostics, RowIssue,
};
use crate::parsers::{mentions_channel, parse_amount, parse_date, recognize_status, validate_br_phone};
use chrono::{NaiveDate, Utc};
use std::collections::HashSet;
use uuid::Uuid;

pub const DEFAULT_MEIO_CONFIRMACAO: &str = "WhatsApp";
pub const DEFAULT_BOLETO_STATUS: &str = "Email";
pub const DEFAULT_ENTREGA_MERCADORIA: &str = "Entregue";

/// Bag key holding the raw amount when a negative value was clamped.
pub const VALOR_ORIGINAL_KEY: &str = "valor_original";

/// Result of normalizing one row.
#[derive(Debug, Clone)]
pub struct RowOutcome {
    /// `None` when the row was dropped.
    pub record: Option<CanonicalRecord>,
    pub issues: Vec<RowIssue>,
}

/// Normalizes a batch using today's UTC date for rows without a usable date.
pub fn normalize(rows: &[RawRow], user_id: Uuid) -> NormalizedBatch {
    normalize_at(rows, user_id, Utc::now().date_naive())
}

/// Normalizes a batch with an explicit substitute date.
///
/// Output order follows input order.
pub fn normalize_at(rows: &[RawRow], user_id: Uuid, today: NaiveDate) -> NormalizedBatch {
    let mut batch = NormalizedBatch {
        submitted: rows.len(),
        ..Default::default()
    };

    for (index, row) in rows.iter().enumerate() {
        let RowOutcome { record, issues } = normalize_row(row, user_id, today);

        match record {
            Some(record) => {
                if issues.contains(&RowIssue::DateDefaulted) {
                    batch.dates_defaulted += 1;
                }
                batch.records.push(record);
            }
            None => {
                tracing::debug!("Row {} dropped: no client name", index);
                batch.dropped += 1;
            }
        }

        if !issues.is_empty() {
            batch.diagnostics.push(RowDiagnostics { row: index, issues });
        }
    }

    tracing::info!(
        "Normalized {} row(s): {} kept, {} dropped, {} date(s) defaulted",
        batch.submitted,
        batch.records.len(),
        batch.dropped,
        batch.dates_defaulted
    );

    batch
}

/// Normalizes a single row.
pub fn normalize_row(row: &RawRow, user_id: Uuid, today: NaiveDate) -> RowOutcome {
    let mut issues = Vec::new();

    let data_contato = match resolve(row, Field::DataContato.aliases()).and_then(parse_date) {
        Some(date) => date,
        None => {
            issues.push(RowIssue::DateDefaulted);
            today
        }
    };

    let valor_cell = resolve(row, Field::Valor.aliases());
    let mut valor = match valor_cell {
        Some(cell) => parse_amount(cell).unwrap_or_else(|| {
            if !cell.is_blank() {
                issues.push(RowIssue::ValueUnparseable);
            }
            0.0
        }),
        None => 0.0,
    };
    let mut valor_original = None;
    if valor < 0.0 {
        issues.push(RowIssue::NegativeValueClamped);
        valor_original = valor_cell.map(RawValue::trimmed);
        valor = 0.0;
    }

    let status_cell = resolve(row, Field::Status.aliases());
    let status = status_cell.and_then(recognize_status).unwrap_or_else(|| {
        if status_cell.is_some_and(|cell| !cell.is_blank()) {
            issues.push(RowIssue::StatusUnrecognized);
        }
        Default::default()
    });

    let gestor = extra_cell(row, Field::Gestor);
    let numero_op = extra_cell(row, Field::NumeroOp);
    let nome_contato = extra_cell(row, Field::NomeContato);
    let telefone = extra_cell(row, Field::Telefone);
    let mut boleto_status = extra_cell(row, Field::BoletoStatus);
    let entrega_mercadoria = extra_cell(row, Field::EntregaMercadoria);
    let mut meio_confirmacao = extra_cell(row, Field::MeioConfirmacao);
    let original_obs = extra_cell(row, Field::OriginalObs);

    // Older sheets put the confirmation channel under "Boleto".
    if meio_confirmacao.is_none()
        && boleto_status
            .as_ref()
            .and_then(RawValue::as_text)
            .is_some_and(|text| mentions_channel(&text))
    {
        meio_confirmacao = boleto_status.take();
        issues.push(RowIssue::ChannelMovedFromBoleto);
    }

    if let Some(phone) = telefone.as_ref().and_then(RawValue::as_text) {
        if validate_br_phone(&phone).is_none() {
            issues.push(RowIssue::PhoneUnrecognized);
        }
    }

    let consumed: HashSet<&str> = Field::ALL
        .iter()
        .filter_map(|field| resolve_entry(row, field.aliases()))
        .map(|(header, _)| header)
        .collect();

    let mut observacoes = Observacoes::new();
    for (header, value) in row {
        if !is_known_header(header) || !consumed.contains(header.as_str()) {
            observacoes.insert(header.clone(), value.clone());
        }
    }
    let extras = [
        (Field::Gestor, &gestor),
        (Field::NumeroOp, &numero_op),
        (Field::NomeContato, &nome_contato),
        (Field::Telefone, &telefone),
        (Field::BoletoStatus, &boleto_status),
        (Field::EntregaMercadoria, &entrega_mercadoria),
        (Field::MeioConfirmacao, &meio_confirmacao),
        (Field::OriginalObs, &original_obs),
    ];
    for (field, cell) in extras {
        if let Some(cell) = cell {
            observacoes.insert(field.bag_key(), cell.clone());
        }
    }
    if let Some(raw) = valor_original {
        observacoes.insert(VALOR_ORIGINAL_KEY, raw);
    }

    let Some(cliente_nome) = resolve_text(row, Field::ClienteNome) else {
        issues.push(RowIssue::MissingClientName);
        return RowOutcome {
            record: None,
            issues,
        };
    };

    let text_of = |cell: &Option<RawValue>| cell.as_ref().and_then(RawValue::as_text);

    let record = CanonicalRecord {
        data_contato,
        cliente_nome,
        tipo_contato: resolve_text(row, Field::TipoContato),
        produto: resolve_text(row, Field::Produto),
        cedente: resolve_text(row, Field::Cedente),
        sacado: resolve_text(row, Field::Sacado),
        valor,
        status,
        gestor: text_of(&gestor),
        numero_op: text_of(&numero_op),
        nome_contato: text_of(&nome_contato),
        telefone: text_of(&telefone),
        meio_confirmacao: text_of(&meio_confirmacao)
            .unwrap_or_else(|| DEFAULT_MEIO_CONFIRMACAO.to_string()),
        boleto_status: text_of(&boleto_status)
            .unwrap_or_else(|| DEFAULT_BOLETO_STATUS.to_string()),
        entrega_mercadoria: text_of(&entrega_mercadoria)
            .unwrap_or_else(|| DEFAULT_ENTREGA_MERCADORIA.to_string()),
        observacoes,
        user_id,
    };

    RowOutcome {
        record: Some(record),
        issues,
    }
}

/// Non-blank cell for `field`, trimmed.
fn extra_cell(row: &RawRow, field: Field) -> Option<RawValue> {
    resolve(row, field.aliases())
        .filter(|cell| !cell.is_blank())
        .map(RawValue::trimmed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Status;

    fn row(pairs: &[(&str, &str)]) -> RawRow {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), RawValue::from(*v)))
            .collect()
    }

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 10, 19).unwrap()
    }

    fn single(pairs: &[(&str, &str)]) -> RowOutcome {
        normalize_row(&row(pairs), Uuid::nil(), today())
    }

    #[test]
    fn test_defaults_fill_system_fields() {
        let outcome = single(&[("Cliente", "Acme"), ("Data", "01/03/2024")]);
        let record = outcome.record.unwrap();

        assert_eq!(record.meio_confirmacao, DEFAULT_MEIO_CONFIRMACAO);
        assert_eq!(record.boleto_status, DEFAULT_BOLETO_STATUS);
        assert_eq!(record.entrega_mercadoria, DEFAULT_ENTREGA_MERCADORIA);
        assert_eq!(record.status, Status::Pendente);
        assert_eq!(record.valor, 0.0);
        assert!(outcome.issues.is_empty());
    }

    #[test]
    fn test_missing_date_defaults_to_today() {
        let outcome = single(&[("Cliente", "Acme"), ("Data", "ontem")]);
        assert_eq!(outcome.record.unwrap().data_contato, today());
        assert_eq!(outcome.issues, vec![RowIssue::DateDefaulted]);
    }

    #[test]
    fn test_produto_falls_back_to_cedente() {
        let record = single(&[("Cliente", "Acme"), ("Cedente", "Fornecedor X")])
            .record
            .unwrap();
        assert_eq!(record.produto.as_deref(), Some("Fornecedor X"));
        assert_eq!(record.cedente.as_deref(), Some("Fornecedor X"));
    }

    #[test]
    fn test_negative_value_is_clamped_and_kept() {
        let outcome = single(&[("Cliente", "Acme"), ("Valor", "-R$ 10,00")]);
        let record = outcome.record.unwrap();

        assert_eq!(record.valor, 0.0);
        assert!(outcome.issues.contains(&RowIssue::NegativeValueClamped));
        assert_eq!(
            record.observacoes.get(VALOR_ORIGINAL_KEY),
            Some(&RawValue::from("-R$ 10,00"))
        );
    }

    #[test]
    fn test_unparseable_value_is_flagged() {
        let outcome = single(&[("Cliente", "Acme"), ("Valor", "a combinar")]);
        assert_eq!(outcome.record.unwrap().valor, 0.0);
        assert!(outcome.issues.contains(&RowIssue::ValueUnparseable));
    }

    #[test]
    fn test_unknown_status_is_flagged() {
        let outcome = single(&[("Cliente", "Acme"), ("Status", "OLA")]);
        assert_eq!(outcome.record.unwrap().status, Status::Pendente);
        assert!(outcome.issues.contains(&RowIssue::StatusUnrecognized));
    }

    #[test]
    fn test_explicit_channel_is_not_overridden() {
        let outcome = single(&[
            ("Cliente", "Acme"),
            ("Meio", "Telefone"),
            ("Boleto", "Enviado por Whatsapp"),
        ]);
        let record = outcome.record.unwrap();

        assert_eq!(record.meio_confirmacao, "Telefone");
        assert_eq!(record.boleto_status, "Enviado por Whatsapp");
        assert!(!outcome.issues.contains(&RowIssue::ChannelMovedFromBoleto));
    }

    #[test]
    fn test_explicit_fields_win_over_unmapped_columns() {
        let outcome = single(&[
            ("Cliente", "Acme"),
            ("Obs", "ligar depois"),
            ("original_obs", "coluna solta"),
        ]);
        let record = outcome.record.unwrap();
        assert_eq!(
            record.observacoes.get("original_obs"),
            Some(&RawValue::from("ligar depois"))
        );
    }

    #[test]
    fn test_losing_alias_column_is_kept_in_bag() {
        let outcome = single(&[("Cliente", "Acme"), ("Nome", "Acme Ltda"), ("Tel", "11 5555-0000")]);
        let record = outcome.record.unwrap();

        assert_eq!(record.cliente_nome, "Acme");
        assert_eq!(record.observacoes.get("Nome"), Some(&RawValue::from("Acme Ltda")));
        assert_eq!(record.observacoes.get("Cliente"), None);
        assert_eq!(record.observacoes.get("Tel"), None);
    }

    #[test]
    fn test_moved_boleto_column_is_not_duplicated() {
        let outcome = single(&[("Cliente", "Acme"), ("Boleto", "Confirmado por e-mail")]);
        let record = outcome.record.unwrap();

        assert_eq!(record.observacoes.get("Boleto"), None);
        assert_eq!(
            record.observacoes.get("meio_confirmacao"),
            Some(&RawValue::from("Confirmado por e-mail"))
        );
    }

    #[test]
    fn test_invalid_phone_is_flagged_but_kept() {
        let outcome = single(&[("Cliente", "Acme"), ("Telefone", "1234")]);
        assert_eq!(outcome.record.unwrap().telefone.as_deref(), Some("1234"));
        assert!(outcome.issues.contains(&RowIssue::PhoneUnrecognized));
    }

    #[test]
    fn test_row_without_client_is_dropped() {
        let outcome = single(&[("Data", "01/03/2024"), ("Valor", "10")]);
        assert!(outcome.record.is_none());
        assert!(outcome.issues.contains(&RowIssue::MissingClientName));
    }

    #[test]
    fn test_batch_counts() {
        let rows = vec![
            row(&[("Cliente", "A"), ("Data", "01/03/2024")]),
            row(&[("Cliente", "B")]),
            row(&[("Valor", "10")]),
        ];
        let batch = normalize_at(&rows, Uuid::nil(), today());

        assert_eq!(batch.submitted, 3);
        assert_eq!(batch.records.len(), 2);
        assert_eq!(batch.dropped, 1);
        assert_eq!(batch.dates_defaulted, 1);
        assert_eq!(batch.issue_count(RowIssue::MissingClientName), 1);
        assert_eq!(batch.records[0].cliente_nome, "A");
        assert_eq!(batch.records[1].cliente_nome, "B");
    }
}
