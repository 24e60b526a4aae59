use chrono::NaiveDate;
use controladoria_api::models::{RawRow, RawValue, RowIssue, Status};
use controladoria_api::normalizer::{normalize_at, DEFAULT_BOLETO_STATUS};
use controladoria_api::parsers::{parse_date, parse_status, parse_value};
use controladoria_api::sheet::read_csv;
use serde_json::json;
use uuid::Uuid;

fn today() -> NaiveDate {
    NaiveDate::from_ymd_opt(2025, 1, 15).unwrap()
}

fn row(value: serde_json::Value) -> RawRow {
    controladoria_api::models::row_from_json(value).unwrap()
}

fn observacoes(record: &controladoria_api::models::CanonicalRecord) -> serde_json::Value {
    serde_json::from_str(&record.observacoes.to_json_string().unwrap()).unwrap()
}

#[test]
fn acme_row_end_to_end() {
    let user = Uuid::new_v4();
    let batch = normalize_at(
        &[row(json!({
            "Data": "01/03/2024",
            "Cliente": "Acme",
            "Valor": "R$ 1.500,00",
            "Status": "Aprovado"
        }))],
        user,
        today(),
    );

    assert_eq!(batch.records.len(), 1);
    let record = &batch.records[0];
    assert_eq!(record.data_contato.to_string(), "2024-03-01");
    assert_eq!(record.cliente_nome, "Acme");
    assert_eq!(record.valor, 1500.0);
    assert_eq!(record.status, Status::Aprovado);
    assert_eq!(record.meio_confirmacao, "WhatsApp");
    assert_eq!(record.user_id, user);
    assert!(batch.diagnostics.is_empty());
}

#[test]
fn every_supported_date_format_yields_a_date() {
    let expected = NaiveDate::from_ymd_opt(2024, 12, 23).unwrap();
    for date in ["23/12/2024", "23-12-2024", "2024-12-23", "2024-12-23T10:30:00Z", "Dec 23 2024"] {
        let batch = normalize_at(
            &[row(json!({ "Data": date, "Cliente": "Acme" }))],
            Uuid::nil(),
            today(),
        );
        assert_eq!(batch.records[0].data_contato, expected, "format {}", date);
        assert_eq!(batch.dates_defaulted, 0, "format {}", date);
    }
}

#[test]
fn reference_parser_values() {
    assert_eq!(
        parse_date(&"25/12/2024".into()),
        NaiveDate::from_ymd_opt(2024, 12, 25)
    );
    assert_eq!(
        parse_date(&"2024-12-25".into()),
        NaiveDate::from_ymd_opt(2024, 12, 25)
    );
    assert_eq!(parse_date(&"not a date".into()), None);

    assert_eq!(parse_value(&"26389.29".into()), 26389.29);
    assert_eq!(parse_value(&"R$ 1.234,56".into()), 1234.56);
    assert_eq!(parse_value(&"garbage".into()), 0.0);

    assert_eq!(parse_status(&"PAGO".into()), Status::Aprovado);
    assert_eq!(parse_status(&"Cancelado pelo cliente".into()), Status::Reprovado);
    assert_eq!(parse_status(&RawValue::Null), Status::Pendente);
    assert_eq!(parse_status(&"xyz".into()), Status::Pendente);
    assert_eq!(parse_status(&"Reprovado".into()), Status::Reprovado);
}

#[test]
fn unmapped_columns_are_recoverable() {
    let batch = normalize_at(
        &[row(json!({
            "Cliente": "Acme",
            "Conf Boleto": "sim",
            "Região": "Sul",
            "Parcelas": 3
        }))],
        Uuid::nil(),
        today(),
    );

    let obs = observacoes(&batch.records[0]);
    assert_eq!(obs["Conf Boleto"], "sim");
    assert_eq!(obs["Região"], "Sul");
    assert_eq!(obs["Parcelas"], 3.0);
}

#[test]
fn row_without_client_or_date_is_dropped() {
    let batch = normalize_at(
        &[
            row(json!({ "Valor": "10", "Status": "Pago" })),
            row(json!({ "Cliente": "Beta" })),
            row(json!({ "Nome": "   " })),
        ],
        Uuid::nil(),
        today(),
    );

    assert_eq!(batch.submitted, 3);
    assert_eq!(batch.records.len(), 1);
    assert_eq!(batch.records[0].cliente_nome, "Beta");
    assert_eq!(batch.dropped, 2);
    assert_eq!(batch.issue_count(RowIssue::MissingClientName), 2);
}

#[test]
fn channel_in_boleto_column_moves_to_meio_confirmacao() {
    let batch = normalize_at(
        &[row(json!({ "Cliente": "Acme", "Boleto": "Enviado por Whatsapp" }))],
        Uuid::nil(),
        today(),
    );

    let record = &batch.records[0];
    assert_eq!(record.meio_confirmacao, "Enviado por Whatsapp");
    assert_eq!(record.boleto_status, DEFAULT_BOLETO_STATUS);

    let obs = observacoes(record);
    assert_eq!(obs["meio_confirmacao"], "Enviado por Whatsapp");
    assert!(obs.get("boleto_status").is_none());
    assert_eq!(batch.issue_count(RowIssue::ChannelMovedFromBoleto), 1);
}

#[test]
fn output_order_follows_input_order() {
    let rows: Vec<RawRow> = (0..20)
        .map(|i| row(json!({ "Cliente": format!("Cliente {}", i), "Valor": i })))
        .collect();
    let batch = normalize_at(&rows, Uuid::nil(), today());

    let names: Vec<_> = batch.records.iter().map(|r| r.cliente_nome.clone()).collect();
    let expected: Vec<_> = (0..20).map(|i| format!("Cliente {}", i)).collect();
    assert_eq!(names, expected);
}

#[test]
fn semicolon_csv_through_normalizer() {
    let csv = "\u{feff}Data;Sacado;Cedente;Valor;Status;Meio de Conf.;Obs\n\
               05/02/2024;Loja Azul;Fornecedor X;\"2.345,10\";Reprovado;Telefone;ligar depois\n\
               ;;;;;;\n\
               06/02/2024;Loja Verde;Fornecedor Y;-15;Pendente;;\n";
    let rows = read_csv(csv.as_bytes()).unwrap();
    let batch = normalize_at(&rows, Uuid::nil(), today());

    assert_eq!(batch.records.len(), 2);

    let first = &batch.records[0];
    assert_eq!(first.cliente_nome, "Loja Azul");
    assert_eq!(first.sacado.as_deref(), Some("Loja Azul"));
    assert_eq!(first.produto.as_deref(), Some("Fornecedor X"));
    assert_eq!(first.cedente.as_deref(), Some("Fornecedor X"));
    assert_eq!(first.valor, 2345.1);
    assert_eq!(first.status, Status::Reprovado);
    assert_eq!(first.meio_confirmacao, "Telefone");
    assert_eq!(observacoes(first)["original_obs"], "ligar depois");

    let second = &batch.records[1];
    assert_eq!(second.valor, 0.0);
    assert_eq!(observacoes(second)["valor_original"], "-15");
    assert_eq!(batch.issue_count(RowIssue::NegativeValueClamped), 1);
}

#[test]
fn odd_date_and_amount_cells_fall_back_to_defaults() {
    let huge = "9".repeat(400);
    let batch = normalize_at(
        &[
            row(json!({ "Cliente": "Acme", "Data": "٢٠٢٤-١٢-٢٥", "Valor": huge })),
            row(json!({ "Cliente": "Beta", "Data": "01/03/2024", "Valor": "10" })),
        ],
        Uuid::nil(),
        today(),
    );

    assert_eq!(batch.records.len(), 2);
    assert_eq!(batch.records[0].data_contato, today());
    assert_eq!(batch.records[0].valor, 0.0);
    assert!(batch.records.iter().all(|r| r.valor.is_finite()));
    assert_eq!(batch.dates_defaulted, 1);
    assert_eq!(batch.issue_count(RowIssue::ValueUnparseable), 1);
}
