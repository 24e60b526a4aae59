//! Single-registro create and edit payloads.
//!
//! The registro form sends canonical column names rather than sheet headers,
//! so nothing here goes through the alias table. Cells are still read with the
//! import parsers, but a value that cannot be read is rejected instead of
//! being replaced by a default.

use crate::aliases::Field;
use crate::errors::AppError;
use crate::models::{CanonicalRecord, Observacoes, RawValue, Status};
use crate::normalizer::{DEFAULT_BOLETO_STATUS, DEFAULT_ENTREGA_MERCADORIA, DEFAULT_MEIO_CONFIRMACAO};
use crate::parsers::{parse_amount, parse_date, recognize_status};
use chrono::NaiveDate;
use serde::Deserialize;
use uuid::Uuid;

/// Body of `POST /api/registros` and `PATCH /api/registros/:id`.
///
/// Absent or null fields are left alone on edit. Unknown fields (the form also
/// sends `tipo`) are ignored.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RegistroInput {
    pub data_contato: Option<RawValue>,
    pub cliente_nome: Option<String>,
    pub tipo_contato: Option<String>,
    pub produto: Option<String>,
    pub cedente: Option<String>,
    pub sacado: Option<String>,
    pub valor: Option<RawValue>,
    pub status: Option<RawValue>,
    pub gestor: Option<String>,
    pub numero_op: Option<String>,
    pub nome_contato: Option<String>,
    pub telefone: Option<String>,
    pub meio_confirmacao: Option<String>,
    pub boleto_status: Option<String>,
    pub entrega_mercadoria: Option<String>,
    /// Either a JSON object (the import side bag) or the form's free text.
    pub observacoes: Option<serde_json::Value>,
}

/// Validated changes for one registro. `None` leaves the column untouched.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RegistroPatch {
    pub data_contato: Option<NaiveDate>,
    pub cliente_nome: Option<String>,
    pub valor: Option<f64>,
    pub status: Option<Status>,
    /// Text columns in update order. An inner `None` stores NULL.
    pub text: Vec<(&'static str, Option<String>)>,
    pub observacoes: Option<Observacoes>,
}

impl RegistroPatch {
    pub fn is_empty(&self) -> bool {
        self.data_contato.is_none()
            && self.cliente_nome.is_none()
            && self.valor.is_none()
            && self.status.is_none()
            && self.text.is_empty()
            && self.observacoes.is_none()
    }
}

impl RegistroInput {
    /// Builds a new registro owned by `user_id`.
    ///
    /// The client name falls back to `sacado`, as on the form. A blank date is
    /// `today`; blank system columns get the import defaults.
    pub fn into_record(self, user_id: Uuid, today: NaiveDate) -> Result<CanonicalRecord, AppError> {
        let cliente_nome = blank_to_none(self.cliente_nome.clone())
            .or_else(|| blank_to_none(self.sacado.clone()))
            .ok_or_else(|| AppError::BadRequest("cliente_nome is required".to_string()))?;

        Ok(CanonicalRecord {
            data_contato: read_date(self.data_contato.as_ref())?.unwrap_or(today),
            cliente_nome,
            tipo_contato: blank_to_none(self.tipo_contato),
            produto: blank_to_none(self.produto),
            cedente: blank_to_none(self.cedente),
            sacado: blank_to_none(self.sacado),
            valor: read_valor(self.valor.as_ref())?.unwrap_or(0.0),
            status: read_status(self.status.as_ref())?.unwrap_or_default(),
            gestor: blank_to_none(self.gestor),
            numero_op: blank_to_none(self.numero_op),
            nome_contato: blank_to_none(self.nome_contato),
            telefone: blank_to_none(self.telefone),
            meio_confirmacao: or_default(self.meio_confirmacao, DEFAULT_MEIO_CONFIRMACAO),
            boleto_status: or_default(self.boleto_status, DEFAULT_BOLETO_STATUS),
            entrega_mercadoria: or_default(self.entrega_mercadoria, DEFAULT_ENTREGA_MERCADORIA),
            observacoes: read_observacoes(self.observacoes)?.unwrap_or_default(),
            user_id,
        })
    }

    /// Validates an edit. A present but blank `cliente_nome` is rejected.
    pub fn into_patch(self) -> Result<RegistroPatch, AppError> {
        let cliente_nome = match self.cliente_nome {
            Some(name) => Some(
                blank_to_none(Some(name))
                    .ok_or_else(|| AppError::BadRequest("cliente_nome cannot be empty".to_string()))?,
            ),
            None => None,
        };

        let mut text = Vec::new();
        let nullable = [
            (Field::TipoContato, self.tipo_contato),
            (Field::Produto, self.produto),
            (Field::Cedente, self.cedente),
            (Field::Sacado, self.sacado),
            (Field::Gestor, self.gestor),
            (Field::NumeroOp, self.numero_op),
            (Field::NomeContato, self.nome_contato),
            (Field::Telefone, self.telefone),
        ];
        for (field, value) in nullable {
            if let Some(value) = value {
                text.push((field.bag_key(), blank_to_none(Some(value))));
            }
        }

        let defaulted = [
            (Field::MeioConfirmacao, self.meio_confirmacao, DEFAULT_MEIO_CONFIRMACAO),
            (Field::BoletoStatus, self.boleto_status, DEFAULT_BOLETO_STATUS),
            (Field::EntregaMercadoria, self.entrega_mercadoria, DEFAULT_ENTREGA_MERCADORIA),
        ];
        for (field, value, default) in defaulted {
            if let Some(value) = value {
                text.push((field.bag_key(), Some(or_default(Some(value), default))));
            }
        }

        Ok(RegistroPatch {
            data_contato: read_date(self.data_contato.as_ref())?,
            cliente_nome,
            valor: read_valor(self.valor.as_ref())?,
            status: read_status(self.status.as_ref())?,
            text,
            observacoes: read_observacoes(self.observacoes)?,
        })
    }
}

fn blank_to_none(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn or_default(value: Option<String>, default: &str) -> String {
    blank_to_none(value).unwrap_or_else(|| default.to_string())
}

fn read_date(cell: Option<&RawValue>) -> Result<Option<NaiveDate>, AppError> {
    match cell.filter(|c| !c.is_blank()) {
        None => Ok(None),
        Some(cell) => parse_date(cell)
            .map(Some)
            .ok_or_else(|| AppError::BadRequest("Invalid data_contato".to_string())),
    }
}

fn read_valor(cell: Option<&RawValue>) -> Result<Option<f64>, AppError> {
    match cell.filter(|c| !c.is_blank()) {
        None => Ok(None),
        Some(cell) => match parse_amount(cell) {
            Some(valor) if valor >= 0.0 => Ok(Some(valor)),
            Some(_) => Err(AppError::BadRequest("valor cannot be negative".to_string())),
            None => Err(AppError::BadRequest("Invalid valor".to_string())),
        },
    }
}

fn read_status(cell: Option<&RawValue>) -> Result<Option<Status>, AppError> {
    match cell.filter(|c| !c.is_blank()) {
        None => Ok(None),
        Some(cell) => recognize_status(cell)
            .map(Some)
            .ok_or_else(|| AppError::BadRequest("Invalid status".to_string())),
    }
}

/// Objects become the side bag as-is; free text lands under `original_obs`.
fn read_observacoes(value: Option<serde_json::Value>) -> Result<Option<Observacoes>, AppError> {
    let mut bag = Observacoes::new();
    match value {
        None => return Ok(None),
        Some(serde_json::Value::Object(map)) => {
            for (key, cell) in map {
                bag.insert(key, RawValue::from(cell));
            }
        }
        Some(serde_json::Value::String(text)) => {
            let text = text.trim();
            if !text.is_empty() {
                bag.insert(Field::OriginalObs.bag_key(), RawValue::from(text));
            }
        }
        Some(_) => {
            return Err(AppError::BadRequest(
                "observacoes must be an object or text".to_string(),
            ))
        }
    }
    Ok(Some(bag))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn input(value: serde_json::Value) -> RegistroInput {
        serde_json::from_value(value).unwrap()
    }

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 2, 10).unwrap()
    }

    #[test]
    fn test_form_payload_becomes_record() {
        let user = Uuid::new_v4();
        let record = input(json!({
            "data_contato": "2024-03-01",
            "sacado": "Loja Azul",
            "cliente_nome": "Loja Azul",
            "tipo": "NFE",
            "produto": "NFE",
            "valor": 1234.56,
            "status": "Aprovado",
            "gestor": "",
            "meio_confirmacao": "Telefone",
            "boleto_status": "",
            "observacoes": "ligar depois"
        }))
        .into_record(user, today())
        .unwrap();

        assert_eq!(record.data_contato, NaiveDate::from_ymd_opt(2024, 3, 1).unwrap());
        assert_eq!(record.cliente_nome, "Loja Azul");
        assert_eq!(record.produto.as_deref(), Some("NFE"));
        assert_eq!(record.valor, 1234.56);
        assert_eq!(record.status, Status::Aprovado);
        assert_eq!(record.gestor, None);
        assert_eq!(record.meio_confirmacao, "Telefone");
        assert_eq!(record.boleto_status, DEFAULT_BOLETO_STATUS);
        assert_eq!(record.entrega_mercadoria, DEFAULT_ENTREGA_MERCADORIA);
        assert_eq!(
            record.observacoes.get("original_obs"),
            Some(&RawValue::from("ligar depois"))
        );
        assert_eq!(record.user_id, user);
    }

    #[test]
    fn test_client_name_falls_back_to_sacado() {
        let record = input(json!({"sacado": "Beta"}))
            .into_record(Uuid::nil(), today())
            .unwrap();
        assert_eq!(record.cliente_nome, "Beta");
        assert_eq!(record.data_contato, today());
        assert_eq!(record.status, Status::Pendente);
    }

    #[test]
    fn test_create_rejects_bad_values() {
        for body in [
            json!({}),
            json!({"cliente_nome": "  "}),
            json!({"cliente_nome": "Acme", "valor": "abc"}),
            json!({"cliente_nome": "Acme", "valor": -5}),
            json!({"cliente_nome": "Acme", "data_contato": "31/02/2024"}),
            json!({"cliente_nome": "Acme", "status": "talvez"}),
            json!({"cliente_nome": "Acme", "observacoes": 3}),
        ] {
            let err = input(body.clone()).into_record(Uuid::nil(), today()).unwrap_err();
            assert!(matches!(err, AppError::BadRequest(_)), "{}", body);
        }
    }

    #[test]
    fn test_patch_only_carries_present_fields() {
        let patch = input(json!({
            "valor": "R$ 1.500,00",
            "gestor": " ",
            "boleto_status": "",
            "status": "pago"
        }))
        .into_patch()
        .unwrap();

        assert_eq!(patch.valor, Some(1500.0));
        assert_eq!(patch.status, Some(Status::Aprovado));
        assert_eq!(patch.data_contato, None);
        assert_eq!(patch.cliente_nome, None);
        assert_eq!(
            patch.text,
            vec![
                ("gestor", None),
                ("boleto_status", Some(DEFAULT_BOLETO_STATUS.to_string())),
            ]
        );
        assert!(patch.observacoes.is_none());
    }

    #[test]
    fn test_empty_patch() {
        assert!(input(json!({})).into_patch().unwrap().is_empty());
        assert!(input(json!({"cliente_nome": ""})).into_patch().is_err());
    }
}
