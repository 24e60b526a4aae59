//! Header alias table for spreadsheet imports.
//!
//! Every canonical field lists the header spellings seen in real sheets, in
//! priority order. Lookup tries exact header matches first and then compares
//! normalized keys (see [`normalize_key`]), so `"Nº OP"`, `"N OP"` and `"n.op"`
//! all land on the same field.

use crate::models::{RawRow, RawValue};
use once_cell::sync::Lazy;
use std::collections::HashSet;

/// Canonical fields read from an import row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Field {
    DataContato,
    ClienteNome,
    Sacado,
    TipoContato,
    Produto,
    Cedente,
    Valor,
    Status,
    Gestor,
    NumeroOp,
    NomeContato,
    Telefone,
    BoletoStatus,
    EntregaMercadoria,
    MeioConfirmacao,
    OriginalObs,
}

impl Field {
    pub const ALL: [Field; 16] = [
        Field::DataContato,
        Field::ClienteNome,
        Field::Sacado,
        Field::TipoContato,
        Field::Produto,
        Field::Cedente,
        Field::Valor,
        Field::Status,
        Field::Gestor,
        Field::NumeroOp,
        Field::NomeContato,
        Field::Telefone,
        Field::BoletoStatus,
        Field::EntregaMercadoria,
        Field::MeioConfirmacao,
        Field::OriginalObs,
    ];

    /// Accepted headers, highest priority first.
    pub fn aliases(&self) -> &'static [&'static str] {
        match self {
            Field::DataContato => &["Data", "DATA", "data", "Data Contato", "Data do Contato"],
            Field::ClienteNome => &["Sacado", "SACADO", "Cliente", "Nome", "Nome do Cliente"],
            Field::Sacado => &["Sacado", "SACADO", "Cliente"],
            Field::TipoContato => &["Tipo", "TIPO", "tipo"],
            Field::Produto => &["Produto", "PRODUTO", "Cedente", "CEDENTE"],
            Field::Cedente => &["Cedente", "CEDENTE"],
            Field::Valor => &["Valor", "VALOR", "valor"],
            Field::Status => &["Status", "STATUS", "status"],
            Field::Gestor => &["Gestor", "GESTOR"],
            Field::NumeroOp => &["Nº OP", "N OP", "OP", "Numero OP", "Number OP"],
            Field::NomeContato => &[
                "Nome do Contato",
                "NOME DO CONTATO",
                "Contato",
                "Nome Contato",
            ],
            Field::Telefone => &["Telefone", "TELEFONE", "Tel"],
            Field::BoletoStatus => &["Boleto", "BOLETO"],
            Field::EntregaMercadoria => &[
                "Entrega de Mercadoria",
                "ENTREGA DE MERCADORIA",
                "Entrega",
                "Entrega de Mercadorias",
                "ENTREGA DE MERCADORIAS",
                "Entrega Mercadoria",
                "Entrega Mercadorias",
                "Status Entrega",
            ],
            Field::MeioConfirmacao => &[
                "Meio de Conf.",
                "MEIO DE CONF.",
                "MEIO DE CONFIRMAÇÃO",
                "Meio de Confirmação",
                "Meio Confirmacao",
                "Meio de Conf",
                "Meio",
                "Canal",
                "Confirmacao",
                "Confirmação",
            ],
            Field::OriginalObs => &[
                "Observações",
                "Observacoes",
                "OBSERVACOES",
                "Obs",
                "OBS",
                "Detalhes",
                "Motivo",
                "Comentarios",
                "Comentários",
                "Notas",
                "Lastro",
                "OBSERVAÇÃO",
                "Observação",
                "OBSERVACAO",
                "Observacao",
            ],
        }
    }

    /// Key used for this field inside the `observacoes` side bag.
    pub fn bag_key(&self) -> &'static str {
        match self {
            Field::DataContato => "data_contato",
            Field::ClienteNome => "cliente_nome",
            Field::Sacado => "sacado",
            Field::TipoContato => "tipo_contato",
            Field::Produto => "produto",
            Field::Cedente => "cedente",
            Field::Valor => "valor",
            Field::Status => "status",
            Field::Gestor => "gestor",
            Field::NumeroOp => "numero_op",
            Field::NomeContato => "nome_contato",
            Field::Telefone => "telefone",
            Field::BoletoStatus => "boleto_status",
            Field::EntregaMercadoria => "entrega_mercadoria",
            Field::MeioConfirmacao => "meio_confirmacao",
            Field::OriginalObs => "original_obs",
        }
    }
}

/// Lowercases and drops everything outside `a-z0-9`.
///
/// Accented letters are dropped rather than folded: `"Confirmação"` reduces to
/// `"confirmao"`, not `"confirmacao"`. Both spellings are listed as aliases.
pub fn normalize_key(key: &str) -> String {
    key.to_lowercase()
        .chars()
        .filter(|c| c.is_ascii_lowercase() || c.is_ascii_digit())
        .collect()
}

static KNOWN_KEYS: Lazy<HashSet<String>> = Lazy::new(|| {
    Field::ALL
        .iter()
        .flat_map(|field| field.aliases().iter())
        .map(|alias| normalize_key(alias))
        .collect()
});

/// True when `header` is claimed by some field's alias list.
pub fn is_known_header(header: &str) -> bool {
    KNOWN_KEYS.contains(&normalize_key(header))
}

/// Finds the cell for the first alias present in `row`.
///
/// Exact header matches win over normalized ones; within each pass, earlier
/// aliases win. A present-but-null cell still counts as a match.
pub fn resolve<'a>(row: &'a RawRow, aliases: &[&str]) -> Option<&'a RawValue> {
    resolve_entry(row, aliases).map(|(_, value)| value)
}

/// Like [`resolve`], but also returns the header that matched.
pub fn resolve_entry<'a>(row: &'a RawRow, aliases: &[&str]) -> Option<(&'a str, &'a RawValue)> {
    if let Some(entry) = aliases.iter().find_map(|alias| row.get_key_value(*alias)) {
        return Some((entry.0.as_str(), entry.1));
    }

    aliases.iter().find_map(|alias| {
        let target = normalize_key(alias);
        row.iter()
            .find(|(header, _)| normalize_key(header) == target)
            .map(|(header, value)| (header.as_str(), value))
    })
}

/// Trimmed text for `field`, `None` when absent or blank.
pub fn resolve_text(row: &RawRow, field: Field) -> Option<String> {
    resolve(row, field.aliases()).and_then(RawValue::as_text)
}
