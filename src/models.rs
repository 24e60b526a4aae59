use chrono::NaiveDate;
use serde::{Deserialize, Serialize, Serializer};
use std::collections::BTreeMap;
use std::fmt;
use uuid::Uuid;

/// A single spreadsheet cell as it arrives from the upload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RawValue {
    Null,
    Bool(bool),
    Number(f64),
    Text(String),
}

/// One uploaded row: header → cell. Headers vary per source file.
pub type RawRow = BTreeMap<String, RawValue>;

impl RawValue {
    /// Trimmed textual form of the cell, `None` for null and blank cells.
    ///
    /// Integral numbers print without a fractional part so phone numbers and
    /// operation codes typed as numbers in a sheet survive as written.
    pub fn as_text(&self) -> Option<String> {
        let text = match self {
            RawValue::Null => return None,
            RawValue::Bool(b) => b.to_string(),
            RawValue::Number(n) => format_number(*n),
            RawValue::Text(s) => s.trim().to_string(),
        };
        if text.is_empty() {
            None
        } else {
            Some(text)
        }
    }

    pub fn is_blank(&self) -> bool {
        self.as_text().is_none()
    }

    /// Same cell with surrounding whitespace removed from text values.
    pub fn trimmed(&self) -> RawValue {
        match self {
            RawValue::Text(s) => RawValue::Text(s.trim().to_string()),
            other => other.clone(),
        }
    }
}

fn format_number(n: f64) -> String {
    if n.is_finite() && n.fract() == 0.0 && n.abs() < 1e15 {
        format!("{}", n as i64)
    } else {
        n.to_string()
    }
}

impl From<&str> for RawValue {
    fn from(value: &str) -> Self {
        RawValue::Text(value.to_string())
    }
}

impl From<String> for RawValue {
    fn from(value: String) -> Self {
        RawValue::Text(value)
    }
}

impl From<f64> for RawValue {
    fn from(value: f64) -> Self {
        RawValue::Number(value)
    }
}

impl From<i64> for RawValue {
    fn from(value: i64) -> Self {
        RawValue::Number(value as f64)
    }
}

impl From<bool> for RawValue {
    fn from(value: bool) -> Self {
        RawValue::Bool(value)
    }
}

impl From<serde_json::Value> for RawValue {
    /// Nested arrays/objects are kept as their JSON text.
    fn from(value: serde_json::Value) -> Self {
        match value {
            serde_json::Value::Null => RawValue::Null,
            serde_json::Value::Bool(b) => RawValue::Bool(b),
            serde_json::Value::Number(n) => match n.as_f64() {
                Some(f) => RawValue::Number(f),
                None => RawValue::Text(n.to_string()),
            },
            serde_json::Value::String(s) => RawValue::Text(s),
            nested => RawValue::Text(nested.to_string()),
        }
    }
}

/// Converts a JSON object into a row. Anything else is not a row.
pub fn row_from_json(value: serde_json::Value) -> Option<RawRow> {
    match value {
        serde_json::Value::Object(map) => Some(
            map.into_iter()
                .map(|(key, cell)| (key, RawValue::from(cell)))
                .collect(),
        ),
        _ => None,
    }
}

/// Registro approval status. Only these three values are accepted by the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum Status {
    #[default]
    Pendente,
    Aprovado,
    Reprovado,
}

impl Status {
    pub fn as_str(&self) -> &'static str {
        match self {
            Status::Pendente => "Pendente",
            Status::Aprovado => "Aprovado",
            Status::Reprovado => "Reprovado",
        }
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Side bag stored in `observacoes`: unmapped columns plus the explicit extras.
///
/// Kept typed until it reaches the store, where it is written as a JSON string.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Observacoes(BTreeMap<String, RawValue>);

impl Observacoes {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, key: impl Into<String>, value: RawValue) {
        self.0.insert(key.into(), value);
    }

    pub fn remove(&mut self, key: &str) -> Option<RawValue> {
        self.0.remove(key)
    }

    pub fn get(&self, key: &str) -> Option<&RawValue> {
        self.0.get(key)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &RawValue)> {
        self.0.iter()
    }

    /// Encodes the bag as the JSON object text stored in `observacoes`.
    pub fn to_json_string(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(&self.0)
    }
}

impl Serialize for Observacoes {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let encoded = self
            .to_json_string()
            .map_err(serde::ser::Error::custom)?;
        serializer.serialize_str(&encoded)
    }
}

/// A registro ready for bulk insertion.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CanonicalRecord {
    pub data_contato: NaiveDate,
    pub cliente_nome: String,
    pub tipo_contato: Option<String>,
    pub produto: Option<String>,
    pub cedente: Option<String>,
    pub sacado: Option<String>,
    pub valor: f64,
    pub status: Status,
    pub gestor: Option<String>,
    pub numero_op: Option<String>,
    pub nome_contato: Option<String>,
    pub telefone: Option<String>,
    pub meio_confirmacao: String,
    pub boleto_status: String,
    pub entrega_mercadoria: String,
    pub observacoes: Observacoes,
    pub user_id: Uuid,
}

/// Recoverable oddities found while normalizing a row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RowIssue {
    /// No usable date; today's date was substituted.
    DateDefaulted,
    /// Non-empty amount that could not be read; 0 was used.
    ValueUnparseable,
    /// Negative amount replaced by 0; the raw cell is in `valor_original`.
    NegativeValueClamped,
    /// Non-empty status text with no known token; `Pendente` was used.
    StatusUnrecognized,
    /// Confirmation channel was found in the boleto column and moved.
    ChannelMovedFromBoleto,
    /// Phone is not a valid Brazilian number. Kept as written.
    PhoneUnrecognized,
    /// No client name; the row was dropped.
    MissingClientName,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RowDiagnostics {
    /// Zero-based position of the row in the submitted batch.
    pub row: usize,
    pub issues: Vec<RowIssue>,
}

/// Output of one normalizer run.
#[derive(Debug, Clone, Default, Serialize)]
pub struct NormalizedBatch {
    pub submitted: usize,
    pub records: Vec<CanonicalRecord>,
    pub dropped: usize,
    /// Kept rows whose `data_contato` is today's date by substitution.
    pub dates_defaulted: usize,
    pub diagnostics: Vec<RowDiagnostics>,
}

impl NormalizedBatch {
    pub fn issue_count(&self, issue: RowIssue) -> usize {
        self.diagnostics
            .iter()
            .filter(|d| d.issues.contains(&issue))
            .count()
    }
}

/// Aggregate result reported back to the uploader.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ImportSummary {
    pub submitted: usize,
    #[serde(rename = "count")]
    pub inserted: u64,
    pub dropped: usize,
    pub dates_defaulted: usize,
    pub gestores_predicted: usize,
}

#[derive(Debug, Serialize)]
pub struct ImportResponse {
    pub success: bool,
    #[serde(flatten)]
    pub summary: ImportSummary,
}

#[derive(Debug, Serialize)]
pub struct RegistroResponse {
    pub success: bool,
    pub id: Uuid,
}

#[derive(Debug, Serialize)]
pub struct DeleteResponse {
    pub success: bool,
    pub count: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct GestorQueryParams {
    pub produto: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct GestorSuggestionResponse {
    pub produto: String,
    pub gestor: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_integral_numbers_print_without_fraction() {
        assert_eq!(
            RawValue::from(11987654321.0).as_text(),
            Some("11987654321".to_string())
        );
        assert_eq!(RawValue::from(12.5).as_text(), Some("12.5".to_string()));
    }

    #[test]
    fn test_observacoes_encode_as_json_text() {
        let mut bag = Observacoes::new();
        bag.insert("Região", RawValue::from("Sul"));
        bag.insert("Parcelas", RawValue::from(3.0));

        let text = bag.to_json_string().unwrap();
        let parsed: serde_json::Value = serde_json::from_str(&text).unwrap();
        assert_eq!(parsed, json!({"Região": "Sul", "Parcelas": 3.0}));
        assert_eq!(Observacoes::new().to_json_string().unwrap(), "{}");
    }

    #[test]
    fn test_blank_cells() {
        assert!(RawValue::Null.is_blank());
        assert!(RawValue::from("   ").is_blank());
        assert!(!RawValue::from(" x ").is_blank());
    }

    #[test]
    fn test_row_from_json_keeps_nested_values_as_text() {
        let row = row_from_json(json!({"Cliente": "Acme", "Extra": {"a": 1}})).unwrap();
        assert_eq!(row.get("Cliente"), Some(&RawValue::from("Acme")));
        assert_eq!(row.get("Extra"), Some(&RawValue::from(r#"{"a":1}"#)));
    }

    #[test]
    fn test_row_from_json_rejects_non_objects() {
        assert!(row_from_json(json!(["Cliente"])).is_none());
        assert!(row_from_json(json!("Cliente")).is_none());
    }

    #[test]
    fn test_observacoes_serializes_as_json_string() {
        let mut obs = Observacoes::new();
        obs.insert("Lastro", RawValue::from("NF 123"));
        let encoded = serde_json::to_value(&obs).unwrap();
        assert_eq!(encoded, json!(r#"{"Lastro":"NF 123"}"#));
    }
}
