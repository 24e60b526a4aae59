use crate::errors::{AppError, ResultExt};
use crate::models::CanonicalRecord;
use crate::registro::RegistroPatch;
use async_trait::async_trait;
use bigdecimal::BigDecimal;
use sqlx::{PgPool, Postgres, QueryBuilder};
use std::str::FromStr;
use uuid::Uuid;

/// Rows per INSERT statement. 17 binds per row keeps each statement well
/// under PostgreSQL's 65535 bind-parameter ceiling.
const INSERT_CHUNK_ROWS: usize = 1000;

const INSERT_COLUMNS: &str = "INSERT INTO registros (\
    data_contato, cliente_nome, tipo_contato, produto, cedente, sacado, valor, status, \
    gestor, numero_op, nome_contato, telefone, meio_confirmacao, boleto_status, \
    entrega_mercadoria, observacoes, user_id) ";

/// Persistence for registros.
///
/// `owner` arguments scope a statement to one user's registros; `None` is the
/// admin view and matches any owner.
#[async_trait]
pub trait RegistroStore: Send + Sync {
    /// Inserts the whole batch or nothing. Returns the number of rows written.
    async fn insert_batch(&self, records: &[CanonicalRecord]) -> Result<u64, AppError>;

    /// Inserts one registro and returns its id.
    async fn insert_one(&self, record: &CanonicalRecord) -> Result<Uuid, AppError>;

    /// Applies `patch` to registro `id`. Returns the number of rows changed.
    async fn update(
        &self,
        id: Uuid,
        patch: &RegistroPatch,
        owner: Option<Uuid>,
    ) -> Result<u64, AppError>;

    /// Deletes registro `id`. Returns the number of rows removed.
    async fn delete_by_id(&self, id: Uuid, owner: Option<Uuid>) -> Result<u64, AppError>;

    /// Deletes every registro. Returns the number of rows removed.
    async fn delete_all(&self) -> Result<u64, AppError>;

    /// Deletes the registros owned by `user_id`.
    async fn delete_owned_by(&self, user_id: Uuid) -> Result<u64, AppError>;

    /// `(produto, gestor)` for every registro that has both filled in.
    async fn produto_gestor_pairs(&self) -> Result<Vec<(String, String)>, AppError>;
}

/// PostgreSQL-backed registro storage.
pub struct PgRegistroStore {
    pool: PgPool,
}

impl PgRegistroStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

fn to_numeric(valor: f64) -> Result<BigDecimal, AppError> {
    BigDecimal::from_str(&valor.to_string())
        .map_err(|e| AppError::BatchInsert(format!("invalid valor {}: {}", valor, e)))
}

/// NUMERIC `valor` and JSON `observacoes` for each record, computed before
/// any statement runs so a bad value aborts without a partial write.
fn encode_columns(records: &[CanonicalRecord]) -> Result<Vec<(BigDecimal, String)>, AppError> {
    records
        .iter()
        .map(|r| {
            let observacoes = r
                .observacoes
                .to_json_string()
                .map_err(|e| AppError::BatchInsert(format!("invalid observacoes: {}", e)))?;
            Ok((to_numeric(r.valor)?, observacoes))
        })
        .collect()
}

fn push_records<'args>(
    builder: &mut QueryBuilder<'args, Postgres>,
    records: &'args [CanonicalRecord],
    encoded: &'args [(BigDecimal, String)],
) {
    builder.push_values(records.iter().zip(encoded), |mut row, (r, (valor, observacoes))| {
        row.push_bind(r.data_contato)
            .push_bind(&r.cliente_nome)
            .push_bind(&r.tipo_contato)
            .push_bind(&r.produto)
            .push_bind(&r.cedente)
            .push_bind(&r.sacado)
            .push_bind(valor)
            .push_bind(r.status.as_str())
            .push_bind(&r.gestor)
            .push_bind(&r.numero_op)
            .push_bind(&r.nome_contato)
            .push_bind(&r.telefone)
            .push_bind(&r.meio_confirmacao)
            .push_bind(&r.boleto_status)
            .push_bind(&r.entrega_mercadoria)
            .push_bind(observacoes.as_str())
            .push_bind(r.user_id);
    });
}

#[async_trait]
impl RegistroStore for PgRegistroStore {
    async fn insert_batch(&self, records: &[CanonicalRecord]) -> Result<u64, AppError> {
        if records.is_empty() {
            return Ok(0);
        }

        let encoded = encode_columns(records)?;

        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| AppError::BatchInsert(e.to_string()))?;

        let mut inserted = 0u64;
        for (chunk, encoded_chunk) in records
            .chunks(INSERT_CHUNK_ROWS)
            .zip(encoded.chunks(INSERT_CHUNK_ROWS))
        {
            let mut builder: QueryBuilder<Postgres> = QueryBuilder::new(INSERT_COLUMNS);
            push_records(&mut builder, chunk, encoded_chunk);

            let result = builder
                .build()
                .execute(&mut *tx)
                .await
                .map_err(|e| AppError::BatchInsert(e.to_string()))?;
            inserted += result.rows_affected();
        }

        tx.commit()
            .await
            .map_err(|e| AppError::BatchInsert(e.to_string()))?;

        tracing::info!("✓ Inserted {} registro(s)", inserted);
        Ok(inserted)
    }

    async fn insert_one(&self, record: &CanonicalRecord) -> Result<Uuid, AppError> {
        let records = std::slice::from_ref(record);
        let encoded = encode_columns(records)?;

        let mut builder: QueryBuilder<Postgres> = QueryBuilder::new(INSERT_COLUMNS);
        push_records(&mut builder, records, &encoded);
        builder.push(" RETURNING id");

        let (id,) = builder
            .build_query_as::<(Uuid,)>()
            .fetch_one(&self.pool)
            .await
            .map_err(|e| AppError::BatchInsert(e.to_string()))?;

        tracing::info!("✓ Created registro {}", id);
        Ok(id)
    }

    async fn update(
        &self,
        id: Uuid,
        patch: &RegistroPatch,
        owner: Option<Uuid>,
    ) -> Result<u64, AppError> {
        if patch.is_empty() {
            return Ok(0);
        }

        let valor = patch.valor.map(to_numeric).transpose()?;
        let observacoes = patch
            .observacoes
            .as_ref()
            .map(|bag| bag.to_json_string())
            .transpose()
            .map_err(|e| AppError::BadRequest(format!("invalid observacoes: {}", e)))?;

        let mut builder: QueryBuilder<Postgres> = QueryBuilder::new("UPDATE registros SET ");
        {
            let mut set = builder.separated(", ");
            if let Some(date) = patch.data_contato {
                set.push("data_contato = ").push_bind_unseparated(date);
            }
            if let Some(name) = &patch.cliente_nome {
                set.push("cliente_nome = ").push_bind_unseparated(name.as_str());
            }
            if let Some(valor) = &valor {
                set.push("valor = ").push_bind_unseparated(valor);
            }
            if let Some(status) = patch.status {
                set.push("status = ").push_bind_unseparated(status.as_str());
            }
            for (column, value) in &patch.text {
                set.push(format!("{} = ", column))
                    .push_bind_unseparated(value.as_deref());
            }
            if let Some(observacoes) = &observacoes {
                set.push("observacoes = ")
                    .push_bind_unseparated(observacoes.as_str());
            }
        }
        builder.push(" WHERE id = ").push_bind(id);
        if let Some(owner) = owner {
            builder.push(" AND user_id = ").push_bind(owner);
        }

        let result = builder
            .build()
            .execute(&self.pool)
            .await
            .with_context(|| format!("updating registro {}", id))?;

        Ok(result.rows_affected())
    }

    async fn delete_by_id(&self, id: Uuid, owner: Option<Uuid>) -> Result<u64, AppError> {
        let result = sqlx::query(
            "DELETE FROM registros WHERE id = $1 AND ($2::uuid IS NULL OR user_id = $2)",
        )
        .bind(id)
        .bind(owner)
        .execute(&self.pool)
        .await
        .with_context(|| format!("deleting registro {}", id))?;

        Ok(result.rows_affected())
    }

    async fn delete_all(&self) -> Result<u64, AppError> {
        let result = sqlx::query("DELETE FROM registros")
            .execute(&self.pool)
            .await
            .context("deleting all registros")?;

        Ok(result.rows_affected())
    }

    async fn delete_owned_by(&self, user_id: Uuid) -> Result<u64, AppError> {
        let result = sqlx::query("DELETE FROM registros WHERE user_id = $1")
            .bind(user_id)
            .execute(&self.pool)
            .await
            .with_context(|| format!("deleting registros of {}", user_id))?;

        Ok(result.rows_affected())
    }

    async fn produto_gestor_pairs(&self) -> Result<Vec<(String, String)>, AppError> {
        let pairs = sqlx::query_as::<_, (String, String)>(
            r#"
            SELECT produto, gestor
            FROM registros
            WHERE produto IS NOT NULL AND produto <> ''
              AND gestor IS NOT NULL AND gestor <> ''
            ORDER BY id ASC
            "#,
        )
        .fetch_all(&self.pool)
        .await
        .context("loading produto/gestor pairs")?;

        Ok(pairs)
    }
}
