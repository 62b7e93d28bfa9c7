use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::{de::DeserializeOwned, Serialize};
use serde_json::Value;
use sqlx::{sqlite::SqlitePoolOptions, sqlite::SqliteRow, Pool, Row, Sqlite};
use std::path::Path;
use uuid::Uuid;
use whisker_core::{
    Character, CharacterContext, CharacterState, CommitRequest, CostLedger, EmotionalState,
    ErrorLogEntry, ErrorLogSink, ErrorType, Interaction, InteractionStatus, InteractionSummary,
    InteractionType, LedgerError, MemoryRecord, StateStore, StoreError, ValidationResult,
};

/// Default number of memories / interactions loaded into a character context.
const DEFAULT_RECENT_MEMORIES: usize = 50;
const DEFAULT_RECENT_INTERACTIONS: usize = 10;

/// An interaction row together with its audit trail.
#[derive(Debug, Clone, PartialEq)]
pub struct InteractionRecord {
    pub interaction: Interaction,
    pub validation: Option<ValidationResult>,
    pub response: Option<String>,
    pub referenced_memories: Vec<Uuid>,
}

/// One debit against a user's balance.
#[derive(Debug, Clone, PartialEq)]
pub struct TransactionRecord {
    pub id: Uuid,
    pub user_id: Uuid,
    pub interaction_id: Uuid,
    pub amount: u64,
    pub created_at: i64,
}

#[derive(Clone)]
pub struct SqliteStore {
    pool: Pool<Sqlite>,
    recent_memories: usize,
    recent_interactions: usize,
}

impl SqliteStore {
    pub async fn new<P: AsRef<Path>>(db_path: P) -> Result<Self> {
        let path = db_path.as_ref().display().to_string();
        let options = SqlitePoolOptions::new().after_connect(|conn, _meta| {
            Box::pin(async move {
                sqlx::query("PRAGMA foreign_keys = ON").execute(conn).await?;
                Ok(())
            })
        });

        // Every pooled connection to ":memory:" would be its own database.
        let pool = if path == ":memory:" {
            options
                .max_connections(1)
                .connect("sqlite::memory:")
                .await
        } else {
            options.connect(&format!("sqlite://{}?mode=rwc", path)).await
        }
        .context("Failed to connect to SQLite database")?;

        let store = Self {
            pool,
            recent_memories: DEFAULT_RECENT_MEMORIES,
            recent_interactions: DEFAULT_RECENT_INTERACTIONS,
        };
        store.migrate().await?;
        Ok(store)
    }

    /// How much history `load_character_context` pulls in.
    pub fn with_context_limits(
        mut self,
        recent_memories: usize,
        recent_interactions: usize,
    ) -> Self {
        self.recent_memories = recent_memories;
        self.recent_interactions = recent_interactions;
        self
    }

    async fn migrate(&self) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS users (
                id TEXT PRIMARY KEY,
                name TEXT NOT NULL UNIQUE,
                balance INTEGER NOT NULL DEFAULT 0 CHECK (balance >= 0),
                created_at INTEGER NOT NULL
            );
            "#,
        )
        .execute(&self.pool)
        .await
        .context("Failed to create users table")?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS characters (
                id TEXT PRIMARY KEY,
                owner_id TEXT NOT NULL REFERENCES users(id),
                name TEXT NOT NULL,
                hunger INTEGER NOT NULL,
                happiness INTEGER NOT NULL,
                energy INTEGER NOT NULL,
                user_affection INTEGER NOT NULL DEFAULT 0,
                activity TEXT,
                location TEXT,
                emotional_state TEXT NOT NULL,
                version INTEGER NOT NULL DEFAULT 0,
                updated_at INTEGER NOT NULL
            );
            "#,
        )
        .execute(&self.pool)
        .await
        .context("Failed to create characters table")?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS interactions (
                id TEXT PRIMARY KEY,
                character_id TEXT NOT NULL REFERENCES characters(id),
                user_id TEXT NOT NULL,
                declared_type TEXT NOT NULL,
                payload TEXT NOT NULL,
                status TEXT NOT NULL,
                validation TEXT,
                response TEXT,
                referenced_memories TEXT,
                created_at INTEGER NOT NULL,
                updated_at INTEGER NOT NULL
            );
            "#,
        )
        .execute(&self.pool)
        .await
        .context("Failed to create interactions table")?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_interactions_character
             ON interactions(character_id, created_at)",
        )
        .execute(&self.pool)
        .await
        .context("Failed to create interactions index")?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS memories (
                id TEXT PRIMARY KEY,
                character_id TEXT NOT NULL REFERENCES characters(id),
                text TEXT NOT NULL,
                emotions TEXT NOT NULL,
                source_interaction_id TEXT,
                created_at INTEGER NOT NULL
            );
            "#,
        )
        .execute(&self.pool)
        .await
        .context("Failed to create memories table")?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_memories_character
             ON memories(character_id, created_at)",
        )
        .execute(&self.pool)
        .await
        .context("Failed to create memories index")?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS transactions (
                id TEXT PRIMARY KEY,
                user_id TEXT NOT NULL REFERENCES users(id),
                interaction_id TEXT NOT NULL,
                amount INTEGER NOT NULL,
                created_at INTEGER NOT NULL
            );
            "#,
        )
        .execute(&self.pool)
        .await
        .context("Failed to create transactions table")?;

        // Append-only: nothing in this crate updates or deletes error_logs rows.
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS error_logs (
                id TEXT PRIMARY KEY,
                entity_type TEXT NOT NULL,
                entity_id TEXT NOT NULL,
                error_type TEXT NOT NULL,
                error TEXT NOT NULL,
                created_at INTEGER NOT NULL
            );
            "#,
        )
        .execute(&self.pool)
        .await
        .context("Failed to create error_logs table")?;

        Ok(())
    }

    // ------------------------------------------------------------------------
    // Users and balances
    // ------------------------------------------------------------------------

    pub async fn create_user(&self, name: &str, balance: u64) -> Result<Uuid> {
        let id = Uuid::new_v4();
        sqlx::query("INSERT INTO users (id, name, balance, created_at) VALUES (?, ?, ?, ?)")
            .bind(id.to_string())
            .bind(name)
            .bind(to_sql_int(balance)?)
            .bind(chrono::Utc::now().timestamp())
            .execute(&self.pool)
            .await
            .context("Failed to create user")?;
        Ok(id)
    }

    pub async fn find_user_by_name(&self, name: &str) -> Result<Option<Uuid>> {
        let row = sqlx::query("SELECT id FROM users WHERE name = ?")
            .bind(name)
            .fetch_optional(&self.pool)
            .await?;
        row.map(|r| parse_uuid(&r.get::<String, _>("id"))).transpose()
    }

    pub async fn balance(&self, user_id: Uuid) -> Result<Option<u64>> {
        let row = sqlx::query("SELECT balance FROM users WHERE id = ?")
            .bind(user_id.to_string())
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(|r| r.get::<i64, _>("balance").max(0) as u64))
    }

    pub async fn credit(&self, user_id: Uuid, amount: u64) -> Result<()> {
        let result = sqlx::query("UPDATE users SET balance = balance + ? WHERE id = ?")
            .bind(to_sql_int(amount)?)
            .bind(user_id.to_string())
            .execute(&self.pool)
            .await
            .context("Failed to credit user")?;
        if result.rows_affected() == 0 {
            anyhow::bail!("unknown user {}", user_id);
        }
        Ok(())
    }

    pub async fn list_transactions(&self, user_id: Uuid) -> Result<Vec<TransactionRecord>> {
        let rows = sqlx::query(
            "SELECT id, user_id, interaction_id, amount, created_at FROM transactions
             WHERE user_id = ? ORDER BY created_at ASC, rowid ASC",
        )
        .bind(user_id.to_string())
        .fetch_all(&self.pool)
        .await?;

        rows.iter()
            .map(|row| {
                Ok(TransactionRecord {
                    id: parse_uuid(&row.get::<String, _>("id"))?,
                    user_id: parse_uuid(&row.get::<String, _>("user_id"))?,
                    interaction_id: parse_uuid(&row.get::<String, _>("interaction_id"))?,
                    amount: row.get::<i64, _>("amount").max(0) as u64,
                    created_at: row.get("created_at"),
                })
            })
            .collect()
    }

    // ------------------------------------------------------------------------
    // Characters
    // ------------------------------------------------------------------------

    pub async fn create_character(&self, owner_id: Uuid, name: &str) -> Result<Character> {
        let character = Character {
            id: Uuid::new_v4(),
            owner_id,
            name: name.to_string(),
        };
        let state = CharacterState::default();
        sqlx::query(
            r#"
            INSERT INTO characters
                (id, owner_id, name, hunger, happiness, energy, user_affection,
                 activity, location, emotional_state, version, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, 0, ?)
            "#,
        )
        .bind(character.id.to_string())
        .bind(owner_id.to_string())
        .bind(name)
        .bind(state.hunger as i64)
        .bind(state.happiness as i64)
        .bind(state.energy as i64)
        .bind(state.user_affection)
        .bind(state.activity.as_ref().map(enum_text).transpose()?)
        .bind(state.location.as_ref().map(enum_text).transpose()?)
        .bind(serde_json::to_string(&state.emotional_state)?)
        .bind(chrono::Utc::now().timestamp())
        .execute(&self.pool)
        .await
        .context("Failed to create character")?;
        Ok(character)
    }

    pub async fn find_character_by_name(
        &self,
        owner_id: Uuid,
        name: &str,
    ) -> Result<Option<Character>> {
        let row =
            sqlx::query("SELECT id, owner_id, name FROM characters WHERE owner_id = ? AND name = ?")
                .bind(owner_id.to_string())
                .bind(name)
                .fetch_optional(&self.pool)
                .await?;
        row.map(|r| row_to_character(&r)).transpose()
    }

    /// Current state and version of a character.
    pub async fn load_state(&self, character_id: Uuid) -> Result<Option<(CharacterState, i64)>> {
        let row = sqlx::query("SELECT * FROM characters WHERE id = ?")
            .bind(character_id.to_string())
            .fetch_optional(&self.pool)
            .await?;
        row.map(|r| Ok::<_, anyhow::Error>((row_to_state(&r)?, r.get::<i64, _>("version"))))
            .transpose()
    }

    /// Overwrite a character's state outside the pipeline (seeding, admin tools).
    /// Bumps the version like any other write.
    pub async fn overwrite_state(&self, character_id: Uuid, state: &CharacterState) -> Result<()> {
        let result = sqlx::query(
            r#"
            UPDATE characters SET hunger = ?, happiness = ?, energy = ?, user_affection = ?,
                activity = ?, location = ?, emotional_state = ?,
                version = version + 1, updated_at = ?
            WHERE id = ?
            "#,
        )
        .bind(state.hunger as i64)
        .bind(state.happiness as i64)
        .bind(state.energy as i64)
        .bind(state.user_affection)
        .bind(state.activity.as_ref().map(enum_text).transpose()?)
        .bind(state.location.as_ref().map(enum_text).transpose()?)
        .bind(serde_json::to_string(&state.emotional_state)?)
        .bind(chrono::Utc::now().timestamp())
        .bind(character_id.to_string())
        .execute(&self.pool)
        .await
        .context("Failed to overwrite character state")?;
        if result.rows_affected() == 0 {
            anyhow::bail!("unknown character {}", character_id);
        }
        Ok(())
    }

    // ------------------------------------------------------------------------
    // Memories
    // ------------------------------------------------------------------------

    /// Store a memory directly (seeding); the pipeline writes memories via commit.
    pub async fn add_memory(
        &self,
        character_id: Uuid,
        text: &str,
        emotions: &[String],
    ) -> Result<Uuid> {
        let id = Uuid::new_v4();
        sqlx::query(
            "INSERT INTO memories
             (id, character_id, text, emotions, source_interaction_id, created_at)
             VALUES (?, ?, ?, ?, NULL, ?)",
        )
        .bind(id.to_string())
        .bind(character_id.to_string())
        .bind(text)
        .bind(serde_json::to_string(emotions)?)
        .bind(chrono::Utc::now().timestamp())
        .execute(&self.pool)
        .await
        .context("Failed to store memory")?;
        Ok(id)
    }

    /// Most recent first.
    pub async fn list_memories(
        &self,
        character_id: Uuid,
        limit: usize,
    ) -> Result<Vec<MemoryRecord>> {
        let rows = sqlx::query(
            "SELECT * FROM memories WHERE character_id = ?
             ORDER BY created_at DESC, rowid DESC LIMIT ?",
        )
        .bind(character_id.to_string())
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(row_to_memory).collect()
    }

    // ------------------------------------------------------------------------
    // Interactions and error logs
    // ------------------------------------------------------------------------

    pub async fn get_interaction(&self, id: Uuid) -> Result<Option<InteractionRecord>> {
        let row = sqlx::query("SELECT * FROM interactions WHERE id = ?")
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await?;
        let Some(row) = row else {
            return Ok(None);
        };

        let validation = row
            .get::<Option<String>, _>("validation")
            .map(|v| serde_json::from_str(&v))
            .transpose()
            .context("Corrupt validation audit")?;
        let referenced_memories = row
            .get::<Option<String>, _>("referenced_memories")
            .map(|v| serde_json::from_str(&v))
            .transpose()
            .context("Corrupt referenced memories")?
            .unwrap_or_default();

        Ok(Some(InteractionRecord {
            interaction: row_to_interaction(&row)?,
            validation,
            response: row.get("response"),
            referenced_memories,
        }))
    }

    /// Most recent first.
    pub async fn list_error_logs(&self, limit: usize) -> Result<Vec<ErrorLogEntry>> {
        let rows = sqlx::query(
            "SELECT * FROM error_logs ORDER BY created_at DESC, rowid DESC LIMIT ?",
        )
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await?;

        rows.iter()
            .map(|row| {
                let error_type: String = row.get("error_type");
                Ok(ErrorLogEntry {
                    id: parse_uuid(&row.get::<String, _>("id"))?,
                    entity_type: row.get("entity_type"),
                    entity_id: parse_uuid(&row.get::<String, _>("entity_id"))?,
                    error_type: ErrorType::parse(&error_type)
                        .with_context(|| format!("Unknown error type '{}'", error_type))?,
                    error: serde_json::from_str(&row.get::<String, _>("error"))?,
                    created_at: row.get("created_at"),
                })
            })
            .collect()
    }

    async fn load_context_inner(&self, character_id: Uuid) -> Result<Option<CharacterContext>> {
        let Some(row) = sqlx::query("SELECT * FROM characters WHERE id = ?")
            .bind(character_id.to_string())
            .fetch_optional(&self.pool)
            .await?
        else {
            return Ok(None);
        };

        let character = row_to_character(&row)?;
        let state = row_to_state(&row)?;
        let version: i64 = row.get("version");

        let recent_memories = self.list_memories(character_id, self.recent_memories).await?;

        let rows = sqlx::query(
            "SELECT * FROM interactions
             WHERE character_id = ? AND status IN ('COMPLETED', 'VALIDATION_FAILED', 'FAILED')
             ORDER BY created_at DESC, rowid DESC LIMIT ?",
        )
        .bind(character_id.to_string())
        .bind(self.recent_interactions as i64)
        .fetch_all(&self.pool)
        .await?;
        let recent_interactions = rows
            .iter()
            .map(|row| {
                let interaction = row_to_interaction(row)?;
                Ok(InteractionSummary {
                    id: interaction.id,
                    declared_type: interaction.declared_type,
                    payload: interaction.payload,
                    status: interaction.status,
                    response: row.get("response"),
                    created_at: interaction.created_at,
                })
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(Some(CharacterContext {
            character,
            state,
            version,
            recent_memories,
            recent_interactions,
        }))
    }

    async fn update_status_inner(
        &self,
        interaction_id: Uuid,
        status: InteractionStatus,
        validation: Option<&ValidationResult>,
    ) -> Result<u64> {
        let predecessor = match status {
            InteractionStatus::Processing => InteractionStatus::Pending,
            InteractionStatus::ValidationFailed
            | InteractionStatus::Completed
            | InteractionStatus::Failed => InteractionStatus::Processing,
            InteractionStatus::Pending => anyhow::bail!("interactions never return to PENDING"),
        };
        let validation = validation.map(serde_json::to_string).transpose()?;
        let result = sqlx::query(
            "UPDATE interactions
             SET status = ?, validation = COALESCE(?, validation), updated_at = ?
             WHERE id = ? AND status = ?",
        )
        .bind(status.as_str())
        .bind(validation)
        .bind(chrono::Utc::now().timestamp())
        .bind(interaction_id.to_string())
        .bind(predecessor.as_str())
        .execute(&self.pool)
        .await
        .context("Failed to update interaction status")?;
        Ok(result.rows_affected())
    }

    async fn interaction_exists(&self, interaction_id: Uuid) -> Result<bool> {
        let row = sqlx::query("SELECT 1 FROM interactions WHERE id = ?")
            .bind(interaction_id.to_string())
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.is_some())
    }

    async fn commit_inner(
        &self,
        commit: &CommitRequest,
    ) -> Result<std::result::Result<(), StoreError>> {
        let now = chrono::Utc::now().timestamp();
        let state = &commit.next_state;
        let mut tx = self.pool.begin().await?;

        let updated = sqlx::query(
            r#"
            UPDATE characters SET hunger = ?, happiness = ?, energy = ?, user_affection = ?,
                activity = ?, location = ?, emotional_state = ?,
                version = version + 1, updated_at = ?
            WHERE id = ? AND version = ?
            "#,
        )
        .bind(state.hunger as i64)
        .bind(state.happiness as i64)
        .bind(state.energy as i64)
        .bind(state.user_affection)
        .bind(state.activity.as_ref().map(enum_text).transpose()?)
        .bind(state.location.as_ref().map(enum_text).transpose()?)
        .bind(serde_json::to_string(&state.emotional_state)?)
        .bind(now)
        .bind(commit.character_id.to_string())
        .bind(commit.expected_version)
        .execute(&mut *tx)
        .await
        .context("Failed to update character state")?;

        if updated.rows_affected() == 0 {
            tx.rollback().await?;
            let exists = self.load_state(commit.character_id).await?.is_some();
            return Ok(Err(if exists {
                StoreError::Conflict {
                    character_id: commit.character_id,
                    expected_version: commit.expected_version,
                }
            } else {
                StoreError::NotFound {
                    entity: "character",
                    id: commit.character_id,
                }
            }));
        }

        sqlx::query(
            "INSERT INTO memories
             (id, character_id, text, emotions, source_interaction_id, created_at)
             VALUES (?, ?, ?, ?, ?, ?)",
        )
        .bind(commit.new_memory.id.to_string())
        .bind(commit.character_id.to_string())
        .bind(&commit.new_memory.text)
        .bind(serde_json::to_string(&commit.new_memory.emotions)?)
        .bind(commit.interaction_id.to_string())
        .bind(now)
        .execute(&mut *tx)
        .await
        .context("Failed to store memory")?;

        let finished = sqlx::query(
            r#"
            UPDATE interactions SET status = ?, validation = ?, response = ?,
                referenced_memories = ?, updated_at = ?
            WHERE id = ? AND status = ?
            "#,
        )
        .bind(InteractionStatus::Completed.as_str())
        .bind(serde_json::to_string(&commit.validation)?)
        .bind(&commit.response_text)
        .bind(serde_json::to_string(&commit.referenced_memories)?)
        .bind(now)
        .bind(commit.interaction_id.to_string())
        .bind(InteractionStatus::Processing.as_str())
        .execute(&mut *tx)
        .await
        .context("Failed to complete interaction")?;

        if finished.rows_affected() == 0 {
            tx.rollback().await?;
            return Ok(Err(StoreError::Backend(format!(
                "interaction {} is not PROCESSING",
                commit.interaction_id
            ))));
        }

        tx.commit().await.context("Failed to commit interaction result")?;
        Ok(Ok(()))
    }

    async fn debit_inner(
        &self,
        user_id: Uuid,
        interaction_id: Uuid,
        amount: u64,
    ) -> Result<std::result::Result<(), LedgerError>> {
        let amount_sql = to_sql_int(amount)?;
        let mut tx = self.pool.begin().await?;

        let updated = sqlx::query(
            "UPDATE users SET balance = balance - ? WHERE id = ? AND balance >= ?",
        )
        .bind(amount_sql)
        .bind(user_id.to_string())
        .bind(amount_sql)
        .execute(&mut *tx)
        .await
        .context("Failed to debit user")?;

        if updated.rows_affected() == 0 {
            tx.rollback().await?;
            return Ok(Err(match self.balance(user_id).await? {
                Some(balance) => LedgerError::InsufficientFunds {
                    user_id,
                    balance,
                    required: amount,
                },
                None => LedgerError::UnknownUser(user_id),
            }));
        }

        sqlx::query(
            "INSERT INTO transactions (id, user_id, interaction_id, amount, created_at)
             VALUES (?, ?, ?, ?, ?)",
        )
        .bind(Uuid::new_v4().to_string())
        .bind(user_id.to_string())
        .bind(interaction_id.to_string())
        .bind(amount_sql)
        .bind(chrono::Utc::now().timestamp())
        .execute(&mut *tx)
        .await
        .context("Failed to record transaction")?;

        tx.commit().await.context("Failed to commit debit")?;
        Ok(Ok(()))
    }
}

#[async_trait]
impl StateStore for SqliteStore {
    async fn load_character_context(
        &self,
        character_id: Uuid,
    ) -> Result<CharacterContext, StoreError> {
        self.load_context_inner(character_id)
            .await
            .map_err(storage_err)?
            .ok_or(StoreError::NotFound {
                entity: "character",
                id: character_id,
            })
    }

    async fn create_interaction(&self, interaction: &Interaction) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO interactions
                (id, character_id, user_id, declared_type, payload, status, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(interaction.id.to_string())
        .bind(interaction.character_id.to_string())
        .bind(interaction.user_id.to_string())
        .bind(interaction.declared_type.as_str())
        .bind(&interaction.payload)
        .bind(interaction.status.as_str())
        .bind(interaction.created_at)
        .bind(interaction.created_at)
        .execute(&self.pool)
        .await
        .map_err(|e| StoreError::Backend(format!("Failed to create interaction: {}", e)))?;
        Ok(())
    }

    async fn update_interaction_status(
        &self,
        interaction_id: Uuid,
        status: InteractionStatus,
        validation: Option<&ValidationResult>,
    ) -> Result<(), StoreError> {
        let affected = self
            .update_status_inner(interaction_id, status, validation)
            .await
            .map_err(storage_err)?;
        if affected == 0 {
            if !self.interaction_exists(interaction_id).await.map_err(storage_err)? {
                return Err(StoreError::NotFound {
                    entity: "interaction",
                    id: interaction_id,
                });
            }
            return Err(StoreError::Backend(format!(
                "interaction {} cannot move to {}",
                interaction_id, status
            )));
        }
        Ok(())
    }

    async fn commit_interaction_result(&self, commit: &CommitRequest) -> Result<(), StoreError> {
        self.commit_inner(commit).await.map_err(storage_err)?
    }
}

#[async_trait]
impl ErrorLogSink for SqliteStore {
    async fn append(
        &self,
        entity_type: &str,
        entity_id: Uuid,
        error_type: ErrorType,
        error: Value,
    ) -> Result<()> {
        sqlx::query(
            "INSERT INTO error_logs (id, entity_type, entity_id, error_type, error, created_at)
             VALUES (?, ?, ?, ?, ?, ?)",
        )
        .bind(Uuid::new_v4().to_string())
        .bind(entity_type)
        .bind(entity_id.to_string())
        .bind(error_type.as_str())
        .bind(error.to_string())
        .bind(chrono::Utc::now().timestamp())
        .execute(&self.pool)
        .await
        .context("Failed to append error log")?;
        Ok(())
    }
}

#[async_trait]
impl CostLedger for SqliteStore {
    async fn debit(
        &self,
        user_id: Uuid,
        interaction_id: Uuid,
        amount: u64,
    ) -> Result<(), LedgerError> {
        self.debit_inner(user_id, interaction_id, amount)
            .await
            .map_err(|e| LedgerError::Backend(format!("{:#}", e)))?
    }
}

// ============================================================================
// Row helpers
// ============================================================================

fn storage_err(e: anyhow::Error) -> StoreError {
    StoreError::Backend(format!("{:#}", e))
}

fn to_sql_int(v: u64) -> Result<i64> {
    i64::try_from(v).context("amount exceeds SQLite integer range")
}

fn parse_uuid(s: &str) -> Result<Uuid> {
    Uuid::parse_str(s).with_context(|| format!("Invalid UUID in database: {}", s))
}

/// Unit enum variant as its bare serde name (e.g. `Activity::Sleeping` -> "sleeping").
fn enum_text<T: Serialize>(value: &T) -> Result<String> {
    match serde_json::to_value(value)? {
        Value::String(s) => Ok(s),
        other => anyhow::bail!("expected a unit variant, got {}", other),
    }
}

fn parse_enum<T: DeserializeOwned>(s: &str) -> Result<T> {
    serde_json::from_value(Value::String(s.to_string()))
        .with_context(|| format!("Unknown variant in database: {}", s))
}

fn stat(row: &SqliteRow, column: &str) -> u8 {
    row.get::<i64, _>(column).clamp(0, 100) as u8
}

fn row_to_character(row: &SqliteRow) -> Result<Character> {
    Ok(Character {
        id: parse_uuid(&row.get::<String, _>("id"))?,
        owner_id: parse_uuid(&row.get::<String, _>("owner_id"))?,
        name: row.get("name"),
    })
}

fn row_to_state(row: &SqliteRow) -> Result<CharacterState> {
    let emotional_state: EmotionalState =
        serde_json::from_str(&row.get::<String, _>("emotional_state"))
            .context("Corrupt emotional state")?;
    Ok(CharacterState {
        hunger: stat(row, "hunger"),
        happiness: stat(row, "happiness"),
        energy: stat(row, "energy"),
        user_affection: row.get("user_affection"),
        activity: row
            .get::<Option<String>, _>("activity")
            .map(|s| parse_enum(&s))
            .transpose()?,
        location: row
            .get::<Option<String>, _>("location")
            .map(|s| parse_enum(&s))
            .transpose()?,
        emotional_state,
    })
}

fn row_to_memory(row: &SqliteRow) -> Result<MemoryRecord> {
    Ok(MemoryRecord {
        id: parse_uuid(&row.get::<String, _>("id"))?,
        character_id: parse_uuid(&row.get::<String, _>("character_id"))?,
        text: row.get("text"),
        emotions: serde_json::from_str(&row.get::<String, _>("emotions")).unwrap_or_default(),
        source_interaction_id: row
            .get::<Option<String>, _>("source_interaction_id")
            .map(|s| parse_uuid(&s))
            .transpose()?,
        created_at: row.get("created_at"),
    })
}

fn row_to_interaction(row: &SqliteRow) -> Result<Interaction> {
    let declared: String = row.get("declared_type");
    let status: String = row.get("status");
    Ok(Interaction {
        id: parse_uuid(&row.get::<String, _>("id"))?,
        character_id: parse_uuid(&row.get::<String, _>("character_id"))?,
        user_id: parse_uuid(&row.get::<String, _>("user_id"))?,
        declared_type: InteractionType::parse(&declared)
            .with_context(|| format!("Unknown interaction type '{}'", declared))?,
        payload: row.get("payload"),
        status: InteractionStatus::parse(&status)
            .with_context(|| format!("Unknown interaction status '{}'", status))?,
        created_at: row.get("created_at"),
    })
}
