// [libs/infra/db/src/schema.rs]
/*!
 * =================================================================
 * APARATO: IMAGE LEDGER SCHEMA (V3.3 - THREE STRATA)
 * CLASIFICACIÓN: INFRASTRUCTURE LAYER (ESTRATO L3)
 * RESPONSABILIDAD: MIGRACIONES ATÓMICAS Y VERSIONADO MONOTÓNICO
 *
 * VISION HIPER-HOLÍSTICA 2026:
 * 1. ATOMIC UPGRADES: Cada migración es una transacción que sella el
 *    'PRAGMA user_version'; nunca queda un esquema a medias.
 * 2. IDEMPOTENCIA: 'IF NOT EXISTS' en cada DDL; re-aplicar una migración
 *    equivale a aplicarla una vez.
 * 3. FTS GRACE: El índice de texto completo es deseable, no vital; un
 *    motor sin FTS5 degrada a búsqueda LIKE sin abortar la migración.
 * =================================================================
 */

use crate::errors::StoreError;
use libsql::Connection;
use tracing::{info, warn};

/// Versión de esquema que este binario sabe operar.
pub const CURRENT_SCHEMA_VERSION: i64 = 3;

/// ESTRATO V1: Génesis — generaciones, tags, estilos, modelos.
const MIGRATION_V1_TABLES: &[(&str, &str)] = &[
    ("TABLE_GENERATIONS", r#"
        CREATE TABLE IF NOT EXISTS generations (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            uuid TEXT UNIQUE NOT NULL,
            file_path TEXT NOT NULL,
            timestamp DATETIME DEFAULT CURRENT_TIMESTAMP,
            prompt TEXT,
            negative_prompt TEXT,
            seed INTEGER,
            width INTEGER,
            height INTEGER,
            steps INTEGER,
            cfg_scale REAL,
            model_hash TEXT,
            is_favorite BOOLEAN DEFAULT 0,
            parent_uuid TEXT,
            generation_time REAL,
            auto_tagged BOOLEAN DEFAULT 0,
            model_id TEXT,
            rating INTEGER DEFAULT 0,
            params_json TEXT,
            FOREIGN KEY(parent_uuid) REFERENCES generations(uuid)
        );
    "#),
    ("TABLE_TAGS", r#"
        CREATE TABLE IF NOT EXISTS tags (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            name TEXT UNIQUE NOT NULL,
            category TEXT DEFAULT 'general'
        );
    "#),
    ("TABLE_IMAGE_TAGS", r#"
        CREATE TABLE IF NOT EXISTS image_tags (
            generation_id INTEGER,
            tag_id INTEGER,
            source TEXT DEFAULT 'user',
            confidence REAL DEFAULT 1.0,
            PRIMARY KEY(generation_id, tag_id),
            FOREIGN KEY(generation_id) REFERENCES generations(id) ON DELETE CASCADE,
            FOREIGN KEY(tag_id) REFERENCES tags(id) ON DELETE CASCADE
        );
    "#),
    ("TABLE_STYLES", r#"
        CREATE TABLE IF NOT EXISTS styles (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            name TEXT UNIQUE NOT NULL,
            prompt TEXT NOT NULL,
            negative_prompt TEXT,
            preview_path TEXT
        );
    "#),
    ("TABLE_MODELS", r#"
        CREATE TABLE IF NOT EXISTS models (
            id TEXT PRIMARY KEY,
            metadata TEXT NOT NULL,
            created_at DATETIME DEFAULT CURRENT_TIMESTAMP,
            updated_at DATETIME DEFAULT CURRENT_TIMESTAMP
        );
    "#),
    ("TABLE_PROMPT_TEMPLATES", r#"
        CREATE TABLE IF NOT EXISTS prompt_templates (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            name TEXT NOT NULL,
            content TEXT NOT NULL,
            description TEXT
        );
    "#),
];

const MIGRATION_V1_INDEXES: &[&str] = &[
    "CREATE INDEX IF NOT EXISTS idx_generations_timestamp ON generations(timestamp DESC);",
    "CREATE INDEX IF NOT EXISTS idx_tags_name ON tags(name);",
    "CREATE INDEX IF NOT EXISTS idx_generations_model_id ON generations(model_id);",
    "CREATE INDEX IF NOT EXISTS idx_generations_rating ON generations(rating);",
];

/// ESTRATO V2: Activos adjuntos, ledger de jobs, biblioteca y aliases.
const MIGRATION_V2_TABLES: &[(&str, &str)] = &[
    ("TABLE_GENERATION_FILES", r#"
        CREATE TABLE IF NOT EXISTS generation_files (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            generation_id INTEGER NOT NULL,
            file_type TEXT NOT NULL,
            file_path TEXT NOT NULL,
            created_at DATETIME DEFAULT CURRENT_TIMESTAMP,
            FOREIGN KEY(generation_id) REFERENCES generations(id) ON DELETE CASCADE
        );
    "#),
    ("TABLE_JOBS", r#"
        CREATE TABLE IF NOT EXISTS jobs (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            type TEXT NOT NULL,
            payload TEXT,
            status TEXT DEFAULT 'pending',
            error TEXT,
            priority INTEGER DEFAULT 0,
            created_at DATETIME DEFAULT CURRENT_TIMESTAMP,
            updated_at DATETIME DEFAULT CURRENT_TIMESTAMP,
            completed_at DATETIME
        );
    "#),
    ("TABLE_PROMPT_LIBRARY", r#"
        CREATE TABLE IF NOT EXISTS prompt_library (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            label TEXT NOT NULL,
            content TEXT NOT NULL,
            category TEXT DEFAULT 'Style',
            preview_path TEXT,
            usage_count INTEGER DEFAULT 0,
            created_at DATETIME DEFAULT CURRENT_TIMESTAMP
        );
    "#),
    ("TABLE_TAG_ALIASES", r#"
        CREATE TABLE IF NOT EXISTS tag_aliases (
            alias TEXT PRIMARY KEY,
            target_tag_id INTEGER NOT NULL,
            FOREIGN KEY(target_tag_id) REFERENCES tags(id) ON DELETE CASCADE
        );
    "#),
];

/// Índice de texto completo sobre (prompt, negative_prompt) con triggers
/// de sincronización. Deseable pero no vital.
const MIGRATION_V2_FULL_TEXT: &[&str] = &[
    r#"
        CREATE VIRTUAL TABLE IF NOT EXISTS generations_fts USING fts5(
            uuid UNINDEXED,
            prompt,
            negative_prompt,
            content='generations',
            content_rowid='id'
        );
    "#,
    r#"
        CREATE TRIGGER IF NOT EXISTS generations_ai AFTER INSERT ON generations BEGIN
            INSERT INTO generations_fts(rowid, uuid, prompt, negative_prompt)
            VALUES (new.id, new.uuid, new.prompt, new.negative_prompt);
        END;
    "#,
    r#"
        CREATE TRIGGER IF NOT EXISTS generations_ad AFTER DELETE ON generations BEGIN
            INSERT INTO generations_fts(generations_fts, rowid, uuid, prompt, negative_prompt)
            VALUES('delete', old.id, old.uuid, old.prompt, old.negative_prompt);
        END;
    "#,
    r#"
        CREATE TRIGGER IF NOT EXISTS generations_au AFTER UPDATE ON generations BEGIN
            INSERT INTO generations_fts(generations_fts, rowid, uuid, prompt, negative_prompt)
            VALUES('delete', old.id, old.uuid, old.prompt, old.negative_prompt);
            INSERT INTO generations_fts(rowid, uuid, prompt, negative_prompt)
            VALUES (new.id, new.uuid, new.prompt, new.negative_prompt);
        END;
    "#,
    "INSERT INTO generations_fts(generations_fts) VALUES('rebuild');",
];

/// ESTRATO V3: Presets de imagen y de lenguaje.
const MIGRATION_V3_TABLES: &[(&str, &str)] = &[
    ("TABLE_IMAGE_PRESETS", r#"
        CREATE TABLE IF NOT EXISTS image_presets (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            name TEXT UNIQUE NOT NULL,
            unet_path TEXT,
            vae_path TEXT,
            clip_l_path TEXT,
            clip_g_path TEXT,
            t5xxl_path TEXT,
            vram_weights_mb_estimate INTEGER DEFAULT 0,
            vram_weights_mb_measured INTEGER DEFAULT 0,
            default_params TEXT,
            preferred_params TEXT,
            created_at DATETIME DEFAULT CURRENT_TIMESTAMP
        );
    "#),
    ("TABLE_LLM_PRESETS", r#"
        CREATE TABLE IF NOT EXISTS llm_presets (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            name TEXT UNIQUE NOT NULL,
            model_path TEXT NOT NULL,
            mmproj_path TEXT,
            n_ctx INTEGER DEFAULT 2048,
            capabilities TEXT,
            role TEXT DEFAULT 'Assistant',
            created_at DATETIME DEFAULT CURRENT_TIMESTAMP
        );
    "#),
];

/// Versión registrada en el archivo ('PRAGMA user_version').
async fn read_schema_version(connection: &Connection) -> Result<i64, StoreError> {
    let mut version_rows = connection.query("PRAGMA user_version", ()).await?;
    match version_rows.next().await? {
        Some(row) => Ok(row.get::<i64>(0)?),
        None => Ok(0),
    }
}

/**
 * Aplica en orden las migraciones pendientes hasta
 * 'CURRENT_SCHEMA_VERSION'. Cada salto es una transacción atómica.
 *
 * # Errors:
 * `SchemaError` ante cualquier DDL rechazado: el arranque debe abortar.
 */
pub async fn apply_pending_migrations(connection: &Connection) -> Result<(), StoreError> {
    let current_version = read_schema_version(connection).await?;
    info!("📚 [STORE]: Schema version on disk: {}", current_version);

    if current_version < 1 {
        migrate_to_v1(connection).await?;
        info!("📚 [STORE]: Migrated to version 1 (Baseline)");
    }
    if current_version < 2 {
        migrate_to_v2(connection).await?;
        info!("📚 [STORE]: Migrated to version 2 (Assets, Jobs, Prompt Library)");
    }
    if current_version < 3 {
        migrate_to_v3(connection).await?;
        info!("📚 [STORE]: Migrated to version 3 (Presets)");
    }

    Ok(())
}

async fn migrate_to_v1(connection: &Connection) -> Result<(), StoreError> {
    let transaction = connection
        .transaction()
        .await
        .map_err(|_| StoreError::TransactionError)?;

    for (ddl_label, ddl_statement) in MIGRATION_V1_TABLES {
        transaction
            .execute(ddl_statement, ())
            .await
            .map_err(|fault| StoreError::SchemaError(format!("{}: {}", ddl_label, fault)))?;
    }
    for index_statement in MIGRATION_V1_INDEXES {
        transaction
            .execute(index_statement, ())
            .await
            .map_err(|fault| StoreError::SchemaError(fault.to_string()))?;
    }

    transaction.execute("PRAGMA user_version = 1", ()).await?;
    transaction
        .commit()
        .await
        .map_err(|_| StoreError::TransactionError)
}

async fn migrate_to_v2(connection: &Connection) -> Result<(), StoreError> {
    let transaction = connection
        .transaction()
        .await
        .map_err(|_| StoreError::TransactionError)?;

    for (ddl_label, ddl_statement) in MIGRATION_V2_TABLES {
        transaction
            .execute(ddl_statement, ())
            .await
            .map_err(|fault| StoreError::SchemaError(format!("{}: {}", ddl_label, fault)))?;
    }

    // Mutación evolutiva: columna de matching insensible a alias. Puede
    // existir ya en archivos tocados por builds previos.
    if let Err(alter_fault) = transaction
        .execute("ALTER TABLE tags ADD COLUMN normalized_name TEXT;", ())
        .await
    {
        warn!("📚 [STORE]: normalized_name column pre-exists: {}", alter_fault);
    }
    transaction
        .execute(
            "CREATE UNIQUE INDEX IF NOT EXISTS idx_tags_normalized ON tags(normalized_name);",
            (),
        )
        .await
        .map_err(|fault| StoreError::SchemaError(fault.to_string()))?;

    // FTS5: degradación cortés si el motor no lo trae compilado.
    for full_text_statement in MIGRATION_V2_FULL_TEXT {
        if let Err(fts_fault) = transaction.execute(full_text_statement, ()).await {
            warn!("📚 [STORE]: FTS5 support missing, LIKE fallback active: {}", fts_fault);
            break;
        }
    }

    transaction.execute("PRAGMA user_version = 2", ()).await?;
    transaction
        .commit()
        .await
        .map_err(|_| StoreError::TransactionError)
}

async fn migrate_to_v3(connection: &Connection) -> Result<(), StoreError> {
    let transaction = connection
        .transaction()
        .await
        .map_err(|_| StoreError::TransactionError)?;

    for (ddl_label, ddl_statement) in MIGRATION_V3_TABLES {
        transaction
            .execute(ddl_statement, ())
            .await
            .map_err(|fault| StoreError::SchemaError(format!("{}: {}", ddl_label, fault)))?;
    }

    transaction.execute("PRAGMA user_version = 3", ()).await?;
    transaction
        .commit()
        .await
        .map_err(|_| StoreError::TransactionError)
}
