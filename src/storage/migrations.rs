/// Database migration management
///
/// This module handles creating and updating the SQLite schema for the
/// primary record table and the persisted index tables. Note that the
/// schema version here is distinct from INDEX_VERSION: bumping the index
/// version rebuilds the derived collections in place, while a schema
/// migration changes the tables themselves.

use rusqlite::Connection;

use crate::storage::StorageError;

/// Current database schema version
///
/// Increment this when you add new migrations
const CURRENT_VERSION: i32 = 1;

/// Initialize the database schema
///
/// This creates all required tables and indexes if they don't exist.
/// It also sets up the version tracking for future migrations.
pub fn initialize_database(conn: &Connection) -> Result<(), StorageError> {
    // Create version tracking table first
    conn.execute(
        "CREATE TABLE IF NOT EXISTS schema_version (
            version INTEGER PRIMARY KEY
        )",
        [],
    )?;

    // Check current version
    let current_version = get_current_version(conn)?;

    // Run migrations if needed
    if current_version < CURRENT_VERSION {
        run_migrations(conn, current_version)?;
        set_version(conn, CURRENT_VERSION)?;
    }

    Ok(())
}

/// Get the current database schema version
fn get_current_version(conn: &Connection) -> Result<i32, StorageError> {
    let version = conn
        .query_row("SELECT version FROM schema_version LIMIT 1", [], |row| {
            row.get::<_, i32>(0)
        })
        .unwrap_or(0); // Default to version 0 if no version record exists

    Ok(version)
}

/// Set the database schema version
fn set_version(conn: &Connection, version: i32) -> Result<(), StorageError> {
    conn.execute("DELETE FROM schema_version", [])?;
    conn.execute("INSERT INTO schema_version (version) VALUES (?1)", [version])?;
    Ok(())
}

/// Run database migrations from the current version to the latest
fn run_migrations(conn: &Connection, from_version: i32) -> Result<(), StorageError> {
    if from_version < 1 {
        migration_v1(conn)?;
    }

    // Future migrations would go here:
    // if from_version < 2 {
    //     migration_v2(conn)?;
    // }

    Ok(())
}

/// Migration to version 1: Create initial tables
///
/// This creates the primary completions table plus the four tables backing
/// the persisted index layout (one metadata row, three collections).
fn migration_v1(conn: &Connection) -> Result<(), StorageError> {
    // Primary record store
    conn.execute(
        "CREATE TABLE IF NOT EXISTS completions (
            id TEXT PRIMARY KEY,
            habit_id TEXT NOT NULL,
            completed_date TEXT NOT NULL,
            completed_at TEXT NOT NULL,
            count INTEGER NOT NULL DEFAULT 0,
            is_skipped INTEGER NOT NULL DEFAULT 0,
            is_postponed INTEGER NOT NULL DEFAULT 0,
            payload TEXT
        )",
        [],
    )?;

    // Single-row index metadata record
    conn.execute(
        "CREATE TABLE IF NOT EXISTS index_metadata (
            id INTEGER PRIMARY KEY CHECK (id = 1),
            version INTEGER NOT NULL,
            indexed_from INTEGER,
            oldest_data INTEGER,
            last_indexed INTEGER,
            backfill_complete INTEGER NOT NULL DEFAULT 0,
            backfill_paused INTEGER NOT NULL DEFAULT 0,
            rebuild_needed INTEGER NOT NULL DEFAULT 0
        )",
        [],
    )?;

    // date key -> JSON array of completion ids
    conn.execute(
        "CREATE TABLE IF NOT EXISTS index_dates (
            date_key INTEGER PRIMARY KEY,
            completion_ids TEXT NOT NULL
        )",
        [],
    )?;

    // habit id -> JSON array of completion ids
    conn.execute(
        "CREATE TABLE IF NOT EXISTS index_habits (
            habit_id TEXT PRIMARY KEY,
            completion_ids TEXT NOT NULL
        )",
        [],
    )?;

    // date key -> fixed-shape per-day counters
    conn.execute(
        "CREATE TABLE IF NOT EXISTS index_daily_summaries (
            date_key INTEGER PRIMARY KEY,
            entries INTEGER NOT NULL DEFAULT 0,
            successful_entries INTEGER NOT NULL DEFAULT 0,
            skipped_entries INTEGER NOT NULL DEFAULT 0,
            postponed_entries INTEGER NOT NULL DEFAULT 0,
            total_count INTEGER NOT NULL DEFAULT 0
        )",
        [],
    )?;

    create_indexes_v1(conn)?;

    tracing::info!("Applied migration v1: Created initial database schema");
    Ok(())
}

/// Create database indexes for version 1
fn create_indexes_v1(conn: &Connection) -> Result<(), StorageError> {
    // Range scans by date back both the backfill chunks and the router's
    // scan fallback
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_completions_date
         ON completions (completed_date)",
        [],
    )?;

    // Per-habit lookups restricted to a date range
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_completions_habit_date
         ON completions (habit_id, completed_date)",
        [],
    )?;

    tracing::info!("Created database indexes for v1");
    Ok(())
}
