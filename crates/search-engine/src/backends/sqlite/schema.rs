//! SQLite schema definitions.

use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::Connection;
use tracing::info;

use crate::error::SearchResult;
use crate::expression::FieldName;

/// Current schema version.
pub const SCHEMA_VERSION: i32 = 1;

/// Initialize the database schema.
pub fn initialize_schema(conn: &Connection) -> SearchResult<()> {
    let current_version = get_schema_version(conn)?;

    if current_version < SCHEMA_VERSION {
        create_schema_v1(conn)?;
        set_schema_version(conn, SCHEMA_VERSION)?;
        info!(version = SCHEMA_VERSION, "Initialized search schema");
    }

    Ok(())
}

/// Get the current schema version.
fn get_schema_version(conn: &Connection) -> SearchResult<i32> {
    conn.execute(
        "CREATE TABLE IF NOT EXISTS schema_version (
            version INTEGER NOT NULL
        )",
        [],
    )?;

    let version: Option<i32> = conn
        .query_row("SELECT version FROM schema_version LIMIT 1", [], |row| {
            row.get(0)
        })
        .ok();

    Ok(version.unwrap_or(0))
}

/// Set the schema version.
fn set_schema_version(conn: &Connection, version: i32) -> SearchResult<()> {
    conn.execute("DELETE FROM schema_version", [])?;
    conn.execute("INSERT INTO schema_version (version) VALUES (?1)", [version])?;
    Ok(())
}

/// Create version 1 of the schema.
fn create_schema_v1(conn: &Connection) -> SearchResult<()> {
    // rowid keeps insertion order for unsorted pages
    conn.execute(
        "CREATE TABLE IF NOT EXISTS resources (
            resource_type TEXT NOT NULL,
            id TEXT NOT NULL,
            version_id TEXT,
            PRIMARY KEY (resource_type, id)
        )",
        [],
    )?;

    // One row per indexed value. Composite values get one row per component
    // value, sharing entry_index.
    conn.execute(
        "CREATE TABLE IF NOT EXISTS search_index (
            resource_type TEXT NOT NULL,
            resource_id TEXT NOT NULL,
            param_name TEXT NOT NULL,
            entry_index INTEGER NOT NULL,
            component_index INTEGER,
            value_string TEXT,
            value_token_system TEXT,
            value_token_code TEXT,
            value_token_text TEXT,
            value_date_start TEXT,
            value_date_end TEXT,
            value_number_low REAL,
            value_number_high REAL,
            value_quantity_low REAL,
            value_quantity_high REAL,
            value_quantity_system TEXT,
            value_quantity_code TEXT,
            value_reference_base TEXT,
            value_reference_type TEXT,
            value_reference_id TEXT,
            value_uri TEXT,
            FOREIGN KEY (resource_type, resource_id)
                REFERENCES resources(resource_type, id) ON DELETE CASCADE
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS compartment_assignment (
            resource_type TEXT NOT NULL,
            resource_id TEXT NOT NULL,
            compartment_type TEXT NOT NULL,
            compartment_id TEXT NOT NULL,
            PRIMARY KEY (resource_type, resource_id, compartment_type, compartment_id),
            FOREIGN KEY (resource_type, resource_id)
                REFERENCES resources(resource_type, id) ON DELETE CASCADE
        )",
        [],
    )?;

    create_indexes(conn)
}

/// Create indexes for efficient queries.
fn create_indexes(conn: &Connection) -> SearchResult<()> {
    let indexes = [
        "CREATE INDEX IF NOT EXISTS idx_search_resource ON search_index(resource_type, resource_id, param_name)",
        "CREATE INDEX IF NOT EXISTS idx_search_string ON search_index(param_name, value_string)",
        "CREATE INDEX IF NOT EXISTS idx_search_token ON search_index(param_name, value_token_system, value_token_code)",
        "CREATE INDEX IF NOT EXISTS idx_search_date ON search_index(param_name, value_date_start, value_date_end)",
        "CREATE INDEX IF NOT EXISTS idx_search_number ON search_index(param_name, value_number_high)",
        "CREATE INDEX IF NOT EXISTS idx_search_quantity ON search_index(param_name, value_quantity_high, value_quantity_code)",
        "CREATE INDEX IF NOT EXISTS idx_search_reference ON search_index(param_name, value_reference_type, value_reference_id)",
        "CREATE INDEX IF NOT EXISTS idx_search_uri ON search_index(param_name, value_uri)",
        "CREATE INDEX IF NOT EXISTS idx_compartment_member ON compartment_assignment(compartment_type, compartment_id)",
    ];

    for sql in indexes {
        conn.execute(sql, [])?;
    }
    Ok(())
}

/// The `search_index` column holding `field`.
///
/// Ranged numbers and quantities compare on their upper bound.
pub fn column_for(field: FieldName) -> &'static str {
    match field {
        FieldName::DateTimeStart => "value_date_start",
        FieldName::DateTimeEnd => "value_date_end",
        FieldName::Number => "value_number_high",
        FieldName::Quantity => "value_quantity_high",
        FieldName::QuantityCode => "value_quantity_code",
        FieldName::QuantitySystem => "value_quantity_system",
        FieldName::ReferenceBaseUri => "value_reference_base",
        FieldName::ReferenceResourceType => "value_reference_type",
        FieldName::ReferenceResourceId => "value_reference_id",
        FieldName::String => "value_string",
        FieldName::TokenCode => "value_token_code",
        FieldName::TokenSystem => "value_token_system",
        FieldName::TokenText => "value_token_text",
        FieldName::Uri => "value_uri",
    }
}

/// Fixed-width UTC text, so stored dates order lexicographically.
pub fn date_text(value: &DateTime<Utc>) -> String {
    value.to_rfc3339_opts(SecondsFormat::Micros, true)
}
