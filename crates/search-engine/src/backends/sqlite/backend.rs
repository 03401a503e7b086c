//! SQLite search backend.

use std::fmt::Debug;
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use r2d2::{Pool, PooledConnection};
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::{Connection, Statement, params, params_from_iter};
use rust_decimal::Decimal;
use rust_decimal::prelude::ToPrimitive;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace, warn};

use crate::core::{BackendQuery, ReferenceProjection, SearchBackend, SearchHit, SearchPage};
use crate::error::{BackendError, SearchError, SearchResult};
use crate::plan_cache::QueryPlanCachePolicy;
use crate::types::{
    ContinuationCursor, IndexedResource, ReferenceTarget, ResourceLocation, SearchValue,
};

use super::planner::{SqlPlan, SqlSearchPlanner};
use super::schema;

const BACKEND_NAME: &str = "sqlite";

/// SQLite backend for indexed search.
pub struct SqliteSearchBackend {
    pool: Pool<SqliteConnectionManager>,
    config: SqliteBackendConfig,
    planner: SqlSearchPlanner,
    is_memory: bool,
}

impl Debug for SqliteSearchBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqliteSearchBackend")
            .field("config", &self.config)
            .field("is_memory", &self.is_memory)
            .field(
                "tracked_fingerprints",
                &self.planner.policy().selector().tracked_count(),
            )
            .finish_non_exhaustive()
    }
}

/// Configuration for the SQLite backend.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SqliteBackendConfig {
    /// Maximum number of connections in the pool. In-memory databases always use one.
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,

    /// Connection timeout in milliseconds.
    #[serde(default = "default_connection_timeout_ms")]
    pub connection_timeout_ms: u64,

    /// SQLite busy timeout in milliseconds.
    #[serde(default = "default_busy_timeout_ms")]
    pub busy_timeout_ms: u32,

    /// Enable WAL mode for file databases.
    #[serde(default = "default_true")]
    pub enable_wal: bool,

    /// Hits per page when a query does not set one.
    #[serde(default = "default_page_size")]
    pub default_page_size: usize,
}

fn default_max_connections() -> u32 {
    10
}

fn default_connection_timeout_ms() -> u64 {
    30000
}

fn default_busy_timeout_ms() -> u32 {
    5000
}

fn default_true() -> bool {
    true
}

fn default_page_size() -> usize {
    100
}

impl Default for SqliteBackendConfig {
    fn default() -> Self {
        Self {
            max_connections: default_max_connections(),
            connection_timeout_ms: default_connection_timeout_ms(),
            busy_timeout_ms: default_busy_timeout_ms(),
            enable_wal: true,
            default_page_size: default_page_size(),
        }
    }
}

impl SqliteBackendConfig {
    /// Validates the configuration.
    pub fn validate(&self) -> Result<(), Vec<String>> {
        let mut errors = Vec::new();
        if self.max_connections == 0 {
            errors.push("sqlite.max_connections must be at least 1".to_string());
        }
        if self.default_page_size == 0 {
            errors.push("sqlite.default_page_size must be at least 1".to_string());
        }
        if errors.is_empty() { Ok(()) } else { Err(errors) }
    }
}

/// Column values of one `search_index` row.
#[derive(Debug, Default)]
struct IndexRow {
    component_index: Option<i64>,
    string: Option<String>,
    token_system: Option<String>,
    token_code: Option<String>,
    token_text: Option<String>,
    date_start: Option<String>,
    date_end: Option<String>,
    number_low: Option<f64>,
    number_high: Option<f64>,
    quantity_low: Option<f64>,
    quantity_high: Option<f64>,
    quantity_system: Option<String>,
    quantity_code: Option<String>,
    reference_base: Option<String>,
    reference_type: Option<String>,
    reference_id: Option<String>,
    uri: Option<String>,
}

fn to_real(value: Option<Decimal>) -> Option<f64> {
    value.and_then(|d| d.to_f64())
}

/// Flattens a value into rows. Composites give one row per component value.
fn index_rows(value: &SearchValue) -> Vec<IndexRow> {
    match value {
        SearchValue::Composite(composite) => composite
            .components
            .iter()
            .enumerate()
            .flat_map(|(i, values)| {
                values.iter().filter_map(move |v| {
                    let mut row = scalar_row(v)?;
                    row.component_index = Some(i as i64);
                    Some(row)
                })
            })
            .collect(),
        other => scalar_row(other).into_iter().collect(),
    }
}

fn scalar_row(value: &SearchValue) -> Option<IndexRow> {
    let mut row = IndexRow::default();
    match value {
        SearchValue::Composite(_) => {
            trace!("Skipping nested composite value");
            return None;
        }
        SearchValue::String(s) => row.string = Some(s.text.clone()),
        SearchValue::Token(t) => {
            row.token_system = t.system.clone();
            row.token_code = t.code.clone();
            row.token_text = t.text.clone();
        }
        SearchValue::Uri(u) => row.uri = Some(u.value.clone()),
        SearchValue::DateTime(d) => {
            row.date_start = Some(schema::date_text(&d.start));
            row.date_end = Some(schema::date_text(&d.end));
        }
        SearchValue::Number(n) => {
            row.number_low = to_real(n.low);
            row.number_high = to_real(n.high);
        }
        SearchValue::Quantity(q) => {
            row.quantity_low = to_real(q.low);
            row.quantity_high = to_real(q.high);
            row.quantity_system = q.system.clone();
            row.quantity_code = q.code.clone();
        }
        SearchValue::Reference(r) => {
            row.reference_base = r.base_uri.clone();
            row.reference_type = r.resource_type.clone();
            row.reference_id = Some(r.resource_id.clone());
        }
    }
    Some(row)
}

impl SqliteSearchBackend {
    /// Creates a new in-memory SQLite backend with an initialized schema.
    pub fn in_memory() -> SearchResult<Self> {
        Self::in_memory_with_policy(Arc::new(QueryPlanCachePolicy::default()))
    }

    /// Creates an in-memory backend sharing `policy`.
    pub fn in_memory_with_policy(policy: Arc<QueryPlanCachePolicy>) -> SearchResult<Self> {
        let config = SqliteBackendConfig {
            max_connections: 1,
            enable_wal: false,
            ..SqliteBackendConfig::default()
        };
        // Each in-memory connection is its own database, so the pool keeps
        // exactly one alive for the backend's lifetime.
        let pool = Pool::builder()
            .max_size(1)
            .min_idle(Some(1))
            .idle_timeout(None)
            .max_lifetime(None)
            .connection_timeout(Duration::from_millis(config.connection_timeout_ms))
            .build(manager(SqliteConnectionManager::memory(), &config))
            .map_err(connection_failed)?;
        Self::from_pool(pool, config, policy, true)
    }

    /// Opens or creates a file-based SQLite database.
    pub fn open<P: AsRef<Path>>(path: P) -> SearchResult<Self> {
        Self::with_config(path, SqliteBackendConfig::default(), Arc::new(QueryPlanCachePolicy::default()))
    }

    /// Opens a file-based database with custom configuration.
    pub fn with_config<P: AsRef<Path>>(
        path: P,
        config: SqliteBackendConfig,
        policy: Arc<QueryPlanCachePolicy>,
    ) -> SearchResult<Self> {
        config
            .validate()
            .map_err(|errors| SearchError::invalid_configuration(errors.join("; ")))?;

        let pool = Pool::builder()
            .max_size(config.max_connections)
            .connection_timeout(Duration::from_millis(config.connection_timeout_ms))
            .build(manager(SqliteConnectionManager::file(path.as_ref()), &config))
            .map_err(connection_failed)?;
        Self::from_pool(pool, config, policy, false)
    }

    fn from_pool(
        pool: Pool<SqliteConnectionManager>,
        config: SqliteBackendConfig,
        policy: Arc<QueryPlanCachePolicy>,
        is_memory: bool,
    ) -> SearchResult<Self> {
        let backend = Self {
            pool,
            config,
            planner: SqlSearchPlanner::new(policy),
            is_memory,
        };
        backend.init_schema()?;
        Ok(backend)
    }

    /// Initialize the database schema.
    pub fn init_schema(&self) -> SearchResult<()> {
        let conn = self.get_connection()?;
        schema::initialize_schema(&conn)
    }

    /// The backend configuration.
    pub fn config(&self) -> &SqliteBackendConfig {
        &self.config
    }

    /// The planner used for searches.
    pub fn planner(&self) -> &SqlSearchPlanner {
        &self.planner
    }

    /// Returns true if the database lives in memory.
    pub fn is_memory(&self) -> bool {
        self.is_memory
    }

    /// Get a connection from the pool.
    fn get_connection(&self) -> SearchResult<PooledConnection<SqliteConnectionManager>> {
        Ok(self.pool.get()?)
    }

    /// Writes a resource with its index rows and compartment memberships,
    /// replacing whatever was stored for it before.
    pub fn index_resource(&self, resource: &IndexedResource) -> SearchResult<()> {
        let mut conn = self.get_connection()?;
        let tx = conn.transaction()?;
        write_resource(&tx, resource)?;
        tx.commit()?;
        Ok(())
    }

    /// Writes several resources in one transaction.
    pub fn index_all<'a>(&self, resources: impl IntoIterator<Item = &'a IndexedResource>) -> SearchResult<usize> {
        let mut conn = self.get_connection()?;
        let tx = conn.transaction()?;
        let mut written = 0;
        for resource in resources {
            write_resource(&tx, resource)?;
            written += 1;
        }
        tx.commit()?;
        debug!(written, "Indexed resources");
        Ok(written)
    }

    /// Removes a resource. Returns true if it was present.
    pub fn remove(&self, resource_type: &str, resource_id: &str) -> SearchResult<bool> {
        let mut conn = self.get_connection()?;
        let tx = conn.transaction()?;
        clear_index(&tx, resource_type, resource_id)?;
        let removed = tx.execute(
            "DELETE FROM resources WHERE resource_type = ?1 AND id = ?2",
            params![resource_type, resource_id],
        )?;
        tx.commit()?;
        Ok(removed > 0)
    }

    /// Number of stored resources.
    pub fn count(&self) -> SearchResult<usize> {
        let conn = self.get_connection()?;
        let count: i64 = conn.query_row("SELECT COUNT(*) FROM resources", [], |row| row.get(0))?;
        Ok(count as usize)
    }

    fn execute_plan(&self, conn: &Connection, plan: &SqlPlan) -> SearchResult<Vec<ResourceLocation>> {
        let started = Instant::now();
        let rows = if plan.use_cached_plan {
            let mut stmt = conn.prepare_cached(&plan.sql)?;
            read_locations(&mut stmt, plan)?
        } else {
            let mut stmt = conn.prepare(&plan.sql)?;
            read_locations(&mut stmt, plan)?
        };
        let elapsed_ms = started.elapsed().as_secs_f64() * 1000.0;

        if let Err(e) = self
            .planner
            .policy()
            .report(plan.fingerprint, plan.use_cached_plan, elapsed_ms)
        {
            warn!(fingerprint = %plan.fingerprint, error = %e, "Failed to report plan latency");
        }

        trace!(
            fingerprint = %plan.fingerprint,
            cached = plan.use_cached_plan,
            elapsed_ms,
            rows = rows.len(),
            "Executed search statement"
        );
        Ok(rows)
    }
}

fn manager(manager: SqliteConnectionManager, config: &SqliteBackendConfig) -> SqliteConnectionManager {
    let busy_timeout = Duration::from_millis(config.busy_timeout_ms as u64);
    let enable_wal = config.enable_wal;
    manager.with_init(move |conn| {
        conn.busy_timeout(busy_timeout)?;
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        if enable_wal {
            conn.execute_batch("PRAGMA journal_mode = WAL;")?;
        }
        Ok(())
    })
}

fn connection_failed(e: r2d2::Error) -> SearchError {
    SearchError::Backend(BackendError::ConnectionFailed {
        backend_name: BACKEND_NAME.to_string(),
        message: e.to_string(),
    })
}

fn read_locations(stmt: &mut Statement<'_>, plan: &SqlPlan) -> SearchResult<Vec<ResourceLocation>> {
    let rows = stmt.query_map(params_from_iter(plan.params.iter()), |row| {
        Ok(ResourceLocation {
            resource_type: row.get(0)?,
            resource_id: row.get(1)?,
            version_id: row.get(2)?,
        })
    })?;
    Ok(rows.collect::<Result<Vec<_>, _>>()?)
}

fn clear_index(conn: &Connection, resource_type: &str, resource_id: &str) -> SearchResult<()> {
    conn.execute(
        "DELETE FROM search_index WHERE resource_type = ?1 AND resource_id = ?2",
        params![resource_type, resource_id],
    )?;
    conn.execute(
        "DELETE FROM compartment_assignment WHERE resource_type = ?1 AND resource_id = ?2",
        params![resource_type, resource_id],
    )?;
    Ok(())
}

fn write_resource(conn: &Connection, resource: &IndexedResource) -> SearchResult<()> {
    let location = &resource.location;
    conn.execute(
        "INSERT INTO resources (resource_type, id, version_id) VALUES (?1, ?2, ?3)
         ON CONFLICT(resource_type, id) DO UPDATE SET version_id = excluded.version_id",
        params![location.resource_type, location.resource_id, location.version_id],
    )?;
    clear_index(conn, &location.resource_type, &location.resource_id)?;

    let mut insert = conn.prepare_cached(
        "INSERT INTO search_index (
            resource_type, resource_id, param_name, entry_index, component_index,
            value_string, value_token_system, value_token_code, value_token_text,
            value_date_start, value_date_end, value_number_low, value_number_high,
            value_quantity_low, value_quantity_high, value_quantity_system, value_quantity_code,
            value_reference_base, value_reference_type, value_reference_id, value_uri
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17, ?18, ?19, ?20, ?21)",
    )?;
    for (entry_index, entry) in resource.entries.iter().enumerate() {
        for row in index_rows(&entry.value) {
            insert.execute(params![
                location.resource_type,
                location.resource_id,
                entry.parameter_name,
                entry_index as i64,
                row.component_index,
                row.string,
                row.token_system,
                row.token_code,
                row.token_text,
                row.date_start,
                row.date_end,
                row.number_low,
                row.number_high,
                row.quantity_low,
                row.quantity_high,
                row.quantity_system,
                row.quantity_code,
                row.reference_base,
                row.reference_type,
                row.reference_id,
                row.uri,
            ])?;
        }
    }

    let mut membership = conn.prepare_cached(
        "INSERT OR IGNORE INTO compartment_assignment
            (resource_type, resource_id, compartment_type, compartment_id)
         VALUES (?1, ?2, ?3, ?4)",
    )?;
    for (compartment, id) in resource.compartments.memberships() {
        membership.execute(params![
            location.resource_type,
            location.resource_id,
            compartment.resource_type(),
            id
        ])?;
    }
    Ok(())
}

/// Reads the references of `location` that `projection` asks for.
fn project(
    conn: &Connection,
    location: &ResourceLocation,
    projection: &ReferenceProjection,
) -> SearchResult<Vec<ReferenceTarget>> {
    let mut stmt = conn.prepare_cached(
        "SELECT value_reference_type, value_reference_id FROM search_index
         WHERE resource_type = ?1 AND resource_id = ?2 AND param_name = ?3
           AND component_index IS NULL
           AND value_reference_type IS NOT NULL AND value_reference_id IS NOT NULL
         ORDER BY entry_index",
    )?;
    let rows = stmt.query_map(
        params![location.resource_type, location.resource_id, projection.reference_param],
        |row| Ok(ReferenceTarget::new(row.get::<_, String>(0)?, row.get::<_, String>(1)?)),
    )?;

    let mut targets = Vec::new();
    for target in rows {
        let target = target?;
        if projection.accepts_type(&target.resource_type) {
            targets.push(target);
        }
    }
    Ok(targets)
}

#[async_trait]
impl SearchBackend for SqliteSearchBackend {
    fn backend_name(&self) -> &'static str {
        BACKEND_NAME
    }

    async fn search(
        &self,
        query: &BackendQuery,
        continuation_token: Option<&str>,
        cancellation: &CancellationToken,
    ) -> SearchResult<SearchPage> {
        if cancellation.is_cancelled() {
            return Err(SearchError::Cancelled);
        }

        let offset = ContinuationCursor::offset_of(continuation_token)?;
        let page_size = query.page_size.unwrap_or(self.config.default_page_size).max(1);
        let plan = self.planner.plan(query, offset, page_size)?;

        let conn = self.get_connection()?;
        let mut locations = self.execute_plan(&conn, &plan)?;

        let has_more = locations.len() > page_size;
        locations.truncate(page_size);

        if cancellation.is_cancelled() {
            return Err(SearchError::Cancelled);
        }

        let mut hits = Vec::with_capacity(locations.len());
        for location in locations {
            let mut hit = SearchHit::new(location);
            for projection in &query.projections {
                for target in project(&conn, &hit.location, projection)? {
                    hit = hit.with_reference(projection.reference_param.clone(), target);
                }
            }
            hits.push(hit);
        }

        let continuation_token =
            has_more.then(|| ContinuationCursor::new(offset + hits.len()).encode());

        debug!(
            resource_types = ?query.resource_types,
            fingerprint = %plan.fingerprint,
            offset,
            returned = hits.len(),
            more = has_more,
            "SQLite search page"
        );

        Ok(SearchPage::new(hits, continuation_token))
    }
}
