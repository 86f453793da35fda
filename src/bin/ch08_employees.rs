//! Chapter 8: a small JSON CRUD service over a repository trait
//!
//! Routes:
//!   GET  /employees        list
//!   POST /employees        create
//!   GET  /employees/{id}   fetch one
//!   PUT  /employees/{id}   replace one
//!
//! Storage is in-memory unless a SQLite database path is configured.
//!
//! Run with: cargo run --bin ch08_employees -- --database employees.db --seed

use std::collections::BTreeMap;
use std::convert::Infallible;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};

use anyhow::Context;
use bytes::Bytes;
use chrono::{DateTime, NaiveDate, Utc};
use clap::Parser;
use http_body_util::{BodyExt, Full, LengthLimitError, Limited};
use hyper::body::Body;
use hyper::header::{self, HeaderValue};
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Method, Request, Response, StatusCode};
use hyper_util::rt::{TokioIo, TokioTimer};
use rusqlite::types::{FromSql, FromSqlError, FromSqlResult, ToSqlOutput, ValueRef};
use rusqlite::{params, Connection, OptionalExtension, Row, ToSql};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::net::TcpListener;
use tracing::{debug, error, info, warn};

// =============================================================================
// Domain
// =============================================================================

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Position {
    #[default]
    Undetermined,
    Junior,
    Senior,
    Manager,
    Ceo,
}

impl Position {
    /// Integer code used in storage.
    pub fn code(self) -> i64 {
        match self {
            Position::Undetermined => 0,
            Position::Junior => 1,
            Position::Senior => 2,
            Position::Manager => 3,
            Position::Ceo => 4,
        }
    }

    pub fn from_code(code: i64) -> Option<Self> {
        match code {
            0 => Some(Position::Undetermined),
            1 => Some(Position::Junior),
            2 => Some(Position::Senior),
            3 => Some(Position::Manager),
            4 => Some(Position::Ceo),
            _ => None,
        }
    }
}

impl ToSql for Position {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(ToSqlOutput::from(self.code()))
    }
}

impl FromSql for Position {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        let code = i64::column_result(value)?;
        Position::from_code(code).ok_or(FromSqlError::OutOfRange(code))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Employee {
    pub id: i64,
    pub full_name: String,
    pub position: Position,
    pub salary: f64,
    pub joined: NaiveDate,
    pub on_probation: bool,
    pub created_at: DateTime<Utc>,
}

/// Request body for create and update. The server owns `id` and `created_at`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewEmployee {
    pub full_name: String,
    #[serde(default)]
    pub position: Position,
    pub salary: f64,
    pub joined: NaiveDate,
    #[serde(default)]
    pub on_probation: bool,
}

impl NewEmployee {
    fn validate(&self) -> Result<(), RepositoryError> {
        if self.full_name.trim().is_empty() {
            return Err(RepositoryError::Invalid("full_name is required".into()));
        }
        if !self.salary.is_finite() || self.salary < 0.0 {
            return Err(RepositoryError::Invalid(format!(
                "salary must be a non-negative number, got {}",
                self.salary
            )));
        }
        Ok(())
    }

    fn into_employee(self, id: i64, created_at: DateTime<Utc>) -> Employee {
        Employee {
            id,
            full_name: self.full_name,
            position: self.position,
            salary: self.salary,
            joined: self.joined,
            on_probation: self.on_probation,
            created_at,
        }
    }
}

// =============================================================================
// Repository
// =============================================================================

#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("employee {0} not found")]
    NotFound(i64),

    #[error("invalid employee: {0}")]
    Invalid(String),

    #[error("storage error: {0}")]
    Storage(#[from] rusqlite::Error),

    #[error("repository lock poisoned")]
    Poisoned,
}

pub trait EmployeeRepository: Send + Sync {
    fn create(&self, new: NewEmployee) -> Result<Employee, RepositoryError>;
    fn update(&self, id: i64, changes: NewEmployee) -> Result<Employee, RepositoryError>;
    fn get(&self, id: i64) -> Result<Employee, RepositoryError>;
    fn list(&self) -> Result<Vec<Employee>, RepositoryError>;
}

#[derive(Debug, Default)]
struct MemoryState {
    last_id: i64,
    employees: BTreeMap<i64, Employee>,
}

#[derive(Debug, Default)]
pub struct InMemoryRepository {
    state: Mutex<MemoryState>,
}

impl InMemoryRepository {
    fn state(&self) -> Result<MutexGuard<'_, MemoryState>, RepositoryError> {
        self.state.lock().map_err(|_| RepositoryError::Poisoned)
    }
}

impl EmployeeRepository for InMemoryRepository {
    fn create(&self, new: NewEmployee) -> Result<Employee, RepositoryError> {
        new.validate()?;
        let mut state = self.state()?;
        state.last_id += 1;
        let employee = new.into_employee(state.last_id, Utc::now());
        state.employees.insert(employee.id, employee.clone());
        Ok(employee)
    }

    fn update(&self, id: i64, changes: NewEmployee) -> Result<Employee, RepositoryError> {
        changes.validate()?;
        let mut state = self.state()?;
        let slot = state
            .employees
            .get_mut(&id)
            .ok_or(RepositoryError::NotFound(id))?;
        *slot = changes.into_employee(id, slot.created_at);
        Ok(slot.clone())
    }

    fn get(&self, id: i64) -> Result<Employee, RepositoryError> {
        self.state()?
            .employees
            .get(&id)
            .cloned()
            .ok_or(RepositoryError::NotFound(id))
    }

    fn list(&self) -> Result<Vec<Employee>, RepositoryError> {
        Ok(self.state()?.employees.values().cloned().collect())
    }
}

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS employees (
    id           INTEGER PRIMARY KEY AUTOINCREMENT,
    full_name    TEXT    NOT NULL,
    position     INTEGER NOT NULL,
    salary       REAL    NOT NULL,
    joined       TEXT    NOT NULL,
    on_probation INTEGER NOT NULL,
    created_at   TEXT    NOT NULL
);";

const COLUMNS: &str = "id, full_name, position, salary, joined, on_probation, created_at";

/// `rusqlite::Connection` is `Send` but not `Sync`, so it sits behind a mutex.
pub struct SqliteRepository {
    conn: Mutex<Connection>,
}

impl SqliteRepository {
    pub fn open(path: &Path) -> Result<Self, RepositoryError> {
        Self::with_connection(Connection::open(path)?)
    }

    pub fn in_memory() -> Result<Self, RepositoryError> {
        Self::with_connection(Connection::open_in_memory()?)
    }

    fn with_connection(conn: Connection) -> Result<Self, RepositoryError> {
        conn.execute_batch(SCHEMA)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>, RepositoryError> {
        self.conn.lock().map_err(|_| RepositoryError::Poisoned)
    }
}

fn row_to_employee(row: &Row<'_>) -> rusqlite::Result<Employee> {
    Ok(Employee {
        id: row.get(0)?,
        full_name: row.get(1)?,
        position: row.get(2)?,
        salary: row.get(3)?,
        joined: row.get(4)?,
        on_probation: row.get(5)?,
        created_at: row.get(6)?,
    })
}

fn fetch(conn: &Connection, id: i64) -> Result<Employee, RepositoryError> {
    conn.query_row(
        &format!("SELECT {} FROM employees WHERE id = ?1", COLUMNS),
        params![id],
        row_to_employee,
    )
    .optional()?
    .ok_or(RepositoryError::NotFound(id))
}

impl EmployeeRepository for SqliteRepository {
    fn create(&self, new: NewEmployee) -> Result<Employee, RepositoryError> {
        new.validate()?;
        let conn = self.conn()?;
        let created_at = Utc::now();
        conn.execute(
            "INSERT INTO employees (full_name, position, salary, joined, on_probation, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                new.full_name,
                new.position,
                new.salary,
                new.joined,
                new.on_probation,
                created_at
            ],
        )?;
        let id = conn.last_insert_rowid();
        Ok(new.into_employee(id, created_at))
    }

    fn update(&self, id: i64, changes: NewEmployee) -> Result<Employee, RepositoryError> {
        changes.validate()?;
        let conn = self.conn()?;
        let changed = conn.execute(
            "UPDATE employees
             SET full_name = ?1, position = ?2, salary = ?3, joined = ?4, on_probation = ?5
             WHERE id = ?6",
            params![
                changes.full_name,
                changes.position,
                changes.salary,
                changes.joined,
                changes.on_probation,
                id
            ],
        )?;
        if changed == 0 {
            return Err(RepositoryError::NotFound(id));
        }
        fetch(&conn, id)
    }

    fn get(&self, id: i64) -> Result<Employee, RepositoryError> {
        fetch(&*self.conn()?, id)
    }

    fn list(&self) -> Result<Vec<Employee>, RepositoryError> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(&format!("SELECT {} FROM employees ORDER BY id", COLUMNS))?;
        let employees = stmt
            .query_map([], row_to_employee)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(employees)
    }
}

// =============================================================================
// Configuration
// =============================================================================

const ENV_BIND: &str = "EMPLOYEES_BIND";
const ENV_DATABASE: &str = "EMPLOYEES_DATABASE";

#[derive(Debug, Error)]
enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config file {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("invalid value for {var}: '{value}'")]
    InvalidEnv { var: &'static str, value: String },
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
struct ServiceConfig {
    bind: SocketAddr,
    /// SQLite file. `None` keeps everything in memory.
    database: Option<PathBuf>,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            bind: SocketAddr::from(([127, 0, 0, 1], 8080)),
            database: None,
        }
    }
}

impl ServiceConfig {
    fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let Some(path) = path else {
            return Ok(Self::default());
        };
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        toml::from_str(&content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Overlay environment variables, looked up through `lookup`.
    fn apply_env<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(value) = lookup(ENV_BIND) {
            self.bind = value.parse().map_err(|_| ConfigError::InvalidEnv {
                var: ENV_BIND,
                value: value.clone(),
            })?;
        }
        if let Some(value) = lookup(ENV_DATABASE) {
            self.database = if value.is_empty() {
                None
            } else {
                Some(PathBuf::from(value))
            };
        }
        Ok(())
    }

    /// Overlay command-line flags. A flag that was not given leaves the
    /// file/env value in place.
    fn apply_args(&mut self, bind: Option<SocketAddr>, database: Option<PathBuf>) {
        if let Some(bind) = bind {
            self.bind = bind;
        }
        if let Some(database) = database {
            self.database = Some(database);
        }
    }
}

// =============================================================================
// HTTP
// =============================================================================

type JsonResponse = Response<Full<Bytes>>;
type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Request bodies above this size are rejected with 413.
const MAX_BODY_BYTES: usize = 64 * 1024;

#[derive(Debug, Error)]
enum ApiError {
    #[error("no route for {0}")]
    RouteNotFound(String),

    #[error("method {0} not allowed")]
    MethodNotAllowed(Method),

    #[error("invalid employee id '{0}'")]
    BadId(String),

    #[error("failed to read request body: {0}")]
    ReadBody(String),

    #[error("invalid request body: {0}")]
    BadBody(String),

    #[error("request body exceeds {0} bytes")]
    BodyTooLarge(usize),

    #[error(transparent)]
    Repository(#[from] RepositoryError),
}

impl ApiError {
    fn status(&self) -> StatusCode {
        match self {
            ApiError::RouteNotFound(_) => StatusCode::NOT_FOUND,
            ApiError::MethodNotAllowed(_) => StatusCode::METHOD_NOT_ALLOWED,
            ApiError::BadId(_) | ApiError::BadBody(_) => StatusCode::BAD_REQUEST,
            ApiError::BodyTooLarge(_) => StatusCode::PAYLOAD_TOO_LARGE,
            ApiError::ReadBody(_) => StatusCode::INTERNAL_SERVER_ERROR,
            ApiError::Repository(RepositoryError::NotFound(_)) => StatusCode::NOT_FOUND,
            ApiError::Repository(RepositoryError::Invalid(_)) => StatusCode::BAD_REQUEST,
            ApiError::Repository(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

#[derive(Serialize)]
struct ErrorBody {
    error: String,
}

#[derive(Debug, PartialEq)]
enum Route {
    Collection,
    Item(i64),
}

fn parse_route(path: &str) -> Result<Route, ApiError> {
    let not_found = || ApiError::RouteNotFound(path.to_string());
    let rest = path.strip_prefix("/employees").ok_or_else(not_found)?;
    if rest.is_empty() || rest == "/" {
        return Ok(Route::Collection);
    }

    let id = rest.strip_prefix('/').ok_or_else(not_found)?;
    let id = id.strip_suffix('/').unwrap_or(id);
    if id.contains('/') {
        return Err(not_found());
    }
    id.parse()
        .map(Route::Item)
        .map_err(|_| ApiError::BadId(id.to_string()))
}

fn with_json(status: StatusCode, body: Vec<u8>) -> JsonResponse {
    let mut resp = Response::new(Full::new(Bytes::from(body)));
    *resp.status_mut() = status;
    resp.headers_mut().insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static("application/json"),
    );
    resp
}

fn json_response<T: Serialize>(status: StatusCode, body: &T) -> JsonResponse {
    match serde_json::to_vec(body) {
        Ok(bytes) => with_json(status, bytes),
        Err(err) => {
            error!(%err, "failed to encode response");
            with_json(
                StatusCode::INTERNAL_SERVER_ERROR,
                br#"{"error":"failed to encode response"}"#.to_vec(),
            )
        }
    }
}

async fn read_json<B, T>(req: Request<B>) -> Result<T, ApiError>
where
    B: Body,
    B::Error: Into<BoxError>,
    T: DeserializeOwned,
{
    let bytes = match Limited::new(req.into_body(), MAX_BODY_BYTES).collect().await {
        Ok(collected) => collected.to_bytes(),
        Err(err) if err.downcast_ref::<LengthLimitError>().is_some() => {
            return Err(ApiError::BodyTooLarge(MAX_BODY_BYTES));
        }
        Err(err) => return Err(ApiError::ReadBody(err.to_string())),
    };
    serde_json::from_slice(&bytes).map_err(|err| ApiError::BadBody(err.to_string()))
}

async fn dispatch<B>(
    repo: &dyn EmployeeRepository,
    req: Request<B>,
) -> Result<JsonResponse, ApiError>
where
    B: Body,
    B::Error: Into<BoxError>,
{
    let route = parse_route(req.uri().path())?;
    match (route, req.method()) {
        (Route::Collection, &Method::GET) => Ok(json_response(StatusCode::OK, &repo.list()?)),
        (Route::Collection, &Method::POST) => {
            let new: NewEmployee = read_json(req).await?;
            let created = repo.create(new)?;
            info!(id = created.id, "employee created");
            Ok(json_response(StatusCode::CREATED, &created))
        }
        (Route::Item(id), &Method::GET) => Ok(json_response(StatusCode::OK, &repo.get(id)?)),
        (Route::Item(id), &Method::PUT) => {
            let changes: NewEmployee = read_json(req).await?;
            let updated = repo.update(id, changes)?;
            info!(id, "employee updated");
            Ok(json_response(StatusCode::OK, &updated))
        }
        (_, method) => Err(ApiError::MethodNotAllowed(method.clone())),
    }
}

async fn handle<B>(
    repo: Arc<dyn EmployeeRepository>,
    req: Request<B>,
) -> Result<JsonResponse, Infallible>
where
    B: Body,
    B::Error: Into<BoxError>,
{
    let method = req.method().clone();
    let path = req.uri().path().to_string();

    let resp = match dispatch(repo.as_ref(), req).await {
        Ok(resp) => resp,
        Err(err) => {
            let status = err.status();
            if status.is_server_error() {
                error!(%method, %path, %err, "request failed");
            } else {
                debug!(%method, %path, %err, "request rejected");
            }
            json_response(status, &ErrorBody { error: err.to_string() })
        }
    };

    info!(%method, %path, status = resp.status().as_u16(), "request served");
    Ok(resp)
}

async fn serve(addr: SocketAddr, repo: Arc<dyn EmployeeRepository>) -> anyhow::Result<()> {
    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {}", addr))?;
    info!(%addr, "listening");

    loop {
        let (tcp, peer) = tokio::select! {
            accepted = listener.accept() => accepted?,
            _ = tokio::signal::ctrl_c() => {
                info!("ctrl-c received, shutting down");
                return Ok(());
            }
        };
        let io = TokioIo::new(tcp);
        let repo = Arc::clone(&repo);

        tokio::task::spawn(async move {
            let service = service_fn(move |req| handle(Arc::clone(&repo), req));
            if let Err(err) = http1::Builder::new()
                .timer(TokioTimer::new())
                .serve_connection(io, service)
                .await
            {
                warn!(%peer, %err, "error serving connection");
            }
        });
    }
}

// =============================================================================
// Main
// =============================================================================

#[derive(Parser, Debug)]
#[command(about = "Employee CRUD service")]
struct Args {
    /// TOML config file with `bind` and `database` keys
    #[arg(long)]
    config: Option<PathBuf>,

    /// Listen address, overrides config and EMPLOYEES_BIND
    #[arg(long)]
    bind: Option<SocketAddr>,

    /// SQLite database file, overrides config and EMPLOYEES_DATABASE
    #[arg(long)]
    database: Option<PathBuf>,

    /// Insert a sample employee at startup
    #[arg(long)]
    seed: bool,

    #[arg(short, long)]
    verbose: bool,
}

fn open_repository(config: &ServiceConfig) -> anyhow::Result<Arc<dyn EmployeeRepository>> {
    let repo: Arc<dyn EmployeeRepository> = match &config.database {
        Some(path) => {
            info!(path = %path.display(), "using sqlite repository");
            let repo = SqliteRepository::open(path)
                .with_context(|| format!("failed to open {}", path.display()))?;
            Arc::new(repo)
        }
        None => {
            info!("using in-memory repository");
            Arc::new(InMemoryRepository::default())
        }
    };
    Ok(repo)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    feature_demos::telemetry::init(args.verbose);

    let mut config = ServiceConfig::load(args.config.as_deref())?;
    config.apply_env(|var| std::env::var(var).ok())?;
    config.apply_args(args.bind, args.database);
    debug!(?config, "configuration resolved");

    let repo = open_repository(&config)?;
    if args.seed {
        let seeded = repo.create(NewEmployee {
            full_name: "Juan Arroyo".into(),
            position: Position::Junior,
            salary: 4343.43,
            joined: Utc::now().date_naive(),
            on_probation: false,
        })?;
        info!(id = seeded.id, "seeded sample employee");
    }

    serve(config.bind, repo).await
}

// =============================================================================
// Tests
// =============================================================================
