//! Exposes an in-process fake of the MediPort backend for use in integration tests.
//!
//! ```
//! use mediport_test::server::TestServer;
//!
//! #[tokio::main]
//! async fn main() {
//!    let server = TestServer::new().await;
//!    let url = server.url("/");
//!    // use the URL in tests...
//! }
//! ```
//!
//! The fake keeps all records in memory and issues HS256 tokens carrying the account's role code
//! in the `rol` claim. Every seeded account uses the password `"<username>-pass"`, see
//! [`TestServer::password`].

use std::collections::{BTreeMap, HashSet};
use std::net::{SocketAddr, TcpListener};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode, header};
use axum::response::{IntoResponse, Response};
use axum::{Json, Router, routing};
use jsonwebtoken::{DecodingKey, EncodingKey, Header, Validation, get_current_timestamp};
use mediport_types::Role;
use mediport_types::role_code::frontend_role_to_backend;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

const SIGNING_SECRET: &[u8] = b"mediport-test-secret";

/// Accounts known to the fake backend, with the role code the token will carry.
///
/// `mystery` carries a code the client does not know, `legacy` a token without a role claim.
fn seeded_accounts() -> BTreeMap<&'static str, Option<char>> {
    let mut accounts = BTreeMap::new();
    for (username, role) in [
        ("admin", Role::Administrator),
        ("doctor", Role::Doctor),
        ("nurse", Role::Nurse),
        ("pharmacist", Role::Pharmacist),
        ("receptionist", Role::Receptionist),
    ] {
        let code = frontend_role_to_backend(role).map(|code| code.as_char());
        accounts.insert(username, code);
    }
    accounts.insert("mystery", Some('Z'));
    accounts.insert("legacy", None);
    accounts
}

#[derive(Debug, Serialize, Deserialize)]
struct Claims {
    sub: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    rol: Option<String>,
    exp: u64,
}

#[derive(Debug, Default)]
struct Records {
    patients: BTreeMap<String, Value>,
    medications: Vec<Value>,
    prescriptions: Vec<Value>,
    users: Vec<Value>,
}

#[derive(Debug)]
struct Backend {
    accounts: BTreeMap<&'static str, Option<char>>,
    records: Mutex<Records>,
    requests: AtomicUsize,
    revoked: Mutex<HashSet<String>>,
    omit_token: AtomicBool,
    omit_token_type: AtomicBool,
    fail_logins: AtomicBool,
    reject_tokens: AtomicBool,
    delay_ms: AtomicUsize,
}

type SharedBackend = Arc<Backend>;

struct ApiError(StatusCode, &'static str);

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.0, Json(json!({ "detail": self.1 }))).into_response()
    }
}

type ApiResult<T> = Result<T, ApiError>;

impl Backend {
    fn sign(&self, username: &str, code: Option<char>) -> String {
        let claims = Claims {
            sub: username.to_owned(),
            rol: code.map(String::from),
            exp: get_current_timestamp() + 3600,
        };
        let key = EncodingKey::from_secret(SIGNING_SECRET);
        jsonwebtoken::encode(&Header::default(), &claims, &key).unwrap()
    }

    async fn hit(&self) {
        self.requests.fetch_add(1, Ordering::SeqCst);
        let delay = self.delay_ms.load(Ordering::SeqCst) as u64;
        if delay > 0 {
            tokio::time::sleep(Duration::from_millis(delay)).await;
        }
    }

    /// Verifies the bearer token, returning its claims.
    async fn authorize(&self, headers: &HeaderMap) -> ApiResult<Claims> {
        self.hit().await;

        const UNAUTHORIZED: ApiError =
            ApiError(StatusCode::UNAUTHORIZED, "Could not validate credentials");

        if self.reject_tokens.load(Ordering::SeqCst) {
            tracing::debug!("rejecting all tokens");
            return Err(UNAUTHORIZED);
        }

        let value = headers
            .get(header::AUTHORIZATION)
            .and_then(|value| value.to_str().ok())
            .ok_or(UNAUTHORIZED)?;
        let (scheme, token) = value.split_once(' ').ok_or(UNAUTHORIZED)?;
        if !scheme.eq_ignore_ascii_case("bearer") {
            return Err(UNAUTHORIZED);
        }
        if self.revoked.lock().unwrap().contains(token) {
            tracing::debug!("rejecting revoked token");
            return Err(UNAUTHORIZED);
        }

        let key = DecodingKey::from_secret(SIGNING_SECRET);
        jsonwebtoken::decode::<Claims>(token, &key, &Validation::default())
            .map(|data| data.claims)
            .map_err(|_| UNAUTHORIZED)
    }
}

#[derive(Deserialize)]
struct LoginRequest {
    username: String,
    password: String,
}

async fn login(
    State(backend): State<SharedBackend>,
    Json(request): Json<LoginRequest>,
) -> Response {
    backend.hit().await;

    if backend.fail_logins.load(Ordering::SeqCst) {
        return ApiError(StatusCode::INTERNAL_SERVER_ERROR, "Database unavailable").into_response();
    }

    let code = match backend.accounts.get(request.username.as_str()) {
        Some(code) if request.password == TestServer::password(&request.username) => *code,
        _ => {
            tracing::debug!(username = %request.username, "rejecting credentials");
            return ApiError(StatusCode::UNAUTHORIZED, "Incorrect username or password")
                .into_response();
        }
    };

    if backend.omit_token.load(Ordering::SeqCst) {
        return Json(json!({ "token_type": "bearer" })).into_response();
    }

    let token = backend.sign(&request.username, code);
    if backend.omit_token_type.load(Ordering::SeqCst) {
        return Json(json!({ "access_token": token, "token_type": "" })).into_response();
    }
    Json(json!({ "access_token": token, "token_type": "bearer" })).into_response()
}

async fn list_patients(
    State(backend): State<SharedBackend>,
    headers: HeaderMap,
) -> ApiResult<Json<Vec<Value>>> {
    backend.authorize(&headers).await?;
    let records = backend.records.lock().unwrap();
    Ok(Json(records.patients.values().cloned().collect()))
}

fn cnp_of(patient: &Value) -> ApiResult<String> {
    patient
        .get("CNP")
        .and_then(Value::as_str)
        .filter(|cnp| !cnp.is_empty())
        .map(str::to_owned)
        .ok_or(ApiError(StatusCode::UNPROCESSABLE_ENTITY, "CNP is required"))
}

async fn create_patient(
    State(backend): State<SharedBackend>,
    headers: HeaderMap,
    Json(patient): Json<Value>,
) -> ApiResult<impl IntoResponse> {
    backend.authorize(&headers).await?;
    let cnp = cnp_of(&patient)?;

    let mut records = backend.records.lock().unwrap();
    if records.patients.contains_key(&cnp) {
        return Err(ApiError(StatusCode::CONFLICT, "Patient already exists"));
    }
    records.patients.insert(cnp, patient.clone());
    Ok((StatusCode::CREATED, Json(patient)))
}

async fn update_patient(
    State(backend): State<SharedBackend>,
    Path(cnp): Path<String>,
    headers: HeaderMap,
    Json(patient): Json<Value>,
) -> ApiResult<Json<Value>> {
    backend.authorize(&headers).await?;

    let mut records = backend.records.lock().unwrap();
    let Some(stored) = records.patients.get_mut(&cnp) else {
        return Err(ApiError(StatusCode::NOT_FOUND, "Patient not found"));
    };
    *stored = patient.clone();
    Ok(Json(patient))
}

async fn delete_patient(
    State(backend): State<SharedBackend>,
    Path(cnp): Path<String>,
    headers: HeaderMap,
) -> ApiResult<StatusCode> {
    backend.authorize(&headers).await?;

    let mut records = backend.records.lock().unwrap();
    match records.patients.remove(&cnp) {
        Some(_) => Ok(StatusCode::NO_CONTENT),
        None => Err(ApiError(StatusCode::NOT_FOUND, "Patient not found")),
    }
}

async fn list_medications(
    State(backend): State<SharedBackend>,
    headers: HeaderMap,
) -> ApiResult<Json<Vec<Value>>> {
    backend.authorize(&headers).await?;
    Ok(Json(backend.records.lock().unwrap().medications.clone()))
}

async fn create_medication(
    State(backend): State<SharedBackend>,
    headers: HeaderMap,
    Json(mut medication): Json<Value>,
) -> ApiResult<impl IntoResponse> {
    backend.authorize(&headers).await?;

    let mut records = backend.records.lock().unwrap();
    let id = records.medications.len() + 1;
    medication["id"] = json!(id);
    records.medications.push(medication.clone());
    Ok((StatusCode::CREATED, Json(medication)))
}

async fn list_prescriptions(
    State(backend): State<SharedBackend>,
    headers: HeaderMap,
) -> ApiResult<Json<Vec<Value>>> {
    backend.authorize(&headers).await?;
    Ok(Json(backend.records.lock().unwrap().prescriptions.clone()))
}

async fn create_prescription(
    State(backend): State<SharedBackend>,
    headers: HeaderMap,
    Json(mut prescription): Json<Value>,
) -> ApiResult<impl IntoResponse> {
    backend.authorize(&headers).await?;

    let mut records = backend.records.lock().unwrap();
    let id = records.prescriptions.len() + 1;
    prescription["id_prescriptie"] = json!(id);
    records.prescriptions.push(prescription.clone());
    Ok((StatusCode::CREATED, Json(prescription)))
}

async fn list_users(
    State(backend): State<SharedBackend>,
    headers: HeaderMap,
) -> ApiResult<Json<Vec<Value>>> {
    backend.authorize(&headers).await?;
    Ok(Json(backend.records.lock().unwrap().users.clone()))
}

async fn create_user(
    State(backend): State<SharedBackend>,
    headers: HeaderMap,
    Json(user): Json<Value>,
) -> ApiResult<impl IntoResponse> {
    let claims = backend.authorize(&headers).await?;
    if claims.rol.as_deref() != Some("D") {
        return Err(ApiError(StatusCode::FORBIDDEN, "Not enough permissions"));
    }

    backend.records.lock().unwrap().users.push(user.clone());
    Ok((StatusCode::CREATED, Json(user)))
}

fn router(backend: SharedBackend) -> Router {
    Router::new()
        .route("/login", routing::post(login))
        .route(
            "/angajati/medic/",
            routing::get(list_patients).post(create_patient),
        )
        .route(
            "/angajati/medic/medicamente",
            routing::get(list_medications).post(create_medication),
        )
        .route(
            "/angajati/medic/{cnp}",
            routing::put(update_patient).delete(delete_patient),
        )
        .route(
            "/prescriptii/",
            routing::get(list_prescriptions).post(create_prescription),
        )
        .route("/angajati", routing::get(list_users).post(create_user))
        .with_state(backend)
}

/// An in-process fake backend for use in integration tests.
///
/// It listens on a random available port on localhost and is shut down when dropped.
#[derive(Debug)]
pub struct TestServer {
    handle: tokio::task::JoinHandle<()>,
    socket: SocketAddr,
    backend: SharedBackend,
}

impl TestServer {
    /// Starts a server with the seeded accounts and no records.
    pub async fn new() -> Self {
        let addr = SocketAddr::from(([127, 0, 0, 1], 0));
        let listener = TcpListener::bind(addr).unwrap();
        listener.set_nonblocking(true).unwrap();
        let socket = listener.local_addr().unwrap();

        let backend = Arc::new(Backend {
            accounts: seeded_accounts(),
            records: Mutex::default(),
            requests: AtomicUsize::new(0),
            revoked: Mutex::default(),
            omit_token: AtomicBool::new(false),
            omit_token_type: AtomicBool::new(false),
            fail_logins: AtomicBool::new(false),
            reject_tokens: AtomicBool::new(false),
            delay_ms: AtomicUsize::new(0),
        });

        let app = router(backend.clone());
        let handle = tokio::spawn(async move {
            let listener = tokio::net::TcpListener::from_std(listener).unwrap();
            axum::serve(listener, app).await.unwrap();
        });

        Self {
            handle,
            socket,
            backend,
        }
    }

    /// Returns a full URL pointing to the given path.
    ///
    /// This URL uses `localhost` as hostname.
    pub fn url(&self, path: &str) -> String {
        let path = path.trim_start_matches('/');
        format!("http://localhost:{}/{}", self.socket.port(), path)
    }

    /// Returns the password of a seeded account.
    pub fn password(username: &str) -> String {
        format!("{username}-pass")
    }

    /// Signs a token for `username` carrying the role code `code`, as the login endpoint would.
    pub fn token_for(&self, username: &str, code: Option<char>) -> String {
        self.backend.sign(username, code)
    }

    /// Returns the number of requests received so far.
    pub fn requests(&self) -> usize {
        self.backend.requests.load(Ordering::SeqCst)
    }

    /// Makes successful logins respond without an access token.
    pub fn omit_token(&self, omit: bool) {
        self.backend.omit_token.store(omit, Ordering::SeqCst);
    }

    /// Makes successful logins respond with an empty token type.
    pub fn omit_token_type(&self, omit: bool) {
        self.backend.omit_token_type.store(omit, Ordering::SeqCst);
    }

    /// Makes the login endpoint fail with `500 Internal Server Error`.
    pub fn fail_logins(&self, fail: bool) {
        self.backend.fail_logins.store(fail, Ordering::SeqCst);
    }

    /// Makes every authorized endpoint respond with `401 Unauthorized`.
    pub fn reject_tokens(&self, reject: bool) {
        self.backend.reject_tokens.store(reject, Ordering::SeqCst);
    }

    /// Revokes a single token.
    pub fn revoke(&self, token: &str) {
        self.backend.revoked.lock().unwrap().insert(token.to_owned());
    }

    /// Delays every response by the given duration.
    pub fn delay(&self, delay: Duration) {
        let millis = delay.as_millis().try_into().unwrap_or(usize::MAX);
        self.backend.delay_ms.store(millis, Ordering::SeqCst);
    }

    /// Inserts a patient record directly.
    pub fn seed_patient(&self, patient: Value) {
        let cnp = cnp_of(&patient).ok().expect("seeded patient needs a CNP");
        self.backend.records.lock().unwrap().patients.insert(cnp, patient);
    }

    /// Inserts a backend user record directly.
    pub fn seed_user(&self, user: Value) {
        self.backend.records.lock().unwrap().users.push(user);
    }

    /// Returns the stored patient records.
    pub fn patients(&self) -> Vec<Value> {
        let records = self.backend.records.lock().unwrap();
        records.patients.values().cloned().collect()
    }

    /// Returns the stored user records.
    pub fn users(&self) -> Vec<Value> {
        self.backend.records.lock().unwrap().users.clone()
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        self.handle.abort();
    }
}
