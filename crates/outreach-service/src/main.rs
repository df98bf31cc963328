use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{delete, get, post};
use axum::{Json, Router};
use clap::Parser;
use outreach_api::{
    CacheConfig, CacheScope, DashboardView, Mutation, OutreachApi, API_CONTRACT_VERSION,
};
use outreach_core::{
    Analytics, Contact, ContactFilter, ContactId, ContactStatus, ImportSummary, NewContact,
    NewTemplate, OutreachError, StoreStats, Template, TemplateId,
};
use outreach_api::import::table_from_json_value;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing_subscriber::EnvFilter;

const SERVICE_CONTRACT_VERSION: &str = "service.v1";

#[derive(Clone)]
struct ServiceState {
    api: Arc<OutreachApi>,
}

#[derive(Debug, Clone, Serialize)]
struct ServiceEnvelope<T>
where
    T: Serialize,
{
    service_contract_version: &'static str,
    api_contract_version: &'static str,
    data: T,
}

#[derive(Debug, Clone, Serialize)]
struct ServiceError {
    service_contract_version: &'static str,
    error: String,
    #[serde(skip)]
    status: StatusCode,
}

#[derive(Debug, Clone, Serialize)]
struct HealthResponse {
    status: &'static str,
}

#[derive(Debug, Clone, Deserialize)]
struct BulkInsertRequest {
    contacts: Vec<NewContact>,
}

#[derive(Debug, Clone, Deserialize)]
struct StatusUpdateRequest {
    status: ContactStatus,
    #[serde(default)]
    notes: String,
}

#[derive(Debug, Clone, Deserialize)]
struct FollowupSentRequest {
    #[serde(default)]
    hours: Option<u32>,
}

#[derive(Debug, Clone, Deserialize)]
struct ResetRequest {
    #[serde(default)]
    confirm: bool,
}

#[derive(Debug, Clone, Deserialize)]
struct DashboardQuery {
    #[serde(default)]
    status: Option<ContactStatus>,
    #[serde(default)]
    company: Option<String>,
    #[serde(default)]
    search: Option<String>,
    #[serde(default = "first_page")]
    page: usize,
}

impl DashboardQuery {
    fn filter(&self) -> ContactFilter {
        ContactFilter {
            status: self.status,
            company: self.company.clone(),
            search: self.search.clone(),
        }
    }
}

fn first_page() -> usize {
    1
}

#[derive(Debug, Clone, Serialize)]
struct CountResponse {
    count: usize,
}

#[derive(Debug, Clone, Serialize)]
struct DeletedResponse {
    deleted: i64,
}

#[derive(Debug, Clone, Serialize)]
struct TemplateCreated {
    template_id: TemplateId,
}

#[derive(Debug, Clone, Serialize)]
struct RefreshResponse {
    invalidated: Vec<&'static str>,
}

#[derive(Debug, Parser)]
#[command(name = "outreach-service")]
#[command(about = "Local HTTP service for the outreach tracker")]
struct Args {
    #[arg(long, env = "OUTREACH_DB", default_value = "./outreach.sqlite3")]
    db: PathBuf,
    #[arg(long, env = "OUTREACH_BIND", default_value = "127.0.0.1:4020")]
    bind: SocketAddr,
    #[arg(long, env = "OUTREACH_CONTACTS_TTL_SECS", default_value_t = 30)]
    contacts_ttl_secs: i64,
    #[arg(long, env = "OUTREACH_DUE_TTL_SECS", default_value_t = 30)]
    due_ttl_secs: i64,
    #[arg(long, env = "OUTREACH_TEMPLATES_TTL_SECS", default_value_t = 60)]
    templates_ttl_secs: i64,
    #[arg(long, env = "OUTREACH_STATS_TTL_SECS", default_value_t = 30)]
    stats_ttl_secs: i64,
}

impl Args {
    fn cache_config(&self) -> CacheConfig {
        CacheConfig {
            contacts_ttl: time::Duration::seconds(self.contacts_ttl_secs),
            due_followups_ttl: time::Duration::seconds(self.due_ttl_secs),
            templates_ttl: time::Duration::seconds(self.templates_ttl_secs),
            stats_ttl: time::Duration::seconds(self.stats_ttl_secs),
        }
    }
}

impl IntoResponse for ServiceError {
    fn into_response(self) -> Response {
        (self.status, Json(self)).into_response()
    }
}

impl ServiceError {
    fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            service_contract_version: SERVICE_CONTRACT_VERSION,
            error: message.into(),
            status,
        }
    }
}

impl From<OutreachError> for ServiceError {
    fn from(err: OutreachError) -> Self {
        let status = match &err {
            OutreachError::Validation(_) | OutreachError::InvalidRows(_) => StatusCode::BAD_REQUEST,
            OutreachError::NotFound { .. } => StatusCode::NOT_FOUND,
            OutreachError::StoreBusy(_) => StatusCode::SERVICE_UNAVAILABLE,
            OutreachError::Storage(_) | OutreachError::SchemaMissing(_) => {
                tracing::error!(error = %err, "request failed");
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };
        Self::new(status, err.to_string())
    }
}

type ServiceResult<T> = Result<Json<ServiceEnvelope<T>>, ServiceError>;

fn envelope<T>(data: T) -> Json<ServiceEnvelope<T>>
where
    T: Serialize,
{
    Json(ServiceEnvelope {
        service_contract_version: SERVICE_CONTRACT_VERSION,
        api_contract_version: API_CONTRACT_VERSION,
        data,
    })
}

fn app(state: ServiceState) -> Router {
    Router::new()
        .route("/v1/health", get(health))
        .route(
            "/v1/contacts",
            get(list_contacts)
                .post(create_contact)
                .delete(delete_all_contacts),
        )
        .route("/v1/contacts/bulk", post(create_contacts_bulk))
        .route("/v1/contacts/import", post(import_contacts))
        .route("/v1/contacts/dedupe", post(dedupe_contacts))
        .route("/v1/contacts/:id", get(show_contact).delete(delete_contact))
        .route("/v1/contacts/:id/status", post(update_contact_status))
        .route("/v1/contacts/:id/followup-sent", post(mark_followup_sent))
        .route("/v1/followups/due", get(due_followups))
        .route("/v1/templates", get(list_templates).post(create_template))
        .route("/v1/templates/:id", delete(delete_template))
        .route("/v1/stats", get(stats))
        .route("/v1/dashboard", get(dashboard))
        .route("/v1/analytics", get(analytics))
        .route("/v1/db/reset", post(reset_database))
        .route("/v1/cache/refresh", post(refresh_cache))
        .with_state(state)
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();
    let api = OutreachApi::open(&args.db, args.cache_config())
        .with_context(|| format!("failed to open outreach database at {}", args.db.display()))?;
    let state = ServiceState { api: Arc::new(api) };
    let listener = tokio::net::TcpListener::bind(args.bind)
        .await
        .with_context(|| format!("failed to bind {}", args.bind))?;
    tracing::info!(bind = %args.bind, db = %args.db.display(), "outreach service listening");
    axum::serve(listener, app(state)).await?;
    Ok(())
}

async fn health() -> Json<ServiceEnvelope<HealthResponse>> {
    envelope(HealthResponse { status: "ok" })
}

async fn list_contacts(
    State(state): State<ServiceState>,
    Query(filter): Query<ContactFilter>,
) -> ServiceResult<Vec<Contact>> {
    let contacts = state.api.load_contacts()?;
    Ok(envelope(filter.apply(&contacts).into_iter().cloned().collect()))
}

async fn create_contact(
    State(state): State<ServiceState>,
    Json(request): Json<NewContact>,
) -> ServiceResult<Contact> {
    let id = state.api.insert_contact(&request)?;
    state.api.invalidate_after(Mutation::InsertContact);
    Ok(envelope(state.api.get_contact(id)?))
}

async fn create_contacts_bulk(
    State(state): State<ServiceState>,
    Json(request): Json<BulkInsertRequest>,
) -> ServiceResult<ImportSummary> {
    let summary = state.api.insert_contacts_bulk(&request.contacts)?;
    state.api.invalidate_after(Mutation::InsertContactsBulk);
    Ok(envelope(summary))
}

/// Rows keyed by spreadsheet header (`Name`, `Company Name`, ...), the same mapping the
/// file import uses.
async fn import_contacts(
    State(state): State<ServiceState>,
    Json(rows): Json<Value>,
) -> ServiceResult<ImportSummary> {
    let table = table_from_json_value(rows)?;
    let summary = state.api.import_table(&table)?;
    state.api.invalidate_after(Mutation::InsertContactsBulk);
    Ok(envelope(summary))
}

async fn show_contact(
    State(state): State<ServiceState>,
    Path(id): Path<i64>,
) -> ServiceResult<Contact> {
    Ok(envelope(state.api.get_contact(ContactId(id))?))
}

async fn delete_contact(
    State(state): State<ServiceState>,
    Path(id): Path<i64>,
) -> ServiceResult<DeletedResponse> {
    state.api.delete_contact(ContactId(id))?;
    state.api.invalidate_after(Mutation::DeleteContact);
    Ok(envelope(DeletedResponse { deleted: id }))
}

async fn delete_all_contacts(State(state): State<ServiceState>) -> ServiceResult<CountResponse> {
    let count = state.api.delete_all_contacts()?;
    state.api.invalidate_after(Mutation::DeleteAllContacts);
    Ok(envelope(CountResponse { count }))
}

async fn dedupe_contacts(State(state): State<ServiceState>) -> ServiceResult<CountResponse> {
    let api = &state.api;
    let count = api.remove_duplicate_contacts()?;
    api.invalidate_after(Mutation::RemoveDuplicateContacts);
    Ok(envelope(CountResponse { count }))
}

async fn update_contact_status(
    State(state): State<ServiceState>,
    Path(id): Path<i64>,
    Json(request): Json<StatusUpdateRequest>,
) -> ServiceResult<Contact> {
    let id = ContactId(id);
    let notes = request.notes.as_str();
    state.api.update_contact_status(id, request.status, notes)?;
    state.api.invalidate_after(Mutation::UpdateContactStatus);
    Ok(envelope(state.api.get_contact(id)?))
}

async fn mark_followup_sent(
    State(state): State<ServiceState>,
    Path(id): Path<i64>,
    Json(request): Json<FollowupSentRequest>,
) -> ServiceResult<Contact> {
    let contact = state.api.mark_followup_sent(ContactId(id), request.hours)?;
    state.api.invalidate_after(Mutation::MarkFollowupSent);
    Ok(envelope(contact))
}

async fn due_followups(State(state): State<ServiceState>) -> ServiceResult<Vec<Contact>> {
    Ok(envelope(state.api.load_due_followups()?.to_vec()))
}

async fn list_templates(State(state): State<ServiceState>) -> ServiceResult<Vec<Template>> {
    Ok(envelope(state.api.load_templates()?.to_vec()))
}

async fn create_template(
    State(state): State<ServiceState>,
    Json(request): Json<NewTemplate>,
) -> ServiceResult<TemplateCreated> {
    let template_id = state.api.add_template(&request)?;
    state.api.invalidate_after(Mutation::AddTemplate);
    Ok(envelope(TemplateCreated { template_id }))
}

async fn delete_template(
    State(state): State<ServiceState>,
    Path(id): Path<i64>,
) -> ServiceResult<DeletedResponse> {
    state.api.delete_template(TemplateId(id))?;
    state.api.invalidate_after(Mutation::DeleteTemplate);
    Ok(envelope(DeletedResponse { deleted: id }))
}

async fn stats(State(state): State<ServiceState>) -> ServiceResult<StoreStats> {
    Ok(envelope(StoreStats::clone(&*state.api.load_stats()?)))
}

async fn dashboard(
    State(state): State<ServiceState>,
    Query(query): Query<DashboardQuery>,
) -> ServiceResult<DashboardView> {
    Ok(envelope(state.api.load_dashboard(&query.filter(), query.page)?))
}

async fn analytics(State(state): State<ServiceState>) -> ServiceResult<Analytics> {
    Ok(envelope(state.api.load_analytics()?))
}

async fn reset_database(
    State(state): State<ServiceState>,
    Json(request): Json<ResetRequest>,
) -> ServiceResult<HealthResponse> {
    if !request.confirm {
        return Err(ServiceError::new(
            StatusCode::BAD_REQUEST,
            "reset requires {\"confirm\": true}",
        ));
    }
    state.api.reset_database()?;
    state.api.invalidate_after(Mutation::ResetDatabase);
    Ok(envelope(HealthResponse { status: "reset" }))
}

async fn refresh_cache(State(state): State<ServiceState>) -> ServiceResult<RefreshResponse> {
    state.api.invalidate_all();
    Ok(envelope(RefreshResponse {
        invalidated: CacheScope::ALL
            .into_iter()
            .map(CacheScope::as_str)
            .collect(),
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::{to_bytes, Body};
    use http::Request;
    use serde_json::{json, Value};
    use tempfile::TempDir;
    use tower::ServiceExt;

    fn test_router() -> (TempDir, Router) {
        let dir = tempfile::tempdir()
            .unwrap_or_else(|err| panic!("failed to create temp dir: {err}"));
        let db = dir.path().join("outreach.sqlite3");
        let api = OutreachApi::open(&db, CacheConfig::default())
            .unwrap_or_else(|err| panic!("failed to open api: {err}"));
        let router = app(ServiceState { api: Arc::new(api) });
        (dir, router)
    }

    async fn response_json(response: Response) -> Value {
        let bytes = match to_bytes(response.into_body(), 1024 * 1024).await {
            Ok(bytes) => bytes,
            Err(err) => panic!("failed to read response body: {err}"),
        };
        let body = match String::from_utf8(bytes.to_vec()) {
            Ok(body) => body,
            Err(err) => panic!("response body is not UTF-8: {err}"),
        };
        match serde_json::from_str(&body) {
            Ok(value) => value,
            Err(err) => panic!("response body is not JSON: {err}; body={body}"),
        }
    }

    async fn call(
        router: &Router,
        method: &str,
        uri: &str,
        body: Option<Value>,
    ) -> (StatusCode, Value) {
        let builder = Request::builder().uri(uri).method(method);
        let request = match body {
            Some(body) => builder
                .header("content-type", "application/json")
                .body(Body::from(body.to_string())),
            None => builder.body(Body::empty()),
        }
        .unwrap_or_else(|err| panic!("failed to build request {method} {uri}: {err}"));

        let response = match router.clone().oneshot(request).await {
            Ok(response) => response,
            Err(err) => panic!("router request {method} {uri} failed: {err}"),
        };
        let status = response.status();
        (status, response_json(response).await)
    }

    fn data_i64(value: &Value, key: &str) -> i64 {
        value
            .get("data")
            .and_then(|data| data.get(key))
            .and_then(Value::as_i64)
            .unwrap_or_else(|| panic!("missing data.{key} in response: {value}"))
    }

    fn error_mentions(value: &Value, needle: &str) -> bool {
        value
            .get("error")
            .and_then(Value::as_str)
            .is_some_and(|error| error.contains(needle))
    }

    // Test IDs: TSVC-001
    #[tokio::test]
    async fn health_endpoint_reports_ok() {
        let (_dir, router) = test_router();
        let (status, value) = call(&router, "GET", "/v1/health", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(
            value.get("service_contract_version").and_then(Value::as_str),
            Some(SERVICE_CONTRACT_VERSION)
        );
        assert_eq!(
            value.get("api_contract_version").and_then(Value::as_str),
            Some(API_CONTRACT_VERSION)
        );
    }

    // Test IDs: TSVC-002
    #[tokio::test]
    async fn contact_lifecycle_invalidates_cached_reads() {
        let (_dir, router) = test_router();

        let (status, listed) = call(&router, "GET", "/v1/contacts", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(listed["data"].as_array().map(Vec::len), Some(0));

        let (status, created) = call(
            &router,
            "POST",
            "/v1/contacts",
            Some(json!({"name": "Jane Doe", "company_name": "Acme", "status": "Applied"})),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        let id = data_i64(&created, "id");

        let (_, listed) = call(&router, "GET", "/v1/contacts", None).await;
        assert_eq!(listed["data"].as_array().map(Vec::len), Some(1));

        let (status, updated) = call(
            &router,
            "POST",
            &format!("/v1/contacts/{id}/status"),
            Some(json!({"status": "Applied", "notes": "sent CV"})),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(updated["data"]["notes"], json!("sent CV"));

        let (status, marked) = call(
            &router,
            "POST",
            &format!("/v1/contacts/{id}/followup-sent"),
            Some(json!({"hours": 24})),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(marked["data"]["status"], json!("Follow-Up Sent"));
        assert_eq!(marked["data"]["followup_interval"], json!(24));

        let (status, _) = call(&router, "DELETE", &format!("/v1/contacts/{id}"), None).await;
        assert_eq!(status, StatusCode::OK);
        let (status, missing) = call(&router, "GET", &format!("/v1/contacts/{id}"), None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert!(error_mentions(&missing, "not found"));
    }

    // Test IDs: TSVC-003
    #[tokio::test]
    async fn invalid_input_maps_to_bad_request() {
        let (_dir, router) = test_router();

        let (status, _) = call(&router, "POST", "/v1/contacts", Some(json!({"name": "  "}))).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, rejected) = call(
            &router,
            "POST",
            "/v1/contacts/bulk",
            Some(json!({"contacts": [{"name": "Jane Doe"}, {"name": "", "company_name": "Acme"}]})),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(error_mentions(&rejected, "row 2"));

        let (_, listed) = call(&router, "GET", "/v1/contacts", None).await;
        assert_eq!(listed["data"].as_array().map(Vec::len), Some(0));

        let (status, _) = call(&router, "POST", "/v1/db/reset", Some(json!({}))).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    // Test IDs: TSVC-004
    #[tokio::test]
    async fn dedupe_stats_dashboard_and_analytics_agree() {
        let (_dir, router) = test_router();
        let (status, summary) = call(
            &router,
            "POST",
            "/v1/contacts/bulk",
            Some(json!({"contacts": [
                {"name": "Jane Doe", "company_name": "Acme"},
                {"name": "John Roe", "company_name": "Globex"},
                {"name": "jane doe", "company_name": "ACME"}
            ]})),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(data_i64(&summary, "inserted"), 3);

        let (_, stats) = call(&router, "GET", "/v1/stats", None).await;
        assert_eq!(data_i64(&stats, "duplicate_groups"), 1);

        let (_, removed) = call(&router, "POST", "/v1/contacts/dedupe", None).await;
        assert_eq!(data_i64(&removed, "count"), 1);

        let (_, stats) = call(&router, "GET", "/v1/stats", None).await;
        assert_eq!(data_i64(&stats, "total_contacts"), 2);
        assert_eq!(data_i64(&stats, "duplicate_groups"), 0);

        let (status, dashboard) =
            call(&router, "GET", "/v1/dashboard?search=acme&page=3", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(dashboard["data"]["page"]["page"], json!(1));
        assert_eq!(dashboard["data"]["page"]["total_matching"], json!(1));
        assert_eq!(dashboard["data"]["summary"]["total_contacts"], json!(2));

        let (_, analytics) = call(&router, "GET", "/v1/analytics", None).await;
        assert_eq!(
            analytics["data"]["top_companies"].as_array().map(Vec::len),
            Some(2)
        );

        let (_, due) = call(&router, "GET", "/v1/followups/due", None).await;
        assert_eq!(due["data"].as_array().map(Vec::len), Some(0));
    }

    // Test IDs: TSVC-006
    #[tokio::test]
    async fn header_keyed_rows_import_through_the_file_mapping() {
        let (_dir, router) = test_router();

        let (status, summary) = call(
            &router,
            "POST",
            "/v1/contacts/import",
            Some(json!([
                {"Name": "Jane Doe ", "Company Name": "Acme", "Job Title": "Recruiter"},
                {"Name": "", "Company Name": ""},
                {"Name": "John Roe", "Favourite Colour": "teal"}
            ])),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(data_i64(&summary, "inserted"), 2);
        assert_eq!(data_i64(&summary, "skipped_blank"), 1);

        let (_, listed) = call(&router, "GET", "/v1/contacts?company=Acme", None).await;
        assert_eq!(listed["data"].as_array().map(Vec::len), Some(1));
        assert_eq!(listed["data"][0]["name"], json!("Jane Doe "));
        assert_eq!(listed["data"][0]["job_title"], json!("Recruiter"));

        let (status, rejected) = call(
            &router,
            "POST",
            "/v1/contacts/import",
            Some(json!([{"Name": "Ada Byron"}, {"Company Name": "Globex"}])),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(error_mentions(&rejected, "row 2"));

        let (status, _) = call(
            &router,
            "POST",
            "/v1/contacts/import",
            Some(json!({"Name": "Jane"})),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    // Test IDs: TSVC-005
    #[tokio::test]
    async fn templates_reset_and_cache_refresh() {
        let (_dir, router) = test_router();

        let (status, created) = call(
            &router,
            "POST",
            "/v1/templates",
            Some(json!({"title": "Intro", "body": "Hi {name}"})),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        let template_id = data_i64(&created, "template_id");

        let (_, listed) = call(&router, "GET", "/v1/templates", None).await;
        assert_eq!(listed["data"].as_array().map(Vec::len), Some(1));

        let template_uri = format!("/v1/templates/{template_id}");
        let (status, _) = call(&router, "DELETE", &template_uri, None).await;
        assert_eq!(status, StatusCode::OK);
        let (status, _) = call(&router, "DELETE", &template_uri, None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        let jane = json!({"name": "Jane Doe"});
        call(&router, "POST", "/v1/contacts", Some(jane)).await;
        let confirm = json!({"confirm": true});
        let (status, _) = call(&router, "POST", "/v1/db/reset", Some(confirm)).await;
        assert_eq!(status, StatusCode::OK);
        let (_, listed) = call(&router, "GET", "/v1/contacts", None).await;
        assert_eq!(listed["data"].as_array().map(Vec::len), Some(0));

        let (status, refreshed) = call(&router, "POST", "/v1/cache/refresh", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(
            refreshed["data"]["invalidated"].as_array().map(Vec::len),
            Some(4)
        );
    }
}
