//! User account HTTP handlers.
//!
//! ```text
//! POST /api/v1/user-accounts {"username":"jdoe","firstName":"John","lastName":"Doe"}
//! GET /api/v1/user-accounts?limit=20&start=0
//! GET /api/v1/user-accounts/{id}
//! ```

use actix_web::{HttpRequest, HttpResponse, get, http::header, post, web};
use pagination::{FindOptions, Page, PageLinks};
use serde::{Deserialize, Serialize};
use tracing::debug;
use utoipa::{IntoParams, ToSchema};

use crate::domain::{Error, FALLBACK_MESSAGE, Id, User, UserAccount};
use crate::inbound::http::ApiResult;
use crate::inbound::http::state::HttpState;

/// Path prefix shared by every account endpoint.
pub const USER_ACCOUNTS_PATH: &str = "/api/v1/user-accounts";

/// Message returned when a body or query string cannot be decoded.
pub const DECODE_FAILURE_MESSAGE: &str = "failed to decode request";

fn decode_failure(err: impl std::fmt::Display, req: &HttpRequest) -> actix_web::Error {
    debug!(error = %err, path = req.path(), "request decoding failed");
    Error::invalid_request(DECODE_FAILURE_MESSAGE).into()
}

/// JSON body extractor settings turning malformed payloads into
/// `invalid_request` errors.
pub fn json_config() -> web::JsonConfig {
    web::JsonConfig::default().error_handler(|err, req| decode_failure(err, req))
}

/// Query string extractor settings matching [`json_config`].
pub fn query_config() -> web::QueryConfig {
    web::QueryConfig::default().error_handler(|err, req| decode_failure(err, req))
}

/// Request body for `POST /api/v1/user-accounts`.
#[derive(Debug, Deserialize, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CreateUserAccountRequest {
    #[schema(example = "jdoe")]
    pub username: String,
    #[schema(example = "John")]
    pub first_name: String,
    #[schema(example = "Doe")]
    pub last_name: String,
}

impl From<CreateUserAccountRequest> for UserAccount {
    fn from(value: CreateUserAccountRequest) -> Self {
        Self::new(value.username, User::new(value.first_name, value.last_name))
    }
}

/// Query parameters for `GET /api/v1/user-accounts`.
#[derive(Debug, Default, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct ListUserAccountsQuery {
    /// Page size; 0 or absent selects the default, larger values are capped.
    pub limit: Option<u64>,
    /// Zero-based offset of the first account.
    pub start: Option<u64>,
}

/// User embedded in an account response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct UserResponse {
    pub id: String,
    pub first_name: String,
    pub last_name: String,
    /// Milliseconds since the Unix epoch.
    pub created_at: i64,
}

/// Account payload returned by the read endpoints.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct UserAccountResponse {
    pub id: String,
    pub username: String,
    pub user: UserResponse,
    /// Milliseconds since the Unix epoch.
    pub created_at: i64,
}

impl From<&User> for UserResponse {
    fn from(value: &User) -> Self {
        Self {
            id: value.id().to_string(),
            first_name: value.first_name().to_owned(),
            last_name: value.last_name().to_owned(),
            created_at: value.created_at().timestamp_millis(),
        }
    }
}

impl From<UserAccount> for UserAccountResponse {
    fn from(value: UserAccount) -> Self {
        Self {
            id: value.id().to_string(),
            username: value.username().to_owned(),
            user: UserResponse::from(value.user()),
            created_at: value.created_at().timestamp_millis(),
        }
    }
}

/// OpenAPI shape of the navigation links in a page response.
#[derive(ToSchema)]
#[expect(dead_code, reason = "Used only for OpenAPI schema generation via utoipa")]
pub struct PageLinksSchema {
    /// Origin of the service.
    #[schema(example = "http://localhost:8080/")]
    base: String,
    /// Collection URL without paging parameters.
    #[schema(rename = "self", example = "http://localhost:8080/api/v1/user-accounts")]
    self_link: String,
    /// Following page, absent on the last page.
    #[schema(example = "http://localhost:8080/api/v1/user-accounts?start=20")]
    next: Option<String>,
    /// Preceding page, absent on the first page.
    prev: Option<String>,
}

/// OpenAPI shape of `GET /api/v1/user-accounts`.
#[derive(ToSchema)]
#[expect(dead_code, reason = "Used only for OpenAPI schema generation via utoipa")]
pub struct UserAccountPageSchema {
    links: PageLinksSchema,
    /// Number of accounts ignoring pagination.
    total: u64,
    data: Vec<UserAccountResponse>,
}

/// Create a user account.
#[utoipa::path(
    post,
    path = "/api/v1/user-accounts",
    request_body = CreateUserAccountRequest,
    responses(
        (
            status = 201,
            description = "Account created",
            headers(("Location" = String, description = "URL of the new account"))
        ),
        (status = 400, description = "Malformed request", body = Error),
        (status = 409, description = "Username already taken", body = Error),
        (status = 500, description = "Internal server error", body = Error)
    ),
    tags = ["user-accounts"],
    operation_id = "createUserAccount"
)]
#[post("/user-accounts")]
pub async fn create_user_account(
    state: web::Data<HttpState>,
    payload: web::Json<CreateUserAccountRequest>,
) -> ApiResult<HttpResponse> {
    let account = state
        .user_accounts
        .create_user_account(payload.into_inner().into())
        .await?;
    Ok(HttpResponse::Created()
        .insert_header((
            header::LOCATION,
            format!("{USER_ACCOUNTS_PATH}/{}", account.id()),
        ))
        .finish())
}

/// List user accounts one page at a time.
#[utoipa::path(
    get,
    path = "/api/v1/user-accounts",
    params(ListUserAccountsQuery),
    responses(
        (status = 200, description = "One page of accounts", body = UserAccountPageSchema),
        (status = 400, description = "Malformed query", body = Error),
        (status = 500, description = "Internal server error", body = Error)
    ),
    tags = ["user-accounts"],
    operation_id = "listUserAccounts"
)]
#[get("/user-accounts")]
pub async fn list_user_accounts(
    state: web::Data<HttpState>,
    query: web::Query<ListUserAccountsQuery>,
) -> ApiResult<HttpResponse> {
    let query = query.into_inner();
    let options = FindOptions::from_query(query.limit, query.start);
    let result = state.user_accounts.find_user_accounts(options).await?;

    let links = PageLinks::build(
        &state.public_base_url,
        USER_ACCOUNTS_PATH,
        result.options,
        result.has_next,
    )
    .map_err(|err| Error::internal(FALLBACK_MESSAGE).with_details(serde_json::json!({
        "cause": err.to_string(),
    })))?;
    let page = Page::new(links, result.total, result.data).map(UserAccountResponse::from);
    Ok(HttpResponse::Ok().json(page))
}

/// Fetch one user account.
#[utoipa::path(
    get,
    path = "/api/v1/user-accounts/{id}",
    params(("id" = String, Path, description = "Account identifier")),
    responses(
        (status = 200, description = "The account", body = UserAccountResponse),
        (status = 404, description = "No such account", body = Error),
        (status = 500, description = "Internal server error", body = Error)
    ),
    tags = ["user-accounts"],
    operation_id = "getUserAccount"
)]
#[get("/user-accounts/{id}")]
pub async fn get_user_account(
    state: web::Data<HttpState>,
    path: web::Path<String>,
) -> ApiResult<HttpResponse> {
    let id = Id::new(path.into_inner());
    let account = state.user_accounts.find_user_account_by_id(&id).await?;
    Ok(HttpResponse::Ok().json(UserAccountResponse::from(account)))
}

#[cfg(test)]
#[path = "user_accounts_tests.rs"]
mod tests;
