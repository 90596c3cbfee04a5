//! OpenAPI documentation configuration.
//!
//! [`ApiDoc`] registers every HTTP endpoint of the inbound layer together
//! with the request and response schemas they reference. The document backs
//! Swagger UI in debug builds.

use utoipa::OpenApi;

use crate::domain::{Error, ErrorCode};
use crate::inbound::http::user_accounts::{
    CreateUserAccountRequest, PageLinksSchema, UserAccountPageSchema, UserAccountResponse,
    UserResponse,
};

/// OpenAPI document for the REST API.
#[derive(OpenApi)]
#[openapi(
    info(
        title = "User accounts API",
        description = "Create, list and fetch user accounts, plus health probes.",
    ),
    servers(
        (url = "/", description = "Relative to the deployment base URL")
    ),
    paths(
        crate::inbound::http::user_accounts::create_user_account,
        crate::inbound::http::user_accounts::list_user_accounts,
        crate::inbound::http::user_accounts::get_user_account,
        crate::inbound::http::health::ready,
        crate::inbound::http::health::live,
    ),
    components(schemas(
        CreateUserAccountRequest,
        UserAccountResponse,
        UserResponse,
        UserAccountPageSchema,
        PageLinksSchema,
        Error,
        ErrorCode,
    )),
    tags(
        (name = "user-accounts", description = "Operations on user accounts"),
        (name = "health", description = "Endpoints for health checks")
    )
)]
pub struct ApiDoc;
