//! HTTP surface: router, middleware and server.

mod middleware;
mod response;
mod routes;
mod server;
mod state;

pub use middleware::{
    cors_layer, rate_limit, request_id, request_logger, RequestId, RATE_LIMIT_LIMIT,
    RATE_LIMIT_REMAINING, RATE_LIMIT_RESET, REQUEST_ID,
};
pub use response::{error_response, success, ApiError, ErrorBody, ErrorResponse, SuccessResponse};
pub use routes::{app, app_with_auth, HealthReport, LimiterReport, ServiceInfo};
pub use server::HttpServer;
pub use state::AppState;
