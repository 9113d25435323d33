use axum::{
    Json, Router,
    extract::{Query, State},
    routing::get,
};

use crate::{
    dto::analytics::{CategoryRevenue, DashboardStats, PaymentMethodStat, SalesPoint, TopProduct},
    error::AppResult,
    middleware::auth::AuthUser,
    response::ApiResponse,
    routes::params::{SalesQuery, TopProductsQuery},
    services::analytics_service,
    state::AppState,
};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/dashboard", get(dashboard))
        .route("/sales", get(sales))
        .route("/top-products", get(top_products))
        .route("/payment-methods", get(payment_methods))
        .route("/categories", get(categories))
}

#[utoipa::path(
    get,
    path = "/api/analytics/dashboard",
    responses(
        (status = 200, description = "Today, this month and all time totals", body = ApiResponse<DashboardStats>),
        (status = 403, description = "Admin only")
    ),
    security(("bearer_auth" = [])),
    tag = "Analytics"
)]
pub async fn dashboard(
    State(state): State<AppState>,
    user: AuthUser,
) -> AppResult<Json<ApiResponse<DashboardStats>>> {
    let resp = analytics_service::dashboard(&state, &user).await?;
    Ok(Json(resp))
}

#[utoipa::path(
    get,
    path = "/api/analytics/sales",
    params(("period" = Option<String>, Query, description = "week (default), month or year")),
    responses(
        (status = 200, description = "Revenue and orders per local day", body = ApiResponse<Vec<SalesPoint>>)
    ),
    security(("bearer_auth" = [])),
    tag = "Analytics"
)]
pub async fn sales(
    State(state): State<AppState>,
    user: AuthUser,
    Query(query): Query<SalesQuery>,
) -> AppResult<Json<ApiResponse<Vec<SalesPoint>>>> {
    let resp = analytics_service::sales(&state, &user, query).await?;
    Ok(Json(resp))
}

#[utoipa::path(
    get,
    path = "/api/analytics/top-products",
    params(
        ("limit" = Option<i64>, Query, description = "Default 10"),
        ("startDate" = Option<String>, Query, description = "First local day, YYYY-MM-DD"),
        ("endDate" = Option<String>, Query, description = "Last local day, YYYY-MM-DD")
    ),
    responses(
        (status = 200, description = "Best sellers by quantity", body = ApiResponse<Vec<TopProduct>>)
    ),
    security(("bearer_auth" = [])),
    tag = "Analytics"
)]
pub async fn top_products(
    State(state): State<AppState>,
    user: AuthUser,
    Query(query): Query<TopProductsQuery>,
) -> AppResult<Json<ApiResponse<Vec<TopProduct>>>> {
    let resp = analytics_service::top_products(&state, &user, query).await?;
    Ok(Json(resp))
}

#[utoipa::path(
    get,
    path = "/api/analytics/payment-methods",
    responses(
        (status = 200, description = "Orders and revenue per payment method", body = ApiResponse<Vec<PaymentMethodStat>>)
    ),
    security(("bearer_auth" = [])),
    tag = "Analytics"
)]
pub async fn payment_methods(
    State(state): State<AppState>,
    user: AuthUser,
) -> AppResult<Json<ApiResponse<Vec<PaymentMethodStat>>>> {
    let resp = analytics_service::payment_methods(&state, &user).await?;
    Ok(Json(resp))
}

#[utoipa::path(
    get,
    path = "/api/analytics/categories",
    responses(
        (status = 200, description = "Revenue and units per category", body = ApiResponse<Vec<CategoryRevenue>>)
    ),
    security(("bearer_auth" = [])),
    tag = "Analytics"
)]
pub async fn categories(
    State(state): State<AppState>,
    user: AuthUser,
) -> AppResult<Json<ApiResponse<Vec<CategoryRevenue>>>> {
    let resp = analytics_service::category_revenue(&state, &user).await?;
    Ok(Json(resp))
}
