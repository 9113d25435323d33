use chrono::NaiveDate;
use serde::Serialize;
use utoipa::ToSchema;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, ToSchema)]
pub struct PeriodStats {
    pub orders: i64,
    pub revenue: i64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, ToSchema)]
pub struct AllTimeStats {
    pub orders: i64,
    pub revenue: i64,
    pub products: i64,
}

#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct DashboardStats {
    pub today: PeriodStats,
    pub this_month: PeriodStats,
    pub all_time: AllTimeStats,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, ToSchema)]
pub struct SalesPoint {
    pub date: NaiveDate,
    pub revenue: i64,
    pub orders: i64,
}

#[derive(Debug, Serialize, ToSchema, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct TopProduct {
    pub id: Uuid,
    pub name: String,
    pub category: Option<String>,
    pub total_quantity: i64,
    pub total_orders: i64,
    /// Sum of snapshot line totals.
    pub revenue: i64,
}

#[derive(Debug, Serialize, ToSchema, sqlx::FromRow)]
pub struct PaymentMethodStat {
    pub method: String,
    pub orders: i64,
    pub revenue: i64,
}

#[derive(Debug, Serialize, ToSchema, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct CategoryRevenue {
    pub id: Uuid,
    pub name: String,
    pub revenue: i64,
    pub total_sold: i64,
}
