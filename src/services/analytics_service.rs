//! Read-only reporting over COMPLETED orders. Revenue always comes from the stored
//! order totals and item snapshot prices, never from current catalog prices.

use std::collections::BTreeMap;

use chrono::{DateTime, Datelike, Days, Local, Months, NaiveDate, Utc};

use crate::{
    db::DbPool,
    dto::analytics::{
        AllTimeStats, CategoryRevenue, DashboardStats, PaymentMethodStat, PeriodStats, SalesPoint,
        TopProduct,
    },
    error::AppResult,
    middleware::auth::{AuthUser, ensure_admin},
    order_number::{business_day, day_bounds, local_midnight},
    response::{ApiResponse, Meta},
    routes::params::{DateRange, SalesPeriod, SalesQuery, TopProductsQuery},
    state::AppState,
};

const PERIOD_STATS_SQL: &str = r#"
    SELECT COUNT(*)::BIGINT, COALESCE(SUM(total), 0)::BIGINT
    FROM orders
    WHERE status = 'COMPLETED'
      AND ($1::timestamptz IS NULL OR created_at >= $1)
      AND ($2::timestamptz IS NULL OR created_at < $2)
"#;

const TOP_PRODUCTS_SQL: &str = r#"
    SELECT p.id,
           p.name,
           c.name AS category,
           SUM(oi.quantity)::BIGINT AS total_quantity,
           COUNT(DISTINCT oi.order_id)::BIGINT AS total_orders,
           SUM(oi.price * oi.quantity)::BIGINT AS revenue
    FROM order_items oi
    JOIN orders o ON o.id = oi.order_id
    JOIN products p ON p.id = oi.product_id
    LEFT JOIN categories c ON c.id = p.category_id
    WHERE o.status = 'COMPLETED'
      AND ($1::timestamptz IS NULL OR o.created_at >= $1)
      AND ($2::timestamptz IS NULL OR o.created_at < $2)
    GROUP BY p.id, p.name, c.name
    ORDER BY total_quantity DESC, p.name ASC
    LIMIT $3
"#;

const PAYMENT_METHODS_SQL: &str = r#"
    SELECT payment_method AS method,
           COUNT(*)::BIGINT AS orders,
           COALESCE(SUM(total), 0)::BIGINT AS revenue
    FROM orders
    WHERE status = 'COMPLETED'
    GROUP BY payment_method
    ORDER BY payment_method
"#;

const CATEGORY_REVENUE_SQL: &str = r#"
    SELECT c.id,
           c.name,
           COALESCE(SUM(sold.price * sold.quantity), 0)::BIGINT AS revenue,
           COALESCE(SUM(sold.quantity), 0)::BIGINT AS total_sold
    FROM categories c
    LEFT JOIN products p ON p.category_id = c.id
    LEFT JOIN (
        SELECT oi.product_id, oi.price, oi.quantity
        FROM order_items oi
        JOIN orders o ON o.id = oi.order_id
        WHERE o.status = 'COMPLETED'
    ) sold ON sold.product_id = p.id
    GROUP BY c.id, c.name, c.sort_order
    ORDER BY revenue DESC, c.sort_order ASC, c.name ASC
"#;

async fn period_stats(
    pool: &DbPool,
    from: Option<DateTime<Utc>>,
    to: Option<DateTime<Utc>>,
) -> AppResult<PeriodStats> {
    let (orders, revenue): (i64, i64) = sqlx::query_as(PERIOD_STATS_SQL)
        .bind(from)
        .bind(to)
        .fetch_one(pool)
        .await?;
    Ok(PeriodStats { orders, revenue })
}

fn utc(at: DateTime<chrono::FixedOffset>) -> DateTime<Utc> {
    at.with_timezone(&Utc)
}

/// Local month containing `day`, as a half-open pair of first days.
fn month_bounds(day: NaiveDate) -> (NaiveDate, NaiveDate) {
    let first = day.with_day(1).unwrap_or(day);
    let next = first.checked_add_months(Months::new(1)).unwrap_or(first);
    (first, next)
}

pub async fn dashboard(state: &AppState, user: &AuthUser) -> AppResult<ApiResponse<DashboardStats>> {
    ensure_admin(user)?;
    let today = business_day(&Local::now());

    let (day_start, day_end) = day_bounds(today);
    let today_stats = period_stats(&state.pool, Some(utc(day_start)), Some(utc(day_end))).await?;

    let (month_first, month_next) = month_bounds(today);
    let month_stats = period_stats(
        &state.pool,
        Some(utc(local_midnight(month_first))),
        Some(utc(local_midnight(month_next))),
    )
    .await?;

    let all = period_stats(&state.pool, None, None).await?;
    let (products,): (i64,) = sqlx::query_as("SELECT COUNT(*)::BIGINT FROM products")
        .fetch_one(&state.pool)
        .await?;

    let data = DashboardStats {
        today: today_stats,
        this_month: month_stats,
        all_time: AllTimeStats {
            orders: all.orders,
            revenue: all.revenue,
            products,
        },
    };
    Ok(ApiResponse::success("Dashboard", data, Some(Meta::empty())))
}

/// Window start for a sales chart ending at `now`.
pub fn period_start(period: SalesPeriod, now: DateTime<Local>) -> DateTime<Local> {
    let start = match period {
        SalesPeriod::Week => now.checked_sub_days(Days::new(7)),
        SalesPeriod::Month => now.checked_sub_months(Months::new(1)),
        SalesPeriod::Year => now.checked_sub_months(Months::new(12)),
    };
    start.unwrap_or(now)
}

/// Bucket orders by local calendar day, oldest first. Days without sales are omitted.
pub fn group_sales(rows: impl IntoIterator<Item = (DateTime<Utc>, i64)>) -> Vec<SalesPoint> {
    let mut by_day: BTreeMap<NaiveDate, SalesPoint> = BTreeMap::new();
    for (created_at, total) in rows {
        let date = business_day(&created_at);
        let point = by_day.entry(date).or_insert(SalesPoint {
            date,
            revenue: 0,
            orders: 0,
        });
        point.revenue += total;
        point.orders += 1;
    }
    by_day.into_values().collect()
}

pub async fn sales(
    state: &AppState,
    user: &AuthUser,
    query: SalesQuery,
) -> AppResult<ApiResponse<Vec<SalesPoint>>> {
    ensure_admin(user)?;
    let start = period_start(query.period.unwrap_or_default(), Local::now());

    let rows: Vec<(DateTime<Utc>, i64)> = sqlx::query_as(
        "SELECT created_at, total FROM orders WHERE status = 'COMPLETED' AND created_at >= $1 ORDER BY created_at ASC",
    )
    .bind(start.with_timezone(&Utc))
    .fetch_all(&state.pool)
    .await?;

    Ok(ApiResponse::success("Sales", group_sales(rows), Some(Meta::empty())))
}

/// Inclusive local days to a half-open UTC range.
fn range_bounds(range: DateRange) -> (Option<DateTime<Utc>>, Option<DateTime<Utc>>) {
    let from = range.start_date.map(|d| utc(local_midnight(d)));
    let to = range.end_date.map(|d| utc(day_bounds(d).1));
    (from, to)
}

pub async fn top_products(
    state: &AppState,
    user: &AuthUser,
    query: TopProductsQuery,
) -> AppResult<ApiResponse<Vec<TopProduct>>> {
    ensure_admin(user)?;
    let limit = query.limit.unwrap_or(10).clamp(1, 100);
    let (from, to) = range_bounds(query.range());

    let rows: Vec<TopProduct> = sqlx::query_as(TOP_PRODUCTS_SQL)
        .bind(from)
        .bind(to)
        .bind(limit)
        .fetch_all(&state.pool)
        .await?;

    Ok(ApiResponse::success("Top products", rows, Some(Meta::empty())))
}

pub async fn payment_methods(
    state: &AppState,
    user: &AuthUser,
) -> AppResult<ApiResponse<Vec<PaymentMethodStat>>> {
    ensure_admin(user)?;
    let rows: Vec<PaymentMethodStat> = sqlx::query_as(PAYMENT_METHODS_SQL)
        .fetch_all(&state.pool)
        .await?;
    Ok(ApiResponse::success("Payment methods", rows, Some(Meta::empty())))
}

pub async fn category_revenue(
    state: &AppState,
    user: &AuthUser,
) -> AppResult<ApiResponse<Vec<CategoryRevenue>>> {
    ensure_admin(user)?;
    let rows: Vec<CategoryRevenue> = sqlx::query_as(CATEGORY_REVENUE_SQL)
        .fetch_all(&state.pool)
        .await?;
    Ok(ApiResponse::success("Categories", rows, Some(Meta::empty())))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn sales_are_grouped_per_local_day() {
        let noon = |d: u32| {
            Local
                .with_ymd_and_hms(2025, 6, d, 12, 0, 0)
                .single()
                .unwrap()
                .with_timezone(&Utc)
        };
        let points = group_sales(vec![
            (noon(14), 24000),
            (noon(12), 12000),
            (noon(14), 6000),
        ]);
        assert_eq!(points.len(), 2);
        assert_eq!(points[0].date, NaiveDate::from_ymd_opt(2025, 6, 12).unwrap());
        assert_eq!(points[0].orders, 1);
        assert_eq!(points[1].revenue, 30000);
        assert_eq!(points[1].orders, 2);
    }

    #[test]
    fn month_bounds_roll_over_the_year() {
        let (first, next) = month_bounds(NaiveDate::from_ymd_opt(2025, 12, 31).unwrap());
        assert_eq!(first, NaiveDate::from_ymd_opt(2025, 12, 1).unwrap());
        assert_eq!(next, NaiveDate::from_ymd_opt(2026, 1, 1).unwrap());
    }

    #[test]
    fn sales_windows_reach_back_one_period() {
        let now = Local.with_ymd_and_hms(2025, 6, 14, 10, 0, 0).single().unwrap();
        assert_eq!(
            period_start(SalesPeriod::Week, now).date_naive(),
            NaiveDate::from_ymd_opt(2025, 6, 7).unwrap()
        );
        assert_eq!(
            period_start(SalesPeriod::Month, now).date_naive(),
            NaiveDate::from_ymd_opt(2025, 5, 14).unwrap()
        );
        assert_eq!(
            period_start(SalesPeriod::Year, now).date_naive(),
            NaiveDate::from_ymd_opt(2024, 6, 14).unwrap()
        );
    }
}
