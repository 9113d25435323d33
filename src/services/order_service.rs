use std::collections::HashMap;

use chrono::{Local, NaiveDate, Utc};
use sea_orm::ActiveValue::NotSet;
use sea_orm::sea_query::LockType;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, Condition, ConnectionTrait, EntityTrait, PaginatorTrait,
    QueryFilter, QueryOrder, QuerySelect, Set, SqlErr, TransactionTrait,
};
use serde_json::{Value, json};
use uuid::Uuid;

use crate::{
    audit,
    dto::orders::{CheckoutItem, CheckoutRequest, OrderList, PrintReceiptResponse},
    entity::{
        order_items::{ActiveModel as OrderItemActive, Column as OrderItemCol, Entity as OrderItems},
        orders::{ActiveModel as OrderActive, Column as OrderCol, Entity as Orders},
        products::{Column as ProdCol, Entity as Products},
        users::Entity as Users,
    },
    error::{AppError, AppResult},
    middleware::auth::{AuthUser, ensure_admin},
    models::{Cashier, Order, OrderDetail, OrderItem, OrderStatus, PaymentMethod},
    order_number,
    printer::{PrintOutcome, emit_receipt},
    receipt::format_receipt,
    response::{ApiResponse, Meta},
    routes::params::{OrderListQuery, SortOrder},
    state::AppState,
};

/// Attempts when the order number insert hits the unique constraint.
const MAX_CHECKOUT_ATTEMPTS: u32 = 3;

/// A checkout request that passed input validation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidatedCheckout {
    pub items: Vec<CheckoutItem>,
    pub payment_method: PaymentMethod,
    pub amount_paid: i64,
    pub notes: Option<String>,
}

/// A requested line priced from the catalog.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PricedLine {
    pub product_id: Uuid,
    pub quantity: i32,
    pub unit_price: i64,
    pub notes: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PricedOrder {
    pub lines: Vec<PricedLine>,
    pub subtotal: i64,
    pub total: i64,
    pub change: i64,
}

pub fn validate_checkout(payload: CheckoutRequest) -> AppResult<ValidatedCheckout> {
    if payload.items.is_empty() {
        return Err(AppError::Validation("Order items are required".into()));
    }
    if let Some(item) = payload.items.iter().find(|item| item.quantity <= 0) {
        return Err(AppError::Validation(format!(
            "Quantity for product {} must be greater than 0",
            item.product_id
        )));
    }

    let payment_method = payload
        .payment_method
        .as_deref()
        .map(str::trim)
        .filter(|m| !m.is_empty())
        .ok_or_else(|| AppError::Validation("Payment method is required".into()))?
        .parse::<PaymentMethod>()
        .map_err(AppError::Validation)?;

    let amount_paid = parse_amount(payload.amount_paid.as_ref())?;

    Ok(ValidatedCheckout {
        items: payload.items,
        payment_method,
        amount_paid,
        notes: clean_notes(payload.notes.as_deref()),
    })
}

fn parse_amount(value: Option<&Value>) -> AppResult<i64> {
    let amount = match value {
        None | Some(Value::Null) => {
            return Err(AppError::Validation("Amount paid is required".into()));
        }
        Some(Value::Number(n)) => n.as_i64().or_else(|| {
            n.as_f64()
                .filter(|f| f.fract() == 0.0 && f.abs() < 9.0e15)
                .map(|f| f as i64)
        }),
        Some(Value::String(s)) => s.trim().parse::<i64>().ok(),
        Some(_) => None,
    }
    .ok_or_else(|| AppError::Validation("Amount paid must be a whole number".into()))?;

    if amount < 0 {
        return Err(AppError::Validation("Amount paid must not be negative".into()));
    }
    Ok(amount)
}

fn clean_notes(notes: Option<&str>) -> Option<String> {
    notes
        .map(str::trim)
        .filter(|n| !n.is_empty())
        .map(String::from)
}

/// Totals and change for priced lines. Rejects underpayment before anything is written.
pub fn price_order(lines: Vec<PricedLine>, amount_paid: i64) -> AppResult<PricedOrder> {
    let too_large = || AppError::Validation("Order total is too large".into());
    let mut subtotal: i64 = 0;
    for line in &lines {
        let line_total = line
            .unit_price
            .checked_mul(i64::from(line.quantity))
            .ok_or_else(too_large)?;
        subtotal = subtotal.checked_add(line_total).ok_or_else(too_large)?;
    }
    // no discounts or tax
    let total = subtotal;

    let change = amount_paid - total;
    if change < 0 {
        return Err(AppError::InsufficientPayment { total, amount_paid });
    }

    Ok(PricedOrder {
        lines,
        subtotal,
        total,
        change,
    })
}

async fn price_lines<C: ConnectionTrait>(
    conn: &C,
    items: &[CheckoutItem],
) -> AppResult<Vec<PricedLine>> {
    let ids: Vec<Uuid> = items.iter().map(|item| item.product_id).collect();
    let products: HashMap<Uuid, _> = Products::find()
        .filter(ProdCol::Id.is_in(ids))
        .all(conn)
        .await?
        .into_iter()
        .map(|p| (p.id, p))
        .collect();

    items
        .iter()
        .map(|item| {
            let product = products.get(&item.product_id).ok_or_else(|| {
                AppError::NotFound(format!("Product with ID {} not found", item.product_id))
            })?;
            if !product.is_available {
                return Err(AppError::Unavailable(format!(
                    "Product {} is not available",
                    product.name
                )));
            }
            Ok(PricedLine {
                product_id: product.id,
                quantity: item.quantity,
                unit_price: product.price,
                notes: clean_notes(item.notes.as_deref()),
            })
        })
        .collect()
}

/// One checkout attempt: price, number and insert in a single transaction.
async fn place_order(
    state: &AppState,
    user: &AuthUser,
    checkout: &ValidatedCheckout,
    day: NaiveDate,
) -> AppResult<Uuid> {
    let txn = state.orm.begin().await?;

    let lines = price_lines(&txn, &checkout.items).await?;
    let priced = price_order(lines, checkout.amount_paid)?;

    let order_number =
        order_number::next_order_number(&txn, &state.config.order_number_prefix, day).await?;

    let order = OrderActive {
        id: Set(Uuid::new_v4()),
        order_number: Set(order_number),
        subtotal: Set(priced.subtotal),
        total: Set(priced.total),
        payment_method: Set(checkout.payment_method),
        amount_paid: Set(checkout.amount_paid),
        change: Set(priced.change),
        status: Set(OrderStatus::Completed),
        notes: Set(checkout.notes.clone()),
        user_id: Set(user.user_id),
        created_at: NotSet,
        updated_at: NotSet,
    }
    .insert(&txn)
    .await?;

    let items = priced
        .lines
        .into_iter()
        .enumerate()
        .map(|(idx, line)| OrderItemActive {
            id: Set(Uuid::new_v4()),
            order_id: Set(order.id),
            line_no: Set(idx as i32 + 1),
            product_id: Set(line.product_id),
            quantity: Set(line.quantity),
            price: Set(line.unit_price),
            notes: Set(line.notes),
            created_at: NotSet,
        });
    OrderItems::insert_many(items).exec(&txn).await?;

    txn.commit().await?;
    Ok(order.id)
}

fn is_order_number_conflict(err: &AppError) -> bool {
    match err {
        AppError::OrmError(db_err) => matches!(
            db_err.sql_err(),
            Some(SqlErr::UniqueConstraintViolation(msg)) if msg.contains("order_number")
        ),
        _ => false,
    }
}

pub async fn checkout(
    state: &AppState,
    user: &AuthUser,
    payload: CheckoutRequest,
) -> AppResult<ApiResponse<OrderDetail>> {
    let checkout = validate_checkout(payload)?;
    let day = order_number::business_day(&Local::now());

    let mut attempt = 1;
    let order_id = loop {
        match place_order(state, user, &checkout, day).await {
            Ok(id) => break id,
            Err(err) if attempt < MAX_CHECKOUT_ATTEMPTS && is_order_number_conflict(&err) => {
                tracing::warn!(attempt, "order number already taken, retrying checkout");
                attempt += 1;
            }
            Err(err) => return Err(err),
        }
    };

    let detail = load_order_detail(&state.orm, order_id)
        .await?
        .ok_or_else(|| AppError::Internal(anyhow::anyhow!("order {order_id} missing after commit")))?;

    tracing::info!(
        order_number = %detail.order.order_number,
        total = detail.order.total,
        payment_method = %detail.order.payment_method,
        "order created"
    );
    audit::record(
        &state.pool,
        user.user_id,
        "order_create",
        "orders",
        json!({ "order_id": order_id, "order_number": detail.order.order_number }),
    )
    .await;

    Ok(ApiResponse::success(
        "Order created",
        detail,
        Some(Meta::empty()),
    ))
}

/// Print in the background after checkout; the response never waits on the printer.
pub fn schedule_receipt(state: &AppState, order: &OrderDetail) {
    if !state.config.print_on_checkout {
        return;
    }
    let receipt = format_receipt(order, &state.config.shop);
    let printer = state.printer.clone();
    tokio::spawn(async move {
        emit_receipt(printer, receipt).await;
    });
}

pub async fn list_orders(
    state: &AppState,
    query: OrderListQuery,
) -> AppResult<ApiResponse<OrderList>> {
    let (page, limit, offset) = query.pagination().normalize();

    let mut condition = Condition::all();
    if let Some(status) = query.status {
        condition = condition.add(OrderCol::Status.eq(status));
    }
    if let Some(start) = query.start_date {
        condition = condition.add(OrderCol::CreatedAt.gte(order_number::local_midnight(start)));
    }
    if let Some(end) = query.end_date {
        let (_, end_exclusive) = order_number::day_bounds(end);
        condition = condition.add(OrderCol::CreatedAt.lt(end_exclusive));
    }

    let mut finder = Orders::find().filter(condition);
    finder = match query.sort_order.unwrap_or(SortOrder::Desc) {
        SortOrder::Asc => finder.order_by_asc(OrderCol::CreatedAt),
        SortOrder::Desc => finder.order_by_desc(OrderCol::CreatedAt),
    };

    let total = finder.clone().count(&state.orm).await? as i64;

    let rows = finder
        .find_also_related(Users)
        .limit(limit as u64)
        .offset(offset as u64)
        .all(&state.orm)
        .await?;

    let ids: Vec<Uuid> = rows.iter().map(|(order, _)| order.id).collect();
    let mut items = load_items(&state.orm, &ids).await?;

    let orders = rows
        .into_iter()
        .map(|(order, user)| OrderDetail {
            order_items: items.remove(&order.id).unwrap_or_default(),
            user: user.map(Cashier::from),
            order: Order::from(order),
        })
        .collect();

    Ok(ApiResponse::success(
        "Ok",
        OrderList { items: orders },
        Some(Meta::new(page, limit, total)),
    ))
}

pub async fn get_order(state: &AppState, id: Uuid) -> AppResult<ApiResponse<OrderDetail>> {
    let detail = load_order_detail(&state.orm, id)
        .await?
        .ok_or_else(|| AppError::NotFound("Order not found".into()))?;
    Ok(ApiResponse::success("OK", detail, Some(Meta::empty())))
}

/// COMPLETED -> CANCELLED. A second cancel is rejected and changes nothing.
pub async fn cancel_order(
    state: &AppState,
    user: &AuthUser,
    id: Uuid,
) -> AppResult<ApiResponse<OrderDetail>> {
    ensure_admin(user)?;

    let txn = state.orm.begin().await?;
    let order = Orders::find_by_id(id)
        .lock(LockType::Update)
        .one(&txn)
        .await?
        .ok_or_else(|| AppError::NotFound("Order not found".into()))?;

    if order.status == OrderStatus::Cancelled {
        return Err(AppError::Validation("Order already cancelled".into()));
    }

    let mut active: OrderActive = order.into();
    active.status = Set(OrderStatus::Cancelled);
    active.updated_at = Set(Utc::now().into());
    let order = active.update(&txn).await?;

    txn.commit().await?;

    tracing::info!(order_number = %order.order_number, "order cancelled");
    audit::record(
        &state.pool,
        user.user_id,
        "order_cancel",
        "orders",
        json!({ "order_id": order.id, "order_number": order.order_number }),
    )
    .await;

    let detail = load_order_detail(&state.orm, id)
        .await?
        .ok_or_else(|| AppError::NotFound("Order not found".into()))?;
    Ok(ApiResponse::success(
        "Order cancelled",
        detail,
        Some(Meta::empty()),
    ))
}

/// Re-emit the receipt of a stored order. Printer trouble is reported, not raised.
pub async fn print_order(
    state: &AppState,
    id: Uuid,
) -> AppResult<ApiResponse<PrintReceiptResponse>> {
    let detail = load_order_detail(&state.orm, id)
        .await?
        .ok_or_else(|| AppError::NotFound("Order not found".into()))?;

    let receipt = format_receipt(&detail, &state.config.shop);
    let outcome = emit_receipt(state.printer.clone(), receipt.clone()).await;
    let message = match outcome {
        PrintOutcome::Printed => "Receipt printed",
        PrintOutcome::Skipped => "Printer not configured, receipt not printed",
        PrintOutcome::Failed => "Receipt could not be printed",
    };

    Ok(ApiResponse::success(
        message,
        PrintReceiptResponse {
            order_number: detail.order.order_number,
            outcome,
            receipt,
        },
        Some(Meta::empty()),
    ))
}

pub async fn load_order_detail<C: ConnectionTrait>(
    conn: &C,
    id: Uuid,
) -> AppResult<Option<OrderDetail>> {
    let Some((order, user)) = Orders::find_by_id(id)
        .find_also_related(Users)
        .one(conn)
        .await?
    else {
        return Ok(None);
    };

    let order_items = load_items(conn, &[order.id])
        .await?
        .remove(&order.id)
        .unwrap_or_default();

    Ok(Some(OrderDetail {
        order: Order::from(order),
        user: user.map(Cashier::from),
        order_items,
    }))
}

async fn load_items<C: ConnectionTrait>(
    conn: &C,
    order_ids: &[Uuid],
) -> AppResult<HashMap<Uuid, Vec<OrderItem>>> {
    if order_ids.is_empty() {
        return Ok(HashMap::new());
    }

    let rows = OrderItems::find()
        .filter(OrderItemCol::OrderId.is_in(order_ids.to_vec()))
        .find_also_related(Products)
        .order_by_asc(OrderItemCol::OrderId)
        .order_by_asc(OrderItemCol::LineNo)
        .all(conn)
        .await?;

    let mut grouped: HashMap<Uuid, Vec<OrderItem>> = HashMap::new();
    for (item, product) in rows {
        grouped
            .entry(item.order_id)
            .or_default()
            .push(OrderItem::from_entity(item, product));
    }
    Ok(grouped)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(items: Vec<CheckoutItem>, method: Option<&str>, paid: Option<Value>) -> CheckoutRequest {
        CheckoutRequest {
            items,
            payment_method: method.map(String::from),
            amount_paid: paid,
            notes: None,
        }
    }

    fn item(quantity: i32) -> CheckoutItem {
        CheckoutItem {
            product_id: Uuid::new_v4(),
            quantity,
            notes: None,
        }
    }

    fn line(unit_price: i64, quantity: i32) -> PricedLine {
        PricedLine {
            product_id: Uuid::new_v4(),
            quantity,
            unit_price,
            notes: None,
        }
    }

    #[test]
    fn empty_items_are_rejected() {
        let err = validate_checkout(request(vec![], Some("CASH"), Some(json!(1000)))).unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));
    }

    #[test]
    fn missing_payment_fields_are_rejected() {
        assert!(matches!(
            validate_checkout(request(vec![item(1)], None, Some(json!(1000)))),
            Err(AppError::Validation(_))
        ));
        assert!(matches!(
            validate_checkout(request(vec![item(1)], Some("CASH"), None)),
            Err(AppError::Validation(_))
        ));
        assert!(matches!(
            validate_checkout(request(vec![item(1)], Some("CASH"), Some(json!("lots")))),
            Err(AppError::Validation(_))
        ));
        assert!(matches!(
            validate_checkout(request(vec![item(1)], Some("GOLD"), Some(json!(1000)))),
            Err(AppError::Validation(_))
        ));
    }

    #[test]
    fn non_positive_quantity_is_rejected() {
        assert!(matches!(
            validate_checkout(request(vec![item(0)], Some("CASH"), Some(json!(1000)))),
            Err(AppError::Validation(_))
        ));
    }

    #[test]
    fn numeric_strings_are_accepted_as_amounts() {
        let checkout =
            validate_checkout(request(vec![item(2)], Some("qris"), Some(json!(" 30000 ")))).unwrap();
        assert_eq!(checkout.amount_paid, 30000);
        assert_eq!(checkout.payment_method, PaymentMethod::Qris);
        assert!(matches!(
            parse_amount(Some(&json!(-5))),
            Err(AppError::Validation(_))
        ));
        assert_eq!(parse_amount(Some(&json!(30000.0))).unwrap(), 30000);
        assert!(parse_amount(Some(&json!(300.5))).is_err());
    }

    #[test]
    fn jeruk_scenario_prices_and_gives_change() {
        let priced = price_order(vec![line(12000, 2)], 30000).unwrap();
        assert_eq!(priced.subtotal, 24000);
        assert_eq!(priced.total, 24000);
        assert_eq!(priced.change, 6000);
    }

    #[test]
    fn underpayment_is_rejected() {
        let err = price_order(vec![line(12000, 2)], 20000).unwrap_err();
        assert!(matches!(
            err,
            AppError::InsufficientPayment {
                total: 24000,
                amount_paid: 20000
            }
        ));
    }

    #[test]
    fn exact_payment_has_zero_change() {
        let priced = price_order(vec![line(15000, 1), line(0, 2), line(12000, 3)], 51000).unwrap();
        assert_eq!(priced.total, 51000);
        assert_eq!(priced.change, 0);
    }

    #[test]
    fn overflowing_totals_are_rejected() {
        let err = price_order(vec![line(i64::MAX, 2)], i64::MAX).unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));
    }

    #[test]
    fn only_order_number_conflicts_are_retried() {
        let conflict = AppError::OrmError(sea_orm::DbErr::Custom("x".into()));
        assert!(!is_order_number_conflict(&conflict));
        assert!(!is_order_number_conflict(&AppError::Forbidden));
    }
}
