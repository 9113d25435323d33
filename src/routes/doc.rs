use utoipa::{
    Modify, OpenApi,
    openapi::{
        self,
        OpenApi as OpenApiSpec,
        security::{HttpAuthScheme, HttpBuilder, SecurityScheme},
    },
};
use utoipa_scalar::{Scalar, Servable};

use crate::{
    dto::{
        analytics::{
            AllTimeStats, CategoryRevenue, DashboardStats, PaymentMethodStat, PeriodStats,
            SalesPoint, TopProduct,
        },
        auth::{LoginRequest, LoginResponse},
        categories::{CategoryList, CreateCategoryRequest, UpdateCategoryRequest},
        orders::{CheckoutItem, CheckoutRequest, OrderList, PrintReceiptResponse},
        products::{CreateProductRequest, ProductList, UpdateProductRequest},
        users::{CreateUserRequest, UpdateUserRequest, UserList},
    },
    models::{
        Cashier, Category, CategorySummary, Order, OrderDetail, OrderItem, OrderStatus,
        PaymentMethod, Product, ProductSummary, User,
    },
    printer::PrintOutcome,
    receipt::{Receipt, ReceiptLine, ReceiptSection, SectionKind},
    response::Meta,
    routes::{analytics, auth, categories, health, orders, params, products, users},
};

struct SecurityAddon;

impl Modify for SecurityAddon {
    fn modify(&self, openapi: &mut openapi::OpenApi) {
        let components = openapi.components.get_or_insert_with(Default::default);
        components.add_security_scheme(
            "bearer_auth",
            SecurityScheme::Http(
                HttpBuilder::new()
                    .scheme(HttpAuthScheme::Bearer)
                    .bearer_format("JWT")
                    .build(),
            ),
        );
    }
}

#[derive(OpenApi)]
#[openapi(
    paths(
        health::health_check,
        auth::login,
        auth::me,
        users::list_users,
        users::create_user,
        users::update_user,
        users::delete_user,
        categories::list_categories,
        categories::get_category,
        categories::create_category,
        categories::update_category,
        categories::delete_category,
        products::list_products,
        products::get_product,
        products::create_product,
        products::update_product,
        products::delete_product,
        orders::checkout,
        orders::list_orders,
        orders::get_order,
        orders::print_receipt,
        orders::cancel_order,
        analytics::dashboard,
        analytics::sales,
        analytics::top_products,
        analytics::payment_methods,
        analytics::categories
    ),
    components(
        schemas(
            User,
            Cashier,
            Category,
            CategorySummary,
            Product,
            ProductSummary,
            Order,
            OrderItem,
            OrderDetail,
            OrderStatus,
            PaymentMethod,
            LoginRequest,
            LoginResponse,
            CreateUserRequest,
            UpdateUserRequest,
            UserList,
            CreateCategoryRequest,
            UpdateCategoryRequest,
            CategoryList,
            CreateProductRequest,
            UpdateProductRequest,
            ProductList,
            CheckoutItem,
            CheckoutRequest,
            OrderList,
            PrintReceiptResponse,
            PrintOutcome,
            Receipt,
            ReceiptSection,
            ReceiptLine,
            SectionKind,
            PeriodStats,
            AllTimeStats,
            DashboardStats,
            SalesPoint,
            TopProduct,
            PaymentMethodStat,
            CategoryRevenue,
            params::Pagination,
            params::SortOrder,
            params::SalesPeriod,
            Meta
        )
    ),
    modifiers(&SecurityAddon),
    tags(
        (name = "Health", description = "Health check endpoint"),
        (name = "Auth", description = "Login and current user"),
        (name = "Users", description = "Staff accounts, admin only"),
        (name = "Categories", description = "Menu categories"),
        (name = "Products", description = "Menu items"),
        (name = "Orders", description = "Checkout, history, receipts and cancellation"),
        (name = "Analytics", description = "Sales reporting, admin only"),
    )
)]
pub struct ApiDoc;

pub fn scalar_docs() -> Scalar<OpenApiSpec> {
    Scalar::with_url("/docs", ApiDoc::openapi())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn document_lists_order_endpoints() {
        let doc = ApiDoc::openapi();
        assert!(doc.paths.paths.contains_key("/api/orders"));
        assert!(doc.paths.paths.contains_key("/api/orders/{id}/print"));
        assert!(doc.paths.paths.contains_key("/api/orders/{id}/cancel"));
    }
}
