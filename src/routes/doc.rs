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
        orders::{CheckoutItem, CheckoutRequest, OrderList, OrderWithItems, TrackedItem, UpdateOrderStatusRequest},
        payments::{CallbackAck, CallbackBody, CallbackEnvelope, InitiatePaymentRequest, InitiatePaymentResponse, StkCallback},
        products,
    },
    models::{Order, OrderStatus, Product, User},
    response::{ApiResponse, Meta},
    routes::{admin, auth, health, orders, params, payments, products as product_routes},
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
        auth::register,
        product_routes::list_products,
        product_routes::create_product,
        product_routes::get_product,
        product_routes::update_product,
        product_routes::delete_product,
        orders::checkout,
        orders::get_order,
        payments::initiate,
        payments::callback,
        admin::list_all_orders,
        admin::get_order_admin,
        admin::update_order_status,
        admin::delete_order
    ),
    components(
        schemas(
            User,
            Product,
            Order,
            OrderStatus,
            CheckoutRequest,
            CheckoutItem,
            TrackedItem,
            UpdateOrderStatusRequest,
            OrderList,
            OrderWithItems,
            InitiatePaymentRequest,
            InitiatePaymentResponse,
            CallbackEnvelope,
            CallbackBody,
            StkCallback,
            CallbackAck,
            params::Pagination,
            params::ProductQuery,
            params::OrderListQuery,
            products::ProductList,
            products::CreateProductRequest,
            products::UpdateProductRequest,
            Meta,
            ApiResponse<Product>,
            ApiResponse<products::ProductList>,
            ApiResponse<OrderWithItems>,
            ApiResponse<OrderList>,
            ApiResponse<InitiatePaymentResponse>
        )
    ),
    security(
        ("bearer_auth" = [])
    ),
    modifiers(&SecurityAddon),
    tags(
        (name = "Health", description = "Health check endpoint"),
        (name = "Products", description = "Product catalog endpoints"),
        (name = "Orders", description = "Checkout and order tracking"),
        (name = "Payments", description = "M-Pesa STK push and callback"),
        (name = "Admin", description = "Admin order management"),
        (name = "Auth", description = "Authentication endpoints"),
    )
)]
pub struct ApiDoc;

pub fn scalar_docs() -> Scalar<OpenApiSpec> {
    Scalar::with_url("/docs", ApiDoc::openapi())
}
