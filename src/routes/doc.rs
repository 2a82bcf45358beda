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
        auth::{LoginRequest, RegisterRequest, TokenResponse},
        orders::{CreateOrderRequest, OrderItemCreate},
        payments::{
            CreatePaymentIntentRequest, CreatePaymentIntentResponse, MockConfirmRequest,
            StatusResponse, WebhookAck,
        },
        products::{CreateProductRequest, UpdateProductRequest},
    },
    entity::{OrderStatus, Role},
    error::ErrorBody,
    models::{DownloadLink, Order, OrderItem, Product, User},
    routes::{auth, downloads, health, orders, payments, products},
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
        health::root,
        auth::register,
        auth::login,
        auth::me,
        products::list_products,
        products::get_product,
        products::admin_get_product,
        products::create_product,
        products::update_product,
        products::delete_product,
        products::upload_cover,
        orders::create_order,
        orders::list_orders,
        orders::get_order,
        payments::create_intent,
        payments::mock_confirm,
        payments::webhook,
        downloads::get_download_link
    ),
    components(
        schemas(
            User,
            Role,
            Product,
            Order,
            OrderItem,
            OrderStatus,
            DownloadLink,
            ErrorBody,
            RegisterRequest,
            LoginRequest,
            TokenResponse,
            CreateProductRequest,
            UpdateProductRequest,
            CreateOrderRequest,
            OrderItemCreate,
            CreatePaymentIntentRequest,
            CreatePaymentIntentResponse,
            MockConfirmRequest,
            StatusResponse,
            WebhookAck,
            health::HealthData,
            health::RootMessage
        )
    ),
    modifiers(&SecurityAddon),
    tags(
        (name = "Health", description = "Health check endpoint"),
        (name = "Auth", description = "Authentication endpoints"),
        (name = "Products", description = "Catalog endpoints"),
        (name = "Orders", description = "Order endpoints"),
        (name = "Payments", description = "Payment endpoints"),
        (name = "Downloads", description = "Download endpoints"),
    )
)]
pub struct ApiDoc;

pub fn scalar_docs() -> Scalar<OpenApiSpec> {
    Scalar::with_url("/docs", ApiDoc::openapi())
}
