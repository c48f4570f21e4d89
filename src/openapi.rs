use utoipa::OpenApi;

use crate::{entities, errors, handlers};

#[derive(OpenApi)]
#[openapi(
    info(
        title = "Gadget Commerce API",
        version = "1.0.0",
        description = "Checkout, payment confirmation, and stock reconciliation for the gadget storefront."
    ),
    servers(
        (url = "http://localhost:8080/api/v1", description = "Local development")
    ),
    paths(
        handlers::cart::get_cart,
        handlers::cart::add_item,
        handlers::cart::update_item,
        handlers::cart::remove_item,
        handlers::cart::clear_cart,
        handlers::checkout::begin_checkout,
        handlers::payments::payment_callback,
        handlers::orders::get_order,
        handlers::orders::bulk_update_status,
        handlers::orders::export_orders,
    ),
    components(schemas(
        errors::ErrorResponse,
        errors::ShortageLine,
        entities::order::OrderStatus,
        entities::order::PaymentStatus,
        handlers::cart::AddItemRequest,
        handlers::cart::UpdateItemRequest,
        handlers::cart::CartLineView,
        handlers::cart::CartView,
        handlers::checkout::CheckoutRequest,
        handlers::checkout::CheckoutResponse,
        handlers::payments::PaymentCallback,
        handlers::payments::PaymentCallbackResponse,
        handlers::orders::OrderView,
        handlers::orders::BulkStatusRequest,
        handlers::orders::BulkStatusResponse,
    ))
)]
pub struct ApiDoc;
