use utoipa::openapi::security::{HttpAuthScheme, HttpBuilder, SecurityScheme};
use utoipa::{Modify, OpenApi};
use utoipa_swagger_ui::SwaggerUi;

use crate::auth::Capability;
use crate::errors::ErrorResponse;
use crate::handlers::admin::{
    AssetResponse, BulkDeleteRequest, BulkResult, BulkStatusRequest, DashboardResponse,
    DeleteAssetRequest,
};
use crate::handlers::auth::{LoginResponse, UserResponse};
use crate::handlers::catalog::{
    BookDetailResponse, BookSummary, CategoryBooksResponse, CategoryResponse, ReviewResponse,
};
use crate::handlers::common::ApiMessage;
use crate::handlers::orders::{
    OrderLineResponse, OrderResponse, OrderViewResponse, PurchaseRequest, PurchaseResponse,
    TransactionResponse,
};
use crate::handlers::reviews::OwnReviewResponse;
use crate::services::accounts::{LoginInput, RegisterInput, UpdateProfileInput};
use crate::services::admin::{
    AdminUpdateUserInput, CategoryBookCount, CreateBookInput, CreateCategoryInput,
    UpdateBookInput, UpdateCategoryInput, UpdateOrderStatusInput,
};
use crate::services::reviews::AddReviewInput;

#[derive(OpenApi)]
#[openapi(
    paths(
        crate::handlers::auth::register,
        crate::handlers::auth::login,
        crate::handlers::auth::logout,
        crate::handlers::auth::me,
        crate::handlers::auth::get_profile,
        crate::handlers::auth::update_profile,
        crate::handlers::catalog::new_books,
        crate::handlers::catalog::root_categories,
        crate::handlers::catalog::category_books,
        crate::handlers::catalog::book_detail,
        crate::handlers::catalog::search,
        crate::handlers::reviews::book_reviews,
        crate::handlers::reviews::add_review,
        crate::handlers::orders::buy_book,
        crate::handlers::orders::download,
        crate::handlers::orders::my_orders,
        crate::handlers::orders::order_detail,
        crate::handlers::orders::my_purchases,
        crate::handlers::admin::dashboard,
        crate::handlers::admin::list_books,
        crate::handlers::admin::create_book,
        crate::handlers::admin::update_book,
        crate::handlers::admin::delete_book,
        crate::handlers::admin::bulk_status,
        crate::handlers::admin::bulk_delete,
        crate::handlers::admin::list_categories,
        crate::handlers::admin::create_category,
        crate::handlers::admin::update_category,
        crate::handlers::admin::eligible_parents,
        crate::handlers::admin::delete_category,
        crate::handlers::admin::list_users,
        crate::handlers::admin::update_user,
        crate::handlers::admin::toggle_ban,
        crate::handlers::admin::list_orders,
        crate::handlers::admin::order_detail,
        crate::handlers::admin::update_order_status,
        crate::handlers::admin::list_reviews,
        crate::handlers::admin::toggle_review,
        crate::handlers::admin::upload_asset,
        crate::handlers::admin::delete_asset,
    ),
    components(schemas(
        ErrorResponse,
        ApiMessage,
        Capability,
        RegisterInput,
        LoginInput,
        UpdateProfileInput,
        UserResponse,
        LoginResponse,
        BookSummary,
        CategoryResponse,
        ReviewResponse,
        CategoryBooksResponse,
        BookDetailResponse,
        OwnReviewResponse,
        AddReviewInput,
        PurchaseRequest,
        PurchaseResponse,
        OrderResponse,
        OrderLineResponse,
        TransactionResponse,
        OrderViewResponse,
        CreateBookInput,
        UpdateBookInput,
        CreateCategoryInput,
        UpdateCategoryInput,
        AdminUpdateUserInput,
        UpdateOrderStatusInput,
        BulkStatusRequest,
        BulkDeleteRequest,
        BulkResult,
        AssetResponse,
        DeleteAssetRequest,
        DashboardResponse,
        CategoryBookCount,
    )),
    modifiers(&SecurityAddon),
    tags(
        (name = "auth", description = "Registration, login and identity"),
        (name = "profile", description = "Own account management"),
        (name = "catalog", description = "Public book and category browsing"),
        (name = "reviews", description = "Book reviews"),
        (name = "orders", description = "Checkout, order history and downloads"),
        (name = "admin", description = "Back-office operations")
    ),
    info(
        title = "Bookshelf API",
        description = "Digital bookstore backend: catalog, checkout, downloads and back office"
    )
)]
pub struct ApiDoc;

struct SecurityAddon;

impl Modify for SecurityAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = openapi.components.as_mut() {
            components.add_security_scheme(
                "bearer_token",
                SecurityScheme::Http(
                    HttpBuilder::new()
                        .scheme(HttpAuthScheme::Bearer)
                        .bearer_format("JWT")
                        .build(),
                ),
            );
        }
    }
}

/// Swagger UI mounted at `/docs`, spec at `/api-docs/openapi.json`.
pub fn swagger_ui() -> SwaggerUi {
    SwaggerUi::new("/docs").url("/api-docs/openapi.json", ApiDoc::openapi())
}
