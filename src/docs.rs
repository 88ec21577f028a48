use axum::Router;
use utoipa::openapi::security::{HttpAuthScheme, HttpBuilder, SecurityScheme};
use utoipa::{Modify, OpenApi};
use utoipa_swagger_ui::SwaggerUi;

use crate::{authz, menu, models, routes};

#[derive(OpenApi)]
#[openapi(
	paths(
		routes::health::health,
		routes::menus::menu_tree,
		routes::permissions::check,
		routes::permissions::effective,
		routes::qr_codes::list,
		routes::qr_codes::create,
		routes::qr_codes::get_one,
		routes::qr_codes::update,
		routes::qr_codes::remove,
		routes::short_urls::list,
		routes::short_urls::create,
		routes::short_urls::remove,
	),
	components(
		schemas(
			routes::health::HealthResponse,
			menu::MenuNode,
			authz::Scope,
			authz::PermissionType,
			authz::DecisionSource,
			models::permission::PermissionRecord,
			models::permission::PermissionCheckResponse,
			models::permission::EffectivePermissionsResponse,
			models::qr_code::QrCode,
			models::qr_code::QrCodeCreateRequest,
			models::qr_code::QrCodeUpdateRequest,
			models::short_url::ShortUrl,
			models::short_url::ShortUrlCreateRequest
		)
	),
	modifiers(&SecurityAddon),
	tags(
		(name = "Health", description = "Service health"),
		(name = "Menus", description = "Navigation tree per role"),
		(name = "Permissions", description = "Permission decisions and diagnostics"),
		(name = "QR Codes", description = "QR code management"),
		(name = "Short URLs", description = "Short URL management")
	)
)]
pub struct ApiDoc;

struct SecurityAddon;

impl Modify for SecurityAddon {
	fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
		let components = openapi.components.get_or_insert_with(Default::default);
		components.add_security_scheme(
			"bearerAuth",
			SecurityScheme::Http(
				HttpBuilder::new()
					.scheme(HttpAuthScheme::Bearer)
					.bearer_format("JWT")
					.build(),
			),
		);
	}
}

/// Swagger UI mounted at /docs, serving the derived document.
pub fn swagger_routes() -> Router {
	Router::new().merge(SwaggerUi::new("/docs").url("/api-docs/openapi.json", ApiDoc::openapi()))
}
