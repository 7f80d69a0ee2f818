use super::handlers::{applications, health, notifications, password_reset};
use utoipa::openapi::{
    ComponentsBuilder, Contact, InfoBuilder, License, OpenApiBuilder, Tag,
    security::{HttpAuthScheme, HttpBuilder, SecurityScheme},
};
use utoipa_axum::{router::OpenApiRouter, routes};

const TAGS: [(&str, &str); 6] = [
    ("health", "Liveness and database status"),
    ("password-reset", "One-time code account recovery"),
    ("login", "Candidate sign-in"),
    ("applications", "Candidate submissions"),
    ("notifications", "Per-application notification feed"),
    ("admin", "Application review (bearer token)"),
];

/// The generated `OpenAPI` document, without serving anything.
#[must_use]
pub fn openapi() -> utoipa::openapi::OpenApi {
    let (_router, openapi) = api_router().split_for_parts();
    openapi
}

/// Documented routes. `/` and `OPTIONS /health` are added in `api::app`.
pub(crate) fn api_router() -> OpenApiRouter {
    let mut router = OpenApiRouter::with_openapi(cargo_openapi())
        .routes(routes!(health::health))
        .routes(routes!(password_reset::request_code))
        .routes(routes!(password_reset::resend_code))
        .routes(routes!(password_reset::verify_code))
        .routes(routes!(password_reset::set_new_password))
        .routes(routes!(applications::login))
        .routes(routes!(applications::submit))
        .routes(routes!(applications::list))
        .routes(routes!(applications::detail))
        .routes(routes!(applications::change_status))
        .routes(routes!(notifications::list))
        .routes(routes!(notifications::unread_count))
        .routes(routes!(notifications::mark_all_read))
        .routes(routes!(notifications::mark_read))
        .routes(routes!(notifications::clear));

    router.get_openapi_mut().tags = Some(
        TAGS.iter()
            .map(|(name, description)| {
                let mut tag = Tag::new(*name);
                tag.description = Some((*description).to_string());
                tag
            })
            .collect(),
    );

    router
}

fn cargo_openapi() -> utoipa::openapi::OpenApi {
    let mut info = InfoBuilder::new()
        .title(env!("CARGO_PKG_NAME"))
        .version(env!("CARGO_PKG_VERSION"))
        .description(optional_str(env!("CARGO_PKG_DESCRIPTION")))
        .build();

    info.contact = cargo_contact(env!("CARGO_PKG_AUTHORS"));
    info.license = optional_str(env!("CARGO_PKG_LICENSE")).map(|identifier| {
        let mut license = License::new(identifier);
        license.identifier = Some(identifier.to_string());
        license
    });

    let components = ComponentsBuilder::new()
        .security_scheme(
            "bearer",
            SecurityScheme::Http(HttpBuilder::new().scheme(HttpAuthScheme::Bearer).build()),
        )
        .build();

    OpenApiBuilder::new()
        .info(info)
        .components(Some(components))
        .build()
}

// Cargo authors are `:` or `;` separated, each optionally "Name <email>".
fn cargo_contact(authors: &str) -> Option<Contact> {
    let primary = authors.split([':', ';']).next().map(str::trim)?;
    let (name, email) = match primary.split_once('<') {
        Some((name, email)) => (name.trim(), email.trim_end_matches('>').trim()),
        None => (primary, ""),
    };
    if name.is_empty() && email.is_empty() {
        return None;
    }

    let mut contact = Contact::new();
    contact.name = optional_str(name).map(str::to_string);
    contact.email = optional_str(email).map(str::to_string);
    Some(contact)
}

fn optional_str(value: &str) -> Option<&str> {
    let trimmed = value.trim();
    (!trimmed.is_empty()).then_some(trimmed)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn openapi_info_from_cargo() {
        let doc = openapi();
        assert_eq!(doc.info.title, env!("CARGO_PKG_NAME"));
        assert_eq!(doc.info.version, env!("CARGO_PKG_VERSION"));

        let contact = doc.info.contact;
        assert!(contact.is_some());
        if let Some(contact) = contact {
            assert_eq!(contact.name.as_deref(), Some("Interntrack Team"));
            assert_eq!(contact.email.as_deref(), Some("team@interntrack.dev"));
        }

        assert_eq!(
            doc.info.license.map(|license| license.name),
            Some("BSD-3-Clause".to_string())
        );
    }

    #[test]
    fn openapi_documents_every_route() {
        let doc = openapi();
        for path in [
            "/health",
            "/v1/password-reset/request",
            "/v1/password-reset/resend",
            "/v1/password-reset/verify",
            "/v1/password-reset/reset",
            "/v1/login",
            "/v1/applications",
            "/v1/admin/applications",
            "/v1/admin/applications/{id}",
            "/v1/admin/applications/{id}/status",
            "/v1/admin/applications/{id}/notifications",
            "/v1/applications/{id}/notifications",
            "/v1/applications/{id}/notifications/unread-count",
            "/v1/applications/{id}/notifications/read-all",
            "/v1/notifications/{id}/read",
        ] {
            assert!(doc.paths.paths.contains_key(path), "missing {path}");
        }

        let tags = doc.tags.unwrap_or_default();
        assert!(tags.iter().any(|tag| tag.name == "password-reset"));
        assert!(tags.iter().any(|tag| tag.name == "login"));
        assert!(
            doc.components
                .is_some_and(|components| components.security_schemes.contains_key("bearer"))
        );
    }

    #[test]
    fn contact_parsing() {
        let contact = cargo_contact("Jane Doe <jane@example.com>; Other");
        assert_eq!(
            contact.as_ref().and_then(|c| c.email.as_deref()),
            Some("jane@example.com")
        );
        assert_eq!(
            contact.as_ref().and_then(|c| c.name.as_deref()),
            Some("Jane Doe")
        );

        let contact = cargo_contact("Solo");
        assert_eq!(contact.and_then(|c| c.email), None);

        assert!(cargo_contact("").is_none());
    }
}
