use utoipa::{
    openapi::security::{Http, HttpAuthScheme, SecurityScheme},
    Modify, OpenApi,
};
use utoipa_swagger_ui::SwaggerUi;

/// Registers the `Bearer` scheme referenced by `security(("Bearer" = []))`.
struct BearerAuth;

impl Modify for BearerAuth {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        let components = openapi.components.get_or_insert_with(Default::default);
        components.add_security_scheme(
            "Bearer",
            SecurityScheme::Http(Http::new(HttpAuthScheme::Bearer)),
        );
    }
}

#[derive(OpenApi)]
#[openapi(
    info(
        title = "BOMFlow API",
        version = "1.0.0",
        description = r#"
# BOMFlow API

Bill-of-materials and project management for building projects.

## Features

- **Catalog**: Materials, assemblies with their bills of materials, assembly categories
- **Assembly groups**: Required, choose-one and optional groups with conflict rules
- **Templates**: Reusable assembly selections checked against group rules, with price roll-up
- **Projects**: Client projects priced from a template, with a lifecycle and a timeline
- **Uploads**: Files attached to projects
- **Notifications**: WhatsApp messages to clients with delivery tracking

## Authentication

Log in with `POST /api/v1/auth/login`. Send the returned token as

```
Authorization: Bearer <token>
```

or rely on the session cookie set by the login response.

## Pagination

List endpoints accept `page` (default 1) and `per_page` (default 20, max 100).
        "#,
        license(name = "MIT", url = "https://opensource.org/licenses/MIT")
    ),
    servers(
        (url = "http://localhost:8080", description = "Local development")
    ),
    modifiers(&BearerAuth),
    tags(
        (name = "auth", description = "Sessions and tokens"),
        (name = "users", description = "User administration"),
        (name = "materials", description = "Material catalog"),
        (name = "assembly-categories", description = "Assembly categories"),
        (name = "assemblies", description = "Assemblies and their bills of materials"),
        (name = "assembly-groups", description = "Assembly groups and selection rules"),
        (name = "templates", description = "Templates, rule checks and pricing"),
        (name = "clients", description = "Clients"),
        (name = "projects", description = "Projects, status and pricing"),
        (name = "timelines", description = "Milestones and tasks"),
        (name = "uploads", description = "Project files"),
        (name = "notifications", description = "WhatsApp notifications and webhooks")
    ),
    paths(
        // Auth
        crate::handlers::auth::login,
        crate::handlers::auth::logout,
        crate::handlers::auth::me,
        crate::handlers::auth::change_own_password,

        // Users
        crate::handlers::users::list_users,
        crate::handlers::users::get_user,
        crate::handlers::users::create_user,
        crate::handlers::users::update_user,
        crate::handlers::users::delete_user,
        crate::handlers::users::change_password,

        // Materials
        crate::handlers::materials::list_materials,
        crate::handlers::materials::get_material,
        crate::handlers::materials::create_material,
        crate::handlers::materials::update_material,
        crate::handlers::materials::delete_material,

        // Assembly categories
        crate::handlers::assembly_categories::list_categories,
        crate::handlers::assembly_categories::get_category,
        crate::handlers::assembly_categories::create_category,
        crate::handlers::assembly_categories::update_category,
        crate::handlers::assembly_categories::delete_category,

        // Assemblies
        crate::handlers::assemblies::list_assemblies,
        crate::handlers::assemblies::get_assembly,
        crate::handlers::assemblies::price_assembly,
        crate::handlers::assemblies::create_assembly,
        crate::handlers::assemblies::update_assembly,
        crate::handlers::assemblies::replace_materials,
        crate::handlers::assemblies::upsert_material,
        crate::handlers::assemblies::remove_material,
        crate::handlers::assemblies::delete_assembly,

        // Assembly groups
        crate::handlers::assembly_groups::list_groups,
        crate::handlers::assembly_groups::get_group,
        crate::handlers::assembly_groups::create_group,
        crate::handlers::assembly_groups::update_group,
        crate::handlers::assembly_groups::delete_group,
        crate::handlers::assembly_groups::add_item,
        crate::handlers::assembly_groups::update_item,
        crate::handlers::assembly_groups::remove_item,

        // Templates
        crate::handlers::templates::list_templates,
        crate::handlers::templates::get_template,
        crate::handlers::templates::price_template,
        crate::handlers::templates::material_takeoff,
        crate::handlers::templates::validate_selection,
        crate::handlers::templates::create_template,
        crate::handlers::templates::update_template,
        crate::handlers::templates::duplicate_template,
        crate::handlers::templates::delete_template,

        // Clients
        crate::handlers::clients::list_clients,
        crate::handlers::clients::get_client,
        crate::handlers::clients::client_projects,
        crate::handlers::clients::create_client,
        crate::handlers::clients::update_client,
        crate::handlers::clients::delete_client,

        // Projects
        crate::handlers::projects::list_projects,
        crate::handlers::projects::get_project,
        crate::handlers::projects::price_breakdown,
        crate::handlers::projects::material_takeoff,
        crate::handlers::projects::create_project,
        crate::handlers::projects::update_project,
        crate::handlers::projects::change_status,
        crate::handlers::projects::reprice_project,
        crate::handlers::projects::delete_project,

        // Timelines
        crate::handlers::timelines::get_timeline,
        crate::handlers::timelines::add_milestone,
        crate::handlers::timelines::update_milestone,
        crate::handlers::timelines::delete_milestone,
        crate::handlers::timelines::add_task,
        crate::handlers::timelines::update_task,
        crate::handlers::timelines::delete_task,

        // Uploads
        crate::handlers::uploads::upload_file,
        crate::handlers::uploads::list_uploads,
        crate::handlers::uploads::download_upload,
        crate::handlers::uploads::delete_upload,

        // Notifications
        crate::handlers::notifications::list_notifications,
        crate::handlers::notifications::send_whatsapp,
        crate::handlers::notifications::verify_webhook,
        crate::handlers::notifications::receive_webhook,
    ),
    components(
        schemas(crate::errors::ErrorResponse)
    )
)]
pub struct ApiDocV1;

pub fn swagger_ui() -> SwaggerUi {
    SwaggerUi::new("/docs")
        .url("/api-docs/openapi.json", ApiDocV1::openapi())
        .config(utoipa_swagger_ui::Config::from("/api-docs/openapi.json").try_it_out_enabled(true))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn document_lists_catalog_and_project_paths() {
        let openapi = ApiDocV1::openapi();
        let json = serde_json::to_string(&openapi).unwrap();
        assert!(json.contains("BOMFlow API"));
        assert!(json.contains("/api/v1/templates/validate"));
        assert!(json.contains("/api/v1/projects/{id}/timeline"));
        assert!(json.contains("/api/v1/webhooks/whatsapp"));
    }

    #[test]
    fn bearer_scheme_is_registered() {
        let openapi = ApiDocV1::openapi();
        let components = openapi.components.expect("components");
        assert!(components.security_schemes.contains_key("Bearer"));
    }
}
