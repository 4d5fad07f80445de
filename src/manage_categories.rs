use serde_json::json;

use crate::logging;
use crate::services::{
    ensure, expose_pagination, push_to_array, AdminContext, AdminError, AdminService, Category,
    ListQuery, ServiceResult, SessionCheckMode,
};

const DEFAULT_COLOR: &str = "#cccccc";

pub struct CategoryController<S: AdminService> {
    service: S,
}

impl<S: AdminService> CategoryController<S> {
    pub fn new(service: S) -> Self {
        Self { service }
    }

    pub fn manage_categories(&self, ctx: &mut AdminContext) -> ServiceResult<()> {
        self.service.load_labels(ctx, "categories")?;

        let can_manage = self.service.allowed_to(ctx, "manage_categories");
        let can_view = can_manage || self.service.allowed_to(ctx, "view_categories");
        ensure(
            can_view,
            AdminError::PermissionDenied("view_categories".into()),
        )?;

        let subaction = self.resolve_subaction(ctx);
        match subaction.as_str() {
            "add" => {
                ensure(
                    can_manage,
                    AdminError::PermissionDenied("manage_categories".into()),
                )?;
                self.add_category(ctx)
            }
            "edit" => {
                ensure(
                    can_manage,
                    AdminError::PermissionDenied("manage_categories".into()),
                )?;
                self.edit_category(ctx)
            }
            "delete" => {
                ensure(
                    can_manage,
                    AdminError::PermissionDenied("manage_categories".into()),
                )?;
                self.delete_category(ctx)
            }
            _ => self.index(ctx),
        }
    }

    fn index(&self, ctx: &mut AdminContext) -> ServiceResult<()> {
        let query = ListQuery::from_request(&ctx.request);
        let page = self.service.list_categories(&query)?;
        let rows: Vec<_> = page
            .items
            .iter()
            .map(|category| {
                json!({
                    "id": category.id,
                    "name": category.name,
                    "color": category.color,
                    "position": category.position,
                })
            })
            .collect();
        ctx.context.set("categories", rows);
        ctx.context.set("search", query.search.clone());
        expose_pagination(ctx, &page);
        Ok(())
    }

    fn add_category(&self, ctx: &mut AdminContext) -> ServiceResult<()> {
        let mut current = Category::default();
        if ctx.request.contains("save") {
            self.service.check_session(ctx, SessionCheckMode::Post)?;
            let saved = self
                .service
                .save_category(self.parse_category_form(ctx, None)?)?;
            logging::log_action(&self.service, ctx, "category_added", json!({"id": saved}))?;
            ctx.context.set("saved_category_id", saved);
            if let Some(latest) = self.service.get_category(saved)? {
                current = latest;
            }
        }
        self.render_category_form(ctx, current, "add")
    }

    fn edit_category(&self, ctx: &mut AdminContext) -> ServiceResult<()> {
        let category_id = ctx
            .request
            .int("category")
            .ok_or_else(|| AdminError::Validation("missing_category".into()))?;
        if ctx.request.contains("save") {
            self.service.check_session(ctx, SessionCheckMode::Post)?;
            let current = self
                .service
                .get_category(category_id)?
                .ok_or_else(|| AdminError::NotFound(format!("category {category_id}")))?;
            let mut payload = self.parse_category_form(ctx, Some(category_id))?;
            payload.created_at = current.created_at;
            self.service.save_category(payload)?;
            logging::log_action(
                &self.service,
                ctx,
                "category_saved",
                json!({"id": category_id}),
            )?;
            ctx.context.set("saved_category_id", category_id);
        }
        let details = self
            .service
            .get_category(category_id)?
            .ok_or_else(|| AdminError::NotFound(format!("category {category_id}")))?;
        self.render_category_form(ctx, details, "edit")
    }

    fn delete_category(&self, ctx: &mut AdminContext) -> ServiceResult<()> {
        let category_id = ctx
            .request
            .int("category")
            .ok_or_else(|| AdminError::Validation("missing_category".into()))?;
        let category = self
            .service
            .get_category(category_id)?
            .ok_or_else(|| AdminError::NotFound(format!("category {category_id}")))?;
        if !ctx.post_vars.bool("confirm") {
            ctx.context.set(
                "confirm_delete",
                json!({"id": category_id, "name": category.name}),
            );
            return Ok(());
        }
        self.service.check_session(ctx, SessionCheckMode::Post)?;
        self.service.delete_category(category_id)?;
        logging::log_action(
            &self.service,
            ctx,
            "category_deleted",
            json!({"id": category_id, "name": category.name}),
        )?;
        ctx.context.set("deleted_category_id", category_id);
        Ok(())
    }

    fn render_category_form(
        &self,
        ctx: &mut AdminContext,
        category: Category,
        mode: &str,
    ) -> ServiceResult<()> {
        let Category {
            id,
            name,
            color,
            position,
            ..
        } = category;
        ctx.context.set("category_mode", mode);
        ctx.context.set(
            "category_form",
            json!({
                "id": id.unwrap_or(0),
                "name": name,
                "color": color,
                "position": position,
            }),
        );
        Ok(())
    }

    fn parse_category_form(
        &self,
        ctx: &mut AdminContext,
        category_id: Option<i64>,
    ) -> ServiceResult<Category> {
        let name = ctx
            .post_vars
            .string("name")
            .unwrap_or_default()
            .trim()
            .to_string();
        // A cleared color field falls back to the default badge color.
        let mut color = ctx
            .post_vars
            .string("color")
            .unwrap_or_default()
            .trim()
            .to_lowercase();
        if color.is_empty() {
            color = DEFAULT_COLOR.into();
        }
        let position = ctx.post_vars.int("position").unwrap_or(0);

        let mut invalid = Vec::new();
        if name.is_empty() {
            invalid.push("category_name");
        }
        if !is_hex_color(&color) {
            invalid.push("category_color");
        }
        if position < 0 {
            invalid.push("category_position");
        }
        if let Some(first) = invalid.first().copied() {
            for field in invalid {
                push_to_array(&mut ctx.context, "form_errors", field);
            }
            return Err(AdminError::Validation(first.into()));
        }

        Ok(Category {
            id: category_id,
            name,
            color,
            position,
            created_at: None,
        })
    }

    fn resolve_subaction(&self, ctx: &AdminContext) -> String {
        if let Some(sub) = ctx.request.string("sa") {
            match sub.as_str() {
                "index" | "add" | "edit" | "delete" => return sub,
                _ => {}
            }
        }
        "index".into()
    }
}

fn is_hex_color(value: &str) -> bool {
    match value.strip_prefix('#') {
        Some(digits) => digits.len() == 6 && digits.chars().all(|c| c.is_ascii_hexdigit()),
        None => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::InMemoryService;

    fn build_controller() -> (CategoryController<InMemoryService>, InMemoryService) {
        let service = InMemoryService::default();
        let controller = CategoryController::new(service.clone());
        (controller, service)
    }

    fn manager_ctx() -> AdminContext {
        let mut ctx = AdminContext::default();
        ctx.user_info.permissions.insert("manage_categories".into());
        ctx
    }

    #[test]
    fn index_lists_categories_with_pagination() {
        let (controller, _service) = build_controller();
        let mut ctx = AdminContext::default();
        ctx.user_info.permissions.insert("view_categories".into());
        controller.manage_categories(&mut ctx).unwrap();
        let rows = ctx.context.get("categories").unwrap();
        assert_eq!(rows.as_array().unwrap().len(), 3);
        assert_eq!(ctx.context.int("page_count"), Some(1));
        assert!(ctx.context.get("page_links").is_some());
    }

    #[test]
    fn search_narrows_the_listing() {
        let (controller, _service) = build_controller();
        let mut ctx = manager_ctx();
        ctx.request.set("search", "home");
        controller.manage_categories(&mut ctx).unwrap();
        let rows = ctx.context.get("categories").unwrap().as_array().unwrap().clone();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0]["name"], "Homework");
    }

    #[test]
    fn add_category_creates_record() {
        let (controller, service) = build_controller();
        let mut ctx = manager_ctx();
        ctx.request.set("sa", "add");
        ctx.request.set("save", true);
        ctx.post_vars.set("name", "Outdoors");
        ctx.post_vars.set("color", "#AABB00");
        ctx.post_vars.set("position", 4);
        controller.manage_categories(&mut ctx).unwrap();
        let page = service.list_categories(&ListQuery::default()).unwrap();
        let added = page
            .items
            .iter()
            .find(|category| category.name == "Outdoors")
            .unwrap();
        assert_eq!(added.color, "#aabb00");
        assert!(ctx.context.int("saved_category_id").is_some());
    }

    #[test]
    fn blank_color_falls_back_to_the_default() {
        let (controller, service) = build_controller();
        let mut ctx = manager_ctx();
        ctx.request.set("sa", "add");
        ctx.request.set("save", true);
        ctx.post_vars.set("name", "Music");
        ctx.post_vars.set("color", "  ");
        ctx.post_vars.set("position", 5);
        controller.manage_categories(&mut ctx).unwrap();
        let id = ctx.context.int("saved_category_id").unwrap();
        assert_eq!(service.get_category(id).unwrap().unwrap().color, DEFAULT_COLOR);
    }

    #[test]
    fn malformed_color_is_rejected() {
        let (controller, service) = build_controller();
        let mut ctx = manager_ctx();
        ctx.request.set("sa", "add");
        ctx.request.set("save", true);
        ctx.post_vars.set("name", "Outdoors");
        ctx.post_vars.set("color", "green");
        let result = controller.manage_categories(&mut ctx);
        assert!(matches!(result, Err(AdminError::Validation(field)) if field == "category_color"));
        let errors = ctx.context.get("form_errors").unwrap().as_array().unwrap().clone();
        assert_eq!(errors, vec![json!("category_color")]);
        assert_eq!(service.list_categories(&ListQuery::default()).unwrap().count, 3);
    }

    #[test]
    fn edit_keeps_the_creation_time() {
        let (controller, service) = build_controller();
        let before = service.get_category(1).unwrap().unwrap();
        let mut ctx = manager_ctx();
        ctx.request.set("sa", "edit");
        ctx.request.set("category", 1);
        ctx.request.set("save", true);
        ctx.post_vars.set("name", "Morning chores");
        ctx.post_vars.set("color", "#ffb703");
        ctx.post_vars.set("position", 1);
        controller.manage_categories(&mut ctx).unwrap();
        let updated = service.get_category(1).unwrap().unwrap();
        assert_eq!(updated.name, "Morning chores");
        assert_eq!(updated.created_at, before.created_at);
    }

    #[test]
    fn delete_asks_for_confirmation_first() {
        let (controller, service) = build_controller();
        let mut ctx = manager_ctx();
        ctx.request.set("sa", "delete");
        ctx.request.set("category", 2);
        controller.manage_categories(&mut ctx).unwrap();
        assert!(ctx.context.get("confirm_delete").is_some());
        assert!(service.get_category(2).unwrap().is_some());
    }

    #[test]
    fn confirmed_delete_fails_while_tasks_reference_it() {
        let (controller, service) = build_controller();
        let mut ctx = manager_ctx();
        ctx.request.set("sa", "delete");
        ctx.request.set("category", 1);
        ctx.post_vars.set("confirm", true);
        let result = controller.manage_categories(&mut ctx);
        assert!(matches!(result, Err(AdminError::Validation(key)) if key == "category_in_use"));
        assert!(service.get_category(1).unwrap().is_some());
    }

    #[test]
    fn confirmed_delete_removes_unused_category() {
        let (controller, service) = build_controller();
        let id = service
            .save_category(Category {
                name: "Seasonal".into(),
                color: "#101010".into(),
                position: 9,
                ..Category::default()
            })
            .unwrap();
        let mut ctx = manager_ctx();
        ctx.request.set("sa", "delete");
        ctx.request.set("category", id);
        ctx.post_vars.set("confirm", true);
        controller.manage_categories(&mut ctx).unwrap();
        assert!(service.get_category(id).unwrap().is_none());
        let log = service.list_audit_log().unwrap();
        assert!(log.iter().any(|entry| entry.action == "category_deleted"));
    }

    #[test]
    fn viewer_cannot_reach_mutating_subactions() {
        let (controller, _service) = build_controller();
        let mut ctx = AdminContext::default();
        ctx.user_info.permissions.insert("view_categories".into());
        ctx.request.set("sa", "add");
        let result = controller.manage_categories(&mut ctx);
        assert!(matches!(result, Err(AdminError::PermissionDenied(_))));
    }
}
