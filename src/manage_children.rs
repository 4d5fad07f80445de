use serde_json::json;

use crate::logging;
use crate::services::{
    ensure, expose_pagination, push_to_array, AdminContext, AdminError, AdminService, Child,
    ListQuery, ServiceResult, SessionCheckMode,
};

pub struct ChildController<S: AdminService> {
    service: S,
}

impl<S: AdminService> ChildController<S> {
    pub fn new(service: S) -> Self {
        Self { service }
    }

    pub fn manage_children(&self, ctx: &mut AdminContext) -> ServiceResult<()> {
        self.service.load_labels(ctx, "children")?;

        let can_manage = self.service.allowed_to(ctx, "manage_children");
        let can_view = can_manage || self.service.allowed_to(ctx, "view_children");
        ensure(
            can_view,
            AdminError::PermissionDenied("view_children".into()),
        )?;

        let subaction = self.resolve_subaction(ctx);
        match subaction.as_str() {
            "add" => {
                ensure(
                    can_manage,
                    AdminError::PermissionDenied("manage_children".into()),
                )?;
                self.add_child(ctx)
            }
            "edit" => {
                ensure(
                    can_manage,
                    AdminError::PermissionDenied("manage_children".into()),
                )?;
                self.edit_child(ctx)
            }
            "coins" => {
                ensure(
                    can_manage,
                    AdminError::PermissionDenied("manage_children".into()),
                )?;
                self.adjust_coins(ctx)
            }
            "delete" => {
                ensure(
                    can_manage,
                    AdminError::PermissionDenied("manage_children".into()),
                )?;
                self.delete_child(ctx)
            }
            _ => self.index(ctx),
        }
    }

    fn index(&self, ctx: &mut AdminContext) -> ServiceResult<()> {
        let query = ListQuery::from_request(&ctx.request);
        let page = self.service.list_children(&query)?;
        let mut rows = Vec::with_capacity(page.items.len());
        for child in &page.items {
            let parent_name = match self.service.get_parent(child.parent_id)? {
                Some(parent) => parent.name,
                None => String::new(),
            };
            rows.push(json!({
                "id": child.id,
                "name": child.name,
                "age": child.age,
                "parent_id": child.parent_id,
                "parent_name": parent_name,
                "level_id": child.level_id,
                "coins": child.coins,
            }));
        }
        ctx.context.set("children", rows);
        ctx.context.set("search", query.search.clone());
        expose_pagination(ctx, &page);
        Ok(())
    }

    fn add_child(&self, ctx: &mut AdminContext) -> ServiceResult<()> {
        let mut current = Child::default();
        if ctx.request.contains("save") {
            self.service.check_session(ctx, SessionCheckMode::Post)?;
            let saved = self.service.save_child(self.parse_child_form(ctx, None)?)?;
            logging::log_action(&self.service, ctx, "child_added", json!({"id": saved}))?;
            ctx.context.set("saved_child_id", saved);
            if let Some(latest) = self.service.get_child(saved)? {
                current = latest;
            }
        }
        self.render_child_form(ctx, current, "add")
    }

    fn edit_child(&self, ctx: &mut AdminContext) -> ServiceResult<()> {
        let child_id = ctx
            .request
            .int("child")
            .ok_or_else(|| AdminError::Validation("missing_child".into()))?;
        if ctx.request.contains("save") {
            self.service.check_session(ctx, SessionCheckMode::Post)?;
            let current = self
                .service
                .get_child(child_id)?
                .ok_or_else(|| AdminError::NotFound(format!("child {child_id}")))?;
            let mut payload = self.parse_child_form(ctx, Some(child_id))?;
            payload.coins = current.coins;
            payload.created_at = current.created_at;
            self.service.save_child(payload)?;
            logging::log_action(&self.service, ctx, "child_saved", json!({"id": child_id}))?;
            ctx.context.set("saved_child_id", child_id);
        }
        let details = self
            .service
            .get_child(child_id)?
            .ok_or_else(|| AdminError::NotFound(format!("child {child_id}")))?;
        self.render_child_form(ctx, details, "edit")
    }

    /// Manual coin grants and deductions. The balance itself is never edited
    /// through the child form, only through deltas, so the audit trail keeps
    /// the full history.
    fn adjust_coins(&self, ctx: &mut AdminContext) -> ServiceResult<()> {
        let child_id = ctx
            .request
            .int("child")
            .ok_or_else(|| AdminError::Validation("missing_child".into()))?;
        if ctx.request.contains("save") {
            let delta = ctx.post_vars.int("delta").unwrap_or(0);
            ensure(delta != 0, AdminError::Validation("coins_delta".into()))?;
            self.service.check_session(ctx, SessionCheckMode::Post)?;
            let balance = self.service.adjust_child_coins(child_id, delta)?;
            logging::log_action(
                &self.service,
                ctx,
                "child_coins_adjusted",
                json!({"id": child_id, "delta": delta, "balance": balance}),
            )?;
            ctx.context.set("child_balance", balance);
        }
        let child = self
            .service
            .get_child(child_id)?
            .ok_or_else(|| AdminError::NotFound(format!("child {child_id}")))?;
        ctx.context.set(
            "coin_form",
            json!({"id": child_id, "name": child.name, "coins": child.coins}),
        );
        Ok(())
    }

    fn delete_child(&self, ctx: &mut AdminContext) -> ServiceResult<()> {
        let child_id = ctx
            .request
            .int("child")
            .ok_or_else(|| AdminError::Validation("missing_child".into()))?;
        let child = self
            .service
            .get_child(child_id)?
            .ok_or_else(|| AdminError::NotFound(format!("child {child_id}")))?;
        if !ctx.post_vars.bool("confirm") {
            ctx.context
                .set("confirm_delete", json!({"id": child_id, "name": child.name}));
            return Ok(());
        }
        self.service.check_session(ctx, SessionCheckMode::Post)?;
        self.service.delete_child(child_id)?;
        logging::log_action(
            &self.service,
            ctx,
            "child_deleted",
            json!({"id": child_id, "name": child.name}),
        )?;
        ctx.context.set("deleted_child_id", child_id);
        Ok(())
    }

    fn render_child_form(
        &self,
        ctx: &mut AdminContext,
        child: Child,
        mode: &str,
    ) -> ServiceResult<()> {
        let Child {
            id,
            name,
            age,
            parent_id,
            level_id,
            coins,
            ..
        } = child;
        ctx.context.set("child_mode", mode);
        ctx.context.set(
            "child_form",
            json!({
                "id": id.unwrap_or(0),
                "name": name,
                "age": age,
                "parent_id": parent_id,
                "level_id": level_id,
                "coins": coins,
            }),
        );
        let picker = ListQuery {
            page_size: 100,
            ..ListQuery::default()
        };
        let parents = self.service.list_parents(&picker)?;
        let parent_list: Vec<_> = parents
            .items
            .iter()
            .map(|parent| json!({"id": parent.id, "name": parent.name}))
            .collect();
        ctx.context.set("available_parents", parent_list);
        let levels = self.service.list_levels(&picker)?;
        let level_list: Vec<_> = levels
            .items
            .iter()
            .map(|level| json!({"id": level.id, "name": level.name}))
            .collect();
        ctx.context.set("available_levels", level_list);
        Ok(())
    }

    fn parse_child_form(
        &self,
        ctx: &mut AdminContext,
        child_id: Option<i64>,
    ) -> ServiceResult<Child> {
        let name = ctx
            .post_vars
            .string("name")
            .unwrap_or_default()
            .trim()
            .to_string();
        let age = ctx.post_vars.int("age").unwrap_or(0);
        let parent_id = ctx.post_vars.int("parent").unwrap_or(0);
        let level_id = ctx.post_vars.int("level").filter(|id| *id > 0);

        let mut invalid = Vec::new();
        if name.is_empty() {
            invalid.push("child_name");
        }
        if !(1..=17).contains(&age) {
            invalid.push("child_age");
        }
        if parent_id <= 0 {
            invalid.push("child_parent");
        }
        if let Some(first) = invalid.first().copied() {
            for field in invalid {
                push_to_array(&mut ctx.context, "form_errors", field);
            }
            return Err(AdminError::Validation(first.into()));
        }

        Ok(Child {
            id: child_id,
            name,
            age,
            parent_id,
            level_id,
            coins: 0,
            created_at: None,
        })
    }

    fn resolve_subaction(&self, ctx: &AdminContext) -> String {
        if let Some(sub) = ctx.request.string("sa") {
            match sub.as_str() {
                "index" | "add" | "edit" | "coins" | "delete" => return sub,
                _ => {}
            }
        }
        "index".into()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::InMemoryService;

    fn build_controller() -> (ChildController<InMemoryService>, InMemoryService) {
        let service = InMemoryService::default();
        let controller = ChildController::new(service.clone());
        (controller, service)
    }

    fn manager_ctx() -> AdminContext {
        let mut ctx = AdminContext::default();
        ctx.user_info.permissions.insert("manage_children".into());
        ctx
    }

    #[test]
    fn index_joins_parent_names() {
        let (controller, _service) = build_controller();
        let mut ctx = manager_ctx();
        controller.manage_children(&mut ctx).unwrap();
        let rows = ctx.context.get("children").unwrap().as_array().unwrap().clone();
        assert_eq!(rows.len(), 3);
        assert_eq!(rows[0]["name"], "Emma");
        assert_eq!(rows[0]["parent_name"], "Maria Lopez");
    }

    #[test]
    fn add_child_creates_record() {
        let (controller, service) = build_controller();
        let mut ctx = manager_ctx();
        ctx.request.set("sa", "add");
        ctx.request.set("save", true);
        ctx.post_vars.set("name", "Nora");
        ctx.post_vars.set("age", 9);
        ctx.post_vars.set("parent", 2);
        ctx.post_vars.set("level", 0);
        controller.manage_children(&mut ctx).unwrap();
        let page = service.list_children(&ListQuery::default()).unwrap();
        let added = page.items.iter().find(|child| child.name == "Nora").unwrap();
        assert_eq!(added.parent_id, 2);
        assert_eq!(added.level_id, None);
        assert_eq!(added.coins, 0);
    }

    #[test]
    fn age_outside_range_is_rejected() {
        let (controller, _service) = build_controller();
        let mut ctx = manager_ctx();
        ctx.request.set("sa", "add");
        ctx.request.set("save", true);
        ctx.post_vars.set("name", "Nora");
        ctx.post_vars.set("age", 21);
        ctx.post_vars.set("parent", 1);
        let result = controller.manage_children(&mut ctx);
        assert!(matches!(result, Err(AdminError::Validation(field)) if field == "child_age"));
    }

    #[test]
    fn unknown_parent_is_rejected_by_the_service() {
        let (controller, _service) = build_controller();
        let mut ctx = manager_ctx();
        ctx.request.set("sa", "add");
        ctx.request.set("save", true);
        ctx.post_vars.set("name", "Nora");
        ctx.post_vars.set("age", 9);
        ctx.post_vars.set("parent", 99);
        let result = controller.manage_children(&mut ctx);
        assert!(matches!(result, Err(AdminError::Validation(key)) if key == "unknown_parent"));
    }

    #[test]
    fn coins_subaction_moves_the_balance() {
        let (controller, service) = build_controller();
        let mut ctx = manager_ctx();
        ctx.request.set("sa", "coins");
        ctx.request.set("child", 1);
        ctx.request.set("save", true);
        ctx.post_vars.set("delta", 30);
        controller.manage_children(&mut ctx).unwrap();
        assert_eq!(ctx.context.int("child_balance"), Some(150));
        assert_eq!(service.get_child(1).unwrap().unwrap().coins, 150);
        let log = service.list_audit_log().unwrap();
        assert!(log.iter().any(|entry| entry.action == "child_coins_adjusted"));
    }

    #[test]
    fn balance_never_goes_negative() {
        let (controller, service) = build_controller();
        let mut ctx = manager_ctx();
        ctx.request.set("sa", "coins");
        ctx.request.set("child", 1);
        ctx.request.set("save", true);
        ctx.post_vars.set("delta", -500);
        let result = controller.manage_children(&mut ctx);
        assert!(matches!(result, Err(AdminError::Validation(key)) if key == "coins_negative"));
        assert_eq!(service.get_child(1).unwrap().unwrap().coins, 120);
    }

    #[test]
    fn edit_keeps_the_balance_out_of_the_form() {
        let (controller, service) = build_controller();
        let mut ctx = manager_ctx();
        ctx.request.set("sa", "edit");
        ctx.request.set("child", 2);
        ctx.request.set("save", true);
        ctx.post_vars.set("name", "Lucas M.");
        ctx.post_vars.set("age", 11);
        ctx.post_vars.set("parent", 1);
        ctx.post_vars.set("level", 2);
        controller.manage_children(&mut ctx).unwrap();
        let updated = service.get_child(2).unwrap().unwrap();
        assert_eq!(updated.name, "Lucas M.");
        assert_eq!(updated.coins, 260);
    }

    #[test]
    fn delete_with_confirmation_removes_the_child() {
        let (controller, service) = build_controller();
        let mut ctx = manager_ctx();
        ctx.request.set("sa", "delete");
        ctx.request.set("child", 3);
        ctx.post_vars.set("confirm", true);
        controller.manage_children(&mut ctx).unwrap();
        assert!(service.get_child(3).unwrap().is_none());
    }
}
