use std::collections::HashMap;

use serde_json::json;

use crate::logging;
use crate::services::{
    ensure, expose_pagination, push_to_array, AdminContext, AdminError, AdminService, ListQuery,
    Parent, ServiceResult, SessionCheckMode,
};

pub struct ParentController<S: AdminService> {
    service: S,
}

impl<S: AdminService> ParentController<S> {
    pub fn new(service: S) -> Self {
        Self { service }
    }

    pub fn manage_parents(&self, ctx: &mut AdminContext) -> ServiceResult<()> {
        self.service.load_labels(ctx, "parents")?;

        let can_manage = self.service.allowed_to(ctx, "manage_parents");
        let can_view = can_manage || self.service.allowed_to(ctx, "view_parents");
        ensure(can_view, AdminError::PermissionDenied("view_parents".into()))?;

        let subaction = self.resolve_subaction(ctx);
        match subaction.as_str() {
            "add" => {
                ensure(
                    can_manage,
                    AdminError::PermissionDenied("manage_parents".into()),
                )?;
                self.add_parent(ctx)
            }
            "edit" => {
                ensure(
                    can_manage,
                    AdminError::PermissionDenied("manage_parents".into()),
                )?;
                self.edit_parent(ctx)
            }
            "children" => self.family_roster(ctx),
            "delete" => {
                ensure(
                    can_manage,
                    AdminError::PermissionDenied("manage_parents".into()),
                )?;
                self.delete_parent(ctx)
            }
            _ => self.index(ctx),
        }
    }

    fn index(&self, ctx: &mut AdminContext) -> ServiceResult<()> {
        let query = ListQuery::from_request(&ctx.request);
        let page = self.service.list_parents(&query)?;
        let plan_names = self.plan_names()?;
        let rows: Vec<_> = page
            .items
            .iter()
            .map(|parent| {
                json!({
                    "id": parent.id,
                    "name": parent.name,
                    "email": parent.email,
                    "phone": parent.phone,
                    "plan_id": parent.plan_id,
                    "plan_name": parent
                        .plan_id
                        .and_then(|id| plan_names.get(&id))
                        .cloned(),
                })
            })
            .collect();
        ctx.context.set("parents", rows);
        ctx.context.set("search", query.search.clone());
        expose_pagination(ctx, &page);
        Ok(())
    }

    fn add_parent(&self, ctx: &mut AdminContext) -> ServiceResult<()> {
        let mut current = Parent::default();
        if ctx.request.contains("save") {
            self.service.check_session(ctx, SessionCheckMode::Post)?;
            let saved = self
                .service
                .save_parent(self.parse_parent_form(ctx, None)?)?;
            logging::log_action(&self.service, ctx, "parent_added", json!({"id": saved}))?;
            ctx.context.set("saved_parent_id", saved);
            if let Some(latest) = self.service.get_parent(saved)? {
                current = latest;
            }
        }
        self.render_parent_form(ctx, current, "add")
    }

    fn edit_parent(&self, ctx: &mut AdminContext) -> ServiceResult<()> {
        let parent_id = ctx
            .request
            .int("parent")
            .ok_or_else(|| AdminError::Validation("missing_parent".into()))?;
        if ctx.request.contains("save") {
            self.service.check_session(ctx, SessionCheckMode::Post)?;
            let current = self
                .service
                .get_parent(parent_id)?
                .ok_or_else(|| AdminError::NotFound(format!("parent {parent_id}")))?;
            let mut payload = self.parse_parent_form(ctx, Some(parent_id))?;
            payload.created_at = current.created_at;
            self.service.save_parent(payload)?;
            logging::log_action(&self.service, ctx, "parent_saved", json!({"id": parent_id}))?;
            ctx.context.set("saved_parent_id", parent_id);
        }
        let details = self
            .service
            .get_parent(parent_id)?
            .ok_or_else(|| AdminError::NotFound(format!("parent {parent_id}")))?;
        self.render_parent_form(ctx, details, "edit")
    }

    /// Read-only roster of one family's children. Children are edited on
    /// their own screen.
    fn family_roster(&self, ctx: &mut AdminContext) -> ServiceResult<()> {
        let parent_id = ctx
            .request
            .int("parent")
            .ok_or_else(|| AdminError::Validation("missing_parent".into()))?;
        let parent = self
            .service
            .get_parent(parent_id)?
            .ok_or_else(|| AdminError::NotFound(format!("parent {parent_id}")))?;
        let children = self.service.children_of_parent(parent_id)?;
        let roster: Vec<_> = children
            .iter()
            .map(|child| {
                json!({
                    "id": child.id,
                    "name": child.name,
                    "age": child.age,
                    "coins": child.coins,
                })
            })
            .collect();
        ctx.context.set("parent", &parent);
        ctx.context.set("parent_children", roster);
        ctx.context.set("parent_id", parent_id);
        Ok(())
    }

    fn delete_parent(&self, ctx: &mut AdminContext) -> ServiceResult<()> {
        let parent_id = ctx
            .request
            .int("parent")
            .ok_or_else(|| AdminError::Validation("missing_parent".into()))?;
        let parent = self
            .service
            .get_parent(parent_id)?
            .ok_or_else(|| AdminError::NotFound(format!("parent {parent_id}")))?;
        if !ctx.post_vars.bool("confirm") {
            ctx.context.set(
                "confirm_delete",
                json!({"id": parent_id, "name": parent.name}),
            );
            return Ok(());
        }
        self.service.check_session(ctx, SessionCheckMode::Post)?;
        self.service.delete_parent(parent_id)?;
        logging::log_action(
            &self.service,
            ctx,
            "parent_deleted",
            json!({"id": parent_id, "name": parent.name}),
        )?;
        ctx.context.set("deleted_parent_id", parent_id);
        Ok(())
    }

    fn render_parent_form(
        &self,
        ctx: &mut AdminContext,
        parent: Parent,
        mode: &str,
    ) -> ServiceResult<()> {
        let Parent {
            id,
            name,
            email,
            phone,
            plan_id,
            ..
        } = parent;
        ctx.context.set("parent_mode", mode);
        ctx.context.set(
            "parent_form",
            json!({
                "id": id.unwrap_or(0),
                "name": name,
                "email": email,
                "phone": phone,
                "plan_id": plan_id,
            }),
        );
        let picker = ListQuery {
            page_size: 100,
            ..ListQuery::default()
        };
        let plans = self.service.list_plans(&picker)?;
        let plan_list: Vec<_> = plans
            .items
            .iter()
            .map(|plan| json!({"id": plan.id, "name": plan.name, "active": plan.active}))
            .collect();
        ctx.context.set("available_plans", plan_list);
        Ok(())
    }

    fn parse_parent_form(
        &self,
        ctx: &mut AdminContext,
        parent_id: Option<i64>,
    ) -> ServiceResult<Parent> {
        let name = ctx
            .post_vars
            .string("name")
            .unwrap_or_default()
            .trim()
            .to_string();
        let email = ctx
            .post_vars
            .string("email")
            .unwrap_or_default()
            .trim()
            .to_lowercase();
        let phone = ctx
            .post_vars
            .string("phone")
            .unwrap_or_default()
            .trim()
            .to_string();
        let plan_id = ctx.post_vars.int("plan").filter(|id| *id > 0);

        let mut invalid = Vec::new();
        if name.is_empty() {
            invalid.push("parent_name");
        }
        if !is_plausible_email(&email) {
            invalid.push("parent_email");
        }
        if let Some(first) = invalid.first().copied() {
            for field in invalid {
                push_to_array(&mut ctx.context, "form_errors", field);
            }
            return Err(AdminError::Validation(first.into()));
        }

        Ok(Parent {
            id: parent_id,
            name,
            email,
            phone,
            plan_id,
            created_at: None,
        })
    }

    fn plan_names(&self) -> ServiceResult<HashMap<i64, String>> {
        let picker = ListQuery {
            page_size: 100,
            ..ListQuery::default()
        };
        let plans = self.service.list_plans(&picker)?;
        Ok(plans
            .items
            .into_iter()
            .filter_map(|plan| plan.id.map(|id| (id, plan.name)))
            .collect())
    }

    fn resolve_subaction(&self, ctx: &AdminContext) -> String {
        if let Some(sub) = ctx.request.string("sa") {
            match sub.as_str() {
                "index" | "add" | "edit" | "children" | "delete" => return sub,
                _ => {}
            }
        }
        "index".into()
    }
}

fn is_plausible_email(value: &str) -> bool {
    match value.split_once('@') {
        Some((local, domain)) => !local.is_empty() && domain.contains('.'),
        None => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::InMemoryService;

    fn build_controller() -> (ParentController<InMemoryService>, InMemoryService) {
        let service = InMemoryService::default();
        let controller = ParentController::new(service.clone());
        (controller, service)
    }

    fn manager_ctx() -> AdminContext {
        let mut ctx = AdminContext::default();
        ctx.user_info.permissions.insert("manage_parents".into());
        ctx
    }

    #[test]
    fn index_lists_parents_with_plan_names() {
        let (controller, _service) = build_controller();
        let mut ctx = manager_ctx();
        controller.manage_parents(&mut ctx).unwrap();
        let rows = ctx.context.get("parents").unwrap().as_array().unwrap().clone();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[1]["name"], "Maria Lopez");
        assert_eq!(rows[1]["plan_name"], "Family Monthly");
        assert_eq!(rows[0]["plan_name"], serde_json::Value::Null);
    }

    #[test]
    fn add_parent_rejects_bad_email() {
        let (controller, _service) = build_controller();
        let mut ctx = manager_ctx();
        ctx.request.set("sa", "add");
        ctx.request.set("save", true);
        ctx.post_vars.set("name", "Jo Field");
        ctx.post_vars.set("email", "jo.field");
        let result = controller.manage_parents(&mut ctx);
        assert!(matches!(result, Err(AdminError::Validation(field)) if field == "parent_email"));
    }

    #[test]
    fn add_parent_creates_record() {
        let (controller, service) = build_controller();
        let mut ctx = manager_ctx();
        ctx.request.set("sa", "add");
        ctx.request.set("save", true);
        ctx.post_vars.set("name", "Jo Field");
        ctx.post_vars.set("email", "Jo.Field@Example.com");
        ctx.post_vars.set("phone", "+34 600 000 111");
        ctx.post_vars.set("plan", 1);
        controller.manage_parents(&mut ctx).unwrap();
        let page = service.list_parents(&ListQuery::default()).unwrap();
        let added = page
            .items
            .iter()
            .find(|parent| parent.name == "Jo Field")
            .unwrap();
        assert_eq!(added.email, "jo.field@example.com");
        assert_eq!(added.plan_id, Some(1));
    }

    #[test]
    fn family_roster_lists_children() {
        let (controller, _service) = build_controller();
        let mut ctx = AdminContext::default();
        ctx.user_info.permissions.insert("view_parents".into());
        ctx.request.set("sa", "children");
        ctx.request.set("parent", 1);
        controller.manage_parents(&mut ctx).unwrap();
        let roster = ctx
            .context
            .get("parent_children")
            .unwrap()
            .as_array()
            .unwrap()
            .clone();
        assert_eq!(roster.len(), 2);
        assert!(roster.iter().any(|row| row["name"] == "Emma"));
    }

    #[test]
    fn delete_is_blocked_while_children_exist() {
        let (controller, service) = build_controller();
        let mut ctx = manager_ctx();
        ctx.request.set("sa", "delete");
        ctx.request.set("parent", 1);
        ctx.post_vars.set("confirm", true);
        let result = controller.manage_parents(&mut ctx);
        assert!(
            matches!(result, Err(AdminError::Validation(key)) if key == "parent_has_children")
        );
        assert!(service.get_parent(1).unwrap().is_some());
    }

    #[test]
    fn childless_parent_can_be_deleted() {
        let (controller, service) = build_controller();
        let id = service
            .save_parent(Parent {
                name: "Sam Short".into(),
                email: "sam@example.com".into(),
                ..Parent::default()
            })
            .unwrap();
        let mut ctx = manager_ctx();
        ctx.request.set("sa", "delete");
        ctx.request.set("parent", id);
        ctx.post_vars.set("confirm", true);
        controller.manage_parents(&mut ctx).unwrap();
        assert!(service.get_parent(id).unwrap().is_none());
    }

    #[test]
    fn unknown_plan_is_rejected_by_the_service() {
        let (controller, _service) = build_controller();
        let mut ctx = manager_ctx();
        ctx.request.set("sa", "add");
        ctx.request.set("save", true);
        ctx.post_vars.set("name", "Jo Field");
        ctx.post_vars.set("email", "jo@example.com");
        ctx.post_vars.set("plan", 42);
        let result = controller.manage_parents(&mut ctx);
        assert!(matches!(result, Err(AdminError::Validation(key)) if key == "unknown_plan"));
    }
}
