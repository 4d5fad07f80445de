use serde_json::json;

use crate::logging;
use crate::services::{
    ensure, expose_pagination, push_to_array, AdminContext, AdminError, AdminService, ListQuery,
    Plan, ServiceResult, SessionCheckMode,
};

pub struct PlanController<S: AdminService> {
    service: S,
}

impl<S: AdminService> PlanController<S> {
    pub fn new(service: S) -> Self {
        Self { service }
    }

    pub fn manage_plans(&self, ctx: &mut AdminContext) -> ServiceResult<()> {
        self.service.load_labels(ctx, "plans")?;

        let can_manage = self.service.allowed_to(ctx, "manage_plans");
        let can_view = can_manage || self.service.allowed_to(ctx, "view_plans");
        ensure(can_view, AdminError::PermissionDenied("view_plans".into()))?;

        let subaction = self.resolve_subaction(ctx);
        match subaction.as_str() {
            "add" => {
                ensure(
                    can_manage,
                    AdminError::PermissionDenied("manage_plans".into()),
                )?;
                self.add_plan(ctx)
            }
            "edit" => {
                ensure(
                    can_manage,
                    AdminError::PermissionDenied("manage_plans".into()),
                )?;
                self.edit_plan(ctx)
            }
            "activate" => {
                ensure(
                    can_manage,
                    AdminError::PermissionDenied("manage_plans".into()),
                )?;
                self.set_active(ctx)
            }
            "delete" => {
                ensure(
                    can_manage,
                    AdminError::PermissionDenied("manage_plans".into()),
                )?;
                self.delete_plan(ctx)
            }
            _ => self.index(ctx),
        }
    }

    fn index(&self, ctx: &mut AdminContext) -> ServiceResult<()> {
        let query = ListQuery::from_request(&ctx.request);
        let page = self.service.list_plans(&query)?;
        let rows: Vec<_> = page
            .items
            .iter()
            .map(|plan| {
                json!({
                    "id": plan.id,
                    "name": plan.name,
                    "price_cents": plan.price_cents,
                    "duration_days": plan.duration_days,
                    "active": plan.active,
                })
            })
            .collect();
        ctx.context.set("plans", rows);
        ctx.context.set("search", query.search.clone());
        expose_pagination(ctx, &page);
        Ok(())
    }

    fn add_plan(&self, ctx: &mut AdminContext) -> ServiceResult<()> {
        let mut current = Plan {
            duration_days: 30,
            active: true,
            ..Plan::default()
        };
        if ctx.request.contains("save") {
            self.service.check_session(ctx, SessionCheckMode::Post)?;
            let saved = self.service.save_plan(self.parse_plan_form(ctx, None)?)?;
            logging::log_action(&self.service, ctx, "plan_added", json!({"id": saved}))?;
            ctx.context.set("saved_plan_id", saved);
            if let Some(latest) = self.service.get_plan(saved)? {
                current = latest;
            }
        }
        self.render_plan_form(ctx, current, "add")
    }

    fn edit_plan(&self, ctx: &mut AdminContext) -> ServiceResult<()> {
        let plan_id = ctx
            .request
            .int("plan")
            .ok_or_else(|| AdminError::Validation("missing_plan".into()))?;
        if ctx.request.contains("save") {
            self.service.check_session(ctx, SessionCheckMode::Post)?;
            let payload = self.parse_plan_form(ctx, Some(plan_id))?;
            self.service.save_plan(payload)?;
            logging::log_action(&self.service, ctx, "plan_saved", json!({"id": plan_id}))?;
            ctx.context.set("saved_plan_id", plan_id);
        }
        let details = self
            .service
            .get_plan(plan_id)?
            .ok_or_else(|| AdminError::NotFound(format!("plan {plan_id}")))?;
        self.render_plan_form(ctx, details, "edit")
    }

    /// Retiring a plan keeps it resolvable for existing subscribers; it only
    /// disappears from the signup choices.
    fn set_active(&self, ctx: &mut AdminContext) -> ServiceResult<()> {
        let plan_id = ctx
            .request
            .int("plan")
            .ok_or_else(|| AdminError::Validation("missing_plan".into()))?;
        let active = ctx.post_vars.bool("active");
        self.service.check_session(ctx, SessionCheckMode::Post)?;
        self.service.set_plan_active(plan_id, active)?;
        logging::log_action(
            &self.service,
            ctx,
            "plan_activation_changed",
            json!({"id": plan_id, "active": active}),
        )?;
        ctx.context.set("plan_active", active);
        Ok(())
    }

    fn delete_plan(&self, ctx: &mut AdminContext) -> ServiceResult<()> {
        let plan_id = ctx
            .request
            .int("plan")
            .ok_or_else(|| AdminError::Validation("missing_plan".into()))?;
        let plan = self
            .service
            .get_plan(plan_id)?
            .ok_or_else(|| AdminError::NotFound(format!("plan {plan_id}")))?;
        if !ctx.post_vars.bool("confirm") {
            ctx.context
                .set("confirm_delete", json!({"id": plan_id, "name": plan.name}));
            return Ok(());
        }
        self.service.check_session(ctx, SessionCheckMode::Post)?;
        self.service.delete_plan(plan_id)?;
        logging::log_action(
            &self.service,
            ctx,
            "plan_deleted",
            json!({"id": plan_id, "name": plan.name}),
        )?;
        ctx.context.set("deleted_plan_id", plan_id);
        Ok(())
    }

    fn render_plan_form(&self, ctx: &mut AdminContext, plan: Plan, mode: &str) -> ServiceResult<()> {
        let Plan {
            id,
            name,
            price_cents,
            duration_days,
            description,
            active,
        } = plan;
        ctx.context.set("plan_mode", mode);
        ctx.context.set(
            "plan_form",
            json!({
                "id": id.unwrap_or(0),
                "name": name,
                "price_cents": price_cents,
                "duration_days": duration_days,
                "description": description,
                "active": active,
            }),
        );
        Ok(())
    }

    fn parse_plan_form(&self, ctx: &mut AdminContext, plan_id: Option<i64>) -> ServiceResult<Plan> {
        let name = ctx
            .post_vars
            .string("name")
            .unwrap_or_default()
            .trim()
            .to_string();
        let description = ctx
            .post_vars
            .string("description")
            .unwrap_or_default()
            .trim()
            .to_string();
        let price_cents = ctx.post_vars.int("price_cents").unwrap_or(-1);
        let duration_days = ctx.post_vars.int("duration_days").unwrap_or(0);
        let active = ctx.post_vars.bool("active");

        let mut invalid = Vec::new();
        if name.is_empty() {
            invalid.push("plan_name");
        }
        if price_cents < 0 {
            invalid.push("plan_price");
        }
        if duration_days < 1 {
            invalid.push("plan_duration");
        }
        if let Some(first) = invalid.first().copied() {
            for field in invalid {
                push_to_array(&mut ctx.context, "form_errors", field);
            }
            return Err(AdminError::Validation(first.into()));
        }

        Ok(Plan {
            id: plan_id,
            name,
            price_cents,
            duration_days,
            description,
            active,
        })
    }

    fn resolve_subaction(&self, ctx: &AdminContext) -> String {
        if let Some(sub) = ctx.request.string("sa") {
            match sub.as_str() {
                "index" | "add" | "edit" | "activate" | "delete" => return sub,
                _ => {}
            }
        }
        "index".into()
    }
}
