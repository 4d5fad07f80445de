use serde_json::json;

use crate::logging;
use crate::services::{
    ensure, expose_pagination, push_to_array, AdminContext, AdminError, AdminService, Gift,
    ListQuery, ServiceResult, SessionCheckMode,
};

pub struct GiftController<S: AdminService> {
    service: S,
}

impl<S: AdminService> GiftController<S> {
    pub fn new(service: S) -> Self {
        Self { service }
    }

    pub fn manage_gifts(&self, ctx: &mut AdminContext) -> ServiceResult<()> {
        self.service.load_labels(ctx, "gifts")?;

        let can_manage = self.service.allowed_to(ctx, "manage_gifts");
        let can_view = can_manage || self.service.allowed_to(ctx, "view_gifts");
        ensure(can_view, AdminError::PermissionDenied("view_gifts".into()))?;

        let subaction = self.resolve_subaction(ctx);
        match subaction.as_str() {
            "add" => {
                ensure(
                    can_manage,
                    AdminError::PermissionDenied("manage_gifts".into()),
                )?;
                self.add_gift(ctx)
            }
            "edit" => {
                ensure(
                    can_manage,
                    AdminError::PermissionDenied("manage_gifts".into()),
                )?;
                self.edit_gift(ctx)
            }
            "stock" => {
                ensure(
                    can_manage,
                    AdminError::PermissionDenied("manage_gifts".into()),
                )?;
                self.adjust_stock(ctx)
            }
            "delete" => {
                ensure(
                    can_manage,
                    AdminError::PermissionDenied("manage_gifts".into()),
                )?;
                self.delete_gift(ctx)
            }
            _ => self.index(ctx),
        }
    }

    fn index(&self, ctx: &mut AdminContext) -> ServiceResult<()> {
        let query = ListQuery::from_request(&ctx.request);
        let page = self.service.list_gifts(&query)?;
        let rows: Vec<_> = page
            .items
            .iter()
            .map(|gift| {
                json!({
                    "id": gift.id,
                    "name": gift.name,
                    "cost_coins": gift.cost_coins,
                    "stock": gift.stock,
                    "sold_out": gift.stock == 0,
                })
            })
            .collect();
        ctx.context.set("gifts", rows);
        ctx.context.set("search", query.search.clone());
        expose_pagination(ctx, &page);
        Ok(())
    }

    fn add_gift(&self, ctx: &mut AdminContext) -> ServiceResult<()> {
        let mut current = Gift::default();
        if ctx.request.contains("save") {
            self.service.check_session(ctx, SessionCheckMode::Post)?;
            let saved = self.service.save_gift(self.parse_gift_form(ctx, None)?)?;
            logging::log_action(&self.service, ctx, "gift_added", json!({"id": saved}))?;
            ctx.context.set("saved_gift_id", saved);
            if let Some(latest) = self.service.get_gift(saved)? {
                current = latest;
            }
        }
        self.render_gift_form(ctx, current, "add")
    }

    fn edit_gift(&self, ctx: &mut AdminContext) -> ServiceResult<()> {
        let gift_id = ctx
            .request
            .int("gift")
            .ok_or_else(|| AdminError::Validation("missing_gift".into()))?;
        if ctx.request.contains("save") {
            self.service.check_session(ctx, SessionCheckMode::Post)?;
            let payload = self.parse_gift_form(ctx, Some(gift_id))?;
            self.service.save_gift(payload)?;
            logging::log_action(&self.service, ctx, "gift_saved", json!({"id": gift_id}))?;
            ctx.context.set("saved_gift_id", gift_id);
        }
        let details = self
            .service
            .get_gift(gift_id)?
            .ok_or_else(|| AdminError::NotFound(format!("gift {gift_id}")))?;
        self.render_gift_form(ctx, details, "edit")
    }

    /// Restocks and manual corrections go through deltas so the audit trail
    /// shows every movement.
    fn adjust_stock(&self, ctx: &mut AdminContext) -> ServiceResult<()> {
        let gift_id = ctx
            .request
            .int("gift")
            .ok_or_else(|| AdminError::Validation("missing_gift".into()))?;
        if ctx.request.contains("save") {
            let delta = ctx.post_vars.int("delta").unwrap_or(0);
            ensure(delta != 0, AdminError::Validation("stock_delta".into()))?;
            self.service.check_session(ctx, SessionCheckMode::Post)?;
            let stock = self.service.adjust_gift_stock(gift_id, delta)?;
            logging::log_action(
                &self.service,
                ctx,
                "gift_stock_adjusted",
                json!({"id": gift_id, "delta": delta, "stock": stock}),
            )?;
            ctx.context.set("gift_stock", stock);
        }
        let gift = self
            .service
            .get_gift(gift_id)?
            .ok_or_else(|| AdminError::NotFound(format!("gift {gift_id}")))?;
        ctx.context.set(
            "stock_form",
            json!({"id": gift_id, "name": gift.name, "stock": gift.stock}),
        );
        Ok(())
    }

    fn delete_gift(&self, ctx: &mut AdminContext) -> ServiceResult<()> {
        let gift_id = ctx
            .request
            .int("gift")
            .ok_or_else(|| AdminError::Validation("missing_gift".into()))?;
        let gift = self
            .service
            .get_gift(gift_id)?
            .ok_or_else(|| AdminError::NotFound(format!("gift {gift_id}")))?;
        if !ctx.post_vars.bool("confirm") {
            ctx.context
                .set("confirm_delete", json!({"id": gift_id, "name": gift.name}));
            return Ok(());
        }
        self.service.check_session(ctx, SessionCheckMode::Post)?;
        self.service.delete_gift(gift_id)?;
        logging::log_action(
            &self.service,
            ctx,
            "gift_deleted",
            json!({"id": gift_id, "name": gift.name}),
        )?;
        ctx.context.set("deleted_gift_id", gift_id);
        Ok(())
    }

    fn render_gift_form(&self, ctx: &mut AdminContext, gift: Gift, mode: &str) -> ServiceResult<()> {
        let Gift {
            id,
            name,
            cost_coins,
            stock,
            description,
        } = gift;
        ctx.context.set("gift_mode", mode);
        ctx.context.set(
            "gift_form",
            json!({
                "id": id.unwrap_or(0),
                "name": name,
                "cost_coins": cost_coins,
                "stock": stock,
                "description": description,
            }),
        );
        Ok(())
    }

    fn parse_gift_form(&self, ctx: &mut AdminContext, gift_id: Option<i64>) -> ServiceResult<Gift> {
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
        let cost_coins = ctx.post_vars.int("cost_coins").unwrap_or(0);
        let stock = ctx.post_vars.int("stock").unwrap_or(0);

        let mut invalid = Vec::new();
        if name.is_empty() {
            invalid.push("gift_name");
        }
        if cost_coins < 1 {
            invalid.push("gift_cost");
        }
        if stock < 0 {
            invalid.push("gift_stock");
        }
        if let Some(first) = invalid.first().copied() {
            for field in invalid {
                push_to_array(&mut ctx.context, "form_errors", field);
            }
            return Err(AdminError::Validation(first.into()));
        }

        Ok(Gift {
            id: gift_id,
            name,
            cost_coins,
            stock,
            description,
        })
    }

    fn resolve_subaction(&self, ctx: &AdminContext) -> String {
        if let Some(sub) = ctx.request.string("sa") {
            match sub.as_str() {
                "index" | "add" | "edit" | "stock" | "delete" => return sub,
                _ => {}
            }
        }
        "index".into()
    }
}
