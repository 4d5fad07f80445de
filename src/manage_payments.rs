use serde_json::json;

use crate::logging;
use crate::services::{
    ensure, expose_pagination, AdminContext, AdminError, AdminService, ListQuery, PaymentStatus,
    ServiceResult, SessionCheckMode,
};

/// Payments come from the billing provider; this screen can list, inspect
/// and refund them, never create or edit them.
pub struct PaymentController<S: AdminService> {
    service: S,
}

impl<S: AdminService> PaymentController<S> {
    pub fn new(service: S) -> Self {
        Self { service }
    }

    pub fn manage_payments(&self, ctx: &mut AdminContext) -> ServiceResult<()> {
        self.service.load_labels(ctx, "payments")?;

        let can_manage = self.service.allowed_to(ctx, "manage_payments");
        let can_view = can_manage || self.service.allowed_to(ctx, "view_payments");
        ensure(
            can_view,
            AdminError::PermissionDenied("view_payments".into()),
        )?;

        let subaction = self.resolve_subaction(ctx);
        match subaction.as_str() {
            "view" => self.view_payment(ctx),
            "refund" => {
                ensure(
                    can_manage,
                    AdminError::PermissionDenied("manage_payments".into()),
                )?;
                self.refund_payment(ctx)
            }
            _ => self.index(ctx),
        }
    }

    fn index(&self, ctx: &mut AdminContext) -> ServiceResult<()> {
        let query = ListQuery::from_request(&ctx.request);
        let status = self.parse_status_filter(ctx)?;
        let page = self.service.list_payments(&query, status)?;
        let mut rows = Vec::with_capacity(page.items.len());
        for payment in &page.items {
            let parent_name = match self.service.get_parent(payment.parent_id)? {
                Some(parent) => parent.name,
                None => String::new(),
            };
            let plan_name = match self.service.get_plan(payment.plan_id)? {
                Some(plan) => plan.name,
                None => String::new(),
            };
            rows.push(json!({
                "id": payment.id,
                "parent_name": parent_name,
                "plan_name": plan_name,
                "amount_cents": payment.amount_cents,
                "currency": payment.currency,
                "status": payment.status.as_str(),
                "paid_at": payment.paid_at,
            }));
        }
        ctx.context.set("payments", rows);
        ctx.context
            .set("status_filter", status.map(|s| s.as_str()));
        ctx.context.set("search", query.search.clone());
        expose_pagination(ctx, &page);
        Ok(())
    }

    fn view_payment(&self, ctx: &mut AdminContext) -> ServiceResult<()> {
        let payment_id = ctx
            .request
            .int("payment")
            .ok_or_else(|| AdminError::Validation("missing_payment".into()))?;
        let payment = self
            .service
            .get_payment(payment_id)?
            .ok_or_else(|| AdminError::NotFound(format!("payment {payment_id}")))?;
        let parent = self.service.get_parent(payment.parent_id)?;
        let plan = self.service.get_plan(payment.plan_id)?;
        ctx.context.set(
            "payment",
            json!({
                "id": payment.id,
                "parent_id": payment.parent_id,
                "parent_name": parent.map(|p| p.name),
                "plan_id": payment.plan_id,
                "plan_name": plan.map(|p| p.name),
                "amount_cents": payment.amount_cents,
                "currency": payment.currency,
                "status": payment.status.as_str(),
                "paid_at": payment.paid_at,
                "refundable": payment.status == PaymentStatus::Completed,
            }),
        );
        Ok(())
    }

    fn refund_payment(&self, ctx: &mut AdminContext) -> ServiceResult<()> {
        let payment_id = ctx
            .request
            .int("payment")
            .ok_or_else(|| AdminError::Validation("missing_payment".into()))?;
        let payment = self
            .service
            .get_payment(payment_id)?
            .ok_or_else(|| AdminError::NotFound(format!("payment {payment_id}")))?;
        if !ctx.post_vars.bool("confirm") {
            ctx.context.set(
                "confirm_refund",
                json!({
                    "id": payment_id,
                    "amount_cents": payment.amount_cents,
                    "currency": payment.currency,
                }),
            );
            return Ok(());
        }
        self.service.check_session(ctx, SessionCheckMode::Post)?;
        self.service.refund_payment(payment_id)?;
        logging::log_action(
            &self.service,
            ctx,
            "payment_refunded",
            json!({"id": payment_id, "amount_cents": payment.amount_cents}),
        )?;
        ctx.context.set("refunded_payment_id", payment_id);
        Ok(())
    }

    fn parse_status_filter(&self, ctx: &AdminContext) -> ServiceResult<Option<PaymentStatus>> {
        match ctx.request.string("status") {
            None => Ok(None),
            Some(raw) if raw.trim().is_empty() => Ok(None),
            Some(raw) => PaymentStatus::parse(&raw)
                .map(Some)
                .ok_or_else(|| AdminError::Validation("payment_status".into())),
        }
    }

    fn resolve_subaction(&self, ctx: &AdminContext) -> String {
        if let Some(sub) = ctx.request.string("sa") {
            match sub.as_str() {
                "index" | "view" | "refund" => return sub,
                _ => {}
            }
        }
        "index".into()
    }
}
