use serde_json::json;

use crate::logging;
use crate::services::{
    ensure, expose_pagination, push_to_array, AdminContext, AdminError, AdminService, ListQuery,
    NotificationAudience, NotificationItem, ServiceResult, SessionCheckMode,
};

pub struct NotificationController<S: AdminService> {
    service: S,
}

impl<S: AdminService> NotificationController<S> {
    pub fn new(service: S) -> Self {
        Self { service }
    }

    pub fn manage_notifications(&self, ctx: &mut AdminContext) -> ServiceResult<()> {
        self.service.load_labels(ctx, "notifications")?;

        let can_manage = self.service.allowed_to(ctx, "manage_notifications");
        let can_view = can_manage || self.service.allowed_to(ctx, "view_notifications");
        ensure(
            can_view,
            AdminError::PermissionDenied("view_notifications".into()),
        )?;

        let subaction = self.resolve_subaction(ctx);
        match subaction.as_str() {
            "add" => {
                ensure(
                    can_manage,
                    AdminError::PermissionDenied("manage_notifications".into()),
                )?;
                self.add_notification(ctx)
            }
            "edit" => {
                ensure(
                    can_manage,
                    AdminError::PermissionDenied("manage_notifications".into()),
                )?;
                self.edit_notification(ctx)
            }
            "send" => {
                ensure(
                    can_manage,
                    AdminError::PermissionDenied("manage_notifications".into()),
                )?;
                self.send_notification(ctx)
            }
            "delete" => {
                ensure(
                    can_manage,
                    AdminError::PermissionDenied("manage_notifications".into()),
                )?;
                self.delete_notification(ctx)
            }
            _ => self.index(ctx),
        }
    }

    fn index(&self, ctx: &mut AdminContext) -> ServiceResult<()> {
        let query = ListQuery::from_request(&ctx.request);
        let page = self.service.list_notifications(&query)?;
        let rows: Vec<_> = page
            .items
            .iter()
            .map(|item| {
                json!({
                    "id": item.id,
                    "title": item.title,
                    "audience": item.audience.as_str(),
                    "created_at": item.created_at,
                    "sent_at": item.sent_at,
                    "sent": item.sent_at.is_some(),
                })
            })
            .collect();
        ctx.context.set("notifications", rows);
        ctx.context.set("search", query.search.clone());
        expose_pagination(ctx, &page);
        Ok(())
    }

    fn add_notification(&self, ctx: &mut AdminContext) -> ServiceResult<()> {
        let mut current = NotificationItem::default();
        if ctx.request.contains("save") {
            self.service.check_session(ctx, SessionCheckMode::Post)?;
            let saved = self
                .service
                .save_notification(self.parse_notification_form(ctx, None)?)?;
            logging::log_action(
                &self.service,
                ctx,
                "notification_added",
                json!({"id": saved}),
            )?;
            ctx.context.set("saved_notification_id", saved);
            if let Some(latest) = self.service.get_notification(saved)? {
                current = latest;
            }
        }
        self.render_notification_form(ctx, current, "add")
    }

    /// Drafts stay editable until they go out; a sent notification is
    /// frozen so the archive matches what families received.
    fn edit_notification(&self, ctx: &mut AdminContext) -> ServiceResult<()> {
        let notification_id = ctx
            .request
            .int("notification")
            .ok_or_else(|| AdminError::Validation("missing_notification".into()))?;
        let current = self
            .service
            .get_notification(notification_id)?
            .ok_or_else(|| AdminError::NotFound(format!("notification {notification_id}")))?;
        if ctx.request.contains("save") {
            ensure(
                current.sent_at.is_none(),
                AdminError::Validation("already_sent".into()),
            )?;
            self.service.check_session(ctx, SessionCheckMode::Post)?;
            let mut payload = self.parse_notification_form(ctx, Some(notification_id))?;
            payload.created_at = current.created_at;
            self.service.save_notification(payload)?;
            logging::log_action(
                &self.service,
                ctx,
                "notification_saved",
                json!({"id": notification_id}),
            )?;
            ctx.context.set("saved_notification_id", notification_id);
        }
        let details = self
            .service
            .get_notification(notification_id)?
            .ok_or_else(|| AdminError::NotFound(format!("notification {notification_id}")))?;
        self.render_notification_form(ctx, details, "edit")
    }

    fn send_notification(&self, ctx: &mut AdminContext) -> ServiceResult<()> {
        let notification_id = ctx
            .request
            .int("notification")
            .ok_or_else(|| AdminError::Validation("missing_notification".into()))?;
        self.service.check_session(ctx, SessionCheckMode::Post)?;
        let sent_at = self.service.mark_notification_sent(notification_id)?;
        logging::log_action(
            &self.service,
            ctx,
            "notification_sent",
            json!({"id": notification_id, "sent_at": sent_at}),
        )?;
        ctx.context.set("notification_sent_at", sent_at);
        Ok(())
    }

    fn delete_notification(&self, ctx: &mut AdminContext) -> ServiceResult<()> {
        let notification_id = ctx
            .request
            .int("notification")
            .ok_or_else(|| AdminError::Validation("missing_notification".into()))?;
        let notification = self
            .service
            .get_notification(notification_id)?
            .ok_or_else(|| AdminError::NotFound(format!("notification {notification_id}")))?;
        if !ctx.post_vars.bool("confirm") {
            ctx.context.set(
                "confirm_delete",
                json!({"id": notification_id, "title": notification.title}),
            );
            return Ok(());
        }
        self.service.check_session(ctx, SessionCheckMode::Post)?;
        self.service.delete_notification(notification_id)?;
        logging::log_action(
            &self.service,
            ctx,
            "notification_deleted",
            json!({"id": notification_id, "title": notification.title}),
        )?;
        ctx.context.set("deleted_notification_id", notification_id);
        Ok(())
    }

    fn render_notification_form(
        &self,
        ctx: &mut AdminContext,
        notification: NotificationItem,
        mode: &str,
    ) -> ServiceResult<()> {
        let NotificationItem {
            id,
            title,
            body,
            audience,
            sent_at,
            ..
        } = notification;
        ctx.context.set("notification_mode", mode);
        ctx.context.set(
            "notification_form",
            json!({
                "id": id.unwrap_or(0),
                "title": title,
                "body": body,
                "audience": audience.as_str(),
                "sent": sent_at.is_some(),
            }),
        );
        ctx.context.set(
            "available_audiences",
            json!([
                NotificationAudience::All.as_str(),
                NotificationAudience::Parents.as_str(),
                NotificationAudience::Children.as_str(),
            ]),
        );
        Ok(())
    }

    fn parse_notification_form(
        &self,
        ctx: &mut AdminContext,
        notification_id: Option<i64>,
    ) -> ServiceResult<NotificationItem> {
        let title = ctx
            .post_vars
            .string("title")
            .unwrap_or_default()
            .trim()
            .to_string();
        let body = ctx
            .post_vars
            .string("body")
            .unwrap_or_default()
            .trim()
            .to_string();
        let raw_audience = ctx.post_vars.string("audience").unwrap_or_default();
        let audience = NotificationAudience::parse(&raw_audience);

        let mut invalid = Vec::new();
        if title.is_empty() {
            invalid.push("notification_title");
        }
        if audience.is_none() {
            invalid.push("notification_audience");
        }
        if let Some(first) = invalid.first().copied() {
            for field in invalid {
                push_to_array(&mut ctx.context, "form_errors", field);
            }
            return Err(AdminError::Validation(first.into()));
        }

        Ok(NotificationItem {
            id: notification_id,
            title,
            body,
            audience: audience.unwrap_or_default(),
            created_at: None,
            sent_at: None,
        })
    }

    fn resolve_subaction(&self, ctx: &AdminContext) -> String {
        if let Some(sub) = ctx.request.string("sa") {
            match sub.as_str() {
                "index" | "add" | "edit" | "send" | "delete" => return sub,
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

    fn build_controller() -> (NotificationController<InMemoryService>, InMemoryService) {
        let service = InMemoryService::default();
        let controller = NotificationController::new(service.clone());
        (controller, service)
    }

    fn manager_ctx() -> AdminContext {
        let mut ctx = AdminContext::default();
        ctx.user_info
            .permissions
            .insert("manage_notifications".into());
        ctx
    }

    #[test]
    fn index_lists_newest_first() {
        let (controller, _service) = build_controller();
        let mut ctx = manager_ctx();
        controller.manage_notifications(&mut ctx).unwrap();
        let rows = ctx
            .context
            .get("notifications")
            .unwrap()
            .as_array()
            .unwrap()
            .clone();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0]["title"], "Summer reading challenge");
        assert_eq!(rows[0]["sent"], false);
        assert_eq!(rows[1]["sent"], true);
    }

    #[test]
    fn add_rejects_unknown_audience() {
        let (controller, _service) = build_controller();
        let mut ctx = manager_ctx();
        ctx.request.set("sa", "add");
        ctx.request.set("save", true);
        ctx.post_vars.set("title", "Holiday notice");
        ctx.post_vars.set("audience", "everyone");
        let result = controller.manage_notifications(&mut ctx);
        assert!(
            matches!(result, Err(AdminError::Validation(field)) if field == "notification_audience")
        );
    }

    #[test]
    fn add_creates_a_draft() {
        let (controller, service) = build_controller();
        let mut ctx = manager_ctx();
        ctx.request.set("sa", "add");
        ctx.request.set("save", true);
        ctx.post_vars.set("title", "Holiday notice");
        ctx.post_vars.set("body", "The office closes next Monday.");
        ctx.post_vars.set("audience", "parents");
        controller.manage_notifications(&mut ctx).unwrap();
        let saved_id = ctx.context.int("saved_notification_id").unwrap();
        let draft = service.get_notification(saved_id).unwrap().unwrap();
        assert_eq!(draft.audience, NotificationAudience::Parents);
        assert!(draft.sent_at.is_none());
    }

    #[test]
    fn send_marks_and_refuses_repeats() {
        let (controller, service) = build_controller();
        let mut ctx = manager_ctx();
        ctx.request.set("sa", "send");
        ctx.request.set("notification", 2);
        controller.manage_notifications(&mut ctx).unwrap();
        assert!(service.get_notification(2).unwrap().unwrap().sent_at.is_some());

        let mut repeat = manager_ctx();
        repeat.request.set("sa", "send");
        repeat.request.set("notification", 2);
        let result = controller.manage_notifications(&mut repeat);
        assert!(matches!(result, Err(AdminError::Validation(key)) if key == "already_sent"));
    }

    #[test]
    fn sent_notifications_cannot_be_edited() {
        let (controller, _service) = build_controller();
        let mut ctx = manager_ctx();
        ctx.request.set("sa", "edit");
        ctx.request.set("notification", 1);
        ctx.request.set("save", true);
        ctx.post_vars.set("title", "Rewritten history");
        ctx.post_vars.set("audience", "all");
        let result = controller.manage_notifications(&mut ctx);
        assert!(matches!(result, Err(AdminError::Validation(key)) if key == "already_sent"));
    }

    #[test]
    fn draft_can_be_deleted() {
        let (controller, service) = build_controller();
        let mut ctx = manager_ctx();
        ctx.request.set("sa", "delete");
        ctx.request.set("notification", 2);
        ctx.post_vars.set("confirm", true);
        controller.manage_notifications(&mut ctx).unwrap();
        assert!(service.get_notification(2).unwrap().is_none());
    }
}
