use std::collections::HashMap;

use serde_json::json;

use crate::logging;
use crate::services::{
    ensure, expose_pagination, push_to_array, AdminContext, AdminError, AdminService, ListQuery,
    ServiceResult, SessionCheckMode, TaskItem,
};

const MAX_REWARD_COINS: i64 = 1000;

pub struct TaskController<S: AdminService> {
    service: S,
}

impl<S: AdminService> TaskController<S> {
    pub fn new(service: S) -> Self {
        Self { service }
    }

    pub fn manage_tasks(&self, ctx: &mut AdminContext) -> ServiceResult<()> {
        self.service.load_labels(ctx, "tasks")?;

        let can_manage = self.service.allowed_to(ctx, "manage_tasks");
        let can_view = can_manage || self.service.allowed_to(ctx, "view_tasks");
        ensure(can_view, AdminError::PermissionDenied("view_tasks".into()))?;

        let subaction = self.resolve_subaction(ctx);
        match subaction.as_str() {
            "add" => {
                ensure(
                    can_manage,
                    AdminError::PermissionDenied("manage_tasks".into()),
                )?;
                self.add_task(ctx)
            }
            "edit" => {
                ensure(
                    can_manage,
                    AdminError::PermissionDenied("manage_tasks".into()),
                )?;
                self.edit_task(ctx)
            }
            "delete" => {
                ensure(
                    can_manage,
                    AdminError::PermissionDenied("manage_tasks".into()),
                )?;
                self.delete_task(ctx)
            }
            _ => self.index(ctx),
        }
    }

    fn index(&self, ctx: &mut AdminContext) -> ServiceResult<()> {
        let query = ListQuery::from_request(&ctx.request);
        let page = self.service.list_tasks(&query)?;
        let category_names = self.category_names()?;
        let rows: Vec<_> = page
            .items
            .iter()
            .map(|task| {
                json!({
                    "id": task.id,
                    "title": task.title,
                    "category_id": task.category_id,
                    "category_name": category_names.get(&task.category_id).cloned(),
                    "reward_coins": task.reward_coins,
                    "active": task.active,
                })
            })
            .collect();
        ctx.context.set("tasks", rows);
        ctx.context.set("search", query.search.clone());
        expose_pagination(ctx, &page);
        Ok(())
    }

    fn add_task(&self, ctx: &mut AdminContext) -> ServiceResult<()> {
        let mut current = TaskItem {
            active: true,
            ..TaskItem::default()
        };
        if ctx.request.contains("save") {
            self.service.check_session(ctx, SessionCheckMode::Post)?;
            let saved = self.service.save_task(self.parse_task_form(ctx, None)?)?;
            logging::log_action(&self.service, ctx, "task_added", json!({"id": saved}))?;
            ctx.context.set("saved_task_id", saved);
            if let Some(latest) = self.service.get_task(saved)? {
                current = latest;
            }
        }
        self.render_task_form(ctx, current, "add")
    }

    fn edit_task(&self, ctx: &mut AdminContext) -> ServiceResult<()> {
        let task_id = ctx
            .request
            .int("task")
            .ok_or_else(|| AdminError::Validation("missing_task".into()))?;
        if ctx.request.contains("save") {
            self.service.check_session(ctx, SessionCheckMode::Post)?;
            let current = self
                .service
                .get_task(task_id)?
                .ok_or_else(|| AdminError::NotFound(format!("task {task_id}")))?;
            let mut payload = self.parse_task_form(ctx, Some(task_id))?;
            payload.created_at = current.created_at;
            self.service.save_task(payload)?;
            logging::log_action(&self.service, ctx, "task_saved", json!({"id": task_id}))?;
            ctx.context.set("saved_task_id", task_id);
        }
        let details = self
            .service
            .get_task(task_id)?
            .ok_or_else(|| AdminError::NotFound(format!("task {task_id}")))?;
        self.render_task_form(ctx, details, "edit")
    }

    fn delete_task(&self, ctx: &mut AdminContext) -> ServiceResult<()> {
        let task_id = ctx
            .request
            .int("task")
            .ok_or_else(|| AdminError::Validation("missing_task".into()))?;
        let task = self
            .service
            .get_task(task_id)?
            .ok_or_else(|| AdminError::NotFound(format!("task {task_id}")))?;
        if !ctx.post_vars.bool("confirm") {
            ctx.context
                .set("confirm_delete", json!({"id": task_id, "title": task.title}));
            return Ok(());
        }
        self.service.check_session(ctx, SessionCheckMode::Post)?;
        self.service.delete_task(task_id)?;
        logging::log_action(
            &self.service,
            ctx,
            "task_deleted",
            json!({"id": task_id, "title": task.title}),
        )?;
        ctx.context.set("deleted_task_id", task_id);
        Ok(())
    }

    fn render_task_form(
        &self,
        ctx: &mut AdminContext,
        task: TaskItem,
        mode: &str,
    ) -> ServiceResult<()> {
        let TaskItem {
            id,
            title,
            description,
            category_id,
            reward_coins,
            active,
            ..
        } = task;
        ctx.context.set("task_mode", mode);
        ctx.context.set(
            "task_form",
            json!({
                "id": id.unwrap_or(0),
                "title": title,
                "description": description,
                "category_id": category_id,
                "reward_coins": reward_coins,
                "active": active,
            }),
        );
        let picker = ListQuery {
            page_size: 100,
            ..ListQuery::default()
        };
        let categories = self.service.list_categories(&picker)?;
        let category_list: Vec<_> = categories
            .items
            .iter()
            .map(|category| json!({"id": category.id, "name": category.name}))
            .collect();
        ctx.context.set("available_categories", category_list);
        Ok(())
    }

    fn parse_task_form(
        &self,
        ctx: &mut AdminContext,
        task_id: Option<i64>,
    ) -> ServiceResult<TaskItem> {
        let title = ctx
            .post_vars
            .string("title")
            .unwrap_or_default()
            .trim()
            .to_string();
        let description = ctx
            .post_vars
            .string("description")
            .unwrap_or_default()
            .trim()
            .to_string();
        let category_id = ctx.post_vars.int("category").unwrap_or(0);
        let reward_coins = ctx.post_vars.int("reward").unwrap_or(0);
        let active = ctx.post_vars.bool("active");

        let mut invalid = Vec::new();
        if title.is_empty() {
            invalid.push("task_title");
        }
        if category_id <= 0 {
            invalid.push("task_category");
        }
        if !(1..=MAX_REWARD_COINS).contains(&reward_coins) {
            invalid.push("task_reward");
        }
        if let Some(first) = invalid.first().copied() {
            for field in invalid {
                push_to_array(&mut ctx.context, "form_errors", field);
            }
            return Err(AdminError::Validation(first.into()));
        }

        Ok(TaskItem {
            id: task_id,
            title,
            description,
            category_id,
            reward_coins,
            active,
            created_at: None,
        })
    }

    fn category_names(&self) -> ServiceResult<HashMap<i64, String>> {
        let picker = ListQuery {
            page_size: 100,
            ..ListQuery::default()
        };
        let categories = self.service.list_categories(&picker)?;
        Ok(categories
            .items
            .into_iter()
            .filter_map(|category| category.id.map(|id| (id, category.name)))
            .collect())
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

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::InMemoryService;

    fn build_controller() -> (TaskController<InMemoryService>, InMemoryService) {
        let service = InMemoryService::default();
        let controller = TaskController::new(service.clone());
        (controller, service)
    }

    fn manager_ctx() -> AdminContext {
        let mut ctx = AdminContext::default();
        ctx.user_info.permissions.insert("manage_tasks".into());
        ctx
    }

    #[test]
    fn index_joins_category_names() {
        let (controller, _service) = build_controller();
        let mut ctx = manager_ctx();
        controller.manage_tasks(&mut ctx).unwrap();
        let rows = ctx.context.get("tasks").unwrap().as_array().unwrap().clone();
        assert_eq!(rows.len(), 3);
        assert_eq!(rows[0]["title"], "Make the bed");
        assert_eq!(rows[0]["category_name"], "Chores");
    }

    #[test]
    fn add_task_creates_record() {
        let (controller, service) = build_controller();
        let mut ctx = manager_ctx();
        ctx.request.set("sa", "add");
        ctx.request.set("save", true);
        ctx.post_vars.set("title", "Water the plants");
        ctx.post_vars.set("description", "Balcony and kitchen");
        ctx.post_vars.set("category", 1);
        ctx.post_vars.set("reward", 20);
        ctx.post_vars.set("active", true);
        controller.manage_tasks(&mut ctx).unwrap();
        let page = service.list_tasks(&ListQuery::default()).unwrap();
        let added = page
            .items
            .iter()
            .find(|task| task.title == "Water the plants")
            .unwrap();
        assert_eq!(added.reward_coins, 20);
        assert!(added.active);
    }

    #[test]
    fn reward_outside_bounds_is_rejected() {
        let (controller, _service) = build_controller();
        for bad_reward in [0, 1001] {
            let mut ctx = manager_ctx();
            ctx.request.set("sa", "add");
            ctx.request.set("save", true);
            ctx.post_vars.set("title", "Over the top");
            ctx.post_vars.set("category", 1);
            ctx.post_vars.set("reward", bad_reward);
            let result = controller.manage_tasks(&mut ctx);
            assert!(
                matches!(result, Err(AdminError::Validation(field)) if field == "task_reward")
            );
        }
    }

    #[test]
    fn unknown_category_is_rejected_by_the_service() {
        let (controller, _service) = build_controller();
        let mut ctx = manager_ctx();
        ctx.request.set("sa", "add");
        ctx.request.set("save", true);
        ctx.post_vars.set("title", "Ghost task");
        ctx.post_vars.set("category", 12);
        ctx.post_vars.set("reward", 10);
        let result = controller.manage_tasks(&mut ctx);
        assert!(matches!(result, Err(AdminError::Validation(key)) if key == "unknown_category"));
    }

    #[test]
    fn edit_can_deactivate_a_task() {
        let (controller, service) = build_controller();
        let mut ctx = manager_ctx();
        ctx.request.set("sa", "edit");
        ctx.request.set("task", 2);
        ctx.request.set("save", true);
        ctx.post_vars.set("title", "Finish math worksheet");
        ctx.post_vars.set("category", 2);
        ctx.post_vars.set("reward", 25);
        ctx.post_vars.set("active", false);
        controller.manage_tasks(&mut ctx).unwrap();
        let updated = service.get_task(2).unwrap().unwrap();
        assert!(!updated.active);
    }

    #[test]
    fn delete_needs_confirmation() {
        let (controller, service) = build_controller();
        let mut ctx = manager_ctx();
        ctx.request.set("sa", "delete");
        ctx.request.set("task", 3);
        controller.manage_tasks(&mut ctx).unwrap();
        assert!(ctx.context.get("confirm_delete").is_some());
        assert!(service.get_task(3).unwrap().is_some());

        ctx.post_vars.set("confirm", true);
        controller.manage_tasks(&mut ctx).unwrap();
        assert!(service.get_task(3).unwrap().is_none());
    }
}
