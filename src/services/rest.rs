use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::info;

use crate::rest::RestClient;
use crate::services::{
    screen_labels, AdminContext, AdminError, AdminService, AuditEntry, Category, Child,
    DashboardCounts, Gift, Level, ListQuery, NotificationItem, Page, Parent, Payment,
    PaymentStatus, Plan, ServiceResult, SessionCheckMode, TaskItem, WordGame,
};

/// `AdminService` over the platform REST API.
///
/// Session and permission checks are answered locally: the dashboard owns its
/// operator session and the API only ever sees the bearer token. The audit
/// trail is emitted as structured log events instead of round-tripping.
#[derive(Clone)]
pub struct RestService {
    client: RestClient,
}

#[derive(Debug, Deserialize)]
struct IdEnvelope {
    id: i64,
}

#[derive(Debug, Deserialize)]
struct BalanceEnvelope {
    balance: i64,
}

#[derive(Debug, Deserialize)]
struct StockEnvelope {
    stock: i64,
}

#[derive(Debug, Deserialize)]
struct SentEnvelope {
    sent_at: DateTime<Utc>,
}

impl RestService {
    pub fn new(client: RestClient) -> Self {
        Self { client }
    }

    fn save_record<T: Serialize>(
        &self,
        base: &str,
        id: Option<i64>,
        record: &T,
    ) -> ServiceResult<i64> {
        let saved: IdEnvelope = match id {
            Some(id) => self.client.put_json(&format!("{base}/{id}"), record)?,
            None => self.client.post_json(base, record)?,
        };
        Ok(saved.id)
    }
}

impl AdminService for RestService {
    fn load_labels(&self, ctx: &mut AdminContext, screen: &str) -> ServiceResult<()> {
        for (key, value) in screen_labels(screen) {
            ctx.txt.set(key, *value);
        }
        Ok(())
    }

    fn check_session(&self, ctx: &AdminContext, _mode: SessionCheckMode) -> ServiceResult<()> {
        if ctx.session.bool("force_timeout") {
            Err(AdminError::SessionTimeout)
        } else {
            Ok(())
        }
    }

    fn allowed_to(&self, ctx: &AdminContext, permission: &str) -> bool {
        if ctx.user_info.is_admin {
            return true;
        }
        ctx.user_info.permissions.contains(permission)
    }

    fn list_categories(&self, query: &ListQuery) -> ServiceResult<Page<Category>> {
        self.client.get_page("categories", query)
    }

    fn get_category(&self, id: i64) -> ServiceResult<Option<Category>> {
        self.client.get_one(&format!("categories/{id}"))
    }

    fn save_category(&self, category: Category) -> ServiceResult<i64> {
        self.save_record("categories", category.id, &category)
    }

    fn delete_category(&self, id: i64) -> ServiceResult<()> {
        self.client.delete(&format!("categories/{id}"))
    }

    fn list_children(&self, query: &ListQuery) -> ServiceResult<Page<Child>> {
        self.client.get_page("children", query)
    }

    fn get_child(&self, id: i64) -> ServiceResult<Option<Child>> {
        self.client.get_one(&format!("children/{id}"))
    }

    fn save_child(&self, child: Child) -> ServiceResult<i64> {
        self.save_record("children", child.id, &child)
    }

    fn delete_child(&self, id: i64) -> ServiceResult<()> {
        self.client.delete(&format!("children/{id}"))
    }

    fn adjust_child_coins(&self, id: i64, delta: i64) -> ServiceResult<i64> {
        let adjusted: BalanceEnvelope = self
            .client
            .post_json(&format!("children/{id}/coins"), &json!({ "delta": delta }))?;
        Ok(adjusted.balance)
    }

    fn list_parents(&self, query: &ListQuery) -> ServiceResult<Page<Parent>> {
        self.client.get_page("parents", query)
    }

    fn get_parent(&self, id: i64) -> ServiceResult<Option<Parent>> {
        self.client.get_one(&format!("parents/{id}"))
    }

    fn save_parent(&self, parent: Parent) -> ServiceResult<i64> {
        self.save_record("parents", parent.id, &parent)
    }

    fn delete_parent(&self, id: i64) -> ServiceResult<()> {
        self.client.delete(&format!("parents/{id}"))
    }

    fn children_of_parent(&self, parent_id: i64) -> ServiceResult<Vec<Child>> {
        Ok(self
            .client
            .get_one(&format!("parents/{parent_id}/children"))?
            .unwrap_or_default())
    }

    fn list_tasks(&self, query: &ListQuery) -> ServiceResult<Page<TaskItem>> {
        self.client.get_page("tasks", query)
    }

    fn get_task(&self, id: i64) -> ServiceResult<Option<TaskItem>> {
        self.client.get_one(&format!("tasks/{id}"))
    }

    fn save_task(&self, task: TaskItem) -> ServiceResult<i64> {
        self.save_record("tasks", task.id, &task)
    }

    fn delete_task(&self, id: i64) -> ServiceResult<()> {
        self.client.delete(&format!("tasks/{id}"))
    }

    fn list_levels(&self, query: &ListQuery) -> ServiceResult<Page<Level>> {
        self.client.get_page("levels", query)
    }

    fn get_level(&self, id: i64) -> ServiceResult<Option<Level>> {
        self.client.get_one(&format!("levels/{id}"))
    }

    fn save_level(&self, level: Level) -> ServiceResult<i64> {
        self.save_record("levels", level.id, &level)
    }

    fn delete_level(&self, id: i64) -> ServiceResult<()> {
        self.client.delete(&format!("levels/{id}"))
    }

    fn list_plans(&self, query: &ListQuery) -> ServiceResult<Page<Plan>> {
        self.client.get_page("plans", query)
    }

    fn get_plan(&self, id: i64) -> ServiceResult<Option<Plan>> {
        self.client.get_one(&format!("plans/{id}"))
    }

    fn save_plan(&self, plan: Plan) -> ServiceResult<i64> {
        self.save_record("plans", plan.id, &plan)
    }

    fn delete_plan(&self, id: i64) -> ServiceResult<()> {
        self.client.delete(&format!("plans/{id}"))
    }

    fn set_plan_active(&self, id: i64, active: bool) -> ServiceResult<()> {
        self.client
            .post_unit(&format!("plans/{id}/active"), &json!({ "active": active }))
    }

    fn list_gifts(&self, query: &ListQuery) -> ServiceResult<Page<Gift>> {
        self.client.get_page("gifts", query)
    }

    fn get_gift(&self, id: i64) -> ServiceResult<Option<Gift>> {
        self.client.get_one(&format!("gifts/{id}"))
    }

    fn save_gift(&self, gift: Gift) -> ServiceResult<i64> {
        self.save_record("gifts", gift.id, &gift)
    }

    fn delete_gift(&self, id: i64) -> ServiceResult<()> {
        self.client.delete(&format!("gifts/{id}"))
    }

    fn adjust_gift_stock(&self, id: i64, delta: i64) -> ServiceResult<i64> {
        let adjusted: StockEnvelope = self
            .client
            .post_json(&format!("gifts/{id}/stock"), &json!({ "delta": delta }))?;
        Ok(adjusted.stock)
    }

    fn list_word_games(&self, query: &ListQuery) -> ServiceResult<Page<WordGame>> {
        self.client.get_page("word-games", query)
    }

    fn get_word_game(&self, id: i64) -> ServiceResult<Option<WordGame>> {
        self.client.get_one(&format!("word-games/{id}"))
    }

    fn save_word_game(&self, game: WordGame) -> ServiceResult<i64> {
        self.save_record("word-games", game.id, &game)
    }

    fn delete_word_game(&self, id: i64) -> ServiceResult<()> {
        self.client.delete(&format!("word-games/{id}"))
    }

    fn list_notifications(&self, query: &ListQuery) -> ServiceResult<Page<NotificationItem>> {
        self.client.get_page("notifications", query)
    }

    fn get_notification(&self, id: i64) -> ServiceResult<Option<NotificationItem>> {
        self.client.get_one(&format!("notifications/{id}"))
    }

    fn save_notification(&self, notification: NotificationItem) -> ServiceResult<i64> {
        self.save_record("notifications", notification.id, &notification)
    }

    fn delete_notification(&self, id: i64) -> ServiceResult<()> {
        self.client.delete(&format!("notifications/{id}"))
    }

    fn mark_notification_sent(&self, id: i64) -> ServiceResult<DateTime<Utc>> {
        let sent: SentEnvelope = self
            .client
            .post_json(&format!("notifications/{id}/send"), &json!({}))?;
        Ok(sent.sent_at)
    }

    fn list_payments(
        &self,
        query: &ListQuery,
        status: Option<PaymentStatus>,
    ) -> ServiceResult<Page<Payment>> {
        let path = match status {
            Some(status) => format!("payments?status={}", status.as_str()),
            None => "payments".to_string(),
        };
        self.client.get_page(&path, query)
    }

    fn get_payment(&self, id: i64) -> ServiceResult<Option<Payment>> {
        self.client.get_one(&format!("payments/{id}"))
    }

    fn refund_payment(&self, id: i64) -> ServiceResult<()> {
        self.client
            .post_unit(&format!("payments/{id}/refund"), &json!({}))
    }

    fn log_action(
        &self,
        action: &str,
        actor_id: Option<i64>,
        details: &Value,
    ) -> ServiceResult<()> {
        info!(action, actor = ?actor_id, details = %details, "admin action");
        Ok(())
    }

    fn list_audit_log(&self) -> ServiceResult<Vec<AuditEntry>> {
        Ok(Vec::new())
    }

    fn dashboard_counts(&self) -> ServiceResult<DashboardCounts> {
        Ok(self
            .client
            .get_one("dashboard/counts")?
            .unwrap_or_default())
    }
}
