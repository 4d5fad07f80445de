use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};
use thiserror::Error;

use crate::pagination::{clamp_page, page_tokens, total_pages};

pub mod rest;

pub type ServiceResult<T> = Result<T, AdminError>;

#[derive(Debug, Error)]
pub enum AdminError {
    #[error("permission denied: {0}")]
    PermissionDenied(String),
    #[error("session timeout")]
    SessionTimeout,
    #[error("validation error: {0}")]
    Validation(String),
    #[error("not found: {0}")]
    NotFound(String),
    #[error("api error: {0}")]
    Api(String),
    #[error("internal error: {0}")]
    Internal(String),
}

#[derive(Clone, Debug, Default)]
pub struct DataBag {
    inner: HashMap<String, Value>,
}

impl DataBag {
    pub fn new() -> Self {
        Self {
            inner: HashMap::new(),
        }
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.inner.get(key)
    }

    pub fn set<T: Serialize>(&mut self, key: &str, value: T) {
        self.inner.insert(
            key.to_string(),
            serde_json::to_value(value).unwrap_or(Value::Null),
        );
    }

    pub fn remove(&mut self, key: &str) {
        self.inner.remove(key);
    }

    // Request vars arrive as strings when they come off a query string,
    // so the scalar readers coerce both representations.
    pub fn bool(&self, key: &str) -> bool {
        match self.inner.get(key) {
            Some(Value::Bool(flag)) => *flag,
            Some(Value::Number(number)) => number.as_i64().unwrap_or(0) != 0,
            Some(Value::String(raw)) => matches!(raw.trim(), "1" | "true" | "on" | "yes"),
            _ => false,
        }
    }

    pub fn int(&self, key: &str) -> Option<i64> {
        match self.inner.get(key)? {
            Value::Number(number) => number.as_i64(),
            Value::String(raw) => raw.trim().parse().ok(),
            _ => None,
        }
    }

    pub fn string(&self, key: &str) -> Option<String> {
        self.inner
            .get(key)
            .and_then(|value| value.as_str().map(|s| s.to_string()))
    }

    pub fn contains(&self, key: &str) -> bool {
        self.inner.contains_key(key)
    }

    pub fn increment(&mut self, key: &str, amount: i64) {
        let next = self.int(key).unwrap_or(0) + amount;
        self.set(key, next);
    }

    /// Snapshot of the whole bag, the shape handed to renderers.
    pub fn to_value(&self) -> Value {
        serde_json::to_value(&self.inner).unwrap_or(Value::Null)
    }
}

#[derive(Clone, Debug, Default)]
pub struct RequestVars {
    data: DataBag,
}

impl RequestVars {
    pub fn new() -> Self {
        Self {
            data: DataBag::new(),
        }
    }

    pub fn bool(&self, key: &str) -> bool {
        self.data.bool(key)
    }

    pub fn int(&self, key: &str) -> Option<i64> {
        self.data.int(key)
    }

    pub fn string(&self, key: &str) -> Option<String> {
        self.data.string(key)
    }

    pub fn set<T: Serialize>(&mut self, key: &str, value: T) {
        self.data.set(key, value);
    }

    pub fn remove(&mut self, key: &str) {
        self.data.remove(key);
    }

    pub fn contains(&self, key: &str) -> bool {
        self.data.contains(key)
    }
}

#[derive(Clone, Debug)]
pub struct UserInfo {
    pub id: i64,
    pub name: String,
    pub email: String,
    pub is_guest: bool,
    pub is_admin: bool,
    pub language: String,
    pub permissions: HashSet<String>,
}

impl Default for UserInfo {
    fn default() -> Self {
        Self {
            id: 0,
            name: String::from("guest"),
            email: String::new(),
            is_guest: true,
            is_admin: false,
            language: String::from("en"),
            permissions: HashSet::new(),
        }
    }
}

/// Per-request state threaded through every screen: parsed input vars,
/// the render-data bag the controllers fill, session flags, and the
/// operator's identity.
#[derive(Clone, Debug, Default)]
pub struct AdminContext {
    pub dashboard_url: String,
    pub section: Option<String>,
    pub txt: DataBag,
    pub settings: DataBag,
    pub context: DataBag,
    pub request: RequestVars,
    pub post_vars: RequestVars,
    pub session: DataBag,
    pub user_info: UserInfo,
}

pub const DEFAULT_PAGE_SIZE: i64 = 10;

/// List-view request: 1-based page, page size, optional search term.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ListQuery {
    pub page: i64,
    pub page_size: i64,
    pub search: Option<String>,
}

impl Default for ListQuery {
    fn default() -> Self {
        Self {
            page: 1,
            page_size: DEFAULT_PAGE_SIZE,
            search: None,
        }
    }
}

impl ListQuery {
    /// Reads `page`, `page_size` and `search` request vars the way every
    /// list screen does. Blank search terms collapse to no filter.
    pub fn from_request(vars: &RequestVars) -> Self {
        let page = vars.int("page").unwrap_or(1).max(1);
        let page_size = vars
            .int("page_size")
            .unwrap_or(DEFAULT_PAGE_SIZE)
            .clamp(1, 100);
        let search = vars
            .string("search")
            .map(|term| term.trim().to_string())
            .filter(|term| !term.is_empty());
        Self {
            page,
            page_size,
            search,
        }
    }
}

/// Paginated result envelope, the shape every list endpoint serves:
/// total count, derived page count, the effective 1-based page, page size.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub count: i64,
    pub page_count: i64,
    pub page_number: i64,
    pub page_size: i64,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct Category {
    pub id: Option<i64>,
    pub name: String,
    pub color: String,
    pub position: i64,
    pub created_at: Option<DateTime<Utc>>,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct Child {
    pub id: Option<i64>,
    pub name: String,
    pub age: i64,
    pub parent_id: i64,
    pub level_id: Option<i64>,
    pub coins: i64,
    pub created_at: Option<DateTime<Utc>>,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct Parent {
    pub id: Option<i64>,
    pub name: String,
    pub email: String,
    pub phone: String,
    pub plan_id: Option<i64>,
    pub created_at: Option<DateTime<Utc>>,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct TaskItem {
    pub id: Option<i64>,
    pub title: String,
    pub description: String,
    pub category_id: i64,
    pub reward_coins: i64,
    pub active: bool,
    pub created_at: Option<DateTime<Utc>>,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct Level {
    pub id: Option<i64>,
    pub name: String,
    pub rank: i64,
    pub min_coins: i64,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct Plan {
    pub id: Option<i64>,
    pub name: String,
    pub price_cents: i64,
    pub duration_days: i64,
    pub description: String,
    pub active: bool,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct Gift {
    pub id: Option<i64>,
    pub name: String,
    pub cost_coins: i64,
    pub stock: i64,
    pub description: String,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct WordGame {
    pub id: Option<i64>,
    pub word: String,
    pub hint: String,
    pub reward_coins: i64,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum NotificationAudience {
    All,
    Parents,
    Children,
}

impl Default for NotificationAudience {
    fn default() -> Self {
        NotificationAudience::All
    }
}

impl NotificationAudience {
    pub fn as_str(&self) -> &'static str {
        match self {
            NotificationAudience::All => "all",
            NotificationAudience::Parents => "parents",
            NotificationAudience::Children => "children",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_lowercase().as_str() {
            "all" => Some(NotificationAudience::All),
            "parents" => Some(NotificationAudience::Parents),
            "children" => Some(NotificationAudience::Children),
            _ => None,
        }
    }
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct NotificationItem {
    pub id: Option<i64>,
    pub title: String,
    pub body: String,
    pub audience: NotificationAudience,
    pub created_at: Option<DateTime<Utc>>,
    pub sent_at: Option<DateTime<Utc>>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum PaymentStatus {
    Pending,
    Completed,
    Failed,
    Refunded,
}

impl PaymentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentStatus::Pending => "pending",
            PaymentStatus::Completed => "completed",
            PaymentStatus::Failed => "failed",
            PaymentStatus::Refunded => "refunded",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_lowercase().as_str() {
            "pending" => Some(PaymentStatus::Pending),
            "completed" => Some(PaymentStatus::Completed),
            "failed" => Some(PaymentStatus::Failed),
            "refunded" => Some(PaymentStatus::Refunded),
            _ => None,
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Payment {
    pub id: i64,
    pub parent_id: i64,
    pub plan_id: i64,
    pub amount_cents: i64,
    pub currency: String,
    pub status: PaymentStatus,
    pub paid_at: DateTime<Utc>,
}

#[derive(Clone, Debug, Serialize)]
pub struct AuditEntry {
    pub id: i64,
    pub action: String,
    pub actor_id: Option<i64>,
    pub details: Value,
    pub logged_at: DateTime<Utc>,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct DashboardCounts {
    pub categories: i64,
    pub children: i64,
    pub parents: i64,
    pub tasks: i64,
    pub levels: i64,
    pub plans: i64,
    pub gifts: i64,
    pub word_games: i64,
    pub notifications: i64,
    pub payments: i64,
    pub pending_payments: i64,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum SessionCheckMode {
    Get,
    Post,
    Request,
}

/// Everything the screens need from the backend, one method per operation.
/// `InMemoryService` backs tests and the demo binaries; `rest::RestService`
/// talks to the platform API.
pub trait AdminService {
    fn load_labels(&self, ctx: &mut AdminContext, screen: &str) -> ServiceResult<()>;
    fn check_session(&self, ctx: &AdminContext, mode: SessionCheckMode) -> ServiceResult<()>;
    fn allowed_to(&self, ctx: &AdminContext, permission: &str) -> bool;

    fn list_categories(&self, query: &ListQuery) -> ServiceResult<Page<Category>>;
    fn get_category(&self, id: i64) -> ServiceResult<Option<Category>>;
    fn save_category(&self, category: Category) -> ServiceResult<i64>;
    fn delete_category(&self, id: i64) -> ServiceResult<()>;

    fn list_children(&self, query: &ListQuery) -> ServiceResult<Page<Child>>;
    fn get_child(&self, id: i64) -> ServiceResult<Option<Child>>;
    fn save_child(&self, child: Child) -> ServiceResult<i64>;
    fn delete_child(&self, id: i64) -> ServiceResult<()>;
    fn adjust_child_coins(&self, id: i64, delta: i64) -> ServiceResult<i64>;

    fn list_parents(&self, query: &ListQuery) -> ServiceResult<Page<Parent>>;
    fn get_parent(&self, id: i64) -> ServiceResult<Option<Parent>>;
    fn save_parent(&self, parent: Parent) -> ServiceResult<i64>;
    fn delete_parent(&self, id: i64) -> ServiceResult<()>;
    fn children_of_parent(&self, parent_id: i64) -> ServiceResult<Vec<Child>>;

    fn list_tasks(&self, query: &ListQuery) -> ServiceResult<Page<TaskItem>>;
    fn get_task(&self, id: i64) -> ServiceResult<Option<TaskItem>>;
    fn save_task(&self, task: TaskItem) -> ServiceResult<i64>;
    fn delete_task(&self, id: i64) -> ServiceResult<()>;

    fn list_levels(&self, query: &ListQuery) -> ServiceResult<Page<Level>>;
    fn get_level(&self, id: i64) -> ServiceResult<Option<Level>>;
    fn save_level(&self, level: Level) -> ServiceResult<i64>;
    fn delete_level(&self, id: i64) -> ServiceResult<()>;

    fn list_plans(&self, query: &ListQuery) -> ServiceResult<Page<Plan>>;
    fn get_plan(&self, id: i64) -> ServiceResult<Option<Plan>>;
    fn save_plan(&self, plan: Plan) -> ServiceResult<i64>;
    fn delete_plan(&self, id: i64) -> ServiceResult<()>;
    fn set_plan_active(&self, id: i64, active: bool) -> ServiceResult<()>;

    fn list_gifts(&self, query: &ListQuery) -> ServiceResult<Page<Gift>>;
    fn get_gift(&self, id: i64) -> ServiceResult<Option<Gift>>;
    fn save_gift(&self, gift: Gift) -> ServiceResult<i64>;
    fn delete_gift(&self, id: i64) -> ServiceResult<()>;
    fn adjust_gift_stock(&self, id: i64, delta: i64) -> ServiceResult<i64>;

    fn list_word_games(&self, query: &ListQuery) -> ServiceResult<Page<WordGame>>;
    fn get_word_game(&self, id: i64) -> ServiceResult<Option<WordGame>>;
    fn save_word_game(&self, game: WordGame) -> ServiceResult<i64>;
    fn delete_word_game(&self, id: i64) -> ServiceResult<()>;

    fn list_notifications(&self, query: &ListQuery) -> ServiceResult<Page<NotificationItem>>;
    fn get_notification(&self, id: i64) -> ServiceResult<Option<NotificationItem>>;
    fn save_notification(&self, notification: NotificationItem) -> ServiceResult<i64>;
    fn delete_notification(&self, id: i64) -> ServiceResult<()>;
    fn mark_notification_sent(&self, id: i64) -> ServiceResult<DateTime<Utc>>;

    fn list_payments(
        &self,
        query: &ListQuery,
        status: Option<PaymentStatus>,
    ) -> ServiceResult<Page<Payment>>;
    fn get_payment(&self, id: i64) -> ServiceResult<Option<Payment>>;
    fn refund_payment(&self, id: i64) -> ServiceResult<()>;

    fn log_action(&self, action: &str, actor_id: Option<i64>, details: &Value)
        -> ServiceResult<()>;
    fn list_audit_log(&self) -> ServiceResult<Vec<AuditEntry>>;
    fn dashboard_counts(&self) -> ServiceResult<DashboardCounts>;
}

pub fn ensure(condition: bool, error: AdminError) -> ServiceResult<()> {
    if condition {
        Ok(())
    } else {
        Err(error)
    }
}

pub fn push_to_array<T: Serialize>(bag: &mut DataBag, key: &str, value: T) {
    let mut existing = bag
        .inner
        .get(key)
        .cloned()
        .and_then(|val| val.as_array().cloned())
        .unwrap_or_default();
    existing.push(serde_json::to_value(value).unwrap_or(Value::Null));
    bag.set(key, Value::Array(existing));
}

/// Exposes the count envelope and the pagination strip for a list page.
/// Screens still publish their own row arrays; this covers the part they
/// all share.
pub fn expose_pagination<T>(ctx: &mut AdminContext, page: &Page<T>) {
    ctx.context.set("list_count", page.count);
    ctx.context.set("page_count", page.page_count);
    ctx.context.set("page_number", page.page_number);
    ctx.context.set("page_size", page.page_size);
    ctx.context
        .set("page_links", page_tokens(page.page_number, page.page_count));
}

/// Slices a filtered record set into the envelope shape. The requested page
/// is clamped into range here so every screen sees an in-range
/// `page_number`, also after deletes shrink the set.
pub fn paginate<T>(records: Vec<T>, query: &ListQuery) -> Page<T> {
    let page_size = query.page_size.max(1);
    let count = records.len() as i64;
    let page_count = total_pages(count, page_size);
    let page_number = clamp_page(query.page, page_count);
    let start = ((page_number - 1) * page_size) as usize;
    let items = records
        .into_iter()
        .skip(start)
        .take(page_size as usize)
        .collect();
    Page {
        items,
        count,
        page_count,
        page_number,
        page_size,
    }
}

fn search_matches(search: Option<&str>, fields: &[&str]) -> bool {
    match search {
        None => true,
        Some(needle) => {
            let needle = needle.to_lowercase();
            fields
                .iter()
                .any(|field| field.to_lowercase().contains(&needle))
        }
    }
}

/// UI strings per screen, shared by both service implementations so the
/// remote adapter does not round-trip for static labels.
pub(crate) fn screen_labels(screen: &str) -> &'static [(&'static str, &'static str)] {
    match screen {
        "dashboard" => &[
            ("title", "Dashboard"),
            ("welcome", "Welcome back"),
            ("pending_payments", "Payments awaiting review"),
        ],
        "categories" => &[
            ("title", "Task Categories"),
            ("add", "New category"),
            ("color", "Badge color"),
        ],
        "children" => &[
            ("title", "Children"),
            ("add", "New child"),
            ("coins", "Coin balance"),
        ],
        "parents" => &[
            ("title", "Parents"),
            ("add", "New parent"),
            ("children", "Linked children"),
        ],
        "tasks" => &[
            ("title", "Tasks"),
            ("add", "New task"),
            ("reward", "Coin reward"),
        ],
        "levels" => &[("title", "Levels"), ("add", "New level")],
        "plans" => &[
            ("title", "Subscription Plans"),
            ("add", "New plan"),
            ("price", "Price"),
        ],
        "gifts" => &[
            ("title", "Gift Shop"),
            ("add", "New gift"),
            ("stock", "In stock"),
        ],
        "word_games" => &[("title", "Word Games"), ("add", "New word")],
        "notifications" => &[
            ("title", "Notifications"),
            ("add", "New notification"),
            ("send", "Send now"),
        ],
        "payments" => &[("title", "Payments"), ("refund", "Refund")],
        _ => &[],
    }
}

#[derive(Default)]
struct InMemoryState {
    categories: HashMap<i64, Category>,
    next_category_id: i64,
    children: HashMap<i64, Child>,
    next_child_id: i64,
    parents: HashMap<i64, Parent>,
    next_parent_id: i64,
    tasks: HashMap<i64, TaskItem>,
    next_task_id: i64,
    levels: HashMap<i64, Level>,
    next_level_id: i64,
    plans: HashMap<i64, Plan>,
    next_plan_id: i64,
    gifts: HashMap<i64, Gift>,
    next_gift_id: i64,
    word_games: HashMap<i64, WordGame>,
    next_word_game_id: i64,
    notifications: HashMap<i64, NotificationItem>,
    next_notification_id: i64,
    payments: HashMap<i64, Payment>,
    audit_log: Vec<AuditEntry>,
    next_audit_id: i64,
}

#[derive(Clone)]
pub struct InMemoryService {
    state: Arc<Mutex<InMemoryState>>,
}

impl InMemoryService {
    pub fn new_with_sample() -> Self {
        let mut state = InMemoryState::default();
        let joined = Utc::now() - Duration::days(90);

        for (id, name, color, position) in [
            (1, "Chores", "#ffb703", 1),
            (2, "Homework", "#219ebc", 2),
            (3, "Reading", "#8ecae6", 3),
        ] {
            state.categories.insert(
                id,
                Category {
                    id: Some(id),
                    name: name.into(),
                    color: color.into(),
                    position,
                    created_at: Some(joined),
                },
            );
        }
        state.next_category_id = 4;

        for (id, name, rank, min_coins) in
            [(1, "Sprout", 1, 0), (2, "Explorer", 2, 100), (3, "Champion", 3, 400)]
        {
            state.levels.insert(
                id,
                Level {
                    id: Some(id),
                    name: name.into(),
                    rank,
                    min_coins,
                },
            );
        }
        state.next_level_id = 4;

        for (id, name, price_cents, duration_days, description, active) in [
            (1, "Free", 0, 365, "One child, three tasks a week", true),
            (2, "Family Monthly", 499, 30, "Unlimited children and tasks", true),
            (3, "Family Yearly", 4999, 365, "Two months free", true),
        ] {
            state.plans.insert(
                id,
                Plan {
                    id: Some(id),
                    name: name.into(),
                    price_cents,
                    duration_days,
                    description: description.into(),
                    active,
                },
            );
        }
        state.next_plan_id = 4;

        for (id, name, email, phone, plan_id) in [
            (1, "Maria Lopez", "maria@example.com", "+34 600 111 222", Some(2)),
            (2, "David Kim", "david@example.com", "+82 10 2222 3333", None),
        ] {
            state.parents.insert(
                id,
                Parent {
                    id: Some(id),
                    name: name.into(),
                    email: email.into(),
                    phone: phone.into(),
                    plan_id,
                    created_at: Some(joined),
                },
            );
        }
        state.next_parent_id = 3;

        for (id, name, age, parent_id, level_id, coins) in [
            (1, "Emma", 8, 1, Some(1), 120),
            (2, "Lucas", 10, 1, Some(2), 260),
            (3, "Sofia", 7, 2, Some(1), 40),
        ] {
            state.children.insert(
                id,
                Child {
                    id: Some(id),
                    name: name.into(),
                    age,
                    parent_id,
                    level_id,
                    coins,
                    created_at: Some(joined),
                },
            );
        }
        state.next_child_id = 4;

        for (id, title, description, category_id, reward_coins) in [
            (1, "Make the bed", "Every morning before school", 1, 10),
            (2, "Finish math worksheet", "Pages assigned by the teacher", 2, 25),
            (3, "Read 20 minutes", "Any book from the shelf", 3, 15),
        ] {
            state.tasks.insert(
                id,
                TaskItem {
                    id: Some(id),
                    title: title.into(),
                    description: description.into(),
                    category_id,
                    reward_coins,
                    active: true,
                    created_at: Some(joined),
                },
            );
        }
        state.next_task_id = 4;

        for (id, name, cost_coins, stock, description) in [
            (1, "Cinema ticket", 300, 5, "One matinee showing"),
            (2, "Sticker pack", 50, 40, "Twelve holographic stickers"),
        ] {
            state.gifts.insert(
                id,
                Gift {
                    id: Some(id),
                    name: name.into(),
                    cost_coins,
                    stock,
                    description: description.into(),
                },
            );
        }
        state.next_gift_id = 3;

        for (id, word, hint, reward_coins) in [
            (1, "rocket", "It flies all the way to space", 5),
            (2, "panda", "Black and white and loves bamboo", 5),
        ] {
            state.word_games.insert(
                id,
                WordGame {
                    id: Some(id),
                    word: word.into(),
                    hint: hint.into(),
                    reward_coins,
                },
            );
        }
        state.next_word_game_id = 3;

        state.notifications.insert(
            1,
            NotificationItem {
                id: Some(1),
                title: "Welcome aboard".into(),
                body: "Thanks for joining EduCoin!".into(),
                audience: NotificationAudience::All,
                created_at: Some(joined),
                sent_at: Some(joined + Duration::hours(1)),
            },
        );
        state.notifications.insert(
            2,
            NotificationItem {
                id: Some(2),
                title: "Summer reading challenge".into(),
                body: "Double coins for reading tasks in August.".into(),
                audience: NotificationAudience::Children,
                created_at: Some(Utc::now() - Duration::days(2)),
                sent_at: None,
            },
        );
        state.next_notification_id = 3;

        for (id, parent_id, plan_id, amount_cents, status, days_ago) in [
            (1, 1, 2, 499, PaymentStatus::Completed, 20),
            (2, 2, 3, 4999, PaymentStatus::Pending, 3),
            (3, 1, 2, 499, PaymentStatus::Failed, 50),
        ] {
            state.payments.insert(
                id,
                Payment {
                    id,
                    parent_id,
                    plan_id,
                    amount_cents,
                    currency: "EUR".into(),
                    status,
                    paid_at: Utc::now() - Duration::days(days_ago),
                },
            );
        }

        state.next_audit_id = 1;

        Self {
            state: Arc::new(Mutex::new(state)),
        }
    }
}

impl Default for InMemoryService {
    fn default() -> Self {
        Self::new_with_sample()
    }
}

impl AdminService for InMemoryService {
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
        let state = self.state.lock().unwrap();
        let mut records: Vec<Category> = state
            .categories
            .values()
            .filter(|category| search_matches(query.search.as_deref(), &[&category.name]))
            .cloned()
            .collect();
        records.sort_by(|a, b| (a.position, a.id).cmp(&(b.position, b.id)));
        Ok(paginate(records, query))
    }

    fn get_category(&self, id: i64) -> ServiceResult<Option<Category>> {
        let state = self.state.lock().unwrap();
        Ok(state.categories.get(&id).cloned())
    }

    fn save_category(&self, mut category: Category) -> ServiceResult<i64> {
        ensure(
            !category.name.trim().is_empty(),
            AdminError::Validation("category_name".into()),
        )?;
        let mut state = self.state.lock().unwrap();
        let id = match category.id {
            Some(id) => {
                ensure(
                    state.categories.contains_key(&id),
                    AdminError::NotFound(format!("category {id}")),
                )?;
                id
            }
            None => {
                let id = state.next_category_id;
                state.next_category_id += 1;
                category.id = Some(id);
                category.created_at = Some(Utc::now());
                id
            }
        };
        state.categories.insert(id, category);
        Ok(id)
    }

    fn delete_category(&self, id: i64) -> ServiceResult<()> {
        let mut state = self.state.lock().unwrap();
        ensure(
            state.categories.contains_key(&id),
            AdminError::NotFound(format!("category {id}")),
        )?;
        ensure(
            !state.tasks.values().any(|task| task.category_id == id),
            AdminError::Validation("category_in_use".into()),
        )?;
        state.categories.remove(&id);
        Ok(())
    }

    fn list_children(&self, query: &ListQuery) -> ServiceResult<Page<Child>> {
        let state = self.state.lock().unwrap();
        let mut records: Vec<Child> = state
            .children
            .values()
            .filter(|child| search_matches(query.search.as_deref(), &[&child.name]))
            .cloned()
            .collect();
        records.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(paginate(records, query))
    }

    fn get_child(&self, id: i64) -> ServiceResult<Option<Child>> {
        let state = self.state.lock().unwrap();
        Ok(state.children.get(&id).cloned())
    }

    fn save_child(&self, mut child: Child) -> ServiceResult<i64> {
        ensure(
            !child.name.trim().is_empty(),
            AdminError::Validation("child_name".into()),
        )?;
        let mut state = self.state.lock().unwrap();
        ensure(
            state.parents.contains_key(&child.parent_id),
            AdminError::Validation("unknown_parent".into()),
        )?;
        if let Some(level_id) = child.level_id {
            ensure(
                state.levels.contains_key(&level_id),
                AdminError::Validation("unknown_level".into()),
            )?;
        }
        let id = match child.id {
            Some(id) => {
                ensure(
                    state.children.contains_key(&id),
                    AdminError::NotFound(format!("child {id}")),
                )?;
                id
            }
            None => {
                let id = state.next_child_id;
                state.next_child_id += 1;
                child.id = Some(id);
                child.created_at = Some(Utc::now());
                id
            }
        };
        state.children.insert(id, child);
        Ok(id)
    }

    fn delete_child(&self, id: i64) -> ServiceResult<()> {
        let mut state = self.state.lock().unwrap();
        ensure(
            state.children.contains_key(&id),
            AdminError::NotFound(format!("child {id}")),
        )?;
        state.children.remove(&id);
        Ok(())
    }

    fn adjust_child_coins(&self, id: i64, delta: i64) -> ServiceResult<i64> {
        let mut state = self.state.lock().unwrap();
        let child = state
            .children
            .get_mut(&id)
            .ok_or_else(|| AdminError::NotFound(format!("child {id}")))?;
        let next = child.coins + delta;
        ensure(next >= 0, AdminError::Validation("coins_negative".into()))?;
        child.coins = next;
        Ok(next)
    }

    fn list_parents(&self, query: &ListQuery) -> ServiceResult<Page<Parent>> {
        let state = self.state.lock().unwrap();
        let mut records: Vec<Parent> = state
            .parents
            .values()
            .filter(|parent| {
                search_matches(query.search.as_deref(), &[&parent.name, &parent.email])
            })
            .cloned()
            .collect();
        records.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(paginate(records, query))
    }

    fn get_parent(&self, id: i64) -> ServiceResult<Option<Parent>> {
        let state = self.state.lock().unwrap();
        Ok(state.parents.get(&id).cloned())
    }

    fn save_parent(&self, mut parent: Parent) -> ServiceResult<i64> {
        ensure(
            !parent.name.trim().is_empty(),
            AdminError::Validation("parent_name".into()),
        )?;
        let mut state = self.state.lock().unwrap();
        if let Some(plan_id) = parent.plan_id {
            ensure(
                state.plans.contains_key(&plan_id),
                AdminError::Validation("unknown_plan".into()),
            )?;
        }
        let id = match parent.id {
            Some(id) => {
                ensure(
                    state.parents.contains_key(&id),
                    AdminError::NotFound(format!("parent {id}")),
                )?;
                id
            }
            None => {
                let id = state.next_parent_id;
                state.next_parent_id += 1;
                parent.id = Some(id);
                parent.created_at = Some(Utc::now());
                id
            }
        };
        state.parents.insert(id, parent);
        Ok(id)
    }

    fn delete_parent(&self, id: i64) -> ServiceResult<()> {
        let mut state = self.state.lock().unwrap();
        ensure(
            state.parents.contains_key(&id),
            AdminError::NotFound(format!("parent {id}")),
        )?;
        ensure(
            !state.children.values().any(|child| child.parent_id == id),
            AdminError::Validation("parent_has_children".into()),
        )?;
        state.parents.remove(&id);
        Ok(())
    }

    fn children_of_parent(&self, parent_id: i64) -> ServiceResult<Vec<Child>> {
        let state = self.state.lock().unwrap();
        let mut children: Vec<Child> = state
            .children
            .values()
            .filter(|child| child.parent_id == parent_id)
            .cloned()
            .collect();
        children.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(children)
    }

    fn list_tasks(&self, query: &ListQuery) -> ServiceResult<Page<TaskItem>> {
        let state = self.state.lock().unwrap();
        let mut records: Vec<TaskItem> = state
            .tasks
            .values()
            .filter(|task| {
                search_matches(query.search.as_deref(), &[&task.title, &task.description])
            })
            .cloned()
            .collect();
        records.sort_by_key(|task| task.id);
        Ok(paginate(records, query))
    }

    fn get_task(&self, id: i64) -> ServiceResult<Option<TaskItem>> {
        let state = self.state.lock().unwrap();
        Ok(state.tasks.get(&id).cloned())
    }

    fn save_task(&self, mut task: TaskItem) -> ServiceResult<i64> {
        ensure(
            !task.title.trim().is_empty(),
            AdminError::Validation("task_title".into()),
        )?;
        let mut state = self.state.lock().unwrap();
        ensure(
            state.categories.contains_key(&task.category_id),
            AdminError::Validation("unknown_category".into()),
        )?;
        let id = match task.id {
            Some(id) => {
                ensure(
                    state.tasks.contains_key(&id),
                    AdminError::NotFound(format!("task {id}")),
                )?;
                id
            }
            None => {
                let id = state.next_task_id;
                state.next_task_id += 1;
                task.id = Some(id);
                task.created_at = Some(Utc::now());
                id
            }
        };
        state.tasks.insert(id, task);
        Ok(id)
    }

    fn delete_task(&self, id: i64) -> ServiceResult<()> {
        let mut state = self.state.lock().unwrap();
        ensure(
            state.tasks.contains_key(&id),
            AdminError::NotFound(format!("task {id}")),
        )?;
        state.tasks.remove(&id);
        Ok(())
    }

    fn list_levels(&self, query: &ListQuery) -> ServiceResult<Page<Level>> {
        let state = self.state.lock().unwrap();
        let mut records: Vec<Level> = state
            .levels
            .values()
            .filter(|level| search_matches(query.search.as_deref(), &[&level.name]))
            .cloned()
            .collect();
        records.sort_by_key(|level| level.rank);
        Ok(paginate(records, query))
    }

    fn get_level(&self, id: i64) -> ServiceResult<Option<Level>> {
        let state = self.state.lock().unwrap();
        Ok(state.levels.get(&id).cloned())
    }

    fn save_level(&self, mut level: Level) -> ServiceResult<i64> {
        ensure(
            !level.name.trim().is_empty(),
            AdminError::Validation("level_name".into()),
        )?;
        let mut state = self.state.lock().unwrap();
        let duplicate_rank = state
            .levels
            .values()
            .any(|existing| existing.rank == level.rank && existing.id != level.id);
        ensure(!duplicate_rank, AdminError::Validation("duplicate_rank".into()))?;
        let id = match level.id {
            Some(id) => {
                ensure(
                    state.levels.contains_key(&id),
                    AdminError::NotFound(format!("level {id}")),
                )?;
                id
            }
            None => {
                let id = state.next_level_id;
                state.next_level_id += 1;
                level.id = Some(id);
                id
            }
        };
        state.levels.insert(id, level);
        Ok(id)
    }

    fn delete_level(&self, id: i64) -> ServiceResult<()> {
        let mut state = self.state.lock().unwrap();
        ensure(
            state.levels.contains_key(&id),
            AdminError::NotFound(format!("level {id}")),
        )?;
        ensure(
            !state
                .children
                .values()
                .any(|child| child.level_id == Some(id)),
            AdminError::Validation("level_in_use".into()),
        )?;
        state.levels.remove(&id);
        Ok(())
    }

    fn list_plans(&self, query: &ListQuery) -> ServiceResult<Page<Plan>> {
        let state = self.state.lock().unwrap();
        let mut records: Vec<Plan> = state
            .plans
            .values()
            .filter(|plan| search_matches(query.search.as_deref(), &[&plan.name]))
            .cloned()
            .collect();
        records.sort_by_key(|plan| (plan.price_cents, plan.id));
        Ok(paginate(records, query))
    }

    fn get_plan(&self, id: i64) -> ServiceResult<Option<Plan>> {
        let state = self.state.lock().unwrap();
        Ok(state.plans.get(&id).cloned())
    }

    fn save_plan(&self, mut plan: Plan) -> ServiceResult<i64> {
        ensure(
            !plan.name.trim().is_empty(),
            AdminError::Validation("plan_name".into()),
        )?;
        let mut state = self.state.lock().unwrap();
        let id = match plan.id {
            Some(id) => {
                ensure(
                    state.plans.contains_key(&id),
                    AdminError::NotFound(format!("plan {id}")),
                )?;
                id
            }
            None => {
                let id = state.next_plan_id;
                state.next_plan_id += 1;
                plan.id = Some(id);
                id
            }
        };
        state.plans.insert(id, plan);
        Ok(id)
    }

    fn delete_plan(&self, id: i64) -> ServiceResult<()> {
        let mut state = self.state.lock().unwrap();
        ensure(
            state.plans.contains_key(&id),
            AdminError::NotFound(format!("plan {id}")),
        )?;
        ensure(
            !state
                .parents
                .values()
                .any(|parent| parent.plan_id == Some(id)),
            AdminError::Validation("plan_in_use".into()),
        )?;
        state.plans.remove(&id);
        Ok(())
    }

    fn set_plan_active(&self, id: i64, active: bool) -> ServiceResult<()> {
        let mut state = self.state.lock().unwrap();
        let plan = state
            .plans
            .get_mut(&id)
            .ok_or_else(|| AdminError::NotFound(format!("plan {id}")))?;
        plan.active = active;
        Ok(())
    }

    fn list_gifts(&self, query: &ListQuery) -> ServiceResult<Page<Gift>> {
        let state = self.state.lock().unwrap();
        let mut records: Vec<Gift> = state
            .gifts
            .values()
            .filter(|gift| search_matches(query.search.as_deref(), &[&gift.name]))
            .cloned()
            .collect();
        records.sort_by_key(|gift| gift.id);
        Ok(paginate(records, query))
    }

    fn get_gift(&self, id: i64) -> ServiceResult<Option<Gift>> {
        let state = self.state.lock().unwrap();
        Ok(state.gifts.get(&id).cloned())
    }

    fn save_gift(&self, mut gift: Gift) -> ServiceResult<i64> {
        ensure(
            !gift.name.trim().is_empty(),
            AdminError::Validation("gift_name".into()),
        )?;
        ensure(
            gift.cost_coins >= 1,
            AdminError::Validation("gift_cost".into()),
        )?;
        let mut state = self.state.lock().unwrap();
        let id = match gift.id {
            Some(id) => {
                ensure(
                    state.gifts.contains_key(&id),
                    AdminError::NotFound(format!("gift {id}")),
                )?;
                id
            }
            None => {
                let id = state.next_gift_id;
                state.next_gift_id += 1;
                gift.id = Some(id);
                id
            }
        };
        state.gifts.insert(id, gift);
        Ok(id)
    }

    fn delete_gift(&self, id: i64) -> ServiceResult<()> {
        let mut state = self.state.lock().unwrap();
        ensure(
            state.gifts.contains_key(&id),
            AdminError::NotFound(format!("gift {id}")),
        )?;
        state.gifts.remove(&id);
        Ok(())
    }

    fn adjust_gift_stock(&self, id: i64, delta: i64) -> ServiceResult<i64> {
        let mut state = self.state.lock().unwrap();
        let gift = state
            .gifts
            .get_mut(&id)
            .ok_or_else(|| AdminError::NotFound(format!("gift {id}")))?;
        let next = gift.stock + delta;
        ensure(next >= 0, AdminError::Validation("stock_negative".into()))?;
        gift.stock = next;
        Ok(next)
    }

    fn list_word_games(&self, query: &ListQuery) -> ServiceResult<Page<WordGame>> {
        let state = self.state.lock().unwrap();
        let mut records: Vec<WordGame> = state
            .word_games
            .values()
            .filter(|game| search_matches(query.search.as_deref(), &[&game.word, &game.hint]))
            .cloned()
            .collect();
        records.sort_by(|a, b| a.word.cmp(&b.word));
        Ok(paginate(records, query))
    }

    fn get_word_game(&self, id: i64) -> ServiceResult<Option<WordGame>> {
        let state = self.state.lock().unwrap();
        Ok(state.word_games.get(&id).cloned())
    }

    fn save_word_game(&self, mut game: WordGame) -> ServiceResult<i64> {
        ensure(
            !game.word.trim().is_empty(),
            AdminError::Validation("word".into()),
        )?;
        let mut state = self.state.lock().unwrap();
        let id = match game.id {
            Some(id) => {
                ensure(
                    state.word_games.contains_key(&id),
                    AdminError::NotFound(format!("word game {id}")),
                )?;
                id
            }
            None => {
                let id = state.next_word_game_id;
                state.next_word_game_id += 1;
                game.id = Some(id);
                id
            }
        };
        state.word_games.insert(id, game);
        Ok(id)
    }

    fn delete_word_game(&self, id: i64) -> ServiceResult<()> {
        let mut state = self.state.lock().unwrap();
        ensure(
            state.word_games.contains_key(&id),
            AdminError::NotFound(format!("word game {id}")),
        )?;
        state.word_games.remove(&id);
        Ok(())
    }

    fn list_notifications(&self, query: &ListQuery) -> ServiceResult<Page<NotificationItem>> {
        let state = self.state.lock().unwrap();
        let mut records: Vec<NotificationItem> = state
            .notifications
            .values()
            .filter(|item| search_matches(query.search.as_deref(), &[&item.title, &item.body]))
            .cloned()
            .collect();
        records.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(paginate(records, query))
    }

    fn get_notification(&self, id: i64) -> ServiceResult<Option<NotificationItem>> {
        let state = self.state.lock().unwrap();
        Ok(state.notifications.get(&id).cloned())
    }

    fn save_notification(&self, mut notification: NotificationItem) -> ServiceResult<i64> {
        ensure(
            !notification.title.trim().is_empty(),
            AdminError::Validation("notification_title".into()),
        )?;
        let mut state = self.state.lock().unwrap();
        let id = match notification.id {
            Some(id) => {
                ensure(
                    state.notifications.contains_key(&id),
                    AdminError::NotFound(format!("notification {id}")),
                )?;
                id
            }
            None => {
                let id = state.next_notification_id;
                state.next_notification_id += 1;
                notification.id = Some(id);
                notification.created_at = Some(Utc::now());
                id
            }
        };
        state.notifications.insert(id, notification);
        Ok(id)
    }

    fn delete_notification(&self, id: i64) -> ServiceResult<()> {
        let mut state = self.state.lock().unwrap();
        ensure(
            state.notifications.contains_key(&id),
            AdminError::NotFound(format!("notification {id}")),
        )?;
        state.notifications.remove(&id);
        Ok(())
    }

    fn mark_notification_sent(&self, id: i64) -> ServiceResult<DateTime<Utc>> {
        let mut state = self.state.lock().unwrap();
        let notification = state
            .notifications
            .get_mut(&id)
            .ok_or_else(|| AdminError::NotFound(format!("notification {id}")))?;
        ensure(
            notification.sent_at.is_none(),
            AdminError::Validation("already_sent".into()),
        )?;
        let sent = Utc::now();
        notification.sent_at = Some(sent);
        Ok(sent)
    }

    fn list_payments(
        &self,
        query: &ListQuery,
        status: Option<PaymentStatus>,
    ) -> ServiceResult<Page<Payment>> {
        let state = self.state.lock().unwrap();
        let mut records: Vec<Payment> = state
            .payments
            .values()
            .filter(|payment| status.map(|s| payment.status == s).unwrap_or(true))
            .filter(|payment| {
                let parent_name = state
                    .parents
                    .get(&payment.parent_id)
                    .map(|parent| parent.name.clone())
                    .unwrap_or_default();
                search_matches(query.search.as_deref(), &[&parent_name, &payment.currency])
            })
            .cloned()
            .collect();
        records.sort_by(|a, b| b.paid_at.cmp(&a.paid_at));
        Ok(paginate(records, query))
    }

    fn get_payment(&self, id: i64) -> ServiceResult<Option<Payment>> {
        let state = self.state.lock().unwrap();
        Ok(state.payments.get(&id).cloned())
    }

    fn refund_payment(&self, id: i64) -> ServiceResult<()> {
        let mut state = self.state.lock().unwrap();
        let payment = state
            .payments
            .get_mut(&id)
            .ok_or_else(|| AdminError::NotFound(format!("payment {id}")))?;
        ensure(
            payment.status == PaymentStatus::Completed,
            AdminError::Validation("not_refundable".into()),
        )?;
        payment.status = PaymentStatus::Refunded;
        Ok(())
    }

    fn log_action(
        &self,
        action: &str,
        actor_id: Option<i64>,
        details: &Value,
    ) -> ServiceResult<()> {
        let mut state = self.state.lock().unwrap();
        let id = state.next_audit_id;
        state.next_audit_id += 1;
        state.audit_log.push(AuditEntry {
            id,
            action: action.to_string(),
            actor_id,
            details: details.clone(),
            logged_at: Utc::now(),
        });
        Ok(())
    }

    fn list_audit_log(&self) -> ServiceResult<Vec<AuditEntry>> {
        let state = self.state.lock().unwrap();
        Ok(state.audit_log.clone())
    }

    fn dashboard_counts(&self) -> ServiceResult<DashboardCounts> {
        let state = self.state.lock().unwrap();
        Ok(DashboardCounts {
            categories: state.categories.len() as i64,
            children: state.children.len() as i64,
            parents: state.parents.len() as i64,
            tasks: state.tasks.len() as i64,
            levels: state.levels.len() as i64,
            plans: state.plans.len() as i64,
            gifts: state.gifts.len() as i64,
            word_games: state.word_games.len() as i64,
            notifications: state.notifications.len() as i64,
            payments: state.payments.len() as i64,
            pending_payments: state
                .payments
                .values()
                .filter(|payment| payment.status == PaymentStatus::Pending)
                .count() as i64,
        })
    }
}
