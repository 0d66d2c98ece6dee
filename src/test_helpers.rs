use std::collections::HashMap;
use std::io::Cursor;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine};
use chrono::{DateTime, Utc};
use jsonwebtoken::{encode, EncodingKey, Header};
use sqlx::postgres::PgPoolOptions;
use uuid::Uuid;

use crate::{
    config::Config,
    db::store::{CommentStore, ElderStore, NewReportBatch, ReportFilter, ReportScope, ReportStore},
    models::{
        auth::{AuthenticatedUser, Claims},
        comment::CommentRecord,
        elder::{Elder, ElderContacts},
        health::ReportHealth,
        report::{LinkedImage, ReadReceipt, ReportRecord},
        user::UserRole,
    },
    services::{
        images::ImageStorage,
        notifications::{NotificationService, PushMessage, PushTransport},
    },
    AppState,
};

pub const TEST_SECRET: &str = "test-secret";

pub fn access_token(user_id: i64, role: UserRole, secret: &str) -> String {
    let now = Utc::now().timestamp() as usize;
    let claims = Claims {
        sub: user_id.to_string(),
        role,
        exp: now + 3600,
        iat: now,
    };
    encode(&Header::default(), &claims, &EncodingKey::from_secret(secret.as_bytes())).unwrap()
}

pub fn png_base64() -> String {
    let img = image::RgbImage::from_pixel(4, 4, image::Rgb([10, 200, 90]));
    let mut bytes = Vec::new();
    img.write_to(&mut Cursor::new(&mut bytes), image::ImageFormat::Png).unwrap();
    STANDARD.encode(bytes)
}

#[derive(Debug, Clone)]
struct StoredReport {
    id: i64,
    user_id: i64,
    center_id: i64,
    elder_id: i64,
    content: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
struct StoredComment {
    id: i64,
    report_id: i64,
    user_id: i64,
    message: String,
    created_at: DateTime<Utc>,
}

#[derive(Default)]
struct MemoryState {
    next_id: i64,
    users: HashMap<i64, (UserRole, Option<String>)>,
    center_owners: HashMap<i64, i64>,
    elders: Vec<Elder>,
    protectors: Vec<(i64, i64)>,
    reports: Vec<StoredReport>,
    health: Vec<ReportHealth>,
    images: Vec<(i64, String)>,
    image_links: Vec<(i64, i64)>,
    reads: Vec<ReadReceipt>,
    comments: Vec<StoredComment>,
    fail_batches: bool,
}

impl MemoryState {
    fn next_id(&mut self) -> i64 {
        self.next_id += 1;
        self.next_id
    }

    fn elder(&self, id: i64) -> Option<&Elder> {
        self.elders.iter().find(|e| e.id == id)
    }

    fn record(&self, report: &StoredReport) -> ReportRecord {
        let (role, image) = self
            .users
            .get(&report.user_id)
            .cloned()
            .unwrap_or((UserRole::Center, None));
        ReportRecord {
            id: report.id,
            user_id: report.user_id,
            author_image: image,
            author_role: role.to_string(),
            center_id: report.center_id,
            elder_id: report.elder_id,
            elder_name: self.elder(report.elder_id).map(|e| e.name.clone()).unwrap_or_default(),
            content: report.content.clone(),
            created_at: report.created_at,
            updated_at: report.updated_at,
        }
    }

    fn comment(&self, comment: &StoredComment) -> CommentRecord {
        let role = self
            .users
            .get(&comment.user_id)
            .map(|(role, _)| role.to_string())
            .unwrap_or_default();
        CommentRecord {
            id: comment.id,
            report_id: comment.report_id,
            user_id: comment.user_id,
            author_role: role,
            message: comment.message.clone(),
            created_at: comment.created_at,
            updated_at: comment.created_at,
        }
    }

    fn in_scope(&self, report: &StoredReport, scope: ReportScope) -> bool {
        match scope {
            ReportScope::Center => true,
            ReportScope::ProtectedBy(user_id) => self
                .protectors
                .iter()
                .any(|&(elder, user)| elder == report.elder_id && user == user_id),
            ReportScope::GuardedBy(user_id) => self
                .elder(report.elder_id)
                .is_some_and(|e| e.guardian_id == Some(user_id)),
        }
    }
}

/// In-memory stand-in for the Postgres store with the same ordering and
/// cascade rules.
#[derive(Clone, Default)]
pub struct MemoryStore {
    state: Arc<Mutex<MemoryState>>,
}

impl MemoryStore {
    fn lock(&self) -> MutexGuard<'_, MemoryState> {
        self.state.lock().unwrap()
    }

    pub fn add_user(&self, id: i64, role: UserRole) {
        self.lock().users.insert(id, (role, None));
    }

    pub fn add_center(&self, id: i64, owner_id: i64) {
        self.lock().center_owners.insert(id, owner_id);
    }

    pub fn add_elder(&self, id: i64, center_id: i64, guardian_id: Option<i64>, name: &str) {
        self.lock().elders.push(Elder {
            id,
            center_id,
            guardian_id,
            name: name.to_string(),
        });
    }

    pub fn add_protector(&self, elder_id: i64, user_id: i64) {
        self.lock().protectors.push((elder_id, user_id));
    }

    /// Makes every following `insert_batch` fail as a rolled back transaction would.
    pub fn fail_batches(&self) {
        self.lock().fail_batches = true;
    }

    pub fn report_count(&self) -> usize {
        self.lock().reports.len()
    }

    pub fn image_count(&self) -> usize {
        self.lock().images.len()
    }
}

#[async_trait]
impl ElderStore for MemoryStore {
    async fn find_elders(&self, ids: &[i64]) -> anyhow::Result<Vec<Elder>> {
        Ok(self
            .lock()
            .elders
            .iter()
            .filter(|e| ids.contains(&e.id))
            .cloned()
            .collect())
    }

    async fn guardian_elder_in_center(
        &self,
        guardian_id: i64,
        center_id: i64,
    ) -> anyhow::Result<Option<Elder>> {
        let state = self.lock();
        let mut elders: Vec<&Elder> = state
            .elders
            .iter()
            .filter(|e| e.guardian_id == Some(guardian_id) && e.center_id == center_id)
            .collect();
        elders.sort_by_key(|e| e.id);
        Ok(elders.first().map(|e| (*e).clone()))
    }

    async fn elder_contacts(&self, elder_id: i64) -> anyhow::Result<Option<ElderContacts>> {
        let state = self.lock();
        let Some(elder) = state.elder(elder_id) else {
            return Ok(None);
        };
        let Some(&center_owner_id) = state.center_owners.get(&elder.center_id) else {
            return Ok(None);
        };
        let mut protector_ids: Vec<i64> = state
            .protectors
            .iter()
            .filter(|(e, _)| *e == elder_id)
            .map(|(_, u)| *u)
            .collect();
        protector_ids.sort();
        Ok(Some(ElderContacts {
            guardian_id: elder.guardian_id,
            center_owner_id,
            protector_ids,
        }))
    }
}

#[async_trait]
impl ReportStore for MemoryStore {
    async fn insert_batch(&self, batch: &NewReportBatch) -> anyhow::Result<Vec<i64>> {
        let mut state = self.lock();
        if state.fail_batches {
            anyhow::bail!("batch insert failed");
        }

        let now = Utc::now();
        let mut ids = Vec::with_capacity(batch.elder_ids.len());
        for &elder_id in &batch.elder_ids {
            let id = state.next_id();
            state.reports.push(StoredReport {
                id,
                user_id: batch.author_id,
                center_id: batch.center_id,
                elder_id,
                content: batch.content.clone(),
                created_at: now,
                updated_at: now,
            });
            if let Some(h) = &batch.health {
                state.health.push(ReportHealth {
                    report_id: id,
                    mood: h.mood,
                    health: h.health,
                    temperature: h.temperature,
                    meal: h.meal,
                    feces: h.feces,
                    sleep: h.sleep,
                });
            }
            ids.push(id);
        }

        for file in &batch.image_files {
            let image_id = state.next_id();
            state.images.push((image_id, file.clone()));
            for &report_id in &ids {
                state.image_links.push((image_id, report_id));
            }
        }
        Ok(ids)
    }

    async fn list_reports(
        &self,
        filter: &ReportFilter,
    ) -> anyhow::Result<(Vec<ReportRecord>, i64)> {
        let state = self.lock();
        let mut matching: Vec<&StoredReport> = state
            .reports
            .iter()
            .filter(|r| r.center_id == filter.center_id && state.in_scope(r, filter.scope))
            .collect();
        matching.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));

        let count = matching.len() as i64;
        let page = matching
            .into_iter()
            .skip(filter.offset as usize)
            .take(filter.limit as usize)
            .map(|r| state.record(r))
            .collect();
        Ok((page, count))
    }

    async fn find_report(&self, id: i64) -> anyhow::Result<Option<ReportRecord>> {
        let state = self.lock();
        Ok(state.reports.iter().find(|r| r.id == id).map(|r| state.record(r)))
    }

    async fn health_for(&self, report_ids: &[i64]) -> anyhow::Result<Vec<ReportHealth>> {
        let mut rows: Vec<ReportHealth> = self
            .lock()
            .health
            .iter()
            .filter(|h| report_ids.contains(&h.report_id))
            .cloned()
            .collect();
        rows.sort_by_key(|h| h.report_id);
        Ok(rows)
    }

    async fn images_for(&self, report_ids: &[i64]) -> anyhow::Result<Vec<LinkedImage>> {
        let state = self.lock();
        let mut rows: Vec<LinkedImage> = state
            .image_links
            .iter()
            .filter(|(_, report)| report_ids.contains(report))
            .filter_map(|&(image_id, report_id)| {
                state
                    .images
                    .iter()
                    .find(|(id, _)| *id == image_id)
                    .map(|(id, file)| LinkedImage {
                        report_id,
                        id: *id,
                        file: file.clone(),
                    })
            })
            .collect();
        rows.sort_by_key(|i| (i.report_id, i.id));
        Ok(rows)
    }

    async fn readers_for(&self, report_ids: &[i64]) -> anyhow::Result<Vec<ReadReceipt>> {
        Ok(self
            .lock()
            .reads
            .iter()
            .filter(|r| report_ids.contains(&r.report_id))
            .copied()
            .collect())
    }

    async fn mark_read(&self, report_id: i64, user_id: i64) -> anyhow::Result<()> {
        let mut state = self.lock();
        let receipt = ReadReceipt { report_id, user_id };
        if !state.reads.contains(&receipt) {
            state.reads.push(receipt);
        }
        Ok(())
    }

    async fn update_content(
        &self,
        report_id: i64,
        content: Option<&str>,
    ) -> anyhow::Result<bool> {
        let mut state = self.lock();
        let Some(report) = state.reports.iter_mut().find(|r| r.id == report_id) else {
            return Ok(false);
        };
        if let Some(content) = content {
            report.content = Some(content.to_string());
        }
        report.updated_at = Utc::now();
        Ok(true)
    }

    async fn delete_report(&self, report_id: i64) -> anyhow::Result<Option<Vec<String>>> {
        let mut state = self.lock();
        if !state.reports.iter().any(|r| r.id == report_id) {
            return Ok(None);
        }

        let linked: Vec<i64> = state
            .image_links
            .iter()
            .filter(|(_, report)| *report == report_id)
            .map(|(image, _)| *image)
            .collect();

        state.reports.retain(|r| r.id != report_id);
        state.health.retain(|h| h.report_id != report_id);
        state.reads.retain(|r| r.report_id != report_id);
        state.comments.retain(|c| c.report_id != report_id);
        state.image_links.retain(|(_, report)| *report != report_id);

        let still_linked: Vec<i64> = state.image_links.iter().map(|(image, _)| *image).collect();
        let mut removed = Vec::new();
        state.images.retain(|(id, file)| {
            let orphan = linked.contains(id) && !still_linked.contains(id);
            if orphan {
                removed.push(file.clone());
            }
            !orphan
        });
        Ok(Some(removed))
    }
}

#[async_trait]
impl CommentStore for MemoryStore {
    async fn insert_comment(
        &self,
        user_id: i64,
        report_id: i64,
        message: &str,
    ) -> anyhow::Result<CommentRecord> {
        let mut state = self.lock();
        if !state.reports.iter().any(|r| r.id == report_id) {
            anyhow::bail!("report {} does not exist", report_id);
        }
        let comment = StoredComment {
            id: state.next_id(),
            report_id,
            user_id,
            message: message.to_string(),
            created_at: Utc::now(),
        };
        state.comments.push(comment.clone());
        Ok(state.comment(&comment))
    }

    async fn list_comments(&self, report_id: Option<i64>) -> anyhow::Result<Vec<CommentRecord>> {
        let state = self.lock();
        let mut rows: Vec<&StoredComment> = state
            .comments
            .iter()
            .filter(|c| report_id.map_or(true, |id| c.report_id == id))
            .collect();
        rows.sort_by_key(|c| (c.created_at, c.id));
        Ok(rows.into_iter().map(|c| state.comment(c)).collect())
    }

    async fn comments_for(&self, report_ids: &[i64]) -> anyhow::Result<Vec<CommentRecord>> {
        let state = self.lock();
        let mut rows: Vec<&StoredComment> = state
            .comments
            .iter()
            .filter(|c| report_ids.contains(&c.report_id))
            .collect();
        rows.sort_by_key(|c| (c.created_at, c.id));
        Ok(rows.into_iter().map(|c| state.comment(c)).collect())
    }

    async fn find_comment(&self, id: i64) -> anyhow::Result<Option<CommentRecord>> {
        let state = self.lock();
        Ok(state.comments.iter().find(|c| c.id == id).map(|c| state.comment(c)))
    }

    async fn delete_comment(&self, id: i64) -> anyhow::Result<bool> {
        let mut state = self.lock();
        let before = state.comments.len();
        state.comments.retain(|c| c.id != id);
        Ok(state.comments.len() != before)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportMode {
    Deliver,
    Fail,
    Hang,
}

/// Push transport that records what it was asked to send. Every user has a
/// single device `device-<id>` unless `with_devices` says otherwise.
pub struct RecordingTransport {
    mode: TransportMode,
    devices: HashMap<i64, Vec<String>>,
    failing: Vec<String>,
    attempts: AtomicU32,
    delivered: Mutex<Vec<(i64, String, PushMessage)>>,
}

impl RecordingTransport {
    pub fn new(mode: TransportMode) -> Self {
        Self {
            mode,
            devices: HashMap::new(),
            failing: Vec::new(),
            attempts: AtomicU32::new(0),
            delivered: Mutex::new(Vec::new()),
        }
    }

    pub fn with_devices(mut self, user_id: i64, tokens: &[&str]) -> Self {
        self.devices
            .insert(user_id, tokens.iter().map(|t| t.to_string()).collect());
        self
    }

    /// Deliveries to this device always fail, whatever the mode.
    pub fn failing_device(mut self, token: &str) -> Self {
        self.failing.push(token.to_string());
        self
    }

    fn owner_of(&self, token: &str) -> i64 {
        self.devices
            .iter()
            .find(|(_, tokens)| tokens.iter().any(|t| t == token))
            .map(|(user_id, _)| *user_id)
            .or_else(|| token.strip_prefix("device-").and_then(|id| id.parse().ok()))
            .unwrap_or_default()
    }

    pub fn attempts(&self) -> u32 {
        self.attempts.load(Ordering::SeqCst)
    }

    pub fn delivered(&self) -> Vec<(i64, PushMessage)> {
        self.delivered
            .lock()
            .unwrap()
            .iter()
            .map(|(user_id, _, message)| (*user_id, message.clone()))
            .collect()
    }

    pub fn delivered_tokens(&self) -> Vec<String> {
        self.delivered
            .lock()
            .unwrap()
            .iter()
            .map(|(_, token, _)| token.clone())
            .collect()
    }

    /// Waits for the spawned delivery tasks, giving up after two seconds.
    pub async fn wait_for_deliveries(&self, count: usize) -> Vec<i64> {
        for _ in 0..200 {
            if self.delivered.lock().unwrap().len() >= count {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        self.delivered().into_iter().map(|(user_id, _)| user_id).collect()
    }
}

#[async_trait]
impl PushTransport for RecordingTransport {
    async fn device_tokens(&self, user_id: i64) -> anyhow::Result<Vec<String>> {
        Ok(self
            .devices
            .get(&user_id)
            .cloned()
            .unwrap_or_else(|| vec![format!("device-{user_id}")]))
    }

    async fn deliver(&self, token: &str, message: &PushMessage) -> anyhow::Result<()> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        if self.failing.iter().any(|t| t == token) {
            anyhow::bail!("device {token} rejected the message");
        }
        match self.mode {
            TransportMode::Deliver => {
                let user_id = self.owner_of(token);
                self.delivered
                    .lock()
                    .unwrap()
                    .push((user_id, token.to_string(), message.clone()));
                Ok(())
            }
            TransportMode::Fail => Err(anyhow::anyhow!("push provider unavailable")),
            TransportMode::Hang => {
                std::future::pending::<()>().await;
                Ok(())
            }
        }
    }
}

/// One center with two elders, their family and staff, plus a second center.
pub struct Fixture {
    pub store: MemoryStore,
    pub images: ImageStorage,
    pub transport: Arc<RecordingTransport>,
    pub notifications: NotificationService,
    pub center_id: i64,
    pub other_center_id: i64,
    pub owner_id: i64,
    pub guardian_id: i64,
    pub protector_ids: [i64; 2],
    pub outsider_id: i64,
    /// 김순자: guarded by `guardian_id`, protected by both protectors.
    pub elder_a: i64,
    /// No guardian, no protectors.
    pub elder_b: i64,
    /// Lives in the other center.
    pub foreign_elder: i64,
}

impl Fixture {
    pub fn new() -> Self {
        let store = MemoryStore::default();
        store.add_user(1, UserRole::Center);
        store.add_user(2, UserRole::Guardian);
        store.add_user(3, UserRole::Protector);
        store.add_user(4, UserRole::Protector);
        store.add_user(5, UserRole::Protector);
        store.add_user(6, UserRole::Center);
        store.add_center(10, 1);
        store.add_center(20, 6);
        store.add_elder(100, 10, Some(2), "김순자");
        store.add_elder(101, 10, None, "이영희");
        store.add_elder(102, 20, None, "박철수");
        store.add_protector(100, 3);
        store.add_protector(100, 4);

        let root = std::env::temp_dir().join(format!("carenote-test-{}", Uuid::new_v4()));
        let transport = Arc::new(RecordingTransport::new(TransportMode::Deliver));
        let notifications =
            NotificationService::new(transport.clone(), Duration::from_secs(1), 1);

        Self {
            store,
            images: ImageStorage::new(root, "/media"),
            transport,
            notifications,
            center_id: 10,
            other_center_id: 20,
            owner_id: 1,
            guardian_id: 2,
            protector_ids: [3, 4],
            outsider_id: 5,
            elder_a: 100,
            elder_b: 101,
            foreign_elder: 102,
        }
    }

    pub fn staff(&self) -> AuthenticatedUser {
        AuthenticatedUser { user_id: self.owner_id, role: UserRole::Center }
    }

    pub fn guardian(&self) -> AuthenticatedUser {
        AuthenticatedUser { user_id: self.guardian_id, role: UserRole::Guardian }
    }

    pub fn protector(&self, index: usize) -> AuthenticatedUser {
        AuthenticatedUser { user_id: self.protector_ids[index], role: UserRole::Protector }
    }

    pub fn outsider_protector(&self) -> AuthenticatedUser {
        AuthenticatedUser { user_id: self.outsider_id, role: UserRole::Protector }
    }

    pub fn query(&self) -> crate::models::report::ReportQuery {
        crate::models::report::ReportQuery {
            center: Some(self.center_id),
            ..Default::default()
        }
    }

    /// Application state over this fixture. The pool is lazy and never connects.
    pub fn state(&self) -> AppState {
        let config = Config {
            database_url: "postgres://localhost/carenote_test".into(),
            jwt_secret: TEST_SECRET.into(),
            host: "127.0.0.1".into(),
            port: 0,
            media_dir: "unused".into(),
            media_base_url: "/media".into(),
            fcm_api_key: None,
            push_timeout_secs: 1,
            push_max_attempts: 1,
        };
        let db = PgPoolOptions::new()
            .connect_lazy(&config.database_url)
            .unwrap();

        AppState {
            db,
            store: Arc::new(self.store.clone()),
            config: Arc::new(config),
            notifications: Arc::new(NotificationService::new(
                self.transport.clone(),
                Duration::from_secs(1),
                1,
            )),
            images: Arc::new(self.images.clone()),
        }
    }
}
