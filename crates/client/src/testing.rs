//! Scripted stand-ins for the network, the origin and the push platform.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use bytes::Bytes;
use chrono::Utc;
use url::Url;

use storyline_core::{Error, PushKeys, PushSubscription, Story};

use crate::fetch::{FetchedResponse, Fetcher};
use crate::origin::{NewStory, Origin, Photo};
use crate::push::{Permission, RegistrationHost};

pub fn story(id: &str, name: &str) -> Story {
    Story {
        id: id.to_string(),
        name: name.to_string(),
        description: format!("{name}'s story"),
        photo_reference: format!("https://story-api.dicoding.dev/images/{id}.jpg"),
        location: None,
        created_at: Utc::now(),
    }
}

/// Shared, ordered record of calls across mocks.
#[derive(Debug, Clone, Default)]
pub struct EventLog(Arc<Mutex<Vec<String>>>);

impl EventLog {
    pub fn push(&self, event: &str) {
        self.0.lock().unwrap().push(event.to_string());
    }

    pub fn events(&self) -> Vec<String> {
        self.0.lock().unwrap().clone()
    }
}

#[derive(Debug, Clone)]
enum Reply {
    Ok { status: u16, content_type: String, body: Bytes },
    Unreachable,
}

/// Fetcher answering from a URL table. Unknown URLs are unreachable.
#[derive(Debug, Default)]
pub struct ScriptedFetcher {
    replies: Mutex<HashMap<String, Reply>>,
    calls: Mutex<Vec<String>>,
}

impl ScriptedFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn respond(&self, url: &str, status: u16, content_type: &str, body: &[u8]) {
        let reply = Reply::Ok { status, content_type: content_type.into(), body: Bytes::copy_from_slice(body) };
        self.replies.lock().unwrap().insert(url.to_string(), reply);
    }

    pub fn fail(&self, url: &str) {
        self.replies.lock().unwrap().insert(url.to_string(), Reply::Unreachable);
    }

    pub fn calls(&self) -> usize {
        self.calls.lock().unwrap().len()
    }

    pub fn calls_for(&self, url: &str) -> usize {
        self.calls.lock().unwrap().iter().filter(|u| u.as_str() == url).count()
    }
}

#[async_trait]
impl Fetcher for ScriptedFetcher {
    async fn fetch(&self, url: &Url) -> Result<FetchedResponse, Error> {
        self.calls.lock().unwrap().push(url.to_string());

        let reply = self.replies.lock().unwrap().get(url.as_str()).cloned().unwrap_or(Reply::Unreachable);
        match reply {
            Reply::Ok { status, content_type, body } => {
                Ok(FetchedResponse { url: url.clone(), status, content_type: Some(content_type), body, fetch_ms: 0 })
            }
            Reply::Unreachable => Err(Error::remote(None, format!("connection refused: {url}"))),
        }
    }
}

#[derive(Debug, Clone)]
enum Failure {
    Unreachable,
    Status(u16, String),
}

impl Failure {
    fn to_error(&self) -> Error {
        match self {
            Failure::Unreachable => Error::remote(None, "network error: connection refused"),
            Failure::Status(status, message) => Error::remote(Some(*status), message.clone()),
        }
    }
}

#[derive(Debug, Default)]
struct OriginState {
    stories: Vec<Story>,
    failure: Option<Failure>,
    calls: HashMap<&'static str, usize>,
    unsubscribed: Vec<String>,
    log: Option<EventLog>,
}

/// In-memory origin.
#[derive(Debug, Default)]
pub struct MockOrigin {
    state: Mutex<OriginState>,
}

impl MockOrigin {
    pub fn with_stories(stories: Vec<Story>) -> Self {
        Self { state: Mutex::new(OriginState { stories, ..Default::default() }) }
    }

    /// Every call fails without a status.
    pub fn unreachable() -> Self {
        Self { state: Mutex::new(OriginState { failure: Some(Failure::Unreachable), ..Default::default() }) }
    }

    /// Every call is rejected with `status`.
    pub fn rejecting(status: u16, message: &str) -> Self {
        let failure = Failure::Status(status, message.to_string());
        Self { state: Mutex::new(OriginState { failure: Some(failure), ..Default::default() }) }
    }

    pub fn attach(&self, log: EventLog) {
        self.state.lock().unwrap().log = Some(log);
    }

    fn enter(&self, call: &'static str) -> Result<(), Error> {
        let mut state = self.state.lock().unwrap();
        *state.calls.entry(call).or_default() += 1;
        if let Some(log) = &state.log {
            log.push(&format!("origin.{call}"));
        }
        match &state.failure {
            Some(failure) => Err(failure.to_error()),
            None => Ok(()),
        }
    }

    fn count(&self, call: &str) -> usize {
        self.state.lock().unwrap().calls.get(call).copied().unwrap_or(0)
    }

    pub fn list_calls(&self) -> usize {
        self.count("list")
    }

    pub fn get_calls(&self) -> usize {
        self.count("get")
    }

    pub fn create_calls(&self) -> usize {
        self.count("create")
    }

    pub fn subscribe_calls(&self) -> usize {
        self.count("subscribe")
    }

    pub fn total_calls(&self) -> usize {
        self.state.lock().unwrap().calls.values().sum()
    }

    pub fn unsubscribed_endpoints(&self) -> Vec<String> {
        self.state.lock().unwrap().unsubscribed.clone()
    }
}

#[async_trait]
impl Origin for MockOrigin {
    async fn list_records(&self) -> Result<Vec<Story>, Error> {
        self.enter("list")?;
        Ok(self.state.lock().unwrap().stories.clone())
    }

    async fn get_record(&self, id: &str) -> Result<Story, Error> {
        self.enter("get")?;
        let state = self.state.lock().unwrap();
        state
            .stories
            .iter()
            .find(|s| s.id == id)
            .cloned()
            .ok_or_else(|| Error::remote(Some(404), "Story not found"))
    }

    async fn create_record(&self, draft: &NewStory, _photo: &Photo, _credential: &str) -> Result<(), Error> {
        self.enter("create")?;
        let mut state = self.state.lock().unwrap();
        let id = format!("story-{}", state.stories.len() + 1);
        state.stories.push(Story {
            id,
            name: "remote".into(),
            description: draft.description.clone(),
            photo_reference: "https://story-api.dicoding.dev/images/new.jpg".into(),
            location: draft.location,
            created_at: Utc::now(),
        });
        Ok(())
    }

    async fn subscribe(&self, _subscription: &PushSubscription, _credential: &str) -> Result<(), Error> {
        self.enter("subscribe")
    }

    async fn unsubscribe(&self, subscription: &PushSubscription, _credential: &str) -> Result<(), Error> {
        self.enter("unsubscribe")?;
        self.state.lock().unwrap().unsubscribed.push(subscription.endpoint.clone());
        Ok(())
    }
}

#[derive(Debug)]
struct HostState {
    supported: bool,
    permission: Permission,
    prompt_answer: Permission,
    permission_requests: usize,
    worker_registered: bool,
    subscription: Option<PushSubscription>,
    subscribed_with: Option<String>,
    subscribe_calls: usize,
    teardown_fails: bool,
    log: Option<EventLog>,
}

/// In-memory push platform.
#[derive(Debug)]
pub struct MockRegistrationHost {
    state: Mutex<HostState>,
}

impl MockRegistrationHost {
    fn build(supported: bool, permission: Permission, prompt_answer: Permission) -> Self {
        Self {
            state: Mutex::new(HostState {
                supported,
                permission,
                prompt_answer,
                permission_requests: 0,
                worker_registered: false,
                subscription: None,
                subscribed_with: None,
                subscribe_calls: 0,
                teardown_fails: false,
                log: None,
            }),
        }
    }

    pub fn granted() -> Self {
        Self::build(true, Permission::Granted, Permission::Granted)
    }

    pub fn denied() -> Self {
        Self::build(true, Permission::Denied, Permission::Denied)
    }

    /// Permission not yet asked; the prompt answers `answer`.
    pub fn prompting(answer: Permission) -> Self {
        Self::build(true, Permission::Default, answer)
    }

    pub fn unsupported() -> Self {
        Self::build(false, Permission::Denied, Permission::Denied)
    }

    pub fn attach(&self, log: EventLog) {
        self.state.lock().unwrap().log = Some(log);
    }

    fn record(&self, event: &str) {
        if let Some(log) = &self.state.lock().unwrap().log {
            log.push(&format!("host.{event}"));
        }
    }

    /// Simulate a subscription that existed before this process started.
    pub fn preexisting(&self, endpoint: &str) {
        self.state.lock().unwrap().subscription = Some(subscription_for(endpoint));
    }

    /// Simulate the platform discarding the subscription.
    pub fn drop_registration(&self) {
        self.state.lock().unwrap().subscription = None;
    }

    /// Make the device refuse to drop its registration.
    pub fn fail_teardown(&self) {
        self.state.lock().unwrap().teardown_fails = true;
    }

    pub fn is_registered(&self) -> bool {
        self.state.lock().unwrap().subscription.is_some()
    }

    pub fn subscribed_with(&self) -> Option<String> {
        self.state.lock().unwrap().subscribed_with.clone()
    }

    pub fn subscribe_calls(&self) -> usize {
        self.state.lock().unwrap().subscribe_calls
    }

    pub fn permission_requests(&self) -> usize {
        self.state.lock().unwrap().permission_requests
    }
}

fn subscription_for(endpoint: &str) -> PushSubscription {
    PushSubscription {
        endpoint: endpoint.to_string(),
        keys: PushKeys { p256dh: "BPubKey".into(), auth: "authSecret".into() },
    }
}

#[async_trait]
impl RegistrationHost for MockRegistrationHost {
    fn is_supported(&self) -> bool {
        self.state.lock().unwrap().supported
    }

    async fn permission(&self) -> Permission {
        self.state.lock().unwrap().permission
    }

    async fn request_permission(&self) -> Result<Permission, Error> {
        let mut state = self.state.lock().unwrap();
        state.permission_requests += 1;
        state.permission = state.prompt_answer;
        Ok(state.permission)
    }

    async fn register(&self) -> Result<(), Error> {
        self.record("register");
        self.state.lock().unwrap().worker_registered = true;
        Ok(())
    }

    async fn get_registration(&self) -> Result<Option<PushSubscription>, Error> {
        self.record("get_registration");
        Ok(self.state.lock().unwrap().subscription.clone())
    }

    async fn subscribe(&self, application_server_key: &str) -> Result<PushSubscription, Error> {
        self.record("subscribe");
        let mut state = self.state.lock().unwrap();
        if !state.worker_registered {
            return Err(Error::NotSupported("no background registration".into()));
        }
        state.subscribe_calls += 1;
        state.subscribed_with = Some(application_server_key.to_string());
        let subscription = subscription_for("https://push.example.com/device-1");
        state.subscription = Some(subscription.clone());
        Ok(subscription)
    }

    async fn unsubscribe(&self) -> Result<bool, Error> {
        self.record("unsubscribe");
        let mut state = self.state.lock().unwrap();
        if state.teardown_fails {
            return Err(Error::NotSupported("teardown failed".into()));
        }
        Ok(state.subscription.take().is_some())
    }
}
