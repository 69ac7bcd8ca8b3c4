//! Test doubles and common utilities for reconciler contract tests
//!
//! This module provides an in-memory provider that behaves like the real
//! rewrite API (list/create/delete against a per-profile rule list) and
//! records every call in order, plus IP sources with scripted answers.

#![allow(dead_code)]

use rewrite_core::config::AccountConfig;
use rewrite_core::error::{Error, Result};
use rewrite_core::traits::{
    IpSource, ObservedRewrite, ProviderOutcome, RewriteProvider, RewriteProviderFactory,
};
use std::collections::{HashMap, VecDeque};
use std::net::IpAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

/// A provider call, as seen by the fake backend
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProviderCall {
    List {
        profile_id: String,
    },
    Create {
        profile_id: String,
        name: String,
        content: String,
    },
    Delete {
        profile_id: String,
        rule_id: String,
    },
}

impl ProviderCall {
    pub fn create(profile_id: &str, name: &str, content: &str) -> Self {
        Self::Create {
            profile_id: profile_id.to_string(),
            name: name.to_string(),
            content: content.to_string(),
        }
    }

    pub fn delete(profile_id: &str, rule_id: &str) -> Self {
        Self::Delete {
            profile_id: profile_id.to_string(),
            rule_id: rule_id.to_string(),
        }
    }

    pub fn is_mutation(&self) -> bool {
        !matches!(self, ProviderCall::List { .. })
    }
}

#[derive(Default)]
struct BackendState {
    profiles: HashMap<String, Vec<ObservedRewrite>>,
    list_overrides: HashMap<String, ProviderOutcome<Vec<ObservedRewrite>>>,
    calls: Vec<ProviderCall>,
    fail_creates: bool,
    fail_deletes: bool,
    next_id: usize,
}

/// Shared in-memory provider state
#[derive(Clone, Default)]
pub struct FakeBackend {
    state: Arc<Mutex<BackendState>>,
}

impl FakeBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a profile with its current rules
    pub fn with_profile(self, profile_id: &str, rules: Vec<ObservedRewrite>) -> Self {
        self.state
            .lock()
            .unwrap()
            .profiles
            .insert(profile_id.to_string(), rules);
        self
    }

    /// Force `list_rewrites` for a profile to return `outcome`
    pub fn set_list_outcome(&self, profile_id: &str, outcome: ProviderOutcome<Vec<ObservedRewrite>>) {
        self.state
            .lock()
            .unwrap()
            .list_overrides
            .insert(profile_id.to_string(), outcome);
    }

    pub fn fail_creates(&self) {
        self.state.lock().unwrap().fail_creates = true;
    }

    pub fn fail_deletes(&self) {
        self.state.lock().unwrap().fail_deletes = true;
    }

    /// Every call so far, in order
    pub fn calls(&self) -> Vec<ProviderCall> {
        self.state.lock().unwrap().calls.clone()
    }

    /// Create and delete calls so far, in order
    pub fn mutations(&self) -> Vec<ProviderCall> {
        self.calls().into_iter().filter(ProviderCall::is_mutation).collect()
    }

    pub fn clear_calls(&self) {
        self.state.lock().unwrap().calls.clear();
    }

    /// Current rules of a profile
    pub fn rules(&self, profile_id: &str) -> Vec<ObservedRewrite> {
        self.state
            .lock()
            .unwrap()
            .profiles
            .get(profile_id)
            .cloned()
            .unwrap_or_default()
    }

    pub fn provider(&self) -> FakeRewriteProvider {
        FakeRewriteProvider {
            backend: self.clone(),
        }
    }
}

/// A RewriteProvider backed by a FakeBackend
pub struct FakeRewriteProvider {
    backend: FakeBackend,
}

#[async_trait::async_trait]
impl RewriteProvider for FakeRewriteProvider {
    async fn list_rewrites(&self, profile_id: &str) -> ProviderOutcome<Vec<ObservedRewrite>> {
        let mut state = self.backend.state.lock().unwrap();
        state.calls.push(ProviderCall::List {
            profile_id: profile_id.to_string(),
        });

        if let Some(outcome) = state.list_overrides.get(profile_id) {
            return outcome.clone();
        }

        match state.profiles.get(profile_id) {
            Some(rules) => ProviderOutcome::Success(rules.clone()),
            None => ProviderOutcome::NotFound,
        }
    }

    async fn create_rewrite(
        &self,
        profile_id: &str,
        name: &str,
        content: &str,
    ) -> ProviderOutcome<ObservedRewrite> {
        let mut state = self.backend.state.lock().unwrap();
        state.calls.push(ProviderCall::create(profile_id, name, content));

        if state.fail_creates {
            return ProviderOutcome::Failure("create rejected".to_string());
        }

        state.next_id += 1;
        let rule = ObservedRewrite::new(format!("fake-{}", state.next_id), name, content);

        match state.profiles.get_mut(profile_id) {
            Some(rules) => {
                rules.push(rule.clone());
                ProviderOutcome::Success(rule)
            }
            None => ProviderOutcome::NotFound,
        }
    }

    async fn delete_rewrite(&self, profile_id: &str, rule_id: &str) -> bool {
        let mut state = self.backend.state.lock().unwrap();
        state.calls.push(ProviderCall::delete(profile_id, rule_id));

        if state.fail_deletes {
            return false;
        }

        let Some(rules) = state.profiles.get_mut(profile_id) else {
            return false;
        };
        let before = rules.len();
        rules.retain(|r| r.id != rule_id);
        rules.len() != before
    }

    fn provider_name(&self) -> &'static str {
        "fake"
    }
}

/// Factory handing out providers over one shared backend
pub struct FakeFactory {
    backend: FakeBackend,
    tokens: Arc<Mutex<Vec<String>>>,
}

impl FakeFactory {
    pub fn new(backend: &FakeBackend) -> Self {
        Self {
            backend: backend.clone(),
            tokens: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Tokens of the accounts a provider was built for, in order
    pub fn tokens(&self) -> Arc<Mutex<Vec<String>>> {
        Arc::clone(&self.tokens)
    }
}

impl RewriteProviderFactory for FakeFactory {
    fn create(&self, account: &AccountConfig) -> Result<Box<dyn RewriteProvider>> {
        if account.api_token.is_empty() {
            return Err(Error::config("API token is required"));
        }
        self.tokens.lock().unwrap().push(account.api_token.clone());
        Ok(Box::new(self.backend.provider()))
    }
}

/// An IP source answering from a script
///
/// Each call pops the next answer; the last answer repeats forever.
/// `None` answers are resolution failures.
#[derive(Clone)]
pub struct ScriptedIpSource {
    answers: Arc<Mutex<VecDeque<Option<IpAddr>>>>,
    calls: Arc<AtomicUsize>,
}

impl ScriptedIpSource {
    pub fn new(answers: Vec<Option<IpAddr>>) -> Self {
        Self {
            answers: Arc::new(Mutex::new(answers.into())),
            calls: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn fixed(ip: IpAddr) -> Self {
        Self::new(vec![Some(ip)])
    }

    pub fn failing() -> Self {
        Self::new(vec![None])
    }

    /// Number of times current() was called
    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait::async_trait]
impl IpSource for ScriptedIpSource {
    async fn current(&self) -> Result<IpAddr> {
        self.calls.fetch_add(1, Ordering::SeqCst);

        let mut answers = self.answers.lock().unwrap();
        let answer = if answers.len() > 1 {
            answers.pop_front().flatten()
        } else {
            answers.front().copied().flatten()
        };

        answer.ok_or_else(|| Error::ip_source("no answer from any endpoint"))
    }
}

/// IP source that panics on its first call and answers afterwards
#[derive(Clone)]
pub struct PanicOnceIpSource {
    ip: IpAddr,
    calls: Arc<AtomicUsize>,
}

impl PanicOnceIpSource {
    pub fn new(ip: IpAddr) -> Self {
        Self {
            ip,
            calls: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait::async_trait]
impl IpSource for PanicOnceIpSource {
    async fn current(&self) -> Result<IpAddr> {
        if self.calls.fetch_add(1, Ordering::SeqCst) == 0 {
            panic!("IP source blew up");
        }
        Ok(self.ip)
    }
}

pub fn ip(a: u8, b: u8, c: u8, d: u8) -> IpAddr {
    IpAddr::from([a, b, c, d])
}
